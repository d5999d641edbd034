use std::cmp::Ordering;
use std::fmt::Display;

/// How a score is mapped onto a "lower is better" scale before comparing
/// scores of different types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreTransform {
    Identity,
    /// `10^(-x/10)`
    Phred,
    /// `exp(-x/10)`
    ExpDecay,
    Negate,
}

impl ScoreTransform {
    #[inline]
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::Identity => value,
            Self::Phred => 10f64.powf(-value / 10.0),
            Self::ExpDecay => (-value / 10.0).exp(),
            Self::Negate => -value,
        }
    }
}

/// The static description of one score type
#[derive(Debug, Clone, Copy)]
pub struct ScoreTypeInfo {
    pub name: &'static str,
    pub short_name: &'static str,
    pub higher_is_better: Option<bool>,
    pub transform: ScoreTransform,
    pub is_psm_set_score: bool,
    pub is_main_score: bool,
    /// Further names search engines and converters use for this score
    pub aliases: &'static [&'static str],
}

macro_rules! score_types {
    ($($variant:ident => ($name:literal, $short:literal, $hib:expr, $transform:ident, $set:literal, $main:literal, [$($alias:literal),*])),+ $(,)?) => {
        /// The registered score types
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum ScoreModelType {
            #[default]
            $($variant),+
        }

        impl ScoreModelType {
            pub const ALL: &'static [ScoreModelType] = &[$(ScoreModelType::$variant),+];

            pub const fn info(&self) -> ScoreTypeInfo {
                match self {
                    $(Self::$variant => ScoreTypeInfo {
                        name: $name,
                        short_name: $short,
                        higher_is_better: $hib,
                        transform: ScoreTransform::$transform,
                        is_psm_set_score: $set,
                        is_main_score: $main,
                        aliases: &[$($alias),*],
                    }),+
                }
            }
        }
    };
}

score_types! {
    Unknown => ("unknown score", "unknown_score", None, Identity, false, false, []),
    AverageFDRScore => ("Average FDR Score", "average_fdr_score", Some(false), Identity, true, false, ["Average FDR", "average fdr"]),
    PSMCombinedFDRScore => ("PSM Combined FDR Score", "psm_combined_fdr_score", Some(false), Identity, true, false, ["PSM-level Combined FDR Score"]),
    PSMFDRScore => ("PSM FDRScore", "psm_fdr_score", Some(false), Identity, false, false, []),
    PSMQValue => ("PSM q-value", "psm_q_value", Some(false), Identity, false, false, ["q-value", "q-value_openmsmainscore"]),
    PeptideCombinedFDRScore => ("Peptide Combined FDR Score", "peptide_combined_fdr_score", Some(false), Identity, true, false, ["Peptide-level Combined FDR Score"]),
    PeptideFDRScore => ("Peptide FDRScore", "peptide_fdr_score", Some(false), Identity, false, false, []),
    PeptideQValue => ("PEPTIDE q-value", "peptide_q_value", Some(false), Identity, false, false, []),
    ProteinQValue => ("Protein q-value", "protein_q_value", Some(false), Identity, false, false, []),
    ProteinFDRScore => ("Protein FDRScore", "protein_fdr_score", Some(false), Identity, false, false, []),
    MascotExpect => ("Mascot Expect", "mascot_expect", Some(false), Identity, false, false, ["Mascot expect", "Mascot_EValue"]),
    MascotScore => ("Mascot Ion Score", "mascot_score", Some(true), Phred, false, true, ["IonScore", "Mascot Score", "Mascot score", "Mascot_openmsmainscore", "Mascot_Mascot_score"]),
    SequestProbability => ("Sequest Probability", "sequest_probability", Some(false), Identity, false, false, ["Probability"]),
    SequestSPScore => ("SpScore", "sequest_spscore", Some(true), Negate, false, false, ["Sequest SpScore"]),
    SequestXCorr => ("XCorr", "sequest_xcorr", Some(true), Negate, false, true, ["Sequest XCorr"]),
    XTandemExpect => ("X!Tandem Expect", "xtandem_expect", Some(false), Identity, false, true, ["X! Tandem expect", "Tandem Expect", "XTandem_E-Value"]),
    XTandemHyperscore => ("X!Tandem Hyperscore", "xtandem_hyperscore", Some(true), ExpDecay, false, false, ["X! Tandem hyperscore", "Tandem Hyperscore", "Hyperscore", "XTandem_openmsmainscore", "Mascot_XTandem_score"]),
    MSGFRawScore => ("MS-GF:RawScore", "msgf_rawscore", Some(true), Negate, false, false, []),
    MSGFDeNovoScore => ("MS-GF:DeNovoScore", "msgf_denovoscore", Some(true), Negate, false, false, []),
    MSGFSpecEValue => ("MS-GF:SpecEValue", "msgf_specevalue", Some(false), Identity, false, true, ["SpecEValue_openmsmainscore", "MSGFPlus_SpecEValue_score"]),
    MSGFEValue => ("MS-GF:EValue", "msgf_evalue", Some(false), Identity, false, false, []),
    AmandaScore => ("Amanda Score", "amanda_score", Some(true), Negate, false, true, ["AmandaScore"]),
    MyriMatchMVH => ("MyriMatch:MVH", "myrimatch_mvh", Some(true), Negate, false, true, ["MyriMatch_mvh_score"]),
    OpenMSPosteriorErrorProbability => ("OpenMS Posterior Error Probability", "openms_posterior_error_probability", Some(false), Identity, false, false, ["Posterior Error Probability_openmsmainscore", "Posterior Error Probability_score"]),
    OpenMSPosteriorProbability => ("OpenMS Posterior Probability", "openms_posterior_probability", Some(true), Negate, false, false, ["Posterior Probability_openmsmainscore", "Posterior Probability_score"]),
    OpenMSConsensusPEPMatrixPEP => ("OpenMS Consensus PEPMatrix (Posterior Error Probability)", "openms_consensus_pepmatrix_pep", Some(false), Identity, false, false, ["Consensus_PEPMatrix (Posterior Error Probability)_score", "Consensus_PEPMatrix (Posterior Error Probability)_openmsmainscore"]),
    FastaSequenceCount => ("FASTA Sequence Count", "fasta_sequence_count", Some(true), Negate, false, false, []),
    FastaAccessionCount => ("FASTA Accession Count", "fasta_accession_count", Some(true), Negate, false, false, []),
    ProteinScore => ("Protein score", "protein_score", Some(true), Negate, false, false, []),
}

impl ScoreModelType {
    #[inline]
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    #[inline]
    pub fn short_name(&self) -> &'static str {
        self.info().short_name
    }

    #[inline]
    pub fn higher_is_better(&self) -> Option<bool> {
        self.info().higher_is_better
    }

    pub fn is_psm_set_score(&self) -> bool {
        self.info().is_psm_set_score
    }

    pub fn is_main_score(&self) -> bool {
        self.info().is_main_score
    }

    pub fn transform(&self, value: f64) -> f64 {
        self.info().transform.apply(value)
    }

    /// Look up a registered score type by its short name
    pub fn by_short_name(short_name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| *t != Self::Unknown && t.short_name() == short_name)
    }

    /// Resolve a score descriptor as found in an identification file: a short
    /// name, a name (case-insensitively) or one of the known aliases.
    /// Unmatched descriptors resolve to [`ScoreModelType::Unknown`].
    pub fn from_descriptor(descriptor: &str) -> Self {
        let descriptor = descriptor.trim();
        if let Some(t) = Self::by_short_name(descriptor) {
            return t;
        }
        let lowered = descriptor.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .filter(|t| *t != Self::Unknown)
            .find(|t| {
                let info = t.info();
                info.name.to_lowercase() == lowered
                    || info
                        .aliases
                        .iter()
                        .any(|a| *a == descriptor || a.to_lowercase() == lowered)
            })
            .unwrap_or(Self::Unknown)
    }
}

impl Display for ScoreModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Order two score values so the better one comes first. NaN always sorts last.
pub fn score_ordering(a: f64, b: f64, higher_is_better: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if higher_is_better {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

/// One typed score value.
///
/// Scores of types that are not registered keep the name and accession they
/// were imported with.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreModel {
    pub value: f64,
    pub kind: ScoreModelType,
    pub name: Option<String>,
    pub accession: Option<String>,
}

impl ScoreModel {
    pub fn new(kind: ScoreModelType, value: f64) -> Self {
        Self {
            value,
            kind,
            name: None,
            accession: None,
        }
    }

    pub fn unknown(name: impl Into<String>, accession: Option<String>, value: f64) -> Self {
        Self {
            value,
            kind: ScoreModelType::Unknown,
            name: Some(name.into()),
            accession,
        }
    }

    /// The short name of the type, or the imported name for unknown types
    pub fn short_name(&self) -> &str {
        match (&self.kind, &self.name) {
            (ScoreModelType::Unknown, Some(name)) => name.as_str(),
            (kind, _) => kind.short_name(),
        }
    }

    pub fn name(&self) -> &str {
        match (&self.kind, &self.name) {
            (ScoreModelType::Unknown, Some(name)) => name.as_str(),
            (kind, _) => kind.name(),
        }
    }

    pub fn higher_is_better(&self) -> Option<bool> {
        self.kind.higher_is_better()
    }

    /// Compare two scores of the same registered type. [`Ordering::Less`] means
    /// `self` is the better score. `None` when the scores cannot be compared.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        if self.kind != other.kind || self.value.is_nan() || other.value.is_nan() {
            return None;
        }
        let higher = self.kind.higher_is_better()?;
        Some(score_ordering(self.value, other.value, higher))
    }

    /// Compare two scores of possibly different registered types on their
    /// transformed, lower-is-better scale
    pub fn compare_transformed(&self, other: &Self) -> Option<Ordering> {
        if self.kind == ScoreModelType::Unknown
            || other.kind == ScoreModelType::Unknown
            || self.value.is_nan()
            || other.value.is_nan()
        {
            return None;
        }
        self.kind
            .transform(self.value)
            .partial_cmp(&other.kind.transform(other.value))
    }
}

impl Display for ScoreModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name(), self.value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_registry_is_consistent() {
        let mut seen = std::collections::HashSet::new();
        for t in ScoreModelType::ALL {
            assert!(seen.insert(t.short_name()), "{} registered twice", t.short_name());
            if *t != ScoreModelType::Unknown {
                assert_eq!(ScoreModelType::by_short_name(t.short_name()), Some(*t));
                assert!(t.higher_is_better().is_some());
            }
        }
        assert_eq!(ScoreModelType::by_short_name("unknown_score"), None);
    }

    #[test]
    fn test_from_descriptor() {
        assert_eq!(
            ScoreModelType::from_descriptor("mascot_score"),
            ScoreModelType::MascotScore
        );
        assert_eq!(
            ScoreModelType::from_descriptor("x!tandem expect"),
            ScoreModelType::XTandemExpect
        );
        assert_eq!(
            ScoreModelType::from_descriptor("Hyperscore"),
            ScoreModelType::XTandemHyperscore
        );
        assert_eq!(
            ScoreModelType::from_descriptor("no such score"),
            ScoreModelType::Unknown
        );
    }

    #[test]
    fn test_compare() {
        let a = ScoreModel::new(ScoreModelType::MascotScore, 50.0);
        let b = ScoreModel::new(ScoreModelType::MascotScore, 20.0);
        assert_eq!(a.compare(&b), Some(Ordering::Less));
        assert_eq!(b.compare(&a), Some(Ordering::Greater));

        let e1 = ScoreModel::new(ScoreModelType::MascotExpect, 0.01);
        let e2 = ScoreModel::new(ScoreModelType::MascotExpect, 0.1);
        assert_eq!(e1.compare(&e2), Some(Ordering::Less));

        assert_eq!(a.compare(&e1), None);
        let nan = ScoreModel::new(ScoreModelType::MascotScore, f64::NAN);
        assert_eq!(a.compare(&nan), None);
        let u = ScoreModel::unknown("custom", None, 1.0);
        assert_eq!(u.compare(&u.clone()), None);
        assert_eq!(u.short_name(), "custom");
    }

    #[test]
    fn test_compare_transformed() {
        // an ion score of 30 is an expectation of 10^-3
        let ion = ScoreModel::new(ScoreModelType::MascotScore, 30.0);
        let expect = ScoreModel::new(ScoreModelType::MascotExpect, 0.01);
        assert_eq!(ion.compare_transformed(&expect), Some(Ordering::Less));
        let hyper = ScoreModel::new(ScoreModelType::XTandemHyperscore, 0.0);
        assert_eq!(hyper.compare_transformed(&expect), Some(Ordering::Greater));
    }

    #[test]
    fn test_score_ordering_puts_nan_last() {
        let mut values = vec![1.0, f64::NAN, 3.0, 2.0];
        values.sort_by(|a, b| score_ordering(*a, *b, true));
        assert_eq!(&values[..3], &[3.0, 2.0, 1.0]);
        assert!(values[3].is_nan());
        values.sort_by(|a, b| score_ordering(*a, *b, false));
        assert_eq!(&values[..3], &[1.0, 2.0, 3.0]);
        assert!(values[3].is_nan());
    }
}
