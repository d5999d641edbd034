use std::collections::BTreeMap;

use bitflags::bitflags;
use regex::Regex;

use crate::graph::{AccessionId, EvidenceGraph, FileId, PeptideSpectrumMatch, PsmId, COMBINED_FILE_ID};
use crate::score::{score_ordering, DecoyStrategy, FDRComputable, FDRValues, ScoreModel, ScoreModelType};

bitflags! {
    /// The spectrum properties that identify a PSM across search engines and files
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct IdentificationKeySettings: u8 {
        const MASSTOCHARGE = 1;
        const RETENTION_TIME = 1 << 1;
        const SOURCE_ID = 1 << 2;
        const SPECTRUM_TITLE = 1 << 3;
        const SEQUENCE = 1 << 4;
        const MODIFICATIONS = 1 << 5;
        const CHARGE = 1 << 6;
        const FILE_ID = 1 << 7;
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for IdentificationKeySettings {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        names.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for IdentificationKeySettings {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names: Vec<String> = serde::Deserialize::deserialize(deserializer)?;
        let mut settings = Self::empty();
        for name in names {
            match Self::from_name(&name) {
                Some(flag) => settings |= flag,
                None => {
                    return Err(serde::de::Error::custom(format!(
                        "unknown identification key setting {name}"
                    )))
                }
            }
        }
        Ok(settings)
    }
}

impl Default for IdentificationKeySettings {
    fn default() -> Self {
        Self::MASSTOCHARGE | Self::RETENTION_TIME | Self::SEQUENCE | Self::MODIFICATIONS | Self::CHARGE
    }
}

impl IdentificationKeySettings {
    /// A source id identifies the spectrum on its own, so m/z, retention time
    /// and title are dropped when it is present
    pub fn no_redundant(self) -> Self {
        if self.contains(Self::SOURCE_ID) {
            self - (Self::MASSTOCHARGE | Self::RETENTION_TIME | Self::SPECTRUM_TITLE)
        } else {
            self
        }
    }

    /// The settings without the peptide dependent fields, identifying only the spectrum
    pub fn spectrum_only(self) -> Self {
        self - (Self::SEQUENCE | Self::MODIFICATIONS)
    }

    /// Restrict to the optional fields every one of `psms` actually carries
    pub fn available_for<'a>(self, psms: impl IntoIterator<Item = &'a PeptideSpectrumMatch>) -> Self {
        let mut settings = self;
        for psm in psms {
            if psm.retention_time.is_none() {
                settings -= Self::RETENTION_TIME;
            }
            if psm.source_id.is_none() {
                settings -= Self::SOURCE_ID;
            }
            if psm.spectrum_title.is_none() {
                settings -= Self::SPECTRUM_TITLE;
            }
        }
        settings
    }
}

/// Build the identification key of `psm`: the values of the selected fields,
/// ordered by the field names and joined with `:`. Absent values are skipped.
pub fn identification_key(psm: &PeptideSpectrumMatch, settings: IdentificationKeySettings) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(8);
    let mut names: Vec<(&str, IdentificationKeySettings)> = settings.iter_names().collect();
    names.sort_by_key(|(name, _)| *name);
    for (name, _) in names {
        let value = match name {
            "CHARGE" => Some(psm.charge.to_string()),
            "FILE_ID" => Some(psm.file.to_string()),
            "MASSTOCHARGE" => Some(format!("{:.4}", psm.mass_to_charge)),
            "MODIFICATIONS" => Some(psm.modification_string()),
            "RETENTION_TIME" => psm.retention_time.map(|rt| format!("{}", rt.round() as i64)),
            "SEQUENCE" => Some(psm.sequence.clone()),
            "SOURCE_ID" => psm.source_id.clone(),
            "SPECTRUM_TITLE" => psm.spectrum_title.clone(),
            _ => None,
        };
        if let Some(value) = value {
            parts.push(value);
        }
    }
    parts.join(":")
}

/// The best of `values` for the score `short_name`. NaN when there is none.
pub(crate) fn best_value(short_name: &str, values: impl IntoIterator<Item = f64>) -> f64 {
    let higher = ScoreModelType::by_short_name(short_name).and_then(|t| t.higher_is_better());
    values
        .into_iter()
        .filter(|v| !v.is_nan())
        .min_by(|a, b| score_ordering(*a, *b, higher.unwrap_or(true)))
        .unwrap_or(f64::NAN)
}

/// A spectrum match as seen in one file's report
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportPSM {
    pub id: PsmId,
    pub file: FileId,
    pub accessions: Vec<AccessionId>,
    pub scores: Vec<ScoreModel>,
    /// The key of the underlying spectrum without peptide information
    pub spectrum_key: String,
    /// The rank of this match amongst all matches to the same spectrum, by score
    pub identification_ranks: BTreeMap<String, usize>,
    pub is_decoy: bool,
    pub fdr: FDRValues,
}

impl ReportPSM {
    pub fn new(graph: &EvidenceGraph, id: PsmId, spectrum_settings: IdentificationKeySettings) -> Self {
        let psm = graph.psm(id);
        Self {
            id,
            file: psm.file,
            accessions: graph.peptide_accessions(psm.peptide),
            scores: psm.scores.clone(),
            spectrum_key: identification_key(psm, spectrum_settings.spectrum_only()),
            identification_ranks: BTreeMap::new(),
            is_decoy: psm.is_decoy.unwrap_or(false),
            fdr: FDRValues::default(),
        }
    }

    pub fn identification_rank(&self, short_name: &str) -> Option<usize> {
        self.identification_ranks.get(short_name).copied()
    }

    /// Recompute the decoy flag
    pub fn update_decoy_status(
        &mut self,
        strategy: DecoyStrategy,
        pattern: &Regex,
        graph: &EvidenceGraph,
    ) {
        self.is_decoy = match strategy {
            DecoyStrategy::AccessionPattern => {
                !self.accessions.is_empty()
                    && self
                        .accessions
                        .iter()
                        .all(|a| pattern.is_match(&graph.accession(*a).accession))
            }
            DecoyStrategy::SearchEngine => graph.psm(self.id).is_decoy.unwrap_or(false),
            DecoyStrategy::Inherit => false,
        };
    }
}

impl FDRComputable for ReportPSM {
    fn score_value(&self, short_name: &str) -> f64 {
        match short_name {
            "psm_fdr_score" => self.fdr.fdr_score,
            "psm_q_value" => self.fdr.q_value,
            _ => self
                .scores
                .iter()
                .find(|s| s.short_name() == short_name)
                .map(|s| s.value)
                .unwrap_or(f64::NAN),
        }
    }

    fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    fn fdr_values(&self) -> &FDRValues {
        &self.fdr
    }

    fn fdr_values_mut(&mut self) -> &mut FDRValues {
        &mut self.fdr
    }
}

/// The matches of all files sharing one identification key
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportPSMSet {
    pub key: String,
    pub psms: Vec<ReportPSM>,
    /// Geometric mean of the members' FDRScores
    pub average_fdr_score: f64,
    pub is_decoy: bool,
    /// The `fdr_score` of these values is the combined FDR score
    pub fdr: FDRValues,
}

impl ReportPSMSet {
    pub fn new(key: String, psms: Vec<ReportPSM>) -> Self {
        let is_decoy = !psms.is_empty() && psms.iter().all(|p| p.is_decoy);
        Self {
            key,
            psms,
            average_fdr_score: f64::NAN,
            is_decoy,
            fdr: FDRValues::default(),
        }
    }

    pub fn spectrum_key(&self) -> &str {
        self.psms.first().map(|p| p.spectrum_key.as_str()).unwrap_or("")
    }

    pub fn combined_fdr_score(&self) -> f64 {
        self.fdr.fdr_score
    }

    /// The geometric mean of the members' FDRScores, NaN when no member has one
    pub fn calculate_average_fdr_score(&mut self) -> f64 {
        let scores: Vec<f64> = self
            .psms
            .iter()
            .map(|p| p.fdr.fdr_score)
            .filter(|s| !s.is_nan())
            .collect();
        self.average_fdr_score = if scores.is_empty() {
            f64::NAN
        } else {
            let n = scores.len() as f64;
            scores.iter().map(|s| s.powf(1.0 / n)).product()
        };
        self.average_fdr_score
    }

    /// The ids of the files whose member carries a valid FDRScore, ascending
    pub fn fdr_score_files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = self
            .psms
            .iter()
            .filter(|p| !p.fdr.fdr_score.is_nan())
            .map(|p| p.file)
            .collect();
        files.sort_unstable();
        files.dedup();
        files
    }

    pub fn update_decoy_status(&mut self) {
        self.is_decoy = !self.psms.is_empty() && self.psms.iter().all(|p| p.is_decoy);
    }
}

impl FDRComputable for ReportPSMSet {
    fn score_value(&self, short_name: &str) -> f64 {
        match short_name {
            "average_fdr_score" => self.average_fdr_score,
            "psm_combined_fdr_score" => self.fdr.fdr_score,
            _ => best_value(short_name, self.psms.iter().map(|p| p.score_value(short_name))),
        }
    }

    fn is_decoy(&self) -> bool {
        self.is_decoy
    }

    fn fdr_values(&self) -> &FDRValues {
        &self.fdr
    }

    fn fdr_values_mut(&mut self) -> &mut FDRValues {
        &mut self.fdr
    }
}

/// Either a single file's PSM or the combined set over all files
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PSMReportItem {
    PSM(ReportPSM),
    Set(ReportPSMSet),
}

impl PSMReportItem {
    /// The single PSMs this item is made of
    pub fn psms(&self) -> Box<dyn Iterator<Item = &ReportPSM> + '_> {
        match self {
            Self::PSM(p) => Box::new(std::iter::once(p)),
            Self::Set(s) => Box::new(s.psms.iter()),
        }
    }

    pub fn spectrum_key(&self) -> &str {
        match self {
            Self::PSM(p) => &p.spectrum_key,
            Self::Set(s) => s.spectrum_key(),
        }
    }

    /// The file this item was reported in, the combined view for sets
    pub fn file(&self) -> FileId {
        match self {
            Self::PSM(p) => p.file,
            Self::Set(_) => COMBINED_FILE_ID,
        }
    }

    pub fn first_psm(&self) -> Option<&ReportPSM> {
        self.psms().next()
    }

    pub fn is_decoy(&self) -> bool {
        match self {
            Self::PSM(p) => p.is_decoy,
            Self::Set(s) => s.is_decoy,
        }
    }

    pub fn score_value(&self, short_name: &str) -> f64 {
        match self {
            Self::PSM(p) => p.score_value(short_name),
            Self::Set(s) => s.score_value(short_name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::Modification;
    use crate::test_data;

    #[test]
    fn test_identification_key() {
        let psm = PeptideSpectrumMatch::new(1, 2, 523.283456, 0.001, "PEPTIDEK".into())
            .with_retention_time(1201.6)
            .with_modification(3, Modification::new(Some('P'), 15.994915, None));
        let settings = IdentificationKeySettings::default();
        assert_eq!(
            identification_key(&psm, settings),
            "2:523.2835:(3;15.9949):1202:PEPTIDEK"
        );
        assert_eq!(identification_key(&psm, settings.spectrum_only()), "2:523.2835:1202");

        let with_source = settings | IdentificationKeySettings::SOURCE_ID;
        let psm = psm.with_source_id("index=42");
        assert_eq!(
            identification_key(&psm, with_source.no_redundant()),
            "2:(3;15.9949):PEPTIDEK:index=42"
        );
    }

    #[test]
    fn test_available_settings() {
        let a = PeptideSpectrumMatch::new(1, 2, 500.0, 0.0, "A".into()).with_source_id("s1");
        let b = PeptideSpectrumMatch::new(2, 2, 500.0, 0.0, "A".into()).with_retention_time(5.0);
        let all = IdentificationKeySettings::all();
        let available = all.available_for([&a, &b]);
        assert!(!available.contains(IdentificationKeySettings::SOURCE_ID));
        assert!(!available.contains(IdentificationKeySettings::RETENTION_TIME));
        assert!(available.contains(IdentificationKeySettings::CHARGE));
    }

    #[test_log::test]
    fn test_average_fdr_score() {
        let graph = test_data::small_graph();
        let settings = IdentificationKeySettings::default();
        let mut a = ReportPSM::new(&graph, PsmId(0), settings);
        let mut b = ReportPSM::new(&graph, PsmId(1), settings);
        a.fdr.fdr_score = 0.01;
        b.fdr.fdr_score = 0.04;
        let mut set = ReportPSMSet::new("k".into(), vec![a, b]);
        assert!((set.calculate_average_fdr_score() - 0.02).abs() < 1e-12);
        assert_eq!(set.score_value("average_fdr_score"), set.average_fdr_score);

        let mut empty = ReportPSMSet::new("e".into(), vec![]);
        assert!(empty.calculate_average_fdr_score().is_nan());
    }

    #[test]
    fn test_best_value() {
        assert_eq!(best_value("mascot_score", [10.0, f64::NAN, 30.0]), 30.0);
        assert_eq!(best_value("mascot_expect", [0.1, 0.01]), 0.01);
        assert!(best_value("mascot_expect", []).is_nan());
    }
}
