use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt::Display;

use crate::graph::{AccessionId, EvidenceGraph, FileId, COMBINED_FILE_ID};
use crate::report::{ReportPSM, ReportPeptide, ReportProtein};
use crate::score::{FDRComputable, ScoreModelType};

use super::comparator::FilterType;
use super::value::ItemValue;
use super::{ReportItemKind, ReportItemRef};

pub const PSM_SCORE_FILTER_PREFIX: &str = "psm_score_filter_";
pub const PSM_TOP_IDENTIFICATION_FILTER_PREFIX: &str = "psm_top_identification_filter_";
pub const PEPTIDE_SCORE_FILTER_PREFIX: &str = "peptide_score_filter_";

/// The static description of a registered filter
#[derive(Debug, Clone, Copy)]
pub struct FilterKindInfo {
    pub short_name: &'static str,
    pub name: &'static str,
    pub filtering_name: &'static str,
    pub filter_type: FilterType,
    pub items: &'static [ReportItemKind],
}

const PSM_ITEMS: &[ReportItemKind] = &[ReportItemKind::PSM, ReportItemKind::PSMSet];
const PSM_ONLY: &[ReportItemKind] = &[ReportItemKind::PSM];
const PSM_SET_ONLY: &[ReportItemKind] = &[ReportItemKind::PSMSet];
const PEPTIDE_ITEMS: &[ReportItemKind] = &[ReportItemKind::Peptide];
const PROTEIN_ITEMS: &[ReportItemKind] = &[ReportItemKind::Protein];

macro_rules! filter_kinds {
    ($($variant:ident => ($short:literal, $name:literal, $filtering:literal, $ftype:ident, $items:ident)),+ $(,)?) => {
        /// What a filter looks at. The score filters are parameterized by the
        /// short name of the score.
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub enum FilterKind {
            $($variant,)+
            PSMScore(String),
            PSMTopIdentification(String),
            PeptideScore(String),
        }

        impl FilterKind {
            /// The filters that do not depend on a score
            pub const REGISTERED: &'static [FilterKind] = &[$(FilterKind::$variant),+];

            pub fn info(&self) -> Option<FilterKindInfo> {
                match self {
                    $(Self::$variant => Some(FilterKindInfo {
                        short_name: $short,
                        name: $name,
                        filtering_name: $filtering,
                        filter_type: FilterType::$ftype,
                        items: $items,
                    }),)+
                    _ => None,
                }
            }
        }
    };
}

filter_kinds! {
    Charge => ("charge_filter", "Charge Filter", "Charge (PSM)", Numerical, PSM_ITEMS),
    DeltaMass => ("delta_mass_filter", "dMass Filter for PSM", "dMass (PSM)", Numerical, PSM_ITEMS),
    DeltaPPM => ("delta_ppm_filter", "dPPM Filter for PSM", "dPPM (PSM)", Numerical, PSM_ITEMS),
    MZ => ("mz_filter", "m/z Filter for PSM", "m/z (PSM)", Numerical, PSM_ITEMS),
    PSMAccessions => ("psm_accessions_filter", "Accessions Filter for PSM", "Accessions (PSM)", LiteralList, PSM_ITEMS),
    PSMDescription => ("psm_description_filter", "Description Filter for PSM", "Description (PSM)", LiteralList, PSM_ITEMS),
    PSMFileList => ("psm_file_list_filter", "File List Filter for PSM", "Files (PSM)", LiteralList, PSM_ITEMS),
    PSMMissedCleavages => ("psm_missed_cleavages_filter", "Missed Cleavages Filter for PSM", "Missed Cleavages (PSM)", Numerical, PSM_ITEMS),
    PSMModifications => ("psm_modifications_filter", "Modifications Filter for PSM", "Modifications (PSM)", Modification, PSM_ITEMS),
    PSMRank => ("psm_rank_filter", "Rank Filter for PSM", "Rank (PSM)", Numerical, PSM_ONLY),
    PSMSequence => ("psm_sequence_filter", "Sequence Filter for PSM", "Sequence (PSM)", Literal, PSM_ITEMS),
    PSMUnique => ("psm_unique_filter", "Unique Filter for PSM", "Unique (PSM)", Bool, PSM_ITEMS),
    NrAccessionsPerPSM => ("nr_accessions_per_psm_filter", "#accessions per PSM", "#accessions (PSM)", Numerical, PSM_ITEMS),
    NrPSMsPerPSMSet => ("nr_psms_per_psm_set_filter", "#PSMs per PSM Set", "#PSMs (PSM Set)", Numerical, PSM_SET_ONLY),
    PSMSourceId => ("psm_source_id_filter", "Source ID Filter for PSM", "Source ID (PSM)", Literal, PSM_ITEMS),
    PeptideAccessions => ("peptide_accessions_filter", "Accessions Filter for Peptide", "Accessions (Peptide)", LiteralList, PEPTIDE_ITEMS),
    PeptideDescription => ("peptide_description_filter", "Description Filter for Peptide", "Description (Peptide)", LiteralList, PEPTIDE_ITEMS),
    PeptideFileList => ("peptide_file_list_filter", "File List Filter for Peptide", "Files (Peptide)", LiteralList, PEPTIDE_ITEMS),
    PeptideMissedCleavages => ("peptide_missed_cleavages_filter", "Missed Cleavages Filter for Peptide", "Missed Cleavages (Peptide)", Numerical, PEPTIDE_ITEMS),
    PeptideModifications => ("peptide_modifications_filter", "Modifications Filter for Peptide", "Modifications (Peptide)", Modification, PEPTIDE_ITEMS),
    PeptideSequence => ("peptide_sequence_filter", "Sequence Filter for Peptide", "Sequence (Peptide)", Literal, PEPTIDE_ITEMS),
    PeptideSourceIdList => ("peptide_source_id_list_filter", "Source ID List Filter for Peptide", "Source IDs (Peptide)", Literal, PEPTIDE_ITEMS),
    PeptideUnique => ("peptide_unique_filter", "Unique Filter for Peptide", "Unique (Peptide)", Bool, PEPTIDE_ITEMS),
    NrPSMsPerPeptide => ("nr_psms_per_peptide_filter", "#PSMs per Peptide Set", "#PSMs (Peptide)", Numerical, PEPTIDE_ITEMS),
    NrSpectraPerPeptide => ("nr_spectra_per_peptide_filter", "#Spectra per Peptide Set", "#spectra (Peptide)", Numerical, PEPTIDE_ITEMS),
    ProteinAccessions => ("protein_accessions_filter", "Accessions Filter for Protein", "Accessions (Protein)", LiteralList, PROTEIN_ITEMS),
    ProteinDescription => ("protein_description_filter", "Description Filter for Protein", "Description (Protein)", LiteralList, PROTEIN_ITEMS),
    ProteinFileList => ("protein_file_list_filter", "File List Filter for Protein", "Files (Protein)", LiteralList, PROTEIN_ITEMS),
    ProteinModifications => ("protein_modifications_filter", "Modifications Filter for Protein", "Modifications (Protein)", Modification, PROTEIN_ITEMS),
    ProteinRank => ("protein_rank_filter", "Rank Filter for Protein", "Rank (Protein)", Numerical, PROTEIN_ITEMS),
    ProteinSequenceList => ("protein_sequence_list_filter", "Sequence List Filter for Protein", "Sequences (Protein)", LiteralList, PROTEIN_ITEMS),
    ProteinScore => ("protein_score_filter", "Protein Score filter", "score (Protein)", Numerical, PROTEIN_ITEMS),
    NrPeptidesPerProtein => ("nr_peptides_per_protein_filter", "#Peptides per Protein", "#peptides (Protein)", Numerical, PROTEIN_ITEMS),
    NrPSMsPerProtein => ("nr_psms_per_protein_filter", "#PSMs per Protein", "#PSMs (Protein)", Numerical, PROTEIN_ITEMS),
    NrSpectraPerProtein => ("nr_spectra_per_protein_filter", "#Spectra per Protein", "#spectra (Protein)", Numerical, PROTEIN_ITEMS),
    NrUniquePeptidesPerProtein => ("nr_unique_peptides_per_protein_filter", "#Unique Peptides per Protein", "#unique peptides (Protein)", Numerical, PROTEIN_ITEMS),
    NrGroupUniquePeptidesPerProtein => ("nr_group_unique_peptides_per_protein_filter", "#Group Unique Peptides per Protein", "#group unique peptides (Protein)", Numerical, PROTEIN_ITEMS),
}

fn score_display_name(short_name: &str) -> &str {
    ScoreModelType::by_short_name(short_name)
        .map(|t| t.name())
        .unwrap_or(short_name)
}

impl FilterKind {
    /// Look up a filter by its short name, including the score filters
    pub fn from_short_name(short_name: &str) -> Option<Self> {
        let short_name = short_name.trim();
        if let Some(kind) = Self::REGISTERED
            .iter()
            .find(|k| k.info().is_some_and(|i| i.short_name == short_name))
        {
            return Some(kind.clone());
        }
        let parameterized = [
            (PSM_SCORE_FILTER_PREFIX, Self::PSMScore as fn(String) -> Self),
            (PSM_TOP_IDENTIFICATION_FILTER_PREFIX, Self::PSMTopIdentification),
            (PEPTIDE_SCORE_FILTER_PREFIX, Self::PeptideScore),
        ];
        parameterized.into_iter().find_map(|(prefix, build)| {
            short_name
                .strip_prefix(prefix)
                .filter(|score| !score.is_empty())
                .map(|score| build(score.to_string()))
        })
    }

    pub fn short_name(&self) -> Cow<'static, str> {
        match self {
            Self::PSMScore(s) => format!("{PSM_SCORE_FILTER_PREFIX}{s}").into(),
            Self::PSMTopIdentification(s) => format!("{PSM_TOP_IDENTIFICATION_FILTER_PREFIX}{s}").into(),
            Self::PeptideScore(s) => format!("{PEPTIDE_SCORE_FILTER_PREFIX}{s}").into(),
            _ => self.info().map(|i| i.short_name).unwrap_or_default().into(),
        }
    }

    pub fn name(&self) -> Cow<'static, str> {
        match self {
            Self::PSMScore(s) => format!("{} (PSM)", score_display_name(s)).into(),
            Self::PSMTopIdentification(s) => {
                format!("PSM Top Identifications for {}", score_display_name(s)).into()
            }
            Self::PeptideScore(s) => format!("{} (Peptide)", score_display_name(s)).into(),
            _ => self.info().map(|i| i.name).unwrap_or_default().into(),
        }
    }

    /// The name shown in filtering lists
    pub fn filtering_name(&self) -> Cow<'static, str> {
        match self {
            Self::PSMTopIdentification(s) => {
                format!("Top Identifications ({})", score_display_name(s)).into()
            }
            Self::PSMScore(_) | Self::PeptideScore(_) => self.name(),
            _ => self.info().map(|i| i.filtering_name).unwrap_or_default().into(),
        }
    }

    pub fn filter_type(&self) -> FilterType {
        match self {
            Self::PSMScore(_) | Self::PSMTopIdentification(_) | Self::PeptideScore(_) => {
                FilterType::Numerical
            }
            _ => self
                .info()
                .map(|i| i.filter_type)
                .unwrap_or(FilterType::Numerical),
        }
    }

    /// Whether this filter applies to report items of `item`
    pub fn supports(&self, item: ReportItemKind) -> bool {
        match self {
            Self::PSMScore(s) => {
                let is_set_score = ScoreModelType::by_short_name(s).is_some_and(|t| t.is_psm_set_score());
                if is_set_score {
                    item == ReportItemKind::PSMSet
                } else {
                    item == ReportItemKind::PSM
                }
            }
            Self::PSMTopIdentification(_) => item == ReportItemKind::PSM,
            Self::PeptideScore(_) => item == ReportItemKind::Peptide,
            _ => self.info().is_some_and(|i| i.items.contains(&item)),
        }
    }

    /// Pull the value this filter looks at out of `item`. File dependent
    /// values like accessions and descriptions are restricted to what `file`
    /// reported, the combined view keeps everything.
    pub fn extract_value(&self, item: ReportItemRef<'_>, file: FileId, graph: &EvidenceGraph) -> ItemValue {
        if !self.supports(item.kind()) {
            return ItemValue::Null;
        }
        match item {
            ReportItemRef::PSM(psm) => self.extract_psm_value(&[psm], false, file, graph),
            ReportItemRef::PSMSet(set) => {
                let members: Vec<&ReportPSM> = set.psms.iter().collect();
                match self {
                    Self::NrPSMsPerPSMSet => ItemValue::count(set.psms.len()),
                    Self::PSMScore(s) => score_item_value(set.score_value(s)),
                    _ => self.extract_psm_value(&members, true, file, graph),
                }
            }
            ReportItemRef::Peptide(peptide) => self.extract_peptide_value(peptide, file, graph),
            ReportItemRef::Protein(protein) => self.extract_protein_value(protein, file, graph),
        }
    }

    fn extract_psm_value(
        &self,
        psms: &[&ReportPSM],
        is_set: bool,
        file: FileId,
        graph: &EvidenceGraph,
    ) -> ItemValue {
        let Some(first) = psms.first() else {
            return ItemValue::Null;
        };
        let scalar = |f: &dyn Fn(&ReportPSM) -> ItemValue| -> ItemValue {
            if is_set {
                ItemValue::Collection(psms.iter().map(|p| f(p)).collect())
            } else {
                f(first)
            }
        };
        let accessions = || -> Vec<AccessionId> {
            let all: BTreeSet<AccessionId> = psms.iter().flat_map(|p| p.accessions.iter().copied()).collect();
            refine_accessions(all.into_iter(), file, graph)
        };
        match self {
            Self::Charge => scalar(&|p| ItemValue::number(graph.psm(p.id).charge)),
            Self::DeltaMass => scalar(&|p| ItemValue::Number(graph.psm(p.id).delta_mass)),
            Self::DeltaPPM => scalar(&|p| ItemValue::Number(graph.psm(p.id).delta_ppm())),
            Self::MZ => scalar(&|p| ItemValue::Number(graph.psm(p.id).mass_to_charge)),
            Self::PSMMissedCleavages => {
                scalar(&|p| ItemValue::number(graph.psm(p.id).missed_cleavages))
            }
            Self::PSMRank => ItemValue::from(graph.psm(first.id).rank.map(f64::from)),
            Self::PSMSequence => ItemValue::Text(graph.psm(first.id).sequence.clone()),
            Self::PSMSourceId => scalar(&|p| match graph.psm(p.id).source_id.as_ref() {
                Some(s) => ItemValue::Text(s.clone()),
                None => ItemValue::Null,
            }),
            Self::PSMUnique => ItemValue::Bool(graph.psm(first.id).is_unique.unwrap_or(false)),
            Self::PSMModifications => ItemValue::Modifications(
                graph.psm(first.id).modifications.values().cloned().collect(),
            ),
            Self::PSMAccessions => accession_names(&accessions(), graph),
            Self::PSMDescription => descriptions(&accessions(), file, graph),
            Self::NrAccessionsPerPSM => ItemValue::count(accessions().len()),
            Self::PSMFileList => file_names(psms.iter().map(|p| p.file), graph),
            Self::PSMScore(s) => {
                let has_score = first.scores.iter().any(|m| m.short_name() == s)
                    || matches!(s.as_str(), "psm_fdr_score" | "psm_q_value");
                if has_score {
                    score_item_value(first.score_value(s))
                } else {
                    ItemValue::Null
                }
            }
            Self::PSMTopIdentification(s) => {
                ItemValue::from(first.identification_rank(s).map(|r| r as f64))
            }
            _ => ItemValue::Null,
        }
    }

    fn extract_peptide_value(&self, peptide: &ReportPeptide, file: FileId, graph: &EvidenceGraph) -> ItemValue {
        let accessions = || refine_accessions(peptide.accessions.iter().copied(), file, graph);
        match self {
            Self::PeptideAccessions => accession_names(&accessions(), graph),
            Self::PeptideDescription => descriptions(&accessions(), file, graph),
            Self::PeptideFileList => file_names(peptide.files().into_iter(), graph),
            Self::PeptideMissedCleavages => {
                ItemValue::from(peptide.missed_cleavages(graph).map(f64::from))
            }
            Self::PeptideModifications => {
                ItemValue::Modifications(peptide.modifications(graph).into_iter().cloned().collect())
            }
            Self::PeptideSequence => ItemValue::Text(peptide.sequence.clone()),
            Self::PeptideSourceIdList => {
                let ids: BTreeSet<&str> = peptide
                    .psm_ids()
                    .filter_map(|id| graph.psm(id).source_id.as_deref())
                    .collect();
                ItemValue::Collection(ids.into_iter().map(|s| ItemValue::Text(s.to_string())).collect())
            }
            Self::PeptideUnique => ItemValue::Bool(peptide.is_unique(graph)),
            Self::NrPSMsPerPeptide => ItemValue::count(peptide.nr_psms()),
            Self::NrSpectraPerPeptide => ItemValue::count(peptide.nr_spectra()),
            Self::PeptideScore(s) => score_item_value(peptide.score_value(s)),
            _ => ItemValue::Null,
        }
    }

    fn extract_protein_value(&self, protein: &ReportProtein, file: FileId, graph: &EvidenceGraph) -> ItemValue {
        let accessions = || refine_accessions(protein.accessions.iter().copied(), file, graph);
        match self {
            Self::ProteinAccessions => accession_names(&accessions(), graph),
            Self::ProteinDescription => descriptions(&accessions(), file, graph),
            Self::ProteinFileList => file_names(protein.files().into_iter(), graph),
            Self::ProteinModifications => {
                ItemValue::Modifications(protein.modifications(graph).into_iter().cloned().collect())
            }
            Self::ProteinRank => ItemValue::from(protein.rank.map(|r| r as f64)),
            Self::ProteinSequenceList => ItemValue::TextList(
                accessions()
                    .iter()
                    .filter_map(|a| graph.accession(*a).db_sequence.clone())
                    .collect(),
            ),
            Self::ProteinScore => ItemValue::Number(protein.score),
            Self::NrPeptidesPerProtein => ItemValue::count(protein.nr_peptides()),
            Self::NrPSMsPerProtein => ItemValue::count(protein.nr_psms()),
            Self::NrSpectraPerProtein => ItemValue::count(protein.nr_spectra()),
            Self::NrUniquePeptidesPerProtein => ItemValue::count(protein.nr_unique_peptides(graph)),
            Self::NrGroupUniquePeptidesPerProtein => ItemValue::count(protein.nr_group_unique_peptides()),
            _ => ItemValue::Null,
        }
    }
}

impl Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.short_name())
    }
}

fn score_item_value(value: f64) -> ItemValue {
    if value.is_nan() {
        ItemValue::Null
    } else {
        ItemValue::Number(value)
    }
}

/// Keep the accessions reported in `file`, or all of them for the combined view
fn refine_accessions(
    accessions: impl Iterator<Item = AccessionId>,
    file: FileId,
    graph: &EvidenceGraph,
) -> Vec<AccessionId> {
    accessions
        .filter(|a| file == COMBINED_FILE_ID || graph.accession(*a).found_in_file(file))
        .collect()
}

fn accession_names(accessions: &[AccessionId], graph: &EvidenceGraph) -> ItemValue {
    ItemValue::TextList(
        accessions
            .iter()
            .map(|a| graph.accession(*a).accession.clone())
            .collect(),
    )
}

fn descriptions(accessions: &[AccessionId], file: FileId, graph: &EvidenceGraph) -> ItemValue {
    let mut values = Vec::new();
    for acc in accessions.iter().map(|a| graph.accession(*a)) {
        if file == COMBINED_FILE_ID {
            values.extend(acc.descriptions.values().cloned());
        } else if let Some(d) = acc.description(file) {
            values.push(d.to_string());
        }
    }
    ItemValue::TextList(values)
}

fn file_names(files: impl Iterator<Item = FileId>, graph: &EvidenceGraph) -> ItemValue {
    let files: BTreeSet<FileId> = files.collect();
    ItemValue::TextList(
        files
            .into_iter()
            .map(|f| match graph.file(f) {
                Some(file) => file.name.clone(),
                None => f.to_string(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_registry_round_trip() {
        let mut seen = BTreeSet::new();
        for kind in FilterKind::REGISTERED {
            let short = kind.short_name();
            assert!(seen.insert(short.to_string()));
            assert_eq!(FilterKind::from_short_name(&short).as_ref(), Some(kind));
            assert!(!kind.name().is_empty());
        }
        assert_eq!(
            FilterKind::from_short_name("psm_score_filter_mascot_score"),
            Some(FilterKind::PSMScore("mascot_score".into()))
        );
        assert_eq!(FilterKind::from_short_name("psm_score_filter_"), None);
        assert_eq!(FilterKind::from_short_name("no_filter"), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(FilterKind::Charge.name(), "Charge Filter");
        assert_eq!(FilterKind::NrPSMsPerPSMSet.filtering_name(), "#PSMs (PSM Set)");
        assert_eq!(
            FilterKind::PSMScore("mascot_score".into()).name(),
            "Mascot Ion Score (PSM)"
        );
        assert_eq!(
            FilterKind::PSMTopIdentification("mascot_score".into()).short_name(),
            "psm_top_identification_filter_mascot_score"
        );
    }

    #[test]
    fn test_supports() {
        assert!(FilterKind::Charge.supports(ReportItemKind::PSMSet));
        assert!(!FilterKind::Charge.supports(ReportItemKind::Peptide));
        assert!(FilterKind::PSMScore("psm_combined_fdr_score".into()).supports(ReportItemKind::PSMSet));
        assert!(!FilterKind::PSMScore("psm_combined_fdr_score".into()).supports(ReportItemKind::PSM));
        assert!(FilterKind::PSMScore("mascot_score".into()).supports(ReportItemKind::PSM));
        assert!(!FilterKind::PSMScore("mascot_score".into()).supports(ReportItemKind::PSMSet));
        assert!(FilterKind::NrPSMsPerPSMSet.supports(ReportItemKind::PSMSet));
        assert!(!FilterKind::NrPSMsPerPSMSet.supports(ReportItemKind::PSM));
    }
}
