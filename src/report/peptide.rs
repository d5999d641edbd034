use std::collections::BTreeSet;

use regex::Regex;

use crate::graph::{AccessionId, EvidenceGraph, FileId, Modification, PeptideId, PsmId};
use crate::score::{DecoyStrategy, FDRComputable, FDRValues, ScoreModelType};

use super::psm::{best_value, PSMReportItem, ReportPSM};

/// A peptide with the spectra identifying it in one file or in the combined view
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportPeptide {
    /// The sequence, followed by the modifications when those are considered
    pub string_id: String,
    pub sequence: String,
    pub peptide: PeptideId,
    pub psms: Vec<PSMReportItem>,
    pub accessions: Vec<AccessionId>,
    /// PSMs which do not contribute to the peptide's score
    pub non_scoring_psms: BTreeSet<PsmId>,
    /// Spectra, by spectrum key, which do not contribute to the peptide's score
    pub non_scoring_spectra: BTreeSet<String>,
    pub rank: Option<usize>,
    pub is_decoy: bool,
    pub fdr: FDRValues,
}

impl ReportPeptide {
    pub fn new(string_id: String, sequence: String, peptide: PeptideId, accessions: Vec<AccessionId>) -> Self {
        Self {
            string_id,
            sequence,
            peptide,
            psms: Vec::new(),
            accessions,
            non_scoring_psms: BTreeSet::new(),
            non_scoring_spectra: BTreeSet::new(),
            rank: None,
            is_decoy: false,
            fdr: FDRValues::default(),
        }
    }

    /// The peptide id, optionally followed by the modification string of a PSM
    pub fn create_string_id(sequence: &str, modifications: Option<&str>) -> String {
        match modifications {
            Some(mods) => format!("{sequence}{mods}"),
            None => sequence.to_string(),
        }
    }

    pub fn add_psm(&mut self, psm: PSMReportItem) {
        self.psms.push(psm);
    }

    pub fn nr_psms(&self) -> usize {
        self.psms.len()
    }

    /// The distinct spectra identifying this peptide
    pub fn spectrum_keys(&self) -> BTreeSet<&str> {
        self.psms
            .iter()
            .flat_map(|p| p.psms())
            .map(|p| p.spectrum_key.as_str())
            .collect()
    }

    pub fn nr_spectra(&self) -> usize {
        self.spectrum_keys().len()
    }

    /// The spectra which still count towards the score
    pub fn scoring_spectrum_keys(&self) -> BTreeSet<&str> {
        self.psms
            .iter()
            .flat_map(|p| p.psms())
            .filter(|p| !self.non_scoring_psms.contains(&p.id))
            .map(|p| p.spectrum_key.as_str())
            .filter(|k| !self.non_scoring_spectra.contains(*k))
            .collect()
    }

    pub fn files(&self) -> BTreeSet<FileId> {
        self.psms
            .iter()
            .flat_map(|p| p.psms())
            .map(|p| p.file)
            .collect()
    }

    pub fn psm_ids(&self) -> impl Iterator<Item = PsmId> + '_ {
        self.psms.iter().flat_map(|p| p.psms()).map(|p| p.id)
    }

    pub fn missed_cleavages(&self, graph: &EvidenceGraph) -> Option<i32> {
        self.psm_ids().next().map(|id| graph.psm(id).missed_cleavages)
    }

    pub fn modifications<'a>(&self, graph: &'a EvidenceGraph) -> Vec<&'a Modification> {
        self.psm_ids()
            .flat_map(|id| graph.psm(id).modifications.values())
            .collect()
    }

    pub fn is_unique(&self, graph: &EvidenceGraph) -> bool {
        let mut ids = self.psm_ids().peekable();
        ids.peek().is_some() && ids.all(|id| graph.psm(id).is_unique.unwrap_or(false))
    }

    /// The best value of a PSM level score amongst the scoring PSMs
    pub fn best_score(&self, short_name: &str) -> f64 {
        let scoring = |p: &&ReportPSM| {
            !self.non_scoring_psms.contains(&p.id) && !self.non_scoring_spectra.contains(&p.spectrum_key)
        };
        let is_set_score = ScoreModelType::by_short_name(short_name).is_some_and(|t| t.is_psm_set_score());
        let values = self.psms.iter().flat_map(|item| -> Vec<f64> {
            match item {
                PSMReportItem::Set(set) if is_set_score => {
                    if set.psms.iter().any(|p| scoring(&p)) {
                        vec![set.score_value(short_name)]
                    } else {
                        vec![]
                    }
                }
                _ => item.psms().filter(scoring).map(|p| p.score_value(short_name)).collect(),
            }
        });
        best_value(short_name, values)
    }

    pub fn update_decoy_status(&mut self, strategy: DecoyStrategy, pattern: &Regex, graph: &EvidenceGraph) {
        self.is_decoy = match strategy {
            DecoyStrategy::AccessionPattern => {
                !self.accessions.is_empty()
                    && self
                        .accessions
                        .iter()
                        .all(|a| pattern.is_match(&graph.accession(*a).accession))
            }
            DecoyStrategy::SearchEngine | DecoyStrategy::Inherit => {
                !self.psms.is_empty() && self.psms.iter().all(|p| p.is_decoy())
            }
        };
    }
}

impl FDRComputable for ReportPeptide {
    fn score_value(&self, short_name: &str) -> f64 {
        match short_name {
            "peptide_q_value" => self.fdr.q_value,
            "peptide_fdr_score" => self.fdr.fdr_score,
            "peptide_combined_fdr_score" => f64::NAN,
            _ => self.best_score(short_name),
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::report::{IdentificationKeySettings, ReportPSM, ReportPSMSet};
    use crate::test_data;

    #[test_log::test]
    fn test_best_score_skips_non_scoring() {
        let graph = test_data::small_graph();
        let pep = graph.find_peptide("CCCK").unwrap();
        let mut report = ReportPeptide::new(pep.sequence.clone(), pep.sequence.clone(), pep.id, pep.accession_ids());
        for id in pep.psms.iter() {
            report.add_psm(PSMReportItem::PSM(ReportPSM::new(
                &graph,
                *id,
                IdentificationKeySettings::default(),
            )));
        }
        assert!(report.nr_psms() >= 2);
        let best = report.best_score("mascot_score");
        let best_id = report
            .psm_ids()
            .find(|id| graph.psm(*id).score("mascot_score").map(|s| s.value) == Some(best))
            .unwrap();
        report.non_scoring_psms.insert(best_id);
        assert!(report.best_score("mascot_score") < best);
        assert_eq!(report.score_value("peptide_q_value").is_nan(), true);
    }

    #[test_log::test]
    fn test_best_score_of_set_scores() {
        let graph = test_data::small_graph();
        let pep = graph.find_peptide("FFFK").unwrap();
        let members: Vec<ReportPSM> = pep
            .psms
            .iter()
            .map(|id| ReportPSM::new(&graph, *id, IdentificationKeySettings::default()))
            .collect();
        let mut set = ReportPSMSet::new("FFFK".to_string(), members);
        set.average_fdr_score = 0.05;
        set.fdr.fdr_score = 0.02;
        let member_ids: Vec<PsmId> = set.psms.iter().map(|p| p.id).collect();

        let mut report = ReportPeptide::new(pep.sequence.clone(), pep.sequence.clone(), pep.id, pep.accession_ids());
        report.add_psm(PSMReportItem::Set(set));
        assert_eq!(report.best_score("psm_combined_fdr_score"), 0.02);
        assert_eq!(report.best_score("average_fdr_score"), 0.05);

        // a set score only counts while one of its members is scoring
        report.non_scoring_psms.extend(member_ids);
        assert!(report.best_score("psm_combined_fdr_score").is_nan());
    }
}
