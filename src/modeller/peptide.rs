use indexmap::IndexMap;

use crate::cache::{Cached, GenerationCounter};
use crate::filter::{apply_filters, satisfies_filter_list, Filter};
use crate::graph::FileId;
use crate::report::ReportPeptide;
use crate::score::{calculate_fdr_score, DecoyStrategy, FDRComputable, FDRData, FDRError, ScoreModelType};

use super::competition_ranks;
use super::psm::PSMModeller;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PeptideSettings {
    /// Distinguish peptides of the same sequence by their modifications
    pub consider_modifications: bool,
    pub decoy_strategy: DecoyStrategy,
    pub decoy_pattern: String,
    pub fdr_threshold: f64,
}

impl Default for PeptideSettings {
    fn default() -> Self {
        Self {
            consider_modifications: false,
            decoy_strategy: DecoyStrategy::AccessionPattern,
            decoy_pattern: "DECOY_.*".to_string(),
            fdr_threshold: 0.01,
        }
    }
}

/// Report peptides per input file, built from a [`PSMModeller`]'s report
#[derive(Debug, Default)]
pub struct PeptideModeller {
    settings: PeptideSettings,
    generation: GenerationCounter,
    peptides: IndexMap<FileId, Cached<Vec<ReportPeptide>>>,
    fdr_data: IndexMap<FileId, FDRData>,
}

fn score_direction(short_name: &str) -> bool {
    ScoreModelType::by_short_name(short_name)
        .and_then(|t| t.higher_is_better())
        .unwrap_or(true)
}

impl PeptideModeller {
    pub fn new(settings: PeptideSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &PeptideSettings {
        &self.settings
    }

    pub fn set_consider_modifications(&mut self, consider_modifications: bool) {
        if consider_modifications != self.settings.consider_modifications {
            self.settings.consider_modifications = consider_modifications;
            self.generation.bump();
        }
    }

    pub fn set_settings(&mut self, settings: PeptideSettings) {
        self.settings = settings;
        self.generation.bump();
    }

    pub fn is_stale(&self, file: FileId) -> bool {
        self.peptides
            .get(&file)
            .map_or(true, |c| c.is_stale(self.generation.current()))
    }

    pub fn fdr_data(&self, file: FileId) -> Option<&FDRData> {
        self.fdr_data.get(&file)
    }

    fn build(&self, psms: &mut PSMModeller<'_>, file: FileId) -> Vec<ReportPeptide> {
        let graph = psms.graph();
        let items = psms.filtered_psms(file, &[]);
        let mut by_id: IndexMap<String, ReportPeptide> = IndexMap::new();
        for item in items {
            let Some(first) = item.first_psm() else {
                continue;
            };
            let psm = graph.psm(first.id);
            let mods = self
                .settings
                .consider_modifications
                .then(|| psm.modification_string());
            let string_id = ReportPeptide::create_string_id(&psm.sequence, mods.as_deref());
            let peptide = graph.peptide(psm.peptide);
            by_id
                .entry(string_id.clone())
                .or_insert_with(|| {
                    ReportPeptide::new(string_id, peptide.sequence.clone(), peptide.id, peptide.accession_ids())
                })
                .add_psm(item);
        }
        log::debug!("file {file}: {} peptides", by_id.len());
        by_id.into_values().collect()
    }

    /// The report peptides of `file`, rebuilt if the settings changed
    pub fn peptides(&mut self, psms: &mut PSMModeller<'_>, file: FileId) -> &mut Vec<ReportPeptide> {
        let current = self.generation.current();
        if self.is_stale(file) {
            let peptides = self.build(psms, file);
            self.peptides.entry(file).or_default().set(peptides, current);
        }
        self.peptides
            .entry(file)
            .or_default()
            .get_or_update(current, Vec::new)
    }

    pub fn filtered_peptides(
        &mut self,
        psms: &mut PSMModeller<'_>,
        file: FileId,
        filters: &[Filter],
    ) -> Vec<ReportPeptide> {
        let graph = psms.graph();
        apply_filters(self.peptides(psms, file), filters, file, graph)
    }

    /// Estimate the peptide FDR of `file` on `score_short_name`, a PSM level
    /// score of which each peptide takes its best value
    pub fn calculate_fdr(
        &mut self,
        psms: &mut PSMModeller<'_>,
        file: FileId,
        score_short_name: &str,
    ) -> Result<(), FDRError> {
        let graph = psms.graph();
        let mut fdr_data = FDRData::new(
            self.settings.decoy_strategy,
            self.settings.decoy_pattern.clone(),
            self.settings.fdr_threshold,
        )
        .with_score(score_short_name);
        fdr_data.top_identifications = 0;
        let regex = fdr_data.decoy_regex()?;
        let higher_is_better = score_direction(score_short_name);

        let peptides = self.peptides(psms, file);
        for peptide in peptides.iter_mut() {
            peptide.fdr.reset();
            peptide.update_decoy_status(fdr_data.decoy_strategy, &regex, graph);
        }
        fdr_data.calculate_fdr(peptides, higher_is_better)?;
        calculate_fdr_score(peptides, &fdr_data);
        log::info!(
            "file {file}: {} of {} peptides FDR-good on {score_short_name}",
            fdr_data.nr_fdr_good_targets,
            fdr_data.nr_items
        );
        self.fdr_data.insert(file, fdr_data);
        Ok(())
    }

    /// Rank the peptides of `file` by `score_short_name` after filtering,
    /// peptides failing `filters` lose their rank
    pub fn calculate_ranking(
        &mut self,
        psms: &mut PSMModeller<'_>,
        file: FileId,
        score_short_name: &str,
        filters: &[Filter],
    ) {
        let graph = psms.graph();
        let higher_is_better = score_direction(score_short_name);
        let peptides = self.peptides(psms, file);
        let passing: Vec<usize> = (0..peptides.len())
            .filter(|i| satisfies_filter_list(&peptides[*i], file, filters, graph))
            .collect();
        let scores: Vec<f64> = passing
            .iter()
            .map(|i| peptides[*i].score_value(score_short_name))
            .collect();
        for peptide in peptides.iter_mut() {
            peptide.rank = None;
        }
        for (i, rank) in passing.into_iter().zip(competition_ranks(&scores, higher_is_better)) {
            peptides[i].rank = Some(rank);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::{EvidenceGraph, COMBINED_FILE_ID};
    use crate::modeller::PSMSettings;
    use crate::test_data;

    #[test_log::test]
    fn test_peptides_per_file() {
        let graph: EvidenceGraph = test_data::small_graph();
        let mut psms = PSMModeller::new(&graph, PSMSettings::default());
        let mut modeller = PeptideModeller::new(PeptideSettings::default());
        let file1: Vec<String> = modeller
            .peptides(&mut psms, 1)
            .iter()
            .map(|p| p.string_id.clone())
            .collect();
        assert_eq!(file1.len(), 7);
        assert!(!file1.contains(&"IIIK".to_string()));
        let eeek = modeller
            .peptides(&mut psms, 1)
            .iter()
            .find(|p| p.sequence == "EEEK")
            .unwrap()
            .clone();
        assert_eq!(eeek.nr_psms(), 2);
        assert!(eeek.psms.iter().all(|p| p.file() == 1));

        let combined = modeller.peptides(&mut psms, COMBINED_FILE_ID).clone();
        assert_eq!(combined.len(), 8);
        let fffk = combined.iter().find(|p| p.sequence == "FFFK").unwrap();
        assert_eq!(fffk.nr_psms(), 1);
        assert_eq!(fffk.files().len(), 2);
        assert!(!modeller.is_stale(1));
        modeller.set_consider_modifications(true);
        assert!(modeller.is_stale(1));
    }

    #[test_log::test]
    fn test_peptide_fdr() -> Result<(), FDRError> {
        let graph = test_data::large_graph();
        let mut psms = PSMModeller::new(&graph, PSMSettings::default());
        let mut modeller = PeptideModeller::new(PeptideSettings::default());
        modeller.calculate_fdr(&mut psms, 1, "mascot_score")?;
        let data = modeller.fdr_data(1).unwrap();
        assert!(data.nr_decoys > 0);
        let peptides = modeller.peptides(&mut psms, 1);
        for w in peptides.windows(2) {
            assert!(w[0].score_value("mascot_score") >= w[1].score_value("mascot_score"));
            assert!(w[0].score_value("peptide_q_value") <= w[1].score_value("peptide_q_value"));
        }
        assert!(peptides.iter().all(|p| !p.score_value("peptide_fdr_score").is_nan()));
        Ok(())
    }

    #[test_log::test]
    fn test_ranking() {
        let graph = test_data::small_graph();
        let mut psms = PSMModeller::new(&graph, PSMSettings::default());
        let mut modeller = PeptideModeller::new(PeptideSettings::default());
        let filters = vec![crate::filter::parse_filter("peptide_sequence_filter not contains H").unwrap()];
        modeller.calculate_ranking(&mut psms, 1, "mascot_score", &filters);
        let peptides = modeller.peptides(&mut psms, 1);
        let rank_of = |seq: &str| peptides.iter().find(|p| p.sequence == seq).and_then(|p| p.rank);
        assert_eq!(rank_of("AAAK"), Some(1));
        assert_eq!(rank_of("CCCK"), Some(2));
        assert_eq!(rank_of("HHHK"), None);
    }
}
