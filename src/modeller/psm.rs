use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;

use crate::cache::{Cached, GenerationCounter, GenerationTracker};
use crate::filter::{apply_filters, satisfies_filter_list, Filter, FilterComparator, FilterKind, FilterValue};
use crate::graph::{EvidenceGraph, FileId, PsmId, COMBINED_FILE_ID};
use crate::report::{identification_key, IdentificationKeySettings, PSMReportItem, ReportPSM, ReportPSMSet};
use crate::score::{
    calculate_fdr_score, DecoyStrategy, FDRComputable, FDRData, FDRError, FDRScoreComputable, FDRValues, ScoreModelType,
};

use super::competition_ranks;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PSMSettings {
    pub decoy_strategy: DecoyStrategy,
    pub decoy_pattern: String,
    pub fdr_threshold: f64,
    /// Only the best `top_identifications` matches of a spectrum take part in
    /// the FDR estimation, 0 means all
    pub top_identifications: usize,
    /// Scores to estimate the FDR on, in order of preference
    pub preferred_fdr_scores: Vec<String>,
    pub key_settings: IdentificationKeySettings,
}

impl Default for PSMSettings {
    fn default() -> Self {
        Self {
            decoy_strategy: DecoyStrategy::AccessionPattern,
            decoy_pattern: "DECOY_.*".to_string(),
            fdr_threshold: 0.01,
            top_identifications: 1,
            preferred_fdr_scores: Vec::new(),
            key_settings: IdentificationKeySettings::default(),
        }
    }
}

impl PSMSettings {
    fn fdr_data(&self) -> FDRData {
        let mut data = FDRData::new(self.decoy_strategy, self.decoy_pattern.clone(), self.fdr_threshold);
        data.top_identifications = self.top_identifications;
        data
    }
}

/// The PSM level of an analysis: one report list per input file and the
/// PSM sets of the combined view
#[derive(Debug)]
pub struct PSMModeller<'a> {
    graph: &'a EvidenceGraph,
    settings: PSMSettings,
    key_settings: IdentificationKeySettings,
    file_psms: IndexMap<FileId, Vec<ReportPSM>>,
    fdr_data: IndexMap<FileId, FDRData>,
    generation: GenerationCounter,
    fdr_generations: GenerationTracker<FileId>,
    psm_sets: Cached<IndexMap<String, ReportPSMSet>>,
    combined_fdr: bool,
    combined_fdr_data: Vec<(Vec<FileId>, FDRData)>,
}

impl<'a> PSMModeller<'a> {
    pub fn new(graph: &'a EvidenceGraph, settings: PSMSettings) -> Self {
        let key_settings = settings.key_settings.available_for(graph.psms()).no_redundant();
        let mut file_psms: IndexMap<FileId, Vec<ReportPSM>> =
            graph.files().map(|f| (f.id, Vec::new())).collect();
        for psm in graph.psms() {
            file_psms
                .entry(psm.file)
                .or_default()
                .push(ReportPSM::new(graph, psm.id, key_settings));
        }
        for psms in file_psms.values_mut() {
            compute_identification_ranks(psms);
        }
        log::info!(
            "modelling {} PSMs from {} files, identified by {:?}",
            graph.psms().len(),
            file_psms.len(),
            key_settings
        );
        Self {
            graph,
            settings,
            key_settings,
            file_psms,
            fdr_data: IndexMap::new(),
            generation: GenerationCounter::default(),
            fdr_generations: GenerationTracker::default(),
            psm_sets: Cached::default(),
            combined_fdr: false,
            combined_fdr_data: Vec::new(),
        }
    }

    pub fn graph(&self) -> &'a EvidenceGraph {
        self.graph
    }

    pub fn settings(&self) -> &PSMSettings {
        &self.settings
    }

    pub fn key_settings(&self) -> IdentificationKeySettings {
        self.key_settings
    }

    /// Replace the settings. Every FDR estimation becomes stale and is redone
    /// on request.
    pub fn set_settings(&mut self, settings: PSMSettings) {
        if settings.key_settings != self.settings.key_settings {
            self.key_settings = settings
                .key_settings
                .available_for(self.graph.psms())
                .no_redundant();
        }
        self.settings = settings;
        self.generation.bump();
        self.psm_sets.invalidate();
    }

    pub fn files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.file_psms.keys().copied()
    }

    /// The report PSMs of `file`, the combined view has none
    pub fn psms(&self, file: FileId) -> &[ReportPSM] {
        self.file_psms.get(&file).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn fdr_data(&self, file: FileId) -> Option<&FDRData> {
        self.fdr_data.get(&file)
    }

    /// The FDR estimations of the combined FDR score, one per combination of
    /// files
    pub fn combined_fdr_data(&self) -> &[(Vec<FileId>, FDRData)] {
        &self.combined_fdr_data
    }

    /// Whether the FDR of `file` was computed with the current settings
    pub fn is_stale(&self, file: FileId) -> bool {
        if file == COMBINED_FILE_ID {
            self.psm_sets.is_stale(self.generation.current())
        } else {
            self.fdr_generations.is_stale(&file, self.generation.current())
        }
    }

    /// Whether the search engine flagged any match of `file` as decoy
    pub fn file_has_internal_decoys(&self, file: FileId) -> bool {
        self.psms(file)
            .iter()
            .any(|p| self.graph.psm(p.id).is_decoy == Some(true))
    }

    /// The score the FDR of `file` is estimated on: the first preferred score
    /// the file carries, otherwise its first main search engine score,
    /// otherwise the first score of its first match
    pub fn fdr_score_name(&self, file: FileId) -> Option<String> {
        let psms = self.psms(file);
        let carries = |name: &str| psms.iter().any(|p| p.scores.iter().any(|s| s.short_name() == name));
        if let Some(preferred) = self.settings.preferred_fdr_scores.iter().find(|s| carries(s)) {
            return Some(preferred.clone());
        }
        let main = ScoreModelType::ALL
            .iter()
            .filter(|t| t.is_main_score())
            .find(|t| carries(t.short_name()));
        if let Some(main) = main {
            return Some(main.short_name().to_string());
        }
        psms.iter()
            .flat_map(|p| p.scores.first())
            .next()
            .map(|s| s.short_name().to_string())
    }

    /// Update decoy states and estimate the FDR and FDRScore of `file`
    pub fn calculate_fdr(&mut self, file: FileId) -> Result<(), FDRError> {
        let score = self.fdr_score_name(file).ok_or(FDRError::NoScoreSet)?;
        let mut fdr_data = self.settings.fdr_data().with_score(score.clone());
        let regex = fdr_data.decoy_regex()?;
        let higher_is_better = ScoreModelType::by_short_name(&score)
            .and_then(|t| t.higher_is_better())
            .unwrap_or_else(|| {
                log::warn!("the direction of {score} is unknown, assuming higher is better");
                true
            });

        let top_filter: Vec<Filter> = if fdr_data.top_identifications > 0 {
            Filter::new(
                FilterKind::PSMTopIdentification(score.clone()),
                FilterComparator::LessEqual,
                FilterValue::Number(fdr_data.top_identifications as f64),
                false,
            )
            .into_iter()
            .collect()
        } else {
            Vec::new()
        };

        if fdr_data.decoy_strategy == DecoyStrategy::Inherit {
            log::warn!("file {file}: decoy state can not be inherited by a PSM, treating all as targets");
        }
        let graph = self.graph;
        let Some(psms) = self.file_psms.get_mut(&file) else {
            return Ok(());
        };
        for psm in psms.iter_mut() {
            psm.update_decoy_status(fdr_data.decoy_strategy, &regex, graph);
            psm.fdr.reset();
        }
        let mut items = apply_filters(psms, &top_filter, file, graph);
        fdr_data.calculate_fdr(&mut items, higher_is_better)?;
        calculate_fdr_score(&mut items, &fdr_data);

        let values: HashMap<PsmId, FDRValues> = items.into_iter().map(|p| (p.id, p.fdr)).collect();
        for psm in psms.iter_mut() {
            if let Some(v) = values.get(&psm.id) {
                psm.fdr = *v;
            }
        }
        log::info!(
            "file {file}: {} of {} PSMs FDR-good at {} on {score}",
            fdr_data.nr_fdr_good_targets,
            fdr_data.nr_items,
            fdr_data.fdr_threshold
        );
        self.fdr_data.insert(file, fdr_data);
        self.fdr_generations.add(file, self.generation.current());
        self.psm_sets.invalidate();
        Ok(())
    }

    /// Estimate the FDR of every file whose estimation is missing or stale
    pub fn calculate_all_fdr(&mut self) -> Result<(), FDRError> {
        let files: Vec<FileId> = self
            .files()
            .filter(|f| self.is_stale(*f) && !self.psms(*f).is_empty())
            .collect();
        for file in files {
            self.calculate_fdr(file)?;
        }
        Ok(())
    }

    /// Compute the combined FDR score of the PSM sets. Per-file FDRs are
    /// brought up to date first.
    pub fn calculate_combined_fdr_score(&mut self) -> Result<(), FDRError> {
        self.calculate_all_fdr()?;
        self.settings.fdr_data().decoy_regex()?;
        self.combined_fdr = true;
        self.psm_sets.invalidate();
        self.psm_sets();
        Ok(())
    }

    /// Redo the FDR of every file estimated under older settings. A file
    /// whose estimation now fails loses its FDR values.
    fn refresh_outdated_fdr(&mut self) {
        let outdated = self.fdr_generations.older_than(self.generation.current());
        for file in outdated {
            if let Err(e) = self.calculate_fdr(file) {
                log::warn!("file {file}: the FDR could not be estimated again: {e}");
                self.fdr_generations.remove(&file);
                self.fdr_data.shift_remove(&file);
                if let Some(psms) = self.file_psms.get_mut(&file) {
                    for psm in psms.iter_mut() {
                        psm.fdr.reset();
                    }
                }
            }
        }
    }

    /// The PSM sets of the combined view, keyed by identification key. Files
    /// whose FDR was estimated under older settings are estimated again first.
    pub fn psm_sets(&mut self) -> &IndexMap<String, ReportPSMSet> {
        let current = self.generation.current();
        if self.psm_sets.is_stale(current) {
            self.refresh_outdated_fdr();
            let mut sets = build_psm_sets(&self.file_psms, self.graph, self.key_settings);
            if self.combined_fdr {
                self.combined_fdr_data = combine_fdr_scores(&mut sets, &self.settings);
            }
            self.psm_sets.set(sets, current);
        }
        self.psm_sets.get_or_update(current, IndexMap::new)
    }

    /// The report items of `file` passing `filters`. The combined view
    /// reports PSM sets.
    pub fn filtered_psms(&mut self, file: FileId, filters: &[Filter]) -> Vec<PSMReportItem> {
        let graph = self.graph;
        if file == COMBINED_FILE_ID {
            self.psm_sets()
                .values()
                .filter(|s| satisfies_filter_list(*s, file, filters, graph))
                .cloned()
                .map(PSMReportItem::Set)
                .collect()
        } else {
            apply_filters(self.psms(file), filters, file, graph)
                .into_iter()
                .map(PSMReportItem::PSM)
                .collect()
        }
    }
}

/// Rank the matches of each spectrum by each of their scores
fn compute_identification_ranks(psms: &mut [ReportPSM]) {
    let mut by_spectrum: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, psm) in psms.iter().enumerate() {
        by_spectrum.entry(psm.spectrum_key.clone()).or_default().push(i);
    }
    for members in by_spectrum.values() {
        let mut names: Vec<String> = members
            .iter()
            .flat_map(|i| psms[*i].scores.iter().map(|s| s.short_name().to_string()))
            .collect();
        names.sort();
        names.dedup();
        for name in names {
            let higher = ScoreModelType::by_short_name(&name)
                .and_then(|t| t.higher_is_better())
                .unwrap_or(true);
            let scores: Vec<f64> = members
                .iter()
                .map(|i| {
                    psms[*i]
                        .scores
                        .iter()
                        .find(|s| s.short_name() == name)
                        .map(|s| s.value)
                        .unwrap_or(f64::NAN)
                })
                .collect();
            let ranks = competition_ranks(&scores, higher);
            for (j, i) in members.iter().enumerate() {
                if !scores[j].is_nan() {
                    psms[*i].identification_ranks.insert(name.clone(), ranks[j]);
                }
            }
        }
    }
}

fn build_psm_sets(
    file_psms: &IndexMap<FileId, Vec<ReportPSM>>,
    graph: &EvidenceGraph,
    key_settings: IdentificationKeySettings,
) -> IndexMap<String, ReportPSMSet> {
    let mut grouped: IndexMap<String, Vec<ReportPSM>> = IndexMap::new();
    for psm in file_psms.values().flatten() {
        let key = identification_key(graph.psm(psm.id), key_settings);
        grouped.entry(key).or_default().push(psm.clone());
    }
    log::debug!("built {} PSM sets", grouped.len());
    grouped
        .into_iter()
        .map(|(key, psms)| (key.clone(), ReportPSMSet::new(key, psms)))
        .collect()
}

/// Estimate the FDR on the average FDR score of the sets, separately for
/// every combination of files the members carry FDRScores from
fn combine_fdr_scores(
    sets: &mut IndexMap<String, ReportPSMSet>,
    settings: &PSMSettings,
) -> Vec<(Vec<FileId>, FDRData)> {
    let mut combinations: BTreeMap<Vec<FileId>, Vec<String>> = BTreeMap::new();
    for set in sets.values_mut() {
        set.update_decoy_status();
        set.fdr.reset();
        set.calculate_average_fdr_score();
        let files = set.fdr_score_files();
        if !files.is_empty() {
            combinations.entry(files).or_default().push(set.key.clone());
        }
    }

    let mut result = Vec::new();
    for (files, keys) in combinations {
        let mut items: Vec<ReportPSMSet> = keys.iter().filter_map(|k| sets.get(k).cloned()).collect();
        let mut fdr_data = settings
            .fdr_data()
            .with_score(ScoreModelType::AverageFDRScore.short_name());
        fdr_data.top_identifications = 0;
        if let Err(e) = fdr_data.calculate_fdr(&mut items, false) {
            log::warn!("combined FDR score for files {files:?} failed: {e}");
            continue;
        }
        calculate_fdr_score(&mut items, &fdr_data);
        for item in items.iter_mut() {
            // a single set has nothing to interpolate between
            if item.fdr_score().is_nan() && item.q_value().is_finite() {
                let q = item.q_value();
                item.set_fdr_score(q);
            }
        }
        log::debug!(
            "combined FDR score over files {files:?}: {} sets, {} decoys",
            fdr_data.nr_items,
            fdr_data.nr_decoys
        );
        for item in items {
            if let Some(set) = sets.get_mut(&item.key) {
                set.fdr = item.fdr;
            }
        }
        result.push((files, fdr_data));
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data;

    #[test_log::test]
    fn test_identification_ranks() {
        let graph = test_data::small_graph();
        let modeller = PSMModeller::new(&graph, PSMSettings::default());
        let psms = modeller.psms(1);
        let shared: Vec<&ReportPSM> = psms
            .iter()
            .filter(|p| graph.psm(p.id).mass_to_charge == 500.25)
            .collect();
        assert_eq!(shared.len(), 2);
        let mut ranks: Vec<usize> = shared
            .iter()
            .map(|p| p.identification_rank("mascot_score").unwrap())
            .collect();
        ranks.sort();
        assert_eq!(ranks, vec![1, 2]);
        for p in psms.iter() {
            assert_eq!(
                p.identification_rank("mascot_score"),
                p.identification_rank("mascot_expect")
            );
        }
    }

    #[test_log::test]
    fn test_fdr_per_file() -> Result<(), FDRError> {
        let graph = test_data::large_graph();
        let mut modeller = PSMModeller::new(&graph, PSMSettings::default());
        assert!(modeller.is_stale(1));
        assert_eq!(modeller.fdr_score_name(1).as_deref(), Some("mascot_score"));
        modeller.calculate_all_fdr()?;
        assert!(!modeller.is_stale(1) && !modeller.is_stale(2));

        let data = modeller.fdr_data(1).unwrap();
        assert_eq!(data.nr_items, modeller.psms(1).len());
        assert!(data.nr_decoys > 0);

        let mut psms = modeller.psms(1).to_vec();
        psms.sort_by(|a, b| {
            b.score_value("mascot_score")
                .total_cmp(&a.score_value("mascot_score"))
        });
        for w in psms.windows(2) {
            assert!(w[0].q_value() <= w[1].q_value());
            assert!(w[0].fdr_score() <= w[1].fdr_score());
        }
        Ok(())
    }

    #[test_log::test]
    fn test_preferred_score() {
        let graph = test_data::small_graph();
        let settings = PSMSettings {
            preferred_fdr_scores: vec!["xtandem_expect".into(), "mascot_expect".into()],
            ..Default::default()
        };
        let modeller = PSMModeller::new(&graph, settings);
        assert_eq!(modeller.fdr_score_name(2).as_deref(), Some("mascot_expect"));
        assert_eq!(modeller.fdr_score_name(COMBINED_FILE_ID), None);
    }

    #[test_log::test]
    fn test_combined_fdr_score() -> Result<(), FDRError> {
        let graph = test_data::small_graph();
        let mut modeller = PSMModeller::new(&graph, PSMSettings::default());
        modeller.calculate_combined_fdr_score()?;
        assert!(!modeller.is_stale(COMBINED_FILE_ID));
        let sets = modeller.psm_sets().clone();
        // FFFK was matched to the same spectrum in both files
        let both = sets.values().find(|s| s.psms.len() == 2).unwrap();
        assert_eq!(both.fdr_score_files(), vec![1, 2]);
        assert!(!both.combined_fdr_score().is_nan());
        assert!(sets.values().any(|s| s.is_decoy));
        let combinations: Vec<Vec<FileId>> =
            modeller.combined_fdr_data().iter().map(|(f, _)| f.clone()).collect();
        assert!(combinations.contains(&vec![1]) && combinations.contains(&vec![2]));

        modeller.set_settings(PSMSettings {
            fdr_threshold: 0.05,
            ..Default::default()
        });
        assert!(modeller.is_stale(1));
        assert!(modeller.is_stale(COMBINED_FILE_ID));
        Ok(())
    }

    #[test_log::test]
    fn test_psm_sets_follow_settings() -> Result<(), FDRError> {
        let graph = test_data::small_graph();
        let mut modeller = PSMModeller::new(&graph, PSMSettings::default());
        modeller.calculate_combined_fdr_score()?;
        let decoys = |m: &mut PSMModeller<'_>| m.psm_sets().values().filter(|s| s.is_decoy).count();
        assert_eq!(decoys(&mut modeller), 2);

        modeller.set_settings(PSMSettings {
            decoy_pattern: "NOTHING_.*".into(),
            ..Default::default()
        });
        assert!(modeller.is_stale(1));
        assert_eq!(decoys(&mut modeller), 0);
        assert!(!modeller.is_stale(1) && !modeller.is_stale(2));
        assert!(!modeller.is_stale(COMBINED_FILE_ID));
        assert_eq!(modeller.fdr_data(1).map(|d| d.nr_decoys), Some(0));

        // an estimation that can no longer be done drops the file's FDR
        modeller.set_settings(PSMSettings {
            decoy_pattern: "(DECOY".into(),
            ..Default::default()
        });
        modeller.psm_sets();
        assert!(modeller.is_stale(1));
        assert!(modeller.fdr_data(1).is_none());
        assert!(modeller.psms(1).iter().all(|p| p.q_value().is_nan()));
        Ok(())
    }

    #[test_log::test]
    fn test_inherited_decoys_are_targets() -> Result<(), FDRError> {
        let graph = test_data::small_graph();
        let mut modeller = PSMModeller::new(
            &graph,
            PSMSettings {
                decoy_strategy: DecoyStrategy::Inherit,
                ..Default::default()
            },
        );
        modeller.calculate_fdr(1)?;
        assert!(modeller.psms(1).iter().all(|p| !p.is_decoy));
        assert_eq!(modeller.fdr_data(1).map(|d| d.nr_decoys), Some(0));
        Ok(())
    }

    #[test_log::test]
    fn test_filtered_psms() {
        let graph = test_data::small_graph();
        let mut modeller = PSMModeller::new(&graph, PSMSettings::default());
        let filters = vec![crate::filter::parse_filter("charge_filter = 2").unwrap()];
        let file1 = modeller.filtered_psms(1, &filters);
        assert!(file1.iter().all(|p| matches!(p, PSMReportItem::PSM(_))));
        assert_eq!(file1.len(), 6);
        let combined = modeller.filtered_psms(COMBINED_FILE_ID, &filters);
        assert!(combined.iter().all(|p| matches!(p, PSMReportItem::Set(_))));
        assert_eq!(combined.len(), 9);
    }
}
