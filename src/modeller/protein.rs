use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::cache::{Cached, GenerationCounter};
use crate::filter::{apply_filters, satisfies_filter_list, Filter};
use crate::graph::{EvidenceGraph, COMBINED_FILE_ID};
use crate::inference::{InferenceControl, InferenceError, InferenceMethod, InferenceSettings, ProteinInference};
use crate::report::{ReportPSMSet, ReportProtein};
use crate::score::{calculate_fdr_score, DecoyStrategy, FDRData, FDRError, ScoreModelType};
use crate::scoring::ProteinScoring;

use super::competition_ranks;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProteinSettings {
    pub inference: InferenceMethod,
    pub scoring: ProteinScoring,
    pub consider_modifications: bool,
    pub strict_decoys: bool,
    pub decoy_strategy: DecoyStrategy,
    pub decoy_pattern: String,
    pub fdr_threshold: f64,
}

impl Default for ProteinSettings {
    fn default() -> Self {
        Self {
            inference: InferenceMethod::OccamsRazor,
            scoring: ProteinScoring::default(),
            consider_modifications: false,
            strict_decoys: false,
            decoy_strategy: DecoyStrategy::AccessionPattern,
            decoy_pattern: "DECOY_.*".to_string(),
            fdr_threshold: 0.01,
        }
    }
}

/// The protein level of an analysis: the inferred proteins, their FDR and
/// ranking
#[derive(Debug, Default)]
pub struct ProteinModeller {
    settings: ProteinSettings,
    inference_filters: Vec<Filter>,
    generation: GenerationCounter,
    report: Cached<Vec<ReportProtein>>,
    fdr_data: Option<FDRData>,
    inferred_at: Option<DateTime<Utc>>,
    /// Fingerprint of the PSM sets the report was inferred from
    inferred_from: Option<u64>,
}

/// Identifies the content of a PSM set map: keys, members, decoy states and
/// the set level scores
fn psm_sets_fingerprint(psm_sets: &IndexMap<String, ReportPSMSet>) -> u64 {
    let mut hasher = DefaultHasher::new();
    psm_sets.len().hash(&mut hasher);
    for (key, set) in psm_sets.iter() {
        key.hash(&mut hasher);
        set.is_decoy.hash(&mut hasher);
        set.average_fdr_score.to_bits().hash(&mut hasher);
        set.fdr.fdr_score.to_bits().hash(&mut hasher);
        for psm in set.psms.iter() {
            psm.id.hash(&mut hasher);
            psm.is_decoy.hash(&mut hasher);
            psm.fdr.fdr_score.to_bits().hash(&mut hasher);
        }
    }
    hasher.finish()
}

impl ProteinModeller {
    pub fn new(settings: ProteinSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &ProteinSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ProteinSettings) {
        self.settings = settings;
        self.generation.bump();
    }

    pub fn inference_filters(&self) -> &[Filter] {
        &self.inference_filters
    }

    pub fn add_inference_filter(&mut self, filter: Filter) {
        self.inference_filters.push(filter);
        self.generation.bump();
    }

    pub fn set_inference_filters(&mut self, filters: Vec<Filter>) {
        self.inference_filters = filters;
        self.generation.bump();
    }

    pub fn inference_settings(&self) -> InferenceSettings {
        InferenceSettings {
            method: self.settings.inference,
            filters: self.inference_filters.clone(),
            scoring: self.settings.scoring.clone(),
            consider_modifications: self.settings.consider_modifications,
            strict_decoys: self.settings.strict_decoys,
        }
    }

    /// Whether the report is missing or was inferred with older settings
    pub fn is_stale(&self) -> bool {
        self.report.is_stale(self.generation.current())
    }

    /// Whether the report is stale or was inferred from other PSM sets than
    /// `psm_sets`
    pub fn is_stale_for(&self, psm_sets: &IndexMap<String, ReportPSMSet>) -> bool {
        self.is_stale() || self.inferred_from != Some(psm_sets_fingerprint(psm_sets))
    }

    /// Force the next [`ProteinModeller::infer`] to run again
    pub fn invalidate(&mut self) {
        self.generation.bump();
    }

    pub fn inferred_at(&self) -> Option<DateTime<Utc>> {
        self.inferred_at
    }

    /// Infer the proteins unless the current report is valid for the
    /// settings and for `psm_sets`
    pub fn infer(
        &mut self,
        graph: &EvidenceGraph,
        psm_sets: &IndexMap<String, ReportPSMSet>,
        control: &InferenceControl,
    ) -> Result<&[ReportProtein], InferenceError> {
        let fingerprint = psm_sets_fingerprint(psm_sets);
        if self.inferred_from.is_some_and(|f| f != fingerprint) {
            log::debug!("the PSM sets changed since the last inference");
            self.generation.bump();
        }
        let current = self.generation.current();
        if self.is_stale() {
            let proteins = ProteinInference::run(graph, psm_sets, &self.inference_settings(), control)?;
            self.report.set(proteins, current);
            self.fdr_data = None;
            self.inferred_at = Some(Utc::now());
            self.inferred_from = Some(fingerprint);
        }
        Ok(self.report.get_or_update(current, Vec::new))
    }

    /// The last inferred report, even if stale
    pub fn report(&self) -> Option<&[ReportProtein]> {
        self.report.peek().map(|r| r.as_slice())
    }

    /// Look up a reported protein or sub-protein by id
    pub fn protein(&self, id: usize) -> Option<&ReportProtein> {
        self.report()?
            .iter()
            .flat_map(|p| std::iter::once(p).chain(p.sub_proteins.iter()))
            .find(|p| p.id == id)
    }

    pub fn fdr_data(&self) -> Option<&FDRData> {
        self.fdr_data.as_ref()
    }

    pub fn filtered_proteins(&self, filters: &[Filter], graph: &EvidenceGraph) -> Vec<ReportProtein> {
        self.report()
            .map(|r| apply_filters(r, filters, COMBINED_FILE_ID, graph))
            .unwrap_or_default()
    }

    /// Update the decoy states and estimate the protein FDR on the protein
    /// score. Without any decoy protein the FDR values stay unset.
    pub fn calculate_fdr(&mut self, graph: &EvidenceGraph) -> Result<(), FDRError> {
        let mut fdr_data = FDRData::new(
            self.settings.decoy_strategy,
            self.settings.decoy_pattern.clone(),
            self.settings.fdr_threshold,
        )
        .with_score(ScoreModelType::ProteinScore.short_name());
        fdr_data.top_identifications = 0;
        let regex = fdr_data.decoy_regex()?;
        let higher_is_better = self.settings.scoring.higher_is_better();
        let Some(proteins) = self.report.get_mut() else {
            log::warn!("no proteins were inferred, the protein FDR can not be estimated");
            return Ok(());
        };
        for protein in proteins.iter_mut() {
            protein.fdr.reset();
            protein.update_decoy_status(fdr_data.decoy_strategy, &regex, graph);
        }
        if !proteins.iter().any(|p| p.is_decoy) {
            log::warn!("no decoy proteins found, the protein FDR is not computed");
            self.fdr_data = None;
            return Ok(());
        }
        fdr_data.calculate_fdr(proteins, higher_is_better)?;
        calculate_fdr_score(proteins, &fdr_data);
        log::info!(
            "{} of {} proteins FDR-good at {}",
            fdr_data.nr_fdr_good_targets,
            fdr_data.nr_items,
            fdr_data.fdr_threshold
        );
        self.fdr_data = Some(fdr_data);
        Ok(())
    }

    /// Rank the proteins passing `filters` by score, the others lose their rank
    pub fn calculate_ranking(&mut self, filters: &[Filter], graph: &EvidenceGraph) {
        let higher_is_better = self.settings.scoring.higher_is_better();
        let Some(proteins) = self.report.get_mut() else {
            return;
        };
        let passing: Vec<usize> = (0..proteins.len())
            .filter(|i| satisfies_filter_list(&proteins[*i], COMBINED_FILE_ID, filters, graph))
            .collect();
        let scores: Vec<f64> = passing.iter().map(|i| proteins[*i].score).collect();
        for protein in proteins.iter_mut() {
            protein.rank = None;
        }
        for (i, rank) in passing.into_iter().zip(competition_ranks(&scores, higher_is_better)) {
            proteins[i].rank = Some(rank);
        }
    }
}
