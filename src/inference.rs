//! Protein inference: resolving each tree of the evidence graph into a
//! parsimonious list of reported proteins.
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::mpsc::Receiver;

use indexmap::IndexMap;
use thiserror::Error;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use crate::filter::{satisfies_filter_list, Filter, FilterKind};
use crate::graph::{EvidenceGraph, GroupId, PsmId, TreeId, COMBINED_FILE_ID};
use crate::report::{PSMReportItem, ReportPSMSet, ReportPeptide, ReportProtein};
use crate::score::score_ordering;
use crate::scoring::ProteinScoring;

pub mod occams_razor;
pub mod report_all;
pub mod spectrum_extractor;
pub mod task;

pub use task::{InferenceControl, InferenceState, InferenceTask};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("strict decoy handling was requested but no decoy PSM set exists")]
    NoDecoysFound,
    #[error("the inference was cancelled")]
    Cancelled,
    #[error("the inference worker failed: {0}")]
    WorkerFailed(String),
    #[error("{0} is not a known inference method")]
    UnknownMethod(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InferenceMethod {
    #[default]
    OccamsRazor,
    SpectrumExtractor,
    /// Every candidate passing the filters, no parsimony
    ReportAll,
}

impl InferenceMethod {
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::OccamsRazor => "inference_occams_razor",
            Self::SpectrumExtractor => "inference_spectrum_extractor",
            Self::ReportAll => "inference_report_all",
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::OccamsRazor => "Occam's Razor",
            Self::SpectrumExtractor => "Spectrum Extractor",
            Self::ReportAll => "Report All",
        }
    }
}

impl Display for InferenceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for InferenceMethod {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "inference_occams_razor" => Ok(Self::OccamsRazor),
            "inference_spectrum_extractor" => Ok(Self::SpectrumExtractor),
            "inference_report_all" => Ok(Self::ReportAll),
            _ => Err(InferenceError::UnknownMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InferenceSettings {
    pub method: InferenceMethod,
    /// PSM, peptide and protein filters; each is applied at its own level
    pub filters: Vec<Filter>,
    pub scoring: ProteinScoring,
    pub consider_modifications: bool,
    pub strict_decoys: bool,
}

/// Buffers results arriving out of order and releases them in key order
#[derive(Debug)]
pub(crate) struct Collator<T> {
    waiting: HashMap<usize, T>,
    next_key: usize,
}

impl<T> Default for Collator<T> {
    fn default() -> Self {
        Self {
            waiting: HashMap::new(),
            next_key: 0,
        }
    }
}

impl<T> Collator<T> {
    pub fn receive(&mut self, key: usize, item: T) {
        self.waiting.insert(key, item);
    }

    pub fn try_next(&mut self) -> Option<(usize, T)> {
        let entry = self.waiting.remove_entry(&self.next_key)?;
        self.next_key += 1;
        Some(entry)
    }

    /// Drain `receiver` and return everything in key order
    pub fn collate(receiver: Receiver<(usize, T)>) -> Vec<T> {
        let mut collator = Self::default();
        let mut result = Vec::new();
        for (key, item) in receiver.iter() {
            collator.receive(key, item);
            while let Some((_, item)) = collator.try_next() {
                result.push(item);
            }
        }
        if !collator.waiting.is_empty() {
            log::error!("{} results were never collated", collator.waiting.len());
        }
        result
    }
}

/// The shared state of one inference run over all trees
pub(crate) struct InferenceContext<'a> {
    pub graph: &'a EvidenceGraph,
    pub psm_sets: &'a IndexMap<String, ReportPSMSet>,
    pub settings: &'a InferenceSettings,
    set_of_psm: HashMap<PsmId, usize>,
    /// Protein filters that can be evaluated before ranks exist
    protein_filters: Vec<Filter>,
}

impl<'a> InferenceContext<'a> {
    pub fn new(
        graph: &'a EvidenceGraph,
        psm_sets: &'a IndexMap<String, ReportPSMSet>,
        settings: &'a InferenceSettings,
    ) -> Self {
        let mut set_of_psm = HashMap::new();
        for (i, set) in psm_sets.values().enumerate() {
            for psm in set.psms.iter() {
                set_of_psm.insert(psm.id, i);
            }
        }
        let protein_filters = settings
            .filters
            .iter()
            .filter(|f| f.kind != FilterKind::ProteinRank)
            .cloned()
            .collect();
        Self {
            graph,
            psm_sets,
            settings,
            set_of_psm,
            protein_filters,
        }
    }

    pub fn higher_score_is_better(&self) -> bool {
        self.settings.scoring.higher_is_better()
    }

    pub fn passes_protein_filters(&self, protein: &ReportProtein) -> bool {
        satisfies_filter_list(protein, COMBINED_FILE_ID, &self.protein_filters, self.graph)
    }

    /// The filtered report peptides of the direct peptides of `group`
    pub fn group_peptides(&self, group: GroupId) -> Vec<ReportPeptide> {
        let filters = &self.settings.filters;
        let mut result = Vec::new();
        for pep_id in self.graph.group(group).peptides.iter() {
            let peptide = self.graph.peptide(*pep_id);
            let mut by_id: IndexMap<String, ReportPeptide> = IndexMap::new();
            let mut seen = BTreeSet::new();
            for psm in peptide.psms.iter() {
                let Some(set_idx) = self.set_of_psm.get(psm).copied() else {
                    continue;
                };
                if !seen.insert(set_idx) {
                    continue;
                }
                let set = &self.psm_sets[set_idx];
                if !satisfies_filter_list(set, COMBINED_FILE_ID, filters, self.graph) {
                    continue;
                }
                let mods = if self.settings.consider_modifications {
                    set.psms
                        .first()
                        .map(|p| self.graph.psm(p.id).modification_string())
                } else {
                    None
                };
                let string_id = ReportPeptide::create_string_id(&peptide.sequence, mods.as_deref());
                by_id
                    .entry(string_id.clone())
                    .or_insert_with(|| {
                        ReportPeptide::new(
                            string_id,
                            peptide.sequence.clone(),
                            peptide.id,
                            peptide.accession_ids(),
                        )
                    })
                    .add_psm(PSMReportItem::Set(set.clone()));
            }
            result.extend(
                by_id
                    .into_values()
                    .filter(|p| satisfies_filter_list(p, COMBINED_FILE_ID, filters, self.graph)),
            );
        }
        result
    }

    /// One scored candidate per group carrying accessions, with the peptides of
    /// the group and all its descendants. Candidates explaining the same
    /// peptides are merged, and candidates failing the protein filters dropped.
    pub fn candidates(&self, tree: TreeId) -> Vec<ReportProtein> {
        let groups = self.graph.tree_groups(tree);
        let peptides: HashMap<GroupId, Vec<ReportPeptide>> = groups
            .iter()
            .filter(|g| self.graph.group(**g).has_peptides())
            .map(|g| (*g, self.group_peptides(*g)))
            .collect();

        let mut merged: IndexMap<Vec<String>, ReportProtein> = IndexMap::new();
        for group_id in groups.iter().copied() {
            let group = self.graph.group(group_id);
            if !group.has_accessions() {
                continue;
            }
            let mut protein = ReportProtein::new(0);
            for acc in group.accessions.iter() {
                protein.add_accession(*acc);
            }
            let explained = std::iter::once(group_id).chain(self.graph.peptide_children(group_id));
            for g in explained {
                if let Some(peps) = peptides.get(&g) {
                    for pep in peps.iter() {
                        protein.add_peptide(pep.clone());
                    }
                }
            }
            if protein.peptides.is_empty() {
                continue;
            }
            let key: Vec<String> = protein.peptides.iter().map(|p| p.string_id.clone()).collect();
            match merged.get_mut(&key) {
                Some(existing) => {
                    for acc in protein.accessions {
                        existing.add_accession(acc);
                    }
                }
                None => {
                    merged.insert(key, protein);
                }
            }
        }

        let mut candidates: Vec<ReportProtein> = merged.into_values().collect();
        self.settings.scoring.score_all(&mut candidates);
        candidates.retain(|c| self.passes_protein_filters(c));
        candidates.sort_by(|a, b| self.first_accession(a).cmp(self.first_accession(b)));
        for (i, c) in candidates.iter_mut().enumerate() {
            c.id = i;
        }
        candidates
    }

    pub fn first_accession(&self, protein: &ReportProtein) -> &str {
        protein
            .accessions
            .iter()
            .map(|a| self.graph.accession(*a).accession.as_str())
            .min()
            .unwrap_or("")
    }

    /// Compare protein scores, the better first
    pub fn compare_scores(&self, a: f64, b: f64) -> std::cmp::Ordering {
        score_ordering(a, b, self.higher_score_is_better())
    }

    fn infer_tree(&self, tree: TreeId) -> Vec<ReportProtein> {
        let candidates = self.candidates(tree);
        log::trace!("tree {tree} has {} candidates", candidates.len());
        match self.settings.method {
            InferenceMethod::OccamsRazor => occams_razor::infer(self, candidates),
            InferenceMethod::SpectrumExtractor => spectrum_extractor::infer(self, candidates),
            InferenceMethod::ReportAll => report_all::infer(self, candidates),
        }
    }
}

/// Attach every candidate whose peptides are all explained by a reported
/// protein as that protein's sub-protein
pub(crate) fn attach_sub_proteins(reported: &mut [ReportProtein], rest: Vec<ReportProtein>) {
    for candidate in rest {
        let peptides = candidate.peptide_ids();
        let mut attached = false;
        for protein in reported.iter_mut() {
            if peptides.is_subset(&protein.peptide_ids()) {
                protein.sub_proteins.push(candidate.clone());
                attached = true;
            }
        }
        if !attached {
            log::trace!("dropping candidate {} without reporting it", candidate.id);
        }
    }
}

/// Runs the configured inference over every tree of a graph
#[derive(Debug, Clone, Copy, Default)]
pub struct ProteinInference;

impl ProteinInference {
    fn _infer_trees(context: &InferenceContext<'_>, control: &InferenceControl) -> Vec<Option<Vec<ReportProtein>>> {
        let total = context.graph.tree_count();
        context
            .graph
            .trees()
            .map(|(tree, _)| {
                if control.is_cancelled() {
                    return None;
                }
                let result = context.infer_tree(tree);
                control.tree_done(total);
                Some(result)
            })
            .collect()
    }

    #[cfg(feature = "parallelism")]
    fn _infer_trees_parallel(
        context: &InferenceContext<'_>,
        control: &InferenceControl,
    ) -> Vec<Option<Vec<ReportProtein>>> {
        let total = context.graph.tree_count();
        let (sender, receiver) = std::sync::mpsc::channel();
        let trees: Vec<TreeId> = context.graph.trees().map(|(t, _)| t).collect();
        trees.par_iter().for_each_with(sender, |sender, tree| {
            let result = if control.is_cancelled() {
                None
            } else {
                let result = context.infer_tree(*tree);
                control.tree_done(total);
                Some(result)
            };
            if let Err(e) = sender.send((tree.index(), result)) {
                log::error!("failed to send the result of tree {tree}: {e}");
            }
        });
        Collator::collate(receiver)
    }

    /// Run the inference synchronously, reporting progress through `control`
    pub fn run(
        graph: &EvidenceGraph,
        psm_sets: &IndexMap<String, ReportPSMSet>,
        settings: &InferenceSettings,
        control: &InferenceControl,
    ) -> Result<Vec<ReportProtein>, InferenceError> {
        control.set_state(InferenceState::Running);
        log::info!(
            "starting {} on {} trees with {} PSM sets",
            settings.method.name(),
            graph.tree_count(),
            psm_sets.len()
        );
        if settings.strict_decoys && !psm_sets.values().any(|s| s.is_decoy) {
            control.set_state(InferenceState::Failed);
            return Err(InferenceError::NoDecoysFound);
        }

        let context = InferenceContext::new(graph, psm_sets, settings);

        #[cfg(not(feature = "parallelism"))]
        let results = Self::_infer_trees(&context, control);
        #[cfg(feature = "parallelism")]
        let results = if graph.tree_count() > 1 {
            Self::_infer_trees_parallel(&context, control)
        } else {
            Self::_infer_trees(&context, control)
        };

        if control.is_cancelled() || results.iter().any(|r| r.is_none()) {
            control.set_state(InferenceState::Failed);
            log::info!("inference cancelled");
            return Err(InferenceError::Cancelled);
        }

        let mut proteins: Vec<ReportProtein> = results.into_iter().flatten().flatten().collect();
        for (i, protein) in proteins.iter_mut().enumerate() {
            protein.id = i + 1;
        }
        // sub-proteins are numbered after all reported proteins
        let mut next_id = proteins.len() + 1;
        for sub in proteins.iter_mut().flat_map(|p| p.sub_proteins.iter_mut()) {
            sub.id = next_id;
            next_id += 1;
        }
        control.set_state(InferenceState::Completed);
        log::info!("inference reported {} proteins", proteins.len());
        Ok(proteins)
    }
}
