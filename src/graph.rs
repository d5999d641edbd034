//! The protein-peptide-spectrum evidence graph.
//!
//! Entities are stored in index arenas and refer to one another by id. The
//! [`EvidenceGraphBuilder`] ingests the flat import results and folds each
//! connected component ("tree") of the protein-peptide bipartite graph into a
//! DAG of [`Group`]s.
use std::collections::{BTreeSet, HashMap};

use indexmap::IndexMap;
use thiserror::Error;

pub mod builder;
pub mod document;
pub mod entities;

pub use builder::EvidenceGraphBuilder;
pub use document::GraphDocument;
pub use entities::{
    Accession, AccessionId, AccessionOccurrence, FileId, Group, GroupId, InputFile, Modification,
    Peptide, PeptideId, PeptideSpectrumMatch, PsmId, TreeId, COMBINED_FILE_ID,
};

/// A structural problem found while assembling the evidence graph. These are
/// reported and the offending link is dropped, they never abort construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphInconsistency {
    #[error("peptide {peptide} references accession {accession} which is not part of the import")]
    DanglingAccession { peptide: String, accession: String },
    #[error("spectrum {psm} references peptide {peptide} which is not part of the import")]
    DanglingPeptide { psm: usize, peptide: String },
    #[error("{owner} references the missing {entity} {reference}")]
    DanglingReference {
        owner: String,
        entity: &'static str,
        reference: usize,
    },
    #[error("peptide {0} does not occur in any accession")]
    OrphanPeptide(String),
    #[error("the spectrum {0} carries no scores")]
    UnscoredSpectrum(usize),
    #[error("the edge from group {parent} to group {child} would create a cycle")]
    CyclicGroupEdge { parent: usize, child: usize },
    #[error("group {child} claims to be a subset of group {parent} but is not")]
    SubsetViolation { parent: usize, child: usize },
    #[error("groups {0} and {1} are linked but belong to different trees")]
    CrossTreeEdge(usize, usize),
}

/// The clustered evidence graph.
///
/// Groups are immutable once built. All queries that walk the DAG return
/// ids in ascending order so downstream consumers are deterministic.
#[derive(Debug, Default, Clone)]
pub struct EvidenceGraph {
    pub(crate) name: String,
    pub(crate) files: IndexMap<FileId, InputFile>,
    pub(crate) accessions: Vec<Accession>,
    pub(crate) peptides: Vec<Peptide>,
    pub(crate) psms: Vec<PeptideSpectrumMatch>,
    pub(crate) groups: Vec<Group>,
    pub(crate) trees: Vec<Vec<GroupId>>,
    pub(crate) inconsistencies: Vec<GraphInconsistency>,
    pub(crate) accession_index: HashMap<String, AccessionId>,
    pub(crate) peptide_index: HashMap<String, PeptideId>,
}

impl EvidenceGraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> impl Iterator<Item = &InputFile> {
        self.files.values()
    }

    pub fn file(&self, id: FileId) -> Option<&InputFile> {
        self.files.get(&id)
    }

    #[inline]
    pub fn accession(&self, id: AccessionId) -> &Accession {
        &self.accessions[id.index()]
    }

    #[inline]
    pub fn peptide(&self, id: PeptideId) -> &Peptide {
        &self.peptides[id.index()]
    }

    #[inline]
    pub fn psm(&self, id: PsmId) -> &PeptideSpectrumMatch {
        &self.psms[id.index()]
    }

    #[inline]
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.index()]
    }

    pub fn accessions(&self) -> &[Accession] {
        &self.accessions
    }

    pub fn peptides(&self) -> &[Peptide] {
        &self.peptides
    }

    pub fn psms(&self) -> &[PeptideSpectrumMatch] {
        &self.psms
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn find_accession(&self, accession: &str) -> Option<&Accession> {
        self.accession_index
            .get(accession)
            .map(|id| self.accession(*id))
    }

    pub fn find_peptide(&self, sequence: &str) -> Option<&Peptide> {
        self.peptide_index
            .get(sequence)
            .map(|id| self.peptide(*id))
    }

    /// The number of connected components
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> impl Iterator<Item = (TreeId, &[GroupId])> {
        self.trees
            .iter()
            .enumerate()
            .map(|(i, groups)| (TreeId(i), groups.as_slice()))
    }

    pub fn tree_groups(&self, tree: TreeId) -> &[GroupId] {
        self.trees
            .get(tree.index())
            .map(|t| t.as_slice())
            .unwrap_or(&[])
    }

    /// Every problem recorded while the graph was assembled
    pub fn inconsistencies(&self) -> &[GraphInconsistency] {
        &self.inconsistencies
    }

    /// Fail with the first recorded inconsistency, if any
    pub fn validate(&self) -> Result<(), GraphInconsistency> {
        match self.inconsistencies.first() {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// All descendants of `group`
    pub fn all_children(&self, group: GroupId) -> BTreeSet<GroupId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<GroupId> = self.group(group).children.clone();
        while let Some(g) = stack.pop() {
            if seen.insert(g) {
                stack.extend(self.group(g).children.iter().copied());
            }
        }
        seen
    }

    /// All ancestors of `group`
    pub fn all_parents(&self, group: GroupId) -> BTreeSet<GroupId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<GroupId> = self.group(group).parents.clone();
        while let Some(g) = stack.pop() {
            if seen.insert(g) {
                stack.extend(self.group(g).parents.iter().copied());
            }
        }
        seen
    }

    /// The descendants of `group` which directly hold peptides
    pub fn peptide_children(&self, group: GroupId) -> BTreeSet<GroupId> {
        self.all_children(group)
            .into_iter()
            .filter(|g| self.group(*g).has_peptides())
            .collect()
    }

    /// The peptides explained by `group`: its own and those of every descendant
    pub fn all_peptides(&self, group: GroupId) -> BTreeSet<PeptideId> {
        let mut peptides: BTreeSet<PeptideId> =
            self.group(group).peptides.iter().copied().collect();
        for child in self.peptide_children(group) {
            peptides.extend(self.group(child).peptides.iter().copied());
        }
        peptides
    }

    /// The accessions that explain the peptides of `group`: its own and those
    /// of every ancestor
    pub fn all_accessions(&self, group: GroupId) -> BTreeSet<AccessionId> {
        let mut accessions: BTreeSet<AccessionId> =
            self.group(group).accessions.iter().copied().collect();
        for parent in self.all_parents(group) {
            accessions.extend(self.group(parent).accessions.iter().copied());
        }
        accessions
    }

    /// The accessions `peptide` occurs in
    pub fn peptide_accessions(&self, peptide: PeptideId) -> Vec<AccessionId> {
        self.peptide(peptide).accession_ids()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data;

    #[test_log::test]
    fn test_queries() {
        let graph = test_data::small_graph();
        let acc = graph.find_accession("P1").unwrap();
        let group = acc.group.unwrap();
        let peptides: Vec<&str> = graph
            .all_peptides(group)
            .into_iter()
            .map(|p| graph.peptide(p).sequence.as_str())
            .collect();
        assert_eq!(peptides, vec!["AAAK", "CCCK", "DDDK"]);
        assert!(graph.validate().is_ok());
        assert!(graph.file(1).is_some());
        assert!(graph.file(COMBINED_FILE_ID).is_none());
    }
}
