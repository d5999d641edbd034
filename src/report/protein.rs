use std::collections::BTreeSet;

use regex::Regex;

use crate::graph::{AccessionId, EvidenceGraph, FileId, Modification};
use crate::score::{DecoyStrategy, FDRComputable, FDRValues};

use super::peptide::ReportPeptide;

/// One inferred protein, or a group of indistinguishable proteins
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReportProtein {
    pub id: usize,
    pub accessions: Vec<AccessionId>,
    pub peptides: Vec<ReportPeptide>,
    /// Proteins whose peptides are all explained by this one
    pub sub_proteins: Vec<ReportProtein>,
    pub score: f64,
    pub rank: Option<usize>,
    pub is_decoy: bool,
    pub fdr: FDRValues,
}

impl ReportProtein {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            accessions: Vec::new(),
            peptides: Vec::new(),
            sub_proteins: Vec::new(),
            score: f64::NAN,
            rank: None,
            is_decoy: false,
            fdr: FDRValues::default(),
        }
    }

    pub fn add_accession(&mut self, accession: AccessionId) {
        if let Err(pos) = self.accessions.binary_search(&accession) {
            self.accessions.insert(pos, accession);
        }
    }

    /// Add `peptide`, keeping the peptides ordered by their string id
    pub fn add_peptide(&mut self, peptide: ReportPeptide) {
        match self
            .peptides
            .binary_search_by(|p| p.string_id.as_str().cmp(peptide.string_id.as_str()))
        {
            Ok(pos) => self.peptides[pos] = peptide,
            Err(pos) => self.peptides.insert(pos, peptide),
        }
    }

    /// The accession that represents this protein
    pub fn representative(&self) -> Option<AccessionId> {
        self.accessions.first().copied()
    }

    pub fn peptide_ids(&self) -> BTreeSet<&str> {
        self.peptides.iter().map(|p| p.string_id.as_str()).collect()
    }

    pub fn nr_peptides(&self) -> usize {
        self.peptides.len()
    }

    pub fn nr_psms(&self) -> usize {
        self.peptides.iter().map(|p| p.nr_psms()).sum()
    }

    pub fn nr_spectra(&self) -> usize {
        self.peptides
            .iter()
            .flat_map(|p| p.spectrum_keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn files(&self) -> BTreeSet<FileId> {
        self.peptides.iter().flat_map(|p| p.files()).collect()
    }

    pub fn modifications<'a>(&self, graph: &'a EvidenceGraph) -> Vec<&'a Modification> {
        self.peptides
            .iter()
            .flat_map(|p| p.modifications(graph))
            .collect()
    }

    /// Peptides with at least one spectrum reported as unique to one protein
    pub fn nr_unique_peptides(&self, graph: &EvidenceGraph) -> usize {
        self.peptides
            .iter()
            .filter(|p| p.psm_ids().any(|id| graph.psm(id).is_unique.unwrap_or(false)))
            .count()
    }

    /// Peptides which occur in exactly the accessions of this protein
    pub fn nr_group_unique_peptides(&self) -> usize {
        self.peptides
            .iter()
            .filter(|p| p.accessions == self.accessions)
            .count()
    }

    /// The fraction of the database sequence of `accession` covered by this
    /// protein's peptides, NaN without a sequence
    pub fn coverage(&self, accession: AccessionId, graph: &EvidenceGraph) -> f64 {
        let length = match graph.accession(accession).db_sequence.as_ref() {
            Some(seq) if !seq.is_empty() => seq.len(),
            _ => return f64::NAN,
        };
        let mut covered = vec![false; length];
        for pep in self.peptides.iter() {
            for occ in graph.peptide(pep.peptide).occurrences.iter() {
                if occ.accession != accession || occ.start == 0 {
                    continue;
                }
                // occurrences are 1-based and inclusive
                let start = occ.start - 1;
                let end = occ.end.min(length);
                for c in covered[start.min(end)..end].iter_mut() {
                    *c = true;
                }
            }
        }
        covered.iter().filter(|c| **c).count() as f64 / length as f64
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
                let mut psms = self.peptides.iter().flat_map(|p| p.psms.iter().flat_map(|i| i.psms()));
                let mut any = false;
                let all_decoy = psms.all(|p| {
                    any = true;
                    p.is_decoy
                });
                any && all_decoy
            }
        };
    }
}

impl FDRComputable for ReportProtein {
    fn score_value(&self, short_name: &str) -> f64 {
        match short_name {
            "protein_score" => self.score,
            "protein_q_value" => self.fdr.q_value,
            "protein_fdr_score" => self.fdr.fdr_score,
            _ => f64::NAN,
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
