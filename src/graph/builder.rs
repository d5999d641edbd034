use std::collections::{BTreeMap, HashMap, VecDeque};

use indexmap::IndexMap;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

use super::entities::{
    Accession, AccessionId, AccessionOccurrence, FileId, Group, GroupId, InputFile, Peptide,
    PeptideId, PeptideSpectrumMatch, PsmId, TreeId,
};
use super::{EvidenceGraph, GraphInconsistency};

/// Collects the flat import results and assembles them into an [`EvidenceGraph`].
///
/// Accessions and peptides are deduplicated by their string form, spectra are
/// always appended.
#[derive(Debug, Default)]
pub struct EvidenceGraphBuilder {
    name: String,
    files: IndexMap<FileId, InputFile>,
    accessions: Vec<Accession>,
    accession_index: HashMap<String, AccessionId>,
    peptides: Vec<Peptide>,
    peptide_index: HashMap<String, PeptideId>,
    psms: Vec<PeptideSpectrumMatch>,
    inconsistencies: Vec<GraphInconsistency>,
}

/// One group node of a tree before it receives its final id
#[derive(Debug, Default, Clone)]
struct ProtoGroup {
    key: Vec<AccessionId>,
    accessions: Vec<AccessionId>,
    peptides: Vec<PeptideId>,
    parents: Vec<usize>,
}

impl EvidenceGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Register an input file, returning its id. File ids start at 1.
    pub fn add_input_file(
        &mut self,
        name: impl Into<String>,
        path: impl Into<String>,
        format: impl Into<String>,
    ) -> FileId {
        let id = self.files.len() as FileId + 1;
        self.files.insert(
            id,
            InputFile::new(id, name.into(), path.into(), format.into()),
        );
        id
    }

    /// Get or create the accession `accession`, filling in its sequence if one is
    /// given and none was known yet
    pub fn insert_accession(&mut self, accession: &str, db_sequence: Option<&str>) -> AccessionId {
        let id = match self.accession_index.get(accession) {
            Some(id) => *id,
            None => {
                let id = AccessionId(self.accessions.len());
                self.accessions
                    .push(Accession::new(id, accession.to_string()));
                self.accession_index.insert(accession.to_string(), id);
                id
            }
        };
        if let Some(seq) = db_sequence {
            let acc = &mut self.accessions[id.index()];
            if acc.db_sequence.is_none() && !seq.is_empty() {
                acc.db_sequence = Some(seq.to_string());
            }
        }
        id
    }

    pub fn get_accession(&self, accession: &str) -> Option<AccessionId> {
        self.accession_index.get(accession).copied()
    }

    pub fn add_accession_file(&mut self, accession: AccessionId, file: FileId) {
        if let Some(acc) = self.accessions.get_mut(accession.index()) {
            acc.add_file(file);
        }
    }

    /// Set the description of `accession` as reported by `file`. This also marks
    /// the accession as found in `file`.
    pub fn add_accession_description(
        &mut self,
        accession: AccessionId,
        file: FileId,
        description: impl Into<String>,
    ) {
        if let Some(acc) = self.accessions.get_mut(accession.index()) {
            acc.descriptions.insert(file, description.into());
            acc.add_file(file);
        }
    }

    pub fn add_search_database(&mut self, accession: AccessionId, database: impl Into<String>) {
        if let Some(acc) = self.accessions.get_mut(accession.index()) {
            let database = database.into();
            if !acc.search_databases.contains(&database) {
                acc.search_databases.push(database);
            }
        }
    }

    /// Get or create the peptide with `sequence`
    pub fn insert_peptide(&mut self, sequence: &str) -> PeptideId {
        match self.peptide_index.get(sequence) {
            Some(id) => *id,
            None => {
                let id = PeptideId(self.peptides.len());
                self.peptides.push(Peptide::new(id, sequence.to_string()));
                self.peptide_index.insert(sequence.to_string(), id);
                id
            }
        }
    }

    pub fn get_peptide(&self, sequence: &str) -> Option<PeptideId> {
        self.peptide_index.get(sequence).copied()
    }

    /// Record that `peptide` occurs in `accession` at `start..end`. Unknown ids are
    /// reported as a [`GraphInconsistency`] and the occurrence is dropped.
    pub fn add_occurrence(
        &mut self,
        peptide: PeptideId,
        accession: AccessionId,
        start: usize,
        end: usize,
    ) -> bool {
        if accession.index() >= self.accessions.len() {
            let sequence = self
                .peptides
                .get(peptide.index())
                .map(|p| p.sequence.clone())
                .unwrap_or_else(|| peptide.to_string());
            self.report(GraphInconsistency::DanglingAccession {
                peptide: sequence,
                accession: accession.to_string(),
            });
            return false;
        }
        match self.peptides.get_mut(peptide.index()) {
            Some(pep) => {
                let occurrence = AccessionOccurrence {
                    accession,
                    start,
                    end,
                };
                if !pep.occurrences.contains(&occurrence) {
                    pep.occurrences.push(occurrence);
                }
                true
            }
            None => {
                self.report(GraphInconsistency::DanglingReference {
                    owner: format!("accession {}", self.accessions[accession.index()].accession),
                    entity: "peptide",
                    reference: peptide.index(),
                });
                false
            }
        }
    }

    /// Add a spectrum match for `peptide`. A dangling peptide id is reported and
    /// the spectrum is not added.
    pub fn insert_psm(
        &mut self,
        peptide: PeptideId,
        mut psm: PeptideSpectrumMatch,
    ) -> Option<PsmId> {
        let id = PsmId(self.psms.len());
        match self.peptides.get_mut(peptide.index()) {
            Some(pep) => {
                psm.id = id;
                psm.peptide = peptide;
                if psm.sequence.is_empty() {
                    psm.sequence = pep.sequence.clone();
                }
                pep.psms.push(id);
                self.psms.push(psm);
                Some(id)
            }
            None => {
                self.report(GraphInconsistency::DanglingPeptide {
                    psm: id.index(),
                    peptide: peptide.to_string(),
                });
                None
            }
        }
    }

    pub fn accession_count(&self) -> usize {
        self.accessions.len()
    }

    pub fn peptide_count(&self) -> usize {
        self.peptides.len()
    }

    pub fn psm_count(&self) -> usize {
        self.psms.len()
    }

    fn report(&mut self, issue: GraphInconsistency) {
        log::warn!("{issue}");
        self.inconsistencies.push(issue);
    }

    /// Partition the accession-peptide graph into connected components, visited
    /// in ascending accession order
    fn build_clusters(&mut self) -> Vec<Vec<PeptideId>> {
        let mut acc_peps: Vec<Vec<PeptideId>> = vec![Vec::new(); self.accessions.len()];
        let mut orphans = Vec::new();
        for pep in self.peptides.iter() {
            let accessions = pep.accession_ids();
            if accessions.is_empty() {
                orphans.push(pep.sequence.clone());
            }
            for acc in accessions {
                acc_peps[acc.index()].push(pep.id);
            }
        }
        for sequence in orphans {
            self.report(GraphInconsistency::OrphanPeptide(sequence));
        }

        let mut accession_done = vec![false; self.accessions.len()];
        let mut peptide_done = vec![false; self.peptides.len()];
        let mut clusters = Vec::new();
        for start in 0..self.accessions.len() {
            if accession_done[start] || acc_peps[start].is_empty() {
                continue;
            }
            let mut cluster = Vec::new();
            let mut queue = VecDeque::new();
            accession_done[start] = true;
            queue.push_back(start);
            while let Some(acc) = queue.pop_front() {
                for pep in acc_peps[acc].iter() {
                    if peptide_done[pep.index()] {
                        continue;
                    }
                    peptide_done[pep.index()] = true;
                    cluster.push(*pep);
                    for next in self.peptides[pep.index()].accession_ids() {
                        if !accession_done[next.index()] {
                            accession_done[next.index()] = true;
                            queue.push_back(next.index());
                        }
                    }
                }
            }
            cluster.sort_unstable();
            clusters.push(cluster);
        }

        let ungrouped = self
            .accessions
            .iter()
            .filter(|a| acc_peps[a.id.index()].is_empty())
            .count();
        if ungrouped > 0 {
            log::debug!("{ungrouped} accessions have no peptides and are not grouped");
        }
        clusters
    }

    /// Fold one connected component into its group nodes.
    ///
    /// Node keys are the accession sets of peptides, `A(p)`, together with
    /// `X(a)`, the intersection of `A(p)` over the peptides of accession `a`.
    /// A node `Y` is a parent of `X` when `key(Y) ⊂ key(X)` with no node in
    /// between.
    fn build_tree_groups(peptides: &[Peptide], cluster: &[PeptideId]) -> Vec<ProtoGroup> {
        let mut nodes: BTreeMap<Vec<AccessionId>, ProtoGroup> = BTreeMap::new();
        let mut acc_keys: BTreeMap<AccessionId, Vec<AccessionId>> = BTreeMap::new();

        for pep_id in cluster {
            let key = peptides[pep_id.index()].accession_ids();
            for acc in key.iter() {
                acc_keys
                    .entry(*acc)
                    .and_modify(|current| *current = intersect(current, &key))
                    .or_insert_with(|| key.clone());
            }
            nodes
                .entry(key.clone())
                .or_insert_with(|| ProtoGroup {
                    key,
                    ..Default::default()
                })
                .peptides
                .push(*pep_id);
        }

        for (acc, key) in acc_keys {
            nodes
                .entry(key.clone())
                .or_insert_with(|| ProtoGroup {
                    key,
                    ..Default::default()
                })
                .accessions
                .push(acc);
        }

        let mut groups: Vec<ProtoGroup> = nodes.into_values().collect();
        groups.sort_by(|a, b| a.key.len().cmp(&b.key.len()).then_with(|| a.key.cmp(&b.key)));

        for j in 0..groups.len() {
            let candidates: Vec<usize> = (0..j)
                .filter(|i| {
                    groups[*i].key.len() < groups[j].key.len()
                        && is_subset(&groups[*i].key, &groups[j].key)
                })
                .collect();
            let parents: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|i| {
                    !candidates.iter().any(|k| {
                        k != i
                            && groups[*k].key.len() > groups[*i].key.len()
                            && is_subset(&groups[*i].key, &groups[*k].key)
                    })
                })
                .collect();
            groups[j].parents = parents;
        }
        groups
    }

    fn _build_all_tree_groups(
        peptides: &[Peptide],
        clusters: &[Vec<PeptideId>],
    ) -> Vec<Vec<ProtoGroup>> {
        clusters
            .iter()
            .map(|cluster| Self::build_tree_groups(peptides, cluster))
            .collect()
    }

    #[cfg(feature = "parallelism")]
    fn _build_all_tree_groups_parallel(
        peptides: &[Peptide],
        clusters: &[Vec<PeptideId>],
    ) -> Vec<Vec<ProtoGroup>> {
        clusters
            .par_iter()
            .map(|cluster| Self::build_tree_groups(peptides, cluster))
            .collect()
    }

    /// Cluster the collected evidence and assemble the final graph
    pub fn build(mut self) -> EvidenceGraph {
        log::info!(
            "building evidence graph from {} accessions, {} peptides and {} spectra",
            self.accessions.len(),
            self.peptides.len(),
            self.psms.len()
        );
        let unscored: Vec<usize> = self
            .psms
            .iter()
            .filter(|psm| psm.scores.is_empty())
            .map(|psm| psm.id.index())
            .collect();
        for psm in unscored {
            self.report(GraphInconsistency::UnscoredSpectrum(psm));
        }

        let clusters = self.build_clusters();
        log::info!("clusters sorted: {}", clusters.len());

        #[cfg(not(feature = "parallelism"))]
        let tree_groups = Self::_build_all_tree_groups(&self.peptides, &clusters);
        #[cfg(feature = "parallelism")]
        let tree_groups = if clusters.len() > 1 {
            Self::_build_all_tree_groups_parallel(&self.peptides, &clusters)
        } else {
            Self::_build_all_tree_groups(&self.peptides, &clusters)
        };

        let mut groups: Vec<Group> = Vec::new();
        let mut trees: Vec<Vec<GroupId>> = Vec::with_capacity(tree_groups.len());
        for (tree_idx, protos) in tree_groups.into_iter().enumerate() {
            let tree = TreeId(tree_idx);
            let offset = groups.len();
            let mut tree_members = Vec::with_capacity(protos.len());
            for (i, proto) in protos.iter().enumerate() {
                let id = GroupId(offset + i);
                let mut group = Group::new(id, tree);
                group.accessions = proto.accessions.clone();
                group.peptides = proto.peptides.clone();
                group.parents = proto.parents.iter().map(|p| GroupId(offset + p)).collect();
                for acc in proto.accessions.iter() {
                    self.accessions[acc.index()].group = Some(id);
                }
                for pep in proto.peptides.iter() {
                    self.peptides[pep.index()].group = Some(id);
                }
                tree_members.push(id);
                groups.push(group);
            }
            for i in 0..protos.len() {
                let id = GroupId(offset + i);
                let parents = groups[id.index()].parents.clone();
                for parent in parents {
                    groups[parent.index()].children.push(id);
                }
            }
            trees.push(tree_members);
        }
        for group in groups.iter_mut() {
            group.children.sort_unstable();
        }
        log::info!("{} groups in {} trees", groups.len(), trees.len());

        EvidenceGraph {
            name: self.name,
            files: self.files,
            accessions: self.accessions,
            peptides: self.peptides,
            psms: self.psms,
            groups,
            trees,
            inconsistencies: self.inconsistencies,
            accession_index: self.accession_index,
            peptide_index: self.peptide_index,
        }
    }
}

/// Whether the sorted slice `a` is contained in the sorted slice `b`
pub(crate) fn is_subset<T: Ord>(a: &[T], b: &[T]) -> bool {
    let mut it = b.iter();
    'outer: for x in a {
        for y in it.by_ref() {
            match y.cmp(x) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => continue 'outer,
                std::cmp::Ordering::Greater => return false,
            }
        }
        return false;
    }
    true
}

fn intersect<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    a.iter().copied().filter(|x| b.binary_search(x).is_ok()).collect()
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use super::*;
    use crate::test_data;

    #[test]
    fn test_is_subset() {
        assert!(is_subset(&[1, 3], &[1, 2, 3]));
        assert!(is_subset::<i32>(&[], &[1]));
        assert!(!is_subset(&[1, 4], &[1, 2, 3]));
        assert!(!is_subset(&[0], &[1, 2, 3]));
    }

    #[test_log::test]
    fn test_same_set_accessions_share_a_group() {
        let graph = test_data::small_graph();
        let p1 = graph.find_accession("P1").unwrap();
        let p4 = graph.find_accession("P4").unwrap();
        assert_eq!(p1.group, p4.group);
        let p2 = graph.find_accession("P2").unwrap();
        assert_ne!(p1.group, p2.group);
    }

    #[test_log::test]
    fn test_clustering_partitions() {
        let graph = test_data::small_graph();
        assert_eq!(graph.tree_count(), 3);

        let mut seen = BTreeSet::new();
        for (tree, groups) in graph.trees() {
            for g in groups {
                assert_eq!(graph.group(*g).tree, tree);
                assert!(seen.insert(*g));
            }
        }
        assert_eq!(seen.len(), graph.groups().len());

        // groups connected through peptides share their tree, others do not
        for pep in graph.peptides() {
            let trees: BTreeSet<TreeId> = pep
                .accession_ids()
                .into_iter()
                .map(|a| graph.group(graph.accession(a).group.unwrap()).tree)
                .collect();
            assert_eq!(trees.len(), 1);
            assert_eq!(
                graph.group(pep.group.unwrap()).tree,
                *trees.iter().next().unwrap()
            );
        }
        let t_p1 = graph.group(graph.find_accession("P1").unwrap().group.unwrap()).tree;
        let t_p6 = graph.group(graph.find_accession("P6").unwrap().group.unwrap()).tree;
        assert_ne!(t_p1, t_p6);
    }

    #[test_log::test]
    fn test_subset_soundness_and_maximality() {
        let graph = test_data::random_graph(7, 40, 120);
        for group in graph.groups() {
            let own = graph.all_peptides(group.id);
            for parent in group.parents.iter() {
                assert!(graph.group(*parent).children.contains(&group.id));
                let theirs = graph.all_peptides(*parent);
                assert!(own.is_subset(&theirs));
                assert_eq!(graph.group(*parent).tree, group.tree);
            }
            for child in group.children.iter() {
                assert!(graph.group(*child).parents.contains(&group.id));
            }
        }
        // every strict superset relation among explained peptide sets is
        // reachable through parent edges
        for (_, members) in graph.trees() {
            for a in members {
                let pa = graph.all_peptides(*a);
                let ancestors = graph.all_parents(*a);
                for b in members {
                    if a == b || !graph.group(*b).has_accessions() {
                        continue;
                    }
                    let pb = graph.all_peptides(*b);
                    let ka = graph.all_accessions(*a);
                    let kb = graph.all_accessions(*b);
                    if kb.is_subset(&ka) && kb != ka {
                        assert!(pa.is_subset(&pb));
                        assert!(ancestors.contains(b));
                    }
                }
            }
        }
        // acyclic
        for group in graph.groups() {
            assert!(!graph.all_children(group.id).contains(&group.id));
        }
    }

    #[test_log::test]
    fn test_accession_explains_its_group_peptides() {
        let graph = test_data::random_graph(11, 30, 90);
        for acc in graph.accessions() {
            if let Some(group) = acc.group {
                let explained = graph.all_peptides(group);
                let direct: BTreeSet<PeptideId> = graph
                    .peptides()
                    .iter()
                    .filter(|p| p.accession_ids().contains(&acc.id))
                    .map(|p| p.id)
                    .collect();
                assert_eq!(explained, direct);
                assert!(graph.all_accessions(group).contains(&acc.id));
            }
        }
    }

    #[test_log::test]
    fn test_dangling_references_are_dropped() {
        let mut builder = EvidenceGraphBuilder::new("dangling");
        let file = builder.add_input_file("a", "a.mzid", "mzid");
        let acc = builder.insert_accession("P1", None);
        let pep = builder.insert_peptide("PEPTIDEK");
        assert!(builder.add_occurrence(pep, acc, 0, 8));
        assert!(!builder.add_occurrence(pep, AccessionId(42), 0, 8));
        let orphan = builder.insert_peptide("LONELYK");
        assert!(builder
            .insert_psm(PeptideId(99), PeptideSpectrumMatch::new(file, 2, 500.0, 0.0, "X".into()))
            .is_none());
        builder.insert_psm(orphan, PeptideSpectrumMatch::new(file, 2, 400.0, 0.0, String::new()));

        let graph = builder.build();
        assert_eq!(graph.tree_count(), 1);
        assert_eq!(graph.peptide(pep).occurrences.len(), 1);
        assert!(graph.peptide(orphan).group.is_none());
        assert_eq!(graph.psms().len(), 1);
        assert_eq!(graph.psms()[0].sequence, "LONELYK");
        assert!(graph.validate().is_err());
        assert!(graph
            .inconsistencies()
            .iter()
            .any(|e| matches!(e, GraphInconsistency::OrphanPeptide(s) if s == "LONELYK")));
        assert!(graph
            .inconsistencies()
            .iter()
            .any(|e| matches!(e, GraphInconsistency::DanglingAccession { .. })));
    }
}
