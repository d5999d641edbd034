//! A flat, serializable form of the [`EvidenceGraph`].
//!
//! Entities refer to each other by their stored ids. When a document is read
//! back, those ids are mapped onto fresh arena positions and any reference
//! that cannot be resolved is dropped and recorded as a [`GraphInconsistency`].
use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use super::entities::{
    Accession, AccessionId, FileId, Group, GroupId, InputFile, Peptide, PeptideId,
    PeptideSpectrumMatch, PsmId, TreeId,
};
use super::{EvidenceGraph, GraphInconsistency};

/// A persisted group node. Parents are implied by the child references.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupRecord {
    pub id: usize,
    pub tree: usize,
    pub accessions: Vec<usize>,
    pub peptides: Vec<usize>,
    pub children: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GraphDocument {
    pub name: String,
    pub created: DateTime<Utc>,
    pub files: Vec<InputFile>,
    pub accessions: Vec<Accession>,
    pub peptides: Vec<Peptide>,
    pub psms: Vec<PeptideSpectrumMatch>,
    pub groups: Vec<GroupRecord>,
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self {
            name: String::new(),
            created: Utc::now(),
            files: Vec::new(),
            accessions: Vec::new(),
            peptides: Vec::new(),
            psms: Vec::new(),
            groups: Vec::new(),
        }
    }
}

#[cfg(feature = "serde")]
impl GraphDocument {
    pub fn to_writer<W: std::io::Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}

/// Tracks the problems found while resolving a document
#[derive(Debug, Default)]
struct Resolver {
    inconsistencies: Vec<GraphInconsistency>,
}

impl Resolver {
    fn report(&mut self, issue: GraphInconsistency) {
        log::warn!("{issue}");
        self.inconsistencies.push(issue);
    }
}

fn id_map(ids: impl Iterator<Item = usize>) -> HashMap<usize, usize> {
    ids.enumerate().map(|(pos, id)| (id, pos)).collect()
}

impl EvidenceGraph {
    /// Rebuild a graph from a persisted document, trusting its stored groups
    pub fn from_document(document: GraphDocument) -> Self {
        let mut resolver = Resolver::default();

        let files: IndexMap<FileId, InputFile> =
            document.files.into_iter().map(|f| (f.id, f)).collect();

        let acc_map = id_map(document.accessions.iter().map(|a| a.id.index()));
        let pep_map = id_map(document.peptides.iter().map(|p| p.id.index()));
        let group_map = id_map(document.groups.iter().map(|g| g.id));

        let mut accessions: Vec<Accession> = document
            .accessions
            .into_iter()
            .enumerate()
            .map(|(pos, mut acc)| {
                acc.id = AccessionId(pos);
                acc.group = None;
                acc
            })
            .collect();

        let mut peptides: Vec<Peptide> = Vec::with_capacity(document.peptides.len());
        for (pos, mut pep) in document.peptides.into_iter().enumerate() {
            pep.id = PeptideId(pos);
            pep.group = None;
            pep.psms.clear();
            let mut occurrences = Vec::with_capacity(pep.occurrences.len());
            for mut occ in pep.occurrences.drain(..) {
                match acc_map.get(&occ.accession.index()) {
                    Some(p) => {
                        occ.accession = AccessionId(*p);
                        occurrences.push(occ);
                    }
                    None => resolver.report(GraphInconsistency::DanglingAccession {
                        peptide: pep.sequence.clone(),
                        accession: occ.accession.to_string(),
                    }),
                }
            }
            pep.occurrences = occurrences;
            peptides.push(pep);
        }

        let mut psms: Vec<PeptideSpectrumMatch> = Vec::with_capacity(document.psms.len());
        for mut psm in document.psms {
            match pep_map.get(&psm.peptide.index()) {
                Some(p) => {
                    let id = PsmId(psms.len());
                    psm.id = id;
                    psm.peptide = PeptideId(*p);
                    peptides[*p].psms.push(id);
                    psms.push(psm);
                }
                None => resolver.report(GraphInconsistency::DanglingPeptide {
                    psm: psm.id.index(),
                    peptide: psm.peptide.to_string(),
                }),
            }
        }

        // tree ids are renumbered by their first appearance in stored order
        let mut tree_map: BTreeMap<usize, usize> = BTreeMap::new();
        for record in document.groups.iter() {
            let next = tree_map.len();
            tree_map.entry(record.tree).or_insert(next);
        }

        let mut groups: Vec<Group> = Vec::with_capacity(document.groups.len());
        let mut trees: Vec<Vec<GroupId>> = vec![Vec::new(); tree_map.len()];
        for (pos, record) in document.groups.iter().enumerate() {
            let id = GroupId(pos);
            let tree = TreeId(tree_map[&record.tree]);
            let mut group = Group::new(id, tree);
            for acc in record.accessions.iter() {
                match acc_map.get(acc) {
                    Some(p) => {
                        group.accessions.push(AccessionId(*p));
                        accessions[*p].group = Some(id);
                    }
                    None => resolver.report(GraphInconsistency::DanglingReference {
                        owner: format!("group {}", record.id),
                        entity: "accession",
                        reference: *acc,
                    }),
                }
            }
            for pep in record.peptides.iter() {
                match pep_map.get(pep) {
                    Some(p) => {
                        group.peptides.push(PeptideId(*p));
                        peptides[*p].group = Some(id);
                    }
                    None => resolver.report(GraphInconsistency::DanglingReference {
                        owner: format!("group {}", record.id),
                        entity: "peptide",
                        reference: *pep,
                    }),
                }
            }
            trees[tree.index()].push(id);
            groups.push(group);
        }

        for (pos, record) in document.groups.iter().enumerate() {
            for child in record.children.iter() {
                let Some(child_pos) = group_map.get(child).copied() else {
                    resolver.report(GraphInconsistency::DanglingReference {
                        owner: format!("group {}", record.id),
                        entity: "group",
                        reference: *child,
                    });
                    continue;
                };
                if groups[pos].tree != groups[child_pos].tree {
                    resolver.report(GraphInconsistency::CrossTreeEdge(record.id, *child));
                    continue;
                }
                if child_pos == pos || reaches(&groups, GroupId(child_pos), GroupId(pos)) {
                    resolver.report(GraphInconsistency::CyclicGroupEdge {
                        parent: record.id,
                        child: *child,
                    });
                    continue;
                }
                if !explains(&groups, &peptides, GroupId(pos), GroupId(child_pos)) {
                    resolver.report(GraphInconsistency::SubsetViolation {
                        parent: record.id,
                        child: *child,
                    });
                    continue;
                }
                if !groups[pos].children.contains(&GroupId(child_pos)) {
                    groups[pos].children.push(GroupId(child_pos));
                    groups[child_pos].parents.push(GroupId(pos));
                }
            }
        }
        for group in groups.iter_mut() {
            group.children.sort_unstable();
            group.parents.sort_unstable();
        }

        let accession_index = accessions
            .iter()
            .map(|a| (a.accession.clone(), a.id))
            .collect();
        let peptide_index = peptides
            .iter()
            .map(|p| (p.sequence.clone(), p.id))
            .collect();

        log::debug!(
            "read graph document {} with {} groups, {} problems",
            document.name,
            groups.len(),
            resolver.inconsistencies.len()
        );

        EvidenceGraph {
            name: document.name,
            files,
            accessions,
            peptides,
            psms,
            groups,
            trees,
            inconsistencies: resolver.inconsistencies,
            accession_index,
            peptide_index,
        }
    }

    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            name: self.name.clone(),
            created: Utc::now(),
            files: self.files.values().cloned().collect(),
            accessions: self.accessions.clone(),
            peptides: self.peptides.clone(),
            psms: self.psms.clone(),
            groups: self
                .groups
                .iter()
                .map(|g| GroupRecord {
                    id: g.id.index(),
                    tree: g.tree.index(),
                    accessions: g.accessions.iter().map(|a| a.index()).collect(),
                    peptides: g.peptides.iter().map(|p| p.index()).collect(),
                    children: g.children.iter().map(|c| c.index()).collect(),
                })
                .collect(),
        }
    }
}

/// Whether `target` can be reached from `start` along child edges
fn reaches(groups: &[Group], start: GroupId, target: GroupId) -> bool {
    let mut seen = BTreeSet::new();
    let mut stack = vec![start];
    while let Some(g) = stack.pop() {
        if g == target {
            return true;
        }
        if seen.insert(g) {
            stack.extend(groups[g.index()].children.iter().copied());
        }
    }
    false
}

/// Every direct peptide of `child` must occur in every direct accession of
/// `parent`
fn explains(groups: &[Group], peptides: &[Peptide], parent: GroupId, child: GroupId) -> bool {
    let parent_accessions = &groups[parent.index()].accessions;
    groups[child.index()].peptides.iter().all(|pep| {
        let accessions = peptides[pep.index()].accession_ids();
        parent_accessions
            .iter()
            .all(|acc| accessions.binary_search(acc).is_ok())
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data;

    #[test_log::test]
    fn test_document_round_trip_in_memory() {
        let graph = test_data::small_graph();
        let restored = EvidenceGraph::from_document(graph.to_document());
        assert!(restored.validate().is_ok());
        assert_eq!(restored.groups(), graph.groups());
        assert_eq!(restored.tree_count(), graph.tree_count());
        assert_eq!(restored.psms().len(), graph.psms().len());
        let p1 = restored.find_accession("P1").unwrap();
        assert_eq!(p1.group, graph.find_accession("P1").unwrap().group);
    }

    #[test_log::test]
    fn test_cycles_and_dangling_edges_are_dropped() {
        let graph = test_data::small_graph();
        let mut document = graph.to_document();
        let (parent, child) = document
            .groups
            .iter()
            .find_map(|g| g.children.first().map(|c| (g.id, *c)))
            .unwrap();
        // close a cycle and point at a group that does not exist
        let child_record = document.groups.iter_mut().find(|g| g.id == child).unwrap();
        child_record.children.push(parent);
        child_record.children.push(9999);
        document.peptides[0].occurrences[0].accession = AccessionId(777);

        let restored = EvidenceGraph::from_document(document);
        let issues = restored.inconsistencies();
        assert!(issues
            .iter()
            .any(|e| matches!(e, GraphInconsistency::CyclicGroupEdge { .. })));
        assert!(issues.iter().any(|e| matches!(
            e,
            GraphInconsistency::DanglingReference {
                entity: "group",
                reference: 9999,
                ..
            }
        )));
        assert!(issues
            .iter()
            .any(|e| matches!(e, GraphInconsistency::DanglingAccession { .. })));
        for group in restored.groups() {
            assert!(!restored.all_children(group.id).contains(&group.id));
        }
    }

    #[cfg(feature = "serde")]
    #[test_log::test]
    fn test_document_file_round_trip() -> std::io::Result<()> {
        let graph = test_data::small_graph();
        let tmpdir = tempfile::tempdir()?;
        let path = tmpdir.path().join("graph.json");
        let handle = std::fs::File::create(&path)?;
        graph.to_document().to_writer(std::io::BufWriter::new(handle))?;

        let handle = std::fs::File::open(&path)?;
        let document = GraphDocument::from_reader(std::io::BufReader::new(handle))?;
        let restored = EvidenceGraph::from_document(document);
        assert_eq!(restored.groups(), graph.groups());
        assert_eq!(restored.accessions(), graph.accessions());
        Ok(())
    }
}
