//! Report the smallest set of proteins explaining all peptides of a tree.
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::report::ReportProtein;

use super::{attach_sub_proteins, InferenceContext};

/// The peptides of each candidate and how the candidates relate
struct Relations {
    peptides: Vec<BTreeSet<String>>,
    is_sub_protein: Vec<bool>,
    intersects: Vec<bool>,
}

impl Relations {
    fn new(candidates: &[ReportProtein]) -> Self {
        let peptides: Vec<BTreeSet<String>> = candidates
            .iter()
            .map(|c| c.peptide_ids().into_iter().map(String::from).collect())
            .collect();
        let n = peptides.len();
        let mut is_sub_protein = vec![false; n];
        let mut intersects = vec![false; n];
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let (a, b) = (&peptides[i], &peptides[j]);
                if a.len() < b.len() && a.is_subset(b) {
                    is_sub_protein[i] = true;
                } else if !a.is_subset(b) && !b.is_subset(a) && !a.is_disjoint(b) {
                    intersects[i] = true;
                }
            }
        }
        Self {
            peptides,
            is_sub_protein,
            intersects,
        }
    }
}

pub(crate) fn infer(context: &InferenceContext<'_>, candidates: Vec<ReportProtein>) -> Vec<ReportProtein> {
    let relations = Relations::new(&candidates);
    let mut explained: BTreeSet<String> = BTreeSet::new();
    let mut reported_idx: Vec<usize> = Vec::new();
    let mut pool: Vec<usize> = Vec::new();

    for i in 0..candidates.len() {
        if relations.is_sub_protein[i] {
            continue;
        }
        if relations.intersects[i] {
            pool.push(i);
        } else {
            explained.extend(relations.peptides[i].iter().cloned());
            reported_idx.push(i);
        }
    }

    loop {
        let gains: Vec<(usize, BTreeSet<&String>)> = pool
            .iter()
            .map(|i| (*i, relations.peptides[*i].difference(&explained).collect()))
            .collect();
        let best = gains
            .iter()
            .filter(|(_, new)| !new.is_empty())
            .min_by(|(a, new_a), (b, new_b)| {
                new_b
                    .len()
                    .cmp(&new_a.len())
                    .then_with(|| context.compare_scores(candidates[*a].score, candidates[*b].score))
                    .then_with(|| {
                        context
                            .first_accession(&candidates[*a])
                            .cmp(context.first_accession(&candidates[*b]))
                    })
                    .then_with(|| candidates[*a].id.cmp(&candidates[*b].id))
            });
        let Some((best, best_new)) = best else {
            break;
        };
        let best_score = candidates[*best].score;
        let selected: Vec<usize> = gains
            .iter()
            .filter(|(i, new)| {
                i == best
                    || (new == best_new
                        && context.compare_scores(candidates[*i].score, best_score) == Ordering::Equal)
            })
            .map(|(i, _)| *i)
            .collect();
        log::trace!(
            "selecting {:?}, explaining {} new peptides",
            selected,
            best_new.len()
        );
        for i in selected.iter() {
            explained.extend(relations.peptides[*i].iter().cloned());
            reported_idx.push(*i);
        }
        pool.retain(|i| !selected.contains(i));
    }

    let mut reported = Vec::with_capacity(reported_idx.len());
    let mut rest = Vec::new();
    for (i, candidate) in candidates.into_iter().enumerate() {
        if reported_idx.contains(&i) {
            reported.push((i, candidate));
        } else {
            rest.push(candidate);
        }
    }
    reported.sort_by_key(|(i, _)| reported_idx.iter().position(|r| r == i));
    let mut reported: Vec<ReportProtein> = reported.into_iter().map(|(_, c)| c).collect();
    attach_sub_proteins(&mut reported, rest);
    reported
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::EvidenceGraph;
    use crate::inference::test::{assert_subsets_only_below, combined_sets};
    use crate::inference::{InferenceControl, InferenceSettings, ProteinInference};
    use crate::test_data;

    fn check_minimal(graph: &EvidenceGraph) {
        let sets = combined_sets(graph);
        let settings = InferenceSettings::default();
        let context = InferenceContext::new(graph, &sets, &settings);
        let mut all_candidate_peptides = BTreeSet::new();
        for (tree, _) in graph.trees() {
            for c in context.candidates(tree) {
                all_candidate_peptides.extend(c.peptide_ids().into_iter().map(String::from));
            }
        }

        let control = InferenceControl::default();
        let proteins = ProteinInference::run(graph, &sets, &settings, &control).unwrap();
        assert_eq!(control.progress(), 100);

        let mut explained: BTreeSet<String> = BTreeSet::new();
        let mut last_gain: Option<BTreeSet<String>> = None;
        for protein in proteins.iter() {
            let peptides: BTreeSet<String> = protein.peptide_ids().into_iter().map(String::from).collect();
            let gain: BTreeSet<String> = peptides.difference(&explained).cloned().collect();
            if gain.is_empty() {
                // reported together with an equivalent protein
                assert!(last_gain.as_ref().is_some_and(|g| g.is_subset(&peptides)));
            } else {
                last_gain = Some(gain);
            }
            explained.extend(peptides);
            for sub in protein.sub_proteins.iter() {
                assert!(sub.peptide_ids().is_subset(&protein.peptide_ids()));
            }
        }
        assert_eq!(explained, all_candidate_peptides);
    }

    #[test_log::test]
    fn test_small_graph() {
        let graph = test_data::small_graph();
        check_minimal(&graph);
        let sets = combined_sets(&graph);
        let proteins =
            ProteinInference::run(&graph, &sets, &InferenceSettings::default(), &InferenceControl::default())
                .unwrap();
        let ids: Vec<usize> = proteins.iter().map(|p| p.id).collect();
        assert_eq!(ids, (1..=proteins.len()).collect::<Vec<_>>());
        let p1 = graph.find_accession("P1").unwrap().id;
        let p4 = graph.find_accession("P4").unwrap().id;
        let protein = proteins.iter().find(|p| p.accessions.contains(&p1)).unwrap();
        assert!(protein.accessions.contains(&p4));
        assert_subsets_only_below(&graph, &proteins);
    }

    #[test_log::test]
    fn test_random_graphs() {
        for seed in [3, 17, 42] {
            let graph = test_data::random_graph(seed, 25, 80);
            check_minimal(&graph);
        }
    }

    #[test_log::test]
    fn test_deterministic() {
        let graph = test_data::random_graph(5, 30, 100);
        let sets = combined_sets(&graph);
        let settings = InferenceSettings::default();
        let a = ProteinInference::run(&graph, &sets, &settings, &InferenceControl::default()).unwrap();
        let b = ProteinInference::run(&graph, &sets, &settings, &InferenceControl::default()).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.accessions, y.accessions);
            assert_eq!(x.peptide_ids(), y.peptide_ids());
        }
    }
}
