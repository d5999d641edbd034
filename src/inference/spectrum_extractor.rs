//! Report proteins one at a time, each claiming the spectra it explains so
//! later candidates are scored only on what remains.
use std::collections::{BTreeMap, BTreeSet};

use crate::report::ReportProtein;
use crate::score::{score_ordering, ScoreModelType};

use super::{attach_sub_proteins, InferenceContext};

/// For every spectrum in `candidates`, the peptide it scores best for. Ties
/// go to the smaller peptide id.
fn best_peptide_per_spectrum(context: &InferenceContext<'_>, candidates: &[ReportProtein]) -> BTreeMap<String, String> {
    let name = context.settings.scoring.score_short_name.as_str();
    let higher_is_better = ScoreModelType::by_short_name(name)
        .and_then(|t| t.higher_is_better())
        .unwrap_or(true);
    let mut best: BTreeMap<String, (String, f64)> = BTreeMap::new();
    for peptide in candidates.iter().flat_map(|c| c.peptides.iter()) {
        for item in peptide.psms.iter() {
            let score = item.score_value(name);
            let key = item.spectrum_key();
            match best.get_mut(key) {
                Some((pep, value)) => {
                    let ord = score_ordering(score, *value, higher_is_better);
                    if ord.is_lt() || (ord.is_eq() && peptide.string_id < *pep) {
                        *pep = peptide.string_id.clone();
                        *value = score;
                    }
                }
                None => {
                    best.insert(key.to_string(), (peptide.string_id.clone(), score));
                }
            }
        }
    }
    best.into_iter().map(|(k, (pep, _))| (k, pep)).collect()
}

/// Mark spectra that belong to another peptide or that were already claimed
/// as non-scoring, then rescore
fn rescore(
    context: &InferenceContext<'_>,
    candidate: &mut ReportProtein,
    best_peptide: &BTreeMap<String, String>,
    claimed: &BTreeSet<String>,
) {
    for peptide in candidate.peptides.iter_mut() {
        let keys: Vec<String> = peptide.spectrum_keys().into_iter().map(String::from).collect();
        for key in keys {
            let owned = best_peptide.get(&key).map_or(true, |p| *p == peptide.string_id);
            if !owned || claimed.contains(&key) {
                peptide.non_scoring_spectra.insert(key);
            }
        }
    }
    candidate.score = context.settings.scoring.score_protein(candidate);
}

fn scoring_spectra(protein: &ReportProtein) -> BTreeSet<String> {
    protein
        .peptides
        .iter()
        .flat_map(|p| p.scoring_spectrum_keys())
        .map(String::from)
        .collect()
}

pub(crate) fn infer(context: &InferenceContext<'_>, candidates: Vec<ReportProtein>) -> Vec<ReportProtein> {
    let best_peptide = best_peptide_per_spectrum(context, &candidates);
    let mut claimed: BTreeSet<String> = BTreeSet::new();
    let mut pool = candidates;
    let mut reported: Vec<ReportProtein> = Vec::new();
    let mut rest: Vec<ReportProtein> = Vec::new();

    while !pool.is_empty() {
        for candidate in pool.iter_mut() {
            rescore(context, candidate, &best_peptide, &claimed);
        }
        let Some(best_idx) = (0..pool.len()).min_by(|a, b| {
            let (a, b) = (&pool[*a], &pool[*b]);
            context
                .compare_scores(a.score, b.score)
                .then_with(|| b.nr_peptides().cmp(&a.nr_peptides()))
                .then_with(|| context.first_accession(a).cmp(context.first_accession(b)))
        }) else {
            break;
        };
        let mut best = pool.remove(best_idx);

        let peptides = best.peptide_ids().into_iter().map(String::from).collect::<BTreeSet<_>>();
        let mut i = 0;
        while i < pool.len() {
            let same = pool[i].peptide_ids().into_iter().eq(peptides.iter().map(String::as_str));
            if same {
                let equal = pool.remove(i);
                for acc in equal.accessions {
                    best.add_accession(acc);
                }
            } else {
                i += 1;
            }
        }

        let new_spectra: Vec<String> = scoring_spectra(&best)
            .into_iter()
            .filter(|k| !claimed.contains(k))
            .collect();
        if !new_spectra.is_empty() && context.passes_protein_filters(&best) {
            log::trace!("reporting {} claiming {} spectra", best.id, new_spectra.len());
            claimed.extend(new_spectra);
            reported.push(best);
        } else {
            rest.push(best);
        }
    }

    attach_sub_proteins(&mut reported, rest);
    reported
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inference::test::{assert_subsets_only_below, combined_sets};
    use crate::inference::{InferenceControl, InferenceMethod, InferenceSettings, ProteinInference};
    use crate::test_data;

    fn settings() -> InferenceSettings {
        InferenceSettings {
            method: InferenceMethod::SpectrumExtractor,
            ..Default::default()
        }
    }

    #[test_log::test]
    fn test_spectra_claimed_once() {
        let graph = test_data::random_graph(13, 30, 100);
        let sets = combined_sets(&graph);
        let proteins = ProteinInference::run(&graph, &sets, &settings(), &InferenceControl::default()).unwrap();
        assert!(!proteins.is_empty());
        // within a tree, every reported protein scores only on spectra no
        // earlier protein claimed
        let mut claimed: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
        for protein in proteins.iter() {
            let acc = graph.accession(protein.representative().unwrap());
            let tree = graph.group(acc.group.unwrap()).tree.index();
            let spectra = scoring_spectra(protein);
            assert!(!spectra.is_empty());
            let seen = claimed.entry(tree).or_default();
            assert!(spectra.is_disjoint(seen));
            seen.extend(spectra);
        }
    }

    #[test_log::test]
    fn test_small_graph() {
        let graph = test_data::small_graph();
        let sets = combined_sets(&graph);
        let proteins = ProteinInference::run(&graph, &sets, &settings(), &InferenceControl::default()).unwrap();
        let p1 = graph.find_accession("P1").unwrap().id;
        assert!(proteins.iter().any(|p| p.accessions.contains(&p1)));
        assert_subsets_only_below(&graph, &proteins);
    }

    #[test_log::test]
    fn test_shared_spectrum_counts_once() {
        let graph = test_data::small_graph();
        let sets = combined_sets(&graph);
        let settings = settings();
        let context = InferenceContext::new(&graph, &sets, &settings);
        let mut candidates = Vec::new();
        for (tree, _) in graph.trees() {
            candidates.extend(context.candidates(tree));
        }
        let best = best_peptide_per_spectrum(&context, &candidates);
        let claimed = BTreeSet::new();
        for candidate in candidates.iter_mut() {
            rescore(&context, candidate, &best, &claimed);
            for peptide in candidate.peptides.iter() {
                for key in peptide.scoring_spectrum_keys() {
                    assert_eq!(best.get(key), Some(&peptide.string_id));
                }
            }
        }
    }
}
