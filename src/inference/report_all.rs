//! Report every candidate of a tree, without looking for a minimal set.
use crate::report::ReportProtein;

use super::InferenceContext;

/// Candidates arrive merged by identical peptides and filtered, so each one
/// is reported as it is
pub(crate) fn infer(context: &InferenceContext<'_>, mut candidates: Vec<ReportProtein>) -> Vec<ReportProtein> {
    candidates.sort_by(|a, b| {
        context
            .compare_scores(a.score, b.score)
            .then_with(|| context.first_accession(a).cmp(context.first_accession(b)))
    });
    candidates
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use super::*;
    use crate::filter::parse_filter;
    use crate::inference::test::combined_sets;
    use crate::inference::{InferenceControl, InferenceMethod, InferenceSettings, ProteinInference};
    use crate::test_data;

    fn accession_sets(proteins: &[ReportProtein]) -> BTreeSet<Vec<usize>> {
        proteins
            .iter()
            .map(|p| {
                let mut accs: Vec<usize> = p.accessions.iter().map(|a| a.index()).collect();
                accs.sort();
                accs
            })
            .collect()
    }

    #[test_log::test]
    fn test_every_group_is_reported() {
        let graph = test_data::small_graph();
        let sets = combined_sets(&graph);
        let settings = InferenceSettings {
            method: InferenceMethod::ReportAll,
            ..Default::default()
        };
        let context = InferenceContext::new(&graph, &sets, &settings);
        let candidates: Vec<ReportProtein> = graph.trees().flat_map(|(tree, _)| context.candidates(tree)).collect();

        let proteins = ProteinInference::run(&graph, &sets, &settings, &InferenceControl::default()).unwrap();
        assert_eq!(proteins.len(), candidates.len());
        assert_eq!(accession_sets(&proteins), accession_sets(&candidates));
        assert!(proteins.iter().all(|p| p.sub_proteins.is_empty()));

        // the subset proteins are reported on their own
        for name in ["P3", "P6"] {
            let acc = graph.find_accession(name).unwrap().id;
            assert!(proteins.iter().any(|p| p.accessions.contains(&acc)));
        }

        let parsimonious =
            ProteinInference::run(&graph, &sets, &InferenceSettings::default(), &InferenceControl::default()).unwrap();
        assert!(proteins.len() > parsimonious.len());
    }

    #[test_log::test]
    fn test_filters_still_apply() {
        let graph = test_data::small_graph();
        let sets = combined_sets(&graph);
        let settings = InferenceSettings {
            method: InferenceMethod::ReportAll,
            filters: vec![parse_filter("nr_peptides_per_protein_filter >= 2").unwrap()],
            ..Default::default()
        };
        let proteins = ProteinInference::run(&graph, &sets, &settings, &InferenceControl::default()).unwrap();
        assert!(!proteins.is_empty());
        assert!(proteins.iter().all(|p| p.nr_peptides() >= 2));
    }
}
