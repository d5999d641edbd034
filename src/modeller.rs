//! Per level views over an evidence graph: PSMs per file and combined into
//! sets, peptides, and the inferred proteins. Each modeller owns its report
//! lists and FDR state and recomputes them when its settings change.
use std::cmp::Ordering;

use crate::score::score_ordering;

pub mod peptide;
pub mod protein;
pub mod psm;

pub use peptide::{PeptideModeller, PeptideSettings};
pub use protein::{ProteinModeller, ProteinSettings};
pub use psm::{PSMModeller, PSMSettings};

/// Competition ranks (1, 2, 2, 4, ...) of `scores`, best first. Equal scores
/// share a rank and NaN ranks last.
pub(crate) fn competition_ranks(scores: &[f64], higher_is_better: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|a, b| score_ordering(scores[*a], scores[*b], higher_is_better));
    let mut ranks = vec![0; scores.len()];
    let mut previous: Option<(f64, usize)> = None;
    for (position, idx) in order.into_iter().enumerate() {
        let score = scores[idx];
        let rank = match previous {
            Some((prev, rank))
                if score_ordering(prev, score, higher_is_better) == Ordering::Equal =>
            {
                rank
            }
            _ => position + 1,
        };
        ranks[idx] = rank;
        previous = Some((score, rank));
    }
    ranks
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_competition_ranks() {
        let ranks = competition_ranks(&[10.0, 30.0, 20.0, 30.0, f64::NAN], true);
        assert_eq!(ranks, vec![4, 1, 3, 1, 5]);
        let ranks = competition_ranks(&[0.1, 0.01, 0.1], false);
        assert_eq!(ranks, vec![2, 1, 2]);
        assert!(competition_ranks(&[], true).is_empty());
    }
}
