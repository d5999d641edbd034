//! The FDRScore, a continuous and strictly score-monotone version of the
//! q-value obtained by interpolating between the points where the q-value
//! steps up.
use super::fdr::{FDRComputable, FDRData};

/// Used in place of an FDRScore of exactly zero
pub const SMALL_FDRSCORE_SUBSTITUTE: f64 = 1e-7;

pub trait FDRScoreComputable: FDRComputable {
    #[inline]
    fn fdr_score(&self) -> f64 {
        self.fdr_values().fdr_score
    }

    #[inline]
    fn set_fdr_score(&mut self, value: f64) {
        self.fdr_values_mut().fdr_score = if value == 0.0 {
            SMALL_FDRSCORE_SUBSTITUTE
        } else {
            value
        };
    }
}

impl<T: FDRComputable> FDRScoreComputable for T {}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    index: Option<usize>,
    score: f64,
    q: f64,
}

/// Attach the FDRScore to `items`, which must already be sorted and carry
/// q-values from [`FDRData::calculate_fdr`] on the same score.
pub fn calculate_fdr_score<T: FDRScoreComputable>(items: &mut [T], fdr_data: &FDRData) {
    if items.len() < 2 {
        return;
    }
    let Some(score_name) = fdr_data.score_short_name.as_deref() else {
        log::warn!("no score set for the FDRScore calculation");
        return;
    };
    let scores: Vec<f64> = items.iter().map(|i| i.score_value(score_name)).collect();
    let q_values: Vec<f64> = items.iter().map(|i| i.q_value()).collect();
    let last = items.len() - 1;

    if scores.iter().all(|s| *s == scores[0]) {
        let q = q_values[0];
        for item in items.iter_mut() {
            item.set_fdr_score(q);
        }
        return;
    }

    let mut steps: Vec<usize> = (0..last)
        .rev()
        .filter(|i| q_values[*i] < q_values[*i + 1])
        .map(|i| i + 1)
        .collect();
    steps.sort_unstable();

    let s0 = scores[0];
    let first_step = steps.first().copied().unwrap_or(last);
    let (reference, reference_idx) = if scores[first_step] != s0 {
        (scores[first_step], first_step)
    } else {
        // ties at the top, extrapolate from the next distinct score instead
        scores
            .iter()
            .position(|s| *s != s0)
            .map(|i| (scores[i], i))
            .unwrap_or((scores[last], last))
    };
    let mut anchors = vec![Anchor {
        index: None,
        score: s0 + (s0 - reference) / reference_idx as f64,
        q: 0.0,
    }];
    anchors.extend(steps.iter().map(|i| Anchor {
        index: Some(*i),
        score: scores[*i],
        q: q_values[*i],
    }));
    if steps.last() != Some(&last) {
        anchors.push(Anchor {
            index: Some(last),
            score: scores[last],
            q: fdr_data.artificial_decoy_fdr,
        });
    }

    let mut start = 0;
    for span in anchors.windows(2) {
        let (low, high) = (span[0], span[1]);
        let Some(end) = high.index else {
            continue;
        };
        let g = (high.q - low.q) / (high.score - low.score);
        for i in start..=end {
            let value = if i == end {
                high.q
            } else if g.is_finite() {
                (scores[i] - low.score) * g + low.q
            } else {
                low.q
            };
            items[i].set_fdr_score(value);
        }
        start = end + 1;
    }
}
