use std::fmt::Display;
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

use super::model::score_ordering;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FDRError {
    #[error("no score was set to calculate the FDR on")]
    NoScoreSet,
    #[error("the decoy pattern {0:?} is not a valid regular expression: {1}")]
    InvalidDecoyPattern(String, String),
    #[error("{0} is not a known decoy strategy")]
    UnknownDecoyStrategy(String),
}

/// How decoys are recognized
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecoyStrategy {
    /// All accessions of an item match the decoy pattern
    #[default]
    AccessionPattern,
    /// The decoy flag reported by the search engine
    SearchEngine,
    /// Decoy state is taken from the constituents of an item
    Inherit,
}

impl DecoyStrategy {
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::AccessionPattern => "accessionpattern",
            Self::SearchEngine => "searchengine",
            Self::Inherit => "inherit",
        }
    }
}

impl Display for DecoyStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for DecoyStrategy {
    type Err = FDRError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "accessionpattern" => Ok(Self::AccessionPattern),
            "searchengine" => Ok(Self::SearchEngine),
            "inherit" => Ok(Self::Inherit),
            _ => Err(FDRError::UnknownDecoyStrategy(s.to_string())),
        }
    }
}

/// The FDR derived values attached to one item
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FDRValues {
    pub fdr: f64,
    pub q_value: f64,
    pub fdr_score: f64,
    pub is_fdr_good: bool,
}

impl Default for FDRValues {
    fn default() -> Self {
        Self {
            fdr: f64::NAN,
            q_value: f64::NAN,
            fdr_score: f64::NAN,
            is_fdr_good: false,
        }
    }
}

impl FDRValues {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Items that can be ranked by a score and carry FDR values
pub trait FDRComputable {
    /// The value of the score with `short_name`, NaN when absent
    fn score_value(&self, short_name: &str) -> f64;

    fn is_decoy(&self) -> bool;

    fn fdr_values(&self) -> &FDRValues;

    fn fdr_values_mut(&mut self) -> &mut FDRValues;

    #[inline]
    fn fdr(&self) -> f64 {
        self.fdr_values().fdr
    }

    #[inline]
    fn q_value(&self) -> f64 {
        self.fdr_values().q_value
    }

    #[inline]
    fn is_fdr_good(&self) -> bool {
        self.fdr_values().is_fdr_good
    }
}

/// The configuration of one FDR estimation together with its results
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FDRData {
    pub decoy_strategy: DecoyStrategy,
    pub decoy_pattern: String,
    pub score_short_name: Option<String>,
    pub fdr_threshold: f64,
    /// Only identifications up to this rank take part, 0 means all
    pub top_identifications: usize,

    pub artificial_decoy_fdr: f64,
    pub score_at_threshold: f64,
    pub nr_items: usize,
    pub nr_targets: usize,
    pub nr_decoys: usize,
    pub nr_fdr_good_targets: usize,
    pub nr_fdr_good_decoys: usize,
}

impl Default for FDRData {
    fn default() -> Self {
        Self::new(DecoyStrategy::AccessionPattern, "DECOY_.*", 0.01)
    }
}

impl FDRData {
    pub fn new(decoy_strategy: DecoyStrategy, decoy_pattern: impl Into<String>, fdr_threshold: f64) -> Self {
        Self {
            decoy_strategy,
            decoy_pattern: decoy_pattern.into(),
            score_short_name: None,
            fdr_threshold,
            top_identifications: 1,
            artificial_decoy_fdr: f64::NAN,
            score_at_threshold: f64::NAN,
            nr_items: 0,
            nr_targets: 0,
            nr_decoys: 0,
            nr_fdr_good_targets: 0,
            nr_fdr_good_decoys: 0,
        }
    }

    pub fn with_score(mut self, short_name: impl Into<String>) -> Self {
        self.score_short_name = Some(short_name.into());
        self
    }

    /// Compile the decoy pattern so that it has to match a whole accession
    pub fn decoy_regex(&self) -> Result<Regex, FDRError> {
        Regex::new(&format!("^(?:{})$", self.decoy_pattern))
            .map_err(|e| FDRError::InvalidDecoyPattern(self.decoy_pattern.clone(), e.to_string()))
    }

    fn reset_results(&mut self) {
        self.artificial_decoy_fdr = f64::NAN;
        self.score_at_threshold = f64::NAN;
        self.nr_items = 0;
        self.nr_targets = 0;
        self.nr_decoys = 0;
        self.nr_fdr_good_targets = 0;
        self.nr_fdr_good_decoys = 0;
    }

    /// Sort `items` from best to worst and attach the decoy-fraction FDR,
    /// q-value and FDR-good flag to each.
    ///
    /// Items with identical scores form one rank and share their FDR. A rank
    /// gets `decoys / targets` counted over all items up to and including it,
    /// or infinity while no target was seen.
    pub fn calculate_fdr<T: FDRComputable>(
        &mut self,
        items: &mut [T],
        higher_is_better: bool,
    ) -> Result<(), FDRError> {
        let score = self.score_short_name.clone().ok_or(FDRError::NoScoreSet)?;
        self.reset_results();
        items.sort_by(|a, b| {
            score_ordering(a.score_value(&score), b.score_value(&score), higher_is_better)
        });
        let scores: Vec<f64> = items.iter().map(|i| i.score_value(&score)).collect();

        let mut ranks: Vec<(usize, usize, f64)> = Vec::new();
        let mut decoys = 0usize;
        let mut targets = 0usize;
        let mut start = 0;
        while start < items.len() {
            let mut end = start;
            while end < items.len() && same_score(scores[start], scores[end]) {
                if items[end].is_decoy() {
                    decoys += 1;
                } else {
                    targets += 1;
                }
                end += 1;
            }
            let fdr = decoy_fraction(decoys, targets);
            for item in items[start..end].iter_mut() {
                let values = item.fdr_values_mut();
                values.fdr = fdr;
                values.is_fdr_good = false;
            }
            ranks.push((start, end, fdr));
            start = end;
        }

        self.nr_items = items.len();
        self.nr_decoys = decoys;
        self.nr_targets = targets;
        self.artificial_decoy_fdr = if targets == 0 {
            f64::INFINITY
        } else {
            (decoys + 1) as f64 / targets as f64
        };

        let mut q = f64::INFINITY;
        for (start, end, fdr) in ranks.iter().rev() {
            if *fdr < q {
                q = *fdr;
            }
            for item in items[*start..*end].iter_mut() {
                item.fdr_values_mut().q_value = q;
            }
        }

        if let Some(last_good) = ranks.iter().rposition(|(_, _, fdr)| *fdr <= self.fdr_threshold) {
            let end = ranks[last_good].1;
            for item in items[..end].iter_mut() {
                item.fdr_values_mut().is_fdr_good = true;
                if item.is_decoy() {
                    self.nr_fdr_good_decoys += 1;
                } else {
                    self.nr_fdr_good_targets += 1;
                }
            }
            self.score_at_threshold = scores[end - 1];
        }

        log::debug!(
            "FDR on {score}: {} items, {} targets, {} decoys, {} FDR-good targets at {}",
            self.nr_items,
            self.nr_targets,
            self.nr_decoys,
            self.nr_fdr_good_targets,
            self.score_at_threshold
        );
        Ok(())
    }
}

#[inline]
fn same_score(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

#[inline]
fn decoy_fraction(decoys: usize, targets: usize) -> f64 {
    if targets == 0 {
        f64::INFINITY
    } else {
        decoys as f64 / targets as f64
    }
}
