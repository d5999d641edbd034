//! Combining the scores of a protein's peptides into one protein score.
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::report::{PSMReportItem, ReportPeptide, ReportProtein};
use crate::score::{FDRComputable, ScoreModelType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0} is not a known scoring setting")]
pub struct UnknownScoringSetting(pub String);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScoringMethod {
    Additive,
    #[default]
    Multiplicative,
    GeometricMean,
}

impl ScoringMethod {
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::Additive => "scoring_additive",
            Self::Multiplicative => "scoring_multiplicative",
            Self::GeometricMean => "geometric_mean_scoring",
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Additive => "Additive Scoring",
            Self::Multiplicative => "Multiplicative Scoring",
            Self::GeometricMean => "Geometric Mean Scoring",
        }
    }
}

impl Display for ScoringMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for ScoringMethod {
    type Err = UnknownScoringSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Self::Additive, Self::Multiplicative, Self::GeometricMean]
            .into_iter()
            .find(|m| m.short_name() == s.trim())
            .ok_or_else(|| UnknownScoringSetting(s.to_string()))
    }
}

/// Which spectra of a peptide contribute to the protein score
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PSMForScoring {
    /// Only the best scoring PSM of each peptide
    #[default]
    BestPerPeptide,
    All,
}

impl PSMForScoring {
    pub const fn short_name(&self) -> &'static str {
        match self {
            Self::BestPerPeptide => "best",
            Self::All => "all",
        }
    }
}

impl Display for PSMForScoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for PSMForScoring {
    type Err = UnknownScoringSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "best" => Ok(Self::BestPerPeptide),
            "all" => Ok(Self::All),
            _ => Err(UnknownScoringSetting(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProteinScoring {
    pub method: ScoringMethod,
    pub score_short_name: String,
    pub psm_for_scoring: PSMForScoring,
}

impl Default for ProteinScoring {
    fn default() -> Self {
        Self::new(
            ScoringMethod::Multiplicative,
            ScoreModelType::PSMCombinedFDRScore.short_name(),
            PSMForScoring::BestPerPeptide,
        )
    }
}

impl ProteinScoring {
    pub fn new(method: ScoringMethod, score_short_name: impl Into<String>, psm_for_scoring: PSMForScoring) -> Self {
        Self {
            method,
            score_short_name: score_short_name.into(),
            psm_for_scoring,
        }
    }

    fn score_direction(&self) -> Option<bool> {
        ScoreModelType::by_short_name(&self.score_short_name).and_then(|t| t.higher_is_better())
    }

    /// Whether a higher protein score is better
    pub fn higher_is_better(&self) -> bool {
        match self.method {
            ScoringMethod::Additive => self.score_direction().unwrap_or(true),
            ScoringMethod::Multiplicative | ScoringMethod::GeometricMean => true,
        }
    }

    /// The values a peptide contributes to the protein score
    pub fn peptide_contributions(&self, peptide: &ReportPeptide) -> Vec<f64> {
        let name = self.score_short_name.as_str();
        let values: Vec<f64> = match self.psm_for_scoring {
            PSMForScoring::BestPerPeptide => vec![peptide.best_score(name)],
            PSMForScoring::All => {
                let is_set_score = ScoreModelType::by_short_name(name).is_some_and(|t| t.is_psm_set_score());
                let scoring = |p: &crate::report::ReportPSM| {
                    !peptide.non_scoring_psms.contains(&p.id)
                        && !peptide.non_scoring_spectra.contains(&p.spectrum_key)
                };
                peptide
                    .psms
                    .iter()
                    .flat_map(|item| -> Vec<f64> {
                        match item {
                            PSMReportItem::Set(set) if is_set_score => {
                                if set.psms.iter().any(scoring) {
                                    vec![set.score_value(name)]
                                } else {
                                    vec![]
                                }
                            }
                            _ => item
                                .psms()
                                .filter(|p| scoring(p))
                                .map(|p| p.score_value(name))
                                .collect(),
                        }
                    })
                    .collect()
            }
        };
        values.into_iter().filter(|v| !v.is_nan()).collect()
    }

    /// Combine `values` with this scoring's method. NaN if there are none.
    pub fn combine(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        let exponent = match self.method {
            ScoringMethod::Additive => return values.iter().sum(),
            ScoringMethod::Multiplicative => 1.0,
            ScoringMethod::GeometricMean => 1.0 / n,
        };
        match self.score_direction() {
            Some(false) => values.iter().map(|v| -v.powf(exponent).log10()).sum(),
            Some(true) => values.iter().map(|v| v.powf(exponent)).product(),
            None => {
                log::warn!(
                    "{} can not be used with {}, the score direction is unknown",
                    self.score_short_name,
                    self.method
                );
                f64::NAN
            }
        }
    }

    pub fn score_protein(&self, protein: &ReportProtein) -> f64 {
        let values: Vec<f64> = protein
            .peptides
            .iter()
            .flat_map(|p| self.peptide_contributions(p))
            .collect();
        self.combine(&values)
    }

    /// Score every protein and, after it, each of its sub-proteins
    pub fn score_all(&self, proteins: &mut [ReportProtein]) {
        for protein in proteins.iter_mut() {
            protein.score = self.score_protein(protein);
            self.score_all(&mut protein.sub_proteins);
        }
    }
}
