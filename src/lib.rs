pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod graph;
pub mod inference;
pub mod modeller;
pub mod prelude;
pub mod report;
pub mod score;
pub mod scoring;

#[cfg(test)]
mod test_data;

pub use crate::config::AnalysisConfig;
pub use crate::error::PIAError;

pub use crate::graph::{EvidenceGraph, EvidenceGraphBuilder, COMBINED_FILE_ID};
pub use crate::filter::{parse_filter, Filter, FilterKind};

pub use crate::modeller::{PSMModeller, PeptideModeller, ProteinModeller};
pub use crate::report::{ReportPSM, ReportPSMSet, ReportPeptide, ReportProtein};

pub use crate::inference::{InferenceMethod, InferenceSettings, InferenceTask, ProteinInference};
pub use crate::score::{DecoyStrategy, FDRData, ScoreModel, ScoreModelType};
pub use crate::scoring::{ProteinScoring, ScoringMethod};
