//! Typed score values, decoy based false discovery rates and the continuous
//! FDRScore.
pub mod fdr;
pub mod fdr_score;
pub mod model;

pub use fdr::{DecoyStrategy, FDRComputable, FDRData, FDRError, FDRValues};
pub use fdr_score::{
    calculate_fdr_score, FDRScoreComputable, SMALL_FDRSCORE_SUBSTITUTE,
};
pub use model::{score_ordering, ScoreModel, ScoreModelType, ScoreTransform, ScoreTypeInfo};
