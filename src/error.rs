//! A single error type for callers that drive a whole analysis.
use thiserror::Error;

use crate::export::ExportError;
use crate::filter::FilterParseError;
use crate::graph::GraphInconsistency;
use crate::inference::InferenceError;
use crate::score::FDRError;
use crate::scoring::UnknownScoringSetting;

#[derive(Debug, Error)]
pub enum PIAError {
    #[error("inconsistent evidence graph: {0}")]
    Graph(#[from] GraphInconsistency),
    #[error("invalid filter: {0}")]
    Filter(#[from] FilterParseError),
    #[error("protein inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("FDR estimation failed: {0}")]
    FDR(#[from] FDRError),
    #[error(transparent)]
    Scoring(#[from] UnknownScoringSetting),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("an I/O error occurred: {0}")]
    IO(#[from] std::io::Error),
    #[cfg(feature = "serde")]
    #[error("failed to read or write JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    fn fails() -> Result<(), PIAError> {
        crate::filter::parse_filter("no_such_filter > 1")?;
        Ok(())
    }

    #[test_log::test]
    fn test_conversion() {
        let err = fails().unwrap_err();
        assert!(matches!(err, PIAError::Filter(FilterParseError::UnknownFilter(_))));
        let err: PIAError = InferenceError::NoDecoysFound.into();
        assert!(err.to_string().starts_with("protein inference failed"));
    }
}
