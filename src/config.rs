//! The settings of a whole analysis, from PSM level FDR estimation to the
//! protein report, together with the filters applied at each level.
//!
//! Filters are kept as expression strings, see [`parse_filter`] for their
//! syntax, and compiled with [`AnalysisConfig::validate`] or the `*_filters`
//! accessors of each level.
use std::path::PathBuf;

use crate::export::{ExportFormat, ExportLevel};
use crate::filter::{parse_filter, Filter, FilterParseError};
use crate::graph::{FileId, COMBINED_FILE_ID};
use crate::modeller::{PSMSettings, PeptideSettings, ProteinSettings};

/// Parse every expression in `expressions`, stopping at the first invalid one
pub fn compile_filters<S: AsRef<str>>(expressions: &[S]) -> Result<Vec<Filter>, FilterParseError> {
    expressions.iter().map(|e| parse_filter(e.as_ref())).collect()
}

#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PSMLevelConfig {
    pub settings: PSMSettings,
    /// Filters of the exported PSM lists
    pub filters: Vec<String>,
}

impl PSMLevelConfig {
    pub fn filters(&self) -> Result<Vec<Filter>, FilterParseError> {
        compile_filters(&self.filters)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PeptideLevelConfig {
    pub settings: PeptideSettings,
    /// The PSM score the peptide FDR is estimated on. Without one no peptide
    /// FDR is computed.
    pub fdr_score: Option<String>,
    pub filters: Vec<String>,
}

impl PeptideLevelConfig {
    pub fn filters(&self) -> Result<Vec<Filter>, FilterParseError> {
        compile_filters(&self.filters)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProteinLevelConfig {
    pub settings: ProteinSettings,
    /// Filters applied to PSMs, peptides and proteins during inference
    pub inference_filters: Vec<String>,
    /// Filters of the reported protein list
    pub filters: Vec<String>,
    pub calculate_fdr: bool,
}

impl Default for ProteinLevelConfig {
    fn default() -> Self {
        Self {
            settings: ProteinSettings::default(),
            inference_filters: Vec::new(),
            filters: Vec::new(),
            calculate_fdr: true,
        }
    }
}

impl ProteinLevelConfig {
    pub fn inference_filters(&self) -> Result<Vec<Filter>, FilterParseError> {
        compile_filters(&self.inference_filters)
    }

    pub fn filters(&self) -> Result<Vec<Filter>, FilterParseError> {
        compile_filters(&self.filters)
    }
}

/// A report to write after the analysis: the level's list for `file`,
/// filtered with the filters of that level
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportTarget {
    pub level: ExportLevel,
    #[cfg_attr(feature = "serde", serde(default))]
    pub format: ExportFormat,
    /// The reported file, the combined view by default
    #[cfg_attr(feature = "serde", serde(default))]
    pub file: FileId,
    pub path: PathBuf,
}

impl ExportTarget {
    pub fn new(level: ExportLevel, path: impl Into<PathBuf>) -> Self {
        Self {
            level,
            format: ExportFormat::default(),
            file: COMBINED_FILE_ID,
            path: path.into(),
        }
    }

    pub fn with_file(mut self, file: FileId) -> Self {
        self.file = file;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AnalysisConfig {
    /// Compute the combined FDR score of the PSM sets before inference
    pub combined_fdr_score: bool,
    pub psm: PSMLevelConfig,
    pub peptide: PeptideLevelConfig,
    pub protein: ProteinLevelConfig,
    pub export_targets: Vec<ExportTarget>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            combined_fdr_score: true,
            psm: PSMLevelConfig::default(),
            peptide: PeptideLevelConfig::default(),
            protein: ProteinLevelConfig::default(),
            export_targets: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Check that every filter expression of every level parses
    pub fn validate(&self) -> Result<(), FilterParseError> {
        self.psm.filters()?;
        self.peptide.filters()?;
        self.protein.inference_filters()?;
        self.protein.filters()?;
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl AnalysisConfig {
    pub fn to_writer<W: std::io::Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(writer, self)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> serde_json::Result<Self> {
        serde_json::from_reader(reader)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inference::InferenceMethod;

    #[test_log::test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.psm.settings.decoy_pattern, "DECOY_.*");
        assert_eq!(config.psm.settings.top_identifications, 1);
        assert_eq!(config.psm.settings.fdr_threshold, 0.01);
        assert_eq!(config.protein.settings.inference, InferenceMethod::OccamsRazor);
        assert_eq!(
            config.protein.settings.scoring.score_short_name,
            "psm_combined_fdr_score"
        );
        assert!(config.protein.calculate_fdr);
        assert!(config.validate().is_ok());
    }

    #[test_log::test]
    fn test_compile_filters() {
        let mut config = AnalysisConfig::default();
        config.protein.inference_filters = vec![
            "psm_score_filter_psm_combined_fdr_score <= 0.01".to_string(),
            "nr_peptides_per_protein_filter >= 2".to_string(),
        ];
        let filters = config.protein.inference_filters().unwrap();
        assert_eq!(filters.len(), 2);

        config.psm.filters.push("charge_filter regex 2".to_string());
        assert!(matches!(
            config.validate(),
            Err(FilterParseError::IncompatibleComparator { .. })
        ));
    }

    #[cfg(feature = "serde")]
    #[test_log::test]
    fn test_partial_json() -> Result<(), Box<dyn std::error::Error>> {
        let text = r#"{
            "psm": {"settings": {"decoy_strategy": "SearchEngine", "top_identifications": 0}},
            "protein": {"filters": ["protein_score_filter > 1"]},
            "export_targets": [
                {"level": "psm", "file": 1, "path": "psms.tsv"},
                {"level": "protein", "format": "tsv", "path": "proteins.tsv"}
            ]
        }"#;
        let config = AnalysisConfig::from_reader(text.as_bytes())?;
        assert_eq!(
            config.psm.settings.decoy_strategy,
            crate::score::DecoyStrategy::SearchEngine
        );
        assert_eq!(config.psm.settings.top_identifications, 0);
        assert_eq!(config.psm.settings.decoy_pattern, "DECOY_.*");
        assert!(config.combined_fdr_score);
        assert!(config.protein.calculate_fdr);
        assert_eq!(config.protein.filters()?.len(), 1);
        assert_eq!(
            config.export_targets,
            vec![
                ExportTarget::new(ExportLevel::PSM, "psms.tsv").with_file(1),
                ExportTarget::new(ExportLevel::Protein, "proteins.tsv"),
            ]
        );

        let bad = r#"{"export_targets": [{"level": "protein", "format": "mztab", "path": "x"}]}"#;
        assert!(AnalysisConfig::from_reader(bad.as_bytes()).is_err());

        let mut buf = Vec::new();
        config.to_writer(&mut buf)?;
        let back = AnalysisConfig::from_reader(buf.as_slice())?;
        assert_eq!(back, config);
        Ok(())
    }
}
