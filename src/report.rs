//! The report entities produced by the modellers and the inference.
//!
//! Report items refer back into the [`EvidenceGraph`](crate::graph::EvidenceGraph)
//! by id and only carry the values derived for one analysis: decoy states,
//! FDR values, identification ranks and protein scores.
pub mod peptide;
pub mod protein;
pub mod psm;

pub use peptide::ReportPeptide;
pub use protein::ReportProtein;
pub use psm::{identification_key, IdentificationKeySettings, PSMReportItem, ReportPSM, ReportPSMSet};
