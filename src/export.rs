//! Tab separated reports of the PSM, peptide and protein levels.
//!
//! The writers take lists that were already filtered, one row per item.
//! Missing values are written as empty cells and absent FDR values as `NaN`.
use std::fmt::Display;
use std::io::{self, Write};
use std::str::FromStr;

use thiserror::Error;

use crate::graph::{AccessionId, EvidenceGraph};
use crate::report::{PSMReportItem, ReportPeptide, ReportProtein};
use crate::score::FDRValues;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("{0} is not a known report level")]
    UnknownLevel(String),
    #[error("{0} is not a supported report format")]
    UnsupportedFormat(String),
}

/// The level a report is written for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExportLevel {
    PSM,
    Peptide,
    Protein,
}

impl Display for ExportLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PSM => "psm",
            Self::Peptide => "peptide",
            Self::Protein => "protein",
        })
    }
}

impl FromStr for ExportLevel {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "psm" => Ok(Self::PSM),
            "peptide" => Ok(Self::Peptide),
            "protein" => Ok(Self::Protein),
            _ => Err(ExportError::UnknownLevel(s.to_string())),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExportFormat {
    #[default]
    TSV,
}

impl Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("tsv")
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tsv" | "tab" => Ok(Self::TSV),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

fn accession_names(accessions: &[AccessionId], graph: &EvidenceGraph) -> String {
    let names: Vec<&str> = accessions
        .iter()
        .map(|a| graph.accession(*a).accession.as_str())
        .collect();
    names.join(",")
}

fn optional<T: Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn psm_fdr(item: &PSMReportItem) -> &FDRValues {
    match item {
        PSMReportItem::PSM(p) => &p.fdr,
        PSMReportItem::Set(s) => &s.fdr,
    }
}

pub const PSM_COLUMNS: &[&str] = &[
    "file",
    "spectrum_key",
    "sequence",
    "accessions",
    "charge",
    "mz",
    "rt",
    "scores",
    "decoy",
    "q_value",
    "fdr_score",
];

/// Write one row per PSM or PSM set. Sets describe their spectrum through
/// their first member, and report the combined FDR score.
pub fn write_psms<W: Write>(mut writer: W, items: &[PSMReportItem], graph: &EvidenceGraph) -> io::Result<()> {
    writeln!(writer, "{}", PSM_COLUMNS.join("\t"))?;
    for item in items {
        let Some(first) = item.first_psm() else {
            continue;
        };
        let psm = graph.psm(first.id);
        let scores: Vec<String> = first
            .scores
            .iter()
            .map(|s| format!("{}:{}", s.short_name(), s.value))
            .collect();
        let fdr = psm_fdr(item);
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{:.4}\t{}\t{}\t{}\t{}\t{}",
            item.file(),
            item.spectrum_key(),
            psm.sequence,
            accession_names(&first.accessions, graph),
            psm.charge,
            psm.mass_to_charge,
            optional(psm.retention_time),
            scores.join(";"),
            item.is_decoy(),
            fdr.q_value,
            fdr.fdr_score,
        )?;
    }
    Ok(())
}

pub const PEPTIDE_COLUMNS: &[&str] = &[
    "peptide",
    "sequence",
    "accessions",
    "psms",
    "spectra",
    "rank",
    "decoy",
    "q_value",
    "fdr_score",
];

pub fn write_peptides<W: Write>(mut writer: W, peptides: &[ReportPeptide], graph: &EvidenceGraph) -> io::Result<()> {
    writeln!(writer, "{}", PEPTIDE_COLUMNS.join("\t"))?;
    for peptide in peptides {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            peptide.string_id,
            peptide.sequence,
            accession_names(&peptide.accessions, graph),
            peptide.nr_psms(),
            peptide.nr_spectra(),
            optional(peptide.rank),
            peptide.is_decoy,
            peptide.fdr.q_value,
            peptide.fdr.fdr_score,
        )?;
    }
    Ok(())
}

pub const PROTEIN_COLUMNS: &[&str] = &[
    "id",
    "rank",
    "accessions",
    "score",
    "q_value",
    "decoy",
    "peptides",
    "psms",
    "spectra",
    "sub_proteins",
];

/// Write one row per reported protein, naming the accessions of its
/// sub-proteins in the last column
pub fn write_proteins<W: Write>(mut writer: W, proteins: &[ReportProtein], graph: &EvidenceGraph) -> io::Result<()> {
    writeln!(writer, "{}", PROTEIN_COLUMNS.join("\t"))?;
    for protein in proteins {
        let subs: Vec<String> = protein
            .sub_proteins
            .iter()
            .map(|s| accession_names(&s.accessions, graph))
            .collect();
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            protein.id,
            optional(protein.rank),
            accession_names(&protein.accessions, graph),
            protein.score,
            protein.fdr.q_value,
            protein.is_decoy,
            protein.nr_peptides(),
            protein.nr_psms(),
            protein.nr_spectra(),
            subs.join(";"),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::parse_filter;
    use crate::graph::COMBINED_FILE_ID;
    use crate::inference::test::combined_sets;
    use crate::inference::{InferenceControl, InferenceSettings, ProteinInference};
    use crate::modeller::{PSMModeller, PSMSettings, PeptideModeller, PeptideSettings};
    use crate::test_data;

    fn rows(buf: &[u8]) -> Vec<Vec<String>> {
        String::from_utf8_lossy(buf)
            .lines()
            .map(|l| l.split('\t').map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_names() {
        assert_eq!("PSM".parse::<ExportLevel>(), Ok(ExportLevel::PSM));
        assert_eq!("protein".parse::<ExportLevel>(), Ok(ExportLevel::Protein));
        assert_eq!(ExportLevel::Peptide.to_string(), "peptide");
        assert!(matches!("spectrum".parse::<ExportLevel>(), Err(ExportError::UnknownLevel(_))));
        assert_eq!("tsv".parse::<ExportFormat>(), Ok(ExportFormat::TSV));
        assert!(matches!("mzTab".parse::<ExportFormat>(), Err(ExportError::UnsupportedFormat(_))));
    }

    #[test_log::test]
    fn test_filtered_psms() -> Result<(), Box<dyn std::error::Error>> {
        let graph = test_data::small_graph();
        let mut psms = PSMModeller::new(&graph, PSMSettings::default());
        psms.calculate_all_fdr()?;
        let filters = vec![parse_filter("charge_filter <= 2")?];
        let items = psms.filtered_psms(1, &filters);
        assert!(!items.is_empty());
        assert!(items.len() < psms.psms(1).len());

        let mut buf = Vec::new();
        write_psms(&mut buf, &items, &graph)?;
        let rows = rows(&buf);
        assert_eq!(rows[0], PSM_COLUMNS);
        assert_eq!(rows.len(), items.len() + 1);
        let charge = PSM_COLUMNS.iter().position(|c| *c == "charge").unwrap();
        for row in rows.iter().skip(1) {
            assert_eq!(row.len(), PSM_COLUMNS.len());
            assert_eq!(row[0], "1");
            assert!(row[charge].parse::<i32>()? <= 2);
        }
        Ok(())
    }

    #[test_log::test]
    fn test_combined_psm_sets() -> Result<(), Box<dyn std::error::Error>> {
        let graph = test_data::small_graph();
        let mut psms = PSMModeller::new(&graph, PSMSettings::default());
        psms.calculate_combined_fdr_score()?;
        let items = psms.filtered_psms(COMBINED_FILE_ID, &[]);
        let mut buf = Vec::new();
        write_psms(&mut buf, &items, &graph)?;
        let rows = rows(&buf);
        assert_eq!(rows.len(), psms.psm_sets().len() + 1);
        assert!(rows.iter().skip(1).all(|r| r[0] == "0"));
        Ok(())
    }

    #[test_log::test]
    fn test_filtered_peptides() -> Result<(), Box<dyn std::error::Error>> {
        let graph = test_data::small_graph();
        let mut psms = PSMModeller::new(&graph, PSMSettings::default());
        let mut peptides = PeptideModeller::new(PeptideSettings::default());
        let filters = vec![parse_filter("peptide_sequence_filter not contains H")?];
        let all = peptides.peptides(&mut psms, 1).len();
        let kept = peptides.filtered_peptides(&mut psms, 1, &filters);
        assert!(kept.len() < all);

        let mut buf = Vec::new();
        write_peptides(&mut buf, &kept, &graph)?;
        let rows = rows(&buf);
        assert_eq!(rows.len(), kept.len() + 1);
        assert!(rows.iter().skip(1).all(|r| !r[1].contains('H')));
        Ok(())
    }

    #[test_log::test]
    fn test_proteins() -> Result<(), Box<dyn std::error::Error>> {
        let graph = test_data::small_graph();
        let sets = combined_sets(&graph);
        let proteins =
            ProteinInference::run(&graph, &sets, &InferenceSettings::default(), &InferenceControl::default())?;
        let mut buf = Vec::new();
        write_proteins(&mut buf, &proteins, &graph)?;
        let rows = rows(&buf);
        assert_eq!(rows.len(), proteins.len() + 1);
        let with_p1 = rows
            .iter()
            .find(|r| r[2].split(',').any(|a| a == "P1"))
            .unwrap();
        assert!(with_p1[2].contains("P4"));
        assert!(with_p1[9].contains("P3"));
        Ok(())
    }
}
