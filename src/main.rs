use std::env;
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;

use pia::export::{self, ExportLevel};
use pia::graph::GraphDocument;
use pia::inference::InferenceControl;
use pia::modeller::{PeptideModeller, ProteinModeller};
use pia::{AnalysisConfig, EvidenceGraph, PIAError, PSMModeller, COMBINED_FILE_ID};

fn load_config(path: Option<&String>) -> Result<AnalysisConfig, PIAError> {
    match path {
        Some(path) => {
            let reader = BufReader::new(fs::File::open(path)?);
            Ok(AnalysisConfig::from_reader(reader)?)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn run(graph_path: &Path, config: AnalysisConfig) -> Result<(), PIAError> {
    config.validate()?;
    let document = GraphDocument::from_reader(BufReader::new(fs::File::open(graph_path)?))?;
    let graph = EvidenceGraph::from_document(document);
    for issue in graph.inconsistencies() {
        log::warn!("{issue}");
    }
    log::info!(
        "read {} with {} PSMs in {} trees",
        graph.name(),
        graph.psms().len(),
        graph.tree_count()
    );

    let mut psms = PSMModeller::new(&graph, config.psm.settings.clone());
    if config.combined_fdr_score {
        psms.calculate_combined_fdr_score()?;
    } else {
        psms.calculate_all_fdr()?;
    }

    let mut peptides = PeptideModeller::new(config.peptide.settings.clone());
    if let Some(score) = config.peptide.fdr_score.as_deref() {
        peptides.calculate_fdr(&mut psms, COMBINED_FILE_ID, score)?;
    }

    let mut proteins = ProteinModeller::new(config.protein.settings.clone());
    proteins.set_inference_filters(config.protein.inference_filters()?);
    let control = InferenceControl::default();
    proteins.infer(&graph, psms.psm_sets(), &control)?;
    if config.protein.calculate_fdr {
        proteins.calculate_fdr(&graph)?;
    }
    let protein_filters = config.protein.filters()?;
    proteins.calculate_ranking(&protein_filters, &graph);
    let report = proteins.filtered_proteins(&protein_filters, &graph);

    for target in config.export_targets.iter() {
        let mut writer = BufWriter::new(fs::File::create(&target.path)?);
        let n = match target.level {
            ExportLevel::PSM => {
                let items = psms.filtered_psms(target.file, &config.psm.filters()?);
                export::write_psms(&mut writer, &items, &graph)?;
                items.len()
            }
            ExportLevel::Peptide => {
                if let Some(score) = config.peptide.fdr_score.as_deref() {
                    if peptides.fdr_data(target.file).is_none() {
                        peptides.calculate_fdr(&mut psms, target.file, score)?;
                    }
                }
                let items = peptides.filtered_peptides(&mut psms, target.file, &config.peptide.filters()?);
                export::write_peptides(&mut writer, &items, &graph)?;
                items.len()
            }
            ExportLevel::Protein => {
                export::write_proteins(&mut writer, &report, &graph)?;
                report.len()
            }
        };
        writer.flush()?;
        log::info!(
            "wrote {n} {} rows of file {} to {}",
            target.level,
            target.file,
            target.path.display()
        );
    }

    let stdout = io::stdout();
    export::write_proteins(stdout.lock(), &report, &graph)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    let Some(graph_path) = args.get(1) else {
        let program = args.first().map(String::as_str).unwrap_or("pia");
        eprintln!("usage: {program} <graph.json> [config.json]");
        return ExitCode::FAILURE;
    };
    let config = match load_config(args.get(2)) {
        Ok(config) => config,
        Err(e) => {
            log::error!("failed to load the analysis configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    match run(Path::new(graph_path), config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
