//! Synthetic evidence graphs shared by the unit tests.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::graph::{EvidenceGraph, EvidenceGraphBuilder, FileId, PeptideId, PeptideSpectrumMatch};
use crate::score::{ScoreModel, ScoreModelType};

fn mascot(score: f64) -> Vec<ScoreModel> {
    vec![
        ScoreModel::new(ScoreModelType::MascotScore, score),
        ScoreModel::new(ScoreModelType::MascotExpect, 10f64.powf(-score / 10.0)),
    ]
}

fn psm(file: FileId, charge: i32, mz: f64, rt: f64, score: f64) -> PeptideSpectrumMatch {
    PeptideSpectrumMatch::new(file, charge, mz, 0.002, String::new())
        .with_retention_time(rt)
        .with_scores(mascot(score))
}

/// Three trees over two files.
///
/// * P1 and P4 share AAAK, CCCK and DDDK, P2 has CCCK and EEEK, P3 only DDDK
/// * P5 has FFFK and GGGK, P6 only GGGK
/// * DECOY_P7 has HHHK and IIIK
///
/// P1 and P4 were only reported by file 1. In file 1 CCCK and EEEK were
/// matched to the same spectrum, and FFFK was matched to the same spectrum in
/// both files.
pub(crate) fn small_graph() -> EvidenceGraph {
    let mut builder = EvidenceGraphBuilder::new("small");
    let f1 = builder.add_input_file("run1", "run1.mzid", "mzid");
    let f2 = builder.add_input_file("run2", "run2.mzid", "mzid");

    let proteins: [(&str, &[FileId], &str, &[&str]); 7] = [
        ("P1", &[1], "Protein one", &["AAAK", "CCCK", "DDDK"]),
        ("P2", &[1, 2], "Protein two", &["CCCK", "EEEK"]),
        ("P3", &[1, 2], "Protein three", &["DDDK"]),
        ("P4", &[1], "Protein four", &["AAAK", "CCCK", "DDDK"]),
        ("P5", &[1, 2], "Protein five", &["FFFK", "GGGK"]),
        ("P6", &[1, 2], "Protein six", &["GGGK"]),
        ("DECOY_P7", &[1, 2], "Reversed protein", &["HHHK", "IIIK"]),
    ];
    for (accession, files, description, peptides) in proteins {
        let sequence: String = peptides.concat();
        let acc = builder.insert_accession(accession, Some(&sequence));
        builder.add_search_database(acc, "sprot");
        for file in files {
            builder.add_accession_description(acc, *file, description);
        }
        let mut start = 0;
        for pep in peptides {
            let pep_id = builder.insert_peptide(pep);
            builder.add_occurrence(pep_id, acc, start + 1, start + pep.len());
            start += pep.len();
        }
    }

    let pep = |builder: &EvidenceGraphBuilder, seq: &str| -> PeptideId {
        builder.get_peptide(seq).unwrap_or_default()
    };
    let matches = [
        ("AAAK", psm(f1, 2, 402.2100, 1200.0, 60.0)),
        ("CCCK", psm(f1, 2, 500.2500, 1500.0, 55.0)),
        ("EEEK", psm(f1, 2, 500.2500, 1500.0, 25.0)),
        ("DDDK", psm(f1, 3, 310.1500, 1350.0, 40.0)),
        ("EEEK", psm(f1, 2, 470.2000, 1420.0, 35.0)),
        ("FFFK", psm(f1, 2, 550.3000, 1800.0, 50.0)),
        ("GGGK", psm(f1, 1, 362.1800, 900.0, 30.0)),
        ("HHHK", psm(f1, 2, 530.2600, 1600.0, 20.0).with_decoy(true)),
        ("CCCK", psm(f2, 2, 500.2610, 1510.0, 45.0)),
        ("DDDK", psm(f2, 3, 310.1520, 1345.0, 38.0)),
        ("EEEK", psm(f2, 2, 470.2010, 1418.0, 33.0)),
        ("FFFK", psm(f2, 2, 550.3000, 1800.0, 48.0)),
        ("GGGK", psm(f2, 1, 362.1810, 905.0, 28.0)),
        ("IIIK", psm(f2, 2, 526.3300, 1650.0, 22.0).with_decoy(true)),
    ];
    for (seq, m) in matches {
        let pep_id = pep(&builder, seq);
        builder.insert_psm(pep_id, m.with_unique(matches!(seq, "EEEK" | "FFFK" | "HHHK" | "IIIK")));
    }
    builder.build()
}

fn random_sequence(rng: &mut StdRng, index: usize) -> String {
    const RESIDUES: &[u8] = b"ACDEFGHILMNPQSTVWY";
    let mut seq = String::new();
    // encode the index so sequences never collide
    let mut i = index;
    loop {
        seq.push(RESIDUES[i % RESIDUES.len()] as char);
        i /= RESIDUES.len();
        if i == 0 {
            break;
        }
    }
    for _ in 0..(4 + rng.random_range(0..8)) {
        seq.push(RESIDUES[rng.random_range(0..RESIDUES.len())] as char);
    }
    seq.push(if rng.random_range(0..2) == 0 { 'K' } else { 'R' });
    seq
}

/// Two files with 2308 spectrum matches of charges 1 to 4 spread over 600
/// peptides. Every tenth peptide stems from a decoy accession.
pub(crate) fn large_graph() -> EvidenceGraph {
    let mut rng = StdRng::seed_from_u64(2308);
    let mut builder = EvidenceGraphBuilder::new("large");
    let files = [
        builder.add_input_file("large1", "large1.mzid", "mzid"),
        builder.add_input_file("large2", "large2.mzid", "mzid"),
    ];
    let n_targets = 270;
    let n_decoys = 30;
    let targets: Vec<_> = (0..n_targets)
        .map(|i| builder.insert_accession(&format!("LG{i:04}"), None))
        .collect();
    let decoys: Vec<_> = (0..n_decoys)
        .map(|i| builder.insert_accession(&format!("DECOY_LG{i:04}"), None))
        .collect();
    for (i, acc) in targets.iter().chain(decoys.iter()).enumerate() {
        for file in files {
            builder.add_accession_description(*acc, file, format!("Large protein {i}"));
        }
    }

    let mut peptides = Vec::new();
    for i in 0..600 {
        let seq = random_sequence(&mut rng, i);
        let pep = builder.insert_peptide(&seq);
        let decoy = i % 10 == 0;
        let pool = if decoy { &decoys } else { &targets };
        for _ in 0..(1 + rng.random_range(0..2)) {
            let acc = pool[rng.random_range(0..pool.len())];
            builder.add_occurrence(pep, acc, 1, seq.len());
        }
        peptides.push((pep, decoy));
    }

    for i in 0..2308 {
        let (pep, decoy) = peptides[rng.random_range(0..peptides.len())];
        let file = files[i % 2];
        let charge = 1 + rng.random_range(0..4) as i32;
        let spread = if decoy { 30.0 } else { 70.0 };
        let score = 5.0 + rng.random::<f64>() * spread;
        let m = psm(file, charge, 300.0 + i as f64 * 0.5, 60.0 + i as f64, score)
            .with_source_id(format!("index={i}"))
            .with_decoy(decoy);
        builder.insert_psm(pep, m);
    }
    builder.build()
}

/// `n_accessions` accessions and `n_peptides` peptides, each peptide occurring
/// in one to three accessions and identified by one or two spectra. Every
/// fifth accession is a decoy.
pub(crate) fn random_graph(seed: u64, n_accessions: usize, n_peptides: usize) -> EvidenceGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut builder = EvidenceGraphBuilder::new(format!("random-{seed}"));
    let files = [
        builder.add_input_file("a", "a.mzid", "mzid"),
        builder.add_input_file("b", "b.mzid", "mzid"),
    ];
    let accessions: Vec<_> = (0..n_accessions)
        .map(|i| {
            let name = if i % 5 == 0 { format!("DECOY_R{i}") } else { format!("R{i}") };
            let acc = builder.insert_accession(&name, None);
            for file in files {
                builder.add_accession_file(acc, file);
            }
            acc
        })
        .collect();

    let mut spectrum = 0usize;
    for i in 0..n_peptides {
        let seq = random_sequence(&mut rng, i);
        let pep = builder.insert_peptide(&seq);
        let mut decoy = true;
        for _ in 0..(1 + rng.random_range(0..3)) {
            let k = rng.random_range(0..n_accessions);
            decoy &= k % 5 == 0;
            builder.add_occurrence(pep, accessions[k], 1, seq.len());
        }
        for _ in 0..(1 + rng.random_range(0..2)) {
            let file = files[rng.random_range(0..2)];
            let score = 10.0 + rng.random::<f64>() * 60.0;
            let m = psm(file, 2, 400.0 + spectrum as f64 * 0.25, 100.0 + spectrum as f64, score)
                .with_decoy(decoy);
            builder.insert_psm(pep, m);
            spectrum += 1;
        }
    }
    builder.build()
}
