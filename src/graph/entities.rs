use std::collections::BTreeMap;
use std::fmt::Display;

use indexmap::IndexMap;

use crate::score::ScoreModel;

/// The identifier of an input file. `0` is reserved for the combined view over
/// all files, see [`COMBINED_FILE_ID`].
pub type FileId = u64;

/// The file id denoting the combination of all input files
pub const COMBINED_FILE_ID: FileId = 0;

macro_rules! arena_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(pub usize);

        impl $name {
            #[inline]
            pub const fn index(&self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(AccessionId, "The position of an [`Accession`] in its graph's arena");
arena_id!(PeptideId, "The position of a [`Peptide`] in its graph's arena");
arena_id!(PsmId, "The position of a [`PeptideSpectrumMatch`] in its graph's arena");
arena_id!(GroupId, "The position of a [`Group`] in its graph's arena");
arena_id!(TreeId, "A connected component of the protein-peptide graph");

/// One identification file that contributed evidence
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputFile {
    pub id: FileId,
    pub name: String,
    pub path: String,
    pub format: String,
}

impl InputFile {
    pub fn new(id: FileId, name: String, path: String, format: String) -> Self {
        Self {
            id,
            name,
            path,
            format,
        }
    }
}

/// A protein identifier, possibly reported by several search databases
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Accession {
    pub id: AccessionId,
    pub accession: String,
    pub db_sequence: Option<String>,
    /// Descriptions keyed by the file they were reported in
    pub descriptions: IndexMap<FileId, String>,
    /// The files this accession was found in
    pub files: Vec<FileId>,
    pub search_databases: Vec<String>,
    pub group: Option<GroupId>,
}

impl Accession {
    pub fn new(id: AccessionId, accession: String) -> Self {
        Self {
            id,
            accession,
            ..Default::default()
        }
    }

    /// Whether this accession was reported in `file`. Every accession is part
    /// of the combined view.
    pub fn found_in_file(&self, file: FileId) -> bool {
        file == COMBINED_FILE_ID || self.files.contains(&file)
    }

    /// The description reported by `file`, or the first description known
    /// when asking for the combined view.
    pub fn description(&self, file: FileId) -> Option<&str> {
        if file == COMBINED_FILE_ID {
            self.descriptions.values().next().map(|s| s.as_str())
        } else {
            self.descriptions.get(&file).map(|s| s.as_str())
        }
    }

    pub(crate) fn add_file(&mut self, file: FileId) {
        if file != COMBINED_FILE_ID && !self.files.contains(&file) {
            self.files.push(file);
            self.files.sort_unstable();
        }
    }
}

/// The position of a peptide inside one protein
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccessionOccurrence {
    pub accession: AccessionId,
    pub start: usize,
    pub end: usize,
}

/// A peptide sequence and the spectra it was matched to
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Peptide {
    pub id: PeptideId,
    pub sequence: String,
    pub psms: Vec<PsmId>,
    pub occurrences: Vec<AccessionOccurrence>,
    pub group: Option<GroupId>,
}

impl Peptide {
    pub fn new(id: PeptideId, sequence: String) -> Self {
        Self {
            id,
            sequence,
            ..Default::default()
        }
    }

    /// The distinct accessions this peptide occurs in, in ascending order
    pub fn accession_ids(&self) -> Vec<AccessionId> {
        let mut ids: Vec<AccessionId> = self.occurrences.iter().map(|o| o.accession).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// A post-translational or chemical modification at one position
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Modification {
    pub residue: Option<char>,
    pub mass: f64,
    pub description: Option<String>,
    pub accession: Option<String>,
}

impl Modification {
    pub fn new(residue: Option<char>, mass: f64, description: Option<String>) -> Self {
        Self {
            residue,
            mass,
            description,
            accession: None,
        }
    }

    /// The delta mass with four digit precision, as used in identification keys
    pub fn mass_string(&self) -> String {
        format!("{:.4}", self.mass)
    }
}

/// One scored assignment of a peptide sequence to a spectrum
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeptideSpectrumMatch {
    pub id: PsmId,
    pub file: FileId,
    pub charge: i32,
    pub mass_to_charge: f64,
    pub delta_mass: f64,
    pub retention_time: Option<f64>,
    pub sequence: String,
    pub missed_cleavages: i32,
    pub source_id: Option<String>,
    pub spectrum_title: Option<String>,
    /// The rank the search engine assigned to this match, if reported
    pub rank: Option<u32>,
    pub scores: Vec<ScoreModel>,
    /// Modifications keyed by their position, 0 being the N-terminus
    pub modifications: BTreeMap<usize, Modification>,
    pub is_decoy: Option<bool>,
    pub is_unique: Option<bool>,
    pub peptide: PeptideId,
}

impl PeptideSpectrumMatch {
    pub fn new(file: FileId, charge: i32, mass_to_charge: f64, delta_mass: f64, sequence: String) -> Self {
        Self {
            file,
            charge,
            mass_to_charge,
            delta_mass,
            sequence,
            ..Default::default()
        }
    }

    pub fn with_scores(mut self, scores: Vec<ScoreModel>) -> Self {
        self.scores = scores;
        self
    }

    pub fn with_retention_time(mut self, retention_time: f64) -> Self {
        self.retention_time = Some(retention_time);
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_spectrum_title(mut self, title: impl Into<String>) -> Self {
        self.spectrum_title = Some(title.into());
        self
    }

    pub fn with_decoy(mut self, is_decoy: bool) -> Self {
        self.is_decoy = Some(is_decoy);
        self
    }

    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = Some(is_unique);
        self
    }

    pub fn with_modification(mut self, position: usize, modification: Modification) -> Self {
        self.modifications.insert(position, modification);
        self
    }

    /// Look up a score by its short name
    pub fn score(&self, short_name: &str) -> Option<&ScoreModel> {
        self.scores.iter().find(|s| s.short_name() == short_name)
    }

    /// The mass deviation in parts per million of the precursor mass
    pub fn delta_ppm(&self) -> f64 {
        let mass = self.mass_to_charge * self.charge.abs() as f64;
        if mass == 0.0 {
            f64::NAN
        } else {
            self.delta_mass / mass * 1e6
        }
    }

    /// A positional description of the modifications, `(pos;mass)` for each
    pub fn modification_string(&self) -> String {
        let mut s = String::new();
        for (pos, m) in self.modifications.iter() {
            s.push('(');
            s.push_str(&pos.to_string());
            s.push(';');
            s.push_str(&m.mass_string());
            s.push(')');
        }
        s
    }

    /// The sequence followed by the modification description
    pub fn peptide_string_id(&self) -> String {
        let mut s = self.sequence.clone();
        s.push_str(&self.modification_string());
        s
    }
}

/// A node of the protein ambiguity DAG
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub id: GroupId,
    pub tree: TreeId,
    pub accessions: Vec<AccessionId>,
    pub peptides: Vec<PeptideId>,
    pub children: Vec<GroupId>,
    pub parents: Vec<GroupId>,
}

impl Group {
    pub fn new(id: GroupId, tree: TreeId) -> Self {
        Self {
            id,
            tree,
            ..Default::default()
        }
    }

    pub fn has_accessions(&self) -> bool {
        !self.accessions.is_empty()
    }

    pub fn has_peptides(&self) -> bool {
        !self.peptides.is_empty()
    }
}
