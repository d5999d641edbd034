//! Predicates over report items.
//!
//! A [`Filter`] pairs a registered [`FilterKind`] with a comparator and a
//! value. Filters are parsed from expressions like `charge_filter <= 2` and
//! evaluated against report items in the context of one input file.
use std::fmt::Display;

use regex::Regex;

use crate::graph::{EvidenceGraph, FileId};
use crate::report::{PSMReportItem, ReportPSM, ReportPSMSet, ReportPeptide, ReportProtein};

pub mod comparator;
pub mod kind;
pub mod parse;
pub mod value;

pub use comparator::{FilterComparator, FilterType};
pub use kind::{FilterKind, FilterKindInfo};
pub use parse::{new_filter, parse_filter, FilterParseError};
pub use value::{FilterValue, ItemValue};

/// The levels of report items filters apply to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportItemKind {
    PSM,
    PSMSet,
    Peptide,
    Protein,
}

/// A borrowed view of any report item
#[derive(Debug, Clone, Copy)]
pub enum ReportItemRef<'a> {
    PSM(&'a ReportPSM),
    PSMSet(&'a ReportPSMSet),
    Peptide(&'a ReportPeptide),
    Protein(&'a ReportProtein),
}

impl ReportItemRef<'_> {
    pub fn kind(&self) -> ReportItemKind {
        match self {
            Self::PSM(_) => ReportItemKind::PSM,
            Self::PSMSet(_) => ReportItemKind::PSMSet,
            Self::Peptide(_) => ReportItemKind::Peptide,
            Self::Protein(_) => ReportItemKind::Protein,
        }
    }
}

/// Report items that can be checked against filters
pub trait Filterable {
    fn as_report_item(&self) -> ReportItemRef<'_>;
}

impl Filterable for ReportPSM {
    fn as_report_item(&self) -> ReportItemRef<'_> {
        ReportItemRef::PSM(self)
    }
}

impl Filterable for ReportPSMSet {
    fn as_report_item(&self) -> ReportItemRef<'_> {
        ReportItemRef::PSMSet(self)
    }
}

impl Filterable for PSMReportItem {
    fn as_report_item(&self) -> ReportItemRef<'_> {
        match self {
            PSMReportItem::PSM(p) => ReportItemRef::PSM(p),
            PSMReportItem::Set(s) => ReportItemRef::PSMSet(s),
        }
    }
}

impl Filterable for ReportPeptide {
    fn as_report_item(&self) -> ReportItemRef<'_> {
        ReportItemRef::Peptide(self)
    }
}

impl Filterable for ReportProtein {
    fn as_report_item(&self) -> ReportItemRef<'_> {
        ReportItemRef::Protein(self)
    }
}

#[derive(Debug, Clone)]
pub struct Filter {
    pub kind: FilterKind,
    pub comparator: FilterComparator,
    pub value: FilterValue,
    pub negate: bool,
    regex: Option<Regex>,
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.comparator == other.comparator
            && self.value == other.value
            && self.negate == other.negate
    }
}

impl Filter {
    /// Create a filter, compiling the value as a whole-string regular
    /// expression for the regex comparators
    pub fn new(
        kind: FilterKind,
        comparator: FilterComparator,
        value: FilterValue,
        negate: bool,
    ) -> Result<Self, FilterParseError> {
        let regex = match (comparator, &value) {
            (FilterComparator::Regex | FilterComparator::RegexOnly, FilterValue::Text(pattern)) => {
                Some(
                    Regex::new(&format!("^(?:{pattern})$"))
                        .map_err(|e| FilterParseError::InvalidRegex(pattern.clone(), e.to_string()))?,
                )
            }
            _ => None,
        };
        Ok(Self {
            kind,
            comparator,
            value,
            negate,
            regex,
        })
    }

    pub fn supports(&self, item: ReportItemKind) -> bool {
        self.kind.supports(item)
    }

    pub fn extract_value<T: Filterable + ?Sized>(&self, item: &T, file: FileId, graph: &EvidenceGraph) -> ItemValue {
        self.kind.extract_value(item.as_report_item(), file, graph)
    }

    /// Whether `item` passes this filter in the context of `file`
    pub fn satisfies<T: Filterable + ?Sized>(&self, item: &T, file: FileId, graph: &EvidenceGraph) -> bool {
        let value = self.extract_value(item, file, graph);
        value::satisfies(self.comparator, &value, &self.value, self.regex.as_ref(), self.negate)
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind.short_name())?;
        if self.negate {
            f.write_str(" not")?;
        }
        write!(f, " {} {}", self.comparator, self.value)
    }
}

/// Whether `item` passes every filter in `filters` that applies to its kind
pub fn satisfies_filter_list<T: Filterable + ?Sized>(
    item: &T,
    file: FileId,
    filters: &[Filter],
    graph: &EvidenceGraph,
) -> bool {
    let kind = item.as_report_item().kind();
    filters
        .iter()
        .filter(|f| f.supports(kind))
        .all(|f| f.satisfies(item, file, graph))
}

/// Keep the items of `items` which pass all applicable filters
pub fn apply_filters<T: Filterable + Clone>(
    items: &[T],
    filters: &[Filter],
    file: FileId,
    graph: &EvidenceGraph,
) -> Vec<T> {
    if filters.is_empty() {
        return items.to_vec();
    }
    items
        .iter()
        .filter(|item| satisfies_filter_list(*item, file, filters, graph))
        .cloned()
        .collect()
}
