use std::fmt::Display;

/// The relation a filter checks between an item's value and the filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterComparator {
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    Contains,
    ContainsOnly,
    Regex,
    RegexOnly,
    HasAnyModification,
    HasDescription,
    HasMass,
    HasResidue,
}

impl FilterComparator {
    pub const ALL: &'static [FilterComparator] = &[
        Self::Less,
        Self::LessEqual,
        Self::Equal,
        Self::GreaterEqual,
        Self::Greater,
        Self::Contains,
        Self::ContainsOnly,
        Self::Regex,
        Self::RegexOnly,
        Self::HasAnyModification,
        Self::HasDescription,
        Self::HasMass,
        Self::HasResidue,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Less => "less",
            Self::LessEqual => "less_equal",
            Self::Equal => "equal",
            Self::GreaterEqual => "greater_equal",
            Self::Greater => "greater",
            Self::Contains => "contains",
            Self::ContainsOnly => "contains_only",
            Self::Regex => "regex",
            Self::RegexOnly => "regex_only",
            Self::HasAnyModification => "has_any_modification",
            Self::HasDescription => "has_description",
            Self::HasMass => "has_mass",
            Self::HasResidue => "has_residue",
        }
    }

    /// The symbol shown in filter descriptions
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Less => "<",
            Self::LessEqual => "<=",
            Self::Equal => "=",
            Self::GreaterEqual => ">=",
            Self::Greater => ">",
            Self::Contains => "contains",
            Self::ContainsOnly => "contains only",
            Self::Regex => "regex",
            Self::RegexOnly => "regex only",
            Self::HasAnyModification => "has any modification",
            Self::HasDescription => "has description",
            Self::HasMass => "has mass",
            Self::HasResidue => "has residue",
        }
    }

    /// The abbreviation used on the command line
    pub const fn cli_short(&self) -> &'static str {
        match self {
            Self::Less => "LT",
            Self::LessEqual => "LEQ",
            Self::Equal => "EQ",
            Self::GreaterEqual => "GEQ",
            Self::Greater => "GT",
            Self::Contains => "CON",
            Self::ContainsOnly => "COO",
            Self::Regex => "REG",
            Self::RegexOnly => "RXO",
            Self::HasAnyModification => "HAM",
            Self::HasDescription => "DEC",
            Self::HasMass => "MAS",
            Self::HasResidue => "RES",
        }
    }

    /// Resolve a comparator from its name, label or command line abbreviation
    pub fn from_descriptor(descriptor: &str) -> Option<Self> {
        let descriptor = descriptor.trim();
        Self::ALL.iter().copied().find(|c| {
            c.name() == descriptor
                || c.label() == descriptor
                || c.cli_short().eq_ignore_ascii_case(descriptor)
        })
    }
}

impl Display for FilterComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The kind of value a filter works on, which fixes the allowed comparators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterType {
    Bool,
    Numerical,
    Literal,
    LiteralList,
    Modification,
}

impl FilterType {
    pub const fn comparators(&self) -> &'static [FilterComparator] {
        use FilterComparator::*;
        match self {
            Self::Bool => &[Equal],
            Self::Numerical => &[Less, LessEqual, Equal, GreaterEqual, Greater],
            Self::Literal => &[Equal, Contains, Regex],
            Self::LiteralList => &[Contains, ContainsOnly, Regex, RegexOnly],
            Self::Modification => &[HasAnyModification, HasDescription, HasMass, HasResidue],
        }
    }

    pub fn supports(&self, comparator: FilterComparator) -> bool {
        self.comparators().contains(&comparator)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Numerical => "numerical",
            Self::Literal => "literal",
            Self::LiteralList => "literal_list",
            Self::Modification => "modification",
        }
    }
}

impl Display for FilterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
