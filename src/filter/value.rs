use std::fmt::Display;

use regex::Regex;

use crate::graph::Modification;

use super::comparator::FilterComparator;

/// Mass tolerance in Dalton for [`FilterComparator::HasMass`]
pub const MODIFICATION_MASS_TOLERANCE: f64 = 0.001;

/// The value a filter compares against
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FilterValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl Display for FilterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// A value pulled out of a report item for filtering
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
    Modifications(Vec<Modification>),
    /// Several scalar values which must all satisfy the filter
    Collection(Vec<ItemValue>),
}

impl ItemValue {
    pub fn number<T: num_traits::ToPrimitive>(value: T) -> Self {
        match value.to_f64() {
            Some(v) => Self::Number(v),
            None => Self::Null,
        }
    }

    pub fn count(value: usize) -> Self {
        Self::number(value)
    }
}

impl From<Option<f64>> for ItemValue {
    fn from(value: Option<f64>) -> Self {
        match value {
            Some(v) => Self::Number(v),
            None => Self::Null,
        }
    }
}

/// Evaluate `comparator` between an item value and the filter value. A
/// missing item value never satisfies a filter, negated or not.
pub(crate) fn satisfies(
    comparator: FilterComparator,
    item: &ItemValue,
    value: &FilterValue,
    regex: Option<&Regex>,
    negate: bool,
) -> bool {
    use FilterComparator as C;
    let result = match (item, value) {
        (ItemValue::Null, _) => return false,
        (ItemValue::Collection(values), _) => {
            return !values.is_empty()
                && values
                    .iter()
                    .all(|v| satisfies(comparator, v, value, regex, negate))
        }
        (ItemValue::Bool(b), FilterValue::Bool(v)) => comparator == C::Equal && b == v,
        (ItemValue::Number(x), FilterValue::Number(v)) => match comparator {
            C::Less => x < v,
            C::LessEqual => x <= v,
            C::Equal => x == v,
            C::GreaterEqual => x >= v,
            C::Greater => x > v,
            _ => false,
        },
        (ItemValue::Text(s), FilterValue::Text(v)) => match comparator {
            C::Equal => s == v,
            C::Contains => s.contains(v.as_str()),
            C::Regex => regex.is_some_and(|r| r.is_match(s)),
            _ => false,
        },
        (ItemValue::TextList(list), FilterValue::Text(v)) => match comparator {
            C::Contains => list.iter().any(|s| s == v),
            C::ContainsOnly => !list.is_empty() && list.iter().all(|s| s == v),
            C::Regex => regex.is_some_and(|r| list.iter().any(|s| r.is_match(s))),
            C::RegexOnly => {
                !list.is_empty() && regex.is_some_and(|r| list.iter().all(|s| r.is_match(s)))
            }
            _ => false,
        },
        (ItemValue::Modifications(mods), value) => match (comparator, value) {
            (C::HasAnyModification, _) => !mods.is_empty(),
            (C::HasDescription, FilterValue::Text(v)) => {
                mods.iter().any(|m| m.description.as_deref() == Some(v.as_str()))
            }
            (C::HasMass, FilterValue::Number(v)) => mods
                .iter()
                .any(|m| (m.mass - v).abs() <= MODIFICATION_MASS_TOLERANCE),
            (C::HasResidue, FilterValue::Text(v)) => mods
                .iter()
                .any(|m| m.residue.is_some_and(|r| r.to_string().starts_with(v.as_str()))),
            _ => false,
        },
        _ => false,
    };
    result != negate
}
