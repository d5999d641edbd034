use std::str::FromStr;

use thiserror::Error;

use super::comparator::{FilterComparator, FilterType};
use super::kind::FilterKind;
use super::value::FilterValue;
use super::Filter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterParseError {
    #[error("the filter expression {0:?} is incomplete, expected `<filter> [not] <comparator> <value>`")]
    Incomplete(String),
    #[error("{0} is not a known filter")]
    UnknownFilter(String),
    #[error("{0} is not a known comparator")]
    UnknownComparator(String),
    #[error("{filter} is a {filter_type} filter and does not support {comparator}")]
    IncompatibleComparator {
        filter: String,
        filter_type: FilterType,
        comparator: String,
    },
    #[error("{value:?} is not a valid {filter_type} value for {filter}")]
    InvalidValue {
        filter: String,
        filter_type: FilterType,
        value: String,
    },
    #[error("invalid regular expression {0:?}: {1}")]
    InvalidRegex(String, String),
}

/// Build a filter from its parts, converting `value` to what the filter type
/// and comparator need
pub fn new_filter(
    short_name: &str,
    comparator: &str,
    value: &str,
    negate: bool,
) -> Result<Filter, FilterParseError> {
    let kind = FilterKind::from_short_name(short_name)
        .ok_or_else(|| FilterParseError::UnknownFilter(short_name.to_string()))?;
    let comparator_ = FilterComparator::from_descriptor(comparator)
        .ok_or_else(|| FilterParseError::UnknownComparator(comparator.to_string()))?;
    let filter_type = kind.filter_type();
    if !filter_type.supports(comparator_) {
        return Err(FilterParseError::IncompatibleComparator {
            filter: short_name.to_string(),
            filter_type,
            comparator: comparator.to_string(),
        });
    }
    let invalid = || FilterParseError::InvalidValue {
        filter: short_name.to_string(),
        filter_type,
        value: value.to_string(),
    };
    let value = value.trim();
    let value = match (filter_type, comparator_) {
        (FilterType::Numerical, _) | (FilterType::Modification, FilterComparator::HasMass) => {
            FilterValue::Number(value.parse::<f64>().map_err(|_| invalid())?)
        }
        (FilterType::Bool, _) => FilterValue::Bool(value.to_lowercase().parse::<bool>().map_err(|_| invalid())?),
        (FilterType::Modification, FilterComparator::HasAnyModification) => FilterValue::Bool(true),
        _ => FilterValue::Text(value.to_string()),
    };
    Filter::new(kind, comparator_, value, negate)
}

/// Parse a filter expression of the form `<filter> [not] <comparator> <value>`.
///
/// The comparator may be given by name, label or command line abbreviation.
/// Everything after the comparator is the value, so values may contain spaces.
pub fn parse_filter(expression: &str) -> Result<Filter, FilterParseError> {
    let incomplete = || FilterParseError::Incomplete(expression.to_string());
    let expression = expression.trim();
    let (short_name, rest) = expression.split_once(char::is_whitespace).ok_or_else(incomplete)?;
    let mut rest = rest.trim_start();
    let mut negate = false;
    if let Some(after) = rest.strip_prefix("not ") {
        negate = true;
        rest = after.trim_start();
    }
    let words: Vec<&str> = rest.split_whitespace().collect();
    if words.is_empty() {
        return Err(incomplete());
    }
    // labels such as "contains only" span several words, prefer the longest
    for n in (1..=words.len().min(3)).rev() {
        let candidate = words[..n].join(" ");
        if FilterComparator::from_descriptor(&candidate).is_some() {
            return new_filter(short_name, &candidate, skip_words(rest, n), negate);
        }
    }
    new_filter(short_name, words[0], skip_words(rest, 1), negate)
}

fn skip_words(s: &str, n: usize) -> &str {
    let mut rest = s.trim_start();
    for _ in 0..n {
        rest = match rest.split_once(char::is_whitespace) {
            Some((_, r)) => r.trim_start(),
            None => "",
        };
    }
    rest
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_filter(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() -> Result<(), FilterParseError> {
        let f = parse_filter("charge_filter <= 2")?;
        assert_eq!(f.kind, FilterKind::Charge);
        assert_eq!(f.comparator, FilterComparator::LessEqual);
        assert_eq!(f.value, FilterValue::Number(2.0));
        assert!(!f.negate);

        let f: Filter = "psm_accessions_filter not regex_only DECOY_.*".parse()?;
        assert!(f.negate);
        assert_eq!(f.comparator, FilterComparator::RegexOnly);

        let f = parse_filter("protein_description_filter CON heat shock protein")?;
        assert_eq!(f.value, FilterValue::Text("heat shock protein".into()));

        let f = parse_filter("psm_accessions_filter contains only P1")?;
        assert_eq!(f.comparator, FilterComparator::ContainsOnly);
        assert_eq!(f.value, FilterValue::Text("P1".into()));

        let f = parse_filter("psm_unique_filter EQ TRUE")?;
        assert_eq!(f.value, FilterValue::Bool(true));

        let f = parse_filter("psm_modifications_filter HAM")?;
        assert_eq!(f.comparator, FilterComparator::HasAnyModification);

        let f = parse_filter("psm_score_filter_mascot_score >= 20")?;
        assert_eq!(f.kind, FilterKind::PSMScore("mascot_score".into()));
        Ok(())
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_filter("no_such_filter < 2"),
            Err(FilterParseError::UnknownFilter(_))
        ));
        assert!(matches!(
            parse_filter("charge_filter ~ 2"),
            Err(FilterParseError::UnknownComparator(_))
        ));
        assert!(matches!(
            parse_filter("charge_filter regex 2"),
            Err(FilterParseError::IncompatibleComparator { .. })
        ));
        assert!(matches!(
            parse_filter("charge_filter < two"),
            Err(FilterParseError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse_filter("psm_sequence_filter regex (PEP"),
            Err(FilterParseError::InvalidRegex(..))
        ));
        assert!(matches!(
            parse_filter("charge_filter"),
            Err(FilterParseError::Incomplete(_))
        ));
    }

    #[test]
    fn test_display_round_trip() -> Result<(), FilterParseError> {
        for expr in [
            "charge_filter not <= 2",
            "psm_sequence_filter contains PEP",
            "nr_peptides_per_protein_filter >= 2",
        ] {
            let f = parse_filter(expr)?;
            assert_eq!(f.to_string(), expr);
            assert_eq!(parse_filter(&f.to_string())?.to_string(), expr);
        }
        Ok(())
    }
}
