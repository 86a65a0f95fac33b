//! Format, value and type homogeneity within text columns.

use crate::error::Result;
use crate::types::{ConsistencyReport, DatasetProfile, FormatIssue, TypeIssue, ValueInconsistency};
use crate::utils::{cell_keys, round_to};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};

static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("Invalid regex: date prefix"));

/// Score penalty per column with more than one structural pattern.
const FORMAT_PENALTY: f64 = 10.0;

/// Inferred type of a single text value, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum ValueType {
    Numeric,
    Date,
    Text,
}

impl ValueType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::Text => "text",
        }
    }

    fn infer(value: &str) -> Self {
        if value.trim().parse::<f64>().is_ok() {
            Self::Numeric
        } else if DATE_PREFIX.is_match(value) {
            Self::Date
        } else {
            Self::Text
        }
    }
}

pub struct ConsistencyAnalyzer;

impl ConsistencyAnalyzer {
    pub fn analyze(df: &DataFrame, profile: &DatasetProfile) -> Result<ConsistencyReport> {
        let mut format_consistency = BTreeMap::new();
        let mut value_consistency = BTreeMap::new();
        let mut type_consistency = BTreeMap::new();

        for name in profile.text_columns() {
            let values: Vec<String> = cell_keys(df.column(name)?.as_materialized_series())?
                .into_iter()
                .flatten()
                .collect();
            let distinct = distinct_in_order(&values);

            if let Some(issue) = Self::check_format(&distinct) {
                format_consistency.insert(name.to_string(), issue);
            }
            let collisions = Self::check_values(&distinct);
            if !collisions.is_empty() {
                value_consistency.insert(name.to_string(), collisions);
            }
            if let Some(issue) = Self::check_types(&values) {
                type_consistency.insert(name.to_string(), issue);
            }
        }

        let score = 100.0 - FORMAT_PENALTY * format_consistency.len() as f64;

        let mut recommendations = Vec::new();
        if !format_consistency.is_empty() {
            recommendations.push(format!(
                "Found format inconsistencies in {} columns. Standardize formats.",
                format_consistency.len()
            ));
        }
        if !value_consistency.is_empty() {
            recommendations.push(format!(
                "Found value inconsistencies in {} columns. Normalize values.",
                value_consistency.len()
            ));
        }
        if !type_consistency.is_empty() {
            recommendations.push(format!(
                "Found type inconsistencies in {} columns. Convert to consistent types.",
                type_consistency.len()
            ));
        }

        Ok(ConsistencyReport {
            format_consistency,
            value_consistency,
            type_consistency,
            score,
            recommendations,
        })
    }

    fn check_format(distinct: &[&str]) -> Option<FormatIssue> {
        let mut patterns: BTreeMap<String, usize> = BTreeMap::new();
        for value in distinct {
            *patterns.entry(structural_pattern(value)).or_insert(0) += 1;
        }
        if patterns.len() <= 1 {
            return None;
        }

        let max = patterns.values().copied().max().unwrap_or(0);
        let total: usize = patterns.values().sum();
        Some(FormatIssue {
            pattern_count: patterns.len(),
            consistency_score: round_to(max as f64 / total as f64 * 100.0, 2),
            patterns,
        })
    }

    fn check_values(distinct: &[&str]) -> Vec<ValueInconsistency> {
        let mut first_seen: HashMap<String, &str> = HashMap::new();
        let mut collisions = Vec::new();
        for &value in distinct {
            let normalized = value.trim().to_lowercase();
            match first_seen.get(&normalized) {
                Some(&first) => collisions.push(ValueInconsistency {
                    original_values: [first.to_string(), value.to_string()],
                    issue: "case_or_whitespace_difference".to_string(),
                }),
                None => {
                    first_seen.insert(normalized, value);
                }
            }
        }
        collisions
    }

    fn check_types(values: &[String]) -> Option<TypeIssue> {
        let mut distribution: BTreeMap<ValueType, usize> = BTreeMap::new();
        for value in values {
            *distribution.entry(ValueType::infer(value)).or_insert(0) += 1;
        }
        if distribution.len() <= 1 {
            return None;
        }

        // BTreeMap iterates in tie-break order; keep the first maximum.
        let (dominant, _) = distribution
            .iter()
            .fold(None::<(ValueType, usize)>, |best, (&t, &n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((t, n)),
            })?;

        Some(TypeIssue {
            mixed_types: distribution
                .iter()
                .map(|(t, &n)| (t.as_str().to_string(), n))
                .collect(),
            dominant_type: dominant.as_str().to_string(),
        })
    }
}

/// Map ASCII digits to `N` and ASCII letters to `A`, keeping everything else.
pub(crate) fn structural_pattern(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                'N'
            } else if c.is_ascii_alphabetic() {
                'A'
            } else {
                c
            }
        })
        .collect()
}

fn distinct_in_order(values: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(String::as_str)
        .filter(|v| seen.insert(*v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::ColumnProfiler;
    use pretty_assertions::assert_eq;

    fn analyze(df: &DataFrame) -> ConsistencyReport {
        let profile = ColumnProfiler::profile(df).unwrap();
        ConsistencyAnalyzer::analyze(df, &profile).unwrap()
    }

    #[test]
    fn test_structural_pattern() {
        assert_eq!(structural_pattern("AB-123"), "AA-NNN");
        assert_eq!(structural_pattern("2024-01-05"), "NNNN-NN-NN");
        assert_eq!(structural_pattern("é1"), "éN");
    }

    #[test]
    fn test_format_inconsistency_reported() {
        let df = df![
            "phone" => ["555-1234", "555-9876", "5551234", "555-1234"],
        ]
        .unwrap();

        let report = analyze(&df);
        let issue = &report.format_consistency["phone"];
        assert_eq!(issue.pattern_count, 2);
        assert_eq!(issue.patterns["NNN-NNNN"], 2);
        assert_eq!(issue.patterns["NNNNNNN"], 1);
        assert_eq!(issue.consistency_score, 66.67);
        assert_eq!(report.score, 90.0);
        assert_eq!(
            report.recommendations[0],
            "Found format inconsistencies in 1 columns. Standardize formats."
        );
        // "5551234" parses as a number while the dashed values do not.
        assert_eq!(report.type_consistency["phone"].dominant_type, "text");
    }

    #[test]
    fn test_value_inconsistency_pairs_first_occurrence() {
        let df = df![
            "city" => ["Paris", "paris ", "Oslo", "PARIS", "Oslo"],
        ]
        .unwrap();

        let report = analyze(&df);
        let collisions = &report.value_consistency["city"];
        assert_eq!(collisions.len(), 2);
        assert_eq!(
            collisions[0].original_values,
            ["Paris".to_string(), "paris ".to_string()]
        );
        assert_eq!(
            collisions[1].original_values,
            ["Paris".to_string(), "PARIS".to_string()]
        );
        assert_eq!(collisions[0].issue, "case_or_whitespace_difference");
    }

    #[test]
    fn test_type_inconsistency_dominant_type() {
        let df = df![
            "mixed" => ["12", "3.5", "2024-01-01", "hello", " 7 "],
        ]
        .unwrap();

        let report = analyze(&df);
        let issue = &report.type_consistency["mixed"];
        assert_eq!(issue.mixed_types["numeric"], 3);
        assert_eq!(issue.mixed_types["date"], 1);
        assert_eq!(issue.mixed_types["text"], 1);
        assert_eq!(issue.dominant_type, "numeric");
    }

    #[test]
    fn test_type_tie_prefers_numeric_then_date() {
        let df = df![
            "t" => ["2024-02-02", "word", "2024-03-03", "other"],
        ]
        .unwrap();

        let report = analyze(&df);
        assert_eq!(report.type_consistency["t"].dominant_type, "date");
    }

    #[test]
    fn test_numeric_columns_are_ignored() {
        let df = df![
            "n" => [1i64, 22, 333],
        ]
        .unwrap();

        let report = analyze(&df);
        assert!(report.format_consistency.is_empty());
        assert!(report.type_consistency.is_empty());
        assert_eq!(report.score, 100.0);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn test_score_goes_negative_without_clamping() {
        let columns: Vec<Column> = (0..11)
            .map(|i| Column::new(format!("c{i}").into(), &["a1", "1a"]))
            .collect();
        let df = DataFrame::new(columns).unwrap();

        let report = analyze(&df);
        assert_eq!(report.format_consistency.len(), 11);
        assert_eq!(report.score, -10.0);
    }
}
