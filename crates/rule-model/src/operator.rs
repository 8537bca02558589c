//! Comparison Operators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operator string that does not name a known comparison
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown comparison operator: {0:?}")]
pub struct UnknownOperator(pub String);

/// Comparison applied between an observed value and a rule threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    /// observed > threshold
    Gt,
    /// observed >= threshold
    Gte,
    /// observed < threshold
    Lt,
    /// observed <= threshold
    Lte,
    /// observed == threshold (exact)
    Eq,
    /// observed != threshold (exact)
    Neq,
}

impl ComparisonOperator {
    /// All operators, in canonical order
    pub const ALL: [ComparisonOperator; 6] = [
        ComparisonOperator::Gt,
        ComparisonOperator::Gte,
        ComparisonOperator::Lt,
        ComparisonOperator::Lte,
        ComparisonOperator::Eq,
        ComparisonOperator::Neq,
    ];

    /// Evaluate `observed <op> threshold`.
    ///
    /// Equality is exact. A NaN on either side fails every comparison,
    /// including `Neq`.
    pub fn evaluate(self, threshold: f64, observed: f64) -> bool {
        if observed.is_nan() || threshold.is_nan() {
            return false;
        }

        match self {
            ComparisonOperator::Gt => observed > threshold,
            ComparisonOperator::Gte => observed >= threshold,
            ComparisonOperator::Lt => observed < threshold,
            ComparisonOperator::Lte => observed <= threshold,
            ComparisonOperator::Eq => observed == threshold,
            ComparisonOperator::Neq => observed != threshold,
        }
    }

    /// Canonical short name
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOperator::Gt => "gt",
            ComparisonOperator::Gte => "gte",
            ComparisonOperator::Lt => "lt",
            ComparisonOperator::Lte => "lte",
            ComparisonOperator::Eq => "eq",
            ComparisonOperator::Neq => "neq",
        }
    }

    /// Mathematical symbol, for log lines
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Gte => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Lte => "<=",
            ComparisonOperator::Eq => "==",
            ComparisonOperator::Neq => "!=",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonOperator {
    type Err = UnknownOperator;

    /// Accepts the spellings seen in authoring forms and seed data:
    /// short names, symbols, and long snake_case names.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let op = match normalized.as_str() {
            "gt" | ">" | "greater_than" => ComparisonOperator::Gt,
            "gte" | "ge" | ">=" | "greater_than_or_equal" => ComparisonOperator::Gte,
            "lt" | "<" | "less_than" => ComparisonOperator::Lt,
            "lte" | "le" | "<=" | "less_than_or_equal" => ComparisonOperator::Lte,
            "eq" | "=" | "==" | "equal" | "equals" => ComparisonOperator::Eq,
            "neq" | "ne" | "!=" | "<>" | "not_equal" => ComparisonOperator::Neq,
            _ => return Err(UnknownOperator(raw.to_string())),
        };
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_comparisons() {
        assert!(ComparisonOperator::Gt.evaluate(30.0, 31.0));
        assert!(!ComparisonOperator::Gt.evaluate(30.0, 29.0));
        assert!(ComparisonOperator::Lt.evaluate(200.0, 150.0));
        assert!(!ComparisonOperator::Lt.evaluate(200.0, 250.0));
        assert!(ComparisonOperator::Neq.evaluate(1.0, 0.0));
    }

    #[test]
    fn test_exact_equality() {
        assert!(ComparisonOperator::Eq.evaluate(1.0, 1.0));
        assert!(!ComparisonOperator::Eq.evaluate(1.0, 0.0));
        assert!(!ComparisonOperator::Eq.evaluate(1.0, 1.0 + f64::EPSILON));
        assert!(ComparisonOperator::Eq.evaluate(0.0, -0.0));
    }

    #[test]
    fn test_nan_fails_every_operator() {
        for op in ComparisonOperator::ALL {
            assert!(!op.evaluate(1.0, f64::NAN), "{op} fired on NaN reading");
            assert!(!op.evaluate(f64::NAN, 1.0), "{op} fired on NaN threshold");
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(">".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Gt));
        assert_eq!(" GTE ".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Gte));
        assert_eq!("less_than".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Lt));
        assert_eq!("==".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Eq));
        assert_eq!("<>".parse::<ComparisonOperator>(), Ok(ComparisonOperator::Neq));
        assert!("between".parse::<ComparisonOperator>().is_err());
    }

    #[test]
    fn test_canonical_names_round_trip() {
        for op in ComparisonOperator::ALL {
            assert_eq!(op.as_str().parse::<ComparisonOperator>(), Ok(op));
            assert_eq!(op.symbol().parse::<ComparisonOperator>(), Ok(op));
        }
    }

    proptest! {
        #[test]
        fn prop_reflexive_operators(a in any::<f64>().prop_filter("not NaN", |v| !v.is_nan())) {
            for op in ComparisonOperator::ALL {
                let expected = matches!(
                    op,
                    ComparisonOperator::Gte | ComparisonOperator::Lte | ComparisonOperator::Eq
                );
                prop_assert_eq!(op.evaluate(a, a), expected);
            }
        }

        #[test]
        fn prop_strict_and_inclusive_agree(t in -1.0e9f64..1.0e9, v in -1.0e9f64..1.0e9) {
            let gt = ComparisonOperator::Gt.evaluate(t, v);
            let eq = ComparisonOperator::Eq.evaluate(t, v);
            prop_assert_eq!(ComparisonOperator::Gte.evaluate(t, v), gt || eq);
            prop_assert_eq!(ComparisonOperator::Lte.evaluate(t, v), !gt);
            prop_assert_eq!(ComparisonOperator::Neq.evaluate(t, v), !eq);
        }
    }
}
