//! Filter operators exposed by generated filter-input types
//!
//! Operator availability depends on the scalar kind of the attribute:
//! - EQ, NE, IN, NOT_IN on every kind
//! - GT, GE, LT, LE, BETWEEN on numeric and date kinds
//! - LIKE, STARTS_WITH, ENDS_WITH on text
//! - IS_NULL, IS_NOT_NULL on nullable attributes

use crate::metamodel::ScalarKind;

/// One comparison operator of the filter grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    /// Case-sensitive substring or wildcard match
    Like,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
    /// Inclusive two-element bound
    Between,
}

impl FilterOp {
    /// Resolve the uppercase wire name used in filter arguments
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "EQ" => Self::Eq,
            "NE" => Self::Ne,
            "GT" => Self::Gt,
            "GE" => Self::Ge,
            "LT" => Self::Lt,
            "LE" => Self::Le,
            "IN" => Self::In,
            "NOT_IN" => Self::NotIn,
            "LIKE" => Self::Like,
            "STARTS_WITH" => Self::StartsWith,
            "ENDS_WITH" => Self::EndsWith,
            "IS_NULL" => Self::IsNull,
            "IS_NOT_NULL" => Self::IsNotNull,
            "BETWEEN" => Self::Between,
            _ => return None,
        })
    }

    /// The wire name, for error messages and schema dumps
    pub fn name(self) -> &'static str {
        match self {
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Gt => "GT",
            Self::Ge => "GE",
            Self::Lt => "LT",
            Self::Le => "LE",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
            Self::Like => "LIKE",
            Self::StartsWith => "STARTS_WITH",
            Self::EndsWith => "ENDS_WITH",
            Self::IsNull => "IS_NULL",
            Self::IsNotNull => "IS_NOT_NULL",
            Self::Between => "BETWEEN",
        }
    }

    /// Whether the operator takes a list-shaped argument
    pub fn takes_list(self) -> bool {
        matches!(self, Self::In | Self::NotIn | Self::Between)
    }
}

/// The operator set generated for an attribute of the given kind
///
/// Deterministic order so regenerated schemas compare structurally equal.
pub fn operators_for(kind: ScalarKind, nullable: bool) -> Vec<FilterOp> {
    let mut ops = vec![FilterOp::Eq, FilterOp::Ne];

    if kind.is_ordered() {
        ops.extend([FilterOp::Gt, FilterOp::Ge, FilterOp::Lt, FilterOp::Le]);
    }
    if kind == ScalarKind::Text {
        ops.extend([FilterOp::Like, FilterOp::StartsWith, FilterOp::EndsWith]);
    }

    ops.extend([FilterOp::In, FilterOp::NotIn]);

    if kind.is_ordered() {
        ops.push(FilterOp::Between);
    }
    if nullable {
        ops.extend([FilterOp::IsNull, FilterOp::IsNotNull]);
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_every_operator() {
        for op in [
            FilterOp::Eq,
            FilterOp::Ne,
            FilterOp::Gt,
            FilterOp::Ge,
            FilterOp::Lt,
            FilterOp::Le,
            FilterOp::In,
            FilterOp::NotIn,
            FilterOp::Like,
            FilterOp::StartsWith,
            FilterOp::EndsWith,
            FilterOp::IsNull,
            FilterOp::IsNotNull,
            FilterOp::Between,
        ] {
            assert_eq!(FilterOp::parse(op.name()), Some(op));
        }
        assert_eq!(FilterOp::parse("CONTAINS"), None);
    }

    #[test]
    fn text_gets_pattern_operators_but_no_ordering() {
        let ops = operators_for(ScalarKind::Text, false);
        assert!(ops.contains(&FilterOp::Like));
        assert!(ops.contains(&FilterOp::StartsWith));
        assert!(!ops.contains(&FilterOp::Gt));
        assert!(!ops.contains(&FilterOp::Between));
        assert!(!ops.contains(&FilterOp::IsNull));
    }

    #[test]
    fn nullable_date_gets_ordering_range_and_null_checks() {
        let ops = operators_for(ScalarKind::Date, true);
        for op in [
            FilterOp::Ge,
            FilterOp::Between,
            FilterOp::IsNull,
            FilterOp::IsNotNull,
        ] {
            assert!(ops.contains(&op), "missing {}", op.name());
        }
        assert!(!ops.contains(&FilterOp::Like));
    }

    #[test]
    fn bool_is_equality_and_membership_only() {
        let ops = operators_for(ScalarKind::Bool, false);
        assert_eq!(
            ops,
            vec![FilterOp::Eq, FilterOp::Ne, FilterOp::In, FilterOp::NotIn]
        );
    }
}
