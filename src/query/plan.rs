//! Query plan model
//!
//! The transient output of translation: root entity, ordered join
//! specifications keyed by relation path, the predicate tree, ordering,
//! paging bounds, and the shape tree the assembler regroups rows by.
//! One plan per request, discarded after execution.

use indexmap::IndexMap;

use crate::metamodel::{Cardinality, ScalarKind};
use crate::query::predicate::Predicate;

/// Join kind selection: filter joins are inner, joins that exist only to
/// populate optional nested output are left-outer. When both need the same
/// path the filter join wins and is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// One join edge of the plan
///
/// Table indices: 0 is the root table, join `i` owns table index `i + 1`.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Relation path from the root, e.g. `["author", "publisher"]`
    pub path: Vec<String>,
    pub entity: String,
    pub table: String,
    pub kind: JoinKind,
    /// Table index of the parent side
    pub parent: usize,
    pub parent_column: String,
    pub child_column: String,
    pub cardinality: Cardinality,
}

/// Path-keyed join registry guaranteeing one join per distinct relation path
#[derive(Debug, Default)]
pub struct JoinRegistry {
    joins: Vec<JoinSpec>,
    by_path: IndexMap<Vec<String>, usize>,
}

impl JoinRegistry {
    /// Register or reuse the join for `path`, returning its table index
    ///
    /// A later `Inner` request upgrades an existing `LeftOuter` join in
    /// place; the reverse never downgrades.
    pub fn resolve(&mut self, spec: JoinSpec) -> usize {
        if let Some(&idx) = self.by_path.get(&spec.path) {
            if spec.kind == JoinKind::Inner {
                self.joins[idx].kind = JoinKind::Inner;
            }
            return idx + 1;
        }
        let idx = self.joins.len();
        self.by_path.insert(spec.path.clone(), idx);
        self.joins.push(spec);
        idx + 1
    }

    pub fn into_joins(self) -> Vec<JoinSpec> {
        self.joins
    }
}

/// One selected output column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSel {
    pub table: usize,
    pub column: String,
    pub kind: ScalarKind,
}

/// Column registry deduplicating (table, column) pairs across selection,
/// grouping keys and aggregates
#[derive(Debug, Default)]
pub struct ColumnRegistry {
    columns: Vec<ColumnSel>,
}

impl ColumnRegistry {
    pub fn resolve(&mut self, table: usize, column: &str, kind: ScalarKind) -> usize {
        if let Some(idx) = self
            .columns
            .iter()
            .position(|c| c.table == table && c.column == column)
        {
            return idx;
        }
        self.columns.push(ColumnSel {
            table,
            column: column.to_string(),
            kind,
        });
        self.columns.len() - 1
    }

    pub fn into_columns(self) -> Vec<ColumnSel> {
        self.columns
    }
}

/// Resolved paging bounds; `limit` absent means unbounded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paging {
    pub offset: i64,
    pub limit: Option<i64>,
}

/// Aggregation over a to-many relation's grouped rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "count" => Self::Count,
            "sum" => Self::Sum,
            "avg" => Self::Avg,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        })
    }
}

/// One requested aggregate field
#[derive(Debug, Clone)]
pub struct AggregateSel {
    pub key: String,
    pub func: AggregateFunc,
    /// Source column, absent for `count`
    pub column: Option<usize>,
}

/// Assembly shape: mirrors the selection tree with resolved column indices
#[derive(Debug, Clone)]
pub enum ShapeNode {
    Scalar {
        key: String,
        column: usize,
    },
    Object {
        key: String,
        table: usize,
        cardinality: Cardinality,
        /// Grouping key for fan-out deduplication
        pk_column: usize,
        children: Vec<ShapeNode>,
    },
    /// The `aggregate` wrapper of a to-many relation, computed from the
    /// relation's grouped rows in the same round trip
    Aggregate {
        key: String,
        items: Vec<AggregateSel>,
    },
}

/// The result envelope fields requested at the root
#[derive(Debug, Clone)]
pub enum EnvelopeField {
    /// The `select` list with its assembly shape
    Select(ShapeNode),
    /// Total matching root count, ignoring paging
    Total { key: String },
    /// Page count for the supplied limit
    Pages { key: String },
}

/// The full translation output for one root field
#[derive(Debug)]
pub struct QueryPlan {
    pub entity: String,
    /// Response key of the root field (alias-aware)
    pub response_key: String,
    pub root_table: String,
    pub root_pk_column: usize,
    pub joins: Vec<JoinSpec>,
    pub columns: Vec<ColumnSel>,
    pub predicate: Option<Predicate>,
    /// Root-attribute ordering, applied before the implicit primary-key
    /// tiebreak
    pub order_by: Vec<OrderSpec>,
    pub paging: Paging,
    pub envelope: Vec<EnvelopeField>,
    /// Whether a total count subquery must be embedded in the statement
    pub wants_total: bool,
}

/// One `orderBy` entry, resolved to a root column
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub column: String,
    pub ascending: bool,
}

impl QueryPlan {
    /// Whether any selected to-many join can multiply root rows
    pub fn has_to_many_selection(&self) -> bool {
        self.joins
            .iter()
            .any(|j| j.cardinality == Cardinality::ToMany)
    }

    /// Group-key columns of the assembly tree, root first, depth-first
    ///
    /// Ordering result rows by these keys makes the regrouped output
    /// deterministic under join fan-out.
    pub fn group_key_columns(&self) -> Vec<usize> {
        fn collect(node: &ShapeNode, out: &mut Vec<usize>) {
            if let ShapeNode::Object {
                pk_column,
                children,
                ..
            } = node
            {
                if !out.contains(pk_column) {
                    out.push(*pk_column);
                }
                for child in children {
                    collect(child, out);
                }
            }
        }

        let mut keys = Vec::new();
        for field in &self.envelope {
            if let EnvelopeField::Select(shape) = field {
                collect(shape, &mut keys);
            }
        }
        keys
    }
}
