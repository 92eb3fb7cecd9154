//! SQL rendering
//!
//! Turns a [`QueryPlan`] into exactly one SQLite statement plus its ordered
//! bind list. Two paging forms exist: a plain LIMIT/OFFSET when no to-many
//! selection join can multiply root rows, and an id-subquery form that bounds
//! distinct roots when one can. A requested total left-joins the data page
//! against a COUNT subquery inside the same statement, so the count comes
//! back even when the page is empty; there is never a second round trip.

use std::fmt::Write;

use crate::query::plan::{JoinKind, QueryPlan};
use crate::query::predicate::Predicate;
use crate::query::values::SqlValue;
use crate::schema::FilterOp;

/// Render the plan into `(sql, binds)`
pub fn render(plan: &QueryPlan) -> (String, Vec<SqlValue>) {
    if !plan.wants_total {
        return render_data(plan);
    }

    // A requested total wraps the data page in a count join so the count
    // survives an empty page: the single count row always comes back, with
    // the data columns null when the page holds no rows.
    let mut sql = String::new();
    let mut binds = Vec::new();

    let pk = &plan.columns[plan.root_pk_column].column;

    sql.push_str("SELECT ");
    for i in 0..plan.columns.len() {
        let _ = write!(sql, "d.c{i}, ");
    }
    let _ = write!(sql, "ct.c_total FROM (SELECT COUNT(DISTINCT t0.{pk}) AS c_total ");
    render_from(&mut sql, plan);
    if let Some(pred) = &plan.predicate {
        sql.push_str(" WHERE ");
        render_predicate(&mut sql, &mut binds, pred);
    }
    sql.push_str(") ct LEFT JOIN (");
    let (data_sql, data_binds) = render_data(plan);
    sql.push_str(&data_sql);
    binds.extend(data_binds);
    sql.push_str(") d ON 1 = 1");

    // Re-assert the page ordering; a join does not promise to keep the
    // inner statement's row order.
    sql.push_str(" ORDER BY ");
    for spec in &plan.order_by {
        if let Some(idx) = plan
            .columns
            .iter()
            .position(|c| c.table == 0 && c.column == spec.column)
        {
            let _ = write!(
                sql,
                "d.c{idx} {}, ",
                if spec.ascending { "ASC" } else { "DESC" }
            );
        }
    }
    let _ = write!(sql, "d.c{} ASC", plan.root_pk_column);
    for idx in plan.group_key_columns() {
        if idx == plan.root_pk_column {
            continue;
        }
        let _ = write!(sql, ", d.c{idx} ASC");
    }

    (sql, binds)
}

/// The data page on its own: selection columns, joins, predicate, ordering
/// and paging
fn render_data(plan: &QueryPlan) -> (String, Vec<SqlValue>) {
    let mut sql = String::new();
    let mut binds = Vec::new();

    let pk = &plan.columns[plan.root_pk_column].column;

    sql.push_str("SELECT ");
    for (i, col) in plan.columns.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        let _ = write!(sql, "t{}.{} AS c{}", col.table, col.column, i);
    }

    sql.push(' ');
    render_from(&mut sql, plan);

    let paged = plan.paging.limit.is_some() || plan.paging.offset > 0;
    let id_subquery = paged && plan.has_to_many_selection();

    let mut where_written = false;
    if let Some(pred) = &plan.predicate {
        sql.push_str(" WHERE ");
        render_predicate(&mut sql, &mut binds, pred);
        where_written = true;
    }
    if id_subquery {
        sql.push_str(if where_written { " AND " } else { " WHERE " });
        // Bound the distinct roots, not the joined rows.
        let _ = write!(sql, "t0.{pk} IN (SELECT t0.{pk} ");
        render_from(&mut sql, plan);
        if let Some(pred) = &plan.predicate {
            sql.push_str(" WHERE ");
            render_predicate(&mut sql, &mut binds, pred);
        }
        let _ = write!(sql, " GROUP BY t0.{pk}");
        render_order(&mut sql, plan, pk);
        sql.push_str(" LIMIT ? OFFSET ?)");
        binds.push(SqlValue::Int(plan.paging.limit.unwrap_or(-1)));
        binds.push(SqlValue::Int(plan.paging.offset));
    }

    render_order(&mut sql, plan, pk);
    // Child group keys pin the row order within each root group.
    for idx in plan.group_key_columns() {
        if idx == plan.root_pk_column {
            continue;
        }
        let col = &plan.columns[idx];
        let _ = write!(sql, ", t{}.{} ASC", col.table, col.column);
    }

    if paged && !id_subquery {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(SqlValue::Int(plan.paging.limit.unwrap_or(-1)));
        binds.push(SqlValue::Int(plan.paging.offset));
    }

    (sql, binds)
}

fn render_from(sql: &mut String, plan: &QueryPlan) {
    let _ = write!(sql, "FROM {} t0", plan.root_table);
    for (i, join) in plan.joins.iter().enumerate() {
        let keyword = match join.kind {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT JOIN",
        };
        let _ = write!(
            sql,
            " {} {} t{} ON t{}.{} = t{}.{}",
            keyword,
            join.table,
            i + 1,
            join.parent,
            join.parent_column,
            i + 1,
            join.child_column,
        );
    }
}

fn render_order(sql: &mut String, plan: &QueryPlan, pk: &str) {
    sql.push_str(" ORDER BY ");
    for spec in &plan.order_by {
        let _ = write!(
            sql,
            "t0.{} {}, ",
            spec.column,
            if spec.ascending { "ASC" } else { "DESC" }
        );
    }
    // Primary-key tiebreak keeps row order stable under join fan-out.
    let _ = write!(sql, "t0.{pk} ASC");
}

fn render_predicate(sql: &mut String, binds: &mut Vec<SqlValue>, predicate: &Predicate) {
    match predicate {
        Predicate::Leaf {
            table,
            column,
            op,
            values,
        } => render_leaf(sql, binds, *table, column, *op, values),
        Predicate::And(children) => render_connective(sql, binds, children, " AND "),
        Predicate::Or(children) => render_connective(sql, binds, children, " OR "),
        Predicate::Not(child) => {
            sql.push_str("NOT (");
            render_predicate(sql, binds, child);
            sql.push(')');
        }
    }
}

fn render_connective(
    sql: &mut String,
    binds: &mut Vec<SqlValue>,
    children: &[Predicate],
    connective: &str,
) {
    sql.push('(');
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            sql.push_str(connective);
        }
        render_predicate(sql, binds, child);
    }
    sql.push(')');
}

fn render_leaf(
    sql: &mut String,
    binds: &mut Vec<SqlValue>,
    table: usize,
    column: &str,
    op: FilterOp,
    values: &[SqlValue],
) {
    let col = format!("t{table}.{column}");
    match op {
        FilterOp::Eq => bind_compare(sql, binds, &col, "=", values),
        FilterOp::Ne => bind_compare(sql, binds, &col, "<>", values),
        FilterOp::Gt => bind_compare(sql, binds, &col, ">", values),
        FilterOp::Ge => bind_compare(sql, binds, &col, ">=", values),
        FilterOp::Lt => bind_compare(sql, binds, &col, "<", values),
        FilterOp::Le => bind_compare(sql, binds, &col, "<=", values),
        FilterOp::In | FilterOp::NotIn => {
            if values.is_empty() {
                // Empty membership lists degenerate to constants.
                sql.push_str(if op == FilterOp::In { "1 = 0" } else { "1 = 1" });
                return;
            }
            let _ = write!(
                sql,
                "{col} {}(",
                if op == FilterOp::In { "IN " } else { "NOT IN " }
            );
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    sql.push_str(", ");
                }
                sql.push('?');
                binds.push(value.clone());
            }
            sql.push(')');
        }
        FilterOp::Like => match values.first() {
            // SQLite LIKE is ASCII case-insensitive, so wildcard patterns
            // are rewritten to GLOB and plain terms to instr, both
            // case-sensitive.
            Some(SqlValue::Text(s)) if s.contains('%') || s.contains('_') => {
                let _ = write!(sql, "{col} GLOB ?");
                binds.push(SqlValue::Text(glob_pattern(s)));
            }
            Some(value) => {
                let _ = write!(sql, "instr({col}, ?) > 0");
                binds.push(value.clone());
            }
            None => {
                let _ = write!(sql, "instr({col}, ?) > 0");
                binds.push(SqlValue::Null);
            }
        },
        FilterOp::StartsWith => {
            let _ = write!(sql, "{col} GLOB ?");
            binds.push(anchored_glob(values, false));
        }
        FilterOp::EndsWith => {
            let _ = write!(sql, "{col} GLOB ?");
            binds.push(anchored_glob(values, true));
        }
        FilterOp::IsNull => {
            let _ = write!(sql, "{col} IS NULL");
        }
        FilterOp::IsNotNull => {
            let _ = write!(sql, "{col} IS NOT NULL");
        }
        FilterOp::Between => {
            let _ = write!(sql, "{col} BETWEEN ? AND ?");
            binds.extend(values.iter().cloned());
        }
    }
}

fn bind_compare(
    sql: &mut String,
    binds: &mut Vec<SqlValue>,
    col: &str,
    operator: &str,
    values: &[SqlValue],
) {
    let _ = write!(sql, "{col} {operator} ?");
    if let Some(value) = values.first() {
        binds.push(value.clone());
    }
}

/// Rewrite a LIKE pattern as a GLOB pattern: `%` -> `*`, `_` -> `?`, with
/// GLOB's own metacharacters bracket-escaped
fn glob_pattern(like: &str) -> String {
    let mut out = String::with_capacity(like.len());
    for c in like.chars() {
        match c {
            '%' => out.push('*'),
            '_' => out.push('?'),
            '*' => out.push_str("[*]"),
            '?' => out.push_str("[?]"),
            '[' => out.push_str("[[]"),
            other => out.push(other),
        }
    }
    out
}

/// Escape a literal term for GLOB matching
fn glob_escape(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        match c {
            '*' => out.push_str("[*]"),
            '?' => out.push_str("[?]"),
            '[' => out.push_str("[[]"),
            other => out.push(other),
        }
    }
    out
}

/// STARTS_WITH / ENDS_WITH argument as an anchored GLOB pattern
fn anchored_glob(values: &[SqlValue], leading: bool) -> SqlValue {
    match values.first() {
        Some(SqlValue::Text(s)) => {
            let escaped = glob_escape(s);
            if leading {
                SqlValue::Text(format!("*{escaped}"))
            } else {
                SqlValue::Text(format!("{escaped}*"))
            }
        }
        Some(other) => other.clone(),
        None => SqlValue::Null,
    }
}
