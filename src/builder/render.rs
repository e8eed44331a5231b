//! Shared, pure rendering logic for the seven statement kinds.
//! Dialect differences are confined to `column_type` and a couple of flag
//! suffixes; everything else is identical text assembly.

use super::Dialect;
use crate::condition::Condition;
use crate::error::{Result, TableSyncError};
use crate::field::{ColumnDescriptor, ColumnFlags, FieldValue};
use crate::statement::{Statement, StatementKind};

/// Renders `stmt` for `dialect`. When `inline` is true, values are rendered
/// as SQL literals and the returned parameter vector is empty (diagnostic
/// path); when false, columns bind to positional `?` placeholders and the
/// parameter vector carries one `FieldValue` per placeholder, in order.
pub fn render(dialect: Dialect, stmt: &Statement, inline: bool) -> Result<(String, Vec<FieldValue>)> {
    let kind = stmt.kind.ok_or(TableSyncError::NoTable)?;
    match kind {
        StatementKind::CreateTable => Ok((render_create_table(dialect, stmt)?, Vec::new())),
        StatementKind::DropTable => Ok((render_drop_table(stmt)?, Vec::new())),
        StatementKind::RenameTable => Ok((render_rename_table(stmt)?, Vec::new())),
        StatementKind::Insert => render_insert(dialect, stmt, inline),
        StatementKind::Update => render_update(dialect, stmt, inline),
        StatementKind::Delete => render_delete(dialect, stmt, inline),
        StatementKind::Select => Ok((render_select(dialect, stmt)?, Vec::new())),
        StatementKind::Grant | StatementKind::Revoke => {
            // Grant/Revoke affect ledger-level role metadata, not the
            // replicated SQL table; the Builder has nothing to emit.
            Ok((String::new(), Vec::new()))
        }
    }
}

fn table_name(stmt: &Statement) -> Result<&str> {
    stmt.tables.first().map(|s| s.as_str()).ok_or(TableSyncError::NoTable)
}

fn column_type(dialect: Dialect, value: &FieldValue, length: i32) -> String {
    match dialect {
        Dialect::Sqlite => match value {
            FieldValue::Int32(_) | FieldValue::Int64(_) => "INTEGER".to_string(),
            FieldValue::Float32(_) | FieldValue::Float64(_) | FieldValue::Decimal(_, _) => {
                "REAL".to_string()
            }
            FieldValue::String(_) | FieldValue::Varchar(_) | FieldValue::Text(_) => {
                "TEXT".to_string()
            }
            FieldValue::Blob(_) => "BLOB".to_string(),
            FieldValue::DateTime(_) => "NUMERIC".to_string(),
        },
        Dialect::MySql => match value {
            FieldValue::Int32(_) | FieldValue::Int64(_) => {
                if length > 0 {
                    format!("INT({})", length)
                } else {
                    "INT".to_string()
                }
            }
            FieldValue::Float32(_) => "FLOAT".to_string(),
            FieldValue::Float64(_) => "DOUBLE".to_string(),
            FieldValue::Decimal(_, _) => {
                if length > 0 {
                    format!("DECIMAL({})", length)
                } else {
                    "DECIMAL".to_string()
                }
            }
            FieldValue::Varchar(_) => {
                if length > 0 {
                    format!("VARCHAR({})", length)
                } else {
                    "VARCHAR".to_string()
                }
            }
            FieldValue::String(_) | FieldValue::Text(_) => {
                if length > 0 {
                    format!("TEXT({})", length)
                } else {
                    "TEXT".to_string()
                }
            }
            FieldValue::Blob(_) => "BLOB".to_string(),
            FieldValue::DateTime(_) => "datetime".to_string(),
        },
    }
}

fn value_literal(value: &FieldValue) -> String {
    match value {
        FieldValue::Int32(v) => v.to_string(),
        FieldValue::Int64(v) => v.to_string(),
        FieldValue::Float32(v) => format!("{}", v),
        FieldValue::Float64(v) => format!("{}", v),
        FieldValue::Decimal(v, _) => v.to_string(),
        FieldValue::DateTime(v) => v.to_string(),
        FieldValue::String(s) | FieldValue::Varchar(s) | FieldValue::Text(s) => {
            format!("\"{}\"", s)
        }
        FieldValue::Blob(b) => format!("\"{}\"", String::from_utf8_lossy(b)),
    }
}

/// `"null"`/`"nil"`/empty collapse to `DEFAULT NULL` (case-insensitive).
fn default_literal(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    if lower.is_empty() || lower == "null" || lower == "nil" {
        "NULL".to_string()
    } else {
        raw.to_string()
    }
}

fn column_def(dialect: Dialect, col: &ColumnDescriptor) -> String {
    let mut out = format!("{} {}", col.name, column_type(dialect, &col.value, col.length));
    if col.flags.contains(ColumnFlags::PK) {
        out.push_str(" PRIMARY KEY");
    }
    if col.flags.contains(ColumnFlags::NOT_NULL) {
        out.push_str(" NOT NULL");
    }
    if col.flags.contains(ColumnFlags::UNIQUE) {
        out.push_str(" UNIQUE");
    }
    if col.flags.contains(ColumnFlags::AUTO_INCREMENT) {
        out.push_str(match dialect {
            Dialect::Sqlite => " AUTOINCREMENT",
            Dialect::MySql => " AUTO_INCREMENT",
        });
    }
    if dialect == Dialect::MySql && col.flags.contains(ColumnFlags::INDEX) {
        out.push_str(" INDEX");
    }
    if col.flags.contains(ColumnFlags::HAS_DEFAULT) {
        let raw = col.default.as_deref().unwrap_or("");
        out.push_str(&format!(" DEFAULT {}", default_literal(raw)));
    }
    // Trailing space before the column separator, matching the reference
    // builder's emitted text in  scenario (a).
    out.push(' ');
    out
}

fn render_create_table(dialect: Dialect, stmt: &Statement) -> Result<String> {
    let table = table_name(stmt)?;
    if stmt.fields.is_empty() {
        return Err(TableSyncError::MissingFields(
            table.to_string(),
            StatementKind::CreateTable,
        ));
    }
    let cols = stmt
        .fields
        .iter()
        .map(|c| column_def(dialect, c))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("CREATE TABLE IF NOT EXISTS {} ({})", table, cols))
}

fn render_drop_table(stmt: &Statement) -> Result<String> {
    let table = table_name(stmt)?;
    Ok(format!("DROP TABLE IF EXISTS {}", table))
}

fn render_rename_table(stmt: &Statement) -> Result<String> {
    if stmt.tables.len() < 2 {
        return Err(TableSyncError::NoTable);
    }
    Ok(format!("RENAME TABLE {} TO {}", stmt.tables[0], stmt.tables[1]))
}

/// Positional placeholder text for parameterized mode. Sqlite uses the
/// `:i` named-numbered form (SQLite's bind parser accepts it); sqlx's
/// MySQL driver only accepts bare `?`, so the MySQL dialect emits that
/// instead — the binding order is identical in both cases.
fn placeholder(dialect: Dialect, index: usize) -> String {
    match dialect {
        Dialect::Sqlite => format!(":{}", index),
        Dialect::MySql => "?".to_string(),
    }
}

fn render_condition(
    dialect: Dialect,
    cond: &Condition,
    inline: bool,
    next_placeholder: &mut usize,
) -> (String, Vec<FieldValue>) {
    let mut params = Vec::new();
    if cond.is_empty() {
        return (String::new(), params);
    }
    let groups: Vec<String> = cond
        .groups()
        .iter()
        .map(|group| {
            let parts: Vec<String> = group
                .iter()
                .map(|c| {
                    if inline {
                        format!("{}={}", c.name, value_literal(&c.value))
                    } else {
                        let ph = format!("{}={}", c.name, placeholder(dialect, *next_placeholder));
                        *next_placeholder += 1;
                        params.push(c.value.clone());
                        ph
                    }
                })
                .collect();
            format!("({})", parts.join(" AND "))
        })
        .collect();
    (format!(" WHERE {}", groups.join(" OR ")), params)
}

fn render_insert(dialect: Dialect, stmt: &Statement, inline: bool) -> Result<(String, Vec<FieldValue>)> {
    let table = table_name(stmt)?;
    if stmt.fields.is_empty() {
        return Err(TableSyncError::MissingFields(table.to_string(), StatementKind::Insert));
    }
    let cols: Vec<&str> = stmt.fields.iter().map(|c| c.name.as_str()).collect();
    let (vals, params): (Vec<String>, Vec<FieldValue>) = if inline {
        (
            stmt.fields.iter().map(|c| value_literal(&c.value)).collect(),
            Vec::new(),
        )
    } else {
        let placeholders = (1..=stmt.fields.len()).map(|i| placeholder(dialect, i)).collect();
        (placeholders, stmt.fields.iter().map(|c| c.value.clone()).collect())
    };
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        cols.join(","),
        vals.join(",")
    );
    Ok((sql, params))
}

fn render_update(dialect: Dialect, stmt: &Statement, inline: bool) -> Result<(String, Vec<FieldValue>)> {
    let table = table_name(stmt)?;
    if stmt.fields.is_empty() {
        return Err(TableSyncError::MissingFields(table.to_string(), StatementKind::Update));
    }
    let mut next_placeholder = 1usize;
    let mut params = Vec::new();
    let sets: Vec<String> = stmt
        .fields
        .iter()
        .map(|c| {
            if inline {
                format!("{}={}", c.name, value_literal(&c.value))
            } else {
                let ph = format!("{}={}", c.name, placeholder(dialect, next_placeholder));
                next_placeholder += 1;
                params.push(c.value.clone());
                ph
            }
        })
        .collect();
    let (where_clause, mut cond_params) = render_condition(dialect, &stmt.conditions, inline, &mut next_placeholder);
    params.append(&mut cond_params);
    Ok((
        format!("UPDATE {} SET {}{}", table, sets.join(", "), where_clause),
        params,
    ))
}

fn render_delete(dialect: Dialect, stmt: &Statement, inline: bool) -> Result<(String, Vec<FieldValue>)> {
    let table = table_name(stmt)?;
    let mut next_placeholder = 1usize;
    let (where_clause, params) = render_condition(dialect, &stmt.conditions, inline, &mut next_placeholder);
    Ok((format!("DELETE FROM {}{}", table, where_clause), params))
}

fn render_select(dialect: Dialect, stmt: &Statement) -> Result<String> {
    let table = table_name(stmt)?;
    let cols = if stmt.fields.is_empty() {
        "*".to_string()
    } else {
        stmt.fields.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(",")
    };
    let mut next_placeholder = 1usize;
    let (where_clause, _params) = render_condition(dialect, &stmt.conditions, true, &mut next_placeholder);
    Ok(format!("SELECT {} FROM {}{}", cols, table, where_clause))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldValue;

    fn create_stmt() -> Statement {
        let mut s = Statement::new(StatementKind::CreateTable);
        s.add_table("t_abc");
        s.add_field(
            ColumnDescriptor::new("id", FieldValue::Int32(0)).with_flag(ColumnFlags::PK),
        );
        s.add_field(ColumnDescriptor::new("name", FieldValue::Varchar(String::new())).with_length(64));
        s
    }

    #[test]
    fn create_table_sqlite_matches_scenario_a() {
        let (sql, _) = render(Dialect::Sqlite, &create_stmt(), true).unwrap();
        assert_eq!(sql, "CREATE TABLE IF NOT EXISTS t_abc (id INTEGER PRIMARY KEY , name TEXT )");
    }

    #[test]
    fn insert_inline_matches_scenario_a() {
        let mut s = Statement::new(StatementKind::Insert);
        s.add_table("t_abc");
        s.add_field(ColumnDescriptor::new("id", FieldValue::Int32(1)));
        s.add_field(ColumnDescriptor::new("name", FieldValue::Varchar("alice".into())));
        let (sql, params) = render(Dialect::Sqlite, &s, true).unwrap();
        assert_eq!(sql, "INSERT INTO t_abc (id,name) VALUES (1,\"alice\")");
        assert!(params.is_empty());
    }

    #[test]
    fn update_or_of_and_matches_scenario_b() {
        let mut s = Statement::new(StatementKind::Update);
        s.add_table("t_abc");
        s.add_field(ColumnDescriptor::new("name", FieldValue::Varchar("zed".into())));
        s.add_condition(vec![ColumnDescriptor::new("id", FieldValue::Int32(1))]);
        s.add_condition(vec![ColumnDescriptor::new("id", FieldValue::Int32(2))]);
        let (sql, _) = render(Dialect::Sqlite, &s, true).unwrap();
        assert_eq!(sql, "UPDATE t_abc SET name=\"zed\" WHERE (id=1) OR (id=2)");
    }

    #[test]
    fn delete_matches_scenario_c() {
        let mut s = Statement::new(StatementKind::Delete);
        s.add_table("t_abc");
        s.add_condition(vec![ColumnDescriptor::new("id", FieldValue::Int32(1))]);
        let (sql, _) = render(Dialect::Sqlite, &s, true).unwrap();
        assert_eq!(sql, "DELETE FROM t_abc WHERE (id=1)");
    }

    #[test]
    fn select_without_fields_emits_star() {
        let mut s = Statement::new(StatementKind::Select);
        s.add_table("t_abc");
        let (sql, _) = render(Dialect::Sqlite, &s, true).unwrap();
        assert_eq!(sql, "SELECT * FROM t_abc");
    }

    #[test]
    fn default_collapses_null_variants() {
        assert_eq!(default_literal(""), "NULL");
        assert_eq!(default_literal("null"), "NULL");
        assert_eq!(default_literal("NIL"), "NULL");
        assert_eq!(default_literal("0"), "0");
    }

    #[test]
    fn mysql_create_table_uses_dialect_types() {
        let mut s = Statement::new(StatementKind::CreateTable);
        s.add_table("t_abc");
        s.add_field(ColumnDescriptor::new("id", FieldValue::Int32(0)).with_flag(ColumnFlags::PK).with_flag(ColumnFlags::AUTO_INCREMENT));
        s.add_field(ColumnDescriptor::new("name", FieldValue::Varchar(String::new())).with_length(64));
        let (sql, _) = render(Dialect::MySql, &s, true).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS t_abc (id INT PRIMARY KEY AUTO_INCREMENT , name VARCHAR(64) )"
        );
    }

    #[test]
    fn missing_fields_on_create_errors() {
        let mut s = Statement::new(StatementKind::CreateTable);
        s.add_table("t_abc");
        assert!(render(Dialect::Sqlite, &s, true).is_err());
    }

    #[test]
    fn missing_table_errors() {
        let s = Statement::new(StatementKind::Select);
        assert!(render(Dialect::Sqlite, &s, true).is_err());
    }
}
