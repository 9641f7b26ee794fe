//! Idempotent schema setup.
//!
//! Tables are created when absent; afterwards every [`ColumnDescriptor`] in
//! [`COLUMNS`] is checked against the introspected live schema and missing
//! columns are added. Nothing here relies on catching "already exists"
//! errors.

use super::Connection;
use super::config::Dialect;
use crate::core::{ColumnDescriptor, DataType, Result};
use sqlx::Row;
use std::collections::HashSet;
use tracing::info;

pub const TABLES: [&str; 4] = ["dome", "tree", "grid_settings", "schedule_run"];

/// Columns that older databases may be missing.
pub const COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor::new("dome", "internal_rows", DataType::Integer).with_default("5"),
    ColumnDescriptor::new("dome", "internal_cols", DataType::Integer).with_default("5"),
    ColumnDescriptor::new("dome", "farm_id", DataType::Integer),
    ColumnDescriptor::new("tree", "breed", DataType::Text),
    ColumnDescriptor::new("tree", "info", DataType::Text),
    ColumnDescriptor::new("tree", "life_days", DataType::Integer).with_default("0"),
    ColumnDescriptor::new("tree", "plant_type", DataType::Text).with_default("'mother'"),
    ColumnDescriptor::new("tree", "mother_plant_id", DataType::Integer),
    ColumnDescriptor::new("tree", "paste_metadata", DataType::Text),
    ColumnDescriptor::new("tree", "created_at", DataType::Text),
    ColumnDescriptor::new("tree", "updated_at", DataType::Text),
    ColumnDescriptor::new("grid_settings", "updated_at", DataType::Text),
    ColumnDescriptor::new("schedule_run", "error_detail", DataType::Text),
];

/// What [`ensure_schema`] changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaReport {
    pub created_tables: Vec<String>,
    /// `table.column` entries that were added
    pub added_columns: Vec<String>,
}

impl SchemaReport {
    pub fn is_unchanged(&self) -> bool {
        self.created_tables.is_empty() && self.added_columns.is_empty()
    }
}

/// Bring the schema up to date; a second call is a no-op
pub async fn ensure_schema(conn: &mut Connection) -> Result<SchemaReport> {
    let dialect = conn.dialect();
    let mut report = SchemaReport::default();

    for table in TABLES {
        if existing_columns(conn, table).await?.is_empty() {
            conn.execute(&create_table_sql(table, dialect), &[]).await?;
            report.created_tables.push(table.to_string());
        }
    }

    for table in TABLES {
        let present = existing_columns(conn, table).await?;
        for descriptor in COLUMNS.iter().filter(|c| c.table == table) {
            if present.contains(descriptor.column) {
                continue;
            }
            conn.execute(&add_column_sql(descriptor, dialect), &[]).await?;
            report
                .added_columns
                .push(format!("{}.{}", descriptor.table, descriptor.column));
        }
    }

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS tree_position_idx \
         ON tree (dome_id, internal_row, internal_col)",
        &[],
    )
    .await?;

    if !report.is_unchanged() {
        info!(
            created = ?report.created_tables,
            added = ?report.added_columns,
            "schema updated"
        );
    }

    Ok(report)
}

/// Column names of `table`; empty when the table does not exist
pub async fn existing_columns(conn: &mut Connection, table: &str) -> Result<HashSet<String>> {
    let rows = match conn.dialect() {
        Dialect::Sqlite => {
            conn.fetch_all(
                "SELECT name FROM pragma_table_info($1)",
                &[table.into()],
            )
            .await?
        }
        Dialect::Postgres => {
            conn.fetch_all(
                "SELECT column_name::text AS name FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1",
                &[table.into()],
            )
            .await?
        }
    };

    let mut names = HashSet::with_capacity(rows.len());
    for row in rows {
        names.insert(row.try_get::<String, _>("name")?);
    }
    Ok(names)
}

fn add_column_sql(descriptor: &ColumnDescriptor, dialect: Dialect) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        descriptor.table,
        descriptor.column,
        dialect.sql_type(descriptor.data_type)
    );
    if let Some(default) = descriptor.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    sql
}

fn create_table_sql(table: &str, dialect: Dialect) -> String {
    let id = dialect.id_column();
    let int = dialect.sql_type(DataType::Integer);

    match table {
        "dome" => format!(
            "CREATE TABLE IF NOT EXISTS dome (\
                {id}, \
                name TEXT NOT NULL, \
                internal_rows {int} DEFAULT 5, \
                internal_cols {int} DEFAULT 5, \
                farm_id {int}\
            )"
        ),
        "tree" => format!(
            "CREATE TABLE IF NOT EXISTS tree (\
                {id}, \
                name TEXT NOT NULL, \
                breed TEXT, \
                info TEXT, \
                internal_row {int} NOT NULL DEFAULT 0, \
                internal_col {int} NOT NULL DEFAULT 0, \
                life_days {int} DEFAULT 0, \
                dome_id {int} NOT NULL REFERENCES dome(id) ON DELETE CASCADE, \
                plant_type TEXT DEFAULT 'mother', \
                mother_plant_id {int} REFERENCES tree(id) ON DELETE SET NULL, \
                paste_metadata TEXT, \
                created_at TEXT, \
                updated_at TEXT\
            )"
        ),
        "grid_settings" => format!(
            "CREATE TABLE IF NOT EXISTS grid_settings (\
                {id}, \
                grid_type TEXT NOT NULL UNIQUE, \
                rows {int} NOT NULL, \
                cols {int} NOT NULL, \
                updated_at TEXT\
            )"
        ),
        "schedule_run" => format!(
            "CREATE TABLE IF NOT EXISTS schedule_run (\
                {id}, \
                job_id TEXT NOT NULL, \
                trigger_kind TEXT NOT NULL, \
                trigger_time TEXT NOT NULL, \
                finished_at TEXT NOT NULL, \
                rows_affected {int} NOT NULL, \
                outcome TEXT NOT NULL, \
                error_detail TEXT\
            )"
        ),
        other => unreachable!("no table definition for {other}"),
    }
}
