//! Backing-engine executor contract
//!
//! The compiler never evaluates anything in-process; every statistic and
//! transformation runs inside the engine behind this trait. Rows come back
//! as JSON values, one `Vec` per row, the same value model the reference
//! DuckDB executor produces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlprep_sql::Dialect;

use crate::error::PrepError;

pub type Row = Vec<Value>;

/// Result of a query: column names plus rows of JSON values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

/// Numeric view of a JSON cell.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Synchronous connection to a backing SQL engine.
///
/// One instance serves one dataset-view tree; every call is a blocking
/// round trip and each statement auto-commits.
pub trait SqlExecutor {
    fn dialect(&self) -> Dialect;

    /// Run a statement with no result. Fails with [`PrepError::Sql`] when the
    /// engine rejects it.
    fn execute(&self, sql: &str) -> Result<(), PrepError>;

    /// Run a query and collect all rows.
    fn query(&self, sql: &str) -> Result<RowSet, PrepError>;

    /// Run a query and return the first row, if any.
    fn query_one(&self, sql: &str) -> Result<Option<Row>, PrepError> {
        Ok(self.query(sql)?.rows.into_iter().next())
    }

    /// Load rows into an existing table.
    fn bulk_load(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<(), PrepError>;

    fn table_exists(&self, schema: &str, table: &str) -> Result<bool, PrepError> {
        let sql = self.dialect().table_exists_sql(schema, table);
        Ok(self.query_one(&sql)?.is_some())
    }

    fn column_exists(&self, schema: &str, table: &str, column: &str) -> Result<bool, PrepError> {
        let sql = self.dialect().column_exists_sql(schema, table, column);
        Ok(self.query_one(&sql)?.is_some())
    }

    /// Column metadata for a table or view. Content is engine-dependent.
    fn table_schema(&self, schema: &str, table: &str) -> Result<RowSet, PrepError> {
        self.query(&self.dialect().table_schema_sql(schema, table))
    }

    /// Drop a table if it exists. A second call is a no-op.
    fn drop_table(&self, schema: &str, table: &str) -> Result<(), PrepError> {
        if self.table_exists(schema, table)? {
            self.execute(&format!("DROP TABLE {}.{}", schema, table))?;
        }
        Ok(())
    }

    /// Add an identity column with a unique index, replacing the column if it
    /// already exists.
    fn create_unique_key(&self, schema: &str, table: &str, column: &str) -> Result<(), PrepError> {
        if self.column_exists(schema, table, column)? {
            self.execute(&format!(
                "ALTER TABLE {}.{} DROP COLUMN {}",
                schema, table, column
            ))?;
        }
        self.execute(&self.dialect().identity_column_sql(schema, table, column))?;
        self.execute(&format!(
            "CREATE UNIQUE INDEX {}_{}_{} ON {}.{}({})",
            schema, table, column, schema, table, column
        ))?;
        Ok(())
    }
}
