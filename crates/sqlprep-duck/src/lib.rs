//! DuckDB executor for the preprocessing engine
//!
//! Wraps a `duckdb::Connection` behind [`SqlExecutor`], converting result
//! cells to `serde_json::Value`. Speaks the `Standard` dialect; DuckDB
//! accepts the same `LIMIT`/`OFFSET`, `setseed()`/`random()` and
//! `INFORMATION_SCHEMA` surface as Postgres for everything the compiler
//! emits.

use std::path::Path;

use duckdb::types::ValueRef;
use duckdb::Connection;
use tracing::debug;

use sqlprep_core::{PrepError, Row, RowSet, SqlExecutor};
use sqlprep_sql::Dialect;

pub struct DuckExecutor {
    conn: Connection,
}

impl DuckExecutor {
    pub fn open_in_memory() -> Result<DuckExecutor, PrepError> {
        let conn =
            Connection::open_in_memory().map_err(|e| PrepError::Connection(e.to_string()))?;
        Ok(DuckExecutor { conn })
    }

    pub fn open(path: &Path) -> Result<DuckExecutor, PrepError> {
        let conn = Connection::open(path).map_err(|e| PrepError::Connection(e.to_string()))?;
        Ok(DuckExecutor { conn })
    }

    pub fn from_connection(conn: Connection) -> DuckExecutor {
        DuckExecutor { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn cell_to_json(value: ValueRef<'_>) -> serde_json::Value {
        match value {
            ValueRef::Null => serde_json::Value::Null,
            ValueRef::Boolean(b) => serde_json::Value::Bool(b),
            ValueRef::TinyInt(i) => serde_json::Value::from(i),
            ValueRef::SmallInt(i) => serde_json::Value::from(i),
            ValueRef::Int(i) => serde_json::Value::from(i),
            ValueRef::BigInt(i) => serde_json::Value::from(i),
            ValueRef::HugeInt(i) => serde_json::Value::from(i as i64),
            ValueRef::UTinyInt(i) => serde_json::Value::from(i),
            ValueRef::USmallInt(i) => serde_json::Value::from(i),
            ValueRef::UInt(i) => serde_json::Value::from(i),
            ValueRef::UBigInt(i) => serde_json::Value::from(i),
            ValueRef::Float(f) => serde_json::json!(f),
            ValueRef::Double(f) => serde_json::json!(f),
            ValueRef::Decimal(d) => serde_json::json!(d.to_string()),
            ValueRef::Text(bytes) => {
                let s = std::str::from_utf8(bytes).unwrap_or("");
                serde_json::Value::String(s.to_string())
            }
            _ => serde_json::Value::Null,
        }
    }

    /// SQL string literal with embedded quotes doubled.
    fn sql_literal(value: &serde_json::Value) -> String {
        match value {
            serde_json::Value::Null => "NULL".to_string(),
            serde_json::Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }
}

impl SqlExecutor for DuckExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Standard
    }

    fn execute(&self, sql: &str) -> Result<(), PrepError> {
        debug!(%sql, "execute");
        self.conn
            .execute_batch(sql)
            .map_err(|e| PrepError::sql(sql, e.to_string()))
    }

    fn query(&self, sql: &str) -> Result<RowSet, PrepError> {
        debug!(%sql, "query");
        let wrap = |e: duckdb::Error| PrepError::sql(sql, e.to_string());

        let mut stmt = self.conn.prepare(sql).map_err(wrap)?;
        let mut out_rows: Vec<Row> = Vec::new();
        {
            let mut rows = stmt.query([]).map_err(wrap)?;
            while let Some(row) = rows.next().map_err(wrap)? {
                let column_count = row.as_ref().column_count();
                let mut json_row = Vec::with_capacity(column_count);
                for i in 0..column_count {
                    let cell = row.get_ref(i).map_err(wrap)?;
                    json_row.push(Self::cell_to_json(cell));
                }
                out_rows.push(json_row);
            }
        }
        let columns = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map(|name| name.to_string())
                    .unwrap_or_else(|_| format!("col{}", i))
            })
            .collect();

        Ok(RowSet {
            columns,
            rows: out_rows,
        })
    }

    // DuckDB cannot ALTER an identity column into an existing table.
    fn create_unique_key(&self, _schema: &str, _table: &str, _column: &str) -> Result<(), PrepError> {
        Err(PrepError::UnsupportedDialect {
            dialect: self.dialect(),
            operation: "create_unique_key".to_string(),
        })
    }

    fn bulk_load(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<(), PrepError> {
        if rows.is_empty() {
            return Ok(());
        }
        let values = rows
            .iter()
            .map(|row| {
                let cells = row
                    .iter()
                    .map(Self::sql_literal)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", cells)
            })
            .collect::<Vec<_>>()
            .join(",\n");
        let sql = format!(
            "INSERT INTO {}.{} ({}) VALUES\n{}",
            schema,
            table,
            columns.join(", "),
            values
        );
        self.execute(&sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> DuckExecutor {
        DuckExecutor::open_in_memory().unwrap()
    }

    #[test]
    fn query_converts_cells_to_json() {
        let exec = executor();
        let rs = exec
            .query(
                "SELECT 1 AS a, 'x' AS b, CAST(2.5 AS DOUBLE) AS c, NULL AS d, TRUE AS e, \
                 CAST(2.5 AS DECIMAL(4, 2)) AS f",
            )
            .unwrap();
        assert_eq!(rs.columns, vec!["a", "b", "c", "d", "e", "f"]);
        assert_eq!(
            rs.rows[0],
            vec![
                serde_json::json!(1),
                serde_json::json!("x"),
                serde_json::json!(2.5),
                serde_json::Value::Null,
                serde_json::json!(true),
                // decimals come back as strings; value_as_f64 parses them
                serde_json::json!("2.50"),
            ]
        );
    }

    #[test]
    fn table_exists_uses_information_schema() {
        let exec = executor();
        exec.execute("CREATE SCHEMA s1; CREATE TABLE s1.t1 (c1 INTEGER)")
            .unwrap();
        assert!(exec.table_exists("s1", "t1").unwrap());
        assert!(!exec.table_exists("s1", "missing").unwrap());
        assert!(exec.column_exists("s1", "t1", "c1").unwrap());
        assert!(!exec.column_exists("s1", "t1", "c9").unwrap());
    }

    #[test]
    fn create_unique_key_is_refused() {
        let exec = executor();
        exec.execute("CREATE SCHEMA s1; CREATE TABLE s1.t1 (c1 INTEGER)")
            .unwrap();
        let err = exec.create_unique_key("s1", "t1", "row_id").unwrap_err();
        assert!(matches!(err, PrepError::UnsupportedDialect { .. }));
        assert!(!exec.column_exists("s1", "t1", "row_id").unwrap());
    }

    #[test]
    fn drop_table_is_idempotent() {
        let exec = executor();
        exec.execute("CREATE SCHEMA s1; CREATE TABLE s1.t1 (c1 INTEGER)")
            .unwrap();
        exec.drop_table("s1", "t1").unwrap();
        exec.drop_table("s1", "t1").unwrap();
        assert!(!exec.table_exists("s1", "t1").unwrap());
    }

    #[test]
    fn bulk_load_inserts_all_rows() {
        let exec = executor();
        exec.execute("CREATE SCHEMA s1; CREATE TABLE s1.t1 (label_key VARCHAR, label_encoded INTEGER)")
            .unwrap();
        exec.bulk_load(
            "s1",
            "t1",
            &["label_key".to_string(), "label_encoded".to_string()],
            &[
                vec![serde_json::json!("a"), serde_json::json!(0)],
                vec![serde_json::json!("o'b"), serde_json::json!(1)],
            ],
        )
        .unwrap();
        let rs = exec
            .query("SELECT label_key FROM s1.t1 ORDER BY label_encoded")
            .unwrap();
        assert_eq!(rs.rows.len(), 2);
        assert_eq!(rs.rows[1][0], serde_json::json!("o'b"));
    }

    #[test]
    fn failed_statement_surfaces_the_sql() {
        let exec = executor();
        let err = exec.execute("SELECT FROM nowhere AT ALL").unwrap_err();
        match err {
            PrepError::Sql { sql, .. } => assert!(sql.contains("nowhere")),
            other => panic!("unexpected error: {}", other),
        }
    }
}
