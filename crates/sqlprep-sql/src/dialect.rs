//! Dialect adapter for the two supported engines
//!
//! Resolves the syntax differences the composition engine cares about:
//! row limiting, seeded randomness, catalog introspection and
//! create-table-as-select. A closed enum keeps every dialect branch
//! exhaustively matched.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// Postgres-compatible SQL: `LIMIT`/`OFFSET`, `setseed()` + `random()`,
    /// `INFORMATION_SCHEMA` catalog.
    Standard,
    /// Enterprise warehouse (Db2-style): `FETCH FIRST n ROWS ONLY`, inline
    /// seeded `RAND(seed)`, `SYSIBM` system catalog.
    Db2,
}

impl Dialect {
    /// Infer the dialect from a connection-string prefix; anything that does
    /// not announce itself as Db2 gets standard SQL.
    pub fn from_connection_string(url: &str) -> Dialect {
        if url.len() >= 3 && url[..3].eq_ignore_ascii_case("db2") {
            Dialect::Db2
        } else {
            Dialect::Standard
        }
    }

    /// Row-limiting clause, starting with a newline when non-empty.
    pub fn limit_clause(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        let mut sql = String::new();
        match self {
            Dialect::Standard => {
                if let Some(n) = limit {
                    sql.push_str(&format!("\nLIMIT {}", n));
                }
                if let Some(n) = offset {
                    sql.push_str(&format!("\nOFFSET {}", n));
                }
            }
            Dialect::Db2 => {
                if let Some(n) = offset {
                    sql.push_str(&format!("\nOFFSET {} ROWS", n));
                }
                if let Some(n) = limit {
                    sql.push_str(&format!("\nFETCH FIRST {} ROWS ONLY", n));
                }
            }
        }
        sql
    }

    /// Seeded pseudo-random ordering: an optional statement that must run on
    /// the same connection before the query, plus the `ORDER BY` expression.
    ///
    /// For `Standard` the seed must lie in `[-1, 1]` (the engine's `setseed`
    /// domain); `Db2` truncates it to an integer for `RAND(seed)`.
    pub fn seeded_random(&self, seed: f64) -> (Option<String>, String) {
        match self {
            Dialect::Standard => (
                Some(format!("SELECT setseed({})", seed)),
                "random()".to_string(),
            ),
            Dialect::Db2 => (None, format!("RAND({})", seed.trunc() as i64)),
        }
    }

    pub fn table_exists_sql(&self, schema: &str, table: &str) -> String {
        match self {
            Dialect::Standard => format!(
                "SELECT 1 FROM INFORMATION_SCHEMA.TABLES \
                 WHERE UPPER(TABLE_NAME) = UPPER('{}') AND UPPER(TABLE_SCHEMA) = UPPER('{}')",
                table, schema
            ),
            Dialect::Db2 => format!(
                "SELECT 1 FROM SYSIBM.SYSTABLES \
                 WHERE UPPER(NAME) = UPPER('{}') AND UPPER(CREATOR) = UPPER('{}')",
                table, schema
            ),
        }
    }

    pub fn column_exists_sql(&self, schema: &str, table: &str, column: &str) -> String {
        match self {
            Dialect::Standard => format!(
                "SELECT 1 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE UPPER(TABLE_NAME) = UPPER('{}') AND UPPER(TABLE_SCHEMA) = UPPER('{}') \
                 AND UPPER(COLUMN_NAME) = UPPER('{}')",
                table, schema, column
            ),
            Dialect::Db2 => format!(
                "SELECT 1 FROM SYSIBM.SYSCOLUMNS \
                 WHERE UPPER(TBNAME) = UPPER('{}') AND UPPER(TBCREATOR) = UPPER('{}') \
                 AND UPPER(NAME) = UPPER('{}')",
                table, schema, column
            ),
        }
    }

    /// Column listing for a table or view, in ordinal order where the
    /// catalog exposes one.
    pub fn table_schema_sql(&self, schema: &str, table: &str) -> String {
        match self {
            Dialect::Standard => format!(
                "SELECT * FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE UPPER(TABLE_NAME) = UPPER('{}') AND UPPER(TABLE_SCHEMA) = UPPER('{}') \
                 ORDER BY ORDINAL_POSITION",
                table, schema
            ),
            Dialect::Db2 => format!(
                "SELECT * FROM SYSIBM.SYSCOLUMNS WHERE TBNAME = '{}' AND TBCREATOR = '{}'",
                table, schema
            ),
        }
    }

    /// Materialize a SELECT into a new table.
    pub fn create_table_as(&self, schema: &str, table: &str, select: &str) -> String {
        match self {
            Dialect::Standard => {
                format!("CREATE TABLE {}.{} AS\n{}", schema, table, select)
            }
            Dialect::Db2 => format!(
                "CREATE TABLE {}.{} AS\n({}) WITH DATA",
                schema, table, select
            ),
        }
    }

    /// Add an auto-generated identity column to an existing table.
    pub fn identity_column_sql(&self, schema: &str, table: &str, column: &str) -> String {
        match self {
            Dialect::Standard => format!(
                "ALTER TABLE {}.{} ADD COLUMN {} INT GENERATED ALWAYS AS IDENTITY",
                schema, table, column
            ),
            Dialect::Db2 => format!(
                "ALTER TABLE {}.{} ADD COLUMN {} INT GENERATED ALWAYS AS IDENTITY \
                 (START WITH 1, INCREMENT BY 1)",
                schema, table, column
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_inferred_from_connection_string() {
        assert_eq!(
            Dialect::from_connection_string("postgres://u:p@localhost:5432/db"),
            Dialect::Standard
        );
        assert_eq!(
            Dialect::from_connection_string("db2+ibm_db://u:p@host:5100/A2B"),
            Dialect::Db2
        );
        assert_eq!(Dialect::from_connection_string(""), Dialect::Standard);
    }

    #[test]
    fn standard_limit_offset() {
        assert_eq!(
            Dialect::Standard.limit_clause(Some(10), Some(40)),
            "\nLIMIT 10\nOFFSET 40"
        );
        assert_eq!(Dialect::Standard.limit_clause(None, None), "");
    }

    #[test]
    fn db2_fetch_first() {
        assert_eq!(
            Dialect::Db2.limit_clause(Some(10), None),
            "\nFETCH FIRST 10 ROWS ONLY"
        );
        assert_eq!(
            Dialect::Db2.limit_clause(Some(10), Some(40)),
            "\nOFFSET 40 ROWS\nFETCH FIRST 10 ROWS ONLY"
        );
    }

    #[test]
    fn seeded_random_reseeds_standard_separately() {
        let (reseed, order) = Dialect::Standard.seeded_random(0.25);
        assert_eq!(reseed.as_deref(), Some("SELECT setseed(0.25)"));
        assert_eq!(order, "random()");

        let (reseed, order) = Dialect::Db2.seeded_random(7.0);
        assert!(reseed.is_none());
        assert_eq!(order, "RAND(7)");
    }

    #[test]
    fn create_table_as_wraps_db2_with_data() {
        let sql = Dialect::Db2.create_table_as("s1", "t1", "SELECT 1");
        assert_eq!(sql, "CREATE TABLE s1.t1 AS\n(SELECT 1) WITH DATA");
    }
}
