//! In-memory executor for unit tests: logs every statement, answers catalog
//! existence queries from the tables and columns it has seen created, and
//! serves data queries from a queue of canned results.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};

use sqlprep_sql::Dialect;

use crate::error::PrepError;
use crate::executor::{Row, RowSet, SqlExecutor};

pub(crate) struct MockExecutor {
    dialect: Dialect,
    statements: RefCell<Vec<String>>,
    queries: RefCell<Vec<String>>,
    results: RefCell<VecDeque<RowSet>>,
    tables: RefCell<BTreeSet<String>>,
    columns: RefCell<BTreeSet<String>>,
    loads: RefCell<Vec<(String, String, Vec<String>, Vec<Row>)>>,
}

impl MockExecutor {
    pub(crate) fn new(dialect: Dialect) -> MockExecutor {
        MockExecutor {
            dialect,
            statements: RefCell::new(Vec::new()),
            queries: RefCell::new(Vec::new()),
            results: RefCell::new(VecDeque::new()),
            tables: RefCell::new(BTreeSet::new()),
            columns: RefCell::new(BTreeSet::new()),
            loads: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn standard() -> MockExecutor {
        MockExecutor::new(Dialect::Standard)
    }

    pub(crate) fn push_query_result(&self, rows: RowSet) {
        self.results.borrow_mut().push_back(rows);
    }

    /// Every executed (non-query) statement, in order.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }

    /// Every data query (catalog existence probes excluded), in order.
    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.borrow().clone()
    }

    pub(crate) fn loads(&self) -> Vec<(String, String, Vec<String>, Vec<Row>)> {
        self.loads.borrow().clone()
    }

    fn is_existence_probe(sql: &str) -> bool {
        sql.contains("INFORMATION_SCHEMA.TABLES")
            || sql.contains("SYSIBM.SYSTABLES")
            || sql.contains("INFORMATION_SCHEMA.COLUMNS")
            || sql.contains("SYSIBM.SYSCOLUMNS")
    }

    fn answer_existence_probe(&self, sql: &str) -> RowSet {
        let column_probe = sql.contains("COLUMN_NAME") || sql.contains("SYSCOLUMNS");
        let hit = if column_probe {
            self.columns.borrow().iter().any(|qualified| {
                let parts: Vec<&str> = qualified.split('.').collect();
                parts.len() == 3
                    && parts
                        .iter()
                        .all(|part| sql.contains(&format!("UPPER('{}')", part)))
            })
        } else {
            self.tables
                .borrow()
                .iter()
                .any(|qualified| match qualified.split_once('.') {
                    Some((schema, table)) => {
                        sql.contains(&format!("UPPER('{}')", table))
                            && sql.contains(&format!("UPPER('{}')", schema))
                    }
                    None => false,
                })
        };
        if hit {
            RowSet {
                columns: vec!["1".to_string()],
                rows: vec![vec![serde_json::json!(1)]],
            }
        } else {
            RowSet::default()
        }
    }

    fn track_ddl(&self, sql: &str) {
        if let Some(rest) = sql.strip_prefix("CREATE TABLE ") {
            if let Some(name) = first_token(rest) {
                self.tables.borrow_mut().insert(name);
            }
        } else if let Some(rest) = sql.strip_prefix("DROP TABLE ") {
            if let Some(name) = first_token(rest) {
                self.tables.borrow_mut().remove(&name);
            }
        } else if let Some(rest) = sql.strip_prefix("ALTER TABLE ") {
            let table = match first_token(rest) {
                Some(table) => table,
                None => return,
            };
            if let Some((_, tail)) = rest.split_once(" ADD COLUMN ") {
                if let Some(column) = first_token(tail) {
                    self.columns
                        .borrow_mut()
                        .insert(format!("{}.{}", table, column));
                }
            } else if let Some((_, tail)) = rest.split_once(" DROP COLUMN ") {
                if let Some(column) = first_token(tail) {
                    self.columns
                        .borrow_mut()
                        .remove(&format!("{}.{}", table, column));
                }
            }
        }
    }
}

fn first_token(s: &str) -> Option<String> {
    let end = s
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(s.len());
    let token = &s[..end];
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl SqlExecutor for MockExecutor {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn execute(&self, sql: &str) -> Result<(), PrepError> {
        self.track_ddl(sql);
        self.statements.borrow_mut().push(sql.to_string());
        Ok(())
    }

    fn query(&self, sql: &str) -> Result<RowSet, PrepError> {
        if Self::is_existence_probe(sql) {
            return Ok(self.answer_existence_probe(sql));
        }
        self.queries.borrow_mut().push(sql.to_string());
        Ok(self.results.borrow_mut().pop_front().unwrap_or_default())
    }

    fn bulk_load(
        &self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<(), PrepError> {
        self.loads.borrow_mut().push((
            schema.to_string(),
            table.to_string(),
            columns.to_vec(),
            rows.to_vec(),
        ));
        Ok(())
    }
}
