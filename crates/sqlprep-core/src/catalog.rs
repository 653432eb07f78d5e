//! Ephemeral-table catalog
//!
//! Tracks every temporary (schema, table) pair created on behalf of a named
//! dataset view - fit tables, split partitions, materialized outputs - so a
//! single cleanup call can drop them all. Two interchangeable policies: an
//! in-process set shared by reference across every view cloned from a common
//! root, and a durable table-backed ledger for cross-session tracking.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::PrepError;
use crate::executor::SqlExecutor;

/// Name of the durable ledger table.
pub const CATALOG_TABLE: &str = "sqlprep_table_catalog";

#[derive(Debug, Clone)]
pub enum TableCatalog {
    Memory(MemoryCatalog),
    Ledger(LedgerCatalog),
}

impl TableCatalog {
    pub fn in_memory(view_name: &str) -> TableCatalog {
        TableCatalog::Memory(MemoryCatalog::new(view_name))
    }

    pub fn ledger(
        view_name: &str,
        dataset_schema: &str,
        dataset_table: &str,
        catalog_schema: &str,
    ) -> TableCatalog {
        TableCatalog::Ledger(LedgerCatalog {
            view_name: view_name.to_string(),
            dataset_schema: dataset_schema.to_string(),
            dataset_table: dataset_table.to_string(),
            catalog_schema: catalog_schema.to_string(),
        })
    }

    pub fn view_name(&self) -> &str {
        match self {
            TableCatalog::Memory(c) => &c.view_name,
            TableCatalog::Ledger(c) => &c.view_name,
        }
    }

    /// Catalog handle for a view derived from this one. The in-memory policy
    /// shares the underlying table set, so cleanup of any descendant view is
    /// total; the ledger policy shares the ledger table itself.
    pub fn clone_for(&self, view_name: &str) -> TableCatalog {
        match self {
            TableCatalog::Memory(c) => TableCatalog::Memory(MemoryCatalog {
                view_name: view_name.to_string(),
                tables: Arc::clone(&c.tables),
            }),
            TableCatalog::Ledger(c) => TableCatalog::Ledger(LedgerCatalog {
                view_name: view_name.to_string(),
                ..c.clone()
            }),
        }
    }

    /// Record a created table. Idempotent: re-registering the same pair
    /// replaces the existing entry.
    ///
    /// Callers must register only after the CREATE statement succeeded.
    pub fn register(
        &self,
        exec: &dyn SqlExecutor,
        schema: &str,
        table: &str,
    ) -> Result<(), PrepError> {
        match self {
            TableCatalog::Memory(c) => {
                c.lock().insert((schema.to_string(), table.to_string()));
                Ok(())
            }
            TableCatalog::Ledger(c) => c.register(exec, schema, table),
        }
    }

    pub fn unregister(
        &self,
        exec: &dyn SqlExecutor,
        schema: &str,
        table: &str,
    ) -> Result<(), PrepError> {
        match self {
            TableCatalog::Memory(c) => {
                c.lock().remove(&(schema.to_string(), table.to_string()));
                Ok(())
            }
            TableCatalog::Ledger(c) => c.unregister(exec, schema, table),
        }
    }

    pub fn is_registered(
        &self,
        exec: &dyn SqlExecutor,
        schema: &str,
        table: &str,
    ) -> Result<bool, PrepError> {
        match self {
            TableCatalog::Memory(c) => {
                Ok(c.lock().contains(&(schema.to_string(), table.to_string())))
            }
            TableCatalog::Ledger(c) => c.is_registered(exec, schema, table),
        }
    }

    /// All registered (schema, table) pairs, in stable order. For the ledger
    /// policy `all_views` widens the scope beyond this view's name; the
    /// in-memory set is shared across descendants and is always total.
    pub fn tables(
        &self,
        exec: &dyn SqlExecutor,
        all_views: bool,
    ) -> Result<Vec<(String, String)>, PrepError> {
        match self {
            TableCatalog::Memory(c) => Ok(c.lock().iter().cloned().collect()),
            TableCatalog::Ledger(c) => c.tables(exec, all_views),
        }
    }

    /// Name of the fit table for one (view, column, encoder-kind) triple.
    pub fn fit_table_name(&self, column: &str, suffix: &str) -> String {
        format!("fit_{}_{}_{}", self.view_name(), column, suffix)
    }

    /// Drop and unregister a fit table ahead of a re-fit. Missing tables are
    /// fine; this is what makes `fit` idempotent.
    pub fn drop_fit_table(
        &self,
        exec: &dyn SqlExecutor,
        fit_schema: &str,
        fit_table: &str,
    ) -> Result<(), PrepError> {
        exec.drop_table(fit_schema, fit_table)?;
        self.unregister(exec, fit_schema, fit_table)
    }

    /// Best-effort drop of every registered table. Individual drop failures
    /// are logged and swallowed so one missing table never blocks cleanup of
    /// the rest. A second call on an empty catalog is a no-op.
    pub fn drop_temporary_tables(&self, exec: &dyn SqlExecutor) -> Result<(), PrepError> {
        let tables = self.tables(exec, false)?;
        debug!(count = tables.len(), view = self.view_name(), "dropping temporary tables");
        for (schema, table) in tables {
            if let Err(err) = exec.drop_table(&schema, &table) {
                warn!(%schema, %table, %err, "failed to drop temporary table, continuing");
            }
            match self {
                TableCatalog::Memory(c) => {
                    c.lock().remove(&(schema.clone(), table.clone()));
                }
                TableCatalog::Ledger(c) => {
                    if let Err(err) = c.unregister(exec, &schema, &table) {
                        warn!(%schema, %table, %err, "failed to unregister table, continuing");
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-process catalog: one mutable set of (schema, table) pairs shared by
/// reference across all catalogs cloned from a common root.
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    view_name: String,
    tables: Arc<Mutex<BTreeSet<(String, String)>>>,
}

impl MemoryCatalog {
    pub fn new(view_name: &str) -> MemoryCatalog {
        MemoryCatalog {
            view_name: view_name.to_string(),
            tables: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<(String, String)>> {
        // A poisoned lock means a panic mid-registration; propagating the
        // panic is the only sound option for a bookkeeping set.
        self.tables.lock().expect("catalog lock poisoned")
    }
}

/// Durable catalog: a ledger table keyed by owning-view name, lazily created
/// on first registration.
#[derive(Debug, Clone)]
pub struct LedgerCatalog {
    view_name: String,
    dataset_schema: String,
    dataset_table: String,
    catalog_schema: String,
}

impl LedgerCatalog {
    fn ensure_ledger(&self, exec: &dyn SqlExecutor) -> Result<(), PrepError> {
        if exec.table_exists(&self.catalog_schema, CATALOG_TABLE)? {
            return Ok(());
        }
        let sql = format!(
            "CREATE TABLE {}.{} (\
             view_name VARCHAR(100) NOT NULL, \
             dataset_schema VARCHAR(100) NOT NULL, \
             dataset_table VARCHAR(100) NOT NULL, \
             table_schema VARCHAR(100) NOT NULL, \
             table_name VARCHAR(100) NOT NULL, \
             created TIMESTAMP, \
             PRIMARY KEY (view_name, dataset_schema, dataset_table, table_schema, table_name))",
            self.catalog_schema, CATALOG_TABLE
        );
        exec.execute(&sql)
    }

    fn scope_clause(&self) -> String {
        format!(
            "view_name = '{}' AND dataset_schema = '{}' AND dataset_table = '{}'",
            self.view_name, self.dataset_schema, self.dataset_table
        )
    }

    fn register(&self, exec: &dyn SqlExecutor, schema: &str, table: &str) -> Result<(), PrepError> {
        self.ensure_ledger(exec)?;
        // Replace, never duplicate.
        self.unregister(exec, schema, table)?;
        let sql = format!(
            "INSERT INTO {}.{} VALUES ('{}', '{}', '{}', '{}', '{}', current_timestamp)",
            self.catalog_schema,
            CATALOG_TABLE,
            self.view_name,
            self.dataset_schema,
            self.dataset_table,
            schema,
            table
        );
        exec.execute(&sql)
    }

    fn unregister(
        &self,
        exec: &dyn SqlExecutor,
        schema: &str,
        table: &str,
    ) -> Result<(), PrepError> {
        self.ensure_ledger(exec)?;
        let sql = format!(
            "DELETE FROM {}.{} WHERE {} AND table_schema = '{}' AND table_name = '{}'",
            self.catalog_schema,
            CATALOG_TABLE,
            self.scope_clause(),
            schema,
            table
        );
        exec.execute(&sql)
    }

    fn is_registered(
        &self,
        exec: &dyn SqlExecutor,
        schema: &str,
        table: &str,
    ) -> Result<bool, PrepError> {
        self.ensure_ledger(exec)?;
        let sql = format!(
            "SELECT table_schema, table_name FROM {}.{} WHERE {} \
             AND table_schema = '{}' AND table_name = '{}'",
            self.catalog_schema,
            CATALOG_TABLE,
            self.scope_clause(),
            schema,
            table
        );
        Ok(exec.query_one(&sql)?.is_some())
    }

    fn tables(
        &self,
        exec: &dyn SqlExecutor,
        all_views: bool,
    ) -> Result<Vec<(String, String)>, PrepError> {
        self.ensure_ledger(exec)?;
        let mut sql = format!(
            "SELECT table_schema, table_name FROM {}.{}",
            self.catalog_schema, CATALOG_TABLE
        );
        if !all_views {
            sql.push_str(&format!(" WHERE {}", self.scope_clause()));
        }
        sql.push_str(" ORDER BY table_schema, table_name");
        let rows = exec.query(&sql)?;
        let mut out = Vec::with_capacity(rows.row_count());
        for row in &rows.rows {
            match (row.first(), row.get(1)) {
                (Some(serde_json::Value::String(s)), Some(serde_json::Value::String(t))) => {
                    out.push((s.clone(), t.clone()));
                }
                _ => {
                    return Err(PrepError::Catalog(
                        "ledger row did not contain schema and table names".to_string(),
                    ))
                }
            }
        }
        Ok(out)
    }
}
