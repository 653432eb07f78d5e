//! Dataset views and the SELECT compiler
//!
//! A [`DatasetView`] is a named, composable description of a dataset: a
//! source (table or nested query), an optional unique key, and an ordered
//! list of column transformations. Nothing is evaluated when transformations
//! are added; [`DatasetView::compile`] folds the whole list into a single
//! SELECT statement, and the executor helpers push that statement down to
//! the engine.

use tracing::debug;

use serde_json::Value;
use sqlprep_sql::{Dialect, Expr, RenderContext};

use crate::catalog::TableCatalog;
use crate::error::PrepError;
use crate::executor::{value_as_f64, RowSet, SqlExecutor};

/// Alias every compiled statement binds its data source under.
pub const DATA_ALIAS: &str = "data_table";

/// Where a view reads from: a physical table or a nested SELECT.
#[derive(Debug, Clone)]
pub enum Source {
    Table { schema: String, table: String },
    /// A full SELECT statement, wrapped in parentheses when rendered.
    Query(String),
}

impl Source {
    pub(crate) fn render(&self) -> String {
        match self {
            Source::Table { schema, table } => format!("{}.{}", schema, table),
            Source::Query(sql) => format!("(\n{}\n)", sql),
        }
    }
}

/// One recorded output column.
///
/// `expr` is fully bound except for [`Expr::JoinColumn`] references, which
/// the compiler resolves once the owning subquery's join alias is assigned.
#[derive(Debug, Clone)]
pub struct Transformation {
    pub source_column: String,
    /// Output alias. `None` when the expression carries its own aliases
    /// (e.g. a multi-column one-hot fragment).
    pub target_column: Option<String>,
    pub expr: Expr,
    /// Fit table to LEFT OUTER JOIN on `source_column = label_key`.
    pub fit_table: Option<String>,
    /// Correlated subquery to LEFT OUTER JOIN on the view's key column.
    /// Carried by the first record of a matrix transformation; the join
    /// alias stays in scope for the records that follow it.
    pub subquery: Option<String>,
}

/// Knobs for one compilation. All default to off.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Emit each transformation's untouched source column next to its
    /// transformed output.
    pub include_source_columns: bool,
    /// Append `data_table.*` after the transformed columns.
    pub include_all_source_columns: bool,
    pub limit: Option<u64>,
    /// Overrides the view's default ordering.
    pub order_by: Option<String>,
    /// Compile against a different source, e.g. a split partition. Rendered
    /// verbatim in the FROM clause.
    pub replace_data_source: Option<String>,
    /// Read fit tables from a different schema.
    pub replace_fit_schema: Option<String>,
}

/// How many rows a sample should draw.
#[derive(Debug, Clone, Copy)]
pub enum SampleSize {
    Rows(u64),
    /// Fraction of the view's row count, in `(0, 1]`, floored.
    Fraction(f64),
}

#[derive(Debug, Clone)]
pub struct DatasetView {
    pub name: String,
    pub source: Source,
    pub dataset_schema: String,
    pub dataset_table: String,
    /// Unique key column; required for subquery joins and splits.
    pub key_column: Option<String>,
    /// Schema fit tables and materialized outputs land in.
    pub fit_schema: String,
    pub default_order_by: Option<String>,
    pub catalog: TableCatalog,
    pub transformations: Vec<Transformation>,
}

impl DatasetView {
    pub fn for_table(name: &str, schema: &str, table: &str) -> DatasetView {
        DatasetView {
            name: name.to_string(),
            source: Source::Table {
                schema: schema.to_string(),
                table: table.to_string(),
            },
            dataset_schema: schema.to_string(),
            dataset_table: table.to_string(),
            key_column: None,
            fit_schema: schema.to_string(),
            default_order_by: None,
            catalog: TableCatalog::in_memory(name),
            transformations: Vec::new(),
        }
    }

    /// View over a nested SELECT. `schema`/`table` name where derived tables
    /// (splits, materializations) should land.
    pub fn for_query(name: &str, schema: &str, table: &str, sql: &str) -> DatasetView {
        DatasetView {
            source: Source::Query(sql.to_string()),
            ..DatasetView::for_table(name, schema, table)
        }
    }

    pub fn with_key_column(mut self, column: &str) -> DatasetView {
        self.key_column = Some(column.to_string());
        self
    }

    pub fn with_fit_schema(mut self, schema: &str) -> DatasetView {
        self.fit_schema = schema.to_string();
        self
    }

    pub fn with_default_order_by(mut self, column: &str) -> DatasetView {
        self.default_order_by = Some(column.to_string());
        self
    }

    pub fn with_catalog(mut self, catalog: TableCatalog) -> DatasetView {
        self.catalog = catalog;
        self
    }

    /// The key column, or a [`PrepError::MissingKey`] naming the operation
    /// that needed it.
    pub fn require_key(&self, operation: &'static str) -> Result<&str, PrepError> {
        self.key_column
            .as_deref()
            .ok_or(PrepError::MissingKey(operation))
    }

    /// Pass a source column through unchanged, optionally renamed.
    pub fn add_column(&mut self, source: &str, target: Option<&str>) {
        self.transformations.push(Transformation {
            source_column: source.to_string(),
            target_column: Some(target.unwrap_or(source).to_string()),
            expr: Expr::col(source),
            fit_table: None,
            subquery: None,
        });
    }

    /// Record a transformation of one source column. `expr` may still carry
    /// [`Expr::SourceColumn`] placeholders; they are bound here.
    pub fn add_transformation(
        &mut self,
        source: &str,
        target: Option<&str>,
        expr: Expr,
        fit_table: Option<String>,
    ) {
        self.transformations.push(Transformation {
            source_column: source.to_string(),
            target_column: target.map(str::to_string),
            expr: expr.bind_source(source),
            fit_table,
            subquery: None,
        });
    }

    /// Record an expression that aliases itself (a multi-column fragment).
    pub fn add_unaliased_transformation(&mut self, source: &str, expr: Expr) {
        self.transformations.push(Transformation {
            source_column: source.to_string(),
            target_column: None,
            expr: expr.bind_source(source),
            fit_table: None,
            subquery: None,
        });
    }

    /// Record a group of columns computed against one correlated subquery.
    /// The subquery is joined once, on the view's key column; every column
    /// in `columns` is `(source, target, expr)` where the expression reads
    /// from the joined subquery via [`Expr::JoinColumn`].
    pub fn add_matrix_transformation(
        &mut self,
        subquery: String,
        columns: Vec<(String, String, Expr)>,
    ) {
        let mut subquery = Some(subquery);
        for (source, target, expr) in columns {
            self.transformations.push(Transformation {
                source_column: source.clone(),
                target_column: Some(target),
                expr: expr.bind_source(&source),
                fit_table: None,
                subquery: subquery.take(),
            });
        }
    }

    /// Fold the recorded transformations into one SELECT statement.
    pub fn compile(&self, dialect: Dialect, opts: &CompileOptions) -> Result<String, PrepError> {
        let fit_schema = opts
            .replace_fit_schema
            .as_deref()
            .unwrap_or(&self.fit_schema);

        let mut columns: Vec<String> = Vec::new();
        let mut joins = String::new();
        let mut joined_fit_tables: Vec<String> = Vec::new();
        let mut join_alias: Option<String> = None;

        for (i, t) in self.transformations.iter().enumerate() {
            if let Some(subquery) = &t.subquery {
                let key = self.require_key("subquery join")?;
                let alias = format!("sub{}", i);
                joins.push_str(&format!(
                    "\nLEFT OUTER JOIN \n(\n{}\n)\nAS {} ON {}.{} = {}.{}",
                    subquery, alias, DATA_ALIAS, key, alias, key
                ));
                join_alias = Some(alias);
            }
            if let Some(fit_table) = &t.fit_table {
                if !joined_fit_tables.iter().any(|f| f == fit_table) {
                    joins.push_str(&format!(
                        "\nLEFT OUTER JOIN {}.{} AS {} ON {}.{} = {}.label_key",
                        fit_schema, fit_table, fit_table, DATA_ALIAS, t.source_column, fit_table
                    ));
                    joined_fit_tables.push(fit_table.clone());
                }
            }

            let ctx = match &join_alias {
                Some(alias) => RenderContext::with_join_alias(DATA_ALIAS, alias),
                None => RenderContext::new(DATA_ALIAS),
            };
            let rendered = t.expr.render(&ctx)?;
            match &t.target_column {
                Some(target) => columns.push(format!("{} AS {}", rendered, target)),
                None => columns.push(rendered),
            }
            if opts.include_source_columns {
                columns.push(format!("{}.{}", DATA_ALIAS, t.source_column));
            }
        }

        if columns.is_empty() {
            columns.push(format!("{}.*", DATA_ALIAS));
        } else if opts.include_all_source_columns {
            columns.push(format!("{}.*", DATA_ALIAS));
        }

        let data_source = opts
            .replace_data_source
            .clone()
            .unwrap_or_else(|| self.source.render());

        let order_by = opts
            .order_by
            .as_deref()
            .or(self.default_order_by.as_deref())
            .map(|col| format!("\nORDER BY {}", col))
            .unwrap_or_default();

        let sql = format!(
            "SELECT\n{}\nFROM {} AS {}{}{}{}",
            columns.join(",\n"),
            data_source,
            DATA_ALIAS,
            joins,
            order_by,
            dialect.limit_clause(opts.limit, None),
        );
        debug!(view = %self.name, "compiled view");
        Ok(sql)
    }

    /// A fresh, transformation-free view over the same source, sharing this
    /// view's catalog.
    pub fn clone_view(&self, name: &str) -> DatasetView {
        DatasetView {
            name: name.to_string(),
            catalog: self.catalog.clone_for(name),
            transformations: Vec::new(),
            ..self.clone()
        }
    }

    /// Compile this view and wrap the result as the source of a new view, so
    /// further transformations stack on top of the compiled output.
    pub fn clone_as_source(
        &self,
        name: &str,
        dialect: Dialect,
        opts: &CompileOptions,
    ) -> Result<DatasetView, PrepError> {
        let sql = self.compile(dialect, opts)?;
        Ok(DatasetView {
            name: name.to_string(),
            source: Source::Query(sql),
            catalog: self.catalog.clone_for(name),
            transformations: Vec::new(),
            ..self.clone()
        })
    }

    // ---- executor-backed helpers ----

    pub fn row_count(&self, exec: &dyn SqlExecutor) -> Result<u64, PrepError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} AS {}",
            self.source.render(),
            DATA_ALIAS
        );
        let row = self
            .query_one_or_state(exec, &sql, "COUNT(*) returned no rows")?;
        row.first()
            .and_then(value_as_f64)
            .map(|n| n as u64)
            .ok_or_else(|| PrepError::state("COUNT(*) returned a non-numeric value"))
    }

    /// First `limit` raw source rows, untransformed.
    pub fn head(&self, exec: &dyn SqlExecutor, limit: u64) -> Result<RowSet, PrepError> {
        let sql = format!(
            "SELECT * FROM {} AS {}{}",
            self.source.render(),
            DATA_ALIAS,
            exec.dialect().limit_clause(Some(limit), None)
        );
        exec.query(&sql)
    }

    /// Compile and run, returning the transformed rows.
    pub fn fetch(&self, exec: &dyn SqlExecutor, opts: &CompileOptions) -> Result<RowSet, PrepError> {
        let sql = self.compile(exec.dialect(), opts)?;
        exec.query(&sql)
    }

    /// Untransformed values of the named source columns.
    pub fn fetch_columns(
        &self,
        exec: &dyn SqlExecutor,
        columns: &[&str],
    ) -> Result<RowSet, PrepError> {
        let mut view = self.clone_view(&format!("{}_projection", self.name));
        for column in columns {
            view.add_column(column, None);
        }
        view.fetch(exec, &CompileOptions::default())
    }

    /// Column metadata of the underlying dataset table.
    pub fn table_schema(&self, exec: &dyn SqlExecutor) -> Result<RowSet, PrepError> {
        exec.table_schema(&self.dataset_schema, &self.dataset_table)
    }

    /// Materialize the compiled view into `schema.table`, replacing any
    /// previous incarnation. With `register` the table joins the catalog for
    /// later cleanup; registration happens only after the engine confirmed
    /// the create.
    pub fn materialize(
        &self,
        exec: &dyn SqlExecutor,
        schema: &str,
        table: &str,
        opts: &CompileOptions,
        register: bool,
    ) -> Result<(), PrepError> {
        exec.drop_table(schema, table)?;
        self.catalog.unregister(exec, schema, table)?;
        let select = self.compile(exec.dialect(), opts)?;
        exec.execute(&exec.dialect().create_table_as(schema, table, &select))?;
        if register {
            self.catalog.register(exec, schema, table)?;
        }
        Ok(())
    }

    /// Seeded random sample of the raw source rows.
    pub fn sample(
        &self,
        exec: &dyn SqlExecutor,
        size: SampleSize,
        seed: f64,
    ) -> Result<RowSet, PrepError> {
        let sql = self.sample_select(exec, size, seed)?;
        exec.query(&sql)
    }

    /// Materialize a seeded random sample into `fit_schema.table` and
    /// register it for cleanup.
    pub fn sample_to_table(
        &self,
        exec: &dyn SqlExecutor,
        size: SampleSize,
        seed: f64,
        table: &str,
    ) -> Result<DatasetView, PrepError> {
        exec.drop_table(&self.fit_schema, table)?;
        self.catalog.unregister(exec, &self.fit_schema, table)?;
        let select = self.sample_select(exec, size, seed)?;
        exec.execute(&exec.dialect().create_table_as(&self.fit_schema, table, &select))?;
        self.catalog.register(exec, &self.fit_schema, table)?;

        let mut view = self.clone_view(&format!("{}_sample", self.name));
        view.source = Source::Table {
            schema: self.fit_schema.clone(),
            table: table.to_string(),
        };
        view.dataset_schema = self.fit_schema.clone();
        view.dataset_table = table.to_string();
        Ok(view)
    }

    fn sample_select(
        &self,
        exec: &dyn SqlExecutor,
        size: SampleSize,
        seed: f64,
    ) -> Result<String, PrepError> {
        let rows = match size {
            SampleSize::Rows(n) => n,
            SampleSize::Fraction(f) => {
                if !(0.0..=1.0).contains(&f) || f == 0.0 {
                    return Err(PrepError::state(format!(
                        "sample fraction {} outside (0, 1]",
                        f
                    )));
                }
                (self.row_count(exec)? as f64 * f).floor() as u64
            }
        };
        let (reseed, random_expr) = exec.dialect().seeded_random(seed);
        if let Some(stmt) = reseed {
            exec.execute(&stmt)?;
        }
        Ok(format!(
            "SELECT * FROM {} AS {}\nORDER BY {}{}",
            self.source.render(),
            DATA_ALIAS,
            random_expr,
            exec.dialect().limit_clause(Some(rows), None)
        ))
    }

    fn query_one_or_state(
        &self,
        exec: &dyn SqlExecutor,
        sql: &str,
        empty_message: &str,
    ) -> Result<Vec<Value>, PrepError> {
        exec.query_one(sql)?
            .ok_or_else(|| PrepError::state(empty_message))
    }
}
