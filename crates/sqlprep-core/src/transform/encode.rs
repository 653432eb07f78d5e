//! Categorical encoders.
//!
//! The dense-rank encoders (`LabelEncoder`/`OrdinalEncoder`) materialize a
//! mapping table in the fit schema and transform by joining it; the
//! expanding encoders (`OneHotEncoder`/`LabelBinarizer`) keep their category
//! lists in memory and transform into one indicator CASE per class.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use sqlprep_sql::{quote_ident, BinaryOp, Expr, Literal, RenderContext};

use crate::error::PrepError;
use crate::executor::SqlExecutor;
use crate::transform::value_to_string;
use crate::view::{DatasetView, DATA_ALIAS};

/// Category label to a safe output-column fragment. Collisions after
/// sanitization get a deterministic numeric suffix.
fn sanitized_label(label: &str, used: &mut Vec<String>) -> String {
    let base = label.trim().replace([' ', '.'], "_");
    let mut name = base.clone();
    let mut n = 2;
    while used.iter().any(|u| u == &name) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    used.push(name.clone());
    name
}

fn all_numeric(labels: &[String]) -> bool {
    !labels.is_empty() && labels.iter().all(|l| l.parse::<f64>().is_ok())
}

/// One indicator expression: `CASE WHEN col = value THEN 1 ELSE 0 END`.
fn indicator(column: &str, value: Literal) -> Expr {
    Expr::Case {
        operand: None,
        whens: vec![(
            Expr::col(column).binary(BinaryOp::Eq, Expr::lit(value)),
            Expr::int(1),
        )],
        else_: Some(Box::new(Expr::int(0))),
    }
}

/// Materialize the dense-rank mapping table for one column and register it
/// with the view's catalog. Shared by both dense-rank encoders.
fn fit_category_table(
    view: &DatasetView,
    exec: &dyn SqlExecutor,
    column: &str,
    suffix: &str,
) -> Result<String, PrepError> {
    let fit_table = view.catalog.fit_table_name(column, suffix);
    view.catalog
        .drop_fit_table(exec, &view.fit_schema, &fit_table)?;

    let select = format!(
        "SELECT label_key, (ROW_NUMBER() OVER (ORDER BY label_key)) - 1 AS label_encoded\n\
         FROM (SELECT DISTINCT {} AS label_key FROM {} AS {}) AS table_input",
        column,
        view.source.render(),
        DATA_ALIAS
    );
    exec.execute(&exec.dialect().create_table_as(&view.fit_schema, &fit_table, &select))?;
    // Fan-out guard: a label must map to exactly one code.
    exec.execute(&format!(
        "CREATE UNIQUE INDEX {}_key ON {}.{}(label_key)",
        fit_table, view.fit_schema, fit_table
    ))?;
    view.catalog.register(exec, &view.fit_schema, &fit_table)?;
    info!(table = %fit_table, schema = %view.fit_schema, "created fit table");
    Ok(fit_table)
}

/// Build the mapping table from an externally fitted class list instead of
/// scanning the data, preserving the given order as the code order.
fn load_category_table(
    view: &DatasetView,
    exec: &dyn SqlExecutor,
    column: &str,
    suffix: &str,
    classes: &[String],
) -> Result<String, PrepError> {
    let fit_table = view.catalog.fit_table_name(column, suffix);
    view.catalog
        .drop_fit_table(exec, &view.fit_schema, &fit_table)?;

    exec.execute(&format!(
        "CREATE TABLE {}.{} (label_key VARCHAR(255) NOT NULL, label_encoded INTEGER)",
        view.fit_schema, fit_table
    ))?;
    let columns = vec!["label_key".to_string(), "label_encoded".to_string()];
    let rows: Vec<Vec<Value>> = classes
        .iter()
        .enumerate()
        .map(|(code, class)| vec![Value::from(class.as_str()), Value::from(code as i64)])
        .collect();
    exec.bulk_load(&view.fit_schema, &fit_table, &columns, &rows)?;
    exec.execute(&format!(
        "CREATE UNIQUE INDEX {}_key ON {}.{}(label_key)",
        fit_table, view.fit_schema, fit_table
    ))?;
    view.catalog.register(exec, &view.fit_schema, &fit_table)?;
    Ok(fit_table)
}

fn transform_with_fit_table(
    view: &mut DatasetView,
    fit_tables: &BTreeMap<String, String>,
    variant: &str,
    columns: &[String],
) -> Result<(), PrepError> {
    for column in columns {
        let fit_table = fit_tables.get(column).ok_or_else(|| {
            PrepError::state(format!("{} not fitted for column {}", variant, column))
        })?;
        let expr = Expr::TableColumn {
            table: fit_table.clone(),
            column: "label_encoded".to_string(),
        };
        view.add_transformation(column, Some(column), expr, Some(fit_table.clone()));
    }
    Ok(())
}

/// Encode labels as dense codes `0..n_classes-1` in label order, via a
/// materialized mapping table (suffix `le`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelEncoder {
    #[serde(default)]
    pub fit_tables: BTreeMap<String, String>,
}

impl LabelEncoder {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let fit_table = fit_category_table(view, exec, column, "le")?;
            self.fit_tables.insert(column.clone(), fit_table);
        }
        Ok(())
    }

    /// Build the mapping from a known class list (e.g. a previously fitted
    /// encoder) instead of scanning the data.
    pub fn fit_from_classes(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        column: &str,
        classes: &[String],
    ) -> Result<(), PrepError> {
        let fit_table = load_category_table(view, exec, column, "le", classes)?;
        self.fit_tables.insert(column.to_string(), fit_table);
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        transform_with_fit_table(view, &self.fit_tables, "LabelEncoder", columns)
    }
}

/// Same mapping-table mechanics as [`LabelEncoder`] with its own fit-table
/// namespace (suffix `oe`), for feature columns rather than targets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    #[serde(default)]
    pub fit_tables: BTreeMap<String, String>,
}

impl OrdinalEncoder {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let fit_table = fit_category_table(view, exec, column, "oe")?;
            self.fit_tables.insert(column.clone(), fit_table);
        }
        Ok(())
    }

    pub fn fit_from_categories(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        column: &str,
        categories: &[String],
    ) -> Result<(), PrepError> {
        let fit_table = load_category_table(view, exec, column, "oe", categories)?;
        self.fit_tables.insert(column.to_string(), fit_table);
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        transform_with_fit_table(view, &self.fit_tables, "OrdinalEncoder", columns)
    }
}

/// Expand a categorical column into one indicator column per category.
/// NULL is not a category; every category always gets its own column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OneHotEncoder {
    #[serde(default)]
    pub categories: BTreeMap<String, Vec<String>>,
}

impl OneHotEncoder {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let sql = format!(
                "SELECT DISTINCT TRIM(CAST({c} AS VARCHAR)) AS label_code \
                 FROM {src} AS {alias} WHERE {c} IS NOT NULL \
                 ORDER BY TRIM(CAST({c} AS VARCHAR))",
                c = column,
                src = view.source.render(),
                alias = DATA_ALIAS
            );
            let rows = exec.query(&sql)?;
            let categories = rows
                .rows
                .iter()
                .filter_map(|row| row.first().map(value_to_string))
                .collect();
            self.categories.insert(column.clone(), categories);
        }
        Ok(())
    }

    pub fn from_categories(column: &str, categories: &[&str]) -> OneHotEncoder {
        let mut map = BTreeMap::new();
        map.insert(
            column.to_string(),
            categories.iter().map(|c| c.to_string()).collect(),
        );
        OneHotEncoder { categories: map }
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let categories = self.categories.get(column).ok_or_else(|| {
                PrepError::state(format!("OneHotEncoder not fitted for column {}", column))
            })?;
            if categories.is_empty() {
                return Err(PrepError::state(format!(
                    "OneHotEncoder fit found no categories for column {}",
                    column
                )));
            }

            // Numeric category sets compare unquoted so '01' and 1 agree.
            let numeric_labels = all_numeric(categories);
            let ctx = RenderContext::new(DATA_ALIAS);
            let mut used = Vec::new();
            let mut fragments = Vec::new();
            for category in categories {
                let value = if numeric_labels {
                    match category.parse::<i64>() {
                        Ok(i) => Literal::Int(i),
                        Err(_) => Literal::Float(category.parse().unwrap_or(0.0)),
                    }
                } else {
                    Literal::Str(category.clone())
                };
                let label = sanitized_label(category, &mut used);
                fragments.push(format!(
                    "{} AS {}",
                    indicator(column, value).render(&ctx)?,
                    quote_ident(&format!("{}_{}", column, label))
                ));
            }
            view.add_unaliased_transformation(column, Expr::Raw(fragments.join(",\n")));
        }
        Ok(())
    }
}

/// Label binarizer: like one-hot but NULL is a class of its own (indicator
/// column `col_NULL`), and exactly two classes collapse into a single column
/// indicating the lexicographically larger one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelBinarizer {
    /// Distinct classes per fitted column, in label order; `None` is the
    /// NULL class.
    #[serde(default)]
    pub classes: BTreeMap<String, Vec<Option<String>>>,
}

impl LabelBinarizer {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let sql = format!(
                "SELECT DISTINCT {c} AS label_code FROM {src} AS {alias} ORDER BY {c}",
                c = column,
                src = view.source.render(),
                alias = DATA_ALIAS
            );
            let rows = exec.query(&sql)?;
            let classes = rows
                .rows
                .iter()
                .filter_map(|row| row.first())
                .map(|v| match v {
                    Value::Null => None,
                    other => Some(value_to_string(other)),
                })
                .collect();
            self.classes.insert(column.clone(), classes);
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let classes = self.classes.get(column).ok_or_else(|| {
                PrepError::state(format!("LabelBinarizer not fitted for column {}", column))
            })?;
            if classes.is_empty() {
                return Err(PrepError::state(format!(
                    "LabelBinarizer fit found no classes for column {}",
                    column
                )));
            }

            let selected: Vec<&Option<String>> = if classes.len() == 2 {
                // Two classes collapse into one binary column for the
                // larger class, matching the sklearn convention.
                vec![&classes[1]]
            } else {
                classes.iter().collect()
            };

            let ctx = RenderContext::new(DATA_ALIAS);
            let mut used = Vec::new();
            let mut fragments = Vec::new();
            for class in selected {
                let (expr, label) = match class {
                    Some(name) => (
                        indicator(column, Literal::Str(name.clone())),
                        sanitized_label(name, &mut used),
                    ),
                    None => (
                        Expr::Case {
                            operand: None,
                            whens: vec![(
                                Expr::IsNull(Box::new(Expr::col(column))),
                                Expr::int(1),
                            )],
                            else_: Some(Box::new(Expr::int(0))),
                        },
                        "NULL".to_string(),
                    ),
                };
                fragments.push(format!(
                "{} AS {}",
                expr.render(&ctx)?,
                quote_ident(&format!("{}_{}", column, label))
            ));
            }
            view.add_unaliased_transformation(column, Expr::Raw(fragments.join(",\n")));
        }
        Ok(())
    }
}
