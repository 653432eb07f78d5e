//! Matrix transformers: whole-row operations expressed as correlated
//! subqueries joined back to the view by its unique key.

use serde::{Deserialize, Serialize};

use sqlprep_sql::Expr;

use crate::error::PrepError;
use crate::executor::SqlExecutor;
use crate::transform::numeric;
use crate::view::{DatasetView, DATA_ALIAS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
    Max,
}

/// Normalize each row to unit norm. Stateless: the per-row norms are
/// computed by the subquery itself, every listed column is divided by its
/// row's norm and lands as `{col}_encoded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Normalizer {
    pub norm: Norm,
}

impl Default for Normalizer {
    fn default() -> Normalizer {
        Normalizer { norm: Norm::L2 }
    }
}

impl Normalizer {
    pub fn new(norm: Norm) -> Normalizer {
        Normalizer { norm }
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        let key = view.require_key("Normalizer")?.to_string();
        let src = view.source.render();

        let cast_list = columns
            .iter()
            .map(|c| format!("CAST({c} AS DOUBLE PRECISION) AS {c}", c = c))
            .collect::<Vec<_>>()
            .join(", ");
        let source_matrix = format!(
            "SELECT {}, {}\nFROM {} AS {}",
            key, cast_list, src, DATA_ALIAS
        );

        let norms = match self.norm {
            Norm::L1 => {
                let sum = columns
                    .iter()
                    .map(|c| format!("ABS({})", c))
                    .collect::<Vec<_>>()
                    .join(" + ");
                format!(
                    "SELECT {}, {} AS row_norm\nFROM {} AS {}",
                    key, sum, src, DATA_ALIAS
                )
            }
            Norm::L2 => {
                let sum = columns
                    .iter()
                    .map(|c| format!("{c} * {c}", c = c))
                    .collect::<Vec<_>>()
                    .join(" + ");
                format!(
                    "SELECT {}, SQRT({}) AS row_norm\nFROM {} AS {}",
                    key, sum, src, DATA_ALIAS
                )
            }
            Norm::Max => {
                let branches = columns
                    .iter()
                    .map(|c| {
                        format!(
                            "\nSELECT {}, {} AS row_val FROM {} AS {}",
                            key, c, src, DATA_ALIAS
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\nUNION ALL");
                format!(
                    "SELECT {k}, MAX(row_val) AS row_norm\nFROM \n({b}\n)\nAS row_norms GROUP BY {k}",
                    k = key,
                    b = branches
                )
            }
        };

        let target_list = columns
            .iter()
            .map(|c| format!("{c} / row_norm AS {c}", c = c))
            .collect::<Vec<_>>()
            .join(", ");
        let subquery = format!(
            "SELECT source_matrix.{k}, {t}\nFROM \n(\n{s}\n)\nAS source_matrix,\n(\n{n}\n)\n\
             AS norms\nWHERE source_matrix.{k} = norms.{k}",
            k = key,
            t = target_list,
            s = source_matrix,
            n = norms
        );

        let records = columns
            .iter()
            .map(|c| {
                (
                    c.clone(),
                    format!("{}_encoded", c),
                    Expr::JoinColumn(c.clone()),
                )
            })
            .collect();
        view.add_matrix_transformation(subquery, records);
        Ok(())
    }
}

/// Center a square kernel matrix. Fit stores the grand mean (`k_fit_all`)
/// and the per-column means (`k_fit_rows`, pivoted out of a row-indexed
/// scan); transform joins the centered matrix to the per-row column sums.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelCenterer {
    #[serde(default)]
    pub k_fit_all: Option<f64>,
    #[serde(default)]
    pub k_fit_rows: Vec<f64>,
}

impl KernelCenterer {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        if columns.is_empty() {
            return Err(PrepError::state("KernelCenterer requires columns"));
        }
        let key = view.require_key("KernelCenterer")?;
        let src = view.source.render();
        let n = columns.len();
        let sum_row = columns.join(" + ");

        let sql = format!(
            "SELECT SUM(k_fit_row) / {n} AS k_fit_all\nFROM\n(\n\
             SELECT CAST(({sum}) AS DOUBLE PRECISION) / {n} AS k_fit_row\n\
             FROM {src} AS {alias}\n)\nAS k_rows",
            n = n,
            sum = sum_row,
            src = src,
            alias = DATA_ALIAS
        );
        let row = exec
            .query_one(&sql)?
            .ok_or_else(|| PrepError::state("k_fit_all query returned no rows"))?;
        self.k_fit_all = Some(numeric(&row, 0, "k_fit_all")?);

        let pivot = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "\nSUM(CASE WHEN row_index = {} THEN k_fit_row END) AS {}",
                    i + 1,
                    c
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT {pivot}\nFROM\n(\n\
             SELECT CAST(({sum}) AS DOUBLE PRECISION) / {n} AS k_fit_row, \
             ROW_NUMBER() OVER (ORDER BY {key}) AS row_index\n\
             FROM {src} AS {alias}\n)\nAS k_rows",
            pivot = pivot,
            sum = sum_row,
            n = n,
            key = key,
            src = src,
            alias = DATA_ALIAS
        );
        let row = exec
            .query_one(&sql)?
            .ok_or_else(|| PrepError::state("k_fit_rows query returned no rows"))?;
        let mut fit_rows = Vec::with_capacity(n);
        for i in 0..n {
            fit_rows.push(numeric(&row, i, "k_fit_rows")?);
        }
        self.k_fit_rows = fit_rows;
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        let k_fit_all = self
            .k_fit_all
            .ok_or_else(|| PrepError::state("KernelCenterer not fitted"))?;
        if self.k_fit_rows.len() != columns.len() {
            return Err(PrepError::state(format!(
                "KernelCenterer fitted for {} columns but asked to transform {}",
                self.k_fit_rows.len(),
                columns.len()
            )));
        }
        let key = view.require_key("KernelCenterer")?.to_string();
        let src = view.source.render();
        let n = columns.len();

        let centered = columns
            .iter()
            .zip(&self.k_fit_rows)
            .map(|(c, k)| format!("\n{c} - {k} AS {c}", c = c, k = k))
            .collect::<Vec<_>>()
            .join(", ");
        let k_fit_rows_sub = format!(
            "SELECT\n{key}, {centered},\nROW_NUMBER() OVER (ORDER BY {key}) AS row_index\n\
             FROM {src} AS {alias}",
            key = key,
            centered = centered,
            src = src,
            alias = DATA_ALIAS
        );

        let k_pred_cols = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                format!(
                    "\nSELECT SUM({c}) / {n} AS k_pred_col, {i} AS row_index FROM {src} AS {alias}",
                    c = c,
                    n = n,
                    i = i + 1,
                    src = src,
                    alias = DATA_ALIAS
                )
            })
            .collect::<Vec<_>>()
            .join("\nUNION ALL");

        let targets = columns
            .iter()
            .map(|c| {
                format!(
                    "k_fit_rows.{c} - k_pred_cols.k_pred_col + {k} AS {c}",
                    c = c,
                    k = k_fit_all
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let subquery = format!(
            "SELECT k_fit_rows.{key},\n{targets}\nFROM \n(\n{rows}\n)\nAS k_fit_rows\n\
             INNER JOIN\n({cols}\n)\nAS k_pred_cols \
             ON k_pred_cols.row_index = k_fit_rows.row_index",
            key = key,
            targets = targets,
            rows = k_fit_rows_sub,
            cols = k_pred_cols
        );

        let records = columns
            .iter()
            .map(|c| {
                (
                    c.clone(),
                    format!("{}_encoded", c),
                    Expr::JoinColumn(c.clone()),
                )
            })
            .collect();
        view.add_matrix_transformation(subquery, records);
        Ok(())
    }
}
