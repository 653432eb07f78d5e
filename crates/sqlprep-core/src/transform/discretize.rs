//! Quantile binning and missing-value imputation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sqlprep_sql::{BinaryOp, Expr, Literal, SqlType};

use crate::error::PrepError;
use crate::executor::SqlExecutor;
use crate::transform::{aggregate_one, literal_from_value, numeric};
use crate::view::{DatasetView, DATA_ALIAS};

/// Quantile discretizer: ordinal encoding into `1..n_bins` by NTILE edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KBinsDiscretizer {
    pub n_bins: u32,
    /// Upper edge of each fitted bin, per column, in bin order.
    #[serde(default)]
    pub bin_edges: BTreeMap<String, Vec<f64>>,
}

impl KBinsDiscretizer {
    pub fn new(n_bins: u32) -> KBinsDiscretizer {
        KBinsDiscretizer {
            n_bins,
            bin_edges: BTreeMap::new(),
        }
    }

    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        if self.n_bins < 2 {
            return Err(PrepError::state("KBinsDiscretizer needs at least 2 bins"));
        }
        for column in columns {
            let sql = format!(
                "SELECT MIN({c}) AS bin_min, MAX({c}) AS bin_max FROM (\
                 SELECT {c}, NTILE({k}) OVER (ORDER BY {c}) AS nbin \
                 FROM {src} AS {alias}) AS binned GROUP BY nbin ORDER BY nbin",
                c = column,
                k = self.n_bins,
                src = view.source.render(),
                alias = DATA_ALIAS
            );
            let rows = exec.query(&sql)?;
            let mut edges = Vec::with_capacity(rows.row_count());
            for row in &rows.rows {
                edges.push(numeric(row, 1, "bin_max")?);
            }
            self.bin_edges.insert(column.clone(), edges);
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let edges = self.bin_edges.get(column).ok_or_else(|| {
                PrepError::state(format!(
                    "KBinsDiscretizer not fitted for column {}",
                    column
                ))
            })?;
            if edges.len() < 2 {
                return Err(PrepError::state(format!(
                    "KBinsDiscretizer fit produced fewer than 2 bins for column {}",
                    column
                )));
            }
            // Bins 1..k-1 by upper edge; everything above the second-to-last
            // edge overflows into bin k.
            let whens = edges[..edges.len() - 1]
                .iter()
                .enumerate()
                .map(|(i, edge)| {
                    (
                        Expr::SourceColumn.binary(BinaryOp::Le, Expr::float(*edge)),
                        Expr::int(i as i64 + 1),
                    )
                })
                .collect();
            let expr = Expr::Case {
                operand: None,
                whens,
                else_: Some(Box::new(Expr::int(edges.len() as i64))),
            };
            view.add_transformation(column, Some(column), expr, None);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    MostFrequent,
    Constant,
}

/// Replace NULLs with a fill value: the column mean, the most frequent
/// value, or a supplied constant. Transform is a COALESCE with the fitted
/// fill baked in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleImputer {
    pub strategy: ImputeStrategy,
    /// Constant fill for [`ImputeStrategy::Constant`].
    #[serde(default)]
    pub fill_value: Option<Literal>,
    /// Cast applied around the mean aggregate.
    #[serde(default)]
    pub cast_as: Option<SqlType>,
    #[serde(default)]
    pub fills: BTreeMap<String, Literal>,
}

impl SimpleImputer {
    pub fn mean() -> SimpleImputer {
        SimpleImputer {
            strategy: ImputeStrategy::Mean,
            fill_value: None,
            cast_as: None,
            fills: BTreeMap::new(),
        }
    }

    pub fn most_frequent() -> SimpleImputer {
        SimpleImputer {
            strategy: ImputeStrategy::MostFrequent,
            ..SimpleImputer::mean()
        }
    }

    pub fn constant(fill_value: Literal) -> SimpleImputer {
        SimpleImputer {
            strategy: ImputeStrategy::Constant,
            fill_value: Some(fill_value),
            ..SimpleImputer::mean()
        }
    }

    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let fill = match self.strategy {
                ImputeStrategy::Mean => {
                    let mut agg = format!("AVG({})", column);
                    if let Some(ty) = self.cast_as {
                        agg = format!("CAST({} AS {})", agg, ty.as_str());
                    }
                    let row = aggregate_one(view, exec, &format!("{} AS fill_value", agg))?;
                    Literal::Float(numeric(&row, 0, "AVG")?)
                }
                ImputeStrategy::MostFrequent => {
                    let sql = format!(
                        "SELECT {c} AS fill_value, COUNT({c}) AS value_frequency \
                         FROM {src} AS {alias} GROUP BY {c} \
                         ORDER BY value_frequency DESC{limit}",
                        c = column,
                        src = view.source.render(),
                        alias = DATA_ALIAS,
                        limit = exec.dialect().limit_clause(Some(1), None)
                    );
                    let row = exec.query_one(&sql)?.ok_or_else(|| {
                        PrepError::state(format!(
                            "most-frequent query returned no rows for column {}",
                            column
                        ))
                    })?;
                    row.first()
                        .map(literal_from_value)
                        .ok_or_else(|| PrepError::state("most-frequent query returned no value"))?
                }
                ImputeStrategy::Constant => self.fill_value.clone().ok_or_else(|| {
                    PrepError::state("constant imputer requires a fill_value")
                })?,
            };
            self.fills.insert(column.clone(), fill);
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let fill = self.fills.get(column).ok_or_else(|| {
                PrepError::state(format!("SimpleImputer not fitted for column {}", column))
            })?;
            let expr = Expr::Coalesce(vec![Expr::SourceColumn, Expr::lit(fill.clone())]);
            view.add_transformation(column, Some(column), expr, None);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RowSet;
    use crate::testing::MockExecutor;
    use crate::view::CompileOptions;
    use serde_json::json;
    use sqlprep_sql::Dialect;

    fn view() -> DatasetView {
        DatasetView::for_table("t", "s1", "t")
    }

    fn compiled(view: &DatasetView) -> String {
        view.compile(Dialect::Standard, &CompileOptions::default())
            .unwrap()
    }

    #[test]
    fn kbins_fit_collects_ntile_edges() {
        let exec = MockExecutor::standard();
        exec.push_query_result(RowSet {
            columns: vec!["bin_min".into(), "bin_max".into()],
            rows: vec![
                vec![json!(0.0), json!(7.9)],
                vec![json!(8.0), json!(14.5)],
                vec![json!(14.6), json!(512.3)],
            ],
        });
        let mut v = view();
        let mut t = KBinsDiscretizer::new(3);
        let cols = vec!["fare".to_string()];
        t.fit(&v, &exec, &cols).unwrap();
        t.transform(&mut v, &cols).unwrap();

        assert!(exec.queries()[0].contains("NTILE(3) OVER (ORDER BY fare)"));
        let sql = compiled(&v);
        assert!(sql.contains(
            "CASE WHEN (data_table.fare <= 7.9) THEN 1 \
             WHEN (data_table.fare <= 14.5) THEN 2 ELSE 3 END AS fare"
        ));
    }

    #[test]
    fn kbins_rejects_single_bin() {
        let exec = MockExecutor::standard();
        let mut t = KBinsDiscretizer::new(1);
        assert!(t.fit(&view(), &exec, &["fare".to_string()]).is_err());
    }

    #[test]
    fn mean_imputer_bakes_the_average() {
        let exec = MockExecutor::standard();
        exec.push_query_result(RowSet {
            columns: vec!["fill_value".into()],
            rows: vec![vec![json!(29.7)]],
        });
        let mut v = view();
        let mut t = SimpleImputer::mean();
        let cols = vec!["age".to_string()];
        t.fit(&v, &exec, &cols).unwrap();
        t.transform(&mut v, &cols).unwrap();
        assert!(compiled(&v).contains("COALESCE(data_table.age, 29.7) AS age"));
    }

    #[test]
    fn most_frequent_imputer_takes_the_top_group() {
        let exec = MockExecutor::standard();
        exec.push_query_result(RowSet {
            columns: vec!["fill_value".into(), "value_frequency".into()],
            rows: vec![vec![json!("S"), json!(644)]],
        });
        let mut v = view();
        let mut t = SimpleImputer::most_frequent();
        let cols = vec!["embarked".to_string()];
        t.fit(&v, &exec, &cols).unwrap();
        t.transform(&mut v, &cols).unwrap();

        assert!(exec.queries()[0]
            .contains("GROUP BY embarked ORDER BY value_frequency DESC\nLIMIT 1"));
        assert!(compiled(&v).contains("COALESCE(data_table.embarked, 'S') AS embarked"));
    }

    #[test]
    fn constant_imputer_requires_a_fill_value() {
        let exec = MockExecutor::standard();
        let mut t = SimpleImputer {
            strategy: ImputeStrategy::Constant,
            fill_value: None,
            cast_as: None,
            fills: BTreeMap::new(),
        };
        assert!(t.fit(&view(), &exec, &["c".to_string()]).is_err());

        let mut t = SimpleImputer::constant(Literal::Int(0));
        let mut v = view();
        let cols = vec!["sibsp".to_string()];
        t.fit(&v, &exec, &cols).unwrap();
        t.transform(&mut v, &cols).unwrap();
        assert!(compiled(&v).contains("COALESCE(data_table.sibsp, 0) AS sibsp"));
    }
}
