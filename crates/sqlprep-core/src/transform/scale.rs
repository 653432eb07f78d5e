//! Numeric scalers. Fit runs one aggregate per column and bakes the result
//! into the transform expression as literals, so the compiled SELECT is
//! self-contained.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use sqlprep_sql::{BinaryOp, Expr, SqlType};

use crate::error::PrepError;
use crate::executor::SqlExecutor;
use crate::transform::{aggregate_one, numeric};
use crate::view::DatasetView;

fn fitted<'a, T>(
    state: &'a BTreeMap<String, T>,
    column: &str,
    variant: &str,
) -> Result<&'a T, PrepError> {
    state.get(column).ok_or_else(|| {
        PrepError::state(format!("{} not fitted for column {}", variant, column))
    })
}

/// Threshold binarizer: `CASE WHEN col > threshold THEN 1 ELSE 0 END`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binarizer {
    pub threshold: f64,
}

impl Default for Binarizer {
    fn default() -> Binarizer {
        Binarizer { threshold: 0.0 }
    }
}

impl Binarizer {
    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let expr = Expr::Case {
                operand: None,
                whens: vec![(
                    Expr::SourceColumn.binary(BinaryOp::Gt, Expr::float(self.threshold)),
                    Expr::int(1),
                )],
                else_: Some(Box::new(Expr::int(0))),
            };
            view.add_transformation(column, Some(column), expr, None);
        }
        Ok(())
    }
}

/// Scale into `[0, 1]` by the fitted minimum and maximum.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinMaxScaler {
    /// `(min, max)` per fitted column.
    #[serde(default)]
    pub bounds: BTreeMap<String, (f64, f64)>,
}

impl MinMaxScaler {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let row = aggregate_one(
                view,
                exec,
                &format!("MIN({c}) AS min_value, MAX({c}) AS max_value", c = column),
            )?;
            let min = numeric(&row, 0, "MIN")?;
            let max = numeric(&row, 1, "MAX")?;
            self.bounds.insert(column.clone(), (min, max));
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let (min, max) = *fitted(&self.bounds, column, "MinMaxScaler")?;
            let expr = Expr::SourceColumn
                .cast(SqlType::Double)
                .binary(BinaryOp::Sub, Expr::float(min))
                .binary(BinaryOp::Div, Expr::float(max - min));
            view.add_transformation(column, Some(column), expr, None);
        }
        Ok(())
    }
}

/// Scale by the fitted maximum absolute value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaxAbsScaler {
    #[serde(default)]
    pub max_abs: BTreeMap<String, f64>,
}

impl MaxAbsScaler {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let row = aggregate_one(
                view,
                exec,
                &format!("MAX(ABS({})) AS max_value", column),
            )?;
            self.max_abs
                .insert(column.clone(), numeric(&row, 0, "MAX(ABS)")?);
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let max_abs = *fitted(&self.max_abs, column, "MaxAbsScaler")?;
            let expr = Expr::SourceColumn
                .cast(SqlType::Double)
                .binary(BinaryOp::Div, Expr::float(max_abs));
            view.add_transformation(column, Some(column), expr, None);
        }
        Ok(())
    }
}

/// Standardize to zero mean and unit variance. Standard-deviation results
/// differ slightly between engines, so comparisons against other libraries
/// need rounding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    /// `(mean, stddev)` per fitted column.
    #[serde(default)]
    pub moments: BTreeMap<String, (f64, f64)>,
}

impl StandardScaler {
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        for column in columns {
            let row = aggregate_one(
                view,
                exec,
                &format!(
                    "AVG({c}) AS mean_value, STDDEV({c}) AS stddev_value",
                    c = column
                ),
            )?;
            let mean = numeric(&row, 0, "AVG")?;
            let stddev = numeric(&row, 1, "STDDEV")?;
            self.moments.insert(column.clone(), (mean, stddev));
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let (mean, stddev) = *fitted(&self.moments, column, "StandardScaler")?;
            let expr = Expr::SourceColumn
                .cast(SqlType::Double)
                .binary(BinaryOp::Sub, Expr::float(mean))
                .binary(BinaryOp::Div, Expr::float(stddev));
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
    fn min_max_bakes_fitted_bounds() {
        let exec = MockExecutor::standard();
        exec.push_query_result(RowSet {
            columns: vec!["min_value".into(), "max_value".into()],
            rows: vec![vec![json!(1.0), json!(5.0)]],
        });

        let mut v = view();
        let mut t = MinMaxScaler::default();
        let cols = vec!["fare".to_string()];
        t.fit(&v, &exec, &cols).unwrap();
        t.transform(&mut v, &cols).unwrap();

        assert_eq!(
            exec.queries()[0],
            "SELECT MIN(fare) AS min_value, MAX(fare) AS max_value FROM s1.t AS data_table"
        );
        assert!(compiled(&v)
            .contains("((CAST(data_table.fare AS DOUBLE PRECISION) - 1) / 4) AS fare"));
    }

    #[test]
    fn transform_before_fit_is_a_state_error() {
        let t = StandardScaler::default();
        let err = t
            .transform(&mut view(), &["fare".to_string()])
            .unwrap_err();
        assert!(matches!(err, PrepError::State(_)));
    }

    #[test]
    fn binarizer_is_stateless() {
        let mut v = view();
        Binarizer { threshold: 2.5 }
            .transform(&mut v, &["fare".to_string()])
            .unwrap();
        assert!(compiled(&v)
            .contains("CASE WHEN (data_table.fare > 2.5) THEN 1 ELSE 0 END AS fare"));
    }

    #[test]
    fn standard_scaler_divides_by_stddev() {
        let exec = MockExecutor::standard();
        exec.push_query_result(RowSet {
            columns: vec!["mean_value".into(), "stddev_value".into()],
            rows: vec![vec![json!(10.0), json!(2.0)]],
        });
        let mut v = view();
        let mut t = StandardScaler::default();
        let cols = vec!["age".to_string()];
        t.fit(&v, &exec, &cols).unwrap();
        t.transform(&mut v, &cols).unwrap();
        assert!(compiled(&v)
            .contains("((CAST(data_table.age AS DOUBLE PRECISION) - 10) / 2) AS age"));
    }
}
