//! Stateless transformers: projection, UDF calls, custom expressions and the
//! two hand-written CASE encoders.

use serde::{Deserialize, Serialize};

use sqlprep_sql::{Expr, Literal};

use crate::error::PrepError;
use crate::view::DatasetView;

/// Project the source column unchanged, optionally renamed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Passthrough {
    #[serde(default)]
    pub target_column: Option<String>,
}

impl Passthrough {
    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            view.add_column(column, self.target_column.as_deref());
        }
        Ok(())
    }
}

/// Apply an engine-resident UDF. `args` defaults to the source column as the
/// single argument; [`Expr::SourceColumn`] in custom argument lists binds to
/// the transformed column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Udf {
    pub udf: String,
    #[serde(default)]
    pub args: Option<Vec<Expr>>,
    #[serde(default)]
    pub target_column: Option<String>,
}

impl Udf {
    pub fn new(udf: &str) -> Udf {
        Udf {
            udf: udf.to_string(),
            args: None,
            target_column: None,
        }
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let args = self
                .args
                .clone()
                .unwrap_or_else(|| vec![Expr::SourceColumn]);
            let target = self.target_column.as_deref().unwrap_or(column);
            view.add_transformation(column, Some(target), Expr::func(&self.udf, args), None);
        }
        Ok(())
    }
}

/// Apply a user-supplied expression, bound to the source column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomExpr {
    pub expr: Expr,
    #[serde(default)]
    pub target_column: Option<String>,
}

impl CustomExpr {
    pub fn new(expr: Expr) -> CustomExpr {
        CustomExpr {
            expr,
            target_column: None,
        }
    }

    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        for column in columns {
            let target = self.target_column.as_deref().unwrap_or(column);
            view.add_transformation(column, Some(target), self.expr.clone(), None);
        }
        Ok(())
    }
}

/// Encode via explicit `CASE WHEN cond THEN value` branches. Conditions may
/// reference the transformed column through [`Expr::SourceColumn`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEncoder {
    pub cases: Vec<(Expr, Literal)>,
    #[serde(default)]
    pub else_value: Option<Literal>,
    #[serde(default)]
    pub target_column: Option<String>,
}

impl CaseEncoder {
    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        if self.cases.is_empty() {
            return Err(PrepError::state("CaseEncoder has no cases"));
        }
        for column in columns {
            let expr = Expr::Case {
                operand: None,
                whens: self
                    .cases
                    .iter()
                    .map(|(cond, value)| (cond.clone(), Expr::lit(value.clone())))
                    .collect(),
                else_: self
                    .else_value
                    .clone()
                    .map(|v| Box::new(Expr::lit(v))),
            };
            let target = self.target_column.as_deref().unwrap_or(column);
            view.add_transformation(column, Some(target), expr, None);
        }
        Ok(())
    }
}

/// Encode via a value map: `CASE col WHEN key THEN value …`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapEncoder {
    pub pairs: Vec<(Literal, Literal)>,
    #[serde(default)]
    pub else_value: Option<Literal>,
    #[serde(default)]
    pub target_column: Option<String>,
}

impl MapEncoder {
    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        if self.pairs.is_empty() {
            return Err(PrepError::state("MapEncoder has no pairs"));
        }
        for column in columns {
            let expr = Expr::Case {
                operand: Some(Box::new(Expr::SourceColumn)),
                whens: self
                    .pairs
                    .iter()
                    .map(|(key, value)| (Expr::lit(key.clone()), Expr::lit(value.clone())))
                    .collect(),
                else_: self
                    .else_value
                    .clone()
                    .map(|v| Box::new(Expr::lit(v))),
            };
            let target = self.target_column.as_deref().unwrap_or(column);
            view.add_transformation(column, Some(target), expr, None);
        }
        Ok(())
    }
}
