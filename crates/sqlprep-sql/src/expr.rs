//! Typed SQL expression tree and renderer

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ident::quote_ident;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("expression contains an unbound source-column placeholder")]
    UnboundSourceColumn,

    #[error("column {0} references a correlated subquery, but no subquery join is in scope")]
    UnresolvedJoinColumn(String),

    #[error("CASE expression has no WHEN branches")]
    EmptyCase,
}

/// Scalar literal baked into generated SQL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl Literal {
    pub fn render(&self) -> String {
        match self {
            Literal::Int(v) => v.to_string(),
            Literal::Float(v) => v.to_string(),
            Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Literal::Null => "NULL".to_string(),
        }
    }

    /// Numeric view of the literal, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(v) => Some(*v as f64),
            Literal::Float(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl BinaryOp {
    fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
        }
    }
}

/// Target types for CAST expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Double,
    Integer,
    Varchar,
}

impl SqlType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Integer => "INTEGER",
            SqlType::Varchar => "VARCHAR",
        }
    }
}

/// Context for rendering one expression: the alias of the data source and,
/// when the owning transformation carries a correlated subquery, the alias
/// that subquery was joined under.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub data_alias: &'a str,
    pub join_alias: Option<&'a str>,
}

impl<'a> RenderContext<'a> {
    pub fn new(data_alias: &'a str) -> Self {
        Self {
            data_alias,
            join_alias: None,
        }
    }

    pub fn with_join_alias(data_alias: &'a str, join_alias: &'a str) -> Self {
        Self {
            data_alias,
            join_alias: Some(join_alias),
        }
    }
}

/// SQL expression tree.
///
/// `SourceColumn` and `JoinColumn` are the typed replacements for the
/// `{column}` / `{join_table}` string placeholders: the first is bound by
/// [`Expr::bind_source`] before a transformation is recorded, the second is
/// resolved by the view compiler once the subquery's join alias is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Column of the data source, rendered qualified with the data alias.
    Column(String),
    /// Placeholder for the column currently being transformed.
    SourceColumn,
    /// Column of a named table, e.g. a fit table joined into the statement.
    TableColumn { table: String, column: String },
    /// Column of the correlated subquery joined for this transformation.
    JoinColumn(String),
    Literal(Literal),
    Cast { expr: Box<Expr>, ty: SqlType },
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Func { name: String, args: Vec<Expr> },
    Case {
        operand: Option<Box<Expr>>,
        whens: Vec<(Expr, Expr)>,
        else_: Option<Box<Expr>>,
    },
    Coalesce(Vec<Expr>),
    IsNull(Box<Expr>),
    /// Verbatim SQL fragment. Escape hatch for custom transformations.
    Raw(String),
}

impl Expr {
    pub fn col(name: impl Into<String>) -> Expr {
        Expr::Column(name.into())
    }

    pub fn lit(literal: Literal) -> Expr {
        Expr::Literal(literal)
    }

    pub fn int(v: i64) -> Expr {
        Expr::Literal(Literal::Int(v))
    }

    pub fn float(v: f64) -> Expr {
        Expr::Literal(Literal::Float(v))
    }

    pub fn string(v: impl Into<String>) -> Expr {
        Expr::Literal(Literal::Str(v.into()))
    }

    pub fn cast(self, ty: SqlType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            ty,
        }
    }

    pub fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    /// Replace every `SourceColumn` placeholder with a concrete column.
    pub fn bind_source(&self, column: &str) -> Expr {
        match self {
            Expr::SourceColumn => Expr::Column(column.to_string()),
            Expr::Cast { expr, ty } => Expr::Cast {
                expr: Box::new(expr.bind_source(column)),
                ty: *ty,
            },
            Expr::Binary { left, op, right } => Expr::Binary {
                left: Box::new(left.bind_source(column)),
                op: *op,
                right: Box::new(right.bind_source(column)),
            },
            Expr::Func { name, args } => Expr::Func {
                name: name.clone(),
                args: args.iter().map(|a| a.bind_source(column)).collect(),
            },
            Expr::Case {
                operand,
                whens,
                else_,
            } => Expr::Case {
                operand: operand
                    .as_ref()
                    .map(|o| Box::new(o.bind_source(column))),
                whens: whens
                    .iter()
                    .map(|(w, t)| (w.bind_source(column), t.bind_source(column)))
                    .collect(),
                else_: else_.as_ref().map(|e| Box::new(e.bind_source(column))),
            },
            Expr::Coalesce(args) => {
                Expr::Coalesce(args.iter().map(|a| a.bind_source(column)).collect())
            }
            Expr::IsNull(inner) => Expr::IsNull(Box::new(inner.bind_source(column))),
            other => other.clone(),
        }
    }

    pub fn render(&self, ctx: &RenderContext) -> Result<String, RenderError> {
        match self {
            Expr::Column(name) => Ok(format!("{}.{}", ctx.data_alias, quote_ident(name))),
            Expr::SourceColumn => Err(RenderError::UnboundSourceColumn),
            Expr::TableColumn { table, column } => {
                Ok(format!("{}.{}", quote_ident(table), quote_ident(column)))
            }
            Expr::JoinColumn(column) => match ctx.join_alias {
                Some(alias) => Ok(format!("{}.{}", alias, quote_ident(column))),
                None => Err(RenderError::UnresolvedJoinColumn(column.clone())),
            },
            Expr::Literal(literal) => Ok(literal.render()),
            Expr::Cast { expr, ty } => {
                Ok(format!("CAST({} AS {})", expr.render(ctx)?, ty.as_str()))
            }
            Expr::Binary { left, op, right } => Ok(format!(
                "({} {} {})",
                left.render(ctx)?,
                op.as_str(),
                right.render(ctx)?
            )),
            Expr::Func { name, args } => {
                let rendered: Result<Vec<_>, _> =
                    args.iter().map(|a| a.render(ctx)).collect();
                Ok(format!("{}({})", name, rendered?.join(", ")))
            }
            Expr::Case {
                operand,
                whens,
                else_,
            } => {
                if whens.is_empty() {
                    return Err(RenderError::EmptyCase);
                }
                let mut sql = String::from("CASE");
                if let Some(operand) = operand {
                    sql.push(' ');
                    sql.push_str(&operand.render(ctx)?);
                }
                for (when, then) in whens {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        when.render(ctx)?,
                        then.render(ctx)?
                    ));
                }
                if let Some(else_) = else_ {
                    sql.push_str(&format!(" ELSE {}", else_.render(ctx)?));
                }
                sql.push_str(" END");
                Ok(sql)
            }
            Expr::Coalesce(args) => {
                let rendered: Result<Vec<_>, _> =
                    args.iter().map(|a| a.render(ctx)).collect();
                Ok(format!("COALESCE({})", rendered?.join(", ")))
            }
            Expr::IsNull(inner) => Ok(format!("{} IS NULL", inner.render(ctx)?)),
            Expr::Raw(sql) => Ok(sql.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext<'static> {
        RenderContext::new("data_table")
    }

    #[test]
    fn columns_are_qualified_with_data_alias() {
        assert_eq!(Expr::col("age").render(&ctx()).unwrap(), "data_table.age");
    }

    #[test]
    fn min_max_expression_renders_with_baked_literals() {
        let expr = Expr::col("fare")
            .cast(SqlType::Double)
            .binary(BinaryOp::Sub, Expr::float(1.0))
            .binary(BinaryOp::Div, Expr::float(4.0));
        assert_eq!(
            expr.render(&ctx()).unwrap(),
            "((CAST(data_table.fare AS DOUBLE PRECISION) - 1) / 4)"
        );
    }

    #[test]
    fn case_without_operand() {
        let expr = Expr::Case {
            operand: None,
            whens: vec![(
                Expr::col("sex").binary(BinaryOp::Eq, Expr::string("male")),
                Expr::int(1),
            )],
            else_: Some(Box::new(Expr::int(0))),
        };
        assert_eq!(
            expr.render(&ctx()).unwrap(),
            "CASE WHEN (data_table.sex = 'male') THEN 1 ELSE 0 END"
        );
    }

    #[test]
    fn unbound_source_column_fails_to_render() {
        let expr = Expr::SourceColumn.cast(SqlType::Double);
        assert!(matches!(
            expr.render(&ctx()),
            Err(RenderError::UnboundSourceColumn)
        ));
    }

    #[test]
    fn bind_source_resolves_placeholders() {
        let expr = Expr::func("ABS", vec![Expr::SourceColumn]).bind_source("delta");
        assert_eq!(expr.render(&ctx()).unwrap(), "ABS(data_table.delta)");
    }

    #[test]
    fn join_column_requires_alias_in_scope() {
        let expr = Expr::JoinColumn("c1".to_string());
        assert!(matches!(
            expr.render(&ctx()),
            Err(RenderError::UnresolvedJoinColumn(_))
        ));
        let resolved = RenderContext::with_join_alias("data_table", "sub0");
        assert_eq!(expr.render(&resolved).unwrap(), "sub0.c1");
    }

    #[test]
    fn string_literals_escape_quotes() {
        assert_eq!(Literal::Str("O'Brien".into()).render(), "'O''Brien'");
    }
}
