//! SQL building blocks for pushdown preprocessing
//!
//! Typed expression tree rendered to dialect-specific SQL text. Column and
//! join-table references are explicit variants instead of string templates,
//! so an unresolved reference is a render error rather than silently broken
//! SQL.

mod dialect;
mod expr;
mod ident;

pub use dialect::Dialect;
pub use expr::{BinaryOp, Expr, Literal, RenderContext, RenderError, SqlType};
pub use ident::quote_ident;
