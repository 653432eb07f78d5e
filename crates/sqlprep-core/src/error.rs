//! Error taxonomy for the preprocessing compiler

use sqlprep_sql::{Dialect, RenderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("SQL execution failed: {message}; statement: {sql}")]
    Sql { sql: String, message: String },

    #[error("transformer state error: {0}")]
    State(String),

    #[error("catalog inconsistency: {0}")]
    Catalog(String),

    #[error("dataset view has no unique key column, required by {0}")]
    MissingKey(&'static str),

    #[error("operation not supported for dialect {dialect:?}: {operation}")]
    UnsupportedDialect {
        dialect: Dialect,
        operation: String,
    },

    #[error("expression render failed: {0}")]
    Render(#[from] RenderError),

    #[error("pipeline serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PrepError {
    /// Wrap an engine rejection together with the statement that caused it.
    pub fn sql(sql: impl Into<String>, message: impl Into<String>) -> PrepError {
        PrepError::Sql {
            sql: sql.into(),
            message: message.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> PrepError {
        PrepError::State(message.into())
    }
}
