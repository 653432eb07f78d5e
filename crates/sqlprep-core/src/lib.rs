//! SQL-pushdown preprocessing engine
//!
//! Composes ML preprocessing (scaling, encoding, imputation, binning,
//! normalization) into SQL statements executed inside the backing database,
//! so datasets never leave the engine during preparation. The crate's
//! surface mirrors the sklearn fit/transform protocol:
//!
//! - [`DatasetView`]: a named, composable view over a table or query with
//!   an ordered transformation list, compiled to one SELECT.
//! - [`SqlTransformer`]: the closed set of transformers; fit runs in the
//!   engine and bakes state, transform records expressions.
//! - [`TableCatalog`]: tracks the ephemeral tables (fit tables, split
//!   partitions) created along the way, for one-call cleanup.
//! - [`Pipeline`] / [`NestedPipeline`]: composition plus JSON persistence
//!   with a SHA-256 fingerprint.
//! - [`SqlExecutor`]: the engine boundary; see the `sqlprep-duck` crate for
//!   the DuckDB implementation.

pub mod catalog;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod split;
pub mod transform;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::TableCatalog;
pub use error::PrepError;
pub use executor::{value_as_f64, Row, RowSet, SqlExecutor};
pub use pipeline::{ColumnMapper, Feature, NestedPipeline, Pipeline};
pub use split::{SupervisedSplit, TrainTestSplit};
pub use transform::SqlTransformer;
pub use view::{CompileOptions, DatasetView, SampleSize, Source, Transformation, DATA_ALIAS};

pub use sqlprep_sql::{BinaryOp, Dialect, Expr, Literal, RenderContext, SqlType};
