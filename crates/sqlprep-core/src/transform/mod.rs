//! Transformer protocol
//!
//! Every transformer follows the fit/transform contract: `fit` runs
//! aggregate or category queries in the engine and stores the result (baked
//! scalars, category lists, or the name of a materialized mapping table);
//! `transform` records expressions on a view without touching the engine.
//! Stateless variants have a no-op fit.
//!
//! The set is a closed tagged enum rather than trait objects so a fitted
//! transformer serializes as plain JSON and can be rebuilt from it.

mod basic;
mod discretize;
mod encode;
mod matrix;
mod scale;

pub use basic::{CaseEncoder, CustomExpr, MapEncoder, Passthrough, Udf};
pub use discretize::{ImputeStrategy, KBinsDiscretizer, SimpleImputer};
pub use encode::{LabelBinarizer, LabelEncoder, OneHotEncoder, OrdinalEncoder};
pub use matrix::{KernelCenterer, Norm, Normalizer};
pub use scale::{Binarizer, MaxAbsScaler, MinMaxScaler, StandardScaler};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use sqlprep_sql::Literal;

use crate::error::PrepError;
use crate::executor::{value_as_f64, Row, SqlExecutor};
use crate::view::{DatasetView, DATA_ALIAS};

/// All supported transformers. `kind` tags the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SqlTransformer {
    Passthrough(Passthrough),
    Udf(Udf),
    CustomExpr(CustomExpr),
    CaseEncoder(CaseEncoder),
    MapEncoder(MapEncoder),
    Binarizer(Binarizer),
    MinMaxScaler(MinMaxScaler),
    MaxAbsScaler(MaxAbsScaler),
    StandardScaler(StandardScaler),
    LabelEncoder(LabelEncoder),
    OrdinalEncoder(OrdinalEncoder),
    OneHotEncoder(OneHotEncoder),
    LabelBinarizer(LabelBinarizer),
    KBinsDiscretizer(KBinsDiscretizer),
    SimpleImputer(SimpleImputer),
    Normalizer(Normalizer),
    KernelCenterer(KernelCenterer),
}

impl SqlTransformer {
    /// Compute and store fit state for the given columns. Stateless variants
    /// return immediately. Re-fitting replaces previous state.
    pub fn fit(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        match self {
            SqlTransformer::Passthrough(_)
            | SqlTransformer::Udf(_)
            | SqlTransformer::CustomExpr(_)
            | SqlTransformer::CaseEncoder(_)
            | SqlTransformer::MapEncoder(_)
            | SqlTransformer::Binarizer(_)
            | SqlTransformer::Normalizer(_) => Ok(()),
            SqlTransformer::MinMaxScaler(t) => t.fit(view, exec, columns),
            SqlTransformer::MaxAbsScaler(t) => t.fit(view, exec, columns),
            SqlTransformer::StandardScaler(t) => t.fit(view, exec, columns),
            SqlTransformer::LabelEncoder(t) => t.fit(view, exec, columns),
            SqlTransformer::OrdinalEncoder(t) => t.fit(view, exec, columns),
            SqlTransformer::OneHotEncoder(t) => t.fit(view, exec, columns),
            SqlTransformer::LabelBinarizer(t) => t.fit(view, exec, columns),
            SqlTransformer::KBinsDiscretizer(t) => t.fit(view, exec, columns),
            SqlTransformer::SimpleImputer(t) => t.fit(view, exec, columns),
            SqlTransformer::KernelCenterer(t) => t.fit(view, exec, columns),
        }
    }

    /// Record the transformation expressions on the view. Stateful variants
    /// fail with [`PrepError::State`] when called before a successful fit.
    pub fn transform(&self, view: &mut DatasetView, columns: &[String]) -> Result<(), PrepError> {
        match self {
            SqlTransformer::Passthrough(t) => t.transform(view, columns),
            SqlTransformer::Udf(t) => t.transform(view, columns),
            SqlTransformer::CustomExpr(t) => t.transform(view, columns),
            SqlTransformer::CaseEncoder(t) => t.transform(view, columns),
            SqlTransformer::MapEncoder(t) => t.transform(view, columns),
            SqlTransformer::Binarizer(t) => t.transform(view, columns),
            SqlTransformer::MinMaxScaler(t) => t.transform(view, columns),
            SqlTransformer::MaxAbsScaler(t) => t.transform(view, columns),
            SqlTransformer::StandardScaler(t) => t.transform(view, columns),
            SqlTransformer::LabelEncoder(t) => t.transform(view, columns),
            SqlTransformer::OrdinalEncoder(t) => t.transform(view, columns),
            SqlTransformer::OneHotEncoder(t) => t.transform(view, columns),
            SqlTransformer::LabelBinarizer(t) => t.transform(view, columns),
            SqlTransformer::KBinsDiscretizer(t) => t.transform(view, columns),
            SqlTransformer::SimpleImputer(t) => t.transform(view, columns),
            SqlTransformer::Normalizer(t) => t.transform(view, columns),
            SqlTransformer::KernelCenterer(t) => t.transform(view, columns),
        }
    }

    pub fn fit_transform(
        &mut self,
        view: &mut DatasetView,
        exec: &dyn SqlExecutor,
        columns: &[String],
    ) -> Result<(), PrepError> {
        self.fit(view, exec, columns)?;
        self.transform(view, columns)
    }
}

/// Run a one-row aggregate over the view's source.
pub(crate) fn aggregate_one(
    view: &DatasetView,
    exec: &dyn SqlExecutor,
    select_list: &str,
) -> Result<Row, PrepError> {
    let sql = format!(
        "SELECT {} FROM {} AS {}",
        select_list,
        view.source.render(),
        DATA_ALIAS
    );
    exec.query_one(&sql)?
        .ok_or_else(|| PrepError::state("aggregate query returned no rows"))
}

pub(crate) fn numeric(row: &Row, idx: usize, what: &str) -> Result<f64, PrepError> {
    row.get(idx)
        .and_then(value_as_f64)
        .ok_or_else(|| PrepError::state(format!("{} returned a non-numeric value", what)))
}

/// Engine cell to literal, preserving the scalar type.
pub(crate) fn literal_from_value(value: &Value) -> Literal {
    match value {
        Value::Null => Literal::Null,
        Value::Bool(b) => Literal::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Literal::Int(i),
            None => Literal::Float(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => Literal::Str(s.clone()),
        other => Literal::Str(other.to_string()),
    }
}

/// Engine cell to label text, without JSON quoting for strings.
pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
