//! Pipelines: column-to-transformer mapping and step composition.
//!
//! Everything here serializes to JSON, fitted state included, so a pipeline
//! fitted once can be persisted and replayed against new data without
//! re-scanning. The fingerprint is the SHA-256 of the canonical JSON.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sqlprep_sql::Dialect;

use crate::error::PrepError;
use crate::executor::SqlExecutor;
use crate::transform::SqlTransformer;
use crate::view::{CompileOptions, DatasetView};

fn fingerprint_of<T: Serialize>(value: &T) -> Result<String, PrepError> {
    let json = serde_json::to_vec(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&json);
    Ok(format!("{:x}", hasher.finalize()))
}

fn to_writer<T: Serialize, W: Write>(value: &T, writer: W) -> Result<(), PrepError> {
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}

fn from_reader<T: DeserializeOwned, R: Read>(reader: R) -> Result<T, PrepError> {
    Ok(serde_json::from_reader(reader)?)
}

/// One column set bound to one transformer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub columns: Vec<String>,
    pub transformer: SqlTransformer,
}

/// Map column subsets to transformers, applied in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapper {
    pub features: Vec<Feature>,
}

impl ColumnMapper {
    pub fn new(features: Vec<(Vec<String>, SqlTransformer)>) -> ColumnMapper {
        ColumnMapper {
            features: features
                .into_iter()
                .map(|(columns, transformer)| Feature {
                    columns,
                    transformer,
                })
                .collect(),
        }
    }

    /// Convenience for the common one-column-per-feature shape.
    pub fn for_columns(features: Vec<(&str, SqlTransformer)>) -> ColumnMapper {
        ColumnMapper::new(
            features
                .into_iter()
                .map(|(column, transformer)| (vec![column.to_string()], transformer))
                .collect(),
        )
    }

    pub fn fit(&mut self, view: &DatasetView, exec: &dyn SqlExecutor) -> Result<(), PrepError> {
        for feature in &mut self.features {
            feature.transformer.fit(view, exec, &feature.columns)?;
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView) -> Result<(), PrepError> {
        for feature in &self.features {
            feature.transformer.transform(view, &feature.columns)?;
        }
        Ok(())
    }

    pub fn fit_transform(
        &mut self,
        view: &mut DatasetView,
        exec: &dyn SqlExecutor,
    ) -> Result<(), PrepError> {
        self.fit(view, exec)?;
        self.transform(view)
    }

    pub fn fingerprint(&self) -> Result<String, PrepError> {
        fingerprint_of(self)
    }
}

/// Flat composition: every step records onto the same view, compiled once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub steps: Vec<(String, ColumnMapper)>,
}

impl Pipeline {
    pub fn new(steps: Vec<(&str, ColumnMapper)>) -> Pipeline {
        Pipeline {
            steps: steps
                .into_iter()
                .map(|(name, mapper)| (name.to_string(), mapper))
                .collect(),
        }
    }

    pub fn fit(&mut self, view: &DatasetView, exec: &dyn SqlExecutor) -> Result<(), PrepError> {
        for (_, mapper) in &mut self.steps {
            mapper.fit(view, exec)?;
        }
        Ok(())
    }

    pub fn transform(&self, view: &mut DatasetView) -> Result<(), PrepError> {
        for (_, mapper) in &self.steps {
            mapper.transform(view)?;
        }
        Ok(())
    }

    pub fn fit_transform(
        &mut self,
        view: &mut DatasetView,
        exec: &dyn SqlExecutor,
    ) -> Result<(), PrepError> {
        self.fit(view, exec)?;
        self.transform(view)
    }

    pub fn fingerprint(&self) -> Result<String, PrepError> {
        fingerprint_of(self)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), PrepError> {
        to_writer(self, writer)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Pipeline, PrepError> {
        from_reader(reader)
    }
}

/// Sequential composition: each step transforms a fresh view whose source is
/// the previous step's compiled SELECT, so later steps see earlier outputs
/// as plain source columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedPipeline {
    pub steps: Vec<(String, ColumnMapper)>,
}

impl NestedPipeline {
    pub fn new(steps: Vec<(&str, ColumnMapper)>) -> NestedPipeline {
        NestedPipeline {
            steps: steps
                .into_iter()
                .map(|(name, mapper)| (name.to_string(), mapper))
                .collect(),
        }
    }

    /// Fit and apply each step in turn; each fit sees the previous step's
    /// output. Returns the final stacked view.
    pub fn fit_transform(
        &mut self,
        view: &DatasetView,
        exec: &dyn SqlExecutor,
    ) -> Result<DatasetView, PrepError> {
        let mut current = view.clone();
        for (name, mapper) in &mut self.steps {
            mapper.fit(&current, exec)?;
            mapper.transform(&mut current)?;
            current = current.clone_as_source(
                &format!("{}_{}", view.name, name),
                exec.dialect(),
                &CompileOptions::default(),
            )?;
        }
        Ok(current)
    }

    /// Apply already-fitted steps against a (possibly different) view.
    pub fn transform(
        &self,
        view: &DatasetView,
        dialect: Dialect,
    ) -> Result<DatasetView, PrepError> {
        let mut current = view.clone();
        for (name, mapper) in &self.steps {
            mapper.transform(&mut current)?;
            current = current.clone_as_source(
                &format!("{}_{}", view.name, name),
                dialect,
                &CompileOptions::default(),
            )?;
        }
        Ok(current)
    }

    pub fn fingerprint(&self) -> Result<String, PrepError> {
        fingerprint_of(self)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), PrepError> {
        to_writer(self, writer)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<NestedPipeline, PrepError> {
        from_reader(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::RowSet;
    use crate::testing::MockExecutor;
    use crate::transform::{MinMaxScaler, Passthrough, SimpleImputer};
    use serde_json::json;
    use sqlprep_sql::Literal;

    fn view() -> DatasetView {
        DatasetView::for_table("titanic", "s1", "titanic").with_key_column("passengerid")
    }

    fn mapper() -> ColumnMapper {
        ColumnMapper::for_columns(vec![
            ("age", SqlTransformer::Passthrough(Passthrough::default())),
            (
                "fare",
                SqlTransformer::MinMaxScaler(MinMaxScaler::default()),
            ),
        ])
    }

    fn min_max_result() -> RowSet {
        RowSet {
            columns: vec!["min_value".into(), "max_value".into()],
            rows: vec![vec![json!(0.0), json!(100.0)]],
        }
    }

    #[test]
    fn flat_pipeline_records_all_steps_on_one_view() {
        let exec = MockExecutor::standard();
        exec.push_query_result(min_max_result());

        let mut pipeline = Pipeline::new(vec![("prep", mapper())]);
        let mut v = view();
        pipeline.fit_transform(&mut v, &exec).unwrap();

        let sql = v
            .compile(exec.dialect(), &CompileOptions::default())
            .unwrap();
        assert!(sql.contains("data_table.age AS age"));
        assert!(sql.contains("((CAST(data_table.fare AS DOUBLE PRECISION) - 0) / 100) AS fare"));
    }

    #[test]
    fn nested_pipeline_stacks_compiled_selects() {
        let exec = MockExecutor::standard();
        exec.push_query_result(min_max_result());

        let second = ColumnMapper::for_columns(vec![(
            "fare",
            SqlTransformer::SimpleImputer(SimpleImputer::constant(Literal::Int(0))),
        )]);
        let mut pipeline =
            NestedPipeline::new(vec![("scale", mapper()), ("impute", second)]);
        let out = pipeline.fit_transform(&view(), &exec).unwrap();

        assert_eq!(out.name, "titanic_impute");
        let sql = out
            .compile(exec.dialect(), &CompileOptions::default())
            .unwrap();
        // Outer impute reads the scaled fare from the nested select.
        assert!(sql.contains("COALESCE(data_table.fare, 0) AS fare"));
        assert!(sql.contains("FROM (\nSELECT"));
        assert!(sql.contains("DOUBLE PRECISION"));
    }

    #[test]
    fn fingerprint_tracks_fitted_state() {
        let a = Pipeline::new(vec![("prep", mapper())]);
        let b = Pipeline::new(vec![("prep", mapper())]);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let exec = MockExecutor::standard();
        exec.push_query_result(min_max_result());
        let mut fitted = Pipeline::new(vec![("prep", mapper())]);
        fitted.fit(&view(), &exec).unwrap();
        assert_ne!(a.fingerprint().unwrap(), fitted.fingerprint().unwrap());
    }

    #[test]
    fn persistence_round_trip_keeps_fitted_scalars() {
        let exec = MockExecutor::standard();
        exec.push_query_result(min_max_result());
        let mut pipeline = Pipeline::new(vec![("prep", mapper())]);
        pipeline.fit(&view(), &exec).unwrap();

        let mut buf = Vec::new();
        pipeline.to_writer(&mut buf).unwrap();
        let restored = Pipeline::from_reader(buf.as_slice()).unwrap();
        assert_eq!(
            pipeline.fingerprint().unwrap(),
            restored.fingerprint().unwrap()
        );

        // The restored pipeline transforms without re-fitting.
        let mut v = view();
        restored.transform(&mut v).unwrap();
        let sql = v
            .compile(exec.dialect(), &CompileOptions::default())
            .unwrap();
        assert!(sql.contains("/ 100) AS fare"));
    }
}
