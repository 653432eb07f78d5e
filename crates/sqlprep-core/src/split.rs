//! Train/test split engine
//!
//! Both partitions are carved out of one seeded random ordering: the test
//! table takes the first `floor(n * test_size)` rows, the train table takes
//! the complementary OFFSET range. Reseeding identically before each CTAS
//! pins the ordering, which is what makes the partitions disjoint and
//! exhaustive. Repeating a split with the same seed on unchanged data yields
//! identical partitions.

use tracing::info;

use crate::error::PrepError;
use crate::executor::{RowSet, SqlExecutor};
use crate::view::{DatasetView, Source, DATA_ALIAS};

/// Views over the two materialized partitions, sharing the parent catalog.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: DatasetView,
    pub test: DatasetView,
}

/// Split with the label column pulled out, for sklearn-style call sites.
#[derive(Debug)]
pub struct SupervisedSplit {
    pub train: DatasetView,
    pub test: DatasetView,
    pub y_train: RowSet,
    pub y_test: RowSet,
}

impl DatasetView {
    /// Materialize seeded train/test partitions of the raw source rows into
    /// `fit_schema.{dataset_table}_train` / `_test`, replacing previous
    /// incarnations, and return views over them.
    ///
    /// `test_size` is the test fraction in `(0, 1)`. For the `Standard`
    /// dialect the seed must lie in `[-1, 1]`.
    pub fn train_test_split(
        &self,
        exec: &dyn SqlExecutor,
        test_size: f64,
        seed: f64,
    ) -> Result<TrainTestSplit, PrepError> {
        let train_table = format!("{}_train", self.dataset_table);
        let test_table = format!("{}_test", self.dataset_table);
        self.train_test_split_as(exec, test_size, seed, &train_table, &test_table)
    }

    /// Like [`train_test_split`](Self::train_test_split) with caller-chosen
    /// partition table names.
    pub fn train_test_split_as(
        &self,
        exec: &dyn SqlExecutor,
        test_size: f64,
        seed: f64,
        train_table: &str,
        test_table: &str,
    ) -> Result<TrainTestSplit, PrepError> {
        if !(0.0..1.0).contains(&test_size) || test_size == 0.0 {
            return Err(PrepError::state(format!(
                "test_size {} outside (0, 1)",
                test_size
            )));
        }
        let total = self.row_count(exec)?;
        let test_rows = (total as f64 * test_size).floor() as u64;

        let test = self.split_partition(exec, test_table, seed, Some(test_rows), None)?;
        let train = self.split_partition(exec, train_table, seed, None, Some(test_rows))?;
        info!(
            view = %self.name,
            total,
            test_rows,
            train = %train_table,
            test = %test_table,
            "created train/test partitions"
        );
        Ok(TrainTestSplit { train, test })
    }

    /// Split and additionally fetch the label column of each partition.
    pub fn train_test_split_xy(
        &self,
        exec: &dyn SqlExecutor,
        y_column: &str,
        test_size: f64,
        seed: f64,
    ) -> Result<SupervisedSplit, PrepError> {
        let TrainTestSplit { train, test } = self.train_test_split(exec, test_size, seed)?;
        let y_train = train.fetch_columns(exec, &[y_column])?;
        let y_test = test.fetch_columns(exec, &[y_column])?;
        Ok(SupervisedSplit {
            train,
            test,
            y_train,
            y_test,
        })
    }

    /// One partition: drop, reseed, CTAS over the shared random ordering,
    /// register, and wrap as a view.
    fn split_partition(
        &self,
        exec: &dyn SqlExecutor,
        table: &str,
        seed: f64,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<DatasetView, PrepError> {
        let dialect = exec.dialect();
        exec.drop_table(&self.fit_schema, table)?;
        self.catalog.unregister(exec, &self.fit_schema, table)?;

        let (reseed, random_expr) = dialect.seeded_random(seed);
        if let Some(stmt) = reseed {
            exec.execute(&stmt)?;
        }
        let select = format!(
            "SELECT * FROM {} AS {}\nORDER BY {}{}",
            self.source.render(),
            DATA_ALIAS,
            random_expr,
            dialect.limit_clause(limit, offset)
        );
        exec.execute(&dialect.create_table_as(&self.fit_schema, table, &select))?;
        self.catalog.register(exec, &self.fit_schema, table)?;

        let name = format!("{}_{}", self.name, table);
        let mut view = self.clone_view(&name);
        view.source = Source::Table {
            schema: self.fit_schema.clone(),
            table: table.to_string(),
        };
        view.dataset_schema = self.fit_schema.clone();
        view.dataset_table = table.to_string();
        Ok(view)
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockExecutor;
    use serde_json::json;
    use sqlprep_sql::Dialect;

    fn view() -> DatasetView {
        DatasetView::for_table("titanic", "s1", "titanic").with_key_column("passengerid")
    }

    #[test]
    fn rejects_degenerate_test_sizes() {
        let exec = MockExecutor::standard();
        assert!(view().train_test_split(&exec, 0.0, 0.5).is_err());
        assert!(view().train_test_split(&exec, 1.0, 0.5).is_err());
    }

    #[test]
    fn standard_split_reseeds_before_each_partition() {
        let exec = MockExecutor::standard();
        exec.push_query_result(RowSet {
            columns: vec!["count".into()],
            rows: vec![vec![json!(10)]],
        });
        let split = view().train_test_split(&exec, 0.25, 0.5).unwrap();

        let log = exec.statements();
        let reseeds: Vec<_> = log
            .iter()
            .filter(|s| s.as_str() == "SELECT setseed(0.5)")
            .collect();
        assert_eq!(reseeds.len(), 2);

        let test_ctas = log
            .iter()
            .find(|s| s.contains("CREATE TABLE s1.titanic_test"))
            .unwrap();
        assert!(test_ctas.contains("ORDER BY random()\nLIMIT 2"));

        let train_ctas = log
            .iter()
            .find(|s| s.contains("CREATE TABLE s1.titanic_train"))
            .unwrap();
        assert!(train_ctas.contains("ORDER BY random()\nOFFSET 2"));
        assert!(!train_ctas.contains("LIMIT"));

        assert_eq!(split.test.dataset_table, "titanic_test");
        assert_eq!(split.train.dataset_table, "titanic_train");
    }

    #[test]
    fn db2_split_uses_inline_rand_and_fetch_first() {
        let exec = MockExecutor::new(Dialect::Db2);
        exec.push_query_result(RowSet {
            columns: vec!["count".into()],
            rows: vec![vec![json!(8)]],
        });
        view().train_test_split(&exec, 0.5, 7.0).unwrap();

        let log = exec.statements();
        assert!(!log.iter().any(|s| s.contains("setseed")));
        let test_ctas = log
            .iter()
            .find(|s| s.contains("CREATE TABLE s1.titanic_test"))
            .unwrap();
        assert!(test_ctas.contains("ORDER BY RAND(7)\nFETCH FIRST 4 ROWS ONLY"));
        assert!(test_ctas.ends_with("WITH DATA"));
    }

    #[test]
    fn partitions_are_registered_with_the_shared_catalog() {
        let exec = MockExecutor::standard();
        exec.push_query_result(RowSet {
            columns: vec!["count".into()],
            rows: vec![vec![json!(4)]],
        });
        let parent = view();
        let split = parent.train_test_split(&exec, 0.5, 0.1).unwrap();

        // Cleanup through either partition drains the parent's catalog too.
        let tables = parent.catalog.tables(&exec, false).unwrap();
        assert!(tables.contains(&("s1".to_string(), "titanic_test".to_string())));
        assert!(tables.contains(&("s1".to_string(), "titanic_train".to_string())));
        split.train.catalog.drop_temporary_tables(&exec).unwrap();
        assert!(parent.catalog.tables(&exec, false).unwrap().is_empty());
    }
}
