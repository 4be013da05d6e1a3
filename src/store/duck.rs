// src/store/duck.rs

use duckdb::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use super::{load_failed, Store};
use crate::dataset::{SourceFormat, TabularDataset};
use crate::error::{ConnectionError, LoadError};
use crate::ident::{quote_literal, Ident};
use crate::query::{QueryValue, ResultShape};

/// DuckDB database, on disk or in memory.
pub struct DuckStore {
    conn: Connection,
    target: String,
}

impl DuckStore {
    /// Open (or create) the database file at `path`; `None` is in-memory.
    pub fn open(path: Option<&Path>) -> Result<Self, ConnectionError> {
        let (conn, target) = match path {
            Some(p) => (Connection::open(p), p.display().to_string()),
            None => (Connection::open_in_memory(), ":memory:".to_string()),
        };
        let conn = conn.map_err(|e| ConnectionError {
            target: target.clone(),
            message: e.to_string(),
        })?;
        info!(%target, "opened duckdb");
        Ok(Self { conn, target })
    }
}

/// `read_parquet([...])` / `read_csv_auto([...])` over every file, in order.
fn scan_expr(dataset: &TabularDataset) -> String {
    let files: Vec<String> = dataset
        .paths()
        .iter()
        .map(|p| quote_literal(&p.to_string_lossy()))
        .collect();
    match dataset.format {
        SourceFormat::Parquet => format!("read_parquet([{}])", files.join(", ")),
        SourceFormat::Csv => format!("read_csv_auto([{}], header = true)", files.join(", ")),
    }
}

impl Store for DuckStore {
    fn kind(&self) -> &'static str {
        "duckdb"
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn table_exists(&mut self, table: &Ident) -> Result<bool, String> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = ?",
                params![table.as_str()],
                |r| r.get(0),
            )
            .map_err(|e| e.to_string())?;
        Ok(n > 0)
    }

    fn table_columns(&mut self, table: &Ident) -> Result<Vec<String>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT column_name FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = ? \
                 ORDER BY ordinal_position",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![table.as_str()], |r| r.get::<_, String>(0))
            .map_err(|e| e.to_string())?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())
    }

    fn create_or_replace_table(
        &mut self,
        table: &Ident,
        dataset: &TabularDataset,
        populate: bool,
    ) -> Result<(), LoadError> {
        let limit = if populate { "" } else { " LIMIT 0" };
        let sql = format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM {}{limit};",
            table.quoted(),
            scan_expr(dataset)
        );
        debug!(%sql, "create table");
        self.conn
            .execute_batch(&sql)
            .map_err(|e| load_failed(table, e))
    }

    fn append_rows(&mut self, table: &Ident, dataset: &TabularDataset) -> Result<u64, LoadError> {
        let sql = format!(
            "INSERT INTO {} SELECT * FROM {}",
            table.quoted(),
            scan_expr(dataset)
        );
        debug!(%sql, "append");
        let n = self
            .conn
            .execute(&sql, [])
            .map_err(|e| load_failed(table, e))?;
        Ok(n as u64)
    }

    fn execute_query(&mut self, sql: &str, shape: ResultShape) -> Result<QueryValue, String> {
        match shape {
            ResultShape::Count => self
                .conn
                .query_row(sql, [], |r| r.get::<_, i64>(0))
                .map(QueryValue::Count)
                .map_err(|e| e.to_string()),
            ResultShape::Column => {
                let mut stmt = self.conn.prepare(sql).map_err(|e| e.to_string())?;
                let rows = stmt
                    .query_map([], |r| r.get::<_, Option<String>>(0))
                    .map_err(|e| e.to_string())?;
                rows.collect::<Result<Vec<_>, _>>()
                    .map(QueryValue::Values)
                    .map_err(|e| e.to_string())
            }
        }
    }

    fn close(self) -> Result<(), ConnectionError> {
        let target = self.target;
        self.conn.close().map_err(|(_, e)| ConnectionError {
            target: target.clone(),
            message: e.to_string(),
        })?;
        debug!(%target, "closed duckdb");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{trip, write_csv, write_n_trips, write_trip_parquet};
    use tempfile::tempdir;

    fn count(store: &mut DuckStore, table: &str) -> i64 {
        match store
            .execute_query(
                &format!("SELECT COUNT(*) FROM \"{table}\""),
                ResultShape::Count,
            )
            .unwrap()
        {
            QueryValue::Count(n) => n,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn create_populated_and_empty() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("jan.parquet");
        write_n_trips(&file, 4);
        let ds = TabularDataset::inspect(&[&file]).unwrap();
        let t = Ident::new("trips").unwrap();

        let mut store = DuckStore::open(None).unwrap();
        assert!(!store.table_exists(&t).unwrap());

        store.create_or_replace_table(&t, &ds, true).unwrap();
        assert_eq!(count(&mut store, "trips"), 4);
        assert_eq!(
            store.table_columns(&t).unwrap(),
            ["VendorID", "tpep_dropoff_datetime", "fare_amount"]
        );

        store.create_or_replace_table(&t, &ds, false).unwrap();
        assert!(store.table_exists(&t).unwrap());
        assert_eq!(count(&mut store, "trips"), 0);

        assert_eq!(store.append_rows(&t, &ds).unwrap(), 4);
        assert_eq!(count(&mut store, "trips"), 4);
    }

    #[test]
    fn csv_and_quoted_paths() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("o'brien zones.csv");
        write_csv(&file, "LocationID,Borough\n1,EWR\n2,Queens\n3,Bronx\n");
        let ds = TabularDataset::inspect(&[&file]).unwrap();
        let t = Ident::new("zones").unwrap();

        let mut store = DuckStore::open(None).unwrap();
        store.create_or_replace_table(&t, &ds, true).unwrap();
        assert_eq!(count(&mut store, "zones"), 3);
    }

    #[test]
    fn text_column_query() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("a.parquet");
        write_trip_parquet(
            &file,
            &[
                trip(2, "2024-03-01 10:00:00", 1.0),
                trip(1, "2024-03-01 11:00:00", 1.0),
                trip(2, "2024-03-02 10:00:00", 1.0),
            ],
        );
        let ds = TabularDataset::inspect(&[&file]).unwrap();
        let t = Ident::new("t").unwrap();
        let mut store = DuckStore::open(None).unwrap();
        store.create_or_replace_table(&t, &ds, true).unwrap();

        let got = store
            .execute_query(
                "SELECT CAST(d.v AS VARCHAR) FROM (SELECT DISTINCT \"VendorID\" AS v FROM \"t\") AS d ORDER BY d.v",
                ResultShape::Column,
            )
            .unwrap();
        assert_eq!(
            got,
            QueryValue::Values(vec![Some("1".into()), Some("2".into())])
        );
    }

    #[test]
    fn bad_sql_and_missing_table_are_errors() {
        let mut store = DuckStore::open(None).unwrap();
        assert!(store
            .execute_query("SELECT COUNT(*) FROM \"nope\"", ResultShape::Count)
            .is_err());
        assert!(store.execute_query("SELEC 1", ResultShape::Count).is_err());
        store.close().unwrap();
    }

    #[test]
    fn file_database_survives_reopen() {
        let tmp = tempdir().unwrap();
        let db = tmp.path().join("taxi.duckdb");
        let file = tmp.path().join("a.parquet");
        write_n_trips(&file, 2);
        let ds = TabularDataset::inspect(&[&file]).unwrap();
        let t = Ident::new("trips").unwrap();

        {
            let mut store = DuckStore::open(Some(&db)).unwrap();
            store.create_or_replace_table(&t, &ds, true).unwrap();
            store.close().unwrap();
        }
        let mut store = DuckStore::open(Some(&db)).unwrap();
        assert_eq!(count(&mut store, "trips"), 2);
    }
}
