// src/store/mod.rs

pub mod duck;
pub mod pg;

pub use duck::DuckStore;
pub use pg::PgStore;

use crate::config::StoreConfig;
use crate::dataset::TabularDataset;
use crate::error::{ConnectionError, LoadError};
use crate::ident::Ident;
use crate::query::{QueryValue, ResultShape};

/// A queryable store the loader can bulk-load into.
///
/// Implementations own their connection; dropping the store releases it.
pub trait Store {
    /// Short backend name for logs and errors.
    fn kind(&self) -> &'static str;

    /// Connection target without credentials.
    fn target(&self) -> &str;

    fn table_exists(&mut self, table: &Ident) -> Result<bool, String>;

    /// Column names of an existing table, in ordinal order.
    fn table_columns(&mut self, table: &Ident) -> Result<Vec<String>, String>;

    /// Drop `table` if present and recreate it with the dataset's columns.
    /// With `populate`, all rows are copied in the same step; otherwise the
    /// new table is empty.
    fn create_or_replace_table(
        &mut self,
        table: &Ident,
        dataset: &TabularDataset,
        populate: bool,
    ) -> Result<(), LoadError>;

    /// Append every row of the dataset; returns the number of rows inserted.
    fn append_rows(&mut self, table: &Ident, dataset: &TabularDataset) -> Result<u64, LoadError>;

    /// Run a read that returns a single column.
    fn execute_query(&mut self, sql: &str, shape: ResultShape) -> Result<QueryValue, String>;

    /// Release the connection, reporting failures `Drop` would swallow.
    fn close(self) -> Result<(), ConnectionError>
    where
        Self: Sized;
}

/// The store picked by configuration.
pub enum AnyStore {
    Duck(DuckStore),
    Pg(PgStore),
}

impl AnyStore {
    pub fn connect(cfg: &StoreConfig) -> Result<Self, ConnectionError> {
        match cfg {
            StoreConfig::Duckdb { path } => DuckStore::open(path.as_deref()).map(AnyStore::Duck),
            StoreConfig::Postgres(pg) => PgStore::connect(pg).map(AnyStore::Pg),
        }
    }

    fn inner(&mut self) -> &mut dyn Store {
        match self {
            AnyStore::Duck(s) => s,
            AnyStore::Pg(s) => s,
        }
    }
}

impl Store for AnyStore {
    fn kind(&self) -> &'static str {
        match self {
            AnyStore::Duck(s) => s.kind(),
            AnyStore::Pg(s) => s.kind(),
        }
    }

    fn target(&self) -> &str {
        match self {
            AnyStore::Duck(s) => s.target(),
            AnyStore::Pg(s) => s.target(),
        }
    }

    fn table_exists(&mut self, table: &Ident) -> Result<bool, String> {
        self.inner().table_exists(table)
    }

    fn table_columns(&mut self, table: &Ident) -> Result<Vec<String>, String> {
        self.inner().table_columns(table)
    }

    fn create_or_replace_table(
        &mut self,
        table: &Ident,
        dataset: &TabularDataset,
        populate: bool,
    ) -> Result<(), LoadError> {
        self.inner()
            .create_or_replace_table(table, dataset, populate)
    }

    fn append_rows(&mut self, table: &Ident, dataset: &TabularDataset) -> Result<u64, LoadError> {
        self.inner().append_rows(table, dataset)
    }

    fn execute_query(&mut self, sql: &str, shape: ResultShape) -> Result<QueryValue, String> {
        self.inner().execute_query(sql, shape)
    }

    fn close(self) -> Result<(), ConnectionError> {
        match self {
            AnyStore::Duck(s) => s.close(),
            AnyStore::Pg(s) => s.close(),
        }
    }
}

/// `LoadError::Store` for a failed bulk statement.
pub(crate) fn load_failed(table: &Ident, err: impl ToString) -> LoadError {
    LoadError::Store {
        table: table.to_string(),
        message: err.to_string(),
    }
}
