// src/load/mod.rs

use serde::{Deserialize, Serialize};
use std::{fmt, path::Path};
use tracing::{debug, info, instrument, warn};

use crate::config::StoreConfig;
use crate::dataset::TabularDataset;
use crate::error::{ConnectionError, LoadError, PipelineError, QueryError};
use crate::ident::Ident;
use crate::query::{self, QueryKind, QueryResult, QuerySpec, QueryValue};
use crate::store::{AnyStore, Store};

/// What happens to an existing table of the same name.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Drop and recreate the table from all files in one statement.
    #[default]
    Replace,
    /// Recreate the table empty, then append all rows as a second step.
    ReplaceSchemaThenAppend,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::ReplaceSchemaThenAppend => "replace-schema-then-append",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    pub name: Ident,
    pub policy: ConflictPolicy,
}

/// Lifecycle of a loader. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoaderState {
    /// No connection yet.
    Uninitialized,
    Connected,
    TableLoaded,
    QueriesExecuted,
    Closed,
}

impl LoaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderState::Uninitialized => "uninitialized",
            LoaderState::Connected => "connected",
            LoaderState::TableLoaded => "table-loaded",
            LoaderState::QueriesExecuted => "queries-executed",
            LoaderState::Closed => "closed",
        }
    }
}

/// Outcome of a load or append call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub table: String,
    pub files: usize,
    /// Rows read from the source files in this call.
    pub rows_loaded: u64,
    /// Rows in the table afterwards.
    pub table_rows: i64,
}

/// Sole owner of a store connection for one run.
///
/// Dropping the loader (including on an early `?` return) releases the
/// connection; `close` does the same but reports errors.
pub struct Loader<S: Store> {
    store: S,
    state: LoaderState,
    table: Option<Ident>,
}

impl Loader<AnyStore> {
    pub fn connect(cfg: &StoreConfig) -> Result<Self, ConnectionError> {
        debug!(state = LoaderState::Uninitialized.as_str(), "connecting");
        AnyStore::connect(cfg).map(Loader::from_store)
    }
}

impl<S: Store> Loader<S> {
    /// Wrap an already open store.
    pub fn from_store(store: S) -> Self {
        info!(store = store.kind(), target = store.target(), "connected");
        Self {
            store,
            state: LoaderState::Connected,
            table: None,
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn table(&self) -> Option<&Ident> {
        self.table.as_ref()
    }

    fn transition(&mut self, to: LoaderState) {
        if self.state != to {
            debug!(from = self.state.as_str(), to = to.as_str(), "loader state");
        }
        self.state = to;
    }

    fn require(&self, allowed: &[LoaderState], action: &'static str) -> Result<(), LoadError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LoadError::InvalidState {
                action,
                state: self.state.as_str(),
            })
        }
    }

    /// Create or replace `target` from `files` under its conflict policy.
    ///
    /// All files are inspected before the store is touched, so a schema
    /// mismatch leaves any existing table as it was.
    #[instrument(level = "info", skip_all, fields(table = %target.name, policy = %target.policy, files = files.len()))]
    pub fn load<P: AsRef<Path>>(
        &mut self,
        files: &[P],
        target: &TargetTable,
    ) -> Result<LoadSummary, PipelineError> {
        self.require(&[LoaderState::Connected, LoaderState::TableLoaded], "load")?;
        let dataset = TabularDataset::inspect(files)?;
        let table = &target.name;

        let rows_loaded = match target.policy {
            ConflictPolicy::Replace => {
                self.store.create_or_replace_table(table, &dataset, true)?;
                dataset.total_rows()
            }
            ConflictPolicy::ReplaceSchemaThenAppend => {
                self.store.create_or_replace_table(table, &dataset, false)?;
                info!(columns = dataset.columns.len(), "created empty table");
                self.store.append_rows(table, &dataset)?
            }
        };

        self.table = Some(table.clone());
        self.transition(LoaderState::TableLoaded);
        self.summarize(&dataset, rows_loaded)
    }

    /// Point the loader at a table that already exists in the store.
    pub fn attach(&mut self, table: &Ident) -> Result<(), PipelineError> {
        self.require(&[LoaderState::Connected, LoaderState::TableLoaded], "attach")?;
        self.ensure_exists(table)?;
        info!(%table, "attached to existing table");
        self.table = Some(table.clone());
        self.transition(LoaderState::TableLoaded);
        Ok(())
    }

    /// Append `files` to the current table. Their columns must match the
    /// table's, by name and position.
    #[instrument(level = "info", skip_all, fields(files = files.len()))]
    pub fn append<P: AsRef<Path>>(&mut self, files: &[P]) -> Result<LoadSummary, PipelineError> {
        self.require(&[LoaderState::TableLoaded], "append")?;
        let table = self.current_table()?;
        let dataset = TabularDataset::inspect(files)?;

        let existing = self
            .store
            .table_columns(&table)
            .map_err(|message| QueryError::Execution {
                id: "table_columns".into(),
                message,
            })?;
        if existing.is_empty() {
            return Err(QueryError::MissingTable(table.to_string()).into());
        }
        dataset.check_fits_table(table.as_str(), &existing)?;

        let rows_loaded = self.store.append_rows(&table, &dataset)?;
        self.summarize(&dataset, rows_loaded)
    }

    /// Run `queries` in order against the loaded table.
    ///
    /// Stops at the first failure; no partial result set is returned.
    #[instrument(level = "info", skip_all, fields(queries = queries.len()))]
    pub fn run_queries(&mut self, queries: &[QuerySpec]) -> Result<Vec<QueryResult>, QueryError> {
        if !matches!(
            self.state,
            LoaderState::TableLoaded | LoaderState::QueriesExecuted
        ) {
            return Err(QueryError::NotLoaded {
                state: self.state.as_str(),
            });
        }
        let table = self.current_table()?;
        self.ensure_exists(&table)?;

        let mut results = Vec::with_capacity(queries.len());
        for spec in queries {
            results.push(query::execute(&mut self.store, &table, spec)?);
        }
        self.transition(LoaderState::QueriesExecuted);
        Ok(results)
    }

    /// Release the connection.
    pub fn close(mut self) -> Result<(), ConnectionError> {
        self.transition(LoaderState::Closed);
        let kind = self.store.kind();
        self.store.close()?;
        info!(store = kind, "connection closed");
        Ok(())
    }

    fn current_table(&self) -> Result<Ident, QueryError> {
        self.table.clone().ok_or(QueryError::NotLoaded {
            state: self.state.as_str(),
        })
    }

    fn ensure_exists(&mut self, table: &Ident) -> Result<(), QueryError> {
        let exists = self
            .store
            .table_exists(table)
            .map_err(|message| QueryError::Execution {
                id: "table_exists".into(),
                message,
            })?;
        if exists {
            Ok(())
        } else {
            Err(QueryError::MissingTable(table.to_string()))
        }
    }

    fn count_rows(&mut self, table: &Ident) -> Result<i64, QueryError> {
        let spec = QuerySpec::new("row_count", QueryKind::TotalCount);
        let sql = spec.render(table)?;
        match self.store.execute_query(&sql, spec.shape()) {
            Ok(QueryValue::Count(n)) => Ok(n),
            Ok(other) => Err(QueryError::Execution {
                id: spec.id,
                message: format!("expected a count, got {other:?}"),
            }),
            Err(message) => Err(QueryError::Execution {
                id: spec.id,
                message,
            }),
        }
    }

    fn summarize(
        &mut self,
        dataset: &TabularDataset,
        rows_loaded: u64,
    ) -> Result<LoadSummary, PipelineError> {
        let table = self.current_table()?;
        let table_rows = self.count_rows(&table)?;
        if rows_loaded != dataset.total_rows() {
            warn!(
                expected = dataset.total_rows(),
                loaded = rows_loaded,
                "row count differs from source metadata"
            );
        }
        info!(%table, rows_loaded, table_rows, "load complete");
        Ok(LoadSummary {
            table: table.to_string(),
            files: dataset.files.len(),
            rows_loaded,
            table_rows,
        })
    }
}
