// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failure while materialising a source file in the local cache.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("GET {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("writing cache file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source files that cannot be loaded together, or that do not fit the
/// table they are appended to.
#[derive(Debug, Error)]
pub enum SchemaMismatchError {
    #[error(
        "{} has {found} columns but {} has {expected}",
        file.display(),
        reference.display()
    )]
    ColumnCount {
        reference: PathBuf,
        file: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error(
        "column {index} of {} is `{found}` but {} has `{expected}`",
        file.display(),
        reference.display()
    )]
    Column {
        reference: PathBuf,
        file: PathBuf,
        index: usize,
        expected: String,
        found: String,
    },
    #[error("{} does not match the columns of table `{table}`: expected [{}], found [{}]",
        file.display(),
        expected.join(", "),
        found.join(", ")
    )]
    Table {
        table: String,
        file: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// Failure while reading source files or executing a bulk load statement.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no source files to load")]
    NoSources,
    #[error("unsupported source file {}: expected .parquet or .csv", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("cannot mix {first} and {other} sources in one load")]
    MixedFormats {
        first: &'static str,
        other: &'static str,
    },
    #[error("{format} sources cannot be loaded into {store}")]
    UnsupportedByStore {
        format: &'static str,
        store: &'static str,
    },
    #[error("reading {}: {message}", path.display())]
    Source { path: PathBuf, message: String },
    #[error("cannot {action} while the loader is {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error("bulk load into `{table}` failed: {message}")]
    Store { table: String, message: String },
}

/// Failure while running a verification query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("cannot run queries while the loader is {state}")]
    NotLoaded { state: &'static str },
    #[error("table `{0}` does not exist")]
    MissingTable(String),
    #[error("query `{id}` is malformed: {reason}")]
    Malformed { id: String, reason: String },
    #[error("query `{id}` failed: {message}")]
    Execution { id: String, message: String },
}

/// The backing store could not be reached or refused the connection.
#[derive(Debug, Error)]
#[error("cannot connect to {target}: {message}")]
pub struct ConnectionError {
    pub target: String,
    pub message: String,
}

/// Invalid configuration values, rejected before any I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid period `{0}`: expected YYYY-MM")]
    Period(String),
    #[error("period range is empty: {from} is after {to}")]
    EmptyRange { from: String, to: String },
    #[error("invalid file template `{template}`: {reason}")]
    Template {
        template: String,
        reason: &'static str,
    },
    #[error("`{0}` is not a valid SQL identifier")]
    Identifier(String),
    #[error("invalid base URL `{url}`: {source}")]
    BaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("reading config {}: {message}", path.display())]
    File { path: PathBuf, message: String },
}

/// Any failure of a pipeline run. Every variant is fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Schema(#[from] SchemaMismatchError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
