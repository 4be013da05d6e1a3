// src/config.rs

use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use url::Url;

use crate::error::ConfigError;
use crate::fetch::period::check_template;
use crate::fetch::Period;
use crate::ident::Ident;
use crate::load::ConflictPolicy;
use crate::query::{default_verification_queries, QueryKind, QuerySpec};

pub const DEFAULT_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data/";
pub const DEFAULT_FILE_TEMPLATE: &str = "yellow_tripdata_{period}.parquet";
pub const DEFAULT_CACHE_DIR: &str = "data";
pub const DEFAULT_DUCKDB_FILE: &str = "taxi.duckdb";
pub const DEFAULT_TABLE: &str = "yellow_taxi_2024";
pub const ZONE_LOOKUP_CSV: &str = "taxi_zone_lookup.csv";
pub const ZONE_LOOKUP_TABLE: &str = "yellow_taxi_data";

/// Where remote files come from and where their cached copies go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub base_url: Url,
    /// File name with a `{period}` placeholder, e.g. `yellow_tripdata_{period}.parquet`.
    pub file_template: String,
    pub from: Period,
    pub to: Period,
    pub cache_dir: PathBuf,
    /// Extra attempts after a transient failure. 0 = fail on first error.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Per-request timeout. Unset = wait indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL"),
            file_template: DEFAULT_FILE_TEMPLATE.to_string(),
            from: Period::new(2024, 1).expect("default period"),
            to: Period::new(2024, 6).expect("default period"),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            max_retries: 0,
            retry_backoff_ms: 500,
            request_timeout_secs: None,
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5433,
            user: "postgres".into(),
            password: "postgres".into(),
            database: "ny_taxi".into(),
        }
    }
}

impl PgConfig {
    /// `user@host:port/db`, without the password.
    pub fn target(&self) -> String {
        format!(
            "postgresql://{}@{}:{}/{}",
            self.user, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for PgConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .finish()
    }
}

/// Which backing store the loader talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// DuckDB file; `path: null` keeps the database in memory.
    Duckdb {
        #[serde(default = "default_duckdb_path")]
        path: Option<PathBuf>,
    },
    Postgres(PgConfig),
}

fn default_duckdb_path() -> Option<PathBuf> {
    Some(PathBuf::from(DEFAULT_DUCKDB_FILE))
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Duckdb {
            path: default_duckdb_path(),
        }
    }
}

/// Everything a pipeline run needs, built once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub fetch: FetchConfig,
    pub store: StoreConfig,
    pub table: Ident,
    pub policy: ConflictPolicy,
    pub queries: Vec<QuerySpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            store: StoreConfig::default(),
            table: Ident::new(DEFAULT_TABLE).expect("default table name"),
            policy: ConflictPolicy::Replace,
            queries: default_verification_queries(),
        }
    }
}

impl PipelineConfig {
    /// Lookup-table load: one local CSV into PostgreSQL, schema first and
    /// rows appended after, checked with a row count.
    pub fn zone_lookup() -> Self {
        Self {
            store: StoreConfig::Postgres(PgConfig::default()),
            table: Ident::new(ZONE_LOOKUP_TABLE).expect("lookup table name"),
            policy: ConflictPolicy::ReplaceSchemaThenAppend,
            queries: vec![QuerySpec::new("total_records", QueryKind::TotalCount)
                .with_label("Total records")],
            ..Self::default()
        }
    }

    /// Read a YAML config. Missing keys fall back to the defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            ConfigError::File { message, .. } => ConfigError::File {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: PipelineConfig = serde_yaml::from_str(text).map_err(|e| ConfigError::File {
            path: PathBuf::from("<yaml>"),
            message: e.to_string(),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks that need more than one field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Period::range(self.fetch.from, self.fetch.to)?;
        check_template(&self.fetch.file_template)
    }
}
