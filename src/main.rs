use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use tripload::{
    config::{PgConfig, PipelineConfig, StoreConfig, ZONE_LOOKUP_CSV},
    fetch::{HttpSource, Period},
    ident::Ident,
    load::{ConflictPolicy, Loader, TargetTable},
    pipeline,
    query::QueryResult,
};

/// Fetch monthly trip data, load it into a store and verify it.
#[derive(Debug, Parser)]
#[command(name = "tripload", version)]
#[command(about = "Cache, bulk-load and verify tabular data files", long_about = None)]
struct Cli {
    /// YAML config file. Flags given here override it.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct StoreArgs {
    /// Target table.
    #[arg(long, global = true)]
    table: Option<Ident>,

    /// DuckDB database file, or ":memory:".
    #[arg(long, global = true, value_name = "PATH", conflicts_with = "postgres")]
    duckdb: Option<PathBuf>,

    /// Load into PostgreSQL instead of DuckDB. Without --config this starts
    /// from the zone lookup defaults (table yellow_taxi_data,
    /// replace-schema-then-append).
    #[arg(long, global = true)]
    postgres: bool,

    #[arg(long, global = true)]
    pg_host: Option<String>,

    #[arg(long, global = true)]
    pg_port: Option<u16>,

    #[arg(long, global = true)]
    pg_user: Option<String>,

    #[arg(long, global = true, env = "PGPASSWORD", hide_env_values = true)]
    pg_pass: Option<String>,

    #[arg(long, global = true)]
    pg_db: Option<String>,
}

#[derive(Debug, Args)]
struct PeriodArgs {
    /// First month, YYYY-MM.
    #[arg(long)]
    from: Option<Period>,

    /// Last month (inclusive), YYYY-MM.
    #[arg(long)]
    to: Option<Period>,

    /// Retries per file after a transient download error.
    #[arg(long, value_name = "N")]
    retries: Option<u32>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download missing months into the cache and list the local files.
    Fetch {
        #[command(flatten)]
        periods: PeriodArgs,
    },

    /// Fetch, load and run the verification queries.
    Run {
        #[command(flatten)]
        periods: PeriodArgs,

        #[arg(long, value_enum)]
        policy: Option<ConflictPolicy>,
    },

    /// Load local files into the table.
    Load {
        /// Parquet or CSV files, all of one format and layout.
        #[arg(default_value = ZONE_LOOKUP_CSV)]
        files: Vec<PathBuf>,

        #[arg(long, value_enum)]
        policy: Option<ConflictPolicy>,
    },

    /// Append local files to an existing table.
    Append {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Run the verification queries against an existing table.
    Query,
}

impl Cli {
    /// Config file (or defaults) with every flag applied on top.
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_yaml_file(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None if self.store.postgres => PipelineConfig::zone_lookup(),
            None => PipelineConfig::default(),
        };

        let s = &self.store;
        if let Some(table) = &s.table {
            cfg.table = table.clone();
        }
        if let Some(path) = &s.duckdb {
            cfg.store = StoreConfig::Duckdb {
                path: (path != Path::new(":memory:")).then(|| path.clone()),
            };
        }
        // pg_* flags only matter once postgres is selected, here or in the file
        if s.postgres || matches!(cfg.store, StoreConfig::Postgres(_)) {
            let mut pg = match &cfg.store {
                StoreConfig::Postgres(pg) => pg.clone(),
                StoreConfig::Duckdb { .. } => PgConfig::default(),
            };
            if let Some(v) = &s.pg_host {
                pg.host = v.clone();
            }
            if let Some(v) = s.pg_port {
                pg.port = v;
            }
            if let Some(v) = &s.pg_user {
                pg.user = v.clone();
            }
            if let Some(v) = &s.pg_pass {
                pg.password = v.clone();
            }
            if let Some(v) = &s.pg_db {
                pg.database = v.clone();
            }
            cfg.store = StoreConfig::Postgres(pg);
        }

        match &self.command {
            Command::Fetch { periods } => periods.apply(&mut cfg),
            Command::Run { periods, policy } => {
                periods.apply(&mut cfg);
                if let Some(p) = policy {
                    cfg.policy = *p;
                }
            }
            Command::Load {
                policy: Some(p), ..
            } => cfg.policy = *p,
            _ => {}
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

impl PeriodArgs {
    fn apply(&self, cfg: &mut PipelineConfig) {
        if let Some(p) = self.from {
            cfg.fetch.from = p;
        }
        if let Some(p) = self.to {
            cfg.fetch.to = p;
        }
        if let Some(n) = self.retries {
            cfg.fetch.max_retries = n;
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> Vec<String>) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        for line in text() {
            println!("{line}");
        }
    }
    Ok(())
}

fn result_lines(results: &[QueryResult]) -> Vec<String> {
    results.iter().map(ToString::to_string).collect()
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = cli.resolve_config()?;
    debug!(?cfg, "resolved config");

    match &cli.command {
        Command::Fetch { .. } => {
            let remote = HttpSource::new(&cfg.fetch).context("building HTTP client")?;
            let files = pipeline::fetch_sources(&cfg.fetch, &remote)?;
            emit(cli.json, &files, || {
                files.iter().map(|p| p.display().to_string()).collect()
            })?;
        }
        Command::Run { .. } => {
            let remote = HttpSource::new(&cfg.fetch).context("building HTTP client")?;
            let report = pipeline::run(&cfg, &remote)?;
            emit(cli.json, &report, || result_lines(&report.results))?;
        }
        Command::Load { files, .. } => {
            let mut loader = Loader::connect(&cfg.store)?;
            let target = TargetTable {
                name: cfg.table.clone(),
                policy: cfg.policy,
            };
            let summary = loader
                .load(files.as_slice(), &target)
                .with_context(|| format!("loading into {}", cfg.table))?;
            loader.close()?;
            emit(cli.json, &summary, || {
                vec![format!("{}: {} rows", summary.table, summary.table_rows)]
            })?;
        }
        Command::Append { files } => {
            let mut loader = Loader::connect(&cfg.store)?;
            loader.attach(&cfg.table)?;
            let summary = loader
                .append(files.as_slice())
                .with_context(|| format!("appending to {}", cfg.table))?;
            loader.close()?;
            emit(cli.json, &summary, || {
                vec![format!(
                    "{}: +{} rows, {} total",
                    summary.table, summary.rows_loaded, summary.table_rows
                )]
            })?;
        }
        Command::Query => {
            let mut loader = Loader::connect(&cfg.store)?;
            loader.attach(&cfg.table)?;
            let results = loader.run_queries(&cfg.queries)?;
            loader.close()?;
            emit(cli.json, &results, || result_lines(&results))?;
        }
    }

    info!("done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tripload::query::QueryKind;

    fn resolve(args: &[&str]) -> PipelineConfig {
        Cli::try_parse_from(args).unwrap().resolve_config().unwrap()
    }

    #[test]
    fn postgres_load_uses_zone_lookup_defaults() {
        let cli = Cli::try_parse_from(["tripload", "--postgres", "load"]).unwrap();
        match &cli.command {
            Command::Load { files, policy } => {
                assert_eq!(files, &[PathBuf::from("taxi_zone_lookup.csv")]);
                assert!(policy.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
        let cfg = cli.resolve_config().unwrap();
        assert_eq!(cfg.table.as_str(), "yellow_taxi_data");
        assert_eq!(cfg.policy, ConflictPolicy::ReplaceSchemaThenAppend);
        assert_eq!(cfg.queries[0].kind, QueryKind::TotalCount);
        match cfg.store {
            StoreConfig::Postgres(pg) => {
                assert_eq!(pg.port, 5433);
                assert_eq!(pg.database, "ny_taxi");
            }
            other => panic!("unexpected store {other:?}"),
        }
    }

    #[test]
    fn flags_override_lookup_defaults() {
        let cfg = resolve(&[
            "tripload",
            "--postgres",
            "--table",
            "zones",
            "--pg-port",
            "5432",
            "load",
            "--policy",
            "replace",
            "zones.csv",
        ]);
        assert_eq!(cfg.table.as_str(), "zones");
        assert_eq!(cfg.policy, ConflictPolicy::Replace);
        assert!(matches!(cfg.store, StoreConfig::Postgres(ref pg) if pg.port == 5432));
    }

    #[test]
    fn duckdb_is_the_default_store() {
        let cfg = resolve(&["tripload", "query"]);
        assert_eq!(cfg.table.as_str(), "yellow_taxi_2024");
        assert_eq!(cfg.policy, ConflictPolicy::Replace);
        assert!(matches!(cfg.store, StoreConfig::Duckdb { path: Some(_) }));

        let cfg = resolve(&["tripload", "--duckdb", ":memory:", "query"]);
        assert!(matches!(cfg.store, StoreConfig::Duckdb { path: None }));
    }

    #[test]
    fn duckdb_and_postgres_together_are_rejected() {
        assert!(
            Cli::try_parse_from(["tripload", "--duckdb", "taxi.duckdb", "--postgres", "query"])
                .is_err()
        );
    }
}
