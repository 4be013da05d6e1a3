// src/pipeline.rs

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::config::{FetchConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::fetch::{describe_sources, ensure_local, RemoteSource};
use crate::load::{LoadSummary, Loader, TargetTable};
use crate::query::QueryResult;

/// Everything one end-to-end run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub files: Vec<PathBuf>,
    pub load: LoadSummary,
    pub results: Vec<QueryResult>,
}

/// Resolve the configured periods and make sure each has a local copy.
pub fn fetch_sources<R: RemoteSource + ?Sized>(
    cfg: &FetchConfig,
    remote: &R,
) -> Result<Vec<PathBuf>, PipelineError> {
    let sources = describe_sources(cfg)?;
    Ok(ensure_local(remote, &sources)?)
}

/// Fetch, load and verify, in that order. Any failure stops the run; the
/// store connection is released on every path out of this function.
#[instrument(level = "info", skip_all, fields(table = %cfg.table))]
pub fn run<R: RemoteSource + ?Sized>(
    cfg: &PipelineConfig,
    remote: &R,
) -> Result<RunReport, PipelineError> {
    cfg.validate()?;
    let files = fetch_sources(&cfg.fetch, remote)?;

    let mut loader = Loader::connect(&cfg.store)?;
    let target = TargetTable {
        name: cfg.table.clone(),
        policy: cfg.policy,
    };
    let load = loader.load(&files, &target)?;
    let results = loader.run_queries(&cfg.queries)?;
    loader.close()?;

    info!(files = files.len(), queries = results.len(), "run complete");
    Ok(RunReport {
        files,
        load,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::dataset::fixtures::{trip, write_n_trips, write_trip_parquet};
    use crate::error::{FetchError, QueryError};
    use crate::fetch::testing::RecordingSource;
    use crate::query::QueryValue;
    use std::{fs, path::Path};
    use tempfile::tempdir;

    /// A source serving six months of small parquet files; month `i` has
    /// `i` trips, except March which carries the query fixtures.
    fn six_month_source(cfg: &FetchConfig, scratch: &Path) -> RecordingSource {
        describe_sources(cfg)
            .unwrap()
            .iter()
            .enumerate()
            .fold(RecordingSource::default(), |remote, (i, src)| {
                let path = scratch.join(src.file_name());
                if src.period.month() == 3 {
                    write_trip_parquet(
                        &path,
                        &[
                            trip(1, "2024-03-02 09:00:00", 0.0),
                            trip(2, "2024-03-10 18:30:00", 22.0),
                            trip(6, "2024-03-20 07:15:00", 0.0),
                        ],
                    );
                } else {
                    write_n_trips(&path, i + 1);
                }
                remote.with(&src.url, fs::read(&path).unwrap())
            })
    }

    fn config(root: &Path) -> PipelineConfig {
        PipelineConfig {
            fetch: FetchConfig {
                cache_dir: root.join("data"),
                ..FetchConfig::default()
            },
            store: StoreConfig::Duckdb {
                path: Some(root.join("taxi.duckdb")),
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn cold_then_warm_run() {
        let tmp = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let cfg = config(tmp.path());
        let remote = six_month_source(&cfg.fetch, scratch.path());

        let first = run(&cfg, &remote).unwrap();
        assert_eq!(remote.request_count(), 6);
        assert_eq!(first.files.len(), 6);
        // months 1,2,4,5,6 have 1,2,4,5,6 rows; March has 3
        assert_eq!(first.load.table_rows, 21);
        assert_eq!(first.results[0].value, QueryValue::Count(21));
        assert_eq!(first.results[1].value, QueryValue::Count(2));
        assert_eq!(
            first.results[2].value,
            QueryValue::Values(vec![Some("1".into()), Some("2".into())])
        );

        let second = run(&cfg, &remote).unwrap();
        assert_eq!(remote.request_count(), 6, "warm cache must not download");
        assert_eq!(second.results, first.results);
        assert_eq!(second.files, first.files);
    }

    #[test]
    fn fetch_failure_never_opens_the_store() {
        let tmp = tempdir().unwrap();
        let cfg = config(tmp.path());
        let err = run(&cfg, &RecordingSource::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(FetchError::Status { status: 404, .. })));
        assert!(!tmp.path().join("taxi.duckdb").exists());
    }

    #[test]
    fn query_failure_surfaces_with_its_id() {
        let tmp = tempdir().unwrap();
        let scratch = tempdir().unwrap();
        let mut cfg = config(tmp.path());
        let remote = six_month_source(&cfg.fetch, scratch.path());
        cfg.queries = serde_yaml::from_str(
            "- id: tips\n  kind: count_equals\n  column: tip_amount\n  value: 0\n",
        )
        .unwrap();

        let err = run(&cfg, &remote).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Query(QueryError::Execution { ref id, .. }) if id == "tips"
        ));
    }
}
