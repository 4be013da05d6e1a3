// src/fetch/mod.rs

pub mod period;
pub mod source;

pub use period::{describe_sources, Period, SourceDescriptor};
pub use source::{HttpSource, RemoteSource};

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, info, instrument};

use crate::error::FetchError;

/// Make sure every source has a local copy, downloading only the missing ones.
///
/// Paths come back in the same order as `sources`. The first failure aborts
/// the whole call; files fetched before it stay in the cache.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub fn ensure_local<S: RemoteSource + ?Sized>(
    remote: &S,
    sources: &[SourceDescriptor],
) -> Result<Vec<PathBuf>, FetchError> {
    let mut paths = Vec::with_capacity(sources.len());
    let mut downloaded = 0usize;

    for src in sources {
        let name = src.file_name();
        if src.cache_path.exists() {
            debug!(name = %name, "cache hit");
        } else {
            info!(url = %src.url, "downloading");
            let start = Instant::now();
            let body = remote.fetch(&src.url)?;
            write_cache_file(&src.cache_path, &body)?;
            downloaded += 1;
            info!(name = %name, bytes = body.len(), elapsed = ?start.elapsed(), "downloaded");
        }
        paths.push(src.cache_path.clone());
    }

    info!(
        downloaded,
        cached = sources.len() - downloaded,
        "sources ready"
    );
    Ok(paths)
}

/// Write `bytes` to `dest` via a `.part` sibling so a crash mid-write never
/// leaves something that looks like a complete cache entry.
pub fn write_cache_file(dest: &Path, bytes: &[u8]) -> Result<(), FetchError> {
    let io_err = |source| FetchError::Io {
        path: dest.to_path_buf(),
        source,
    };

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, dest).map_err(io_err)?;
    Ok(())
}
