// src/bin/inspect_cache.rs
//
// Print row counts and column layout for every cached file and flag any
// file whose layout differs from the first one of its format.

use anyhow::{bail, Context, Result};
use clap::Parser;
use glob::glob;
use std::path::PathBuf;

use tripload::config::DEFAULT_CACHE_DIR;
use tripload::dataset::{SourceFormat, SourceInfo};

#[derive(Debug, Parser)]
#[command(name = "inspect_cache", about = "Summarise the files in a tripload cache directory")]
struct Args {
    /// Cache directory to scan.
    #[arg(default_value = DEFAULT_CACHE_DIR)]
    dir: PathBuf,

    /// Also list each column with its type.
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut paths = Vec::new();
    for ext in ["parquet", "csv"] {
        let pattern = format!("{}/*.{ext}", args.dir.display());
        paths.extend(
            glob(&pattern)
                .with_context(|| format!("Failed to read glob pattern '{}'", pattern))?
                .filter_map(|entry| entry.ok()),
        );
    }
    paths.sort();
    if paths.is_empty() {
        bail!("no parquet or csv files under '{}'", args.dir.display());
    }

    let mut reference: Vec<(SourceFormat, SourceInfo)> = Vec::new();
    let mut total_rows = 0u64;
    let mut drifted = 0usize;

    for path in &paths {
        let info = SourceInfo::inspect(path)
            .with_context(|| format!("Failed to inspect '{}'", path.display()))?;
        total_rows += info.rows;
        println!(
            "{:<45} {:>12} rows  {:>3} columns",
            path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            info.rows,
            info.columns.len()
        );
        if args.verbose {
            for col in &info.columns {
                println!("    {:<30} {:<10} {}", col.name, col.ty, col.native);
            }
        }

        match reference.iter().position(|(f, _)| *f == info.format) {
            Some(i) => {
                if let Err(e) = info.check_matches(&reference[i].1) {
                    println!("    DRIFT: {e}");
                    drifted += 1;
                }
            }
            None => reference.push((info.format, info)),
        }
    }

    println!();
    println!("{} files, {} rows total", paths.len(), total_rows);
    if drifted > 0 {
        bail!("{drifted} file(s) differ from the first file of their format");
    }
    Ok(())
}
