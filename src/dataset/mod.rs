// src/dataset/mod.rs

pub mod derive;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

pub use types::{ColumnDef, ColumnType, SourceFormat};

use csv::{ReaderBuilder, Trim};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Serialize;
use std::{
    fs::File,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};

use crate::error::{LoadError, PipelineError, SchemaMismatchError};

/// Layout and size of one source file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub format: SourceFormat,
    pub columns: Vec<ColumnDef>,
    pub rows: u64,
}

impl SourceInfo {
    pub fn inspect(path: &Path) -> Result<Self, LoadError> {
        let format = SourceFormat::from_path(path)?;
        let (columns, rows) = match format {
            SourceFormat::Parquet => inspect_parquet(path),
            SourceFormat::Csv => inspect_csv(path),
        }
        .map_err(|message| LoadError::Source {
            path: path.to_path_buf(),
            message,
        })?;
        debug!(path = %path.display(), columns = columns.len(), rows, "inspected");
        Ok(Self {
            path: path.to_path_buf(),
            format,
            columns,
            rows,
        })
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Compare against `reference`: same column names in the same order,
    /// and for Parquet the same physical types.
    pub fn check_matches(&self, reference: &SourceInfo) -> Result<(), SchemaMismatchError> {
        if self.columns.len() != reference.columns.len() {
            return Err(SchemaMismatchError::ColumnCount {
                reference: reference.path.clone(),
                file: self.path.clone(),
                expected: reference.columns.len(),
                found: self.columns.len(),
            });
        }
        let strict = self.format == SourceFormat::Parquet;
        for (index, (got, want)) in self.columns.iter().zip(&reference.columns).enumerate() {
            let (found, expected) = if got.name != want.name {
                (got.name.clone(), want.name.clone())
            } else if strict && got.native != want.native {
                (
                    format!("{} {}", got.name, got.native),
                    format!("{} {}", want.name, want.native),
                )
            } else {
                continue;
            };
            return Err(SchemaMismatchError::Column {
                reference: reference.path.clone(),
                file: self.path.clone(),
                index,
                expected,
                found,
            });
        }
        Ok(())
    }
}

fn inspect_parquet(path: &Path) -> Result<(Vec<ColumnDef>, u64), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| e.to_string())?;
    let rows = builder.metadata().file_metadata().num_rows().max(0) as u64;
    let columns = builder
        .schema()
        .fields()
        .iter()
        .map(|f| ColumnDef::from_arrow(f.name(), f.data_type()))
        .collect();
    Ok((columns, rows))
}

fn inspect_csv(path: &Path) -> Result<(Vec<ColumnDef>, u64), String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| e.to_string())?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err("missing header row".into());
    }

    // every record takes part in inference, so DDL built from it fits the whole file
    let source = path.display().to_string();
    let mut deriver = derive::TypeDeriver::new(&source, &headers);
    let mut rows = 0u64;
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        deriver.observe(record.iter());
        rows += 1;
    }

    let columns = deriver.finish();
    Ok((columns, rows))
}

/// The set of files handed to one load or append call, inspected up front.
///
/// The first file fixes the schema; every other file must match it.
#[derive(Debug, Clone, Serialize)]
pub struct TabularDataset {
    pub format: SourceFormat,
    pub columns: Vec<ColumnDef>,
    pub files: Vec<SourceInfo>,
}

impl TabularDataset {
    #[instrument(level = "info", skip_all, fields(files = paths.len()))]
    pub fn inspect<P: AsRef<Path>>(paths: &[P]) -> Result<Self, PipelineError> {
        let (first, rest) = paths.split_first().ok_or(LoadError::NoSources)?;
        let reference = SourceInfo::inspect(first.as_ref())?;

        let mut files = Vec::with_capacity(paths.len());
        for path in rest {
            let info = SourceInfo::inspect(path.as_ref())?;
            if info.format != reference.format {
                return Err(LoadError::MixedFormats {
                    first: reference.format.name(),
                    other: info.format.name(),
                }
                .into());
            }
            info.check_matches(&reference)?;
            files.push(info);
        }
        files.insert(0, reference);

        Ok(Self {
            format: files[0].format,
            columns: files[0].columns.clone(),
            files,
        })
    }

    pub fn total_rows(&self) -> u64 {
        self.files.iter().map(|f| f.rows).sum()
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.path.as_path()).collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Reject the dataset if its columns differ from an existing table's.
    pub fn check_fits_table(
        &self,
        table: &str,
        table_columns: &[String],
    ) -> Result<(), SchemaMismatchError> {
        let found = self.column_names();
        if found != table_columns {
            return Err(SchemaMismatchError::Table {
                table: table.to_string(),
                file: self.files[0].path.clone(),
                expected: table_columns.to_vec(),
                found,
            });
        }
        Ok(())
    }
}
