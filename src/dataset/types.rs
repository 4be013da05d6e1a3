// src/dataset/types.rs

use arrow::datatypes::DataType;
use serde::Serialize;
use std::{fmt, path::Path};

use crate::error::LoadError;

/// On-disk layout of a source file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Parquet,
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("parquet") => Ok(SourceFormat::Parquet),
            Some("csv") => Ok(SourceFormat::Csv),
            _ => Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SourceFormat::Parquet => "parquet",
            SourceFormat::Csv => "csv",
        }
    }
}

/// Logical column type, coarse enough to map onto any SQL store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
    Text,
}

impl ColumnType {
    /// Integer and float samples in one column widen to float.
    pub fn unify(self, other: ColumnType) -> Option<ColumnType> {
        use ColumnType::*;
        match (self, other) {
            (a, b) if a == b => Some(a),
            (Integer, Float) | (Float, Integer) => Some(Float),
            _ => None,
        }
    }

    pub fn from_arrow(dt: &DataType) -> ColumnType {
        match dt {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => ColumnType::Integer,
            DataType::Float16
            | DataType::Float32
            | DataType::Float64
            | DataType::Decimal128(_, _)
            | DataType::Decimal256(_, _) => ColumnType::Float,
            DataType::Boolean => ColumnType::Boolean,
            DataType::Date32 | DataType::Date64 => ColumnType::Date,
            DataType::Timestamp(_, _) => ColumnType::Timestamp,
            _ => ColumnType::Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Text => "text",
        };
        f.write_str(s)
    }
}

/// One column as seen in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    /// Exact physical type for Parquet (`Int32`, `Timestamp(Microsecond, None)`);
    /// equal to `ty` for inferred CSV columns.
    pub native: String,
}

impl ColumnDef {
    pub fn from_arrow(name: &str, dt: &DataType) -> Self {
        Self {
            name: name.to_string(),
            ty: ColumnType::from_arrow(dt),
            native: dt.to_string(),
        }
    }

    pub fn inferred(name: &str, ty: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            native: ty.to_string(),
        }
    }
}
