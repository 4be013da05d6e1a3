// src/query/mod.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::error::QueryError;
use crate::ident::Ident;
use crate::store::Store;

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// The closed set of verification reads. Only the table name and the
/// validated identifiers below are spliced into SQL; values are typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryKind {
    /// Full-table row count.
    TotalCount,
    /// Rows where `column` equals a number.
    CountEquals { column: Ident, value: f64 },
    /// Distinct values of `column` for rows with `range_column` in `[start, end]`.
    DistinctInRange {
        column: Ident,
        range_column: Ident,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

/// How a query's single result column should be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Count,
    Column,
}

/// A named, parameterised read against the target table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub id: String,
    /// Shown instead of `id` when printing results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub kind: QueryKind,
}

impl QuerySpec {
    pub fn new(id: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }

    pub fn shape(&self) -> ResultShape {
        match self.kind {
            QueryKind::TotalCount | QueryKind::CountEquals { .. } => ResultShape::Count,
            QueryKind::DistinctInRange { .. } => ResultShape::Column,
        }
    }

    /// Render the SQL text for `table`.
    pub fn render(&self, table: &Ident) -> Result<String, QueryError> {
        let t = table.quoted();
        match &self.kind {
            QueryKind::TotalCount => Ok(format!("SELECT COUNT(*) FROM {t}")),
            QueryKind::CountEquals { column, value } => {
                if !value.is_finite() {
                    return Err(self.malformed(format!("{value} is not a finite number")));
                }
                Ok(format!(
                    "SELECT COUNT(*) FROM {t} WHERE {} = {value:?}",
                    column.quoted()
                ))
            }
            QueryKind::DistinctInRange {
                column,
                range_column,
                start,
                end,
            } => {
                if start > end {
                    return Err(self.malformed(format!("range start {start} is after end {end}")));
                }
                Ok(format!(
                    "SELECT CAST(d.v AS VARCHAR) FROM \
                     (SELECT DISTINCT {} AS v FROM {t} WHERE {} BETWEEN TIMESTAMP '{}' AND TIMESTAMP '{}') AS d \
                     ORDER BY d.v",
                    column.quoted(),
                    range_column.quoted(),
                    start.format(TS_FMT),
                    end.format(TS_FMT),
                ))
            }
        }
    }

    fn malformed(&self, reason: String) -> QueryError {
        QueryError::Malformed {
            id: self.id.clone(),
            reason,
        }
    }
}

/// The fixed checks run after loading trip data.
pub fn default_verification_queries() -> Vec<QuerySpec> {
    let ident = |s: &str| Ident::new(s).expect("static identifier");
    let ts = |s: &str| NaiveDateTime::parse_from_str(s, TS_FMT).expect("static timestamp");
    vec![
        QuerySpec::new("total_records", QueryKind::TotalCount).with_label("Total records"),
        QuerySpec::new(
            "zero_fare_trips",
            QueryKind::CountEquals {
                column: ident("fare_amount"),
                value: 0.0,
            },
        )
        .with_label("Trips with zero fare"),
        QuerySpec::new(
            "vendors_dropoff_2024_03_01_to_15",
            QueryKind::DistinctInRange {
                column: ident("VendorID"),
                range_column: ident("tpep_dropoff_datetime"),
                start: ts("2024-03-01 00:00:00"),
                end: ts("2024-03-15 23:59:59"),
            },
        )
        .with_label("Vendors with drop-offs 2024-03-01 to 2024-03-15"),
    ]
}

/// What a store hands back for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    Count(i64),
    Values(Vec<Option<String>>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub id: String,
    pub label: String,
    pub value: QueryValue,
}

impl fmt::Display for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            QueryValue::Count(n) => write!(f, "{}: {}", self.label, group_thousands(*n)),
            QueryValue::Values(vals) if vals.is_empty() => write!(f, "{}: (no rows)", self.label),
            QueryValue::Values(vals) => {
                let shown: Vec<&str> = vals
                    .iter()
                    .map(|v| v.as_deref().unwrap_or("NULL"))
                    .collect();
                write!(f, "{}: [{}]", self.label, shown.join(", "))
            }
        }
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    if n < 0 {
        out.insert(0, '-');
    }
    out
}

/// Run one query against `table`. The caller has already checked that the
/// table exists.
pub fn execute<S: Store + ?Sized>(
    store: &mut S,
    table: &Ident,
    spec: &QuerySpec,
) -> Result<QueryResult, QueryError> {
    let sql = spec.render(table)?;
    debug!(id = %spec.id, %sql, "query");
    let value = store
        .execute_query(&sql, spec.shape())
        .map_err(|message| QueryError::Execution {
            id: spec.id.clone(),
            message,
        })?;
    let result = QueryResult {
        id: spec.id.clone(),
        label: spec.label().to_string(),
        value,
    };
    info!("{}", result);
    Ok(result)
}
