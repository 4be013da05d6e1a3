// src/dataset/derive.rs

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use super::types::{ColumnDef, ColumnType};

const DATE_FMT: &str = "%Y-%m-%d";
const TIMESTAMP_FMTS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Running per-column type inference over CSV rows.
///
/// Empty cells are ignored. The first non-empty cell fixes the candidate
/// type; later cells must agree (integer/float widen to float), otherwise
/// the column becomes text. A column with no non-empty cell is text.
pub struct TypeDeriver<'a> {
    source: &'a str,
    headers: &'a [String],
    current: Vec<Option<ColumnType>>,
}

impl<'a> TypeDeriver<'a> {
    pub fn new(source: &'a str, headers: &'a [String]) -> Self {
        Self {
            source,
            headers,
            current: vec![None; headers.len()],
        }
    }

    /// Fold one row into the running types.
    pub fn observe<'r, I>(&mut self, row: I)
    where
        I: IntoIterator<Item = &'r str>,
    {
        for (idx, cell) in row.into_iter().enumerate().take(self.current.len()) {
            let cell = cell.trim();
            let slot = &mut self.current[idx];
            if cell.is_empty() || *slot == Some(ColumnType::Text) {
                continue;
            }
            let inferred = infer_cell(cell);
            *slot = match *slot {
                None => Some(inferred),
                Some(prev) => match prev.unify(inferred) {
                    Some(t) => Some(t),
                    None => {
                        debug!(
                            source = self.source,
                            column = %self.headers[idx],
                            "conflict {} vs {}, defaulting to text",
                            prev,
                            inferred
                        );
                        Some(ColumnType::Text)
                    }
                },
            };
        }
    }

    pub fn finish(self) -> Vec<ColumnDef> {
        self.headers
            .iter()
            .zip(self.current)
            .map(|(name, ty)| ColumnDef::inferred(name, ty.unwrap_or(ColumnType::Text)))
            .collect()
    }
}

/// Derive column types from a set of already collected rows.
pub fn derive_types(source: &str, headers: &[String], rows: &[Vec<String>]) -> Vec<ColumnDef> {
    let mut deriver = TypeDeriver::new(source, headers);
    for row in rows {
        deriver.observe(row.iter().map(String::as_str));
    }
    deriver.finish()
}

fn infer_cell(v: &str) -> ColumnType {
    if v.parse::<i64>().is_ok() {
        return ColumnType::Integer;
    }
    let lower = v.to_ascii_lowercase();
    if v.parse::<f64>().is_ok() && lower != "nan" && !lower.contains("inf") {
        return ColumnType::Float;
    }
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("false") {
        return ColumnType::Boolean;
    }
    if NaiveDate::parse_from_str(v, DATE_FMT).is_ok() {
        return ColumnType::Date;
    }
    if TIMESTAMP_FMTS
        .iter()
        .any(|f| NaiveDateTime::parse_from_str(v, f).is_ok())
    {
        return ColumnType::Timestamp;
    }
    ColumnType::Text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn zone_lookup_columns() {
        let headers: Vec<String> = ["LocationID", "Borough", "Zone", "service_zone"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sample = rows(&[
            &["1", "EWR", "Newark Airport", "EWR"],
            &["2", "Queens", "Jamaica Bay", "Boro Zone"],
            &["264", "Unknown", "", ""],
        ]);
        let cols = derive_types("zones.csv", &headers, &sample);
        let types: Vec<_> = cols.iter().map(|c| c.ty).collect();
        assert_eq!(
            types,
            [
                ColumnType::Integer,
                ColumnType::Text,
                ColumnType::Text,
                ColumnType::Text
            ]
        );
    }

    #[test]
    fn mixed_and_empty_columns() {
        let headers: Vec<String> = ["n", "when", "flag", "blank", "mixed"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sample = rows(&[
            &["1", "2024-03-01 10:00:00", "true", "", "2024-01-01"],
            &["2.5", "2024-03-02 11:30:00", "FALSE", "", "abc"],
            &["", "", "", "", ""],
        ]);
        let cols = derive_types("t.csv", &headers, &sample);
        assert_eq!(cols[0].ty, ColumnType::Float);
        assert_eq!(cols[1].ty, ColumnType::Timestamp);
        assert_eq!(cols[2].ty, ColumnType::Boolean);
        assert_eq!(cols[3].ty, ColumnType::Text);
        assert_eq!(cols[4].ty, ColumnType::Text);
    }

    #[test]
    fn nan_and_inf_are_text() {
        assert_eq!(infer_cell("NaN"), ColumnType::Text);
        assert_eq!(infer_cell("inf"), ColumnType::Text);
        assert_eq!(infer_cell("-3.25"), ColumnType::Float);
        assert_eq!(infer_cell("2024-03-15"), ColumnType::Date);
    }
}
