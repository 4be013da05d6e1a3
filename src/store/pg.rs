// src/store/pg.rs

use postgres::{Client, NoTls};
use std::{fs::File, io};
use tracing::{debug, info};

use super::{load_failed, Store};
use crate::config::PgConfig;
use crate::dataset::{ColumnDef, ColumnType, SourceFormat, TabularDataset};
use crate::error::{ConnectionError, LoadError};
use crate::ident::{quote_name, Ident};
use crate::query::{QueryValue, ResultShape};

/// PostgreSQL server reached over TCP. Accepts CSV sources only; rows are
/// streamed with `COPY ... FROM STDIN`.
pub struct PgStore {
    client: Client,
    target: String,
}

impl PgStore {
    pub fn connect(cfg: &PgConfig) -> Result<Self, ConnectionError> {
        let target = cfg.target();
        let client = postgres::Config::new()
            .host(&cfg.host)
            .port(cfg.port)
            .user(&cfg.user)
            .password(&cfg.password)
            .dbname(&cfg.database)
            .connect(NoTls)
            .map_err(|e| ConnectionError {
                target: target.clone(),
                message: e.to_string(),
            })?;
        info!(%target, "connected to postgres");
        Ok(Self { client, target })
    }
}

fn pg_type(ty: ColumnType) -> &'static str {
    match ty {
        ColumnType::Integer => "BIGINT",
        ColumnType::Float => "DOUBLE PRECISION",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Date => "DATE",
        ColumnType::Timestamp => "TIMESTAMP",
        ColumnType::Text => "TEXT",
    }
}

/// `CREATE TABLE` for the dataset's inferred columns.
pub fn create_table_sql(table: &Ident, columns: &[ColumnDef]) -> String {
    let cols: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_name(&c.name), pg_type(c.ty)))
        .collect();
    format!("CREATE TABLE {} ({})", table.quoted(), cols.join(", "))
}

/// `COPY` statement matching a CSV file with a header row.
pub fn copy_sql(table: &Ident, columns: &[ColumnDef]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_name(&c.name)).collect();
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT csv, HEADER true)",
        table.quoted(),
        cols.join(", ")
    )
}

fn require_csv(dataset: &TabularDataset) -> Result<(), LoadError> {
    match dataset.format {
        SourceFormat::Csv => Ok(()),
        other => Err(LoadError::UnsupportedByStore {
            format: other.name(),
            store: "postgres",
        }),
    }
}

/// Stream every file of the dataset through one `COPY` each.
fn copy_files<C: postgres::GenericClient>(
    client: &mut C,
    table: &Ident,
    dataset: &TabularDataset,
) -> Result<u64, LoadError> {
    let sql = copy_sql(table, &dataset.columns);
    let mut total = 0;
    for path in dataset.paths() {
        let mut file = File::open(path).map_err(|e| LoadError::Source {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut writer = client.copy_in(sql.as_str()).map_err(|e| load_failed(table, e))?;
        io::copy(&mut file, &mut writer).map_err(|e| load_failed(table, e))?;
        let n = writer.finish().map_err(|e| load_failed(table, e))?;
        debug!(path = %path.display(), rows = n, "copied");
        total += n;
    }
    Ok(total)
}

impl Store for PgStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn table_exists(&mut self, table: &Ident) -> Result<bool, String> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name::text = $1",
                &[&table.as_str()],
            )
            .map_err(|e| e.to_string())?;
        let n: i64 = row.try_get(0).map_err(|e| e.to_string())?;
        Ok(n > 0)
    }

    fn table_columns(&mut self, table: &Ident) -> Result<Vec<String>, String> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name::text = $1 \
                 ORDER BY ordinal_position",
                &[&table.as_str()],
            )
            .map_err(|e| e.to_string())?;
        rows.iter()
            .map(|r| r.try_get::<_, String>(0).map_err(|e| e.to_string()))
            .collect()
    }

    fn create_or_replace_table(
        &mut self,
        table: &Ident,
        dataset: &TabularDataset,
        populate: bool,
    ) -> Result<(), LoadError> {
        require_csv(dataset)?;
        let ddl = format!(
            "DROP TABLE IF EXISTS {}; {}",
            table.quoted(),
            create_table_sql(table, &dataset.columns)
        );
        debug!(%ddl, "create table");

        let mut tx = self.client.transaction().map_err(|e| load_failed(table, e))?;
        tx.batch_execute(&ddl).map_err(|e| load_failed(table, e))?;
        if populate {
            copy_files(&mut tx, table, dataset)?;
        }
        tx.commit().map_err(|e| load_failed(table, e))
    }

    fn append_rows(&mut self, table: &Ident, dataset: &TabularDataset) -> Result<u64, LoadError> {
        require_csv(dataset)?;
        copy_files(&mut self.client, table, dataset)
    }

    fn execute_query(&mut self, sql: &str, shape: ResultShape) -> Result<QueryValue, String> {
        match shape {
            ResultShape::Count => {
                let row = self.client.query_one(sql, &[]).map_err(|e| e.to_string())?;
                row.try_get::<_, i64>(0)
                    .map(QueryValue::Count)
                    .map_err(|e| e.to_string())
            }
            ResultShape::Column => {
                let rows = self.client.query(sql, &[]).map_err(|e| e.to_string())?;
                rows.iter()
                    .map(|r| r.try_get::<_, Option<String>>(0))
                    .collect::<Result<Vec<_>, _>>()
                    .map(QueryValue::Values)
                    .map_err(|e| e.to_string())
            }
        }
    }

    fn close(self) -> Result<(), ConnectionError> {
        let target = self.target;
        self.client.close().map_err(|e| ConnectionError {
            target: target.clone(),
            message: e.to_string(),
        })?;
        debug!(%target, "closed postgres");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::{trip, write_csv, write_trip_parquet};
    use tempfile::tempdir;

    fn zone_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::inferred("LocationID", ColumnType::Integer),
            ColumnDef::inferred("Borough", ColumnType::Text),
            ColumnDef::inferred("service zone", ColumnType::Text),
        ]
    }

    #[test]
    fn ddl_quotes_every_column() {
        let t = Ident::new("yellow_taxi_data").unwrap();
        assert_eq!(
            create_table_sql(&t, &zone_columns()),
            "CREATE TABLE \"yellow_taxi_data\" (\"LocationID\" BIGINT, \"Borough\" TEXT, \"service zone\" TEXT)"
        );
    }

    #[test]
    fn copy_statement() {
        let t = Ident::new("zones").unwrap();
        assert_eq!(
            copy_sql(&t, &zone_columns()),
            "COPY \"zones\" (\"LocationID\", \"Borough\", \"service zone\") FROM STDIN WITH (FORMAT csv, HEADER true)"
        );
    }

    #[test]
    fn all_logical_types_map() {
        let cols = vec![
            ColumnDef::inferred("a", ColumnType::Float),
            ColumnDef::inferred("b", ColumnType::Boolean),
            ColumnDef::inferred("c", ColumnType::Date),
            ColumnDef::inferred("d", ColumnType::Timestamp),
        ];
        let t = Ident::new("t").unwrap();
        assert_eq!(
            create_table_sql(&t, &cols),
            "CREATE TABLE \"t\" (\"a\" DOUBLE PRECISION, \"b\" BOOLEAN, \"c\" DATE, \"d\" TIMESTAMP)"
        );
    }

    #[test]
    fn parquet_is_rejected_before_touching_the_server() {
        let tmp = tempdir().unwrap();
        let p = tmp.path().join("a.parquet");
        write_trip_parquet(&p, &[trip(1, "2024-01-01 00:00:00", 1.0)]);
        let ds = TabularDataset::inspect(&[&p]).unwrap();
        assert!(matches!(
            require_csv(&ds),
            Err(LoadError::UnsupportedByStore { format: "parquet", .. })
        ));

        let c = tmp.path().join("a.csv");
        write_csv(&c, "id\n1\n");
        require_csv(&TabularDataset::inspect(&[&c]).unwrap()).unwrap();
    }

    #[test]
    fn unreachable_server_is_a_connection_error() {
        let cfg = PgConfig {
            host: "127.0.0.1".into(),
            // reserved port, nothing listens here
            port: 1,
            ..PgConfig::default()
        };
        let err = PgStore::connect(&cfg).err().expect("connect must fail");
        assert!(err.target.contains("127.0.0.1:1"));
    }
}
