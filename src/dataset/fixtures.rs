// src/dataset/fixtures.rs
//
// Small trip-data files for tests, shaped like the NYC yellow taxi columns
// the verification queries read.

use arrow::{
    array::{ArrayRef, Float64Array, Int32Array, Int64Array, TimestampMicrosecondArray},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use chrono::NaiveDateTime;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{fs, fs::File, path::Path, sync::Arc};

pub struct Trip {
    pub vendor_id: i32,
    pub dropoff: NaiveDateTime,
    pub fare_amount: f64,
}

pub fn trip(vendor_id: i32, dropoff: &str, fare_amount: f64) -> Trip {
    Trip {
        vendor_id,
        dropoff: NaiveDateTime::parse_from_str(dropoff, "%Y-%m-%d %H:%M:%S")
            .expect("fixture timestamp"),
        fare_amount,
    }
}

fn write_batch(path: &Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) {
    let batch = RecordBatch::try_new(schema.clone(), columns).expect("fixture batch");
    let file = File::create(path).expect("fixture file");
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).expect("fixture writer");
    writer.write(&batch).expect("fixture write");
    writer.close().expect("fixture close");
}

fn dropoffs(trips: &[Trip]) -> ArrayRef {
    Arc::new(TimestampMicrosecondArray::from_iter_values(
        trips.iter().map(|t| t.dropoff.and_utc().timestamp_micros()),
    ))
}

fn fares(trips: &[Trip]) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(
        trips.iter().map(|t| t.fare_amount),
    ))
}

fn trip_schema(vendor_type: DataType) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("VendorID", vendor_type, true),
        Field::new(
            "tpep_dropoff_datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            true,
        ),
        Field::new("fare_amount", DataType::Float64, true),
    ]))
}

/// `VendorID INT32, tpep_dropoff_datetime TIMESTAMP, fare_amount DOUBLE`.
pub fn write_trip_parquet(path: &Path, trips: &[Trip]) {
    let vendors: ArrayRef = Arc::new(Int32Array::from_iter_values(
        trips.iter().map(|t| t.vendor_id),
    ));
    write_batch(
        path,
        trip_schema(DataType::Int32),
        vec![vendors, dropoffs(trips), fares(trips)],
    );
}

/// Same columns, but `VendorID` stored as INT64: a drifted month.
pub fn write_trip_parquet_i64_vendor(path: &Path, trips: &[Trip]) {
    let vendors: ArrayRef = Arc::new(Int64Array::from_iter_values(
        trips.iter().map(|t| t.vendor_id as i64),
    ));
    write_batch(
        path,
        trip_schema(DataType::Int64),
        vec![vendors, dropoffs(trips), fares(trips)],
    );
}

/// `n` trips for vendor 1, all in January with a non-zero fare.
pub fn write_n_trips(path: &Path, n: usize) {
    let trips: Vec<Trip> = (0..n)
        .map(|i| trip(1, "2024-01-10 08:00:00", 5.0 + i as f64))
        .collect();
    write_trip_parquet(path, &trips);
}

pub fn write_csv(path: &Path, text: &str) {
    fs::write(path, text).expect("fixture csv");
}
