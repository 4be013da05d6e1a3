//! Fetch monthly trip-data files into a local cache, bulk-load them into an
//! analytical store, and run a fixed set of verification reads.

pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod ident;
pub mod load;
pub mod pipeline;
pub mod query;
pub mod store;

pub use config::PipelineConfig;
pub use error::PipelineError;
