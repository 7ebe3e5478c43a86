//! The contract every source importer implements.
//!
//! - Construction does no I/O: no requests, no parsing.
//! - `get_data` / `get_metadata` fetch, parse and harmonize on a cache miss,
//!   then serve later calls with equal (or, where documented, subset)
//!   parameters from the instance's cache. Only successful results are cached.
//! - `clear_cache` drops everything the instance cached (including its disk
//!   files) and never fails.
//!
//! Methods take `&mut self`: an instance is meant for one thread at a time.
//! Run separate instances to fetch in parallel.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;

use crate::error::Result;

pub trait Importer {
    /// Parameters selecting the dataset.
    type Query;
    /// Parameters selecting the metadata.
    type MetadataQuery;
    /// Metadata representation (a table for most sources).
    type Metadata;

    /// Human-readable source name used in errors and logs.
    fn source(&self) -> &'static str;

    /// Schema every successful `get_data` result has.
    fn schema(&self) -> SchemaRef;

    fn get_data(&mut self, query: &Self::Query) -> Result<RecordBatch>;

    fn get_metadata(&mut self, query: &Self::MetadataQuery) -> Result<Self::Metadata>;

    fn clear_cache(&mut self);
}
