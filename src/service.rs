//! The remote stream service boundary.

use crate::error::StreamError;
use crate::types::{PutRecordsEntry, PutRecordsOutput, ReadResult, ShardIterator, StreamDescription};
use async_trait::async_trait;
use std::fmt;

/// Request/response contract of a Kinesis-style stream service.
///
/// Implementations surface failures unchanged; none of the calls retry.
#[async_trait]
pub trait StreamService: Send + Sync + fmt::Debug {
    /// Names of all streams visible to the caller.
    async fn list_streams(&self) -> Result<Vec<String>, StreamError>;

    /// Describe a stream, including every shard in service order.
    async fn describe_stream(&self, stream_name: &str) -> Result<StreamDescription, StreamError>;

    /// Obtain an iterator anchored at the trim horizon of one shard.
    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
    ) -> Result<ShardIterator, StreamError>;

    /// Submit one batch of at most 500 records.
    async fn put_records(
        &self,
        stream_name: &str,
        records: Vec<PutRecordsEntry>,
    ) -> Result<PutRecordsOutput, StreamError>;

    /// Fetch up to `limit` records starting at `iterator`.
    async fn get_records(
        &self,
        iterator: &ShardIterator,
        limit: u32,
    ) -> Result<ReadResult, StreamError>;
}
