//! Shard reads with ShardReader.

use crate::error::StreamError;
use crate::stream::Stream;
use crate::types::{ReadResult, ShardIterator};
use tracing::{debug, error};

/// Largest `limit` accepted by `GetRecords`.
pub const MAX_READ_LIMIT: u32 = 10_000;

/// Records fetched per read unless configured otherwise.
pub const DEFAULT_READ_LIMIT: u32 = 100;

impl Stream {
    /// Fetch up to `limit` records from the shard `iterator` points into.
    ///
    /// The supplied iterator is used as is. Feed the returned
    /// `next_shard_iterator` into the following call; `millis_behind_latest`
    /// tells whether another read is worthwhile. There is no delay between
    /// reads, callers pace their own polling.
    pub async fn read(
        &self,
        iterator: &ShardIterator,
        limit: u32,
    ) -> Result<ReadResult, StreamError> {
        let (_, service) = self.client.session().await?;

        if limit == 0 || limit > MAX_READ_LIMIT {
            return Err(StreamError::InvalidLimit(limit));
        }

        debug!(stream = %self.name, limit, "Reading from stream");

        let result = service
            .get_records(iterator, limit)
            .await
            .inspect_err(|e| error!(stream = %self.name, error = %e, "Failed to get records"))?;

        debug!(
            stream = %self.name,
            records = result.records.len(),
            millis_behind_latest = result.millis_behind_latest,
            "Got records"
        );
        Ok(result)
    }
}

/// Builder for configuring a shard reader.
#[derive(Debug)]
#[must_use = "builders do nothing unless you call .build()"]
pub struct ReadBuilder {
    stream: Stream,
    iterator: ShardIterator,
    shard_id: Option<String>,
    limit: u32,
}

impl ReadBuilder {
    pub(crate) fn new(stream: Stream, iterator: ShardIterator) -> Self {
        Self {
            stream,
            iterator,
            shard_id: None,
            limit: DEFAULT_READ_LIMIT,
        }
    }

    /// Set the maximum records per read.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Label the reader with the shard the iterator belongs to.
    pub fn shard_id(mut self, shard_id: impl Into<String>) -> Self {
        self.shard_id = Some(shard_id.into());
        self
    }

    /// Build the ShardReader.
    ///
    /// No network request is made until `next_batch()` is called.
    pub fn build(self) -> ShardReader {
        ShardReader {
            stream: self.stream,
            iterator: Some(self.iterator),
            shard_id: self.shard_id,
            limit: self.limit,
            caught_up: false,
        }
    }
}

/// Follows one shard, feeding each response's next iterator into the
/// following read.
#[derive(Debug)]
pub struct ShardReader {
    stream: Stream,
    iterator: Option<ShardIterator>,
    shard_id: Option<String>,
    limit: u32,
    caught_up: bool,
}

impl ShardReader {
    /// Iterator the next read will use; `None` once the shard has ended.
    pub fn iterator(&self) -> Option<&ShardIterator> {
        self.iterator.as_ref()
    }

    pub fn shard_id(&self) -> Option<&str> {
        self.shard_id.as_deref()
    }

    /// Whether the last read reached the head of the shard.
    pub fn is_caught_up(&self) -> bool {
        self.caught_up
    }

    /// Whether the shard is closed and fully read.
    pub fn is_finished(&self) -> bool {
        self.iterator.is_none()
    }

    /// Read the next batch.
    ///
    /// Returns `Ok(None)` once the shard has ended. On error the position is
    /// left unchanged, so the read can be attempted again.
    pub async fn next_batch(&mut self) -> Result<Option<ReadResult>, StreamError> {
        let Some(iterator) = &self.iterator else {
            return Ok(None);
        };

        let result = self.stream.read(iterator, self.limit).await?;

        self.iterator = result.next_shard_iterator.clone();
        self.caught_up = result.is_caught_up();

        if self.iterator.is_none() {
            debug!(stream = %self.stream.name, shard_id = ?self.shard_id, "Reached end of shard");
        }

        Ok(Some(result))
    }
}
