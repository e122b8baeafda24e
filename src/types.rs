//! Core types for the Kinesis stream client.

use crate::codec;
use crate::error::StreamError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read position within one shard.
///
/// Iterators are:
/// - Opaque: Do not parse or interpret the token
/// - Shard-bound: Only meaningful for the shard they were issued against
/// - Reusable: Reading does not invalidate the token, though the service
///   expires it after a few minutes
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardIterator(String);

impl ShardIterator {
    pub fn new(token: impl Into<String>) -> Self {
        ShardIterator(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ShardIterator {
    fn from(s: String) -> Self {
        ShardIterator(s)
    }
}

impl From<&str> for ShardIterator {
    fn from(s: &str) -> Self {
        ShardIterator(s.to_string())
    }
}

/// A record as returned by `GetRecords`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[non_exhaustive]
pub struct Record {
    /// Strictly increasing within a shard.
    pub sequence_number: String,
    /// Base64 encoded payload, decoded on demand.
    pub data: String,
    #[serde(default)]
    pub partition_key: String,
    /// Seconds since the epoch, as reported by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approximate_arrival_timestamp: Option<f64>,
}

impl Record {
    pub fn new(
        sequence_number: impl Into<String>,
        data: impl Into<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            sequence_number: sequence_number.into(),
            data: data.into(),
            partition_key: partition_key.into(),
            approximate_arrival_timestamp: None,
        }
    }

    /// Decode the payload into UTF-8 text.
    pub fn decode(&self) -> Result<String, StreamError> {
        codec::decode_payload(&self.data)
    }

    /// Decode the payload and parse it as JSON.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, StreamError> {
        let bytes = codec::decode_payload_bytes(&self.data)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Result of one `GetRecords` call.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ReadResult {
    /// The fetched records (possibly empty).
    pub records: Vec<Record>,
    /// Iterator for the next read on this shard; `None` once the shard is closed.
    pub next_shard_iterator: Option<ShardIterator>,
    /// Approximate lag between this response and the tip of the stream.
    pub millis_behind_latest: u64,
}

impl ReadResult {
    pub fn new(
        records: Vec<Record>,
        next_shard_iterator: Option<ShardIterator>,
        millis_behind_latest: u64,
    ) -> Self {
        Self {
            records,
            next_shard_iterator,
            millis_behind_latest,
        }
    }

    /// Whether the reader has reached the head of the shard.
    pub fn is_caught_up(&self) -> bool {
        self.millis_behind_latest == 0
    }

    /// Whether the shard has been closed and fully read.
    pub fn is_shard_end(&self) -> bool {
        self.next_shard_iterator.is_none()
    }
}

/// One shard as reported by `DescribeStream`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shard {
    pub shard_id: String,
}

/// Stream description returned by a [`StreamService`](crate::StreamService).
///
/// Shards appear in service response order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDescription {
    pub stream_name: String,
    pub status: String,
    pub shards: Vec<Shard>,
}

/// A single entry of a `PutRecords` batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutRecordsEntry {
    /// Serialized payload; encoded to base64 on the wire.
    pub data: Bytes,
    pub partition_key: String,
}

/// Outcome of one `PutRecords` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutRecordsOutput {
    /// Records rejected individually by the service.
    pub failed_record_count: u64,
}

/// Receipt for a completed `write_to_stream` call.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct WriteReceipt {
    /// Number of `PutRecords` calls issued.
    pub batches: usize,
    /// Number of records submitted.
    pub records: usize,
}

/// How a [`StreamConsumer`](crate::StreamConsumer) treats the head of a shard.
///
/// - `CatchUp`: stop reading a shard once `millis_behind_latest == 0`
/// - `Follow`: keep polling, pausing while caught up
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadMode {
    #[default]
    CatchUp,
    Follow,
}

impl ReadMode {
    /// Check if this mode keeps reading past the head.
    pub fn is_live(&self) -> bool {
        matches!(self, ReadMode::Follow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_wire_shape() {
        let record: Record = serde_json::from_value(json!({
            "SequenceNumber": "49590338271490256608559692538361571095921575989136588898",
            "ApproximateArrivalTimestamp": 1.441215410867E9,
            "Data": "eyJmb28iOiJiYXIifQ==",
            "PartitionKey": "partitionKey"
        }))
        .unwrap();

        assert_eq!(record.partition_key, "partitionKey");
        assert_eq!(record.decode().unwrap(), r#"{"foo":"bar"}"#);
        let value: serde_json::Value = record.decode_json().unwrap();
        assert_eq!(value, json!({"foo": "bar"}));
    }

    #[test]
    fn test_read_result_flags() {
        let caught_up = ReadResult::new(vec![], Some("it".into()), 0);
        assert!(caught_up.is_caught_up());
        assert!(!caught_up.is_shard_end());

        let closed = ReadResult::new(vec![], None, 250);
        assert!(!closed.is_caught_up());
        assert!(closed.is_shard_end());
    }

    #[test]
    fn test_iterator_is_transparent() {
        let it = ShardIterator::new("AAAA");
        assert_eq!(serde_json::to_string(&it).unwrap(), "\"AAAA\"");
        assert_eq!(it.to_string(), "AAAA");
    }
}
