//! In-process stream service.
//!
//! Behaves like a small Kinesis: partition keys hash onto equal hash-key
//! ranges, sequence numbers increase strictly, iterators are reusable opaque
//! tokens and `MillisBehindLatest` drops to zero at the head of a shard.
//! Every `PutRecords` batch is recorded and faults can be injected, which
//! makes it the backend of choice for tests and local runs.

use crate::codec;
use crate::error::StreamError;
use crate::service::StreamService;
use crate::types::{
    PutRecordsEntry, PutRecordsOutput, ReadResult, Record, Shard, ShardIterator,
    StreamDescription,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

const MAX_PUT_RECORDS: usize = 500;
const MAX_GET_RECORDS: u32 = 10_000;

/// Service calls, for counting and fault injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ListStreams,
    DescribeStream,
    GetShardIterator,
    PutRecords,
    GetRecords,
}

/// A [`StreamService`] that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryStreamService {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryState {
    streams: BTreeMap<String, MemoryStream>,
    next_sequence: u64,
    calls: BTreeMap<&'static str, usize>,
    put_batches: Vec<Vec<PutRecordsEntry>>,
    put_failures: HashSet<usize>,
    iterator_failures: HashSet<String>,
}

#[derive(Debug)]
struct MemoryStream {
    shards: Vec<MemoryShard>,
}

#[derive(Debug)]
struct MemoryShard {
    shard_id: String,
    records: Vec<StoredRecord>,
    closed: bool,
}

#[derive(Debug)]
struct StoredRecord {
    record: Record,
    arrived_at_ms: i64,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::ListStreams => "ListStreams",
            Operation::DescribeStream => "DescribeStream",
            Operation::GetShardIterator => "GetShardIterator",
            Operation::PutRecords => "PutRecords",
            Operation::GetRecords => "GetRecords",
        }
    }
}

impl MemoryStreamService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it touches any state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Create a stream with `shard_count` shards. Zero shards is allowed.
    ///
    /// Creating an existing stream replaces it.
    pub fn create_stream(&self, stream_name: impl Into<String>, shard_count: usize) {
        let shards = (0..shard_count)
            .map(|i| MemoryShard {
                shard_id: format!("shardId-{i:012}"),
                records: Vec::new(),
                closed: false,
            })
            .collect();
        self.state
            .lock()
            .streams
            .insert(stream_name.into(), MemoryStream { shards });
    }

    /// Mark a shard closed; reads past its last record end the shard.
    pub fn close_shard(&self, stream_name: &str, shard_id: &str) -> Result<(), StreamError> {
        let mut state = self.state.lock();
        let shard = find_stream_mut(&mut state, stream_name)?
            .shards
            .iter_mut()
            .find(|s| s.shard_id == shard_id)
            .ok_or_else(|| StreamError::NotFound {
                message: format!("shard {shard_id} not found in stream {stream_name}"),
            })?;
        shard.closed = true;
        Ok(())
    }

    /// Fail the `call_index`-th `PutRecords` call (counting from zero).
    pub fn fail_put_records_call(&self, call_index: usize) {
        self.state.lock().put_failures.insert(call_index);
    }

    /// Fail every `GetShardIterator` call for `shard_id`.
    pub fn fail_shard_iterator(&self, shard_id: impl Into<String>) {
        self.state.lock().iterator_failures.insert(shard_id.into());
    }

    /// Number of calls made for an operation, failed ones included.
    pub fn calls(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .get(operation.name())
            .copied()
            .unwrap_or(0)
    }

    /// Every accepted `PutRecords` batch, in acceptance order.
    pub fn put_batches(&self) -> Vec<Vec<PutRecordsEntry>> {
        self.state.lock().put_batches.clone()
    }

    /// Records stored in one shard, in sequence order.
    pub fn shard_records(&self, stream_name: &str, shard_id: &str) -> Vec<Record> {
        let state = self.state.lock();
        state
            .streams
            .get(stream_name)
            .and_then(|s| s.shards.iter().find(|s| s.shard_id == shard_id))
            .map(|s| s.records.iter().map(|r| r.record.clone()).collect())
            .unwrap_or_default()
    }

    async fn enter(&self, operation: Operation) -> usize {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock();
        let count = state.calls.entry(operation.name()).or_insert(0);
        *count += 1;
        *count - 1
    }
}

#[async_trait]
impl StreamService for MemoryStreamService {
    async fn list_streams(&self) -> Result<Vec<String>, StreamError> {
        self.enter(Operation::ListStreams).await;
        Ok(self.state.lock().streams.keys().cloned().collect())
    }

    async fn describe_stream(&self, stream_name: &str) -> Result<StreamDescription, StreamError> {
        self.enter(Operation::DescribeStream).await;
        let mut state = self.state.lock();
        let stream = find_stream_mut(&mut state, stream_name)?;
        Ok(StreamDescription {
            stream_name: stream_name.to_string(),
            status: "ACTIVE".to_string(),
            shards: stream
                .shards
                .iter()
                .map(|s| Shard {
                    shard_id: s.shard_id.clone(),
                })
                .collect(),
        })
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
    ) -> Result<ShardIterator, StreamError> {
        self.enter(Operation::GetShardIterator).await;
        let mut state = self.state.lock();

        if state.iterator_failures.contains(shard_id) {
            return Err(StreamError::Throttled {
                message: format!("rate exceeded for shard {shard_id}"),
            });
        }

        let stream = find_stream_mut(&mut state, stream_name)?;
        let index = stream
            .shards
            .iter()
            .position(|s| s.shard_id == shard_id)
            .ok_or_else(|| StreamError::NotFound {
                message: format!("shard {shard_id} not found in stream {stream_name}"),
            })?;

        Ok(encode_iterator(stream_name, index, 0))
    }

    async fn put_records(
        &self,
        stream_name: &str,
        records: Vec<PutRecordsEntry>,
    ) -> Result<PutRecordsOutput, StreamError> {
        let call = self.enter(Operation::PutRecords).await;
        let mut state = self.state.lock();

        if state.put_failures.contains(&call) {
            return Err(StreamError::Throttled {
                message: format!("rate exceeded for stream {stream_name}"),
            });
        }
        if records.is_empty() || records.len() > MAX_PUT_RECORDS {
            return Err(StreamError::InvalidRequest {
                message: format!(
                    "records must contain between 1 and {MAX_PUT_RECORDS} entries, got {}",
                    records.len()
                ),
            });
        }

        let mut next_sequence = state.next_sequence;
        let stream = find_stream_mut(&mut state, stream_name)?;
        if stream.shards.is_empty() {
            return Err(StreamError::InvalidRequest {
                message: format!("stream {stream_name} has no shards"),
            });
        }

        let now = Utc::now();
        for entry in &records {
            let index = shard_for_key(&entry.partition_key, stream.shards.len());
            next_sequence += 1;
            let mut record = Record::new(
                format!("{next_sequence:056}"),
                codec::encode_payload(&entry.data),
                entry.partition_key.clone(),
            );
            record.approximate_arrival_timestamp = Some(now.timestamp_millis() as f64 / 1000.0);
            stream.shards[index].records.push(StoredRecord {
                record,
                arrived_at_ms: now.timestamp_millis(),
            });
        }

        state.next_sequence = next_sequence;
        state.put_batches.push(records);

        Ok(PutRecordsOutput::default())
    }

    async fn get_records(
        &self,
        iterator: &ShardIterator,
        limit: u32,
    ) -> Result<ReadResult, StreamError> {
        self.enter(Operation::GetRecords).await;

        if limit == 0 || limit > MAX_GET_RECORDS {
            return Err(StreamError::InvalidRequest {
                message: format!("limit must be between 1 and {MAX_GET_RECORDS}"),
            });
        }

        let (stream_name, index, position) = decode_iterator(iterator)?;
        let mut state = self.state.lock();
        let stream = find_stream_mut(&mut state, &stream_name)?;
        let shard = stream.shards.get(index).ok_or_else(|| StreamError::InvalidRequest {
            message: "iterator refers to an unknown shard".to_string(),
        })?;

        let start = position.min(shard.records.len());
        let end = (start + limit as usize).min(shard.records.len());
        let batch = &shard.records[start..end];

        let millis_behind_latest = match (batch.last(), shard.records.last()) {
            (Some(last_read), Some(newest)) if end < shard.records.len() => {
                (newest.arrived_at_ms - last_read.arrived_at_ms).max(1) as u64
            }
            _ => 0,
        };

        let next_shard_iterator = if shard.closed && end == shard.records.len() {
            None
        } else {
            Some(encode_iterator(&stream_name, index, end))
        };

        Ok(ReadResult::new(
            batch.iter().map(|r| r.record.clone()).collect(),
            next_shard_iterator,
            millis_behind_latest,
        ))
    }
}

fn find_stream_mut<'a>(
    state: &'a mut MemoryState,
    stream_name: &str,
) -> Result<&'a mut MemoryStream, StreamError> {
    state
        .streams
        .get_mut(stream_name)
        .ok_or_else(|| StreamError::NotFound {
            message: format!("stream {stream_name} not found"),
        })
}

/// Map a partition key onto one of `shard_count` equal hash-key ranges.
fn shard_for_key(partition_key: &str, shard_count: usize) -> usize {
    shard_for_hash(hash_key(partition_key), shard_count)
}

/// 128-bit hash key: the first 16 bytes of the SHA-256 digest, big endian.
fn hash_key(partition_key: &str) -> u128 {
    let digest = Sha256::digest(partition_key.as_bytes());
    let mut high = [0u8; 16];
    high.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(high)
}

/// `floor(hash * shard_count / 2^128)`, computed in two halves.
fn shard_for_hash(hash: u128, shard_count: usize) -> usize {
    let n = shard_count as u128;
    let high = (hash >> 64) * n;
    let low = (hash & u128::from(u64::MAX)) * n;
    ((high + (low >> 64)) >> 64) as usize
}

fn encode_iterator(stream_name: &str, shard_index: usize, position: usize) -> ShardIterator {
    ShardIterator::new(codec::encode_payload(
        format!("{stream_name}/{shard_index}/{position}").as_bytes(),
    ))
}

fn decode_iterator(iterator: &ShardIterator) -> Result<(String, usize, usize), StreamError> {
    let invalid = || StreamError::InvalidRequest {
        message: format!("invalid shard iterator {iterator}"),
    };

    let text = codec::decode_payload(iterator.as_str()).map_err(|_| invalid())?;
    let mut parts = text.rsplitn(3, '/');
    let position = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let index = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
    let stream_name = parts.next().ok_or_else(invalid)?;
    Ok((stream_name.to_string(), index, position))
}
