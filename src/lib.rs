//! Kinesis Streams Rust Client
//!
//! A client library for Kinesis-style sharded streams: discover a stream's
//! shards, resolve a read iterator per shard, write records in service-sized
//! batches and follow each shard's iterator forward.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use kinesis_streams::{Client, Config};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::with_config(Config::from_env());
//!
//!     // Write records (batched, random partition keys)
//!     client.write_to_stream("test-stream", &[json!({ "date": 1234567890 })]).await?;
//!
//!     // Read every shard from the trim horizon until caught up
//!     for iterator in client.get_shard_iterators("test-stream").await? {
//!         let mut next = Some(iterator);
//!         while let Some(iterator) = next {
//!             let result = client.read_stream("test-stream", &iterator, 2).await?;
//!             for record in &result.records {
//!                 println!("{} {}", record.sequence_number, record.decode()?);
//!             }
//!             if result.is_caught_up() {
//!                 break;
//!             }
//!             next = result.next_shard_iterator;
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

mod client;
mod codec;
mod config;
mod consumer;
mod error;
mod iterator;
mod kinesis;
mod memory;
mod partition;
mod producer;
mod service;
mod stream;
mod types;

pub use client::{Client, ClientBuilder};
pub use codec::{decode_payload, decode_payload_bytes, encode_payload};
pub use config::{BatchSubmit, Config, Credentials, DEFAULT_REGION};
pub use consumer::{ConsumerBuilder, ShardBatch, StreamConsumer};
pub use error::StreamError;
pub use iterator::{ReadBuilder, ShardReader, DEFAULT_READ_LIMIT, MAX_READ_LIMIT};
pub use kinesis::KinesisStreamService;
pub use memory::{MemoryStreamService, Operation};
pub use partition::{PartitionKeyGenerator, RandomPartitionKeys};
pub use producer::MAX_PUT_RECORDS;
pub use service::StreamService;
pub use stream::Stream;
pub use types::{
    PutRecordsEntry, PutRecordsOutput, ReadMode, ReadResult, Record, Shard, ShardIterator,
    StreamDescription, WriteReceipt,
};
