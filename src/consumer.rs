//! Per-shard consumer tasks feeding a bounded channel.

use crate::error::StreamError;
use crate::iterator::{ShardReader, DEFAULT_READ_LIMIT};
use crate::stream::Stream;
use crate::types::{ReadMode, Record};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Records read from one shard in one call.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ShardBatch {
    pub shard_id: String,
    pub records: Vec<Record>,
    pub millis_behind_latest: u64,
}

/// Builder for configuring a stream consumer.
#[derive(Debug)]
#[must_use = "builders do nothing unless you call .start()"]
pub struct ConsumerBuilder {
    stream: Stream,
    batch_size: u32,
    idle_interval: Duration,
    channel_capacity: usize,
    mode: ReadMode,
}

impl ConsumerBuilder {
    pub(crate) fn new(stream: Stream) -> Self {
        Self {
            stream,
            batch_size: DEFAULT_READ_LIMIT,
            idle_interval: Duration::from_secs(1),
            channel_capacity: 16,
            mode: ReadMode::CatchUp,
        }
    }

    /// Set the maximum records per read.
    pub fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the pause between reads of a caught-up shard in follow mode.
    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Set how many batches may wait in the channel before shard tasks block.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the read mode.
    pub fn mode(mut self, mode: ReadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Discover shards, resolve their iterators and start one task per shard.
    pub async fn start(self) -> Result<StreamConsumer, StreamError> {
        let shards = self.stream.shard_iterators_by_shard().await?;

        let (batch_tx, batch_rx) = mpsc::channel(self.channel_capacity.max(1));
        let stop_tok = CancellationToken::new();

        let mut shard_ids = Vec::with_capacity(shards.len());
        let mut tasks = Vec::with_capacity(shards.len());
        for (shard_id, iterator) in shards {
            let reader = self
                .stream
                .read_from(iterator)
                .shard_id(shard_id.clone())
                .limit(self.batch_size)
                .build();

            let task = ShardTask {
                shard_id: shard_id.clone(),
                reader,
                batch_tx: batch_tx.clone(),
                stop_tok: stop_tok.child_token(),
                mode: self.mode,
                idle_interval: self.idle_interval,
            };
            tasks.push(tokio::spawn(task.run()));
            shard_ids.push(shard_id);
        }

        debug!(stream = %self.stream.name, shards = shard_ids.len(), mode = ?self.mode, "Started consumer");

        Ok(StreamConsumer {
            batch_rx,
            stop_tok,
            tasks,
            shard_ids,
        })
    }
}

/// Reads every shard of a stream concurrently.
///
/// Each shard has its own task; a slow or stalled shard only holds up its own
/// task, and a slow caller applies back-pressure through the bounded channel.
/// Dropping the consumer cancels the tasks.
pub struct StreamConsumer {
    batch_rx: mpsc::Receiver<Result<ShardBatch, StreamError>>,
    stop_tok: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    shard_ids: Vec<String>,
}

impl StreamConsumer {
    /// Shards being read, in discovery order.
    pub fn shard_ids(&self) -> &[String] {
        &self.shard_ids
    }

    /// Next batch from any shard.
    ///
    /// A shard task that fails delivers its error once and stops. Returns
    /// `None` when every shard task has finished.
    pub async fn next(&mut self) -> Option<Result<ShardBatch, StreamError>> {
        self.batch_rx.recv().await
    }

    /// Cancel all shard tasks and wait for them to exit.
    pub async fn stop(mut self) {
        self.stop_tok.cancel();
        self.batch_rx.close();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                error!(error = %e, "Shard task panicked");
            }
        }
    }
}

impl Drop for StreamConsumer {
    fn drop(&mut self) {
        self.stop_tok.cancel();
    }
}

struct ShardTask {
    shard_id: String,
    reader: ShardReader,
    batch_tx: mpsc::Sender<Result<ShardBatch, StreamError>>,
    stop_tok: CancellationToken,
    mode: ReadMode,
    idle_interval: Duration,
}

impl ShardTask {
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                _ = self.stop_tok.cancelled() => break,
                next = self.reader.next_batch() => next,
            };

            let result = match next {
                Ok(Some(result)) => result,
                Ok(None) => break,
                Err(e) => {
                    error!(shard_id = %self.shard_id, error = %e, "Shard read failed");
                    self.send(Err(e)).await;
                    break;
                }
            };

            let caught_up = result.is_caught_up();
            if !result.records.is_empty() {
                let batch = ShardBatch {
                    shard_id: self.shard_id.clone(),
                    records: result.records,
                    millis_behind_latest: result.millis_behind_latest,
                };
                if !self.send(Ok(batch)).await {
                    break;
                }
            }

            if self.reader.is_finished() {
                break;
            }

            if caught_up {
                if !self.mode.is_live() {
                    break;
                }
                tokio::select! {
                    _ = self.stop_tok.cancelled() => break,
                    _ = tokio::time::sleep(self.idle_interval) => {}
                }
            }
        }

        debug!(shard_id = %self.shard_id, "Shard task stopped");
    }

    /// Returns false once the consumer is gone or stopping.
    async fn send(&self, item: Result<ShardBatch, StreamError>) -> bool {
        tokio::select! {
            _ = self.stop_tok.cancelled() => false,
            sent = self.batch_tx.send(item) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::config::Config;
    use crate::memory::MemoryStreamService;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn client_with(memory: Arc<MemoryStreamService>) -> Client {
        Client::builder()
            .config(Config::default())
            .service(memory)
            .build()
    }

    #[tokio::test]
    async fn test_catch_up_reads_everything_then_ends() {
        let memory = Arc::new(MemoryStreamService::new());
        memory.create_stream("s", 3);
        let client = client_with(memory);
        let data: Vec<_> = (0..50).map(|i| json!({ "n": i })).collect();
        client.write_to_stream("s", &data).await.unwrap();

        let mut consumer = client.stream("s").consumer().batch_size(4).start().await.unwrap();
        assert_eq!(consumer.shard_ids().len(), 3);

        let mut per_shard: HashMap<String, Vec<String>> = HashMap::new();
        while let Some(batch) = consumer.next().await {
            let batch = batch.unwrap();
            assert!(batch.records.len() <= 4);
            per_shard
                .entry(batch.shard_id)
                .or_default()
                .extend(batch.records.into_iter().map(|r| r.sequence_number));
        }

        // Finished consumers keep returning None rather than an error.
        assert!(consumer.next().await.is_none());

        let total: usize = per_shard.values().map(Vec::len).sum();
        assert_eq!(total, 50);
        for sequence_numbers in per_shard.values() {
            assert!(sequence_numbers.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn test_follow_sees_new_records_and_stops() {
        let memory = Arc::new(MemoryStreamService::new());
        memory.create_stream("s", 1);
        let client = client_with(memory);

        let mut consumer = client
            .stream("s")
            .consumer()
            .mode(ReadMode::Follow)
            .idle_interval(Duration::from_millis(10))
            .start()
            .await
            .unwrap();

        client.write_to_stream("s", &[json!({"late": true})]).await.unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), consumer.next())
            .await
            .expect("batch before timeout")
            .unwrap()
            .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].decode().unwrap(), r#"{"late":true}"#);

        tokio::time::timeout(Duration::from_secs(5), consumer.stop())
            .await
            .expect("consumer stops promptly");
    }

    #[tokio::test]
    async fn test_shard_error_is_delivered_once() {
        let memory = Arc::new(MemoryStreamService::new());
        memory.create_stream("s", 1);
        let client = client_with(memory.clone());

        let mut consumer = client
            .stream("s")
            .consumer()
            .mode(ReadMode::Follow)
            .idle_interval(Duration::from_millis(5))
            .start()
            .await
            .unwrap();
        // Recreating the stream with no shards leaves the iterator pointing nowhere.
        memory.create_stream("s", 0);

        let mut errors = 0;
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(item) = consumer.next().await {
                if item.is_err() {
                    errors += 1;
                }
            }
        })
        .await;
        assert!(drained.is_ok(), "shard task should stop after its error");
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_start_fails_without_shards() {
        let memory = Arc::new(MemoryStreamService::new());
        memory.create_stream("s", 0);
        let client = client_with(memory);

        let err = client.stream("s").consumer().start().await.err().unwrap();
        assert!(matches!(err, StreamError::NoShards { .. }));
    }
}
