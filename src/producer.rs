//! Batched writes with random partition keys.

use crate::config::BatchSubmit;
use crate::error::StreamError;
use crate::partition::PartitionKeyGenerator;
use crate::service::StreamService;
use crate::stream::Stream;
use crate::types::{PutRecordsEntry, WriteReceipt};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Maximum records per `PutRecords` call.
pub const MAX_PUT_RECORDS: usize = 500;

impl Stream {
    /// Write records to the stream.
    ///
    /// Each record is serialized as JSON and paired with a fresh partition
    /// key. Records go out in consecutive batches of at most
    /// [`MAX_PUT_RECORDS`], submitted as configured by
    /// [`Config::batch_submit`](crate::Config). The call succeeds once every
    /// batch is accepted and fails with the first batch error.
    ///
    /// Records rejected individually inside an accepted batch are logged, not
    /// reported.
    pub async fn write<T: Serialize>(&self, records: &[T]) -> Result<WriteReceipt, StreamError> {
        if !self.client.is_initialized() {
            return Err(StreamError::NotInitialized);
        }
        if records.is_empty() {
            return Err(StreamError::EmptyInput);
        }

        let (config, service) = self.client.session().await?;
        debug!(stream = %self.name, records = records.len(), "Writing to stream");

        let batches = build_batches(records, self.client.partition_keys())?;
        let receipt = WriteReceipt {
            batches: batches.len(),
            records: records.len(),
        };

        match config.batch_submit {
            BatchSubmit::Sequential => {
                for (index, batch) in batches.into_iter().enumerate() {
                    put_batch(&*service, &self.name, index, batch).await?;
                }
            }
            BatchSubmit::Concurrent { max_in_flight } => {
                let service = &*service;
                futures::stream::iter(batches.into_iter().enumerate())
                    .map(|(index, batch)| put_batch(service, &self.name, index, batch))
                    .buffer_unordered(max_in_flight.max(1))
                    .try_collect::<Vec<()>>()
                    .await?;
            }
        }

        debug!(stream = %self.name, batches = receipt.batches, "Successfully wrote to stream");
        Ok(receipt)
    }
}

/// Serialize every record and split into batches of at most [`MAX_PUT_RECORDS`].
///
/// Serialization happens up front so a bad record fails the write before
/// anything is sent.
pub(crate) fn build_batches<T: Serialize>(
    records: &[T],
    keys: &dyn PartitionKeyGenerator,
) -> Result<Vec<Vec<PutRecordsEntry>>, StreamError> {
    records
        .chunks(MAX_PUT_RECORDS)
        .map(|chunk| {
            chunk
                .iter()
                .map(|record| {
                    Ok::<_, StreamError>(PutRecordsEntry {
                        data: Bytes::from(serde_json::to_vec(record)?),
                        partition_key: keys.next_key(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

async fn put_batch(
    service: &dyn StreamService,
    stream_name: &str,
    index: usize,
    batch: Vec<PutRecordsEntry>,
) -> Result<(), StreamError> {
    let len = batch.len();
    debug!(stream = %stream_name, batch = index, records = len, "Putting records");

    let output = service
        .put_records(stream_name, batch)
        .await
        .inspect_err(|e| error!(stream = %stream_name, batch = index, error = %e, "Failed to put records"))?;

    if output.failed_record_count > 0 {
        warn!(
            stream = %stream_name,
            batch = index,
            failed = output.failed_record_count,
            records = len,
            "Service rejected records in batch"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::RandomPartitionKeys;
    use serde_json::json;

    #[derive(Debug)]
    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    #[test]
    fn test_batches_respect_limit_and_order() {
        for n in [1usize, 499, 500, 501, 1000, 1234] {
            let records: Vec<_> = (0..n).map(|i| json!({ "i": i })).collect();
            let batches = build_batches(&records, &RandomPartitionKeys).unwrap();

            assert_eq!(batches.len(), n.div_ceil(MAX_PUT_RECORDS));
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= MAX_PUT_RECORDS));

            let flattened: Vec<serde_json::Value> = batches
                .iter()
                .flatten()
                .map(|e| serde_json::from_slice(&e.data).unwrap())
                .collect();
            assert_eq!(flattened, records);
        }
    }

    #[test]
    fn test_each_record_gets_its_own_key() {
        let records = vec![json!({"a": 1}); 3];
        let batches = build_batches(&records, &RandomPartitionKeys).unwrap();
        let keys: Vec<_> = batches[0].iter().map(|e| &e.partition_key).collect();
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn test_serialization_failure() {
        let err = build_batches(&[Unserializable], &RandomPartitionKeys).unwrap_err();
        assert!(matches!(err, StreamError::Json(_)));
    }
}
