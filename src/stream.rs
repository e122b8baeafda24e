//! Stream handle, shard discovery and iterator resolution.

use crate::client::Client;
use crate::consumer::ConsumerBuilder;
use crate::error::StreamError;
use crate::iterator::ReadBuilder;
use crate::service::StreamService;
use crate::types::ShardIterator;
use futures::future::try_join_all;
use tracing::{debug, error};

/// A handle to a named stream.
///
/// This is a lightweight, cloneable object - not a persistent connection.
/// Operations make requests on demand and never cache shard lists.
#[derive(Clone, Debug)]
pub struct Stream {
    pub(crate) name: String,
    pub(crate) client: Client,
}

impl Stream {
    /// Get the stream name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the client this handle was created from.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// List the stream's shard ids in service response order.
    ///
    /// Fails with [`StreamError::NoShards`] when the stream reports none.
    pub async fn shards(&self) -> Result<Vec<String>, StreamError> {
        let (_, service) = self.client.session().await?;
        self.shards_with(&*service).await
    }

    /// Resolve one trim-horizon iterator per shard, in shard order.
    ///
    /// Iterator requests run concurrently; the call fails as a whole if any
    /// of them fails.
    pub async fn shard_iterators(&self) -> Result<Vec<ShardIterator>, StreamError> {
        Ok(self
            .shard_iterators_by_shard()
            .await?
            .into_iter()
            .map(|(_, iterator)| iterator)
            .collect())
    }

    /// Like [`shard_iterators`](Self::shard_iterators), paired with shard ids.
    pub async fn shard_iterators_by_shard(
        &self,
    ) -> Result<Vec<(String, ShardIterator)>, StreamError> {
        let (_, service) = self.client.session().await?;
        let shard_ids = self.shards_with(&*service).await?;

        let iterators = try_join_all(shard_ids.iter().map(|shard_id| {
            let service = &service;
            async move {
                let iterator = service
                    .get_shard_iterator(&self.name, shard_id)
                    .await
                    .inspect_err(|e| {
                        error!(stream = %self.name, shard_id = %shard_id, error = %e, "Failed to get shard iterator")
                    })?;
                debug!(stream = %self.name, shard_id = %shard_id, "Got shard iterator");
                Ok::<_, StreamError>(iterator)
            }
        }))
        .await?;

        Ok(shard_ids.into_iter().zip(iterators).collect())
    }

    pub(crate) async fn shards_with(
        &self,
        service: &dyn StreamService,
    ) -> Result<Vec<String>, StreamError> {
        debug!(stream = %self.name, "Describing stream");

        let description = service
            .describe_stream(&self.name)
            .await
            .inspect_err(|e| error!(stream = %self.name, error = %e, "Failed to describe stream"))?;

        if description.shards.is_empty() {
            return Err(StreamError::NoShards {
                stream: self.name.clone(),
            });
        }

        debug!(stream = %self.name, shards = description.shards.len(), "Found shards");
        Ok(description.shards.into_iter().map(|s| s.shard_id).collect())
    }

    /// Create a reader builder for following one shard from `iterator`.
    pub fn read_from(&self, iterator: ShardIterator) -> ReadBuilder {
        ReadBuilder::new(self.clone(), iterator)
    }

    /// Create a consumer builder that reads every shard of the stream.
    pub fn consumer(&self) -> ConsumerBuilder {
        ConsumerBuilder::new(self.clone())
    }
}
