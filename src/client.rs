//! Client context: configuration and the lazily created service handle.

use crate::config::Config;
use crate::error::StreamError;
use crate::kinesis::KinesisStreamService;
use crate::partition::{PartitionKeyGenerator, RandomPartitionKeys};
use crate::service::StreamService;
use crate::stream::Stream;
use crate::types::{ReadResult, ShardIterator, WriteReceipt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// A Kinesis stream client.
///
/// The client is cloneable and can be shared across tasks; clones share the
/// configuration and the service handle. It replaces process-wide state:
/// create one per configuration and pass it where it is needed.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: RwLock<Option<Arc<Config>>>,
    /// Built service together with the configuration it was built for.
    service: Mutex<Option<(Arc<Config>, Arc<dyn StreamService>)>>,
    source: ServiceSource,
    partition_keys: Arc<dyn PartitionKeyGenerator>,
}

enum ServiceSource {
    /// Build a [`KinesisStreamService`] from the current configuration.
    Kinesis,
    /// Always use this service.
    Fixed(Arc<dyn StreamService>),
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &*self.inner.config.read())
            .field("has_service", &self.inner.service.lock().is_some())
            .field("partition_keys", &self.inner.partition_keys)
            .finish()
    }
}

impl Client {
    /// Create an uninitialized client.
    ///
    /// Every operation fails with [`StreamError::NotInitialized`] until
    /// [`init`](Self::init) is called.
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    /// Create a client initialized with `config`.
    pub fn with_config(config: Config) -> Self {
        ClientBuilder::new().config(config).build()
    }

    /// Create a client builder for customization.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Replace the configuration.
    ///
    /// The whole configuration is swapped, nothing is merged, and the cached
    /// service handle is dropped so the next operation builds one for the new
    /// settings. Operations already in flight keep the handle they started with.
    pub fn init(&self, config: Config) {
        let mut service = self.inner.service.lock();
        let mut current = self.inner.config.write();
        debug!(region = ?config.region, endpoint = ?config.endpoint, "Initializing stream client");
        *current = Some(Arc::new(config));
        *service = None;
    }

    /// Current configuration, if initialized.
    pub fn config(&self) -> Option<Arc<Config>> {
        self.inner.config.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.config.read().is_some()
    }

    /// Get the service handle, creating it on first use.
    ///
    /// Idempotent: later calls return the same handle until the client is
    /// re-initialized.
    pub async fn ensure_client(&self) -> Result<Arc<dyn StreamService>, StreamError> {
        self.session().await.map(|(_, service)| service)
    }

    /// Configuration and service handle, taken together so both belong to the
    /// same initialization.
    pub(crate) async fn session(
        &self,
    ) -> Result<(Arc<Config>, Arc<dyn StreamService>), StreamError> {
        let config = self
            .inner
            .config
            .read()
            .clone()
            .ok_or(StreamError::NotInitialized)?;

        if let ServiceSource::Fixed(fixed) = &self.inner.source {
            return Ok((config, fixed.clone()));
        }
        if let Some(existing) = self.cached_service(&config) {
            return Ok((config, existing));
        }

        debug!(region = ?config.region, endpoint = ?config.endpoint, "Creating stream service client");
        let created: Arc<dyn StreamService> =
            Arc::new(KinesisStreamService::from_config(&config).await);

        let mut cached = self.inner.service.lock();
        match cached.as_ref() {
            // Another task finished building first.
            Some((built_for, existing)) if Arc::ptr_eq(built_for, &config) => {
                Ok((config, existing.clone()))
            }
            _ => {
                *cached = Some((config.clone(), created.clone()));
                Ok((config, created))
            }
        }
    }

    fn cached_service(&self, config: &Arc<Config>) -> Option<Arc<dyn StreamService>> {
        match self.inner.service.lock().as_ref() {
            Some((built_for, service)) if Arc::ptr_eq(built_for, config) => Some(service.clone()),
            _ => None,
        }
    }

    pub(crate) fn partition_keys(&self) -> &dyn PartitionKeyGenerator {
        &*self.inner.partition_keys
    }

    /// Create a handle for the named stream.
    ///
    /// No network request is made until an operation is called.
    pub fn stream(&self, name: impl Into<String>) -> Stream {
        Stream {
            name: name.into(),
            client: self.clone(),
        }
    }

    /// Names of all streams visible with the current configuration.
    pub async fn list_streams(&self) -> Result<Vec<String>, StreamError> {
        let (_, service) = self.session().await?;
        debug!("Getting stream list");
        service.list_streams().await
    }

    /// Shard ids of a stream, in service order.
    pub async fn list_shards(&self, stream_name: &str) -> Result<Vec<String>, StreamError> {
        self.stream(stream_name).shards().await
    }

    /// One trim-horizon iterator per shard, in shard order.
    pub async fn get_shard_iterators(
        &self,
        stream_name: &str,
    ) -> Result<Vec<ShardIterator>, StreamError> {
        self.stream(stream_name).shard_iterators().await
    }

    /// Write records to a stream in batches of at most 500.
    pub async fn write_to_stream<T: Serialize>(
        &self,
        stream_name: &str,
        records: &[T],
    ) -> Result<WriteReceipt, StreamError> {
        self.stream(stream_name).write(records).await
    }

    /// Fetch up to `limit` records at `iterator`.
    pub async fn read_stream(
        &self,
        stream_name: &str,
        iterator: &ShardIterator,
        limit: u32,
    ) -> Result<ReadResult, StreamError> {
        self.stream(stream_name).read(iterator, limit).await
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring a Client.
#[must_use = "builders do nothing unless you call .build()"]
pub struct ClientBuilder {
    config: Option<Config>,
    service: Option<Arc<dyn StreamService>>,
    partition_keys: Arc<dyn PartitionKeyGenerator>,
}

impl ClientBuilder {
    /// Create a new client builder.
    pub fn new() -> Self {
        Self {
            config: None,
            service: None,
            partition_keys: Arc::new(RandomPartitionKeys),
        }
    }

    /// Set the initial configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Use `service` instead of building a Kinesis client from the configuration.
    pub fn service(mut self, service: Arc<dyn StreamService>) -> Self {
        self.service = Some(service);
        self
    }

    /// Set the partition key source for writes.
    pub fn partition_keys<G>(mut self, generator: G) -> Self
    where
        G: PartitionKeyGenerator + 'static,
    {
        self.partition_keys = Arc::new(generator);
        self
    }

    /// Build the client.
    pub fn build(self) -> Client {
        let source = match self.service {
            Some(service) => ServiceSource::Fixed(service),
            None => ServiceSource::Kinesis,
        };

        Client {
            inner: Arc::new(ClientInner {
                config: RwLock::new(self.config.map(Arc::new)),
                service: Mutex::new(None),
                source,
                partition_keys: self.partition_keys,
            }),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStreamService;

    fn local_config(region: &str) -> Config {
        Config::new(region)
            .endpoint("http://localhost:4566")
            .credentials(crate::Credentials::new("test", "test"))
    }

    #[tokio::test]
    async fn test_uninitialized_client() {
        let client = Client::new();
        assert!(!client.is_initialized());
        assert!(matches!(
            client.ensure_client().await,
            Err(StreamError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_ensure_client_is_idempotent() {
        let client = Client::with_config(local_config("us-east-1"));
        let first = client.ensure_client().await.unwrap();
        let second = client.ensure_client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let clone = client.clone();
        assert!(Arc::ptr_eq(&first, &clone.ensure_client().await.unwrap()));
    }

    #[tokio::test]
    async fn test_init_replaces_config_and_service() {
        let client = Client::with_config(local_config("us-east-1"));
        let before = client.ensure_client().await.unwrap();

        client.init(Config::new("eu-central-1"));
        let config = client.config().unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-central-1"));
        assert!(config.endpoint.is_none(), "re-init must not merge fields");
        assert!(config.credentials.is_none());

        let after = client.ensure_client().await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn test_injected_service_survives_init() {
        let memory: Arc<dyn StreamService> = Arc::new(MemoryStreamService::new());
        let client = Client::builder().service(memory.clone()).build();
        assert!(matches!(
            client.ensure_client().await,
            Err(StreamError::NotInitialized)
        ));

        client.init(Config::default());
        assert!(Arc::ptr_eq(&client.ensure_client().await.unwrap(), &memory));
        client.init(Config::new("us-west-2"));
        assert!(Arc::ptr_eq(&client.ensure_client().await.unwrap(), &memory));
    }
}
