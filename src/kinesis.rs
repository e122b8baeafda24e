//! Kinesis backend on the AWS SDK.

use crate::codec;
use crate::config::{Config, DEFAULT_REGION};
use crate::error::StreamError;
use crate::service::StreamService;
use crate::types::{
    PutRecordsEntry, PutRecordsOutput, ReadResult, Record, Shard, ShardIterator,
    StreamDescription,
};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::timeout::TimeoutConfig;
use aws_config::BehaviorVersion;
use aws_sdk_kinesis::config::http::HttpResponse;
use aws_sdk_kinesis::config::{Credentials as SdkCredentials, Region};
use aws_sdk_kinesis::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::{PutRecordsRequestEntry, ShardIteratorType};
use tracing::debug;

/// Provider name reported for credentials taken from [`Config`].
const STATIC_CREDENTIALS: &str = "kinesis-streams-config";

/// A [`StreamService`] backed by `aws-sdk-kinesis`.
///
/// Cloneable; clones share the SDK client and its connection pool.
#[derive(Clone)]
pub struct KinesisStreamService {
    inner: aws_sdk_kinesis::Client,
}

impl std::fmt::Debug for KinesisStreamService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let conf = self.inner.config();
        f.debug_struct("KinesisStreamService")
            .field("region", &conf.region())
            .finish()
    }
}

impl KinesisStreamService {
    /// Resolve region, credentials and endpoint through `aws-config`.
    ///
    /// Values set on `config` win over the default chains. The region falls
    /// back to [`DEFAULT_REGION`] when no chain provides one. No request is
    /// made to the stream service here.
    pub async fn from_config(config: &Config) -> Self {
        let region = RegionProviderChain::first_try(config.region.clone().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.trim_end_matches('/'));
        }
        if let Some(credentials) = &config.credentials {
            loader = loader.credentials_provider(SdkCredentials::new(
                credentials.access_key_id.clone(),
                credentials.secret_access_key.clone(),
                credentials.session_token.clone(),
                None,
                STATIC_CREDENTIALS,
            ));
        }
        if let Some(timeout) = config.timeout {
            loader = loader.timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build());
        }

        let sdk_config = loader.load().await;
        debug!(
            region = ?sdk_config.region(),
            endpoint = ?sdk_config.endpoint_url(),
            "Loaded AWS configuration"
        );

        Self::new(aws_sdk_kinesis::Client::new(&sdk_config))
    }

    /// Wrap an already configured SDK client.
    pub fn new(client: aws_sdk_kinesis::Client) -> Self {
        Self { inner: client }
    }

    /// The underlying SDK client.
    pub fn sdk_client(&self) -> &aws_sdk_kinesis::Client {
        &self.inner
    }
}

#[async_trait]
impl StreamService for KinesisStreamService {
    async fn list_streams(&self) -> Result<Vec<String>, StreamError> {
        let mut names = Vec::new();
        let mut start: Option<String> = None;

        loop {
            let output = self
                .inner
                .list_streams()
                .set_exclusive_start_stream_name(start.take())
                .send()
                .await
                .map_err(service_error)?;

            let page = output.stream_names();
            start = page.last().cloned();
            names.extend_from_slice(page);
            debug!(page = page.len(), total = names.len(), "Listed streams");

            if !output.has_more_streams() || start.is_none() {
                return Ok(names);
            }
        }
    }

    async fn describe_stream(&self, stream_name: &str) -> Result<StreamDescription, StreamError> {
        let mut shards = Vec::new();
        let mut start: Option<String> = None;

        loop {
            let output = self
                .inner
                .describe_stream()
                .stream_name(stream_name)
                .set_exclusive_start_shard_id(start.take())
                .send()
                .await
                .map_err(service_error)?;

            let description = output
                .stream_description()
                .ok_or_else(|| missing(stream_name, "StreamDescription"))?;

            start = description.shards().last().map(|s| s.shard_id().to_string());
            shards.extend(description.shards().iter().map(|s| Shard {
                shard_id: s.shard_id().to_string(),
            }));

            if !description.has_more_shards() || start.is_none() {
                return Ok(StreamDescription {
                    stream_name: description.stream_name().to_string(),
                    status: description.stream_status().as_str().to_string(),
                    shards,
                });
            }
        }
    }

    async fn get_shard_iterator(
        &self,
        stream_name: &str,
        shard_id: &str,
    ) -> Result<ShardIterator, StreamError> {
        let output = self
            .inner
            .get_shard_iterator()
            .stream_name(stream_name)
            .shard_id(shard_id)
            .shard_iterator_type(ShardIteratorType::TrimHorizon)
            .send()
            .await
            .map_err(service_error)?;

        output
            .shard_iterator()
            .map(ShardIterator::from)
            .ok_or_else(|| missing(stream_name, "ShardIterator"))
    }

    async fn put_records(
        &self,
        stream_name: &str,
        records: Vec<PutRecordsEntry>,
    ) -> Result<PutRecordsOutput, StreamError> {
        let entries = records
            .into_iter()
            .map(|record| {
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(record.data.to_vec()))
                    .partition_key(record.partition_key)
                    .build()
                    .map_err(|e| StreamError::InvalidRequest {
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .inner
            .put_records()
            .stream_name(stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(service_error)?;

        Ok(PutRecordsOutput {
            failed_record_count: output.failed_record_count().unwrap_or(0).max(0) as u64,
        })
    }

    async fn get_records(
        &self,
        iterator: &ShardIterator,
        limit: u32,
    ) -> Result<ReadResult, StreamError> {
        let limit = i32::try_from(limit).map_err(|_| StreamError::InvalidLimit(limit))?;

        let output = self
            .inner
            .get_records()
            .shard_iterator(iterator.as_str())
            .limit(limit)
            .send()
            .await
            .map_err(service_error)?;

        let records = output
            .records()
            .iter()
            .map(|r| Record {
                approximate_arrival_timestamp: r
                    .approximate_arrival_timestamp()
                    .map(|t| t.as_secs_f64()),
                ..Record::new(
                    r.sequence_number(),
                    codec::encode_payload(r.data().as_ref()),
                    r.partition_key().unwrap_or_default(),
                )
            })
            .collect();

        Ok(ReadResult::new(
            records,
            output.next_shard_iterator().map(ShardIterator::from),
            output.millis_behind_latest().unwrap_or(0).max(0) as u64,
        ))
    }
}

/// Map an SDK failure onto [`StreamError`] by service error code.
fn service_error<E>(err: SdkError<E, HttpResponse>) -> StreamError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    match &err {
        SdkError::TimeoutError(_) => StreamError::Timeout,
        SdkError::DispatchFailure(failure) if failure.is_timeout() => StreamError::Timeout,
        SdkError::ServiceError(context) => StreamError::from_service(
            context.raw().status().as_u16(),
            err.code().unwrap_or("UnknownError"),
            err.message().unwrap_or_default(),
        ),
        _ => StreamError::Network {
            message: DisplayErrorContext(&err).to_string(),
        },
    }
}

fn missing(stream_name: &str, field: &str) -> StreamError {
    StreamError::Service {
        status: 200,
        code: "MissingField".to_string(),
        message: format!("{field} missing from response for stream {stream_name}"),
    }
}
