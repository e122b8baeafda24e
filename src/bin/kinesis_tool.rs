//! Command line tool for the Kinesis stream client.
//!
//! Lists streams and shards, writes JSON records and reads every shard of a
//! stream, printing each record's sequence number and decoded payload.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kinesis_streams::{BatchSubmit, Client, Config, ReadMode};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kinesis-tool")]
#[command(about = "Kinesis stream command-line tool", long_about = None)]
struct Cli {
    /// Region of the stream service
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Endpoint override (LocalStack, kinesalite)
    #[arg(long, env = "KINESIS_ENDPOINT")]
    endpoint: Option<String>,

    /// Submit up to N write batches at once instead of one by one
    #[arg(long)]
    concurrent_batches: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stream names
    ListStreams,
    /// List the shard ids of a stream
    Shards {
        /// Stream name
        stream: String,
    },
    /// Write one record per JSON argument
    Put {
        /// Stream name
        stream: String,
        /// Records as JSON values
        #[arg(required = true)]
        records: Vec<String>,
    },
    /// Read every shard from the trim horizon
    Read {
        /// Stream name
        stream: String,
        /// Records per read
        #[arg(short, long, default_value_t = 2)]
        limit: u32,
        /// Keep polling after catching up (stop with Ctrl-C)
        #[arg(short, long)]
        follow: bool,
        /// Pause between polls of a caught-up shard, in milliseconds
        #[arg(long, default_value_t = 1000)]
        idle_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(region) = cli.region {
        config = config.region(region);
    }
    if let Some(endpoint) = cli.endpoint {
        config = config.endpoint(endpoint);
    }
    if let Some(max_in_flight) = cli.concurrent_batches {
        config = config.batch_submit(BatchSubmit::Concurrent { max_in_flight });
    }

    let client = Client::with_config(config);

    match cli.command {
        Commands::ListStreams => {
            let streams = client.list_streams().await.context("Failed to list streams")?;
            println!("{}", serde_json::to_string_pretty(&streams)?);
        }
        Commands::Shards { stream } => {
            let shards = client
                .list_shards(&stream)
                .await
                .with_context(|| format!("Failed to list shards of {stream}"))?;
            for shard in shards {
                println!("{shard}");
            }
        }
        Commands::Put { stream, records } => handle_put(&client, &stream, &records).await?,
        Commands::Read {
            stream,
            limit,
            follow,
            idle_ms,
        } => handle_read(&client, &stream, limit, follow, Duration::from_millis(idle_ms)).await?,
    }

    Ok(())
}

async fn handle_put(client: &Client, stream: &str, records: &[String]) -> Result<()> {
    let values = records
        .iter()
        .map(|r| serde_json::from_str::<serde_json::Value>(r))
        .collect::<Result<Vec<_>, _>>()
        .context("Records must be valid JSON")?;

    let receipt = client
        .write_to_stream(stream, &values)
        .await
        .with_context(|| format!("Failed to write to {stream}"))?;

    info!(
        stream,
        records = receipt.records,
        batches = receipt.batches,
        "Wrote records"
    );
    Ok(())
}

async fn handle_read(
    client: &Client,
    stream: &str,
    limit: u32,
    follow: bool,
    idle_interval: Duration,
) -> Result<()> {
    let mode = if follow { ReadMode::Follow } else { ReadMode::CatchUp };
    let mut consumer = client
        .stream(stream)
        .consumer()
        .batch_size(limit)
        .mode(mode)
        .idle_interval(idle_interval)
        .start()
        .await
        .with_context(|| format!("Failed to start reading {stream}"))?;

    info!(stream, shards = consumer.shard_ids().len(), "Reading stream");

    loop {
        let item = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            item = consumer.next() => item,
        };
        let Some(item) = item else { break };

        match item {
            Ok(batch) => {
                for record in &batch.records {
                    info!(shard_id = %batch.shard_id, "Sequence Number: {}", record.sequence_number);
                    match record.decode() {
                        Ok(data) => info!(shard_id = %batch.shard_id, "Record Data: {data}"),
                        Err(e) => error!(shard_id = %batch.shard_id, error = %e, "Undecodable record"),
                    }
                }
            }
            Err(e) => error!(error = %e, code = e.error_code(), "Shard read failed"),
        }
    }

    consumer.stop().await;
    Ok(())
}
