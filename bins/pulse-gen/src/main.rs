mod domain;

use std::time::Duration;

use clap::Parser;

use domain::{Rng, sample};

#[derive(Parser)]
#[command(name = "pulse-gen", about = "Sample telemetry generator for the pulse pipeline")]
struct Cli {
    /// Pipeline API base URL.
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "PULSE_ENDPOINT")]
    endpoint: String,

    /// Number of records to send.
    #[arg(long, default_value_t = 10)]
    count: u64,

    /// Interval between sends, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    interval: u64,

    /// RNG seed; 0 seeds from the clock.
    #[arg(long, default_value_t = 0)]
    seed: i64,

    /// Number of distinct sensor sources.
    #[arg(long, default_value_t = 10)]
    sources: usize,

    /// Make every Nth record carry a non-numeric metric (0 = never);
    /// exercises the quarantine path.
    #[arg(long, default_value_t = 0)]
    malformed_every: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut rng = Rng::new(cli.seed);
    let client = reqwest::Client::new();
    let url = format!("{}/ingest", cli.endpoint.trim_end_matches('/'));

    tracing::info!(count = cli.count, endpoint = %url, "sending test records");

    let mut sent = 0u64;
    for i in 0..cli.count {
        let malformed = cli.malformed_every > 0 && (i + 1) % cli.malformed_every == 0;
        let record = sample(&mut rng, cli.sources, malformed);

        match client.post(&url).json(&record).send().await {
            Ok(resp) if resp.status().is_success() => {
                let position: serde_json::Value = resp.json().await.unwrap_or_default();
                tracing::info!(
                    n = i + 1,
                    shard = position["shard"].as_u64().unwrap_or_default(),
                    sequence = position["sequence"].as_u64().unwrap_or_default(),
                    "record sent"
                );
                sent += 1;
            }
            Ok(resp) => {
                tracing::error!(n = i + 1, status = %resp.status(), "ingest rejected");
            }
            Err(e) => {
                tracing::error!(n = i + 1, error = %e, "send failed");
            }
        }

        if i + 1 < cli.count {
            tokio::time::sleep(Duration::from_millis(cli.interval)).await;
        }
    }

    tracing::info!(sent, total = cli.count, "done");
    if sent < cli.count {
        std::process::exit(1);
    }
}
