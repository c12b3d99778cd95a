use clap::Parser;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "pulse-server", about = "Pulse telemetry pipeline server")]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, default_value = "config.toml", env = "PULSE_CONFIG")]
    config: String,
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

    tracing::info!(config = %cli.config, "loading configuration");
    let config = match pulse_engine::config::PulseConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    let api_port = config.api_port;

    tracing::info!(
        shards = config.shards,
        alarms = config.alarms.len(),
        "bootstrapping engine"
    );
    let engine = match pulse_engine::bootstrap::Engine::bootstrap(config).await {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "failed to bootstrap engine");
            std::process::exit(1);
        }
    };

    let token = CancellationToken::new();
    let state = pulse_api_server::AppState::new(
        engine.log(),
        engine.measure_store(),
        engine.signals(),
    );
    let api_token = token.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = pulse_api_server::run(api_port, state, api_token).await {
            tracing::error!(error = %e, "api server error");
        }
    });

    // Alarm transitions are worth a log line even with no responder wired.
    let mut alarm_events = engine.subscribe_alarms();
    let alarm_token = token.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = alarm_events.recv() => match event {
                    Ok(e) => tracing::warn!(metric = %e.metric, state = ?e.state, "alarm"),
                    Err(_) => break,
                },
                _ = alarm_token.cancelled() => break,
            }
        }
    });

    tracing::info!(port = api_port, "api server listening");
    tracing::info!("pulse-server started, press Ctrl+C to stop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "signal handler failed");
    }
    tracing::info!("shutting down...");

    token.cancel();
    let _ = api_handle.await;
    engine.shutdown().await;
}
