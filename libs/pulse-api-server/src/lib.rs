use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;

use pulse_api::ingest::LogProducer;
use pulse_api::storage::MeasureStore;
use pulse_engine::signals::PipelineSignals;

mod ingest;
mod query;

/// Shared handler state: the log's producer side, the measure store's read
/// side, and the pipeline signal counters.
#[derive(Clone)]
pub struct AppState {
    producer: Arc<dyn LogProducer>,
    store: Arc<dyn MeasureStore>,
    signals: Arc<PipelineSignals>,
    query_seq: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(
        producer: Arc<dyn LogProducer>,
        store: Arc<dyn MeasureStore>,
        signals: Arc<PipelineSignals>,
    ) -> Self {
        Self {
            producer,
            store,
            signals,
            query_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Monotonic per-process query id, echoed back in every query response.
    fn next_query_id(&self) -> String {
        format!("q-{}", self.query_seq.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Query + ingest HTTP server.
pub async fn run(
    port: u16,
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), String> {
    let app = Router::new()
        .route("/query", get(query::handle_query))
        .route("/ingest", post(ingest::handle_ingest))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|e| format!("bind api :{port}: {e}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| format!("axum serve: {e}"))?;

    Ok(())
}
