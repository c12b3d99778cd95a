use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use crate::AppState;

// --- REST: POST /ingest?partition=K ---

#[derive(Deserialize)]
pub(crate) struct IngestParams {
    partition: Option<String>,
}

/// Partition key: explicit query param wins, else the payload's `source`
/// field, else a shared default. The payload itself is stored verbatim.
fn partition_key(params: &IngestParams, body: &[u8]) -> String {
    if let Some(p) = &params.partition {
        return p.clone();
    }
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(source) = value.get("source").and_then(|s| s.as_str()) {
            return source.to_string();
        }
    }
    "default".to_string()
}

pub(crate) async fn handle_ingest(
    State(state): State<AppState>,
    Query(params): Query<IngestParams>,
    body: Bytes,
) -> impl IntoResponse {
    let key = partition_key(&params, &body);
    match state.producer.append(&key, body.to_vec()).await {
        Ok((shard, sequence)) => {
            tracing::debug!(partition = %key, shard, sequence, "record ingested");
            axum::Json(json!({ "shard": shard, "sequence": sequence })).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
