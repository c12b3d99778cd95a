use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::json;

use pulse_api::storage::AggregateQuery;
use pulse_api::util::now_ms;

use crate::AppState;

const HOUR_MS: i64 = 3_600_000;

// --- REST: GET /query?type={health|metrics|aggregated}&hours=N&source=&metric= ---

#[derive(Deserialize)]
pub(crate) struct QueryParams {
    #[serde(rename = "type")]
    query_type: Option<String>,
    hours: Option<i64>,
    source: Option<String>,
    metric: Option<String>,
}

pub(crate) async fn handle_query(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> impl IntoResponse {
    let query_type = params.query_type.as_deref().unwrap_or("metrics");
    let hours = params.hours.unwrap_or(1).max(1);
    // Saturate: an absurd lookback reads the whole store, it never faults.
    let from_ms = now_ms().saturating_sub(hours.saturating_mul(HOUR_MS));
    let query_id = state.next_query_id();

    match query_type {
        "metrics" | "aggregated" => {
            let query = AggregateQuery {
                from_ms,
                source: params.source,
                metric: params.metric,
            };
            match state.store.aggregate(query).await {
                Ok(rows) => {
                    let mut body = json!({ "metrics": rows, "query_id": query_id });
                    if query_type == "aggregated" {
                        body["time_range_hours"] = json!(hours);
                    }
                    axum::Json(body).into_response()
                }
                Err(e) => {
                    state.signals.query_failed();
                    tracing::error!(query_type, error = %e, "query failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        axum::Json(json!({ "error": e.to_string() })),
                    )
                        .into_response()
                }
            }
        }
        "health" => {
            // Connectivity check; a store error reports unhealthy instead
            // of failing the request.
            let body = match state.store.count_since(now_ms() - HOUR_MS).await {
                Ok(n) => json!({
                    "status": "healthy",
                    "recent_records": n,
                    "query_id": query_id,
                }),
                Err(e) => json!({
                    "status": "unhealthy",
                    "error": e.to_string(),
                    "query_id": query_id,
                }),
            };
            axum::Json(body).into_response()
        }
        other => (
            StatusCode::BAD_REQUEST,
            axum::Json(json!({ "error": format!("Unsupported query type: {other}") })),
        )
            .into_response(),
    }
}
