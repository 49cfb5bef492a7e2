use crate::logging::TraceId;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tally_common::types::{Metric, MetricBatch, MetricKind, MetricRecord};
use tally_storage::StorageError;

const PING_DEADLINE: Duration = Duration::from_secs(2);

/// Error body returned by every failing route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub err_code: i32,
    pub err_msg: String,
    pub trace_id: String,
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "payload_too_large" => 1013,
        "storage_error" => 1501,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiError {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
        }),
    )
        .into_response()
}

fn storage_error_response(trace_id: &str, err: &StorageError) -> Response {
    match err {
        StorageError::NotFound { .. } => {
            error_response(StatusCode::NOT_FOUND, trace_id, "not_found", &err.to_string())
        }
        StorageError::Validation(_) => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", &err.to_string())
        }
        _ => {
            tracing::error!(trace_id, error = %err, "Storage failure");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                &err.to_string(),
            )
        }
    }
}

fn bad_request(trace_id: &str, msg: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", msg)
}

/// A JSON extractor failure (bad syntax, unknown `type`, wrong field types)
/// is the client's malformed input. Oversized bodies never get this far.
fn json_rejection(trace_id: &str, rejection: &JsonRejection) -> Response {
    bad_request(trace_id, &rejection.body_text())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/update/{kind}/{id}/{value}", post(update_by_path))
        .route("/update", post(update_record))
        .route("/update/", post(update_record))
        .route("/updates/", post(update_batch))
        .route("/value/{kind}/{id}", get(value_by_path))
        .route("/value", post(value_record))
        .route("/value/", post(value_record))
        .route("/ping", get(ping))
        .route("/metrics", get(list_metrics))
}

async fn store_metric(state: &AppState, metric: &Metric) -> Result<(), StorageError> {
    match metric {
        Metric::Counter { id, delta } => state.metrics.store_counter(id, *delta).await,
        Metric::Gauge { id, value } => state.metrics.store_gauge(id, *value).await,
    }
}

/// Reads the current value back as a record.
async fn current_record(
    state: &AppState,
    kind: MetricKind,
    id: &str,
) -> Result<MetricRecord, StorageError> {
    match kind {
        MetricKind::Counter => Ok(MetricRecord::counter(id, state.metrics.counter(id).await?)),
        MetricKind::Gauge => Ok(MetricRecord::gauge(id, state.metrics.gauge(id).await?)),
    }
}

async fn update_by_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id, value)): Path<(String, String, String)>,
) -> Response {
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return bad_request(&trace_id, &e.to_string()),
    };
    let metric = match kind {
        MetricKind::Counter => match value.parse::<i64>() {
            Ok(delta) => Metric::Counter { id, delta },
            Err(_) => return bad_request(&trace_id, &format!("invalid counter delta '{value}'")),
        },
        MetricKind::Gauge => match value.parse::<f64>() {
            Ok(value) => Metric::Gauge { id, value },
            Err(_) => return bad_request(&trace_id, &format!("invalid gauge value '{value}'")),
        },
    };

    match store_metric(&state, &metric).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

async fn update_record(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    record: Result<Json<MetricRecord>, JsonRejection>,
) -> Response {
    let Json(record) = match record {
        Ok(record) => record,
        Err(e) => return json_rejection(&trace_id, &e),
    };
    let metric = match record.validate() {
        Ok(metric) => metric,
        Err(e) => return bad_request(&trace_id, &e.to_string()),
    };
    if let Err(e) = store_metric(&state, &metric).await {
        return storage_error_response(&trace_id, &e);
    }
    match current_record(&state, metric.kind(), metric.id()).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

async fn update_batch(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    batch: Result<Json<MetricBatch>, JsonRejection>,
) -> Response {
    let Json(batch) = match batch {
        Ok(batch) => batch,
        Err(e) => return json_rejection(&trace_id, &e),
    };
    match state.metrics.store_all(&batch).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

async fn value_by_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let kind: MetricKind = match kind.parse() {
        Ok(kind) => kind,
        Err(e) => return bad_request(&trace_id, &e.to_string()),
    };
    let text = match kind {
        MetricKind::Counter => state.metrics.counter(&id).await.map(|d| d.to_string()),
        MetricKind::Gauge => state.metrics.gauge(&id).await.map(|v| v.to_string()),
    };
    match text {
        Ok(text) => text.into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

#[derive(Debug, Deserialize)]
struct ValueRequest {
    id: String,
    #[serde(rename = "type")]
    kind: MetricKind,
}

async fn value_record(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    req: Result<Json<ValueRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match req {
        Ok(req) => req,
        Err(e) => return json_rejection(&trace_id, &e),
    };
    match current_record(&state, req.kind, &req.id).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

async fn ping(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> Response {
    match state.metrics.ping(PING_DEADLINE).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => storage_error_response(&trace_id, &e),
    }
}

/// Every stored value, sorted by id.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsListing {
    pub counters: BTreeMap<String, i64>,
    pub gauges: BTreeMap<String, f64>,
}

async fn list_metrics(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> Response {
    let counters = match state.metrics.all_counters().await {
        Ok(counters) => counters,
        Err(e) => return storage_error_response(&trace_id, &e),
    };
    let gauges = match state.metrics.all_gauges().await {
        Ok(gauges) => gauges,
        Err(e) => return storage_error_response(&trace_id, &e),
    };
    Json(MetricsListing {
        counters: counters.into_iter().collect(),
        gauges: gauges.into_iter().collect(),
    })
    .into_response()
}
