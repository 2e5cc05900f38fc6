//! HTTP host for the worker.
//!
//! Stands in for a job-delivery framework: jobs arrive as JSON on `/run`
//! (or `/runsync`) and the envelope comes back as the response body. The
//! admission recommendation sizes a semaphore so at most that many jobs run
//! at once; later jobs wait for a permit. On shutdown the semaphore is
//! closed and jobs still waiting get a failure envelope.

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use voxroute_core::admission::{AdmissionPolicy, ConcurrencyAdvice};
use voxroute_core::error::WorkerError;
use voxroute_core::types::{Device, RegistryMode, ResponseEnvelope};

use crate::dispatcher::RequestDispatcher;
use crate::worker::Worker;

pub struct AppState {
    dispatcher: RequestDispatcher,
    admission: AdmissionPolicy,
    permits: Semaphore,
}

impl AppState {
    pub fn new(worker: Worker) -> Self {
        let permits = worker.admission.recommend_concurrency(0);
        Self {
            dispatcher: worker.dispatcher,
            admission: worker.admission,
            permits: Semaphore::new(permits),
        }
    }

    /// Stop admitting jobs. Jobs waiting for a permit are refused.
    pub fn close(&self) {
        self.permits.close();
    }
}

/// Build the axum router around a loaded worker.
pub fn router(worker: Worker) -> Router {
    routes(Arc::new(AppState::new(worker)))
}

/// Serve until `shutdown` resolves, then refuse queued jobs and drain.
pub async fn serve(
    listener: TcpListener,
    worker: Worker,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    let state = Arc::new(AppState::new(worker));
    let app = routes(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            info!("shutting down");
            state.close();
        })
        .await
}

fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/run", post(run))
        .route("/runsync", post(run))
        .route("/health", get(health))
        .route("/concurrency", get(concurrency))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn run(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> (StatusCode, Json<ResponseEnvelope>) {
    let job: Value = match serde_json::from_slice(&body) {
        Ok(job) => job,
        Err(e) => {
            let err = WorkerError::Validation(format!("invalid job payload: {e}"));
            return (StatusCode::BAD_REQUEST, Json(ResponseEnvelope::failure(&err)));
        }
    };

    let _permit = match state.permits.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            let err = WorkerError::internal("worker is shutting down");
            return (StatusCode::SERVICE_UNAVAILABLE, Json(ResponseEnvelope::failure(&err)));
        }
    };
    debug!(available = state.permits.available_permits(), "job admitted");

    (StatusCode::OK, Json(state.dispatcher.handle(&job).await))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    mode: RegistryMode,
    device: Device,
    default_language: String,
    languages: Vec<String>,
    models: Vec<String>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.dispatcher.service().registry();
    Json(HealthResponse {
        status: "ready",
        mode: registry.mode(),
        device: registry.device(),
        default_language: state.dispatcher.default_language().to_string(),
        languages: registry.languages().into_iter().map(String::from).collect(),
        models: registry
            .handles()
            .into_iter()
            .map(|h| h.model_id().to_string())
            .collect(),
    })
}

#[derive(Deserialize)]
struct ConcurrencyQuery {
    #[serde(default)]
    current: usize,
}

async fn concurrency(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ConcurrencyQuery>,
) -> Json<ConcurrencyAdvice> {
    Json(ConcurrencyAdvice {
        current: q.current,
        recommended: state.admission.recommend_concurrency(q.current),
    })
}
