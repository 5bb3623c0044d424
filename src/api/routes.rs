//! Router and handlers.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::jobs::{CancelOutcome, JobError, JobManager};
use super::types::{HealthResponse, ResearchJob, ResearchRequest, ReviseRequest, StatusResponse};
use crate::config::Config;
use crate::llm::OpenAiCompatClient;
use crate::research::{ProgressEvent, ResearchResult};
use crate::search::SearxngClient;

type ApiError = (StatusCode, String);

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let llm = Arc::new(OpenAiCompatClient::new(config.llm.clone())?);
    let search = Arc::new(SearxngClient::new(config.searx_url.clone())?);
    let manager = Arc::new(JobManager::new(llm, search));

    tracing::info!("LM endpoint: {}", config.llm.base_url);
    tracing::info!("SearXNG endpoint: {}", config.searx_url);

    let app = router(Arc::clone(&manager))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(manager).await;
        })
        .await?;

    Ok(())
}

pub fn router(manager: Arc<JobManager>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/research", post(start_research))
        .route("/api/approve", post(approve))
        .route("/api/revise", post(revise))
        .route("/api/cancel", post(cancel))
        .route("/api/status", get(status))
        .route("/api/results", get(results))
        .route("/api/progress", get(progress))
        .with_state(manager)
}

/// Wait for SIGINT/SIGTERM and cancel the running job.
async fn shutdown_signal(manager: Arc<JobManager>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, cancelling running research");
    manager.cancel_all().await;
}

fn job_error(e: JobError) -> ApiError {
    let code = match e {
        JobError::Busy => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };
    (code, e.to_string())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn start_research(
    State(manager): State<Arc<JobManager>>,
    body: Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<ResearchJob>, ApiError> {
    let Json(request) = body.map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)))?;
    manager.start(request).await.map(Json).map_err(job_error)
}

async fn approve(State(manager): State<Arc<JobManager>>) -> Result<Json<StatusResponse>, ApiError> {
    manager.approve().await.map_err(job_error)?;
    Ok(Json(StatusResponse { status: "running" }))
}

async fn revise(
    State(manager): State<Arc<JobManager>>,
    body: Result<Json<ReviseRequest>, JsonRejection>,
) -> Result<Json<ResearchJob>, ApiError> {
    let Json(request) = body.map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", e)))?;
    manager.revise(&request.feedback).await.map(Json).map_err(job_error)
}

async fn cancel(State(manager): State<Arc<JobManager>>) -> Result<Json<StatusResponse>, ApiError> {
    let status = match manager.cancel().await.map_err(job_error)? {
        CancelOutcome::Cancelling => "cancelling",
        CancelOutcome::Discarded => "cancelled",
    };
    Ok(Json(StatusResponse { status }))
}

async fn status(State(manager): State<Arc<JobManager>>) -> Json<ResearchJob> {
    Json(manager.snapshot().await)
}

async fn results(State(manager): State<Arc<JobManager>>) -> Result<Json<ResearchResult>, ApiError> {
    manager
        .snapshot()
        .await
        .result
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "No results available".to_string()))
}

/// SSE stream of progress events.
///
/// Sends the latest event first, then live events until a terminal one.
async fn progress(
    State(manager): State<Arc<JobManager>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let sink = manager.progress().clone();
    let mut rx = sink.subscribe();
    let initial = sink.latest();

    let stream = async_stream::stream! {
        if let Some(event) = initial {
            yield Ok(progress_event(&event));
        }

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let done = event.phase.is_terminal();
                    yield Ok(progress_event(&event));
                    if done {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Progress stream lagged, {} events dropped", skipped);
                    // the latest event is never lost
                    if let Some(event) = sink.latest() {
                        let done = event.phase.is_terminal();
                        yield Ok(progress_event(&event));
                        if done {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    )
}

fn progress_event(event: &ProgressEvent) -> Event {
    Event::default()
        .event("progress")
        .json_data(event)
        .unwrap_or_else(|_| Event::default().comment("unserializable progress event"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::types::JobStatus;
    use crate::testing::{ScriptedLlm, ScriptedSearch};

    fn manager() -> Arc<JobManager> {
        let llm = Arc::new(ScriptedLlm::from_fn(|_| {
            Ok(r#"{"understanding_summary": "s", "search_queries": ["q"]}"#.to_string())
        }));
        Arc::new(JobManager::new(llm, Arc::new(ScriptedSearch::new())))
    }

    fn request(topic: &str) -> Json<ResearchRequest> {
        Json(ResearchRequest {
            topic: topic.to_string(),
            ..ResearchRequest::default()
        })
    }

    #[tokio::test]
    async fn lifecycle_errors_map_to_status_codes() {
        let manager = manager();

        let err = cancel(State(manager.clone())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        let err = approve(State(manager.clone())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        let err = results(State(manager.clone())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);

        let err = start_research(State(manager.clone()), Ok(request(""))).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);

        let Json(job) = start_research(State(manager.clone()), Ok(request("flats")))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::AwaitingApproval);
        let err = start_research(State(manager.clone()), Ok(request("flats")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);

        let Json(resp) = cancel(State(manager)).await.unwrap();
        assert_eq!(resp.status, "cancelled");
    }

    #[tokio::test]
    async fn status_reports_idle_before_any_job() {
        let Json(job) = status(State(manager())).await;
        assert_eq!(job.status, JobStatus::Idle);
        assert!(job.progress.is_none());
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["status"], "idle");
        assert!(json.get("startedAt").is_none());
    }
}
