//! Job HTTP route handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use tickwork_runloop::JobStatus;
use tickwork_schedule::presets;
use tickwork_store::{ScheduleDescriptor, StoredJob};

use crate::error::ApiError;
use crate::state::AppState;

/// Handler and job name used by `start-recurring-job`.
const LOG_MESSAGE: &str = "LogMessage";

/// Body of `POST /api/job/schedule-job`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobRequest {
    pub job_name: String,
    pub method_name: String,
    pub cron_expression: Option<String>,
    /// Handler input. A JSON string literal is unwrapped, anything else is
    /// stored as sent.
    pub job_input: Option<String>,
}

impl JobRequest {
    fn payload(&self) -> Vec<u8> {
        match self.job_input.as_deref() {
            None => Vec::new(),
            Some(raw) => match serde_json::from_str::<String>(raw) {
                Ok(decoded) => decoded.into_bytes(),
                Err(_) => raw.as_bytes().to_vec(),
            },
        }
    }
}

/// Response for listing jobs.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub count: usize,
    pub jobs: Vec<StoredJob>,
}

/// Build the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let job_routes = Router::new()
        .route("/start-recurring-job", post(start_recurring_job))
        .route("/schedule-job", post(schedule_job));

    let jobs_routes = Router::new()
        .route("/", get(list_jobs))
        .route("/{name}", get(get_job).delete(delete_job));

    Router::new()
        .nest("/api/job", job_routes)
        .nest("/api/jobs", jobs_routes)
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Schedule `LogMessage` every minute.
///
/// POST /api/job/start-recurring-job
pub async fn start_recurring_job(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, ApiError> {
    state
        .scheduler
        .register_job(
            LOG_MESSAGE,
            LOG_MESSAGE,
            ScheduleDescriptor::recurring(presets::EVERY_MINUTE),
            Vec::new(),
        )
        .await?;
    Ok("Recurring job scheduled successfully")
}

/// Schedule a registered handler on a cron expression.
///
/// POST /api/job/schedule-job
pub async fn schedule_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JobRequest>,
) -> Result<String, ApiError> {
    let cron = match request.cron_expression.as_deref() {
        Some(cron) if !cron.is_empty() => cron.to_string(),
        _ => return Err(ApiError::BadRequest("Cron expression is required.".to_string())),
    };
    if request.job_name.is_empty() {
        return Err(ApiError::BadRequest("Job name is required.".to_string()));
    }

    info!(
        "Scheduling job {} ({}) with cron {}",
        request.job_name, request.method_name, cron
    );
    state
        .scheduler
        .register_job(
            &request.job_name,
            &request.method_name,
            ScheduleDescriptor::recurring(&cron),
            request.payload(),
        )
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Internal(message) => {
                error!("Failed to schedule job {}: {}", request.job_name, message);
                ApiError::Internal(format!("Error scheduling job: {}", message))
            }
            other => other,
        })?;

    Ok(format!(
        "Job '{}' scheduled successfully with the cron expression '{}'.",
        request.job_name, cron
    ))
}

/// List all jobs.
///
/// GET /api/jobs
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JobListResponse>, ApiError> {
    let jobs = state.scheduler.list_jobs().await?;
    Ok(Json(JobListResponse {
        count: jobs.len(),
        jobs,
    }))
}

/// Definition, lease, upcoming due times and recent runs of one job.
///
/// GET /api/jobs/{name}
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    Ok(Json(state.scheduler.job_status(&name).await?))
}

/// Delete a job with its history.
///
/// DELETE /api/jobs/{name}
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.scheduler.remove_job(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.scheduler.stats().await;
    let workers = stats.map(|s| {
        serde_json::json!({
            "processed": s.processed,
            "succeeded": s.succeeded,
            "failed": s.failed,
            "timed_out": s.timed_out,
        })
    });

    Json(serde_json::json!({
        "status": if stats.is_some() { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.uptime_seconds(),
        "scheduler_running": stats.is_some(),
        "workers": workers,
    }))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
