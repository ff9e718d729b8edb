use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use jobs::JobStatus;
use types::SchedulerResult;

#[utoipa::path(
        get,
        path = "/v1/jobs/{id}",
        params(("id" = String, Path, description = "Job ID")),
        responses(
            (status = 200, description = "Job status", body = JobStatus),
            (status = 404, description = "Unknown job")
        )
    )]
pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobStatus>, ApiError> {
    state
        .jobs
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("job {id} not found")))
}

#[utoipa::path(
        get,
        path = "/v1/jobs/{id}/result",
        params(("id" = String, Path, description = "Job ID")),
        responses(
            (status = 200, description = "Timetable of a completed run", body = SchedulerResult),
            (status = 404, description = "Unknown job or no result yet")
        )
    )]
pub async fn result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SchedulerResult>, ApiError> {
    match state.jobs.get(&id) {
        Some(JobStatus::Completed { result }) => Ok(Json(result)),
        Some(_) => Err(ApiError::NotFound(format!("job {id} has no result"))),
        None => Err(ApiError::NotFound(format!("job {id} not found"))),
    }
}
