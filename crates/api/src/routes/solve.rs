use crate::state::AppState;
use axum::{extract::State, Json};
use types::SchedulerInput;
use utoipa::ToSchema;

#[derive(serde::Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobCreated {
    pub job_id: String,
    pub status: &'static str,
}

#[utoipa::path(
        post,
        path = "/v1/solve",
        request_body = SchedulerInput,
        responses((status = 200, description = "Generation run enqueued", body = JobCreated))
    )]
pub async fn solve(
    State(state): State<AppState>,
    Json(input): Json<SchedulerInput>,
) -> Json<JobCreated> {
    let id = state.jobs.enqueue(input);
    Json(JobCreated {
        job_id: id.0,
        status: "queued",
    })
}
