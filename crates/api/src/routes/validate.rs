use axum::Json;
use sched_core::normalize;
use serde::Serialize;
use types::SchedulerInput;

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    /// Lesson units the input asks for, locked ones included.
    pub total_lessons: u32,
}

#[utoipa::path(
    post,
    path = "/v1/validate",
    request_body = SchedulerInput,
    responses(
    (status = 200, description = "Validation result", body = ValidationReport)
    )
)]
pub async fn validate_handler(Json(input): Json<SchedulerInput>) -> Json<ValidationReport> {
    Json(match normalize(&input) {
        Ok(problem) => ValidationReport {
            ok: true,
            errors: vec![],
            total_lessons: problem.total_units(),
        },
        Err(e) => ValidationReport {
            ok: false,
            errors: e.issues().iter().map(ToString::to_string).collect(),
            total_lessons: 0,
        },
    })
}
