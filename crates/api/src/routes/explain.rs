use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use sched_core::normalize;
use types::{DayOfWeek, SchedulerInput, SlotAssignment};

#[derive(Deserialize, ToSchema)]
pub struct ExplainIn {
    pub input: SchedulerInput,
    pub assignments: Vec<SlotAssignment>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExplainOut {
    pub total: u64,
    pub rows: Vec<ExplainRow>,
    /// Lesson ids whose class or trainer the input does not define.
    pub unscored: Vec<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRow {
    pub lesson_instance_id: String,
    pub day: DayOfWeek,
    /// First period of the lesson block.
    pub period_number: u32,
    pub periods: u32,
    pub overload: u32,
    pub gap: u32,
    pub balance: u32,
    pub total: u32,
}

#[utoipa::path(
    post,
    path = "/v1/explain",
    request_body = ExplainIn,
    responses(
    (status = 200, description = "Soft-penalty breakdown for provided schedule", body = ExplainOut),
    (status = 400, description = "Input failed validation")
    )
)]
pub async fn explain(Json(body): Json<ExplainIn>) -> Result<Json<ExplainOut>, ApiError> {
    let problem = normalize(&body.input).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let ex = solver_heur::explain(&problem, &body.assignments);
    Ok(Json(ExplainOut {
        total: ex.total,
        rows: ex
            .rows
            .into_iter()
            .map(|r| ExplainRow {
                lesson_instance_id: r.lesson_instance_id,
                day: r.day,
                period_number: r.period_number,
                periods: r.periods,
                overload: r.breakdown.overload,
                gap: r.breakdown.gap,
                balance: r.breakdown.balance,
                total: r.total,
            })
            .collect(),
        unscored: ex.unscored,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(max_periods: i32) -> ExplainIn {
        serde_json::from_value(serde_json::json!({
            "input": {
                "maxPeriods": max_periods,
                "classes": [{"id": "c1", "tradeId": "ELEC", "level": 1, "capacity": 20}],
                "trainers": [{"id": "t1", "maxWeeklyPeriods": 10, "tradeIds": ["ELEC"]}]
            },
            "assignments": [{
                "lessonInstanceId": "c1-q1-1", "classId": "c1", "courseId": "q1",
                "trainerId": "t1", "roomId": "r1", "day": "mon", "periodNumber": 1
            }]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn single_row_scores_zero() {
        let Json(out) = explain(Json(body(6))).await.unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].periods, 1);
        assert_eq!(out.total, 0);
        assert!(out.unscored.is_empty());
    }

    #[tokio::test]
    async fn invalid_input_is_a_bad_request() {
        let err = explain(Json(body(0))).await.err();
        assert!(matches!(err, Some(ApiError::BadRequest(_))));
    }
}
