use parking_lot::RwLock;
use sched_core::{Solver, ValidationError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use types::{SchedulerInput, SchedulerResult};
use utoipa::ToSchema;
use uuid::Uuid;

/// Identifier of one generation run; callers tag persisted rows with it.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct JobId(pub String);

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, ToSchema)]
#[serde(tag = "status")]
pub enum JobStatus {
    Queued,
    Running,
    Completed { result: SchedulerResult },
    /// Input failed validation; no timetable was produced.
    Rejected { issues: Vec<String> },
    Failed { message: String },
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

fn finished(outcome: anyhow::Result<SchedulerResult>) -> JobStatus {
    match outcome {
        Ok(result) => JobStatus::Completed { result },
        Err(e) => match e.downcast_ref::<ValidationError>() {
            Some(v) => {
                warn!(issues = v.issues().len(), "input rejected");
                JobStatus::Rejected {
                    issues: v.issues().iter().map(ToString::to_string).collect(),
                }
            }
            None => {
                error!(?e, "job failed");
                JobStatus::Failed {
                    message: e.to_string(),
                }
            }
        },
    }
}

#[derive(Clone)]
pub struct InMemJobs<S: Solver> {
    inner: Arc<RwLock<HashMap<String, JobStatus>>>,
    solver: Arc<S>,
}

impl<S: Solver> InMemJobs<S> {
    pub fn new(solver: S) -> Self {
        Self {
            inner: Default::default(),
            solver: Arc::new(solver),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, input: SchedulerInput) -> JobId {
        let id = Uuid::new_v4().to_string();
        self.inner.write().insert(id.clone(), JobStatus::Queued);

        let map = self.inner.clone();
        let solver = self.solver.clone();
        let id_for_task = id.clone();

        tokio::spawn(async move {
            map.write().insert(id_for_task.clone(), JobStatus::Running);
            let status = finished(solver.solve(input).await);
            info!(job = %id_for_task, finished = status.is_finished(), "job settled");
            map.write().insert(id_for_task, status);
        });

        JobId(id)
    }

    pub fn get(&self, id: &str) -> Option<JobStatus> {
        self.inner.read().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sched_core::ValidationIssue;

    struct Fixed(u32);

    #[async_trait]
    impl Solver for Fixed {
        async fn solve(&self, _input: SchedulerInput) -> anyhow::Result<SchedulerResult> {
            Ok(SchedulerResult {
                assignments: vec![],
                total_lessons: self.0,
                placed_lessons: self.0,
                failed_lessons: 0,
                global_penalty_score: 0,
                conflicts: vec![],
                stats: serde_json::json!({}),
            })
        }
    }

    struct Invalid;

    #[async_trait]
    impl Solver for Invalid {
        async fn solve(&self, _input: SchedulerInput) -> anyhow::Result<SchedulerResult> {
            Err(ValidationError::Invalid(vec![ValidationIssue::NonPositiveMaxPeriods(0)]).into())
        }
    }

    struct Broken;

    #[async_trait]
    impl Solver for Broken {
        async fn solve(&self, _input: SchedulerInput) -> anyhow::Result<SchedulerResult> {
            anyhow::bail!("grid corrupted")
        }
    }

    fn input() -> SchedulerInput {
        serde_json::from_value(serde_json::json!({ "maxPeriods": 6 })).unwrap()
    }

    async fn settle<S: Solver>(jobs: &InMemJobs<S>, id: &JobId) -> JobStatus {
        loop {
            if let Some(status) = jobs.get(&id.0) {
                if status.is_finished() {
                    return status;
                }
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn completed_job_carries_result() {
        let jobs = InMemJobs::new(Fixed(4));
        let id = jobs.enqueue(input());
        match settle(&jobs, &id).await {
            JobStatus::Completed { result } => assert_eq!(result.placed_lessons, 4),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn validation_failure_is_rejected_not_failed() {
        let jobs = InMemJobs::new(Invalid);
        let id = jobs.enqueue(input());
        match settle(&jobs, &id).await {
            JobStatus::Rejected { issues } => {
                assert_eq!(issues, vec!["maxPeriods must be positive, got 0".to_string()])
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn other_errors_fail_the_job() {
        let jobs = InMemJobs::new(Broken);
        let id = jobs.enqueue(input());
        match settle(&jobs, &id).await {
            JobStatus::Failed { message } => assert_eq!(message, "grid corrupted"),
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[test]
    fn unknown_job_is_none() {
        let jobs = InMemJobs::new(Fixed(0));
        assert!(jobs.get("missing").is_none());
    }

    #[test]
    fn status_is_tagged() {
        let v = serde_json::to_value(JobStatus::Rejected {
            issues: vec!["x".into()],
        })
        .unwrap();
        assert_eq!(v["status"], "Rejected");
        assert_eq!(v["issues"][0], "x");
    }
}
