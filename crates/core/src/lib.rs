pub mod normalize;
pub mod scoring;

use async_trait::async_trait;
use thiserror::Error;

pub use normalize::{
    normalize, ClassInfo, CourseInfo, LessonRequirement, Problem, RoomInfo, TrainerInfo,
};
pub use types::{
    Class, ConflictReason, ConflictRecord, Course, DayOfWeek, Room, RoomType, SchedulerConfig,
    SchedulerInput, SchedulerResult, SlotAssignment, TimeSlot, Trainer,
};
use types::{ClassId, CourseId, TradeId, TrainerId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("maxPeriods must be positive, got {0}")]
    NonPositiveMaxPeriods(i32),
    #[error("break period {0} is outside 1..=maxPeriods")]
    BreakOutOfRange(u32),
    #[error("every period of the day is a break")]
    NoTeachingPeriods,
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("trainer {0} has a negative period limit")]
    NegativeTrainerLimit(TrainerId),
    #[error("class {class} pins unknown trainer {trainer}")]
    UnknownPinnedTrainer { class: ClassId, trainer: TrainerId },
    #[error("course {course} has periodsPerWeek={value}")]
    NonPositivePeriodsPerWeek { course: CourseId, value: i32 },
    #[error("course {course} matches no class of trade {trade} level {level}")]
    UnmatchedCourse {
        course: CourseId,
        trade: TradeId,
        level: u32,
    },
    #[error("locked lesson {lesson} references unknown {kind} {id}")]
    UnknownLockReference {
        lesson: String,
        kind: &'static str,
        id: String,
    },
    #[error("locked lesson {lesson} sits outside the week at {slot}")]
    LockOutsideWeek { lesson: String, slot: TimeSlot },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid scheduler input: {}", join_issues(.0))]
    Invalid(Vec<ValidationIssue>),
}

impl ValidationError {
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ValidationError::Invalid(issues) => issues,
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[async_trait]
pub trait Solver: Send + Sync + 'static {
    async fn solve(&self, input: SchedulerInput) -> anyhow::Result<SchedulerResult>;
}
