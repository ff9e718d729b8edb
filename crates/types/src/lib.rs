use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Clone,
            Debug,
            Serialize,
            Deserialize,
            ToSchema,
            JsonSchema,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}
id_newtype!(TrainerId);
id_newtype!(ClassId);
id_newtype!(CourseId);
id_newtype!(RoomId);
id_newtype!(TradeId);

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    /// Canonical teaching week used when the input does not name its days.
    pub const WORKWEEK: [DayOfWeek; 5] = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DayOfWeek::Mon => "mon",
            DayOfWeek::Tue => "tue",
            DayOfWeek::Wed => "wed",
            DayOfWeek::Thu => "thu",
            DayOfWeek::Fri => "fri",
            DayOfWeek::Sat => "sat",
            DayOfWeek::Sun => "sun",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Classroom,
    Lab,
    Workshop,
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoomType::Classroom => "classroom",
            RoomType::Lab => "lab",
            RoomType::Workshop => "workshop",
        })
    }
}

/// A `(day, period)` coordinate. Periods are numbered from 1.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
pub struct TimeSlot {
    pub day: DayOfWeek,
    pub period: u32,
}

impl TimeSlot {
    pub fn new(day: DayOfWeek, period: u32) -> Self {
        Self { day, period }
    }

    pub fn next(&self) -> Self {
        Self {
            day: self.day,
            period: self.period + 1,
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.day, self.period)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Trainer {
    pub id: TrainerId,
    #[serde(default)]
    pub name: String,
    pub max_weekly_periods: i32,
    #[serde(default)]
    pub preferred_daily_periods: i32,
    #[serde(default)]
    pub trade_ids: Vec<TradeId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    #[serde(default)]
    pub name: String,
    pub room_type: RoomType,
    pub capacity: u32,
    #[serde(default)]
    pub building: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: ClassId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    pub trade_id: TradeId,
    pub level: u32,
    pub capacity: u32,
    #[serde(default)]
    pub trainer_id: Option<TrainerId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: CourseId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    pub trade_id: TradeId,
    pub level: u32,
    pub periods_per_week: i32,
    pub required_room_type: RoomType,
    #[serde(default)]
    pub is_double_period: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SlotAssignment {
    pub lesson_instance_id: String,
    pub class_id: ClassId,
    pub course_id: CourseId,
    pub trainer_id: TrainerId,
    pub room_id: RoomId,
    pub day: DayOfWeek,
    pub period_number: u32,
    #[serde(default)]
    pub soft_penalty_score: u32,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub lock_type: Option<String>,
}

impl SlotAssignment {
    pub fn slot(&self) -> TimeSlot {
        TimeSlot::new(self.day, self.period_number)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    #[serde(default = "default_optimization_passes")]
    pub optimization_passes: u32,
    #[serde(default = "default_max_backtrack_depth")]
    pub max_backtrack_depth: u32,
}

fn default_optimization_passes() -> u32 {
    25
}

fn default_max_backtrack_depth() -> u32 {
    200
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            optimization_passes: default_optimization_passes(),
            max_backtrack_depth: default_max_backtrack_depth(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerInput {
    #[serde(default)]
    pub classes: Vec<Class>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub trainers: Vec<Trainer>,
    #[serde(default)]
    pub rooms: Vec<Room>,
    pub max_periods: i32,
    #[serde(default)]
    pub break_periods: Vec<u32>,
    #[serde(default)]
    pub working_days: Vec<DayOfWeek>,
    #[serde(default)]
    pub locked_assignments: Vec<SlotAssignment>,
    #[serde(default)]
    pub config: SchedulerConfig,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, ToSchema, JsonSchema, Eq, PartialEq, Hash)]
pub enum ConflictReason {
    NoAvailableRoom,
    NoAvailableTrainer,
    NoAvailableSlot,
    TrainerOverloaded,
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictReason::NoAvailableRoom => "no room of the required type and size",
            ConflictReason::NoAvailableTrainer => "no qualified trainer",
            ConflictReason::NoAvailableSlot => "no free slot for class, trainer and room",
            ConflictReason::TrainerOverloaded => "trainer weekly limit reached",
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub lesson_instance_id: String,
    pub class_id: ClassId,
    pub course_id: CourseId,
    pub reason: ConflictReason,
    #[serde(default)]
    pub trainer_ids: Vec<TrainerId>,
    #[serde(default)]
    pub candidate_slots: Vec<TimeSlot>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerResult {
    pub assignments: Vec<SlotAssignment>,
    pub total_lessons: u32,
    pub placed_lessons: u32,
    pub failed_lessons: u32,
    pub global_penalty_score: u64,
    pub conflicts: Vec<ConflictRecord>,
    #[serde(default)]
    pub stats: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_defaults_optional_sections() {
        let raw = serde_json::json!({
            "maxPeriods": 6,
            "classes": [{"id": "c1", "tradeId": "ELEC", "level": 1, "capacity": 20}],
        });
        let input: SchedulerInput = serde_json::from_value(raw).unwrap();
        assert_eq!(input.max_periods, 6);
        assert!(input.locked_assignments.is_empty());
        assert_eq!(input.config, SchedulerConfig::default());
        assert_eq!(input.classes[0].trainer_id, None);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let a = SlotAssignment {
            lesson_instance_id: "c1-q1-1".into(),
            class_id: "c1".into(),
            course_id: "q1".into(),
            trainer_id: "t1".into(),
            room_id: "r1".into(),
            day: DayOfWeek::Wed,
            period_number: 3,
            soft_penalty_score: 0,
            is_locked: true,
            lock_type: Some("full".into()),
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["lessonInstanceId"], "c1-q1-1");
        assert_eq!(v["day"], "wed");
        assert_eq!(v["periodNumber"], 3);
        assert_eq!(v["lockType"], "full");
    }

    #[test]
    fn slots_order_by_day_then_period() {
        let a = TimeSlot::new(DayOfWeek::Mon, 5);
        let b = TimeSlot::new(DayOfWeek::Tue, 1);
        assert!(a < b);
        assert!(TimeSlot::new(DayOfWeek::Mon, 1) < a);
        assert_eq!(a.to_string(), "mon.5");
        assert_eq!(a.next(), TimeSlot::new(DayOfWeek::Mon, 6));
    }

    #[test]
    fn input_schema_lists_time_structure() {
        let schema = schemars::schema_for!(SchedulerInput);
        let v = serde_json::to_value(&schema).unwrap();
        let props = &v["properties"];
        assert!(props.get("maxPeriods").is_some());
        assert!(props.get("breakPeriods").is_some());
        assert!(props.get("lockedAssignments").is_some());
    }
}
