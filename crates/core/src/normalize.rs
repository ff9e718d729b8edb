//! Turns a caller snapshot into validated, index-addressed entities and the
//! list of lesson requirements the engine has to place.

use std::collections::{BTreeSet, HashMap, HashSet};

use types::{
    ClassId, CourseId, DayOfWeek, RoomId, RoomType, SchedulerConfig, SchedulerInput,
    SlotAssignment, TimeSlot, TradeId, TrainerId,
};

use crate::{ValidationError, ValidationIssue};

#[derive(Clone, Debug)]
pub struct TrainerInfo {
    pub id: TrainerId,
    pub name: String,
    pub max_weekly: u32,
    /// 0 means no daily preference.
    pub preferred_daily: u32,
    pub trades: BTreeSet<TradeId>,
}

#[derive(Clone, Debug)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub room_type: RoomType,
    pub capacity: u32,
}

#[derive(Clone, Debug)]
pub struct ClassInfo {
    pub id: ClassId,
    pub name: String,
    pub code: String,
    pub trade_id: TradeId,
    pub level: u32,
    pub capacity: u32,
    pub pinned_trainer: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct CourseInfo {
    pub id: CourseId,
    pub name: String,
    pub code: String,
    pub trade_id: TradeId,
    pub level: u32,
    pub periods_per_week: u32,
    pub room_type: RoomType,
    pub double: bool,
}

impl CourseInfo {
    pub fn block_len(&self) -> u32 {
        if self.double {
            2
        } else {
            1
        }
    }

    pub fn units(&self) -> u32 {
        if self.double {
            self.periods_per_week.div_ceil(2)
        } else {
            self.periods_per_week
        }
    }
}

/// One class paired with one course of its trade and level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LessonRequirement {
    pub class: usize,
    pub course: usize,
    pub block_len: u32,
    pub units: u32,
    pub locked_units: u32,
}

impl LessonRequirement {
    /// Units the search still has to place after locks are accounted for.
    pub fn pending(&self) -> u32 {
        self.units - self.locked_units
    }
}

#[derive(Clone, Debug)]
pub struct Problem {
    pub trainers: Vec<TrainerInfo>,
    pub rooms: Vec<RoomInfo>,
    pub classes: Vec<ClassInfo>,
    pub courses: Vec<CourseInfo>,
    pub requirements: Vec<LessonRequirement>,
    pub days: Vec<DayOfWeek>,
    pub max_periods: u32,
    pub locks: Vec<SlotAssignment>,
    pub config: SchedulerConfig,
    qualified: HashMap<TradeId, Vec<usize>>,
    ordinals: Vec<Option<u32>>,
    trainer_index: HashMap<TrainerId, usize>,
    room_index: HashMap<RoomId, usize>,
    class_index: HashMap<ClassId, usize>,
    course_index: HashMap<CourseId, usize>,
}

impl Problem {
    pub fn trainer_index(&self, id: &TrainerId) -> Option<usize> {
        self.trainer_index.get(id).copied()
    }

    pub fn room_index(&self, id: &RoomId) -> Option<usize> {
        self.room_index.get(id).copied()
    }

    pub fn class_index(&self, id: &ClassId) -> Option<usize> {
        self.class_index.get(id).copied()
    }

    pub fn course_index(&self, id: &CourseId) -> Option<usize> {
        self.course_index.get(id).copied()
    }

    pub fn qualified_trainers(&self, trade: &TradeId) -> &[usize] {
        self.qualified.get(trade).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The pinned trainer alone when the class has one, otherwise every
    /// trainer qualified for the course's trade, in id order.
    pub fn eligible_trainers(&self, req: &LessonRequirement) -> Vec<usize> {
        match self.classes[req.class].pinned_trainer {
            Some(t) => vec![t],
            None => self
                .qualified_trainers(&self.courses[req.course].trade_id)
                .to_vec(),
        }
    }

    /// Rooms of the course's type that seat the class, in id order.
    pub fn compatible_rooms(&self, req: &LessonRequirement) -> Vec<usize> {
        let course = &self.courses[req.course];
        let class = &self.classes[req.class];
        self.rooms
            .iter()
            .enumerate()
            .filter(|(_, r)| r.room_type == course.room_type && r.capacity >= class.capacity)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_teaching(&self, period: u32) -> bool {
        self.ordinal(period).is_some()
    }

    /// Position of a period among the day's teaching periods, breaks skipped.
    pub fn ordinal(&self, period: u32) -> Option<u32> {
        if period == 0 {
            return None;
        }
        self.ordinals.get(period as usize - 1).copied().flatten()
    }

    pub fn teaching_periods(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=self.max_periods).filter(|&p| self.is_teaching(p))
    }

    /// Every slot where a block of `len` consecutive teaching periods can
    /// start. Blocks never run across a break or past the last period.
    pub fn block_starts(&self, len: u32) -> Vec<TimeSlot> {
        let mut starts = Vec::new();
        for &day in &self.days {
            for p in self.teaching_periods() {
                if (p..p + len).all(|q| q <= self.max_periods && self.is_teaching(q)) {
                    starts.push(TimeSlot::new(day, p));
                }
            }
        }
        starts
    }

    pub fn total_units(&self) -> u32 {
        self.requirements.iter().map(|r| r.units).sum()
    }

    pub fn locked_units(&self) -> u32 {
        self.requirements.iter().map(|r| r.locked_units).sum()
    }
}

fn chk_unique<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            issues.push(ValidationIssue::DuplicateId {
                kind,
                id: id.to_owned(),
            });
        }
    }
}

pub fn normalize(input: &SchedulerInput) -> Result<Problem, ValidationError> {
    let mut issues: Vec<ValidationIssue> = Vec::new();

    if input.max_periods <= 0 {
        issues.push(ValidationIssue::NonPositiveMaxPeriods(input.max_periods));
    }
    let max_periods = input.max_periods.max(0) as u32;

    let mut breaks = BTreeSet::new();
    for &b in &input.break_periods {
        if b == 0 || b > max_periods {
            if max_periods > 0 {
                issues.push(ValidationIssue::BreakOutOfRange(b));
            }
        } else {
            breaks.insert(b);
        }
    }
    if max_periods > 0 && breaks.len() as u32 == max_periods {
        issues.push(ValidationIssue::NoTeachingPeriods);
    }

    chk_unique(
        "trainer",
        input.trainers.iter().map(|t| t.id.0.as_str()),
        &mut issues,
    );
    chk_unique("room", input.rooms.iter().map(|r| r.id.0.as_str()), &mut issues);
    chk_unique(
        "class",
        input.classes.iter().map(|c| c.id.0.as_str()),
        &mut issues,
    );
    chk_unique(
        "course",
        input.courses.iter().map(|c| c.id.0.as_str()),
        &mut issues,
    );

    let mut trainers: Vec<TrainerInfo> = Vec::with_capacity(input.trainers.len());
    for t in &input.trainers {
        if t.max_weekly_periods < 0 || t.preferred_daily_periods < 0 {
            issues.push(ValidationIssue::NegativeTrainerLimit(t.id.clone()));
        }
        trainers.push(TrainerInfo {
            id: t.id.clone(),
            name: t.name.clone(),
            max_weekly: t.max_weekly_periods.max(0) as u32,
            preferred_daily: t.preferred_daily_periods.max(0) as u32,
            trades: t.trade_ids.iter().cloned().collect(),
        });
    }
    trainers.sort_by(|a, b| a.id.cmp(&b.id));
    let trainer_index: HashMap<TrainerId, usize> = trainers
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.clone(), i))
        .collect();

    let mut rooms: Vec<RoomInfo> = input
        .rooms
        .iter()
        .map(|r| RoomInfo {
            id: r.id.clone(),
            name: r.name.clone(),
            room_type: r.room_type,
            capacity: r.capacity,
        })
        .collect();
    rooms.sort_by(|a, b| a.id.cmp(&b.id));
    let room_index: HashMap<RoomId, usize> = rooms
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();

    let mut classes: Vec<ClassInfo> = Vec::with_capacity(input.classes.len());
    for c in &input.classes {
        let pinned_trainer = match &c.trainer_id {
            Some(tid) => match trainer_index.get(tid) {
                Some(&i) => Some(i),
                None => {
                    issues.push(ValidationIssue::UnknownPinnedTrainer {
                        class: c.id.clone(),
                        trainer: tid.clone(),
                    });
                    None
                }
            },
            None => None,
        };
        classes.push(ClassInfo {
            id: c.id.clone(),
            name: c.name.clone(),
            code: c.code.clone(),
            trade_id: c.trade_id.clone(),
            level: c.level,
            capacity: c.capacity,
            pinned_trainer,
        });
    }
    classes.sort_by(|a, b| a.id.cmp(&b.id));
    let class_index: HashMap<ClassId, usize> = classes
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();

    let mut courses: Vec<CourseInfo> = Vec::with_capacity(input.courses.len());
    for q in &input.courses {
        if q.periods_per_week <= 0 {
            issues.push(ValidationIssue::NonPositivePeriodsPerWeek {
                course: q.id.clone(),
                value: q.periods_per_week,
            });
        }
        if !classes
            .iter()
            .any(|c| c.trade_id == q.trade_id && c.level == q.level)
        {
            issues.push(ValidationIssue::UnmatchedCourse {
                course: q.id.clone(),
                trade: q.trade_id.clone(),
                level: q.level,
            });
        }
        courses.push(CourseInfo {
            id: q.id.clone(),
            name: q.name.clone(),
            code: q.code.clone(),
            trade_id: q.trade_id.clone(),
            level: q.level,
            periods_per_week: q.periods_per_week.max(0) as u32,
            room_type: q.required_room_type,
            double: q.is_double_period,
        });
    }
    courses.sort_by(|a, b| a.id.cmp(&b.id));
    let course_index: HashMap<CourseId, usize> = courses
        .iter()
        .enumerate()
        .map(|(i, c)| (c.id.clone(), i))
        .collect();

    let mut days: Vec<DayOfWeek> = if input.working_days.is_empty() {
        DayOfWeek::WORKWEEK.to_vec()
    } else {
        input.working_days.clone()
    };
    days.sort();
    days.dedup();

    let mut locked_rows: HashMap<(usize, usize), u32> = HashMap::new();
    for lock in &input.locked_assignments {
        let lesson = &lock.lesson_instance_id;
        let unknown = |kind: &'static str, id: &str| ValidationIssue::UnknownLockReference {
            lesson: lesson.clone(),
            kind,
            id: id.to_owned(),
        };
        let class = class_index.get(&lock.class_id).copied();
        let course = course_index.get(&lock.course_id).copied();
        if class.is_none() {
            issues.push(unknown("class", &lock.class_id.0));
        }
        if course.is_none() {
            issues.push(unknown("course", &lock.course_id.0));
        }
        if !trainer_index.contains_key(&lock.trainer_id) {
            issues.push(unknown("trainer", &lock.trainer_id.0));
        }
        if !room_index.contains_key(&lock.room_id) {
            issues.push(unknown("room", &lock.room_id.0));
        }
        if !days.contains(&lock.day) || lock.period_number == 0 || lock.period_number > max_periods
        {
            issues.push(ValidationIssue::LockOutsideWeek {
                lesson: lesson.clone(),
                slot: lock.slot(),
            });
        }
        if let (Some(c), Some(q)) = (class, course) {
            *locked_rows.entry((c, q)).or_default() += 1;
        }
    }

    if !issues.is_empty() {
        return Err(ValidationError::Invalid(issues));
    }

    let mut requirements = Vec::new();
    for (ci, class) in classes.iter().enumerate() {
        for (qi, course) in courses.iter().enumerate() {
            if course.trade_id != class.trade_id || course.level != class.level {
                continue;
            }
            let units = course.units();
            let rows = locked_rows.get(&(ci, qi)).copied().unwrap_or(0);
            let locked = if course.double { rows.div_ceil(2) } else { rows };
            requirements.push(LessonRequirement {
                class: ci,
                course: qi,
                block_len: course.block_len(),
                units,
                locked_units: locked.min(units),
            });
        }
    }
    requirements.sort_by(|a, b| {
        let ka = (&courses[a.course].trade_id, &classes[a.class].id, &courses[a.course].id);
        let kb = (&courses[b.course].trade_id, &classes[b.class].id, &courses[b.course].id);
        ka.cmp(&kb)
    });

    let mut qualified: HashMap<TradeId, Vec<usize>> = HashMap::new();
    for (ti, t) in trainers.iter().enumerate() {
        for trade in &t.trades {
            qualified.entry(trade.clone()).or_default().push(ti);
        }
    }

    let mut ordinals = Vec::with_capacity(max_periods as usize);
    let mut next = 0u32;
    for p in 1..=max_periods {
        if breaks.contains(&p) {
            ordinals.push(None);
        } else {
            ordinals.push(Some(next));
            next += 1;
        }
    }

    Ok(Problem {
        trainers,
        rooms,
        classes,
        courses,
        requirements,
        days,
        max_periods,
        locks: input.locked_assignments.clone(),
        config: input.config.clone(),
        qualified,
        ordinals,
        trainer_index,
        room_index,
        class_index,
        course_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::{Class, Course, Room, Trainer};

    fn class(id: &str, trade: &str, level: u32) -> Class {
        Class {
            id: id.into(),
            name: format!("Class {id}"),
            code: id.to_uppercase(),
            trade_id: trade.into(),
            level,
            capacity: 20,
            trainer_id: None,
        }
    }

    fn course(id: &str, trade: &str, level: u32, ppw: i32, double: bool) -> Course {
        Course {
            id: id.into(),
            name: format!("Course {id}"),
            code: id.to_uppercase(),
            trade_id: trade.into(),
            level,
            periods_per_week: ppw,
            required_room_type: RoomType::Workshop,
            is_double_period: double,
        }
    }

    fn trainer(id: &str, trades: &[&str]) -> Trainer {
        Trainer {
            id: id.into(),
            name: format!("Trainer {id}"),
            max_weekly_periods: 20,
            preferred_daily_periods: 4,
            trade_ids: trades.iter().map(|&t| t.into()).collect(),
        }
    }

    fn input() -> SchedulerInput {
        SchedulerInput {
            classes: vec![class("c2", "ELEC", 1), class("c1", "ELEC", 1), class("p1", "PLMB", 2)],
            courses: vec![
                course("wiring", "ELEC", 1, 4, false),
                course("install", "ELEC", 1, 3, true),
                course("pipes", "PLMB", 2, 2, false),
            ],
            trainers: vec![trainer("t2", &["PLMB"]), trainer("t1", &["ELEC", "PLMB"])],
            rooms: vec![Room {
                id: "w1".into(),
                name: "Workshop 1".into(),
                room_type: RoomType::Workshop,
                capacity: 25,
                building: None,
            }],
            max_periods: 6,
            break_periods: vec![],
            working_days: vec![],
            locked_assignments: vec![],
            config: SchedulerConfig::default(),
        }
    }

    fn lock(class: &str, course: &str, day: DayOfWeek, period: u32) -> SlotAssignment {
        SlotAssignment {
            lesson_instance_id: format!("lock-{class}-{course}-{period}"),
            class_id: class.into(),
            course_id: course.into(),
            trainer_id: "t1".into(),
            room_id: "w1".into(),
            day,
            period_number: period,
            soft_penalty_score: 0,
            is_locked: true,
            lock_type: Some("full".into()),
        }
    }

    #[test]
    fn derives_requirements_for_matching_trade_and_level() {
        let p = normalize(&input()).unwrap();
        assert_eq!(p.requirements.len(), 5);
        let keys: Vec<(&str, &str)> = p
            .requirements
            .iter()
            .map(|r| (p.classes[r.class].id.0.as_str(), p.courses[r.course].id.0.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("c1", "install"),
                ("c1", "wiring"),
                ("c2", "install"),
                ("c2", "wiring"),
                ("p1", "pipes"),
            ]
        );
    }

    #[test]
    fn double_period_units_round_up() {
        let p = normalize(&input()).unwrap();
        let install = p
            .requirements
            .iter()
            .find(|r| p.courses[r.course].id.0 == "install")
            .unwrap();
        assert_eq!(install.block_len, 2);
        assert_eq!(install.units, 2);
        assert_eq!(p.total_units(), 2 + 4 + 2 + 4 + 2);
    }

    #[test]
    fn rejects_non_positive_max_periods() {
        let mut inp = input();
        inp.max_periods = 0;
        let err = normalize(&inp).unwrap_err();
        assert!(err
            .issues()
            .contains(&ValidationIssue::NonPositiveMaxPeriods(0)));
    }

    #[test]
    fn rejects_course_without_class() {
        let mut inp = input();
        inp.courses.push(course("orphan", "WELD", 3, 2, false));
        let err = normalize(&inp).unwrap_err();
        assert_eq!(
            err.issues(),
            &[ValidationIssue::UnmatchedCourse {
                course: "orphan".into(),
                trade: "WELD".into(),
                level: 3,
            }]
        );
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn rejects_zero_periods_per_week() {
        let mut inp = input();
        inp.courses[0].periods_per_week = 0;
        let err = normalize(&inp).unwrap_err();
        assert!(matches!(
            err.issues()[0],
            ValidationIssue::NonPositivePeriodsPerWeek { value: 0, .. }
        ));
    }

    #[test]
    fn collects_every_issue() {
        let mut inp = input();
        inp.rooms.push(inp.rooms[0].clone());
        inp.classes[0].trainer_id = Some("ghost".into());
        inp.locked_assignments.push(lock("c1", "wiring", DayOfWeek::Sat, 1));
        let err = normalize(&inp).unwrap_err();
        assert_eq!(err.issues().len(), 3);
    }

    #[test]
    fn qualified_trainers_sorted_by_id() {
        let p = normalize(&input()).unwrap();
        let ids: Vec<&str> = p
            .qualified_trainers(&"PLMB".into())
            .iter()
            .map(|&i| p.trainers[i].id.0.as_str())
            .collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[test]
    fn pinned_trainer_is_the_only_candidate() {
        let mut inp = input();
        inp.classes[1].trainer_id = Some("t2".into());
        let p = normalize(&inp).unwrap();
        let req = p
            .requirements
            .iter()
            .find(|r| p.classes[r.class].id.0 == "c1")
            .unwrap();
        let eligible = p.eligible_trainers(req);
        assert_eq!(eligible.len(), 1);
        assert_eq!(p.trainers[eligible[0]].id.0, "t2");
    }

    #[test]
    fn breaks_shape_block_starts_and_ordinals() {
        let mut inp = input();
        inp.max_periods = 5;
        inp.break_periods = vec![3];
        inp.working_days = vec![DayOfWeek::Tue, DayOfWeek::Mon, DayOfWeek::Tue];
        let p = normalize(&inp).unwrap();
        assert_eq!(p.days, vec![DayOfWeek::Mon, DayOfWeek::Tue]);
        assert_eq!(p.teaching_periods().collect::<Vec<_>>(), vec![1, 2, 4, 5]);
        assert_eq!(p.ordinal(4), Some(2));
        assert_eq!(p.ordinal(3), None);
        let doubles: Vec<u32> = p
            .block_starts(2)
            .iter()
            .filter(|s| s.day == DayOfWeek::Mon)
            .map(|s| s.period)
            .collect();
        assert_eq!(doubles, vec![1, 4]);
    }

    #[test]
    fn all_break_day_is_rejected() {
        let mut inp = input();
        inp.max_periods = 2;
        inp.break_periods = vec![1, 2];
        let err = normalize(&inp).unwrap_err();
        assert!(err.issues().contains(&ValidationIssue::NoTeachingPeriods));
    }

    #[test]
    fn locks_count_toward_units() {
        let mut inp = input();
        inp.locked_assignments = vec![
            lock("c1", "wiring", DayOfWeek::Mon, 1),
            lock("c1", "install", DayOfWeek::Tue, 1),
            lock("c1", "install", DayOfWeek::Tue, 2),
        ];
        let p = normalize(&inp).unwrap();
        for r in &p.requirements {
            let key = (
                p.classes[r.class].id.0.as_str(),
                p.courses[r.course].id.0.as_str(),
            );
            let expected = match key {
                ("c1", "wiring") | ("c1", "install") => 1,
                _ => 0,
            };
            assert_eq!(r.locked_units, expected, "{key:?}");
        }
        assert_eq!(p.locked_units(), 2);
    }
}
