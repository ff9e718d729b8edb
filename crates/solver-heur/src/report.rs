use std::collections::HashMap;
use std::hash::Hash;

use types::{ClassId, ConflictReason, ConflictRecord, CourseId, TrainerId};

/// Borrowed view over a conflict list that renders one line per unplaced
/// unit. Lines are built on demand; `iter` can be called any number of times.
#[derive(Clone, Copy, Debug)]
pub struct ConflictLines<'a> {
    conflicts: &'a [ConflictRecord],
    courses: &'a HashMap<CourseId, String>,
    classes: &'a HashMap<ClassId, String>,
    trainers: &'a HashMap<TrainerId, String>,
}

pub fn format_conflicts<'a>(
    conflicts: &'a [ConflictRecord],
    courses: &'a HashMap<CourseId, String>,
    classes: &'a HashMap<ClassId, String>,
    trainers: &'a HashMap<TrainerId, String>,
) -> ConflictLines<'a> {
    ConflictLines {
        conflicts,
        courses,
        classes,
        trainers,
    }
}

fn name_or_id<'m, K>(names: &'m HashMap<K, String>, id: &'m K) -> String
where
    K: Hash + Eq + ToString,
{
    match names.get(id) {
        Some(n) if !n.is_empty() => n.clone(),
        _ => id.to_string(),
    }
}

impl<'a> ConflictLines<'a> {
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = String> + Clone + 'a {
        let this = *self;
        this.conflicts.iter().map(move |c| this.line(c))
    }

    fn line(&self, c: &ConflictRecord) -> String {
        let class = name_or_id(self.classes, &c.class_id);
        let course = name_or_id(self.courses, &c.course_id);
        let head = format!("{class} / {course} [{}]: {}", c.lesson_instance_id, c.reason);
        match c.reason {
            ConflictReason::TrainerOverloaded | ConflictReason::NoAvailableSlot
                if !c.trainer_ids.is_empty() =>
            {
                let names: Vec<String> = c
                    .trainer_ids
                    .iter()
                    .map(|t| name_or_id(self.trainers, t))
                    .collect();
                format!("{head} (trainers: {})", names.join(", "))
            }
            _ => head,
        }
    }
}
