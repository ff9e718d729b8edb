use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;
use types::{ClassId, DayOfWeek, RoomId, SlotAssignment, TimeSlot, TrainerId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    Class,
    Trainer,
    Room,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Resource::Class => "class",
            Resource::Trainer => "trainer",
            Resource::Room => "room",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("{resource} {id} is already occupied at {slot}")]
    AlreadyOccupied {
        resource: Resource,
        id: String,
        slot: TimeSlot,
    },
    #[error("lesson {0} is locked and cannot be released")]
    LockedRelease(String),
    #[error("lesson {lesson} does not hold {slot}")]
    NotHeld { lesson: String, slot: TimeSlot },
}

/// Occupancy of the week across classes, trainers and rooms.
///
/// Single-writer: the search owns it by value and hands out `&mut` only to
/// the routine currently placing or moving a lesson.
#[derive(Debug, Default, Clone)]
pub struct ResourceGrid {
    cells: HashMap<TimeSlot, Vec<String>>,
    trainers: HashMap<TrainerId, BTreeSet<TimeSlot>>,
    rooms: HashMap<RoomId, BTreeSet<TimeSlot>>,
    classes: HashMap<ClassId, BTreeSet<TimeSlot>>,
}

impl ResourceGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks go in unconditionally; they are never checked against each other.
    pub fn seeded(locks: &[SlotAssignment]) -> Self {
        let mut grid = Self::new();
        for a in locks {
            grid.insert(a);
        }
        grid
    }

    fn insert(&mut self, a: &SlotAssignment) {
        let slot = a.slot();
        self.cells
            .entry(slot)
            .or_default()
            .push(a.lesson_instance_id.clone());
        self.trainers
            .entry(a.trainer_id.clone())
            .or_default()
            .insert(slot);
        self.rooms.entry(a.room_id.clone()).or_default().insert(slot);
        self.classes
            .entry(a.class_id.clone())
            .or_default()
            .insert(slot);
    }

    fn holds<K: std::hash::Hash + Eq>(
        index: &HashMap<K, BTreeSet<TimeSlot>>,
        key: &K,
        slot: &TimeSlot,
    ) -> bool {
        index.get(key).is_some_and(|s| s.contains(slot))
    }

    pub fn is_free(
        &self,
        slot: TimeSlot,
        class: &ClassId,
        trainer: &TrainerId,
        room: &RoomId,
    ) -> bool {
        !Self::holds(&self.classes, class, &slot)
            && !Self::holds(&self.trainers, trainer, &slot)
            && !Self::holds(&self.rooms, room, &slot)
    }

    pub fn commit(&mut self, a: &SlotAssignment) -> Result<(), GridError> {
        let slot = a.slot();
        let taken = if Self::holds(&self.classes, &a.class_id, &slot) {
            Some((Resource::Class, a.class_id.0.clone()))
        } else if Self::holds(&self.trainers, &a.trainer_id, &slot) {
            Some((Resource::Trainer, a.trainer_id.0.clone()))
        } else if Self::holds(&self.rooms, &a.room_id, &slot) {
            Some((Resource::Room, a.room_id.0.clone()))
        } else {
            None
        };
        if let Some((resource, id)) = taken {
            return Err(GridError::AlreadyOccupied { resource, id, slot });
        }
        self.insert(a);
        Ok(())
    }

    pub fn release(&mut self, a: &SlotAssignment) -> Result<(), GridError> {
        if a.is_locked {
            return Err(GridError::LockedRelease(a.lesson_instance_id.clone()));
        }
        let slot = a.slot();
        let position = self
            .cells
            .get(&slot)
            .and_then(|ids| ids.iter().position(|id| *id == a.lesson_instance_id));
        let Some(position) = position else {
            return Err(GridError::NotHeld {
                lesson: a.lesson_instance_id.clone(),
                slot,
            });
        };
        if let Some(ids) = self.cells.get_mut(&slot) {
            ids.remove(position);
            if ids.is_empty() {
                self.cells.remove(&slot);
            }
        }
        if let Some(s) = self.trainers.get_mut(&a.trainer_id) {
            s.remove(&slot);
        }
        if let Some(s) = self.rooms.get_mut(&a.room_id) {
            s.remove(&slot);
        }
        if let Some(s) = self.classes.get_mut(&a.class_id) {
            s.remove(&slot);
        }
        Ok(())
    }

    pub fn occupants(&self, slot: TimeSlot) -> &[String] {
        self.cells.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn trainer_load(&self, trainer: &TrainerId) -> u32 {
        self.trainers.get(trainer).map_or(0, |s| s.len() as u32)
    }

    pub fn trainer_day_loads(&self, trainer: &TrainerId) -> BTreeMap<DayOfWeek, u32> {
        let mut loads = BTreeMap::new();
        if let Some(slots) = self.trainers.get(trainer) {
            for s in slots {
                *loads.entry(s.day).or_default() += 1;
            }
        }
        loads
    }

    pub fn class_periods_on(&self, class: &ClassId, day: DayOfWeek) -> Vec<u32> {
        self.classes
            .get(class)
            .map(|slots| {
                slots
                    .range(TimeSlot::new(day, 0)..=TimeSlot::new(day, u32::MAX))
                    .map(|s| s.period)
                    .collect()
            })
            .unwrap_or_default()
    }
}
