//! Soft-preference penalties for a single lesson block.
//!
//! Everything here works on plain counts so the engine and the explain
//! endpoint can feed it from whatever occupancy view they hold.

use std::collections::{BTreeMap, BTreeSet};
use types::DayOfWeek;

pub const OVERLOAD_WEIGHT: u32 = 10;
pub const GAP_WEIGHT: u32 = 3;
pub const BALANCE_WEIGHT: u32 = 1;

/// A block of `len` consecutive teaching periods starting at `ordinal`
/// (position among the day's teaching periods, breaks skipped).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub day: DayOfWeek,
    pub ordinal: u32,
    pub len: u32,
}

/// What a trainer already teaches, not counting the candidate.
#[derive(Clone, Debug, Default)]
pub struct TrainerLoad {
    pub preferred_daily: u32,
    pub working_days: u32,
    pub by_day: BTreeMap<DayOfWeek, u32>,
}

impl TrainerLoad {
    pub fn on(&self, day: DayOfWeek) -> u32 {
        self.by_day.get(&day).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.by_day.values().sum()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Breakdown {
    pub overload: u32,
    pub gap: u32,
    pub balance: u32,
}

impl Breakdown {
    pub fn total(&self) -> u32 {
        self.overload + self.gap + self.balance
    }
}

fn idle_between(ordinals: &BTreeSet<u32>) -> u32 {
    match (ordinals.first(), ordinals.last()) {
        (Some(&lo), Some(&hi)) => (hi - lo + 1) - ordinals.len() as u32,
        _ => 0,
    }
}

/// `class_day` holds the ordinals the class already occupies on the
/// candidate's day.
pub fn breakdown(candidate: &Candidate, load: &TrainerLoad, class_day: &[u32]) -> Breakdown {
    let on_day = load.on(candidate.day) + candidate.len;

    let overload = if load.preferred_daily == 0 {
        0
    } else {
        on_day.saturating_sub(load.preferred_daily) * OVERLOAD_WEIGHT
    };

    let mut occupied: BTreeSet<u32> = class_day.iter().copied().collect();
    let before = idle_between(&occupied);
    occupied.extend(candidate.ordinal..candidate.ordinal + candidate.len);
    let gap = if idle_between(&occupied) > before {
        GAP_WEIGHT
    } else {
        0
    };

    let balance = if load.working_days == 0 {
        0
    } else {
        let days = load.working_days;
        let week = load.total() + candidate.len;
        (on_day * days).abs_diff(week) / days * BALANCE_WEIGHT
    };

    Breakdown {
        overload,
        gap,
        balance,
    }
}

pub fn score(candidate: &Candidate, load: &TrainerLoad, class_day: &[u32]) -> u32 {
    breakdown(candidate, load, class_day).total()
}
