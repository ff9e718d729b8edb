//! Most-constrained-first greedy placement with bounded undo.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashSet};

use sched_core::scoring::{self, Candidate, TrainerLoad};
use sched_core::Problem;
use tracing::{debug, warn};
use types::{ConflictReason, ConflictRecord, DayOfWeek, SlotAssignment, TimeSlot};

use crate::grid::{GridError, ResourceGrid};

/// A committed block of one requirement: `block_len` periods from `start`.
#[derive(Clone, Debug)]
pub(crate) struct PlacedUnit {
    pub req: usize,
    pub unit_no: u32,
    pub lesson_id: String,
    pub start: TimeSlot,
    pub room: usize,
    pub trainer: usize,
    pub penalty: u32,
}

/// Field order is the tie-break: penalty, day, period, room id, trainer id.
/// Rooms and trainers are indexed in id order, so index order is lexical.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Choice {
    pub penalty: u32,
    pub start: TimeSlot,
    pub room: usize,
    pub trainer: usize,
}

pub(crate) struct Scan {
    pub choices: Vec<Choice>,
    has_rooms: bool,
    eligible: Vec<usize>,
    within_limit: usize,
    starts: Vec<TimeSlot>,
}

impl Scan {
    fn reason(&self) -> ConflictReason {
        if !self.has_rooms {
            ConflictReason::NoAvailableRoom
        } else if self.eligible.is_empty() {
            ConflictReason::NoAvailableTrainer
        } else if self.starts.is_empty() {
            ConflictReason::NoAvailableSlot
        } else if self.within_limit == 0 {
            ConflictReason::TrainerOverloaded
        } else {
            ConflictReason::NoAvailableSlot
        }
    }
}

/// One undo on the trail: a unit of `victim_req` was released so a unit of
/// `for_req` could be placed.
#[derive(Clone, Copy, Debug)]
struct Displacement {
    victim_req: usize,
    for_req: usize,
}

/// Trainer load and class ordinals on `day` as seen by a block of `class`
/// taught by `trainer`. `own` names periods of the block itself that are
/// already in the grid and must not count against it.
pub(crate) fn penalty_context(
    problem: &Problem,
    grid: &ResourceGrid,
    class: usize,
    trainer: usize,
    day: DayOfWeek,
    own: Option<(DayOfWeek, &[u32])>,
) -> (TrainerLoad, Vec<u32>) {
    let t = &problem.trainers[trainer];
    let mut by_day = grid.trainer_day_loads(&t.id);
    let mut periods = grid.class_periods_on(&problem.classes[class].id, day);
    if let Some((own_day, own_periods)) = own {
        if let Some(load) = by_day.get_mut(&own_day) {
            *load = load.saturating_sub(own_periods.len() as u32);
        }
        if own_day == day {
            periods.retain(|p| !own_periods.contains(p));
        }
    }
    let load = TrainerLoad {
        preferred_daily: t.preferred_daily,
        working_days: problem.days.len() as u32,
        by_day,
    };
    let ordinals = periods
        .into_iter()
        .filter_map(|p| problem.ordinal(p))
        .collect();
    (load, ordinals)
}

pub(crate) struct Search<'p> {
    problem: &'p Problem,
    grid: ResourceGrid,
    placed: BTreeMap<u64, PlacedUnit>,
    remaining: Vec<u32>,
    next_unit: Vec<u32>,
    free_units: Vec<BTreeSet<u32>>,
    /// Lesson ids carried by locked rows; never handed out again.
    reserved: HashSet<String>,
    trail: Vec<Displacement>,
    conflicts: Vec<ConflictRecord>,
    seq: u64,
}

impl<'p> Search<'p> {
    pub fn new(problem: &'p Problem) -> Self {
        let reqs = &problem.requirements;
        Self {
            problem,
            grid: ResourceGrid::seeded(&problem.locks),
            placed: BTreeMap::new(),
            remaining: reqs.iter().map(|r| r.pending()).collect(),
            next_unit: reqs.iter().map(|r| r.locked_units + 1).collect(),
            free_units: vec![BTreeSet::new(); reqs.len()],
            reserved: problem
                .locks
                .iter()
                .map(|a| a.lesson_instance_id.clone())
                .collect(),
            trail: Vec::new(),
            conflicts: Vec::new(),
            seq: 0,
        }
    }

    pub fn backtracks(&self) -> usize {
        self.trail.len()
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn placed_count(&self) -> usize {
        self.placed.len()
    }

    pub fn placed_units(&self) -> impl Iterator<Item = (u64, &PlacedUnit)> + '_ {
        self.placed.iter().map(|(&seq, u)| (seq, u))
    }

    fn lesson_id(&self, req: usize, unit_no: u32) -> String {
        let r = &self.problem.requirements[req];
        format!(
            "{}-{}-{}",
            self.problem.classes[r.class].id, self.problem.courses[r.course].id, unit_no
        )
    }

    fn take_unit_no(&mut self, req: usize) -> u32 {
        if let Some(n) = self.free_units[req].pop_first() {
            return n;
        }
        loop {
            let n = self.next_unit[req];
            self.next_unit[req] += 1;
            if !self.reserved.contains(&self.lesson_id(req, n)) {
                return n;
            }
        }
    }

    pub fn rows(&self, unit: &PlacedUnit) -> Vec<SlotAssignment> {
        let p = self.problem;
        let r = &p.requirements[unit.req];
        (0..r.block_len)
            .map(|offset| SlotAssignment {
                lesson_instance_id: unit.lesson_id.clone(),
                class_id: p.classes[r.class].id.clone(),
                course_id: p.courses[r.course].id.clone(),
                trainer_id: p.trainers[unit.trainer].id.clone(),
                room_id: p.rooms[unit.room].id.clone(),
                day: unit.start.day,
                period_number: unit.start.period + offset,
                soft_penalty_score: unit.penalty,
                is_locked: false,
                lock_type: None,
            })
            .collect()
    }

    /// Newly placed rows ordered by slot, then room.
    pub fn assignments(&self) -> Vec<SlotAssignment> {
        let mut rows: Vec<SlotAssignment> = self.placed.values().flat_map(|u| self.rows(u)).collect();
        rows.sort_by(|a, b| {
            (a.slot(), &a.room_id, &a.lesson_instance_id).cmp(&(
                b.slot(),
                &b.room_id,
                &b.lesson_instance_id,
            ))
        });
        rows
    }

    pub fn commit_unit(&mut self, unit: PlacedUnit) -> Result<u64, GridError> {
        for row in self.rows(&unit) {
            self.grid.commit(&row)?;
        }
        self.seq += 1;
        self.placed.insert(self.seq, unit);
        Ok(self.seq)
    }

    pub fn release_unit(&mut self, seq: u64) -> Result<Option<PlacedUnit>, GridError> {
        let Some(unit) = self.placed.remove(&seq) else {
            return Ok(None);
        };
        for row in self.rows(&unit) {
            self.grid.release(&row)?;
        }
        Ok(Some(unit))
    }

    fn block_penalty(
        &self,
        req: usize,
        start: TimeSlot,
        trainer: usize,
        own: Option<&PlacedUnit>,
    ) -> u32 {
        let p = self.problem;
        let r = &p.requirements[req];
        let own_periods: Vec<u32> = own
            .map(|u| (0..r.block_len).map(|o| u.start.period + o).collect())
            .unwrap_or_default();
        let own = own.map(|u| (u.start.day, own_periods.as_slice()));
        let (load, class_day) = penalty_context(p, &self.grid, r.class, trainer, start.day, own);
        let candidate = Candidate {
            day: start.day,
            ordinal: p.ordinal(start.period).unwrap_or_default(),
            len: r.block_len,
        };
        scoring::score(&candidate, &load, &class_day)
    }

    /// Every feasible `(start, room, trainer)` for one more unit of `req`.
    pub fn scan(&self, req: usize, scored: bool) -> Scan {
        let p = self.problem;
        let r = &p.requirements[req];
        let class = &p.classes[r.class];
        let rooms = p.compatible_rooms(r);
        let eligible = p.eligible_trainers(r);
        let starts = p.block_starts(r.block_len);
        let within: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|&t| {
                let tr = &p.trainers[t];
                self.grid.trainer_load(&tr.id) + r.block_len <= tr.max_weekly
            })
            .collect();

        let mut choices = Vec::new();
        for &start in &starts {
            for &trainer in &within {
                let trainer_id = &p.trainers[trainer].id;
                let mut cached = None;
                for &room in &rooms {
                    let free = (0..r.block_len).all(|o| {
                        self.grid.is_free(
                            TimeSlot::new(start.day, start.period + o),
                            &class.id,
                            trainer_id,
                            &p.rooms[room].id,
                        )
                    });
                    if !free {
                        continue;
                    }
                    let penalty = *cached.get_or_insert_with(|| {
                        if scored {
                            self.block_penalty(req, start, trainer, None)
                        } else {
                            0
                        }
                    });
                    choices.push(Choice {
                        penalty,
                        start,
                        room,
                        trainer,
                    });
                }
            }
        }

        Scan {
            choices,
            has_rooms: !rooms.is_empty(),
            eligible,
            within_limit: within.len(),
            starts,
        }
    }

    fn feasible_count(&self, req: usize) -> usize {
        self.scan(req, false).choices.len()
    }

    fn commit_choice(&mut self, req: usize, choice: Choice) -> Result<(), GridError> {
        let unit_no = self.take_unit_no(req);
        let unit = PlacedUnit {
            req,
            unit_no,
            lesson_id: self.lesson_id(req, unit_no),
            start: choice.start,
            room: choice.room,
            trainer: choice.trainer,
            penalty: choice.penalty,
        };
        self.commit_unit(unit)?;
        self.remaining[req] -= 1;
        Ok(())
    }

    /// Places every pending unit it can. Units that stay infeasible after
    /// the undo budget is spent become conflicts.
    pub fn run(&mut self) -> Result<(), GridError> {
        let n = self.problem.requirements.len();
        let mut queued = vec![false; n];
        let mut heap: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();

        for req in 0..n {
            if self.remaining[req] > 0 {
                heap.push(Reverse((self.feasible_count(req), req)));
                queued[req] = true;
            }
        }

        while let Some(Reverse((count, req))) = heap.pop() {
            queued[req] = false;
            if self.remaining[req] == 0 {
                continue;
            }
            let live = self.feasible_count(req);
            if live != count {
                if let Some(&Reverse(top)) = heap.peek() {
                    if (live, req) > top {
                        heap.push(Reverse((live, req)));
                        queued[req] = true;
                        continue;
                    }
                }
            }

            let displaced = self.place_unit(req)?;

            for r in displaced.into_iter().chain(std::iter::once(req)) {
                if self.remaining[r] > 0 && !queued[r] {
                    heap.push(Reverse((self.feasible_count(r), r)));
                    queued[r] = true;
                }
            }
        }
        Ok(())
    }

    /// Returns the requirement of a unit displaced to make room, if any.
    fn place_unit(&mut self, req: usize) -> Result<Option<usize>, GridError> {
        let scan = self.scan(req, true);
        if let Some(&best) = scan.choices.iter().min() {
            self.commit_choice(req, best)?;
            return Ok(None);
        }
        if let Some(victim_req) = self.backtrack(req)? {
            return Ok(Some(victim_req));
        }
        self.record_conflict(req, &scan);
        Ok(None)
    }

    /// Undo one same-trade unit so `req` fits. Victims are tried by highest
    /// penalty, most recent first; a victim that does not help is put back.
    /// A requirement that already pushed `req` out is never displaced by it,
    /// which keeps two requirements from trading one slot back and forth.
    fn backtrack(&mut self, req: usize) -> Result<Option<usize>, GridError> {
        let p = self.problem;
        let depth = p.config.max_backtrack_depth as usize;
        if self.trail.len() >= depth {
            return Ok(None);
        }
        let trade = &p.courses[p.requirements[req].course].trade_id;
        let pushed_out_by: BTreeSet<usize> = self
            .trail
            .iter()
            .filter(|d| d.victim_req == req)
            .map(|d| d.for_req)
            .collect();
        let mut victims: Vec<(u32, u64)> = self
            .placed
            .iter()
            .filter(|(_, u)| {
                u.req != req
                    && !pushed_out_by.contains(&u.req)
                    && &p.courses[p.requirements[u.req].course].trade_id == trade
            })
            .map(|(&seq, u)| (u.penalty, seq))
            .collect();
        victims.sort_by(|a, b| b.cmp(a));

        for (_, seq) in victims.into_iter().take(depth - self.trail.len()) {
            let Some(victim) = self.release_unit(seq)? else {
                continue;
            };
            let scan = self.scan(req, true);
            let Some(&best) = scan.choices.iter().min() else {
                self.commit_unit(victim)?;
                continue;
            };
            self.commit_choice(req, best)?;
            debug!(
                victim = %victim.lesson_id,
                for_req = req,
                depth = self.trail.len() + 1,
                "displaced lesson to make room"
            );
            self.remaining[victim.req] += 1;
            self.free_units[victim.req].insert(victim.unit_no);
            self.trail.push(Displacement {
                victim_req: victim.req,
                for_req: req,
            });
            return Ok(Some(victim.req));
        }
        Ok(None)
    }

    fn record_conflict(&mut self, req: usize, scan: &Scan) {
        let p = self.problem;
        let r = &p.requirements[req];
        let reason = scan.reason();
        let unit_no = self.take_unit_no(req);
        let lesson_id = self.lesson_id(req, unit_no);
        let examined = scan.has_rooms && !scan.eligible.is_empty();
        warn!(lesson = %lesson_id, ?reason, "lesson unit left unplaced");
        self.conflicts.push(ConflictRecord {
            lesson_instance_id: lesson_id,
            class_id: p.classes[r.class].id.clone(),
            course_id: p.courses[r.course].id.clone(),
            reason,
            trainer_ids: scan
                .eligible
                .iter()
                .map(|&t| p.trainers[t].id.clone())
                .collect(),
            candidate_slots: if examined {
                scan.starts.clone()
            } else {
                Vec::new()
            },
        });
        self.remaining[req] -= 1;
    }

    /// Recomputes every placed unit's penalty against the rest of the
    /// schedule and returns the sum.
    pub fn rescore(&mut self) -> u64 {
        let scores: Vec<(u64, u32)> = self
            .placed
            .iter()
            .map(|(&seq, u)| (seq, self.block_penalty(u.req, u.start, u.trainer, Some(u))))
            .collect();
        let mut total = 0u64;
        for (seq, score) in scores {
            if let Some(u) = self.placed.get_mut(&seq) {
                u.penalty = score;
            }
            total += u64::from(score);
        }
        total
    }

    pub fn total_penalty(&self) -> u64 {
        self.placed
            .values()
            .map(|u| u64::from(self.block_penalty(u.req, u.start, u.trainer, Some(u))))
            .sum()
    }
}
