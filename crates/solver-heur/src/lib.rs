pub mod grid;
mod optimize;
pub mod report;
mod search;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use sched_core::scoring::{self, Breakdown, Candidate};
use sched_core::{normalize, Problem, Solver, ValidationError};
use thiserror::Error;
use tracing::{info, instrument};
use types::{DayOfWeek, SchedulerInput, SchedulerResult, SlotAssignment};

pub use grid::{GridError, ResourceGrid};
pub use report::{format_conflicts, ConflictLines};

use search::{penalty_context, Search};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("occupancy grid rejected an update: {0}")]
    Grid(#[from] GridError),
}

/// Locked rows keep the score the caller supplied; a double-period lock
/// contributes once per lesson id.
fn locked_penalty(locks: &[SlotAssignment]) -> u64 {
    let mut by_lesson: BTreeMap<&str, u32> = BTreeMap::new();
    for a in locks {
        let score = by_lesson.entry(a.lesson_instance_id.as_str()).or_default();
        *score = (*score).max(a.soft_penalty_score);
    }
    by_lesson.values().map(|&s| u64::from(s)).sum()
}

/// Builds a weekly timetable for `input`.
///
/// Validation failures reject the whole run. Anything the search cannot
/// place is returned as a conflict next to the partial schedule.
#[instrument(
    skip_all,
    fields(
        classes = input.classes.len(),
        courses = input.courses.len(),
        locks = input.locked_assignments.len()
    )
)]
pub fn generate(input: &SchedulerInput) -> Result<SchedulerResult, EngineError> {
    let problem = normalize(input)?;
    let total = problem.total_units();
    let locked_units = problem.locked_units();
    info!(
        requirements = problem.requirements.len(),
        total_units = total,
        locked_units,
        "normalized input"
    );

    let mut search = Search::new(&problem);
    search.run()?;
    let after_search = search.rescore();
    info!(
        placed = search.placed_count(),
        conflicts = search.conflicts().len(),
        backtracks = search.backtracks(),
        penalty = after_search,
        "placement finished"
    );

    let opt = optimize::improve(&mut search, problem.config.optimization_passes)?;
    let final_penalty = search.rescore();
    let locked = locked_penalty(&problem.locks);

    let mut assignments = problem.locks.clone();
    assignments.extend(search.assignments());

    let placed = locked_units + search.placed_count() as u32;
    let failed = search.conflicts().len() as u32;
    info!(
        placed,
        failed,
        passes = opt.passes,
        moves = opt.moves,
        penalty = final_penalty + locked,
        "timetable generated"
    );

    Ok(SchedulerResult {
        assignments,
        total_lessons: total,
        placed_lessons: placed,
        failed_lessons: failed,
        global_penalty_score: final_penalty + locked,
        conflicts: search.conflicts().to_vec(),
        stats: serde_json::json!({
            "method": "heuristic",
            "backtracks": search.backtracks(),
            "optimizationPasses": opt.passes,
            "optimizationMoves": opt.moves,
            "penaltyAfterSearch": after_search + locked,
            "penaltyFinal": final_penalty + locked,
            "lockedPenalty": locked,
        }),
    })
}

/// Score of one lesson block: the rows sharing a lesson id on one day.
#[derive(Clone, Debug)]
pub struct RowExplanation {
    pub lesson_instance_id: String,
    pub day: DayOfWeek,
    pub period_number: u32,
    pub periods: u32,
    pub breakdown: Breakdown,
    pub total: u32,
}

#[derive(Clone, Debug, Default)]
pub struct Explanation {
    pub rows: Vec<RowExplanation>,
    /// Lessons naming a class or trainer the problem does not know.
    pub unscored: Vec<String>,
    pub total: u64,
}

/// Scores a caller-supplied schedule one lesson block at a time, each block
/// against everything else. On a generated schedule the total matches the
/// engine's penalty for its placed lessons.
pub fn explain(problem: &Problem, assignments: &[SlotAssignment]) -> Explanation {
    let grid = ResourceGrid::seeded(assignments);

    let mut blocks: Vec<(&SlotAssignment, Vec<u32>)> = Vec::new();
    let mut index: HashMap<(&str, DayOfWeek), usize> = HashMap::new();
    for a in assignments {
        let key = (a.lesson_instance_id.as_str(), a.day);
        match index.get(&key) {
            Some(&i) => blocks[i].1.push(a.period_number),
            None => {
                index.insert(key, blocks.len());
                blocks.push((a, vec![a.period_number]));
            }
        }
    }

    let mut out = Explanation::default();
    for (a, mut periods) in blocks {
        let (Some(class), Some(trainer)) = (
            problem.class_index(&a.class_id),
            problem.trainer_index(&a.trainer_id),
        ) else {
            out.unscored.push(a.lesson_instance_id.clone());
            continue;
        };
        periods.sort_unstable();
        let start = periods[0];
        let own = Some((a.day, periods.as_slice()));
        let (load, class_day) = penalty_context(problem, &grid, class, trainer, a.day, own);
        let candidate = Candidate {
            day: a.day,
            ordinal: problem.ordinal(start).unwrap_or_default(),
            len: periods.len() as u32,
        };
        let breakdown = scoring::breakdown(&candidate, &load, &class_day);
        out.total += u64::from(breakdown.total());
        out.rows.push(RowExplanation {
            lesson_instance_id: a.lesson_instance_id.clone(),
            day: a.day,
            period_number: start,
            periods: candidate.len,
            total: breakdown.total(),
            breakdown,
        });
    }
    out
}

pub struct HeurSolver;

impl HeurSolver {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeurSolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Solver for HeurSolver {
    async fn solve(&self, input: SchedulerInput) -> anyhow::Result<SchedulerResult> {
        let mut result = match generate(&input) {
            Ok(r) => r,
            Err(EngineError::Validation(v)) => return Err(anyhow::Error::new(v)),
            Err(e) => return Err(e.into()),
        };

        let courses: HashMap<_, _> = input
            .courses
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        let classes: HashMap<_, _> = input
            .classes
            .iter()
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        let trainers: HashMap<_, _> = input
            .trainers
            .iter()
            .map(|t| (t.id.clone(), t.name.clone()))
            .collect();
        let lines: Vec<String> =
            format_conflicts(&result.conflicts, &courses, &classes, &trainers)
                .iter()
                .collect();
        result.stats["conflictSummary"] = serde_json::json!(lines);
        Ok(result)
    }
}
