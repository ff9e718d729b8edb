use tracing::debug;

use crate::grid::GridError;
use crate::search::{PlacedUnit, Search};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct OptimizeStats {
    pub passes: u32,
    pub moves: u32,
}

/// Relocates high-penalty lessons while the global penalty keeps dropping.
///
/// A pass walks units from the highest penalty down and applies the first
/// move that lowers both the unit's own penalty and the schedule total.
/// A pass without such a move is a fixed point and ends the loop.
pub(crate) fn improve(search: &mut Search<'_>, passes: u32) -> Result<OptimizeStats, GridError> {
    let mut stats = OptimizeStats::default();
    for _ in 0..passes {
        stats.passes += 1;
        let global = search.rescore();

        let mut order: Vec<(u32, u64)> = search
            .placed_units()
            .filter(|(_, u)| u.penalty > 0)
            .map(|(seq, u)| (u.penalty, seq))
            .collect();
        order.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut moved = false;
        for (penalty, seq) in order {
            if relocate(search, seq, penalty, global)? {
                moved = true;
                stats.moves += 1;
                break;
            }
        }
        if !moved {
            debug!(pass = stats.passes, global, "no improving move left");
            break;
        }
    }
    Ok(stats)
}

fn relocate(
    search: &mut Search<'_>,
    seq: u64,
    penalty: u32,
    global: u64,
) -> Result<bool, GridError> {
    let Some(unit) = search.release_unit(seq)? else {
        return Ok(false);
    };

    let mut choices: Vec<_> = search
        .scan(unit.req, true)
        .choices
        .into_iter()
        .filter(|c| c.penalty < penalty)
        .collect();
    choices.sort();

    for choice in choices {
        let moved = PlacedUnit {
            start: choice.start,
            room: choice.room,
            trainer: choice.trainer,
            penalty: choice.penalty,
            ..unit.clone()
        };
        let new_seq = search.commit_unit(moved)?;
        let total = search.total_penalty();
        if total < global {
            debug!(
                lesson = %unit.lesson_id,
                from = %unit.start,
                to = %choice.start,
                before = global,
                after = total,
                "relocated lesson"
            );
            return Ok(true);
        }
        search.release_unit(new_seq)?;
    }

    search.commit_unit(unit)?;
    Ok(false)
}
