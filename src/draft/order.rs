//! Draft turn engine.
//!
//! Given the participant list and the number of picks already taken,
//! computes whose turn it is, the display order for the current round,
//! and whether the draft is over. Pure functions, no IO.

use serde::Serialize;

/// Number of participants the fixed pick-order table is designed for.
pub const FIXED_ORDER_PARTICIPANTS: usize = 5;

/// Hand-tuned pick order for a 5-player pool, indexed by absolute pick
/// number (entry 0 is pick 1). Values are 1-based participant slots.
/// Rounds 1-2 form a classic snake; later rounds are shuffled so no
/// seat keeps a structural edge.
const FIXED_PICK_SLOTS: [u8; 30] = [
    1, 2, 3, 4, 5, // round 1
    5, 4, 3, 2, 1, // round 2
    4, 1, 3, 2, 5, // round 3
    2, 3, 4, 5, 1, // round 4
    5, 3, 2, 1, 4, // round 5
    1, 5, 4, 2, 3, // round 6
];

/// A draft participant, ordered by `order` within the league.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Snapshot of whose turn it is.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftTurn {
    /// 1-based round number.
    pub round: u32,
    /// The participant on the clock, `None` once the draft is complete.
    pub current: Option<Participant>,
    /// Participants in the order they pick this round.
    pub order: Vec<Participant>,
    pub complete: bool,
}

/// Participant slot (1-based) for an absolute pick number under the
/// fixed table, or `None` when the pick number is outside the table.
pub fn fixed_slot_for_pick(pick_number: usize) -> Option<usize> {
    if pick_number == 0 {
        return None;
    }
    FIXED_PICK_SLOTS
        .get(pick_number - 1)
        .map(|slot| *slot as usize)
}

/// Compute the turn state after `picks_taken` picks.
///
/// Leagues with exactly [`FIXED_ORDER_PARTICIPANTS`] members use the
/// fixed table; any other size falls back to snake ordering (or a
/// straight round-robin when `snake` is false). Completion is reached
/// at `participants.len() * quota` picks, and for the fixed table also
/// when the table is exhausted.
pub fn compute_turn(
    participants: &[Participant],
    picks_taken: usize,
    snake: bool,
    quota: u32,
) -> DraftTurn {
    let n = participants.len();
    if n == 0 {
        return DraftTurn {
            round: 1,
            current: None,
            order: Vec::new(),
            complete: true,
        };
    }

    let total = n * quota as usize;

    if n == FIXED_ORDER_PARTICIPANTS {
        let next_pick = picks_taken + 1;
        let slot = fixed_slot_for_pick(next_pick);
        let complete = picks_taken >= total || slot.is_none();
        let round = next_pick.div_ceil(n) as u32;
        let current = if complete {
            None
        } else {
            slot.and_then(|s| participants.get(s - 1)).cloned()
        };
        // Display order for the round the next pick falls in.
        let round_start = (next_pick - 1) / n * n;
        let order: Vec<Participant> = (round_start + 1..=round_start + n)
            .filter_map(|p| fixed_slot_for_pick(p))
            .filter_map(|s| participants.get(s - 1))
            .cloned()
            .collect();
        let order = if order.len() == n {
            order
        } else {
            participants.to_vec()
        };
        return DraftTurn {
            round,
            current,
            order,
            complete,
        };
    }

    let round_index = picks_taken / n;
    let index_in_round = picks_taken % n;
    let mut order: Vec<Participant> = participants.to_vec();
    if snake && round_index % 2 == 1 {
        order.reverse();
    }
    let complete = picks_taken >= total;
    let current = if complete {
        None
    } else {
        order.get(index_in_round).cloned()
    };
    DraftTurn {
        round: round_index as u32 + 1,
        current,
        order,
        complete,
    }
}
