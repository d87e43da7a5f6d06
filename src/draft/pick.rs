//! Pick records and legality rules.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::draft::order::{self, Participant};
use crate::teams;

/// A single draft pick: one team claimed by one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pick {
    pub team_id: String,
    pub player_id: String,
    /// 1-based, contiguous within a league, never reused.
    pub pick_number: u32,
}

#[derive(Debug, Error, PartialEq)]
pub enum PickError {
    #[error("unknown team code: {0}")]
    UnknownTeam(String),
    #[error("team {0} has already been picked")]
    TeamTaken(String),
    #[error("participant {player_id} already holds {quota} teams")]
    QuotaReached { player_id: String, quota: u32 },
    #[error("the draft is complete")]
    DraftComplete,
    #[error("no participant is on the clock")]
    NoCurrentParticipant,
    #[error("pick numbers must be contiguous from 1 (found {found}, expected {expected})")]
    NonContiguous { found: u32, expected: u32 },
}

/// Validate and append a pick for whoever is currently on the clock.
///
/// Rejects unknown team codes, duplicate teams, picks past the quota
/// and picks after completion. On success the pick is appended with the
/// next contiguous pick number and returned.
pub fn apply_pick(
    picks: &mut Vec<Pick>,
    participants: &[Participant],
    snake: bool,
    quota: u32,
    team_id: &str,
) -> Result<Pick, PickError> {
    let team = teams::normalize_team_code(team_id)
        .ok_or_else(|| PickError::UnknownTeam(team_id.to_string()))?;

    let turn = order::compute_turn(participants, picks.len(), snake, quota);
    if turn.complete {
        return Err(PickError::DraftComplete);
    }
    let current = turn.current.ok_or(PickError::NoCurrentParticipant)?;

    if picks.iter().any(|p| p.team_id == team) {
        return Err(PickError::TeamTaken(team));
    }
    let held = picks.iter().filter(|p| p.player_id == current.id).count();
    if held >= quota as usize {
        return Err(PickError::QuotaReached {
            player_id: current.id,
            quota,
        });
    }

    let pick = Pick {
        team_id: team,
        player_id: current.id,
        pick_number: picks.len() as u32 + 1,
    };
    picks.push(pick.clone());
    Ok(pick)
}

/// Remove and return the most recent pick. Only the highest-numbered
/// pick can ever be undone.
pub fn undo_last(picks: &mut Vec<Pick>) -> Option<Pick> {
    picks.pop()
}

/// Validate a full pick list as a legal draft sequence.
///
/// Used when a client submits its pick list wholesale: numbering must
/// be contiguous from 1, team codes canonical and unique, and no
/// participant may exceed the quota. The list is returned sorted by
/// pick number with codes normalized.
pub fn replay_picks(
    raw: &[Pick],
    participants: &[Participant],
    quota: u32,
) -> Result<Vec<Pick>, PickError> {
    let mut sorted: Vec<Pick> = raw.to_vec();
    sorted.sort_by_key(|p| p.pick_number);

    let mut out: Vec<Pick> = Vec::with_capacity(sorted.len());
    for (i, pick) in sorted.iter().enumerate() {
        let expected = i as u32 + 1;
        if pick.pick_number != expected {
            return Err(PickError::NonContiguous {
                found: pick.pick_number,
                expected,
            });
        }
        let team = teams::normalize_team_code(&pick.team_id)
            .ok_or_else(|| PickError::UnknownTeam(pick.team_id.clone()))?;
        if out.iter().any(|p: &Pick| p.team_id == team) {
            return Err(PickError::TeamTaken(team));
        }
        let held = out.iter().filter(|p| p.player_id == pick.player_id).count();
        if held >= quota as usize {
            return Err(PickError::QuotaReached {
                player_id: pick.player_id.clone(),
                quota,
            });
        }
        out.push(Pick {
            team_id: team,
            player_id: pick.player_id.clone(),
            pick_number: expected,
        });
    }

    let total = participants.len() * quota as usize;
    if out.len() > total {
        return Err(PickError::DraftComplete);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants(n: usize) -> Vec<Participant> {
        (0..n)
            .map(|i| Participant {
                id: format!("p{}", i + 1),
                name: format!("Player {}", i + 1),
                order: i as i64,
                user_id: None,
            })
            .collect()
    }

    #[test]
    fn apply_assigns_contiguous_numbers() {
        let players = participants(5);
        let mut picks = Vec::new();
        let p1 = apply_pick(&mut picks, &players, true, 6, "KC").unwrap();
        assert_eq!(p1.pick_number, 1);
        assert_eq!(p1.player_id, "p1");
        let p2 = apply_pick(&mut picks, &players, true, 6, "BUF").unwrap();
        assert_eq!(p2.pick_number, 2);
        assert_eq!(p2.player_id, "p2");
    }

    #[test]
    fn apply_normalizes_alias_codes() {
        let players = participants(5);
        let mut picks = Vec::new();
        let pick = apply_pick(&mut picks, &players, true, 6, "lar").unwrap();
        assert_eq!(pick.team_id, "LA");
    }

    #[test]
    fn rejects_unknown_team() {
        let players = participants(5);
        let mut picks = Vec::new();
        let err = apply_pick(&mut picks, &players, true, 6, "XYZ").unwrap_err();
        assert_eq!(err, PickError::UnknownTeam("XYZ".to_string()));
        assert!(picks.is_empty());
    }

    #[test]
    fn rejects_duplicate_team() {
        let players = participants(5);
        let mut picks = Vec::new();
        apply_pick(&mut picks, &players, true, 6, "KC").unwrap();
        let err = apply_pick(&mut picks, &players, true, 6, "KC").unwrap_err();
        assert_eq!(err, PickError::TeamTaken("KC".to_string()));
        assert_eq!(picks.len(), 1);
    }

    #[test]
    fn rejects_pick_after_completion() {
        let players = participants(2);
        let mut picks = Vec::new();
        for team in ["KC", "BUF", "MIA", "NE"] {
            apply_pick(&mut picks, &players, true, 2, team).unwrap();
        }
        let err = apply_pick(&mut picks, &players, true, 2, "NYJ").unwrap_err();
        assert_eq!(err, PickError::DraftComplete);
    }

    #[test]
    fn undo_removes_only_the_latest() {
        let players = participants(5);
        let mut picks = Vec::new();
        apply_pick(&mut picks, &players, true, 6, "KC").unwrap();
        apply_pick(&mut picks, &players, true, 6, "BUF").unwrap();
        let undone = undo_last(&mut picks).unwrap();
        assert_eq!(undone.team_id, "BUF");
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].team_id, "KC");
        // Numbering stays contiguous for the next pick.
        let next = apply_pick(&mut picks, &players, true, 6, "MIA").unwrap();
        assert_eq!(next.pick_number, 2);
    }

    #[test]
    fn replay_accepts_legal_sequence_out_of_order() {
        let players = participants(5);
        let raw = vec![
            Pick { team_id: "buf".into(), player_id: "p2".into(), pick_number: 2 },
            Pick { team_id: "KC".into(), player_id: "p1".into(), pick_number: 1 },
        ];
        let picks = replay_picks(&raw, &players, 6).unwrap();
        assert_eq!(picks[0].team_id, "KC");
        assert_eq!(picks[1].team_id, "BUF");
        assert_eq!(picks[1].pick_number, 2);
    }

    #[test]
    fn replay_rejects_gaps_and_repeats() {
        let players = participants(5);
        let gap = vec![
            Pick { team_id: "KC".into(), player_id: "p1".into(), pick_number: 1 },
            Pick { team_id: "BUF".into(), player_id: "p2".into(), pick_number: 3 },
        ];
        assert_eq!(
            replay_picks(&gap, &players, 6).unwrap_err(),
            PickError::NonContiguous { found: 3, expected: 2 }
        );
        let dup = vec![
            Pick { team_id: "KC".into(), player_id: "p1".into(), pick_number: 1 },
            Pick { team_id: "JAC".into(), player_id: "p2".into(), pick_number: 1 },
        ];
        assert!(matches!(
            replay_picks(&dup, &players, 6).unwrap_err(),
            PickError::NonContiguous { .. }
        ));
    }

    #[test]
    fn replay_enforces_quota() {
        let players = participants(5);
        let raw = vec![
            Pick { team_id: "KC".into(), player_id: "p1".into(), pick_number: 1 },
            Pick { team_id: "BUF".into(), player_id: "p1".into(), pick_number: 2 },
            Pick { team_id: "MIA".into(), player_id: "p1".into(), pick_number: 3 },
        ];
        assert_eq!(
            replay_picks(&raw, &players, 2).unwrap_err(),
            PickError::QuotaReached { player_id: "p1".into(), quota: 2 }
        );
    }
}
