//! Client/server state-merge planning.
//!
//! A PATCH payload is a partial snapshot of the client's league state.
//! `plan_merge` normalizes it into a [`MergePlan`] of concrete actions;
//! `Database::apply_merge` executes the plan in one transaction.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::draft::pick::PickError;
use crate::teams;

pub const MAX_LEAGUE_NAME: usize = 100;
pub const MAX_PLAYER_NAME: usize = 80;
pub const MAX_PLAYERS: usize = 5;
pub const MIN_QUOTA: i64 = 1;
pub const MAX_QUOTA: i64 = 10;
pub const DEFAULT_QUOTA: u32 = 6;
pub const DEFAULT_LEAGUE_NAME: &str = "NFL Wins Pool";

/// Placeholder name seeded for the participant at 0-based position `i`.
pub fn default_player_name(i: usize) -> String {
    format!("Player {}", i + 1)
}

/// Partial league snapshot as sent by clients. Absent fields mean
/// "leave untouched".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaguePatch {
    pub league_name: Option<String>,
    pub teams_per_player: Option<i64>,
    pub snake: Option<bool>,
    pub players: Option<Vec<PlayerPayload>>,
    pub picks: Option<Vec<PickPayload>>,
    pub team_wins: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerPayload {
    /// Server id if the player was loaded from us, client temp id (or
    /// absent) otherwise.
    pub id: Option<String>,
    pub name: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PickPayload {
    pub team_id: String,
    /// Reference into the submitted player list (server id or temp id).
    pub player_id: String,
    pub pick_number: i64,
}

/// A participant row to be written, keyed back to the client's id so
/// pick references can be remapped after new ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPlayer {
    /// The client's id for this player, or a positional `__idx_N`
    /// fallback when the client sent none.
    pub client_id: String,
    pub name: String,
    pub order: i64,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPick {
    pub team_id: String,
    pub player_ref: String,
    pub pick_number: u32,
}

/// Normalized actions derived from a [`LeaguePatch`].
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    pub name: Option<String>,
    pub quota: Option<u32>,
    pub snake: Option<bool>,
    /// `Some` means delete-and-recreate the participant set. `None`
    /// preserves existing players (absent, empty, or bootstrap input).
    pub players: Option<Vec<PlannedPlayer>>,
    /// `Some` means replace the pick set after remapping player refs.
    pub picks: Option<Vec<PlannedPick>>,
    /// Clamped win overrides, applied independently of players/picks.
    pub wins: Vec<(String, u32)>,
    pub wins_provided: bool,
    /// True when a players payload was dropped by the bootstrap check.
    pub bootstrap_skipped: bool,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("picks reference players outside this league: {0}")]
    PlayersNotInLeague(String),
    #[error("invalid pick list: {0}")]
    InvalidPicks(#[from] PickError),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

/// What `apply_merge` actually did, echoed back to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub players_action: &'static str,
    pub picks_action: &'static str,
    pub wins_action: &'static str,
}

/// Whether a submitted player list looks like an uninitialized client
/// snapshot: every entry lacks a server id and still carries the
/// placeholder name for its position. Heuristic; a fully renamed-back
/// roster with no ids is indistinguishable and will also be skipped.
pub fn looks_like_bootstrap(players: &[PlannedPlayer]) -> bool {
    !players.is_empty()
        && players.iter().enumerate().all(|(i, p)| {
            p.client_id.starts_with("__idx_") && p.name == default_player_name(i)
        })
}

/// Truncate to `max` characters, not bytes.
fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn clamp_quota(raw: i64) -> u32 {
    raw.clamp(MIN_QUOTA, MAX_QUOTA) as u32
}

/// Coerce a win override to a clamped count. Numbers and
/// string-encoded numbers are accepted; anything else becomes 0.
fn coerce_wins(value: &serde_json::Value) -> u32 {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|v| v.is_finite())
        .map(|v| teams::clamp_wins(v as i64))
        .unwrap_or(0)
}

/// Normalize a patch into the actions to execute. Pure; all coercion
/// and clamping happens here so the executor only moves rows.
pub fn plan_merge(patch: &LeaguePatch) -> MergePlan {
    let mut plan = MergePlan {
        name: patch
            .league_name
            .as_deref()
            .map(|n| truncate(n.trim(), MAX_LEAGUE_NAME)),
        quota: patch.teams_per_player.map(clamp_quota),
        snake: patch.snake,
        ..MergePlan::default()
    };

    if let Some(players) = patch.players.as_deref() {
        let planned: Vec<PlannedPlayer> = players
            .iter()
            .take(MAX_PLAYERS)
            .enumerate()
            .map(|(i, p)| PlannedPlayer {
                client_id: p
                    .id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("__idx_{i}")),
                name: match p.name.as_deref().map(str::trim) {
                    Some(n) if !n.is_empty() => truncate(n, MAX_PLAYER_NAME),
                    _ => default_player_name(i),
                },
                order: i as i64,
                user_id: p.user_id.clone().filter(|id| !id.is_empty()),
            })
            .collect();
        if planned.is_empty() {
            // nothing to write
        } else if looks_like_bootstrap(&planned) {
            plan.bootstrap_skipped = true;
        } else {
            plan.players = Some(planned);
        }
    }

    if let Some(picks) = patch.picks.as_deref() {
        if !picks.is_empty() && !plan.bootstrap_skipped {
            plan.picks = Some(
                picks
                    .iter()
                    .map(|p| PlannedPick {
                        team_id: p.team_id.clone(),
                        player_ref: p.player_id.clone(),
                        pick_number: p.pick_number.max(0) as u32,
                    })
                    .collect(),
            );
        }
    }

    if let Some(wins) = patch.team_wins.as_ref() {
        plan.wins_provided = true;
        let mut entries: Vec<(String, u32)> = wins
            .iter()
            .filter_map(|(raw_code, value)| {
                let Some(code) = teams::normalize_team_code(raw_code) else {
                    warn!(code = %raw_code, "dropping win override for unknown team");
                    return None;
                };
                Some((code, coerce_wins(value)))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        plan.wins = entries;
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch_from(value: serde_json::Value) -> LeaguePatch {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn absent_fields_leave_everything_untouched() {
        let plan = plan_merge(&LeaguePatch::default());
        assert!(plan.name.is_none());
        assert!(plan.quota.is_none());
        assert!(plan.snake.is_none());
        assert!(plan.players.is_none());
        assert!(plan.picks.is_none());
        assert!(!plan.wins_provided);
    }

    #[test]
    fn metadata_is_clamped() {
        let patch = patch_from(json!({
            "leagueName": "x".repeat(150),
            "teamsPerPlayer": 99,
        }));
        let plan = plan_merge(&patch);
        assert_eq!(plan.name.as_ref().unwrap().len(), MAX_LEAGUE_NAME);
        assert_eq!(plan.quota, Some(10));
        let patch = patch_from(json!({ "teamsPerPlayer": 0 }));
        assert_eq!(plan_merge(&patch).quota, Some(1));
    }

    #[test]
    fn players_get_positional_fallback_ids_and_default_names() {
        let patch = patch_from(json!({
            "players": [
                { "id": "p_abc", "name": "Alice" },
                { "name": "  " },
            ]
        }));
        let plan = plan_merge(&patch);
        let players = plan.players.unwrap();
        assert_eq!(players[0].client_id, "p_abc");
        assert_eq!(players[0].name, "Alice");
        assert_eq!(players[1].client_id, "__idx_1");
        assert_eq!(players[1].name, "Player 2");
        assert_eq!(players[1].order, 1);
    }

    #[test]
    fn player_list_is_capped() {
        let entries: Vec<_> = (0..8).map(|i| json!({ "name": format!("N{i}") })).collect();
        let patch = patch_from(json!({ "players": entries }));
        assert_eq!(plan_merge(&patch).players.unwrap().len(), MAX_PLAYERS);
    }

    #[test]
    fn bootstrap_snapshot_is_skipped() {
        let patch = patch_from(json!({
            "players": [
                { "name": "Player 1" },
                { "name": "Player 2" },
            ],
            "picks": [
                { "teamId": "KC", "playerId": "__idx_0", "pickNumber": 1 },
            ]
        }));
        let plan = plan_merge(&patch);
        assert!(plan.bootstrap_skipped);
        assert!(plan.players.is_none());
        assert!(plan.picks.is_none());
    }

    #[test]
    fn renamed_players_are_not_bootstrap() {
        let patch = patch_from(json!({
            "players": [
                { "name": "Player 1" },
                { "name": "Dana" },
            ]
        }));
        let plan = plan_merge(&patch);
        assert!(!plan.bootstrap_skipped);
        assert!(plan.players.is_some());
    }

    #[test]
    fn win_overrides_normalize_and_clamp() {
        let patch = patch_from(json!({
            "teamWins": { "lar": 25, "KC": 7, "XXX": 3, "BUF": "oops", "MIA": "4" }
        }));
        let plan = plan_merge(&patch);
        assert!(plan.wins_provided);
        assert_eq!(
            plan.wins,
            vec![
                ("BUF".to_string(), 0),
                ("KC".to_string(), 7),
                ("LA".to_string(), 20),
                ("MIA".to_string(), 4),
            ]
        );
    }

    #[test]
    fn win_values_coerce_like_loose_json() {
        assert_eq!(coerce_wins(&json!(7)), 7);
        assert_eq!(coerce_wins(&json!(7.9)), 7);
        assert_eq!(coerce_wins(&json!("7")), 7);
        assert_eq!(coerce_wins(&json!(" 12 ")), 12);
        assert_eq!(coerce_wins(&json!("-3")), 0);
        assert_eq!(coerce_wins(&json!("99")), 20);
        assert_eq!(coerce_wins(&json!("oops")), 0);
        assert_eq!(coerce_wins(&json!(null)), 0);
        assert_eq!(coerce_wins(&json!([1])), 0);
    }

    #[test]
    fn negative_pick_numbers_coerce_to_zero() {
        let patch = patch_from(json!({
            "picks": [{ "teamId": "KC", "playerId": "p1", "pickNumber": -4 }]
        }));
        let plan = plan_merge(&patch);
        assert_eq!(plan.picks.unwrap()[0].pick_number, 0);
    }
}
