// Canonical NFL team codes, provider alias resolution, and win clamping.

/// The 32 canonical team codes. Every team identifier stored anywhere in the
/// system is drawn from this set; provider-specific codes are resolved through
/// [`normalize_team_code`] or discarded.
pub const NFL_TEAMS: [&str; 32] = [
    "BUF", "MIA", "NE", "NYJ", "BAL", "CIN", "CLE", "PIT", "HOU", "IND", "JAX",
    "TEN", "DEN", "KC", "LV", "LAC", "DAL", "NYG", "PHI", "WAS", "CHI", "DET",
    "GB", "MIN", "ATL", "CAR", "NO", "TB", "ARI", "LA", "SF", "SEA",
];

/// Known legacy/provider-specific aliases and the canonical codes they map to.
const ALIASES: [(&str, &str); 6] = [
    ("LAR", "LA"),
    ("JAC", "JAX"),
    ("WSH", "WAS"),
    ("ARZ", "ARI"),
    ("SD", "LAC"),
    ("OAK", "LV"),
];

/// A season has at most ~20 games; win counts are clamped to this ceiling.
pub const MAX_SEASON_WINS: u32 = 20;

/// Whether `code` is one of the 32 canonical team codes (case-sensitive,
/// canonical codes are uppercase).
pub fn is_canonical(code: &str) -> bool {
    NFL_TEAMS.contains(&code)
}

/// Resolve a raw provider/team identifier to a canonical code.
///
/// Uppercases the input, applies the alias table, and returns `None` when the
/// result is not in the canonical set (unknown identifiers are discarded, not
/// passed through).
pub fn normalize_team_code(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let up = raw.to_uppercase();
    let resolved = ALIASES
        .iter()
        .find(|(alias, _)| *alias == up)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(up.as_str());
    is_canonical(resolved).then(|| resolved.to_string())
}

/// Clamp a raw win value to the valid range [0, MAX_SEASON_WINS].
/// Negative values coerce to 0.
pub fn clamp_wins(raw: i64) -> u32 {
    raw.clamp(0, MAX_SEASON_WINS as i64) as u32
}
