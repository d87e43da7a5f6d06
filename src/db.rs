// SQLite persistence layer for leagues, participants, picks and team wins.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};

use crate::draft::order::Participant;
use crate::draft::pick::{self, Pick};
use crate::merge::{self, MergeError, MergeOutcome, MergePlan};
use crate::teams;

/// A wins-pool league. `teams_per_player` is the per-participant pick
/// quota; `snake` selects the fallback ordering policy.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct League {
    pub id: String,
    pub code: String,
    pub name: String,
    pub teams_per_player: u32,
    pub snake: bool,
    pub created_at: String,
}

/// Whether a win upsert touched an existing row or created one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinWrite {
    Updated,
    Created,
}

/// SQLite-backed persistence for leagues, their participants, draft
/// picks, and per-team win records.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS leagues (
                id               TEXT PRIMARY KEY,
                code             TEXT NOT NULL UNIQUE,
                name             TEXT NOT NULL,
                teams_per_player INTEGER NOT NULL DEFAULT 6,
                snake            INTEGER NOT NULL DEFAULT 1,
                created_at       TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE IF NOT EXISTS players (
                id        TEXT PRIMARY KEY,
                league_id TEXT NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
                name      TEXT NOT NULL,
                ord       INTEGER NOT NULL,
                user_id   TEXT,
                UNIQUE(league_id, ord)
            );

            CREATE TABLE IF NOT EXISTS picks (
                league_id   TEXT NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
                pick_number INTEGER NOT NULL,
                team_id     TEXT NOT NULL,
                player_id   TEXT NOT NULL REFERENCES players(id),
                PRIMARY KEY (league_id, pick_number),
                UNIQUE (league_id, team_id)
            );

            CREATE TABLE IF NOT EXISTS team_wins (
                league_id TEXT NOT NULL REFERENCES leagues(id) ON DELETE CASCADE,
                team_id   TEXT NOT NULL,
                wins      INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (league_id, team_id)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Generate a unique row id from the current UTC timestamp plus a
    /// short random suffix (several rows are often created in the same
    /// millisecond when seeding a league).
    pub fn generate_row_id(prefix: &str) -> String {
        let now = chrono::Utc::now();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..4)
            .map(|_| {
                let chars = b"abcdefghijklmnopqrstuvwxyz0123456789";
                chars[rng.gen_range(0..chars.len())] as char
            })
            .collect();
        format!("{prefix}_{}_{suffix}", now.format("%Y%m%d%H%M%S%3f"))
    }

    /// Whether a join code is already taken.
    pub fn code_exists(&self, code: &str) -> Result<bool> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM leagues WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .context("failed to check league code")?;
        Ok(count > 0)
    }

    /// Create a league and seed it: five placeholder participants
    /// ("Player 1".."Player 5") and a zero-win row for each of the 32
    /// teams, all in one transaction.
    pub fn create_league(
        &self,
        name: &str,
        teams_per_player: u32,
        snake: bool,
        code: &str,
    ) -> Result<League> {
        let mut conn = self.conn();
        let tx = conn
            .transaction()
            .context("failed to begin create_league transaction")?;

        let id = Self::generate_row_id("lg");
        tx.execute(
            "INSERT INTO leagues (id, code, name, teams_per_player, snake) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, code, name, teams_per_player, snake],
        )
        .context("failed to insert league")?;

        for i in 0..merge::MAX_PLAYERS {
            tx.execute(
                "INSERT INTO players (id, league_id, name, ord) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Self::generate_row_id("pl"),
                    id,
                    merge::default_player_name(i),
                    i as i64
                ],
            )
            .context("failed to seed league players")?;
        }

        for team in teams::NFL_TEAMS {
            tx.execute(
                "INSERT INTO team_wins (league_id, team_id, wins) VALUES (?1, ?2, 0)",
                params![id, team],
            )
            .context("failed to seed team wins")?;
        }

        tx.commit().context("failed to commit create_league")?;
        drop(conn);

        self.find_league(&id)?
            .context("created league not found on re-read")
    }

    /// Look up a league by id or by join code (codes are stored
    /// uppercase; lookups are case-insensitive on the code).
    pub fn find_league(&self, key: &str) -> Result<Option<League>> {
        let conn = self.conn();
        let league = conn
            .query_row(
                "SELECT id, code, name, teams_per_player, snake, created_at
                 FROM leagues WHERE id = ?1 OR code = UPPER(?1)",
                params![key],
                |row| {
                    Ok(League {
                        id: row.get(0)?,
                        code: row.get(1)?,
                        name: row.get(2)?,
                        teams_per_player: row.get(3)?,
                        snake: row.get::<_, i64>(4)? != 0,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .context("failed to query league")?;
        Ok(league)
    }

    /// All league ids, for sync fan-out.
    pub fn league_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT id FROM leagues ORDER BY created_at")
            .context("failed to prepare league_ids query")?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("failed to query league ids")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map league id rows")?;
        Ok(ids)
    }

    /// Participants of a league in draft-seat order.
    pub fn load_participants(&self, league_id: &str) -> Result<Vec<Participant>> {
        let conn = self.conn();
        Self::query_participants(&conn, league_id).context("failed to load participants")
    }

    fn query_participants(
        conn: &Connection,
        league_id: &str,
    ) -> rusqlite::Result<Vec<Participant>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, ord, user_id FROM players WHERE league_id = ?1 ORDER BY ord",
        )?;
        let rows = stmt
            .query_map(params![league_id], |row| {
                Ok(Participant {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    order: row.get(2)?,
                    user_id: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Picks of a league ordered by pick number.
    pub fn load_picks(&self, league_id: &str) -> Result<Vec<Pick>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT team_id, player_id, pick_number
                 FROM picks WHERE league_id = ?1 ORDER BY pick_number",
            )
            .context("failed to prepare load_picks query")?;
        let picks = stmt
            .query_map(params![league_id], |row| {
                Ok(Pick {
                    team_id: row.get(0)?,
                    player_id: row.get(1)?,
                    pick_number: row.get(2)?,
                })
            })
            .context("failed to query picks")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map pick rows")?;
        Ok(picks)
    }

    /// Win counts keyed by canonical team code.
    pub fn load_team_wins(&self, league_id: &str) -> Result<HashMap<String, u32>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT team_id, wins FROM team_wins WHERE league_id = ?1")
            .context("failed to prepare load_team_wins query")?;
        let wins = stmt
            .query_map(params![league_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
            })
            .context("failed to query team wins")?
            .collect::<std::result::Result<HashMap<_, _>, _>>()
            .context("failed to map team win rows")?;
        Ok(wins)
    }

    /// Idempotent win write: update the existing row, create it when the
    /// league has no record for that team yet. Reports which happened.
    pub fn upsert_team_win(
        &self,
        league_id: &str,
        team_id: &str,
        wins: u32,
    ) -> Result<WinWrite> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE team_wins SET wins = ?3 WHERE league_id = ?1 AND team_id = ?2",
                params![league_id, team_id, wins],
            )
            .context("failed to update team wins")?;
        if updated > 0 {
            return Ok(WinWrite::Updated);
        }
        conn.execute(
            "INSERT INTO team_wins (league_id, team_id, wins) VALUES (?1, ?2, ?3)",
            params![league_id, team_id, wins],
        )
        .context("failed to insert team wins")?;
        Ok(WinWrite::Created)
    }

    /// Run arbitrary SQL against the underlying connection. Test-only
    /// escape hatch for setting up failure fixtures.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<()> {
        self.conn()
            .execute_batch(sql)
            .context("failed to execute raw sql")
    }

    /// Execute a [`MergePlan`] against one league in a single
    /// transaction. Any failure rolls back the whole merge.
    ///
    /// Replacing the participant set assigns fresh server ids and remaps
    /// pick references through the client-id map (positional `__idx_N`
    /// ids included); a pick referencing a player outside the league
    /// rejects the entire operation.
    pub fn apply_merge(
        &self,
        league_id: &str,
        plan: &MergePlan,
    ) -> std::result::Result<MergeOutcome, MergeError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "UPDATE leagues SET
                name = COALESCE(?1, name),
                teams_per_player = COALESCE(?2, teams_per_player),
                snake = COALESCE(?3, snake)
             WHERE id = ?4",
            params![plan.name, plan.quota, plan.snake, league_id],
        )?;

        let mut id_map: HashMap<String, String> = HashMap::new();
        let players_replaced = plan.players.is_some();
        if let Some(planned) = plan.players.as_deref() {
            // Old picks reference the rows being deleted, so they go first.
            tx.execute("DELETE FROM picks WHERE league_id = ?1", params![league_id])?;
            tx.execute("DELETE FROM players WHERE league_id = ?1", params![league_id])?;
            for p in planned {
                let new_id = Self::generate_row_id("pl");
                tx.execute(
                    "INSERT INTO players (id, league_id, name, ord, user_id) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![new_id, league_id, p.name, p.order, p.user_id],
                )?;
                id_map.insert(p.client_id.clone(), new_id);
            }
        }

        let picks_action = if let Some(planned) = plan.picks.as_deref() {
            let participants = Self::query_participants(&tx, league_id)?;
            let quota: u32 = tx.query_row(
                "SELECT teams_per_player FROM leagues WHERE id = ?1",
                params![league_id],
                |row| row.get(0),
            )?;

            let member_ids: Vec<&str> =
                participants.iter().map(|p| p.id.as_str()).collect();
            let mut foreign: Vec<String> = Vec::new();
            let raw: Vec<Pick> = planned
                .iter()
                .map(|p| {
                    let mapped = id_map
                        .get(&p.player_ref)
                        .cloned()
                        .unwrap_or_else(|| p.player_ref.clone());
                    if !member_ids.contains(&mapped.as_str()) {
                        foreign.push(mapped.clone());
                    }
                    Pick {
                        team_id: p.team_id.clone(),
                        player_id: mapped,
                        pick_number: p.pick_number,
                    }
                })
                .collect();
            if !foreign.is_empty() {
                foreign.sort();
                foreign.dedup();
                return Err(MergeError::PlayersNotInLeague(foreign.join(", ")));
            }

            let legal = pick::replay_picks(&raw, &participants, quota)?;
            if !players_replaced {
                tx.execute("DELETE FROM picks WHERE league_id = ?1", params![league_id])?;
            }
            for p in &legal {
                tx.execute(
                    "INSERT INTO picks (league_id, pick_number, team_id, player_id) VALUES (?1, ?2, ?3, ?4)",
                    params![league_id, p.pick_number, p.team_id, p.player_id],
                )?;
            }
            "replaced"
        } else if players_replaced {
            "cleared"
        } else {
            "preserved"
        };

        for (team, wins) in &plan.wins {
            tx.execute(
                "INSERT INTO team_wins (league_id, team_id, wins) VALUES (?1, ?2, ?3)
                 ON CONFLICT(league_id, team_id) DO UPDATE SET wins = excluded.wins",
                params![league_id, team, wins],
            )?;
        }

        tx.commit()?;

        Ok(MergeOutcome {
            players_action: if players_replaced { "replaced" } else { "preserved" },
            picks_action,
            wins_action: if plan.wins_provided { "upserted" } else { "preserved" },
        })
    }
}
