//! Win-sync reconciliation.
//!
//! Pulls a season snapshot from the configured provider, normalizes it
//! against the canonical team set, and upserts win records into every
//! league. The provider is the source of truth; local values are
//! overwritten, except that an empty or all-zero snapshot is treated as
//! a provider outage and skipped.

pub mod provider;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::db::{Database, WinWrite};
use crate::events::{EventBus, LeagueEvent};
use crate::teams;

pub use provider::{ProviderError, StubProvider, WinsMap, WinsProvider};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    pub season: Option<i32>,
    pub week: Option<u32>,
    pub dry_run: bool,
}

/// One normalized win record ready to write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamWinUpdate {
    pub team_id: String,
    pub wins: u32,
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub provider: String,
    pub season: i32,
    /// Teams that survived normalization.
    pub count: usize,
    /// Provider entries discarded as unknown codes.
    pub dropped: usize,
    pub leagues: usize,
    pub updated: usize,
    pub created: usize,
    pub failed: usize,
    pub dry_run: bool,
    /// The computed update set, echoed back on dry runs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updates: Option<Vec<TeamWinUpdate>>,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("wins sync is disabled")]
    Disabled,
    #[error("missing or invalid sync credential")]
    Unauthorized,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("provider returned no usable team records")]
    NoUpdates,
    #[error("provider returned zero wins for every team")]
    AllZero,
    #[error("database error during sync: {0}")]
    Db(#[from] anyhow::Error),
}

/// Check the sync gate: the feature flag must be on and the caller's
/// bearer token must match the configured admin token. Never log the
/// token values.
pub fn authorize(cfg: &SyncConfig, bearer: Option<&str>) -> Result<(), SyncError> {
    if !cfg.enabled {
        return Err(SyncError::Disabled);
    }
    let expected = cfg.admin_token.as_deref().ok_or(SyncError::Unauthorized)?;
    match bearer {
        Some(token) if token == expected => Ok(()),
        _ => Err(SyncError::Unauthorized),
    }
}

/// Normalize a raw provider snapshot: resolve aliases, drop unknown
/// codes, clamp win counts. Returns the surviving updates (sorted by
/// team for deterministic output) and the number of dropped entries.
pub fn normalize_snapshot(raw: &WinsMap) -> (Vec<TeamWinUpdate>, usize) {
    let mut dropped = 0usize;
    let mut updates: Vec<TeamWinUpdate> = raw
        .iter()
        .filter_map(|(code, wins)| match teams::normalize_team_code(code) {
            Some(team_id) => Some(TeamWinUpdate {
                team_id,
                wins: teams::clamp_wins(*wins),
            }),
            None => {
                warn!(code = %code, "dropping unknown team from provider snapshot");
                dropped += 1;
                None
            }
        })
        .collect();
    updates.sort_by(|a, b| a.team_id.cmp(&b.team_id));
    (updates, dropped)
}

/// Run one reconciliation cycle across every league.
///
/// A provider failure aborts before any write. Guard skips (`NoUpdates`,
/// `AllZero`) leave the database untouched. Individual row-write
/// failures are counted and skipped so one bad row cannot starve the
/// rest of the batch. Each touched league gets a `wins-sync`
/// notification.
pub async fn run_sync(
    db: &Database,
    bus: &EventBus,
    provider: &dyn WinsProvider,
    opts: SyncOptions,
) -> Result<SyncReport, SyncError> {
    let season = opts.season.unwrap_or_else(current_season);
    let raw = provider.fetch_wins(Some(season), opts.week).await?;
    let (updates, dropped) = normalize_snapshot(&raw);

    if updates.is_empty() {
        return Err(SyncError::NoUpdates);
    }
    if updates.iter().all(|u| u.wins == 0) {
        return Err(SyncError::AllZero);
    }

    let mut report = SyncReport {
        provider: provider.name().to_string(),
        season,
        count: updates.len(),
        dropped,
        leagues: 0,
        updated: 0,
        created: 0,
        failed: 0,
        dry_run: opts.dry_run,
        updates: None,
    };

    if opts.dry_run {
        report.updates = Some(updates);
        return Ok(report);
    }

    let league_ids = db.league_ids()?;
    report.leagues = league_ids.len();
    for league_id in &league_ids {
        for update in &updates {
            match db.upsert_team_win(league_id, &update.team_id, update.wins) {
                Ok(WinWrite::Updated) => report.updated += 1,
                Ok(WinWrite::Created) => report.created += 1,
                Err(err) => {
                    warn!(
                        league_id = %league_id,
                        team = %update.team_id,
                        error = %err,
                        "win upsert failed"
                    );
                    report.failed += 1;
                }
            }
        }
        bus.emit(league_id, LeagueEvent::WinsSync);
    }

    info!(
        season,
        teams = report.count,
        leagues = report.leagues,
        updated = report.updated,
        created = report.created,
        failed = report.failed,
        dropped = report.dropped,
        "wins sync complete"
    );
    Ok(report)
}

// The NFL season is named for the calendar year it starts in.
fn current_season() -> i32 {
    use chrono::Datelike;
    chrono::Utc::now().year()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_config(enabled: bool, token: Option<&str>) -> SyncConfig {
        SyncConfig {
            enabled,
            dry_run: false,
            provider: "stub".to_string(),
            admin_token: token.map(str::to_string),
            season: None,
        }
    }

    fn wins(pairs: &[(&str, i64)]) -> WinsMap {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn authorize_requires_flag_and_matching_token() {
        let cfg = sync_config(false, Some("secret"));
        assert!(matches!(
            authorize(&cfg, Some("secret")),
            Err(SyncError::Disabled)
        ));

        let cfg = sync_config(true, Some("secret"));
        assert!(authorize(&cfg, Some("secret")).is_ok());
        assert!(matches!(
            authorize(&cfg, Some("wrong")),
            Err(SyncError::Unauthorized)
        ));
        assert!(matches!(authorize(&cfg, None), Err(SyncError::Unauthorized)));

        let cfg = sync_config(true, None);
        assert!(matches!(
            authorize(&cfg, Some("anything")),
            Err(SyncError::Unauthorized)
        ));
    }

    #[test]
    fn normalize_resolves_aliases_and_drops_unknowns() {
        let raw = wins(&[("LAR", 9), ("kc", 11), ("XFL", 3), ("BUF", -2), ("NE", 25)]);
        let (updates, dropped) = normalize_snapshot(&raw);
        assert_eq!(dropped, 1);
        assert_eq!(
            updates,
            vec![
                TeamWinUpdate { team_id: "BUF".into(), wins: 0 },
                TeamWinUpdate { team_id: "KC".into(), wins: 11 },
                TeamWinUpdate { team_id: "LA".into(), wins: 9 },
                TeamWinUpdate { team_id: "NE".into(), wins: 20 },
            ]
        );
    }

    struct OutageProvider;

    #[async_trait::async_trait]
    impl WinsProvider for OutageProvider {
        fn name(&self) -> &'static str {
            "outage"
        }

        async fn fetch_wins(
            &self,
            _season: Option<i32>,
            _week: Option<u32>,
        ) -> Result<WinsMap, ProviderError> {
            Err(ProviderError::Malformed("listing unavailable".into()))
        }
    }

    #[tokio::test]
    async fn provider_failure_aborts_the_cycle_with_no_writes() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let league = db.create_league("A", 6, true, "NFL-AAA").unwrap();
        db.upsert_team_win(&league.id, "KC", 9).unwrap();

        let err = run_sync(&db, &bus, &OutageProvider, SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Provider(_)));
        // Existing records untouched.
        let wins = db.load_team_wins(&league.id).unwrap();
        assert_eq!(wins["KC"], 9);
        assert_eq!(wins["BUF"], 0);
    }

    #[tokio::test]
    async fn row_write_failure_is_counted_and_the_batch_continues() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let league = db.create_league("A", 6, true, "NFL-AAA").unwrap();
        // Make writes to one team's row fail.
        db.execute_raw(
            "CREATE TRIGGER reject_kc_updates BEFORE UPDATE ON team_wins
             WHEN NEW.team_id = 'KC'
             BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;",
        )
        .unwrap();

        let provider = StubProvider::new(wins(&[("KC", 11), ("BUF", 4)]));
        let report = run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.updated, 1);

        let stored = db.load_team_wins(&league.id).unwrap();
        assert_eq!(stored["BUF"], 4);
        assert_eq!(stored["KC"], 0);
    }

    #[tokio::test]
    async fn empty_snapshot_trips_the_no_updates_guard() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let provider = StubProvider::empty();
        let err = run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoUpdates));
    }

    #[tokio::test]
    async fn unknown_only_snapshot_trips_the_no_updates_guard() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let provider = StubProvider::new(wins(&[("XFL", 5), ("USFL", 2)]));
        let err = run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoUpdates));
    }

    #[tokio::test]
    async fn all_zero_snapshot_is_skipped() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let provider = StubProvider::new(wins(&[("KC", 0), ("BUF", 0)]));
        let err = run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AllZero));
    }

    #[tokio::test]
    async fn sync_writes_to_every_league_and_reports_counts() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let a = db.create_league("A", 6, true, "NFL-AAA").unwrap();
        let b = db.create_league("B", 6, true, "NFL-BBB").unwrap();
        let provider = StubProvider::new(wins(&[("KC", 11), ("LAR", 8), ("XFL", 1)]));

        let report = run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.dropped, 1);
        assert_eq!(report.leagues, 2);
        // Seed rows exist for every canonical team, so these are updates.
        assert_eq!(report.updated, 4);
        assert_eq!(report.created, 0);
        assert_eq!(report.failed, 0);

        for league in [&a, &b] {
            let wins = db.load_team_wins(&league.id).unwrap();
            assert_eq!(wins["KC"], 11);
            assert_eq!(wins["LA"], 8);
            assert_eq!(wins["BUF"], 0);
        }
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let league = db.create_league("A", 6, true, "NFL-AAA").unwrap();
        let provider = StubProvider::new(wins(&[("KC", 11)]));

        let first = run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap();
        let second = run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(first.updated, 1);
        assert_eq!(second.updated, 1);
        assert_eq!(db.load_team_wins(&league.id).unwrap()["KC"], 11);
    }

    #[tokio::test]
    async fn dry_run_computes_without_writing() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let league = db.create_league("A", 6, true, "NFL-AAA").unwrap();
        let provider = StubProvider::new(wins(&[("KC", 11)]));

        let opts = SyncOptions { dry_run: true, ..SyncOptions::default() };
        let report = run_sync(&db, &bus, &provider, opts).await.unwrap();
        assert!(report.dry_run);
        assert_eq!(
            report.updates.unwrap(),
            vec![TeamWinUpdate { team_id: "KC".into(), wins: 11 }]
        );
        assert_eq!(report.updated, 0);
        assert_eq!(db.load_team_wins(&league.id).unwrap()["KC"], 0);
    }

    #[tokio::test]
    async fn sync_notifies_league_subscribers() {
        let db = Database::open(":memory:").unwrap();
        let bus = EventBus::new();
        let league = db.create_league("A", 6, true, "NFL-AAA").unwrap();
        let mut rx = bus.subscribe(&league.id);
        let provider = StubProvider::new(wins(&[("KC", 11)]));

        run_sync(&db, &bus, &provider, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), LeagueEvent::WinsSync);
    }
}
