//! Win-total providers.
//!
//! A provider answers one question: how many games has each team won
//! this season. The live implementation talks to ESPN's public core
//! API; the stub returns a fixed map for tests and local development.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Datelike;
use futures_util::{stream, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};

/// Raw provider output: team abbreviation (provider spelling, not yet
/// normalized) to raw win count.
pub type WinsMap = HashMap<String, i64>;

/// Concurrent per-team record fetches against the live API.
const FETCH_CONCURRENCY: usize = 8;

/// Upper bound on listing pages followed. ESPN sometimes ignores the
/// requested page size and caps pages at 25 entries, so the listing
/// must be walked to `pageCount`; the bound keeps a malformed
/// `pageCount` from turning into an unbounded crawl.
const MAX_LIST_PAGES: usize = 10;

const ESPN_BASE: &str = "https://sports.core.api.espn.com/v2/sports/football/leagues/nfl";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected provider response: {0}")]
    Malformed(String),
}

/// Source of season win totals. Implementations fetch a full snapshot;
/// normalization and clamping happen downstream in the reconciler.
#[async_trait]
pub trait WinsProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch win totals for `season` (defaults to the current year).
    /// `week` is accepted for forward compatibility; season-record
    /// endpoints ignore it.
    async fn fetch_wins(
        &self,
        season: Option<i32>,
        week: Option<u32>,
    ) -> Result<WinsMap, ProviderError>;
}

/// Live provider backed by ESPN's core API: one teams listing, then one
/// record document per team. A single team failing to resolve is logged
/// and skipped; only the listing itself failing aborts the fetch.
pub struct EspnProvider {
    client: reqwest::Client,
}

impl EspnProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, ProviderError> {
        let value = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;
        Ok(value)
    }

    /// Resolve one team reference to `(abbreviation, wins)`.
    async fn fetch_team_wins(
        &self,
        season: i32,
        team_ref: &str,
    ) -> Result<(String, i64), ProviderError> {
        let team = self.fetch_json(team_ref).await?;
        let abbr = team
            .get("abbreviation")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed("team without abbreviation".into()))?
            .to_string();
        let team_id = team
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Malformed("team without id".into()))?
            .to_string();

        let record_url = format!("{ESPN_BASE}/seasons/{season}/types/2/teams/{team_id}/record");
        let record = self.fetch_json(&record_url).await?;
        let wins = record
            .get("items")
            .and_then(|v| v.as_array())
            .and_then(|items| {
                items.iter().find(|item| {
                    item.get("type").and_then(|t| t.as_str()) == Some("total")
                })
            })
            .and_then(|total| total.get("stats"))
            .and_then(|v| v.as_array())
            .and_then(|stats| {
                stats.iter().find(|s| {
                    s.get("name").and_then(|n| n.as_str()) == Some("wins")
                })
            })
            .and_then(|stat| stat.get("value"))
            .and_then(|v| v.as_f64())
            .map(|v| v as i64)
            .unwrap_or(0);
        Ok((abbr, wins))
    }
}

#[async_trait]
impl WinsProvider for EspnProvider {
    fn name(&self) -> &'static str {
        "espn"
    }

    async fn fetch_wins(
        &self,
        season: Option<i32>,
        _week: Option<u32>,
    ) -> Result<WinsMap, ProviderError> {
        let season = season.unwrap_or_else(|| chrono::Utc::now().year());

        // The listing is paginated and the requested limit is not
        // always honored, so walk every page.
        let mut refs: Vec<String> = Vec::new();
        let mut page = 1usize;
        loop {
            let url = format!("{ESPN_BASE}/seasons/{season}/teams?limit=40&page={page}");
            let listing = self.fetch_json(&url).await?;
            refs.extend(listing_refs(&listing));
            if page >= page_count(&listing).min(MAX_LIST_PAGES) {
                break;
            }
            page += 1;
        }
        if refs.is_empty() {
            return Err(ProviderError::Malformed("team listing had no items".into()));
        }
        debug!(season, teams = refs.len(), "fetching team records");

        let results: Vec<Option<(String, i64)>> = stream::iter(refs)
            .map(|team_ref| async move {
                match self.fetch_team_wins(season, &team_ref).await {
                    Ok(pair) => Some(pair),
                    Err(err) => {
                        warn!(%team_ref, error = %err, "skipping team record");
                        None
                    }
                }
            })
            .buffer_unordered(FETCH_CONCURRENCY)
            .collect()
            .await;

        Ok(results.into_iter().flatten().collect())
    }
}

/// `$ref` links from one page of a v2 listing document.
fn listing_refs(listing: &serde_json::Value) -> Vec<String> {
    listing
        .get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("$ref").and_then(|r| r.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `pageCount` of a v2 listing document; a missing or non-numeric
/// value means a single page.
fn page_count(listing: &serde_json::Value) -> usize {
    listing
        .get("pageCount")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(1)
        .max(1)
}

/// Fixed-value provider for tests and offline runs.
pub struct StubProvider {
    wins: WinsMap,
}

impl StubProvider {
    pub fn new(wins: WinsMap) -> Self {
        Self { wins }
    }

    pub fn empty() -> Self {
        Self::new(WinsMap::new())
    }
}

#[async_trait]
impl WinsProvider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch_wins(
        &self,
        _season: Option<i32>,
        _week: Option<u32>,
    ) -> Result<WinsMap, ProviderError> {
        Ok(self.wins.clone())
    }
}
