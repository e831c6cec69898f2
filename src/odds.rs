use std::collections::HashMap;
use std::env;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http_client::http_client;
use crate::statsapi::ScheduledGame;

const ODDS_API_BASE: &str = "https://api.the-odds-api.com/v4/sports/baseball_mlb";
const HOME_RUN_MARKET: &str = "batter_home_runs";
// Events and scheduled games rarely agree to the minute.
const DEFAULT_TIME_TOLERANCE_MIN: i64 = 10;
const DEFAULT_SPORTSBOOKS: &[&str] = &["draftkings", "fanduel", "pointsbetus", "betrivers"];

#[derive(Debug, Clone)]
pub struct OddsConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub regions: String,
    pub sportsbooks: Vec<String>,
    pub time_tolerance_secs: i64,
}

impl OddsConfig {
    pub fn from_env() -> Self {
        let enabled = env_bool("ODDS_ENABLED", true);
        let api_key = env::var("ODDS_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let regions = env::var("ODDS_REGIONS")
            .unwrap_or_else(|_| "us".to_string())
            .trim()
            .to_ascii_lowercase();
        let sportsbooks = env::var("ODDS_SPORTSBOOKS")
            .ok()
            .map(|raw| {
                raw.split([',', ';', ' '])
                    .map(|s| s.trim().to_ascii_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SPORTSBOOKS.iter().map(|s| s.to_string()).collect());
        let time_tolerance_min = env::var("ODDS_MATCH_TIME_TOLERANCE_MIN")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_TIME_TOLERANCE_MIN)
            .clamp(1, 360);

        Self {
            enabled,
            api_key,
            regions,
            sportsbooks,
            time_tolerance_secs: time_tolerance_min * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsApiEvent {
    pub id: String,
    #[serde(default)]
    pub commence_time: Option<String>,
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Deserialize)]
pub struct EventOdds {
    #[serde(default)]
    pub bookmakers: Vec<Bookmaker>,
}

#[derive(Debug, Deserialize)]
pub struct Bookmaker {
    pub key: String,
    #[serde(default)]
    pub markets: Vec<Market>,
}

#[derive(Debug, Deserialize)]
pub struct Market {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

#[derive(Debug, Deserialize)]
pub struct Outcome {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub point: Option<f64>,
}

/// One sportsbook quote for one player's home-run prop.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOddsUpdate {
    pub player_name: String,
    pub point: f64,
    pub sportsbook: String,
    pub over_or_under: String,
    pub odds: String,
    pub utc_update_time: String,
    pub game_time: String,
}

/// Per-player aggregation: sportsbook -> over/under -> American odds string.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerOddsSnapshot {
    pub data: HashMap<String, HashMap<String, String>>,
    pub update_time: String,
    pub game_time: String,
}

/// American odds are displayed signed, with even odds as "+0".
pub fn american_odds_string(price: i64) -> String {
    if price > 0 {
        format!("+{price}")
    } else if price < 0 {
        price.to_string()
    } else {
        "+0".to_string()
    }
}

pub fn fetch_events(cfg: &OddsConfig) -> Result<Vec<OddsApiEvent>> {
    let api_key = require_key(cfg)?;
    let client = http_client()?;
    let events: Vec<OddsApiEvent> = client
        .get(format!("{ODDS_API_BASE}/events"))
        .query(&[("apiKey", api_key)])
        .send()
        .context("odds events request failed")?
        .error_for_status()
        .context("odds events request rejected")?
        .json()
        .context("invalid odds events json")?;
    log::info!("found {} odds api events", events.len());
    Ok(events)
}

pub fn fetch_event_odds(cfg: &OddsConfig, event_id: &str) -> Result<EventOdds> {
    let api_key = require_key(cfg)?;
    let client = http_client()?;
    client
        .get(format!("{ODDS_API_BASE}/events/{event_id}/odds"))
        .query(&[
            ("apiKey", api_key),
            ("regions", cfg.regions.as_str()),
            ("markets", HOME_RUN_MARKET),
            ("oddsFormat", "american"),
        ])
        .send()
        .with_context(|| format!("odds request for event {event_id} failed"))?
        .error_for_status()
        .context("odds request rejected")?
        .json()
        .context("invalid event odds json")
}

/// Fetch the home-run prop quotes for every event matching one of the given
/// scheduled games. Events that fetch with an error are skipped with a
/// warning; one flaky event must not sink the whole sync.
pub fn odds_for_games(
    cfg: &OddsConfig,
    games: &[ScheduledGame],
) -> Result<Vec<PlayerOddsUpdate>> {
    if !cfg.enabled {
        return Ok(Vec::new());
    }
    let events = fetch_events(cfg)?;

    let mut out = Vec::new();
    for event in &events {
        if !event_matches_any_game(event, games, cfg.time_tolerance_secs) {
            continue;
        }
        log::info!("getting odds for event {}", event.id);
        let odds = match fetch_event_odds(cfg, &event.id) {
            Ok(odds) => odds,
            Err(err) => {
                log::warn!("skipping event {}: {err:#}", event.id);
                continue;
            }
        };
        out.extend(player_updates_from_event(event, &odds, &cfg.sportsbooks));
    }
    Ok(out)
}

fn require_key(cfg: &OddsConfig) -> Result<&str> {
    cfg.api_key
        .as_deref()
        .ok_or_else(|| anyhow!("ODDS_API_KEY missing"))
}

fn event_matches_any_game(
    event: &OddsApiEvent,
    games: &[ScheduledGame],
    tolerance_secs: i64,
) -> bool {
    let event_ts = event.commence_time.as_deref().and_then(parse_timestamp);
    games.iter().any(|game| {
        if event.home_team != game.home_name || event.away_team != game.away_name {
            return false;
        }
        match (event_ts, parse_timestamp(&game.game_datetime)) {
            (Some(e), Some(g)) => (e - g).abs() <= tolerance_secs,
            _ => true,
        }
    })
}

/// Pull the point-0.5 over/under quotes out of one event's odds payload,
/// restricted to the accepted sportsbooks.
pub fn player_updates_from_event(
    event: &OddsApiEvent,
    odds: &EventOdds,
    sportsbooks: &[String],
) -> Vec<PlayerOddsUpdate> {
    let mut out = Vec::new();
    let update_time = Utc::now().to_rfc3339();
    let game_time = event.commence_time.clone().unwrap_or_default();

    for book in sportsbooks {
        let Some(bookmaker) = odds.bookmakers.iter().find(|b| &b.key == book) else {
            log::debug!("no {book} quotes in event {}", event.id);
            continue;
        };
        for market in &bookmaker.markets {
            if market.key != HOME_RUN_MARKET {
                continue;
            }
            for outcome in &market.outcomes {
                if outcome.point != Some(0.5) {
                    continue;
                }
                let Some(player_name) = outcome.description.as_deref() else {
                    continue;
                };
                out.push(PlayerOddsUpdate {
                    player_name: player_name.to_string(),
                    point: 0.5,
                    sportsbook: book.clone(),
                    over_or_under: outcome.name.to_lowercase(),
                    odds: american_odds_string(outcome.price.round() as i64),
                    utc_update_time: update_time.clone(),
                    game_time: game_time.clone(),
                });
            }
        }
    }
    out
}

/// Group raw quotes into one snapshot per player.
pub fn aggregate_by_player(
    updates: &[PlayerOddsUpdate],
) -> HashMap<String, PlayerOddsSnapshot> {
    let mut out: HashMap<String, PlayerOddsSnapshot> = HashMap::new();
    for update in updates {
        let snapshot = out
            .entry(update.player_name.clone())
            .or_insert_with(|| PlayerOddsSnapshot {
                data: HashMap::new(),
                update_time: update.utc_update_time.clone(),
                game_time: update.game_time.clone(),
            });
        snapshot
            .data
            .entry(update.sportsbook.clone())
            .or_default()
            .insert(update.over_or_under.clone(), update.odds.clone());
    }
    out
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| {
            let t = v.trim().to_ascii_lowercase();
            !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
        })
        .unwrap_or(default)
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.timestamp())
}
