use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};

use dingercast::odds::{OddsConfig, aggregate_by_player, odds_for_games};
use dingercast::statsapi::{ScheduledGame, StatsApiClient};
use dingercast::store;

const DEFAULT_THRESHOLD_MIN: i64 = 60;
const UPCOMING_STATUSES: &[&str] = &["Pre-Game", "Warmup", "Scheduled"];

/// Fetch sportsbook home-run odds for today's upcoming games and attach them
/// to the stored predictions for the same date.
fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let cfg = OddsConfig::from_env();
    if !cfg.enabled {
        println!("Odds sync disabled (ODDS_ENABLED=0)");
        return Ok(());
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let date = parse_date_arg(&args)?.unwrap_or_else(|| Utc::now().date_naive());
    let update_all = args.iter().any(|a| a == "--all");
    let threshold_min = std::env::var("ODDS_UPDATE_THRESHOLD_MIN")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(DEFAULT_THRESHOLD_MIN);

    let client = StatsApiClient::new();
    let schedule = client.schedule(date)?;
    let games = games_to_update(&schedule, update_all, threshold_min);
    println!("Updating odds for {} games on {date}", games.len());
    if games.is_empty() {
        return Ok(());
    }

    let updates = odds_for_games(&cfg, &games)?;
    let by_player = aggregate_by_player(&updates);
    println!("Found quotes for {} players", by_player.len());

    let db_path = store::default_db_path();
    let conn = store::open_db(&db_path)?;
    let day = date.format("%Y-%m-%d").to_string();
    let mut attached = 0usize;
    for (player, snapshot) in &by_player {
        let odds_json = serde_json::to_string(snapshot).context("serialize odds snapshot")?;
        let n = store::attach_odds(&conn, player, &day, &odds_json)?;
        if n == 0 {
            log::info!("cannot find {player} {day} in store, no odds update performed");
        } else {
            attached += n;
        }
    }
    println!("Attached odds to {attached} stored predictions");
    Ok(())
}

/// Games worth updating: not started yet and, unless --all is passed,
/// starting within the threshold window.
fn games_to_update(
    schedule: &[ScheduledGame],
    update_all: bool,
    threshold_min: i64,
) -> Vec<ScheduledGame> {
    let now = Utc::now();
    schedule
        .iter()
        .filter(|game| UPCOMING_STATUSES.contains(&game.status.as_str()))
        .filter(|game| {
            let Ok(start) = DateTime::parse_from_rfc3339(&game.game_datetime) else {
                return false;
            };
            let start = start.with_timezone(&Utc);
            if start <= now {
                return false;
            }
            update_all || (start - now).num_minutes() <= threshold_min
        })
        .cloned()
        .collect()
}

fn parse_date_arg(args: &[String]) -> Result<Option<NaiveDate>> {
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix("--date=") {
            return parse_date(raw).map(Some);
        }
        if arg == "--date" {
            let Some(next) = args.get(idx + 1) else {
                return Err(anyhow!("--date needs a value"));
            };
            return parse_date(next).map(Some);
        }
    }
    Ok(None)
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("bad date {raw:?}, expected YYYY-MM-DD"))
}
