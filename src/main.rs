use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{Datelike, NaiveDate, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use dingercast::boxscore_fetch::{BoxscoreConfig, BoxscoreScraper};
use dingercast::game::{GameRecord, load_all_games};
use dingercast::ledger::{HomerCall, StatsBefore};
use dingercast::model::{ModelSpec, default_models_path, load_models};
use dingercast::prior_season::{PriorSeasonSource, fold_prior_season};
use dingercast::runner::SeasonRunner;
use dingercast::statsapi::StatsApiClient;
use dingercast::store;

/// One prediction as written to the update file and later pushed to the
/// result store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PredictionItem {
    player_name: String,
    date: String,
    model: String,
    home_run_odds: f64,
    did_hit_hr: i64,
    stats: HashMap<String, f64>,
    #[serde(default)]
    game_id: Option<String>,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut ran_any = false;
    if let Some(vals) = flag_values(&args, "--download") {
        run_download(&vals, &args)?;
        ran_any = true;
    }
    if let Some(vals) = flag_values(&args, "--update") {
        run_update(&vals, &args)?;
        ran_any = true;
    }
    if flag_values(&args, "--today").is_some() {
        run_today(&args)?;
        ran_any = true;
    }
    if let Some(vals) = flag_values(&args, "--push") {
        run_push(&vals, &args)?;
        ran_any = true;
    }

    if !ran_any {
        eprintln!("usage: dingercast --download START END [--data-dir DIR]");
        eprintln!("       dingercast --update START END --out FILE [--data-dir DIR]");
        eprintln!("       dingercast --today --out FILE [--data-dir DIR]");
        eprintln!("       dingercast --push FILE [--db PATH]");
        return Err(anyhow!("no mode selected"));
    }
    Ok(())
}

fn run_download(vals: &[String], args: &[String]) -> Result<()> {
    let (start, end) = date_range(vals)?;
    let cfg = boxscore_config(args);
    log::info!(
        "download mode: {start} to {end} into {}",
        cfg.data_dir.display()
    );
    let scraper = BoxscoreScraper::new(cfg);

    let game_ids = scraper.game_ids(start, end)?;
    let mut fetched = 0usize;
    let mut failed = 0usize;
    for game_id in &game_ids {
        match scraper.fetch_game(game_id) {
            Ok(_) => fetched += 1,
            Err(err) => {
                log::error!("failed to fetch {game_id}: {err:#}");
                failed += 1;
            }
        }
    }
    println!("Downloaded {fetched}/{} games ({failed} failed)", game_ids.len());
    Ok(())
}

fn run_update(vals: &[String], args: &[String]) -> Result<()> {
    let (start, end) = date_range(vals)?;
    let out_path = flag_value(args, "--out").context("--update needs --out FILE")?;
    let data_dir = boxscore_config(args).data_dir;

    let games = load_all_games(&data_dir)?;
    log::info!("loaded {} games from {}", games.len(), data_dir.display());

    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&games)?;

    let models = load_models(&default_models_path())?;
    let stats_client = StatsApiClient::new();

    let mut items = Vec::new();
    for game in games.iter().filter(|g| g.date >= start && g.date <= end) {
        items.extend(predict_game(&runner, game, &models, &stats_client));
    }

    write_items(&PathBuf::from(&out_path), &items)?;
    println!("Wrote {} predictions to {out_path}", items.len());
    Ok(())
}

/// Predictions for every hitter in one played game, all models. Uses each
/// hitter's state as of just before the game.
fn predict_game(
    runner: &SeasonRunner,
    game: &GameRecord,
    models: &[ModelSpec],
    stats_client: &StatsApiClient,
) -> Vec<PredictionItem> {
    let hitters = game.hitter_names();
    let date = game.date.format("%Y-%m-%d").to_string();
    let prior_year = game.date.year() - 1;

    // Ledgers are read-only here, so per-player work can fan out.
    hitters
        .par_iter()
        .flat_map_iter(|hitter| {
            let mut out = Vec::new();
            let Some(features) =
                hitter_features(runner, hitter, Some(&game.id), prior_year, stats_client)
            else {
                return out;
            };
            let did_hit = runner
                .player_map()
                .hitter(hitter)
                .map(|l| l.hit_home_run_in(&game.id))
                .unwrap_or(HomerCall::NoRecord);
            for model in models {
                let Some(prob) = model.predict_proba(&features) else {
                    log::warn!("model {} missing features for {hitter}", model.name);
                    continue;
                };
                out.push(PredictionItem {
                    player_name: hitter.to_string(),
                    date: date.clone(),
                    model: model.name.clone(),
                    home_run_odds: prob,
                    did_hit_hr: store::homer_code(did_hit),
                    stats: features.clone(),
                    game_id: Some(game.id.clone()),
                });
            }
            out
        })
        .collect()
}

/// A hitter's feature vector anchored either just before `game_id` or at the
/// latest row, with the "Last Season" fields folded in.
fn hitter_features(
    runner: &SeasonRunner,
    hitter: &str,
    game_id: Option<&str>,
    prior_year: i32,
    stats_client: &StatsApiClient,
) -> Option<HashMap<String, f64>> {
    let ledger = runner.player_map().hitter(hitter)?;
    let row = match game_id {
        Some(id) => ledger.stats_before(id, 0),
        None => ledger.latest_stats(0),
    };
    let StatsBefore::Found(row) = row else {
        return None;
    };
    let mut features = row.values.clone();
    let names: Vec<&str> = runner.player_map().hitter_config().numeric_names().collect();
    let prior = fold_prior_season(
        hitter,
        prior_year,
        &features,
        &names,
        Some(stats_client as &dyn PriorSeasonSource),
    );
    features.extend(prior);
    Some(features)
}

fn run_today(args: &[String]) -> Result<()> {
    let out_path = flag_value(args, "--out").context("--today needs --out FILE")?;
    let data_dir = boxscore_config(args).data_dir;
    let today = Utc::now().date_naive();

    let stats_client = StatsApiClient::new();
    let schedule = stats_client.schedule(today)?;
    log::info!("getting updates for {} games", schedule.len());

    let mut batters = Vec::new();
    for game in &schedule {
        match stats_client.game_batter_names(game.game_pk) {
            Ok(names) => batters.extend(names),
            Err(err) => log::warn!("no batter list for game {}: {err:#}", game.game_pk),
        }
    }
    batters.sort();
    batters.dedup();
    log::info!("found {} batters today", batters.len());

    let games = load_all_games(&data_dir)?;
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&games)?;

    let models = load_models(&default_models_path())?;
    let date = today.format("%Y-%m-%d").to_string();
    let prior_year = today.year() - 1;

    let items: Vec<PredictionItem> = batters
        .par_iter()
        .flat_map_iter(|batter| {
            let mut out = Vec::new();
            let Some(features) =
                hitter_features(&runner, batter, None, prior_year, &stats_client)
            else {
                return out;
            };
            for model in &models {
                let Some(prob) = model.predict_proba(&features) else {
                    continue;
                };
                out.push(PredictionItem {
                    player_name: batter.clone(),
                    date: date.clone(),
                    model: model.name.clone(),
                    home_run_odds: prob,
                    // Today's games have not been played: outcome unknown.
                    did_hit_hr: store::homer_code(HomerCall::NoRecord),
                    stats: features.clone(),
                    game_id: None,
                });
            }
            out
        })
        .collect();

    write_items(&PathBuf::from(&out_path), &items)?;
    println!("Wrote {} predictions to {out_path}", items.len());
    Ok(())
}

fn run_push(vals: &[String], args: &[String]) -> Result<()> {
    let input = vals.first().context("--push needs a FILE argument")?;
    let db_path = flag_value(args, "--db")
        .map(PathBuf::from)
        .unwrap_or_else(store::default_db_path);

    let raw = fs::read_to_string(input).with_context(|| format!("read {input}"))?;
    let items: Vec<PredictionItem> =
        serde_json::from_str(&raw).with_context(|| format!("decode {input}"))?;

    let conn = store::open_db(&db_path)?;
    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut unchanged = 0usize;
    for item in &items {
        let rec = store::PredictionRecord {
            player_name: item.player_name.clone(),
            date: item.date.clone(),
            model: item.model.clone(),
            home_run_prob: item.home_run_odds,
            hit_home_run: store::homer_from_code(item.did_hit_hr),
            game_id: item.game_id.clone(),
            features_json: serde_json::to_string(&item.stats).ok(),
        };
        match store::upsert_prediction(&conn, &rec)? {
            store::UpsertOutcome::Inserted => inserted += 1,
            store::UpsertOutcome::Updated => updated += 1,
            store::UpsertOutcome::Unchanged => unchanged += 1,
        }
    }
    println!(
        "Pushed {} records to {}: {inserted} added, {updated} updated, {unchanged} unchanged",
        items.len(),
        db_path.display()
    );
    Ok(())
}

fn write_items(path: &PathBuf, items: &[PredictionItem]) -> Result<()> {
    let json = serde_json::to_string(items).context("serialize predictions")?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn boxscore_config(args: &[String]) -> BoxscoreConfig {
    let mut cfg = BoxscoreConfig::from_env();
    if let Some(dir) = flag_value(args, "--data-dir") {
        cfg.data_dir = PathBuf::from(dir);
    }
    cfg
}

fn date_range(vals: &[String]) -> Result<(NaiveDate, NaiveDate)> {
    let start = vals
        .first()
        .context("missing START date")
        .and_then(|s| parse_date(s))?;
    let end = vals
        .get(1)
        .context("missing END date")
        .and_then(|s| parse_date(s))?;
    if end < start {
        return Err(anyhow!("end date {end} is before start date {start}"));
    }
    Ok((start, end))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("bad date {raw:?}, expected YYYY-MM-DD"))
}

/// Values following a flag, up to the next `--` flag. `Some(vec![])` means
/// the flag was present with no values.
fn flag_values(args: &[String], flag: &str) -> Option<Vec<String>> {
    let idx = args.iter().position(|a| a == flag)?;
    let values = args[idx + 1..]
        .iter()
        .take_while(|a| !a.starts_with("--"))
        .cloned()
        .collect();
    Some(values)
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    flag_values(args, flag)?.into_iter().next()
}
