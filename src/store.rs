use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::ledger::HomerCall;

/// One stored prediction, keyed (player_name, date, model). Odds are attached
/// later by the odds sync and live in their own column.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub player_name: String,
    pub date: String,
    pub model: String,
    pub home_run_prob: f64,
    pub hit_home_run: HomerCall,
    pub game_id: Option<String>,
    pub features_json: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

pub fn default_db_path() -> PathBuf {
    std::env::var("HR_DB_PATH")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/predictions.sqlite"))
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS predictions (
            player_name TEXT NOT NULL,
            date TEXT NOT NULL,
            model TEXT NOT NULL,
            home_run_prob REAL NOT NULL,
            did_hit_hr INTEGER NOT NULL,
            game_id TEXT NULL,
            features_json TEXT NULL,
            odds_json TEXT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (player_name, date, model)
        );
        CREATE INDEX IF NOT EXISTS idx_predictions_date ON predictions(date);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

pub fn homer_code(call: HomerCall) -> i64 {
    match call {
        HomerCall::NoHomer => 0,
        HomerCall::Homered => 1,
        HomerCall::NoRecord => 2,
    }
}

pub fn homer_from_code(code: i64) -> HomerCall {
    match code {
        0 => HomerCall::NoHomer,
        1 => HomerCall::Homered,
        _ => HomerCall::NoRecord,
    }
}

/// Insert or update one prediction. A no-op when an identical record is
/// already present, so re-running an update pass is safe.
pub fn upsert_prediction(conn: &Connection, rec: &PredictionRecord) -> Result<UpsertOutcome> {
    let existing = conn
        .query_row(
            "SELECT home_run_prob, did_hit_hr, game_id, features_json
             FROM predictions
             WHERE player_name = ?1 AND date = ?2 AND model = ?3",
            params![rec.player_name, rec.date, rec.model],
            |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()
        .context("query existing prediction")?;

    let code = homer_code(rec.hit_home_run);
    match existing {
        None => {
            conn.execute(
                "INSERT INTO predictions
                   (player_name, date, model, home_run_prob, did_hit_hr,
                    game_id, features_json, odds_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
                params![
                    rec.player_name,
                    rec.date,
                    rec.model,
                    rec.home_run_prob,
                    code,
                    rec.game_id,
                    rec.features_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("insert prediction")?;
            log::info!(
                "added {} {} {} prob={:.4}",
                rec.player_name,
                rec.date,
                rec.model,
                rec.home_run_prob
            );
            Ok(UpsertOutcome::Inserted)
        }
        Some((prob, hit, game_id, features_json))
            if prob == rec.home_run_prob
                && hit == code
                && game_id == rec.game_id
                && features_json == rec.features_json =>
        {
            log::debug!("no change for {} {} {}", rec.player_name, rec.date, rec.model);
            Ok(UpsertOutcome::Unchanged)
        }
        Some(_) => {
            conn.execute(
                "UPDATE predictions
                 SET home_run_prob = ?4, did_hit_hr = ?5, game_id = ?6,
                     features_json = ?7, updated_at = ?8
                 WHERE player_name = ?1 AND date = ?2 AND model = ?3",
                params![
                    rec.player_name,
                    rec.date,
                    rec.model,
                    rec.home_run_prob,
                    code,
                    rec.game_id,
                    rec.features_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("update prediction")?;
            log::info!(
                "updated {} {} {} prob={:.4}",
                rec.player_name,
                rec.date,
                rec.model,
                rec.home_run_prob
            );
            Ok(UpsertOutcome::Updated)
        }
    }
}

/// Attach a sportsbook odds snapshot (as JSON) to every stored prediction for
/// the player/date, across models. Returns the number of rows touched.
pub fn attach_odds(
    conn: &Connection,
    player_name: &str,
    date: &str,
    odds_json: &str,
) -> Result<usize> {
    let n = conn
        .execute(
            "UPDATE predictions
             SET odds_json = ?3, updated_at = ?4
             WHERE player_name = ?1 AND date = ?2
               AND (odds_json IS NULL OR odds_json != ?3)",
            params![player_name, date, odds_json, Utc::now().to_rfc3339()],
        )
        .context("attach odds")?;
    if n == 0 {
        log::debug!("no odds update for {player_name} {date}");
    }
    Ok(n)
}

pub fn load_predictions_for_date(conn: &Connection, date: &str) -> Result<Vec<PredictionRecord>> {
    let mut stmt = conn
        .prepare(
            "SELECT player_name, date, model, home_run_prob, did_hit_hr, game_id, features_json
             FROM predictions
             WHERE date = ?1
             ORDER BY player_name, model",
        )
        .context("prepare predictions query")?;
    let rows = stmt
        .query_map(params![date], |row| {
            Ok(PredictionRecord {
                player_name: row.get(0)?,
                date: row.get(1)?,
                model: row.get(2)?,
                home_run_prob: row.get(3)?,
                hit_home_run: homer_from_code(row.get(4)?),
                game_id: row.get(5)?,
                features_json: row.get(6)?,
            })
        })
        .context("query predictions")?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode prediction row")?);
    }
    Ok(out)
}
