use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One player's raw box-score line: stat name -> raw text as scraped.
///
/// Batting lines carry a "Batting" name column and a trailing "Position"
/// column; pitching lines carry a "Pitching" name column. Everything else is
/// whatever stat columns the source table had.
pub type RawLine = HashMap<String, String>;

/// Season grouping extracted from a game identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Season(pub u16);

/// Extract the season from a game identifier.
///
/// Identifiers look like `CHN202104010`: a three-letter park code, then the
/// date digits, then a game-of-day digit. The four digits after the park code
/// are the season year and are the only part of the identifier that decides
/// season grouping; everything downstream goes through this function instead
/// of slicing substrings itself.
pub fn season_of(game_id: &str) -> Option<Season> {
    let digits = game_id.get(3..7)?;
    digits.parse::<u16>().ok().map(Season)
}

/// The incrementing ordinal embedded in a game identifier (date digits plus
/// game-of-day suffix). Replays must process games in increasing order of
/// this value.
pub fn game_sequence(game_id: &str) -> Option<u64> {
    let tail = game_id.get(3..)?;
    if tail.is_empty() || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    tail.parse::<u64>().ok()
}

/// Immutable snapshot of one played game's box score. Produced by the box
/// score source, persisted as JSON, read-only afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub venue: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_batting: Vec<RawLine>,
    pub away_batting: Vec<RawLine>,
    pub home_pitching: Vec<RawLine>,
    pub away_pitching: Vec<RawLine>,
}

const BATTER_NAME_COL: &str = "Batting";
const PITCHER_NAME_COL: &str = "Pitching";
const POSITION_COL: &str = "Position";

impl GameRecord {
    pub fn season(&self) -> Option<Season> {
        season_of(&self.id)
    }

    /// Hitters in the home batting table: (player name, raw line), with
    /// pitchers and the team-totals row filtered out.
    pub fn home_hitter_lines(&self) -> Vec<(&str, &RawLine)> {
        hitter_lines(&self.home_batting)
    }

    pub fn away_hitter_lines(&self) -> Vec<(&str, &RawLine)> {
        hitter_lines(&self.away_batting)
    }

    pub fn hitter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .home_hitter_lines()
            .into_iter()
            .chain(self.away_hitter_lines())
            .map(|(name, _)| name)
            .collect();
        names.dedup();
        names
    }

    /// The starting pitcher is the first row of a pitching table.
    pub fn home_starting_pitcher(&self) -> Option<&str> {
        starting_pitcher(&self.home_pitching)
    }

    pub fn away_starting_pitcher(&self) -> Option<&str> {
        starting_pitcher(&self.away_pitching)
    }

    pub fn home_starting_pitcher_line(&self) -> Option<(&str, &RawLine)> {
        starting_pitcher_line(&self.home_pitching)
    }

    pub fn away_starting_pitcher_line(&self) -> Option<(&str, &RawLine)> {
        starting_pitcher_line(&self.away_pitching)
    }

    pub fn save(&self, data_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("create game data dir {}", data_dir.display()))?;
        let path = data_dir.join(format!("{}.json", self.id));
        let json = serde_json::to_string(self).context("serialize game record")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("swap {}", path.display()))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<GameRecord> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read game record {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("decode game record {}", path.display()))
    }
}

fn hitter_lines(batting: &[RawLine]) -> Vec<(&str, &RawLine)> {
    batting
        .iter()
        .filter_map(|line| {
            let name = line.get(BATTER_NAME_COL)?.trim();
            if name.is_empty() || name == "Team" || name == "Team Totals" {
                return None;
            }
            if line.get(POSITION_COL).map(String::as_str) == Some("P") {
                return None;
            }
            Some((name, line))
        })
        .collect()
}

fn starting_pitcher_line(pitching: &[RawLine]) -> Option<(&str, &RawLine)> {
    pitching.iter().find_map(|line| {
        let name = line.get(PITCHER_NAME_COL)?.trim();
        if name.is_empty() || name == "Team Totals" {
            return None;
        }
        Some((name, line))
    })
}

fn starting_pitcher(pitching: &[RawLine]) -> Option<&str> {
    starting_pitcher_line(pitching).map(|(name, _)| name)
}

/// Load every saved game record in a data directory, ordered by the game
/// identifier's embedded sequence. Files that fail to decode are skipped
/// with a warning so one corrupt download cannot block a replay.
pub fn load_all_games(data_dir: &Path) -> Result<Vec<GameRecord>> {
    let entries = fs::read_dir(data_dir)
        .with_context(|| format!("read game data dir {}", data_dir.display()))?;

    let mut games = Vec::new();
    for entry in entries {
        let path = entry.context("read dir entry")?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match GameRecord::load(&path) {
            Ok(game) => games.push(game),
            Err(err) => log::warn!("skipping {}: {err:#}", path.display()),
        }
    }

    games.sort_by_key(|g| (game_sequence(&g.id).unwrap_or(u64::MAX), g.id.clone()));
    Ok(games)
}
