use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::game::{Season, season_of};

/// Key of the synthetic all-zero row every ledger starts with.
pub const INITIAL_ROW_ID: &str = "First";

pub const HOME_RUNS: &str = "Home Runs";
pub const AT_BATS: &str = "At Bats";
pub const RUNS_BATTED_IN: &str = "Runs Batted In";
pub const GAMES_PLAYED: &str = "Games Played";
pub const DETAILS: &str = "details";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerRole {
    Hitter,
    Pitcher,
}

/// Denominator convention for a derived statistic. The two conventions
/// coexist in the same row and must not be conflated: the "Average X" family
/// divides by another stat's cumulative value, the "Per Game" family divides
/// by the season games-played count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denominator {
    CumulativeStat(String),
    SeasonGames,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatKind {
    /// Running total since the last season reset.
    Counting,
    /// Read from the raw line as a number each game (season-to-date columns
    /// the box score already carries, e.g. Batting Average).
    Gauge,
    /// Computed at insertion time from the already-accumulated values of the
    /// same row.
    Derived {
        numerator: String,
        denominator: Denominator,
    },
    /// Count of this player's games in the current season, including the row
    /// being inserted.
    GamesPlayed,
    /// Free-text passthrough (the details column).
    Details,
}

/// The recognized statistic vocabulary: every name this engine knows how to
/// accumulate or derive, with its kind spelled out.
fn builtin_kind(name: &str) -> Option<StatKind> {
    let derived = |numerator: &str, denominator: Denominator| StatKind::Derived {
        numerator: numerator.to_string(),
        denominator,
    };
    let per_at_bat = |numerator: &str| {
        derived(numerator, Denominator::CumulativeStat(AT_BATS.to_string()))
    };
    let per_batter_faced = |numerator: &str| {
        derived(
            numerator,
            Denominator::CumulativeStat("Batters Faced".to_string()),
        )
    };

    Some(match name {
        // Hitter counting stats.
        AT_BATS | "Runs" | "Hits" | HOME_RUNS | RUNS_BATTED_IN | "Bases on Balls" => {
            StatKind::Counting
        }
        // Pitcher counting stats.
        "Innings Pitched" | "Batters Faced" | "Strikeouts" | "Hits Allowed" | "Earned Runs"
        | "Home Runs Allowed" | "Walks" => StatKind::Counting,
        // Season-to-date columns taken from the box score as-is.
        "Batting Average" | "On-Base%" | "Slugging %" | "Earned Run Average" => StatKind::Gauge,
        // Per-at-bat / per-batter-faced ratio family.
        "Average Home Runs" => per_at_bat(HOME_RUNS),
        "Average Runs Batted In" => per_at_bat(RUNS_BATTED_IN),
        "Average Hits" => per_at_bat("Hits"),
        "Average Strikeouts" => per_batter_faced("Strikeouts"),
        "Average Home Runs Allowed" => per_batter_faced("Home Runs Allowed"),
        // Per-game family.
        "At Bats Per Game" => derived(AT_BATS, Denominator::SeasonGames),
        "Innings Pitched Per Game" => derived("Innings Pitched", Denominator::SeasonGames),
        GAMES_PLAYED => StatKind::GamesPlayed,
        DETAILS => StatKind::Details,
        _ => return None,
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown statistic name {0:?}")]
    UnknownStat(String),
    #[error("derived statistic {stat:?} needs {missing:?} in the stat list")]
    MissingDependency { stat: String, missing: String },
    #[error("hitter stat list must include the \"details\" column")]
    MissingDetails,
}

/// Ordered list of recognized statistic names plus their kinds.
#[derive(Debug, Clone)]
pub struct StatConfig {
    names: Vec<String>,
    kinds: HashMap<String, StatKind>,
}

impl StatConfig {
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ConfigError> {
        let names: Vec<String> = names.iter().map(|n| n.as_ref().to_string()).collect();
        let mut kinds = HashMap::with_capacity(names.len());
        for name in &names {
            let kind = builtin_kind(name).ok_or_else(|| ConfigError::UnknownStat(name.clone()))?;
            kinds.insert(name.clone(), kind);
        }
        for name in &names {
            if let StatKind::Derived {
                numerator,
                denominator,
            } = &kinds[name]
            {
                if !kinds.contains_key(numerator) {
                    return Err(ConfigError::MissingDependency {
                        stat: name.clone(),
                        missing: numerator.clone(),
                    });
                }
                if let Denominator::CumulativeStat(denom) = denominator
                    && !kinds.contains_key(denom)
                {
                    return Err(ConfigError::MissingDependency {
                        stat: name.clone(),
                        missing: denom.clone(),
                    });
                }
            }
        }
        Ok(Self { names, kinds })
    }

    /// The stat set the original prediction models were trained on.
    pub fn hitter_default() -> Self {
        Self::from_names(&[
            "Batting Average",
            "On-Base%",
            "Slugging %",
            AT_BATS,
            HOME_RUNS,
            RUNS_BATTED_IN,
            "Average Home Runs",
            "Average Runs Batted In",
            "At Bats Per Game",
            GAMES_PLAYED,
            DETAILS,
        ])
        .expect("builtin hitter stat list is valid")
    }

    pub fn pitcher_default() -> Self {
        Self::from_names(&[
            "Earned Run Average",
            "Innings Pitched",
            "Batters Faced",
            "Strikeouts",
            "Home Runs Allowed",
            "Average Strikeouts",
            "Average Home Runs Allowed",
            "Innings Pitched Per Game",
            GAMES_PLAYED,
        ])
        .expect("builtin pitcher stat list is valid")
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn kind(&self, name: &str) -> Option<&StatKind> {
        self.kinds.get(name)
    }

    pub fn has_details(&self) -> bool {
        self.kinds.contains_key(DETAILS)
    }

    /// Numeric stat names in declaration order (everything except details).
    pub fn numeric_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .filter(|n| self.kinds.get(n.as_str()) != Some(&StatKind::Details))
            .map(String::as_str)
    }
}

/// Home-run count encoded in a box-score details cell ("HR", "2·HR", "3·HR").
pub fn home_runs_in_details(details: &str) -> u32 {
    if details.contains("3·HR") {
        3
    } else if details.contains("2·HR") {
        2
    } else if details.contains("HR") {
        1
    } else {
        0
    }
}

/// One inserted row: cumulative and derived values as of the end of the game
/// named by `game_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub game_id: String,
    /// Games this player has appeared in for the row's season, counting this
    /// row. 0 only on the synthetic initial row.
    pub season_games: u32,
    pub values: HashMap<String, f64>,
    pub details: String,
}

impl StatRow {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Point-in-time query outcome. Distinguishes "no such game in this ledger"
/// from "known game but not enough prior season history".
#[derive(Debug, Clone, PartialEq)]
pub enum StatsBefore<'a> {
    Found(&'a StatRow),
    TooFewGames { games_played: u32, required: u32 },
    UnknownGame,
}

impl<'a> StatsBefore<'a> {
    pub fn found(self) -> Option<&'a StatRow> {
        match self {
            StatsBefore::Found(row) => Some(row),
            _ => None,
        }
    }
}

/// Did the player homer in a given game? `NoRecord` means the ledger has no
/// row for that game at all, which is not the same as "did not homer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomerCall {
    Homered,
    NoHomer,
    NoRecord,
}

/// Per-player running ledger. Mutated only by appending rows; rows are in
/// strict ingestion order and there is no retroactive insertion.
#[derive(Debug, Clone)]
pub struct PlayerLedger {
    player_id: String,
    role: LedgerRole,
    config: Arc<StatConfig>,
    rows: Vec<StatRow>,
    index: HashMap<String, usize>,
    opposing_pitchers: HashMap<String, String>,
}

impl PlayerLedger {
    pub fn new(player_id: &str, role: LedgerRole, config: Arc<StatConfig>) -> Self {
        let initial = StatRow {
            game_id: INITIAL_ROW_ID.to_string(),
            season_games: 0,
            values: config.numeric_names().map(|n| (n.to_string(), 0.0)).collect(),
            details: String::new(),
        };
        let mut index = HashMap::new();
        index.insert(INITIAL_ROW_ID.to_string(), 0);
        Self {
            player_id: player_id.to_string(),
            role,
            config,
            rows: vec![initial],
            index,
            opposing_pitchers: HashMap::new(),
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn role(&self) -> LedgerRole {
        self.role
    }

    pub fn config(&self) -> &StatConfig {
        &self.config
    }

    pub fn rows(&self) -> &[StatRow] {
        &self.rows
    }

    pub fn last_row(&self) -> &StatRow {
        self.rows.last().expect("ledger always has the initial row")
    }

    /// Append one game's row. `accumulated` must already hold cumulative
    /// values for counting stats (the directory performs the accumulation and
    /// the season reset); this method fills in the derived ratios and the
    /// games-played counter, then appends. Appending a game id already
    /// present is a no-op.
    pub fn append_game(
        &mut self,
        game_id: &str,
        accumulated: &HashMap<String, f64>,
        details: &str,
        opposing_pitcher: Option<&str>,
    ) {
        if self.index.contains_key(game_id) {
            log::debug!(
                "ledger {}: duplicate row for game {game_id} ignored",
                self.player_id
            );
            return;
        }

        let season = season_of(game_id);
        let season_games = self.season_games_including_next(season);

        let mut values: HashMap<String, f64> =
            HashMap::with_capacity(self.config.names().len());
        // Counting and gauge values first; derived stats read them.
        for name in self.config.names() {
            match self.config.kind(name) {
                Some(StatKind::Counting) | Some(StatKind::Gauge) => {
                    values.insert(
                        name.clone(),
                        accumulated.get(name).copied().unwrap_or(0.0),
                    );
                }
                _ => {}
            }
        }
        for name in self.config.names() {
            match self.config.kind(name) {
                Some(StatKind::Derived {
                    numerator,
                    denominator,
                }) => {
                    let num = values.get(numerator).copied().unwrap_or(0.0);
                    let value = match denominator {
                        Denominator::CumulativeStat(denom) => {
                            let d = values.get(denom).copied().unwrap_or(0.0);
                            if d == 0.0 { 0.0 } else { num / d }
                        }
                        Denominator::SeasonGames => num / season_games as f64,
                    };
                    values.insert(name.clone(), value);
                }
                Some(StatKind::GamesPlayed) => {
                    values.insert(name.clone(), season_games as f64);
                }
                _ => {}
            }
        }

        let row = StatRow {
            game_id: game_id.to_string(),
            season_games,
            values,
            details: details.to_string(),
        };
        self.index.insert(game_id.to_string(), self.rows.len());
        self.rows.push(row);

        if self.role == LedgerRole::Hitter
            && let Some(pitcher) = opposing_pitcher
        {
            self.opposing_pitchers
                .insert(game_id.to_string(), pitcher.to_string());
        }
    }

    fn season_games_including_next(&self, season: Option<Season>) -> u32 {
        let prior = self.rows[1..]
            .iter()
            .filter(|row| season_of(&row.game_id) == season)
            .count() as u32;
        prior + 1
    }

    /// The row immediately preceding `game_id` in ledger order: the player's
    /// state as of just before that game, with nothing from the game itself.
    pub fn stats_before(&self, game_id: &str, min_games_played: u32) -> StatsBefore<'_> {
        let Some(&idx) = self.index.get(game_id) else {
            return StatsBefore::UnknownGame;
        };
        if idx == 0 {
            // The synthetic initial row has no predecessor.
            return StatsBefore::UnknownGame;
        }
        let prev = &self.rows[idx - 1];
        if prev.season_games < min_games_played {
            return StatsBefore::TooFewGames {
                games_played: prev.season_games,
                required: min_games_played,
            };
        }
        StatsBefore::Found(prev)
    }

    /// Most recent state regardless of game identifier, gated on the same
    /// season games-played threshold.
    pub fn latest_stats(&self, min_games_played: u32) -> StatsBefore<'_> {
        let last = self.last_row();
        if last.season_games < min_games_played {
            return StatsBefore::TooFewGames {
                games_played: last.season_games,
                required: min_games_played,
            };
        }
        StatsBefore::Found(last)
    }

    /// The opposing starting pitcher recorded when this hitter's row for
    /// `game_id` was ingested.
    pub fn opposing_pitcher_for(&self, game_id: &str) -> Option<&str> {
        self.opposing_pitchers.get(game_id).map(String::as_str)
    }

    pub fn hit_home_run_in(&self, game_id: &str) -> HomerCall {
        if game_id == INITIAL_ROW_ID {
            return HomerCall::NoHomer;
        }
        let Some(&idx) = self.index.get(game_id) else {
            return HomerCall::NoRecord;
        };
        if self.rows[idx].details.contains("HR") {
            HomerCall::Homered
        } else {
            HomerCall::NoHomer
        }
    }

    /// Game identifiers in ingestion order, synthetic initial row excluded.
    pub fn game_ids(&self) -> impl Iterator<Item = &str> {
        self.rows[1..].iter().map(|row| row.game_id.as_str())
    }
}
