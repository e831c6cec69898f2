use std::collections::HashMap;

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::game::{GameRecord, game_sequence};
use crate::ledger::StatsBefore;
use crate::player_map::PlayerMap;
use crate::prior_season::{PriorSeasonSource, fold_prior_season};

pub const OPPOSING_PITCHER_PREFIX: &str = "Opposing Pitcher ";

/// Replay ordering problems are fatal: every cumulative value downstream
/// depends on monotonic ingestion.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("game id {game_id:?} has no parseable sequence")]
    BadIdentifier { game_id: String },
    #[error("game {next:?} arrived out of order after {prev:?}")]
    OutOfOrder { prev: String, next: String },
}

#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub games: usize,
    pub hitter_lines: usize,
    pub pitcher_lines: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchupOptions {
    pub hitter_min_games: u32,
    pub pitcher_min_games: u32,
    pub include_prior_season: bool,
}

impl Default for MatchupOptions {
    fn default() -> Self {
        Self {
            hitter_min_games: 20,
            pitcher_min_games: 1,
            include_prior_season: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchupSide {
    Hitter,
    Pitcher,
}

/// Outcome of a matchup feature query. Every way the query can come up short
/// is its own variant so callers can tell thin history from missing data.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchupFeatures {
    Ready(HashMap<String, f64>),
    TooFewGames {
        side: MatchupSide,
        games_played: u32,
        required: u32,
    },
    UnknownHitter,
    UnknownGame,
    UnresolvedPitcher,
}

impl MatchupFeatures {
    pub fn ready(self) -> Option<HashMap<String, f64>> {
        match self {
            MatchupFeatures::Ready(features) => Some(features),
            _ => None,
        }
    }
}

/// Replays an ordered collection of game records through a fresh ledger
/// directory and answers matchup-aware feature queries afterwards.
#[derive(Debug)]
pub struct SeasonRunner {
    player_map: PlayerMap,
}

impl SeasonRunner {
    pub fn new(player_map: PlayerMap) -> Self {
        Self { player_map }
    }

    pub fn with_defaults() -> Self {
        Self::new(PlayerMap::with_defaults())
    }

    pub fn player_map(&self) -> &PlayerMap {
        &self.player_map
    }

    /// Rebuild every ledger from an ordered slice of game records. The input
    /// must be sorted by the identifier-embedded sequence; two games may share
    /// a sequence (different parks, same day) but a decrease is rejected
    /// outright before any ledger is touched by the offending game.
    pub fn replay_all(&mut self, games: &[GameRecord]) -> Result<ReplaySummary, ReplayError> {
        self.player_map.reset();

        let mut summary = ReplaySummary::default();
        let mut prev: Option<(u64, String)> = None;

        for game in games {
            let seq = game_sequence(&game.id).ok_or_else(|| ReplayError::BadIdentifier {
                game_id: game.id.clone(),
            })?;
            if let Some((prev_seq, prev_id)) = &prev
                && seq < *prev_seq
            {
                return Err(ReplayError::OutOfOrder {
                    prev: prev_id.clone(),
                    next: game.id.clone(),
                });
            }
            prev = Some((seq, game.id.clone()));

            log::debug!(
                "replaying {} {} vs. {}",
                game.date.format("%m/%d/%y"),
                game.home_team,
                game.away_team
            );

            let home_starter = game.home_starting_pitcher().map(str::to_string);
            let away_starter = game.away_starting_pitcher().map(str::to_string);

            for (hitter, line) in game.home_hitter_lines() {
                self.player_map
                    .record_hitter_game(hitter, &game.id, line, away_starter.as_deref());
                summary.hitter_lines += 1;
            }
            for (hitter, line) in game.away_hitter_lines() {
                self.player_map
                    .record_hitter_game(hitter, &game.id, line, home_starter.as_deref());
                summary.hitter_lines += 1;
            }
            for (pitcher, line) in game
                .home_starting_pitcher_line()
                .into_iter()
                .chain(game.away_starting_pitcher_line())
            {
                self.player_map.record_pitcher_game(pitcher, &game.id, line);
                summary.pitcher_lines += 1;
            }
            summary.games += 1;
        }

        log::info!(
            "replayed {} games: {} hitter lines, {} pitcher lines, {} hitters, {} pitchers",
            summary.games,
            summary.hitter_lines,
            summary.pitcher_lines,
            self.player_map.hitter_count(),
            self.player_map.pitcher_count()
        );
        Ok(summary)
    }

    /// Combined pre-game feature vector for a hitter and the opposing
    /// starting pitcher. Pitcher fields are renamed with the
    /// "Opposing Pitcher " prefix so the two sides never collide; prior-season
    /// fields come back with the "Last Season " prefix when requested.
    pub fn matchup_features(
        &self,
        hitter_id: &str,
        game_id: &str,
        game_date: NaiveDate,
        opts: &MatchupOptions,
        prior: Option<&dyn PriorSeasonSource>,
    ) -> MatchupFeatures {
        let Some(hitter) = self.player_map.hitter(hitter_id) else {
            return MatchupFeatures::UnknownHitter;
        };

        let hitter_row = match hitter.stats_before(game_id, opts.hitter_min_games) {
            StatsBefore::Found(row) => row,
            StatsBefore::TooFewGames {
                games_played,
                required,
            } => {
                return MatchupFeatures::TooFewGames {
                    side: MatchupSide::Hitter,
                    games_played,
                    required,
                };
            }
            StatsBefore::UnknownGame => return MatchupFeatures::UnknownGame,
        };

        let Some(pitcher_id) = hitter.opposing_pitcher_for(game_id) else {
            return MatchupFeatures::UnresolvedPitcher;
        };
        let Some(pitcher) = self.player_map.pitcher(pitcher_id) else {
            return MatchupFeatures::UnresolvedPitcher;
        };
        let pitcher_row = match pitcher.stats_before(game_id, opts.pitcher_min_games) {
            StatsBefore::Found(row) => row,
            StatsBefore::TooFewGames {
                games_played,
                required,
            } => {
                return MatchupFeatures::TooFewGames {
                    side: MatchupSide::Pitcher,
                    games_played,
                    required,
                };
            }
            StatsBefore::UnknownGame => return MatchupFeatures::UnresolvedPitcher,
        };

        let mut features = hitter_row.values.clone();
        if opts.include_prior_season {
            let names: Vec<&str> = self.player_map.hitter_config().numeric_names().collect();
            let prior_fields =
                fold_prior_season(hitter_id, game_date.year() - 1, &features, &names, prior);
            features.extend(prior_fields);
        }
        for (name, value) in &pitcher_row.values {
            features.insert(format!("{OPPOSING_PITCHER_PREFIX}{name}"), *value);
        }

        MatchupFeatures::Ready(features)
    }
}
