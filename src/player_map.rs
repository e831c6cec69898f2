use std::collections::HashMap;
use std::sync::Arc;

use crate::game::{RawLine, season_of};
use crate::ledger::{
    ConfigError, DETAILS, HOME_RUNS, LedgerRole, PlayerLedger, StatConfig, StatKind, StatRow,
    home_runs_in_details,
};

/// Which side of the directory a lookup should search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleFilter {
    Either,
    Hitter,
    Pitcher,
}

/// Owns every player ledger for one replay. Hitters and pitchers are kept
/// separately; at most one ledger exists per player id per role. Ledgers are
/// created on first sight of a player by the record methods and never by
/// lookup.
#[derive(Debug, Clone)]
pub struct PlayerMap {
    hitter_config: Arc<StatConfig>,
    pitcher_config: Arc<StatConfig>,
    hitters: HashMap<String, PlayerLedger>,
    pitchers: HashMap<String, PlayerLedger>,
}

impl PlayerMap {
    pub fn new(
        hitter_config: StatConfig,
        pitcher_config: StatConfig,
    ) -> Result<Self, ConfigError> {
        if !hitter_config.has_details() {
            return Err(ConfigError::MissingDetails);
        }
        Ok(Self {
            hitter_config: Arc::new(hitter_config),
            pitcher_config: Arc::new(pitcher_config),
            hitters: HashMap::new(),
            pitchers: HashMap::new(),
        })
    }

    pub fn with_defaults() -> Self {
        Self::new(StatConfig::hitter_default(), StatConfig::pitcher_default())
            .expect("default stat configs are valid")
    }

    /// Drop all ledgers, keeping the stat configuration. Called at the start
    /// of a full replay.
    pub fn reset(&mut self) {
        self.hitters.clear();
        self.pitchers.clear();
    }

    /// Ingest one hitter's line for one game. Malformed lines (missing
    /// details column, missing stat column, non-numeric value) are logged and
    /// dropped without touching the ledger; the replay carries on.
    pub fn record_hitter_game(
        &mut self,
        player_id: &str,
        game_id: &str,
        raw: &RawLine,
        opposing_pitcher: Option<&str>,
    ) {
        let Some(details) = raw.get(DETAILS) else {
            log::warn!("dropping {player_id} line for {game_id}: no details column");
            return;
        };
        let details = details.clone();

        let config = Arc::clone(&self.hitter_config);
        let ledger = self
            .hitters
            .entry(player_id.to_string())
            .or_insert_with(|| {
                PlayerLedger::new(player_id, LedgerRole::Hitter, Arc::clone(&config))
            });

        // Season reset is decided here, against the last ingested row, before
        // the ledger ever sees the new values.
        let reset = season_of(game_id) != season_of(&ledger.last_row().game_id);
        let Some(accumulated) = accumulate_line(
            &config,
            LedgerRole::Hitter,
            player_id,
            game_id,
            raw,
            &details,
            ledger.last_row(),
            reset,
        ) else {
            return;
        };
        ledger.append_game(game_id, &accumulated, &details, opposing_pitcher);
    }

    pub fn record_pitcher_game(&mut self, player_id: &str, game_id: &str, raw: &RawLine) {
        let details = raw.get(DETAILS).cloned().unwrap_or_default();

        let config = Arc::clone(&self.pitcher_config);
        let ledger = self
            .pitchers
            .entry(player_id.to_string())
            .or_insert_with(|| {
                PlayerLedger::new(player_id, LedgerRole::Pitcher, Arc::clone(&config))
            });

        let reset = season_of(game_id) != season_of(&ledger.last_row().game_id);
        let Some(accumulated) = accumulate_line(
            &config,
            LedgerRole::Pitcher,
            player_id,
            game_id,
            raw,
            &details,
            ledger.last_row(),
            reset,
        ) else {
            return;
        };
        ledger.append_game(game_id, &accumulated, &details, None);
    }

    pub fn hitter(&self, player_id: &str) -> Option<&PlayerLedger> {
        self.hitters.get(player_id)
    }

    pub fn pitcher(&self, player_id: &str) -> Option<&PlayerLedger> {
        self.pitchers.get(player_id)
    }

    /// Find a ledger without ever creating one.
    pub fn lookup(&self, player_id: &str, role: RoleFilter) -> Option<&PlayerLedger> {
        match role {
            RoleFilter::Hitter => self.hitter(player_id),
            RoleFilter::Pitcher => self.pitcher(player_id),
            RoleFilter::Either => self.hitter(player_id).or_else(|| self.pitcher(player_id)),
        }
    }

    pub fn hitter_ids(&self) -> impl Iterator<Item = &str> {
        self.hitters.keys().map(String::as_str)
    }

    pub fn pitcher_ids(&self) -> impl Iterator<Item = &str> {
        self.pitchers.keys().map(String::as_str)
    }

    pub fn hitter_count(&self) -> usize {
        self.hitters.len()
    }

    pub fn pitcher_count(&self) -> usize {
        self.pitchers.len()
    }

    pub fn hitter_config(&self) -> &StatConfig {
        &self.hitter_config
    }

    pub fn pitcher_config(&self) -> &StatConfig {
        &self.pitcher_config
    }
}

/// Turn a raw textual line into the cumulative numeric row the ledger will
/// store: parse each configured counting/gauge stat, add the previous row's
/// cumulative value for counting stats unless the season just changed.
/// Returns None (after logging) when the line is malformed.
#[allow(clippy::too_many_arguments)]
fn accumulate_line(
    config: &StatConfig,
    role: LedgerRole,
    player_id: &str,
    game_id: &str,
    raw: &RawLine,
    details: &str,
    prev: &StatRow,
    reset: bool,
) -> Option<HashMap<String, f64>> {
    let mut out = HashMap::with_capacity(config.names().len());
    for name in config.names() {
        match config.kind(name) {
            Some(StatKind::Counting) => {
                let delta = if role == LedgerRole::Hitter && name == HOME_RUNS {
                    home_runs_in_details(details) as f64
                } else {
                    let Some(cell) = raw.get(name) else {
                        log::warn!("dropping {player_id} line for {game_id}: no {name} column");
                        return None;
                    };
                    let Some(value) = parse_number(cell) else {
                        log::warn!(
                            "dropping {player_id} line for {game_id}: bad {name} value {cell:?}"
                        );
                        return None;
                    };
                    value
                };
                let carried = if reset { 0.0 } else { prev.value(name).unwrap_or(0.0) };
                out.insert(name.clone(), carried + delta);
            }
            Some(StatKind::Gauge) => {
                let Some(cell) = raw.get(name) else {
                    log::warn!("dropping {player_id} line for {game_id}: no {name} column");
                    return None;
                };
                let Some(value) = parse_number(cell) else {
                    log::warn!(
                        "dropping {player_id} line for {game_id}: bad {name} value {cell:?}"
                    );
                    return None;
                };
                out.insert(name.clone(), value);
            }
            // Derived stats, games played and details are filled in by the
            // ledger at insertion time.
            _ => {}
        }
    }
    Some(out)
}

/// Empty box-score cells mean zero; anything else must parse as a number.
fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AT_BATS, GAMES_PLAYED, StatsBefore};

    fn raw(pairs: &[(&str, &str)]) -> RawLine {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn small_map() -> PlayerMap {
        PlayerMap::new(
            StatConfig::from_names(&[
                AT_BATS,
                HOME_RUNS,
                "Average Home Runs",
                GAMES_PLAYED,
                DETAILS,
            ])
            .unwrap(),
            StatConfig::pitcher_default(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_hitter_config_without_details() {
        let err = PlayerMap::new(
            StatConfig::from_names(&[AT_BATS]).unwrap(),
            StatConfig::pitcher_default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDetails));
    }

    #[test]
    fn counting_stats_accumulate_within_a_season() {
        let mut map = small_map();
        map.record_hitter_game(
            "Kris Bryant",
            "CHN202104010",
            &raw(&[(AT_BATS, "4"), (DETAILS, "HR")]),
            Some("Jacob deGrom"),
        );
        map.record_hitter_game(
            "Kris Bryant",
            "CHN202104020",
            &raw(&[(AT_BATS, "3"), (DETAILS, "")]),
            Some("Max Scherzer"),
        );

        let ledger = map.hitter("Kris Bryant").unwrap();
        let row = ledger.last_row();
        assert_eq!(row.value(AT_BATS), Some(7.0));
        assert_eq!(row.value(HOME_RUNS), Some(1.0));
        assert_eq!(row.season_games, 2);
    }

    #[test]
    fn counters_restart_at_season_boundary() {
        let mut map = small_map();
        map.record_hitter_game(
            "Kris Bryant",
            "CHN202104010",
            &raw(&[(AT_BATS, "4"), (DETAILS, "HR")]),
            None,
        );
        map.record_hitter_game(
            "Kris Bryant",
            "CHN202204050",
            &raw(&[(AT_BATS, "5"), (DETAILS, "2·HR")]),
            None,
        );

        let row = map.hitter("Kris Bryant").unwrap().last_row();
        assert_eq!(row.value(AT_BATS), Some(5.0));
        assert_eq!(row.value(HOME_RUNS), Some(2.0));
        assert_eq!(row.value("Average Home Runs"), Some(0.4));
        assert_eq!(row.season_games, 1);
    }

    #[test]
    fn malformed_lines_are_dropped_not_fatal() {
        let mut map = small_map();
        map.record_hitter_game(
            "Kris Bryant",
            "CHN202104010",
            &raw(&[(AT_BATS, "four"), (DETAILS, "")]),
            None,
        );
        // Line missing the details column entirely.
        map.record_hitter_game("Kris Bryant", "CHN202104020", &raw(&[(AT_BATS, "4")]), None);

        // The ledger exists (the player was sighted) but holds no game rows.
        let ledger = map.hitter("Kris Bryant").unwrap();
        assert_eq!(ledger.game_ids().count(), 0);
    }

    #[test]
    fn empty_cells_count_as_zero() {
        let mut map = small_map();
        map.record_hitter_game(
            "Kris Bryant",
            "CHN202104010",
            &raw(&[(AT_BATS, ""), (DETAILS, "")]),
            None,
        );
        let row = map.hitter("Kris Bryant").unwrap().last_row();
        assert_eq!(row.value(AT_BATS), Some(0.0));
        assert_eq!(row.value("Average Home Runs"), Some(0.0));
    }

    #[test]
    fn lookup_never_creates() {
        let map = small_map();
        assert!(map.lookup("Nobody", RoleFilter::Either).is_none());
        assert_eq!(map.hitter_count(), 0);
        assert_eq!(map.pitcher_count(), 0);
    }

    #[test]
    fn pitchers_and_hitters_are_separate_ledgers() {
        let mut map = small_map();
        map.record_hitter_game(
            "Shohei Ohtani",
            "ANA202104010",
            &raw(&[(AT_BATS, "4"), (DETAILS, "HR")]),
            None,
        );
        map.record_pitcher_game(
            "Shohei Ohtani",
            "ANA202104010",
            &raw(&[
                ("Earned Run Average", "2.70"),
                ("Innings Pitched", "6.0"),
                ("Batters Faced", "24"),
                ("Strikeouts", "9"),
                ("Home Runs Allowed", "1"),
            ]),
        );

        let hitter = map.lookup("Shohei Ohtani", RoleFilter::Hitter).unwrap();
        let pitcher = map.lookup("Shohei Ohtani", RoleFilter::Pitcher).unwrap();
        assert_eq!(hitter.last_row().value(HOME_RUNS), Some(1.0));
        assert_eq!(pitcher.last_row().value("Strikeouts"), Some(9.0));
        assert_eq!(pitcher.last_row().value("Average Strikeouts"), Some(9.0 / 24.0));
        assert!(matches!(
            pitcher.stats_before("ANA202104010", 1),
            StatsBefore::TooFewGames { .. }
        ));
    }
}
