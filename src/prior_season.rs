use std::collections::HashMap;

use anyhow::Result;

use crate::ledger::{AT_BATS, GAMES_PLAYED, HOME_RUNS, RUNS_BATTED_IN};

pub const LAST_SEASON_PREFIX: &str = "Last Season ";

/// A player's aggregate line for one full season, already mapped into the
/// local statistic vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonAggregate {
    pub values: HashMap<String, f64>,
}

/// Raw season totals as reported by the league stats service.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonTotals {
    pub at_bats: f64,
    pub home_runs: f64,
    pub runs_batted_in: f64,
    pub games_played: f64,
    pub batting_average: f64,
    pub on_base_pct: f64,
    pub slugging_pct: f64,
}

impl SeasonAggregate {
    /// Build the aggregate line from season totals. Ratio fields follow the
    /// same two denominator conventions as the ledger, computed over season
    /// totals, with divide-by-zero mapped to 0.
    pub fn from_totals(t: &SeasonTotals) -> Self {
        let ratio = |num: f64, denom: f64| if denom == 0.0 { 0.0 } else { num / denom };
        let mut values = HashMap::new();
        values.insert(AT_BATS.to_string(), t.at_bats);
        values.insert(HOME_RUNS.to_string(), t.home_runs);
        values.insert(RUNS_BATTED_IN.to_string(), t.runs_batted_in);
        values.insert(GAMES_PLAYED.to_string(), t.games_played);
        values.insert("Batting Average".to_string(), t.batting_average);
        values.insert("On-Base%".to_string(), t.on_base_pct);
        values.insert("Slugging %".to_string(), t.slugging_pct);
        values.insert(
            "Average Home Runs".to_string(),
            ratio(t.home_runs, t.at_bats),
        );
        values.insert(
            "Average Runs Batted In".to_string(),
            ratio(t.runs_batted_in, t.at_bats),
        );
        values.insert(
            "At Bats Per Game".to_string(),
            ratio(t.at_bats, t.games_played),
        );
        Self { values }
    }
}

/// Where prior-season aggregates come from. The network client lives outside
/// the aggregation engine; the engine only ever sees a value or "no record".
pub trait PriorSeasonSource {
    fn season_aggregate(&self, player_id: &str, year: i32) -> Result<Option<SeasonAggregate>>;
}

/// Produce the "Last Season X" feature fields for one player.
///
/// When the service has no record for the player/year (or the lookup fails),
/// every requested field falls back to the player's own current local value
/// under the same name; the last-season signal is neutralized, not errored.
pub fn fold_prior_season(
    player_id: &str,
    year: i32,
    local: &HashMap<String, f64>,
    names: &[&str],
    source: Option<&dyn PriorSeasonSource>,
) -> HashMap<String, f64> {
    let aggregate = source.and_then(|s| match s.season_aggregate(player_id, year) {
        Ok(found) => found,
        Err(err) => {
            log::warn!("prior season lookup failed for {player_id} ({year}): {err:#}");
            None
        }
    });

    let mut out = HashMap::with_capacity(names.len());
    for name in names {
        let value = aggregate
            .as_ref()
            .and_then(|a| a.values.get(*name).copied())
            .unwrap_or_else(|| local.get(*name).copied().unwrap_or(0.0));
        out.insert(format!("{LAST_SEASON_PREFIX}{name}"), value);
    }
    out
}
