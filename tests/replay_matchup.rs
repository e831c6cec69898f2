use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;

use dingercast::game::{GameRecord, RawLine};
use dingercast::prior_season::{PriorSeasonSource, SeasonAggregate, SeasonTotals};
use dingercast::runner::{
    MatchupFeatures, MatchupOptions, MatchupSide, ReplayError, SeasonRunner,
};

const HITTER_HOME: &str = "Kris Bryant";
const HITTER_AWAY: &str = "Paul Goldschmidt";
const PITCHER_HOME: &str = "Kyle Hendricks";
const PITCHER_AWAY: &str = "Adam Wainwright";

fn hitter_line(name: &str, at_bats: &str, details: &str) -> RawLine {
    let mut line = HashMap::new();
    line.insert("Batting".to_string(), name.to_string());
    line.insert("Position".to_string(), "1B".to_string());
    line.insert("Batting Average".to_string(), ".280".to_string());
    line.insert("On-Base%".to_string(), ".350".to_string());
    line.insert("Slugging %".to_string(), ".470".to_string());
    line.insert("At Bats".to_string(), at_bats.to_string());
    line.insert("Runs Batted In".to_string(), "1".to_string());
    line.insert("details".to_string(), details.to_string());
    line
}

fn pitcher_line(name: &str, strikeouts: &str) -> RawLine {
    let mut line = HashMap::new();
    line.insert("Pitching".to_string(), name.to_string());
    line.insert("Position".to_string(), "P".to_string());
    line.insert("Earned Run Average".to_string(), "3.20".to_string());
    line.insert("Innings Pitched".to_string(), "6.0".to_string());
    line.insert("Batters Faced".to_string(), "24".to_string());
    line.insert("Strikeouts".to_string(), strikeouts.to_string());
    line.insert("Home Runs Allowed".to_string(), "1".to_string());
    line
}

fn game(id: &str, day: u32, details: &str) -> GameRecord {
    GameRecord {
        id: id.to_string(),
        date: NaiveDate::from_ymd_opt(2021, 4, day).unwrap(),
        start_time: None,
        venue: Some("Wrigley Field".to_string()),
        home_team: "Chicago Cubs".to_string(),
        away_team: "St. Louis Cardinals".to_string(),
        home_batting: vec![hitter_line(HITTER_HOME, "4", details)],
        away_batting: vec![hitter_line(HITTER_AWAY, "4", "")],
        home_pitching: vec![pitcher_line(PITCHER_HOME, "5")],
        away_pitching: vec![pitcher_line(PITCHER_AWAY, "7")],
    }
}

fn three_games() -> Vec<GameRecord> {
    vec![
        game("CHN202104010", 1, "HR"),
        game("CHN202104020", 2, ""),
        game("CHN202104030", 3, "2·HR"),
    ]
}

#[test]
fn replay_rejects_out_of_order_games() -> Result<()> {
    let games = three_games();
    let mut runner = SeasonRunner::with_defaults();
    let shuffled = vec![games[1].clone(), games[0].clone()];
    let err = runner.replay_all(&shuffled).unwrap_err();
    assert!(matches!(err, ReplayError::OutOfOrder { .. }));

    // In-order replay of the same games is fine.
    runner.replay_all(&games)?;
    Ok(())
}

#[test]
fn replay_routes_hitters_against_opposing_starters() -> Result<()> {
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&three_games())?;

    let map = runner.player_map();
    let home_hitter = map.hitter(HITTER_HOME).expect("home hitter ledger");
    let away_hitter = map.hitter(HITTER_AWAY).expect("away hitter ledger");

    // Home hitters face the away starter and vice versa.
    assert_eq!(
        home_hitter.opposing_pitcher_for("CHN202104010"),
        Some(PITCHER_AWAY)
    );
    assert_eq!(
        away_hitter.opposing_pitcher_for("CHN202104010"),
        Some(PITCHER_HOME)
    );
    assert_eq!(map.pitcher_count(), 2);
    Ok(())
}

#[test]
fn matchup_combines_both_sides_with_prefixes() -> Result<()> {
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&three_games())?;

    let opts = MatchupOptions {
        hitter_min_games: 2,
        pitcher_min_games: 1,
        include_prior_season: false,
    };
    let result = runner.matchup_features(
        HITTER_HOME,
        "CHN202104030",
        NaiveDate::from_ymd_opt(2021, 4, 3).unwrap(),
        &opts,
        None,
    );
    let features = result.ready().expect("matchup is ready");

    // Hitter side: cumulative through the second game only.
    assert_eq!(features.get("At Bats"), Some(&8.0));
    assert_eq!(features.get("Home Runs"), Some(&1.0));
    assert_eq!(features.get("Games Played"), Some(&2.0));

    // Pitcher side: the away starter's pre-game state, renamed.
    assert_eq!(features.get("Opposing Pitcher Strikeouts"), Some(&14.0));
    assert_eq!(features.get("Opposing Pitcher Games Played"), Some(&2.0));
    assert!(!features.contains_key("Strikeouts"));
    Ok(())
}

#[test]
fn hitter_threshold_trips_even_when_pitcher_qualifies() -> Result<()> {
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&three_games())?;

    let opts = MatchupOptions {
        hitter_min_games: 20,
        pitcher_min_games: 1,
        include_prior_season: false,
    };
    let result = runner.matchup_features(
        HITTER_HOME,
        "CHN202104030",
        NaiveDate::from_ymd_opt(2021, 4, 3).unwrap(),
        &opts,
        None,
    );
    assert!(matches!(
        result,
        MatchupFeatures::TooFewGames {
            side: MatchupSide::Hitter,
            games_played: 2,
            required: 20
        }
    ));
    Ok(())
}

#[test]
fn missing_players_and_games_get_distinct_answers() -> Result<()> {
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&three_games())?;
    let date = NaiveDate::from_ymd_opt(2021, 4, 3).unwrap();
    let opts = MatchupOptions {
        hitter_min_games: 0,
        pitcher_min_games: 0,
        include_prior_season: false,
    };

    assert_eq!(
        runner.matchup_features("Babe Ruth", "CHN202104030", date, &opts, None),
        MatchupFeatures::UnknownHitter
    );
    assert_eq!(
        runner.matchup_features(HITTER_HOME, "BOS202105150", date, &opts, None),
        MatchupFeatures::UnknownGame
    );
    Ok(())
}

#[test]
fn missing_pitching_table_leaves_matchup_unresolved() -> Result<()> {
    let mut no_pitching = game("CHN202104010", 1, "HR");
    no_pitching.home_pitching.clear();
    no_pitching.away_pitching.clear();

    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&[no_pitching])?;

    let opts = MatchupOptions {
        hitter_min_games: 0,
        pitcher_min_games: 0,
        include_prior_season: false,
    };
    let result = runner.matchup_features(
        HITTER_HOME,
        "CHN202104010",
        NaiveDate::from_ymd_opt(2021, 4, 1).unwrap(),
        &opts,
        None,
    );
    assert_eq!(result, MatchupFeatures::UnresolvedPitcher);
    Ok(())
}

struct FixedSource(Option<SeasonAggregate>);

impl PriorSeasonSource for FixedSource {
    fn season_aggregate(&self, _: &str, _: i32) -> Result<Option<SeasonAggregate>> {
        Ok(self.0.clone())
    }
}

#[test]
fn matchup_folds_prior_season_fields() -> Result<()> {
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&three_games())?;
    let date = NaiveDate::from_ymd_opt(2021, 4, 3).unwrap();
    let opts = MatchupOptions {
        hitter_min_games: 1,
        pitcher_min_games: 1,
        include_prior_season: true,
    };

    let aggregate = SeasonAggregate::from_totals(&SeasonTotals {
        at_bats: 500.0,
        home_runs: 30.0,
        runs_batted_in: 90.0,
        games_played: 150.0,
        batting_average: 0.290,
        on_base_pct: 0.380,
        slugging_pct: 0.520,
    });
    let source = FixedSource(Some(aggregate));
    let features = runner
        .matchup_features(HITTER_HOME, "CHN202104030", date, &opts, Some(&source))
        .ready()
        .expect("ready");
    assert_eq!(features.get("Last Season At Bats"), Some(&500.0));
    assert_eq!(features.get("Last Season Average Home Runs"), Some(&0.06));

    // When the service has no record the fields mirror the local values.
    let missing = FixedSource(None);
    let features = runner
        .matchup_features(HITTER_HOME, "CHN202104030", date, &opts, Some(&missing))
        .ready()
        .expect("ready");
    assert_eq!(features.get("Last Season At Bats"), Some(&8.0));
    assert_eq!(
        features.get("Last Season Batting Average"),
        features.get("Batting Average")
    );
    Ok(())
}

#[test]
fn replaying_again_rebuilds_from_scratch() -> Result<()> {
    let games = three_games();
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&games)?;
    runner.replay_all(&games)?;

    let ledger = runner.player_map().hitter(HITTER_HOME).unwrap();
    // Three real rows plus the initial one; nothing doubled.
    assert_eq!(ledger.rows().len(), 4);
    assert_eq!(ledger.last_row().value("At Bats"), Some(12.0));
    Ok(())
}
