use std::collections::HashMap;

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::NaiveDate;

use dingercast::boxscore_fetch::parse_game_page;
use dingercast::game::{GameRecord, RawLine};
use dingercast::ledger::home_runs_in_details;
use dingercast::runner::SeasonRunner;

static BOX_SCORE_HTML: &str = include_str!("../tests/fixtures/box_score.html");

fn hitter_line(name: &str, at_bats: u32, details: &str) -> RawLine {
    let mut line = HashMap::new();
    line.insert("Batting".to_string(), name.to_string());
    line.insert("Position".to_string(), "1B".to_string());
    line.insert("Batting Average".to_string(), ".275".to_string());
    line.insert("On-Base%".to_string(), ".340".to_string());
    line.insert("Slugging %".to_string(), ".455".to_string());
    line.insert("At Bats".to_string(), at_bats.to_string());
    line.insert("Runs Batted In".to_string(), "1".to_string());
    line.insert("details".to_string(), details.to_string());
    line
}

fn pitcher_line(name: &str) -> RawLine {
    let mut line = HashMap::new();
    line.insert("Pitching".to_string(), name.to_string());
    line.insert("Position".to_string(), "P".to_string());
    line.insert("Earned Run Average".to_string(), "3.60".to_string());
    line.insert("Innings Pitched".to_string(), "6.0".to_string());
    line.insert("Batters Faced".to_string(), "25".to_string());
    line.insert("Strikeouts".to_string(), "6".to_string());
    line.insert("Home Runs Allowed".to_string(), "1".to_string());
    line
}

/// One season of synthetic games, 9 hitters a side, ids in replay order.
fn synthetic_games(n: usize) -> Vec<GameRecord> {
    assert!(n <= 150, "id scheme only covers one season");
    (0..n)
        .map(|idx| {
            let month = 4 + (idx / 28) as u32;
            let day = (idx % 28) as u32 + 1;
            let id = format!("CHN2021{month:02}{day:02}0");
            let home_batting = (0..9)
                .map(|slot| {
                    hitter_line(
                        &format!("Home Hitter {slot}"),
                        4,
                        if slot == 0 { "HR" } else { "" },
                    )
                })
                .collect();
            let away_batting = (0..9)
                .map(|slot| hitter_line(&format!("Away Hitter {slot}"), 4, ""))
                .collect();
            GameRecord {
                id,
                date: NaiveDate::from_ymd_opt(2021, month, day).expect("valid date"),
                start_time: None,
                venue: None,
                home_team: "Home".to_string(),
                away_team: "Away".to_string(),
                home_batting,
                away_batting,
                home_pitching: vec![pitcher_line("Home Starter")],
                away_pitching: vec![pitcher_line("Away Starter")],
            }
        })
        .collect()
}

fn bench_replay_season(c: &mut Criterion) {
    let games = synthetic_games(150);
    c.bench_function("replay_150_games", |b| {
        b.iter(|| {
            let mut runner = SeasonRunner::with_defaults();
            let summary = runner.replay_all(black_box(&games)).unwrap();
            black_box(summary.hitter_lines);
        })
    });
}

fn bench_stats_before_query(c: &mut Criterion) {
    let games = synthetic_games(150);
    let mut runner = SeasonRunner::with_defaults();
    runner.replay_all(&games).unwrap();
    let last_id = games.last().unwrap().id.clone();

    c.bench_function("stats_before_query", |b| {
        b.iter(|| {
            let ledger = runner.player_map().hitter("Home Hitter 0").unwrap();
            let row = ledger
                .stats_before(black_box(&last_id), 20)
                .found()
                .unwrap();
            black_box(row.season_games);
        })
    });
}

fn bench_box_score_parse(c: &mut Criterion) {
    c.bench_function("box_score_parse", |b| {
        b.iter(|| {
            let game = parse_game_page("CHN202104010", black_box(BOX_SCORE_HTML)).unwrap();
            black_box(game.home_batting.len());
        })
    });
}

fn bench_details_scan(c: &mut Criterion) {
    c.bench_function("details_home_runs", |b| {
        b.iter(|| {
            let n = home_runs_in_details(black_box("2·2B,2·HR,SB"));
            black_box(n);
        })
    });
}

criterion_group!(
    perf,
    bench_replay_season,
    bench_stats_before_query,
    bench_box_score_parse,
    bench_details_scan
);
criterion_main!(perf);
