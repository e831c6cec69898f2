//! Home-run probability pipeline: scrape box scores, replay them into
//! per-player running ledgers, derive point-in-time feature vectors, apply
//! trained models, and attach sportsbook odds to the stored predictions.

pub mod boxscore_fetch;
pub mod game;
pub mod http_client;
pub mod ledger;
pub mod model;
pub mod odds;
pub mod player_map;
pub mod prior_season;
pub mod runner;
pub mod statsapi;
pub mod store;
