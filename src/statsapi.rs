use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::Value;

use crate::http_client::http_client;
use crate::prior_season::{PriorSeasonSource, SeasonAggregate, SeasonTotals};

const MLB_STATSAPI_URL: &str = "https://statsapi.mlb.com/api/v1";

/// Client for the league stats service: player lookup, prior-season hitting
/// aggregates, daily schedule and per-game batter listings.
#[derive(Debug, Clone)]
pub struct StatsApiClient {
    base_url: String,
}

impl Default for StatsApiClient {
    fn default() -> Self {
        Self::new()
    }
}

/// One scheduled game as reported by the league schedule endpoint.
#[derive(Debug, Clone)]
pub struct ScheduledGame {
    pub game_pk: u64,
    pub game_datetime: String,
    pub status: String,
    pub home_name: String,
    pub away_name: String,
}

impl StatsApiClient {
    pub fn new() -> Self {
        Self {
            base_url: MLB_STATSAPI_URL.to_string(),
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a player name to the service's numeric id. Names that fail the
    /// direct lookup are retried with accents stripped, since the service
    /// stores some names unaccented.
    pub fn find_player_id(&self, name: &str) -> Result<Option<u64>> {
        if let Some(id) = self.search_once(name)? {
            return Ok(Some(id));
        }
        let plain = strip_accents(name);
        if plain != name {
            return self.search_once(&plain);
        }
        Ok(None)
    }

    fn search_once(&self, name: &str) -> Result<Option<u64>> {
        let url = format!("{}/people/search", self.base_url);
        let client = http_client()?;
        let body = client
            .get(&url)
            .query(&[("names", name)])
            .send()
            .with_context(|| format!("player search for {name:?} failed"))?
            .text()
            .context("failed reading player search body")?;
        let value: Value =
            serde_json::from_str(body.trim()).context("invalid player search json")?;
        Ok(parse_search_response(&value))
    }

    /// Full-season hitting totals for one (player, year), or None when the
    /// service has no record.
    pub fn season_hitting_totals(
        &self,
        player_id: u64,
        year: i32,
    ) -> Result<Option<SeasonTotals>> {
        let url = format!("{}/people/{player_id}/stats", self.base_url);
        let client = http_client()?;
        let season = year.to_string();
        let body = client
            .get(&url)
            .query(&[
                ("stats", "season"),
                ("group", "hitting"),
                ("season", season.as_str()),
            ])
            .send()
            .with_context(|| format!("season stats for player {player_id} failed"))?
            .text()
            .context("failed reading season stats body")?;
        let value: Value =
            serde_json::from_str(body.trim()).context("invalid season stats json")?;
        Ok(parse_season_totals(&value))
    }

    pub fn schedule(&self, date: NaiveDate) -> Result<Vec<ScheduledGame>> {
        let url = format!("{}/schedule", self.base_url);
        let client = http_client()?;
        let day = date.format("%Y-%m-%d").to_string();
        let body = client
            .get(&url)
            .query(&[("sportId", "1"), ("date", day.as_str())])
            .send()
            .with_context(|| format!("schedule for {day} failed"))?
            .text()
            .context("failed reading schedule body")?;
        let value: Value = serde_json::from_str(body.trim()).context("invalid schedule json")?;
        Ok(parse_schedule(&value))
    }

    /// Names of every batter listed in a game's box score, both sides.
    pub fn game_batter_names(&self, game_pk: u64) -> Result<Vec<String>> {
        let url = format!("{}/game/{game_pk}/boxscore", self.base_url);
        let client = http_client()?;
        let body = client
            .get(&url)
            .send()
            .with_context(|| format!("boxscore for game {game_pk} failed"))?
            .text()
            .context("failed reading boxscore body")?;
        let value: Value = serde_json::from_str(body.trim()).context("invalid boxscore json")?;
        Ok(parse_boxscore_batters(&value))
    }
}

impl PriorSeasonSource for StatsApiClient {
    fn season_aggregate(&self, player_id: &str, year: i32) -> Result<Option<SeasonAggregate>> {
        let Some(id) = self.find_player_id(player_id)? else {
            return Ok(None);
        };
        let Some(totals) = self.season_hitting_totals(id, year)? else {
            return Ok(None);
        };
        Ok(Some(SeasonAggregate::from_totals(&totals)))
    }
}

fn parse_search_response(v: &Value) -> Option<u64> {
    v.get("people")?
        .as_array()?
        .first()
        .and_then(|p| p.get("id"))
        .and_then(as_u64_any)
}

fn parse_season_totals(v: &Value) -> Option<SeasonTotals> {
    let stat = v
        .get("stats")?
        .as_array()?
        .first()?
        .get("splits")?
        .as_array()?
        .first()?
        .get("stat")?;
    Some(SeasonTotals {
        at_bats: stat.get("atBats").and_then(as_f64_any).unwrap_or(0.0),
        home_runs: stat.get("homeRuns").and_then(as_f64_any).unwrap_or(0.0),
        runs_batted_in: stat.get("rbi").and_then(as_f64_any).unwrap_or(0.0),
        games_played: stat.get("gamesPlayed").and_then(as_f64_any).unwrap_or(0.0),
        batting_average: stat.get("avg").and_then(as_f64_any).unwrap_or(0.0),
        on_base_pct: stat.get("obp").and_then(as_f64_any).unwrap_or(0.0),
        slugging_pct: stat.get("slg").and_then(as_f64_any).unwrap_or(0.0),
    })
}

fn parse_schedule(v: &Value) -> Vec<ScheduledGame> {
    let mut out = Vec::new();
    let Some(dates) = v.get("dates").and_then(|d| d.as_array()) else {
        return out;
    };
    for date in dates {
        let Some(games) = date.get("games").and_then(|g| g.as_array()) else {
            continue;
        };
        for game in games {
            let Some(game_pk) = game.get("gamePk").and_then(as_u64_any) else {
                continue;
            };
            let status = game
                .get("status")
                .and_then(|s| s.get("detailedState"))
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string();
            let team_name = |side: &str| {
                game.get("teams")
                    .and_then(|t| t.get(side))
                    .and_then(|t| t.get("team"))
                    .and_then(|t| t.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            out.push(ScheduledGame {
                game_pk,
                game_datetime: game
                    .get("gameDate")
                    .and_then(|d| d.as_str())
                    .unwrap_or_default()
                    .to_string(),
                status,
                home_name: team_name("home"),
                away_name: team_name("away"),
            });
        }
    }
    out
}

fn parse_boxscore_batters(v: &Value) -> Vec<String> {
    let mut out = Vec::new();
    for side in ["away", "home"] {
        let Some(team) = v.get("teams").and_then(|t| t.get(side)) else {
            continue;
        };
        let Some(batters) = team.get("batters").and_then(|b| b.as_array()) else {
            continue;
        };
        let players = team.get("players");
        for id in batters.iter().filter_map(as_u64_any) {
            if id == 0 {
                continue;
            }
            let name = players
                .and_then(|p| p.get(format!("ID{id}")))
                .and_then(|p| p.get("person"))
                .and_then(|p| p.get("fullName"))
                .and_then(|n| n.as_str());
            if let Some(name) = name {
                out.push(name.to_string());
            }
        }
    }
    out
}

fn as_u64_any(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<u64>().ok()
}

/// Numbers arrive either as JSON numbers or as strings like ".280".
fn as_f64_any(v: &Value) -> Option<f64> {
    if let Some(n) = v.as_f64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<f64>().ok()
}

/// Fold common Latin accents down to ASCII for the fallback player lookup.
pub fn strip_accents(name: &str) -> String {
    name.chars()
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
            'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ñ' => 'n',
            'Ñ' => 'N',
            'ç' => 'c',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_accents_flattens_common_names() {
        assert_eq!(strip_accents("José Ramírez"), "Jose Ramirez");
        assert_eq!(strip_accents("Peña"), "Pena");
        assert_eq!(strip_accents("Mike Trout"), "Mike Trout");
    }

    #[test]
    fn parses_search_response() {
        let v: Value = serde_json::from_str(
            r#"{"people":[{"id":545361,"fullName":"Mike Trout"},{"id":1}]}"#,
        )
        .unwrap();
        assert_eq!(parse_search_response(&v), Some(545361));
        let empty: Value = serde_json::from_str(r#"{"people":[]}"#).unwrap();
        assert_eq!(parse_search_response(&empty), None);
    }

    #[test]
    fn parses_season_totals_with_string_averages() {
        let v: Value = serde_json::from_str(
            r#"{"stats":[{"splits":[{"stat":{
                "atBats":470,"homeRuns":40,"rbi":95,"gamesPlayed":134,
                "avg":".283","obp":".390","slg":".582"}}]}]}"#,
        )
        .unwrap();
        let totals = parse_season_totals(&v).expect("totals");
        assert_eq!(totals.at_bats, 470.0);
        assert_eq!(totals.home_runs, 40.0);
        assert_eq!(totals.batting_average, 0.283);
    }

    #[test]
    fn missing_splits_mean_no_record() {
        let v: Value = serde_json::from_str(r#"{"stats":[{"splits":[]}]}"#).unwrap();
        assert!(parse_season_totals(&v).is_none());
    }

    #[test]
    fn parses_schedule_games() {
        let v: Value = serde_json::from_str(
            r#"{"dates":[{"games":[{
                "gamePk":715720,
                "gameDate":"2023-06-10T20:10:00Z",
                "status":{"detailedState":"Scheduled"},
                "teams":{
                    "home":{"team":{"name":"Chicago Cubs"}},
                    "away":{"team":{"name":"St. Louis Cardinals"}}}}]}]}"#,
        )
        .unwrap();
        let games = parse_schedule(&v);
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].game_pk, 715720);
        assert_eq!(games[0].home_name, "Chicago Cubs");
        assert_eq!(games[0].status, "Scheduled");
    }

    #[test]
    fn parses_boxscore_batters_skipping_zero_ids() {
        let v: Value = serde_json::from_str(
            r#"{"teams":{
                "away":{"batters":[660271,0],
                        "players":{"ID660271":{"person":{"id":660271,"fullName":"Shohei Ohtani"}}}},
                "home":{"batters":[545361],
                        "players":{"ID545361":{"person":{"id":545361,"fullName":"Mike Trout"}}}}}}"#,
        )
        .unwrap();
        let names = parse_boxscore_batters(&v);
        assert_eq!(names, vec!["Shohei Ohtani".to_string(), "Mike Trout".to_string()]);
    }
}
