use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rand::Rng;
use reqwest::header::USER_AGENT;

use crate::game::{GameRecord, RawLine};
use crate::http_client::{BROWSER_USER_AGENT, http_client};
use crate::ledger::DETAILS;

const DEFAULT_BASE_URL: &str = "https://www.baseball-reference.com";
// The host enforces ~20 requests/minute; sleep after every request.
const DEFAULT_DELAY_SECS: u64 = 3;
const DEFAULT_RETRIES: u32 = 5;

#[derive(Debug, Clone)]
pub struct BoxscoreConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub request_delay: Duration,
    pub retries: u32,
}

impl BoxscoreConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("BOXSCORE_BASE_URL")
            .ok()
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let data_dir = std::env::var("HR_DATA_DIR")
            .ok()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/game_data"));
        let delay_secs = std::env::var("SCRAPE_DELAY_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_DELAY_SECS);
        let retries = std::env::var("SCRAPE_RETRIES")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);
        Self {
            base_url,
            data_dir,
            request_delay: Duration::from_secs(delay_secs),
            retries,
        }
    }
}

/// Scrapes the box score host: day index pages for finished-game ids, game
/// pages for full box scores. Games already on disk are loaded, not
/// re-fetched.
pub struct BoxscoreScraper {
    cfg: BoxscoreConfig,
}

impl BoxscoreScraper {
    pub fn new(cfg: BoxscoreConfig) -> Self {
        Self { cfg }
    }

    /// Identifiers of every finished game in the inclusive date range.
    pub fn game_ids(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<String>> {
        use chrono::Datelike;
        let mut out = Vec::new();
        let mut day = start;
        while day <= end {
            log::info!("getting game ids for {}", day.format("%Y/%m/%d"));
            let url = format!(
                "{}/boxes/?year={}&month={}&day={}",
                self.cfg.base_url,
                day.year(),
                day.month(),
                day.day()
            );
            let html = self.get_with_retry(&url)?;
            out.extend(parse_day_game_ids(&html));
            day = day.succ_opt().ok_or_else(|| anyhow!("date overflow"))?;
        }
        log::info!("{} game ids found", out.len());
        Ok(out)
    }

    /// Fetch one game's box score, or load it from the data directory when it
    /// was downloaded before.
    pub fn fetch_game(&self, game_id: &str) -> Result<GameRecord> {
        let cached = self.cfg.data_dir.join(format!("{game_id}.json"));
        if cached.exists() {
            log::debug!("{} already downloaded", cached.display());
            return GameRecord::load(&cached);
        }

        let park = game_id
            .get(..3)
            .ok_or_else(|| anyhow!("game id {game_id:?} too short"))?;
        let url = format!("{}/boxes/{park}/{game_id}.shtml", self.cfg.base_url);
        log::info!("getting game data for {game_id} at {url}");
        let html = self.get_with_retry(&url)?;
        let game = parse_game_page(game_id, &html)?;
        game.save(&self.cfg.data_dir)?;
        Ok(game)
    }

    fn get_with_retry(&self, url: &str) -> Result<String> {
        let client = http_client()?;
        for _ in 0..self.cfg.retries {
            let response = client
                .get(url)
                .header(USER_AGENT, BROWSER_USER_AGENT)
                .send();
            // Sleep after every request, success or not, to stay under the
            // host's rate limit. Jitter avoids a fixed cadence.
            let jitter = rand::thread_rng().gen_range(0..500);
            std::thread::sleep(self.cfg.request_delay + Duration::from_millis(jitter));

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().context("failed reading page body");
                }
                Ok(resp) => {
                    log::warn!("request for {url} returned {}, trying again", resp.status());
                }
                Err(err) => {
                    log::warn!("request for {url} failed ({err}), trying again");
                }
            }
        }
        Err(anyhow!(
            "request for {url} failed after {} attempts",
            self.cfg.retries
        ))
    }
}

/// Game ids linked from a day index page: anchors whose text is "Final".
pub fn parse_day_game_ids(html: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut search_from = 0;
    while let Some(pos) = html[search_from..].find("<a ") {
        let tag_start = search_from + pos;
        let Some(tag_end) = html[tag_start..].find('>') else {
            break;
        };
        let tag = &html[tag_start..tag_start + tag_end];
        let text_start = tag_start + tag_end + 1;
        search_from = text_start;
        let Some(close) = html[text_start..].find("</a>") else {
            break;
        };
        if html[text_start..text_start + close].trim() != "Final" {
            continue;
        }
        let Some(href) = attr_value(tag, "href") else {
            continue;
        };
        if let Some(id) = href
            .rsplit('/')
            .next()
            .and_then(|f| f.strip_suffix(".shtml"))
        {
            out.push(id.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Batting,
    Pitching,
}

/// Parse one game page into a record. Stats tables are comment-wrapped on the
/// live site, so comments are unwrapped before scanning.
pub fn parse_game_page(game_id: &str, html: &str) -> Result<GameRecord> {
    let date = date_from_game_id(game_id)
        .ok_or_else(|| anyhow!("game id {game_id:?} has no date digits"))?;

    let headings = extract_blocks(html, "<h2", "</h2>");
    let away_team = headings
        .first()
        .map(|h| strip_tags(h))
        .ok_or_else(|| anyhow!("away team heading not found for {game_id}"))?;
    let home_team = headings
        .get(1)
        .map(|h| strip_tags(h))
        .ok_or_else(|| anyhow!("home team heading not found for {game_id}"))?;

    let venue = text_after_label(html, "Venue: ");
    let start_time = text_after_label(html, "Start Time: ")
        .map(|t| t.split(" Local").next().unwrap_or(&t).to_string());

    let unwrapped = html.replace("<!--", "").replace("-->", "");
    let mut batting: Vec<Vec<RawLine>> = Vec::new();
    let mut pitching: Vec<Vec<RawLine>> = Vec::new();
    for table in extract_blocks(&unwrapped, "<table", "</table>") {
        if table.contains("Play by Play Table") || table.contains("Top 5 Plays Table") {
            continue;
        }
        let kind = if table.contains(">Pitching<") || table.contains("\"Pitching\"") {
            TableKind::Pitching
        } else if table.contains(">Batting<") || table.contains("\"Batting\"") {
            TableKind::Batting
        } else {
            continue;
        };
        if let Some(lines) = parse_box_table(table, kind) {
            match kind {
                TableKind::Batting => batting.push(lines),
                TableKind::Pitching => pitching.push(lines),
            }
        }
    }

    if batting.len() != 2 || pitching.len() != 2 {
        return Err(anyhow!(
            "expected 2 batting and 2 pitching tables for {game_id}, found {} and {}",
            batting.len(),
            pitching.len()
        ));
    }
    // Away tables come first on the page.
    let home_batting = batting.pop().expect("checked above");
    let away_batting = batting.pop().expect("checked above");
    let home_pitching = pitching.pop().expect("checked above");
    let away_pitching = pitching.pop().expect("checked above");

    Ok(GameRecord {
        id: game_id.to_string(),
        date,
        start_time,
        venue,
        home_team,
        away_team,
        home_batting,
        away_batting,
        home_pitching,
        away_pitching,
    })
}

fn date_from_game_id(game_id: &str) -> Option<NaiveDate> {
    let digits = game_id.get(3..11)?;
    let year = digits.get(..4)?.parse().ok()?;
    let month = digits.get(4..6)?.parse().ok()?;
    let day = digits.get(6..8)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parse a batting or pitching table into raw lines. Header names come from
/// the `aria-label` attributes; batting player cells end with a position
/// token which is split off into a synthetic "Position" column.
fn parse_box_table(table_html: &str, kind: TableKind) -> Option<Vec<RawLine>> {
    let rows = extract_blocks(table_html, "<tr", "</tr>");
    let (header_row, data_rows) = rows.split_first()?;

    let mut headers = Vec::new();
    for (tag, _) in row_cells(header_row) {
        let label = attr_value(&tag, "aria-label").unwrap_or_default();
        // The details column is keyed lowercase throughout the pipeline.
        if label.eq_ignore_ascii_case(DETAILS) {
            headers.push(DETAILS.to_string());
        } else {
            headers.push(label);
        }
    }
    if headers.is_empty() {
        return None;
    }

    let mut out = Vec::new();
    for row in data_rows {
        let cells = row_cells(row);
        let Some((_, name_cell)) = cells.first() else {
            continue;
        };
        let name_text = strip_tags(name_cell);
        if name_text.is_empty() {
            continue;
        }

        let mut line = RawLine::new();
        match kind {
            TableKind::Batting => {
                // "Kris Bryant LF" -> name + trailing position token.
                let mut words: Vec<&str> = name_text.split_whitespace().collect();
                if words.len() < 2 {
                    continue;
                }
                let position = words.pop().unwrap_or_default();
                line.insert("Batting".to_string(), words.join(" "));
                line.insert("Position".to_string(), position.to_string());
            }
            TableKind::Pitching => {
                // "Kyle Hendricks, W (1-0)" -> name before the comma.
                let name = name_text.split(',').next().unwrap_or(&name_text).trim();
                line.insert("Pitching".to_string(), name.to_string());
                line.insert("Position".to_string(), "P".to_string());
            }
        }

        for (header, (_, cell)) in headers.iter().skip(1).zip(cells.iter().skip(1)) {
            if header.is_empty() {
                continue;
            }
            line.insert(header.clone(), strip_tags(cell));
        }
        out.push(line);
    }
    Some(out)
}

/// (tag, inner text) for each `<th>`/`<td>` cell in a table row.
fn row_cells(row_html: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut search_from = 0;
    loop {
        let th = row_html[search_from..].find("<th");
        let td = row_html[search_from..].find("<td");
        let (pos, close_tag) = match (th, td) {
            (Some(a), Some(b)) if a < b => (a, "</th>"),
            (Some(a), None) => (a, "</th>"),
            (_, Some(b)) => (b, "</td>"),
            (None, None) => break,
        };
        let tag_start = search_from + pos;
        let Some(tag_end) = row_html[tag_start..].find('>') else {
            break;
        };
        let tag = row_html[tag_start..tag_start + tag_end].to_string();
        let text_start = tag_start + tag_end + 1;
        let Some(close) = row_html[text_start..].find(close_tag) else {
            break;
        };
        out.push((tag, row_html[text_start..text_start + close].to_string()));
        search_from = text_start + close + close_tag.len();
    }
    out
}

/// Blocks starting with a tag prefix (e.g. `<table`) up to the closing tag,
/// inner content only.
fn extract_blocks<'a>(html: &'a str, open_prefix: &str, close: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut search_from = 0;
    while let Some(pos) = html[search_from..].find(open_prefix) {
        let tag_start = search_from + pos;
        let Some(tag_end) = html[tag_start..].find('>') else {
            break;
        };
        let inner_start = tag_start + tag_end + 1;
        let Some(end) = html[inner_start..].find(close) else {
            break;
        };
        out.push(&html[inner_start..inner_start + end]);
        search_from = inner_start + end + close.len();
    }
    out
}

fn attr_value(tag: &str, attr: &str) -> Option<String> {
    let marker = format!("{attr}=\"");
    let start = tag.find(&marker)? + marker.len();
    let end = tag[start..].find('"')?;
    Some(tag[start..start + end].to_string())
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn text_after_label(html: &str, label: &str) -> Option<String> {
    let start = html.find(label)? + label.len();
    let end = html[start..].find('<')?;
    let text = html[start..start + end].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
