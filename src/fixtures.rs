use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde_json::Value;
use tracing::info;

use crate::http_client::http_client;
use crate::store::{self, Fixture, utc_stamp};
use crate::team_names::canonical_team_name;

const FOTMOB_LEAGUE_URL: &str = "https://www.fotmob.com/api/leagues";
pub const PREMIER_LEAGUE_ID: u32 = 47;

#[derive(Debug, Clone)]
pub struct LeagueSeason {
    pub season: String,
    pub fixtures: Vec<Fixture>,
}

#[derive(Debug, Clone)]
pub struct FixturesIngestSummary {
    pub league_id: u32,
    pub season: String,
    pub fixtures_upserted: usize,
    pub completed: usize,
    pub skipped_rows: usize,
}

/// Pulls one league season from FotMob and upserts its fixtures.
/// With no `season` the league's currently selected season is used.
pub fn ingest_league_season(
    conn: &mut Connection,
    league_id: u32,
    season: Option<&str>,
) -> Result<FixturesIngestSummary> {
    let raw = fetch_league_payload(league_id, season)?;
    let (parsed, skipped_rows) = parse_league_fixtures_json(&raw, season)?;
    let upserted = store::upsert_fixtures(conn, &parsed.fixtures)?;
    let completed = parsed
        .fixtures
        .iter()
        .filter(|f| f.total_goals().is_some())
        .count();

    info!(
        league_id,
        season = %parsed.season,
        upserted,
        completed,
        skipped_rows,
        "fixtures ingest finished"
    );
    Ok(FixturesIngestSummary {
        league_id,
        season: parsed.season,
        fixtures_upserted: upserted,
        completed,
        skipped_rows,
    })
}

/// Parses a FotMob league payload. Returns the season and its fixtures plus
/// the number of rows that could not be read.
pub fn parse_league_fixtures_json(
    raw: &str,
    season_hint: Option<&str>,
) -> Result<(LeagueSeason, usize)> {
    let value: Value = serde_json::from_str(raw.trim()).context("invalid league fixtures json")?;
    let season = season_hint
        .map(|s| s.to_string())
        .or_else(|| {
            value
                .get("details")
                .and_then(|d| d.get("selectedSeason"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        })
        .ok_or_else(|| anyhow!("league payload names no season"))?;

    let matches = value
        .get("fixtures")
        .and_then(|v| v.get("allMatches"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("missing fixtures.allMatches for season {season}"))?;

    let mut fixtures = Vec::with_capacity(matches.len());
    let mut skipped = 0usize;
    for m in matches {
        match parse_fixture(m, &season) {
            Some(f) => fixtures.push(f),
            None => skipped += 1,
        }
    }
    Ok((LeagueSeason { season, fixtures }, skipped))
}

fn fetch_league_payload(league_id: u32, season: Option<&str>) -> Result<String> {
    let mut url =
        format!("{FOTMOB_LEAGUE_URL}?id={league_id}&tab=fixtures&type=league&timeZone=UTC");
    if let Some(season) = season {
        url.push_str("&season=");
        url.push_str(&season.replace('/', "%2F"));
    }
    let client = http_client()?;
    let resp = client.get(&url).send().context("league fixtures request failed")?;
    let status = resp.status();
    let body = resp.text().context("failed reading league fixtures body")?;
    if !status.is_success() {
        return Err(anyhow!("league fixtures http {status}"));
    }
    Ok(body)
}

fn parse_fixture(v: &Value, season: &str) -> Option<Fixture> {
    let id = as_i64_any(v.get("id")?)?;
    let round = v
        .get("round")
        .and_then(as_i64_any)
        .or_else(|| v.get("roundName").and_then(as_i64_any));
    let status = v.get("status")?;
    let kickoff = normalize_kickoff(status.get("utcTime")?.as_str()?)?;

    let home = v.get("home")?;
    let away = v.get("away")?;
    let home_team = team_name(home)?;
    let away_team = team_name(away)?;

    let flag = |key: &str| status.get(key).and_then(|x| x.as_bool()).unwrap_or(false);
    let finished = flag("finished");
    let cancelled = flag("cancelled");

    let mut home_goals = home.get("score").and_then(as_i32_any);
    let mut away_goals = away.get("score").and_then(as_i32_any);
    if (home_goals.is_none() || away_goals.is_none())
        && let Some((h, a)) = status
            .get("scoreStr")
            .and_then(|x| x.as_str())
            .and_then(parse_score_pair)
    {
        home_goals = Some(h);
        away_goals = Some(a);
    }

    Some(Fixture {
        id,
        season: season.to_string(),
        round,
        kickoff,
        home_team,
        away_team,
        home_goals,
        away_goals,
        finished,
        cancelled,
    })
}

fn team_name(side: &Value) -> Option<String> {
    let raw = side
        .get("longName")
        .and_then(|x| x.as_str())
        .or_else(|| side.get("name").and_then(|x| x.as_str()))?;
    let name = canonical_team_name(raw);
    if name.is_empty() { None } else { Some(name) }
}

fn normalize_kickoff(raw: &str) -> Option<String> {
    let dt = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    Some(utc_stamp(dt.with_timezone(&Utc)))
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn as_i32_any(v: &Value) -> Option<i32> {
    i32::try_from(as_i64_any(v)?).ok()
}

fn parse_score_pair(raw: &str) -> Option<(i32, i32)> {
    let mut nums = raw
        .split(|ch: char| !ch.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i32>().ok());
    let home = nums.next()?;
    let away = nums.next()?;
    Some((home, away))
}
