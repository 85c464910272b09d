use std::collections::{BTreeMap, HashSet};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::USER_AGENT;
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::OddsConfig;
use crate::error::PredictError;
use crate::http_client::http_client;
use crate::store::{self, Fixture};
use crate::team_names::{aliases_intersect, canonical_team_name, is_draw_label, team_aliases};

const ODDS_API_URL: &str = "https://api.the-odds-api.com/v4/sports";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutcomeKind {
    HomeWin,
    Draw,
    AwayWin,
    Over(f64),
    Under(f64),
}

impl OutcomeKind {
    pub fn key(&self) -> String {
        match self {
            OutcomeKind::HomeWin => "home".to_string(),
            OutcomeKind::Draw => "draw".to_string(),
            OutcomeKind::AwayWin => "away".to_string(),
            OutcomeKind::Over(line) => format!("over_{line}"),
            OutcomeKind::Under(line) => format!("under_{line}"),
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        match raw {
            "home" => return Some(OutcomeKind::HomeWin),
            "draw" => return Some(OutcomeKind::Draw),
            "away" => return Some(OutcomeKind::AwayWin),
            _ => {}
        }
        if let Some(line) = raw.strip_prefix("over_") {
            return line.parse::<f64>().ok().map(OutcomeKind::Over);
        }
        if let Some(line) = raw.strip_prefix("under_") {
            return line.parse::<f64>().ok().map(OutcomeKind::Under);
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Median,
}

impl Aggregation {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
        }
    }

    pub fn from_str_opt(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mean" => Some(Aggregation::Mean),
            "median" => Some(Aggregation::Median),
            _ => None,
        }
    }

    pub fn apply(self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregation::Mean => mean_f64(values),
            Aggregation::Median => median_f64(values),
        }
    }
}

/// Aggregated market price for one outcome of one fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuote {
    pub fixture_id: i64,
    pub kind: OutcomeKind,
    pub aggregation: Aggregation,
    /// `None` when no bookmaker priced this outcome.
    pub decimal: Option<f64>,
    pub bookmakers: usize,
}

/// What the predictor consumes for one fixture.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOdds {
    pub fixture_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub home_odds: Option<f64>,
    pub away_odds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsEvent {
    #[serde(default)]
    pub id: String,
    pub commence_time: Option<String>,
    pub home_team: String,
    pub away_team: String,
    #[serde(default)]
    pub bookmakers: Vec<OddsBookmaker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsBookmaker {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub markets: Vec<OddsMarket>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsMarket {
    pub key: String,
    #[serde(default)]
    pub outcomes: Vec<OddsOutcome>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OddsOutcome {
    pub name: String,
    pub price: f64,
    pub point: Option<f64>,
}

/// Per-bookmaker prices collected for one event, before aggregation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPrices {
    pub home: Vec<f64>,
    pub draw: Vec<f64>,
    pub away: Vec<f64>,
    /// Keyed by the goal line formatted as text so lines sort stably.
    pub totals: BTreeMap<String, (Vec<f64>, Vec<f64>)>,
}

#[derive(Debug, Clone, Default)]
pub struct OddsIngestSummary {
    pub events: usize,
    pub matched: usize,
    pub quotes: usize,
    pub unmatched: Vec<String>,
}

pub fn parse_odds_events_json(raw: &str) -> Result<Vec<OddsEvent>> {
    let trimmed = raw.trim();
    if trimmed == "null" || trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).context("invalid odds json")
}

pub fn fetch_odds_events(cfg: &OddsConfig) -> Result<Vec<OddsEvent>> {
    let Some(api_key) = cfg.api_key.as_ref() else {
        return Err(PredictError::DataUnavailable("ODDS_API_KEY missing".to_string()).into());
    };

    let url = format!("{ODDS_API_URL}/{}/odds", cfg.sport);
    let client = http_client()?;
    let resp = client
        .get(&url)
        .query(&[
            ("apiKey", api_key.as_str()),
            ("regions", cfg.regions.as_str()),
            ("markets", "h2h,totals"),
            ("oddsFormat", "decimal"),
            ("dateFormat", "iso"),
        ])
        .header(USER_AGENT, "footy-predict/0.1")
        .send()
        .context("odds request failed")?;
    let status = resp.status();
    let body = resp.text().context("failed reading odds body")?;
    if !status.is_success() {
        let snippet = body
            .trim()
            .replace(['\n', '\r'], " ")
            .chars()
            .take(220)
            .collect::<String>();
        return Err(anyhow::anyhow!("odds http {}: {}", status, snippet));
    }
    parse_odds_events_json(&body)
}

pub fn collect_event_prices(event: &OddsEvent) -> EventPrices {
    let home_name = canonical_team_name(&event.home_team);
    let away_name = canonical_team_name(&event.away_team);
    let mut out = EventPrices::default();

    for bookmaker in &event.bookmakers {
        for market in &bookmaker.markets {
            if market.key.eq_ignore_ascii_case("h2h") {
                let Some((home, draw, away)) =
                    extract_hda_prices(&market.outcomes, &home_name, &away_name)
                else {
                    debug!(bookmaker = %bookmaker.key, event = %event.id, "incomplete h2h market");
                    continue;
                };
                out.home.push(home);
                out.draw.push(draw);
                out.away.push(away);
            } else if market.key.eq_ignore_ascii_case("totals") {
                for outcome in &market.outcomes {
                    let Some(point) = outcome.point else {
                        continue;
                    };
                    if !usable_price(outcome.price) {
                        continue;
                    }
                    let entry = out.totals.entry(format!("{point}")).or_default();
                    if outcome.name.eq_ignore_ascii_case("over") {
                        entry.0.push(outcome.price);
                    } else if outcome.name.eq_ignore_ascii_case("under") {
                        entry.1.push(outcome.price);
                    }
                }
            }
        }
    }
    out
}

pub fn quotes_for_event(
    fixture_id: i64,
    prices: &EventPrices,
    aggregation: Aggregation,
) -> Vec<OddsQuote> {
    let quote = |kind: OutcomeKind, values: &[f64]| OddsQuote {
        fixture_id,
        kind,
        aggregation,
        decimal: aggregation.apply(values),
        bookmakers: values.len(),
    };

    let mut out = vec![
        quote(OutcomeKind::HomeWin, prices.home.as_slice()),
        quote(OutcomeKind::Draw, prices.draw.as_slice()),
        quote(OutcomeKind::AwayWin, prices.away.as_slice()),
    ];
    for (line, (over, under)) in &prices.totals {
        let Ok(point) = line.parse::<f64>() else {
            continue;
        };
        if !over.is_empty() {
            out.push(quote(OutcomeKind::Over(point), over.as_slice()));
        }
        if !under.is_empty() {
            out.push(quote(OutcomeKind::Under(point), under.as_slice()));
        }
    }
    out
}

/// Pairs each fixture with at most one odds event. Exact canonical names win
/// over alias overlap; kickoff distance breaks ties.
struct EventKey {
    kickoff: Option<DateTime<Utc>>,
    home: String,
    away: String,
    home_aliases: HashSet<String>,
    away_aliases: HashSet<String>,
}

impl EventKey {
    fn new(home: &str, away: &str, kickoff: Option<DateTime<Utc>>) -> Self {
        Self {
            kickoff,
            home: canonical_team_name(home),
            away: canonical_team_name(away),
            home_aliases: team_aliases(home),
            away_aliases: team_aliases(away),
        }
    }

    /// Lower is better. `None` when the teams don't line up or kickoffs are
    /// further apart than `tolerance_secs`. Alias-only pairings always rank
    /// behind exact name pairings.
    fn match_cost(&self, other: &EventKey, tolerance_secs: i64) -> Option<i64> {
        let exact = self.home.eq_ignore_ascii_case(&other.home)
            && self.away.eq_ignore_ascii_case(&other.away);
        let aliased = aliases_intersect(&self.home_aliases, &other.home_aliases)
            && aliases_intersect(&self.away_aliases, &other.away_aliases);
        if !exact && !aliased {
            return None;
        }
        let drift = match (self.kickoff, other.kickoff) {
            (Some(a), Some(b)) => {
                let secs = (a - b).num_seconds().abs();
                (secs <= tolerance_secs).then_some(secs)?
            }
            _ => tolerance_secs / 2,
        };
        Some(if exact { drift } else { drift + tolerance_secs })
    }
}

/// Pairs each fixture with at most one odds event, and each event with at
/// most one fixture. Fixtures are served in order.
pub fn match_events_to_fixtures<'a>(
    fixtures: &[Fixture],
    events: &'a [OddsEvent],
    time_tolerance_secs: i64,
) -> Vec<(i64, &'a OddsEvent)> {
    let keys: Vec<EventKey> = events
        .iter()
        .map(|e| {
            let kickoff = e.commence_time.as_deref().and_then(parse_kickoff);
            EventKey::new(&e.home_team, &e.away_team, kickoff)
        })
        .collect();
    let mut taken = vec![false; keys.len()];

    fixtures
        .iter()
        .filter_map(|fixture| {
            let wanted = EventKey::new(
                &fixture.home_team,
                &fixture.away_team,
                parse_kickoff(&fixture.kickoff),
            );
            let (idx, _) = keys
                .iter()
                .enumerate()
                .filter(|(idx, _)| !taken[*idx])
                .filter_map(|(idx, key)| {
                    wanted
                        .match_cost(key, time_tolerance_secs)
                        .map(|cost| (idx, cost))
                })
                .min_by_key(|&(_, cost)| cost)?;
            taken[idx] = true;
            Some((fixture.id, &events[idx]))
        })
        .collect()
}

/// Fetches current odds, pairs them with the given fixtures and stores the
/// aggregated quotes.
pub fn ingest_odds(
    conn: &mut Connection,
    fixtures: &[Fixture],
    cfg: &OddsConfig,
) -> Result<OddsIngestSummary> {
    let events = fetch_odds_events(cfg)?;
    let pairs = match_events_to_fixtures(fixtures, &events, cfg.time_tolerance_secs);

    let mut quotes = Vec::new();
    for (fixture_id, event) in &pairs {
        let prices = collect_event_prices(event);
        if prices.home.is_empty() || prices.away.is_empty() {
            warn!(fixture_id, event = %event.id, "no usable h2h prices");
        }
        // Both aggregations are stored so the predictor can switch without a refetch.
        quotes.extend(quotes_for_event(*fixture_id, &prices, Aggregation::Mean));
        quotes.extend(quotes_for_event(*fixture_id, &prices, Aggregation::Median));
    }
    let stored = store::upsert_odds_quotes(conn, &quotes)?;

    let matched_ids: HashSet<i64> = pairs.iter().map(|(id, _)| *id).collect();
    let unmatched = fixtures
        .iter()
        .filter(|f| !matched_ids.contains(&f.id))
        .map(|f| format!("{} v {}", f.home_team, f.away_team))
        .collect::<Vec<_>>();

    info!(
        events = events.len(),
        matched = pairs.len(),
        quotes = stored,
        aggregation = cfg.aggregation.as_str(),
        "odds ingest finished"
    );
    Ok(OddsIngestSummary {
        events: events.len(),
        matched: pairs.len(),
        quotes: stored,
        unmatched,
    })
}

fn extract_hda_prices(
    outcomes: &[OddsOutcome],
    home_team: &str,
    away_team: &str,
) -> Option<(f64, f64, f64)> {
    let home_aliases = team_aliases(home_team);
    let away_aliases = team_aliases(away_team);

    let mut home: Option<f64> = None;
    let mut draw: Option<f64> = None;
    let mut away: Option<f64> = None;

    for outcome in outcomes {
        if !usable_price(outcome.price) {
            continue;
        }
        let name = outcome.name.trim();
        if is_draw_label(name) {
            draw = Some(outcome.price);
            continue;
        }
        let canonical = canonical_team_name(name);
        if canonical.eq_ignore_ascii_case(home_team) {
            home = Some(outcome.price);
            continue;
        }
        if canonical.eq_ignore_ascii_case(away_team) {
            away = Some(outcome.price);
            continue;
        }
        let aliases = team_aliases(name);
        if home.is_none() && aliases_intersect(&aliases, &home_aliases) {
            home = Some(outcome.price);
        } else if away.is_none() && aliases_intersect(&aliases, &away_aliases) {
            away = Some(outcome.price);
        }
    }

    match (home, draw, away) {
        (Some(home), Some(draw), Some(away)) => Some((home, draw, away)),
        _ => None,
    }
}

// A decimal price at or below 1.0 pays nothing back; bookmakers never offer one.
fn usable_price(price: f64) -> bool {
    price.is_finite() && price > 1.0
}

fn mean_f64(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median_f64(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    let upper = *sorted.get(mid)?;
    if sorted.len() % 2 == 1 {
        return Some(upper);
    }
    Some((sorted[mid - 1] + upper) / 2.0)
}

const NAIVE_KICKOFF_FORMATS: [&str; 3] =
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Kickoff time from RFC 3339, or from a naive timestamp read as UTC.
pub fn parse_kickoff(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_KICKOFF_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
