use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use crate::odds::{Aggregation, MatchOdds, OddsQuote, OutcomeKind};
use crate::predictor::{ForecastBasis, ResultCode, ScoreTemplate, Scoreline};
use crate::strategy::{Confidence, StrategyRecommendation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: i64,
    pub season: String,
    pub round: Option<i64>,
    pub kickoff: String,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub finished: bool,
    pub cancelled: bool,
}

impl Fixture {
    /// Goals scored in a completed match; `None` until the result is in.
    pub fn total_goals(&self) -> Option<u32> {
        if !self.finished || self.cancelled {
            return None;
        }
        let (Some(home), Some(away)) = (self.home_goals, self.away_goals) else {
            return None;
        };
        u32::try_from(home + away).ok()
    }

    pub fn outcome(&self) -> Option<ResultCode> {
        self.total_goals()?;
        let home = u8::try_from(self.home_goals?).ok()?;
        let away = u8::try_from(self.away_goals?).ok()?;
        Some(ResultCode::from_goals(home, away))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub fixture_id: i64,
    pub player_id: i64,
    pub score: Scoreline,
    pub basis: ForecastBasis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredPrediction {
    pub fixture_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: String,
    pub round: Option<i64>,
    pub score: Scoreline,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunRecord {
    pub player_id: i64,
    pub season: String,
    pub template: String,
    pub made: usize,
    pub skipped: usize,
    pub defaulted: usize,
    pub errors: Vec<String>,
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS fixtures (
            fixture_id INTEGER PRIMARY KEY,
            season TEXT NOT NULL,
            round INTEGER NULL,
            kickoff_utc TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            finished INTEGER NOT NULL,
            cancelled INTEGER NOT NULL,
            outcome TEXT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fixtures_season ON fixtures(season);
        CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures(kickoff_utc);

        CREATE TABLE IF NOT EXISTS players (
            player_id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS odds_quotes (
            fixture_id INTEGER NOT NULL,
            outcome_kind TEXT NOT NULL,
            aggregation TEXT NOT NULL,
            decimal_odds REAL NULL CHECK (decimal_odds IS NULL OR decimal_odds > 0),
            bookmakers INTEGER NOT NULL,
            fetched_at TEXT NOT NULL,
            changed_at TEXT NOT NULL,
            PRIMARY KEY (fixture_id, outcome_kind, aggregation)
        );

        CREATE TABLE IF NOT EXISTS predictions (
            fixture_id INTEGER NOT NULL,
            player_id INTEGER NOT NULL,
            home_goals INTEGER NOT NULL CHECK (home_goals >= 0),
            away_goals INTEGER NOT NULL CHECK (away_goals >= 0),
            result_code TEXT NOT NULL CHECK (result_code IN ('H', 'D', 'A')),
            basis TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (fixture_id, player_id)
        );

        CREATE TABLE IF NOT EXISTS strategy_recommendations (
            season TEXT PRIMARY KEY,
            template TEXT NOT NULL,
            confidence TEXT NOT NULL,
            low_scoring_pct REAL NOT NULL,
            completed_fixtures INTEGER NOT NULL,
            historical_low_scoring_pct REAL NULL,
            rationale TEXT NOT NULL,
            computed_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS prediction_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            finished_at TEXT NOT NULL,
            player_id INTEGER NOT NULL,
            season TEXT NOT NULL,
            template TEXT NOT NULL,
            made INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            defaulted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Fixed-width UTC timestamp so stored times compare correctly as text.
pub fn utc_stamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Inserts or refreshes a fixture. `updated_at` only moves when the
/// schedule or teams change, so re-ingesting doesn't mark predictions stale.
pub fn upsert_fixture(conn: &Connection, f: &Fixture) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO fixtures (
            fixture_id, season, round, kickoff_utc, home_team, away_team,
            home_goals, away_goals, finished, cancelled, outcome, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(fixture_id) DO UPDATE SET
            updated_at = CASE
                WHEN fixtures.kickoff_utc IS NOT excluded.kickoff_utc
                  OR fixtures.home_team IS NOT excluded.home_team
                  OR fixtures.away_team IS NOT excluded.away_team
                THEN excluded.updated_at
                ELSE fixtures.updated_at
            END,
            season = excluded.season,
            round = excluded.round,
            kickoff_utc = excluded.kickoff_utc,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            finished = excluded.finished,
            cancelled = excluded.cancelled,
            outcome = excluded.outcome
        "#,
        params![
            f.id,
            f.season,
            f.round,
            f.kickoff,
            f.home_team,
            f.away_team,
            f.home_goals,
            f.away_goals,
            f.finished,
            f.cancelled,
            f.outcome().map(|c| c.to_string()),
            utc_stamp(Utc::now()),
        ],
    )
    .with_context(|| format!("upsert fixture {}", f.id))?;
    Ok(())
}

pub fn upsert_fixtures(conn: &mut Connection, fixtures: &[Fixture]) -> Result<usize> {
    let tx = conn.transaction().context("begin fixtures transaction")?;
    for f in fixtures {
        upsert_fixture(&tx, f)?;
    }
    tx.commit().context("commit fixtures transaction")?;
    Ok(fixtures.len())
}

pub fn upsert_player(conn: &Connection, player_id: i64, name: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO players(player_id, name, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(player_id) DO UPDATE SET name = excluded.name",
        params![player_id, name, utc_stamp(Utc::now())],
    )
    .context("upsert player")?;
    Ok(())
}

pub fn ensure_player(conn: &Connection, player_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO players(player_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![player_id, format!("player {player_id}"), utc_stamp(Utc::now())],
    )
    .context("ensure player")?;
    Ok(())
}

pub fn upsert_odds_quotes(conn: &mut Connection, quotes: &[OddsQuote]) -> Result<usize> {
    let now = utc_stamp(Utc::now());
    let tx = conn.transaction().context("begin odds transaction")?;
    for q in quotes {
        if let Some(v) = q.decimal
            && (!v.is_finite() || v <= 0.0)
        {
            return Err(anyhow!(
                "refusing non-positive odds {v} for fixture {}",
                q.fixture_id
            ));
        }
        tx.execute(
            r#"
            INSERT INTO odds_quotes (
                fixture_id, outcome_kind, aggregation, decimal_odds, bookmakers,
                fetched_at, changed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            ON CONFLICT(fixture_id, outcome_kind, aggregation) DO UPDATE SET
                changed_at = CASE
                    WHEN odds_quotes.decimal_odds IS NOT excluded.decimal_odds
                    THEN excluded.fetched_at
                    ELSE odds_quotes.changed_at
                END,
                decimal_odds = excluded.decimal_odds,
                bookmakers = excluded.bookmakers,
                fetched_at = excluded.fetched_at
            "#,
            params![
                q.fixture_id,
                q.kind.key(),
                q.aggregation.as_str(),
                q.decimal,
                q.bookmakers as i64,
                now,
            ],
        )
        .with_context(|| format!("upsert odds for fixture {}", q.fixture_id))?;
    }
    tx.commit().context("commit odds transaction")?;
    Ok(quotes.len())
}

pub fn load_odds_quotes(conn: &Connection, fixture_id: i64) -> Result<Vec<OddsQuote>> {
    let mut stmt = conn
        .prepare(
            "SELECT fixture_id, outcome_kind, aggregation, decimal_odds, bookmakers
             FROM odds_quotes WHERE fixture_id = ?1
             ORDER BY outcome_kind, aggregation",
        )
        .context("prepare load odds query")?;
    let rows = stmt
        .query_map(params![fixture_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })
        .context("query load odds")?;

    let mut out = Vec::new();
    for row in rows {
        let (fixture_id, kind, aggregation, decimal, bookmakers) =
            row.context("decode odds row")?;
        let kind = OutcomeKind::from_key(&kind)
            .ok_or_else(|| anyhow!("unknown outcome kind {kind:?} in store"))?;
        let aggregation = Aggregation::from_str_opt(&aggregation)
            .ok_or_else(|| anyhow!("unknown aggregation {aggregation:?} in store"))?;
        out.push(OddsQuote {
            fixture_id,
            kind,
            aggregation,
            decimal,
            bookmakers: usize::try_from(bookmakers).unwrap_or(0),
        });
    }
    Ok(out)
}

/// Home/away win prices for each fixture. Fixtures without a stored quote
/// come back with `None` prices rather than being dropped.
pub fn load_match_odds(
    conn: &Connection,
    fixtures: &[Fixture],
    aggregation: Aggregation,
) -> Result<Vec<MatchOdds>> {
    let mut stmt = conn
        .prepare(
            "SELECT decimal_odds FROM odds_quotes
             WHERE fixture_id = ?1 AND outcome_kind = ?2 AND aggregation = ?3",
        )
        .context("prepare match odds query")?;

    let mut out = Vec::with_capacity(fixtures.len());
    for f in fixtures {
        let mut price = |kind: OutcomeKind| -> Result<Option<f64>> {
            let v = stmt
                .query_row(params![f.id, kind.key(), aggregation.as_str()], |row| {
                    row.get::<_, Option<f64>>(0)
                })
                .optional()
                .with_context(|| format!("query odds for fixture {}", f.id))?;
            Ok(v.flatten())
        };
        let home_odds = price(OutcomeKind::HomeWin)?;
        let away_odds = price(OutcomeKind::AwayWin)?;
        out.push(MatchOdds {
            fixture_id: f.id,
            home_team: f.home_team.clone(),
            away_team: f.away_team.clone(),
            home_odds,
            away_odds,
        });
    }
    Ok(out)
}

const FIXTURE_COLUMNS: &str = "f.fixture_id, f.season, f.round, f.kickoff_utc, f.home_team, \
     f.away_team, f.home_goals, f.away_goals, f.finished, f.cancelled";

fn fixture_from_row(row: &Row<'_>) -> rusqlite::Result<Fixture> {
    Ok(Fixture {
        id: row.get(0)?,
        season: row.get(1)?,
        round: row.get(2)?,
        kickoff: row.get(3)?,
        home_team: row.get(4)?,
        away_team: row.get(5)?,
        home_goals: row.get(6)?,
        away_goals: row.get(7)?,
        finished: row.get(8)?,
        cancelled: row.get(9)?,
    })
}

/// Upcoming fixtures the player still has to predict: never predicted, or
/// the fixture or its odds changed after the last prediction.
pub fn load_due_fixtures(
    conn: &Connection,
    player_id: i64,
    season: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Fixture>> {
    let sql = format!(
        r#"
        SELECT {FIXTURE_COLUMNS}
        FROM fixtures f
        LEFT JOIN predictions p
               ON p.fixture_id = f.fixture_id AND p.player_id = ?1
        WHERE f.season = ?2
          AND f.finished = 0
          AND f.cancelled = 0
          AND f.kickoff_utc > ?3
          AND (
                p.fixture_id IS NULL
             OR p.updated_at < f.updated_at
             OR p.updated_at < (
                    SELECT MAX(q.changed_at) FROM odds_quotes q
                    WHERE q.fixture_id = f.fixture_id
                )
          )
        ORDER BY f.kickoff_utc ASC, f.fixture_id ASC
        "#
    );
    let mut stmt = conn.prepare(&sql).context("prepare due fixtures query")?;
    let rows = stmt
        .query_map(params![player_id, season, utc_stamp(now)], fixture_from_row)
        .context("query due fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode fixture row")?);
    }
    Ok(out)
}

pub fn load_season_fixtures(conn: &Connection, season: &str) -> Result<Vec<Fixture>> {
    let sql = format!(
        "SELECT {FIXTURE_COLUMNS} FROM fixtures f WHERE f.season = ?1
         ORDER BY f.kickoff_utc ASC, f.fixture_id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("prepare season fixtures query")?;
    let rows = stmt
        .query_map(params![season], fixture_from_row)
        .context("query season fixtures")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode fixture row")?);
    }
    Ok(out)
}

pub fn load_seasons(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT season FROM fixtures ORDER BY season ASC")
        .context("prepare seasons query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query seasons")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode season row")?);
    }
    Ok(out)
}

pub fn save_strategy(conn: &Connection, rec: &StrategyRecommendation) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO strategy_recommendations (
            season, template, confidence, low_scoring_pct, completed_fixtures,
            historical_low_scoring_pct, rationale, computed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(season) DO UPDATE SET
            template = excluded.template,
            confidence = excluded.confidence,
            low_scoring_pct = excluded.low_scoring_pct,
            completed_fixtures = excluded.completed_fixtures,
            historical_low_scoring_pct = excluded.historical_low_scoring_pct,
            rationale = excluded.rationale,
            computed_at = excluded.computed_at
        "#,
        params![
            rec.season,
            rec.template.to_string(),
            rec.confidence.as_str(),
            rec.low_scoring_pct,
            rec.completed_fixtures as i64,
            rec.historical_low_scoring_pct,
            rec.rationale,
            utc_stamp(Utc::now()),
        ],
    )
    .with_context(|| format!("save strategy for season {}", rec.season))?;
    Ok(())
}

pub fn load_active_strategy(
    conn: &Connection,
    season: &str,
) -> Result<Option<StrategyRecommendation>> {
    let row = conn
        .query_row(
            "SELECT season, template, confidence, low_scoring_pct, completed_fixtures,
                    historical_low_scoring_pct, rationale
             FROM strategy_recommendations WHERE season = ?1",
            params![season],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()
        .with_context(|| format!("load strategy for season {season}"))?;

    let Some((season, template, confidence, pct, completed, hist, rationale)) = row else {
        return Ok(None);
    };
    Ok(Some(StrategyRecommendation {
        season,
        template: template
            .parse::<ScoreTemplate>()
            .map_err(|err| anyhow!("stored template: {err}"))?,
        confidence: confidence
            .parse::<Confidence>()
            .map_err(|err| anyhow!("stored confidence: {err}"))?,
        low_scoring_pct: pct,
        completed_fixtures: usize::try_from(completed).unwrap_or(0),
        historical_low_scoring_pct: hist,
        rationale,
    }))
}

/// Writes every prediction and the run's record in one transaction; on any
/// failure nothing is kept. Returns the run id.
pub fn save_batch(
    conn: &mut Connection,
    predictions: &[Prediction],
    run: &RunRecord,
) -> Result<i64> {
    let now = utc_stamp(Utc::now());
    let tx = conn.transaction().context("begin predictions transaction")?;
    for p in predictions {
        tx.execute(
            r#"
            INSERT INTO predictions (
                fixture_id, player_id, home_goals, away_goals, result_code, basis, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(fixture_id, player_id) DO UPDATE SET
                home_goals = excluded.home_goals,
                away_goals = excluded.away_goals,
                result_code = excluded.result_code,
                basis = excluded.basis,
                updated_at = excluded.updated_at
            "#,
            params![
                p.fixture_id,
                p.player_id,
                p.score.home_goals(),
                p.score.away_goals(),
                p.score.result().to_string(),
                basis_key(p.basis),
                now,
            ],
        )
        .with_context(|| format!("upsert prediction for fixture {}", p.fixture_id))?;
    }
    let run_id = record_run(&tx, run)?;
    tx.commit().context("commit predictions transaction")?;
    Ok(run_id)
}

pub fn load_predictions(
    conn: &Connection,
    player_id: i64,
    season: &str,
) -> Result<Vec<StoredPrediction>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT p.fixture_id, f.home_team, f.away_team, f.kickoff_utc, f.round,
                   p.home_goals, p.away_goals, p.result_code, p.updated_at
            FROM predictions p
            JOIN fixtures f ON f.fixture_id = p.fixture_id
            WHERE p.player_id = ?1 AND f.season = ?2
            ORDER BY f.kickoff_utc ASC, p.fixture_id ASC
            "#,
        )
        .context("prepare load predictions query")?;
    let rows = stmt
        .query_map(params![player_id, season], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, u8>(5)?,
                row.get::<_, u8>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })
        .context("query load predictions")?;

    let mut out = Vec::new();
    for row in rows {
        let (fixture_id, home_team, away_team, kickoff, round, hg, ag, code, updated_at) =
            row.context("decode prediction row")?;
        let score = Scoreline::new(hg, ag);
        let stored = code.chars().next().and_then(ResultCode::from_char);
        if stored != Some(score.result()) {
            return Err(anyhow!(
                "prediction for fixture {fixture_id} stores result {code:?} but scoreline {hg}-{ag}"
            ));
        }
        out.push(StoredPrediction {
            fixture_id,
            home_team,
            away_team,
            kickoff,
            round,
            score,
            updated_at,
        });
    }
    Ok(out)
}

pub fn record_run(conn: &Connection, run: &RunRecord) -> Result<i64> {
    let errors_json = serde_json::to_string(&run.errors).unwrap_or_else(|_| "[]".to_string());
    conn.execute(
        "INSERT INTO prediction_runs(
             finished_at, player_id, season, template, made, skipped, defaulted, errors_json
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            utc_stamp(Utc::now()),
            run.player_id,
            run.season,
            run.template,
            run.made as i64,
            run.skipped as i64,
            run.defaulted as i64,
            errors_json,
        ],
    )
    .context("insert prediction run")?;
    Ok(conn.last_insert_rowid())
}

fn basis_key(basis: ForecastBasis) -> &'static str {
    match basis {
        ForecastBasis::HomeFavorite => "home_favorite",
        ForecastBasis::AwayFavorite => "away_favorite",
        ForecastBasis::TooClose => "too_close",
        ForecastBasis::MissingOdds => "missing_odds",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utc_stamp_is_fixed_width() {
        let a = DateTime::parse_from_rfc3339("2026-01-01T09:05:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(utc_stamp(a), "2026-01-01T09:05:00.000Z");
    }

    #[test]
    fn unfinished_fixture_has_no_total() {
        let f = Fixture {
            id: 1,
            season: "2025/2026".to_string(),
            round: Some(1),
            kickoff: "2025-08-16T14:00:00.000Z".to_string(),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            home_goals: Some(2),
            away_goals: Some(0),
            finished: false,
            cancelled: false,
        };
        assert_eq!(f.total_goals(), None);
        assert_eq!(f.outcome(), None);
        let done = Fixture {
            finished: true,
            ..f
        };
        assert_eq!(done.total_goals(), Some(2));
        assert_eq!(done.outcome(), Some(ResultCode::Home));
    }
}
