use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::PredictError;
use crate::odds::MatchOdds;
use crate::predictor::{ForecastBasis, ScoreTemplate, Scoreline, predict};
use crate::store::{self, Prediction, RunRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPrediction {
    pub fixture_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub score: Scoreline,
    pub basis: ForecastBasis,
}

impl PlannedPrediction {
    pub fn defaulted(&self) -> bool {
        self.basis == ForecastBasis::MissingOdds
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFixture {
    pub fixture_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub error: PredictError,
}

impl SkippedFixture {
    pub fn message(&self) -> String {
        format!(
            "fixture {} ({} v {}) skipped: {}",
            self.fixture_id, self.home_team, self.away_team, self.error
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub made: usize,
    pub skipped: usize,
    pub defaulted: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    pub planned: Vec<PlannedPrediction>,
    pub skipped: Vec<SkippedFixture>,
}

impl BatchPlan {
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            made: self.planned.len(),
            skipped: self.skipped.len(),
            defaulted: self.planned.iter().filter(|p| p.defaulted()).count(),
        }
    }
}

/// Runs the predictor over every fixture. Bad odds skip that fixture only.
pub fn plan_batch(inputs: &[MatchOdds], template: ScoreTemplate, margin: f64) -> BatchPlan {
    let mut plan = BatchPlan::default();
    for input in inputs {
        match predict(input.home_odds, input.away_odds, template, margin) {
            Ok(forecast) => {
                debug!(
                    fixture_id = input.fixture_id,
                    home = ?input.home_odds,
                    away = ?input.away_odds,
                    basis = ?forecast.basis,
                    "forecast"
                );
                plan.planned.push(PlannedPrediction {
                    fixture_id: input.fixture_id,
                    home_team: input.home_team.clone(),
                    away_team: input.away_team.clone(),
                    score: forecast.score,
                    basis: forecast.basis,
                });
            }
            Err(error) => {
                let skipped = SkippedFixture {
                    fixture_id: input.fixture_id,
                    home_team: input.home_team.clone(),
                    away_team: input.away_team.clone(),
                    error,
                };
                warn!("{}", skipped.message());
                plan.skipped.push(skipped);
            }
        }
    }
    plan
}

/// Plans the batch and writes all predictions plus the run record in one
/// transaction. A store failure aborts the run and leaves nothing written.
pub fn run_batch(
    conn: &mut Connection,
    player_id: i64,
    season: &str,
    template: ScoreTemplate,
    margin: f64,
    inputs: &[MatchOdds],
) -> Result<BatchPlan, PredictError> {
    let plan = plan_batch(inputs, template, margin);
    let rows: Vec<Prediction> = plan
        .planned
        .iter()
        .map(|p| Prediction {
            fixture_id: p.fixture_id,
            player_id,
            score: p.score,
            basis: p.basis,
        })
        .collect();

    let summary = plan.summary();
    let run = RunRecord {
        player_id,
        season: season.to_string(),
        template: template.to_string(),
        made: summary.made,
        skipped: summary.skipped,
        defaulted: summary.defaulted,
        errors: plan.skipped.iter().map(SkippedFixture::message).collect(),
    };
    let run_id = store::save_batch(conn, &rows, &run).map_err(PredictError::store)?;

    info!(
        run_id,
        player_id,
        template = %template,
        made = summary.made,
        skipped = summary.skipped,
        defaulted = summary.defaulted,
        "prediction batch written"
    );
    Ok(plan)
}
