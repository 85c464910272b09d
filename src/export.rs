use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::store::StoredPrediction;
use crate::strategy::StrategyRecommendation;

pub struct ExportReport {
    pub predictions: usize,
    pub has_strategy: bool,
}

/// Writes a player's season predictions, plus the strategy in force, to an
/// xlsx workbook.
pub fn export_predictions(
    path: &Path,
    predictions: &[StoredPrediction],
    strategy: Option<&StrategyRecommendation>,
) -> Result<ExportReport> {
    let mut prediction_rows = vec![vec![
        "Fixture ID".to_string(),
        "Round".to_string(),
        "Kickoff (UTC)".to_string(),
        "Home".to_string(),
        "Home Goals".to_string(),
        "Away Goals".to_string(),
        "Away".to_string(),
        "Result".to_string(),
        "Updated".to_string(),
    ]];
    prediction_rows.extend(predictions.iter().map(prediction_row));

    let mut strategy_rows = vec![vec![
        "Season".to_string(),
        "Template".to_string(),
        "Confidence".to_string(),
        "Low-scoring %".to_string(),
        "Completed".to_string(),
        "Historical %".to_string(),
        "Rationale".to_string(),
    ]];
    if let Some(rec) = strategy {
        strategy_rows.push(strategy_row(rec));
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Predictions").context("name predictions sheet")?;
        write_rows(sheet, &prediction_rows)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Strategy").context("name strategy sheet")?;
        write_rows(sheet, &strategy_rows)?;
    }
    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        predictions: predictions.len(),
        has_strategy: strategy.is_some(),
    })
}

fn prediction_row(p: &StoredPrediction) -> Vec<String> {
    vec![
        p.fixture_id.to_string(),
        opt_to_string(p.round),
        p.kickoff.clone(),
        p.home_team.clone(),
        p.score.home_goals().to_string(),
        p.score.away_goals().to_string(),
        p.away_team.clone(),
        p.score.result().to_string(),
        p.updated_at.clone(),
    ]
}

fn strategy_row(rec: &StrategyRecommendation) -> Vec<String> {
    vec![
        rec.season.clone(),
        rec.template.to_string(),
        rec.confidence.to_string(),
        format!("{:.1}", rec.low_scoring_pct),
        rec.completed_fixtures.to_string(),
        rec.historical_low_scoring_pct
            .map(|v| format!("{v:.1}"))
            .unwrap_or_default(),
        rec.rationale.clone(),
    ]
}

fn opt_to_string<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
