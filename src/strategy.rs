use std::fmt;
use std::str::FromStr;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::PredictError;
use crate::predictor::ScoreTemplate;
use crate::store::{self, Fixture};

/// Share of low-scoring matches (in percent) above which favorites are
/// predicted to win narrowly. Empirically chosen; tunable through
/// `PREDICT_LOW_SCORING_PCT`.
pub const LOW_SCORING_THRESHOLD_PCT: f64 = 47.0;

/// A match with at most this many total goals counts as low-scoring.
pub const LOW_SCORING_MAX_GOALS: u32 = 2;

const HIGH_CONFIDENCE_MIN: usize = 80;
const MODERATE_CONFIDENCE_MIN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Moderate,
    Early,
}

impl Confidence {
    pub fn from_sample(completed: usize) -> Self {
        if completed > HIGH_CONFIDENCE_MIN {
            Confidence::High
        } else if completed > MODERATE_CONFIDENCE_MIN {
            Confidence::Moderate
        } else {
            Confidence::Early
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Moderate => "moderate",
            Confidence::Early => "early",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = PredictError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Confidence::High),
            "moderate" => Ok(Confidence::Moderate),
            "early" => Ok(Confidence::Early),
            other => Err(PredictError::InvalidInput(format!(
                "unknown confidence level {other:?}"
            ))),
        }
    }
}

/// Goal-scoring summary of one season's completed fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonStats {
    pub season: String,
    pub completed: usize,
    pub low_scoring: usize,
    pub total_goals: u32,
}

impl SeasonStats {
    pub fn from_fixtures(season: &str, fixtures: &[Fixture]) -> Self {
        let mut stats = SeasonStats {
            season: season.to_string(),
            completed: 0,
            low_scoring: 0,
            total_goals: 0,
        };
        for fixture in fixtures.iter().filter(|f| f.season == season) {
            let Some(goals) = fixture.total_goals() else {
                continue;
            };
            stats.completed += 1;
            stats.total_goals += goals;
            if goals <= LOW_SCORING_MAX_GOALS {
                stats.low_scoring += 1;
            }
        }
        stats
    }

    pub fn low_scoring_pct(&self) -> Option<f64> {
        if self.completed == 0 {
            return None;
        }
        Some(self.low_scoring as f64 * 100.0 / self.completed as f64)
    }

    pub fn goals_per_match(&self) -> Option<f64> {
        if self.completed == 0 {
            return None;
        }
        Some(self.total_goals as f64 / self.completed as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecommendation {
    pub season: String,
    pub template: ScoreTemplate,
    pub confidence: Confidence,
    pub low_scoring_pct: f64,
    pub completed_fixtures: usize,
    pub historical_low_scoring_pct: Option<f64>,
    pub rationale: String,
}

pub fn template_for_low_scoring_pct(pct: f64, threshold: f64) -> ScoreTemplate {
    if pct > threshold {
        ScoreTemplate::NARROW
    } else {
        ScoreTemplate::CONVINCING
    }
}

/// Picks this season's favorite template from its share of low-scoring
/// matches. Earlier seasons only inform the rationale.
pub fn select_strategy(
    season: &str,
    historical_patterns: &[SeasonStats],
    current_season_stats: &SeasonStats,
    threshold: f64,
) -> Result<StrategyRecommendation, PredictError> {
    let Some(low_scoring_pct) = current_season_stats.low_scoring_pct() else {
        return Err(PredictError::InsufficientData {
            season: season.to_string(),
            reason: "no completed fixtures".to_string(),
        });
    };

    let template = template_for_low_scoring_pct(low_scoring_pct, threshold);
    let confidence = Confidence::from_sample(current_season_stats.completed);
    let historical_low_scoring_pct = historical_average(season, historical_patterns);

    let mut rationale = format!(
        "{:.1}% of {} completed matches had {} or fewer goals ({} the {:.1}% threshold)",
        low_scoring_pct,
        current_season_stats.completed,
        LOW_SCORING_MAX_GOALS,
        if low_scoring_pct > threshold {
            "above"
        } else {
            "at or below"
        },
        threshold,
    );
    if let Some(gpm) = current_season_stats.goals_per_match() {
        rationale.push_str(&format!("; {gpm:.2} goals per match"));
    }
    if let Some(hist) = historical_low_scoring_pct {
        rationale.push_str(&format!("; earlier seasons averaged {hist:.1}%"));
    }

    Ok(StrategyRecommendation {
        season: season.to_string(),
        template,
        confidence,
        low_scoring_pct,
        completed_fixtures: current_season_stats.completed,
        historical_low_scoring_pct,
        rationale,
    })
}

fn historical_average(season: &str, patterns: &[SeasonStats]) -> Option<f64> {
    let pcts: Vec<f64> = patterns
        .iter()
        .filter(|s| s.season != season)
        .filter_map(SeasonStats::low_scoring_pct)
        .collect();
    if pcts.is_empty() {
        return None;
    }
    Some(pcts.iter().sum::<f64>() / pcts.len() as f64)
}

/// Builds the recommendation for `season` from whatever the store holds,
/// using every other stored season as the historical pattern.
pub fn recommend_from_store(
    conn: &Connection,
    season: &str,
    threshold: f64,
) -> Result<StrategyRecommendation, PredictError> {
    let seasons = store::load_seasons(conn).map_err(PredictError::store)?;
    let mut historical = Vec::new();
    let mut current = SeasonStats::from_fixtures(season, &[]);
    for label in &seasons {
        let fixtures = store::load_season_fixtures(conn, label).map_err(PredictError::store)?;
        let stats = SeasonStats::from_fixtures(label, &fixtures);
        if label == season {
            current = stats;
        } else if label.as_str() < season {
            historical.push(stats);
        }
    }
    select_strategy(season, &historical, &current, threshold)
}

/// "2025/2026" -> "2024/2025".
pub fn previous_season(label: &str) -> Option<String> {
    let (start, end) = label.trim().split_once('/')?;
    let start = start.parse::<i32>().ok()?;
    let end = end.parse::<i32>().ok()?;
    Some(format!("{}/{}", start - 1, end - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(season: &str, completed: usize, low_scoring: usize) -> SeasonStats {
        SeasonStats {
            season: season.to_string(),
            completed,
            low_scoring,
            total_goals: 0,
        }
    }

    #[test]
    fn confidence_tiers_use_strict_bounds() {
        assert_eq!(Confidence::from_sample(81), Confidence::High);
        assert_eq!(Confidence::from_sample(80), Confidence::Moderate);
        assert_eq!(Confidence::from_sample(41), Confidence::Moderate);
        assert_eq!(Confidence::from_sample(40), Confidence::Early);
        assert_eq!(Confidence::from_sample(1), Confidence::Early);
    }

    #[test]
    fn threshold_itself_is_not_low_scoring() {
        assert_eq!(
            template_for_low_scoring_pct(47.0, LOW_SCORING_THRESHOLD_PCT),
            ScoreTemplate::CONVINCING
        );
        assert_eq!(
            template_for_low_scoring_pct(47.01, LOW_SCORING_THRESHOLD_PCT),
            ScoreTemplate::NARROW
        );
    }

    #[test]
    fn previous_season_steps_back_one_year() {
        assert_eq!(previous_season("2025/2026").as_deref(), Some("2024/2025"));
        assert_eq!(previous_season("2025"), None);
    }

    #[test]
    fn historical_average_skips_current_and_empty_seasons() {
        let hist = vec![
            stats("2023/2024", 380, 190),
            stats("2024/2025", 380, 152),
            stats("2025/2026", 10, 10),
            stats("2022/2023", 0, 0),
        ];
        let avg = historical_average("2025/2026", &hist).unwrap();
        assert!((avg - 45.0).abs() < 1e-9);
        assert_eq!(historical_average("2025/2026", &[]), None);
    }
}
