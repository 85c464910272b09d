use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PredictError;

/// Odds closer than this (in decimal odds) count as "no clear favorite".
/// Empirically chosen; tunable through `PREDICT_DRAW_MARGIN`.
pub const DRAW_MARGIN: f64 = 0.06;

/// Scoreline used whenever the market can't separate the sides.
pub const NEUTRAL_DRAW: (u8, u8) = (1, 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultCode {
    #[serde(rename = "H")]
    Home,
    #[serde(rename = "D")]
    Draw,
    #[serde(rename = "A")]
    Away,
}

impl ResultCode {
    pub fn from_goals(home: u8, away: u8) -> Self {
        if home > away {
            ResultCode::Home
        } else if home < away {
            ResultCode::Away
        } else {
            ResultCode::Draw
        }
    }

    pub fn as_char(self) -> char {
        match self {
            ResultCode::Home => 'H',
            ResultCode::Draw => 'D',
            ResultCode::Away => 'A',
        }
    }

    pub fn from_char(ch: char) -> Option<Self> {
        match ch.to_ascii_uppercase() {
            'H' => Some(ResultCode::Home),
            'D' => Some(ResultCode::Draw),
            'A' => Some(ResultCode::Away),
            _ => None,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Scoreline applied to whichever side the market favors, e.g. `1-0` or `2-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScoreTemplate {
    favorite: u8,
    underdog: u8,
}

impl ScoreTemplate {
    pub const NARROW: ScoreTemplate = ScoreTemplate {
        favorite: 1,
        underdog: 0,
    };
    pub const CONVINCING: ScoreTemplate = ScoreTemplate {
        favorite: 2,
        underdog: 1,
    };

    pub fn new(favorite: u8, underdog: u8) -> Result<Self, PredictError> {
        if favorite < underdog {
            return Err(PredictError::InvalidInput(format!(
                "template {favorite}-{underdog} has the favorite scoring fewer goals"
            )));
        }
        Ok(Self { favorite, underdog })
    }

    pub fn favorite(&self) -> u8 {
        self.favorite
    }

    pub fn underdog(&self) -> u8 {
        self.underdog
    }
}

impl fmt::Display for ScoreTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.favorite, self.underdog)
    }
}

impl FromStr for ScoreTemplate {
    type Err = PredictError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || PredictError::InvalidInput(format!("unparseable template {raw:?}"));
        let (fav, dog) = raw.trim().split_once(['-', ':']).ok_or_else(invalid)?;
        let favorite = fav.trim().parse::<u8>().map_err(|_| invalid())?;
        let underdog = dog.trim().parse::<u8>().map_err(|_| invalid())?;
        ScoreTemplate::new(favorite, underdog)
    }
}

impl TryFrom<String> for ScoreTemplate {
    type Error = PredictError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<ScoreTemplate> for String {
    fn from(template: ScoreTemplate) -> Self {
        template.to_string()
    }
}

/// A predicted scoreline. The result code is always derived from the goals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreline {
    home_goals: u8,
    away_goals: u8,
    result: ResultCode,
}

impl Scoreline {
    pub fn new(home_goals: u8, away_goals: u8) -> Self {
        Self {
            home_goals,
            away_goals,
            result: ResultCode::from_goals(home_goals, away_goals),
        }
    }

    pub fn home_goals(&self) -> u8 {
        self.home_goals
    }

    pub fn away_goals(&self) -> u8 {
        self.away_goals
    }

    pub fn result(&self) -> ResultCode {
        self.result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastBasis {
    HomeFavorite,
    AwayFavorite,
    /// Odds within the draw margin.
    TooClose,
    /// At least one side had no market price.
    MissingOdds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Forecast {
    pub score: Scoreline,
    pub basis: ForecastBasis,
}

impl Forecast {
    pub fn defaulted(&self) -> bool {
        self.basis == ForecastBasis::MissingOdds
    }
}

pub fn predict_default(
    home_odds: Option<f64>,
    away_odds: Option<f64>,
    template: ScoreTemplate,
) -> Result<Forecast, PredictError> {
    predict(home_odds, away_odds, template, DRAW_MARGIN)
}

/// Turns home/away win odds into a scoreline. Lower decimal odds mark the
/// favorite, which gets the template's larger number.
pub fn predict(
    home_odds: Option<f64>,
    away_odds: Option<f64>,
    template: ScoreTemplate,
    margin: f64,
) -> Result<Forecast, PredictError> {
    if !margin.is_finite() || margin < 0.0 {
        return Err(PredictError::InvalidInput(format!(
            "draw margin must be a non-negative number, got {margin}"
        )));
    }
    let home = home_odds.map(|v| validate_odds("home", v)).transpose()?;
    let away = away_odds.map(|v| validate_odds("away", v)).transpose()?;

    let (Some(home), Some(away)) = (home, away) else {
        return Ok(Forecast {
            score: Scoreline::new(NEUTRAL_DRAW.0, NEUTRAL_DRAW.1),
            basis: ForecastBasis::MissingOdds,
        });
    };

    let diff = home - away;
    let (score, basis) = if diff > -margin && diff < margin {
        (
            Scoreline::new(NEUTRAL_DRAW.0, NEUTRAL_DRAW.1),
            ForecastBasis::TooClose,
        )
    } else if home < away {
        (
            Scoreline::new(template.favorite, template.underdog),
            ForecastBasis::HomeFavorite,
        )
    } else if home > away {
        (
            Scoreline::new(template.underdog, template.favorite),
            ForecastBasis::AwayFavorite,
        )
    } else {
        // Only reachable with a zero margin.
        (
            Scoreline::new(NEUTRAL_DRAW.0, NEUTRAL_DRAW.1),
            ForecastBasis::TooClose,
        )
    };
    Ok(Forecast { score, basis })
}

fn validate_odds(side: &str, value: f64) -> Result<f64, PredictError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PredictError::InvalidInput(format!(
            "{side} odds must be a positive number, got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_common_forms() {
        assert_eq!("1-0".parse::<ScoreTemplate>(), Ok(ScoreTemplate::NARROW));
        assert_eq!(" 2:1 ".parse::<ScoreTemplate>(), Ok(ScoreTemplate::CONVINCING));
        assert!("0-1".parse::<ScoreTemplate>().is_err());
        assert!("two-one".parse::<ScoreTemplate>().is_err());
    }

    #[test]
    fn result_code_char_round_trip() {
        for code in [ResultCode::Home, ResultCode::Draw, ResultCode::Away] {
            assert_eq!(ResultCode::from_char(code.as_char()), Some(code));
        }
        assert_eq!(ResultCode::from_char('x'), None);
    }

    #[test]
    fn zero_or_negative_odds_are_rejected() {
        let err = predict_default(Some(0.0), Some(2.0), ScoreTemplate::NARROW).unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
        assert!(predict_default(Some(2.0), Some(-1.5), ScoreTemplate::NARROW).is_err());
        assert!(predict_default(Some(f64::NAN), Some(2.0), ScoreTemplate::NARROW).is_err());
    }

    #[test]
    fn template_deserializes_through_validation() {
        let ok: ScoreTemplate = serde_json::from_str("\"2-1\"").unwrap();
        assert_eq!(ok, ScoreTemplate::CONVINCING);
        assert_eq!(serde_json::to_string(&ok).unwrap(), "\"2-1\"");
        assert!(serde_json::from_str::<ScoreTemplate>("\"0-1\"").is_err());
    }

    #[test]
    fn invalid_odds_beat_missing_odds() {
        // A bad price on one side is reported even if the other side is absent.
        assert!(predict_default(None, Some(0.0), ScoreTemplate::NARROW).is_err());
    }
}
