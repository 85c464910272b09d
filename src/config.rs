use std::env;
use std::path::PathBuf;

use chrono::{Datelike, NaiveDate, Utc};
use tracing::warn;

use crate::odds::Aggregation;
use crate::predictor::{DRAW_MARGIN, ScoreTemplate};
use crate::strategy::LOW_SCORING_THRESHOLD_PCT;

pub const APP_DIR: &str = "footy_predict";
const DB_FILE: &str = "predictions.sqlite";
const DEFAULT_TIME_TOLERANCE_MIN: i64 = 90;
// Seasons roll over at the start of August.
const SEASON_START_MONTH: u32 = 8;

/// Loads `.env.local` then `.env` if present; real environment wins.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// Initializes `tracing` output, honoring `RUST_LOG` and defaulting to `info`.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub db_path: Option<PathBuf>,
    pub player_id: i64,
    pub season: String,
    pub draw_margin: f64,
    pub low_scoring_threshold: f64,
    pub template_override: Option<ScoreTemplate>,
    pub export_path: Option<PathBuf>,
    pub notify: NotifyConfig,
}

impl PredictConfig {
    pub fn from_env() -> Self {
        let template_override = env_string("PREDICT_TEMPLATE").and_then(|raw| {
            raw.parse::<ScoreTemplate>()
                .map_err(|err| warn!(%err, "ignoring PREDICT_TEMPLATE"))
                .ok()
        });
        Self {
            db_path: env_string("PREDICT_DB_PATH")
                .map(PathBuf::from)
                .or_else(default_db_path),
            player_id: env_parse("PREDICT_PLAYER_ID").unwrap_or(1),
            season: env_string("PREDICT_SEASON")
                .unwrap_or_else(|| season_label_for(Utc::now().date_naive())),
            draw_margin: bounded_f64(
                env_parse("PREDICT_DRAW_MARGIN"),
                DRAW_MARGIN,
                0.0,
                1.0,
            ),
            low_scoring_threshold: bounded_f64(
                env_parse("PREDICT_LOW_SCORING_PCT"),
                LOW_SCORING_THRESHOLD_PCT,
                0.0,
                100.0,
            ),
            template_override,
            export_path: env_string("PREDICT_EXPORT_PATH").map(PathBuf::from),
            notify: NotifyConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OddsConfig {
    pub api_key: Option<String>,
    pub sport: String,
    pub regions: String,
    pub aggregation: Aggregation,
    pub time_tolerance_secs: i64,
}

impl OddsConfig {
    pub fn from_env() -> Self {
        let aggregation = match env_string("ODDS_AGGREGATION")
            .map(|s| s.to_ascii_lowercase())
            .as_deref()
        {
            Some("mean") | Some("avg") | Some("average") => Aggregation::Mean,
            _ => Aggregation::Median,
        };
        let time_tolerance_min = env_parse::<i64>("ODDS_MATCH_TIME_TOLERANCE_MIN")
            .unwrap_or(DEFAULT_TIME_TOLERANCE_MIN)
            .clamp(5, 360);
        Self {
            api_key: env_string("ODDS_API_KEY"),
            sport: env_string("ODDS_SPORT")
                .unwrap_or_else(|| "soccer_epl".to_string())
                .to_ascii_lowercase(),
            regions: env_string("ODDS_REGIONS")
                .unwrap_or_else(|| "uk".to_string())
                .to_ascii_lowercase(),
            aggregation,
            time_tolerance_secs: time_tolerance_min * 60,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    pub title: String,
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        Self {
            webhook_url: env_string("NOTIFY_WEBHOOK_URL"),
            title: env_string("NOTIFY_TITLE").unwrap_or_else(|| "Predictions".to_string()),
        }
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Some(base) = env_string("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(APP_DIR));
    }
    let home = env_string("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE))
}

/// "2025/2026" style label for the season that `date` falls in.
pub fn season_label_for(date: NaiveDate) -> String {
    let start = if date.month() >= SEASON_START_MONTH {
        date.year()
    } else {
        date.year() - 1
    };
    format!("{}/{}", start, start + 1)
}

/// Looks up `--name=value` or `--name value` in the process arguments.
pub fn arg_value(name: &str) -> Option<String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    find_arg(&args, name)
}

pub fn has_flag(name: &str) -> bool {
    let flag = format!("--{name}");
    env::args().skip(1).any(|a| a == flag)
}

fn find_arg(args: &[String], name: &str) -> Option<String> {
    let long = format!("--{name}");
    let with_eq = format!("{long}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&with_eq) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if *arg == long
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
            && !next.starts_with("--")
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}

/// NaN and infinities fall back to `default`; anything else is clamped.
fn bounded_f64(value: Option<f64>, default: f64, lo: f64, hi: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v.clamp(lo, hi),
        Some(v) => {
            warn!(value = v, default, "ignoring non-finite setting");
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn season_rolls_over_in_august() {
        let jul = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();
        let aug = NaiveDate::from_ymd_opt(2026, 8, 1).unwrap();
        assert_eq!(season_label_for(jul), "2025/2026");
        assert_eq!(season_label_for(aug), "2026/2027");
    }

    #[test]
    fn find_arg_accepts_both_forms() {
        let a = args(&["--db=/tmp/x.sqlite", "--season", "2025/2026"]);
        assert_eq!(find_arg(&a, "db").as_deref(), Some("/tmp/x.sqlite"));
        assert_eq!(find_arg(&a, "season").as_deref(), Some("2025/2026"));
        assert_eq!(find_arg(&a, "player"), None);
    }

    #[test]
    fn find_arg_skips_missing_values() {
        let a = args(&["--db", "--season="]);
        assert_eq!(find_arg(&a, "db"), None);
        assert_eq!(find_arg(&a, "season"), None);
    }

    #[test]
    fn non_finite_settings_use_the_default() {
        assert_eq!(bounded_f64(Some(f64::NAN), DRAW_MARGIN, 0.0, 1.0), DRAW_MARGIN);
        assert_eq!(bounded_f64(Some(f64::INFINITY), 47.0, 0.0, 100.0), 47.0);
        assert_eq!(bounded_f64(Some(-0.5), DRAW_MARGIN, 0.0, 1.0), 0.0);
        assert_eq!(bounded_f64(Some(0.1), DRAW_MARGIN, 0.0, 1.0), 0.1);
        assert_eq!(bounded_f64(None, DRAW_MARGIN, 0.0, 1.0), DRAW_MARGIN);
    }
}
