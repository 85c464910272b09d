pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod fixtures;
pub mod http_client;
pub mod notify;
pub mod odds;
pub mod predictor;
pub mod report;
pub mod store;
pub mod strategy;
pub mod team_names;

pub use error::PredictError;
pub use predictor::{Forecast, ResultCode, ScoreTemplate, Scoreline, predict, predict_default};
pub use strategy::{Confidence, SeasonStats, StrategyRecommendation, select_strategy};
