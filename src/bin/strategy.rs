use std::path::PathBuf;

use anyhow::{Context, Result};

use footy_predict::config::{self, PredictConfig, arg_value};
use footy_predict::error::PredictError;
use footy_predict::{report, store, strategy};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let cfg = PredictConfig::from_env();
    let season = arg_value("season").unwrap_or(cfg.season);
    let db_path = arg_value("db")
        .map(PathBuf::from)
        .or(cfg.db_path)
        .context("unable to resolve sqlite path")?;
    let conn = store::open_db(&db_path)?;

    match strategy::recommend_from_store(&conn, &season, cfg.low_scoring_threshold) {
        Ok(rec) => {
            store::save_strategy(&conn, &rec)?;
            println!("{}", report::strategy_line(&rec));
            Ok(())
        }
        Err(PredictError::InsufficientData { season, reason }) => {
            // Nothing is stored; the predictor keeps whatever it had.
            println!("Insufficient data for {season}: {reason}. No recommendation made.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
