use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;

use footy_predict::config::{self, OddsConfig, PredictConfig, arg_value};
use footy_predict::{odds, store};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let cfg = PredictConfig::from_env();
    let mut odds_cfg = OddsConfig::from_env();
    if let Some(sport) = arg_value("sport") {
        odds_cfg.sport = sport.to_ascii_lowercase();
    }
    let season = arg_value("season").unwrap_or(cfg.season);

    let db_path = arg_value("db")
        .map(PathBuf::from)
        .or(cfg.db_path)
        .context("unable to resolve sqlite path")?;
    let mut conn = store::open_db(&db_path)?;

    let upcoming: Vec<store::Fixture> = store::load_season_fixtures(&conn, &season)?
        .into_iter()
        .filter(|f| !f.finished && !f.cancelled)
        .filter(|f| odds::parse_kickoff(&f.kickoff).is_some_and(|ko| ko > Utc::now()))
        .collect();
    if upcoming.is_empty() {
        println!("No upcoming fixtures stored for {season}; run fixtures_ingest first");
        return Ok(());
    }

    let summary = odds::ingest_odds(&mut conn, &upcoming, &odds_cfg)?;
    println!("Odds ingest complete");
    println!("DB: {}", db_path.display());
    println!("Sport: {}", odds_cfg.sport);
    println!("Events: {}", summary.events);
    println!("Fixtures matched: {}/{}", summary.matched, upcoming.len());
    println!("Quotes upserted: {}", summary.quotes);
    if !summary.unmatched.is_empty() {
        println!("Without odds:");
        for name in summary.unmatched.iter().take(12) {
            println!(" - {name}");
        }
    }
    Ok(())
}
