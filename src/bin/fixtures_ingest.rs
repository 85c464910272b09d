use std::path::PathBuf;

use anyhow::{Context, Result};

use footy_predict::config::{self, arg_value};
use footy_predict::{fixtures, store};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let league_id = match arg_value("league-id") {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("invalid --league-id {raw:?}"))?,
        None => fixtures::PREMIER_LEAGUE_ID,
    };
    let seasons = arg_value("season")
        .map(|raw| {
            raw.split([',', ';'])
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let db_path = arg_value("db")
        .map(PathBuf::from)
        .or_else(config::default_db_path)
        .context("unable to resolve sqlite path")?;
    let mut conn = store::open_db(&db_path)?;

    println!("Fixtures ingest");
    println!("DB: {}", db_path.display());

    let targets: Vec<Option<&str>> = if seasons.is_empty() {
        vec![None]
    } else {
        seasons.iter().map(|s| Some(s.as_str())).collect()
    };
    let mut errors = Vec::new();
    for season in targets {
        match fixtures::ingest_league_season(&mut conn, league_id, season) {
            Ok(summary) => println!(
                "league {} season {}: fixtures={} completed={} unreadable={}",
                summary.league_id,
                summary.season,
                summary.fixtures_upserted,
                summary.completed,
                summary.skipped_rows
            ),
            Err(err) => errors.push(format!(
                "season {}: {err:#}",
                season.unwrap_or("current")
            )),
        }
    }
    if !errors.is_empty() {
        println!("Errors: {}", errors.len());
        for err in &errors {
            println!(" - {err}");
        }
    }
    Ok(())
}
