use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use footy_predict::config::{self, OddsConfig, PredictConfig, arg_value, has_flag};
use footy_predict::error::PredictError;
use footy_predict::predictor::ScoreTemplate;
use footy_predict::strategy::{self, StrategyRecommendation};
use footy_predict::{batch, export, notify, report, store};

fn main() -> Result<()> {
    config::load_dotenv();
    config::init_logging();

    let mut cfg = PredictConfig::from_env();
    if let Some(season) = arg_value("season") {
        cfg.season = season;
    }
    if let Some(player) = arg_value("player") {
        cfg.player_id = player
            .parse::<i64>()
            .with_context(|| format!("invalid --player {player:?}"))?;
    }
    if let Some(raw) = arg_value("template") {
        cfg.template_override = Some(raw.parse::<ScoreTemplate>()?);
    }
    if let Some(path) = arg_value("export") {
        cfg.export_path = Some(PathBuf::from(path));
    }
    let odds_cfg = OddsConfig::from_env();

    let db_path = arg_value("db")
        .map(PathBuf::from)
        .or_else(|| cfg.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let mut conn = store::open_db(&db_path)?;
    store::ensure_player(&conn, cfg.player_id)?;

    let strategy = resolve_strategy(&conn, &cfg)?;
    let template = match (cfg.template_override, strategy.as_ref()) {
        (Some(t), _) => t,
        (None, Some(rec)) => rec.template,
        (None, None) => {
            return Err(anyhow!(
                "no strategy for {} or the season before; run `strategy` or pass --template",
                cfg.season
            ));
        }
    };

    let due = store::load_due_fixtures(&conn, cfg.player_id, &cfg.season, Utc::now())?;
    if due.is_empty() {
        println!("No fixtures due for player {} in {}", cfg.player_id, cfg.season);
        return Ok(());
    }
    let inputs = store::load_match_odds(&conn, &due, odds_cfg.aggregation)?;

    let plan = batch::run_batch(
        &mut conn,
        cfg.player_id,
        &cfg.season,
        template,
        cfg.draw_margin,
        &inputs,
    )?;

    let text = report::run_report(&plan, strategy.as_ref(), template);
    println!("{text}");

    if let Some(path) = cfg.export_path.as_ref() {
        let predictions = store::load_predictions(&conn, cfg.player_id, &cfg.season)?;
        let exported = export::export_predictions(path, &predictions, strategy.as_ref())?;
        info!(
            path = %path.display(),
            rows = exported.predictions,
            with_strategy = exported.has_strategy,
            "predictions workbook written"
        );
    }

    if !has_flag("no-notify") {
        notify::notify_best_effort(&cfg.notify, &text);
    }
    Ok(())
}

/// Stored strategy for the season, else a fresh one from the store, else the
/// previous season's. `None` means there is nothing to base a template on.
fn resolve_strategy(
    conn: &Connection,
    cfg: &PredictConfig,
) -> Result<Option<StrategyRecommendation>> {
    if let Some(rec) = store::load_active_strategy(conn, &cfg.season)? {
        return Ok(Some(rec));
    }
    match strategy::recommend_from_store(conn, &cfg.season, cfg.low_scoring_threshold) {
        Ok(rec) => {
            store::save_strategy(conn, &rec)?;
            Ok(Some(rec))
        }
        Err(err @ PredictError::InsufficientData { .. }) => {
            warn!(%err, "keeping the previous season's template");
            let Some(prev) = strategy::previous_season(&cfg.season) else {
                return Ok(None);
            };
            Ok(store::load_active_strategy(conn, &prev)?)
        }
        Err(err) => Err(err.into()),
    }
}
