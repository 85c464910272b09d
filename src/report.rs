use crate::batch::{BatchPlan, BatchSummary};
use crate::predictor::ScoreTemplate;
use crate::strategy::StrategyRecommendation;
use crate::team_names::title_case;

pub fn scoreline_line(home_team: &str, home_goals: u8, away_goals: u8, away_team: &str) -> String {
    format!(
        "{} {} - {} {}",
        title_case(home_team),
        home_goals,
        away_goals,
        title_case(away_team)
    )
}

/// One line per predicted fixture, in batch order.
pub fn predictions_text(plan: &BatchPlan) -> String {
    plan.planned
        .iter()
        .map(|p| {
            scoreline_line(
                &p.home_team,
                p.score.home_goals(),
                p.score.away_goals(),
                &p.away_team,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn summary_line(summary: &BatchSummary) -> String {
    format!(
        "made={} skipped={} defaulted={}",
        summary.made, summary.skipped, summary.defaulted
    )
}

pub fn strategy_line(rec: &StrategyRecommendation) -> String {
    format!(
        "{}: favorites {} ({} confidence) - {}",
        rec.season, rec.template, rec.confidence, rec.rationale
    )
}

/// Header naming a template that was set by hand rather than recommended.
pub fn manual_template_line(
    template: ScoreTemplate,
    recommended: Option<&StrategyRecommendation>,
) -> String {
    match recommended {
        Some(rec) => format!(
            "{}: favorites {} (manual template; recommended {})",
            rec.season, template, rec.template
        ),
        None => format!("favorites {template} (manual template)"),
    }
}

/// Full text pushed to the notification hook and printed by `predict`.
/// `template` is the one the batch actually used.
pub fn run_report(
    plan: &BatchPlan,
    strategy: Option<&StrategyRecommendation>,
    template: ScoreTemplate,
) -> String {
    let mut out = match strategy {
        Some(rec) if rec.template == template => strategy_line(rec),
        _ => manual_template_line(template, strategy),
    };
    out.push('\n');
    let lines = predictions_text(plan);
    if !lines.is_empty() {
        out.push_str(&lines);
        out.push('\n');
    }
    for skipped in &plan.skipped {
        out.push_str(&skipped.message());
        out.push('\n');
    }
    out.push_str(&summary_line(&plan.summary()));
    out
}
