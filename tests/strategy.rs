use footy_predict::predictor::ScoreTemplate;
use footy_predict::store::Fixture;
use footy_predict::strategy::{
    Confidence, LOW_SCORING_THRESHOLD_PCT, SeasonStats, select_strategy,
};

fn stats(season: &str, completed: usize, low_scoring: usize) -> SeasonStats {
    SeasonStats {
        season: season.to_string(),
        completed,
        low_scoring,
        total_goals: 0,
    }
}

fn finished(id: i64, season: &str, home: i32, away: i32) -> Fixture {
    Fixture {
        id,
        season: season.to_string(),
        round: Some(1),
        kickoff: "2025-08-16T14:00:00.000Z".to_string(),
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        home_goals: Some(home),
        away_goals: Some(away),
        finished: true,
        cancelled: false,
    }
}

#[test]
fn low_scoring_season_picks_narrow_template() {
    // 21 of 40 = 52.5%
    let current = stats("2025/2026", 40, 21);
    let rec =
        select_strategy("2025/2026", &[], &current, LOW_SCORING_THRESHOLD_PCT).unwrap();
    assert!((rec.low_scoring_pct - 52.5).abs() < 1e-9);
    assert_eq!(rec.template, ScoreTemplate::NARROW);
    assert_eq!(rec.confidence, Confidence::Early);
}

#[test]
fn high_scoring_season_picks_convincing_template() {
    // 30 of 85 = 35.3%
    let current = stats("2025/2026", 85, 30);
    let rec =
        select_strategy("2025/2026", &[], &current, LOW_SCORING_THRESHOLD_PCT).unwrap();
    assert!((rec.low_scoring_pct - 35.294).abs() < 0.01);
    assert_eq!(rec.template, ScoreTemplate::CONVINCING);
    assert_eq!(rec.confidence, Confidence::High);
}

#[test]
fn no_completed_fixtures_is_insufficient_data() {
    let err = select_strategy(
        "2026/2027",
        &[stats("2025/2026", 380, 180)],
        &stats("2026/2027", 0, 0),
        LOW_SCORING_THRESHOLD_PCT,
    )
    .unwrap_err();
    assert_eq!(err.kind(), "InsufficientData");
}

#[test]
fn selection_is_idempotent() {
    let hist = vec![stats("2023/2024", 380, 170), stats("2024/2025", 380, 185)];
    let current = stats("2025/2026", 60, 29);
    let a = select_strategy("2025/2026", &hist, &current, LOW_SCORING_THRESHOLD_PCT).unwrap();
    let b = select_strategy("2025/2026", &hist, &current, LOW_SCORING_THRESHOLD_PCT).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.confidence, Confidence::Moderate);
    assert!(a.historical_low_scoring_pct.is_some());
    assert!(a.rationale.contains("earlier seasons averaged"));
}

#[test]
fn history_never_changes_the_template() {
    let current = stats("2025/2026", 50, 20);
    let low_history = vec![stats("2024/2025", 380, 300)];
    let rec =
        select_strategy("2025/2026", &low_history, &current, LOW_SCORING_THRESHOLD_PCT).unwrap();
    assert_eq!(rec.template, ScoreTemplate::CONVINCING);
}

#[test]
fn season_stats_count_only_completed_fixtures_of_that_season() {
    let mut fixtures = vec![
        finished(1, "2025/2026", 1, 0),
        finished(2, "2025/2026", 2, 0),
        finished(3, "2025/2026", 3, 1),
        finished(4, "2024/2025", 0, 0),
    ];
    let mut pending = finished(5, "2025/2026", 0, 0);
    pending.finished = false;
    fixtures.push(pending);
    let mut called_off = finished(6, "2025/2026", 0, 0);
    called_off.cancelled = true;
    fixtures.push(called_off);

    let s = SeasonStats::from_fixtures("2025/2026", &fixtures);
    assert_eq!(s.completed, 3);
    assert_eq!(s.low_scoring, 2);
    assert_eq!(s.total_goals, 7);
    assert!((s.low_scoring_pct().unwrap() - 66.666).abs() < 0.01);
}
