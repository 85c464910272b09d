use chrono::{Duration, Utc};

use footy_predict::batch;
use footy_predict::odds::{Aggregation, OddsQuote, OutcomeKind};
use footy_predict::predictor::{ResultCode, ScoreTemplate};
use footy_predict::store::{self, Fixture, utc_stamp};
use footy_predict::strategy::{self, Confidence};

const SEASON: &str = "2030/2031";

fn upcoming(id: i64, home: &str, away: &str, days: i64) -> Fixture {
    Fixture {
        id,
        season: SEASON.to_string(),
        round: Some(3),
        kickoff: utc_stamp(Utc::now() + Duration::days(days)),
        home_team: home.to_string(),
        away_team: away.to_string(),
        home_goals: None,
        away_goals: None,
        finished: false,
        cancelled: false,
    }
}

fn played(id: i64, season: &str, home: i32, away: i32) -> Fixture {
    Fixture {
        id,
        season: season.to_string(),
        round: Some(1),
        kickoff: utc_stamp(Utc::now() - Duration::days(30)),
        home_team: format!("Home {id}"),
        away_team: format!("Away {id}"),
        home_goals: Some(home),
        away_goals: Some(away),
        finished: true,
        cancelled: false,
    }
}

fn h2h(fixture_id: i64, home: Option<f64>, away: Option<f64>) -> Vec<OddsQuote> {
    vec![
        OddsQuote {
            fixture_id,
            kind: OutcomeKind::HomeWin,
            aggregation: Aggregation::Median,
            decimal: home,
            bookmakers: usize::from(home.is_some()) * 4,
        },
        OddsQuote {
            fixture_id,
            kind: OutcomeKind::AwayWin,
            aggregation: Aggregation::Median,
            decimal: away,
            bookmakers: usize::from(away.is_some()) * 4,
        },
    ]
}

fn run_count(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM prediction_runs", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn batch_writes_predictions_that_read_back_consistently() {
    let mut conn = store::open_in_memory().unwrap();
    let fixtures = vec![
        upcoming(11, "Arsenal", "Chelsea", 2),
        upcoming(12, "Everton", "Liverpool", 2),
        upcoming(13, "Fulham", "Brentford", 3),
    ];
    store::upsert_fixtures(&mut conn, &fixtures).unwrap();
    let mut quotes = h2h(11, Some(1.43), Some(6.95));
    quotes.extend(h2h(12, Some(3.50), Some(1.80)));
    store::upsert_odds_quotes(&mut conn, &quotes).unwrap();

    let due = store::load_due_fixtures(&conn, 7, SEASON, Utc::now()).unwrap();
    assert_eq!(due.len(), 3);
    let inputs = store::load_match_odds(&conn, &due, Aggregation::Median).unwrap();
    assert_eq!(inputs[2].home_odds, None);

    let plan =
        batch::run_batch(&mut conn, 7, SEASON, ScoreTemplate::NARROW, 0.06, &inputs).unwrap();
    let summary = plan.summary();
    assert_eq!((summary.made, summary.skipped, summary.defaulted), (3, 0, 1));
    assert_eq!(run_count(&conn), 1);

    let stored = store::load_predictions(&conn, 7, SEASON).unwrap();
    let scores: Vec<(i64, u8, u8, ResultCode)> = stored
        .iter()
        .map(|p| {
            (
                p.fixture_id,
                p.score.home_goals(),
                p.score.away_goals(),
                p.score.result(),
            )
        })
        .collect();
    assert_eq!(
        scores,
        vec![
            (11, 1, 0, ResultCode::Home),
            (12, 0, 1, ResultCode::Away),
            (13, 1, 1, ResultCode::Draw),
        ]
    );

    // Nothing is due again until a fixture or its odds change.
    let due = store::load_due_fixtures(&conn, 7, SEASON, Utc::now()).unwrap();
    assert!(due.is_empty());
    // Another player still has everything to do.
    assert_eq!(store::load_due_fixtures(&conn, 8, SEASON, Utc::now()).unwrap().len(), 3);
}

#[test]
fn changed_odds_make_a_fixture_due_again() {
    let mut conn = store::open_in_memory().unwrap();
    store::upsert_fixtures(&mut conn, &[upcoming(21, "Leeds United", "Burnley", 4)]).unwrap();
    store::upsert_odds_quotes(&mut conn, &h2h(21, Some(2.10), Some(3.40))).unwrap();
    let inputs = store::load_match_odds(
        &conn,
        &store::load_due_fixtures(&conn, 1, SEASON, Utc::now()).unwrap(),
        Aggregation::Median,
    )
    .unwrap();
    batch::run_batch(&mut conn, 1, SEASON, ScoreTemplate::NARROW, 0.06, &inputs).unwrap();
    assert!(store::load_due_fixtures(&conn, 1, SEASON, Utc::now()).unwrap().is_empty());

    // Same prices again: still not due.
    std::thread::sleep(std::time::Duration::from_millis(5));
    store::upsert_odds_quotes(&mut conn, &h2h(21, Some(2.10), Some(3.40))).unwrap();
    assert!(store::load_due_fixtures(&conn, 1, SEASON, Utc::now()).unwrap().is_empty());

    std::thread::sleep(std::time::Duration::from_millis(5));
    store::upsert_odds_quotes(&mut conn, &h2h(21, Some(3.60), Some(2.00))).unwrap();
    let due = store::load_due_fixtures(&conn, 1, SEASON, Utc::now()).unwrap();
    assert_eq!(due.iter().map(|f| f.id).collect::<Vec<_>>(), vec![21]);
}

#[test]
fn past_and_finished_fixtures_are_never_due() {
    let mut conn = store::open_in_memory().unwrap();
    let mut done = upcoming(31, "Wolves", "Spurs", 1);
    done.finished = true;
    store::upsert_fixtures(
        &mut conn,
        &[upcoming(30, "Wolves", "Spurs", -1), done, upcoming(32, "Spurs", "Wolves", 5)],
    )
    .unwrap();
    let due = store::load_due_fixtures(&conn, 1, SEASON, Utc::now()).unwrap();
    assert_eq!(due.iter().map(|f| f.id).collect::<Vec<_>>(), vec![32]);
}

#[test]
fn invalid_odds_are_skipped_and_reported() {
    let inputs = vec![
        footy_predict::odds::MatchOdds {
            fixture_id: 41,
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            home_odds: Some(0.0),
            away_odds: Some(3.0),
        },
        footy_predict::odds::MatchOdds {
            fixture_id: 42,
            home_team: "Everton".to_string(),
            away_team: "Fulham".to_string(),
            home_odds: Some(2.5),
            away_odds: Some(2.5),
        },
    ];
    let plan = batch::plan_batch(&inputs, ScoreTemplate::CONVINCING, 0.06);
    let summary = plan.summary();
    assert_eq!((summary.made, summary.skipped, summary.defaulted), (1, 1, 0));
    let msg = plan.skipped[0].message();
    assert!(msg.contains("fixture 41"));
    assert!(msg.contains("Arsenal v Chelsea"));
    assert!(msg.contains("invalid input"));
}

#[test]
fn store_failure_aborts_without_partial_writes() {
    let mut conn = store::open_in_memory().unwrap();
    let fixtures = vec![
        upcoming(51, "Arsenal", "Chelsea", 2),
        upcoming(52, "Everton", "Liverpool", 2),
        upcoming(53, "Fulham", "Brentford", 3),
    ];
    store::upsert_fixtures(&mut conn, &fixtures).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_53 BEFORE INSERT ON predictions
         WHEN NEW.fixture_id = 53
         BEGIN SELECT RAISE(ABORT, 'disk on fire'); END;",
    )
    .unwrap();

    let inputs = store::load_match_odds(&conn, &fixtures, Aggregation::Median).unwrap();
    let err = batch::run_batch(&mut conn, 1, SEASON, ScoreTemplate::NARROW, 0.06, &inputs)
        .unwrap_err();
    assert_eq!(err.kind(), "StoreUnavailable");
    assert!(store::load_predictions(&conn, 1, SEASON).unwrap().is_empty());
    assert_eq!(run_count(&conn), 0);
}

#[test]
fn failed_run_record_rolls_back_the_predictions() {
    let mut conn = store::open_in_memory().unwrap();
    let fixtures = vec![upcoming(55, "Arsenal", "Chelsea", 2)];
    store::upsert_fixtures(&mut conn, &fixtures).unwrap();
    store::upsert_odds_quotes(&mut conn, &h2h(55, Some(1.43), Some(6.95))).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_runs BEFORE INSERT ON prediction_runs
         BEGIN SELECT RAISE(ABORT, 'runs table locked'); END;",
    )
    .unwrap();

    let inputs = store::load_match_odds(&conn, &fixtures, Aggregation::Median).unwrap();
    let err = batch::run_batch(&mut conn, 1, SEASON, ScoreTemplate::NARROW, 0.06, &inputs)
        .unwrap_err();
    assert_eq!(err.kind(), "StoreUnavailable");
    assert!(store::load_predictions(&conn, 1, SEASON).unwrap().is_empty());
    assert_eq!(store::load_due_fixtures(&conn, 1, SEASON, Utc::now()).unwrap().len(), 1);
}

#[test]
fn strategy_round_trips_and_uses_earlier_seasons_as_history() {
    let mut conn = store::open_in_memory().unwrap();
    let mut rows = Vec::new();
    // 2029/2030: 10 matches, 3 low-scoring.
    for i in 0..10 {
        rows.push(if i < 3 {
            played(100 + i, "2029/2030", 1, 0)
        } else {
            played(100 + i, "2029/2030", 3, 2)
        });
    }
    // Current season: 45 matches, 24 low-scoring (53.3%).
    for i in 0..45 {
        rows.push(if i < 24 {
            played(200 + i, SEASON, 1, 1)
        } else {
            played(200 + i, SEASON, 2, 2)
        });
    }
    store::upsert_fixtures(&mut conn, &rows).unwrap();

    let rec = strategy::recommend_from_store(&conn, SEASON, 47.0).unwrap();
    assert_eq!(rec.template, ScoreTemplate::NARROW);
    assert_eq!(rec.confidence, Confidence::Moderate);
    assert_eq!(rec.completed_fixtures, 45);
    assert!((rec.historical_low_scoring_pct.unwrap() - 30.0).abs() < 1e-9);

    store::save_strategy(&conn, &rec).unwrap();
    let loaded = store::load_active_strategy(&conn, SEASON).unwrap().unwrap();
    assert_eq!(loaded, rec);
    assert!(store::load_active_strategy(&conn, "2031/2032").unwrap().is_none());

    let err = strategy::recommend_from_store(&conn, "2031/2032", 47.0).unwrap_err();
    assert_eq!(err.kind(), "InsufficientData");
}

#[test]
fn non_positive_odds_are_refused_by_the_store() {
    let mut conn = store::open_in_memory().unwrap();
    let err = store::upsert_odds_quotes(&mut conn, &h2h(61, Some(-2.0), Some(2.0))).unwrap_err();
    assert!(format!("{err:#}").contains("non-positive"));
}

#[test]
fn run_records_are_kept() {
    let conn = store::open_in_memory().unwrap();
    let id = store::record_run(
        &conn,
        &store::RunRecord {
            player_id: 1,
            season: SEASON.to_string(),
            template: "1-0".to_string(),
            made: 9,
            skipped: 1,
            defaulted: 2,
            errors: vec!["fixture 1 skipped".to_string()],
        },
    )
    .unwrap();
    assert!(id > 0);
}
