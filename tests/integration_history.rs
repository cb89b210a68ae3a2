use std::sync::Arc;

use chrono::{Duration, Local, TimeZone, Utc};
use gripmeter::config::Settings;
use gripmeter::console::Console;
use gripmeter::cue::NullCueSink;
use gripmeter::runtime::ManualClock;
use gripmeter::sequencer::{Hand, TestConfig, TestType};
use gripmeter::stats::SessionDb;
use tempfile::tempdir;

#[test]
fn finished_tests_land_in_the_history_db() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sessions.db");
    let clock = Arc::new(ManualClock::new(Local::now().with_timezone(&Utc)));

    let db = SessionDb::open(&path).unwrap();
    let mut console = Console::new(Settings::default(), NullCueSink, db, clock.clone());
    console.set_signal_connected(true);

    for peak in [31.0, 44.5] {
        let handle = console
            .start_test(TestConfig {
                test_type: TestType::Peak,
                work_duration_secs: 1.0,
                rep_count: 1,
                rest_secs: 0.0,
                hand: Hand::Right,
            })
            .unwrap();
        for _ in 0..40 {
            clock.advance(Duration::milliseconds(100));
            console.tick(&handle, peak).unwrap();
        }
        assert!(console.stop(handle).is_some());
    }

    let stats = console.sessions().history_stats(Local::now()).unwrap();
    assert_eq!(stats.total_sessions, 2);
    assert_eq!(stats.all_time_peak, 44.5);
    assert_eq!(stats.sessions_this_week, 2);
    assert_eq!(stats.streak_days, 1);
    drop(console);

    let reopened = SessionDb::open(&path).unwrap();
    let recent = reopened.recent(5).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].peak, 44.5);
    assert_eq!(recent[0].duration_secs, 4);
    assert!((recent[0].average_force - 44.5 * 0.7).abs() < 1e-9);
}

#[test]
fn clearing_history_resets_stats() {
    let dir = tempdir().unwrap();
    let mut db = SessionDb::open(dir.path().join("sessions.db")).unwrap();
    let record = gripmeter::session::SessionRecord {
        date: Utc.with_ymd_and_hms(2024, 2, 29, 7, 0, 0).unwrap(),
        test_type: TestType::Critical,
        peak: 28.0,
        average_force: 19.6,
        duration_secs: 185,
        reps: 1,
        hand: Hand::Left,
        left_peak: 28.0,
        right_peak: 0.0,
    };
    db.record(&record).unwrap();
    assert_eq!(db.count().unwrap(), 1);

    db.clear().unwrap();
    let stats = db.history_stats(Local::now()).unwrap();
    assert_eq!(stats.total_sessions, 0);
    assert_eq!(stats.all_time_peak, 0.0);
    assert_eq!(stats.streak_days, 0);
}
