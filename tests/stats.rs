use backbeat::player::stats::{TrendWindow, TREND_INTERVAL};

#[test]
fn test_empty_window_has_no_averages() {
    let window = TrendWindow::new();
    assert!(window.is_empty());
    assert!(window.averages().is_none());
}

#[test]
fn test_running_sums() {
    let mut window = TrendWindow::new();
    window.record(10, 1);
    window.record(12, -1);

    let avg = window.averages().unwrap();
    assert_eq!(window.len(), 2);
    assert_eq!(avg.sync_error, 11.0);
    assert_eq!(avg.correction, 0.0);
    assert_eq!(avg.insertions_and_deletions, 1.0);
    // First entry has no drift; the second is 12 - 10 - 1.
    assert_eq!(avg.drift, 0.5);
}

#[test]
fn test_drift_subtracts_previous_correction() {
    let mut window = TrendWindow::new();
    window.record(0, 1);
    window.record(1, 0);
    // sync error moved by exactly the previous correction: no drift.
    let avg = window.averages().unwrap();
    assert_eq!(avg.drift, 0.0);
}

#[test]
fn test_window_saturates_at_trend_interval() {
    let mut window = TrendWindow::new();
    for _ in 0..TREND_INTERVAL + 100 {
        window.record(1, 0);
    }
    assert_eq!(window.len(), TREND_INTERVAL);
    assert_eq!(window.averages().unwrap().sync_error, 1.0);
}

#[test]
fn test_oldest_entries_leave_the_sums() {
    let mut window = TrendWindow::new();
    for _ in 0..TREND_INTERVAL {
        window.record(0, 0);
    }
    for _ in 0..TREND_INTERVAL {
        window.record(2, 0);
    }
    // Every zero-era entry has been displaced.
    let avg = window.averages().unwrap();
    assert_eq!(avg.sync_error, 2.0);
}
