//! Per-consumer duplicate suppression within a time window.
use meshgate::gateway::dedup::DedupRegister;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn repeat_within_window_is_rejected() {
    let reg = DedupRegister::new(Duration::from_secs(600));
    let t0 = Instant::now();
    assert!(reg.see_at(7, t0));
    assert!(!reg.see_at(7, t0 + Duration::from_secs(1)));
    assert!(!reg.see_at(7, t0 + Duration::from_secs(600)));
}

#[test]
fn id_is_admitted_again_after_window() {
    let reg = DedupRegister::new(Duration::from_secs(600));
    let t0 = Instant::now();
    assert!(reg.see_at(7, t0));
    assert!(reg.see_at(7, t0 + Duration::from_secs(601)));
}

#[test]
fn registers_are_independent() {
    let work = DedupRegister::new(Duration::from_secs(600));
    let emergency = DedupRegister::new(Duration::from_secs(600));
    let t0 = Instant::now();
    assert!(work.see_at(99, t0));
    assert!(emergency.see_at(99, t0));
}

#[tokio::test]
async fn concurrent_checks_admit_exactly_once() {
    let reg = Arc::new(DedupRegister::new(Duration::from_secs(600)));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let reg = Arc::clone(&reg);
        handles.push(tokio::spawn(async move { reg.see(1234) }));
    }
    let mut admitted = 0;
    for h in handles {
        if h.await.expect("join") {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
    assert_eq!(reg.len(), 1);
}
