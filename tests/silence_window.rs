//! Cooldown windows used by test acks, weather and the emergency guardian.
use meshgate::gateway::silence::SilenceWindow;
use std::time::Duration;
use tokio::time::Instant;

#[test]
fn first_trigger_opens_window() {
    let w = SilenceWindow::new(Duration::from_secs(180));
    let t0 = Instant::now();
    assert!(!w.is_silenced(t0));
    assert!(w.check_and_maybe_trigger(t0));
    assert!(w.is_silenced(t0 + Duration::from_secs(1)));
    assert_eq!(w.silence_until(), Some(t0 + Duration::from_secs(180)));
}

#[test]
fn refused_trigger_does_not_extend_deadline() {
    let w = SilenceWindow::new(Duration::from_secs(60));
    let t0 = Instant::now();
    assert!(w.check_and_maybe_trigger(t0));
    assert!(!w.check_and_maybe_trigger(t0 + Duration::from_secs(59)));
    assert_eq!(w.silence_until(), Some(t0 + Duration::from_secs(60)));
    assert!(w.check_and_maybe_trigger(t0 + Duration::from_secs(60)));
    assert_eq!(w.silence_until(), Some(t0 + Duration::from_secs(120)));
}

#[test]
fn zero_period_never_silences() {
    let w = SilenceWindow::new(Duration::ZERO);
    let t0 = Instant::now();
    assert!(w.check_and_maybe_trigger(t0));
    assert!(w.check_and_maybe_trigger(t0));
    assert_eq!(w.period(), Duration::ZERO);
}
