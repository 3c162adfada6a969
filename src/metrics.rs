//! Process-wide pipeline counters.
//! Cheap relaxed atomics; the gateway logs a [`snapshot`] periodically.
use std::sync::atomic::{AtomicU64, Ordering};

static RECEIVED: AtomicU64 = AtomicU64::new(0);
static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);
static DECRYPT_FAILURES: AtomicU64 = AtomicU64::new(0);
static IGNORED: AtomicU64 = AtomicU64::new(0);
static STALE: AtomicU64 = AtomicU64::new(0);
static DUPLICATES: AtomicU64 = AtomicU64::new(0);
static ROUTED_WORK: AtomicU64 = AtomicU64::new(0);
static ROUTED_EMERGENCY: AtomicU64 = AtomicU64::new(0);
static UNROUTABLE: AtomicU64 = AtomicU64::new(0);
static SENDS_OK: AtomicU64 = AtomicU64::new(0);
static SENDS_FAILED: AtomicU64 = AtomicU64::new(0);
static SEND_RETRIES: AtomicU64 = AtomicU64::new(0);

pub fn inc_received() {
    RECEIVED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_parse_failures() {
    PARSE_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_decrypt_failures() {
    DECRYPT_FAILURES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_ignored() {
    IGNORED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_stale() {
    STALE.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_duplicates() {
    DUPLICATES.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_routed_work() {
    ROUTED_WORK.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_routed_emergency() {
    ROUTED_EMERGENCY.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_unroutable() {
    UNROUTABLE.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sends_ok() {
    SENDS_OK.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_sends_failed() {
    SENDS_FAILED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_send_retries() {
    SEND_RETRIES.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub received: u64,
    pub parse_failures: u64,
    pub decrypt_failures: u64,
    pub ignored: u64,
    pub stale: u64,
    pub duplicates: u64,
    pub routed_work: u64,
    pub routed_emergency: u64,
    pub unroutable: u64,
    pub sends_ok: u64,
    pub sends_failed: u64,
    pub send_retries: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        received: RECEIVED.load(Ordering::Relaxed),
        parse_failures: PARSE_FAILURES.load(Ordering::Relaxed),
        decrypt_failures: DECRYPT_FAILURES.load(Ordering::Relaxed),
        ignored: IGNORED.load(Ordering::Relaxed),
        stale: STALE.load(Ordering::Relaxed),
        duplicates: DUPLICATES.load(Ordering::Relaxed),
        routed_work: ROUTED_WORK.load(Ordering::Relaxed),
        routed_emergency: ROUTED_EMERGENCY.load(Ordering::Relaxed),
        unroutable: UNROUTABLE.load(Ordering::Relaxed),
        sends_ok: SENDS_OK.load(Ordering::Relaxed),
        sends_failed: SENDS_FAILED.load(Ordering::Relaxed),
        send_retries: SEND_RETRIES.load(Ordering::Relaxed),
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rx={} parse_fail={} decrypt_fail={} ignored={} stale={} dup={} work={} emergency={} unroutable={} sent={} send_fail={} retries={}",
            self.received,
            self.parse_failures,
            self.decrypt_failures,
            self.ignored,
            self.stale,
            self.duplicates,
            self.routed_work,
            self.routed_emergency,
            self.unroutable,
            self.sends_ok,
            self.sends_failed,
            self.send_retries
        )
    }
}
