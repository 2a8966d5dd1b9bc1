//! Stuck-safepoint watchdog (`spec.md` §6 ambient stack, supplemented
//! feature).
//!
//! Grounded on the teacher's `watchdog.rs` (`examples/navicore-cem3`),
//! which polls its strand registry on an interval and warns when a
//! strand's counters stop moving. This is a heuristic, not a precise
//! detector: it watches whether the *active* strand count changes across
//! a poll interval while strands remain outstanding. `SEQ_WATCHDOG_SECS=0`
//! disables it entirely.

use crate::future::StrandRegistry;
use std::sync::Arc;
use std::time::Duration;

/// Spawn the watchdog thread. Returns immediately.
pub fn spawn(strands: Arc<StrandRegistry>, interval: Duration) {
    if interval.is_zero() {
        return;
    }
    std::thread::Builder::new()
        .name("seq-watchdog".into())
        .spawn(move || run(&strands, interval))
        .expect("failed to spawn watchdog thread");
}

fn run(strands: &StrandRegistry, interval: Duration) {
    let mut last_completed = strands.stats().total_completed;
    loop {
        std::thread::sleep(interval);
        let stats = strands.stats();
        if stats.active > 0 && stats.total_completed == last_completed {
            eprintln!(
                "seq: watchdog: {} strand(s) active with no completions in the last {:?}",
                stats.active, interval
            );
        }
        last_completed = stats.total_completed;
    }
}
