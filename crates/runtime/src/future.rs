//! Strand scheduling for `ASYNC_CALL`/`AWAIT` (`spec.md` §4.9, C9).
//!
//! A "strand" is one `may` green thread running its own `Interpreter` over
//! a fresh call stack, sharing the parent `Runtime`'s heap, string pool,
//! and global environment (`spec.md` §4.9: "spawned work sees the same
//! object graph"). `StrandRegistry` tracks how many are alive, grounded on
//! the teacher's `scheduler::StrandRegistry` (`examples/navicore-cem3`),
//! which keeps the same counters for the same reason: so diagnostics and
//! graceful shutdown can tell live work from finished work without
//! scanning thread state.

use seq_core::{FutureObj, GcRef, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// Process-wide (well: per-`Runtime`) strand bookkeeping.
#[derive(Default)]
pub struct StrandRegistry {
    active: AtomicUsize,
    total_spawned: AtomicUsize,
    total_completed: AtomicUsize,
    peak: AtomicUsize,
    shutdown_mutex: Mutex<()>,
    shutdown_condvar: Condvar,
}

pub struct StrandStats {
    pub active: usize,
    pub total_spawned: usize,
    pub total_completed: usize,
    pub peak: usize,
}

impl StrandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn on_spawn(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.total_spawned.fetch_add(1, Ordering::SeqCst);
        self.peak.fetch_max(active, Ordering::SeqCst);
    }

    fn on_complete(&self) {
        let _guard = self.shutdown_mutex.lock().expect("strand shutdown mutex poisoned");
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.total_completed.fetch_add(1, Ordering::SeqCst);
        self.shutdown_condvar.notify_all();
    }

    pub fn stats(&self) -> StrandStats {
        StrandStats {
            active: self.active.load(Ordering::SeqCst),
            total_spawned: self.total_spawned.load(Ordering::SeqCst),
            total_completed: self.total_completed.load(Ordering::SeqCst),
            peak: self.peak.load(Ordering::SeqCst),
        }
    }

    /// Block until every spawned strand has completed. Called during
    /// `Runtime::shutdown` (`spec.md` C11) so no strand outlives the heap
    /// it reads from.
    pub fn wait_for_drain(&self) {
        let mut guard = self.shutdown_mutex.lock().expect("strand shutdown mutex poisoned");
        while self.active.load(Ordering::SeqCst) > 0 {
            guard = self
                .shutdown_condvar
                .wait(guard)
                .expect("strand shutdown condvar poisoned");
        }
        drop(guard);
    }
}

/// Spawn a strand that runs `body` on a `may` coroutine, resolving `future`
/// with its result and updating `registry`'s counters on entry/exit
/// (`spec.md` §4.9: `ASYNC_CALL` never blocks the caller).
///
/// `body` must be `Send` because it captures only `GcRef`s/`Value`s — safe
/// to send across strands under the invariant documented on `GcRef`.
pub fn spawn_strand<F>(registry: Arc<StrandRegistry>, future: GcRef, body: F)
where
    F: FnOnce() -> Value + Send + 'static,
{
    registry.on_spawn();
    may::go!(move || {
        let result = body();
        if let Some(f) = future.as_future() {
            f.resolve(result);
        }
        registry.on_complete();
    });
}

/// Block the calling strand until `future` resolves, returning its value.
/// This is the `AWAIT` opcode's implementation (`spec.md` §4.6): the
/// *calling OS/green thread* parks, but since strands are `may` coroutines
/// multiplexed onto a small worker pool, other strands keep running.
pub fn await_future(future: &FutureObj) -> Value {
    future.await_blocking()
}
