//! SIGQUIT diagnostics dump (`spec.md` §6 ambient stack, "diagnostics"
//! feature).
//!
//! Installs a handler so `kill -QUIT <pid>` (or Ctrl-\) dumps GC and strand
//! statistics to stderr without stopping the process — grounded on the
//! teacher's signal-based debugging convention (`examples/navicore-cem3`
//! registers its own Unix signal handlers via `signal-hook` for production
//! introspection). Only compiled on Unix, since `signal-hook`'s SIGQUIT
//! support is Unix-only.

#[cfg(all(unix, feature = "diagnostics"))]
mod imp {
    use crate::gc::Heap;
    use crate::future::StrandRegistry;
    use signal_hook::consts::SIGQUIT;
    use signal_hook::iterator::Signals;
    use std::sync::Arc;
    use std::thread;

    /// Spawn the background thread that waits for `SIGQUIT` and prints a
    /// snapshot. Returns immediately; the thread runs for the process
    /// lifetime.
    pub fn install(heap: Arc<Heap>, strands: Arc<StrandRegistry>) {
        let mut signals = match Signals::new([SIGQUIT]) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("seq: failed to install SIGQUIT handler: {e}");
                return;
            }
        };
        thread::Builder::new()
            .name("seq-diagnostics".into())
            .spawn(move || {
                for _ in signals.forever() {
                    dump(&heap, &strands);
                }
            })
            .expect("failed to spawn diagnostics thread");
    }

    fn dump(heap: &Heap, strands: &StrandRegistry) {
        let gc = heap.stats();
        let s = strands.stats();
        eprintln!("--- seq diagnostics (SIGQUIT) ---");
        eprintln!(
            "gc: nursery_collections={} full_collections={} freed={} promoted={} threshold={}",
            gc.nursery_collections, gc.full_collections, gc.objects_freed, gc.objects_promoted, gc.nursery_threshold
        );
        eprintln!(
            "strands: active={} spawned={} completed={} peak={}",
            s.active, s.total_spawned, s.total_completed, s.peak
        );
    }
}

#[cfg(all(unix, feature = "diagnostics"))]
pub use imp::install;

/// No-op on platforms/feature combinations without the signal handler.
#[cfg(not(all(unix, feature = "diagnostics")))]
pub fn install(_heap: std::sync::Arc<crate::gc::Heap>, _strands: std::sync::Arc<crate::future::StrandRegistry>) {}
