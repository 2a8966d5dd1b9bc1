//! Bootstrap and shutdown ordering (`spec.md` §6, C11).
//!
//! `Runtime::new` establishes, in order: the heap and string pool, the
//! permanent global environment, the native module registry, the strand
//! registry, and (opt-in) the diagnostics/watchdog background threads.
//! `Runtime::shutdown` reverses it: stop accepting new strands, drain the
//! ones in flight, then let the heap and its background sweep thread drop.
//! Getting this ordering right matters because later stages borrow the
//! ones before them (the module registry allocates through the heap; the
//! watchdog reads the strand registry) — grounded on the teacher's own
//! `Runtime`-equivalent bring-up in `crates/runtime/src/lib.rs`, which
//! documents the same "allocate foundation, then layer services on top"
//! shape.

use crate::chunk::Chunk;
use crate::config::RuntimeConfig;
use crate::error::SeqError;
use crate::future::StrandRegistry;
use crate::gc::{GcStats, Heap};
use crate::interpreter::Interpreter;
use crate::registry::ModuleRegistry;
use seq_core::{EnvironmentObj, GcRef, Obj, Value};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

pub struct Runtime {
    pub config: RuntimeConfig,
    pub heap: Arc<Heap>,
    pub globals: GcRef,
    pub modules: Arc<ModuleRegistry>,
    pub strands: Arc<StrandRegistry>,
    chunks: Rc<Vec<Arc<Chunk>>>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let heap = Arc::new(Heap::new());
        let globals = heap.alloc_permanent(Obj::Environment(EnvironmentObj::new(None)));
        let alloc = |o: Obj| heap.alloc_permanent(o);
        let modules = Arc::new(ModuleRegistry::bootstrap(&alloc));
        modules.install_into_globals(globals);
        let strands = Arc::new(StrandRegistry::new());

        crate::diagnostics::install(heap.clone(), strands.clone());
        if config.watchdog_secs > 0 {
            crate::watchdog::spawn(strands.clone(), Duration::from_secs(config.watchdog_secs));
        }

        Runtime { config, heap, globals, modules, strands, chunks: Rc::new(Vec::new()) }
    }

    /// Install the compiled chunk table. Called once, after `seqc` finishes
    /// codegen; chunk 0 is always the script's top level (`spec.md` §4.1).
    pub fn load_chunks(&mut self, chunks: Vec<Chunk>) {
        self.chunks = Rc::new(chunks.into_iter().map(Arc::new).collect());
    }

    /// Run the top-level chunk to completion.
    pub fn execute(&self) -> Result<Value, SeqError> {
        let entry = self.chunks.first().expect("Runtime::execute called before load_chunks").clone();
        let mut interp = Interpreter::with_strands(
            self.globals,
            self.heap.clone(),
            self.modules.clone(),
            self.chunks.clone(),
            self.strands.clone(),
        );
        interp.run(entry).map_err(SeqError::from)
    }

    pub fn gc_stats(&self) -> GcStats {
        self.heap.stats()
    }

    /// Drain in-flight strands and optionally print the `SEQ_REPORT`
    /// summary. Must run before `Runtime` itself drops, so no strand is
    /// left reading from a heap that is about to go away.
    pub fn shutdown(self) {
        self.strands.wait_for_drain();
        if std::env::var("SEQ_REPORT").is_ok() {
            crate::report::maybe_print(self.config.report_format, self.heap.stats(), self.strands.stats());
        }
    }
}
