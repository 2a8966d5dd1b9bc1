//! `seq-runtime`: the bytecode VM, generational GC, async strand
//! scheduler, native module registry, and the ambient stack (config,
//! errors, diagnostics, reporting) that wraps them into a `Runtime`.
//!
//! # Modules
//!
//! - `chunk`: compiled bytecode (`Chunk`/`ChunkBuilder`/`Op`)
//! - `interpreter`: the dispatch loop
//! - `gc`: the generational tri-color collector (`Heap`)
//! - `future`: strand scheduling for `ASYNC_CALL`/`AWAIT`
//! - `registry`: native functions and built-in modules
//! - `error`: `CompileError`/`RuntimeError`/`SeqError`
//! - `config`: `RuntimeConfig`/`CompilerOptions`
//! - `runtime`: bootstrap/shutdown ordering (`Runtime`)
//! - `diagnostics`: SIGQUIT stats dump
//! - `report`: `SEQ_REPORT` at-exit summary
//! - `watchdog`: stuck-safepoint detection

pub mod chunk;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod future;
pub mod gc;
pub mod interpreter;
pub mod registry;
pub mod report;
pub mod runtime;
pub mod watchdog;

pub use chunk::{Chunk, ChunkBuilder, Op, MAX_CONSTANTS};
pub use config::{CompilerOptions, ReportFormat, RuntimeConfig};
pub use error::{CompileError, Located, RuntimeError, SeqError};
pub use future::{StrandRegistry, StrandStats};
pub use gc::{GcStats, Heap};
pub use interpreter::{Interpreter, MAX_CALL_DEPTH, STACK_CAPACITY};
pub use registry::{ModuleRegistry, NativeFn, Registry};
pub use runtime::Runtime;
