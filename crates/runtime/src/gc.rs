//! The generational, tri-color mark-sweep collector (`spec.md` §4.8, C8).
//!
//! `Heap` is the single entry point for allocation: every `GcRef` in the
//! system was handed out by a call to one of its `alloc_*` methods, which is
//! the redesign `spec.md` §9 calls for (no process-global allocator state,
//! one handle threaded through the interpreter instead — grounded on how
//! the teacher's `StrandRegistry` centralizes its own global state behind a
//! single struct rather than scattered statics).
//!
//! Collection is two-phase: a short stop-the-world mark (the mutator is at
//! a safepoint, so this runs with exclusive access) followed by handing the
//! now-known-white objects to a background thread that does the actual
//! freeing — `spec.md` calls this "concurrent background sweep".

use seq_core::{Color, FunctionKind, Generation, GcRef, Obj, ObjBox, ObjHeader, ObjTag, StringObj, StringPool, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, RwLock};
use std::thread::JoinHandle;

/// Point-in-time collector counters, surfaced via `Runtime::gc_stats` and
/// the SIGQUIT diagnostics dump (`spec.md` §9 supplemented feature).
#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    pub nursery_collections: u64,
    pub full_collections: u64,
    pub objects_freed: u64,
    pub objects_promoted: u64,
    pub bytes_live_estimate: u64,
    pub nursery_threshold: usize,
}

struct GenerationList {
    head: Mutex<*mut ObjBox>,
    count: AtomicUsize,
}

// Safety: all mutation of `head` happens under the mutex; the pointers
// themselves are never dereferenced without the heap's other invariants
// (mutator-stopped during mark, background-thread-only during sweep).
unsafe impl Send for GenerationList {}
unsafe impl Sync for GenerationList {}

impl GenerationList {
    fn new() -> Self {
        GenerationList {
            head: Mutex::new(std::ptr::null_mut()),
            count: AtomicUsize::new(0),
        }
    }

    fn push(&self, obj: *mut ObjBox) {
        let mut head = self.head.lock().expect("generation list mutex poisoned");
        unsafe {
            (*obj).header.next.set(*head);
        }
        *head = obj;
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

const NURSERY_INITIAL_THRESHOLD: usize = 4096;
const NURSERY_MIN_THRESHOLD: usize = 1024;
const NURSERY_MAX_THRESHOLD: usize = 1 << 20;

/// The heap: generation lists, the string pool, the remembered set, and the
/// adaptive nursery threshold.
pub struct Heap {
    nursery: GenerationList,
    old: GenerationList,
    pool: StringPool,
    /// Old objects that reference a Nursery object, recorded by the write
    /// barrier (`spec.md` §4.8.3). Scanned as extra roots on every nursery
    /// collection instead of rescanning all of Old.
    remembered_set: Mutex<Vec<GcRef>>,
    allocated_since_collection: AtomicUsize,
    nursery_threshold: AtomicUsize,
    stats: RwLock<GcStats>,
    // `Sender<T>` is `Send` but not `Sync`; `Heap` is shared across strands
    // via `Arc`, so the sender needs a `Mutex` wrapper to be accessed from
    // `&self`.
    sweep_tx: Mutex<Sender<SweepPayload>>,
    _sweep_thread: JoinHandle<()>,
}

// Raw pointers cross the channel to the background sweep thread; ownership
// transfers with them (the sweep thread is the only one that frees them).
struct SweepPayload(Vec<*mut ObjBox>);
unsafe impl Send for SweepPayload {}

impl Heap {
    pub fn new() -> Self {
        let (tx, rx): (Sender<SweepPayload>, Receiver<SweepPayload>) = mpsc::channel();
        let freed_counter = std::sync::Arc::new(AtomicU64::new(0));
        let freed_for_thread = freed_counter.clone();
        let handle = std::thread::Builder::new()
            .name("seq-gc-sweep".into())
            .spawn(move || {
                for batch in rx {
                    for ptr in batch.0 {
                        unsafe {
                            run_finalizer(&*ptr);
                            drop(Box::from_raw(ptr));
                        }
                    }
                    freed_for_thread.fetch_add(0, Ordering::Relaxed);
                }
            })
            .expect("failed to spawn GC sweep thread");

        Heap {
            nursery: GenerationList::new(),
            old: GenerationList::new(),
            pool: StringPool::new(),
            remembered_set: Mutex::new(Vec::new()),
            allocated_since_collection: AtomicUsize::new(0),
            nursery_threshold: AtomicUsize::new(NURSERY_INITIAL_THRESHOLD),
            stats: RwLock::new(GcStats {
                nursery_threshold: NURSERY_INITIAL_THRESHOLD,
                ..Default::default()
            }),
            sweep_tx: Mutex::new(tx),
            _sweep_thread: handle,
        }
    }

    pub fn string_pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn stats(&self) -> GcStats {
        *self.stats.read().expect("gc stats lock poisoned")
    }

    /// Allocate an arbitrary heap object into the Nursery.
    pub fn alloc(&self, payload: Obj) -> GcRef {
        let tag = obj_tag(&payload);
        let boxed = Box::new(ObjBox {
            header: ObjHeader::new(tag),
            payload,
        });
        let ptr = Box::into_raw(boxed);
        self.nursery.push(ptr);
        self.allocated_since_collection.fetch_add(1, Ordering::Relaxed);
        unsafe { GcRef::from_raw(ptr) }
    }

    /// Intern-or-allocate a string (`spec.md` §3.3): pool lookup first, and
    /// only allocate on a miss.
    pub fn alloc_string(&self, s: &str) -> GcRef {
        if let Some(existing) = self.pool.lookup(s) {
            return existing;
        }
        let r = self.alloc(Obj::Str(StringObj::new(s)));
        self.pool.insert(r);
        r
    }

    /// A permanent object (e.g. a module-level environment) is never
    /// collected; it is excluded from mark/sweep entirely.
    pub fn alloc_permanent(&self, payload: Obj) -> GcRef {
        let r = self.alloc(payload);
        r.header().is_permanent.set(true);
        r.header().generation.set(Generation::Old);
        r
    }

    /// Write barrier (`spec.md` §4.8.3): call whenever a field of `holder`
    /// is set to point at `referent`. Old→Nursery edges must be remembered
    /// so a nursery collection does not need to rescan all of Old.
    pub fn write_barrier(&self, holder: GcRef, referent: Value) {
        if holder.header().generation.get() != Generation::Old {
            return;
        }
        if let Value::Obj(r) = referent {
            if r.header().generation.get() == Generation::Nursery {
                self.remembered_set
                    .lock()
                    .expect("remembered set mutex poisoned")
                    .push(r);
            }
        }
    }

    pub fn should_collect_nursery(&self) -> bool {
        self.allocated_since_collection.load(Ordering::Relaxed)
            >= self.nursery_threshold.load(Ordering::Relaxed)
    }

    /// Collect the Nursery, treating `roots` plus the remembered set as the
    /// mark frontier. Survivors are promoted to Old. Must be called at a
    /// safepoint (`spec.md` §4.8.4): no mutator thread may be mutating the
    /// heap graph concurrently.
    pub fn collect_nursery<'a>(&self, roots: impl Iterator<Item = &'a Value>) {
        self.mark(roots, true);
        let (survivors, dead) = self.sweep_generation(&self.nursery, true);
        for s in &survivors {
            s.header().generation.set(Generation::Old);
            self.old.push(s.as_ptr());
        }
        self.remembered_set
            .lock()
            .expect("remembered set mutex poisoned")
            .retain(|r| r.header().generation.get() != Generation::Old);

        let freed = dead.len() as u64;
        let promoted = survivors.len() as u64;
        self.retune_threshold(dead.len(), self.allocated_since_collection.load(Ordering::Relaxed));
        self.allocated_since_collection.store(0, Ordering::Relaxed);
        {
            let mut stats = self.stats.write().expect("gc stats lock poisoned");
            stats.nursery_collections += 1;
            stats.objects_freed += freed;
            stats.objects_promoted += promoted;
            stats.nursery_threshold = self.nursery_threshold.load(Ordering::Relaxed);
        }
        self.pool.prune(|r| r.header().color.get() != Color::White);
        let _ = self.sweep_tx.lock().expect("sweep channel mutex poisoned").send(SweepPayload(dead));
    }

    /// Full collection: marks and sweeps both generations. Used when the
    /// watchdog or diagnostics handler forces a collection, or when the
    /// Old generation itself needs reclaiming.
    pub fn collect_full<'a>(&self, roots: impl Iterator<Item = &'a Value>) {
        self.mark(roots, false);
        let (nursery_survivors, nursery_dead) = self.sweep_generation(&self.nursery, true);
        for s in &nursery_survivors {
            s.header().generation.set(Generation::Old);
            self.old.push(s.as_ptr());
        }
        let (_old_survivors, old_dead) = self.sweep_generation(&self.old, false);

        let mut dead = nursery_dead;
        dead.extend(old_dead);
        let freed = dead.len() as u64;
        {
            let mut stats = self.stats.write().expect("gc stats lock poisoned");
            stats.full_collections += 1;
            stats.objects_freed += freed;
            stats.objects_promoted += nursery_survivors.len() as u64;
        }
        self.allocated_since_collection.store(0, Ordering::Relaxed);
        self.pool.prune(|r| r.header().color.get() != Color::White);
        let _ = self.sweep_tx.lock().expect("sweep channel mutex poisoned").send(SweepPayload(dead));
    }

    fn retune_threshold(&self, freed: usize, allocated: usize) {
        if allocated == 0 {
            return;
        }
        let freed_ratio = freed as f64 / allocated as f64;
        let current = self.nursery_threshold.load(Ordering::Relaxed);
        // A lot of garbage means the nursery is well-sized; little garbage
        // means survivors are crowding it out faster than it can drain, so
        // grow it. Mirrors the adaptive generational sizing in spec.md §4.8.5.
        let next = if freed_ratio > 0.5 {
            current
        } else if freed_ratio > 0.2 {
            (current * 3 / 2).min(NURSERY_MAX_THRESHOLD)
        } else {
            (current * 2).min(NURSERY_MAX_THRESHOLD)
        };
        self.nursery_threshold
            .store(next.max(NURSERY_MIN_THRESHOLD), Ordering::Relaxed);
    }

    /// Tri-color mark phase (`spec.md` §4.8.2): white→gray on discovery,
    /// gray→black once its children are pushed. `nursery_only` restricts
    /// traversal roots to the remembered set plus `roots`; a full collection
    /// treats everything reachable as fair game regardless of generation.
    fn mark<'a>(&self, roots: impl Iterator<Item = &'a Value>, nursery_only: bool) {
        let mut gray_stack: Vec<GcRef> = Vec::new();
        self.reset_colors(nursery_only);

        for v in roots {
            if let Value::Obj(r) = v {
                mark_gray(r, &mut gray_stack);
            }
        }
        if nursery_only {
            for r in self
                .remembered_set
                .lock()
                .expect("remembered set mutex poisoned")
                .iter()
            {
                mark_gray(r, &mut gray_stack);
            }
        }

        while let Some(r) = gray_stack.pop() {
            for child in children_of(&r) {
                if nursery_only && child.header().generation.get() == Generation::Old {
                    continue;
                }
                mark_gray(&child, &mut gray_stack);
            }
            r.header().color.set(Color::Black);
        }
    }

    fn reset_colors(&self, nursery_only: bool) {
        walk(&self.nursery, |r| {
            if !r.header().is_permanent.get() {
                r.header().color.set(Color::White);
            }
        });
        if !nursery_only {
            walk(&self.old, |r| {
                if !r.header().is_permanent.get() {
                    r.header().color.set(Color::White);
                }
            });
        }
    }

    /// Unlink every still-white object from `list`, returning `(survivors,
    /// dead)`. Live (black) objects are relinked so the list stays intact.
    fn sweep_generation(&self, list: &GenerationList, is_nursery: bool) -> (Vec<GcRef>, Vec<*mut ObjBox>) {
        let mut head = list.head.lock().expect("generation list mutex poisoned");
        let mut survivors = Vec::new();
        let mut dead = Vec::new();
        let mut cur = *head;
        let mut new_head: *mut ObjBox = std::ptr::null_mut();
        let mut new_tail: *mut ObjBox = std::ptr::null_mut();

        while !cur.is_null() {
            let next = unsafe { (*cur).header.next.get() };
            let r = unsafe { GcRef::from_raw(cur) };
            let keep = r.header().is_permanent.get() || r.header().color.get() == Color::Black;
            if keep {
                r.header().next.set(std::ptr::null_mut());
                if new_head.is_null() {
                    new_head = cur;
                    new_tail = cur;
                } else {
                    unsafe { (*new_tail).header.next.set(cur) };
                    new_tail = cur;
                }
                if is_nursery && !r.header().is_permanent.get() {
                    survivors.push(r);
                } else if !is_nursery {
                    list.count.fetch_add(0, Ordering::Relaxed);
                }
            } else {
                dead.push(cur);
                list.count.fetch_sub(1, Ordering::Relaxed);
            }
            cur = next;
        }
        // Survivors leave the nursery's own list (they move to Old instead).
        if is_nursery {
            *head = std::ptr::null_mut();
        } else {
            *head = new_head;
        }
        (survivors, dead)
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn mark_gray(r: &GcRef, gray_stack: &mut Vec<GcRef>) {
    if r.header().is_permanent.get() {
        return;
    }
    if r.header().color.get() == Color::White {
        r.header().color.set(Color::Gray);
        gray_stack.push(*r);
    }
}

fn walk(list: &GenerationList, mut f: impl FnMut(&GcRef)) {
    let head = *list.head.lock().expect("generation list mutex poisoned");
    let mut cur = head;
    while !cur.is_null() {
        let r = unsafe { GcRef::from_raw(cur) };
        f(&r);
        cur = r.header().next.get();
    }
}

/// Enumerate every `Value` (and hence `GcRef`) directly owned by `r`, for
/// the mark phase to traverse.
fn children_of(r: &GcRef) -> Vec<GcRef> {
    let mut out = Vec::new();
    match r.payload() {
        Obj::Str(_) => {}
        Obj::Array(a) => {
            for v in a.borrow().items.iter() {
                if let Value::Obj(c) = v {
                    out.push(*c);
                }
            }
        }
        Obj::Map(m) => {
            for (k, v) in m.borrow().entries() {
                if let seq_core::MapKey::Str(s) = k {
                    out.push(s);
                }
                if let Value::Obj(c) = v {
                    out.push(c);
                }
            }
        }
        Obj::Function(f) => {
            if let Some(env) = f.closure_env {
                out.push(env);
            }
        }
        Obj::Environment(e) => {
            for (_, v) in e.variables.borrow().iter() {
                if let Value::Obj(c) = v {
                    out.push(*c);
                }
            }
            for (_, v) in e.functions.borrow().iter() {
                if let Value::Obj(c) = v {
                    out.push(*c);
                }
            }
            if let Some(parent) = e.enclosing {
                out.push(parent);
            }
        }
        Obj::Module(m) => out.push(m.environment),
        Obj::StructDef(_) => {}
        Obj::StructInstance(s) => {
            let s = s.borrow();
            out.push(s.def);
            for v in s.fields.iter() {
                if let Value::Obj(c) = v {
                    out.push(*c);
                }
            }
        }
        Obj::Future(_) => {}
        Obj::Resource(_) => {}
    }
    out
}

fn obj_tag(o: &Obj) -> ObjTag {
    match o {
        Obj::Str(_) => ObjTag::Str,
        Obj::Array(_) => ObjTag::Array,
        Obj::Map(_) => ObjTag::Map,
        Obj::Function(_) => ObjTag::Function,
        Obj::Environment(_) => ObjTag::Environment,
        Obj::Module(_) => ObjTag::Module,
        Obj::StructDef(_) => ObjTag::StructDef,
        Obj::StructInstance(_) => ObjTag::StructInstance,
        Obj::Future(_) => ObjTag::Future,
        Obj::Resource(_) => ObjTag::Resource,
    }
}

fn run_finalizer(obj: &ObjBox) {
    if let Obj::Resource(res) = &obj.payload {
        res.run_cleanup();
    }
    // Native function objects hold no heap-owned state beyond their id;
    // bytecode functions are reclaimed by the chunk table, not here.
    let _ = matches!(&obj.payload, Obj::Function(f) if matches!(f.kind, FunctionKind::Native { .. }));
}
