//! The interning pool (`spec.md` §3.3, C2).
//!
//! The pool never owns objects — it holds non-owning `GcRef`s into objects
//! the heap allocated, bucketed by FNV-1a hash. `lookup` is consulted before
//! every string allocation; `prune` is called by the sweep phase to drop
//! entries whose object didn't survive. Protected by a single mutex: string
//! creation can happen from an ASYNC_CALL worker thread as well as the main
//! interpreter loop (`spec.md` §4.3).

use crate::object::{fnv1a, GcRef};
use std::sync::Mutex;

/// FNV-1a bucket-chained intern table.
pub struct StringPool {
    buckets: Mutex<Vec<Vec<GcRef>>>,
}

const DEFAULT_POOL_BUCKETS: usize = 256;

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        StringPool {
            buckets: Mutex::new((0..DEFAULT_POOL_BUCKETS).map(|_| Vec::new()).collect()),
        }
    }

    fn index_for(len: usize, hash: u64) -> usize {
        (hash as usize) & (len - 1)
    }

    /// Look up an already-interned string by its bytes. Returns `None` if
    /// no matching entry exists — the caller should then allocate and
    /// `insert`.
    pub fn lookup(&self, s: &str) -> Option<GcRef> {
        let hash = fnv1a(s.as_bytes());
        let buckets = self.buckets.lock().expect("string pool mutex poisoned");
        let idx = Self::index_for(buckets.len(), hash);
        buckets[idx]
            .iter()
            .find(|r| r.as_string().map(|so| so.as_str()) == Some(s))
            .copied()
    }

    /// Record a freshly-allocated string object. The caller is responsible
    /// for having checked `lookup` first — this does not deduplicate.
    pub fn insert(&self, r: GcRef) {
        let so = r.as_string().expect("StringPool::insert given a non-string GcRef");
        let hash = so.hash;
        let mut buckets = self.buckets.lock().expect("string pool mutex poisoned");
        let idx = Self::index_for(buckets.len(), hash);
        buckets[idx].push(r);
    }

    /// Drop every entry for which `is_alive` returns false. Called once per
    /// sweep, while the mutator is stopped, so no separate locking
    /// discipline is needed against concurrent `lookup`/`insert` calls.
    pub fn prune(&self, mut is_alive: impl FnMut(GcRef) -> bool) {
        let mut buckets = self.buckets.lock().expect("string pool mutex poisoned");
        for bucket in buckets.iter_mut() {
            bucket.retain(|r| is_alive(*r));
        }
    }

    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .expect("string pool mutex poisoned")
            .iter()
            .map(|b| b.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjBox, ObjHeader, ObjTag, Obj, StringObj};

    fn leak_string(s: &str) -> GcRef {
        let b = Box::new(ObjBox {
            header: ObjHeader::new(ObjTag::Str),
            payload: Obj::Str(StringObj::new(s)),
        });
        unsafe { GcRef::from_raw(Box::into_raw(b)) }
    }

    #[test]
    fn lookup_miss_then_hit() {
        let pool = StringPool::new();
        assert!(pool.lookup("hello").is_none());
        let r = leak_string("hello");
        pool.insert(r);
        let found = pool.lookup("hello").expect("should find interned string");
        assert_eq!(found.as_string().unwrap().as_str(), "hello");
    }

    #[test]
    fn prune_drops_dead_entries() {
        let pool = StringPool::new();
        let r = leak_string("dead");
        pool.insert(r);
        assert_eq!(pool.len(), 1);
        pool.prune(|_| false);
        assert!(pool.is_empty());
    }
}
