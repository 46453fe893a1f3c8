// Pluggable cache of decompressed revision data.
//
// A `FileBuilder` consults its cache before reading a chunk and stores every
// chunk it had to read. Keys are local revision numbers, so one cache must
// only ever serve one revlog. The cache imposes no capacity policy; callers
// wanting one wrap their own type in the trait.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Memoization of raw (decompressed, possibly delta-encoded) chunk data.
pub trait DataCache {
    fn get(&mut self, rev: usize) -> Option<Arc<[u8]>>;
    fn store(&mut self, rev: usize, data: Arc<[u8]>);
}

/// The default cache: remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl DataCache for NoCache {
    fn get(&mut self, _rev: usize) -> Option<Arc<[u8]>> {
        None
    }

    fn store(&mut self, _rev: usize, _data: Arc<[u8]>) {}
}

/// Unbounded in-memory cache with hit/miss counters.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<usize, Arc<[u8]>>,
    hits: u64,
    misses: u64,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl DataCache for MemoryCache {
    fn get(&mut self, rev: usize) -> Option<Arc<[u8]>> {
        let hit = self.entries.get(&rev).cloned();
        if hit.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        hit
    }

    fn store(&mut self, rev: usize, data: Arc<[u8]>) {
        self.entries.insert(rev, data);
    }
}

// Shared caches. Single-threaded sharing goes through `Rc<RefCell<_>>`,
// cross-thread sharing through `Arc<Mutex<_>>`.

impl<C: DataCache> DataCache for Rc<RefCell<C>> {
    fn get(&mut self, rev: usize) -> Option<Arc<[u8]>> {
        self.borrow_mut().get(rev)
    }

    fn store(&mut self, rev: usize, data: Arc<[u8]>) {
        self.borrow_mut().store(rev, data);
    }
}

impl<C: DataCache> DataCache for Arc<Mutex<C>> {
    fn get(&mut self, rev: usize) -> Option<Arc<[u8]>> {
        match self.lock() {
            Ok(mut c) => c.get(rev),
            Err(poisoned) => poisoned.into_inner().get(rev),
        }
    }

    fn store(&mut self, rev: usize, data: Arc<[u8]>) {
        match self.lock() {
            Ok(mut c) => c.store(rev, data),
            Err(poisoned) => poisoned.into_inner().store(rev, data),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
