//! The runtime: heap, permanent objects and entry points.
//!
//! # Function Categories
//!
//! - **Permanent objects** (`objects`): type objects, type names,
//!   singletons, symbols, box caches, the small-typeof table, module
//!   globals
//! - **Values** (`values`): boxing, field reads and writes, `typeof`,
//!   `isa`, `egal`
//! - **Entry points** (`entry`): one handler per [`RuntimeFn`]
//!
//! The runtime simulates a 64-bit target: header words, type-object
//! fields and memory-object fields use the fixed offsets of
//! [`ferrule_types::abi`].

use ferrule_ir::DataLayout;
use ferrule_types::{abi, TypeId, TypeNameId, TypePool};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::InterpError;
use crate::heap::{Heap, DEFAULT_HEAP_LIMIT};

mod entry;
mod objects;
mod values;

/// One write-barrier call: `parent` was made to point at `children`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BarrierRecord {
    pub parent: u64,
    pub children: SmallVec<[u64; 2]>,
}

pub struct Runtime<'p> {
    pool: &'p TypePool,
    layout: DataLayout,
    heap: Heap,

    // === Permanent objects ===
    type_objects: FxHashMap<TypeId, u64>,
    types_by_object: FxHashMap<u64, TypeId>,
    type_names: FxHashMap<TypeNameId, u64>,
    singletons: FxHashMap<TypeId, u64>,
    symbols: FxHashMap<Box<str>, u64>,
    box_caches: FxHashMap<TypeId, u64>,
    empty_memories: FxHashMap<TypeId, u64>,
    small_typeof: Option<u64>,
    /// `TypeId` of each small tag.
    small_types: [TypeId; abi::MAX_TAGS as usize],
    ptls: Option<u64>,

    // === Observable state ===
    barriers: Vec<BarrierRecord>,
    locks: FxHashMap<u64, u32>,
}

impl<'p> Runtime<'p> {
    pub fn new(pool: &'p TypePool) -> Self {
        Self::with_heap_limit(pool, DEFAULT_HEAP_LIMIT)
    }

    pub fn with_heap_limit(pool: &'p TypePool, limit: usize) -> Self {
        let mut small_types = [TypeId::NONE; abi::MAX_TAGS as usize];
        for t in pool.ids() {
            if let Some(tag) = pool.smalltag(t) {
                if let Some(slot) = small_types.get_mut(tag as usize) {
                    *slot = t;
                }
            }
        }
        Self {
            pool,
            layout: DataLayout::new(pool.pointer_size()),
            heap: Heap::new(limit),
            type_objects: FxHashMap::default(),
            types_by_object: FxHashMap::default(),
            type_names: FxHashMap::default(),
            singletons: FxHashMap::default(),
            symbols: FxHashMap::default(),
            box_caches: FxHashMap::default(),
            empty_memories: FxHashMap::default(),
            small_typeof: None,
            small_types,
            ptls: None,
            barriers: Vec::new(),
            locks: FxHashMap::default(),
        }
    }

    pub fn pool(&self) -> &'p TypePool {
        self.pool
    }

    pub fn data_layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    /// Execution context handle passed to the allocator.
    pub fn ptls(&mut self) -> Result<u64, InterpError> {
        if let Some(p) = self.ptls {
            return Ok(p);
        }
        let p = self.heap.alloc_raw(64, 16)?;
        self.ptls = Some(p);
        Ok(p)
    }

    // === Write barriers ===

    pub fn write_barrier(&mut self, parent: u64, children: &[u64]) {
        tracing::trace!(
            parent = format_args!("{parent:#x}"),
            n = children.len(),
            "write barrier"
        );
        self.barriers.push(BarrierRecord {
            parent,
            children: children.iter().copied().collect(),
        });
    }

    /// Every barrier call so far, in order.
    pub fn barriers(&self) -> &[BarrierRecord] {
        &self.barriers
    }

    pub fn clear_barriers(&mut self) {
        self.barriers.clear();
    }

    // === Locks ===

    /// Take the lock of `obj`. Locks are recursive.
    pub fn lock_value(&mut self, obj: u64) -> Result<(), InterpError> {
        if !self.heap.is_object(obj) {
            return Err(InterpError::NotAnObject { addr: obj });
        }
        *self.locks.entry(obj).or_insert(0) += 1;
        Ok(())
    }

    pub fn unlock_value(&mut self, obj: u64) -> Result<(), InterpError> {
        match self.locks.get_mut(&obj) {
            Some(n) if *n > 1 => *n -= 1,
            Some(_) => {
                self.locks.remove(&obj);
            }
            None => return Err(InterpError::NotLocked { addr: obj }),
        }
        Ok(())
    }

    pub fn is_locked(&self, obj: u64) -> bool {
        self.locks.contains_key(&obj)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests;
