/*
 * Created on Wed Feb 04 2026
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2026, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! The queue-node pool: a contiguous, NUMA-placed array of slots
//! that queue-based latches draw from in compact/offset addressing mode. Allocation is
//! lock-free (fetch-add on a shared cursor); each thread keeps a small LIFO free list so
//! the common case never touches the cursor at all.

use crate::mem::{numa, CachePadded};
use crate::IndexError;
use std::alloc::Layout;
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Default pool capacity: `2^10` nodes.
pub const DEFAULT_CAPACITY: u32 = 1 << 10;
/// Nodes drawn into a thread-local slab on each refill (`OMCSOffset.h::QNODES_PER_THREAD`
/// in the original source: 4; spec's documented range is 4-16).
const SLAB_SIZE: u32 = 4;

/// Placement strategy for the pool's backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPlacement {
    /// All threads draw from pages interleaved across every NUMA node.
    Interleaved,
    /// Threads draw from pages local to the node they are currently running on.
    PerSocket,
    /// No pool: queue nodes live on the caller's stack or in thread-local storage.
    /// [`Pool::new`] still allocates (so the type stays uniform) but callers that pick
    /// this placement are expected to use [`super::handle::AddrMode::Pointer`] instead.
    Stack,
}

struct Slot<T> {
    data: MaybeUninit<T>,
    taken: AtomicBool,
}

type Elem<T> = CachePadded<std::cell::UnsafeCell<Slot<T>>>;

/// A pre-allocated array of queue nodes of type `T`.
///
/// Storage is a raw pointer rather than a `Box<[Elem<T>]>`: the backing pages come
/// from the NUMA allocator under a page-aligned, page-rounded [`Layout`], which does
/// not generally equal `Elem<T>`'s own slice layout (its alignment is `Elem<T>`'s repr
/// alignment, its size is `capacity * size_of::<Elem<T>>()` unrounded). A `Box`'s Drop
/// glue always deallocates with the latter, so adopting the allocation as a `Box` and
/// letting it drop normally would hand the global allocator a layout it was never
/// given memory under. Keeping the original [`Layout`] alongside the pointer and
/// freeing through [`numa::dealloc_pages`] in our own `Drop` impl keeps allocation and
/// deallocation looking at the same layout.
pub struct Pool<T> {
    ptr: *mut Elem<T>,
    block_layout: Layout,
    cursor: CachePadded<AtomicU32>,
    capacity: u32,
    placement: PoolPlacement,
}

// SAFETY bound: every slot is accessed either through `&self` while `taken` guards
// exclusive ownership of the slot's contents, matching the same contract the rest of
// the toolkit relies on for queue nodes (owned by exactly one thread at a time).
unsafe impl<T: Send> Send for Pool<T> {}
unsafe impl<T: Send> Sync for Pool<T> {}

thread_local! {
    static FREE_LISTS: RefCell<HashMap<usize, Vec<u32>>> = RefCell::new(HashMap::new());
}

impl<T> Pool<T> {
    /// Builds a pool of `capacity` slots with the given placement. This always
    /// allocates (even in [`PoolPlacement::Stack`] mode, where it is expected to go
    /// unused) to keep index arithmetic uniform.
    pub fn new(capacity: u32, placement: PoolPlacement) -> Arc<Self> {
        let bytes = capacity as usize * std::mem::size_of::<Elem<T>>();
        let block = match placement {
            PoolPlacement::Interleaved | PoolPlacement::Stack => numa::alloc_interleaved(bytes),
            PoolPlacement::PerSocket => {
                numa::alloc_on_node(bytes, numa::node_of_cpu(numa::current_cpu()))
            }
        };
        // the block is page-aligned (a stricter alignment than `Elem<T>` ever needs)
        // and zeroed; we reinterpret it as our slot array and immediately overwrite
        // every `taken` flag with a proper atomic value below.
        let ptr = block.ptr as *mut Elem<T>;
        let block_layout = block.layout;
        std::mem::forget(block);
        unsafe {
            // UNSAFE(@latchidx): `ptr` is a fresh, uniquely-owned, correctly-sized and
            // aligned allocation of `capacity` slots; we retain the allocator's own
            // layout in `block_layout` so `Drop` can free through it exactly, instead
            // of adopting this pointer as a `Box` whose Drop glue would compute a
            // different (mismatched) layout on its own.
            for i in 0..capacity as usize {
                let slot = &mut *(ptr.add(i) as *mut Slot<T>);
                slot.taken = AtomicBool::new(false);
            }
        }
        Arc::new(Self {
            ptr,
            block_layout,
            cursor: CachePadded::new(AtomicU32::new(0)),
            capacity,
            placement,
        })
    }

    pub fn placement(&self) -> PoolPlacement {
        self.placement
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Draws a free slot, writes `val` into it and returns its index. Each thread keeps
    /// a LIFO free list so most calls never touch the shared cursor.
    pub fn alloc(&self, val: T) -> Result<u32, IndexError> {
        let idx = FREE_LISTS
            .with(|fl| fl.borrow_mut().get_mut(&self.key()).and_then(|v| v.pop()))
            .unwrap_or(u32::MAX);
        let idx = if idx != u32::MAX {
            idx
        } else {
            self.refill_and_take()?
        };
        let slot = unsafe {
            // UNSAFE(@latchidx): `idx` came either from our own free list or a fresh
            // cursor slab, in both cases meaning no other thread holds it.
            &mut *(*self.ptr.add(idx as usize)).get()
        };
        slot.data = MaybeUninit::new(val);
        slot.taken.store(true, Ordering::Release);
        Ok(idx)
    }

    fn refill_and_take(&self) -> Result<u32, IndexError> {
        let base = self.cursor.fetch_add(SLAB_SIZE, Ordering::Relaxed);
        if base >= self.capacity {
            return Err(IndexError::PoolExhausted);
        }
        let take = base;
        let extra_end = (base + SLAB_SIZE).min(self.capacity);
        let mut extra = Vec::with_capacity((extra_end - base) as usize);
        for i in (base + 1)..extra_end {
            extra.push(i);
        }
        FREE_LISTS.with(|fl| {
            fl.borrow_mut().entry(self.key()).or_default().extend(extra);
        });
        Ok(take)
    }

    /// Returns a slot to this thread's free list. Does not zero or drop the slot's
    /// contents; callers re-initialize on next [`Pool::alloc`].
    pub fn free(&self, idx: u32) {
        let slot = unsafe {
            // UNSAFE(@latchidx): caller guarantees no concurrent reference to `idx`
            // survives this call.
            &*(*self.ptr.add(idx as usize)).get()
        };
        slot.taken.store(false, Ordering::Release);
        FREE_LISTS.with(|fl| {
            fl.borrow_mut().entry(self.key()).or_default().push(idx);
        });
    }

    /// Resolves an index back to the node it addresses.
    pub fn get<'a>(&self, idx: u32) -> &'a T {
        let slot = unsafe {
            // UNSAFE(@latchidx): see module-level contract; the index is only ever
            // handed out while its owner holds it live.
            &*(*self.ptr.add(idx as usize)).get()
        };
        unsafe {
            // UNSAFE(@latchidx): `taken` slots are always initialized by `alloc`.
            slot.data.assume_init_ref()
        }
    }

    /// Returns the pool-relative index of a node known to live inside this pool.
    ///
    /// # Safety / Panics
    /// Panics (debug) if `node` is not actually inside this pool's backing storage.
    pub fn index_of(&self, node: &T) -> u32 {
        let base = self.ptr as usize;
        let addr = node as *const T as usize;
        debug_assert!(addr >= base, "pool: address not in this pool");
        let stride = std::mem::size_of::<Elem<T>>();
        ((addr - base) / stride) as u32
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        unsafe {
            // UNSAFE(@latchidx): `ptr`/`block_layout` are exactly the pointer and
            // layout `new` received from the NUMA allocator; nothing outlives this
            // `Pool` holding a reference into its storage.
            numa::dealloc_pages(&numa::NumaBlock {
                ptr: self.ptr as *mut u8,
                layout: self.block_layout,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_free_roundtrip() {
        let pool: Arc<Pool<u64>> = Pool::new(64, PoolPlacement::Interleaved);
        let idx = pool.alloc(42).unwrap();
        assert_eq!(*pool.get(idx), 42);
        pool.free(idx);
        let idx2 = pool.alloc(7).unwrap();
        assert_eq!(*pool.get(idx2), 7);
    }

    #[test]
    fn exhaustion_is_detected() {
        let pool: Arc<Pool<u64>> = Pool::new(4, PoolPlacement::Interleaved);
        let mut got = vec![];
        for i in 0..4 {
            got.push(pool.alloc(i).unwrap());
        }
        assert!(matches!(pool.alloc(99), Err(IndexError::PoolExhausted)));
    }

    #[test]
    fn index_of_matches_alloc() {
        let pool: Arc<Pool<u64>> = Pool::new(16, PoolPlacement::PerSocket);
        let idx = pool.alloc(5).unwrap();
        let node = pool.get(idx);
        assert_eq!(pool.index_of(node), idx);
    }
}
