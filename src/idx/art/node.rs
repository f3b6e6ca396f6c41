/*
 * Created on Fri Feb 06 2026
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

//! ART node layout: a common header (packed kind/obsolete/prefix-length,
//! child count, hotness, latch) shared by four variants (N4/N16/N48/N256), dispatched
//! on the header's 2-bit kind tag rather than through virtual dispatch.

use crate::sync::OptLock;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

pub const INLINE_PREFIX_LEN: usize = 15;

const KIND_SHIFT: u32 = 30;
const OBSOLETE_BIT: u32 = 1 << 29;
const PREFIX_LEN_MASK: u32 = (1 << 29) - 1;

/// The 2-bit kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    N4 = 0,
    N16 = 1,
    N48 = 2,
    N256 = 3,
}

impl NodeKind {
    fn from_tag(tag: u32) -> Self {
        match tag {
            0 => NodeKind::N4,
            1 => NodeKind::N16,
            2 => NodeKind::N48,
            _ => NodeKind::N256,
        }
    }
}

/// Fields common to every node variant. Always the first field of a
/// variant struct (`#[repr(C)]`) so a `*const NodeHeader` can be reinterpreted as the
/// concrete variant once the kind tag has been read.
#[repr(C)]
pub struct NodeHeader {
    packed: AtomicU32,
    child_count: AtomicU8,
    hotness: AtomicU32,
    prefix: UnsafeCell<[u8; INLINE_PREFIX_LEN]>,
    pub latch: OptLock,
}

// SAFETY bound: `prefix` is only ever written while `latch` is held exclusively, and
// optimistic readers that load it without the latch always re-validate against a
// version captured before the read, matching the rest of the optimistic lock coupling
// discipline used throughout the ART core.
unsafe impl Send for NodeHeader {}
unsafe impl Sync for NodeHeader {}

impl NodeHeader {
    fn new(kind: NodeKind) -> Self {
        let packed = (kind as u32) << KIND_SHIFT;
        Self {
            packed: AtomicU32::new(packed),
            child_count: AtomicU8::new(0),
            hotness: AtomicU32::new(0),
            prefix: UnsafeCell::new([0u8; INLINE_PREFIX_LEN]),
            latch: OptLock::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::from_tag(self.packed.load(Ordering::Relaxed) >> KIND_SHIFT)
    }

    pub fn is_obsolete(&self) -> bool {
        self.packed.load(Ordering::Relaxed) & OBSOLETE_BIT != 0
    }

    pub fn mark_obsolete(&self) {
        self.packed.fetch_or(OBSOLETE_BIT, Ordering::Release);
    }

    pub fn prefix_len(&self) -> usize {
        (self.packed.load(Ordering::Relaxed) & PREFIX_LEN_MASK) as usize
    }

    pub fn set_prefix_len(&self, len: usize) {
        let len = len.min(PREFIX_LEN_MASK as usize) as u32;
        let mut cur = self.packed.load(Ordering::Relaxed);
        loop {
            let next = (cur & !PREFIX_LEN_MASK) | len;
            match self.packed.compare_exchange_weak(
                cur,
                next,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(observed) => cur = observed,
            }
        }
    }

    /// Reads the inline prefix bytes. Only safe to trust the result if the caller
    /// re-validates the node's latch version afterward (optimistic reader) or already
    /// holds the latch exclusively (writer).
    pub fn prefix(&self) -> [u8; INLINE_PREFIX_LEN] {
        unsafe {
            // UNSAFE(@latchidx): benign-race read under the OLC discipline; every
            // caller either holds `latch` exclusively or validates afterward.
            *self.prefix.get()
        }
    }

    /// Overwrites the inline prefix. Caller must hold `latch` exclusively. Bytes past
    /// `INLINE_PREFIX_LEN` are not stored inline but the full length is still recorded;
    /// resolving them requires a descendant-leaf fetch (see `super::any_descendant_leaf`).
    pub fn set_prefix(&self, bytes: &[u8]) {
        self.set_prefix_with_len(bytes, bytes.len());
    }

    /// Overwrites the inline prefix bytes and sets the logical prefix length
    /// independently of how many bytes were actually copied in. Used when carrying an
    /// already-overflowing prefix across a grow/shrink: only the first
    /// `INLINE_PREFIX_LEN` bytes are on hand to copy, but the original logical length
    /// must survive unchanged.
    pub fn set_prefix_with_len(&self, inline_bytes: &[u8], logical_len: usize) {
        let n = inline_bytes.len().min(INLINE_PREFIX_LEN);
        unsafe {
            // UNSAFE(@latchidx): caller holds the latch exclusively (write-side only).
            let buf = &mut *self.prefix.get();
            buf[..n].copy_from_slice(&inline_bytes[..n]);
        }
        self.set_prefix_len(logical_len);
    }

    pub fn child_count(&self) -> u8 {
        self.child_count.load(Ordering::Relaxed)
    }

    pub fn set_child_count(&self, n: u8) {
        self.child_count.store(n, Ordering::Relaxed);
    }

    pub fn inc_child_count(&self) {
        self.child_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec_child_count(&self) {
        self.child_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Samples the expansion heuristic:
    /// increments hotness with probability `kSampleProb`; returns true once the
    /// counter crosses `kHotnessThreshold`, resetting it so the one-off chain is
    /// built only once per hot period.
    pub fn sample_hotness(&self, roll: u32) -> bool {
        if roll >= super::HOTNESS_SAMPLE_CUTOFF {
            return false;
        }
        let prev = self.hotness.fetch_add(1, Ordering::Relaxed);
        if prev + 1 >= super::HOTNESS_THRESHOLD {
            self.hotness.store(0, Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

#[repr(C)]
pub struct Node4 {
    pub header: NodeHeader,
    pub keys: [u8; 4],
    pub children: [AtomicU64; 4],
}

#[repr(C)]
pub struct Node16 {
    pub header: NodeHeader,
    pub keys: [u8; 16],
    pub children: [AtomicU64; 16],
}

/// Empty-slot sentinel for [`Node48::child_index`].
pub const N48_EMPTY: u8 = 48;

#[repr(C)]
pub struct Node48 {
    pub header: NodeHeader,
    pub child_index: [u8; 256],
    pub children: [AtomicU64; 48],
    /// Stack of slot indices in `children` not currently referenced by any byte in
    /// `child_index`. `free_top` entries starting at index 0 are valid; popping takes
    /// from the top rather than handing out `child_count` so a slot vacated by
    /// `remove_child` gets reused instead of leaving a hole `add_child` would otherwise
    /// paper over by writing past it.
    free_slots: UnsafeCell<[u8; 48]>,
    free_top: AtomicU8,
}

#[repr(C)]
pub struct Node256 {
    pub header: NodeHeader,
    pub children: [AtomicU64; 256],
}

fn new_children<const N: usize>() -> [AtomicU64; N] {
    std::array::from_fn(|_| AtomicU64::new(0))
}

impl Node4 {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(NodeKind::N4),
            keys: [0; 4],
            children: new_children(),
        })
    }
}

impl Node16 {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(NodeKind::N16),
            keys: [0; 16],
            children: new_children(),
        })
    }
}

impl Node48 {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(NodeKind::N48),
            child_index: [N48_EMPTY; 256],
            children: new_children(),
            free_slots: UnsafeCell::new(std::array::from_fn(|i| i as u8)),
            free_top: AtomicU8::new(48),
        })
    }

    /// Reinitializes the free-slot stack after `count` slots have been populated
    /// densely from index 0 by a caller that bypassed `add_child` (`grow`/`shrink`
    /// copy entries straight into `children` rather than going through it).
    fn mark_dense_occupied(&mut self, count: u8) {
        let free = 48 - count;
        let slots = self.free_slots.get_mut();
        for (i, slot) in slots.iter_mut().take(free as usize).enumerate() {
            *slot = count + i as u8;
        }
        self.free_top.store(free, Ordering::Relaxed);
    }
}

impl Node256 {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(NodeKind::N256),
            children: new_children(),
        })
    }
}

/// Reinterprets a non-leaf child handle as a node header pointer.
pub fn node_ptr(handle: u64) -> *const NodeHeader {
    handle as *const NodeHeader
}

/// Encodes a node pointer as a child handle.
pub fn encode_node(ptr: *const NodeHeader) -> u64 {
    ptr as u64
}

/// Overwrites an existing child slot in place (byte unchanged, count unchanged). Used
/// to splice in a replacement subtree without touching the node's fullness.
///
/// # Safety
/// `header` must point at a live node that already has a child stored under `byte`.
pub unsafe fn update_child(header: *const NodeHeader, byte: u8, new_child: u64) {
    match (*header).kind() {
        NodeKind::N4 => {
            let n: &Node4 = header_as(header);
            let count = n.header.child_count() as usize;
            for i in 0..count {
                if n.keys[i] == byte {
                    n.children[i].store(new_child, Ordering::Release);
                    return;
                }
            }
        }
        NodeKind::N16 => {
            let n: &Node16 = header_as(header);
            let count = n.header.child_count() as usize;
            for i in 0..count {
                if n.keys[i] == byte {
                    n.children[i].store(new_child, Ordering::Release);
                    return;
                }
            }
        }
        NodeKind::N48 => {
            let n: &Node48 = header_as(header);
            let slot = n.child_index[byte as usize];
            if slot != N48_EMPTY {
                n.children[slot as usize].store(new_child, Ordering::Release);
            }
        }
        NodeKind::N256 => {
            let n: &Node256 = header_as(header);
            n.children[byte as usize].store(new_child, Ordering::Release);
        }
    }
}

/// Casts a node header pointer down to its concrete variant. Caller must already have
/// read `header.kind()` and know it matches.
///
/// # Safety
/// `header` must point at a live node whose kind tag is the variant being cast to.
pub unsafe fn header_as<'a, T>(header: *const NodeHeader) -> &'a T {
    &*(header as *const T)
}

/// Finds the child stored under `byte`, returning `0` (no child) if absent. Dispatches
/// on the header's kind tag.
///
/// # Safety
/// `header` must point at a live, fully-initialized node.
pub unsafe fn find_child(header: *const NodeHeader, byte: u8) -> u64 {
    match (*header).kind() {
        NodeKind::N4 => {
            let n: &Node4 = header_as(header);
            let count = n.header.child_count() as usize;
            for i in 0..count {
                if n.keys[i] == byte {
                    return n.children[i].load(Ordering::Acquire);
                }
            }
            0
        }
        NodeKind::N16 => {
            let n: &Node16 = header_as(header);
            let count = n.header.child_count() as usize;
            for i in 0..count {
                if n.keys[i] == byte {
                    return n.children[i].load(Ordering::Acquire);
                }
            }
            0
        }
        NodeKind::N48 => {
            let n: &Node48 = header_as(header);
            let slot = n.child_index[byte as usize];
            if slot == N48_EMPTY {
                0
            } else {
                n.children[slot as usize].load(Ordering::Acquire)
            }
        }
        NodeKind::N256 => {
            let n: &Node256 = header_as(header);
            n.children[byte as usize].load(Ordering::Acquire)
        }
    }
}

/// True if the node cannot accept another child without growing.
///
/// # Safety
/// `header` must point at a live, fully-initialized node.
pub unsafe fn is_full(header: *const NodeHeader) -> bool {
    match (*header).kind() {
        NodeKind::N4 => (*header).child_count() >= 4,
        NodeKind::N16 => (*header).child_count() >= 16,
        NodeKind::N48 => (*header).child_count() >= 48,
        NodeKind::N256 => false,
    }
}

/// Underflow thresholds mirror the growth thresholds in reverse.
///
/// # Safety
/// `header` must point at a live, fully-initialized node.
pub unsafe fn is_underfull(header: *const NodeHeader) -> bool {
    match (*header).kind() {
        NodeKind::N4 => false,
        NodeKind::N16 => (*header).child_count() <= 4,
        NodeKind::N48 => (*header).child_count() <= 16,
        NodeKind::N256 => (*header).child_count() <= 48,
    }
}

/// Inserts `(byte, child)` into a node that is known not to be full yet. Caller holds
/// the node's latch exclusively.
///
/// # Safety
/// `header` must point at a live node of matching variant with room for one more child.
pub unsafe fn add_child(header: *const NodeHeader, byte: u8, child: u64) {
    match (*header).kind() {
        NodeKind::N4 => {
            let n: &Node4 = header_as(header);
            let count = n.header.child_count() as usize;
            n.keys[count] = byte;
            n.children[count].store(child, Ordering::Release);
            n.header.inc_child_count();
        }
        NodeKind::N16 => {
            let n: &Node16 = header_as(header);
            let count = n.header.child_count() as usize;
            n.keys[count] = byte;
            n.children[count].store(child, Ordering::Release);
            n.header.inc_child_count();
        }
        NodeKind::N48 => {
            let n: &Node48 = header_as(header);
            let top = n.free_top.load(Ordering::Relaxed);
            debug_assert!(top > 0, "art: N48 add_child called on a full node");
            let slot_idx = top - 1;
            let slot = (*n.free_slots.get())[slot_idx as usize];
            n.free_top.store(slot_idx, Ordering::Relaxed);
            n.children[slot as usize].store(child, Ordering::Release);
            n.child_index[byte as usize] = slot;
            n.header.inc_child_count();
        }
        NodeKind::N256 => {
            let n: &Node256 = header_as(header);
            n.children[byte as usize].store(child, Ordering::Release);
            n.header.inc_child_count();
        }
    }
}

/// Removes the child stored under `byte`, if any. Caller holds the node's latch
/// exclusively.
///
/// # Safety
/// `header` must point at a live, fully-initialized node.
pub unsafe fn remove_child(header: *const NodeHeader, byte: u8) {
    match (*header).kind() {
        NodeKind::N4 => {
            let n: &Node4 = header_as(header);
            let count = n.header.child_count() as usize;
            for i in 0..count {
                if n.keys[i] == byte {
                    let last = count - 1;
                    n.keys[i] = n.keys[last];
                    let moved = n.children[last].load(Ordering::Relaxed);
                    n.children[i].store(moved, Ordering::Release);
                    n.header.dec_child_count();
                    return;
                }
            }
        }
        NodeKind::N16 => {
            let n: &Node16 = header_as(header);
            let count = n.header.child_count() as usize;
            for i in 0..count {
                if n.keys[i] == byte {
                    let last = count - 1;
                    n.keys[i] = n.keys[last];
                    let moved = n.children[last].load(Ordering::Relaxed);
                    n.children[i].store(moved, Ordering::Release);
                    n.header.dec_child_count();
                    return;
                }
            }
        }
        NodeKind::N48 => {
            let n: &Node48 = header_as(header);
            let slot = n.child_index[byte as usize];
            if slot != N48_EMPTY {
                n.child_index[byte as usize] = N48_EMPTY;
                let top = n.free_top.load(Ordering::Relaxed);
                (*n.free_slots.get())[top as usize] = slot;
                n.free_top.store(top + 1, Ordering::Relaxed);
                n.header.dec_child_count();
            }
        }
        NodeKind::N256 => {
            let n: &Node256 = header_as(header);
            n.children[byte as usize].store(0, Ordering::Release);
            n.header.dec_child_count();
        }
    }
}

/// Returns `(key_byte, child_handle)` pairs in ascending key-byte order. Used by
/// range scan and by the single-surviving-child splice in remove.
///
/// # Safety
/// `header` must point at a live, fully-initialized node.
pub unsafe fn sorted_children(header: *const NodeHeader) -> Vec<(u8, u64)> {
    match (*header).kind() {
        NodeKind::N4 => {
            let n: &Node4 = header_as(header);
            let count = n.header.child_count() as usize;
            let mut v: Vec<(u8, u64)> = (0..count)
                .map(|i| (n.keys[i], n.children[i].load(Ordering::Acquire)))
                .collect();
            v.sort_unstable_by_key(|(k, _)| *k);
            v
        }
        NodeKind::N16 => {
            let n: &Node16 = header_as(header);
            let count = n.header.child_count() as usize;
            let mut v: Vec<(u8, u64)> = (0..count)
                .map(|i| (n.keys[i], n.children[i].load(Ordering::Acquire)))
                .collect();
            v.sort_unstable_by_key(|(k, _)| *k);
            v
        }
        NodeKind::N48 => {
            let n: &Node48 = header_as(header);
            (0..256u16)
                .filter_map(|b| {
                    let slot = n.child_index[b as usize];
                    (slot != N48_EMPTY)
                        .then(|| (b as u8, n.children[slot as usize].load(Ordering::Acquire)))
                })
                .collect()
        }
        NodeKind::N256 => {
            let n: &Node256 = header_as(header);
            (0..256u16)
                .filter_map(|b| {
                    let c = n.children[b as usize].load(Ordering::Acquire);
                    (c != 0).then(|| (b as u8, c))
                })
                .collect()
        }
    }
}

/// Grows a node one kind up (N4→N16→N48→N256), copying every entry across field by
/// field into the larger layout.
///
/// # Safety
/// `header` must point at a live, non-obsolete, full node.
pub unsafe fn grow(header: *const NodeHeader) -> *mut NodeHeader {
    let entries = sorted_children(header);
    let prefix = (*header).prefix();
    let prefix_len = (*header).prefix_len();
    match (*header).kind() {
        NodeKind::N4 => {
            let mut bigger = Node16::new();
            bigger
                .header
                .set_prefix_with_len(&prefix[..prefix_len.min(INLINE_PREFIX_LEN)], prefix_len);
            for (i, (k, c)) in entries.into_iter().enumerate() {
                bigger.keys[i] = k;
                bigger.children[i].store(c, Ordering::Relaxed);
            }
            bigger.header.set_child_count((*header).child_count());
            Box::into_raw(bigger) as *mut NodeHeader
        }
        NodeKind::N16 => {
            let mut bigger = Node48::new();
            bigger
                .header
                .set_prefix_with_len(&prefix[..prefix_len.min(INLINE_PREFIX_LEN)], prefix_len);
            let count = entries.len();
            for (i, (k, c)) in entries.into_iter().enumerate() {
                bigger.children[i].store(c, Ordering::Relaxed);
                bigger.child_index[k as usize] = i as u8;
            }
            bigger.header.set_child_count((*header).child_count());
            bigger.mark_dense_occupied(count as u8);
            Box::into_raw(bigger) as *mut NodeHeader
        }
        NodeKind::N48 => {
            let mut bigger = Node256::new();
            bigger
                .header
                .set_prefix_with_len(&prefix[..prefix_len.min(INLINE_PREFIX_LEN)], prefix_len);
            for (k, c) in entries {
                bigger.children[k as usize].store(c, Ordering::Relaxed);
            }
            bigger.header.set_child_count((*header).child_count());
            Box::into_raw(bigger) as *mut NodeHeader
        }
        NodeKind::N256 => unreachable!("N256 never grows"),
    }
}

/// Shrinks a node one kind down (inverse of [`grow`]), used when remove leaves a
/// node underfull.
///
/// # Safety
/// `header` must point at a live, non-obsolete, underfull node that is not `N4`.
pub unsafe fn shrink(header: *const NodeHeader) -> *mut NodeHeader {
    let entries = sorted_children(header);
    let prefix = (*header).prefix();
    let prefix_len = (*header).prefix_len();
    match (*header).kind() {
        NodeKind::N256 => {
            let mut smaller = Node48::new();
            smaller
                .header
                .set_prefix_with_len(&prefix[..prefix_len.min(INLINE_PREFIX_LEN)], prefix_len);
            let count = entries.len();
            for (i, (k, c)) in entries.into_iter().enumerate() {
                smaller.children[i].store(c, Ordering::Relaxed);
                smaller.child_index[k as usize] = i as u8;
            }
            smaller.header.set_child_count((*header).child_count());
            smaller.mark_dense_occupied(count as u8);
            Box::into_raw(smaller) as *mut NodeHeader
        }
        NodeKind::N48 => {
            let mut smaller = Node16::new();
            smaller
                .header
                .set_prefix_with_len(&prefix[..prefix_len.min(INLINE_PREFIX_LEN)], prefix_len);
            for (i, (k, c)) in entries.into_iter().enumerate() {
                smaller.keys[i] = k;
                smaller.children[i].store(c, Ordering::Relaxed);
            }
            smaller.header.set_child_count((*header).child_count());
            Box::into_raw(smaller) as *mut NodeHeader
        }
        NodeKind::N16 => {
            let mut smaller = Node4::new();
            smaller
                .header
                .set_prefix_with_len(&prefix[..prefix_len.min(INLINE_PREFIX_LEN)], prefix_len);
            for (i, (k, c)) in entries.into_iter().enumerate() {
                smaller.keys[i] = k;
                smaller.children[i].store(c, Ordering::Relaxed);
            }
            smaller.header.set_child_count((*header).child_count());
            Box::into_raw(smaller) as *mut NodeHeader
        }
        NodeKind::N4 => unreachable!("N4 never shrinks"),
    }
}

/// Frees a node variant given its kind tag and header pointer. Used only after the
/// epoch reclaimer has determined it is safe (never called synchronously on a
/// published node).
///
/// # Safety
/// `header` must be a pointer previously obtained from `Box::into_raw` on the variant
/// matching `kind`, not already freed.
pub unsafe fn drop_node(header: *mut NodeHeader, kind: NodeKind) {
    match kind {
        NodeKind::N4 => drop(Box::from_raw(header as *mut Node4)),
        NodeKind::N16 => drop(Box::from_raw(header as *mut Node16)),
        NodeKind::N48 => drop(Box::from_raw(header as *mut Node48)),
        NodeKind::N256 => drop(Box::from_raw(header as *mut Node256)),
    }
}
