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

//! The adaptive radix tree core: optimistic lock coupling for lookup and
//! scan, pessimistic hand-over-hand exclusive locking for insert/update/remove.

pub mod leaf;
pub mod node;

use self::leaf::Leaf;
use crate::mem::reclaim::{self, Guard};
use crate::sync::{ORD_ACQ, ORD_REL, ORD_RLX, ORD_SEQ};
use std::sync::atomic::AtomicU64;

/// `kSampleProb = 0.1` of `u32::MAX`.
pub const HOTNESS_SAMPLE_CUTOFF: u32 = 429_496_729;
/// `kHotnessThreshold`.
pub const HOTNESS_THRESHOLD: u32 = 1024;

fn common_prefix_len(a: &[u8], b: &[u8], b_start: usize) -> usize {
    let b = &b[b_start.min(b.len())..];
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Descends from `handle` along an arbitrary single child chain until it reaches a
/// leaf. Every leaf reachable under a node carries that node's full logical prefix as
/// a byte-exact substring of its own stored key, so which leaf we land on doesn't
/// matter - any one of them can stand in for bytes that didn't fit in the inline
/// prefix buffer.
unsafe fn any_descendant_leaf(handle: u64) -> Option<u64> {
    let mut cur = handle;
    while !leaf::is_leaf(cur) {
        let children = node::sorted_children(node::node_ptr(cur));
        cur = children.first()?.1;
    }
    Some(cur)
}

/// Compares a node's full logical prefix against `key[level..]`, resolving any bytes
/// past `node::INLINE_PREFIX_LEN` via an arbitrary descendant leaf's stored key instead
/// of trusting the (necessarily truncated) inline buffer alone.
///
/// Returns the number of leading bytes that agree, which is less than `prefix_len()`
/// exactly when a mismatch was found, or when `key` ran out first.
unsafe fn compare_prefix(current: *const node::NodeHeader, key: &[u8], level: usize) -> usize {
    let plen = (*current).prefix_len();
    if plen == 0 {
        return 0;
    }
    let stored = plen.min(node::INLINE_PREFIX_LEN);
    let avail = key.len().saturating_sub(level);
    let pbytes = (*current).prefix();
    let inline_cmp = stored.min(avail);
    let mut matched = 0usize;
    while matched < inline_cmp && pbytes[matched] == key[level + matched] {
        matched += 1;
    }
    if matched < stored || plen <= node::INLINE_PREFIX_LEN {
        return matched;
    }
    let descendant = match any_descendant_leaf(node::encode_node(current)) {
        Some(h) => h,
        None => return matched,
    };
    let dkey = &leaf::decode_leaf(descendant).key;
    let overflow_len = (plen - stored).min(avail - stored);
    let mut extra = 0usize;
    while extra < overflow_len
        && level + stored + extra < dkey.len()
        && dkey[level + stored + extra] == key[level + stored + extra]
    {
        extra += 1;
    }
    matched + extra
}

/// Returns a node's full logical prefix bytes, resolving any bytes past the inline cap
/// via an arbitrary descendant leaf. `level` is the key depth at which this node's own
/// prefix begins, needed only to pick the right slice out of the descendant's key.
unsafe fn full_prefix(node_handle: u64, level: usize) -> Vec<u8> {
    let header = node::node_ptr(node_handle);
    let plen = (*header).prefix_len();
    if plen <= node::INLINE_PREFIX_LEN {
        return (*header).prefix()[..plen].to_vec();
    }
    match any_descendant_leaf(node_handle) {
        Some(leaf_handle) => {
            let dkey = &leaf::decode_leaf(leaf_handle).key;
            let end = (level + plen).min(dkey.len());
            dkey[level.min(end)..end].to_vec()
        }
        None => (*header).prefix()[..node::INLINE_PREFIX_LEN].to_vec(),
    }
}

/// Where a child handle is stored: either the tree's root slot, or a byte-indexed cell
/// inside some node's child array.
enum Slot {
    Root,
    Child {
        parent: *const node::NodeHeader,
        byte: u8,
    },
}

impl Slot {
    unsafe fn store(&self, root: &AtomicU64, new: u64) {
        match self {
            Slot::Root => root.store(new, ORD_REL),
            Slot::Child { parent, byte } => node::update_child(*parent, *byte, new),
        }
    }
}

/// An adaptive radix tree keyed by arbitrary byte strings.
pub struct Art {
    root: AtomicU64,
    len: std::sync::atomic::AtomicUsize,
}

impl Default for Art {
    fn default() -> Self {
        Self::new()
    }
}

impl Art {
    pub fn new() -> Self {
        Self {
            root: AtomicU64::new(0),
            len: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.len.load(ORD_ACQ)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Optimistic lookup.
    pub fn find(&self, key: &[u8]) -> Option<Vec<u8>> {
        loop {
            match self.try_find(key) {
                FindResult::Found(v) => return Some(v),
                FindResult::Miss => return None,
                FindResult::Retry => continue,
            }
        }
    }

    fn try_find(&self, key: &[u8]) -> FindResult {
        let root = self.root.load(ORD_ACQ);
        if root == 0 {
            return FindResult::Miss;
        }
        if leaf::is_leaf(root) {
            let l = unsafe { leaf::decode_leaf(root) };
            return if *l.key == *key {
                FindResult::Found(l.value.to_vec())
            } else {
                FindResult::Miss
            };
        }
        let mut node_ptr = node::node_ptr(root);
        let mut version = match unsafe { (*node_ptr).latch.try_begin_read() } {
            Some(v) => v,
            None => return FindResult::Retry,
        };
        let mut level = 0usize;
        loop {
            let plen = unsafe { (*node_ptr).prefix_len() };
            if plen > 0 {
                let matched = unsafe { compare_prefix(node_ptr, key, level) };
                if matched < plen {
                    return if unsafe { (*node_ptr).latch.validate_read(version) } {
                        FindResult::Miss
                    } else {
                        FindResult::Retry
                    };
                }
            }
            level += plen;
            if level >= key.len() {
                return if unsafe { (*node_ptr).latch.validate_read(version) } {
                    FindResult::Miss
                } else {
                    FindResult::Retry
                };
            }
            let byte = key[level];
            let child = unsafe { node::find_child(node_ptr, byte) };
            if !unsafe { (*node_ptr).latch.validate_read(version) } {
                return FindResult::Retry;
            }
            if child == 0 {
                return FindResult::Miss;
            }
            if leaf::is_leaf(child) {
                let l = unsafe { leaf::decode_leaf(child) };
                return if *l.key == *key {
                    FindResult::Found(l.value.to_vec())
                } else {
                    FindResult::Miss
                };
            }
            let child_ptr = node::node_ptr(child);
            let child_version = match unsafe { (*child_ptr).latch.try_begin_read() } {
                Some(v) => v,
                None => return FindResult::Retry,
            };
            node_ptr = child_ptr;
            version = child_version;
            level += 1;
        }
    }

    /// Pessimistic insert. Returns `false` on duplicate.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> bool {
        let guard = reclaim::thread_enter();
        let result = loop {
            if let Some(r) = self.try_insert(key, value, &guard) {
                break r;
            }
        };
        if result {
            self.len.fetch_add(1, ORD_RLX);
        }
        reclaim::thread_leave(guard);
        result
    }

    fn try_insert(&self, key: &[u8], value: &[u8], guard: &Guard) -> Option<bool> {
        let root = self.root.load(ORD_ACQ);
        if root == 0 {
            let new_leaf = Leaf::alloc(key, value);
            return match self
                .root
                .compare_exchange(0, leaf::encode_leaf(new_leaf), ORD_SEQ, ORD_RLX)
            {
                Ok(_) => Some(true),
                Err(_) => {
                    unsafe { Leaf::drop_leaf(new_leaf) };
                    None
                }
            };
        }
        if leaf::is_leaf(root) {
            return self.split_root_leaf(root, key, value);
        }
        let root_ptr = node::node_ptr(root);
        unsafe { (*root_ptr).latch.lock() };
        unsafe { self.insert_at(None, Slot::Root, root, key, value, 0, guard) }
    }

    fn split_root_leaf(&self, root: u64, key: &[u8], value: &[u8]) -> Option<bool> {
        let existing = unsafe { leaf::decode_leaf(root) };
        if *existing.key == *key {
            return Some(false);
        }
        let common = common_prefix_len(&existing.key, key, 0);
        if common >= existing.key.len() || common >= key.len() {
            // one key is a strict byte-wise prefix of the other: unsupported without a
            // key terminator convention (mirrors the original ART's same restriction).
            return Some(false);
        }
        let new_leaf = Leaf::alloc(key, value);
        let mut n4 = node::Node4::new();
        n4.header.set_prefix(&existing.key[..common]);
        let old_byte = existing.key[common];
        let new_byte = key[common];
        unsafe {
            node::add_child(&n4.header, old_byte, root);
            node::add_child(&n4.header, new_byte, leaf::encode_leaf(new_leaf));
        }
        let n4_ptr = Box::into_raw(n4);
        let handle = node::encode_node(n4_ptr as *const node::NodeHeader);
        match self.root.compare_exchange(root, handle, ORD_SEQ, ORD_RLX) {
            Ok(_) => Some(true),
            Err(_) => {
                unsafe {
                    Leaf::drop_leaf(new_leaf);
                    drop(Box::from_raw(n4_ptr));
                }
                None
            }
        }
    }

    /// # Safety
    /// Caller holds `current_handle`'s latch exclusively, and `ancestor`'s (if `Some`)
    /// too.
    unsafe fn insert_at(
        &self,
        ancestor: Option<*const node::NodeHeader>,
        slot: Slot,
        current_handle: u64,
        key: &[u8],
        value: &[u8],
        level: usize,
        guard: &Guard,
    ) -> Option<bool> {
        let current = node::node_ptr(current_handle);
        let unlock_all = |this_unlocked: bool| {
            if !this_unlocked {
                (*current).latch.unlock();
            }
            if let Some(a) = ancestor {
                (*a).latch.unlock();
            }
        };

        let plen = (*current).prefix_len();
        let matched = compare_prefix(current, key, level);
        let full_match = matched == plen;

        if !full_match {
            let split_at = matched;
            if level + split_at >= key.len() {
                unlock_all(false);
                return Some(false);
            }
            let old_prefix = full_prefix(current_handle, level);
            let mut new_n4 = node::Node4::new();
            new_n4.header.set_prefix(&old_prefix[..split_at]);
            let old_byte = old_prefix[split_at];
            let new_byte = key[level + split_at];
            let remainder = old_prefix[(split_at + 1)..].to_vec();
            (*current).set_prefix(&remainder);
            let new_leaf = Leaf::alloc(key, value);
            node::add_child(&new_n4.header, old_byte, current_handle);
            node::add_child(&new_n4.header, new_byte, leaf::encode_leaf(new_leaf));
            let n4_ptr = Box::into_raw(new_n4);
            slot.store(&self.root, node::encode_node(n4_ptr as *const node::NodeHeader));
            unlock_all(false);
            return Some(true);
        }

        let next_level = level + plen;
        if next_level >= key.len() {
            unlock_all(false);
            return Some(false);
        }
        let byte = key[next_level];
        let child = node::find_child(current, byte);

        if child == 0 {
            if node::is_full(current) {
                let bigger = node::grow(current);
                node::add_child(bigger, byte, leaf::encode_leaf(Leaf::alloc(key, value)));
                slot.store(&self.root, node::encode_node(bigger));
                (*current).mark_obsolete();
                let kind = (*current).kind();
                let old_ptr = current as *mut node::NodeHeader;
                reclaim::defer_unchecked(guard, move || {
                    node::drop_node(old_ptr, kind);
                });
            } else {
                node::add_child(current, byte, leaf::encode_leaf(Leaf::alloc(key, value)));
            }
            unlock_all(false);
            return Some(true);
        }

        if leaf::is_leaf(child) {
            let existing = leaf::decode_leaf(child);
            if *existing.key == *key {
                unlock_all(false);
                return Some(false);
            }
            let from = next_level + 1;
            let common = common_prefix_len(&existing.key, key, from);
            if from + common >= existing.key.len() || from + common >= key.len() {
                unlock_all(false);
                return Some(false);
            }
            let mut inner = node::Node4::new();
            inner.header.set_prefix(&existing.key[from..from + common]);
            let eb = existing.key[from + common];
            let nb = key[from + common];
            node::add_child(&inner.header, eb, child);
            node::add_child(
                &inner.header,
                nb,
                leaf::encode_leaf(Leaf::alloc(key, value)),
            );
            let inner_ptr = Box::into_raw(inner);
            node::update_child(current, byte, node::encode_node(inner_ptr as *const node::NodeHeader));
            unlock_all(false);
            return Some(true);
        }

        let child_ptr = node::node_ptr(child);
        (*child_ptr).latch.lock();
        if let Some(a) = ancestor {
            (*a).latch.unlock();
        }
        self.insert_at(
            Some(current),
            Slot::Child { parent: current, byte },
            child,
            key,
            value,
            next_level + 1,
            guard,
        )
    }

    /// Optimistic-descent-then-upgrade update. Falls back to restarting
    /// the whole optimistic attempt if the upgrade is lost, rather than a distinct
    /// pessimistic code path (see DESIGN.md scope note: both converge to the same
    /// steady state under the toolkit's general restart-on-validation-failure policy).
    pub fn update(&self, key: &[u8], value: &[u8]) -> bool {
        let guard = reclaim::thread_enter();
        let result = loop {
            if let Some(r) = self.try_update(key, value, &guard) {
                break r;
            }
        };
        reclaim::thread_leave(guard);
        result
    }

    fn try_update(&self, key: &[u8], value: &[u8], guard: &Guard) -> Option<bool> {
        let root = self.root.load(ORD_ACQ);
        if root == 0 {
            return Some(false);
        }
        if leaf::is_leaf(root) {
            let existing = unsafe { leaf::decode_leaf(root) };
            if *existing.key != *key {
                return Some(false);
            }
            let new_leaf = Leaf::alloc(key, value);
            return match self
                .root
                .compare_exchange(root, leaf::encode_leaf(new_leaf), ORD_SEQ, ORD_RLX)
            {
                Ok(_) => {
                    unsafe { reclaim::defer_free_raw(guard, leaf::decode_leaf_ptr(root)) };
                    Some(true)
                }
                Err(_) => {
                    unsafe { Leaf::drop_leaf(new_leaf) };
                    None
                }
            };
        }
        let mut parent = node::node_ptr(root);
        let mut parent_version = unsafe { (*parent).latch.try_begin_read() }?;
        let mut level = 0usize;
        loop {
            let plen = unsafe { (*parent).prefix_len() };
            if plen > 0 {
                let matched = unsafe { compare_prefix(parent, key, level) };
                if matched < plen {
                    return if unsafe { (*parent).latch.validate_read(parent_version) } {
                        Some(false)
                    } else {
                        None
                    };
                }
            }
            level += plen;
            if level >= key.len() {
                return if unsafe { (*parent).latch.validate_read(parent_version) } {
                    Some(false)
                } else {
                    None
                };
            }
            let byte = key[level];
            let child = unsafe { node::find_child(parent, byte) };
            if !unsafe { (*parent).latch.validate_read(parent_version) } {
                return None;
            }
            if child == 0 {
                return Some(false);
            }
            if leaf::is_leaf(child) {
                let existing = unsafe { leaf::decode_leaf(child) };
                if *existing.key != *key {
                    return Some(false);
                }
                if !unsafe { (*parent).latch.try_upgrade(parent_version) } {
                    return None;
                }
                if unsafe { node::find_child(parent, byte) } != child {
                    unsafe { (*parent).latch.unlock() };
                    return None;
                }
                let new_leaf = Leaf::alloc(key, value);
                unsafe { node::update_child(parent, byte, leaf::encode_leaf(new_leaf)) };
                unsafe { (*parent).latch.unlock() };
                unsafe { reclaim::defer_free_raw(guard, leaf::decode_leaf_ptr(child)) };
                self.maybe_sample_hotness(parent, level, key);
                return Some(true);
            }
            let child_ptr = node::node_ptr(child);
            let child_version = match unsafe { (*child_ptr).latch.try_begin_read() } {
                Some(v) => v,
                None => return None,
            };
            parent = child_ptr;
            parent_version = child_version;
            level += 1;
        }
    }

    /// Expansion heuristic: keys
    /// shorter than 2 bytes skip sampling entirely. Our insert path already maintains
    /// full path compression via per-node prefixes, so the action a hot sample takes
    /// is a diagnostic log line rather than building a redundant one-off chain.
    fn maybe_sample_hotness(&self, parent: *const node::NodeHeader, level: usize, key: &[u8]) {
        if key.len() < 2 {
            return;
        }
        let roll: u32 = rand::random();
        if unsafe { (*parent).sample_hotness(roll) } {
            log::debug!(
                "art: hotness threshold crossed at level {level} for a {}-byte key",
                key.len()
            );
        }
    }

    /// Pessimistic remove. Returns `false` if the key is absent.
    pub fn remove(&self, key: &[u8]) -> bool {
        let guard = reclaim::thread_enter();
        let result = loop {
            if let Some(r) = self.try_remove(key, &guard) {
                break r;
            }
        };
        if result {
            self.len.fetch_sub(1, ORD_RLX);
        }
        reclaim::thread_leave(guard);
        result
    }

    fn try_remove(&self, key: &[u8], guard: &Guard) -> Option<bool> {
        let root = self.root.load(ORD_ACQ);
        if root == 0 {
            return Some(false);
        }
        if leaf::is_leaf(root) {
            let l = unsafe { leaf::decode_leaf(root) };
            if *l.key != *key {
                return Some(false);
            }
            return match self.root.compare_exchange(root, 0, ORD_SEQ, ORD_RLX) {
                Ok(_) => {
                    unsafe { reclaim::defer_free_raw(guard, leaf::decode_leaf_ptr(root)) };
                    Some(true)
                }
                Err(_) => None,
            };
        }
        let root_ptr = node::node_ptr(root);
        unsafe { (*root_ptr).latch.lock() };
        unsafe { self.remove_at(None, Slot::Root, root, key, 0, guard) }
    }

    /// # Safety
    /// Caller holds `current_handle`'s latch exclusively, and `ancestor`'s (if `Some`)
    /// too.
    unsafe fn remove_at(
        &self,
        ancestor: Option<*const node::NodeHeader>,
        slot: Slot,
        current_handle: u64,
        key: &[u8],
        level: usize,
        guard: &Guard,
    ) -> Option<bool> {
        let current = node::node_ptr(current_handle);
        let unlock_all = || {
            (*current).latch.unlock();
            if let Some(a) = ancestor {
                (*a).latch.unlock();
            }
        };

        let plen = (*current).prefix_len();
        let matched = compare_prefix(current, key, level);
        if matched < plen {
            unlock_all();
            return Some(false);
        }
        let next_level = level + plen;
        if next_level >= key.len() {
            unlock_all();
            return Some(false);
        }
        let byte = key[next_level];
        let child = node::find_child(current, byte);
        if child == 0 {
            unlock_all();
            return Some(false);
        }

        if leaf::is_leaf(child) {
            let l = leaf::decode_leaf(child);
            if *l.key != *key {
                unlock_all();
                return Some(false);
            }
            let removed_leaf_ptr = leaf::decode_leaf_ptr(child);
            let count = (*current).child_count();
            if count == 2 {
                let siblings = node::sorted_children(current);
                let (sibling_byte, sibling_child) =
                    siblings.into_iter().find(|(b, _)| *b != byte).expect(
                        "a node reporting 2 children must have a sibling under a different byte",
                    );
                if !leaf::is_leaf(sibling_child) {
                    let sib_ptr = node::node_ptr(sibling_child);
                    (*sib_ptr).latch.lock();
                    // `matched == plen` was just established above, so `key` itself is
                    // an authoritative source for current's own full prefix bytes.
                    let mut new_prefix = key[level..level + plen].to_vec();
                    new_prefix.push(sibling_byte);
                    new_prefix.extend_from_slice(&full_prefix(sibling_child, next_level + 1));
                    (*sib_ptr).set_prefix(&new_prefix);
                    (*sib_ptr).latch.unlock();
                }
                slot.store(&self.root, sibling_child);
                (*current).mark_obsolete();
                let kind = (*current).kind();
                let old_ptr = current as *mut node::NodeHeader;
                (*current).latch.unlock();
                if let Some(a) = ancestor {
                    (*a).latch.unlock();
                }
                reclaim::defer_unchecked(guard, move || node::drop_node(old_ptr, kind));
                reclaim::defer_free_raw(guard, removed_leaf_ptr);
                return Some(true);
            }
            node::remove_child(current, byte);
            if node::is_underfull(current) {
                let smaller = node::shrink(current);
                slot.store(&self.root, node::encode_node(smaller));
                (*current).mark_obsolete();
                let kind = (*current).kind();
                let old_ptr = current as *mut node::NodeHeader;
                (*current).latch.unlock();
                if let Some(a) = ancestor {
                    (*a).latch.unlock();
                }
                reclaim::defer_unchecked(guard, move || node::drop_node(old_ptr, kind));
            } else {
                unlock_all();
            }
            reclaim::defer_free_raw(guard, removed_leaf_ptr);
            return Some(true);
        }

        let child_ptr = node::node_ptr(child);
        (*child_ptr).latch.lock();
        if let Some(a) = ancestor {
            (*a).latch.unlock();
        }
        self.remove_at(
            Some(current),
            Slot::Child { parent: current, byte },
            child,
            key,
            next_level + 1,
            guard,
        )
    }

    /// Range scan: ascending keys `>= start`, at most `n` of them, plus a
    /// continuation key if more remain.
    pub fn scan(&self, start: &[u8], n: usize) -> (Vec<(Vec<u8>, Vec<u8>)>, Option<Vec<u8>>) {
        loop {
            if let Some(r) = self.try_scan(start, n) {
                return r;
            }
        }
    }

    fn try_scan(&self, start: &[u8], n: usize) -> Option<(Vec<(Vec<u8>, Vec<u8>)>, Option<Vec<u8>>)> {
        let _guard = reclaim::thread_enter();
        let root = self.root.load(ORD_ACQ);
        let mut out = Vec::new();
        if root == 0 {
            return Some((out, None));
        }
        if leaf::is_leaf(root) {
            let l = unsafe { leaf::decode_leaf(root) };
            if *l.key >= *start {
                out.push((l.key.to_vec(), l.value.to_vec()));
            }
            return Some((out, None));
        }
        self.collect(node::node_ptr(root), start, n + 1, &mut out)?;
        let continuation = if out.len() > n {
            let k = out[n].0.clone();
            out.truncate(n);
            Some(k)
        } else {
            None
        };
        Some((out, continuation))
    }

    fn collect(
        &self,
        header: *const node::NodeHeader,
        start: &[u8],
        limit: usize,
        out: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> Option<()> {
        if out.len() >= limit {
            return Some(());
        }
        let version = unsafe { (*header).latch.try_begin_read() }?;
        let children = unsafe { node::sorted_children(header) };
        if !unsafe { (*header).latch.validate_read(version) } {
            return None;
        }
        for (_, child) in children {
            if out.len() >= limit {
                break;
            }
            if leaf::is_leaf(child) {
                let l = unsafe { leaf::decode_leaf(child) };
                if *l.key >= *start {
                    out.push((l.key.to_vec(), l.value.to_vec()));
                }
            } else {
                self.collect(node::node_ptr(child), start, limit, out)?;
            }
        }
        Some(())
    }
}

enum FindResult {
    Found(Vec<u8>),
    Miss,
    Retry,
}

impl Drop for Art {
    fn drop(&mut self) {
        // single-threaded teardown: no concurrent readers/writers can observe this
        // tree anymore, so nodes are freed directly rather than through the epoch
        // reclaimer.
        unsafe { free_subtree(self.root.load(ORD_ACQ)) }
    }
}

unsafe fn free_subtree(handle: u64) {
    if handle == 0 {
        return;
    }
    if leaf::is_leaf(handle) {
        Leaf::drop_leaf(leaf::decode_leaf_ptr(handle));
        return;
    }
    let header = node::node_ptr(handle);
    for (_, child) in node::sorted_children(header) {
        free_subtree(child);
    }
    node::drop_node(header as *mut node::NodeHeader, (*header).kind());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_roundtrip() {
        let art = Art::new();
        assert!(art.insert(b"hello", b"world"));
        assert_eq!(art.find(b"hello"), Some(b"world".to_vec()));
        assert_eq!(art.find(b"missing"), None);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let art = Art::new();
        assert!(art.insert(b"key", b"v1"));
        assert!(!art.insert(b"key", b"v2"));
        assert_eq!(art.find(b"key"), Some(b"v1".to_vec()));
    }

    #[test]
    fn update_replaces_value() {
        let art = Art::new();
        art.insert(b"key", b"v1");
        assert!(art.update(b"key", b"v2"));
        assert_eq!(art.find(b"key"), Some(b"v2".to_vec()));
        assert!(!art.update(b"absent", b"v"));
    }

    #[test]
    fn remove_deletes_key() {
        let art = Art::new();
        art.insert(b"a", b"1");
        art.insert(b"b", b"2");
        assert!(art.remove(b"a"));
        assert_eq!(art.find(b"a"), None);
        assert_eq!(art.find(b"b"), Some(b"2".to_vec()));
        assert!(!art.remove(b"a"));
    }

    #[test]
    fn dense_insert_scenario() {
        let art = Art::new();
        for i in 1u64..=1024 {
            assert!(art.insert(&i.to_be_bytes(), &i.to_be_bytes()));
        }
        for i in 1u64..=1024 {
            assert_eq!(art.find(&i.to_be_bytes()), Some(i.to_be_bytes().to_vec()));
        }
        assert_eq!(art.find(&0u64.to_be_bytes()), None);
        assert_eq!(art.find(&1025u64.to_be_bytes()), None);
        assert_eq!(art.len(), 1024);
    }

    #[test]
    fn sparse_insert_and_range_scan_scenario() {
        let art = Art::new();
        let keys: [u64; 3] = [0x0000000100000001, 0x0000000100000002, 0x0000000200000001];
        for k in keys {
            assert!(art.insert(&k.to_be_bytes(), &k.to_be_bytes()));
        }
        let (got, _cont) = art.scan(&0x0000000100000000u64.to_be_bytes(), 10);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].0, keys[0].to_be_bytes());
        assert_eq!(got[1].0, keys[1].to_be_bytes());
    }

    #[test]
    fn node_growth_beyond_n4() {
        let art = Art::new();
        for b in 0u8..20 {
            assert!(art.insert(&[b], &[b]));
        }
        for b in 0u8..20 {
            assert_eq!(art.find(&[b]), Some(vec![b]));
        }
    }

    #[test]
    fn remove_shrinks_back_down() {
        let art = Art::new();
        for b in 0u8..20 {
            art.insert(&[b], &[b]);
        }
        for b in 0u8..18 {
            assert!(art.remove(&[b]));
        }
        assert_eq!(art.find(&[18]), Some(vec![18]));
        assert_eq!(art.find(&[19]), Some(vec![19]));
        assert_eq!(art.len(), 2);
    }
}
