/*
 * Created on Sat Feb 07 2026
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

//! B+-tree node layout: inner nodes hold separator keys and child
//! pointers, leaves hold keys and values and are threaded together via `next_leaf` for
//! cheap forward range scans.

use super::latch::{NodeLatch, Strategy};
use crate::sync::mcsrw::McsrwQNode;
use crate::sync::omcs::OmcsQNode;
use crate::sync::pool::Pool;
use std::cell::UnsafeCell;

pub struct BNode {
    pub latch: NodeLatch,
    pub is_leaf: bool,
    inner: UnsafeCell<Inner>,
}

struct Inner {
    keys: Vec<Box<[u8]>>,
    /// Child node pointers (`*mut BNode` as `u64`); populated only for inner nodes.
    /// `children.len() == keys.len() + 1`.
    children: Vec<u64>,
    /// Values; populated only for leaves, `values.len() == keys.len()`.
    values: Vec<Box<[u8]>>,
    /// Forward pointer to the next leaf in key order, `0` if none. Leaves only.
    next_leaf: u64,
}

// SAFETY bound: every field behind `inner` is mutated only while `latch` is held
// exclusively; optimistic readers re-validate the latch's version after reading, same
// discipline as `idx::art::node::NodeHeader`.
unsafe impl Send for BNode {}
unsafe impl Sync for BNode {}

impl BNode {
    pub fn new_leaf(
        strategy: Strategy,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) -> Box<Self> {
        Box::new(Self {
            latch: NodeLatch::new(strategy, true, omcs_pool, mcsrw_pool),
            is_leaf: true,
            inner: UnsafeCell::new(Inner {
                keys: Vec::new(),
                children: Vec::new(),
                values: Vec::new(),
                next_leaf: 0,
            }),
        })
    }

    pub fn new_inner(
        strategy: Strategy,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) -> Box<Self> {
        Box::new(Self {
            latch: NodeLatch::new(strategy, false, omcs_pool, mcsrw_pool),
            is_leaf: false,
            inner: UnsafeCell::new(Inner {
                keys: Vec::new(),
                children: vec![0],
                values: Vec::new(),
                next_leaf: 0,
            }),
        })
    }

    /// Sets the sole child of a freshly-constructed, still-unpublished inner node
    /// (`new_inner` seeds a single placeholder slot). Caller holds no latch since the
    /// node isn't reachable by anyone else yet.
    pub fn seed_first_child(&self, handle: u64) {
        self.inner_mut().children[0] = handle;
    }

    fn inner(&self) -> &Inner {
        unsafe {
            // UNSAFE(@latchidx): benign-race read under the OLC discipline; every
            // caller either holds `latch` exclusively or validates afterward.
            &*self.inner.get()
        }
    }

    #[allow(clippy::mut_from_ref)]
    fn inner_mut(&self) -> &mut Inner {
        unsafe {
            // UNSAFE(@latchidx): caller holds `latch` exclusively (write-side only).
            &mut *self.inner.get()
        }
    }

    pub fn key_count(&self) -> usize {
        self.inner().keys.len()
    }

    pub fn keys(&self) -> &[Box<[u8]>] {
        &self.inner().keys
    }

    pub fn children(&self) -> &[u64] {
        &self.inner().children
    }

    pub fn values(&self) -> &[Box<[u8]>] {
        &self.inner().values
    }

    pub fn next_leaf(&self) -> u64 {
        self.inner().next_leaf
    }

    pub fn set_next_leaf(&self, ptr: u64) {
        self.inner_mut().next_leaf = ptr;
    }

    pub fn is_full(&self, order: usize) -> bool {
        self.key_count() >= order
    }

    pub fn is_underfull(&self, order: usize) -> bool {
        self.key_count() < order / 2
    }

    /// Index of the first key strictly greater than `key` - i.e. the child slot (for
    /// inner nodes) or insertion point (for leaves) that `key` belongs under.
    pub fn upper_bound(&self, key: &[u8]) -> usize {
        let keys = &self.inner().keys;
        keys.partition_point(|k| k.as_ref() <= key)
    }

    /// Exact-match index for a leaf, if present.
    pub fn find_exact(&self, key: &[u8]) -> Option<usize> {
        let keys = &self.inner().keys;
        keys.binary_search_by(|k| k.as_ref().cmp(key)).ok()
    }

    pub fn child_at(&self, idx: usize) -> u64 {
        self.inner().children[idx]
    }

    pub fn value_at(&self, idx: usize) -> &[u8] {
        &self.inner().values[idx]
    }

    /// Inserts a `(key, value)` pair into a leaf known not to be full. Caller holds the
    /// latch exclusively.
    pub fn leaf_insert(&self, key: &[u8], value: &[u8]) {
        let inner = self.inner_mut();
        let at = inner.keys.partition_point(|k| k.as_ref() <= key);
        inner.keys.insert(at, key.to_vec().into_boxed_slice());
        inner.values.insert(at, value.to_vec().into_boxed_slice());
    }

    /// Overwrites the value at an existing key. Caller holds the latch exclusively.
    pub fn leaf_update(&self, idx: usize, value: &[u8]) {
        self.inner_mut().values[idx] = value.to_vec().into_boxed_slice();
    }

    /// Removes the entry at `idx` from a leaf. Caller holds the latch exclusively.
    pub fn leaf_remove(&self, idx: usize) {
        let inner = self.inner_mut();
        inner.keys.remove(idx);
        inner.values.remove(idx);
    }

    /// Inserts a new separator key and the child to its right. Caller holds the latch
    /// exclusively on a node known not to be full.
    pub fn inner_insert(&self, sep_idx: usize, key: Box<[u8]>, right_child: u64) {
        let inner = self.inner_mut();
        inner.keys.insert(sep_idx, key);
        inner.children.insert(sep_idx + 1, right_child);
    }

    /// Removes separator `sep_idx` and the child immediately to its right.
    pub fn inner_remove(&self, sep_idx: usize) {
        let inner = self.inner_mut();
        inner.keys.remove(sep_idx);
        inner.children.remove(sep_idx + 1);
    }

    /// Splits a full leaf in two, returning `(separator_key, new_right_node)`. The
    /// right half keeps the upper half of the entries; `self` keeps the lower half.
    /// Caller holds `self`'s latch exclusively and links `new_right` into the leaf
    /// chain itself (this only partitions the entries).
    pub fn split_leaf(
        &self,
        strategy: Strategy,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) -> (Box<[u8]>, Box<BNode>) {
        let inner = self.inner_mut();
        let mid = inner.keys.len() / 2;
        let right_keys = inner.keys.split_off(mid);
        let right_values = inner.values.split_off(mid);
        let sep = right_keys[0].clone();
        let right = Box::new(BNode {
            latch: NodeLatch::new(strategy, true, omcs_pool, mcsrw_pool),
            is_leaf: true,
            inner: UnsafeCell::new(Inner {
                keys: right_keys,
                children: Vec::new(),
                values: right_values,
                next_leaf: inner.next_leaf,
            }),
        });
        (sep, right)
    }

    /// Splits a full inner node in two, returning `(separator_key, new_right_node)`.
    /// The separator is pulled *up* (not duplicated on either side), per classic
    /// B+-tree inner-node splitting.
    pub fn split_inner(
        &self,
        strategy: Strategy,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) -> (Box<[u8]>, Box<BNode>) {
        let inner = self.inner_mut();
        let mid = inner.keys.len() / 2;
        let sep = inner.keys[mid].clone();
        let right_keys = inner.keys.split_off(mid + 1);
        inner.keys.truncate(mid);
        let right_children = inner.children.split_off(mid + 1);
        let right = Box::new(BNode {
            latch: NodeLatch::new(strategy, false, omcs_pool, mcsrw_pool),
            is_leaf: false,
            inner: UnsafeCell::new(Inner {
                keys: right_keys,
                children: right_children,
                values: Vec::new(),
                next_leaf: 0,
            }),
        });
        (sep, right)
    }
}

pub fn node_ptr(handle: u64) -> *const BNode {
    handle as *const BNode
}

pub fn encode_node(ptr: *const BNode) -> u64 {
    ptr as u64
}

/// # Safety
/// `ptr` must have come from `Box::into_raw` on a live `BNode`, not already freed.
pub unsafe fn drop_node(ptr: *mut BNode) {
    drop(Box::from_raw(ptr));
}
