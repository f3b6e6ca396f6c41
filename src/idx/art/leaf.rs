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

//! ART leaves: the record a leaf-tagged child handle resolves to. A leaf
//! owns its own copy of the key (so prefix-overflow lookups and range scans can read it
//! back without touching the caller's original buffer) and an opaque fixed-size value.

/// Top bit of a child handle marks it as a leaf.
pub const LEAF_BIT: u64 = 1 << 63;
pub const PAYLOAD_MASK: u64 = !LEAF_BIT;

pub struct Leaf {
    pub key: Box<[u8]>,
    pub value: Box<[u8]>,
}

impl Leaf {
    pub fn alloc(key: &[u8], value: &[u8]) -> *mut Leaf {
        Box::into_raw(Box::new(Leaf {
            key: key.to_vec().into_boxed_slice(),
            value: value.to_vec().into_boxed_slice(),
        }))
    }

    /// # Safety
    /// `ptr` must have come from [`Leaf::alloc`] and not already be freed.
    pub unsafe fn drop_leaf(ptr: *mut Leaf) {
        drop(Box::from_raw(ptr));
    }
}

pub fn is_leaf(handle: u64) -> bool {
    handle & LEAF_BIT != 0
}

pub fn encode_leaf(ptr: *const Leaf) -> u64 {
    (ptr as u64) | LEAF_BIT
}

/// # Safety
/// `handle` must have been produced by [`encode_leaf`] on a leaf that is still alive.
pub unsafe fn decode_leaf<'a>(handle: u64) -> &'a Leaf {
    &*((handle & PAYLOAD_MASK) as *const Leaf)
}

pub fn decode_leaf_ptr(handle: u64) -> *mut Leaf {
    (handle & PAYLOAD_MASK) as *mut Leaf
}
