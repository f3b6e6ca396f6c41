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

//! The two queue-node addressing modes shared by OMCS and MCSRW:
//! raw 64-bit pointers to heap/stack-resident nodes, or a compact offset into a
//! pre-allocated [`Pool`]. Both modes resolve down to `&T` before a latch ever touches
//! a field, so the acquire/release algorithms never need to know which one is active.

use super::pool::Pool;

/// How a latch addresses its own queue nodes. Chosen once, at construction.
pub enum AddrMode<'p, T> {
    /// Queue nodes are plain pointers (caller-owned: stack or a `Box`).
    Pointer,
    /// Queue nodes live in a shared, pre-allocated pool; the lock word only ever
    /// carries the pool-relative index.
    Pool(&'p Pool<T>),
}

impl<'p, T> AddrMode<'p, T> {
    /// Encodes a reference to a queue node as the payload bits stored in a lock word.
    /// For pointer mode this is the pointer's bit pattern; for pool mode it is the
    /// node's index inside the pool, generalizing the compact-handle idea to fit
    /// the tag scheme used by [`super::omcs`]/[`super::mcsrw`].
    pub fn encode(&self, node: &T) -> u64 {
        match self {
            AddrMode::Pointer => node as *const T as u64,
            AddrMode::Pool(pool) => pool.index_of(node) as u64,
        }
    }

    /// Resolves payload bits back into a reference. The returned lifetime is
    /// unconstrained by this call; callers must not outlive the node's validity
    /// (guaranteed by the caller's lock-coupling / epoch-reclamation discipline).
    ///
    /// # Safety
    /// `payload` must have been produced by [`Self::encode`] on a node that is still
    /// alive and, in pointer mode, still owned by the caller.
    pub unsafe fn resolve<'a>(&self, payload: u64) -> &'a T {
        match self {
            AddrMode::Pointer => &*(payload as *const T),
            AddrMode::Pool(pool) => pool.get(payload as u32),
        }
    }
}
