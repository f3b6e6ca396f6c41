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

//! Concurrent in-memory ordered indexes: an adaptive radix tree and a B+-tree, both
//! built on a shared synchronization toolkit (optimistic latches, a queue-based
//! exclusive latch and a queue-based reader-writer latch) with two addressing modes
//! for queue nodes (raw pointer, compact pool offset).

pub mod idx;
pub mod mem;
pub mod sync;

pub use idx::{Backend, BtreeStrategy, Index, IndexConfig};

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Input-size error class. Anything else a caller can hit - a missing key
/// on `update`/`remove`, a duplicate on `insert` - is a plain `bool` in the façade's
/// return value, not an error.
pub enum IndexError {
    /// A key exceeded the configured maximum key length.
    KeyTooLarge,
    /// A value did not match the index's fixed record width.
    ValueSizeMismatch,
    /// The queue-node pool has no more slots to hand out.
    PoolExhausted,
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Self::KeyTooLarge => "key exceeds the configured maximum length",
            Self::ValueSizeMismatch => "value does not match the index's record width",
            Self::PoolExhausted => "queue-node pool exhausted",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IndexError {}
