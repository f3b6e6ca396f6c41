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

//! The synchronization toolkit: four interoperable latch flavors plus the queue-node
//! pool they share. Every queue-based latch is generic over a [`handle::Handle`]
//! so the same acquire/release code runs whether queue nodes are addressed by raw pointer
//! or by compact pool offset.

pub mod backoff;
pub mod handle;
pub mod mcsrw;
pub mod omcs;
pub mod optlock;
pub mod pool;

pub use backoff::{Backoff, BackoffPolicy};
pub use optlock::OptLock;

use std::sync::atomic::Ordering;

pub(crate) const ORD_RLX: Ordering = Ordering::Relaxed;
pub(crate) const ORD_ACQ: Ordering = Ordering::Acquire;
pub(crate) const ORD_REL: Ordering = Ordering::Release;
pub(crate) const ORD_ACR: Ordering = Ordering::AcqRel;
pub(crate) const ORD_SEQ: Ordering = Ordering::SeqCst;
