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

//! The four B+-tree latching strategies, unified behind one enum so the
//! tree-walking code in [`super::mod`] is written once and just asks each node's latch
//! "begin a read", "validate", "upgrade", "lock", "unlock" without caring which flavor
//! backs it.
//!
//! - **A** - full optimistic lock coupling: every node is an [`OptLock`].
//! - **B** - hybrid: inner nodes are optimistic, leaves latch with [`Mcsrw`] - shared for
//! lookups, exclusive only for the mutation itself, so concurrent readers of a leaf no
//! longer serialize behind one another the way a blocking mutex would.
//! - **C** - every node is an [`Omcs`] latch in pool-addressing mode.
//! - **D** - every node is a plain [`Tatas`] mutex, taken top-down and held for the
//! whole operation (the pessimistic fallback).

use crate::sync::backoff::Tatas;
use crate::sync::mcsrw::{Mcsrw, McsrwQNode, ReaderTicket, WriterTicket};
use crate::sync::omcs::{Omcs, OmcsQNode, OmcsVersion};
use crate::sync::optlock::{OptLock, Version as OptVersion};
use crate::sync::pool::Pool;
use crate::sync::BackoffPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Full optimistic lock coupling everywhere.
    A,
    /// Optimistic inner nodes, MCSRW leaves.
    B,
    /// Optimistic MCS (OMCS) everywhere.
    C,
    /// Pessimistic top-down lock coupling.
    D,
}

pub enum NodeLatch {
    Opt(OptLock),
    Mutex(Tatas),
    Omcs(Omcs<'static>),
    Mcsrw(Mcsrw<'static>),
}

#[derive(Clone, Copy)]
pub enum ReadToken {
    Opt(OptVersion),
    Omcs(OmcsVersion),
    /// A live share on an [`Mcsrw`] leaf latch - unlike the other two variants this
    /// isn't a version to revalidate, it's an outstanding hold that must eventually be
    /// released through [`NodeLatch::end_read`] or consumed by
    /// [`NodeLatch::try_upgrade`].
    Mcsrw { idx: u32, ticket: ReaderTicket<'static> },
}

pub enum WriteToken {
    Opt(OptVersion),
    Mutex,
    Omcs { idx: u32, ticket: crate::sync::omcs::OmcsTicket<'static> },
    Mcsrw { idx: u32, ticket: WriterTicket<'static> },
}

impl NodeLatch {
    pub fn new(
        strategy: Strategy,
        is_leaf: bool,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) -> Self {
        match (strategy, is_leaf) {
            (Strategy::A, _) => NodeLatch::Opt(OptLock::new()),
            (Strategy::B, false) => NodeLatch::Opt(OptLock::new()),
            (Strategy::B, true) => {
                NodeLatch::Mcsrw(Mcsrw::new_pool_mode(mcsrw_pool.expect("strategy B leaves require an MCSRW pool")))
            }
            (Strategy::C, _) => {
                NodeLatch::Omcs(Omcs::new_pool_mode(omcs_pool.expect("strategy C requires an OMCS pool")))
            }
            (Strategy::D, _) => NodeLatch::Mutex(Tatas::new(BackoffPolicy::default())),
        }
    }

    /// Attempts to begin a read. For `Opt`/`Omcs` this is a non-blocking version
    /// snapshot; `None` means "currently locked", which callers treat the same as "no
    /// optimistic mode here" and fall back to blocking. For `Mcsrw` it is a real
    /// (blocking) shared-mode acquire - always `Some` - so concurrent readers run
    /// alongside each other rather than behind a single mutex.
    pub fn begin_read(&self, mcsrw_pool: Option<&'static Pool<McsrwQNode>>) -> Option<ReadToken> {
        match self {
            NodeLatch::Opt(l) => l.try_begin_read().map(ReadToken::Opt),
            NodeLatch::Omcs(o) => o.try_begin_read().map(ReadToken::Omcs),
            NodeLatch::Mutex(_) => None,
            NodeLatch::Mcsrw(rw) => {
                let pool = mcsrw_pool.expect("strategy B leaves require an MCSRW pool");
                let idx = match pool.alloc(McsrwQNode::default()) {
                    Ok(idx) => idx,
                    Err(e) => {
                        log::error!("btree: {e}");
                        panic!("{e}");
                    }
                };
                let node = pool.get(idx);
                let ticket = rw.reader_acquire(node);
                Some(ReadToken::Mcsrw { idx, ticket })
            }
        }
    }

    /// True iff nothing has changed since `tok` was captured. For `Mcsrw`, the shared
    /// latch is still held, so nothing *can* have changed - always true.
    pub fn validate(&self, tok: ReadToken) -> bool {
        match (self, tok) {
            (NodeLatch::Opt(l), ReadToken::Opt(v)) => l.validate_read(v),
            (NodeLatch::Omcs(o), ReadToken::Omcs(v)) => o.validate_read(v),
            (NodeLatch::Mcsrw(_), ReadToken::Mcsrw { .. }) => true,
            _ => false,
        }
    }

    /// Ends a read begun with [`Self::begin_read`] that is not being upgraded. No-op for
    /// `Opt`/`Omcs` (nothing was ever held); releases the shared hold for `Mcsrw`.
    pub fn end_read(&self, tok: ReadToken, mcsrw_pool: Option<&'static Pool<McsrwQNode>>) {
        if let (NodeLatch::Mcsrw(rw), ReadToken::Mcsrw { idx, ticket }) = (self, tok) {
            let pool = mcsrw_pool.expect("strategy B leaves require an MCSRW pool");
            let node = pool.get(idx);
            rw.reader_release(node, ticket);
            pool.free(idx);
        }
    }

    /// Always succeeds eventually (spins/blocks). For `Omcs`/`Mcsrw`, draws a fresh
    /// queue node from the relevant pool for the duration of the hold.
    pub fn lock_blocking(
        &self,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) -> WriteToken {
        match self {
            NodeLatch::Opt(l) => WriteToken::Opt(l.lock()),
            NodeLatch::Mutex(m) => {
                m.lock();
                WriteToken::Mutex
            }
            NodeLatch::Omcs(o) => {
                let pool = omcs_pool.expect("strategy C requires an OMCS pool");
                let idx = match pool.alloc(OmcsQNode::default()) {
                    Ok(idx) => idx,
                    Err(e) => {
                        log::error!("btree: {e}");
                        panic!("{e}");
                    }
                };
                let node = pool.get(idx);
                let ticket = o.acquire(node);
                WriteToken::Omcs { idx, ticket }
            }
            NodeLatch::Mcsrw(rw) => {
                let pool = mcsrw_pool.expect("strategy B leaves require an MCSRW pool");
                let idx = match pool.alloc(McsrwQNode::default()) {
                    Ok(idx) => idx,
                    Err(e) => {
                        log::error!("btree: {e}");
                        panic!("{e}");
                    }
                };
                let node = pool.get(idx);
                let ticket = rw.writer_acquire(node);
                WriteToken::Mcsrw { idx, ticket }
            }
        }
    }

    /// Tries to upgrade a previously-captured read straight to exclusive. `Opt`/`Omcs`
    /// do this with a single CAS against the still-valid version, failing (and handing
    /// the caller nothing to release) if it moved. `Mcsrw` has no compare-and-swap
    /// upgrade path, so it releases the shared hold and re-acquires exclusively - always
    /// succeeding, at the cost of a short window where another writer could interleave
    /// (harmless here: the caller always re-reads under the new exclusive hold before
    /// acting on anything).
    pub fn try_upgrade(
        &self,
        tok: ReadToken,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) -> Option<WriteToken> {
        match (self, tok) {
            (NodeLatch::Opt(l), ReadToken::Opt(v)) => {
                if l.try_upgrade(v) {
                    Some(WriteToken::Opt(v))
                } else {
                    None
                }
            }
            (NodeLatch::Omcs(o), ReadToken::Omcs(v)) => {
                let pool = omcs_pool.expect("strategy C requires an OMCS pool");
                let idx = pool.alloc(OmcsQNode::default()).ok()?;
                let node = pool.get(idx);
                let ticket = o.try_upgrade(v, node)?;
                Some(WriteToken::Omcs { idx, ticket })
            }
            (NodeLatch::Mcsrw(rw), ReadToken::Mcsrw { idx: read_idx, ticket: read_ticket }) => {
                let pool = mcsrw_pool.expect("strategy B leaves require an MCSRW pool");
                let read_node = pool.get(read_idx);
                rw.reader_release(read_node, read_ticket);
                pool.free(read_idx);
                let write_idx = match pool.alloc(McsrwQNode::default()) {
                    Ok(idx) => idx,
                    Err(e) => {
                        log::error!("btree: {e}");
                        panic!("{e}");
                    }
                };
                let write_node = pool.get(write_idx);
                let ticket = rw.writer_acquire(write_node);
                Some(WriteToken::Mcsrw { idx: write_idx, ticket })
            }
            _ => None,
        }
    }

    pub fn unlock(
        &self,
        tok: WriteToken,
        omcs_pool: Option<&'static Pool<OmcsQNode>>,
        mcsrw_pool: Option<&'static Pool<McsrwQNode>>,
    ) {
        match (self, tok) {
            (NodeLatch::Opt(l), WriteToken::Opt(v)) => l.unlock_known(v),
            (NodeLatch::Mutex(m), WriteToken::Mutex) => m.unlock(),
            (NodeLatch::Omcs(o), WriteToken::Omcs { idx, ticket }) => {
                let pool = omcs_pool.expect("strategy C requires an OMCS pool");
                let node = pool.get(idx);
                o.release(node, ticket);
                pool.free(idx);
            }
            (NodeLatch::Mcsrw(rw), WriteToken::Mcsrw { idx, ticket }) => {
                let pool = mcsrw_pool.expect("strategy B leaves require an MCSRW pool");
                let node = pool.get(idx);
                rw.writer_release(node, ticket);
                pool.free(idx);
            }
            _ => unreachable!("latch/token flavor mismatch"),
        }
    }
}
