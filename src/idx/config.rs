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

//! The tuning knobs an [`Index`](super::Index) is built from: which core
//! backs it, the B+-tree's page order and latching strategy, the OMCS queue-node
//! pool's size and NUMA placement, and the façade's input-size limits.
//! The ART hotness sampler's probability/threshold stay compile-time
//! constants (`idx::art::HOTNESS_SAMPLE_CUTOFF`/`HOTNESS_THRESHOLD`) rather than
//! per-instance knobs - see `DESIGN.md`.

pub use crate::idx::btree::Strategy as BtreeStrategy;
use crate::sync::pool::PoolPlacement;

/// Which of the two ordered-index cores an [`Index`](super::Index) is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Art,
    Btree,
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub(crate) backend: Backend,
    pub(crate) btree_strategy: BtreeStrategy,
    pub(crate) btree_order: usize,
    pub(crate) omcs_pool_capacity: u32,
    pub(crate) omcs_pool_placement: PoolPlacement,
    pub(crate) max_key_len: Option<usize>,
    pub(crate) fixed_value_len: Option<usize>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Art,
            btree_strategy: BtreeStrategy::A,
            btree_order: 64,
            omcs_pool_capacity: 1 << 10,
            omcs_pool_placement: PoolPlacement::Interleaved,
            max_key_len: None,
            fixed_value_len: None,
        }
    }
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Selects the B+-tree latching strategy.
    pub fn btree_strategy(mut self, strategy: BtreeStrategy) -> Self {
        self.btree_strategy = strategy;
        self
    }

    /// Sets the B+-tree's page order (max keys per node before a split).
    pub fn btree_order(mut self, order: usize) -> Self {
        assert!(order >= 4, "btree order must be at least 4");
        self.btree_order = order;
        self
    }

    /// Sets the OMCS queue-node pool capacity, used only when `btree_strategy` is
    /// [`BtreeStrategy::C`].
    pub fn omcs_pool_capacity(mut self, capacity: u32) -> Self {
        self.omcs_pool_capacity = capacity;
        self
    }

    pub fn omcs_pool_placement(mut self, placement: PoolPlacement) -> Self {
        self.omcs_pool_placement = placement;
        self
    }

    /// Caps accepted key length ; unset means no limit is enforced.
    pub fn max_key_len(mut self, len: usize) -> Self {
        self.max_key_len = Some(len);
        self
    }

    /// Fixes the accepted value width ; unset means any length is accepted.
    pub fn fixed_value_len(mut self, len: usize) -> Self {
        self.fixed_value_len = Some(len);
        self
    }
}
