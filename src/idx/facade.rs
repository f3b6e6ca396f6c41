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

//! The index façade: one API over either ordered-index core, picked
//! by [`IndexConfig::backend`].

use super::art::Art;
use super::btree::Btree;
use super::config::{Backend, IndexConfig};

enum Core {
    Art(Art),
    Btree(Btree),
}

/// A concurrent ordered index: either an [`Art`] or a [`Btree`] behind one API,
/// selected at construction time via [`IndexConfig`].
pub struct Index {
    core: Core,
    max_key_len: Option<usize>,
    fixed_value_len: Option<usize>,
}

impl Index {
    pub fn new(config: IndexConfig) -> Self {
        let core = match config.backend {
            Backend::Art => Core::Art(Art::new()),
            Backend::Btree => Core::Btree(Btree::with_pool(
                config.btree_strategy,
                config.btree_order,
                config.omcs_pool_capacity,
                config.omcs_pool_placement,
            )),
        };
        Self {
            core,
            max_key_len: config.max_key_len,
            fixed_value_len: config.fixed_value_len,
        }
    }

    /// Input-size validation: the façade rejects oversized keys and
    /// mis-sized values before either core ever sees them.
    fn validate(&self, key: &[u8], value: &[u8]) -> crate::IndexResult<()> {
        if let Some(max) = self.max_key_len {
            if key.len() > max {
                return Err(crate::IndexError::KeyTooLarge);
            }
        }
        if let Some(width) = self.fixed_value_len {
            if value.len() != width {
                return Err(crate::IndexError::ValueSizeMismatch);
            }
        }
        Ok(())
    }

    /// Size-checked [`Self::insert`].
    pub fn try_insert(&self, key: &[u8], value: &[u8]) -> crate::IndexResult<bool> {
        self.validate(key, value)?;
        Ok(self.insert(key, value))
    }

    /// Size-checked [`Self::update`].
    pub fn try_update(&self, key: &[u8], value: &[u8]) -> crate::IndexResult<bool> {
        self.validate(key, value)?;
        Ok(self.update(key, value))
    }

    /// Size-checked [`Self::bulk_load`].
    pub fn try_bulk_load<'a, I>(&self, records: I) -> crate::IndexResult<bool>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        for (k, v) in records {
            self.validate(k, v)?;
            if !self.insert(k, v) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn len(&self) -> usize {
        match &self.core {
            Core::Art(a) => a.len(),
            Core::Btree(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find(&self, key: &[u8]) -> Option<Vec<u8>> {
        match &self.core {
            Core::Art(a) => a.find(key),
            Core::Btree(b) => b.find(key),
        }
    }

    /// Returns `false` on duplicate.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> bool {
        match &self.core {
            Core::Art(a) => a.insert(key, value),
            Core::Btree(b) => b.insert(key, value),
        }
    }

    /// Returns `false` if the key is absent.
    pub fn update(&self, key: &[u8], value: &[u8]) -> bool {
        match &self.core {
            Core::Art(a) => a.update(key, value),
            Core::Btree(b) => b.update(key, value),
        }
    }

    /// Returns `false` if the key is absent.
    pub fn remove(&self, key: &[u8]) -> bool {
        match &self.core {
            Core::Art(a) => a.remove(key),
            Core::Btree(b) => b.remove(key),
        }
    }

    /// Up to `n` entries at or after `start`, in ascending key order, plus a
    /// continuation key if more remain.
    pub fn scan(&self, start: &[u8], n: usize) -> (Vec<(Vec<u8>, Vec<u8>)>, Option<Vec<u8>>) {
        match &self.core {
            Core::Art(a) => a.scan(start, n),
            Core::Btree(b) => b.scan(start, n),
        }
    }

    /// Inserts or overwrites; never reports a structural failure.
    pub fn upsert(&self, key: &[u8], value: &[u8]) {
        if !self.insert(key, value) {
            let replaced = self.update(key, value);
            debug_assert!(replaced, "upsert: key vanished between insert and update");
        }
    }

    /// Loads `records` (already-sorted-or-not key/value pairs) one at a time, stopping
    /// at - and reporting - the first duplicate. There is no
    /// dedicated fast bulk-build path for either core; `records` are simply fed through
    /// the ordinary concurrent `insert` path, which is already linearizable, so
    /// `bulk_load` can itself be called concurrently with other operations.
    pub fn bulk_load<'a, I>(&self, records: I) -> bool
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        for (k, v) in records {
            if !self.insert(k, v) {
                return false;
            }
        }
        true
    }

    /// Pre-warms this thread's queue-node slab so the first real operation doesn't pay
    /// for the initial pool refill. A no-op
    /// for any backend/strategy that doesn't draw from a queue-node pool.
    pub fn thread_setup(&self) {
        if let Core::Btree(b) = &self.core {
            b.warm_thread_local_pool();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idx::BtreeStrategy;
    use crate::IndexError;

    fn roundtrip(config: IndexConfig) {
        let idx = Index::new(config);
        idx.thread_setup();
        for i in 0u32..100 {
            assert!(idx.insert(&i.to_be_bytes(), &i.to_be_bytes()));
        }
        assert!(!idx.insert(&0u32.to_be_bytes(), &0u32.to_be_bytes()));
        assert_eq!(idx.len(), 100);
        assert_eq!(idx.find(&42u32.to_be_bytes()), Some(42u32.to_be_bytes().to_vec()));
        assert!(idx.update(&42u32.to_be_bytes(), &7u32.to_be_bytes()));
        assert_eq!(idx.find(&42u32.to_be_bytes()), Some(7u32.to_be_bytes().to_vec()));
        assert!(idx.remove(&42u32.to_be_bytes()));
        assert_eq!(idx.find(&42u32.to_be_bytes()), None);
        idx.upsert(&200u32.to_be_bytes(), &200u32.to_be_bytes());
        assert_eq!(idx.find(&200u32.to_be_bytes()), Some(200u32.to_be_bytes().to_vec()));
        let (page, _) = idx.scan(&0u32.to_be_bytes(), 1000);
        assert!(page.len() >= 99);
    }

    #[test]
    fn art_backend_roundtrip() {
        roundtrip(IndexConfig::new().backend(Backend::Art));
    }

    #[test]
    fn btree_backend_roundtrip_each_strategy() {
        for s in [BtreeStrategy::A, BtreeStrategy::B, BtreeStrategy::C, BtreeStrategy::D] {
            roundtrip(
                IndexConfig::new()
                    .backend(Backend::Btree)
                    .btree_strategy(s)
                    .btree_order(8),
            );
        }
    }

    #[test]
    fn bulk_load_stops_at_first_duplicate() {
        let idx = Index::new(IndexConfig::new());
        let recs = [(b"a".as_slice(), b"1".as_slice()), (b"b", b"2"), (b"a", b"3")];
        assert!(!idx.bulk_load(recs));
        assert_eq!(idx.find(b"a"), Some(b"1".to_vec()));
        assert_eq!(idx.find(b"b"), Some(b"2".to_vec()));
    }

    #[test]
    fn size_validation_rejects_oversized_input() {
        let idx = Index::new(IndexConfig::new().max_key_len(4).fixed_value_len(2));
        assert_eq!(idx.try_insert(b"toolong", b"ok"), Err(IndexError::KeyTooLarge));
        assert_eq!(idx.try_insert(b"ok", b"toolong"), Err(IndexError::ValueSizeMismatch));
        assert_eq!(idx.try_insert(b"ok", b"ok"), Ok(true));
    }
}
