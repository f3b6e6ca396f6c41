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

//! [`OptLock`]: the versioned optimistic latch. A single 64-bit word holds
//! a locked flag in the high bit and a 62-bit version in the rest; readers validate
//! against a version snapshot instead of ever touching the word with a store.

use super::{Backoff, ORD_ACQ, ORD_ACR, ORD_RLX};
use std::sync::atomic::{AtomicU64, Ordering};

const LOCKED_BIT: u64 = 1 << 63;
const VERSION_MASK: u64 = !LOCKED_BIT;
const STRIDE: u64 = 2;

/// An opaque version snapshot returned by [`OptLock::try_begin_read`] and consumed by
/// [`OptLock::validate_read`]/[`OptLock::try_upgrade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version(u64);

/// A versioned optimistic latch.
#[derive(Debug, Default)]
pub struct OptLock {
    word: AtomicU64,
}

impl OptLock {
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    fn is_locked(w: u64) -> bool {
        w & LOCKED_BIT != 0
    }

    /// Attempts to begin an optimistic read. Returns `None` if currently locked, in
    /// which case the caller should retry.
    #[inline]
    pub fn try_begin_read(&self) -> Option<Version> {
        let w = self.word.load(ORD_ACQ);
        if Self::is_locked(w) {
            None
        } else {
            Some(Version(w))
        }
    }

    /// Re-validates a read window: true iff the word has not changed since `v` was
    /// captured.
    #[inline]
    pub fn validate_read(&self, v: Version) -> bool {
        self.word.load(ORD_ACQ) == v.0
    }

    /// Spins until the word is unlocked, then CASes it locked. Returns the version the
    /// caller now holds the latch under.
    pub fn lock(&self) -> Version {
        let backoff = Backoff::new();
        loop {
            let w = self.word.load(ORD_ACQ);
            if !Self::is_locked(w)
                && self
                    .word
                    .compare_exchange_weak(w, w | LOCKED_BIT, ORD_ACR, ORD_RLX)
                    .is_ok()
            {
                return Version(w);
            }
            backoff.snooze();
        }
    }

    /// Attempts to upgrade a previously-seen version `v` straight to exclusive, without
    /// an intervening unlocked observation. Fails if the word has moved since.
    pub fn try_upgrade(&self, v: Version) -> bool {
        debug_assert!(!Self::is_locked(v.0), "optlock: cannot upgrade a locked snapshot");
        self.word
            .compare_exchange(v.0, v.0 | LOCKED_BIT, ORD_ACR, ORD_RLX)
            .is_ok()
    }

    /// Releases the latch, bumping the version and clearing the locked bit. Panics
    /// if the latch was not held.
    pub fn unlock(&self) {
        let w = self.word.load(ORD_RLX);
        debug_assert!(Self::is_locked(w), "optlock: unlock of an unheld latch");
        self.word.store((w & VERSION_MASK) + STRIDE, Ordering::Release);
    }

    /// Releases the latch when the caller already knows the version it locked under
    /// (avoids the redundant load in [`Self::unlock`]).
    pub fn unlock_known(&self, v: Version) {
        self.word
            .store((v.0 & VERSION_MASK) + STRIDE, Ordering::Release);
    }

    /// True if currently locked by some thread. Diagnostic only; never used to decide
    /// correctness - no polling substitutes for validate/upgrade.
    pub fn is_write_locked(&self) -> bool {
        Self::is_locked(self.word.load(ORD_ACQ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn read_validate_roundtrip() {
        let l = OptLock::new();
        let v = l.try_begin_read().unwrap();
        assert!(l.validate_read(v));
    }

    #[test]
    fn lock_blocks_readers_validation() {
        let l = OptLock::new();
        let v0 = l.lock();
        assert!(l.try_begin_read().is_none());
        l.unlock_known(v0);
        let v1 = l.try_begin_read().unwrap();
        assert!(l.validate_read(v1));
        assert_ne!(v0, v1);
    }

    #[test]
    fn upgrade_fails_if_moved() {
        let l = OptLock::new();
        let v = l.try_begin_read().unwrap();
        let v2 = l.lock();
        l.unlock_known(v2);
        assert!(!l.try_upgrade(v));
    }

    #[test]
    fn concurrent_writer_then_consistent_reread() {
        let l = Arc::new(OptLock::new());
        let l2 = l.clone();
        let writer = thread::spawn(move || {
            let v = l2.lock();
            thread::yield_now();
            l2.unlock_known(v);
        });
        loop {
            match l.try_begin_read() {
                None => continue,
                Some(v) => {
                    if l.validate_read(v) {
                        break;
                    }
                }
            }
        }
        writer.join().unwrap();
    }
}
