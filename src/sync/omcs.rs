/*
 * Created on Thu Feb 05 2026
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

//! OMCS: the optimistic MCS latch. The lock's single 64-bit tail word
//! doubles as a version carrier when unlocked, so optimistic readers never touch the
//! cache line beyond a load - the same trick [`super::optlock::OptLock`] uses, but now
//! composed with an actual FIFO queue of waiters instead of a bare spin.

use super::handle::AddrMode;
use super::pool::Pool;
use super::{Backoff, ORD_ACQ, ORD_RLX, ORD_SEQ};
use std::sync::atomic::{AtomicU64, Ordering};

const LOCKED_BIT: u64 = 1 << 63;
const CONSISTENT_BIT: u64 = 1 << 62;
const PAYLOAD_MASK: u64 = !(LOCKED_BIT | CONSISTENT_BIT);
const STRIDE: u64 = 4;

/// A queue node used by [`Omcs`]. 128-byte aligned so it never shares a cache line with
/// a neighbor in the pool.
#[repr(align(128))]
pub struct OmcsQNode {
    next: AtomicU64,
    version: AtomicU64,
}

impl Default for OmcsQNode {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(0),
            version: AtomicU64::new(0),
        }
    }
}

/// A version snapshot. `word` is the exact tail word observed at capture time (used to
/// detect "nothing changed at all"); `value` is the numeric version extracted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OmcsVersion {
    word: u64,
    value: u64,
}

/// A handle to a node this thread currently owns inside the queue; returned by
/// [`Omcs::acquire`] and consumed by [`Omcs::release`]/[`Omcs::try_upgrade`].
pub struct OmcsTicket<'p> {
    payload: u64,
    _mode: std::marker::PhantomData<&'p ()>,
}

/// The optimistic MCS latch itself.
pub struct Omcs<'p> {
    tail: AtomicU64,
    mode: AddrMode<'p, OmcsQNode>,
}

fn is_handle(w: u64) -> bool {
    w & LOCKED_BIT != 0
}

impl<'p> Omcs<'p> {
    pub fn new_pointer_mode() -> Self {
        Self {
            tail: AtomicU64::new(0),
            mode: AddrMode::Pointer,
        }
    }

    pub fn new_pool_mode(pool: &'p Pool<OmcsQNode>) -> Self {
        Self {
            tail: AtomicU64::new(0),
            mode: AddrMode::Pool(pool),
        }
    }

    /// Begins an optimistic read: returns `None` if the tail is a handle without the
    /// transient consistent bit set, else a version snapshot.
    pub fn try_begin_read(&self) -> Option<OmcsVersion> {
        let w = self.tail.load(ORD_ACQ);
        if !is_handle(w) {
            return Some(OmcsVersion {
                word: w,
                value: w & PAYLOAD_MASK,
            });
        }
        if w & CONSISTENT_BIT != 0 {
            // the holder is between critical section and release; its node address is
            // still a real, resolvable handle, but it has already stashed the
            // about-to-be-published version in `node.version` for exactly this case.
            let node = unsafe {
                // UNSAFE(@latchidx): a node carrying the consistent bit is always a
                // live node still owned by the departing holder.
                self.mode.resolve(w & PAYLOAD_MASK)
            };
            return Some(OmcsVersion {
                word: w,
                value: node.version.load(ORD_ACQ),
            });
        }
        None
    }

    pub fn validate_read(&self, v: OmcsVersion) -> bool {
        let w = self.tail.load(ORD_ACQ);
        if w == v.word {
            return true;
        }
        !is_handle(w) && (w & PAYLOAD_MASK) == v.value
    }

    /// Acquires the latch, enqueueing a fresh node.
    pub fn acquire(&self, node: &'p OmcsQNode) -> OmcsTicket<'p> {
        node.next.store(0, ORD_RLX);
        node.version.store(0, ORD_RLX);
        let my_payload = self.mode.encode(node) | LOCKED_BIT;
        let prev = self.tail.swap(my_payload, Ordering::SeqCst);
        if !is_handle(prev) {
            // queue was empty: caller acquires directly, seeding our own version
            let base = prev & PAYLOAD_MASK;
            node.version
                .store(base.wrapping_add(STRIDE) & PAYLOAD_MASK, ORD_RLX);
        } else {
            let prev_node = unsafe {
                // UNSAFE(@latchidx): `prev` was produced by a live acquirer's encode()
                self.mode.resolve((prev & PAYLOAD_MASK) as u64)
            };
            prev_node.next.store(self.mode.encode(node), Ordering::Release);
            let backoff = Backoff::new();
            while node.version.load(ORD_ACQ) == 0 {
                backoff.snooze();
            }
        }
        OmcsTicket {
            payload: my_payload,
            _mode: std::marker::PhantomData,
        }
    }

    /// Releases the latch held under `ticket`. Publishes the transient
    /// "consistent" bit first so an in-flight optimistic reader can still make progress.
    pub fn release(&self, node: &'p OmcsQNode, ticket: OmcsTicket<'p>) {
        let held_version = node.version.load(ORD_RLX);
        let next_version = held_version.wrapping_add(STRIDE) & PAYLOAD_MASK;
        let next_payload = node.next.load(ORD_ACQ);
        if next_payload == 0 {
            // stash the value that will become globally visible *before* publishing
            // the consistent word, so a concurrent optimistic reader that resolves our
            // node in between always sees the right thing.
            node.version.store(next_version, Ordering::Release);
            let consistent_word = ticket.payload | CONSISTENT_BIT;
            self.tail.store(consistent_word, Ordering::Release);
            if self
                .tail
                .compare_exchange(consistent_word, next_version, ORD_SEQ, ORD_RLX)
                .is_ok()
            {
                return;
            }
            // a successor enqueued concurrently (its swap overwrote our consistent
            // word); wait for it to link itself in, then hand off directly.
            let backoff = Backoff::new();
            loop {
                let np = node.next.load(ORD_ACQ);
                if np != 0 {
                    let succ = unsafe {
                        // UNSAFE(@latchidx): successor published its own address into
                        // `node.next` and is spinning on `version`, so it is still alive.
                        self.mode.resolve(np)
                    };
                    succ.version.store(next_version, Ordering::Release);
                    return;
                }
                backoff.snooze();
            }
        } else {
            let succ = unsafe {
                // UNSAFE(@latchidx): see above
                self.mode.resolve(next_payload)
            };
            succ.version.store(next_version, Ordering::Release);
        }
    }

    /// Upgrades an optimistic read at version `v` straight to exclusive ownership.
    /// On success the caller now owns the latch via the returned ticket.
    pub fn try_upgrade(&self, v: OmcsVersion, node: &'p OmcsQNode) -> Option<OmcsTicket<'p>> {
        debug_assert!(!is_handle(v.word), "omcs: upgrade requires an unlocked snapshot");
        node.next.store(0, ORD_RLX);
        let my_payload = self.mode.encode(node) | LOCKED_BIT;
        if self
            .tail
            .compare_exchange(v.word, my_payload, ORD_SEQ, ORD_RLX)
            .is_ok()
        {
            node.version
                .store(v.value.wrapping_add(STRIDE) & PAYLOAD_MASK, ORD_RLX);
            Some(OmcsTicket {
                payload: my_payload,
                _mode: std::marker::PhantomData,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_threaded_acquire_release() {
        let lock = Omcs::new_pointer_mode();
        let node = OmcsQNode::default();
        let ticket = lock.acquire(&node);
        lock.release(&node, ticket);
        let v = lock.try_begin_read().unwrap();
        assert!(lock.validate_read(v));
    }

    #[test]
    fn optimistic_reader_sees_consistent_bit_during_release_window() {
        let lock = Omcs::new_pointer_mode();
        let node = OmcsQNode::default();
        let ticket = lock.acquire(&node);
        // simulate the release's transient publish without completing the CAS by
        // directly checking try_begin_read reads a handle-shaped word as locked
        assert!(lock.try_begin_read().is_none());
        lock.release(&node, ticket);
        assert!(lock.try_begin_read().is_some());
    }

    #[test]
    fn contended_mutual_exclusion() {
        let lock = Arc::new(Omcs::<'static>::new_pointer_mode());
        let counter = Arc::new(StdAtomicU64::new(0));
        let mut handles = vec![];
        for _ in 0..6 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..2000 {
                    let node = Box::leak(Box::new(OmcsQNode::default()));
                    let ticket = lock.acquire(node);
                    counter.fetch_add(1, Ordering::Relaxed);
                    lock.release(node, ticket);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 12000);
    }
}
