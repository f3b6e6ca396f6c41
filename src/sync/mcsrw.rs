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

//! MCSRW: the Krieger/Scott/Mellor-Crummey queue-based reader-writer latch,
//! plus the two centralized reader-preference/writer-preference latches kept around for
//! comparison.

use super::handle::AddrMode;
use super::pool::Pool;
use super::{Backoff, ORD_ACQ, ORD_RLX, ORD_SEQ};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

const HANDLE_BIT: u64 = 1 << 63;
const PAYLOAD_MASK: u64 = !HANDLE_BIT;

const CLASS_READING: u8 = 0;
const CLASS_WRITING: u8 = 1;

const SUCC_NONE: u8 = 0;
const SUCC_READER: u8 = 1;
const SUCC_WRITER: u8 = 2;

/// A queue node used by [`Mcsrw`]. Carries its own class (reader/writer), a `blocked`
/// flag and the class of whatever links in behind it, so a waking thread knows whether
/// to chain-wake a reader successor.
#[repr(align(128))]
pub struct McsrwQNode {
    next: AtomicU64,
    class: AtomicU8,
    blocked: AtomicU8,
    successor_class: AtomicU8,
}

impl McsrwQNode {
    fn reset(&self, class: u8) {
        self.next.store(0, ORD_RLX);
        self.class.store(class, ORD_RLX);
        self.blocked.store(1, ORD_RLX);
        self.successor_class.store(SUCC_NONE, ORD_RLX);
    }

    fn class(&self) -> u8 {
        self.class.load(ORD_ACQ)
    }

    fn is_blocked(&self) -> bool {
        self.blocked.load(ORD_ACQ) != 0
    }

    fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked as u8, Ordering::Release);
    }

    fn successor_class(&self) -> u8 {
        self.successor_class.load(ORD_ACQ)
    }
}

impl Default for McsrwQNode {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(0),
            class: AtomicU8::new(CLASS_READING),
            blocked: AtomicU8::new(1),
            successor_class: AtomicU8::new(SUCC_NONE),
        }
    }
}

/// Held by a writer between [`Mcsrw::writer_acquire`] and [`Mcsrw::writer_release`].
#[derive(Clone, Copy)]
pub struct WriterTicket<'p> {
    handle: u64,
    _mode: std::marker::PhantomData<&'p ()>,
}

/// Held by a reader between [`Mcsrw::reader_acquire`] and [`Mcsrw::reader_release`].
/// Copy, like [`super::omcs::OmcsVersion`]: it carries nothing but the queue handle a
/// release needs, so callers that re-derive a write latch from an outstanding read (see
/// `idx::btree::latch`) can hand a copy to the path that doesn't end up using it.
#[derive(Clone, Copy)]
pub struct ReaderTicket<'p> {
    handle: u64,
    _mode: std::marker::PhantomData<&'p ()>,
}

/// The queue-based reader-writer latch itself.
pub struct Mcsrw<'p> {
    tail: AtomicU64,
    next_writer: AtomicU64,
    readers: AtomicU32,
    mode: AddrMode<'p, McsrwQNode>,
}

fn has_handle(w: u64) -> bool {
    w & HANDLE_BIT != 0
}

impl<'p> Mcsrw<'p> {
    pub fn new_pointer_mode() -> Self {
        Self {
            tail: AtomicU64::new(0),
            next_writer: AtomicU64::new(0),
            readers: AtomicU32::new(0),
            mode: AddrMode::Pointer,
        }
    }

    pub fn new_pool_mode(pool: &'p Pool<McsrwQNode>) -> Self {
        Self {
            tail: AtomicU64::new(0),
            next_writer: AtomicU64::new(0),
            readers: AtomicU32::new(0),
            mode: AddrMode::Pool(pool),
        }
    }

    pub fn reader_count(&self) -> u32 {
        self.readers.load(ORD_ACQ)
    }

    fn encode(&self, node: &'p McsrwQNode) -> u64 {
        self.mode.encode(node) | HANDLE_BIT
    }

    unsafe fn resolve(&self, handle: u64) -> &'p McsrwQNode {
        // UNSAFE(@latchidx): `handle` was produced by `encode` on a node that is still
        // queued (and therefore still owned by its thread or already republished).
        self.mode.resolve(handle & PAYLOAD_MASK)
    }

    /// Writer acquire.
    pub fn writer_acquire(&self, node: &'p McsrwQNode) -> WriterTicket<'p> {
        node.reset(CLASS_WRITING);
        let my_handle = self.encode(node);
        let prev = self.tail.swap(my_handle, ORD_SEQ);
        if has_handle(prev) {
            let pred = unsafe { self.resolve(prev) };
            pred.successor_class.store(SUCC_WRITER, Ordering::Release);
            std::sync::atomic::fence(Ordering::SeqCst);
            pred.next.store(my_handle, Ordering::Release);
            let backoff = Backoff::new();
            while node.is_blocked() {
                backoff.snooze();
            }
        } else {
            self.next_writer.store(my_handle, Ordering::Release);
            let acquired_directly = self.readers.load(ORD_ACQ) == 0
                && self
                    .next_writer
                    .compare_exchange(my_handle, 0, Ordering::AcqRel, ORD_RLX)
                    .is_ok();
            if !acquired_directly {
                let backoff = Backoff::new();
                while node.is_blocked() {
                    backoff.snooze();
                }
            }
        }
        WriterTicket {
            handle: my_handle,
            _mode: std::marker::PhantomData,
        }
    }

    /// Wakes `node` and, if its own recorded successor is a reader, chain-wakes that
    /// reader too, recursively.
    fn chain_wake(&self, node: &'p McsrwQNode) {
        node.set_blocked(false);
        if node.successor_class() == SUCC_READER {
            let backoff = Backoff::new();
            let mut next = node.next.load(ORD_ACQ);
            while next == 0 {
                backoff.snooze();
                next = node.next.load(ORD_ACQ);
            }
            let succ = unsafe { self.resolve(next) };
            self.readers.fetch_add(1, Ordering::AcqRel);
            self.chain_wake(succ);
        }
    }

    /// Writer release.
    pub fn writer_release(&self, node: &'p McsrwQNode, ticket: WriterTicket<'p>) {
        let mut next = node.next.load(ORD_ACQ);
        if next == 0 {
            if self
                .tail
                .compare_exchange(ticket.handle, 0, ORD_SEQ, ORD_RLX)
                .is_ok()
            {
                return;
            }
            let backoff = Backoff::new();
            loop {
                next = node.next.load(ORD_ACQ);
                if next != 0 {
                    break;
                }
                backoff.snooze();
            }
        }
        let succ = unsafe { self.resolve(next) };
        self.chain_wake(succ);
    }

    /// Reader acquire.
    pub fn reader_acquire(&self, node: &'p McsrwQNode) -> ReaderTicket<'p> {
        node.reset(CLASS_READING);
        let my_handle = self.encode(node);
        let prev = self.tail.swap(my_handle, ORD_SEQ);
        if !has_handle(prev) {
            self.readers.fetch_add(1, Ordering::AcqRel);
            node.set_blocked(false);
        } else {
            let pred = unsafe { self.resolve(prev) };
            if pred.class() == CLASS_WRITING {
                pred.next.store(my_handle, Ordering::Release);
                let backoff = Backoff::new();
                while node.is_blocked() {
                    backoff.snooze();
                }
            } else {
                let backoff = Backoff::new();
                loop {
                    if !pred.is_blocked() {
                        // predecessor already unblocked: its queue position is settled,
                        // safe to link in and become runnable immediately.
                        self.readers.fetch_add(1, Ordering::AcqRel);
                        pred.next.store(my_handle, Ordering::Release);
                        node.set_blocked(false);
                        break;
                    }
                    if pred.successor_class.compare_exchange(
                        SUCC_NONE,
                        SUCC_READER,
                        Ordering::AcqRel,
                        ORD_RLX,
                    )
                        .is_ok()
                    {
                        pred.next.store(my_handle, Ordering::Release);
                        while node.is_blocked() {
                            backoff.snooze();
                        }
                        break;
                    }
                    backoff.snooze();
                }
            }
        }
        ReaderTicket {
            handle: my_handle,
            _mode: std::marker::PhantomData,
        }
    }

    /// Reader release.
    pub fn reader_release(&self, node: &'p McsrwQNode, ticket: ReaderTicket<'p>) {
        let mut next = node.next.load(ORD_ACQ);
        let mut had_successor = next != 0;
        if !had_successor {
            if self
                .tail
                .compare_exchange(ticket.handle, 0, ORD_SEQ, ORD_RLX)
                .is_ok()
            {
                had_successor = false;
            } else {
                let backoff = Backoff::new();
                loop {
                    next = node.next.load(ORD_ACQ);
                    if next != 0 {
                        break;
                    }
                    backoff.snooze();
                }
                had_successor = true;
            }
        }
        if had_successor {
            // a writer successor was linked in directly behind us (its acquire already
            // fenced `successor_class` before storing `next`); wake it the same way a
            // writer release wakes a reader successor, rather than bouncing the handoff
            // back through `next_writer`.
            if node.successor_class() == SUCC_WRITER {
                let succ = unsafe { self.resolve(next) };
                succ.set_blocked(false);
            }
        }
        if self.readers.fetch_sub(1, Ordering::AcqRel) == 1 {
            let waiting = self.next_writer.load(ORD_ACQ);
            if waiting != 0
                && self
                    .next_writer
                    .compare_exchange(waiting, 0, Ordering::AcqRel, ORD_RLX)
                    .is_ok()
            {
                let succ = unsafe { self.resolve(waiting) };
                succ.set_blocked(false);
            }
        }
    }
}

/// Classic first-readers-writers solution: readers never wait behind a queued writer,
/// so a steady stream of readers can starve writers indefinitely.
pub struct ReaderPreferenceRw {
    readers: AtomicU32,
    counter_guard: super::backoff::Tatas,
    resource: super::backoff::Tatas,
}

impl ReaderPreferenceRw {
    pub fn new() -> Self {
        Self {
            readers: AtomicU32::new(0),
            counter_guard: super::backoff::Tatas::new(super::BackoffPolicy::default()),
            resource: super::backoff::Tatas::new(super::BackoffPolicy::default()),
        }
    }

    pub fn read_lock(&self) {
        self.counter_guard.lock();
        if self.readers.fetch_add(1, Ordering::AcqRel) == 0 {
            self.resource.lock();
        }
        self.counter_guard.unlock();
    }

    pub fn read_unlock(&self) {
        self.counter_guard.lock();
        if self.readers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.resource.unlock();
        }
        self.counter_guard.unlock();
    }

    pub fn write_lock(&self) {
        self.resource.lock();
    }

    pub fn write_unlock(&self) {
        self.resource.unlock();
    }
}

impl Default for ReaderPreferenceRw {
    fn default() -> Self {
        Self::new()
    }
}

/// Classic second-readers-writers solution: a waiting writer blocks any reader that has
/// not yet entered, so writers cannot be starved but readers can be.
pub struct WriterPreferenceRw {
    readers: AtomicU32,
    writers_waiting: AtomicU32,
    read_count_guard: super::backoff::Tatas,
    write_count_guard: super::backoff::Tatas,
    read_admission: super::backoff::Tatas,
    resource: super::backoff::Tatas,
}

impl WriterPreferenceRw {
    pub fn new() -> Self {
        Self {
            readers: AtomicU32::new(0),
            writers_waiting: AtomicU32::new(0),
            read_count_guard: super::backoff::Tatas::new(super::BackoffPolicy::default()),
            write_count_guard: super::backoff::Tatas::new(super::BackoffPolicy::default()),
            read_admission: super::backoff::Tatas::new(super::BackoffPolicy::default()),
            resource: super::backoff::Tatas::new(super::BackoffPolicy::default()),
        }
    }

    pub fn read_lock(&self) {
        self.read_admission.lock();
        self.read_count_guard.lock();
        if self.readers.fetch_add(1, Ordering::AcqRel) == 0 {
            self.resource.lock();
        }
        self.read_count_guard.unlock();
        self.read_admission.unlock();
    }

    pub fn read_unlock(&self) {
        self.read_count_guard.lock();
        if self.readers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.resource.unlock();
        }
        self.read_count_guard.unlock();
    }

    pub fn write_lock(&self) {
        self.write_count_guard.lock();
        if self.writers_waiting.fetch_add(1, Ordering::AcqRel) == 0 {
            self.read_admission.lock();
        }
        self.write_count_guard.unlock();
        self.resource.lock();
    }

    pub fn write_unlock(&self) {
        self.resource.unlock();
        self.write_count_guard.lock();
        if self.writers_waiting.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.read_admission.unlock();
        }
        self.write_count_guard.unlock();
    }
}

impl Default for WriterPreferenceRw {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_writer_roundtrip() {
        let lock = Mcsrw::new_pointer_mode();
        let node = McsrwQNode::default();
        let ticket = lock.writer_acquire(&node);
        lock.writer_release(&node, ticket);
        assert_eq!(lock.reader_count(), 0);
    }

    #[test]
    fn concurrent_readers_see_each_other() {
        let lock = Mcsrw::new_pointer_mode();
        let n1 = McsrwQNode::default();
        let n2 = McsrwQNode::default();
        let t1 = lock.reader_acquire(&n1);
        let t2 = lock.reader_acquire(&n2);
        assert_eq!(lock.reader_count(), 2);
        lock.reader_release(&n1, t1);
        assert_eq!(lock.reader_count(), 1);
        lock.reader_release(&n2, t2);
        assert_eq!(lock.reader_count(), 0);
    }

    #[test]
    fn writer_excludes_readers_and_vice_versa() {
        let lock = Arc::new(Mcsrw::<'static>::new_pointer_mode());
        let value = Arc::new(AtomicI64::new(0));
        let mut handles = vec![];
        for i in 0..4 {
            let lock = lock.clone();
            let value = value.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    if i % 2 == 0 {
                        let node = Box::leak(Box::new(McsrwQNode::default()));
                        let t = lock.writer_acquire(node);
                        value.fetch_add(1, Ordering::Relaxed);
                        lock.writer_release(node, t);
                    } else {
                        let node = Box::leak(Box::new(McsrwQNode::default()));
                        let t = lock.reader_acquire(node);
                        let _ = value.load(Ordering::Relaxed);
                        lock.reader_release(node, t);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(value.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn reader_preference_allows_concurrent_reads() {
        let lock = Arc::new(ReaderPreferenceRw::new());
        lock.read_lock();
        lock.read_lock();
        assert_eq!(lock.readers.load(Ordering::Relaxed), 2);
        lock.read_unlock();
        lock.read_unlock();
        lock.write_lock();
        lock.write_unlock();
    }

    #[test]
    fn writer_preference_serializes_writers() {
        let lock = Arc::new(WriterPreferenceRw::new());
        let counter = Arc::new(AtomicI64::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    lock.write_lock();
                    counter.fetch_add(1, Ordering::Relaxed);
                    lock.write_unlock();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 1600);
    }
}
