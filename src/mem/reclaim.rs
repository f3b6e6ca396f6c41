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

//! The epoch reclamation collaborator. Index cores never free a node that was once
//! published to another thread directly; they hand it to this collaborator, which is
//! a thin name-stable wrapper around `crossbeam_epoch` (see `DESIGN.md` for why this
//! crate rather than a hand-rolled scheme).

use core::sync::atomic::{AtomicUsize, Ordering};
pub use crossbeam_epoch::{Guard, Owned, Shared};

thread_local! {
    static PIN_DEPTH: AtomicUsize = AtomicUsize::new(0);
}

/// Marks the calling thread as active with respect to reclamation and returns a guard.
/// Every index operation pins once at the root and holds the guard for its duration.
pub fn thread_enter() -> Guard {
    PIN_DEPTH.with(|d| {
        d.fetch_add(1, Ordering::Relaxed);
    });
    crossbeam_epoch::pin()
}

/// Drops the guard, unmarking the calling thread as active once it is the last pin.
pub fn thread_leave(guard: Guard) {
    drop(guard);
    PIN_DEPTH.with(|d| {
        d.fetch_sub(1, Ordering::Relaxed);
    });
}

/// True if the calling thread is not currently inside a pinned section. Used by tests
/// and by the pool's debug assertions; not a substitute for holding a guard.
pub fn quiescent() -> bool {
    PIN_DEPTH.with(|d| d.load(Ordering::Relaxed) == 0)
}

/// Defers reclamation of `ptr` until no pinned thread can still observe it.
///
/// # Safety
/// `ptr` must have been allocated via [`crossbeam_epoch::Owned`] (or equivalent) and must
/// not be reachable from any structure that a concurrent reader could still traverse into
/// without going through a guard that outlives this call.
pub unsafe fn defer_free<T: Send + 'static>(guard: &Guard, ptr: Shared<'_, T>) {
    guard.defer_destroy(ptr);
}

/// Same as [`defer_free`] but takes a raw pointer directly, for callers (the ART and
/// B+-tree cores) that address nodes through hand-packed `u64` handles rather than
/// `crossbeam_epoch::Atomic<T>`.
///
/// # Safety
/// `ptr` must point to a live, uniquely-owned `T` originally obtained from `Box::into_raw`
/// (or equivalent), reachable concurrently only through handles a reader reaches behind a
/// pinned guard.
pub unsafe fn defer_free_raw<T: Send + 'static>(guard: &Guard, ptr: *mut T) {
    guard.defer_destroy(Shared::from(ptr as *const T));
}

/// Defers an arbitrary type-erased cleanup closure. Used for node kinds whose backing
/// allocation's real layout (N4/N16/N48/N256) isn't known at the `NodeHeader` pointer
/// type, so [`defer_free`]'s typed destroy can't be used directly.
///
/// # Safety
/// `f` must not be observable by any other pinned thread until it runs, and must not
/// itself block or panic.
pub unsafe fn defer_unchecked<F>(guard: &Guard, f: F)
where
    F: FnOnce() + Send + 'static,
{
    guard.defer_unchecked(f);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_leave_tracks_quiescence() {
        assert!(quiescent());
        let g = thread_enter();
        assert!(!quiescent());
        thread_leave(g);
        assert!(quiescent());
    }
}
