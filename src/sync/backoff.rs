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

//! Exponential spin/yield backoff, plus the TATAS and plain-mutex baseline latches
//! used for comparison against the queue-based flavors.

use std::cell::Cell;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Back-off policy for the TATAS baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    None,
    Fixed { delay_spins: u32 },
    Exponential { base: u32, cap: u32, multiplier: u32 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: 4,
            cap: 1024,
            multiplier: 2,
        }
    }
}

/// Generic spin-then-yield backoff used internally by every latch flavor while it
/// waits on a queue-node field or retries a lost CAS.
pub struct Backoff {
    cur: Cell<u8>,
}

impl Backoff {
    const MAX_SPIN: u8 = 6;
    const MAX_YIELD: u8 = 8;

    pub fn new() -> Self {
        Self { cur: Cell::new(0) }
    }

    pub fn snooze(&self) {
        if self.cur.get() <= Self::MAX_SPIN {
            for _ in 0..1u32 << self.cur.get() {
                spin_loop();
            }
        } else {
            thread::yield_now();
        }
        if self.cur.get() <= Self::MAX_SPIN + Self::MAX_YIELD {
            self.cur.set(self.cur.get() + 1);
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Test-and-test-and-set spinlock: the simplest possible mutual-exclusion baseline,
/// used only for latch microbenchmarking comparisons.
pub struct Tatas {
    locked: AtomicBool,
    policy: BackoffPolicy,
}

impl Tatas {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            locked: AtomicBool::new(false),
            policy,
        }
    }

    pub fn lock(&self) {
        let mut spins: u32 = match self.policy {
            BackoffPolicy::Fixed { delay_spins } => delay_spins,
            BackoffPolicy::Exponential { base, .. } => base,
            BackoffPolicy::None => 0,
        };
        loop {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            self.back_off(&mut spins);
        }
    }

    fn back_off(&self, spins: &mut u32) {
        match self.policy {
            BackoffPolicy::None => {}
            BackoffPolicy::Fixed { delay_spins } => {
                for _ in 0..delay_spins {
                    spin_loop();
                }
            }
            BackoffPolicy::Exponential { cap, multiplier, .. } => {
                for _ in 0..*spins {
                    spin_loop();
                }
                *spins = (*spins * multiplier.max(1)).min(cap);
            }
        }
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A plain mutual-exclusion baseline backed by `parking_lot`, used where a latch only
/// needs to block (not spin) - the other half of the "simple baselines" pair.
pub type PlainMutex<T> = parking_lot::Mutex<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tatas_mutual_exclusion() {
        use std::sync::Arc;
        let lock = Arc::new(Tatas::new(BackoffPolicy::default()));
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let lock = lock.clone();
            let counter = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    lock.lock();
                    counter.fetch_add(1, Ordering::Relaxed);
                    lock.unlock();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }
}
