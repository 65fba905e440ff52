// SPDX-License-Identifier: Apache-2.0

//! Packet-in rate limiter (§4.9): a per-logical-switch token bucket that
//! shields the control channel from an upcall storm. Cheap enough to call
//! on every would-be packet-in: a single atomic compare-exchange loop, no
//! lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// `max_rate` disables the limiter entirely (every packet-in passes).
pub const UNLIMITED: u32 = 0;

#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PirlConfig {
    /// Packet-in events admitted per second; [`UNLIMITED`] disables limiting.
    pub max_rate: u32,
}

/// A single logical switch's token bucket. `tokens` is packed as
/// whole-packet units scaled by [`SCALE`] so fractional refill between
/// calls doesn't get rounded away to zero at low rates.
pub struct Pirl {
    max_rate: u32,
    capacity: u64,
    tokens: AtomicU64,
    start: Instant,
    last_refill_nanos: AtomicU64,
    dropped: AtomicU64,
}

const SCALE: u64 = 1000;

impl Pirl {
    #[must_use]
    pub fn new(config: PirlConfig) -> Self {
        let capacity = u64::from(config.max_rate.max(1)) * SCALE;
        Pirl {
            max_rate: config.max_rate,
            capacity,
            tokens: AtomicU64::new(capacity),
            start: Instant::now(),
            last_refill_nanos: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// `filter`: admit or drop one packet-in candidate. Unlimited
    /// configurations skip the bucket entirely.
    pub fn filter(&self) -> bool {
        if self.max_rate == UNLIMITED {
            return true;
        }
        self.refill();
        loop {
            let current = self.tokens.load(Ordering::Acquire);
            if current < SCALE {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return false;
            }
            if self
                .tokens
                .compare_exchange_weak(current, current - SCALE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Single atomic compare-exchange to claim the elapsed interval, then a
    /// single atomic update to credit it — no lock is ever taken, so a
    /// losing racer on the CAS just leaves the refill to whichever caller
    /// won it rather than retrying.
    fn refill(&self) {
        let now = self.start.elapsed().as_nanos() as u64;
        let last = self.last_refill_nanos.load(Ordering::Acquire);
        let elapsed_nanos = now.saturating_sub(last);
        if elapsed_nanos == 0 {
            return;
        }
        let refill = (elapsed_nanos as f64 / 1_000_000_000.0 * f64::from(self.max_rate) * SCALE as f64) as u64;
        if refill == 0 {
            return;
        }
        if self
            .last_refill_nanos
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.tokens
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| Some((t + refill).min(self.capacity)))
                .ok();
        }
    }

    /// `packet_in_dropped` counter (§4.9).
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn unlimited_rate_always_admits() {
        let pirl = Pirl::new(PirlConfig { max_rate: UNLIMITED });
        for _ in 0..10_000 {
            assert!(pirl.filter());
        }
    }

    #[test]
    fn exhausting_the_bucket_drops_and_counts() {
        let pirl = Pirl::new(PirlConfig { max_rate: 5 });
        let admitted = (0..10).filter(|_| pirl.filter()).count();
        assert_eq!(admitted, 5);
        assert_eq!(pirl.dropped(), 5);
    }

    #[test]
    fn bucket_refills_over_time() {
        let pirl = Pirl::new(PirlConfig { max_rate: 1000 });
        for _ in 0..1000 {
            assert!(pirl.filter());
        }
        assert!(!pirl.filter());
        sleep(Duration::from_millis(20));
        assert!(pirl.filter());
    }
}
