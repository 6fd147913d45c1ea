use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

/// Number of one-second slots in the ring, one per second of the minute.
pub const WINDOW_SLOTS: usize = 60;

const COUNT_BITS: u32 = 24;
const COUNT_MASK: u64 = (1 << COUNT_BITS) - 1;

/// Largest quota the packed slot word can count up to.
pub const MAX_QUOTA_PER_SECOND: u32 = COUNT_MASK as u32;

// Slot word layout: epoch second in the upper 40 bits, admitted count in the
// lower 24. Comparing the stored second with the caller's second is what
// detects a rollover, and the CAS that installs the new second is the reset.
fn pack(epoch_second: u64, count: u32) -> u64 {
    (epoch_second << COUNT_BITS) | (count as u64 & COUNT_MASK)
}

fn unpack(word: u64) -> (u64, u32) {
    (word >> COUNT_BITS, (word & COUNT_MASK) as u32)
}

/// Result of an admission attempt against one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Admitted as the `position`-th call of the second. `rolled_over` is true
    /// for exactly one caller per new second.
    Admitted { position: u32, rolled_over: bool },
    Rejected,
}

/// Latency statistics of the calls admitted in one second.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    /// Epoch second these statistics belong to.
    pub epoch_second: u64,
    pub calls: u64,
    pub failures: u64,
    pub total: Duration,
    pub min: Option<Duration>,
    pub max: Duration,
}

impl LatencyStats {
    fn for_second(epoch_second: u64) -> Self {
        Self {
            epoch_second,
            ..Default::default()
        }
    }

    fn record(&mut self, elapsed: Duration, succeeded: bool) {
        self.calls += 1;
        if !succeeded {
            self.failures += 1;
        }
        self.total += elapsed;
        self.min = Some(self.min.map_or(elapsed, |min| min.min(elapsed)));
        self.max = self.max.max(elapsed);
    }

    pub fn mean(&self) -> Option<Duration> {
        u32::try_from(self.calls)
            .ok()
            .filter(|calls| *calls > 0)
            .map(|calls| self.total / calls)
    }
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "second={} calls={} failures={} mean={:?} min={:?} max={:?}",
            self.epoch_second,
            self.calls,
            self.failures,
            self.mean().unwrap_or_default(),
            self.min.unwrap_or_default(),
            self.max
        )
    }
}

/// One second of the ring.
pub(crate) struct Slot {
    word: AtomicU64,
    stats: Mutex<LatencyStats>,
}

impl Slot {
    fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
            stats: Mutex::new(LatencyStats::default()),
        }
    }

    /// Test-and-increment the slot for `epoch_second`.
    ///
    /// A single compare-and-swap both detects the rollover and installs the new
    /// second with a count of one, so no caller can observe a count from the
    /// previous minute, and only the caller whose CAS succeeds performs the reset.
    pub(crate) fn try_admit(&self, epoch_second: u64, quota: u32) -> Admission {
        if quota == 0 {
            return Admission::Rejected;
        }

        let mut current = self.word.load(Ordering::Acquire);
        loop {
            let (second, count) = unpack(current);
            let (next, rolled_over) = if second >= epoch_second {
                // Same second, or a caller that read the clock just before a
                // newer caller rolled the slot: both count against the stored second.
                if count >= quota {
                    return Admission::Rejected;
                }
                (pack(second, count + 1), false)
            } else {
                (pack(epoch_second, 1), true)
            };

            match self
                .word
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    if rolled_over {
                        self.begin_second(epoch_second);
                    }
                    return Admission::Admitted {
                        position: unpack(next).1,
                        rolled_over,
                    };
                }
                Err(actual) => current = actual,
            }
        }
    }

    // Statistics are tagged with their second, so resetting is idempotent: the
    // first of the rollover winner or an early `record` for the new second does it.
    fn begin_second(&self, epoch_second: u64) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if stats.epoch_second < epoch_second {
            *stats = LatencyStats::for_second(epoch_second);
        }
    }

    pub(crate) fn record(&self, epoch_second: u64, elapsed: Duration, succeeded: bool) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if stats.epoch_second < epoch_second {
            *stats = LatencyStats::for_second(epoch_second);
        }
        // A call that outlived a whole minute belongs to a generation that is gone.
        if stats.epoch_second == epoch_second {
            stats.record(elapsed, succeeded);
        }
    }

    /// Calls admitted so far in `epoch_second`, zero if the slot holds another second.
    pub(crate) fn admitted_in(&self, epoch_second: u64) -> u32 {
        let (second, count) = unpack(self.word.load(Ordering::Acquire));
        if second == epoch_second { count } else { 0 }
    }

    pub(crate) fn stats(&self) -> LatencyStats {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Ring of sixty one-second slots indexed by second-of-minute.
///
/// This is a modular ring rather than a rolling sixty-second window: second 5
/// of every minute shares slot 5. Each slot only ever counts its most recent
/// epoch second, so traffic a minute apart never sees stale counts.
pub(crate) struct Window {
    slots: Box<[Slot]>,
}

impl Window {
    pub(crate) fn new() -> Self {
        Self {
            slots: (0..WINDOW_SLOTS).map(|_| Slot::new()).collect(),
        }
    }

    pub(crate) fn slot_for(&self, epoch_second: u64) -> &Slot {
        &self.slots[(epoch_second % WINDOW_SLOTS as u64) as usize]
    }

    pub(crate) fn slot_at(&self, second_of_minute: usize) -> Option<&Slot> {
        self.slots.get(second_of_minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_pack_roundtrip() {
        let word = pack(1_700_000_123, 42);
        assert_eq!(unpack(word), (1_700_000_123, 42));
        assert_eq!(unpack(pack(7, MAX_QUOTA_PER_SECOND)), (7, MAX_QUOTA_PER_SECOND));
    }

    #[test]
    fn test_admission_stops_at_quota() {
        let slot = Slot::new();
        for expected in 1..=3 {
            assert!(matches!(
                slot.try_admit(100, 3),
                Admission::Admitted { position, .. } if position == expected
            ));
        }
        assert_eq!(slot.try_admit(100, 3), Admission::Rejected);
        assert_eq!(slot.admitted_in(100), 3);
    }

    #[test]
    fn test_rollover_resets_once() {
        let slot = Slot::new();
        slot.try_admit(100, 2);
        slot.try_admit(100, 2);
        assert_eq!(slot.try_admit(100, 2), Admission::Rejected);

        // Same slot index one minute later.
        assert_eq!(slot.try_admit(160, 2), Admission::Admitted { position: 1, rolled_over: true });
        assert_eq!(slot.try_admit(160, 2), Admission::Admitted { position: 2, rolled_over: false });
        assert_eq!(slot.admitted_in(100), 0);
    }

    #[test]
    fn test_late_caller_counts_against_newer_second() {
        let slot = Slot::new();
        slot.try_admit(160, 1);
        assert_eq!(slot.try_admit(100, 1), Admission::Rejected);
    }

    #[test]
    fn test_zero_quota_rejects() {
        let slot = Slot::new();
        assert_eq!(slot.try_admit(5, 0), Admission::Rejected);
    }

    #[test]
    fn test_stats_reset_per_second() {
        let slot = Slot::new();
        slot.try_admit(10, 10);
        slot.record(10, Duration::from_millis(4), true);
        slot.record(10, Duration::from_millis(2), false);

        let stats = slot.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.min, Some(Duration::from_millis(2)));
        assert_eq!(stats.max, Duration::from_millis(4));
        assert_eq!(stats.mean(), Some(Duration::from_millis(3)));

        slot.try_admit(70, 10);
        let stats = slot.stats();
        assert_eq!(stats.epoch_second, 70);
        assert_eq!(stats.calls, 0);

        // A straggler from second 10 is dropped.
        slot.record(10, Duration::from_millis(9), true);
        assert_eq!(slot.stats().calls, 0);
    }

    #[test]
    fn test_concurrent_rollover_has_single_winner() {
        let slot = Arc::new(Slot::new());
        slot.try_admit(1, 1000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = slot.clone();
                std::thread::spawn(move || {
                    let mut rollovers = 0;
                    let mut admitted = 0;
                    for _ in 0..50 {
                        if let Admission::Admitted { rolled_over, .. } = slot.try_admit(61, 100) {
                            admitted += 1;
                            if rolled_over {
                                rollovers += 1;
                            }
                        }
                    }
                    (rollovers, admitted)
                })
            })
            .collect();

        let (rollovers, admitted) = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .fold((0, 0), |acc, (r, a)| (acc.0 + r, acc.1 + a));

        assert_eq!(rollovers, 1);
        assert_eq!(admitted, 100);
        assert_eq!(slot.admitted_in(61), 100);
    }
}
