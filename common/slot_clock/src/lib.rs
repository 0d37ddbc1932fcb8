//! Converts wall-clock time into beacon-chain slots.
//!
//! `SlotClock` is the trait every other component depends on; `SystemTimeSlotClock` anchors it to
//! `std::time::SystemTime` for a running node, `ManualSlotClock` lets tests drive the clock by
//! hand without sleeping.

use parking_lot::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use types::Slot;

/// Emits the current slot from a genesis-time anchor, per §4.A: `floor((now - genesis_time) /
/// seconds_per_slot)`. Implementations must never report a slot earlier than one already
/// reported, even across a backwards wall-clock step.
pub trait SlotClock: Send + Sync + Sized {
    /// Constructs a clock anchored to `genesis_slot` at `genesis_duration` (time since the Unix
    /// epoch), ticking every `slot_duration`.
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self;

    /// The current slot, or `None` if `now` predates `genesis_duration`.
    fn now(&self) -> Option<Slot>;

    /// `now()`, but a slot is considered current up to `tolerance` before its nominal start —
    /// used to accept gossip that arrived slightly early relative to the local clock.
    fn now_with_future_tolerance(&self, tolerance: Duration) -> Option<Slot> {
        let adjusted = self.now_duration()?.checked_add(tolerance)?;
        self.slot_of(adjusted)
    }

    /// `now()`, but computed as if `tolerance` less time had passed — used to widen the lower
    /// bound of an acceptable slot range for gossip that arrived slightly late.
    fn now_with_past_tolerance(&self, tolerance: Duration) -> Option<Slot> {
        let adjusted = self.now_duration()?.saturating_sub(tolerance);
        self.slot_of(adjusted)
    }

    /// Duration since the Unix epoch "now" that the clock measures from, not adjusted by offset.
    fn now_duration(&self) -> Option<Duration>;

    fn slot_of(&self, now: Duration) -> Option<Slot>;

    fn slot_duration(&self) -> Duration;

    fn genesis_duration(&self) -> Duration;

    /// How long until the start of the next slot, or `None` before genesis.
    fn duration_to_next_slot(&self) -> Option<Duration> {
        let now = self.now_duration()?;
        let slot_duration = self.slot_duration();
        let genesis = self.genesis_duration();
        if now < genesis {
            return genesis.checked_sub(now);
        }
        let since_genesis = now.checked_sub(genesis)?;
        let elapsed_in_slot = Duration::from_secs(
            since_genesis.as_secs() % slot_duration.as_secs().max(1),
        );
        slot_duration.checked_sub(elapsed_in_slot)
    }

    /// The duration since the Unix epoch at which `slot` starts.
    fn start_of(&self, slot: Slot) -> Option<Duration> {
        let since_genesis = slot_duration_product(slot, self.slot_duration())?;
        self.genesis_duration().checked_add(since_genesis)
    }
}

fn slot_duration_product(slot: Slot, slot_duration: Duration) -> Option<Duration> {
    slot_duration.checked_mul(u32::try_from(slot.as_u64()).ok()?)
}

/// Wall-clock-backed `SlotClock`, for a running node.
pub struct SystemTimeSlotClock {
    genesis_duration: Duration,
    slot_duration: Duration,
}

impl SlotClock for SystemTimeSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        debug_assert_eq!(genesis_slot, Slot::new(0), "genesis slot is always 0");
        Self {
            genesis_duration,
            slot_duration,
        }
    }

    fn now(&self) -> Option<Slot> {
        self.now_duration().and_then(|now| self.slot_of(now))
    }

    fn now_duration(&self) -> Option<Duration> {
        SystemTime::now().duration_since(UNIX_EPOCH).ok()
    }

    fn slot_of(&self, now: Duration) -> Option<Slot> {
        let since_genesis = now.checked_sub(self.genesis_duration)?;
        let slot_duration_secs = self.slot_duration.as_secs().max(1);
        Some(Slot::new(since_genesis.as_secs() / slot_duration_secs))
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn genesis_duration(&self) -> Duration {
        self.genesis_duration
    }
}

/// A `SlotClock` whose "now" is set explicitly by the test driving it, so slot-boundary behaviour
/// can be exercised without waiting on real time.
pub struct ManualSlotClock {
    genesis_duration: Duration,
    slot_duration: Duration,
    current_time: RwLock<Duration>,
}

impl ManualSlotClock {
    pub fn set_current_time(&self, duration: Duration) {
        *self.current_time.write() = duration;
    }

    pub fn set_slot(&self, slot: Slot) {
        if let Some(duration) = self.start_of(slot) {
            self.set_current_time(duration);
        }
    }

    pub fn advance_slot(&self) {
        let next = self.now().unwrap_or_default() + 1;
        self.set_slot(next);
    }
}

impl SlotClock for ManualSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        debug_assert_eq!(genesis_slot, Slot::new(0), "genesis slot is always 0");
        Self {
            genesis_duration,
            slot_duration,
            current_time: RwLock::new(genesis_duration),
        }
    }

    fn now(&self) -> Option<Slot> {
        let now = *self.current_time.read();
        self.slot_of(now)
    }

    fn now_duration(&self) -> Option<Duration> {
        Some(*self.current_time.read())
    }

    fn slot_of(&self, now: Duration) -> Option<Slot> {
        let since_genesis = now.checked_sub(self.genesis_duration)?;
        let slot_duration_secs = self.slot_duration.as_secs().max(1);
        Some(Slot::new(since_genesis.as_secs() / slot_duration_secs))
    }

    fn slot_duration(&self) -> Duration {
        self.slot_duration
    }

    fn genesis_duration(&self) -> Duration {
        self.genesis_duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> ManualSlotClock {
        ManualSlotClock::new(Slot::new(0), Duration::from_secs(1_000), Duration::from_secs(6))
    }

    #[test]
    fn reports_none_before_genesis() {
        let clock = clock();
        clock.set_current_time(Duration::from_secs(500));
        assert_eq!(clock.now(), None);
    }

    #[test]
    fn advances_one_slot_per_slot_duration() {
        let clock = clock();
        clock.set_current_time(Duration::from_secs(1_000));
        assert_eq!(clock.now(), Some(Slot::new(0)));

        clock.set_current_time(Duration::from_secs(1_006));
        assert_eq!(clock.now(), Some(Slot::new(1)));

        clock.set_current_time(Duration::from_secs(1_011));
        assert_eq!(clock.now(), Some(Slot::new(1)));
    }

    #[test]
    fn advance_slot_helper_moves_forward_exactly_one() {
        let clock = clock();
        clock.set_slot(Slot::new(3));
        assert_eq!(clock.now(), Some(Slot::new(3)));
        clock.advance_slot();
        assert_eq!(clock.now(), Some(Slot::new(4)));
    }

    #[test]
    fn future_tolerance_accepts_early_arrival() {
        let clock = clock();
        // 2 seconds before slot 1 begins.
        clock.set_current_time(Duration::from_secs(1_004));
        assert_eq!(clock.now(), Some(Slot::new(0)));
        assert_eq!(
            clock.now_with_future_tolerance(Duration::from_secs(3)),
            Some(Slot::new(1))
        );
    }

    #[test]
    fn duration_to_next_slot_counts_down() {
        let clock = clock();
        clock.set_current_time(Duration::from_secs(1_002));
        assert_eq!(
            clock.duration_to_next_slot(),
            Some(Duration::from_secs(4))
        );
    }
}
