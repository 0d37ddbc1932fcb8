//! Defines `Slot` and `Epoch`, both `u64`-backed wrapper types that are never interchanged
//! without an explicit conversion.
//!
//! Mirrors `eth2.0-specs`: `epoch = slot // SLOTS_PER_EPOCH`, genesis slot and epoch are `0`.

use serde_derive::{Deserialize, Serialize};
use ssz_derive::{Decode, Encode};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use tree_hash_derive::TreeHash;

macro_rules! impl_u64_wrapper {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            Default,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            Encode,
            Decode,
            TreeHash,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(n: u64) -> Self {
                Self(n)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }

            pub fn as_usize(&self) -> usize {
                self.0 as usize
            }

            pub fn saturating_sub(&self, other: impl Into<$name>) -> $name {
                Self(self.0.saturating_sub(other.into().0))
            }

            pub fn saturating_add(&self, other: impl Into<$name>) -> $name {
                Self(self.0.saturating_add(other.into().0))
            }

            pub fn checked_sub(&self, other: impl Into<$name>) -> Option<$name> {
                self.0.checked_sub(other.into().0).map(Self)
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(n)
            }
        }

        impl From<$name> for u64 {
            fn from(n: $name) -> u64 {
                n.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl Add<u64> for $name {
            type Output = $name;
            fn add(self, rhs: u64) -> $name {
                Self(self.0 + rhs)
            }
        }

        impl Add for $name {
            type Output = $name;
            fn add(self, rhs: $name) -> $name {
                Self(self.0 + rhs.0)
            }
        }

        impl AddAssign<u64> for $name {
            fn add_assign(&mut self, rhs: u64) {
                self.0 += rhs;
            }
        }

        impl Sub<u64> for $name {
            type Output = $name;
            fn sub(self, rhs: u64) -> $name {
                Self(self.0 - rhs)
            }
        }

        impl Sub for $name {
            type Output = $name;
            fn sub(self, rhs: $name) -> $name {
                Self(self.0 - rhs.0)
            }
        }

        impl SubAssign<u64> for $name {
            fn sub_assign(&mut self, rhs: u64) {
                self.0 -= rhs;
            }
        }
    };
}

impl_u64_wrapper!(Slot);
impl_u64_wrapper!(Epoch);

impl Slot {
    /// Returns the epoch that this slot falls within, given `slots_per_epoch`.
    pub fn epoch(&self, slots_per_epoch: u64) -> Epoch {
        Epoch::new(self.0 / slots_per_epoch)
    }

    /// Returns true if `self` is the first slot of its epoch.
    pub fn is_epoch_start(&self, slots_per_epoch: u64) -> bool {
        self.0 % slots_per_epoch == 0
    }
}

impl Epoch {
    /// Returns the first slot of `self`.
    pub fn start_slot(&self, slots_per_epoch: u64) -> Slot {
        Slot::new(self.0 * slots_per_epoch)
    }

    /// Returns an iterator over every slot in `self`, in ascending order.
    pub fn slot_iter(&self, slots_per_epoch: u64) -> impl Iterator<Item = Slot> {
        let start = self.start_slot(slots_per_epoch).as_u64();
        (start..start + slots_per_epoch).map(Slot::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_of_slot() {
        assert_eq!(Slot::new(0).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(31).epoch(32), Epoch::new(0));
        assert_eq!(Slot::new(32).epoch(32), Epoch::new(1));
        assert_eq!(Slot::new(63).epoch(32), Epoch::new(1));
    }

    #[test]
    fn start_slot_of_epoch() {
        assert_eq!(Epoch::new(0).start_slot(32), Slot::new(0));
        assert_eq!(Epoch::new(1).start_slot(32), Slot::new(32));
        assert_eq!(Epoch::new(2).start_slot(32), Slot::new(64));
    }

    #[test]
    fn slot_iter_covers_epoch() {
        let slots: Vec<Slot> = Epoch::new(1).slot_iter(4).collect();
        assert_eq!(
            slots,
            vec![Slot::new(4), Slot::new(5), Slot::new(6), Slot::new(7)]
        );
    }
}
