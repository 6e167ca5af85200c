//! Tick to moment mapping

use leasekeeper_common::{LeaseError, Moment, Tick};

/// Maps a tick index to the moment it falls in
///
/// Implementations must be deterministic and monotonic in `tick`.
pub trait MomentSource: Send + Sync {
    fn moment_of(&self, tick: Tick) -> Moment;
}

impl<F> MomentSource for F
where
    F: Fn(Tick) -> Moment + Send + Sync,
{
    fn moment_of(&self, tick: Tick) -> Moment {
        self(tick)
    }
}

/// Moments made of a fixed number of ticks
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedMomentSize {
    ticks_per_moment: u64,
}

impl FixedMomentSize {
    pub fn new(ticks_per_moment: u64) -> Result<Self, LeaseError> {
        if ticks_per_moment == 0 {
            return Err(LeaseError::Config(
                "ticks_per_moment must be greater than 0".to_string(),
            ));
        }
        Ok(Self { ticks_per_moment })
    }

    pub fn ticks_per_moment(&self) -> u64 {
        self.ticks_per_moment
    }
}

impl MomentSource for FixedMomentSize {
    fn moment_of(&self, tick: Tick) -> Moment {
        tick / self.ticks_per_moment
    }
}
