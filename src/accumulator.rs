//! Turns held direction binds into whole mouse counts.
//!
//! Distance is integrated over the time since the last emission and added
//! to a carried remainder; only the whole part is emitted. The fractional
//! part stays behind for the next emission, so the sum of everything
//! emitted tracks the ideal integral to within one count.

use crate::binds::{BindSnapshot, LogicalBind};
use crate::clock::Tick;
use crate::params::{Parameters, Signals};

/// Result of one [`MovementAccumulator::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Update {
    /// Counts to move horizontally this tick. Negative is left.
    pub units: i64,
    pub signals: Signals,
}

pub struct MovementAccumulator {
    frequency: u64,
    last_tick: Tick,
    remainder: f64,
    last_binds: BindSnapshot,
}

impl MovementAccumulator {
    /// `frequency` is the tick rate of the clock that supplies `now`.
    pub fn new(frequency: u64) -> Self {
        Self {
            frequency,
            last_tick: Tick::default(),
            remainder: 0.0,
            last_binds: BindSnapshot::default(),
        }
    }

    /// Start from a neutral state at `now`. `binds` becomes the previous
    /// snapshot, so binds already held do not count as edges.
    pub fn reset(&mut self, now: Tick, binds: BindSnapshot) {
        self.last_tick = now;
        self.remainder = 0.0;
        self.last_binds = binds;
    }

    pub fn remainder(&self) -> f64 {
        self.remainder
    }

    #[cfg(test)]
    pub fn last_tick(&self) -> Tick {
        self.last_tick
    }

    pub fn update(&mut self, now: Tick, binds: BindSnapshot, params: &mut Parameters) -> Update {
        if !params.is_valid() {
            return Update::default();
        }

        let mut signals = Signals::default();
        if binds.rising(&self.last_binds, LogicalBind::Cycle) {
            signals.cycle_index = params.advance_cycle();
        }

        if binds.changed(&self.last_binds, LogicalBind::Left)
            || binds.changed(&self.last_binds, LogicalBind::Right)
        {
            self.last_tick = now;
            self.remainder = 0.0;
        }
        self.last_binds = binds;

        let left = binds.is_held(LogicalBind::Left);
        let right = binds.is_held(LogicalBind::Right);
        if !(left ^ right) {
            return Update { units: 0, signals };
        }

        let Some(set) = params.snapshot() else {
            return Update { units: 0, signals };
        };

        let elapsed = now.since(self.last_tick);
        if (elapsed as f64) < self.frequency as f64 / set.rate {
            return Update { units: 0, signals };
        }

        let direction = if left { -1.0 } else { 1.0 };
        let speed = if binds.is_held(LogicalBind::Speed) {
            set.angle_speed_key
        } else {
            1.0
        };
        self.remainder += direction * set.counts_per_second() * speed * elapsed as f64
            / self.frequency as f64;

        let units = self.remainder.trunc();
        self.remainder -= units;
        if !(self.remainder.abs() < 1.0) {
            // Distance overflowed; the emission saturates and nothing carries.
            self.remainder = 0.0;
        }
        self.last_tick = now;
        Update {
            units: units as i64,
            signals,
        }
    }
}
