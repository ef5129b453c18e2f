/// A sample of a fixed-frequency monotonic counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

impl Tick {
    /// Signed tick distance from `earlier` to `self`.
    pub fn since(self, earlier: Tick) -> i64 {
        self.0.wrapping_sub(earlier.0) as i64
    }
}

pub trait Clock {
    fn now(&self) -> Tick;

    /// Ticks per second. Constant for the lifetime of the clock.
    fn frequency(&self) -> u64;

    fn elapsed_seconds(&self, a: Tick, b: Tick) -> f64 {
        b.since(a) as f64 / self.frequency() as f64
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> Tick {
        (**self).now()
    }

    fn frequency(&self) -> u64 {
        (**self).frequency()
    }
}

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// `CLOCK_MONOTONIC` in nanosecond ticks. Unaffected by wall-clock jumps.
pub struct MonotonicClock {
    frequency: u64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        let mut res = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `res` is a valid, writable timespec.
        if unsafe { libc::clock_getres(libc::CLOCK_MONOTONIC, &mut res) } == 0 {
            log::debug!(
                "CLOCK_MONOTONIC resolution: {}ns",
                res.tv_sec as u64 * NANOS_PER_SEC + res.tv_nsec as u64
            );
        }
        Self {
            frequency: NANOS_PER_SEC,
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Tick {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        // SAFETY: `ts` is a valid, writable timespec. CLOCK_MONOTONIC is
        // always available on Linux, so the call cannot fail.
        unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        Tick(ts.tv_sec as u64 * NANOS_PER_SEC + ts.tv_nsec as u64)
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }
}

/// Clock advanced by hand, for driving the engine deterministically.
#[cfg(test)]
pub struct ManualClock {
    now: std::cell::Cell<u64>,
    frequency: u64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(frequency: u64) -> Self {
        Self {
            now: std::cell::Cell::new(0),
            frequency,
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.now.set(self.now.get() + ticks);
    }

    pub fn advance_secs(&self, secs: f64) {
        self.advance((secs * self.frequency as f64).round() as u64);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Tick {
        Tick(self.now.get())
    }

    fn frequency(&self) -> u64 {
        self.frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backward() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next >= prev);
            prev = next;
        }
        assert_eq!(clock.frequency(), NANOS_PER_SEC);
    }

    #[test]
    fn elapsed_seconds_divides_by_frequency() {
        let clock = ManualClock::new(10_000);
        let a = clock.now();
        clock.advance(25_000);
        let b = clock.now();
        assert_eq!(clock.elapsed_seconds(a, b), 2.5);
        assert_eq!(clock.elapsed_seconds(b, a), -2.5);
    }

    #[test]
    fn advance_secs_converts_to_ticks() {
        let clock = ManualClock::new(1_000);
        clock.advance_secs(0.002);
        assert_eq!(clock.now(), Tick(2));
    }
}
