use clap::ValueEnum;
use spin_sleep::SpinSleeper;
use std::time::Duration;

/// Paces the active tick loop.
pub trait Scheduler {
    /// Best-effort request for finer timer granularity, in 100ns units.
    fn request_high_resolution_timing(&mut self, units_of_100ns: u32);

    /// Sleep for roughly `seconds` with sub-millisecond precision.
    /// Non-positive durations return immediately.
    fn precise_sleep(&self, seconds: f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SleepStrategy {
    /// Native sleep for the bulk, spin for the tail.
    Spin,
    /// Relative `clock_nanosleep` only.
    Native,
}

/// Native accuracy assumed for the spin sleeper once timer slack is lowered.
const SPIN_NATIVE_ACCURACY_NS: u32 = 100_000;

pub struct PrecisionScheduler {
    strategy: SleepStrategy,
    sleeper: SpinSleeper,
}

impl PrecisionScheduler {
    pub fn new(strategy: SleepStrategy) -> Self {
        Self {
            strategy,
            sleeper: SpinSleeper::new(SPIN_NATIVE_ACCURACY_NS),
        }
    }

    /// Raise the scheduling priority of the process. Needs CAP_SYS_NICE to
    /// go below 0, so failure is expected for unprivileged users.
    pub fn raise_priority(&self, nice: i32) {
        // SAFETY: plain syscall on the current process.
        let ret = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
        if ret == 0 {
            log::info!("Process priority raised (nice {})", nice);
        } else {
            log::debug!(
                "setpriority({}) failed: {}",
                nice,
                std::io::Error::last_os_error()
            );
        }
    }

    fn native_sleep(&self, duration: Duration) {
        let mut req = libc::timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        loop {
            // SAFETY: both pointers reference live timespecs.
            let ret = unsafe { libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &req, &mut rem) };
            match ret {
                0 => return,
                // Interrupted by a control signal: finish the interval.
                libc::EINTR => req = rem,
                err => {
                    log::debug!("clock_nanosleep failed ({}), spinning instead", err);
                    let left = Duration::new(req.tv_sec as u64, req.tv_nsec as u32);
                    self.sleeper.sleep(left);
                    return;
                }
            }
        }
    }
}

impl Scheduler for PrecisionScheduler {
    fn request_high_resolution_timing(&mut self, units_of_100ns: u32) {
        let slack_ns = (units_of_100ns as libc::c_ulong).max(1) * 100;
        // SAFETY: PR_SET_TIMERSLACK takes the slack value by value.
        let ret = unsafe { libc::prctl(libc::PR_SET_TIMERSLACK, slack_ns, 0, 0, 0) };
        if ret == 0 {
            log::debug!("Timer slack set to {}ns", slack_ns);
        } else {
            log::debug!(
                "PR_SET_TIMERSLACK failed: {}",
                std::io::Error::last_os_error()
            );
        }
    }

    fn precise_sleep(&self, seconds: f64) {
        // Also rejects NaN.
        if !(seconds > 0.0) {
            return;
        }
        let Ok(duration) = Duration::try_from_secs_f64(seconds) else {
            return;
        };
        match self.strategy {
            SleepStrategy::Spin => self.sleeper.sleep(duration),
            SleepStrategy::Native => self.native_sleep(duration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn non_positive_durations_return_immediately() {
        let scheduler = PrecisionScheduler::new(SleepStrategy::Spin);
        let start = Instant::now();
        scheduler.precise_sleep(0.0);
        scheduler.precise_sleep(-1.0);
        scheduler.precise_sleep(f64::NAN);
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn sleeps_at_least_the_requested_duration() {
        for strategy in [SleepStrategy::Spin, SleepStrategy::Native] {
            let mut scheduler = PrecisionScheduler::new(strategy);
            scheduler.request_high_resolution_timing(1);
            let start = Instant::now();
            scheduler.precise_sleep(0.002);
            let elapsed = start.elapsed();
            assert!(elapsed >= Duration::from_micros(1900), "{:?}", elapsed);
            assert!(elapsed < Duration::from_millis(500), "{:?}", elapsed);
        }
    }
}
