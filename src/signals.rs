//! Process signals as control requests.
//!
//! SIGINT/SIGTERM quit, SIGUSR1 toggles the enabled switch, SIGUSR2 steps
//! the parameter cycle, SIGHUP means the edit queue has lines. Handlers
//! only set flags; the control loop polls them between ticks.

use crate::control::{self, Edit, EDIT_SIGNAL};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

static QUIT: AtomicBool = AtomicBool::new(false);
static TOGGLE: AtomicBool = AtomicBool::new(false);
static CYCLE: AtomicBool = AtomicBool::new(false);
static EDIT: AtomicBool = AtomicBool::new(false);

const HANDLED: [libc::c_int; 5] = [
    libc::SIGINT,
    libc::SIGTERM,
    libc::SIGUSR1,
    libc::SIGUSR2,
    EDIT_SIGNAL,
];

/// Requests arriving from outside the control loop.
pub trait Controls {
    fn quit_requested(&self) -> bool;
    fn take_toggle(&self) -> bool;
    fn take_cycle(&self) -> bool;
    /// Parameter edits queued since the last call, oldest first.
    fn take_edits(&self) -> Vec<Edit>;
    /// Block until a request may be pending.
    fn wait(&self);
}

pub struct SignalControls {
    edits: PathBuf,
}

impl SignalControls {
    /// Install the handlers. Edits are read from `edits` on SIGHUP.
    pub fn install(edits: PathBuf) -> Self {
        for sig in HANDLED {
            // SAFETY: the handler is async-signal-safe (atomic stores only).
            unsafe {
                libc::signal(sig, signal_handler as libc::sighandler_t);
            }
        }
        Self { edits }
    }

    fn pending() -> bool {
        [&QUIT, &TOGGLE, &CYCLE, &EDIT]
            .iter()
            .any(|flag| flag.load(Ordering::SeqCst))
    }
}

impl Controls for SignalControls {
    fn quit_requested(&self) -> bool {
        QUIT.load(Ordering::Relaxed)
    }

    fn take_toggle(&self) -> bool {
        TOGGLE
            .compare_exchange(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn take_cycle(&self) -> bool {
        CYCLE
            .compare_exchange(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn take_edits(&self) -> Vec<Edit> {
        if EDIT
            .compare_exchange(true, false, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return Vec::new();
        }
        control::take_edits(&self.edits)
    }

    fn wait(&self) {
        // Block the handled signals while checking the flags so a signal
        // cannot land between the check and the suspend.
        // SAFETY: the sigset_t values are initialised by sigemptyset and
        // sigprocmask before being read.
        unsafe {
            let mut block: libc::sigset_t = std::mem::zeroed();
            let mut old: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut block);
            for sig in HANDLED {
                libc::sigaddset(&mut block, sig);
            }
            libc::sigprocmask(libc::SIG_BLOCK, &block, &mut old);
            if !Self::pending() {
                let mut wake = old;
                for sig in HANDLED {
                    libc::sigdelset(&mut wake, sig);
                }
                libc::sigsuspend(&wake);
            }
            libc::sigprocmask(libc::SIG_SETMASK, &old, std::ptr::null_mut());
        }
    }
}

extern "C" fn signal_handler(sig: libc::c_int) {
    match sig {
        libc::SIGUSR1 => TOGGLE.store(true, Ordering::SeqCst),
        libc::SIGUSR2 => CYCLE.store(true, Ordering::SeqCst),
        EDIT_SIGNAL => EDIT.store(true, Ordering::SeqCst),
        _ => QUIT.store(true, Ordering::SeqCst),
    }
}

/// Scripted requests for driving the engine in tests.
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedControls {
    pub quit_after_waits: std::cell::Cell<Option<u32>>,
    pub quit_after_checks: std::cell::Cell<Option<u32>>,
    pub toggles: std::cell::Cell<u32>,
    pub cycles: std::cell::Cell<u32>,
    pub edits: std::cell::RefCell<Vec<Edit>>,
    pub waits: std::cell::Cell<u32>,
}

#[cfg(test)]
impl Controls for ScriptedControls {
    fn quit_requested(&self) -> bool {
        match self.quit_after_checks.get() {
            Some(0) => return true,
            Some(n) => self.quit_after_checks.set(Some(n - 1)),
            None => {}
        }
        self.quit_after_waits.get() == Some(0)
    }

    fn take_toggle(&self) -> bool {
        let n = self.toggles.get();
        if n == 0 {
            return false;
        }
        self.toggles.set(n - 1);
        true
    }

    fn take_cycle(&self) -> bool {
        let n = self.cycles.get();
        if n == 0 {
            return false;
        }
        self.cycles.set(n - 1);
        true
    }

    fn take_edits(&self) -> Vec<Edit> {
        self.edits.take()
    }

    fn wait(&self) {
        self.waits.set(self.waits.get() + 1);
        if let Some(n) = self.quit_after_waits.get() {
            self.quit_after_waits.set(Some(n.saturating_sub(1)));
        }
    }
}
