/*
 * signal.rs
 *
 * Route SIGINT, SIGSEGV and SIGUSR2 into the abort path so every failure,
 * wherever it starts, ends with the same diagnostics and the same
 * collective teardown.
 *
 * The handler cannot reach the runtime (it may be locked by the very code
 * that faulted), so the runtime publishes a copy of its abort target here
 * when it installs the handlers, and again whenever the abort handler
 * changes. The handler only try_locks the published copy; if that fails it
 * aborts bare.
 *
 * Local Signal enum with libc constants - no nix dependency.
 */

use core::fmt::Write;

use parking_lot::{Mutex, const_mutex};

use crate::abort::{self, AbortTarget};
use crate::io::StderrWriter;

/* the signals we intercept. Copy/PartialEq for easy comparison. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Signal {
    SIGINT = libc::SIGINT,
    SIGSEGV = libc::SIGSEGV,
    SIGUSR2 = libc::SIGUSR2,
}

pub const CAUGHT: [Signal; 3] = [Signal::SIGINT, Signal::SIGSEGV, Signal::SIGUSR2];

impl Signal {
    /* convert from raw signal number */
    pub fn try_from_raw(num: i32) -> Option<Self> {
        match num {
            libc::SIGINT => Some(Self::SIGINT),
            libc::SIGSEGV => Some(Self::SIGSEGV),
            libc::SIGUSR2 => Some(Self::SIGUSR2),
            _ => None,
        }
    }

    /* get raw signal number */
    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

/* short name for the "Caught signal" line */
#[must_use]
pub const fn signal_name(signal: Signal) -> &'static str {
    match signal {
        Signal::SIGINT => "INT",
        Signal::SIGSEGV => "SEGV",
        Signal::SIGUSR2 => "USR2",
    }
}

/* abort target the signal handler uses, None while no handlers are installed */
static ROUTE: Mutex<Option<AbortTarget>> = const_mutex(None);

/// Replace the abort target seen by the signal handler.
pub fn publish(target: AbortTarget) {
    *ROUTE.lock() = Some(target);
}

/// Copy of the published target, without blocking.
pub fn published() -> Option<AbortTarget> {
    ROUTE.try_lock().and_then(|route| route.clone())
}

/// Installed signal handlers. Dropping it restores the dispositions that
/// were in place before and withdraws the published target.
pub struct SignalGuard {
    saved: [libc::sigaction; CAUGHT.len()],
}

impl SignalGuard {
    pub fn install(target: AbortTarget) -> Self {
        /* publish first so a signal right after sigaction() finds a target */
        publish(target);

        // SAFETY: sigaction is a plain C struct, all-zero is a valid value.
        let mut saved: [libc::sigaction; CAUGHT.len()] = unsafe { core::mem::zeroed() };

        // SAFETY: sigaction struct is zeroed then properly initialized.
        // abort_on_signal is an extern "C" fn with correct signature.
        // sigemptyset and sigaction are standard POSIX calls with valid args;
        // each old-action pointer refers to a distinct element of `saved`.
        #[allow(clippy::multiple_unsafe_ops_per_block)]
        unsafe {
            let mut sa: libc::sigaction = core::mem::zeroed();
            sa.sa_sigaction = abort_on_signal as *const () as usize;
            sa.sa_flags = 0;
            libc::sigemptyset(&raw mut sa.sa_mask);

            for (sig, old) in CAUGHT.iter().zip(saved.iter_mut()) {
                libc::sigaction(sig.as_raw(), &sa, old);
            }
        }

        Self { saved }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        /* restore handlers FIRST so nothing fires into a withdrawn route */
        // SAFETY: every element of `saved` was filled in by sigaction() during
        // install, so it is a valid disposition to put back.
        #[allow(clippy::multiple_unsafe_ops_per_block)]
        unsafe {
            for (sig, old) in CAUGHT.iter().zip(self.saved.iter()) {
                libc::sigaction(sig.as_raw(), old, core::ptr::null_mut());
            }
        }
        *ROUTE.lock() = None;
    }
}

extern "C" fn abort_on_signal(sig: i32) {
    let name = Signal::try_from_raw(sig).map_or("<unknown>", signal_name);
    let _ = writeln!(StderrWriter, "Caught signal {name}");

    let target = published().unwrap_or_else(AbortTarget::bare);
    abort::abort_with(&target)
}
