/*
 * abort.rs
 *
 * The terminal failure path. NORMAL -> ABORTING -> TERMINATED, no way back.
 *
 * Everything in here must work with the heap gone and from inside a signal
 * handler, so output goes through io::StderrWriter and the only shared state
 * is one atomic byte. Backtraces are the exception; they are opt-in.
 *
 * The installed handler gets one shot. It is never trusted to terminate the
 * process: whatever it does, we call abort() afterwards. If anything on the
 * way faults and lands us back here, the second entry skips straight to
 * abort() instead of recursing.
 */

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::comm::{ABORT_ERRORCODE, CommHandle};
use crate::io::StderrWriter;

/* process-wide abort state */
const NORMAL: u8 = 0;
const ABORTING: u8 = 1;
const TERMINATED: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(NORMAL);

/// Runs once on the way down, before the process terminates.
pub trait AbortHandler: Send + Sync {
    fn handle_abort(&self);
}

impl<F> AbortHandler for F
where
    F: Fn() + Send + Sync,
{
    fn handle_abort(&self) {
        self();
    }
}

/// Does nothing; the process still terminates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAbort;

impl AbortHandler for NoopAbort {
    fn handle_abort(&self) {}
}

/// Default handler: ask every process in the communicator to terminate, so
/// surviving ranks do not block forever in a collective the aborted rank
/// will never reach. Without a communicator it does nothing and the local
/// process terminates on its own.
#[derive(Clone, Default)]
pub struct CollectiveAbort {
    comm: Option<CommHandle>,
}

impl CollectiveAbort {
    pub fn new(comm: Option<CommHandle>) -> Self {
        Self { comm }
    }
}

impl AbortHandler for CollectiveAbort {
    fn handle_abort(&self) {
        if let Some(comm) = &self.comm {
            comm.abort(ABORT_ERRORCODE);
        }
    }
}

/// Everything the abort path needs, detached from the runtime so that a
/// signal handler can hold a copy.
#[derive(Clone)]
pub struct AbortTarget {
    pub handler: Option<Arc<dyn AbortHandler>>,
    pub print_backtrace: bool,
    pub rank: i32,
}

impl AbortTarget {
    /// No handler, no backtrace, no rank.
    pub const fn bare() -> Self {
        Self {
            handler: None,
            print_backtrace: false,
            rank: -1,
        }
    }
}

/// True once any abort has started in this process.
#[inline]
pub fn is_aborting() -> bool {
    STATE.load(Ordering::SeqCst) != NORMAL
}

/// Print a backtrace if asked to, run the handler, terminate.
pub fn abort_with(target: &AbortTarget) -> ! {
    if STATE
        .compare_exchange(NORMAL, ABORTING, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        /* re-entered while aborting */
        terminate();
    }

    if target.print_backtrace {
        print_backtrace();
    }

    if let Some(handler) = &target.handler {
        /* a panicking handler must not keep us alive */
        let _ = panic::catch_unwind(AssertUnwindSafe(|| handler.handle_abort()));
    }

    terminate()
}

/// Write `[rank] Abort: file:line: message` to stderr, then `abort_with`.
pub fn abort_verbose_with(
    target: &AbortTarget,
    file: &str,
    line: u32,
    message: fmt::Arguments<'_>,
) -> ! {
    write_abort_message(target.rank, file, line, message);
    abort_with(target)
}

pub fn write_abort_message(rank: i32, file: &str, line: u32, message: fmt::Arguments<'_>) {
    let mut w = StderrWriter;
    if rank >= 0 {
        let _ = write!(w, "[{rank}] ");
    }
    let _ = writeln!(w, "Abort: {file}:{line}: {message}");
}

fn print_backtrace() {
    let bt = std::backtrace::Backtrace::force_capture();
    let _ = writeln!(StderrWriter, "Backtrace:\n{bt}");
}

fn terminate() -> ! {
    STATE.store(TERMINATED, Ordering::SeqCst);
    // SAFETY: abort() has no preconditions and never returns. It raises
    // SIGABRT, which we never catch, so the exit status is always abnormal.
    unsafe { libc::abort() }
}
