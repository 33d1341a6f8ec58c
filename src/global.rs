/*
 * global.rs
 *
 * One Runtime per process behind a parking_lot mutex, plus free functions
 * that lock it for a single call. This is what the sc_* macros use.
 *
 * The mutex is not reentrant. Abort handlers may call back into this
 * module: every fatal condition found under the lock is carried out as a
 * ScError, the guard is dropped, and only then does the abort path run the
 * handler. Log handlers run with the guard held and must not call back in.
 * Code holding a guard from runtime() must not log through this module or
 * abort through Runtime methods while it holds it.
 *
 * The abort entry points cannot simply lock either: the abort may have been
 * raised by code that already holds the guard. They wait briefly for the
 * lock and otherwise fall back to the target published for the signal
 * handlers, or to a bare abort.
 */

use core::fmt;
use core::panic::Location;
use core::ptr::NonNull;
use core::time::Duration;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, const_mutex};

use crate::abort::{self, AbortHandler, AbortTarget};
use crate::config::InitConfig;
use crate::error::Result;
use crate::log::{LogHandler, LogStream};
use crate::package::{Balance, PackageId};
use crate::priority::{Category, LogThreshold, Priority};
use crate::runtime::{Runtime, collective_abort};
use crate::signal;

static RUNTIME: Mutex<Runtime> = const_mutex(Runtime::new());

/* how long an abort waits for a runtime locked by somebody else */
const LOCK_PATIENCE: Duration = Duration::from_millis(100);

/// Lock the process-wide runtime. Do not hold the guard across calls to
/// the free functions in this module, and do not let a fatal condition
/// happen under it: the abort handler would run with the lock held.
pub fn runtime() -> MutexGuard<'static, Runtime> {
    RUNTIME.lock()
}

/* Run one fallible operation under the lock. On failure the abort target is
 * taken while locked and the abort runs after the guard is gone. */
#[track_caller]
fn locked<T>(op: impl FnOnce(&mut Runtime) -> Result<T>) -> T {
    let location = Location::caller();
    let mut rt = runtime();
    let result = op(&mut rt);
    match result {
        Ok(value) => value,
        Err(e) => {
            let target = rt.abort_target();
            drop(rt);
            abort::abort_verbose_with(&target, location.file(), location.line(), format_args!("{e}"))
        }
    }
}

#[track_caller]
pub fn init(config: InitConfig) {
    locked(|rt| rt.try_init(config));
}

#[track_caller]
pub fn finalize() {
    locked(Runtime::try_finalize);
}

#[track_caller]
pub fn register(
    log_handler: Option<Arc<dyn LogHandler>>,
    log_threshold: LogThreshold,
    name: &str,
    full_name: &str,
) -> PackageId {
    locked(|rt| {
        rt.registry
            .register(log_handler, log_threshold, name, full_name)
    })
}

#[track_caller]
pub fn unregister(id: PackageId) {
    locked(|rt| rt.try_unregister(id));
}

pub fn is_registered(id: PackageId) -> bool {
    runtime().is_registered(id)
}

#[track_caller]
pub fn set_package_log_threshold(id: PackageId, threshold: LogThreshold) {
    locked(|rt| rt.try_set_package_log_threshold(id, threshold));
}

#[track_caller]
pub fn set_package_log_handler(id: PackageId, handler: Option<Arc<dyn LogHandler>>) {
    locked(|rt| rt.try_set_package_log_handler(id, handler));
}

pub fn print_summary(priority: Priority) {
    runtime().print_summary(priority);
}

pub fn set_log_defaults(
    stream: Option<LogStream>,
    handler: Option<Arc<dyn LogHandler>>,
    threshold: LogThreshold,
) {
    runtime().set_log_defaults(stream, handler, threshold);
}

pub fn set_abort_handler(handler: Option<Arc<dyn AbortHandler>>) {
    runtime().set_abort_handler(handler);
}

pub fn rank() -> i32 {
    runtime().rank()
}

/// True on rank 0, and everywhere without a communicator.
pub fn is_root() -> bool {
    runtime().rank() <= 0
}

/// Dispatch a record. Global records are dropped on ranks above 0.
pub fn log(
    file: &str,
    line: u32,
    package: PackageId,
    category: Category,
    priority: Priority,
    message: fmt::Arguments<'_>,
) {
    let mut rt = runtime();
    if category == Category::Global && rt.rank() > 0 {
        return;
    }
    rt.log(file, line, package, category, priority, message);
}

#[track_caller]
pub fn allocate(package: PackageId, size: usize) -> NonNull<u8> {
    locked(|rt| rt.try_allocate(package, size))
}

#[track_caller]
pub fn allocate_zeroed(package: PackageId, n: usize, size: usize) -> NonNull<u8> {
    locked(|rt| rt.try_allocate_zeroed(package, n, size))
}

/// # Safety
/// Same contract as `Runtime::reallocate`.
#[track_caller]
pub unsafe fn reallocate(package: PackageId, ptr: Option<NonNull<u8>>, size: usize) -> NonNull<u8> {
    locked(|rt| {
        // SAFETY: forwarded from the caller.
        unsafe { rt.try_reallocate(package, ptr, size) }
    })
}

#[track_caller]
pub fn duplicate_string(package: PackageId, s: &str) -> NonNull<u8> {
    locked(|rt| rt.try_duplicate_string(package, s))
}

/// # Safety
/// Same contract as `Runtime::release`.
#[track_caller]
pub unsafe fn release(package: PackageId, ptr: Option<NonNull<u8>>) {
    locked(|rt| {
        // SAFETY: forwarded from the caller.
        unsafe { rt.try_release(package, ptr) }
    });
}

#[track_caller]
pub fn memory_check(package: PackageId) {
    locked(|rt| rt.try_memory_check(package));
}

pub fn balance(package: PackageId) -> Balance {
    runtime().balance(package)
}

/* current abort target without risking a deadlock */
fn abort_target() -> AbortTarget {
    match RUNTIME.try_lock_for(LOCK_PATIENCE) {
        Some(rt) => rt.abort_target(),
        None => signal::published().unwrap_or_else(AbortTarget::bare),
    }
}

pub fn abort() -> ! {
    abort::abort_with(&abort_target())
}

pub fn abort_verbose(file: &str, line: u32, message: fmt::Arguments<'_>) -> ! {
    abort::abort_verbose_with(&abort_target(), file, line, message)
}

/// Collective abort; the barrier and the abort run without the lock.
#[track_caller]
pub fn abort_collective(message: &str) -> ! {
    let location = Location::caller();
    let (comm, target) = {
        let rt = runtime();
        (rt.communicator().cloned(), rt.abort_target())
    };
    collective_abort(comm.as_ref(), &target, location, message)
}
