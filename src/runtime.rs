/*
 * runtime.rs
 *
 * The Runtime context: everything the process-wide layer knows about
 * itself, and the init/finalize lifecycle around it.
 *
 * Runtime::new() is the pristine state: no communicator, rank -1, stdout,
 * compiled default threshold, no abort handler, no signal handlers, no
 * packages. Logging and allocation work in that state. init() configures,
 * finalize() puts everything back, finalize() without init() does nothing.
 *
 * Methods take &mut self and never lock. The process-wide instance and its
 * mutex live in global.rs.
 */

use core::fmt;
use core::panic::Location;
use core::time::Duration;
use std::sync::Arc;

use crate::abort::{self, AbortHandler, AbortTarget, CollectiveAbort};
use crate::comm::{self, CommHandle, MPI_SUCCESS};
use crate::config::{InitConfig, TraceConfig};
use crate::error::{Result, ScError};
use crate::log::{LogConfig, TraceSink};
use crate::package::{PackageId, Registry};
use crate::priority::DEFAULT_THRESHOLD;
use crate::signal::{self, SignalGuard};

/// Name of the built-in package registered by `init`.
pub const BUILTIN_NAME: &str = "sc";
pub const BUILTIN_FULL_NAME: &str = "SC runtime support";

/* non-lead ranks wait this long in abort_collective so rank 0 reports first */
const COLLECTIVE_GRACE: Duration = Duration::from_secs(3);

pub struct Runtime {
    initialized: bool,
    comm: Option<CommHandle>,
    rank: i32,
    pub(crate) log: LogConfig,
    pub(crate) trace: Option<TraceSink>,
    pub(crate) registry: Registry,
    abort_handler: Option<Arc<dyn AbortHandler>>,
    print_backtrace: bool,
    signals: Option<SignalGuard>,
}

impl Runtime {
    pub const fn new() -> Self {
        Self {
            initialized: false,
            comm: None,
            rank: -1,
            log: LogConfig::new(),
            trace: None,
            registry: Registry::new(),
            abort_handler: None,
            print_backtrace: false,
            signals: None,
        }
    }

    /// Configure the runtime. Calling it twice without `finalize` is fatal,
    /// and so is a trace configuration that does not parse or open.
    #[track_caller]
    pub fn init(&mut self, config: InitConfig) {
        if let Err(e) = self.try_init(config) {
            self.fatal(format_args!("{e}"));
        }
    }

    /* the collective handler goes in before anything that can fail, so a
     * failing rank still takes the others down with it */
    pub(crate) fn try_init(&mut self, config: InitConfig) -> Result<()> {
        if self.initialized {
            return Err(ScError::AlreadyInitialized);
        }
        let InitConfig {
            comm,
            catch_signals,
            print_backtrace,
            log_handler,
            log_threshold,
            trace,
        } = config;

        self.rank = comm::rank_of(comm.as_ref());
        self.comm = comm;
        self.abort_handler = Some(Arc::new(CollectiveAbort::new(self.comm.clone())));
        self.print_backtrace = print_backtrace;

        self.log.handler = log_handler.clone();
        self.log.threshold = log_threshold.resolve(DEFAULT_THRESHOLD);

        let trace = trace.map_or_else(TraceConfig::from_env, Ok)?;
        self.trace = trace.open(self.rank)?;

        if catch_signals {
            self.signals = Some(SignalGuard::install(self.abort_target()));
        }

        self.registry.register_builtin(
            log_handler,
            log_threshold,
            BUILTIN_NAME,
            BUILTIN_FULL_NAME,
        )?;
        self.initialized = true;
        Ok(())
    }

    /// Tear down in reverse: balance checks, packages newest first, the
    /// built-in package, signal dispositions, abort handler. Leaves the
    /// pristine state behind. Memory still held by the built-in package is
    /// fatal in debug builds.
    #[track_caller]
    pub fn finalize(&mut self) {
        if let Err(e) = self.try_finalize() {
            self.fatal(format_args!("{e}"));
        }
    }

    pub(crate) fn try_finalize(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }

        if self.registry.is_registered(PackageId::SC) {
            self.try_memory_check(PackageId::SC)?;
        }
        self.check_balance(PackageId::NONE);

        for id in self.registry.ids().into_iter().rev() {
            if id != PackageId::SC {
                self.try_unregister(id)?;
            }
        }
        let _ = self.registry.remove(PackageId::SC);

        /* dropping the guard restores the old dispositions */
        self.signals = None;
        self.abort_handler = None;

        *self = Self::new();
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Rank in the communicator, -1 without one.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn communicator(&self) -> Option<&CommHandle> {
        self.comm.as_ref()
    }

    pub fn catches_signals(&self) -> bool {
        self.signals.is_some()
    }

    /// Install `handler` for every later abort; `None` leaves only the
    /// local termination. Last writer wins.
    pub fn set_abort_handler(&mut self, handler: Option<Arc<dyn AbortHandler>>) {
        self.abort_handler = handler;
        if self.signals.is_some() {
            signal::publish(self.abort_target());
        }
    }

    pub fn set_print_backtrace(&mut self, print_backtrace: bool) {
        self.print_backtrace = print_backtrace;
        if self.signals.is_some() {
            signal::publish(self.abort_target());
        }
    }

    pub fn abort_target(&self) -> AbortTarget {
        AbortTarget {
            handler: self.abort_handler.clone(),
            print_backtrace: self.print_backtrace,
            rank: self.rank,
        }
    }

    /// Run the abort handler and terminate. Never returns.
    pub fn abort(&self) -> ! {
        abort::abort_with(&self.abort_target())
    }

    /// Print `[rank] Abort: file:line: message` to stderr, then `abort`.
    pub fn abort_verbose(&self, file: &str, line: u32, message: &str) -> ! {
        self.abort_verbose_args(file, line, format_args!("{message}"))
    }

    pub fn abort_verbose_args(&self, file: &str, line: u32, message: fmt::Arguments<'_>) -> ! {
        abort::abort_verbose_with(&self.abort_target(), file, line, message)
    }

    /// Abort every rank with one message. All ranks must call this: after
    /// a barrier, rank 0 aborts verbosely and the others wait briefly and
    /// abort quietly, so the report comes from the lead rank.
    #[track_caller]
    pub fn abort_collective(&self, message: &str) -> ! {
        collective_abort(
            self.comm.as_ref(),
            &self.abort_target(),
            Location::caller(),
            message,
        )
    }

    /// Abort at the caller's location.
    #[track_caller]
    pub(crate) fn fatal(&self, message: fmt::Arguments<'_>) -> ! {
        let location = Location::caller();
        self.abort_verbose_args(location.file(), location.line(), message)
    }
}

pub(crate) fn collective_abort(
    comm: Option<&CommHandle>,
    target: &AbortTarget,
    location: &Location<'_>,
    message: &str,
) -> ! {
    if let Some(comm) = comm {
        let code = comm.barrier();
        if code != MPI_SUCCESS {
            abort::abort_verbose_with(
                target,
                location.file(),
                location.line(),
                format_args!("{}", ScError::Mpi(code)),
            );
        }
    }
    if target.rank <= 0 {
        abort::abort_verbose_with(
            target,
            location.file(),
            location.line(),
            format_args!("{message}"),
        );
    }
    std::thread::sleep(COLLECTIVE_GRACE);
    abort::abort_with(target)
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}
