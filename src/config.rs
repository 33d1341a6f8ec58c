/*
 * config.rs
 *
 * Init-time configuration. InitConfig is what the caller hands to init;
 * TraceConfig is what the environment hands to init:
 *
 *   SC_TRACE_FILE=run/trace   ->  run/trace.<rank>.log  (run/trace.log w/o rank)
 *   SC_TRACE_LP=SC_LP_DEBUG   ->  trace threshold, default STATISTICS
 *
 * Read once. A bad value is an error here and fatal in init.
 */

use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use crate::comm::CommHandle;
use crate::error::{Result, ScError};
use crate::log::{LogHandler, TraceSink};
use crate::priority::{DEFAULT_TRACE_THRESHOLD, LogThreshold, Priority, parse_priority};

pub const TRACE_FILE_VAR: &str = "SC_TRACE_FILE";
pub const TRACE_PRIORITY_VAR: &str = "SC_TRACE_LP";

/// Arguments of `Runtime::init`. Use struct-update syntax:
///
/// ```
/// use sc_runtime::InitConfig;
///
/// let config = InitConfig {
///     catch_signals: true,
///     ..InitConfig::default()
/// };
/// assert!(config.comm.is_none());
/// ```
#[derive(Clone, Default)]
pub struct InitConfig {
    /// `None` runs without a communicator: rank -1, local abort only.
    pub comm: Option<CommHandle>,
    /// Route SIGINT, SIGSEGV and SIGUSR2 into the abort path.
    pub catch_signals: bool,
    /// Print a backtrace before aborting.
    pub print_backtrace: bool,
    /// Global log handler, also given to the built-in package.
    pub log_handler: Option<Arc<dyn LogHandler>>,
    pub log_threshold: LogThreshold,
    /// Trace sink settings. `None` reads them from the environment.
    pub trace: Option<TraceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceConfig {
    /// path prefix; no prefix, no trace file
    pub prefix: Option<String>,
    pub threshold: Priority,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            threshold: DEFAULT_TRACE_THRESHOLD,
        }
    }
}

impl TraceConfig {
    pub fn from_env() -> Result<Self> {
        let file = env::var(TRACE_FILE_VAR).ok();
        let priority = env::var(TRACE_PRIORITY_VAR).ok();
        Self::from_values(file.as_deref(), priority.as_deref())
    }

    /// Same as `from_env` with the variables passed in. Empty values count
    /// as unset.
    pub fn from_values(file: Option<&str>, priority: Option<&str>) -> Result<Self> {
        let threshold = match priority.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => parse_priority(s)?,
            None => DEFAULT_TRACE_THRESHOLD,
        };
        let prefix = file
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        Ok(Self { prefix, threshold })
    }

    /// Trace file for `rank`, or None when tracing is off.
    pub fn path_for(&self, rank: i32) -> Option<PathBuf> {
        let prefix = self.prefix.as_deref()?;
        let name = if rank >= 0 {
            format!("{prefix}.{rank}.log")
        } else {
            format!("{prefix}.log")
        };
        Some(PathBuf::from(name))
    }

    /// Create (truncate) the trace file for `rank`.
    pub fn open(&self, rank: i32) -> Result<Option<TraceSink>> {
        let Some(path) = self.path_for(rank) else {
            return Ok(None);
        };
        let file = File::create(&path)
            .map_err(|e| ScError::TraceFile(path.display().to_string(), e.to_string()))?;
        Ok(Some(TraceSink::new(
            Box::new(BufWriter::new(file)),
            self.threshold,
        )))
    }
}
