/*
 * lib.rs
 *
 * Process-wide runtime support for MPI codes built out of several
 * packages: accounting allocation, filtered logging, one abort path.
 */

//! # sc-runtime
//!
//! Shared runtime layer for scientific codes that run as many cooperating
//! processes. Every component registers as a *package* and gets
//!
//! - allocation with per-package leak accounting that aborts instead of
//!   returning null,
//! - priority-filtered logging with per-package handlers and an optional
//!   per-rank trace file,
//! - a fail-fast abort path that takes the whole process group down with a
//!   `[rank] Abort: file:line: message` diagnostic.
//!
//! ## Quick Start
//!
//! ```rust
//! use sc_runtime::{InitConfig, LogThreshold, PackageId, Priority, Runtime, TraceConfig};
//!
//! let mut rt = Runtime::new();
//! rt.init(InitConfig {
//!     log_threshold: LogThreshold::Explicit(Priority::Production),
//!     trace: Some(TraceConfig::default()),
//!     ..InitConfig::default()
//! });
//!
//! let mesh = rt.register(None, LogThreshold::Default, "mesh", "Mesh generator");
//! let buf = rt.allocate(mesh, 1024);
//! assert_eq!(rt.balance(mesh).bytes, 1024);
//! // SAFETY: buf came from rt.allocate and is released once.
//! unsafe { rt.release(mesh, Some(buf)) };
//!
//! rt.unregister(mesh);
//! rt.finalize();
//! assert!(!rt.is_registered(PackageId::SC));
//! ```
//!
//! Most applications use the process-wide instance in [`global`] through
//! the `sc_*!` macros instead of a `Runtime` of their own.

#[macro_use]
mod macros;

pub mod abort;
pub mod allocator;
pub mod comm;
pub mod config;
pub mod error;
pub mod global;
pub mod io;
pub mod log;
pub mod package;
pub mod priority;
pub mod runtime;
pub mod signal;

pub use abort::{AbortHandler, CollectiveAbort, NoopAbort};
pub use comm::{CommHandle, Communicator, MPI_SUCCESS};
pub use config::{InitConfig, TraceConfig};
pub use error::{Result, ScError, exit_codes};
pub use log::{LogHandler, LogRecord, LogStream, StreamHandler, TracingHandler};
pub use package::{Balance, PackageId};
pub use priority::{Category, LogThreshold, Priority, parse_priority};
pub use runtime::Runtime;
