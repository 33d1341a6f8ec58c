/*
 * log.rs
 *
 * The logging dispatcher. A record goes to at most two places:
 *
 *   normal  - if priority >= effective threshold. The package's handler,
 *             else the global one, else StreamHandler on the log stream.
 *   trace   - if a trace sink is open and priority >= its threshold.
 *             Always with file:line, whatever the normal decision was.
 *
 * Always is never suppressed, Silent never emitted, whatever the
 * thresholds say. Category is carried, not filtered; dropping
 * global records on non-root ranks is the caller's job (see global.rs).
 *
 * Formatting happens once, after we know somebody wants the record.
 */

use core::fmt::{self, Write as _};
use std::io::{self, Write};
use std::sync::Arc;

use crate::package::{Package, PackageId};
use crate::priority::{Category, DEFAULT_THRESHOLD, LogThreshold, Priority};
use crate::runtime::Runtime;

/// One message on its way out. Borrowed from the caller, never stored.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub file: &'a str,
    pub line: u32,
    /// NONE unless the id was registered when the record was made
    pub package: PackageId,
    pub package_name: Option<&'a str>,
    /// -1 without a communicator
    pub rank: i32,
    pub category: Category,
    pub priority: Priority,
    pub message: &'a str,
}

/// Receives every record that passed the threshold, with the configured
/// log stream as `out`. Handlers that send records elsewhere may ignore it.
pub trait LogHandler: Send + Sync {
    fn log(&self, out: &mut dyn Write, record: &LogRecord<'_>);
}

impl<F> LogHandler for F
where
    F: Fn(&mut dyn Write, &LogRecord<'_>) + Send + Sync,
{
    fn log(&self, out: &mut dyn Write, record: &LogRecord<'_>) {
        self(out, record);
    }
}

/// Builtin handler: the plain text format on the log stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamHandler;

impl LogHandler for StreamHandler {
    fn log(&self, out: &mut dyn Write, record: &LogRecord<'_>) {
        /* nowhere to report a failing log stream */
        let _ = write_record(out, record, false);
    }
}

/// Forwards records to `tracing`. The stream is ignored; install a
/// subscriber to see anything. `Always` records go out at WARN so that the
/// usual level filters keep them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHandler;

impl LogHandler for TracingHandler {
    fn log(&self, _out: &mut dyn Write, record: &LogRecord<'_>) {
        let package = record.package_name.unwrap_or("-");
        let rank = record.rank;
        let file = basename(record.file);
        let line = record.line;
        let message = record.message.trim_end_matches('\n');

        macro_rules! emit {
            ($level:expr) => {
                tracing::event!(target: "sc", $level, package, rank, file, line, "{}", message)
            };
        }

        match record.priority {
            Priority::Always => emit!(tracing::Level::WARN),
            Priority::Trace => emit!(tracing::Level::TRACE),
            Priority::Debug | Priority::Verbose => emit!(tracing::Level::DEBUG),
            Priority::Info | Priority::Statistics | Priority::Production => {
                emit!(tracing::Level::INFO)
            }
            Priority::Silent => {}
        }
    }
}

fn passes(priority: Priority, threshold: Priority) -> bool {
    match priority {
        Priority::Always => true,
        Priority::Silent => false,
        _ => priority >= threshold,
    }
}

/* strip directories, the way __FILE__ is usually shown */
fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Write `record` in the builtin format: `[<package> <rank>] `, then
/// `<file>:<line> ` for trace records (or when asked), then the message and
/// a newline unless it already ends with one. The whole line goes out in
/// one write.
pub fn write_record(
    out: &mut dyn Write,
    record: &LogRecord<'_>,
    with_location: bool,
) -> io::Result<()> {
    let mut line = String::with_capacity(record.message.len() + 32);
    let ranked = record.category == Category::Normal && record.rank >= 0;

    let _ = match (record.package_name, ranked) {
        (Some(name), true) => write!(line, "[{name} {}] ", record.rank),
        (Some(name), false) => write!(line, "[{name}] "),
        (None, true) => write!(line, "[{}] ", record.rank),
        (None, false) => Ok(()),
    };
    if with_location || record.priority == Priority::Trace {
        let _ = write!(line, "{}:{} ", basename(record.file), record.line);
    }
    line.push_str(record.message);
    if !line.ends_with('\n') {
        line.push('\n');
    }

    out.write_all(line.as_bytes())?;
    out.flush()
}

/// Where the builtin handler writes.
#[derive(Default)]
pub enum LogStream {
    #[default]
    Stdout,
    Stderr,
    Writer(Box<dyn Write + Send>),
}

impl LogStream {
    fn with<R>(&mut self, f: impl FnOnce(&mut dyn Write) -> R) -> R {
        match self {
            Self::Stdout => f(&mut io::stdout().lock()),
            Self::Stderr => f(&mut io::stderr().lock()),
            Self::Writer(w) => f(w.as_mut()),
        }
    }
}

impl fmt::Debug for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("Stdout"),
            Self::Stderr => f.write_str("Stderr"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Global log defaults: used for packages without their own setting and
/// for ids that are not registered.
pub struct LogConfig {
    pub stream: LogStream,
    pub handler: Option<Arc<dyn LogHandler>>,
    pub threshold: Priority,
}

impl LogConfig {
    pub const fn new() -> Self {
        Self {
            stream: LogStream::Stdout,
            handler: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-rank trace file, independent of the normal threshold.
pub struct TraceSink {
    writer: Box<dyn Write + Send>,
    threshold: Priority,
}

impl TraceSink {
    pub fn new(writer: Box<dyn Write + Send>, threshold: Priority) -> Self {
        Self { writer, threshold }
    }

    pub fn threshold(&self) -> Priority {
        self.threshold
    }
}

impl Runtime {
    /// Replace the global log defaults. `None` selects stdout;
    /// `LogThreshold::Default` the compiled default.
    pub fn set_log_defaults(
        &mut self,
        stream: Option<LogStream>,
        handler: Option<Arc<dyn LogHandler>>,
        threshold: LogThreshold,
    ) {
        self.log.stream = stream.unwrap_or_default();
        self.log.handler = handler;
        self.log.threshold = threshold.resolve(DEFAULT_THRESHOLD);
    }

    /// Global threshold, used by packages without an explicit one.
    pub fn log_threshold(&self) -> Priority {
        self.log.threshold
    }

    /// Threshold that applies to `package`; unregistered ids get the global one.
    pub fn effective_threshold(&self, package: PackageId) -> Priority {
        self.registry
            .get(package)
            .map_or(self.log.threshold, |p| p.log_threshold().resolve(self.log.threshold))
    }

    /// Whether a record would reach any sink.
    pub fn is_enabled(&self, package: PackageId, priority: Priority) -> bool {
        passes(priority, self.effective_threshold(package))
            || self
                .trace
                .as_ref()
                .is_some_and(|t| passes(priority, t.threshold))
    }

    /// Dispatch one record. `message` is formatted only if some sink wants it.
    pub fn log(
        &mut self,
        file: &str,
        line: u32,
        package: PackageId,
        category: Category,
        priority: Priority,
        message: fmt::Arguments<'_>,
    ) {
        let normal = passes(priority, self.effective_threshold(package));
        let traced = self
            .trace
            .as_ref()
            .is_some_and(|t| passes(priority, t.threshold));
        if !normal && !traced {
            return;
        }

        let owned: String;
        let message = match message.as_str() {
            Some(s) => s,
            None => {
                owned = message.to_string();
                &owned
            }
        };

        let registered = self.registry.get(package);
        let record = LogRecord {
            file,
            line,
            package: registered.map_or(PackageId::NONE, Package::id),
            package_name: registered.map(Package::name),
            rank: self.rank(),
            category,
            priority,
            message,
        };

        if traced && let Some(trace) = self.trace.as_mut() {
            let _ = write_record(trace.writer.as_mut(), &record, true);
        }

        if normal {
            let handler = registered
                .and_then(Package::log_handler)
                .or(self.log.handler.as_ref());
            match handler {
                Some(handler) => self.log.stream.with(|out| handler.log(out, &record)),
                None => self.log.stream.with(|out| StreamHandler.log(out, &record)),
            }
        }
    }

    /// `log` for an already formatted message.
    pub fn log_str(
        &mut self,
        file: &str,
        line: u32,
        package: PackageId,
        category: Category,
        priority: Priority,
        message: &str,
    ) {
        self.log(file, line, package, category, priority, format_args!("{message}"));
    }
}
