/*
 * priority.rs
 *
 * The eight log priorities and the two categories.
 *
 * Parse "SC_LP_VERBOSE", "verbose", "Verbose", "3". Reject "LOUD", "8".
 * Same shape as signal name parsing: optional prefix, case insensitive,
 * numbers accepted. Used for SC_TRACE_LP.
 */

use core::fmt;
use core::str::FromStr;

use crate::error::{Result, ScError};

/// Log priority, totally ordered from `Always` to `Silent`.
///
/// As a threshold, `Always` lets everything through and `Silent` nothing.
/// As a message priority, `Always` is never suppressed and `Silent` is
/// never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Priority {
    /// log everything
    Always = 0,
    /// prefixes file and line number
    Trace = 1,
    /// any information on the internal state
    Debug = 2,
    /// information on conditions, decisions
    Verbose = 3,
    /// the main things a function is doing
    Info = 4,
    /// important for consistency or performance
    Statistics = 5,
    /// a few lines for a major api function
    Production = 6,
    /// never logs anything
    Silent = 7,
}

/* compiled-in global threshold, chattier in debug builds */
#[cfg(debug_assertions)]
pub const DEFAULT_THRESHOLD: Priority = Priority::Trace;
#[cfg(not(debug_assertions))]
pub const DEFAULT_THRESHOLD: Priority = Priority::Info;

/* trace sink threshold when SC_TRACE_LP is unset */
pub const DEFAULT_TRACE_THRESHOLD: Priority = Priority::Statistics;

impl Priority {
    pub const ALL: [Priority; 8] = [
        Self::Always,
        Self::Trace,
        Self::Debug,
        Self::Verbose,
        Self::Info,
        Self::Statistics,
        Self::Production,
        Self::Silent,
    ];

    #[inline]
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Verbose => "VERBOSE",
            Self::Info => "INFO",
            Self::Statistics => "STATISTICS",
            Self::Production => "PRODUCTION",
            Self::Silent => "SILENT",
        }
    }
}

impl TryFrom<i32> for Priority {
    type Error = ScError;

    fn try_from(raw: i32) -> Result<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| ScError::InvalidPriority(format!("priority out of range: {raw}")))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Priority {
    type Err = ScError;

    fn from_str(s: &str) -> Result<Self> {
        parse_priority(s)
    }
}

/// Parse a priority name or number.
///
/// ```
/// use sc_runtime::priority::{parse_priority, Priority};
///
/// assert_eq!(parse_priority("SC_LP_VERBOSE").unwrap(), Priority::Verbose);
/// assert_eq!(parse_priority("info").unwrap(), Priority::Info);
/// assert_eq!(parse_priority("6").unwrap(), Priority::Production);
/// assert!(parse_priority("LOUD").is_err());
/// ```
pub fn parse_priority(input: &str) -> Result<Priority> {
    let input = input.trim();

    if let Ok(num) = input.parse::<i32>() {
        return Priority::try_from(num);
    }

    /* SC_LP_ prefix is optional, any case */
    let name = match input.get(..6) {
        Some(prefix) if prefix.eq_ignore_ascii_case("SC_LP_") => &input[6..],
        _ => input,
    };

    Priority::ALL
        .into_iter()
        .find(|p| name.eq_ignore_ascii_case(p.name()))
        .ok_or_else(|| ScError::InvalidPriority(format!("unknown priority: {input}")))
}

/// Threshold of a package or of the global configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogThreshold {
    /// defer to the global threshold (or the compiled default)
    #[default]
    Default,
    Explicit(Priority),
}

impl LogThreshold {
    #[inline]
    pub const fn resolve(self, fallback: Priority) -> Priority {
        match self {
            Self::Default => fallback,
            Self::Explicit(p) => p,
        }
    }
}

impl From<Priority> for LogThreshold {
    fn from(p: Priority) -> Self {
        Self::Explicit(p)
    }
}

impl fmt::Display for LogThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("DEFAULT"),
            Self::Explicit(p) => p.fmt(f),
        }
    }
}

/// Who is expected to emit a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// lead process only (rank 0, or every process without a communicator)
    Global,
    /// every process
    Normal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_order() {
        for pair in Priority::ALL.windows(2) {
            assert!(pair[0] < pair[1], "{} should be below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_parse_with_prefix() {
        assert_eq!(parse_priority("SC_LP_TRACE").unwrap(), Priority::Trace);
        assert_eq!(parse_priority("sc_lp_silent").unwrap(), Priority::Silent);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(parse_priority("statistics").unwrap(), Priority::Statistics);
        assert_eq!(parse_priority("Debug").unwrap(), Priority::Debug);
        assert_eq!(parse_priority("  INFO ").unwrap(), Priority::Info);
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_priority("0").unwrap(), Priority::Always);
        assert_eq!(parse_priority("7").unwrap(), Priority::Silent);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_priority("").is_err());
        assert!(parse_priority("SC_LP_").is_err());
        assert!(parse_priority("LOUD").is_err());
        assert!(parse_priority("8").is_err());
        assert!(parse_priority("-1").is_err());
    }

    #[test]
    fn test_try_from_roundtrips_raw() {
        for p in Priority::ALL {
            assert_eq!(Priority::try_from(p.as_raw()).unwrap(), p);
        }
    }

    #[test]
    fn test_threshold_resolve() {
        assert_eq!(LogThreshold::Default.resolve(Priority::Info), Priority::Info);
        assert_eq!(
            LogThreshold::from(Priority::Debug).resolve(Priority::Info),
            Priority::Debug
        );
    }
}
