/*
 * error.rs
 *
 * Errors for the few places that can fail without being fatal on the spot:
 * parsing, environment configuration, registry bookkeeping, opening the
 * trace file. The runtime turns every one of these into an abort at the
 * caller's location. Nothing here is ever handed back to application code
 * as a recoverable condition except from the parsing helpers.
 */

use core::fmt;

use crate::package::PackageId;

/// exit codes of the self-test driver. abort paths never return one.
pub mod exit_codes {
    /// Scenario ran to completion
    pub const SUCCESS: u8 = 0;
    /// Unknown scenario or missing argument
    pub const USAGE: u8 = 2;
}

/* everything that can go wrong before we decide to abort */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScError {
    InvalidPriority(String),
    TraceFile(String, String), // path + io error text
    NotRegistered(PackageId),
    DuplicatePackage(String),
    ReservedPackage,
    AlreadyInitialized,
    AllocationFailed(usize),
    AllocationOverflow(usize, usize), // count + element size
    UntrackedPointer(usize),
    Unbalanced(PackageId),
    Mpi(i32), // return code that was not MPI_SUCCESS
}

impl fmt::Display for ScError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPriority(s) => write!(f, "invalid log priority: {s}"),
            Self::TraceFile(path, err) => write!(f, "cannot open trace file '{path}': {err}"),
            Self::NotRegistered(id) => write!(f, "package {id} is not registered"),
            Self::DuplicatePackage(name) => write!(f, "package {name} is already registered"),
            Self::ReservedPackage => write!(f, "built-in package is already registered"),
            Self::AlreadyInitialized => write!(f, "runtime initialized twice without finalize"),
            Self::AllocationFailed(size) => write!(f, "allocation of {size} bytes failed"),
            Self::AllocationOverflow(n, size) => {
                write!(f, "allocation of {n} x {size} bytes overflows")
            }
            Self::UntrackedPointer(addr) => write!(
                f,
                "pointer {addr:#x} was not allocated here or was already released"
            ),
            Self::Unbalanced(id) => write!(f, "memory balance of package {id} is not zero"),
            Self::Mpi(code) => write!(f, "MPI error (code {code})"),
        }
    }
}

impl std::error::Error for ScError {}

pub type Result<T> = core::result::Result<T, ScError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_registered_display() {
        let msg = ScError::NotRegistered(PackageId::from_raw(7)).to_string();
        assert_eq!(msg, "package 7 is not registered");
    }

    #[test]
    fn test_allocation_display_names_size() {
        let msg = ScError::AllocationFailed(4096).to_string();
        assert!(msg.contains("4096"), "message should name the request: {msg}");
    }

    #[test]
    fn test_unbalanced_display() {
        let msg = ScError::Unbalanced(PackageId::SC).to_string();
        assert_eq!(msg, "memory balance of package 0 is not zero");
    }

    #[test]
    fn test_mpi_display() {
        assert_eq!(ScError::Mpi(13).to_string(), "MPI error (code 13)");
    }
}
