/*
 * comm.rs
 *
 * The distributed-process runtime is a collaborator, not a dependency.
 * Anything that can report a rank and tear down its process group can be
 * plugged in: an MPI binding wraps its communicator in this trait, tests
 * use an in-process stand-in. "No communicator" is plain `None`.
 */

use std::sync::Arc;

/// Success code of the communicator primitives, checked by `sc_check_mpi!`.
pub const MPI_SUCCESS: i32 = 0;

/// Error code handed to `Communicator::abort` by the default abort handler.
pub const ABORT_ERRORCODE: i32 = 1;

/// Handle to a group of cooperating processes.
///
/// Implementations must be cheap to share: the runtime keeps one `Arc`
/// for rank queries and another inside the default abort handler.
pub trait Communicator: Send + Sync {
    /// Rank of the calling process, 0-based.
    fn rank(&self) -> i32;

    /// Number of processes in the group.
    fn size(&self) -> i32 {
        1
    }

    /// Block until every process has entered. Returns an MPI-style code.
    fn barrier(&self) -> i32 {
        MPI_SUCCESS
    }

    /// Ask the whole group to terminate. May block while the request
    /// propagates; may return if the transport could not deliver it, in
    /// which case the caller terminates locally.
    fn abort(&self, errorcode: i32);
}

pub type CommHandle = Arc<dyn Communicator>;

/// Rank of `comm`, or -1 for the null communicator.
#[inline]
pub fn rank_of(comm: Option<&CommHandle>) -> i32 {
    comm.map_or(-1, |c| c.rank())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i32);

    impl Communicator for Fixed {
        fn rank(&self) -> i32 {
            self.0
        }

        fn abort(&self, _errorcode: i32) {}
    }

    #[test]
    fn test_rank_of_null_is_negative() {
        assert_eq!(rank_of(None), -1);
    }

    #[test]
    fn test_rank_of_comm() {
        let comm: CommHandle = Arc::new(Fixed(3));
        assert_eq!(rank_of(Some(&comm)), 3);
        assert_eq!(comm.size(), 1);
        assert_eq!(comm.barrier(), MPI_SUCCESS);
    }
}
