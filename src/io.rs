/*
 * io.rs
 *
 * Allocation-free writes to stderr via libc::write.
 *
 * The abort path uses this and nothing else for its output: it runs from
 * signal handlers, after malloc has failed, and while the process-wide
 * runtime may be locked. std's Stderr takes a reentrant lock and may
 * allocate on first use, so it is out.
 */

use core::fmt::{self, Write};

const STDERR: i32 = 2;

/// Write all of `s` to stderr, retrying short writes and EINTR.
/// Errors are dropped: there is nowhere left to report them.
pub fn write_stderr(mut s: &[u8]) {
    while !s.is_empty() {
        // SAFETY: s is a valid byte slice for s.len() bytes, STDERR is always open
        // (or the call fails with EBADF, which we ignore). write() is async-signal-safe.
        let n = unsafe { libc::write(STDERR, s.as_ptr().cast(), s.len()) };
        if n < 0 {
            if std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return;
        }
        if n == 0 {
            return;
        }
        #[allow(clippy::cast_sign_loss)]
        let written = n as usize;
        s = &s[written.min(s.len())..];
    }
}

/// Write a string to stderr
#[inline]
pub fn eprint_str(s: &str) {
    write_stderr(s.as_bytes());
}

/// A writer that outputs to stderr via direct syscall.
/// Implements core::fmt::Write for use with write!/writeln!; formatting
/// through it never touches the heap.
pub struct StderrWriter;

impl Write for StderrWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_stderr(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_stderr() {
        /* just verify it doesn't crash */
        write_stderr(b"test stderr write\n");
        write_stderr(b"");
    }

    #[test]
    fn test_writer_fmt() {
        let mut w = StderrWriter;
        let _ = writeln!(w, "formatted: {} + {} = {}", 1, 2, 3);
    }
}
