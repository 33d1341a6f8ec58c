/*
 * allocator.rs
 *
 * Accounting allocator on top of libc malloc/calloc/realloc/free.
 *
 * Every block carries a 16-byte header in front of the pointer we hand out:
 * the requested size and a cookie. The size lets realloc and release account
 * without being told the old size; the cookie lets debug builds catch frees
 * of pointers that never came from here. 16 bytes keeps the payload at
 * malloc's own alignment.
 *
 * Nothing here ever returns null. Failure goes to the abort path, which
 * writes straight to fd 2 and so still works when the heap is exhausted.
 */

use core::ptr::NonNull;

use crate::error::{Result, ScError};
use crate::package::{Balance, PackageId};
use crate::priority::{Category, Priority};
use crate::runtime::Runtime;

const HEADER: usize = 16;
/* "SC_BLOCK" */
const COOKIE: u64 = 0x5343_5f42_4c4f_434b;

#[repr(C)]
struct Header {
    size: u64,
    cookie: u64,
}

const _: () = assert!(core::mem::size_of::<Header>() == HEADER);

/* block sizes are capped at isize::MAX, so this never saturates in practice */
fn signed(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn total_size(size: usize) -> Option<usize> {
    size.checked_add(HEADER).filter(|&t| t <= isize::MAX as usize)
}

/// # Safety
/// `base` must point to at least HEADER writable bytes from malloc.
unsafe fn write_header(base: NonNull<u8>, size: usize) -> NonNull<u8> {
    // SAFETY: caller guarantees HEADER writable bytes at base; malloc
    // alignment covers Header's alignment of 8.
    unsafe {
        base.cast::<Header>().write(Header {
            size: size as u64,
            cookie: COOKIE,
        });
    }
    // SAFETY: base + HEADER is within (or one past) the same allocation.
    unsafe { base.add(HEADER) }
}

/// # Safety
/// `ptr` must have been returned by this module and not yet freed.
unsafe fn header_of(ptr: NonNull<u8>) -> NonNull<Header> {
    // SAFETY: every payload pointer sits HEADER bytes past its base.
    unsafe { ptr.sub(HEADER).cast() }
}

fn alloc_block(size: usize, zeroed: bool) -> Option<NonNull<u8>> {
    let total = total_size(size)?;
    // SAFETY: malloc/calloc accept any size and return null on failure.
    let base = unsafe {
        if zeroed {
            libc::calloc(1, total)
        } else {
            libc::malloc(total)
        }
    };
    let base = NonNull::new(base.cast::<u8>())?;
    // SAFETY: base is a fresh allocation of total >= HEADER bytes.
    Some(unsafe { write_header(base, size) })
}

/// # Safety
/// `ptr` must be a live block from this module.
unsafe fn realloc_block(ptr: NonNull<u8>, size: usize) -> Option<NonNull<u8>> {
    let total = total_size(size)?;
    // SAFETY: caller guarantees ptr is live, so its header is the malloc base.
    let base = unsafe { header_of(ptr) };
    // SAFETY: base came from malloc/calloc/realloc and has not been freed.
    let grown = unsafe { libc::realloc(base.as_ptr().cast(), total) };
    let grown = NonNull::new(grown.cast::<u8>())?;
    // SAFETY: grown is a live allocation of total >= HEADER bytes.
    Some(unsafe { write_header(grown, size) })
}

/// # Safety
/// `ptr` must be a live block from this module.
unsafe fn free_block(ptr: NonNull<u8>) {
    // SAFETY: caller guarantees ptr is live; clearing the cookie makes a
    // double free detectable in debug builds until the memory is reused.
    #[allow(clippy::multiple_unsafe_ops_per_block)]
    unsafe {
        let header = header_of(ptr);
        (*header.as_ptr()).cookie = 0;
        libc::free(header.as_ptr().cast());
    }
}

/// Requested size of a live block.
///
/// # Safety
/// `ptr` must be a live block from this allocator.
pub unsafe fn block_size(ptr: NonNull<u8>) -> usize {
    // SAFETY: caller guarantees the header in front of ptr is readable.
    #[allow(clippy::multiple_unsafe_ops_per_block)]
    let size = unsafe { header_of(ptr).as_ref().size };
    /* stored from a usize, so it fits */
    #[allow(clippy::cast_possible_truncation)]
    let size = size as usize;
    size
}

/// Whether the header in front of `ptr` carries our cookie.
///
/// # Safety
/// The HEADER bytes in front of `ptr` must be readable.
pub unsafe fn is_tracked(ptr: NonNull<u8>) -> bool {
    // SAFETY: caller guarantees the header bytes are readable.
    unsafe { header_of(ptr).as_ref().cookie == COOKIE }
}

impl Runtime {
    /// Allocate `size` bytes under `package`. Zero is fine; failure is fatal.
    #[track_caller]
    pub fn allocate(&mut self, package: PackageId, size: usize) -> NonNull<u8> {
        match self.try_allocate(package, size) {
            Ok(block) => block,
            Err(e) => self.fatal(format_args!("{e}")),
        }
    }

    /// Allocate `n * size` zeroed bytes. Overflow of the product is fatal.
    #[track_caller]
    pub fn allocate_zeroed(&mut self, package: PackageId, n: usize, size: usize) -> NonNull<u8> {
        match self.try_allocate_zeroed(package, n, size) {
            Ok(block) => block,
            Err(e) => self.fatal(format_args!("{e}")),
        }
    }

    /// Resize a block. `None` allocates. The object count is unchanged and
    /// the byte balance moves by the size difference.
    ///
    /// # Safety
    /// `ptr`, if given, must be a live block from this allocator. It is
    /// invalid after the call.
    #[track_caller]
    pub unsafe fn reallocate(
        &mut self,
        package: PackageId,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> NonNull<u8> {
        // SAFETY: forwarded from the caller.
        match unsafe { self.try_reallocate(package, ptr, size) } {
            Ok(block) => block,
            Err(e) => self.fatal(format_args!("{e}")),
        }
    }

    /// Copy `s` into a fresh NUL-terminated block.
    #[track_caller]
    pub fn duplicate_string(&mut self, package: PackageId, s: &str) -> NonNull<u8> {
        match self.try_duplicate_string(package, s) {
            Ok(block) => block,
            Err(e) => self.fatal(format_args!("{e}")),
        }
    }

    /// Release a block. `None` is a no-op.
    ///
    /// # Safety
    /// `ptr`, if given, must be a live block from this allocator.
    #[track_caller]
    pub unsafe fn release(&mut self, package: PackageId, ptr: Option<NonNull<u8>>) {
        // SAFETY: forwarded from the caller.
        if let Err(e) = unsafe { self.try_release(package, ptr) } {
            self.fatal(format_args!("{e}"));
        }
    }

    /// Report a nonzero balance; fatal in debug builds.
    #[track_caller]
    pub fn memory_check(&mut self, package: PackageId) {
        if let Err(e) = self.try_memory_check(package) {
            self.fatal(format_args!("{e}"));
        }
    }

    pub fn balance(&self, package: PackageId) -> Balance {
        self.registry.balance(package)
    }

    pub(crate) fn try_allocate(&mut self, package: PackageId, size: usize) -> Result<NonNull<u8>> {
        let block = alloc_block(size, false).ok_or(ScError::AllocationFailed(size))?;
        self.account(package, signed(size), 1);
        Ok(block)
    }

    pub(crate) fn try_allocate_zeroed(
        &mut self,
        package: PackageId,
        n: usize,
        size: usize,
    ) -> Result<NonNull<u8>> {
        let bytes = n
            .checked_mul(size)
            .ok_or(ScError::AllocationOverflow(n, size))?;
        let block = alloc_block(bytes, true).ok_or(ScError::AllocationFailed(bytes))?;
        self.account(package, signed(bytes), 1);
        Ok(block)
    }

    /// # Safety
    /// Same contract as `reallocate`.
    pub(crate) unsafe fn try_reallocate(
        &mut self,
        package: PackageId,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<NonNull<u8>> {
        let Some(ptr) = ptr else {
            return self.try_allocate(package, size);
        };
        // SAFETY: forwarded from the caller.
        unsafe { check_tracked(ptr)? };
        // SAFETY: forwarded from the caller.
        let old = unsafe { block_size(ptr) };
        // SAFETY: forwarded from the caller.
        let block = unsafe { realloc_block(ptr, size) }.ok_or(ScError::AllocationFailed(size))?;
        self.account(package, signed(size) - signed(old), 0);
        Ok(block)
    }

    pub(crate) fn try_duplicate_string(
        &mut self,
        package: PackageId,
        s: &str,
    ) -> Result<NonNull<u8>> {
        let block = self.try_allocate(package, s.len() + 1)?;
        // SAFETY: block has s.len() + 1 writable bytes and cannot overlap s.
        #[allow(clippy::multiple_unsafe_ops_per_block)]
        unsafe {
            core::ptr::copy_nonoverlapping(s.as_ptr(), block.as_ptr(), s.len());
            block.add(s.len()).write(0);
        }
        Ok(block)
    }

    /// # Safety
    /// Same contract as `release`.
    pub(crate) unsafe fn try_release(
        &mut self,
        package: PackageId,
        ptr: Option<NonNull<u8>>,
    ) -> Result<()> {
        let Some(ptr) = ptr else {
            return Ok(());
        };
        // SAFETY: forwarded from the caller.
        unsafe { check_tracked(ptr)? };
        // SAFETY: forwarded from the caller.
        let size = unsafe { block_size(ptr) };
        // SAFETY: forwarded from the caller.
        unsafe { free_block(ptr) };
        self.account(package, -signed(size), -1);
        Ok(())
    }

    pub(crate) fn try_memory_check(&mut self, package: PackageId) -> Result<()> {
        if !self.check_balance(package) && cfg!(debug_assertions) {
            return Err(ScError::Unbalanced(package));
        }
        Ok(())
    }

    /// Log the outstanding counters of `package` if they are not zero.
    /// Returns whether the balance was clean.
    pub(crate) fn check_balance(&mut self, package: PackageId) -> bool {
        let balance = self.registry.balance(package);
        if balance.is_zero() {
            return true;
        }
        let name = self
            .registry
            .get(package)
            .map_or("anonymous", |p| p.name())
            .to_owned();
        self.log(
            file!(),
            line!(),
            PackageId::SC,
            Category::Global,
            Priority::Production,
            format_args!(
                "Memory balance ({name}): {} objects, {} bytes outstanding",
                balance.objects, balance.bytes
            ),
        );
        false
    }

    fn account(&mut self, package: PackageId, bytes: i64, objects: i64) {
        let balance = self.registry.balance_mut(package);
        balance.bytes += bytes;
        balance.objects += objects;
    }
}

/// Debug builds only: reject pointers whose header lacks our cookie.
///
/// # Safety
/// The HEADER bytes in front of `ptr` must be readable.
unsafe fn check_tracked(ptr: NonNull<u8>) -> Result<()> {
    // SAFETY: forwarded from the caller.
    if cfg!(debug_assertions) && !unsafe { is_tracked(ptr) } {
        return Err(ScError::UntrackedPointer(ptr.as_ptr().addr()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::priority::LogThreshold;

    fn quiet() -> Runtime {
        let mut rt = Runtime::new();
        rt.set_log_defaults(
            Some(crate::log::LogStream::Writer(Box::new(std::io::sink()))),
            None,
            LogThreshold::Default,
        );
        rt
    }

    #[test]
    fn test_allocate_release_balances() {
        let mut rt = quiet();
        let pkg = rt.register(None, LogThreshold::Default, "alloc", "allocator test");

        let a = rt.allocate(pkg, 100);
        let b = rt.allocate(pkg, 28);
        assert_eq!(
            rt.balance(pkg),
            Balance {
                bytes: 128,
                objects: 2
            }
        );

        // SAFETY: both blocks are live and come from rt.
        unsafe {
            rt.release(pkg, Some(a));
            rt.release(pkg, Some(b));
        }
        assert!(rt.balance(pkg).is_zero());
    }

    #[test]
    fn test_zero_size_is_valid() {
        let mut rt = quiet();
        let p = rt.allocate(PackageId::NONE, 0);
        // SAFETY: p is live.
        assert_eq!(unsafe { block_size(p) }, 0);
        assert_eq!(rt.balance(PackageId::NONE).objects, 1);
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
        assert!(rt.balance(PackageId::NONE).is_zero());
    }

    #[test]
    fn test_zeroed_memory() {
        let mut rt = quiet();
        let p = rt.allocate_zeroed(PackageId::NONE, 16, 4);
        // SAFETY: p has 64 initialized (zeroed) bytes.
        let bytes = unsafe { core::slice::from_raw_parts(p.as_ptr(), 64) };
        assert!(bytes.iter().all(|&b| b == 0));
        assert_eq!(rt.balance(PackageId::NONE).bytes, 64);
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
    }

    #[test]
    fn test_reallocate_keeps_content_and_count() {
        let mut rt = quiet();
        let p = rt.duplicate_string(PackageId::NONE, "abc");
        // SAFETY: p is live and holds 4 bytes.
        let q = unsafe { rt.reallocate(PackageId::NONE, Some(p), 64) };
        // SAFETY: q holds at least the 4 copied bytes.
        let head = unsafe { core::slice::from_raw_parts(q.as_ptr(), 4) };
        assert_eq!(head, b"abc\0");
        assert_eq!(
            rt.balance(PackageId::NONE),
            Balance {
                bytes: 64,
                objects: 1
            }
        );

        // SAFETY: q is live.
        let r = unsafe { rt.reallocate(PackageId::NONE, Some(q), 8) };
        assert_eq!(rt.balance(PackageId::NONE).bytes, 8);
        // SAFETY: r is live.
        unsafe { rt.release(PackageId::NONE, Some(r)) };
        assert!(rt.balance(PackageId::NONE).is_zero());
    }

    #[test]
    fn test_reallocate_none_allocates() {
        let mut rt = quiet();
        // SAFETY: no pointer is passed.
        let p = unsafe { rt.reallocate(PackageId::NONE, None, 10) };
        assert_eq!(rt.balance(PackageId::NONE).objects, 1);
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
    }

    #[test]
    fn test_duplicate_string_is_nul_terminated() {
        let mut rt = quiet();
        let p = rt.duplicate_string(PackageId::NONE, "hello");
        // SAFETY: p holds "hello\0".
        let s = unsafe { core::ffi::CStr::from_ptr(p.as_ptr().cast()) };
        assert_eq!(s.to_str(), Ok("hello"));
        assert_eq!(rt.balance(PackageId::NONE).bytes, 6);
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
    }

    #[test]
    fn test_release_none_is_noop() {
        let mut rt = quiet();
        // SAFETY: no pointer is passed.
        unsafe { rt.release(PackageId::NONE, None) };
        assert!(rt.balance(PackageId::NONE).is_zero());
    }

    #[test]
    fn test_blocks_are_tracked() {
        let mut rt = quiet();
        let p = rt.allocate(PackageId::NONE, 3);
        // SAFETY: p is live.
        assert!(unsafe { is_tracked(p) });
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
    }

    #[test]
    fn test_unregistered_package_counts_as_anonymous() {
        let mut rt = quiet();
        let p = rt.allocate(PackageId::from_raw(12), 5);
        assert_eq!(rt.balance(PackageId::NONE).bytes, 5);
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
        assert!(rt.balance(PackageId::NONE).is_zero());
    }

    #[test]
    fn test_overflowing_product_is_an_error() {
        let mut rt = quiet();
        assert_eq!(
            rt.try_allocate_zeroed(PackageId::NONE, usize::MAX, 2),
            Err(ScError::AllocationOverflow(usize::MAX, 2))
        );
        assert!(rt.balance(PackageId::NONE).is_zero());
    }

    #[test]
    fn test_memory_check_error_follows_build_profile() {
        let mut rt = quiet();
        let p = rt.allocate(PackageId::NONE, 4);
        let checked = rt.try_memory_check(PackageId::NONE);
        if cfg!(debug_assertions) {
            assert_eq!(checked, Err(ScError::Unbalanced(PackageId::NONE)));
        } else {
            assert_eq!(checked, Ok(()));
        }
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
        assert_eq!(rt.try_memory_check(PackageId::NONE), Ok(()));
    }

    #[test]
    fn test_check_balance_reports_leak() {
        let mut rt = quiet();
        let p = rt.allocate(PackageId::NONE, 1);
        assert!(!rt.check_balance(PackageId::NONE));
        // SAFETY: p is live.
        unsafe { rt.release(PackageId::NONE, Some(p)) };
        assert!(rt.check_balance(PackageId::NONE));
    }
}
