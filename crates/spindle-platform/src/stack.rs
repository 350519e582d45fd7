//! Guard-paged fiber stacks
//!
//! Each stack is a dedicated anonymous mapping with one `PROT_NONE` page at
//! the low address, so running off the end of a fiber stack faults instead
//! of silently corrupting a neighbour.

use std::io;
use std::ptr;

#[cfg(target_os = "linux")]
const MAP_STACK: libc::c_int = libc::MAP_STACK;
#[cfg(not(target_os = "linux"))]
const MAP_STACK: libc::c_int = 0;

/// An `mmap`-backed execution stack for a fiber.
///
/// The usable region starts one page above the raw mapping; the lowest page
/// is the guard. The mapping is released when the stack is dropped, which the
/// scheduler only does at shutdown.
pub struct FiberStack {
    raw: *mut u8,
    raw_size: usize,
    page_size: usize,
}

// The stack is plain memory; the engine guarantees at most one thread runs
// on it at a time.
unsafe impl Send for FiberStack {}
unsafe impl Sync for FiberStack {}

impl FiberStack {
    /// Allocate a stack with at least `size` usable bytes.
    ///
    /// The requested size is rounded up to whole pages and one extra guard
    /// page is added below the usable region.
    pub fn new(size: usize) -> io::Result<Self> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;

        let mut pages = size / page_size;
        if size % page_size != 0 {
            pages += 1;
        }
        // guard page
        pages += 1;
        let raw_size = pages * page_size;

        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                raw_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | MAP_STACK,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        if unsafe { libc::mprotect(raw, page_size, libc::PROT_NONE) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::munmap(raw, raw_size) };
            return Err(err);
        }

        Ok(Self {
            raw: raw as *mut u8,
            raw_size,
            page_size,
        })
    }

    /// Lowest usable address, just above the guard page.
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.raw.add(self.page_size) }
    }

    /// Usable size in bytes (guard page excluded).
    pub fn size(&self) -> usize {
        self.raw_size - self.page_size
    }
}

impl Drop for FiberStack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.raw as *mut libc::c_void, self.raw_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_rounds_up_to_pages() {
        let stack = FiberStack::new(1000).unwrap();
        assert!(stack.size() >= 1000);
        assert_eq!(stack.size() % 4096, 0);
    }

    #[test]
    fn test_stack_usable_region_is_writable() {
        let stack = FiberStack::new(16 * 1024).unwrap();
        let bottom = stack.bottom();
        unsafe {
            bottom.write(0xAA);
            bottom.add(stack.size() - 1).write(0xBB);
            assert_eq!(bottom.read(), 0xAA);
            assert_eq!(bottom.add(stack.size() - 1).read(), 0xBB);
        }
    }

    #[test]
    fn test_stack_guard_sits_below_usable_region() {
        let stack = FiberStack::new(16 * 1024).unwrap();
        assert!(stack.bottom() as usize > stack.raw as usize);
        assert_eq!(stack.bottom() as usize - stack.raw as usize, stack.page_size);
    }
}
