//! Executable memory for running compiled code in-process.

use std::io;
use std::ptr::NonNull;

/// A page-aligned, read-only and executable copy of machine code.
pub struct ExecutableBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl ExecutableBuffer {
    /// Map `code` into fresh memory and flip it to read+execute.
    pub fn new(code: &[u8]) -> io::Result<Self> {
        let len = code.len().max(1);
        // SAFETY: anonymous private mapping, no existing memory is affected.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(raw.cast::<u8>()).ok_or_else(io::Error::last_os_error)?;
        let buffer = Self { ptr, len };

        // SAFETY: the mapping is at least `len >= code.len()` bytes and writable.
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), buffer.ptr.as_ptr(), code.len());
            if libc::mprotect(raw, len, libc::PROT_READ | libc::PROT_EXEC) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(buffer)
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reinterpret the start of the buffer as a function pointer of type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C" fn` type matching the compiled signature,
    /// with the instance context pointer first.
    pub unsafe fn entry<F: Copy>(&self) -> F {
        debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<*const u8>());
        let ptr = self.as_ptr();
        std::mem::transmute_copy::<*const u8, F>(&ptr)
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr/len describe the mapping created in `new`.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

// The mapping is immutable after construction.
unsafe impl Send for ExecutableBuffer {}
unsafe impl Sync for ExecutableBuffer {}

#[cfg(all(test, target_arch = "x86_64"))]
mod tests {
    use super::*;

    #[test]
    fn test_run_constant_function() {
        // mov eax, 42; ret
        let buffer = ExecutableBuffer::new(&[0xb8, 0x2a, 0x00, 0x00, 0x00, 0xc3]).unwrap();
        assert_eq!(buffer.len(), 6);
        let f: extern "C" fn() -> i32 = unsafe { buffer.entry() };
        assert_eq!(f(), 42);
    }
}
