use libc::size_t;
use std::ops::{Drop, Index};
use std::ptr;

use crate::error::Result;

/// An anonymous, private, page-aligned mapping, released on drop.
///
/// [allocate](MappedRegion::allocate) gives plain read-write memory.
/// [allocate_jit](MappedRegion::allocate_jit) gives memory that can hold
/// code: on Apple silicon it is created read-write with `MAP_JIT` and
/// [WritableRegion](crate::WritableRegion) / [ExecutableRegion](crate::ExecutableRegion)
/// flip it between RW and RX with `mprotect`; on other POSIX targets it is
/// created read-write-execute once and the conversions never touch
/// protection.
pub struct MappedRegion {
    addr: *mut u8,
    len: size_t,
}

impl MappedRegion {
    /// A plain read-write mapping. It can never become executable; use
    /// [allocate_jit](MappedRegion::allocate_jit) for code.
    pub fn allocate(len: usize) -> Result<Self> {
        use libc::{PROT_READ, PROT_WRITE};

        Self::mmap(len, PROT_READ | PROT_WRITE, 0)
    }

    /// A mapping destined to hold code: read-write plus `MAP_JIT` on Apple
    /// silicon (protection flips per use), read-write-execute everywhere else
    /// (no flips needed).
    pub fn allocate_jit(len: usize) -> Result<Self> {
        use libc::{PROT_READ, PROT_WRITE};

        #[cfg(target_os = "macos")]
        return Self::mmap(len, PROT_READ | PROT_WRITE, libc::MAP_JIT);
        #[cfg(not(target_os = "macos"))]
        return Self::mmap(len, PROT_READ | PROT_WRITE | libc::PROT_EXEC, 0);
    }

    fn mmap(len: usize, prot: libc::c_int, extra_flags: libc::c_int) -> Result<Self> {
        use libc::{MAP_ANON, MAP_PRIVATE};

        let flags = MAP_PRIVATE | MAP_ANON | extra_flags;
        let memory = unsafe { libc::mmap(ptr::null_mut(), len, prot, flags, -1, 0) };
        if memory == libc::MAP_FAILED {
            return Err(errno::errno().into());
        }

        Ok(MappedRegion {
            addr: memory as *mut u8,
            len,
        })
    }

    pub fn addr(&self) -> *const u8 {
        self.addr
    }

    pub fn addr_mut(&self) -> *mut u8 {
        self.addr
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `mprotect` the whole region. Only Apple targets ever need this.
    #[cfg(target_os = "macos")]
    pub(crate) fn protect(&self, prot: libc::c_int) -> Result<()> {
        let rc = unsafe { libc::mprotect(self.addr as *mut libc::c_void, self.len, prot) };
        if rc < 0 {
            return Err(errno::errno().into());
        }
        Ok(())
    }
}

impl<I> Index<I> for MappedRegion
where
    I: std::slice::SliceIndex<[u8]>,
{
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        unsafe { &std::slice::from_raw_parts(self.addr as *const u8, self.len)[index] }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr as *mut libc::c_void, self.len);
        }
        self.addr = ptr::null_mut();
        self.len = 0;
    }
}
