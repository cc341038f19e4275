//! Map some memory for writing and executing.
//!
//! This crate is a wrapper around `mmap(2)`, `mprotect(2)`, and `munmap(2)` calls that uses Rust's
//! type system to enforce what you can and can't do with a dynamically mapped region of memory.
//! The intent is to allocate memory in order to inject machine code into the running executable
//! and run it, as many times as you like, with the region writable between runs.
//!
//! Code lives in a mapping made by [WritableRegion::allocate_jit]: on Apple silicon that is a
//! `MAP_JIT` mapping and each conversion below is an `mprotect` call, so the region is never
//! writable and executable at once; on other POSIX targets the mapping is RWX from the start and
//! the conversions are free. Plain [WritableRegion::allocate] mappings are read-write everywhere
//! and can never become executable.
//!
//! # Examples
//!
//! Here is the general workflow:
//!
//! ```no_run
//! use mmap_jit::{as_function, WritableRegion};
//!
//! # fn main() -> mmap_jit::Result<()> {
//! // Allocate some amount of memory that may hold code.
//! let mut mem = WritableRegion::allocate_jit(4096)?;
//!
//! // Write a complete procedure to your memory!
//! mem[0] = 0xC3;
//!
//! // Make it executable.
//! let code = mem.into_executable()?;
//!
//! // Congrats, now you have a function!
//! let f = unsafe { as_function!(code.addr(), unsafe extern "C" fn() -> u64) };
//! let _ = unsafe { f() };
//!
//! // ...and you can go back and overwrite it.
//! let mut mem = code.into_writable()?;
//! mem[0] = 0x00;
//! # Ok(())
//! # }
//! ```

mod error;
mod executable_region;
mod mapped_region;
mod writable_region;

pub use crate::executable_region::ExecutableRegion;
pub use crate::mapped_region::MappedRegion;
pub use crate::writable_region::WritableRegion;

pub use crate::error::{MappingError, Result};

/// Cast an entry-point address (say, from [ExecutableRegion::addr]) to a function pointer of your
/// choosing.
///
/// # Safety
///
/// This is incredibly `unsafe`! You are responsible for writing a program that obeys the target
/// platform's ABI and additionally, does not invalidate any of Rust's assumptions about the state
/// of memory. The power is in your hands.
#[macro_export]
macro_rules! as_function {
    ($addr: expr, $fn_type: ty) => {
        std::mem::transmute::<*const u8, $fn_type>($addr)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    const MAPPING_SIZE: usize = 4096;

    /// A procedure equivalent to `fn() -> u64 { 42 }` for the host architecture.
    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    fn write_return_42(buffer: &mut [u8]) {
        let instructions: &[u8] = if cfg!(target_arch = "x86_64") {
            // mov eax, 42; ret
            &[0xB8, 0x2A, 0x00, 0x00, 0x00, 0xC3]
        } else if cfg!(target_arch = "aarch64") {
            // movz x0, #42; ret
            &[0x40, 0x05, 0x80, 0xD2, 0xC0, 0x03, 0x5F, 0xD6]
        } else {
            panic!("no program for arch")
        };

        buffer[..instructions.len()].copy_from_slice(instructions);
    }

    #[test]
    fn mapping_gives_a_valid_address() -> Result<()> {
        let region = MappedRegion::allocate(MAPPING_SIZE)?;
        assert_eq!(MAPPING_SIZE, region.len());
        assert_ne!(region.addr(), ptr::null());
        Ok(())
    }

    #[test]
    fn can_write_to_writable_mapping() -> Result<()> {
        let mut p = WritableRegion::allocate(MAPPING_SIZE)?;
        p[0] = 42;
        assert_eq!(42, p[0]);
        Ok(())
    }

    #[test]
    fn address_survives_conversions() -> Result<()> {
        let region = MappedRegion::allocate_jit(MAPPING_SIZE)?;
        let initial_addr = region.addr();

        let p = WritableRegion::from(region)?;
        let exec = p.into_executable()?;
        assert_eq!(initial_addr, exec.addr());

        let p = exec.into_writable()?;
        assert_eq!(initial_addr, p.addr());
        Ok(())
    }

    #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))]
    #[test]
    fn executes_code_and_comes_back_writable() -> Result<()> {
        let mut p = WritableRegion::allocate_jit(MAPPING_SIZE)?;
        write_return_42(&mut p[..]);

        let exec = p.into_executable()?;
        let f = unsafe { as_function!(exec.addr(), unsafe extern "C" fn() -> u64) };
        assert_eq!(42, unsafe { f() });

        // The same page is writable again afterwards.
        let mut p = exec.into_writable()?;
        p[0] = 0;
        assert_eq!(0, p[0]);
        Ok(())
    }

    #[test]
    fn should_error_if_mapping_entire_address_space() {
        use errno::Errno;

        match MappedRegion::allocate(usize::MAX) {
            Ok(_) => {
                panic!("that should not have worked...");
            }
            Err(MappingError(Errno(c))) => {
                assert!(c > 0, "expected an error value, such as EINVAL");
            }
        }
    }
}
