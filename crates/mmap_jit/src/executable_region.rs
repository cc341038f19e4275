use crate::error::Result;
use crate::MappedRegion;
use crate::WritableRegion;

/// An executable region of memory. Use [as_function!](crate::as_function) to run code from here!
pub struct ExecutableRegion {
    region: MappedRegion,
}

impl ExecutableRegion {
    /// Consumes the [MappedRegion] and marks its memory as read-only and executable.
    pub fn from(region: MappedRegion) -> Result<Self> {
        #[cfg(target_os = "macos")]
        region.protect(libc::PROT_READ | libc::PROT_EXEC)?;

        Ok(Self { region })
    }

    /// Returns the address of the mapped memory.
    ///
    /// Use [as_function!](crate::as_function) to call this region of memory like a function.
    pub fn addr(&self) -> *const u8 {
        self.region.addr()
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Back to writable, for another round of emission.
    pub fn into_writable(self) -> Result<WritableRegion> {
        WritableRegion::from(self.region)
    }
}
