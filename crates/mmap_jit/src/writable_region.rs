use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;

use crate::error::Result;
use crate::ExecutableRegion;
use crate::MappedRegion;

/// A region you can write bytes into, but not yet run.
pub struct WritableRegion {
    region: MappedRegion,
}

impl WritableRegion {
    /// Allocate a fresh plain region, ready for writing, never executable.
    pub fn allocate(len: usize) -> Result<Self> {
        Self::from(MappedRegion::allocate(len)?)
    }

    /// Allocate a fresh region that [into_executable](WritableRegion::into_executable)
    /// can actually make runnable.
    pub fn allocate_jit(len: usize) -> Result<Self> {
        Self::from(MappedRegion::allocate_jit(len)?)
    }

    pub fn from(region: MappedRegion) -> Result<Self> {
        #[cfg(target_os = "macos")]
        region.protect(libc::PROT_READ | libc::PROT_WRITE)?;

        Ok(Self { region })
    }

    /// Consumes the region and returns an executable region. That means you can run it!
    pub fn into_executable(self) -> Result<ExecutableRegion> {
        ExecutableRegion::from(self.region)
    }

    pub fn addr(&self) -> *const u8 {
        self.region.addr()
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }
}

impl<I> Index<I> for WritableRegion
where
    I: SliceIndex<[u8]>,
{
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        unsafe {
            &std::slice::from_raw_parts(self.region.addr(), self.region.len())[index]
        }
    }
}

impl<I> IndexMut<I> for WritableRegion
where
    I: SliceIndex<[u8]>,
{
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        unsafe {
            &mut std::slice::from_raw_parts_mut(self.region.addr_mut(), self.region.len())[index]
        }
    }
}
