use std::fmt;

use errno::Errno;

pub type Result<T> = std::result::Result<T, MappingError>;

/// The kernel refused an `mmap` or `mprotect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingError(pub Errno);

impl From<Errno> for MappingError {
    fn from(e: Errno) -> Self {
        MappingError(e)
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MappingError {}
