//! Everything that can go wrong while building or running a stream.

use thiserror::Error;

use mmap_jit::MappingError;

pub type Result<T> = std::result::Result<T, JitError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitError {
    /// A region could not be mapped while constructing or growing a buffer.
    #[error("memory allocation failed: {0}")]
    Allocation(#[from] MappingError),

    /// The W^X transition around an invocation failed.
    #[error("protection transition failed: {0}")]
    Protection(MappingError),

    #[error("could not load library: {0}")]
    LibraryOpen(String),

    #[error("could not resolve symbol: {0}")]
    SymbolLookup(String),

    /// A library already holds its maximum of 32 resolved procedures.
    #[error("external function table is full")]
    ExternalTableFull,

    /// A displacement does not fit the instruction's signed immediate field.
    #[error("displacement of {displacement} bytes exceeds the {limit} range")]
    BranchOutOfRange {
        displacement: i64,
        limit: &'static str,
    },

    /// The data region could not grow; the attempted bytes were not committed.
    #[error("could not stage data: {0}")]
    DataStage(MappingError),

    /// The code region was lost to a failed protection transition.
    #[error("code buffer is unusable after a failed protection transition")]
    InvalidState,
}
