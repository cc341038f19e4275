//! In-memory code generator for AArch64.
//!
//! Build a stream of machine instructions at runtime, bind labels for
//! control flow, stage read-only data next to the code, call native
//! procedures (from the host or from shared objects), then run the stream
//! as a procedure returning an int, float, or double.
//!
//! The instruction stream and the staged data live in two page-mapped
//! regions. The code region is writable the whole time you emit and only
//! becomes executable for the duration of one invocation; on Apple silicon
//! that is a real W^X flip, elsewhere the mapping is RWX from the start.
//!
//! # Examples
//!
//! ```no_run
//! use armjit::asm::aarch64::X;
//! use armjit::Assembler;
//!
//! # fn main() -> armjit::Result<()> {
//! let mut jit = Assembler::new()?;
//! jit.load_int(X(0), 42)?;
//! jit.ret()?;
//! assert_eq!(42, jit.execute_int()?);
//! # Ok(())
//! # }
//! ```

pub mod asm;

mod assembler;
mod code;
mod data;
mod dump;
mod errors;
mod exec;
mod external;
mod labels;

pub use crate::asm::aarch64::{Cond, S, W, X};
pub use crate::assembler::Assembler;
pub use crate::errors::{JitError, Result};
pub use crate::exec::{JitValue, ReturnType};
pub use crate::external::ExternalLibrary;
pub use crate::labels::Label;
