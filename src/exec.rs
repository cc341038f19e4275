//! Invoke the assembled stream as a native procedure.
//!
//! The stream's first word is the entry point. Invocation follows AAPCS64
//! for a parameterless procedure: the integer result is read from X0, the
//! float result from S0, the double result from D0. A fault inside emitted
//! code is not caught; it takes the process down the usual way.

use mmap_jit::as_function;

use crate::code::CodeBuffer;
use crate::errors::Result;

/// The scalar type one invocation returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Int,
    Float,
    Double,
}

/// A value read back from the canonical return register. The variant always
/// matches the [ReturnType] the invocation requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JitValue {
    Int(i32),
    Float(f32),
    Double(f64),
}

impl JitValue {
    pub fn int(self) -> Option<i32> {
        match self {
            JitValue::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn float(self) -> Option<f32> {
        match self {
            JitValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn double(self) -> Option<f64> {
        match self {
            JitValue::Double(v) => Some(v),
            _ => None,
        }
    }
}

type IntFn = unsafe extern "C" fn() -> i32;
type FloatFn = unsafe extern "C" fn() -> f32;
type DoubleFn = unsafe extern "C" fn() -> f64;

/// Make the code region executable, call it, and make it writable again.
pub(crate) fn execute(code: &mut CodeBuffer, return_type: ReturnType) -> Result<JitValue> {
    code.run(|entry| match return_type {
        ReturnType::Int => {
            let f = unsafe { as_function!(entry, IntFn) };
            JitValue::Int(unsafe { f() })
        }
        ReturnType::Float => {
            let f = unsafe { as_function!(entry, FloatFn) };
            JitValue::Float(unsafe { f() })
        }
        ReturnType::Double => {
            let f = unsafe { as_function!(entry, DoubleFn) };
            JitValue::Double(unsafe { f() })
        }
    })
}
