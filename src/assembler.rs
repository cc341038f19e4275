//! High-level emission over the encoder and both buffers.

use std::ffi::CStr;

use crate::asm::aarch64::{self as a64, Cond, FP, LR, S, SP, W, X};
use crate::code::CodeBuffer;
use crate::data::DataBuffer;
use crate::errors::{JitError, Result};
use crate::exec::{self, JitValue, ReturnType};
use crate::labels::{BranchKind, Fixup, Label, LabelTable};

/// BL reaches ±128 MiB: a signed 26-bit word count.
const BL_RANGE_WORDS: i64 = 1 << 25;

/// ADRP reaches ±4 GiB: a signed 21-bit page count.
const ADRP_RANGE_PAGES: i64 = 1 << 20;

/// Scratch register for materializing float bit patterns, as the low word W0.
const SCRATCH: X = X(0);

/// Owns the instruction stream, the staged data, and the label table; emits
/// encoded instructions and runs the result.
///
/// Single-owner, single-thread. Emission keeps the code region writable; only
/// [execute](Assembler::execute) flips it executable, and flips it back.
pub struct Assembler {
    code: CodeBuffer,
    data: DataBuffer,
    labels: LabelTable,
}

impl Assembler {
    pub fn new() -> Result<Self> {
        Ok(Assembler {
            code: CodeBuffer::new()?,
            data: DataBuffer::new()?,
            labels: LabelTable::new(),
        })
    }

    /// Append one already-encoded instruction word.
    pub fn emit(&mut self, word: u32) -> Result<()> {
        self.code.push(word)
    }

    // Constants //////////////////////////////////////////////////////////////////////////////////

    /// Materialize a 32-bit constant: MOVZ of the low halfword, plus MOVK of
    /// the high halfword when it is nonzero. The value lands zero-extended,
    /// so negative values keep their 32-bit bit pattern in the low word.
    pub fn load_int(&mut self, reg: X, value: i32) -> Result<()> {
        let bits = value as u32;
        self.emit(a64::movz(reg, bits as u16))?;
        if bits >> 16 != 0 {
            self.emit(a64::movk(reg, (bits >> 16) as u16, 16))?;
        }
        Ok(())
    }

    /// Materialize a float: its bit pattern through W0, then FMOV into `reg`.
    /// Clobbers X0.
    pub fn load_float(&mut self, reg: S, value: f32) -> Result<()> {
        let bits = value.to_bits();
        self.emit(a64::movz(SCRATCH, bits as u16))?;
        self.emit(a64::movk(SCRATCH, (bits >> 16) as u16, 16))?;
        self.emit(a64::fmov(reg, W(SCRATCH.0)))
    }

    // Staged data ////////////////////////////////////////////////////////////////////////////////

    /// Stage a NUL-terminated string in the data region; returns its offset.
    pub fn stage_string(&mut self, s: &str) -> Result<usize> {
        self.data.stage_str(s)
    }

    /// Stage raw bytes (8-byte aligned, zero padded); returns their offset.
    pub fn stage_bytes(&mut self, bytes: &[u8]) -> Result<usize> {
        self.data.stage_bytes(bytes)
    }

    /// Read back a staged string.
    pub fn get_string(&self, offset: usize) -> Option<&CStr> {
        self.data.c_str_at(offset)
    }

    /// Put the absolute address of staged offset `offset` into `reg`, as an
    /// ADRP page plus an ADD intra-page offset (omitted when zero).
    ///
    /// The address is the data region's *current* base. If the data region
    /// grows after this sequence is emitted, the emitted address is stale.
    pub fn load_data_addr(&mut self, reg: X, offset: usize) -> Result<()> {
        // No append below may move the code base once the PC is taken.
        self.code.ensure_headroom()?;

        let addr = self.data.address_of(offset) as u64;
        let page = addr & !0xFFF;
        let page_offset = addr & 0xFFF;

        let pc = self.code.address_at(self.code.offset())? as u64;
        let page_dist = page as i64 - (pc & !0xFFF) as i64;
        if !(-ADRP_RANGE_PAGES..ADRP_RANGE_PAGES).contains(&(page_dist >> 12)) {
            return Err(JitError::BranchOutOfRange {
                displacement: page_dist,
                limit: "ADRP ±4 GiB",
            });
        }

        self.emit(a64::adrp(reg, page_dist))?;
        if page_offset != 0 {
            self.emit(a64::add_imm(reg, reg, page_offset as u16))?;
        }
        Ok(())
    }

    // Comparison and float arithmetic ////////////////////////////////////////////////////////////

    /// Compare two registers, setting the NZCV flags for [jump_if](Assembler::jump_if).
    pub fn compare(&mut self, a: X, b: X) -> Result<()> {
        self.emit(a64::cmp(a, b))
    }

    pub fn float_add(&mut self, rd: S, rn: S, rm: S) -> Result<()> {
        self.emit(a64::fadd(rd, rn, rm))
    }

    pub fn float_sub(&mut self, rd: S, rn: S, rm: S) -> Result<()> {
        self.emit(a64::fsub(rd, rn, rm))
    }

    pub fn float_mul(&mut self, rd: S, rn: S, rm: S) -> Result<()> {
        self.emit(a64::fmul(rd, rn, rm))
    }

    pub fn float_div(&mut self, rd: S, rn: S, rm: S) -> Result<()> {
        self.emit(a64::fdiv(rd, rn, rm))
    }

    pub fn float_compare(&mut self, rn: S, rm: S) -> Result<()> {
        self.emit(a64::fcmp(rn, rm))
    }

    pub fn int_to_float(&mut self, rd: S, rn: W) -> Result<()> {
        self.emit(a64::scvtf(rd, rn))
    }

    pub fn float_to_int(&mut self, rd: W, rn: S) -> Result<()> {
        self.emit(a64::fcvtzs(rd, rn))
    }

    // Labels and branches ////////////////////////////////////////////////////////////////////////

    pub fn create_label(&mut self) -> Label {
        self.labels.create()
    }

    /// Bind `label` to the current offset and patch every branch emitted
    /// against it while it was unbound.
    pub fn bind_label(&mut self, label: Label) -> Result<()> {
        let target = self.code.offset();
        self.labels.bind(label, target);

        for fixup in self.labels.take_fixups(label) {
            let displacement = target as i32 - fixup.site as i32;
            let word = self.code.word_at(fixup.site)?;
            self.code
                .patch(fixup.site, word | fixup.kind.displacement_bits(displacement))?;
        }
        Ok(())
    }

    pub fn jump(&mut self, label: Label) -> Result<()> {
        let displacement = self.branch_displacement(label, BranchKind::Unconditional);
        self.emit(a64::b(displacement))
    }

    pub fn jump_if(&mut self, cond: Cond, label: Label) -> Result<()> {
        let displacement = self.branch_displacement(label, BranchKind::Conditional);
        self.emit(a64::b_cond(displacement, cond))
    }

    pub fn jump_if_equal(&mut self, label: Label) -> Result<()> {
        self.jump_if(Cond::Eq, label)
    }

    pub fn jump_if_not_equal(&mut self, label: Label) -> Result<()> {
        self.jump_if(Cond::Ne, label)
    }

    pub fn jump_if_less(&mut self, label: Label) -> Result<()> {
        self.jump_if(Cond::Lt, label)
    }

    pub fn jump_if_greater(&mut self, label: Label) -> Result<()> {
        self.jump_if(Cond::Gt, label)
    }

    /// Displacement in words from the branch about to be emitted to `label`,
    /// or 0 plus a fixup record if the label is still unbound.
    fn branch_displacement(&mut self, label: Label, kind: BranchKind) -> i32 {
        let site = self.code.offset();
        match self.labels.offset_of(label) {
            Some(target) => target as i32 - site as i32,
            None => {
                self.labels.push_fixup(Fixup { site, kind, label });
                0
            }
        }
    }

    // Procedure calls ////////////////////////////////////////////////////////////////////////////

    /// Call a procedure in the host process: save the frame pair with
    /// writeback, BL, restore with writeback. Arguments and the return value
    /// follow AAPCS64 and are the caller's business.
    pub fn call_host(&mut self, target: *const ()) -> Result<()> {
        self.code.ensure_headroom()?;
        self.emit(a64::stp_preindex(FP, LR, SP, -16))?;
        let displacement = self.bl_displacement(target)?;
        self.emit(a64::bl(displacement))?;
        self.emit(a64::ldp_postindex(FP, LR, SP, 16))
    }

    /// Call a resolved external procedure: carve 16 bytes of stack, save the
    /// frame pair without writeback, BL, restore, release the stack.
    pub fn call_external(&mut self, target: *const ()) -> Result<()> {
        self.code.ensure_headroom()?;
        self.emit(a64::sub_imm(SP, SP, 16))?;
        self.emit(a64::stp_offset(FP, LR, SP, 0))?;
        let displacement = self.bl_displacement(target)?;
        self.emit(a64::bl(displacement))?;
        self.emit(a64::ldp_offset(FP, LR, SP, 0))?;
        self.emit(a64::add_imm(SP, SP, 16))
    }

    /// Word displacement from the BL about to be emitted to `target`.
    fn bl_displacement(&mut self, target: *const ()) -> Result<i32> {
        let pc = self.code.address_at(self.code.offset())? as i64;
        let displacement = target as i64 - pc;
        let words = displacement / 4;
        if !(-BL_RANGE_WORDS..BL_RANGE_WORDS).contains(&words) {
            return Err(JitError::BranchOutOfRange {
                displacement,
                limit: "BL ±128 MiB",
            });
        }
        Ok(words as i32)
    }

    // Frames /////////////////////////////////////////////////////////////////////////////////////

    /// Standard prologue: push the frame pair, point x29 at the new frame.
    pub fn begin_frame(&mut self) -> Result<()> {
        self.emit(a64::stp_preindex(FP, LR, SP, -16))?;
        self.emit(a64::add_imm(FP, SP, 0))
    }

    /// Standard epilogue: pop the frame pair and return.
    pub fn end_frame(&mut self) -> Result<()> {
        self.emit(a64::ldp_postindex(FP, LR, SP, 16))?;
        self.emit(a64::ret())
    }

    pub fn ret(&mut self) -> Result<()> {
        self.emit(a64::ret())
    }

    // Lifecycle and execution ////////////////////////////////////////////////////////////////////

    /// Zero the instruction stream and forget all labels. Staged data and
    /// both capacities are kept.
    pub fn reset(&mut self) -> Result<()> {
        self.code.reset()?;
        self.labels.clear();
        Ok(())
    }

    /// Invoke the stream as a procedure returning `return_type`.
    pub fn execute(&mut self, return_type: ReturnType) -> Result<JitValue> {
        exec::execute(&mut self.code, return_type)
    }

    pub fn execute_int(&mut self) -> Result<i32> {
        match self.execute(ReturnType::Int)? {
            JitValue::Int(v) => Ok(v),
            _ => unreachable!("int invocation produced a non-int value"),
        }
    }

    pub fn execute_float(&mut self) -> Result<f32> {
        match self.execute(ReturnType::Float)? {
            JitValue::Float(v) => Ok(v),
            _ => unreachable!("float invocation produced a non-float value"),
        }
    }

    pub fn execute_double(&mut self) -> Result<f64> {
        match self.execute(ReturnType::Double)? {
            JitValue::Double(v) => Ok(v),
            _ => unreachable!("double invocation produced a non-double value"),
        }
    }

    pub(crate) fn code(&self) -> &CodeBuffer {
        &self.code
    }

    pub(crate) fn data(&self) -> &DataBuffer {
        &self.data
    }
}
