//! Hex dump of the code and data regions.

use std::io::{self, Write};

use crate::Assembler;

const BYTES_PER_ROW: usize = 16;

impl Assembler {
    /// Write a 16-byte-per-row hex dump of the instruction stream, then of
    /// the staged data. No decoding, just bytes.
    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "INSTRUCTIONS: {}/{} bytes",
            self.code().len_bytes(),
            self.code().capacity()
        )?;
        writeln!(out, "{}", "-".repeat(57))?;
        hex_rows(out, self.code().bytes())?;

        writeln!(
            out,
            "\nSTATIC DATA: {}/{} bytes",
            self.data().len(),
            self.data().capacity()
        )?;
        writeln!(out, "{}", "-".repeat(57))?;
        hex_rows(out, self.data().bytes())
    }
}

fn hex_rows<W: Write>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    for (row, chunk) in bytes.chunks(BYTES_PER_ROW).enumerate() {
        write!(out, "{:08x}: ", row * BYTES_PER_ROW)?;
        for byte in chunk {
            write!(out, "{:02x} ", byte)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::aarch64::X;
    use crate::errors::Result;

    #[test]
    fn dump_covers_both_regions() -> Result<()> {
        let mut asm = Assembler::new()?;
        asm.stage_string("hi")?;
        asm.load_int(X(0), 42)?;
        asm.ret()?;

        let mut out = Vec::new();
        asm.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("INSTRUCTIONS: 8/4096 bytes"));
        assert!(text.contains("STATIC DATA: 8/1048576 bytes"));
        // movz x0, #42 then ret, little endian.
        assert!(text.contains("00000000: 40 05 80 d2 c0 03 5f d6 "));
        // "hi" plus its terminator and padding.
        assert!(text.contains("00000000: 68 69 00 00 00 00 00 00 "));
        Ok(())
    }
}
