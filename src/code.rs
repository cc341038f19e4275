//! The instruction stream: a page-mapped, growable buffer of 32-bit words.

use log::debug;
use mmap_jit::WritableRegion;

use crate::errors::{JitError, Result};

/// Initial capacity of the instruction region, in bytes.
const INITIAL_CAPACITY: usize = 4096;

/// An append must leave this many words free, or the buffer grows first.
const GROWTH_GUARD_WORDS: usize = 16;

/// Holds emitted instructions. Writable the whole time the stream is being
/// built; executable only inside [CodeBuffer::run].
pub struct CodeBuffer {
    /// `None` only after a protection transition failed mid-[run](CodeBuffer::run).
    region: Option<WritableRegion>,
    len_words: usize,
}

impl CodeBuffer {
    pub fn new() -> Result<Self> {
        Ok(CodeBuffer {
            region: Some(WritableRegion::allocate_jit(INITIAL_CAPACITY)?),
            len_words: 0,
        })
    }

    /// Current word index; the next [push](CodeBuffer::push) lands here.
    pub fn offset(&self) -> usize {
        self.len_words
    }

    pub fn len_bytes(&self) -> usize {
        self.len_words * 4
    }

    pub fn capacity(&self) -> usize {
        self.region.as_ref().map(WritableRegion::len).unwrap_or(0)
    }

    /// Absolute address of the given word index.
    ///
    /// Growth may move the base, so an address taken before an append is
    /// stale once the buffer grows.
    pub fn address_at(&self, word: usize) -> Result<*const u8> {
        let region = self.region.as_ref().ok_or(JitError::InvalidState)?;
        Ok((region.addr() as usize + word * 4) as *const u8)
    }

    /// Append one instruction word.
    pub fn push(&mut self, word: u32) -> Result<()> {
        self.ensure_headroom()?;
        let at = self.len_words * 4;
        let region = self.region.as_mut().ok_or(JitError::InvalidState)?;
        region[at..at + 4].copy_from_slice(&word.to_le_bytes());
        self.len_words += 1;
        Ok(())
    }

    pub fn word_at(&self, word: usize) -> Result<u32> {
        let region = self.region.as_ref().ok_or(JitError::InvalidState)?;
        let at = word * 4;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&region[at..at + 4]);
        Ok(u32::from_le_bytes(bytes))
    }

    /// Overwrite an already-emitted word (label fixups).
    pub fn patch(&mut self, word: usize, value: u32) -> Result<()> {
        let region = self.region.as_mut().ok_or(JitError::InvalidState)?;
        let at = word * 4;
        region[at..at + 4].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Zero the occupied prefix and rewind; capacity and base are kept.
    pub fn reset(&mut self) -> Result<()> {
        let len = self.len_words * 4;
        let region = self.region.as_mut().ok_or(JitError::InvalidState)?;
        region[..len].fill(0);
        self.len_words = 0;
        Ok(())
    }

    /// The occupied prefix, for diagnostics. Empty if the buffer is poisoned.
    pub fn bytes(&self) -> &[u8] {
        match &self.region {
            Some(region) => &region[..self.len_words * 4],
            None => &[],
        }
    }

    /// Run `f` with the region executable, then make it writable again.
    ///
    /// This is the only point where protection changes: RW→RX before `f`,
    /// RX→RW after. If either transition fails the buffer is poisoned and
    /// every later operation reports [JitError::InvalidState].
    pub fn run<T>(&mut self, f: impl FnOnce(*const u8) -> T) -> Result<T> {
        let region = self.region.take().ok_or(JitError::InvalidState)?;
        let code = region.into_executable().map_err(JitError::Protection)?;
        let result = f(code.addr());
        self.region = Some(code.into_writable().map_err(JitError::Protection)?);
        Ok(result)
    }

    /// Guarantee room for at least [GROWTH_GUARD_WORDS] more words, doubling
    /// the mapping if needed. Emission sequences that pre-compute their own
    /// PC (calls, ADRP pairs) call this first so no append inside the
    /// sequence can move the base.
    pub fn ensure_headroom(&mut self) -> Result<()> {
        let region = self.region.as_ref().ok_or(JitError::InvalidState)?;
        let capacity_words = region.len() / 4;
        if self.len_words + GROWTH_GUARD_WORDS < capacity_words {
            return Ok(());
        }

        let new_capacity = region.len() * 2;
        let mut grown = WritableRegion::allocate_jit(new_capacity)?;
        let used = self.len_words * 4;
        grown[..used].copy_from_slice(&region[..used]);
        debug!(
            "code buffer grown from {} to {} bytes",
            region.len(),
            new_capacity
        );
        self.region = Some(grown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_advances_offset() -> Result<()> {
        let mut code = CodeBuffer::new()?;
        assert_eq!(0, code.offset());
        code.push(0xD2800540)?;
        code.push(0xD65F03C0)?;
        assert_eq!(2, code.offset());
        assert_eq!(8, code.len_bytes());
        assert_eq!(0xD2800540, code.word_at(0)?);
        assert_eq!(0xD65F03C0, code.word_at(1)?);
        Ok(())
    }

    #[test]
    fn words_are_stored_little_endian() -> Result<()> {
        let mut code = CodeBuffer::new()?;
        code.push(0xD65F03C0)?;
        assert_eq!(&[0xC0, 0x03, 0x5F, 0xD6], code.bytes());
        Ok(())
    }

    #[test]
    fn growth_preserves_the_stream() -> Result<()> {
        let mut code = CodeBuffer::new()?;
        // Far past the initial 4096-byte capacity.
        for i in 0..3000u32 {
            code.push(i)?;
        }
        assert!(code.capacity() > INITIAL_CAPACITY);
        assert_eq!(3000, code.offset());
        for i in 0..3000u32 {
            assert_eq!(i, code.word_at(i as usize)?);
        }
        Ok(())
    }

    #[test]
    fn addresses_are_word_spaced() -> Result<()> {
        let mut code = CodeBuffer::new()?;
        code.push(0)?;
        code.push(0)?;
        let base = code.address_at(0)? as usize;
        assert_eq!(base + 4, code.address_at(1)? as usize);
        Ok(())
    }

    #[test]
    fn reset_rewinds_and_zeroes() -> Result<()> {
        let mut code = CodeBuffer::new()?;
        code.push(0xFFFFFFFF)?;
        code.push(0xFFFFFFFF)?;
        let capacity = code.capacity();

        code.reset()?;
        assert_eq!(0, code.offset());
        assert_eq!(capacity, code.capacity());
        assert_eq!(0, code.word_at(0)?);
        assert_eq!(0, code.word_at(1)?);
        Ok(())
    }

    #[test]
    fn patch_rewrites_one_word() -> Result<()> {
        let mut code = CodeBuffer::new()?;
        code.push(0x14000000)?;
        code.push(0xD65F03C0)?;
        code.patch(0, 0x14000002)?;
        assert_eq!(0x14000002, code.word_at(0)?);
        assert_eq!(0xD65F03C0, code.word_at(1)?);
        Ok(())
    }
}
