//! Word-level access to a tracee's address space
//!
//! Breakpoints and the frame-pointer walk only need to read and write single
//! words, so they are written against [`TraceeMemory`] rather than a live
//! process. Byte ranges and C strings are built on the same two word
//! operations.

use super::error::TraceResult;

/// Size of a machine word in bytes
pub const WORD_SIZE: u64 = 8;

/// Little-endian word access to another address space
pub trait TraceeMemory {
    fn read_word(&self, address: u64) -> TraceResult<u64>;
    fn write_word(&mut self, address: u64, value: u64) -> TraceResult<()>;

    /// Read `len` bytes one word at a time
    fn read_bytes(&self, address: u64, len: usize) -> TraceResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(len + WORD_SIZE as usize);
        let mut offset = 0;
        while bytes.len() < len {
            let word = self.read_word(address.wrapping_add(offset))?;
            bytes.extend_from_slice(&word.to_le_bytes());
            offset += WORD_SIZE;
        }
        bytes.truncate(len);
        Ok(bytes)
    }

    /// Write `data` one word at a time; a trailing partial word keeps the
    /// tracee's remaining bytes
    fn write_bytes(&mut self, address: u64, data: &[u8]) -> TraceResult<()> {
        for (i, chunk) in data.chunks(WORD_SIZE as usize).enumerate() {
            let at = address.wrapping_add(i as u64 * WORD_SIZE);
            let mut word = [0u8; WORD_SIZE as usize];
            if chunk.len() < word.len() {
                word = self.read_word(at)?.to_le_bytes();
            }
            word[..chunk.len()].copy_from_slice(chunk);
            self.write_word(at, u64::from_le_bytes(word))?;
        }
        Ok(())
    }

    /// Read a NUL-terminated string; the terminator is not included
    fn read_cstring(&self, address: u64) -> TraceResult<String> {
        let mut bytes = Vec::new();
        let mut at = address;
        loop {
            for byte in self.read_word(at)?.to_le_bytes() {
                if byte == 0 {
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                bytes.push(byte);
            }
            at = at.wrapping_add(WORD_SIZE);
        }
    }
}
