//! Reusable receive and transmit buffer.
//!
//! Worker loops keep one [`MemChunk`] per direction for the lifetime of a connection
//! so that steady-state traffic does not allocate per message.

use crate::error::AnsResult;

/// Growable byte buffer whose capacity never shrinks while in use.
#[derive(Debug, Default)]
pub struct MemChunk {
    memory: Vec<u8>,
}

impl MemChunk {
    pub fn new() -> MemChunk {
        MemChunk::default()
    }

    /// First allocation of `size` zeroed bytes. A size of zero leaves the chunk empty.
    pub fn allocate(&mut self, size: usize) -> AnsResult<()> {
        self.memory = Vec::new();
        self.reallocate(size)
    }

    /// Grows the chunk to at least `size` bytes, keeping its contents.
    ///
    /// Requests that fit in the current capacity succeed without touching memory.
    pub fn reallocate(&mut self, size: usize) -> AnsResult<()> {
        if size <= self.memory.len() {
            return Ok(());
        }
        self.memory.try_reserve_exact(size - self.memory.len())?;
        self.memory.resize(size, 0);
        Ok(())
    }

    /// Releases the memory and returns to the zero state.
    pub fn free(&mut self) {
        self.memory = Vec::new();
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.memory
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.memory
    }
}

#[cfg(test)]
mod test {
    use super::MemChunk;

    #[test]
    fn zero_allocation_is_empty() {
        let mut chunk = MemChunk::new();
        chunk.allocate(0).unwrap();
        assert!(chunk.is_empty());
        assert_eq!(chunk.capacity(), 0);
    }

    #[test]
    fn reallocate_never_shrinks() {
        let mut chunk = MemChunk::new();
        chunk.allocate(16).unwrap();
        chunk.reallocate(128).unwrap();
        chunk.reallocate(32).unwrap();
        assert_eq!(chunk.capacity(), 128);
    }

    #[test]
    fn reallocate_keeps_contents() {
        let mut chunk = MemChunk::new();
        chunk.allocate(4).unwrap();
        chunk.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        chunk.reallocate(8).unwrap();
        assert_eq!(chunk.as_slice(), &[1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn free_resets_state() {
        let mut chunk = MemChunk::new();
        chunk.allocate(64).unwrap();
        chunk.free();
        assert_eq!(chunk.capacity(), 0);
        chunk.reallocate(8).unwrap();
        assert_eq!(chunk.capacity(), 8);
    }

    #[test]
    fn impossible_allocation_is_reported() {
        let mut chunk = MemChunk::new();
        assert!(chunk.allocate(usize::MAX).is_err());
        assert!(chunk.is_empty());
    }
}
