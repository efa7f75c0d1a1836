//! Scratch buffer reused by string kernels across one invocation.

use crate::error::{KernelError, KernelResult};

/// Growth granularity in bytes.
pub const SCRATCH_ALIGN: usize = 1024;
/// Initial scratch size for kernels producing arbitrary strings.
pub const STR_SCRATCH: usize = 1024;
/// Initial scratch size for kernels producing a single code point.
pub const CHAR_SCRATCH: usize = 8;

/// Growable scratch region owned by the dispatch layer.
///
/// Kernels `clear` it, reserve the size of the value they are about to write
/// with [`ScratchBuffer::ensure_capacity`] and append. Growth discards the
/// previous content. [`ScratchBuffer::as_str`] only ever exposes the current
/// write.
#[derive(Debug, Default)]
pub struct ScratchBuffer {
    buf: String,
    capacity: usize,
    grows: usize,
}

fn align_up(n: usize) -> Option<usize> {
    n.checked_add(SCRATCH_ALIGN - 1).map(|n| n & !(SCRATCH_ALIGN - 1))
}

impl ScratchBuffer {
    /// Allocate `capacity` bytes up front; 0 allocates nothing.
    pub fn with_capacity(capacity: usize) -> KernelResult<Self> {
        let mut buf = String::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| KernelError::OutOfMemory { bytes: capacity })?;
        Ok(Self { buf, capacity, grows: 0 })
    }

    /// Make room for `required` bytes. Growing rounds up to a multiple of
    /// [`SCRATCH_ALIGN`] and drops the current content.
    pub fn ensure_capacity(&mut self, required: usize) -> KernelResult<()> {
        if required <= self.capacity {
            return Ok(());
        }
        let size = align_up(required).ok_or(KernelError::OutOfMemory { bytes: required })?;
        let mut fresh = String::new();
        fresh
            .try_reserve_exact(size)
            .map_err(|_| KernelError::OutOfMemory { bytes: size })?;
        self.buf = fresh;
        self.capacity = size;
        self.grows += 1;
        Ok(())
    }

    /// Reset the write position.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a string slice within the reserved capacity.
    pub fn push_str(&mut self, s: &str) -> KernelResult<()> {
        self.fits(s.len())?;
        self.buf.push_str(s);
        Ok(())
    }

    /// Append one character within the reserved capacity.
    pub fn push_char(&mut self, c: char) -> KernelResult<()> {
        self.fits(c.len_utf8())?;
        self.buf.push(c);
        Ok(())
    }

    #[inline]
    fn fits(&self, bytes: usize) -> KernelResult<()> {
        let needed = self.buf.len() + bytes;
        if needed > self.capacity {
            return Err(KernelError::Unreserved { needed, capacity: self.capacity });
        }
        Ok(())
    }

    /// Replace the content with `s`.
    pub fn set(&mut self, s: &str) -> KernelResult<()> {
        self.clear();
        self.ensure_capacity(s.len())?;
        self.push_str(s)
    }

    /// The current write.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Current capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of reallocations so far.
    pub fn grow_count(&self) -> usize {
        self.grows
    }
}
