//! Variable-length string storage.

use bitvec::prelude::*;

use crate::{Result, StorageError};

/// Append-only string heap: all values concatenated in one buffer, the end
/// offset of every value, and a bitmap of nil rows. Nil rows occupy no bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrHeap {
    bytes: String,
    ends: Vec<usize>,
    nils: BitVec<u64, Lsb0>,
}

impl StrHeap {
    /// Create an empty heap sized for `rows` values.
    pub fn with_capacity(rows: usize) -> Result<Self> {
        let mut heap = Self::default();
        heap.ends
            .try_reserve_exact(rows)
            .map_err(|_| StorageError::OutOfMemory { bytes: rows * std::mem::size_of::<usize>() })?;
        Ok(heap)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    /// Whether the heap holds no rows.
    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// Value at `pos`, `None` for a nil row. Panics when out of range.
    pub fn get(&self, pos: usize) -> Option<&str> {
        if self.nils[pos] {
            return None;
        }
        let start = if pos == 0 { 0 } else { self.ends[pos - 1] };
        Some(&self.bytes[start..self.ends[pos]])
    }

    /// Append a value or nil, returning whether the offset table had to grow.
    pub fn push(&mut self, v: Option<&str>) -> Result<bool> {
        let v_len = v.map_or(0, str::len);
        self.bytes
            .try_reserve(v_len)
            .map_err(|_| StorageError::OutOfMemory { bytes: self.bytes.len() + v_len })?;
        let grew = self.ends.len() == self.ends.capacity();
        if grew {
            let extra = self.ends.len().max(8);
            self.ends
                .try_reserve(extra)
                .map_err(|_| StorageError::OutOfMemory { bytes: extra * std::mem::size_of::<usize>() })?;
        }
        if let Some(v) = v {
            self.bytes.push_str(v);
        }
        self.ends.push(self.bytes.len());
        self.nils.push(v.is_none());
        Ok(grew)
    }

    /// Whether any row is nil.
    pub fn has_nil(&self) -> bool {
        self.nils.any()
    }

    /// Iterate over all rows in order.
    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        (0..self.len()).map(move |pos| self.get(pos))
    }

    /// Total bytes of string data.
    pub fn heap_size(&self) -> usize {
        self.bytes.len()
    }
}
