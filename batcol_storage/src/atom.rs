//! Atom types and their nil representation.

use crate::column::{ColumnData, LogicalType};
use crate::heap::StrHeap;
use crate::{Oid, Result, StorageError};

/// Nil sentinel for 32-bit integers.
pub const INT_NIL: i32 = i32::MIN;
/// Nil sentinel for bits.
pub const BIT_NIL: i8 = i8::MIN;
/// Nil sentinel for oids.
pub const OID_NIL: Oid = 1 << 63;

/// A scalar type that can be stored in a column.
///
/// `Values` is a cheap borrowed view over a column's storage, fetched once per
/// invocation so that per-row access is a plain index. Fixed-width atoms
/// reserve one value as nil; strings track nil rows outside the value domain,
/// so every valid string is data.
pub trait Atom: PartialEq + 'static {
    /// Logical type tag.
    const TYPE: LogicalType;

    /// Borrowed view over a column of this atom.
    type Values<'c>: Copy;

    /// Whether `v` is the in-band nil sentinel. Always false for strings.
    fn is_nil(v: &Self) -> bool;

    /// Typed view over `data`, `None` when the representation differs.
    fn values(data: &ColumnData) -> Option<Self::Values<'_>>;

    /// Value at `pos` (0-based), `None` for a nil row.
    fn get<'c>(values: Self::Values<'c>, pos: usize) -> Option<&'c Self>;

    /// Append `v`, `None` appending nil. Returns whether the storage had to grow.
    fn push(data: &mut ColumnData, v: Option<&Self>) -> Result<bool>;
}

fn push_vec<T: Copy>(vec: &mut Vec<T>, v: T) -> Result<bool> {
    let grew = vec.len() == vec.capacity();
    if grew {
        vec.try_reserve(vec.len().max(1)).map_err(|_| StorageError::OutOfMemory {
            bytes: vec.len().max(1) * std::mem::size_of::<T>(),
        })?;
    }
    vec.push(v);
    Ok(grew)
}

fn mismatch(expected: LogicalType, data: &ColumnData) -> StorageError {
    StorageError::TypeMismatch { expected, found: data.logical_type() }
}

impl Atom for str {
    const TYPE: LogicalType = LogicalType::Str;
    type Values<'c> = &'c StrHeap;

    fn is_nil(_: &str) -> bool {
        false
    }

    fn values(data: &ColumnData) -> Option<Self::Values<'_>> {
        match data {
            ColumnData::Str(heap) => Some(heap),
            _ => None,
        }
    }

    fn get<'c>(values: Self::Values<'c>, pos: usize) -> Option<&'c Self> {
        values.get(pos)
    }

    fn push(data: &mut ColumnData, v: Option<&str>) -> Result<bool> {
        match data {
            ColumnData::Str(heap) => heap.push(v),
            other => Err(mismatch(LogicalType::Str, other)),
        }
    }
}

impl Atom for i32 {
    const TYPE: LogicalType = LogicalType::Int;
    type Values<'c> = &'c [i32];

    fn is_nil(v: &Self) -> bool {
        *v == INT_NIL
    }

    fn values(data: &ColumnData) -> Option<Self::Values<'_>> {
        match data {
            ColumnData::Int(v) => Some(v),
            _ => None,
        }
    }

    fn get<'c>(values: Self::Values<'c>, pos: usize) -> Option<&'c Self> {
        let v = &values[pos];
        (!Self::is_nil(v)).then_some(v)
    }

    fn push(data: &mut ColumnData, v: Option<&i32>) -> Result<bool> {
        match data {
            ColumnData::Int(vec) => push_vec(vec, v.map_or(INT_NIL, |v| *v)),
            other => Err(mismatch(LogicalType::Int, other)),
        }
    }
}

impl Atom for i8 {
    const TYPE: LogicalType = LogicalType::Bit;
    type Values<'c> = &'c [i8];

    fn is_nil(v: &Self) -> bool {
        *v == BIT_NIL
    }

    fn values(data: &ColumnData) -> Option<Self::Values<'_>> {
        match data {
            ColumnData::Bit(v) => Some(v),
            _ => None,
        }
    }

    fn get<'c>(values: Self::Values<'c>, pos: usize) -> Option<&'c Self> {
        let v = &values[pos];
        (!Self::is_nil(v)).then_some(v)
    }

    fn push(data: &mut ColumnData, v: Option<&i8>) -> Result<bool> {
        match data {
            ColumnData::Bit(vec) => push_vec(vec, v.map_or(BIT_NIL, |v| *v)),
            other => Err(mismatch(LogicalType::Bit, other)),
        }
    }
}

impl Atom for u64 {
    const TYPE: LogicalType = LogicalType::Oid;
    type Values<'c> = &'c [Oid];

    fn is_nil(v: &Self) -> bool {
        *v == OID_NIL
    }

    fn values(data: &ColumnData) -> Option<Self::Values<'_>> {
        match data {
            ColumnData::Oid(v) => Some(v),
            _ => None,
        }
    }

    fn get<'c>(values: Self::Values<'c>, pos: usize) -> Option<&'c Self> {
        let v = &values[pos];
        (!Self::is_nil(v)).then_some(v)
    }

    fn push(data: &mut ColumnData, v: Option<&Oid>) -> Result<bool> {
        match data {
            ColumnData::Oid(vec) => push_vec(vec, v.map_or(OID_NIL, |v| *v)),
            other => Err(mismatch(LogicalType::Oid, other)),
        }
    }
}
