//! Column representation and derived properties.

use std::fmt;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::atom::{Atom, BIT_NIL, INT_NIL};
use crate::heap::StrHeap;
use crate::{Oid, Result, StorageError};

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    /// Row identifiers (includes dense and mask candidate lists).
    Oid,
    /// Booleans stored as `i8` with a nil sentinel.
    Bit,
    /// 32-bit signed integers.
    Int,
    /// UTF-8 strings.
    Str,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalType::Oid => "oid",
            LogicalType::Bit => "bit",
            LogicalType::Int => "int",
            LogicalType::Str => "str",
        };
        f.write_str(name)
    }
}

/// Whether a column outlives the invocation that created it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    /// Scratch result, dropped when its last reference is released.
    #[default]
    Transient,
    /// Backed by the storage engine.
    Persistent,
}

/// Derived column properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnProps {
    /// At least one value is nil.
    pub nil: bool,
    /// Guaranteed to contain no nil.
    pub nonil: bool,
    /// Values are pairwise distinct.
    pub key: bool,
    /// Ascending order.
    pub sorted: bool,
    /// Descending order.
    pub revsorted: bool,
}

impl ColumnProps {
    /// Properties of a strictly ascending candidate list of `count` rows.
    pub fn candidates(count: usize) -> Self {
        Self { nil: false, nonil: true, key: true, sorted: true, revsorted: count <= 1 }
    }

    /// Properties that hold trivially for any column of `count` rows.
    pub fn trivial(count: usize, nil: bool) -> Self {
        let trivial = count <= 1;
        Self { nil, nonil: !nil, key: trivial, sorted: trivial, revsorted: trivial }
    }
}

/// Physical column storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Virtual dense oid range `[seqbase, seqbase + count)`.
    Void {
        /// First oid.
        seqbase: Oid,
        /// Number of oids.
        count: usize,
    },
    /// Materialised oids.
    Oid(Vec<Oid>),
    /// Bit `i` set means oid `first + i` is present.
    Mask {
        /// Oid of bit 0.
        first: Oid,
        /// Membership bits.
        bits: BitVec<u64, Lsb0>,
    },
    /// Bits.
    Bit(Vec<i8>),
    /// Integers.
    Int(Vec<i32>),
    /// Strings.
    Str(StrHeap),
}

impl ColumnData {
    /// Logical type of this storage.
    pub fn logical_type(&self) -> LogicalType {
        match self {
            ColumnData::Void { .. } | ColumnData::Oid(_) | ColumnData::Mask { .. } => LogicalType::Oid,
            ColumnData::Bit(_) => LogicalType::Bit,
            ColumnData::Int(_) => LogicalType::Int,
            ColumnData::Str(_) => LogicalType::Str,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Void { count, .. } => *count,
            ColumnData::Oid(v) => v.len(),
            ColumnData::Mask { bits, .. } => bits.count_ones(),
            ColumnData::Bit(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Str(h) => h.len(),
        }
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_nil(&self) -> bool {
        match self {
            ColumnData::Bit(v) => v.contains(&BIT_NIL),
            ColumnData::Int(v) => v.contains(&INT_NIL),
            ColumnData::Str(h) => h.has_nil(),
            _ => false,
        }
    }
}

/// An ordered, densely indexed sequence of values of one logical type.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    hseqbase: Oid,
    data: ColumnData,
    props: ColumnProps,
    persistence: Persistence,
}

impl Column {
    /// Wrap existing storage, deriving nil and trivial order properties.
    pub fn new(hseqbase: Oid, data: ColumnData) -> Self {
        let props = ColumnProps::trivial(data.len(), data.has_nil());
        Self { hseqbase, data, props, persistence: Persistence::Transient }
    }

    /// Empty column of `ty` with room for `capacity` rows.
    pub fn with_capacity(ty: LogicalType, hseqbase: Oid, capacity: usize) -> Result<Self> {
        fn reserve<T>(capacity: usize) -> Result<Vec<T>> {
            let mut v = Vec::new();
            v.try_reserve_exact(capacity)
                .map_err(|_| StorageError::OutOfMemory { bytes: capacity * std::mem::size_of::<T>() })?;
            Ok(v)
        }
        let data = match ty {
            LogicalType::Oid => ColumnData::Oid(reserve(capacity)?),
            LogicalType::Bit => ColumnData::Bit(reserve(capacity)?),
            LogicalType::Int => ColumnData::Int(reserve(capacity)?),
            LogicalType::Str => ColumnData::Str(StrHeap::with_capacity(capacity)?),
        };
        Ok(Self::new(hseqbase, data))
    }

    /// String column, `None` entries become nil.
    pub fn from_strs<'a, I>(hseqbase: Oid, values: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut heap = StrHeap::default();
        for v in values {
            heap.push(v)?;
        }
        Ok(Self::new(hseqbase, ColumnData::Str(heap)))
    }

    /// Integer column, `None` entries become nil.
    pub fn from_ints<I>(hseqbase: Oid, values: I) -> Self
    where
        I: IntoIterator<Item = Option<i32>>,
    {
        let values = values.into_iter().map(|v| v.unwrap_or(INT_NIL)).collect();
        Self::new(hseqbase, ColumnData::Int(values))
    }

    /// Bit column, `None` entries become nil.
    pub fn from_bits<I>(hseqbase: Oid, values: I) -> Self
    where
        I: IntoIterator<Item = Option<bool>>,
    {
        let values = values.into_iter().map(|v| v.map_or(BIT_NIL, i8::from)).collect();
        Self::new(hseqbase, ColumnData::Bit(values))
    }

    /// Dense candidate list covering `[seqbase, seqbase + count)`.
    pub fn dense_candidates(seqbase: Oid, count: usize) -> Self {
        let mut col = Self::new(0, ColumnData::Void { seqbase, count });
        col.props = ColumnProps::candidates(count);
        col
    }

    /// Candidate list from explicit oids, which must be strictly ascending.
    pub fn candidates(oids: Vec<Oid>) -> Result<Self> {
        if let Some(pos) = oids.windows(2).position(|w| w[0] >= w[1]) {
            return Err(StorageError::Unsorted(pos + 1));
        }
        let count = oids.len();
        let mut col = Self::new(0, ColumnData::Oid(oids));
        col.props = ColumnProps::candidates(count);
        Ok(col)
    }

    /// Candidate list given as a bitmask anchored at `first`.
    pub fn mask_candidates(first: Oid, bits: BitVec<u64, Lsb0>) -> Self {
        let count = bits.count_ones();
        let mut col = Self::new(0, ColumnData::Mask { first, bits });
        col.props = ColumnProps::candidates(count);
        col
    }

    /// Row id of position 0.
    pub fn hseqbase(&self) -> Oid {
        self.hseqbase
    }

    /// Builder-style override of the row id origin.
    pub fn with_hseqbase(mut self, hseqbase: Oid) -> Self {
        self.hseqbase = hseqbase;
        self
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Logical type.
    pub fn logical_type(&self) -> LogicalType {
        self.data.logical_type()
    }

    /// Physical storage.
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    /// Mutable physical storage, used while a result column is being built.
    pub fn data_mut(&mut self) -> &mut ColumnData {
        &mut self.data
    }

    /// Derived properties.
    pub fn props(&self) -> ColumnProps {
        self.props
    }

    /// Overwrite derived properties.
    pub fn set_props(&mut self, props: ColumnProps) {
        self.props = props;
    }

    /// Persistence mode.
    pub fn persistence(&self) -> Persistence {
        self.persistence
    }

    /// Change persistence mode.
    pub fn set_persistence(&mut self, persistence: Persistence) {
        self.persistence = persistence;
    }

    /// String at `pos`, `None` for nil or a non-string column.
    pub fn str_at(&self, pos: usize) -> Option<&str> {
        <str as Atom>::get(<str as Atom>::values(&self.data)?, pos)
    }

    /// Integer at `pos`, `None` for nil or a non-integer column.
    pub fn int_at(&self, pos: usize) -> Option<i32> {
        i32::get(i32::values(&self.data)?, pos).copied()
    }

    /// Bit at `pos`, `None` for nil or a non-bit column.
    pub fn bit_at(&self, pos: usize) -> Option<bool> {
        i8::get(i8::values(&self.data)?, pos).map(|v| *v != 0)
    }

    /// Materialised oids of a candidate list column.
    pub fn oids(&self) -> Option<Vec<Oid>> {
        match &self.data {
            ColumnData::Void { seqbase, count } => Some((*seqbase..*seqbase + *count as Oid).collect()),
            ColumnData::Oid(v) => Some(v.clone()),
            ColumnData::Mask { first, bits } => Some(bits.iter_ones().map(|i| first + i as Oid).collect()),
            _ => None,
        }
    }
}
