//! Column storage layer for the batcol bulk operator engine.
//!
//! Columns are ordered, densely indexed sequences of a single atom type.
//! Rows are addressed by `hseqbase + position`. Columns are shared through a
//! [`ColumnRegistry`] which hands out integer ids and RAII fix guards.
#![deny(missing_docs)]

pub mod atom;
pub mod column;
pub mod heap;
pub mod registry;

pub use atom::{Atom, BIT_NIL, INT_NIL, OID_NIL};
pub use column::{Column, ColumnData, ColumnProps, LogicalType, Persistence};
pub use heap::StrHeap;
pub use registry::{ColumnId, ColumnRegistry, Fixed};

/// Absolute row identifier.
pub type Oid = u64;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Column id is not registered.
    #[error("column not found: {0}")]
    NotFound(ColumnId),
    /// Allocation of column memory failed.
    #[error("could not allocate space for {bytes} bytes")]
    OutOfMemory {
        /// Requested size.
        bytes: usize,
    },
    /// Value of the wrong atom type appended or read.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the operation needed.
        expected: LogicalType,
        /// Type of the column.
        found: LogicalType,
    },
    /// Candidate lists must be strictly ascending.
    #[error("candidate list is not sorted and unique at position {0}")]
    Unsorted(usize),
}
