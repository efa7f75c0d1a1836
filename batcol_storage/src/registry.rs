//! Process-wide column registry with reference counting and fix guards.
//!
//! A column lives in the registry while it holds at least one logical
//! reference. Readers `resolve` an id into a [`Fixed`] guard which pins the
//! column for the duration of an invocation and unfixes on drop, on every exit
//! path.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::column::{Column, LogicalType, Persistence};
use crate::{Oid, Result, StorageError};

/// Integer handle of a registered column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub u32);

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Slot {
    column: Arc<Column>,
    fixes: Arc<AtomicUsize>,
    refs: usize,
}

/// RAII guard pinning a resolved column. Dereferences to the column.
#[derive(Debug)]
pub struct Fixed {
    id: ColumnId,
    column: Arc<Column>,
    fixes: Arc<AtomicUsize>,
}

impl Fixed {
    /// Id the guard was resolved from.
    pub fn id(&self) -> ColumnId {
        self.id
    }
}

impl Deref for Fixed {
    type Target = Column;

    fn deref(&self) -> &Column {
        &self.column
    }
}

impl Drop for Fixed {
    fn drop(&mut self) {
        self.fixes.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Registry mapping column ids to shared, read-only columns.
#[derive(Debug)]
pub struct ColumnRegistry {
    slots: RwLock<HashMap<ColumnId, Slot>>,
    next_id: AtomicU32,
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { slots: RwLock::new(HashMap::new()), next_id: AtomicU32::new(1) }
    }

    /// Allocate a fresh, unregistered column.
    pub fn create(
        &self,
        ty: LogicalType,
        hseqbase: Oid,
        capacity: usize,
        persistence: Persistence,
    ) -> Result<Column> {
        let mut column = Column::with_capacity(ty, hseqbase, capacity)?;
        column.set_persistence(persistence);
        Ok(column)
    }

    /// Register `column`, transferring ownership to the registry with one
    /// logical reference held by the caller.
    pub fn keep(&self, column: Column) -> ColumnId {
        let id = ColumnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let slot = Slot { column: Arc::new(column), fixes: Arc::new(AtomicUsize::new(0)), refs: 1 };
        self.slots.write().unwrap_or_else(PoisonError::into_inner).insert(id, slot);
        debug!(%id, "column registered");
        id
    }

    /// Fix the column behind `id` for reading.
    pub fn resolve(&self, id: ColumnId) -> Result<Fixed> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get(&id).ok_or(StorageError::NotFound(id))?;
        slot.fixes.fetch_add(1, Ordering::AcqRel);
        Ok(Fixed { id, column: Arc::clone(&slot.column), fixes: Arc::clone(&slot.fixes) })
    }

    /// Add a logical reference.
    pub fn retain(&self, id: ColumnId) -> Result<()> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.get_mut(&id).ok_or(StorageError::NotFound(id))?.refs += 1;
        Ok(())
    }

    /// Drop a logical reference; the column leaves the registry with its last
    /// reference. Outstanding fix guards keep the data alive until dropped.
    pub fn release(&self, id: ColumnId) -> Result<()> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get_mut(&id).ok_or(StorageError::NotFound(id))?;
        slot.refs -= 1;
        if slot.refs == 0 {
            slots.remove(&id);
            debug!(%id, "column released");
        }
        Ok(())
    }

    /// Number of live fix guards on `id`, 0 when unknown.
    pub fn fix_count(&self, id: ColumnId) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(&id).map_or(0, |s| s.fixes.load(Ordering::Acquire))
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: ColumnId) -> bool {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).contains_key(&id)
    }

    /// Number of registered columns.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no column is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every column, returning how many were registered.
    pub fn teardown(&self) -> usize {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let pinned = slots.values().filter(|s| s.fixes.load(Ordering::Acquire) > 0).count();
        if pinned > 0 {
            warn!(pinned, "tearing down registry with fixed columns");
        }
        let n = slots.len();
        slots.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_fixes_and_unfixes() {
        let reg = ColumnRegistry::new();
        let id = reg.keep(Column::from_ints(0, [Some(1), Some(2)]));
        {
            let a = reg.resolve(id).unwrap();
            let b = reg.resolve(id).unwrap();
            assert_eq!(a.len(), 2);
            assert_eq!(b.id(), id);
            assert_eq!(reg.fix_count(id), 2);
        }
        assert_eq!(reg.fix_count(id), 0);
    }

    #[test]
    fn release_drops_last_reference() {
        let reg = ColumnRegistry::new();
        let id = reg.keep(Column::from_ints(0, [Some(1)]));
        reg.retain(id).unwrap();
        reg.release(id).unwrap();
        assert!(reg.contains(id));
        let guard = reg.resolve(id).unwrap();
        reg.release(id).unwrap();
        assert!(!reg.contains(id));
        // the guard still reads valid data
        assert_eq!(guard.int_at(0), Some(1));
        assert!(matches!(reg.resolve(id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn create_and_teardown() {
        let reg = ColumnRegistry::new();
        let col = reg.create(LogicalType::Str, 3, 4, Persistence::Persistent).unwrap();
        assert_eq!(col.persistence(), Persistence::Persistent);
        reg.keep(col);
        reg.keep(Column::dense_candidates(0, 4));
        assert_eq!(reg.teardown(), 2);
        assert!(reg.is_empty());
    }
}
