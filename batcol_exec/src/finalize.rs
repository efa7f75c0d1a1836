//! Result column under construction and its finalisation.

use batcol_storage::{Atom, Column, ColumnProps};

/// Finalisation misuse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FinalizeError {
    /// `finalize` was called twice.
    #[error("output column already finalized")]
    AlreadyFinalized,
    /// The reported count disagrees with the rows appended.
    #[error("produced count {produced} does not match {appended} appended rows")]
    CountMismatch {
        /// Count passed to `finalize`.
        produced: usize,
        /// Rows actually appended.
        appended: usize,
    },
    /// The column was handed out before being finalized.
    #[error("output column is not finalized")]
    NotFinalized,
}

/// A freshly created result column, exclusively owned by one invocation.
///
/// Dropping it without calling [`OutputColumn::into_column`] discards the
/// partial result.
#[derive(Debug)]
pub struct OutputColumn {
    column: Column,
    any_nil: bool,
    grows: usize,
    finalized: bool,
}

impl OutputColumn {
    /// Take ownership of an empty column.
    pub fn new(column: Column) -> Self {
        Self { column, any_nil: false, grows: 0, finalized: false }
    }

    /// Append one value. An in-band nil sentinel counts as nil.
    #[inline]
    pub fn push<T: Atom + ?Sized>(&mut self, v: &T) -> batcol_storage::Result<()> {
        self.append(Some(v))
    }

    /// Append nil.
    #[inline]
    pub fn push_nil<T: Atom + ?Sized>(&mut self) -> batcol_storage::Result<()> {
        self.append::<T>(None)
    }

    #[inline]
    fn append<T: Atom + ?Sized>(&mut self, v: Option<&T>) -> batcol_storage::Result<()> {
        debug_assert!(!self.finalized);
        self.any_nil |= v.map_or(true, T::is_nil);
        if T::push(self.column.data_mut(), v)? {
            self.grows += 1;
        }
        Ok(())
    }

    /// Rows appended so far.
    pub fn len(&self) -> usize {
        self.column.len()
    }

    /// Whether no row was appended.
    pub fn is_empty(&self) -> bool {
        self.column.is_empty()
    }

    /// Whether a nil was appended.
    pub fn any_nil(&self) -> bool {
        self.any_nil
    }

    /// Appends that forced the column storage to grow.
    pub fn grow_count(&self) -> usize {
        self.grows
    }

    /// Whether `finalize` already ran.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Stamp count and the properties derivable without scanning.
    /// Order and uniqueness are asserted only for zero or one rows.
    pub fn finalize(&mut self, produced: usize, any_nil: bool) -> Result<(), FinalizeError> {
        self.seal(produced)?;
        self.column.set_props(ColumnProps::trivial(produced, any_nil));
        Ok(())
    }

    /// Finalize a column of ascending, distinct row ids.
    pub fn finalize_candidates(&mut self, produced: usize) -> Result<(), FinalizeError> {
        self.seal(produced)?;
        self.column.set_props(ColumnProps::candidates(produced));
        Ok(())
    }

    fn seal(&mut self, produced: usize) -> Result<(), FinalizeError> {
        if self.finalized {
            return Err(FinalizeError::AlreadyFinalized);
        }
        if produced != self.column.len() {
            return Err(FinalizeError::CountMismatch { produced, appended: self.column.len() });
        }
        self.finalized = true;
        Ok(())
    }

    /// Hand out the finalized column.
    pub fn into_column(self) -> Result<Column, FinalizeError> {
        if !self.finalized {
            return Err(FinalizeError::NotFinalized);
        }
        Ok(self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcol_storage::LogicalType;

    fn out(ty: LogicalType) -> OutputColumn {
        OutputColumn::new(Column::with_capacity(ty, 0, 1).unwrap())
    }

    #[test]
    fn finalize_derives_flags() {
        let mut o = out(LogicalType::Str);
        o.push("a").unwrap();
        o.push("\u{80}").unwrap();
        assert!(!o.any_nil());
        o.push_nil::<str>().unwrap();
        assert!(o.any_nil());
        assert_eq!(o.grow_count(), 1);
        o.finalize(3, o.any_nil()).unwrap();
        let col = o.into_column().unwrap();
        let p = col.props();
        assert!(p.nil && !p.nonil);
        assert!(!p.key && !p.sorted && !p.revsorted);
    }

    #[test]
    fn zero_and_one_row_are_trivially_ordered() {
        for rows in 0..2 {
            let mut o = out(LogicalType::Int);
            for v in 0..rows {
                o.push(&v).unwrap();
            }
            o.finalize(rows as usize, false).unwrap();
            let p = o.into_column().unwrap().props();
            assert!(p.key && p.sorted && p.revsorted && p.nonil);
        }
    }

    #[test]
    fn double_finalize_is_rejected() {
        let mut o = out(LogicalType::Int);
        o.push(&1).unwrap();
        o.finalize(1, false).unwrap();
        assert_eq!(o.finalize(1, false), Err(FinalizeError::AlreadyFinalized));
        assert_eq!(o.into_column().unwrap().len(), 1);
    }

    #[test]
    fn count_mismatch_and_unfinalized() {
        let mut o = out(LogicalType::Int);
        o.push(&1).unwrap();
        assert_eq!(
            o.finalize(2, false),
            Err(FinalizeError::CountMismatch { produced: 2, appended: 1 })
        );
        assert_eq!(o.into_column().unwrap_err(), FinalizeError::NotFinalized);
    }

    #[test]
    fn candidate_output() {
        let mut o = out(LogicalType::Oid);
        o.push(&3u64).unwrap();
        o.push(&7u64).unwrap();
        o.finalize_candidates(2).unwrap();
        let p = o.into_column().unwrap().props();
        assert!(p.sorted && p.key && !p.revsorted && !p.nil);
    }
}
