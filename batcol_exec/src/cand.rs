//! Candidate iteration.
//!
//! A [`CandIter`] enumerates the absolute row ids an invocation processes,
//! either every row of a column or the rows named by a candidate list. Lists
//! are restricted to the column's row range `[hseqbase, hseqbase + count)`.
//! Callers pick [`CandIter::next_dense`] or [`CandIter::next_general`] once per
//! invocation based on [`CandIter::kind`].

use batcol_storage::{Column, ColumnData, LogicalType, Oid, OID_NIL};
use bitvec::prelude::*;

/// Iteration shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandKind {
    /// Contiguous ascending range.
    Dense,
    /// Explicit row ids.
    General,
}

/// Candidate iterator construction errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandError {
    /// The candidate column does not hold row ids.
    #[error("candidate list must be of type oid, found {0}")]
    NotCandidates(LogicalType),
    /// Co-iterated operands disagree in count or origin.
    #[error("Requires columns of identical size")]
    Misaligned {
        /// Count of the first operand.
        expected: usize,
        /// Count of the offending operand.
        found: usize,
    },
}

#[derive(Debug, Clone)]
enum Repr<'c> {
    Dense,
    List(&'c [Oid]),
    Mask { bits: &'c BitSlice<u64, Lsb0>, pos: usize },
}

/// Ordered enumeration of absolute row ids.
#[derive(Debug, Clone)]
pub struct CandIter<'c> {
    repr: Repr<'c>,
    /// Dense start, or oid of mask bit 0.
    first: Oid,
    hseq: Oid,
    ncand: usize,
    next: usize,
}

impl<'c> CandIter<'c> {
    /// Iterate `column` under the optional candidate list `cands`.
    pub fn new(column: &'c Column, cands: Option<&'c Column>) -> Result<Self, CandError> {
        let lo = column.hseqbase();
        let hi = lo + column.len() as Oid;
        let Some(s) = cands else {
            return Ok(Self::dense(lo, lo, column.len()));
        };
        let hseq = s.hseqbase();
        match s.data() {
            ColumnData::Void { seqbase, count } => {
                let first = (*seqbase).max(lo);
                let end = (*seqbase + *count as Oid).min(hi);
                Ok(Self::dense(hseq, first, end.saturating_sub(first) as usize))
            }
            ColumnData::Oid(oids) => {
                let start = oids.partition_point(|&o| o < lo);
                let end = oids.partition_point(|&o| o < hi);
                let oids = &oids[start..end];
                match (oids.first(), oids.last()) {
                    (None, _) | (_, None) => Ok(Self::dense(hseq, lo, 0)),
                    (Some(&f), Some(&l)) if (l - f) as usize + 1 == oids.len() => {
                        Ok(Self::dense(hseq, f, oids.len()))
                    }
                    _ => Ok(Self { repr: Repr::List(oids), first: 0, hseq, ncand: oids.len(), next: 0 }),
                }
            }
            ColumnData::Mask { first, bits } => {
                let width = bits.len() as Oid;
                let from = lo.saturating_sub(*first).min(width) as usize;
                let to = hi.saturating_sub(*first).min(width) as usize;
                let bits = &bits[from..to];
                Ok(Self {
                    repr: Repr::Mask { bits, pos: 0 },
                    first: first + from as Oid,
                    hseq,
                    ncand: bits.count_ones(),
                    next: 0,
                })
            }
            other => Err(CandError::NotCandidates(other.logical_type())),
        }
    }

    fn dense(hseq: Oid, first: Oid, ncand: usize) -> Self {
        Self { repr: Repr::Dense, first, hseq, ncand, next: 0 }
    }

    /// Iteration shape, fixed for the iterator's lifetime.
    pub fn kind(&self) -> CandKind {
        match self.repr {
            Repr::Dense => CandKind::Dense,
            Repr::List(_) | Repr::Mask { .. } => CandKind::General,
        }
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.ncand
    }

    /// Whether there are no candidates.
    pub fn is_empty(&self) -> bool {
        self.ncand == 0
    }

    /// Row id origin used for alignment of co-iterated operands.
    pub fn hseq(&self) -> Oid {
        self.hseq
    }

    /// Fail unless `sibling` enumerates as many rows from the same origin.
    pub fn check_aligned(&self, sibling: &CandIter<'_>) -> Result<(), CandError> {
        if self.ncand != sibling.ncand || self.hseq != sibling.hseq {
            return Err(CandError::Misaligned { expected: self.ncand, found: sibling.ncand });
        }
        Ok(())
    }

    /// Next row id of a dense iterator.
    #[inline]
    pub fn next_dense(&mut self) -> Oid {
        debug_assert_eq!(self.kind(), CandKind::Dense);
        let o = self.first + self.next as Oid;
        self.next += 1;
        o
    }

    /// Next row id for any shape; the oid nil once exhausted.
    #[inline]
    pub fn next_general(&mut self) -> Oid {
        if self.next >= self.ncand {
            return OID_NIL;
        }
        let o = match &mut self.repr {
            Repr::Dense => self.first + self.next as Oid,
            Repr::List(oids) => oids[self.next],
            Repr::Mask { bits, pos } => match bits[*pos..].first_one() {
                Some(skip) => {
                    let at = *pos + skip;
                    *pos = at + 1;
                    self.first + at as Oid
                }
                None => return OID_NIL,
            },
        };
        self.next += 1;
        o
    }

    /// Rewind to the first candidate.
    pub fn reset(&mut self) {
        self.next = 0;
        if let Repr::Mask { pos, .. } = &mut self.repr {
            *pos = 0;
        }
    }
}

impl Iterator for CandIter<'_> {
    type Item = Oid;

    fn next(&mut self) -> Option<Oid> {
        (self.next < self.ncand).then(|| self.next_general())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.ncand - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for CandIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(hseqbase: Oid, n: usize) -> Column {
        let values: Vec<String> = (0..n).map(|i| i.to_string()).collect();
        Column::from_strs(hseqbase, values.iter().map(|s| Some(s.as_str()))).unwrap()
    }

    #[test]
    fn no_candidates_is_dense_over_all_rows() {
        let col = strs(100, 4);
        let mut ci = CandIter::new(&col, None).unwrap();
        assert_eq!(ci.kind(), CandKind::Dense);
        assert_eq!(ci.len(), 4);
        assert_eq!(ci.hseq(), 100);
        assert_eq!(ci.next_dense(), 100);
        assert_eq!(ci.next_dense(), 101);
    }

    #[test]
    fn dense_candidates_restricted_to_column_range() {
        let col = strs(10, 5);
        let cands = Column::dense_candidates(8, 5);
        let ci = CandIter::new(&col, Some(&cands)).unwrap();
        assert_eq!(ci.kind(), CandKind::Dense);
        assert_eq!(ci.collect::<Vec<_>>(), vec![10, 11, 12]);
    }

    #[test]
    fn contiguous_list_takes_dense_path() {
        let col = strs(0, 10);
        let cands = Column::candidates(vec![3, 4, 5]).unwrap();
        let ci = CandIter::new(&col, Some(&cands)).unwrap();
        assert_eq!(ci.kind(), CandKind::Dense);
        assert_eq!(ci.collect::<Vec<_>>(), vec![3, 4, 5]);
    }

    #[test]
    fn sparse_list_and_reset() {
        let col = strs(0, 10);
        let cands = Column::candidates(vec![1, 4, 9, 12]).unwrap();
        let mut ci = CandIter::new(&col, Some(&cands)).unwrap();
        assert_eq!(ci.kind(), CandKind::General);
        assert_eq!(ci.len(), 3);
        assert_eq!(ci.next_general(), 1);
        assert_eq!(ci.next_general(), 4);
        ci.reset();
        assert_eq!(ci.by_ref().collect::<Vec<_>>(), vec![1, 4, 9]);
        assert_eq!(ci.next_general(), OID_NIL);
    }

    #[test]
    fn mask_candidates() {
        let col = strs(2, 4);
        let cands = Column::mask_candidates(0, bitvec![u64, Lsb0; 1, 1, 1, 0, 1, 1, 1]);
        let mut ci = CandIter::new(&col, Some(&cands)).unwrap();
        assert_eq!(ci.kind(), CandKind::General);
        assert_eq!(ci.len(), 3);
        assert_eq!(ci.by_ref().collect::<Vec<_>>(), vec![2, 4, 5]);
        ci.reset();
        assert_eq!(ci.next_general(), 2);
    }

    #[test]
    fn alignment() {
        let a = strs(0, 5);
        let b = strs(0, 7);
        let ca = CandIter::new(&a, None).unwrap();
        let cb = CandIter::new(&b, None).unwrap();
        assert_eq!(
            ca.check_aligned(&cb),
            Err(CandError::Misaligned { expected: 5, found: 7 })
        );
        let cands = Column::candidates(vec![0, 2, 4, 5, 6]).unwrap();
        let cb = CandIter::new(&b, Some(&cands)).unwrap();
        assert!(ca.check_aligned(&cb).is_ok());
    }

    #[test]
    fn rejects_non_oid_candidates() {
        let col = strs(0, 3);
        let bogus = Column::from_ints(0, [Some(1)]);
        assert_eq!(
            CandIter::new(&col, Some(&bogus)).unwrap_err(),
            CandError::NotCandidates(LogicalType::Int)
        );
    }
}
