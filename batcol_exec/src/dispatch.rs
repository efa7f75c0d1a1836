//! Generic bulk operator engine.
//!
//! Each logical argument is either a column (with an optional candidate
//! list) or a constant. The engine resolves and pins column operands, checks
//! their alignment, allocates the result, chooses the dense or general
//! iteration path once and then runs one loop body per row.

use std::fmt;

use batcol_storage::{Atom, ColumnId, ColumnRegistry, Fixed, LogicalType, Oid, Persistence};
use tracing::{debug, debug_span, warn};

use crate::cand::{CandIter, CandKind};
use crate::context::QueryContext;
use crate::error::{ExecError, ExecResult, KernelResult};
use crate::finalize::OutputColumn;
use crate::scratch::{ScratchBuffer, STR_SCRATCH};

/// Column operand: a column id plus an optional candidate list id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatArg {
    /// Column.
    pub bat: ColumnId,
    /// Candidate list restricting the rows processed.
    pub cand: Option<ColumnId>,
}

/// A logical operator argument.
#[derive(Debug)]
pub enum Arg<'a, T: Atom + ?Sized> {
    /// Per-row values of a column.
    Column(BatArg),
    /// The same value for every row.
    Const(&'a T),
    /// Nil for every row.
    Nil,
}

impl<T: Atom + ?Sized> Clone for Arg<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Atom + ?Sized> Copy for Arg<'_, T> {}

impl<'a, T: Atom + ?Sized> Arg<'a, T> {
    /// Every row of `bat`.
    pub fn column(bat: ColumnId) -> Self {
        Arg::Column(BatArg { bat, cand: None })
    }

    /// Rows of `bat` selected by `cand`.
    pub fn filtered(bat: ColumnId, cand: ColumnId) -> Self {
        Arg::Column(BatArg { bat, cand: Some(cand) })
    }

    /// Constant value.
    pub fn value(v: &'a T) -> Self {
        Arg::Const(v)
    }

    /// Constant nil.
    pub fn nil() -> Self {
        Arg::Nil
    }
}

/// Matching row pairs of a join as aligned oid columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Joined {
    /// Left row ids.
    pub left: ColumnId,
    /// Right row ids, when pairs were requested.
    pub right: Option<ColumnId>,
}

/// Static description of one bulk operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSpec {
    /// Name reported in errors, logs and metrics.
    pub name: &'static str,
    /// Initial scratch buffer size in bytes.
    pub scratch: usize,
}

impl OpSpec {
    /// String-producing operator with nil propagation.
    pub const fn new(name: &'static str) -> Self {
        Self { name, scratch: STR_SCRATCH }
    }

    /// Override the initial scratch size.
    pub const fn scratch(self, bytes: usize) -> Self {
        Self { scratch: bytes, ..self }
    }
}

/// Kernel result that can be appended to an output column.
pub trait Produce {
    /// Atom type of the output column.
    type Atom: Atom + ?Sized;

    /// Append to `out`; string results live in `scratch`.
    fn append(self, out: &mut OutputColumn, scratch: &ScratchBuffer) -> batcol_storage::Result<()>;
}

/// Result of a string kernel: the value written to the scratch buffer, or nil.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emit {
    /// The scratch buffer holds the value.
    Value,
    /// Nil.
    Nil,
}

impl Produce for Emit {
    type Atom = str;

    fn append(self, out: &mut OutputColumn, scratch: &ScratchBuffer) -> batcol_storage::Result<()> {
        match self {
            Emit::Value => out.push(scratch.as_str()),
            Emit::Nil => out.push_nil::<str>(),
        }
    }
}

impl Produce for i32 {
    type Atom = i32;

    fn append(self, out: &mut OutputColumn, _: &ScratchBuffer) -> batcol_storage::Result<()> {
        out.push(&self)
    }
}

impl Produce for bool {
    type Atom = i8;

    fn append(self, out: &mut OutputColumn, _: &ScratchBuffer) -> batcol_storage::Result<()> {
        out.push(&i8::from(self))
    }
}

trait Step {
    fn next(iter: &mut CandIter<'_>) -> Oid;
}

enum Dense {}
enum General {}

impl Step for Dense {
    #[inline(always)]
    fn next(iter: &mut CandIter<'_>) -> Oid {
        iter.next_dense()
    }
}

impl Step for General {
    #[inline(always)]
    fn next(iter: &mut CandIter<'_>) -> Oid {
        iter.next_general()
    }
}

/// Expand `$body` twice, once per iteration shape, binding `$step`.
macro_rules! by_shape {
    ($dense:expr, $step:ident => $body:expr) => {
        if $dense {
            type $step = Dense;
            $body
        } else {
            type $step = General;
            $body
        }
    };
}

struct Pinned {
    bat: Fixed,
    cand: Option<Fixed>,
}

enum Held<'a, T: ?Sized> {
    Column(Pinned),
    Const(Option<&'a T>),
}

enum Source<'c, T: Atom + ?Sized> {
    Column { values: T::Values<'c>, iter: CandIter<'c>, hseqbase: Oid },
    Const(Option<&'c T>),
}

impl<'c, T: Atom + ?Sized> Source<'c, T> {
    fn new<'a: 'c>(spec: &OpSpec, held: &'c Held<'a, T>) -> ExecResult<Self> {
        match held {
            Held::Const(v) => Ok(Source::Const(*v)),
            Held::Column(p) => {
                let values = T::values(p.bat.data()).ok_or_else(|| {
                    ExecError::illegal(
                        spec.name,
                        format!("expected a {} column, found {}", T::TYPE, p.bat.logical_type()),
                    )
                })?;
                let iter = CandIter::new(&p.bat, p.cand.as_deref()).map_err(|e| ExecError::cand(spec.name, e))?;
                Ok(Source::Column { values, iter, hseqbase: p.bat.hseqbase() })
            }
        }
    }

    fn cand(&self) -> Option<&CandIter<'c>> {
        match self {
            Source::Column { iter, .. } => Some(iter),
            Source::Const(_) => None,
        }
    }

    /// Next row's value, `None` when nil.
    #[inline(always)]
    fn fetch<S: Step>(&mut self) -> Option<&'c T> {
        match self {
            Source::Column { values, iter, hseqbase } => T::get(*values, (S::next(iter) - *hseqbase) as usize),
            Source::Const(v) => *v,
        }
    }
}

struct Shape {
    rows: usize,
    hseq: Oid,
    dense: bool,
}

impl Shape {
    fn of(spec: &OpSpec, iters: &[Option<&CandIter<'_>>]) -> ExecResult<Self> {
        let mut cols = iters.iter().flatten();
        let first = cols
            .next()
            .ok_or_else(|| ExecError::illegal(spec.name, "at least one column argument is required"))?;
        let mut dense = first.kind() == CandKind::Dense;
        for ci in cols {
            first.check_aligned(ci).map_err(|e| ExecError::cand(spec.name, e))?;
            dense &= ci.kind() == CandKind::Dense;
        }
        Ok(Shape { rows: first.len(), hseq: first.hseq(), dense })
    }
}

struct Run<'s> {
    spec: &'s OpSpec,
    out: OutputColumn,
    scratch: ScratchBuffer,
}

impl Run<'_> {
    #[inline(always)]
    fn nil<P: Produce>(&mut self) -> ExecResult<()> {
        let name = self.spec.name;
        self.out.push_nil::<P::Atom>().map_err(|e| ExecError::storage(name, e))
    }

    #[inline(always)]
    fn call<P, F>(&mut self, call: F) -> ExecResult<()>
    where
        P: Produce,
        F: FnOnce(&mut ScratchBuffer) -> KernelResult<P>,
    {
        let name = self.spec.name;
        self.scratch.clear();
        let value = call(&mut self.scratch).map_err(|e| ExecError::kernel(name, e))?;
        value.append(&mut self.out, &self.scratch).map_err(|e| ExecError::storage(name, e))
    }
}

struct Done<R = ColumnId> {
    id: R,
    rows: usize,
    any_nil: bool,
}

/// Runs bulk operators against a column registry under one query context.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'e> {
    columns: &'e ColumnRegistry,
    ctx: &'e QueryContext,
}

impl<'e> Dispatcher<'e> {
    /// Bind a registry and query context.
    pub fn new(columns: &'e ColumnRegistry, ctx: &'e QueryContext) -> Self {
        Self { columns, ctx }
    }

    /// Registry results are kept in.
    pub fn columns(&self) -> &'e ColumnRegistry {
        self.columns
    }

    /// Query context checked while looping.
    pub fn context(&self) -> &'e QueryContext {
        self.ctx
    }

    /// Unary operator.
    pub fn map1<A, P, K>(&self, spec: &OpSpec, a: Arg<'_, A>, mut kernel: K) -> ExecResult<ColumnId>
    where
        A: Atom + ?Sized,
        P: Produce,
        K: FnMut(&mut ScratchBuffer, &A) -> KernelResult<P>,
    {
        self.observe(spec, || {
            let ha = self.hold(spec, a)?;
            let mut sa = Source::new(spec, &ha)?;
            let shape = Shape::of(spec, &[sa.cand()])?;
            let mut run = self.start::<P>(spec, &shape)?;
            by_shape!(shape.dense, S => self.drive(spec, shape.rows, || {
                match sa.fetch::<S>() {
                    Some(x) => run.call(|buf| kernel(buf, x)),
                    None => run.nil::<P>(),
                }
            }))?;
            self.finish(run, shape.rows)
        })
    }

    /// Unary operator whose kernel handles nil itself: it is called for
    /// every row, with `None` for a nil operand.
    pub fn map1_nils<A, P, K>(&self, spec: &OpSpec, a: Arg<'_, A>, mut kernel: K) -> ExecResult<ColumnId>
    where
        A: Atom + ?Sized,
        P: Produce,
        K: FnMut(&mut ScratchBuffer, Option<&A>) -> KernelResult<P>,
    {
        self.observe(spec, || {
            let ha = self.hold(spec, a)?;
            let mut sa = Source::new(spec, &ha)?;
            let shape = Shape::of(spec, &[sa.cand()])?;
            let mut run = self.start::<P>(spec, &shape)?;
            by_shape!(shape.dense, S => self.drive(spec, shape.rows, || {
                let x = sa.fetch::<S>();
                run.call(|buf| kernel(buf, x))
            }))?;
            self.finish(run, shape.rows)
        })
    }

    /// Binary operator.
    pub fn map2<A, B, P, K>(&self, spec: &OpSpec, a: Arg<'_, A>, b: Arg<'_, B>, mut kernel: K) -> ExecResult<ColumnId>
    where
        A: Atom + ?Sized,
        B: Atom + ?Sized,
        P: Produce,
        K: FnMut(&mut ScratchBuffer, &A, &B) -> KernelResult<P>,
    {
        self.observe(spec, || {
            let ha = self.hold(spec, a)?;
            let hb = self.hold(spec, b)?;
            let mut sa = Source::new(spec, &ha)?;
            let mut sb = Source::new(spec, &hb)?;
            let shape = Shape::of(spec, &[sa.cand(), sb.cand()])?;
            let mut run = self.start::<P>(spec, &shape)?;
            by_shape!(shape.dense, S => self.drive(spec, shape.rows, || {
                match (sa.fetch::<S>(), sb.fetch::<S>()) {
                    (Some(x), Some(y)) => run.call(|buf| kernel(buf, x, y)),
                    _ => run.nil::<P>(),
                }
            }))?;
            self.finish(run, shape.rows)
        })
    }

    /// Ternary operator.
    pub fn map3<A, B, C, P, K>(
        &self,
        spec: &OpSpec,
        a: Arg<'_, A>,
        b: Arg<'_, B>,
        c: Arg<'_, C>,
        mut kernel: K,
    ) -> ExecResult<ColumnId>
    where
        A: Atom + ?Sized,
        B: Atom + ?Sized,
        C: Atom + ?Sized,
        P: Produce,
        K: FnMut(&mut ScratchBuffer, &A, &B, &C) -> KernelResult<P>,
    {
        self.observe(spec, || {
            let ha = self.hold(spec, a)?;
            let hb = self.hold(spec, b)?;
            let hc = self.hold(spec, c)?;
            let mut sa = Source::new(spec, &ha)?;
            let mut sb = Source::new(spec, &hb)?;
            let mut sc = Source::new(spec, &hc)?;
            let shape = Shape::of(spec, &[sa.cand(), sb.cand(), sc.cand()])?;
            let mut run = self.start::<P>(spec, &shape)?;
            by_shape!(shape.dense, S => self.drive(spec, shape.rows, || {
                match (sa.fetch::<S>(), sb.fetch::<S>(), sc.fetch::<S>()) {
                    (Some(x), Some(y), Some(z)) => run.call(|buf| kernel(buf, x, y, z)),
                    _ => run.nil::<P>(),
                }
            }))?;
            self.finish(run, shape.rows)
        })
    }

    /// Quaternary operator.
    #[allow(clippy::too_many_arguments)]
    pub fn map4<A, B, C, D, P, K>(
        &self,
        spec: &OpSpec,
        a: Arg<'_, A>,
        b: Arg<'_, B>,
        c: Arg<'_, C>,
        d: Arg<'_, D>,
        mut kernel: K,
    ) -> ExecResult<ColumnId>
    where
        A: Atom + ?Sized,
        B: Atom + ?Sized,
        C: Atom + ?Sized,
        D: Atom + ?Sized,
        P: Produce,
        K: FnMut(&mut ScratchBuffer, &A, &B, &C, &D) -> KernelResult<P>,
    {
        self.observe(spec, || {
            let ha = self.hold(spec, a)?;
            let hb = self.hold(spec, b)?;
            let hc = self.hold(spec, c)?;
            let hd = self.hold(spec, d)?;
            let mut sa = Source::new(spec, &ha)?;
            let mut sb = Source::new(spec, &hb)?;
            let mut sc = Source::new(spec, &hc)?;
            let mut sd = Source::new(spec, &hd)?;
            let shape = Shape::of(spec, &[sa.cand(), sb.cand(), sc.cand(), sd.cand()])?;
            let mut run = self.start::<P>(spec, &shape)?;
            by_shape!(shape.dense, S => self.drive(spec, shape.rows, || {
                match (sa.fetch::<S>(), sb.fetch::<S>(), sc.fetch::<S>(), sd.fetch::<S>()) {
                    (Some(w), Some(x), Some(y), Some(z)) => run.call(|buf| kernel(buf, w, x, y, z)),
                    _ => run.nil::<P>(),
                }
            }))?;
            self.finish(run, shape.rows)
        })
    }

    /// Candidate list of the rows of `b` whose value satisfies `pred`.
    /// Nil rows never qualify.
    pub fn select<A, F>(&self, spec: &OpSpec, b: BatArg, mut pred: F) -> ExecResult<ColumnId>
    where
        A: Atom + ?Sized,
        F: FnMut(&A) -> bool,
    {
        self.observe(spec, || {
            let held = self.hold::<A>(spec, Arg::Column(b))?;
            let mut src = Source::new(spec, &held)?;
            let (rows, dense) = match src.cand() {
                Some(ci) => (ci.len(), ci.kind() == CandKind::Dense),
                None => return Err(ExecError::illegal(spec.name, "select requires a column")),
            };
            let column = self
                .columns
                .create(LogicalType::Oid, 0, rows, Persistence::Transient)
                .map_err(|e| ExecError::storage(spec.name, e))?;
            let mut out = OutputColumn::new(column);
            let Source::Column { values, iter, hseqbase } = &mut src else {
                return Err(ExecError::illegal(spec.name, "select requires a column"));
            };
            by_shape!(dense, S => self.drive(spec, rows, || {
                let oid = S::next(iter);
                let v = A::get(*values, (oid - *hseqbase) as usize);
                if v.is_some_and(&mut pred) {
                    out.push(&oid).map_err(|e| ExecError::storage(spec.name, e))?;
                }
                Ok(())
            }))?;
            let produced = out.len();
            out.finalize_candidates(produced).map_err(|e| ExecError::finalize(spec.name, e))?;
            let column = out.into_column().map_err(|e| ExecError::finalize(spec.name, e))?;
            Ok(Done { id: self.columns.keep(column), rows: produced, any_nil: false })
        })
    }

    /// Nested-loop join of two columns under their candidate lists.
    ///
    /// Produces every pair of rows `(l, r)` whose values satisfy
    /// `pred(l, r)`. The right side drives the outer loop, so left ids come
    /// out grouped by right row, each group in candidate order. Nil rows on
    /// either side never match. Without `pairs` only left ids are kept.
    pub fn join<A, F>(&self, spec: &OpSpec, l: BatArg, r: BatArg, pairs: bool, mut pred: F) -> ExecResult<Joined>
    where
        A: Atom + ?Sized,
        F: FnMut(&A, &A) -> bool,
    {
        self.observe(spec, || {
            let hl = self.hold::<A>(spec, Arg::Column(l))?;
            let hr = self.hold::<A>(spec, Arg::Column(r))?;
            let mut sl = Source::new(spec, &hl)?;
            let mut sr = Source::new(spec, &hr)?;
            let (
                Source::Column { values: lv, iter: li, hseqbase: lb },
                Source::Column { values: rv, iter: ri, hseqbase: rb },
            ) = (&mut sl, &mut sr)
            else {
                return Err(ExecError::illegal(spec.name, "join requires two columns"));
            };
            let (lv, lb, rv, rb) = (*lv, *lb, *rv, *rb);
            let lrows = li.len();
            let dense = li.kind() == CandKind::Dense;
            let mut left = OutputColumn::new(self.oid_column(spec, lrows)?);
            let mut right = if pairs { Some(OutputColumn::new(self.oid_column(spec, lrows)?)) } else { None };

            // Inner rows scanned since the last context check.
            let (step, mut work) = (self.ctx.step(), 0usize);
            for ro in ri {
                if work >= step {
                    self.ctx.check(spec.name)?;
                    work = 0;
                }
                work += lrows.max(1);
                let Some(vr) = A::get(rv, (ro - rb) as usize) else {
                    continue;
                };
                li.reset();
                by_shape!(dense, S => for _ in 0..lrows {
                    let lo = S::next(li);
                    if A::get(lv, (lo - lb) as usize).is_some_and(|vl| pred(vl, vr)) {
                        left.push(&lo).map_err(|e| ExecError::storage(spec.name, e))?;
                        if let Some(right) = &mut right {
                            right.push(&ro).map_err(|e| ExecError::storage(spec.name, e))?;
                        }
                    }
                });
            }

            let produced = left.len();
            let left = self.keep_oids(spec, left, produced)?;
            let right = right.map(|out| self.keep_oids(spec, out, produced)).transpose()?;
            Ok(Done { id: Joined { left, right }, rows: produced, any_nil: false })
        })
    }

    fn oid_column(&self, spec: &OpSpec, capacity: usize) -> ExecResult<batcol_storage::Column> {
        self.columns
            .create(LogicalType::Oid, 0, capacity, Persistence::Transient)
            .map_err(|e| ExecError::storage(spec.name, e))
    }

    fn keep_oids(&self, spec: &OpSpec, mut out: OutputColumn, produced: usize) -> ExecResult<ColumnId> {
        out.finalize(produced, false).map_err(|e| ExecError::finalize(spec.name, e))?;
        let column = out.into_column().map_err(|e| ExecError::finalize(spec.name, e))?;
        Ok(self.columns.keep(column))
    }

    fn hold<'a, T: Atom + ?Sized>(&self, spec: &OpSpec, arg: Arg<'a, T>) -> ExecResult<Held<'a, T>> {
        match arg {
            Arg::Const(v) => Ok(Held::Const(Some(v))),
            Arg::Nil => Ok(Held::Const(None)),
            Arg::Column(BatArg { bat, cand }) => {
                let bat = self.columns.resolve(bat).map_err(|e| ExecError::storage(spec.name, e))?;
                let cand = cand
                    .map(|c| self.columns.resolve(c))
                    .transpose()
                    .map_err(|e| ExecError::storage(spec.name, e))?;
                Ok(Held::Column(Pinned { bat, cand }))
            }
        }
    }

    fn start<'s, P: Produce>(&self, spec: &'s OpSpec, shape: &Shape) -> ExecResult<Run<'s>> {
        let column = self
            .columns
            .create(<P::Atom as Atom>::TYPE, shape.hseq, shape.rows, Persistence::Transient)
            .map_err(|e| ExecError::storage(spec.name, e))?;
        let scratch = ScratchBuffer::with_capacity(spec.scratch).map_err(|e| ExecError::kernel(spec.name, e))?;
        Ok(Run { spec, out: OutputColumn::new(column), scratch })
    }

    /// Run `body` `rows` times, checking the query context between chunks.
    fn drive(&self, spec: &OpSpec, rows: usize, mut body: impl FnMut() -> ExecResult<()>) -> ExecResult<()> {
        let step = self.ctx.step();
        let mut done = 0;
        while done < rows {
            if done > 0 {
                self.ctx.check(spec.name)?;
            }
            let end = rows.min(done + step);
            for _ in done..end {
                body()?;
            }
            done = end;
        }
        Ok(())
    }

    fn finish(&self, run: Run<'_>, rows: usize) -> ExecResult<Done> {
        let Run { spec, mut out, .. } = run;
        let any_nil = out.any_nil();
        out.finalize(rows, any_nil).map_err(|e| ExecError::finalize(spec.name, e))?;
        let column = out.into_column().map_err(|e| ExecError::finalize(spec.name, e))?;
        Ok(Done { id: self.columns.keep(column), rows, any_nil })
    }

    fn observe<R: fmt::Debug>(&self, spec: &OpSpec, body: impl FnOnce() -> ExecResult<Done<R>>) -> ExecResult<R> {
        let _span = debug_span!("bulk", op = spec.name).entered();
        match body() {
            Ok(done) => {
                batcol_metrics::record_success(spec.name, done.rows, done.any_nil);
                debug!(rows = done.rows, nil = done.any_nil, id = ?done.id, "result kept");
                Ok(done.id)
            }
            Err(err) => {
                batcol_metrics::record_failure(spec.name, err.kind.label());
                warn!(%err, "invocation failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, KernelError};
    use batcol_storage::{Column, INT_NIL};
    use bitvec::prelude::*;
    use std::cell::Cell;
    use std::time::Instant;

    const UPPER: OpSpec = OpSpec::new("test.upper");
    const CONCAT: OpSpec = OpSpec::new("test.concat");
    const LEN: OpSpec = OpSpec::new("test.len").scratch(0);

    fn upper(buf: &mut ScratchBuffer, s: &str) -> KernelResult<Emit> {
        buf.set(&s.to_uppercase())?;
        Ok(Emit::Value)
    }

    fn concat(buf: &mut ScratchBuffer, a: &str, b: &str) -> KernelResult<Emit> {
        buf.ensure_capacity(a.len() + b.len())?;
        buf.push_str(a)?;
        buf.push_str(b)?;
        Ok(Emit::Value)
    }

    fn strs(reg: &ColumnRegistry, hseqbase: Oid, values: &[Option<&str>]) -> ColumnId {
        reg.keep(Column::from_strs(hseqbase, values.iter().copied()).unwrap())
    }

    fn read(reg: &ColumnRegistry, id: ColumnId) -> Vec<Option<String>> {
        let col = reg.resolve(id).unwrap();
        (0..col.len()).map(|i| col.str_at(i).map(str::to_owned)).collect()
    }

    fn owned(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_owned)).collect()
    }

    #[test]
    fn nil_rows_never_reach_the_kernel() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 0, &[Some("a"), None, Some("b")]);
        let calls = Cell::new(0);
        let out = d
            .map2(&CONCAT, Arg::column(a), Arg::value("x"), |buf: &mut ScratchBuffer, l: &str, r: &str| {
                calls.set(calls.get() + 1);
                concat(buf, l, r)
            })
            .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(read(&reg, out), owned(&[Some("ax"), None, Some("bx")]));
        assert!(reg.resolve(out).unwrap().props().nil);

        let out = d
            .map2(&CONCAT, Arg::column(a), Arg::nil(), |buf: &mut ScratchBuffer, l: &str, r: &str| {
                calls.set(calls.get() + 1);
                concat(buf, l, r)
            })
            .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(read(&reg, out), vec![None, None, None]);
    }

    #[test]
    fn kernel_sees_nil_rows_when_asked() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 0, &[Some("abc"), None]);
        let out = d
            .map1_nils(&LEN, Arg::column(a), |_: &mut ScratchBuffer, s: Option<&str>| {
                Ok(s.map_or(-1, |s| s.len() as i32))
            })
            .unwrap();
        let col = reg.resolve(out).unwrap();
        assert_eq!((col.int_at(0), col.int_at(1)), (Some(3), Some(-1)));
        assert!(col.props().nonil);
    }

    #[test]
    fn output_follows_candidate_order() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 10, &[Some("a"), Some("b"), Some("c"), Some("d"), Some("e")]);
        let s = reg.keep(Column::candidates(vec![10, 12, 14]).unwrap());
        let out = d.map1(&UPPER, Arg::filtered(a, s), upper).unwrap();
        assert_eq!(read(&reg, out), owned(&[Some("A"), Some("C"), Some("E")]));
        assert_eq!(reg.resolve(out).unwrap().hseqbase(), 0);
    }

    #[test]
    fn dense_and_general_paths_agree() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 0, &[Some("p"), Some("q"), None, Some("s")]);
        let list = reg.keep(Column::candidates(vec![1, 2, 3]).unwrap());
        let mask = reg.keep(Column::mask_candidates(0, bitvec![u64, Lsb0; 0, 1, 1, 1]));
        {
            let col = reg.resolve(a).unwrap();
            let (l, m) = (reg.resolve(list).unwrap(), reg.resolve(mask).unwrap());
            assert_eq!(CandIter::new(&col, Some(&*l)).unwrap().kind(), CandKind::Dense);
            assert_eq!(CandIter::new(&col, Some(&*m)).unwrap().kind(), CandKind::General);
        }
        let dense = d.map1(&UPPER, Arg::filtered(a, list), upper).unwrap();
        let general = d.map1(&UPPER, Arg::filtered(a, mask), upper).unwrap();
        assert_eq!(read(&reg, dense), read(&reg, general));
        assert_eq!(read(&reg, dense), owned(&[Some("Q"), None, Some("S")]));
    }

    #[test]
    fn misaligned_columns_fail_before_any_row() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let five = strs(&reg, 0, &[Some("a"); 5]);
        let seven = strs(&reg, 0, &[Some("b"); 7]);
        let calls = Cell::new(0);
        let err = d
            .map2(&CONCAT, Arg::column(five), Arg::column(seven), |buf: &mut ScratchBuffer, l: &str, r: &str| {
                calls.set(calls.get() + 1);
                concat(buf, l, r)
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert_eq!(err.to_string(), "test.concat:42000!Requires columns of identical size");
        assert_eq!(calls.get(), 0);
        assert_eq!(reg.len(), 2);
        assert_eq!((reg.fix_count(five), reg.fix_count(seven)), (0, 0));
    }

    #[test]
    fn missing_column_releases_resolved_operands() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 0, &[Some("a")]);
        let err = d.map2(&CONCAT, Arg::column(a), Arg::column(ColumnId(999)), concat).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ObjectMissing);
        assert_eq!(err.operator, "test.concat");
        assert_eq!(reg.fix_count(a), 0);

        let err = d.map1(&UPPER, Arg::filtered(a, ColumnId(998)), upper).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ObjectMissing);
        assert_eq!(reg.fix_count(a), 0);
    }

    #[test]
    fn kernel_failure_discards_partial_output() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 0, &[Some("ok"), Some("bad"), Some("ok")]);
        let err = d
            .map1(&UPPER, Arg::column(a), |buf: &mut ScratchBuffer, s: &str| {
                if s == "bad" {
                    return Err(KernelError::Domain("bad input"));
                }
                upper(buf, s)
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationFailed);
        assert_eq!(err.message, "bad input");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.fix_count(a), 0);
    }

    #[test]
    fn different_candidate_sets_zip_positionally() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let vals = [Some("0"), Some("1"), Some("2"), Some("3"), Some("4")];
        let a = strs(&reg, 0, &vals);
        let b = strs(&reg, 0, &vals);
        let ca = reg.keep(Column::candidates(vec![0, 1, 2]).unwrap());
        let cb = reg.keep(Column::candidates(vec![1, 3, 4]).unwrap());
        let out = d.map2(&CONCAT, Arg::filtered(a, ca), Arg::filtered(b, cb), concat).unwrap();
        assert_eq!(read(&reg, out), owned(&[Some("01"), Some("13"), Some("24")]));
    }

    #[test]
    fn zero_and_one_row_results_are_ordered() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let one = strs(&reg, 0, &[Some("x")]);
        let empty = reg.keep(Column::candidates(Vec::new()).unwrap());
        for id in [
            d.map1(&UPPER, Arg::column(one), upper).unwrap(),
            d.map1(&UPPER, Arg::filtered(one, empty), upper).unwrap(),
        ] {
            let p = reg.resolve(id).unwrap().props();
            assert!(p.key && p.sorted && p.revsorted && p.nonil && !p.nil);
        }
    }

    #[test]
    fn expired_deadline_aborts_long_loops() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded().deadline(Instant::now()).check_step(2);
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 0, &[Some("a"); 5]);
        let err = d.map1(&UPPER, Arg::column(a), upper).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(reg.len(), 1);

        // a single chunk completes without a check
        let b = strs(&reg, 0, &[Some("a"); 2]);
        assert!(d.map1(&UPPER, Arg::column(b), upper).is_ok());
    }

    #[test]
    fn scratch_growth_keeps_rows_exact() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let long = "L".repeat(1500);
        let a = strs(&reg, 0, &[Some("ab"), Some(long.as_str()), Some("c"), Some(long.as_str()), Some("")]);
        let out = d.map2(&CONCAT, Arg::column(a), Arg::value("!"), concat).unwrap();
        let expected = ["ab!".to_string(), format!("{long}!"), "c!".to_string(), format!("{long}!"), "!".to_string()];
        assert_eq!(read(&reg, out), expected.iter().map(|s| Some(s.clone())).collect::<Vec<_>>());
    }

    #[test]
    fn fixed_width_outputs() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let a = strs(&reg, 0, &[Some("héllo"), None]);
        let lens = d
            .map1(&LEN, Arg::column(a), |_: &mut ScratchBuffer, s: &str| Ok(s.chars().count() as i32))
            .unwrap();
        let col = reg.resolve(lens).unwrap();
        assert_eq!(col.int_at(0), Some(5));
        assert_eq!(col.int_at(1), None);
        assert_eq!(i32::get(i32::values(col.data()).unwrap(), 1), None);
        assert_eq!(i32::values(col.data()).unwrap()[1], INT_NIL);

        let n = reg.keep(Column::from_ints(0, [Some(1), Some(4), None]));
        let big = d.map2(&LEN, Arg::column(n), Arg::value(&2), |_: &mut ScratchBuffer, v: &i32, t: &i32| Ok(v > t)).unwrap();
        let col = reg.resolve(big).unwrap();
        assert_eq!((col.bit_at(0), col.bit_at(1), col.bit_at(2)), (Some(false), Some(true), None));
    }

    #[test]
    fn wrong_types_and_constant_only_calls_are_rejected() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let ints = reg.keep(Column::from_ints(0, [Some(1)]));
        let err = d.map1(&UPPER, Arg::column(ints), upper).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert_eq!(reg.fix_count(ints), 0);
        let err = d.map1(&UPPER, Arg::value("x"), upper).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }

    #[test]
    fn select_returns_qualifying_row_ids() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let spec = OpSpec::new("test.select").scratch(0);
        let a = strs(&reg, 5, &[Some("ax"), None, Some("b"), Some("ay")]);
        let hits = d.select::<str, _>(&spec, BatArg { bat: a, cand: None }, |s| s.starts_with('a')).unwrap();
        let col = reg.resolve(hits).unwrap();
        assert_eq!(col.oids().unwrap(), vec![5, 8]);
        assert!(col.props().sorted && col.props().key);

        let cands = reg.keep(Column::candidates(vec![5, 6, 8]).unwrap());
        let misses = d
            .select::<str, _>(&spec, BatArg { bat: a, cand: Some(cands) }, |s| !s.starts_with('a'))
            .unwrap();
        assert_eq!(reg.resolve(misses).unwrap().oids().unwrap(), Vec::<Oid>::new());
    }

    #[test]
    fn join_pairs_matching_rows() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let spec = OpSpec::new("test.join").scratch(0);
        let l = strs(&reg, 0, &[Some("apple"), Some("banana"), None, Some("avocado")]);
        let r = strs(&reg, 10, &[Some("a"), None, Some("b"), Some("z")]);
        let all = |b| BatArg { bat: b, cand: None };
        let j = d.join::<str, _>(&spec, all(l), all(r), true, |v, p| v.starts_with(p)).unwrap();
        let right = j.right.unwrap();
        assert_eq!(reg.resolve(j.left).unwrap().oids().unwrap(), vec![0, 3, 1]);
        assert_eq!(reg.resolve(right).unwrap().oids().unwrap(), vec![10, 10, 12]);
        assert_eq!((reg.fix_count(l), reg.fix_count(r)), (0, 0));

        // nil rows stay out of anti joins as well
        let cands = reg.keep(Column::candidates(vec![1, 2, 3]).unwrap());
        let j = d
            .join::<str, _>(&spec, BatArg { bat: l, cand: Some(cands) }, all(r), false, |v, p| !v.starts_with(p))
            .unwrap();
        assert!(j.right.is_none());
        assert_eq!(reg.resolve(j.left).unwrap().oids().unwrap(), vec![1, 3, 1, 3]);
    }

    #[test]
    fn join_checks_the_context_between_outer_rows() {
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded().check_step(2);
        let d = Dispatcher::new(&reg, &ctx);
        let spec = OpSpec::new("test.join").scratch(0);
        let l = strs(&reg, 0, &[Some("x"); 2]);
        let r = strs(&reg, 0, &[Some("x"); 3]);
        let all = |b| BatArg { bat: b, cand: None };
        ctx.cancel_handle().cancel();
        let err = d.join::<str, _>(&spec, all(l), all(r), true, |v, p| v == p).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(reg.len(), 2);

        // one outer row never reaches a check
        let one = strs(&reg, 0, &[Some("x")]);
        assert!(d.join::<str, _>(&spec, all(l), all(one), true, |v, p| v == p).is_ok());
    }
}
