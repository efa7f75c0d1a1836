//! Operator registry built once at engine startup.

use std::collections::BTreeMap;
use std::fmt;

use batcol_exec::{Arg, BatArg, Dispatcher, ExecError, ExecResult, Joined};
use batcol_storage::{ColumnId, LogicalType};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ops::{self, Match};
use LogicalType::{Bit, Int, Oid, Str};

/// Constant operand value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scalar {
    /// String.
    Str(String),
    /// Integer.
    Int(i32),
    /// Boolean.
    Bit(bool),
    /// Nil of whatever type the parameter has.
    Nil,
}

/// Dynamically typed operator argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Column with optional candidate list.
    Column(BatArg),
    /// Constant.
    Const(Scalar),
}

/// Declared parameter and result types of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signature {
    /// Operator name.
    pub name: &'static str,
    /// Parameter types.
    pub params: &'static [LogicalType],
    /// Result column type; `oid` for candidate lists and joins.
    pub result: LogicalType,
    /// Number of result columns: two for the pair-producing joins.
    pub outputs: usize,
}

/// Columns produced by one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    /// The result column of a map or select.
    Column(ColumnId),
    /// Row ids of a join.
    Join(Joined),
}

impl Output {
    /// The single result column, or the left row ids of a join.
    pub fn primary(&self) -> ColumnId {
        match self {
            Output::Column(id) => *id,
            Output::Join(j) => j.left,
        }
    }

    /// Every column produced, left row ids first.
    pub fn ids(&self) -> impl Iterator<Item = ColumnId> {
        let second = match self {
            Output::Column(_) => None,
            Output::Join(j) => j.right,
        };
        std::iter::once(self.primary()).chain(second)
    }
}

/// Operands of one call, with typed accessors.
#[derive(Debug, Clone, Copy)]
pub struct Args<'o> {
    name: &'static str,
    operands: &'o [Operand],
}

impl<'o> Args<'o> {
    fn operand(&self, i: usize) -> ExecResult<&'o Operand> {
        self.operands
            .get(i)
            .ok_or_else(|| ExecError::illegal(self.name, format!("missing argument {}", i + 1)))
    }

    fn mismatch(&self, i: usize, ty: LogicalType) -> ExecError {
        ExecError::illegal(self.name, format!("argument {} must be of type {ty}", i + 1))
    }

    /// String argument.
    pub fn str(&self, i: usize) -> ExecResult<Arg<'o, str>> {
        match self.operand(i)? {
            Operand::Column(b) => Ok(Arg::Column(*b)),
            Operand::Const(Scalar::Str(s)) => Ok(Arg::Const(s.as_str())),
            Operand::Const(Scalar::Nil) => Ok(Arg::nil()),
            Operand::Const(_) => Err(self.mismatch(i, LogicalType::Str)),
        }
    }

    /// Integer argument.
    pub fn int(&self, i: usize) -> ExecResult<Arg<'o, i32>> {
        match self.operand(i)? {
            Operand::Column(b) => Ok(Arg::Column(*b)),
            Operand::Const(Scalar::Int(v)) => Ok(Arg::Const(v)),
            Operand::Const(Scalar::Nil) => Ok(Arg::nil()),
            Operand::Const(_) => Err(self.mismatch(i, LogicalType::Int)),
        }
    }

    /// Bit argument.
    pub fn bit(&self, i: usize) -> ExecResult<Arg<'o, i8>> {
        match self.operand(i)? {
            Operand::Column(b) => Ok(Arg::Column(*b)),
            Operand::Const(Scalar::Bit(v)) => Ok(Arg::Const(if *v { &1 } else { &0 })),
            Operand::Const(Scalar::Nil) => Ok(Arg::nil()),
            Operand::Const(_) => Err(self.mismatch(i, LogicalType::Bit)),
        }
    }

    /// Column argument.
    pub fn column(&self, i: usize) -> ExecResult<BatArg> {
        match self.operand(i)? {
            Operand::Column(b) => Ok(*b),
            Operand::Const(_) => Err(ExecError::illegal(self.name, format!("argument {} must be a column", i + 1))),
        }
    }

    /// Constant string; `None` for nil.
    pub fn const_str(&self, i: usize) -> ExecResult<Option<&'o str>> {
        match self.operand(i)? {
            Operand::Const(Scalar::Str(s)) => Ok(Some(s.as_str())),
            Operand::Const(Scalar::Nil) => Ok(None),
            _ => Err(self.mismatch(i, LogicalType::Str)),
        }
    }

    /// Constant bit; `None` for nil.
    pub fn const_bit(&self, i: usize) -> ExecResult<Option<bool>> {
        match self.operand(i)? {
            Operand::Const(Scalar::Bit(v)) => Ok(Some(*v)),
            Operand::Const(Scalar::Nil) => Ok(None),
            _ => Err(self.mismatch(i, LogicalType::Bit)),
        }
    }
}

/// Operator implementation over dynamic operands.
pub type Imp = fn(&Dispatcher<'_>, Args<'_>) -> ExecResult<ColumnId>;

/// Join implementation over dynamic operands.
pub type JoinImp = fn(&Dispatcher<'_>, Args<'_>) -> ExecResult<Joined>;

#[derive(Clone, Copy)]
enum Body {
    Column(Imp),
    Join(JoinImp),
}

/// A registered operator.
#[derive(Clone, Copy)]
pub struct OperatorDef {
    /// Declared types.
    pub signature: Signature,
    body: Body,
}

impl fmt::Debug for OperatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorDef").field("signature", &self.signature).finish_non_exhaustive()
    }
}

/// Register `pairs(l, r[, icase], anti)` producing both sides and
/// `left(l, r[, icase], anti)` producing left row ids only.
macro_rules! joins {
    ($t:ident, $pairs:literal, $left:literal, $how:expr) => {
        $t.register_join($pairs, &[Str, Str, Bit], 2, |d, a| {
            ops::string_join(d, $how, a.column(0)?, a.column(1)?, Some(false), a.const_bit(2)?, true)
        });
        $t.register_join($pairs, &[Str, Str, Bit, Bit], 2, |d, a| {
            ops::string_join(d, $how, a.column(0)?, a.column(1)?, a.const_bit(2)?, a.const_bit(3)?, true)
        });
        $t.register_join($left, &[Str, Str, Bit], 1, |d, a| {
            ops::string_join(d, $how, a.column(0)?, a.column(1)?, Some(false), a.const_bit(2)?, false)
        });
        $t.register_join($left, &[Str, Str, Bit, Bit], 1, |d, a| {
            ops::string_join(d, $how, a.column(0)?, a.column(1)?, a.const_bit(2)?, a.const_bit(3)?, false)
        });
    };
}

/// Name and arity keyed operator registry.
#[derive(Debug, Default)]
pub struct FunctionTable {
    ops: BTreeMap<&'static str, BTreeMap<usize, OperatorDef>>,
}

impl FunctionTable {
    /// Table with every string operator registered.
    pub fn startup() -> Self {
        let mut t = Self::default();
        t.register("batstr.length", &[Str], Int, |d, a| ops::length(d, a.str(0)?));
        t.register("batstr.bytes", &[Str], Int, |d, a| ops::bytes(d, a.str(0)?));
        t.register("batstr.ascii", &[Str], Int, |d, a| ops::ascii(d, a.str(0)?));
        t.register("batstr.unicode", &[Int], Str, |d, a| ops::unicode(d, a.int(0)?));
        t.register("batstr.unicodeAt", &[Str, Int], Int, |d, a| ops::unicode_at(d, a.str(0)?, a.int(1)?));
        t.register("batstr.space", &[Int], Str, |d, a| ops::space(d, a.int(0)?));
        t.register("batstr.lower", &[Str], Str, |d, a| ops::lower(d, a.str(0)?));
        t.register("batstr.upper", &[Str], Str, |d, a| ops::upper(d, a.str(0)?));
        t.register("batstr.reverse", &[Str], Str, |d, a| ops::reverse(d, a.str(0)?));
        t.register("batstr.asciify", &[Str], Str, |d, a| ops::asciify(d, a.str(0)?));
        t.register("batstr.strip", &[Str], Str, |d, a| ops::strip(d, a.str(0)?));
        t.register("batstr.ltrim", &[Str], Str, |d, a| ops::ltrim(d, a.str(0)?));
        t.register("batstr.rtrim", &[Str], Str, |d, a| ops::rtrim(d, a.str(0)?));
        t.register("batstr.strip2", &[Str, Str], Str, |d, a| ops::strip2(d, a.str(0)?, a.str(1)?));
        t.register("batstr.ltrim2", &[Str, Str], Str, |d, a| ops::ltrim2(d, a.str(0)?, a.str(1)?));
        t.register("batstr.rtrim2", &[Str, Str], Str, |d, a| ops::rtrim2(d, a.str(0)?, a.str(1)?));
        t.register("batstr.lpad", &[Str, Int], Str, |d, a| ops::lpad(d, a.str(0)?, a.int(1)?));
        t.register("batstr.rpad", &[Str, Int], Str, |d, a| ops::rpad(d, a.str(0)?, a.int(1)?));
        t.register("batstr.lpad3", &[Str, Int, Str], Str, |d, a| ops::lpad3(d, a.str(0)?, a.int(1)?, a.str(2)?));
        t.register("batstr.rpad3", &[Str, Int, Str], Str, |d, a| ops::rpad3(d, a.str(0)?, a.int(1)?, a.str(2)?));
        t.register("batstr.prefix", &[Str, Int], Str, |d, a| ops::prefix(d, a.str(0)?, a.int(1)?));
        t.register("batstr.suffix", &[Str, Int], Str, |d, a| ops::suffix(d, a.str(0)?, a.int(1)?));
        t.register("batstr.tail", &[Str, Int], Str, |d, a| ops::tail(d, a.str(0)?, a.int(1)?));
        t.register("batstr.substring", &[Str, Int], Str, |d, a| ops::substring_tail(d, a.str(0)?, a.int(1)?));
        t.register("batstr.substring", &[Str, Int, Int], Str, |d, a| {
            ops::substring(d, a.str(0)?, a.int(1)?, a.int(2)?)
        });
        t.register("batstr.repeat", &[Str, Int], Str, |d, a| ops::repeat(d, a.str(0)?, a.int(1)?));
        t.register("batstr.splitpart", &[Str, Str, Int], Str, |d, a| {
            ops::splitpart(d, a.str(0)?, a.str(1)?, a.int(2)?)
        });
        t.register("batstr.substitute", &[Str, Str, Str, Bit], Str, |d, a| {
            ops::substitute(d, a.str(0)?, a.str(1)?, a.str(2)?, a.bit(3)?)
        });
        t.register("batstr.replace", &[Str, Str, Str], Str, |d, a| ops::replace(d, a.str(0)?, a.str(1)?, a.str(2)?));
        t.register("batstr.insert", &[Str, Int, Int, Str], Str, |d, a| {
            ops::insert(d, a.str(0)?, a.int(1)?, a.int(2)?, a.str(3)?)
        });
        t.register("batstr.startsWith", &[Str, Str], Bit, |d, a| ops::starts_with(d, a.str(0)?, a.str(1)?));
        t.register("batstr.startsWith", &[Str, Str, Bit], Bit, |d, a| {
            ops::starts_with_icase(d, a.str(0)?, a.str(1)?, a.bit(2)?)
        });
        t.register("batstr.endsWith", &[Str, Str], Bit, |d, a| ops::ends_with(d, a.str(0)?, a.str(1)?));
        t.register("batstr.endsWith", &[Str, Str, Bit], Bit, |d, a| {
            ops::ends_with_icase(d, a.str(0)?, a.str(1)?, a.bit(2)?)
        });
        t.register("batstr.contains", &[Str, Str], Bit, |d, a| ops::contains(d, a.str(0)?, a.str(1)?));
        t.register("batstr.contains", &[Str, Str, Bit], Bit, |d, a| {
            ops::contains_icase(d, a.str(0)?, a.str(1)?, a.bit(2)?)
        });
        t.register("batstr.search", &[Str, Str], Int, |d, a| ops::search(d, a.str(0)?, a.str(1)?));
        t.register("batstr.search", &[Str, Str, Bit], Int, |d, a| {
            ops::search_icase(d, a.str(0)?, a.str(1)?, a.bit(2)?)
        });
        t.register("batstr.r_search", &[Str, Str], Int, |d, a| ops::r_search(d, a.str(0)?, a.str(1)?));
        t.register("batstr.r_search", &[Str, Str, Bit], Int, |d, a| {
            ops::r_search_icase(d, a.str(0)?, a.str(1)?, a.bit(2)?)
        });
        t.register("batstr.locate", &[Str, Str], Int, |d, a| ops::locate(d, a.str(0)?, a.str(1)?));
        t.register("batstr.locate", &[Str, Str, Int], Int, |d, a| {
            ops::locate_from(d, a.str(0)?, a.str(1)?, a.int(2)?)
        });
        t.register("batstr.startswithselect", &[Str, Str, Bit, Bit], Oid, |d, a| {
            ops::string_select(d, Match::Prefix, a.column(0)?, a.const_str(1)?, a.const_bit(2)?, a.const_bit(3)?)
        });
        t.register("batstr.endswithselect", &[Str, Str, Bit, Bit], Oid, |d, a| {
            ops::string_select(d, Match::Suffix, a.column(0)?, a.const_str(1)?, a.const_bit(2)?, a.const_bit(3)?)
        });
        t.register("batstr.containsselect", &[Str, Str, Bit, Bit], Oid, |d, a| {
            ops::string_select(d, Match::Substring, a.column(0)?, a.const_str(1)?, a.const_bit(2)?, a.const_bit(3)?)
        });
        joins!(t, "batstr.startswithjoin", "batstr.startswithjoin1", Match::Prefix);
        joins!(t, "batstr.endswithjoin", "batstr.endswithjoin1", Match::Suffix);
        joins!(t, "batstr.containsjoin", "batstr.containsjoin1", Match::Substring);
        info!(operators = t.len(), "function table ready");
        t
    }

    /// Register an operator, replacing any previous one of the same name and arity.
    pub fn register(&mut self, name: &'static str, params: &'static [LogicalType], result: LogicalType, imp: Imp) {
        self.insert(Signature { name, params, result, outputs: 1 }, Body::Column(imp));
    }

    /// Register a join producing left row ids, plus right row ids when
    /// `outputs` is 2.
    pub fn register_join(&mut self, name: &'static str, params: &'static [LogicalType], outputs: usize, imp: JoinImp) {
        self.insert(Signature { name, params, result: Oid, outputs }, Body::Join(imp));
    }

    fn insert(&mut self, signature: Signature, body: Body) {
        self.ops
            .entry(signature.name)
            .or_default()
            .insert(signature.params.len(), OperatorDef { signature, body });
    }

    /// Operator by name and arity.
    pub fn lookup(&self, name: &str, arity: usize) -> Option<&OperatorDef> {
        self.ops.get(name)?.get(&arity)
    }

    /// All signatures in name order.
    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.ops.values().flat_map(BTreeMap::values).map(|def| &def.signature)
    }

    /// Number of registered operators.
    pub fn len(&self) -> usize {
        self.ops.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Invoke `name` with `operands`.
    pub fn call(&self, d: &Dispatcher<'_>, name: &str, operands: &[Operand]) -> ExecResult<Output> {
        let def = self.lookup(name, operands.len()).ok_or_else(|| {
            ExecError::illegal("batstr", format!("no operator {name} taking {} arguments", operands.len()))
        })?;
        let args = Args { name: def.signature.name, operands };
        match def.body {
            Body::Column(imp) => imp(d, args).map(Output::Column),
            Body::Join(imp) => imp(d, args).map(Output::Join),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcol_exec::{ErrorKind, QueryContext};
    use batcol_storage::{Column, ColumnRegistry};

    fn col(reg: &ColumnRegistry, values: &[Option<&str>]) -> Operand {
        let id = reg.keep(Column::from_strs(0, values.iter().copied()).unwrap());
        Operand::Column(BatArg { bat: id, cand: None })
    }

    #[test]
    fn startup_registers_every_operator() {
        let t = FunctionTable::startup();
        assert!(t.len() >= 40);
        assert!(t.lookup("batstr.substring", 2).is_some());
        assert!(t.lookup("batstr.substring", 3).is_some());
        assert!(t.lookup("batstr.substring", 4).is_none());
        let sig = t.lookup("batstr.substitute", 4).unwrap().signature;
        assert_eq!(sig.params, &[Str, Str, Str, Bit]);
        assert_eq!(sig.result, Str);
    }

    #[test]
    fn lookup_by_name_and_arity() {
        let t = FunctionTable::startup();
        let name = String::from("batstr.containsjoin");
        assert_eq!(t.lookup(&name, 3).unwrap().signature.outputs, 2);
        assert_eq!(t.lookup("batstr.containsjoin1", 4).unwrap().signature.outputs, 1);
        assert_eq!(t.lookup("batstr.asciify", 1).unwrap().signature.result, Str);
        assert!(t.lookup("batstr.containsjoin", 5).is_none());
        assert!(t.lookup("batstr.nope", 1).is_none());
        let keys: Vec<_> = t.signatures().map(|s| (s.name, s.params.len())).collect();
        assert_eq!(keys.len(), t.len());
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn joins_return_pairs_or_left_ids() {
        let t = FunctionTable::startup();
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let l = col(&reg, &[Some("Hello"), Some("world"), None]);
        let r = col(&reg, &[Some("he"), Some("WO"), None]);
        let bit = |b| Operand::Const(Scalar::Bit(b));

        let out = t.call(&d, "batstr.startswithjoin", &[l.clone(), r.clone(), bit(true), bit(false)]).unwrap();
        let Output::Join(j) = out else {
            panic!("expected join output, got {out:?}");
        };
        assert_eq!(reg.resolve(j.left).unwrap().oids().unwrap(), vec![0, 1]);
        assert_eq!(reg.resolve(j.right.unwrap()).unwrap().oids().unwrap(), vec![0, 1]);

        let out = t.call(&d, "batstr.startswithjoin1", &[l.clone(), r.clone(), bit(false)]).unwrap();
        assert_eq!(out.ids().count(), 1);
        assert!(reg.resolve(out.primary()).unwrap().oids().unwrap().is_empty());

        let err = t.call(&d, "batstr.containsjoin", &[l, r, Operand::Const(Scalar::Nil), bit(false)]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        assert_eq!(err.operator, "batstr.containsjoin");
    }

    #[test]
    fn call_with_mixed_operands() {
        let t = FunctionTable::startup();
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let s = col(&reg, &[Some("hello"), None, Some("world")]);
        let out = t
            .call(&d, "batstr.substring", &[s, Operand::Const(Scalar::Int(2)), Operand::Const(Scalar::Int(3))])
            .unwrap()
            .primary();
        let out = reg.resolve(out).unwrap();
        assert_eq!((out.str_at(0), out.str_at(1), out.str_at(2)), (Some("ell"), None, Some("orl")));
    }

    #[test]
    fn call_rejects_bad_arity_and_types() {
        let t = FunctionTable::startup();
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let s = col(&reg, &[Some("a")]);
        let err = t.call(&d, "batstr.lower", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
        let err = t.call(&d, "batstr.repeat", &[s.clone(), Operand::Const(Scalar::Str("x".into()))]).unwrap_err();
        assert_eq!(err.operator, "batstr.repeat");
        assert_eq!(err.message, "argument 2 must be of type int");
        let err = t
            .call(
                &d,
                "batstr.startswithselect",
                &[s, Operand::Const(Scalar::Nil), Operand::Const(Scalar::Bit(false)), Operand::Const(Scalar::Bit(false))],
            )
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }

    #[test]
    fn nil_constant_propagates() {
        let t = FunctionTable::startup();
        let reg = ColumnRegistry::new();
        let ctx = QueryContext::unbounded();
        let d = Dispatcher::new(&reg, &ctx);
        let s = col(&reg, &[Some("ab"), Some("cd")]);
        let out = t.call(&d, "batstr.repeat", &[s, Operand::Const(Scalar::Nil)]).unwrap().primary();
        let out = reg.resolve(out).unwrap();
        assert_eq!((out.str_at(0), out.str_at(1)), (None, None));
        assert!(out.props().nil);
    }
}
