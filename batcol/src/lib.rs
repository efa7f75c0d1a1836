#![deny(missing_docs)]
#![doc = "batcol engine: column registry and string operators behind one handle."]

pub mod literal;

pub use batcol_exec::{Arg, BatArg, Dispatcher, EngineConfig, ErrorKind, ExecError, ExecResult, Joined, QueryContext};
pub use batcol_storage::{Column, ColumnId, ColumnRegistry, LogicalType};
pub use batcol_str::{FunctionTable, Operand, Output, Scalar, Signature};

use tracing::info;

/// Process-wide engine state, built once at startup.
#[derive(Debug)]
pub struct Engine {
    columns: ColumnRegistry,
    functions: FunctionTable,
    config: EngineConfig,
}

impl Engine {
    /// Build the column registry and operator table.
    pub fn start(config: EngineConfig) -> Self {
        let functions = FunctionTable::startup();
        info!(
            operators = functions.len(),
            timeout_ms = ?config.query_timeout_ms,
            "engine started"
        );
        Self { columns: ColumnRegistry::new(), functions, config }
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Shared columns.
    pub fn columns(&self) -> &ColumnRegistry {
        &self.columns
    }

    /// Registered operators.
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Fresh query context honoring the configured timeout.
    pub fn context(&self) -> QueryContext {
        self.config.query_context()
    }

    /// Dispatcher bound to this engine's columns.
    pub fn dispatcher<'e>(&'e self, ctx: &'e QueryContext) -> Dispatcher<'e> {
        Dispatcher::new(&self.columns, ctx)
    }

    /// Invoke operator `name` under a fresh query context.
    pub fn call(&self, name: &str, operands: &[Operand]) -> ExecResult<Output> {
        let ctx = self.context();
        self.call_in(&ctx, name, operands)
    }

    /// Invoke operator `name` under `ctx`.
    pub fn call_in(&self, ctx: &QueryContext, name: &str, operands: &[Operand]) -> ExecResult<Output> {
        self.functions.call(&self.dispatcher(ctx), name, operands)
    }

    /// Drop the caller's reference to a column.
    pub fn release(&self, id: ColumnId) -> ExecResult<()> {
        self.columns.release(id).map_err(|e| ExecError::storage("engine.release", e))
    }

    /// Drop the caller's references to every column of `out`.
    pub fn release_output(&self, out: &Output) -> ExecResult<()> {
        out.ids().try_for_each(|id| self.release(id))
    }

    /// Tear down the registry, returning how many columns were still held.
    pub fn shutdown(self) -> usize {
        let left = self.columns.teardown();
        info!(columns = left, "engine stopped");
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_call_shutdown() {
        let engine = Engine::start(EngineConfig::default());
        let id = engine.columns().keep(Column::from_strs(0, [Some("Ab"), None]).unwrap());
        let out = engine.call("batstr.upper", &[Operand::Column(BatArg { bat: id, cand: None })]).unwrap().primary();
        {
            let col = engine.columns().resolve(out).unwrap();
            assert_eq!((col.str_at(0), col.str_at(1)), (Some("AB"), None));
        }
        engine.release(out).unwrap();
        assert!(!engine.columns().contains(out));
        assert_eq!(engine.shutdown(), 1);
    }

    #[test]
    fn join_outputs_are_released_together() {
        let engine = Engine::start(EngineConfig::default());
        let l = engine.columns().keep(Column::from_strs(0, [Some("abc"), Some("xbz")]).unwrap());
        let r = engine.columns().keep(Column::from_strs(0, [Some("b")]).unwrap());
        let operands = [
            Operand::Column(BatArg { bat: l, cand: None }),
            Operand::Column(BatArg { bat: r, cand: None }),
            Operand::Const(Scalar::Bit(false)),
        ];
        let out = engine.call("batstr.containsjoin", &operands).unwrap();
        assert_eq!(out.ids().count(), 2);
        assert_eq!(engine.columns().len(), 4);
        engine.release_output(&out).unwrap();
        assert_eq!(engine.shutdown(), 2);
    }

    #[test]
    fn unknown_operator() {
        let engine = Engine::start(EngineConfig::default());
        let err = engine.call("batstr.nope", &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IllegalArgument);
    }
}
