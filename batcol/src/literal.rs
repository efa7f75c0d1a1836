//! JSON literals for operands and results.
//!
//! An array is a column, an object `{"col": [...], "cand": [...]}` is a
//! column restricted by a candidate list, any other value is a constant.
//! Column element types follow the first non-null element: strings, integers
//! or booleans. An all-null or empty column is a string column.

use batcol_storage::{Column, ColumnData, ColumnId, ColumnRegistry, LogicalType, Oid, StorageError};
use batcol_str::{Operand, Output, Scalar};
use serde_json::{Map, Value};

use crate::BatArg;

/// Literal conversion failures.
#[derive(Debug, thiserror::Error)]
pub enum LiteralError {
    /// Element does not fit the column's type.
    #[error("element {pos} is not of type {expected}")]
    Mixed {
        /// Position in the array.
        pos: usize,
        /// Type set by the first non-null element.
        expected: LogicalType,
    },
    /// Value cannot be expressed as an operand.
    #[error("unsupported literal: {0}")]
    Unsupported(String),
    /// Column could not be built.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Columns created while converting operands. Released on drop.
#[derive(Debug)]
pub struct Temporaries<'r> {
    columns: &'r ColumnRegistry,
    ids: Vec<ColumnId>,
}

impl<'r> Temporaries<'r> {
    /// Empty set bound to `columns`.
    pub fn new(columns: &'r ColumnRegistry) -> Self {
        Self { columns, ids: Vec::new() }
    }

    fn keep(&mut self, column: Column) -> ColumnId {
        let id = self.columns.keep(column);
        self.ids.push(id);
        id
    }

    /// Number of columns held.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Convert one JSON value into an operand.
    pub fn operand(&mut self, value: &Value) -> Result<Operand, LiteralError> {
        match value {
            Value::Array(items) => {
                let bat = self.keep(column(items)?);
                Ok(Operand::Column(BatArg { bat, cand: None }))
            }
            Value::Object(fields) => self.filtered(fields),
            _ => scalar(value).map(Operand::Const),
        }
    }

    fn filtered(&mut self, fields: &Map<String, Value>) -> Result<Operand, LiteralError> {
        let items = match fields.get("col") {
            Some(Value::Array(items)) => items,
            _ => return Err(LiteralError::Unsupported("object without a `col` array".into())),
        };
        let hseqbase = match fields.get("hseqbase") {
            None => 0,
            Some(v) => v.as_u64().ok_or_else(|| LiteralError::Unsupported(format!("hseqbase {v}")))?,
        };
        let cand = match fields.get("cand") {
            None | Some(Value::Null) => None,
            Some(Value::Array(oids)) => {
                let oids = oids
                    .iter()
                    .map(|v| v.as_u64().ok_or_else(|| LiteralError::Unsupported(format!("candidate {v}"))))
                    .collect::<Result<Vec<Oid>, _>>()?;
                Some(self.keep(Column::candidates(oids)?))
            }
            Some(v) => return Err(LiteralError::Unsupported(format!("candidates {v}"))),
        };
        let bat = self.keep(column(items)?.with_hseqbase(hseqbase));
        Ok(Operand::Column(BatArg { bat, cand }))
    }
}

impl Drop for Temporaries<'_> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            // Already gone only if someone else released it.
            let _ = self.columns.release(id);
        }
    }
}

fn int(v: &Value) -> Option<i32> {
    v.as_i64().and_then(|n| i32::try_from(n).ok()).filter(|n| *n != i32::MIN)
}

/// Constant operand from a non-container JSON value.
pub fn scalar(value: &Value) -> Result<Scalar, LiteralError> {
    match value {
        Value::Null => Ok(Scalar::Nil),
        Value::Bool(b) => Ok(Scalar::Bit(*b)),
        Value::String(s) => Ok(Scalar::Str(s.clone())),
        Value::Number(_) => int(value)
            .map(Scalar::Int)
            .ok_or_else(|| LiteralError::Unsupported(value.to_string())),
        _ => Err(LiteralError::Unsupported(value.to_string())),
    }
}

/// Column from a JSON array.
pub fn column(items: &[Value]) -> Result<Column, LiteralError> {
    let ty = match items.iter().find(|v| !v.is_null()) {
        None | Some(Value::String(_)) => LogicalType::Str,
        Some(Value::Bool(_)) => LogicalType::Bit,
        Some(Value::Number(_)) => LogicalType::Int,
        Some(other) => return Err(LiteralError::Unsupported(other.to_string())),
    };
    let mixed = |pos| LiteralError::Mixed { pos, expected: ty };
    let column = match ty {
        LogicalType::Str => {
            let values = items
                .iter()
                .enumerate()
                .map(|(pos, v)| match v {
                    Value::Null => Ok(None),
                    Value::String(s) => Ok(Some(s.as_str())),
                    _ => Err(mixed(pos)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Column::from_strs(0, values)?
        }
        LogicalType::Int => {
            let values = items
                .iter()
                .enumerate()
                .map(|(pos, v)| if v.is_null() { Ok(None) } else { int(v).map(Some).ok_or_else(|| mixed(pos)) })
                .collect::<Result<Vec<_>, _>>()?;
            Column::from_ints(0, values)
        }
        _ => {
            let values = items
                .iter()
                .enumerate()
                .map(|(pos, v)| if v.is_null() { Ok(None) } else { v.as_bool().map(Some).ok_or_else(|| mixed(pos)) })
                .collect::<Result<Vec<_>, _>>()?;
            Column::from_bits(0, values)
        }
    };
    Ok(column)
}

/// JSON rendering of a result column. Candidate lists render as their oids.
pub fn render(column: &Column) -> Value {
    let n = column.len();
    match column.data() {
        ColumnData::Str(_) => (0..n).map(|i| column.str_at(i).map_or(Value::Null, Value::from)).collect(),
        ColumnData::Int(_) => (0..n).map(|i| column.int_at(i).map_or(Value::Null, Value::from)).collect(),
        ColumnData::Bit(_) => (0..n).map(|i| column.bit_at(i).map_or(Value::Null, Value::from)).collect(),
        _ => column.oids().unwrap_or_default().into_iter().map(Value::from).collect(),
    }
}

/// JSON rendering of a call's result. A join with both sides renders as
/// `[left_ids, right_ids]`.
pub fn render_output(columns: &ColumnRegistry, out: &Output) -> Result<Value, StorageError> {
    let rendered = out
        .ids()
        .map(|id| columns.resolve(id).map(|col| render(&col)))
        .collect::<Result<Vec<_>, _>>()?;
    match <[Value; 1]>::try_from(rendered) {
        Ok([single]) => Ok(single),
        Err(both) => Ok(Value::Array(both)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_types_follow_first_value() {
        assert_eq!(column(&[json!(null), json!("a")]).unwrap().logical_type(), LogicalType::Str);
        assert_eq!(column(&[json!(1), json!(null)]).unwrap().logical_type(), LogicalType::Int);
        assert_eq!(column(&[json!(true)]).unwrap().logical_type(), LogicalType::Bit);
        assert_eq!(column(&[]).unwrap().logical_type(), LogicalType::Str);
        assert!(matches!(column(&[json!("a"), json!(2)]), Err(LiteralError::Mixed { pos: 1, .. })));
    }

    #[test]
    fn scalars() {
        assert_eq!(scalar(&json!(null)).unwrap(), Scalar::Nil);
        assert_eq!(scalar(&json!(-3)).unwrap(), Scalar::Int(-3));
        assert!(scalar(&json!(1.5)).is_err());
        assert!(scalar(&json!(i64::from(i32::MAX) + 1)).is_err());
    }

    #[test]
    fn temporaries_are_released() {
        let reg = ColumnRegistry::new();
        {
            let mut tmp = Temporaries::new(&reg);
            let op = tmp.operand(&json!({"col": ["a", "b", "c"], "cand": [0, 2]})).unwrap();
            assert!(matches!(op, Operand::Column(BatArg { cand: Some(_), .. })));
            assert_eq!(tmp.len(), 2);
            assert_eq!(reg.len(), 2);
            assert!(tmp.operand(&json!({"col": ["a"], "cand": [2, 1]})).is_err());
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn join_pairs_render_side_by_side() {
        let reg = ColumnRegistry::new();
        let left = reg.keep(Column::candidates(vec![0, 2]).unwrap());
        let right = reg.keep(Column::candidates(vec![5, 6]).unwrap());
        let pairs = Output::Join(crate::Joined { left, right: Some(right) });
        assert_eq!(render_output(&reg, &pairs).unwrap(), json!([[0, 2], [5, 6]]));
        let single = Output::Join(crate::Joined { left, right: None });
        assert_eq!(render_output(&reg, &single).unwrap(), json!([0, 2]));
        assert!(render_output(&reg, &Output::Column(ColumnId(99))).is_err());
    }

    #[test]
    fn renders_nil_as_null() {
        let col = Column::from_strs(0, [Some("x"), None]).unwrap();
        assert_eq!(render(&col), json!(["x", null]));
        assert_eq!(render(&Column::dense_candidates(3, 2)), json!([3, 4]));
    }
}
