//! String operators over columns.
//!
//! [`kernels`] and [`search`] hold the per-row scalar functions, [`ops`]
//! lifts them into bulk operators through the shared dispatcher, and
//! [`FunctionTable`] names every operator for dynamic invocation.
#![deny(missing_docs)]

pub mod catalog;
pub mod kernels;
pub mod ops;
pub mod search;
pub mod text;

pub use catalog::{Args, FunctionTable, Imp, JoinImp, Operand, OperatorDef, Output, Scalar, Signature};
pub use ops::Match;
