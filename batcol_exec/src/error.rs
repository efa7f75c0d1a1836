//! Invocation error taxonomy.

use batcol_storage::StorageError;

use crate::cand::CandError;
use crate::finalize::FinalizeError;

/// Result type alias for bulk operator invocations.
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Error kind of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A column or candidate list handle could not be resolved.
    ObjectMissing,
    /// Structural misuse of the operator.
    IllegalArgument,
    /// Buffer or column allocation failed.
    OutOfMemory,
    /// The kernel reported a failure.
    OperationFailed,
    /// The query deadline passed.
    Timeout,
    /// The query was cancelled.
    Cancelled,
}

impl ErrorKind {
    /// SQLSTATE reported for this kind.
    pub fn sqlstate(self) -> &'static str {
        match self {
            ErrorKind::ObjectMissing => "HY002",
            ErrorKind::IllegalArgument | ErrorKind::OperationFailed => "42000",
            ErrorKind::OutOfMemory => "HY013",
            ErrorKind::Timeout | ErrorKind::Cancelled => "HYT00",
        }
    }

    /// Short label used for metrics.
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::ObjectMissing => "object_missing",
            ErrorKind::IllegalArgument => "illegal_argument",
            ErrorKind::OutOfMemory => "out_of_memory",
            ErrorKind::OperationFailed => "operation_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// A failed invocation, tagged with the operator name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}:{}!{}", .operator, .kind.sqlstate(), .message)]
pub struct ExecError {
    /// Error kind.
    pub kind: ErrorKind,
    /// Operator that failed, e.g. `batstr.substring`.
    pub operator: &'static str,
    /// Diagnostic message.
    pub message: String,
}

impl ExecError {
    /// Construct an error of `kind`.
    pub fn new(kind: ErrorKind, operator: &'static str, message: impl Into<String>) -> Self {
        Self { kind, operator, message: message.into() }
    }

    /// Structural misuse.
    pub fn illegal(operator: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalArgument, operator, message)
    }

    /// Map a storage failure, keeping missing ids and allocation failures apart.
    pub fn storage(operator: &'static str, err: StorageError) -> Self {
        let kind = match err {
            StorageError::NotFound(_) => ErrorKind::ObjectMissing,
            StorageError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            StorageError::TypeMismatch { .. } | StorageError::Unsorted(_) => ErrorKind::IllegalArgument,
        };
        Self::new(kind, operator, err.to_string())
    }

    /// Map a kernel failure.
    pub fn kernel(operator: &'static str, err: KernelError) -> Self {
        let kind = match err {
            KernelError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            _ => ErrorKind::OperationFailed,
        };
        Self::new(kind, operator, err.to_string())
    }

    pub(crate) fn cand(operator: &'static str, err: CandError) -> Self {
        Self::illegal(operator, err.to_string())
    }

    pub(crate) fn finalize(operator: &'static str, err: FinalizeError) -> Self {
        Self::new(ErrorKind::OperationFailed, operator, err.to_string())
    }
}

/// Failure reported by a scalar kernel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Scratch buffer growth failed.
    #[error("could not allocate space for {bytes} bytes")]
    OutOfMemory {
        /// Requested size.
        bytes: usize,
    },
    /// Input is not a valid Unicode code point.
    #[error("Illegal Unicode code point")]
    IllegalCodePoint,
    /// Argument value outside the kernel's domain.
    #[error("{0}")]
    Domain(&'static str),
    /// A write went past the space reserved in the scratch buffer.
    #[error("write of {needed} bytes exceeds the {capacity} reserved")]
    Unreserved {
        /// Bytes the buffer would hold after the write.
        needed: usize,
        /// Reserved capacity.
        capacity: usize,
    },
}

/// Result type alias for kernels.
pub type KernelResult<T> = std::result::Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;
    use batcol_storage::ColumnId;

    #[test]
    fn display_carries_operator_and_state() {
        let err = ExecError::illegal("batstr.substring", "Requires columns of identical size");
        assert_eq!(err.to_string(), "batstr.substring:42000!Requires columns of identical size");
        let err = ExecError::storage("batstr.length", StorageError::NotFound(ColumnId(9)));
        assert_eq!(err.kind, ErrorKind::ObjectMissing);
        assert!(err.to_string().starts_with("batstr.length:HY002!"));
        let err = ExecError::kernel("batstr.unicode", KernelError::IllegalCodePoint);
        assert_eq!(err.kind, ErrorKind::OperationFailed);
        let err = ExecError::kernel("batstr.repeat", KernelError::OutOfMemory { bytes: 8 });
        assert_eq!(err.kind.sqlstate(), "HY013");
    }
}
