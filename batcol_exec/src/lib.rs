//! Vectorized bulk operator execution.
//!
//! Every bulk operator follows the same protocol: resolve its column
//! operands, check that co-iterated candidate lists line up, allocate the
//! result, pick the dense or general iteration path once, loop with nil
//! propagation and a reused scratch buffer, finalize and hand the result to
//! the caller. [`Dispatcher`] implements the protocol once for any mix of
//! column and constant arguments.
#![deny(missing_docs)]

pub mod cand;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod finalize;
pub mod scratch;

pub use cand::{CandError, CandIter, CandKind};
pub use config::{EngineConfig, LogConfig};
pub use context::{CancelHandle, QueryContext, DEFAULT_CHECK_STEP};
pub use dispatch::{Arg, BatArg, Dispatcher, Emit, Joined, OpSpec, Produce};
pub use error::{ErrorKind, ExecError, ExecResult, KernelError, KernelResult};
pub use finalize::{FinalizeError, OutputColumn};
pub use scratch::{ScratchBuffer, CHAR_SCRATCH, SCRATCH_ALIGN, STR_SCRATCH};
