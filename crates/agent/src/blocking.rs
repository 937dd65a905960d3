//! Synchronous entry points.
//!
//! Every call builds a fresh current-thread runtime and drops it before
//! returning. Remote sessions opened on that runtime die with it; hosts detect
//! the stale handle and reconnect on the next call.

use proctor_core::error::{Error, Result};
use std::future::Future;

/// Drive `future` to completion on a runtime that lives for this call only.
///
/// Must not be called from inside an async context.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build runtime: {e}")))?;
    Ok(runtime.block_on(future))
}
