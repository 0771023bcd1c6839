//! Blocking bridge onto async drivers (sqlx, AWS SDK).
//!
//! Workers are plain threads running synchronous poll loops; adapters whose
//! client libraries are async own one of these and `block_on` each call.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

#[derive(Debug, Clone)]
pub struct BlockingRuntime {
    inner: Arc<Runtime>,
}

impl BlockingRuntime {
    /// Build a small multi-threaded runtime dedicated to adapter IO.
    pub fn new(thread_name: &str) -> std::io::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name(thread_name)
            .enable_all()
            .build()?;
        Ok(Self {
            inner: Arc::new(runtime),
        })
    }

    /// Run `fut` to completion on the calling thread.
    ///
    /// Must not be called from inside an async context.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.inner.block_on(fut)
    }
}
