//! Single-threaded reactor: a current-thread tokio runtime plus a `LocalSet`.
//!
//! The Lua state is `!Send`, so everything touching it (timers, signal
//! tasks, the entry coroutine) runs as local tasks on this one thread.

use std::convert::Infallible;
use std::future::Future;
use std::io;

use tokio::runtime::{Builder, Runtime};
use tokio::task::LocalSet;

use crate::log;

/// Receives reactor-level failures as plain messages.
pub type ErrorCallback = fn(&str);

pub struct Reactor {
    runtime: Runtime,
    local: LocalSet,
    on_error: ErrorCallback,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            local: LocalSet::new(),
            on_error: log::reactor_error,
        })
    }

    pub fn set_error_callback(&mut self, on_error: ErrorCallback) {
        self.on_error = on_error;
    }

    pub fn error_callback(&self) -> ErrorCallback {
        self.on_error
    }

    /// Run `future` on the reactor thread, inside the local set.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.local.block_on(&self.runtime, future)
    }
}

/// Park the current task forever while the local set keeps driving timers
/// and signal watchers. Only process exit ends it.
pub async fn run_forever() -> Infallible {
    loop {
        std::future::pending::<()>().await;
    }
}
