//! Process host for one supervised Lua worker script.
//!
//! Startup sequence:
//! 1. Build the single-threaded reactor and register its error callback
//! 2. Create the Lua state, pin module search paths, pause the collector
//! 3. Load `script/main.lua` and resume it once
//! 4. On suspension or completion: arm signal dispositions, restart the
//!    collector, run the reactor until a terminate signal exits the process
//! 5. On any startup error: log it, release the engine, exit 255
//!
//! Allocation failures never surface: the binary installs
//! [`resilient_alloc::ResilientAllocator`] as the global allocator, which
//! backs both tokio and the Lua state.

pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod log;
pub mod modules;
pub mod reactor;
pub mod signals;

pub use config::HostConfig;
pub use engine::{ScriptHost, StartupOutcome};
pub use error::{HostError, HostResult};
pub use lifecycle::LifecycleDriver;
pub use reactor::Reactor;
pub use signals::{HostSignal, Policy, SignalDispositionTable};

/// Exit status of every fatal path, terminate signals included.
pub const EXIT_FATAL: u8 = 255;
