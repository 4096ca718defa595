//! Script engine bootstrap.
//!
//! One Lua state per process. Bring-up order:
//! 1. create the state with the full standard library
//! 2. define `null`/`NULL`, preload host modules, pin `package.path` and
//!    `package.cpath` to the fixed layout
//! 3. pause the collector; startup is a burst of short-lived allocations
//! 4. load the entry script
//! 5. resume its top-level coroutine exactly once and classify the result
//!
//! Every allocation of the state goes through the process global allocator,
//! so the binding to the resilient allocator cannot change during its life.

use std::path::Path;

use mlua::{LightUserData, Lua, LuaOptions, MultiValue, StdLib, Table, Thread, ThreadStatus, Value};
use tracing::{debug, info};

use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::modules;
use crate::reactor::ErrorCallback;

/// Result of the single start step of the entry script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// The script yielded: it registered asynchronous work and hands control
    /// to the reactor.
    Suspended,
    /// The script returned without yielding.
    CompletedSynchronously,
    /// The script raised an error; the message is the Lua error value.
    Failed(String),
}

pub struct ScriptHost {
    lua: Lua,
    entry: Option<Thread>,
    started: bool,
}

impl ScriptHost {
    pub fn new(config: &HostConfig, on_error: ErrorCallback) -> HostResult<Self> {
        // SAFETY: the full standard library (debug, package.loadlib, native
        // modules from package.cpath) is available to the entry script, which
        // ships with the deployment and is trusted like the host binary.
        let lua = unsafe { Lua::unsafe_new_with(StdLib::ALL, LuaOptions::new()) };

        install_globals(&lua)?;
        modules::preload(&lua, on_error)?;
        set_search_paths(&lua, config)?;
        lua.gc_stop();
        debug!("script engine created, collector paused");

        Ok(Self {
            lua,
            entry: None,
            started: false,
        })
    }

    /// Compile the entry script into the coroutine that [`start`](Self::start) resumes.
    pub fn load_entry(&mut self, path: &Path) -> HostResult<()> {
        let load_error = |message: String| HostError::Load {
            path: path.to_path_buf(),
            message,
        };
        let source = std::fs::read(path).map_err(|e| load_error(e.to_string()))?;
        let function = self
            .lua
            .load(source.as_slice())
            .set_name(format!("@{}", path.display()))
            .into_function()
            .map_err(|e| load_error(error_message(&e)))?;
        self.entry = Some(self.lua.create_thread(function)?);
        info!(path = %path.display(), "entry script loaded");
        Ok(())
    }

    /// Resume the entry coroutine once. Later calls are refused.
    pub fn start(&mut self) -> StartupOutcome {
        let Some(entry) = &self.entry else {
            return StartupOutcome::Failed("no entry script loaded".to_string());
        };
        if self.started {
            return StartupOutcome::Failed("entry script already started".to_string());
        }
        self.started = true;

        match entry.resume::<MultiValue>(()) {
            Err(e) => StartupOutcome::Failed(error_message(&e)),
            Ok(_) => match entry.status() {
                ThreadStatus::Resumable => StartupOutcome::Suspended,
                _ => StartupOutcome::CompletedSynchronously,
            },
        }
    }

    pub fn resume_collector(&self) {
        self.lua.gc_restart();
    }

    pub fn collector_running(&self) -> bool {
        self.lua.gc_is_running()
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        debug!("releasing script engine");
    }
}

/// Load and construct in one step, as the binary does.
pub fn bootstrap(config: &HostConfig, on_error: ErrorCallback) -> HostResult<ScriptHost> {
    let mut host = ScriptHost::new(config, on_error)?;
    host.load_entry(&config.entry_script)?;
    Ok(host)
}

fn install_globals(lua: &Lua) -> mlua::Result<()> {
    let globals = lua.globals();
    let null = Value::LightUserData(LightUserData(std::ptr::null_mut()));
    globals.raw_set("null", null.clone())?;
    globals.raw_set("NULL", null)?;
    Ok(())
}

fn set_search_paths(lua: &Lua, config: &HostConfig) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    package.set("path", config.lua_path.as_str())?;
    package.set("cpath", config.lua_cpath.as_str())?;
    Ok(())
}

/// Marker mlua places between a runtime error value and its traceback.
const TRACEBACK: &str = "\nstack traceback:";

/// The Lua error value as text, without mlua's category prefix or the
/// traceback it appends to errors raised inside a coroutine.
fn error_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg
            .split_once(TRACEBACK)
            .map_or(msg.as_str(), |(value, _)| value)
            .to_string(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::CallbackError { cause, .. } => error_message(cause),
        other => other.to_string(),
    }
}
