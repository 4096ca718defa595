//! `timer`: one-shot callbacks driven by the reactor.
//!
//! `timer.after(seconds, fn)` schedules `fn` on the reactor's local set. An
//! error raised by `fn` goes to the reactor error callback; the loop keeps
//! running.

use std::time::Duration;

use mlua::{Function, Lua, Table};
use tokio::task::JoinHandle;

use crate::reactor::ErrorCallback;

pub fn open(lua: &Lua, on_error: ErrorCallback) -> mlua::Result<Table> {
    let timer = lua.create_table()?;
    timer.set(
        "after",
        lua.create_function(move |_, (seconds, callback): (f64, Function)| {
            schedule(delay(seconds), callback, on_error);
            Ok(())
        })?,
    )?;
    Ok(timer)
}

/// Negative and NaN delays fire immediately; overflowing ones never fire.
fn delay(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX)
}

/// Call `callback` once after `delay`. Must run inside the reactor's local set.
pub fn schedule(delay: Duration, callback: Function, on_error: ErrorCallback) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        tokio::time::sleep(delay).await;
        if let Err(e) = callback.call::<()>(()) {
            on_error(&format!("timer callback failed: {e}"));
        }
    })
}
