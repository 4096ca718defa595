//! Host modules exposed to scripts through `require`.
//!
//! | module  | contents |
//! |---------|----------|
//! | `sys`   | clock, IP literal checks, date formatting, os, hostname, pre-sized tables, log |
//! | `crypt` | random v4 identifiers |
//! | `timer` | one-shot callbacks on the reactor |

pub mod crypt;
pub mod sys;
pub mod timer;

use mlua::{Lua, Table};

use crate::reactor::ErrorCallback;

/// Register every host module in `package.preload`.
pub fn preload(lua: &Lua, on_error: ErrorCallback) -> mlua::Result<()> {
    let package: Table = lua.globals().get("package")?;
    let preload: Table = package.get("preload")?;
    preload.set("sys", lua.create_function(|lua, ()| sys::open(lua))?)?;
    preload.set("crypt", lua.create_function(|lua, ()| crypt::open(lua))?)?;
    preload.set(
        "timer",
        lua.create_function(move |lua, ()| timer::open(lua, on_error))?,
    )?;
    Ok(())
}
