//! `crypt`: identifiers.

use mlua::{Lua, Table};
use uuid::Uuid;

pub const UUID_LENGTH: usize = 36;

/// Random version-4 identifier, lowercase hex, 8-4-4-4-12.
///
/// 16 bytes from the OS CSPRNG with the version nibble forced to `4` and the
/// variant bits forced to `10`.
pub fn uuid_v4() -> String {
    Uuid::new_v4().hyphenated().to_string()
}

pub fn open(lua: &Lua) -> mlua::Result<Table> {
    let crypt = lua.create_table()?;
    crypt.set("uuid", lua.create_function(|_, ()| Ok(uuid_v4()))?)?;
    Ok(crypt)
}
