//! `sys`: small OS probes.

use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, TimeZone, Utc};
use mlua::{Lua, Table, Value};

use crate::log;

/// Output budget of `date` on top of the format length.
pub const DATE_EXTRA_BYTES: usize = 128;

/// Longest host name returned by `hostname`.
pub const MAX_HOSTNAME: usize = 4096;

pub fn open(lua: &Lua) -> mlua::Result<Table> {
    let sys = lua.create_table()?;
    sys.set("now", lua.create_function(|_, ()| Ok(now()))?)?;
    sys.set(
        "ipv4",
        lua.create_function(|_, ip: String| {
            require_text("ipv4", &ip)?;
            Ok(is_ipv4(&ip))
        })?,
    )?;
    sys.set(
        "ipv6",
        lua.create_function(|_, ip: String| {
            require_text("ipv6", &ip)?;
            Ok(is_ipv6(&ip))
        })?,
    )?;
    sys.set(
        "date",
        lua.create_function(|lua, (fmt, ts): (String, Value)| {
            if fmt.is_empty() {
                return Err(mlua::Error::runtime("date error: empty format"));
            }
            // Anything that is not an integer means now.
            let ts = lua.coerce_integer(ts)?.unwrap_or(0);
            Ok(format_date(&fmt, ts))
        })?,
    )?;
    sys.set("os", lua.create_function(|_, ()| Ok(std::env::consts::OS))?)?;
    sys.set("hostname", lua.create_function(|_, ()| Ok(hostname()))?)?;
    sys.set(
        "new_tab",
        lua.create_function(|lua, (narr, nrec): (usize, usize)| {
            lua.create_table_with_capacity(narr, nrec)
        })?,
    )?;
    sys.set(
        "log",
        lua.create_function(|_, (level, msg): (String, String)| {
            log::log(&level, &msg);
            Ok(())
        })?,
    )?;
    Ok(sys)
}

fn require_text(func: &str, arg: &str) -> mlua::Result<()> {
    if arg.is_empty() {
        return Err(mlua::Error::runtime(format!(
            "{func} error: expected a non-empty string argument"
        )));
    }
    Ok(())
}

/// Wall clock in seconds, microsecond precision.
pub fn now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

pub fn is_ipv4(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

pub fn is_ipv6(ip: &str) -> bool {
    ip.parse::<Ipv6Addr>().is_ok()
}

/// strftime-style formatting in local time.
///
/// `timestamp <= 0` means now. Unknown specifiers are copied through as
/// text. Output that does not fit in `DATE_EXTRA_BYTES + fmt.len()` bytes
/// (terminator included) yields an empty string.
pub fn format_date(fmt: &str, timestamp: i64) -> Option<String> {
    let timestamp = if timestamp <= 0 {
        Utc::now().timestamp()
    } else {
        timestamp
    };
    let when = Local.timestamp_opt(timestamp, 0).single()?;

    let items = date_items(fmt);
    let mut out = String::new();
    write!(out, "{}", when.format_with_items(items.into_iter())).ok()?;

    if out.len() >= DATE_EXTRA_BYTES + fmt.len() {
        return Some(String::new());
    }
    Some(out)
}

/// Split `fmt` into chrono items, keeping each specifier chrono rejects as
/// a literal.
fn date_items(fmt: &str) -> Vec<Item<'_>> {
    let mut items = Vec::new();
    let mut rest = fmt;
    while let Some(pos) = rest.find('%') {
        let (literal, spec_start) = rest.split_at(pos);
        if !literal.is_empty() {
            items.push(Item::Literal(literal));
        }
        // Specifiers are two to four characters: `%Y`, `%-d`, `%.3f`.
        let ends = spec_start
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(spec_start.len()))
            .skip(2)
            .take(3);
        let known = ends.map(|end| spec_start.split_at(end)).find_map(|(spec, tail)| {
            let parsed: Vec<Item<'_>> = StrftimeItems::new(spec).collect();
            (!parsed.iter().any(|item| matches!(item, Item::Error))).then_some((parsed, tail))
        });
        rest = match known {
            Some((parsed, tail)) => {
                items.extend(parsed);
                tail
            }
            None => {
                let end = spec_start
                    .char_indices()
                    .nth(2)
                    .map_or(spec_start.len(), |(i, _)| i);
                let (unknown, tail) = spec_start.split_at(end);
                items.push(Item::Literal(unknown));
                tail
            }
        };
    }
    if !rest.is_empty() {
        items.push(Item::Literal(rest));
    }
    items
}

pub fn hostname() -> Option<String> {
    let name = nix::unistd::gethostname().ok()?.into_string().ok()?;
    (name.len() <= MAX_HOSTNAME).then_some(name)
}
