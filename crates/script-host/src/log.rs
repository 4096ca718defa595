//! Leveled log sink shared by the host, the reactor and scripts.

use tracing::{debug, error, info, trace, warn};

/// Emit `msg` at the level named by `level` (case-insensitive).
/// Unknown levels are logged at info.
pub fn log(level: &str, msg: &str) {
    match level.to_ascii_uppercase().as_str() {
        "ERROR" => error!(target: "script", "{msg}"),
        "WARN" | "WARNING" => warn!(target: "script", "{msg}"),
        "DEBUG" => debug!(target: "script", "{msg}"),
        "TRACE" => trace!(target: "script", "{msg}"),
        _ => info!(target: "script", "{msg}"),
    }
}

/// Default reactor error callback.
pub fn reactor_error(msg: &str) {
    error!(target: "reactor", "{msg}");
}
