use std::path::{Path, PathBuf};

use crate::error::HostResult;

/// Entry script, relative to the working directory.
pub const ENTRY_SCRIPT: &str = "script/main.lua";

/// `package.path`: Lua modules, in precedence order.
pub const LUA_PATH: &str =
    "lualib/?.lua;lualib/?/init.lua;./?.lua;./?/init.lua;script/?.lua;script/?/init.lua;";

/// `package.cpath`: native extension modules, in precedence order.
#[cfg(all(unix, not(target_os = "macos")))]
pub const LUA_CPATH: &str = "luaclib/lib?.so;luaclib/?.so;./lib?.so;./?.so";
#[cfg(target_os = "macos")]
pub const LUA_CPATH: &str = "luaclib/lib?.dylib;luaclib/?.dylib;./lib?.dylib;./?.dylib";
#[cfg(windows)]
pub const LUA_CPATH: &str = "luaclib/msys-?.dll;luaclib/?.dll;./msys-?.dll;./?.dll";

/// Fixed deployment layout of the supervised script.
///
/// The defaults never consult the ambient environment (`LUA_PATH`,
/// `LUA_CPATH`); tests override the entry script to point into a temp dir.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub entry_script: PathBuf,
    pub lua_path: String,
    pub lua_cpath: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            entry_script: PathBuf::from(ENTRY_SCRIPT),
            lua_path: LUA_PATH.to_string(),
            lua_cpath: LUA_CPATH.to_string(),
        }
    }
}

impl HostConfig {
    /// Layout with the entry script resolved against `dir` instead of the
    /// working directory.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            entry_script: dir.join(ENTRY_SCRIPT),
            ..Self::default()
        }
    }
}

/// Enter the deployment directory so the relative search paths resolve
/// against it.
pub fn enter_workdir(dir: Option<&Path>) -> HostResult<()> {
    if let Some(dir) = dir {
        std::env::set_current_dir(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_fixed() {
        let config = HostConfig::default();
        assert_eq!(config.entry_script, Path::new("script/main.lua"));
        assert_eq!(config.lua_path, LUA_PATH);
        assert_eq!(config.lua_cpath, LUA_CPATH);
    }

    #[test]
    fn search_path_precedence() {
        let dirs: Vec<&str> = LUA_PATH.split(';').filter(|p| !p.is_empty()).collect();
        assert_eq!(
            dirs,
            [
                "lualib/?.lua",
                "lualib/?/init.lua",
                "./?.lua",
                "./?/init.lua",
                "script/?.lua",
                "script/?/init.lua",
            ]
        );
        assert!(LUA_CPATH.starts_with("luaclib/"));
        assert_eq!(LUA_CPATH.split(';').count(), 4);
    }

    #[test]
    fn rooted_layout_keeps_search_paths() {
        let config = HostConfig::rooted_at(Path::new("/srv/app"));
        assert_eq!(config.entry_script, Path::new("/srv/app/script/main.lua"));
        assert_eq!(config.lua_path, LUA_PATH);
    }

    #[test]
    fn missing_workdir_is_an_error() {
        let result = enter_workdir(Some(Path::new("/nonexistent/script-host-dir")));
        assert!(result.is_err());
        assert!(enter_workdir(None).is_ok());
    }
}
