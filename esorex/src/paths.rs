//! Locations of the EsoRex configuration files.
//!
//! Centralizes the `~/.esorex` lookups so the caller does not repeat
//! `dirs::home_dir().ok_or_else(...)?.join(".esorex/...")`.

use anyhow::{anyhow, Result};
use esorex_core::help::{RC_DIR, RC_EXTENSION};
use esorex_core::PACKAGE;
use std::path::{Path, PathBuf};

/// Overrides the system configuration directory
pub const SYSCONFDIR_ENV: &str = "ESOREX_SYSCONFDIR";

/// Use full parameter names as command line options when set to TRUE
pub const USE_PARAM_NAME_ENV: &str = "ESOREX_USE_PARAM_NAME";

const DEFAULT_SYSCONFDIR: &str = "/etc";

/// Get the user's home directory or return an error.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| anyhow!("could not find home directory"))
}

/// Get `~/.esorex`, the per-user configuration directory.
pub fn esorex_dir() -> Result<PathBuf> {
    let dir = home_dir()?.join(RC_DIR);
    log::debug!("esorex dir: {:?}", dir);
    Ok(dir)
}

fn rc_name() -> String {
    format!("{PACKAGE}{RC_EXTENSION}")
}

/// Global configuration file: `~/.esorex/esorex.rc` when it exists,
/// otherwise `esorex.rc` in the system configuration directory.
pub fn global_config(sysconfdir: Option<&str>) -> Option<PathBuf> {
    if let Ok(dir) = esorex_dir() {
        let user = dir.join(rc_name());
        if user.is_file() {
            return Some(user);
        }
    }
    let system = Path::new(sysconfdir.unwrap_or(DEFAULT_SYSCONFDIR)).join(rc_name());
    system.is_file().then_some(system)
}

/// True when `value` asks for full parameter names on the command line
pub fn use_param_names(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_esorex_dir_ends_with_dot_esorex() {
        if let Ok(path) = esorex_dir() {
            assert!(path.ends_with(".esorex"));
        }
    }

    #[test]
    fn test_system_config_fallback() {
        let dir = TempDir::new().unwrap();
        let sysconf = dir.path().display().to_string();
        let found = global_config(Some(&sysconf));
        let user_rc = esorex_dir().ok().map(|d| d.join("esorex.rc")).filter(|p| p.is_file());
        assert_eq!(found, user_rc);

        fs::write(dir.path().join("esorex.rc"), "").unwrap();
        let found = global_config(Some(&sysconf)).unwrap();
        if user_rc.is_none() {
            assert_eq!(found, dir.path().join("esorex.rc"));
        }
    }

    #[test]
    fn test_use_param_names() {
        assert!(use_param_names(Some("TRUE")));
        assert!(use_param_names(Some("true")));
        assert!(!use_param_names(Some("FALSE")));
        assert!(!use_param_names(None));
    }
}
