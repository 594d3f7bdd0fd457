//! Where the daemon looks for its configuration

use std::path::PathBuf;

const APP_DIR: &str = "cardframe";
const CONFIG_FILE: &str = "config.toml";

/// `~/.config/cardframe/config.toml` on hosts with a per-user config
/// directory, `/etc/cardframe/config.toml` otherwise
pub fn default_config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("/etc"));
    base.join(APP_DIR).join(CONFIG_FILE)
}
