//! XDG Base Directory paths and default plugin search paths for modhost.
//!
//! Host applications should use XDG paths for cross-platform consistency,
//! not platform-native paths. This matches tools like gh, docker, kubectl.

use std::path::PathBuf;

/// Get the modhost config directory.
///
/// Returns `$XDG_CONFIG_HOME/modhost` if set, otherwise `~/.config/modhost`.
///
/// # Examples
///
/// ```
/// use modhost_paths::config_dir;
///
/// let config = config_dir();
/// let plugin_dir = config.join("plugins");
/// ```
pub fn config_dir() -> PathBuf {
    user_config_dir().join("modhost")
}

/// Get the modhost data directory.
///
/// Returns `$XDG_DATA_HOME/modhost` if set, otherwise `~/.local/share/modhost`.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("modhost")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share/modhost")
    } else {
        PathBuf::from(".local/share/modhost")
    }
}

/// Get the user-level config root (`$XDG_CONFIG_HOME` or `~/.config`).
pub fn user_config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config")
    } else {
        PathBuf::from(".config")
    }
}

/// Plugin search paths for a host application.
///
/// Returns the system location `<prefix>/lib/<appname>` followed by the
/// per-user location `<user-config-dir>/<appname>/plugins`.
///
/// # Examples
///
/// ```
/// use modhost_paths::app_paths;
///
/// let paths = app_paths("/usr", "finch");
/// assert!(paths[0].ends_with("lib/finch"));
/// assert!(paths[1].ends_with("finch/plugins"));
/// ```
pub fn app_paths(prefix: &str, appname: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(prefix).join("lib").join(appname),
        user_config_dir().join(appname).join("plugins"),
    ]
}

/// Library-wide default plugin search paths.
///
/// The `<prefix>/lib/modhost` pair shared by every modhost host, plus the
/// per-user `modhost` config location.
pub fn default_paths(prefix: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(prefix).join("lib").join("modhost"),
        config_dir().join("plugins"),
    ]
}
