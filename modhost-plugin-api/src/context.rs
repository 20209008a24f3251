//! PluginContext - a plugin's interface to its host

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capability::CapabilityRegistry;
use crate::error::PluginError;

/// A plugin's interface to host facilities.
///
/// Passed to the load/unload hooks and provides access to:
/// - The plugin's sidecar configuration (persistent key-value store)
/// - The path of the module the plugin was loaded from
/// - The process-wide capability registry
/// - Logging utilities tagged with the plugin id
pub struct PluginContext {
    plugin_id: String,
    module_path: PathBuf,
    config: PluginConfig,
    capabilities: Arc<CapabilityRegistry>,
}

impl PluginContext {
    /// Create a new plugin context
    pub fn new(
        plugin_id: String,
        module_path: PathBuf,
        capabilities: Arc<CapabilityRegistry>,
    ) -> Self {
        Self {
            plugin_id,
            module_path,
            config: PluginConfig::new(),
            capabilities,
        }
    }

    /// Create a context with a pre-loaded config
    pub fn with_config(
        plugin_id: String,
        module_path: PathBuf,
        capabilities: Arc<CapabilityRegistry>,
        config: PluginConfig,
    ) -> Self {
        Self {
            plugin_id,
            module_path,
            config,
            capabilities,
        }
    }

    /// The id of the plugin this context belongs to
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// Absolute path of the module file the plugin was queried from
    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// The process-wide capability registry
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    // ─── Configuration ───────────────────────────────────────────────

    /// Read a configuration value
    ///
    /// # Example
    /// ```ignore
    /// let threshold: Option<u32> = ctx.config_get("threshold");
    /// ```
    pub fn config_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.config.get(key)
    }

    /// Write a configuration value
    pub fn config_set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), PluginError> {
        self.config.set(key, value)
    }

    /// Check if the configuration has unsaved changes
    pub fn config_is_dirty(&self) -> bool {
        self.config.is_dirty()
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Log an info message tagged with the plugin id
    pub fn log_info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin_id, "{message}");
    }

    /// Log a warning tagged with the plugin id
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin_id, "{message}");
    }

    /// Log an error tagged with the plugin id
    pub fn log_error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin_id, "{message}");
    }
}

/// Plugin configuration - persistent key-value store backed by TOML.
///
/// Loaded from the sidecar file next to the plugin module
/// (`<module-stem>.toml`) when one exists.
#[derive(Default)]
pub struct PluginConfig {
    values: HashMap<String, toml::Value>,
    dirty: bool,
}

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    ///
    /// Returns an empty config if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let values: HashMap<String, toml::Value> = toml::from_str(&content)
            .map_err(|e| PluginError::config(format!("{}: {e}", path.display())))?;
        Ok(Self {
            values,
            dirty: false,
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&mut self, path: &Path) -> Result<(), PluginError> {
        let content = toml::to_string_pretty(&self.values)
            .map_err(|e| PluginError::config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        self.dirty = false;
        Ok(())
    }

    /// Read a typed value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .cloned()
            .and_then(|v| v.try_into().ok())
    }

    /// Write a typed value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), PluginError> {
        let value =
            toml::Value::try_from(value).map_err(|e| PluginError::config(e.to_string()))?;
        self.values.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}
