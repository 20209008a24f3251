//! Loader - per-technology query/load/unload strategy

use std::any::Any;
use std::path::Path;

use modhost_plugin_api::PluginInfo;

use crate::error::Error;
use crate::plugin::Plugin;

/// Result of a successful query: the plugin's metadata plus whatever
/// per-plugin resources the loader needs to keep for later load/unload
/// calls. The handle lands in the Plugin's loader-private slot.
pub struct QueriedPlugin {
    pub info: PluginInfo,
    pub handle: Box<dyn Any + Send>,
}

impl std::fmt::Debug for QueriedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueriedPlugin")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// A plugin-technology backend.
///
/// One instance exists per plugin technology; the manager routes candidate
/// files to it by extension. `query` must not mutate state beyond building
/// the returned [`QueriedPlugin`]; `load`/`unload` are invoked only by the
/// manager once the plugin is in an appropriate state.
pub trait Loader: Send + Sync {
    /// Short name used in diagnostics and conflict reports
    fn name(&self) -> &str;

    /// File extensions (lowercase, without the dot) this loader handles
    fn supported_extensions(&self) -> &[&str];

    /// Read a candidate file's metadata without loading it.
    ///
    /// On failure no plugin is produced and any resources opened during
    /// the attempt are released.
    fn query(&self, filename: &Path) -> Result<QueriedPlugin, Error>;

    /// Load a previously queried plugin.
    ///
    /// On failure the underlying resource state must be such that a
    /// subsequent unload is unnecessary.
    fn load(&self, plugin: &Plugin) -> Result<(), Error>;

    /// Unload a loaded plugin.
    ///
    /// `is_shutdown` is true when the whole process is tearing down,
    /// permitting the loader (and the plugin) to skip work that is
    /// pointless or unsafe during exit.
    fn unload(&self, plugin: &Plugin, is_shutdown: bool) -> Result<(), Error>;
}
