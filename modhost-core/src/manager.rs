//! Manager - plugin discovery, lifecycle orchestration, dependency resolution

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use modhost_plugin_api::CapabilityRegistry;

use crate::error::{DependencyError, Error};
use crate::loader::{Loader, QueriedPlugin};
use crate::native::NativeLoader;
use crate::plugin::{Plugin, PluginState};
use crate::source::{FileSource, Source};

/// Configuration for a [`Manager`]
pub struct ManagerConfig {
    /// Initial search paths
    pub paths: Vec<PathBuf>,
    /// Register the native in-process loader (on by default; hosts that
    /// only use custom loader backends can opt out)
    pub native_loader: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            native_loader: true,
        }
    }
}

/// Handle for removing a previously registered state observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u64);

type StateObserver = Box<dyn FnMut(&Arc<Plugin>, PluginState, PluginState) + Send>;

/// The plugin manager.
///
/// Owns the loaders, the discovered-plugin index (keyed by id, one-to-many
/// because several files can claim the same id), the search paths, and the
/// scan sources. One manager is one plugin universe: create it, drive it,
/// and [`shutdown`](Self::shutdown) it from a single owning thread —
/// operations run synchronously to completion and the manager provides no
/// internal locking across calls.
pub struct Manager {
    paths: Vec<PathBuf>,
    loaders: Vec<Arc<dyn Loader>>,
    loaders_by_extension: HashMap<String, Arc<dyn Loader>>,
    plugins: HashMap<String, Vec<Arc<Plugin>>>,
    by_filename: HashMap<PathBuf, Arc<Plugin>>,
    sources: Vec<Box<dyn Source>>,
    observers: Vec<(u64, StateObserver)>,
    next_observer: u64,
    next_sequence: u64,
    load_sequence: Vec<Weak<Plugin>>,
    capabilities: Arc<CapabilityRegistry>,
}

impl Manager {
    /// Create a manager with the default filesystem source and, unless
    /// opted out, the native loader.
    pub fn new(config: ManagerConfig) -> Self {
        let capabilities = Arc::new(CapabilityRegistry::new());
        let mut manager = Self {
            paths: Vec::new(),
            loaders: Vec::new(),
            loaders_by_extension: HashMap::new(),
            plugins: HashMap::new(),
            by_filename: HashMap::new(),
            sources: vec![Box::new(FileSource::new())],
            observers: Vec::new(),
            next_observer: 0,
            next_sequence: 0,
            load_sequence: Vec::new(),
            capabilities: capabilities.clone(),
        };

        if config.native_loader {
            let native: Arc<dyn Loader> = Arc::new(NativeLoader::new(capabilities));
            manager
                .register_loader(native)
                .expect("native loader is registered first");
        }

        for path in config.paths {
            manager.append_path(path);
        }

        manager
    }

    /// The process-wide capability registry shared with loaded plugins
    pub fn capabilities(&self) -> &Arc<CapabilityRegistry> {
        &self.capabilities
    }

    // ─── Search paths ────────────────────────────────────────────────

    /// Registered search paths, in order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Append a search path. Trailing separators are normalized before
    /// comparison; appending an already-registered path is a no-op.
    pub fn append_path(&mut self, path: impl Into<PathBuf>) {
        let path = normalize_path(path.into());
        if !self.paths.contains(&path) {
            tracing::debug!(path = %path.display(), "Search path appended");
            self.paths.push(path);
        }
    }

    /// Prepend a search path, with the same normalization and dedup rules
    /// as [`append_path`](Self::append_path).
    pub fn prepend_path(&mut self, path: impl Into<PathBuf>) {
        let path = normalize_path(path.into());
        if !self.paths.contains(&path) {
            tracing::debug!(path = %path.display(), "Search path prepended");
            self.paths.insert(0, path);
        }
    }

    /// Remove a search path; a no-op if it is not registered.
    pub fn remove_path(&mut self, path: impl Into<PathBuf>) {
        let path = normalize_path(path.into());
        self.paths.retain(|p| p != &path);
    }

    /// Append the paths in the named environment variable (platform
    /// path-list syntax), preserving their relative order.
    pub fn append_paths_from_env(&mut self, var: &str) {
        if let Some(value) = std::env::var_os(var) {
            for path in std::env::split_paths(&value) {
                if !path.as_os_str().is_empty() {
                    self.append_path(path);
                }
            }
        }
    }

    /// Prepend the paths in the named environment variable, preserving
    /// their relative order ahead of the existing paths.
    pub fn prepend_paths_from_env(&mut self, var: &str) {
        if let Some(value) = std::env::var_os(var) {
            let mut insert_at = 0;
            for path in std::env::split_paths(&value) {
                if path.as_os_str().is_empty() {
                    continue;
                }
                let path = normalize_path(path);
                if !self.paths.contains(&path) {
                    self.paths.insert(insert_at, path);
                    insert_at += 1;
                }
            }
        }
    }

    /// Append the conventional search paths for a host application:
    /// `<prefix>/lib/<appname>` and `<user-config-dir>/<appname>/plugins`.
    pub fn add_app_paths(&mut self, prefix: &str, appname: &str) {
        for path in modhost_paths::app_paths(prefix, appname) {
            self.append_path(path);
        }
    }

    /// Append the library-wide default search paths shared by every
    /// modhost host.
    pub fn add_default_paths(&mut self, prefix: &str) {
        for path in modhost_paths::default_paths(prefix) {
            self.append_path(path);
        }
    }

    // ─── Loaders and sources ─────────────────────────────────────────

    /// Register a loader backend for the extensions it declares.
    ///
    /// Fails without registering anything if any declared extension is
    /// already claimed by another loader.
    pub fn register_loader(&mut self, loader: Arc<dyn Loader>) -> Result<(), Error> {
        for extension in loader.supported_extensions() {
            if let Some(existing) = self.loaders_by_extension.get(*extension) {
                return Err(Error::ExtensionConflict {
                    extension: (*extension).to_string(),
                    loader: existing.name().to_string(),
                });
            }
        }

        for extension in loader.supported_extensions() {
            self.loaders_by_extension
                .insert((*extension).to_string(), loader.clone());
        }
        tracing::debug!(loader = %loader.name(), "Loader registered");
        self.loaders.push(loader);
        Ok(())
    }

    /// The loader registered for a file extension (lowercase, no dot)
    pub fn loader_for_extension(&self, extension: &str) -> Option<Arc<dyn Loader>> {
        self.loaders_by_extension.get(extension).cloned()
    }

    /// Register an additional scan source driven by refresh
    pub fn register_source(&mut self, source: Box<dyn Source>) {
        self.sources.push(source);
    }

    // ─── State observers ─────────────────────────────────────────────

    /// Register a callback invoked synchronously inside every state
    /// transition, with the plugin, old state, and new state.
    pub fn on_state_changed(
        &mut self,
        observer: impl FnMut(&Arc<Plugin>, PluginState, PluginState) + Send + 'static,
    ) -> ObserverId {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        ObserverId(id)
    }

    /// Remove a previously registered observer
    pub fn remove_state_observer(&mut self, id: ObserverId) {
        self.observers.retain(|(oid, _)| *oid != id.0);
    }

    fn set_plugin_state(&mut self, plugin: &Arc<Plugin>, new: PluginState) {
        let old = plugin.swap_state(new);
        if old != new {
            for (_, observer) in self.observers.iter_mut() {
                observer(plugin, old, new);
            }
        }
    }

    // ─── Refresh and discovery ───────────────────────────────────────

    /// Re-scan the search paths.
    ///
    /// Marks stale plugins for requery and evicts entries whose file
    /// disappeared, drives every source to quiescence, then auto-loads
    /// queried plugins that request it. Safe to call repeatedly: with no
    /// filesystem changes a second refresh leaves the plugin set and every
    /// plugin's state untouched.
    pub fn refresh(&mut self) {
        self.mark_stale_plugins();

        let mut sources = std::mem::take(&mut self.sources);
        let mut found = true;
        while found {
            found = false;
            for source in sources.iter_mut() {
                if source.scan(self) {
                    found = true;
                }
            }
        }
        self.sources = sources;

        self.autoload_pass();
    }

    /// Requery marking and dropped-file eviction, ahead of the scan loop.
    fn mark_stale_plugins(&mut self) {
        let entries: Vec<(PathBuf, Arc<Plugin>)> = self
            .by_filename
            .iter()
            .map(|(path, plugin)| (path.clone(), plugin.clone()))
            .collect();

        for (path, plugin) in entries {
            match std::fs::metadata(&path) {
                Err(_) => {
                    // Keep resident plugins (loaded, or stuck mid-unload)
                    // even if their file went away; dropping the handle out
                    // from under them is worse.
                    if !matches!(
                        plugin.state(),
                        PluginState::Loaded | PluginState::UnloadFailed
                    ) {
                        tracing::debug!(
                            plugin = %plugin.info().id(),
                            file = %path.display(),
                            "Plugin file disappeared, evicting"
                        );
                        self.evict(&path, &plugin);
                    }
                }
                Ok(metadata) => {
                    if plugin.state() != PluginState::Queried {
                        continue;
                    }
                    let modified = metadata.modified().ok();
                    if let (Some(mtime), Some(queried_at)) = (modified, plugin.queried_at()) {
                        if mtime > queried_at {
                            tracing::debug!(
                                plugin = %plugin.info().id(),
                                file = %path.display(),
                                "Plugin file changed on disk, marking for requery"
                            );
                            self.set_plugin_state(&plugin, PluginState::Requery);
                        }
                    }
                }
            }
        }
    }

    fn autoload_pass(&mut self) {
        let candidates: Vec<Arc<Plugin>> = self
            .by_filename
            .values()
            .filter(|p| p.info().auto_load() && p.state() == PluginState::Queried)
            .cloned()
            .collect();

        for plugin in candidates {
            if let Err(e) = self.load_plugin(&plugin) {
                tracing::error!(
                    plugin = %plugin.info().id(),
                    error = %e,
                    "Auto-load failed"
                );
            }
        }
    }

    /// Whether a file still needs querying this refresh.
    ///
    /// Source-facing: true for files not yet indexed and for plugins
    /// marked [`PluginState::Requery`].
    pub fn needs_query(&self, filename: &Path) -> bool {
        match self.by_filename.get(filename) {
            None => true,
            Some(plugin) => plugin.state() == PluginState::Requery,
        }
    }

    /// Index a freshly queried plugin.
    ///
    /// Source-facing: constructs the [`Plugin`], replaces any earlier entry
    /// for the same file (the requery path), and emits the
    /// `Unknown -> Queried` transition.
    pub fn index_queried(
        &mut self,
        filename: &Path,
        queried: QueriedPlugin,
        loader: &Arc<dyn Loader>,
    ) -> Arc<Plugin> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let plugin = Arc::new(Plugin::new(
            filename.to_path_buf(),
            queried.info,
            Arc::downgrade(loader),
            queried.handle,
            sequence,
        ));

        if let Some(old) = self
            .by_filename
            .insert(filename.to_path_buf(), plugin.clone())
        {
            self.remove_from_id_index(&old);
        }
        self.plugins
            .entry(plugin.info().id().to_string())
            .or_default()
            .push(plugin.clone());

        plugin.set_desired_state(PluginState::Queried);
        plugin.mark_queried(SystemTime::now());
        self.set_plugin_state(&plugin, PluginState::Queried);
        tracing::debug!(
            plugin = %plugin.info().id(),
            file = %filename.display(),
            "Plugin queried"
        );
        plugin
    }

    fn evict(&mut self, path: &Path, plugin: &Arc<Plugin>) {
        self.by_filename.remove(path);
        self.remove_from_id_index(plugin);
    }

    fn remove_from_id_index(&mut self, plugin: &Arc<Plugin>) {
        let id = plugin.info().id().to_string();
        let mut now_empty = false;
        if let Some(list) = self.plugins.get_mut(&id) {
            list.retain(|p| !Arc::ptr_eq(p, plugin));
            now_empty = list.is_empty();
        }
        if now_empty {
            self.plugins.remove(&id);
        }
    }

    // ─── Lookup ──────────────────────────────────────────────────────

    /// The best plugin registered under `id`: highest priority, with the
    /// first-discovered one winning ties.
    pub fn find_plugin(&self, id: &str) -> Option<Arc<Plugin>> {
        let list = self.plugins.get(id)?;
        let mut best: Option<&Arc<Plugin>> = None;
        for plugin in list {
            // List order is discovery order, so strict comparison keeps
            // the earlier plugin on ties.
            if best.is_none_or(|b| plugin.info().priority() > b.info().priority()) {
                best = Some(plugin);
            }
        }
        best.cloned()
    }

    /// Every plugin registered under `id`, in discovery order
    pub fn find_plugins(&self, id: &str) -> Vec<Arc<Plugin>> {
        self.plugins.get(id).cloned().unwrap_or_default()
    }

    /// All known distinct plugin ids, sorted
    pub fn list_plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.plugins.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Every plugin currently in the given state
    pub fn find_plugins_with_state(&self, state: PluginState) -> Vec<Arc<Plugin>> {
        self.by_filename
            .values()
            .filter(|p| p.state() == state)
            .cloned()
            .collect()
    }

    /// Number of discovered plugin instances (files, not distinct ids)
    pub fn plugin_count(&self) -> usize {
        self.by_filename.len()
    }

    /// Resolve a dependency id to its best provider: a plugin with that
    /// id, or failing that the best plugin whose `provides` lists it.
    fn resolve_dependency(&self, id: &str) -> Option<Arc<Plugin>> {
        if let Some(direct) = self.find_plugin(id) {
            return Some(direct);
        }

        let mut best: Option<&Arc<Plugin>> = None;
        for list in self.plugins.values() {
            for plugin in list {
                if !plugin.info().provides().iter().any(|p| p == id) {
                    continue;
                }
                let better = best.is_none_or(|b| {
                    let lhs = (plugin.info().priority(), std::cmp::Reverse(plugin.sequence()));
                    let rhs = (b.info().priority(), std::cmp::Reverse(b.sequence()));
                    lhs > rhs
                });
                if better {
                    best = Some(plugin);
                }
            }
        }
        best.cloned()
    }

    // ─── Load and unload ─────────────────────────────────────────────

    /// Load a plugin, loading its declared dependencies first.
    ///
    /// Dependencies are resolved depth-first in declared order; a missing
    /// dependency, a dependency that fails to load, or a cycle aborts the
    /// call *before* this plugin's own loader is invoked, leaving the
    /// plugin's state untouched. Loading an already-loaded plugin is a
    /// no-op success.
    pub fn load_plugin(&mut self, plugin: &Arc<Plugin>) -> Result<(), Error> {
        self.load_plugin_inner(plugin, &mut Vec::new())
    }

    fn load_plugin_inner(
        &mut self,
        plugin: &Arc<Plugin>,
        visiting: &mut Vec<String>,
    ) -> Result<(), Error> {
        let id = plugin.info().id().to_string();

        match plugin.state() {
            PluginState::Loaded => return Ok(()),
            PluginState::Queried | PluginState::LoadFailed => {}
            state => {
                return Err(Error::WrongState {
                    id,
                    state,
                    expected: "queried",
                });
            }
        }

        visiting.push(id.clone());
        let dependencies: Vec<String> = plugin.info().dependencies().to_vec();
        for dependency in dependencies {
            if visiting.contains(&dependency) {
                let mut chain = visiting.clone();
                chain.push(dependency);
                return Err(DependencyError::Cycle { chain }.into());
            }

            let provider =
                self.resolve_dependency(&dependency)
                    .ok_or_else(|| DependencyError::Missing {
                        plugin: id.clone(),
                        dependency: dependency.clone(),
                    })?;

            if provider.state() == PluginState::Loaded {
                continue;
            }

            let provider_id = provider.info().id().to_string();
            if visiting.contains(&provider_id) {
                let mut chain = visiting.clone();
                chain.push(provider_id);
                return Err(DependencyError::Cycle { chain }.into());
            }

            self.load_plugin_inner(&provider, visiting).map_err(|e| {
                // A cycle found deeper in the walk is already a complete
                // diagnosis; don't bury it under per-edge wrappers.
                if matches!(e, Error::Dependency(DependencyError::Cycle { .. })) {
                    e
                } else {
                    DependencyError::Failed {
                        plugin: id.clone(),
                        dependency: dependency.clone(),
                        source: Box::new(e),
                    }
                    .into()
                }
            })?;
        }
        visiting.pop();

        plugin.set_desired_state(PluginState::Loaded);
        let loader = plugin
            .loader()
            .ok_or_else(|| Error::LoaderGone { id: id.clone() })?;

        match loader.load(plugin) {
            Ok(()) => {
                plugin.set_error(None);
                self.set_plugin_state(plugin, PluginState::Loaded);
                self.load_sequence.push(Arc::downgrade(plugin));
                tracing::info!(plugin = %id, "Plugin loaded");
                Ok(())
            }
            Err(e) => {
                let cause = Arc::new(e);
                plugin.set_error(Some(cause.clone()));
                self.set_plugin_state(plugin, PluginState::LoadFailed);
                tracing::error!(plugin = %id, error = %cause, "Failed to load plugin");
                Err(Error::LoadFailure { id, cause })
            }
        }
    }

    /// Unload a plugin.
    ///
    /// Does NOT cascade to dependents: a plugin can be unloaded while
    /// something that depends on it remains loaded, and unloading
    /// dependents first is the caller's responsibility. Unloading a plugin
    /// that was never loaded is a no-op success.
    pub fn unload_plugin(&mut self, plugin: &Arc<Plugin>) -> Result<(), Error> {
        self.unload_plugin_with(plugin, false)
    }

    fn unload_plugin_with(&mut self, plugin: &Arc<Plugin>, is_shutdown: bool) -> Result<(), Error> {
        match plugin.state() {
            PluginState::Loaded | PluginState::UnloadFailed => {}
            _ => return Ok(()),
        }

        let id = plugin.info().id().to_string();
        plugin.set_desired_state(PluginState::Queried);
        let loader = plugin
            .loader()
            .ok_or_else(|| Error::LoaderGone { id: id.clone() })?;

        match loader.unload(plugin, is_shutdown) {
            Ok(()) => {
                plugin.set_error(None);
                self.set_plugin_state(plugin, PluginState::Queried);
                self.load_sequence.retain(|w| {
                    w.upgrade().is_some_and(|p| !Arc::ptr_eq(&p, plugin))
                });
                tracing::info!(plugin = %id, "Plugin unloaded");
                Ok(())
            }
            Err(e) => {
                let cause = Arc::new(e);
                plugin.set_error(Some(cause.clone()));
                self.set_plugin_state(plugin, PluginState::UnloadFailed);
                tracing::error!(plugin = %id, error = %cause, "Failed to unload plugin");
                Err(Error::UnloadFailure { id, cause })
            }
        }
    }

    // ─── Teardown ────────────────────────────────────────────────────

    /// Unload every still-loaded plugin in reverse load order (dependents
    /// before their dependencies) and clear the plugin index.
    ///
    /// Failures are logged and do not stop the teardown. A fresh manager
    /// constructed afterwards starts from a clean, empty state.
    pub fn shutdown(&mut self) {
        let sequence = std::mem::take(&mut self.load_sequence);
        for weak in sequence.iter().rev() {
            let Some(plugin) = weak.upgrade() else {
                continue;
            };
            if plugin.state() != PluginState::Loaded {
                continue;
            }
            if let Err(e) = self.unload_plugin_with(&plugin, true) {
                tracing::warn!(
                    plugin = %plugin.info().id(),
                    error = %e,
                    "Failed to unload plugin during shutdown"
                );
            }
        }

        self.plugins.clear();
        self.by_filename.clear();
        tracing::debug!("Plugin manager shut down");
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Collapse redundant separators, including trailing ones, so path
/// comparison sees one canonical spelling.
fn normalize_path(path: PathBuf) -> PathBuf {
    path.components().collect()
}
