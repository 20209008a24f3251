//! Plugin - lifecycle wrapper around one discovered plugin file

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use serde::Serialize;

use modhost_plugin_api::PluginInfo;

use crate::error::Error;
use crate::loader::Loader;

/// Lifecycle state of a discovered plugin.
///
/// Transitions happen only through manager/loader-mediated operations;
/// calling code never writes the state directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PluginState {
    /// Discovered but not yet successfully queried
    Unknown,
    /// Metadata read; module not loaded
    Queried,
    /// The file changed on disk since the last query; a fresh query is
    /// required before any load
    Requery,
    /// Loaded and active
    Loaded,
    /// The plugin's own load failed; retryable
    LoadFailed,
    /// Unload failed; the plugin is still resident
    UnloadFailed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PluginState::Unknown => "unknown",
            PluginState::Queried => "queried",
            PluginState::Requery => "requery",
            PluginState::Loaded => "loaded",
            PluginState::LoadFailed => "load-failed",
            PluginState::UnloadFailed => "unload-failed",
        };
        f.write_str(s)
    }
}

struct Lifecycle {
    state: PluginState,
    desired_state: PluginState,
    error: Option<Arc<Error>>,
    queried_at: Option<SystemTime>,
}

/// One discovered plugin instance.
///
/// Pairs the immutable [`PluginInfo`] with the mutable lifecycle record and
/// the loader-private module handle. Created by a loader's query through
/// the manager; dropped when the manager evicts it from the index.
pub struct Plugin {
    filename: PathBuf,
    info: PluginInfo,
    loader: Weak<dyn Loader>,
    sequence: u64,
    lifecycle: Mutex<Lifecycle>,
    handle: Mutex<Option<Box<dyn Any + Send>>>,
}

impl Plugin {
    pub(crate) fn new(
        filename: PathBuf,
        info: PluginInfo,
        loader: Weak<dyn Loader>,
        handle: Box<dyn Any + Send>,
        sequence: u64,
    ) -> Self {
        Self {
            filename,
            info,
            loader,
            sequence,
            lifecycle: Mutex::new(Lifecycle {
                state: PluginState::Unknown,
                desired_state: PluginState::Unknown,
                error: None,
                queried_at: None,
            }),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Absolute path of the file this plugin was discovered from
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// The plugin's immutable metadata
    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// The loader that produced this plugin, if it still exists
    pub fn loader(&self) -> Option<Arc<dyn Loader>> {
        self.loader.upgrade()
    }

    /// Current lifecycle state
    pub fn state(&self) -> PluginState {
        self.lifecycle.lock().unwrap().state
    }

    /// The state last requested by a controller.
    ///
    /// Differs from [`state`](Self::state) only after a failed transition:
    /// a plugin that refused to unload keeps `desired_state == Queried`
    /// while sitting in `UnloadFailed`.
    pub fn desired_state(&self) -> PluginState {
        self.lifecycle.lock().unwrap().desired_state
    }

    /// The error from the most recent failed transition, if any.
    ///
    /// Set exactly when the state is one of the failed variants; cleared on
    /// every successful transition.
    pub fn error(&self) -> Option<Arc<Error>> {
        self.lifecycle.lock().unwrap().error.clone()
    }

    /// Run `f` with exclusive access to the loader-private handle slot.
    ///
    /// Loaders stash their per-plugin resources here at query time (the
    /// native loader keeps the open module and plugin instance) and
    /// downcast them back during load/unload.
    pub fn with_handle<R>(&self, f: impl FnOnce(&mut Option<Box<dyn Any + Send>>) -> R) -> R {
        let mut slot = self.handle.lock().unwrap();
        f(&mut slot)
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn queried_at(&self) -> Option<SystemTime> {
        self.lifecycle.lock().unwrap().queried_at
    }

    pub(crate) fn mark_queried(&self, at: SystemTime) {
        self.lifecycle.lock().unwrap().queried_at = Some(at);
    }

    /// Replace the state, returning the previous one.
    pub(crate) fn swap_state(&self, new: PluginState) -> PluginState {
        let mut lifecycle = self.lifecycle.lock().unwrap();
        std::mem::replace(&mut lifecycle.state, new)
    }

    pub(crate) fn set_desired_state(&self, desired: PluginState) {
        self.lifecycle.lock().unwrap().desired_state = desired;
    }

    pub(crate) fn set_error(&self, error: Option<Arc<Error>>) {
        self.lifecycle.lock().unwrap().error = error;
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("id", &self.info.id())
            .field("filename", &self.filename)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
