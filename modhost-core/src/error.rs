//! Error types for the plugin manager

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use modhost_plugin_api::{InfoError, PluginError};

use crate::plugin::PluginState;

/// Errors that can occur while discovering, loading, or unloading plugins
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open a dynamic module
    #[error("failed to open module {path}: {source}")]
    ModuleOpen {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// A required entry-point symbol is missing from the module
    #[error("module {path} is missing entry point {symbol}")]
    MissingEntryPoint { path: PathBuf, symbol: &'static str },

    /// The module was built against an incompatible ABI revision
    #[error("module {path} declares ABI {found:#010x}, host expects major {expected}")]
    AbiMismatch {
        path: PathBuf,
        expected: u8,
        found: u32,
    },

    /// The plugin has no loader-private handle attached
    #[error("plugin '{id}' has no native handle")]
    MissingHandle { id: String },

    /// A plugin hook panicked; the panic was contained by the loader
    #[error("plugin hook panicked: {0}")]
    HookPanic(String),

    /// Plugin metadata failed validation
    #[error("invalid plugin metadata: {0}")]
    Info(#[from] InfoError),

    /// A plugin hook returned an error
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// A loader claimed an extension another loader already handles
    #[error("extension '{extension}' is already claimed by loader '{loader}'")]
    ExtensionConflict { extension: String, loader: String },

    /// The operation is not valid for the plugin's current state
    #[error("plugin '{id}' is {state}, expected {expected}")]
    WrongState {
        id: String,
        state: PluginState,
        expected: &'static str,
    },

    /// The loader that produced this plugin no longer exists
    #[error("loader for plugin '{id}' is gone")]
    LoaderGone { id: String },

    /// The plugin's own loader failed to load it
    #[error("plugin '{id}' failed to load: {cause}")]
    LoadFailure { id: String, cause: Arc<Error> },

    /// The plugin's own loader failed to unload it
    #[error("plugin '{id}' failed to unload: {cause}")]
    UnloadFailure { id: String, cause: Arc<Error> },

    /// Dependency resolution failed before the plugin's loader was invoked
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Dependency-resolution failures.
///
/// Distinguished from a plugin's own load failure: when one of these is
/// returned the target plugin's loader was never invoked and its state is
/// unchanged.
#[derive(Error, Debug)]
pub enum DependencyError {
    /// No known plugin has or provides the requested id
    #[error("plugin '{plugin}' depends on '{dependency}', which is not known")]
    Missing { plugin: String, dependency: String },

    /// The dependency graph contains a cycle
    #[error("dependency cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// A dependency resolved but failed to load
    #[error("dependency '{dependency}' of plugin '{plugin}' failed to load: {source}")]
    Failed {
        plugin: String,
        dependency: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Stable domain tag identifying the error category.
    pub fn domain(&self) -> &'static str {
        match self {
            Error::ModuleOpen { .. }
            | Error::MissingEntryPoint { .. }
            | Error::AbiMismatch { .. }
            | Error::MissingHandle { .. }
            | Error::HookPanic(_) => "loader",
            Error::Info(_) | Error::Plugin(_) => "plugin",
            Error::Dependency(_) => "dependency",
            Error::ExtensionConflict { .. }
            | Error::WrongState { .. }
            | Error::LoaderGone { .. }
            | Error::LoadFailure { .. }
            | Error::UnloadFailure { .. } => "manager",
            Error::Io(_) => "io",
        }
    }

    /// Stable numeric code within the domain.
    pub fn code(&self) -> u32 {
        match self {
            Error::ModuleOpen { .. } => 1,
            Error::MissingEntryPoint { .. } => 2,
            Error::AbiMismatch { .. } => 3,
            Error::MissingHandle { .. } => 4,
            Error::HookPanic(_) => 5,
            Error::Info(_) => 6,
            Error::Plugin(_) => 7,
            Error::ExtensionConflict { .. } => 8,
            Error::WrongState { .. } => 9,
            Error::LoaderGone { .. } => 10,
            Error::LoadFailure { .. } => 11,
            Error::UnloadFailure { .. } => 12,
            Error::Dependency(DependencyError::Missing { .. }) => 13,
            Error::Dependency(DependencyError::Cycle { .. }) => 14,
            Error::Dependency(DependencyError::Failed { .. }) => 15,
            Error::Io(_) => 16,
        }
    }
}
