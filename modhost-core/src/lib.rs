//! modhost-core: plugin discovery and lifecycle management
//!
//! This crate provides the infrastructure for finding, loading, and
//! unloading native plugins:
//!
//! - [`Manager`]: the orchestrator — owns loaders, search paths, and the
//!   discovered-plugin index, and resolves dependencies before loading
//! - [`Loader`]: per-technology backend implementing query/load/unload
//! - [`Plugin`] / [`PluginState`]: one discovered plugin and its lifecycle
//! - [`Source`] / [`FileSource`]: scan strategies driven by refresh
//! - [`FileTree`]: the two-level directory scan behind the file source
//!
//! # Example
//!
//! ```ignore
//! use modhost_core::{Manager, ManagerConfig};
//!
//! let mut manager = Manager::new(ManagerConfig::default());
//! manager.add_default_paths("/usr");
//! manager.append_paths_from_env("MODHOST_PLUGIN_PATH");
//! manager.refresh();
//!
//! if let Some(plugin) = manager.find_plugin("example/hello") {
//!     manager.load_plugin(&plugin)?;
//! }
//!
//! manager.shutdown();
//! ```
//!
//! The manager is synchronous and single-threaded by design: every
//! operation runs to completion on the calling thread, and state-change
//! notifications fire inside the call that caused them. Hosts that need
//! discovery off their latency-sensitive path run `refresh()` on a worker
//! thread of their own.

pub mod error;
pub mod file_tree;
pub mod loader;
pub mod manager;
pub mod native;
pub mod plugin;
pub mod source;

pub use error::{DependencyError, Error};
pub use file_tree::{DirectoryNode, FileNode, FileTree};
pub use loader::{Loader, QueriedPlugin};
pub use manager::{Manager, ManagerConfig, ObserverId};
pub use native::NativeLoader;
pub use plugin::{Plugin, PluginState};
pub use source::{FileSource, Source};

// Re-export the plugin-author API so hosts depend on one crate.
pub use modhost_plugin_api as plugin_api;
