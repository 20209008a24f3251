//! modhost-plugin-api - Plugin API for modhost hosts
//!
//! This crate provides the traits and types needed to write native plugins
//! for applications embedding the modhost plugin manager. Plugins are Rust
//! dynamic libraries that declare their metadata at query time and run
//! load/unload hooks under the host's lifecycle management.
//!
//! # Example
//!
//! ```ignore
//! use modhost_plugin_api::{
//!     ABI_VERSION, NativePlugin, PluginContext, PluginError, PluginInfo, export_plugin,
//! };
//!
//! #[derive(Default)]
//! pub struct MyPlugin;
//!
//! impl NativePlugin for MyPlugin {
//!     fn query(&mut self) -> Result<PluginInfo, PluginError> {
//!         PluginInfo::builder("example/my-plugin")
//!             .abi_version(ABI_VERSION)
//!             .name("My Plugin")
//!             .version("0.1.0")
//!             .build()
//!             .map_err(|e| PluginError::metadata(e.to_string()))
//!     }
//!
//!     fn load(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
//!         ctx.log_info("Plugin loaded!");
//!         Ok(())
//!     }
//!
//!     fn unload(&mut self, _ctx: &mut PluginContext, _shutdown: bool) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(MyPlugin);
//! ```

pub mod abi;
pub mod capability;
pub mod context;
pub mod error;
pub mod info;

pub use abi::{ABI_VERSION, abi_compatible, abi_major, abi_version};
pub use capability::{CapabilityError, CapabilityFactory, CapabilityInstance, CapabilityRegistry};
pub use context::{PluginConfig, PluginContext};
pub use error::PluginError;
pub use info::{InfoError, PluginInfo, PluginInfoBuilder};

/// The hook surface a native plugin implements.
///
/// `query` runs before the plugin is indexed and must be side-effect free
/// beyond building the returned metadata. `load` and `unload` run only
/// under the host manager's lifecycle control; `shutdown` is true when the
/// whole process is tearing down, permitting the plugin to skip cleanup
/// that is pointless or unsafe during exit.
pub trait NativePlugin: Send {
    /// Return plugin metadata. Must not mutate global state.
    fn query(&mut self) -> Result<PluginInfo, PluginError>;

    /// Called when the plugin is loaded.
    fn load(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError>;

    /// Called when the plugin is unloaded.
    fn unload(&mut self, ctx: &mut PluginContext, shutdown: bool) -> Result<(), PluginError>;
}

/// Export a plugin type for dynamic loading.
///
/// This macro generates the C ABI entry points a modhost host looks up in
/// the module.
///
/// # Usage
///
/// ```ignore
/// modhost_plugin_api::export_plugin!(MyPlugin);
/// ```
///
/// # Generated Functions
///
/// - `_modhost_plugin_create()`: Creates a new plugin instance
/// - `_modhost_plugin_abi_version()`: Returns the ABI version
/// - `_modhost_plugin_destroy()`: Destroys a plugin instance
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _modhost_plugin_create() -> *mut dyn $crate::NativePlugin {
            let plugin: Box<dyn $crate::NativePlugin> = Box::new(<$plugin_type>::default());
            Box::into_raw(plugin)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _modhost_plugin_abi_version() -> u32 {
            $crate::ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _modhost_plugin_destroy(ptr: *mut dyn $crate::NativePlugin) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    };
}
