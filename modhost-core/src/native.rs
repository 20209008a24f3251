//! Native loader - in-process dynamic modules via libloading

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use libloading::Library;

use modhost_plugin_api::{
    ABI_VERSION, CapabilityRegistry, NativePlugin, PluginConfig, PluginContext, PluginInfo,
    abi_compatible, abi_major,
};

use crate::error::Error;
use crate::loader::{Loader, QueriedPlugin};
use crate::plugin::Plugin;

const CREATE_SYMBOL: &str = "_modhost_plugin_create";
const ABI_SYMBOL: &str = "_modhost_plugin_abi_version";

type CreateFn = extern "C" fn() -> *mut dyn NativePlugin;
type AbiFn = extern "C" fn() -> u32;

#[cfg(target_os = "macos")]
const EXTENSIONS: &[&str] = &["dylib", "so"];
#[cfg(windows)]
const EXTENSIONS: &[&str] = &["dll"];
#[cfg(all(unix, not(target_os = "macos")))]
const EXTENSIONS: &[&str] = &["so"];

/// Everything the native loader keeps per plugin, parked in the Plugin's
/// handle slot. Field order matters: the instance must drop before the
/// library that contains its code.
struct NativeHandle {
    instance: Box<dyn NativePlugin>,
    context: PluginContext,
    _library: Library,
}

/// Loader for native in-process plugins.
///
/// Querying opens the module with local symbol visibility, creates the
/// plugin instance through its exported constructor, and reads its
/// metadata. If the metadata asks for globally visible symbols
/// (`bind_global`), the module is closed and re-opened with global
/// visibility before being queried again — the common case never pollutes
/// the global symbol namespace.
pub struct NativeLoader {
    capabilities: Arc<CapabilityRegistry>,
}

impl NativeLoader {
    pub fn new(capabilities: Arc<CapabilityRegistry>) -> Self {
        Self { capabilities }
    }

    #[cfg(unix)]
    fn open_module(filename: &Path, global: bool) -> Result<Library, Error> {
        use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_LOCAL, RTLD_NOW};

        let flags = RTLD_NOW | if global { RTLD_GLOBAL } else { RTLD_LOCAL };
        // SAFETY: loading a module runs its initializers; that is the point
        // of a plugin loader. The caller picked this file off the search
        // path the host configured.
        unsafe { UnixLibrary::open(Some(filename), flags) }
            .map(Library::from)
            .map_err(|source| Error::ModuleOpen {
                path: filename.to_path_buf(),
                source,
            })
    }

    #[cfg(not(unix))]
    fn open_module(filename: &Path, _global: bool) -> Result<Library, Error> {
        // SAFETY: as above; Windows has no local/global distinction.
        unsafe { Library::new(filename) }.map_err(|source| Error::ModuleOpen {
            path: filename.to_path_buf(),
            source,
        })
    }

    /// Open the module and run one query phase: ABI symbol check, instance
    /// construction, metadata query, metadata ABI check.
    fn query_module(
        &self,
        filename: &Path,
        global: bool,
    ) -> Result<(Library, Box<dyn NativePlugin>, PluginInfo), Error> {
        let library = Self::open_module(filename, global)?;

        // SAFETY: the symbol is the well-known ABI entry point with the
        // signature export_plugin! generates.
        let abi_fn: libloading::Symbol<AbiFn> = unsafe { library.get(ABI_SYMBOL.as_bytes()) }
            .map_err(|_| Error::MissingEntryPoint {
                path: filename.to_path_buf(),
                symbol: ABI_SYMBOL,
            })?;
        let module_abi = abi_fn();
        if !abi_compatible(module_abi, ABI_VERSION) {
            return Err(Error::AbiMismatch {
                path: filename.to_path_buf(),
                expected: abi_major(ABI_VERSION),
                found: module_abi,
            });
        }

        // SAFETY: well-known constructor symbol; ownership of the raw
        // pointer transfers to the returned Box.
        let create_fn: libloading::Symbol<CreateFn> = unsafe { library.get(CREATE_SYMBOL.as_bytes()) }
            .map_err(|_| Error::MissingEntryPoint {
                path: filename.to_path_buf(),
                symbol: CREATE_SYMBOL,
            })?;
        let mut instance = unsafe { Box::from_raw(create_fn()) };

        let info = match catch_unwind(AssertUnwindSafe(|| instance.query())) {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => return Err(Error::Plugin(e)),
            Err(payload) => return Err(Error::HookPanic(panic_message(payload))),
        };

        if !abi_compatible(info.abi_version(), ABI_VERSION) {
            return Err(Error::AbiMismatch {
                path: filename.to_path_buf(),
                expected: abi_major(ABI_VERSION),
                found: info.abi_version(),
            });
        }

        Ok((library, instance, info))
    }
}

impl Loader for NativeLoader {
    fn name(&self) -> &str {
        "native"
    }

    fn supported_extensions(&self) -> &[&str] {
        EXTENSIONS
    }

    fn query(&self, filename: &Path) -> Result<QueriedPlugin, Error> {
        let (library, instance, info) = self.query_module(filename, false)?;

        // Second phase only for plugins that export types for other
        // modules to consume.
        let (library, instance, info) = if info.bind_global() {
            tracing::debug!(file = %filename.display(), "Re-opening module with global symbol visibility");
            drop(instance);
            drop(library);
            self.query_module(filename, true)?
        } else {
            (library, instance, info)
        };

        let sidecar = filename.with_extension("toml");
        let config = PluginConfig::load(&sidecar).unwrap_or_default();
        let context = PluginContext::with_config(
            info.id().to_string(),
            filename.to_path_buf(),
            self.capabilities.clone(),
            config,
        );

        Ok(QueriedPlugin {
            info,
            handle: Box::new(NativeHandle {
                instance,
                context,
                _library: library,
            }),
        })
    }

    fn load(&self, plugin: &Plugin) -> Result<(), Error> {
        plugin.with_handle(|slot| {
            let handle = native_handle(plugin, slot)?;
            match catch_unwind(AssertUnwindSafe(|| {
                handle.instance.load(&mut handle.context)
            })) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Error::Plugin(e)),
                Err(payload) => Err(Error::HookPanic(panic_message(payload))),
            }
        })
    }

    fn unload(&self, plugin: &Plugin, is_shutdown: bool) -> Result<(), Error> {
        plugin.with_handle(|slot| {
            let handle = native_handle(plugin, slot)?;
            match catch_unwind(AssertUnwindSafe(|| {
                handle.instance.unload(&mut handle.context, is_shutdown)
            })) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(Error::Plugin(e)),
                Err(payload) => Err(Error::HookPanic(panic_message(payload))),
            }
        })
    }
}

fn native_handle<'a>(
    plugin: &Plugin,
    slot: &'a mut Option<Box<dyn Any + Send>>,
) -> Result<&'a mut NativeHandle, Error> {
    slot.as_mut()
        .and_then(|h| h.downcast_mut::<NativeHandle>())
        .ok_or_else(|| Error::MissingHandle {
            id: plugin.info().id().to_string(),
        })
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
