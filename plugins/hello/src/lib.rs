//! modhost-hello - sample native plugin
//!
//! Demonstrates the full plugin surface: metadata via the builder, a
//! capability registered at load time and deregistered at unload, and the
//! `export_plugin!` entry points.

use modhost_plugin_api::{
    ABI_VERSION, NativePlugin, PluginContext, PluginError, PluginInfo, export_plugin,
};

pub const PLUGIN_ID: &str = "modhost/hello";

/// The capability other plugins (or the host) can instantiate by name.
pub const GREETER_CAPABILITY: &str = "hello.greeter";

/// A trivial service exported through the capability registry.
pub struct Greeter {
    greeting: String,
}

impl Greeter {
    pub fn greet(&self, name: &str) -> String {
        format!("{}, {name}!", self.greeting)
    }
}

#[derive(Default)]
pub struct HelloPlugin;

impl NativePlugin for HelloPlugin {
    fn query(&mut self) -> Result<PluginInfo, PluginError> {
        PluginInfo::builder(PLUGIN_ID)
            .abi_version(ABI_VERSION)
            .name("Hello")
            .version(env!("CARGO_PKG_VERSION"))
            .summary("Greets whoever asks")
            .category("examples")
            .author("modhost contributors")
            .build()
            .map_err(|e| PluginError::metadata(e.to_string()))
    }

    fn load(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        let greeting: String = ctx
            .config_get("greeting")
            .unwrap_or_else(|| "Hello".to_string());

        ctx.capabilities()
            .register(
                GREETER_CAPABILITY,
                PLUGIN_ID,
                Box::new(move || {
                    Box::new(Greeter {
                        greeting: greeting.clone(),
                    })
                }),
            )
            .map_err(|e| PluginError::custom(e.to_string()))?;

        ctx.log_info("hello plugin loaded");
        Ok(())
    }

    fn unload(&mut self, ctx: &mut PluginContext, shutdown: bool) -> Result<(), PluginError> {
        // During process exit the registry dies with us anyway.
        if shutdown {
            tracing::debug!("skipping capability teardown during shutdown");
            return Ok(());
        }
        ctx.capabilities()
            .deregister(GREETER_CAPABILITY, PLUGIN_ID)
            .map_err(|e| PluginError::UnloadRefused(e.to_string()))
    }
}

export_plugin!(HelloPlugin);
