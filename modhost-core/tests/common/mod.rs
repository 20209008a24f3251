//! Shared fixture loader for the integration suites
//!
//! `FakeLoader` reads `.fake` files containing a TOML manifest and turns
//! them into plugins whose load/unload behavior the manifest scripts. All
//! loader invocations are counted so tests can assert how often (and in
//! what order) the manager called in.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;

use modhost_core::{Error, Loader, Manager, ManagerConfig, Plugin, QueriedPlugin};
use modhost_plugin_api::{ABI_VERSION, PluginError, PluginInfo};

#[derive(Debug, Deserialize)]
struct Manifest {
    id: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(default)]
    auto_load: bool,
    #[serde(default)]
    internal: bool,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    load_fails: bool,
    #[serde(default)]
    load_panics: bool,
    #[serde(default)]
    unload_fails: bool,
}

#[derive(Debug, Default, Clone)]
struct Behavior {
    load_fails: bool,
    load_panics: bool,
    unload_fails: bool,
}

/// Per-loader invocation record
#[derive(Debug, Default)]
pub struct Counts {
    pub queries: HashMap<String, usize>,
    pub loads: HashMap<String, usize>,
    pub load_order: Vec<String>,
    pub unloads: HashMap<String, usize>,
    /// (plugin id, is_shutdown) in invocation order
    pub unload_order: Vec<(String, bool)>,
}

pub struct FakeLoader {
    counts: Mutex<Counts>,
    behaviors: Mutex<HashMap<String, Behavior>>,
}

impl FakeLoader {
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(Counts::default()),
            behaviors: Mutex::new(HashMap::new()),
        }
    }

    pub fn loads_of(&self, id: &str) -> usize {
        self.counts.lock().unwrap().loads.get(id).copied().unwrap_or(0)
    }

    pub fn unloads_of(&self, id: &str) -> usize {
        self.counts.lock().unwrap().unloads.get(id).copied().unwrap_or(0)
    }

    pub fn queries_of(&self, id: &str) -> usize {
        self.counts.lock().unwrap().queries.get(id).copied().unwrap_or(0)
    }

    pub fn load_order(&self) -> Vec<String> {
        self.counts.lock().unwrap().load_order.clone()
    }

    pub fn unload_order(&self) -> Vec<(String, bool)> {
        self.counts.lock().unwrap().unload_order.clone()
    }

    pub fn set_load_fails(&self, id: &str, fails: bool) {
        self.behaviors
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .load_fails = fails;
    }

    pub fn set_unload_fails(&self, id: &str, fails: bool) {
        self.behaviors
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .unload_fails = fails;
    }

    fn behavior_of(&self, id: &str) -> Behavior {
        self.behaviors
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Loader for FakeLoader {
    fn name(&self) -> &str {
        "fake"
    }

    fn supported_extensions(&self) -> &[&str] {
        &["fake"]
    }

    fn query(&self, filename: &Path) -> Result<QueriedPlugin, Error> {
        let text = std::fs::read_to_string(filename)?;
        let manifest: Manifest = toml::from_str(&text)
            .map_err(|e| Error::Plugin(PluginError::metadata(e.to_string())))?;

        let info = PluginInfo::builder(&manifest.id)
            .abi_version(ABI_VERSION)
            .dependencies(manifest.dependencies.clone())
            .provides(manifest.provides.clone())
            .auto_load(manifest.auto_load)
            .internal(manifest.internal)
            .priority(manifest.priority)
            .build()?;

        self.behaviors.lock().unwrap().insert(
            manifest.id.clone(),
            Behavior {
                load_fails: manifest.load_fails,
                load_panics: manifest.load_panics,
                unload_fails: manifest.unload_fails,
            },
        );
        *self
            .counts
            .lock()
            .unwrap()
            .queries
            .entry(manifest.id)
            .or_default() += 1;

        Ok(QueriedPlugin {
            info,
            handle: Box::new(()),
        })
    }

    fn load(&self, plugin: &Plugin) -> Result<(), Error> {
        let id = plugin.info().id().to_string();
        let behavior = self.behavior_of(&id);

        {
            let mut counts = self.counts.lock().unwrap();
            *counts.loads.entry(id.clone()).or_default() += 1;
            counts.load_order.push(id.clone());
        }

        if behavior.load_panics {
            let caught = std::panic::catch_unwind(|| -> () {
                panic!("deliberate load panic");
            });
            if caught.is_err() {
                return Err(Error::HookPanic("deliberate load panic".to_string()));
            }
        }
        if behavior.load_fails {
            return Err(Error::Plugin(PluginError::LoadRefused(format!(
                "{id} is scripted to refuse loading"
            ))));
        }
        Ok(())
    }

    fn unload(&self, plugin: &Plugin, is_shutdown: bool) -> Result<(), Error> {
        let id = plugin.info().id().to_string();
        let behavior = self.behavior_of(&id);

        {
            let mut counts = self.counts.lock().unwrap();
            *counts.unloads.entry(id.clone()).or_default() += 1;
            counts.unload_order.push((id.clone(), is_shutdown));
        }

        if behavior.unload_fails {
            return Err(Error::Plugin(PluginError::UnloadRefused(format!(
                "{id} is scripted to refuse unloading"
            ))));
        }
        Ok(())
    }
}

/// Write a fixture plugin manifest into `dir`
pub fn write_plugin(dir: &Path, file_name: &str, manifest: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, manifest).unwrap();
    path
}

/// A manager over `dir` with only the fake loader registered
pub fn manager_with_fake_loader(dir: &Path) -> (Manager, Arc<FakeLoader>) {
    let mut manager = Manager::new(ManagerConfig {
        paths: vec![dir.to_path_buf()],
        native_loader: false,
    });
    let loader = Arc::new(FakeLoader::new());
    manager
        .register_loader(loader.clone())
        .expect("fake loader registers cleanly");
    (manager, loader)
}
