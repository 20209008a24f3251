//! Capability registry - cross-plugin constructor sharing
//!
//! A provider plugin registers a named factory at load time; other plugins
//! (or the host) instantiate it by name without linking against the
//! provider. Deregistration is refused while any constructed instance is
//! still alive, so a provider cannot be unloaded out from under live
//! objects whose code lives in its module.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Factory producing one capability instance per call
pub type CapabilityFactory = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// Errors raised by the [`CapabilityRegistry`]
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// A capability with this name is already registered
    #[error("capability '{name}' already registered by '{owner}'")]
    Duplicate { name: String, owner: String },

    /// No capability registered under this name
    #[error("no capability registered as '{name}'")]
    Unknown { name: String },

    /// Deregistration attempted by a plugin that is not the registrant
    #[error("capability '{name}' is owned by '{registered_owner}', not '{owner}'")]
    NotOwner {
        name: String,
        owner: String,
        registered_owner: String,
    },

    /// Deregistration refused because constructed instances are still alive
    #[error("capability '{name}' still has {live} live instance(s)")]
    InUse { name: String, live: usize },
}

struct Entry {
    owner: String,
    factory: CapabilityFactory,
    /// Every constructed instance holds a clone; strong_count - 1 is the
    /// number of instances still alive.
    live: Arc<()>,
}

/// One constructed capability, paired with its liveness token.
///
/// The token must stay attached to the value for the registry's unload
/// guard to observe the instance, so downcasts borrow rather than unwrap.
pub struct CapabilityInstance {
    value: Box<dyn Any + Send>,
    _live: Arc<()>,
}

impl CapabilityInstance {
    /// Whether the contained value is a `T`
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrow the contained value as a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutably borrow the contained value as a `T`
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }
}

impl std::fmt::Debug for CapabilityInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityInstance").finish_non_exhaustive()
    }
}

/// Process-wide registry of named capability factories
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, owned by plugin `owner`.
    pub fn register(
        &self,
        name: impl Into<String>,
        owner: impl Into<String>,
        factory: CapabilityFactory,
    ) -> Result<(), CapabilityError> {
        let name = name.into();
        let owner = owner.into();
        let mut entries = self.entries.lock().unwrap();

        if let Some(existing) = entries.get(&name) {
            return Err(CapabilityError::Duplicate {
                name,
                owner: existing.owner.clone(),
            });
        }

        tracing::debug!(capability = %name, owner = %owner, "Capability registered");
        entries.insert(
            name,
            Entry {
                owner,
                factory,
                live: Arc::new(()),
            },
        );
        Ok(())
    }

    /// Construct an instance of the named capability.
    pub fn create(&self, name: &str) -> Result<CapabilityInstance, CapabilityError> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(name).ok_or_else(|| CapabilityError::Unknown {
            name: name.to_string(),
        })?;

        Ok(CapabilityInstance {
            value: (entry.factory)(),
            _live: entry.live.clone(),
        })
    }

    /// Remove the named capability.
    ///
    /// Fails with [`CapabilityError::InUse`] while any instance created from
    /// it is still alive, and with [`CapabilityError::NotOwner`] when called
    /// by a plugin other than the registrant.
    pub fn deregister(&self, name: &str, owner: &str) -> Result<(), CapabilityError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.get(name).ok_or_else(|| CapabilityError::Unknown {
            name: name.to_string(),
        })?;

        if entry.owner != owner {
            return Err(CapabilityError::NotOwner {
                name: name.to_string(),
                owner: owner.to_string(),
                registered_owner: entry.owner.clone(),
            });
        }

        let live = Arc::strong_count(&entry.live) - 1;
        if live > 0 {
            return Err(CapabilityError::InUse {
                name: name.to_string(),
                live,
            });
        }

        tracing::debug!(capability = %name, owner = %owner, "Capability deregistered");
        entries.remove(name);
        Ok(())
    }

    /// Owner of the named capability, if registered
    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|e| e.owner.clone())
    }

    /// Number of live instances of the named capability
    pub fn live_instances(&self, name: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .get(name)
            .map(|e| Arc::strong_count(&e.live) - 1)
            .unwrap_or(0)
    }

    /// Names of all registered capabilities, unordered
    pub fn names(&self) -> Vec<String> {
        self.entries.lock().unwrap().keys().cloned().collect()
    }
}
