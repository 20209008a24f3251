//! Plugin metadata

use serde::Serialize;
use thiserror::Error;

use crate::abi::abi_major;

/// Errors raised while constructing a [`PluginInfo`]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InfoError {
    /// The plugin id is empty
    #[error("plugin id must not be empty")]
    EmptyId,

    /// No ABI version was supplied
    #[error("plugin '{id}' did not declare an ABI version")]
    MissingAbiVersion { id: String },
}

/// Immutable metadata describing one plugin.
///
/// Constructed through [`PluginInfo::builder`]; every field is write-once at
/// construction and read-many afterward. The `id` is the globally unique
/// stable identifier other plugins use in their dependency lists.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    id: String,
    abi_version: u32,
    name: String,
    version: String,
    summary: String,
    description: String,
    category: String,
    website: String,
    authors: Vec<String>,
    dependencies: Vec<String>,
    provides: Vec<String>,
    internal: bool,
    auto_load: bool,
    bind_global: bool,
    priority: i32,
}

impl PluginInfo {
    /// Start building a [`PluginInfo`] for the given id.
    ///
    /// The id and an ABI version are required; everything else defaults to
    /// empty / `false` / priority `0`.
    pub fn builder(id: impl Into<String>) -> PluginInfoBuilder {
        PluginInfoBuilder {
            id: id.into(),
            abi_version: None,
            name: String::new(),
            version: String::new(),
            summary: String::new(),
            description: String::new(),
            category: String::new(),
            website: String::new(),
            authors: Vec::new(),
            dependencies: Vec::new(),
            provides: Vec::new(),
            internal: false,
            auto_load: false,
            bind_global: false,
            priority: 0,
        }
    }

    /// Globally unique stable identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Packed ABI tag the plugin was built against
    pub fn abi_version(&self) -> u32 {
        self.abi_version
    }

    /// Major component of the declared ABI tag
    pub fn abi_major(&self) -> u8 {
        abi_major(self.abi_version)
    }

    /// Human-readable display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Plugin version string
    pub fn version(&self) -> &str {
        &self.version
    }

    /// One-line summary
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Long-form description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Category for user-facing grouping
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Project website
    pub fn website(&self) -> &str {
        &self.website
    }

    /// Plugin authors, in declared order
    pub fn authors(&self) -> &[String] {
        &self.authors
    }

    /// Ids of plugins that must be loaded before this one, in declared order
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Alternate ids this plugin satisfies for dependency resolution
    pub fn provides(&self) -> &[String] {
        &self.provides
    }

    /// Internal plugins are excluded from default user-facing listings
    pub fn internal(&self) -> bool {
        self.internal
    }

    /// Whether the manager loads this plugin automatically after query
    pub fn auto_load(&self) -> bool {
        self.auto_load
    }

    /// Whether the module's symbols must be bound with global visibility
    pub fn bind_global(&self) -> bool {
        self.bind_global
    }

    /// Tie-break ordering hint among plugins claiming the same id
    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Builder for [`PluginInfo`]
#[derive(Debug, Clone)]
pub struct PluginInfoBuilder {
    id: String,
    abi_version: Option<u32>,
    name: String,
    version: String,
    summary: String,
    description: String,
    category: String,
    website: String,
    authors: Vec<String>,
    dependencies: Vec<String>,
    provides: Vec<String>,
    internal: bool,
    auto_load: bool,
    bind_global: bool,
    priority: i32,
}

impl PluginInfoBuilder {
    pub fn abi_version(mut self, version: u32) -> Self {
        self.abi_version = Some(version);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn website(mut self, website: impl Into<String>) -> Self {
        self.website = website.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors.extend(authors.into_iter().map(Into::into));
        self
    }

    pub fn dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn provides<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn auto_load(mut self, auto_load: bool) -> Self {
        self.auto_load = auto_load;
        self
    }

    pub fn bind_global(mut self, bind_global: bool) -> Self {
        self.bind_global = bind_global;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Validate and produce the immutable [`PluginInfo`].
    ///
    /// Fails if the id is empty or no ABI version was declared; a
    /// partially-built info is never observable.
    pub fn build(self) -> Result<PluginInfo, InfoError> {
        if self.id.is_empty() {
            return Err(InfoError::EmptyId);
        }
        let abi_version = self
            .abi_version
            .ok_or(InfoError::MissingAbiVersion { id: self.id.clone() })?;

        Ok(PluginInfo {
            id: self.id,
            abi_version,
            name: self.name,
            version: self.version,
            summary: self.summary,
            description: self.description,
            category: self.category,
            website: self.website,
            authors: self.authors,
            dependencies: self.dependencies,
            provides: self.provides,
            internal: self.internal,
            auto_load: self.auto_load,
            bind_global: self.bind_global,
            priority: self.priority,
        })
    }
}
