//! Named plugin registries.
//!
//! A registry is an ordinary value owned by whoever needs it; there is no
//! process-wide instance. Registering a name that is already present
//! replaces the earlier descriptor, and the replaced descriptor is handed
//! back to the caller, so the last registration always wins.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::options::Options;

/// Constructor stored in a plugin descriptor.
pub type Creator<C> = fn(&Options) -> Result<C>;

/// Descriptor of one plugin: how to create it and what it is.
pub struct Plugin<C> {
    pub creator: Creator<C>,
    pub name: String,
    pub doc: String,
    pub version: u32,
}

impl<C> Clone for Plugin<C> {
    fn clone(&self) -> Self {
        Plugin {
            creator: self.creator,
            name: self.name.clone(),
            doc: self.doc.clone(),
            version: self.version,
        }
    }
}

impl<C> fmt::Debug for Plugin<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("doc", &self.doc)
            .finish()
    }
}

impl<C> Plugin<C> {
    pub fn create(&self, options: &Options) -> Result<C> {
        (self.creator)(options)
    }
}

/// Registry of plugins creating values of type `C`, keyed by name.
pub struct PluginRegistry<C> {
    plugins: BTreeMap<String, Plugin<C>>,
}

impl<C> Default for PluginRegistry<C> {
    fn default() -> Self {
        PluginRegistry {
            plugins: BTreeMap::new(),
        }
    }
}

impl<C> PluginRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `plugin`, replacing any earlier plugin of the same name.
    /// Returns the replaced descriptor.
    pub fn register(&mut self, plugin: Plugin<C>) -> Option<Plugin<C>> {
        let name = plugin.name.clone();
        let version = plugin.version;
        let previous = self.plugins.insert(name.clone(), plugin);
        match &previous {
            Some(old) => warn!(
                "plugin '{}' re-registered: version {} replaces version {}",
                name, version, old.version
            ),
            None => debug!("plugin '{}' registered (version {})", name, version),
        }
        previous
    }

    /// Register the descriptor produced by a registration function.
    pub fn load(&mut self, registrar: fn() -> Plugin<C>) -> Option<Plugin<C>> {
        self.register(registrar())
    }

    pub fn lookup(&self, name: &str) -> Result<&Plugin<C>> {
        self.plugins.get(name).ok_or_else(|| Error::PluginNotFound {
            name: name.to_string(),
        })
    }

    /// Look up `name` and create an instance with `options`.
    pub fn create(&self, name: &str, options: &Options) -> Result<C> {
        self.lookup(name)?.create(options)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    /// Registered names in lexicographic order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn clear(&mut self) {
        self.plugins.clear();
    }
}

impl<C> fmt::Debug for PluginRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.values()).finish()
    }
}
