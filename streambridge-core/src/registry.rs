//! Named factories for pluggable components. Sources and sinks register a
//! constructor under a name; configuration selects by name at build time.
//! Misconfiguration (duplicate registration, unknown name) surfaces as a
//! typed [Error::Config] instead of a dynamic cast failure at runtime.

use std::collections::HashMap;

use crate::error::{Error, Result};

type Factory<C, T> = Box<dyn Fn(&C) -> Result<T> + Send + Sync>;

/// A name-indexed set of component factories. `C` is the configuration type
/// the factory consumes, `T` the component it produces.
pub struct Registry<C, T> {
    factories: HashMap<&'static str, Factory<C, T>>,
}

impl<C, T> Registry<C, T> {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under `name`. Registering a name twice is a wiring
    /// defect and fails immediately.
    pub fn register(
        &mut self,
        name: &'static str,
        factory: impl Fn(&C) -> Result<T> + Send + Sync + 'static,
    ) -> Result<()> {
        if self.factories.contains_key(name) {
            return Err(Error::Config(format!(
                "component '{name}' is already registered"
            )));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Build the component registered under `name` from `config`.
    pub fn build(&self, name: &str, config: &C) -> Result<T> {
        let factory = self.factories.get(name).ok_or_else(|| {
            Error::Config(format!(
                "unknown component '{name}', available: {:?}",
                self.names()
            ))
        })?;
        factory(config)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl<C, T> Default for Registry<C, T> {
    fn default() -> Self {
        Self::new()
    }
}
