//! Encryption module registry
//!
//! An explicit registry object, created at process start and passed by
//! reference to whatever opens files; there is no global singleton. Files
//! record the id of the module that encrypted them, and the orchestration
//! layer resolves that id back to a fresh module instance per open.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::module::EncryptionModule;

type ModuleFactory = Box<dyn Fn() -> Box<dyn EncryptionModule> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("encryption module {0:?} is already registered")]
    Duplicate(String),

    #[error("no encryption module registered for id {0:?}")]
    Unknown(String),

    #[error("no encryption modules registered")]
    Empty,
}

/// Maps module id to a factory producing fresh instances.
#[derive(Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
    default_id: Option<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module factory. The first registration becomes the
    /// default; a second registration under the same id is rejected.
    pub fn register<F>(&mut self, factory: F) -> Result<String, RegistryError>
    where
        F: Fn() -> Box<dyn EncryptionModule> + Send + Sync + 'static,
    {
        let id = factory().id();
        if self.factories.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        if self.default_id.is_none() {
            self.default_id = Some(id.clone());
        }
        tracing::debug!(module = %id, "encryption module registered");
        self.factories.insert(id.clone(), Box::new(factory));
        Ok(id)
    }

    /// A fresh instance of the module with the given id. Per-file state
    /// never crosses opens because every resolve constructs anew.
    pub fn resolve(&self, id: &str) -> Result<Box<dyn EncryptionModule>, RegistryError> {
        self.factories
            .get(id)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))
    }

    /// A fresh instance of the default (first-registered) module.
    pub fn resolve_default(&self) -> Result<Box<dyn EncryptionModule>, RegistryError> {
        let id = self.default_id.as_deref().ok_or(RegistryError::Empty)?;
        self.resolve(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
