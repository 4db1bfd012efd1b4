//! Scheme-keyed constructors for importers and exporters.

use std::collections::BTreeMap;

use crate::error::{CaskError, Result};
use crate::exporter::{Exporter, FsExporter};
use crate::importer::{FsImporter, Importer};

pub type Constructor<T> = fn(&str) -> Result<Box<T>>;

pub type ImporterRegistry = Registry<Constructor<dyn Importer>>;
pub type ExporterRegistry = Registry<Constructor<dyn Exporter>>;

/// Split `scheme://rest`; a bare path belongs to `fs`.
pub fn split_location(location: &str) -> (&str, &str) {
    match location.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("fs", location),
    }
}

pub struct Registry<C> {
    constructors: BTreeMap<String, C>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }
}

impl<C: Copy> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scheme: &str, ctor: C) -> Result<()> {
        if self.constructors.contains_key(scheme) {
            return Err(CaskError::DuplicateRegistration(scheme.to_string()));
        }
        self.constructors.insert(scheme.to_string(), ctor);
        Ok(())
    }

    pub fn get(&self, scheme: &str) -> Option<C> {
        self.constructors.get(scheme).copied()
    }

    pub fn schemes(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }
}

impl<T: ?Sized> Registry<Constructor<T>> {
    /// Build the implementation registered for the location's scheme.
    pub fn create(&self, location: &str) -> Result<Box<T>> {
        let (scheme, rest) = split_location(location);
        let ctor = self
            .get(scheme)
            .ok_or_else(|| CaskError::UnsupportedScheme(scheme.to_string()))?;
        ctor(rest)
    }
}

fn fs_importer(location: &str) -> Result<Box<dyn Importer>> {
    Ok(Box::new(FsImporter::new(location)?))
}

fn fs_exporter(location: &str) -> Result<Box<dyn Exporter>> {
    Ok(Box::new(FsExporter::new(location)?))
}

impl Registry<Constructor<dyn Importer>> {
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.constructors.insert("fs".into(), fs_importer as Constructor<dyn Importer>);
        registry
    }
}

impl Registry<Constructor<dyn Exporter>> {
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.constructors.insert("fs".into(), fs_exporter as Constructor<dyn Exporter>);
        registry
    }
}
