//! Step-kind registry: constructor closures keyed by kind name.
//!
//! Replaces reflection-style plugin loading: embedders register a
//! constructor per step kind, and `Graph::prepare` resolves every
//! `StepDefinition.kind` through the registry before anything is
//! instantiated.

use std::collections::HashMap;

use crate::step::Step;
use crate::steps::{FieldValidator, Passthrough, RowGenerator};

type StepFactory = Box<dyn Fn() -> Box<dyn Step> + Send + Sync>;

/// Maps step kind names to constructors.
#[derive(Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl StepRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-loaded with the bundled step kinds:
    /// `row_generator`, `passthrough`, `injector` (an alias of
    /// passthrough, conventionally used as the external-feed entry
    /// step), and `field_validator`.
    #[must_use]
    pub fn with_builtin_steps() -> Self {
        let mut registry = Self::new();
        registry.register("row_generator", || Box::new(RowGenerator::default()));
        registry.register("passthrough", || Box::new(Passthrough::default()));
        registry.register("injector", || Box::new(Passthrough::default()));
        registry.register("field_validator", || Box::new(FieldValidator::default()));
        registry
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Step> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// `true` if `kind` resolves.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Construct a fresh instance of `kind`.
    #[must_use]
    pub fn create(&self, kind: &str) -> Option<Box<dyn Step>> {
        self.factories.get(kind).map(|f| f())
    }

    /// Registered kind names, unordered.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
