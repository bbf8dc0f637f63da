//! Module Loader - Dependency-ordered registration of world modules
//!
//! Modules declare the modules they depend on. The loader builds the
//! dependency graph, orders it with Kahn's algorithm and then lets each module
//! register its types, dependencies first. A load either registers every new
//! module or none of them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::event_bus::EventBus;
use super::type_registry::{ModuleRegistrar, RegistryError, TypeRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleLoadError {
    #[error("Circular module dependency: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
    #[error("Module '{module}' depends on '{dependency}', which is not available")]
    MissingDependency { module: String, dependency: String },
    #[error("Module '{0}' was supplied more than once")]
    DuplicateModule(String),
    #[error("Module '{module}' failed to register: {source}")]
    Registration {
        module: String,
        #[source]
        source: RegistryError,
    },
}

/// An independently authored extension of the world's type system
pub trait WorldModule: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Names of modules whose types this module relies on
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Register this module's types. Dependencies are already registered.
    fn register(&self, registrar: &mut ModuleRegistrar<'_>) -> Result<(), RegistryError>;

    /// Called once after a successful load with the world's event bus
    fn subscribe(&self, _bus: &EventBus) {}
}

type RegisterFn = dyn Fn(&mut ModuleRegistrar<'_>) -> Result<(), RegistryError> + Send + Sync;

/// A module given as plain data plus a registration callback
pub struct ModuleDescriptor {
    pub name: String,
    pub version: String,
    pub dependencies: Vec<String>,
    register: Box<RegisterFn>,
}

impl ModuleDescriptor {
    pub fn new<F>(name: impl Into<String>, register: F) -> Self
    where
        F: Fn(&mut ModuleRegistrar<'_>) -> Result<(), RegistryError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            dependencies: Vec::new(),
            register: Box::new(register),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn depends_on(mut self, module: impl Into<String>) -> Self {
        self.dependencies.push(module.into());
        self
    }
}

impl std::fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl WorldModule for ModuleDescriptor {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn register(&self, registrar: &mut ModuleRegistrar<'_>) -> Result<(), RegistryError> {
        (self.register)(registrar)
    }
}

/// What a load did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Newly registered modules, in registration order
    pub registered: Vec<String>,
    /// Modules that were already loaded and left untouched
    pub skipped: Vec<String>,
}

/// Orders and registers world modules
pub struct ModuleLoader;

impl ModuleLoader {
    /// Compute the registration order for the modules not yet in `registry`
    ///
    /// Returns indices into `modules`. Dependencies may be satisfied by
    /// modules already loaded into the registry.
    pub fn resolve_order(
        modules: &[Arc<dyn WorldModule>],
        registry: &TypeRegistry,
    ) -> Result<Vec<usize>, ModuleLoadError> {
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, module) in modules.iter().enumerate() {
            if registry.is_module_loaded(module.name()) {
                continue;
            }
            if pending.insert(module.name(), index).is_some() {
                return Err(ModuleLoadError::DuplicateModule(module.name().to_string()));
            }
        }

        // Edges point from a dependency to the modules waiting on it
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        let mut in_degree: BTreeMap<&str, usize> = pending.keys().map(|name| (*name, 0)).collect();
        let mut waiting_on: BTreeMap<&str, Vec<String>> = BTreeMap::new();

        for (&name, &index) in &pending {
            let dependencies = modules[index].dependencies();
            for dependency in &dependencies {
                if let Some((&dep_name, _)) = pending.get_key_value(dependency.as_str()) {
                    dependents.entry(dep_name).or_default().push(name);
                    *in_degree.entry(name).or_default() += 1;
                } else if !registry.is_module_loaded(dependency) {
                    return Err(ModuleLoadError::MissingDependency {
                        module: name.to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }
            waiting_on.insert(name, dependencies);
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(pending.len());

        while let Some(name) = ready.pop_first() {
            order.push(pending[name]);
            for &dependent in dependents.get(name).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < pending.len() {
            let stuck: BTreeSet<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(name, _)| *name)
                .collect();
            return Err(ModuleLoadError::CircularDependency {
                cycle: find_cycle(&stuck, &waiting_on),
            });
        }

        Ok(order)
    }

    /// Register every module not already in `registry`, dependencies first
    ///
    /// Registration runs against a copy of the registry which replaces the
    /// original only when every module succeeded.
    pub fn load(
        registry: &mut TypeRegistry,
        modules: &[Arc<dyn WorldModule>],
    ) -> Result<LoadReport, ModuleLoadError> {
        let order = Self::resolve_order(modules, registry)?;
        let mut report = LoadReport {
            registered: Vec::with_capacity(order.len()),
            skipped: modules
                .iter()
                .filter(|module| registry.is_module_loaded(module.name()))
                .map(|module| module.name().to_string())
                .collect(),
        };

        let mut staged = registry.clone();
        for index in order {
            let module = &modules[index];
            let mut registrar = ModuleRegistrar::new(&mut staged, module.name());
            module
                .register(&mut registrar)
                .map_err(|source| ModuleLoadError::Registration {
                    module: module.name().to_string(),
                    source,
                })?;
            staged.mark_module_loaded(module.name(), module.version());
            debug!(module = %module.name(), version = %module.version(), "Module registered");
            report.registered.push(module.name().to_string());
        }

        *registry = staged;
        info!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "Modules loaded"
        );
        Ok(report)
    }
}

/// Walk dependency edges inside the stuck set until a module repeats
fn find_cycle(stuck: &BTreeSet<&str>, waiting_on: &BTreeMap<&str, Vec<String>>) -> Vec<String> {
    let Some(&start) = stuck.iter().next() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    let mut current = start;
    loop {
        if let Some(position) = path.iter().position(|name| *name == current) {
            let mut cycle: Vec<String> = path[position..].iter().map(|s| s.to_string()).collect();
            cycle.push(current.to_string());
            return cycle;
        }
        path.push(current);

        let next = waiting_on
            .get(current)
            .into_iter()
            .flatten()
            .find_map(|dependency| stuck.get(dependency.as_str()).copied());
        match next {
            Some(next) => current = next,
            None => return path.iter().map(|s| s.to_string()).collect(),
        }
    }
}
