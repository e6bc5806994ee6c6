//! Service module registry.
//!
//! Service modules are linked into the binary and announce themselves through
//! `inventory`. The registry resolves a [`ModuleReference`] to one of them and
//! enumerates its classes:
//!
//! ```ignore
//! inventory::submit! {
//!     servekit::registry::ServiceModuleRegistrator {
//!         name: "my_service",
//!         service_class: Some("MyService"),
//!         classes: my_service_classes,
//!     }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use crate::contracts::{BASE_CONTRACT, ServiceFactory};

/// Link-time registration entry of a service module.
#[derive(Clone, Copy)]
pub struct ServiceModuleRegistrator {
    /// Module name, matched against [`ModuleReference::name`].
    pub name: &'static str,
    /// Concrete service class to serve with. When `None`, the first exported
    /// class is used.
    pub service_class: Option<&'static str>,
    /// Classes exported by the module, in declaration order.
    pub classes: fn() -> Vec<ClassDefinition>,
}

inventory::collect!(ServiceModuleRegistrator);

impl fmt::Debug for ServiceModuleRegistrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceModuleRegistrator")
            .field("name", &self.name)
            .field("service_class", &self.service_class)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
pub enum ClassKind {
    /// The abstract base contract; never instantiated.
    Contract,
    /// A concrete model-service class.
    Service(ServiceFactory),
}

#[derive(Clone, Copy)]
pub struct ClassDefinition {
    pub name: &'static str,
    pub kind: ClassKind,
}

impl ClassDefinition {
    #[must_use]
    pub const fn contract() -> Self {
        Self {
            name: BASE_CONTRACT,
            kind: ClassKind::Contract,
        }
    }

    #[must_use]
    pub const fn service(name: &'static str, factory: ServiceFactory) -> Self {
        Self {
            name,
            kind: ClassKind::Service(factory),
        }
    }

    #[must_use]
    pub fn is_contract(&self) -> bool {
        matches!(self.kind, ClassKind::Contract)
    }
}

impl fmt::Debug for ClassDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_contract() {
            "contract"
        } else {
            "service"
        };
        f.debug_struct("ClassDefinition")
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}

/// A resolved concrete service class.
#[derive(Debug, Clone, Copy)]
pub struct ServiceClass {
    pub name: &'static str,
    pub factory: ServiceFactory,
}

/// Reference to a user-supplied service module, by name or path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReference {
    raw: String,
    name: String,
}

impl ModuleReference {
    /// Parse a reference. Path-like input resolves to its file stem, and `-`
    /// is normalised to `_` (crate names vs. module names).
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidReference`] for empty input.
    pub fn new(raw: impl Into<String>) -> Result<Self, RegistryError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        let stem = Path::new(trimmed)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem.is_empty() {
            return Err(RegistryError::InvalidReference { reference: raw });
        }
        let name = stem.replace('-', "_");
        Ok(Self { raw, name })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn as_raw(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered classes of a discovered module. Index 0 is the base contract.
#[derive(Debug, Clone)]
pub struct ClassDefinitionList {
    module: &'static str,
    explicit: Option<&'static str>,
    classes: Vec<ClassDefinition>,
}

impl ClassDefinitionList {
    #[must_use]
    pub fn module(&self) -> &'static str {
        self.module
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ClassDefinition] {
        &self.classes
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.classes.iter().map(|c| c.name).collect()
    }

    /// True when at least one concrete class follows the base contract.
    #[must_use]
    pub fn derives_contract(&self) -> bool {
        self.classes.len() >= 2
    }

    /// Name of the class to serve with: the module's explicit choice, else
    /// the first class after the base contract.
    #[must_use]
    pub fn concrete_class_name(&self) -> Option<&'static str> {
        self.explicit
            .or_else(|| self.classes.get(1).map(|c| c.name))
    }
}

/// Concrete service classes by name, built during discovery.
#[derive(Debug, Clone, Default)]
pub struct RegisteredServiceMap {
    services: BTreeMap<&'static str, ServiceClass>,
}

impl RegisteredServiceMap {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ServiceClass> {
        self.services.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.services.keys().copied()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("invalid module reference '{reference}'")]
    InvalidReference { reference: String },
    #[error("service module '{module}' is registered more than once")]
    DuplicateModule { module: &'static str },
    #[error("service module '{module}' not found (available: {available})")]
    ModuleNotFound { module: String, available: String },
    #[error("service module '{module}' exports class '{class}' more than once")]
    DuplicateClass {
        module: &'static str,
        class: &'static str,
    },
    #[error("no service module has been registered yet")]
    NotRegistered,
}

/// Registry of linked service modules.
#[derive(Debug)]
pub struct ModuleRegistry {
    modules: Vec<ServiceModuleRegistrator>,
    services: Option<RegisteredServiceMap>,
}

impl ModuleRegistry {
    /// Collect every module submitted through `inventory`.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateModule`] if two modules share a name.
    pub fn from_inventory() -> Result<Self, RegistryError> {
        Self::with_modules(
            inventory::iter::<ServiceModuleRegistrator>
                .into_iter()
                .copied()
                .collect(),
        )
    }

    /// Build a registry over an explicit module set.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateModule`] if two modules share a name.
    pub fn with_modules(mut modules: Vec<ServiceModuleRegistrator>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for m in &modules {
            if !seen.insert(m.name) {
                return Err(RegistryError::DuplicateModule { module: m.name });
            }
        }
        // inventory order is unspecified
        modules.sort_by_key(|m| m.name);
        tracing::debug!(count = modules.len(), "Service module registry built");
        Ok(Self {
            modules,
            services: None,
        })
    }

    #[must_use]
    pub fn available_modules(&self) -> Vec<&'static str> {
        self.modules.iter().map(|m| m.name).collect()
    }

    /// Resolve a module and enumerate its classes, base contract first.
    ///
    /// Also (re)builds the [`RegisteredServiceMap`] from the module's
    /// concrete classes.
    ///
    /// # Errors
    /// Returns [`RegistryError::ModuleNotFound`] for an unknown module, or
    /// [`RegistryError::DuplicateClass`] if a class name repeats.
    pub fn discover(
        &mut self,
        reference: &ModuleReference,
    ) -> Result<ClassDefinitionList, RegistryError> {
        let module = self
            .modules
            .iter()
            .find(|m| m.name == reference.name())
            .copied()
            .ok_or_else(|| RegistryError::ModuleNotFound {
                module: reference.name().to_owned(),
                available: self.available_modules().join(", "),
            })?;

        let mut classes = vec![ClassDefinition::contract()];
        let mut services = BTreeMap::new();
        for class in (module.classes)() {
            match class.kind {
                // A module may re-export the base contract; keep it at index 0 only.
                ClassKind::Contract => continue,
                ClassKind::Service(factory) => {
                    let prev = services.insert(
                        class.name,
                        ServiceClass {
                            name: class.name,
                            factory,
                        },
                    );
                    if prev.is_some() {
                        return Err(RegistryError::DuplicateClass {
                            module: module.name,
                            class: class.name,
                        });
                    }
                    classes.push(class);
                }
            }
        }

        tracing::debug!(
            module = module.name,
            classes = ?classes.iter().map(|c| c.name).collect::<Vec<_>>(),
            "Discovered service module classes"
        );

        self.services = Some(RegisteredServiceMap { services });
        Ok(ClassDefinitionList {
            module: module.name,
            explicit: module.service_class,
            classes,
        })
    }

    /// Services registered by the last discovery.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotRegistered`] if `discover` has not succeeded yet.
    pub fn registered_services(&self) -> Result<&RegisteredServiceMap, RegistryError> {
        self.services.as_ref().ok_or(RegistryError::NotRegistered)
    }
}
