//! Registry of command declarations.
//!
//! The registry is the only place specs live once declared. Every
//! registration is validated against what is already registered so the
//! resolution engine can rely on three facts:
//!
//! 1. every dependency of a registered spec is itself registered
//! 2. the dependency relation is acyclic
//! 3. spec names and output names form one namespace without collisions
//!
//! Specs are normally registered in build order, dependencies first, through
//! [`Registry::register`]. [`Registry::register_all`] accepts a whole table of
//! declarations in any order, orders it dependency-first and rejects cycles
//! inside the table.
//!
//! Each registered spec also gets a [`SpecLocks`] table holding one async
//! mutex per parameter binding, used by the engine to run a command at most
//! once per binding.

pub mod graph;

use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strsim::levenshtein;
use tokio::sync::Mutex;

use crate::core::{EngineError, Params, Result};
use crate::spec::CommandSpec;
pub use graph::DependencyGraph;

/// Maximum edit distance, as a percentage of the requested name's length,
/// for a registered name to be suggested.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Per-spec lock table: one async mutex per parameter binding.
///
/// A binding only needs its mutex until its result is cached; the engine
/// calls [`SpecLocks::release`] after a successful run, so the table holds
/// entries for in-flight and failed bindings only.
#[derive(Debug, Default)]
pub struct SpecLocks {
    locks: DashMap<Params, Arc<Mutex<()>>>,
}

impl SpecLocks {
    /// The mutex guarding `params`, created on first use.
    pub fn for_binding(&self, params: &Params) -> Arc<Mutex<()>> {
        self.locks.entry(params.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drop the entry for `params` if it is still `lock`.
    ///
    /// Callers already waiting on `lock` keep their handle and find the
    /// cached result once they acquire it.
    pub fn release(&self, params: &Params, lock: &Arc<Mutex<()>>) {
        self.locks.remove_if(params, |_, current| Arc::ptr_eq(current, lock));
    }

    /// Number of bindings that have a mutex.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no binding currently has a mutex.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Result of [`Registry::lookup`].
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The spec that produces the value.
    pub spec: Arc<CommandSpec>,
    /// The requested name: the spec's own name or one of its outputs.
    pub value_name: String,
    /// The spec's lock table.
    pub locks: Arc<SpecLocks>,
}

impl Lookup {
    /// Whether the lookup addressed one output rather than the spec itself.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.value_name != self.spec.name()
    }
}

/// Validated, session-scoped store of specs.
#[derive(Debug, Default)]
pub struct Registry {
    specs: HashMap<String, Arc<CommandSpec>>,
    /// Output name to the name of the spec declaring it.
    outputs: HashMap<String, String>,
    locks: HashMap<String, Arc<SpecLocks>>,
    order: Vec<String>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one spec whose dependencies are all registered already.
    ///
    /// # Errors
    ///
    /// Fails when the name or one of its outputs is taken, a dependency is
    /// unknown or takes parameters, a placeholder names a multi-output spec,
    /// or the spec would close a dependency cycle. Nothing is registered on
    /// failure.
    pub fn register(&mut self, spec: CommandSpec) -> Result<()> {
        self.register_all(vec![spec])
    }

    /// Register a table of specs that may reference each other in any order.
    ///
    /// The table is validated as a whole and registered dependency-first.
    /// Either every spec is registered or none is.
    ///
    /// # Errors
    ///
    /// The same conditions as [`register`](Self::register), where
    /// dependencies may also be satisfied by other members of the table, plus
    /// cycles among members.
    pub fn register_all(&mut self, specs: Vec<CommandSpec>) -> Result<()> {
        let mut pending: HashMap<String, &CommandSpec> = HashMap::new();
        let mut pending_outputs: HashMap<String, String> = HashMap::new();

        for spec in &specs {
            let name = spec.name();
            if self.is_known(name) || pending.contains_key(name) {
                return Err(EngineError::AlreadyRegistered {
                    name: name.to_string(),
                });
            }
            pending.insert(name.to_string(), spec);
        }

        for spec in &specs {
            for (output, _) in spec.outputs() {
                if self.specs.contains_key(output) || pending.contains_key(output) {
                    return Err(EngineError::AlreadyRegistered {
                        name: output.clone(),
                    });
                }
                let owner = self.outputs.get(output).or_else(|| pending_outputs.get(output));
                if let Some(owner) = owner {
                    return Err(EngineError::OverlappingOutput {
                        output: output.clone(),
                        owner: owner.clone(),
                        spec: spec.name().to_string(),
                    });
                }
                pending_outputs.insert(output.clone(), spec.name().to_string());
            }
        }

        let mut graph = DependencyGraph::new();
        for spec in &specs {
            graph.ensure_node(spec.name());
            let tokens: HashSet<&str> = spec.template().tokens().collect();

            for dependency in spec.dependencies() {
                let owner_name = if self.specs.contains_key(dependency)
                    || pending.contains_key(dependency)
                {
                    dependency.clone()
                } else if let Some(owner) =
                    self.outputs.get(dependency).or_else(|| pending_outputs.get(dependency))
                {
                    owner.clone()
                } else {
                    return Err(EngineError::UnregisteredDependency {
                        spec: spec.name().to_string(),
                        dependency: dependency.clone(),
                    });
                };

                let owner: &CommandSpec = match self.specs.get(&owner_name) {
                    Some(registered) => registered.as_ref(),
                    None => pending.get(&owner_name).copied().ok_or_else(|| {
                        EngineError::UnregisteredDependency {
                            spec: spec.name().to_string(),
                            dependency: dependency.clone(),
                        }
                    })?,
                };

                if !owner.parameters().is_empty() {
                    return Err(EngineError::ParameterizedDependency {
                        spec: spec.name().to_string(),
                        dependency: dependency.clone(),
                    });
                }
                if owner.name() == dependency
                    && owner.has_outputs()
                    && tokens.contains(dependency.as_str())
                {
                    return Err(EngineError::MultiOutputPlaceholder {
                        spec: spec.name().to_string(),
                        token: dependency.clone(),
                    });
                }

                graph.add_dependency(spec.name(), &owner_name);
            }
        }

        let order = graph.dependency_order()?;

        let mut by_name: HashMap<String, CommandSpec> =
            specs.into_iter().map(|spec| (spec.name().to_string(), spec)).collect();
        for name in order {
            if let Some(spec) = by_name.remove(&name) {
                self.insert(spec);
            }
        }

        Ok(())
    }

    fn insert(&mut self, spec: CommandSpec) {
        let name = spec.name().to_string();
        tracing::debug!(
            target: "registry",
            "Registered '{}' ({} dependencies, {} parameters, {} outputs)",
            name,
            spec.dependencies().len(),
            spec.parameters().len(),
            spec.outputs().len()
        );
        for (output, _) in spec.outputs() {
            self.outputs.insert(output.clone(), name.clone());
        }
        self.locks.insert(name.clone(), Arc::new(SpecLocks::default()));
        self.specs.insert(name.clone(), Arc::new(spec));
        self.order.push(name);
    }

    fn is_known(&self, name: &str) -> bool {
        self.specs.contains_key(name) || self.outputs.contains_key(name)
    }

    /// Find the spec producing `name`, either as its own name or as one of
    /// its declared outputs.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnregisteredValue`], listing similar registered names.
    pub fn lookup(&self, name: &str) -> Result<Lookup> {
        let owner = if self.specs.contains_key(name) {
            name
        } else if let Some(owner) = self.outputs.get(name) {
            owner.as_str()
        } else {
            return Err(EngineError::UnregisteredValue {
                name: name.to_string(),
                similar: self.similar_names(name),
            });
        };

        match (self.specs.get(owner), self.locks.get(owner)) {
            (Some(spec), Some(locks)) => Ok(Lookup {
                spec: Arc::clone(spec),
                value_name: name.to_string(),
                locks: Arc::clone(locks),
            }),
            _ => Err(EngineError::UnregisteredValue {
                name: name.to_string(),
                similar: Vec::new(),
            }),
        }
    }

    /// The spec registered under exactly `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CommandSpec>> {
        self.specs.get(name).cloned()
    }

    /// Whether `name` is a registered spec or output.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.is_known(name)
    }

    /// Spec names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of registered specs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Drop every spec and lock table.
    pub fn clear(&mut self) {
        self.specs.clear();
        self.outputs.clear();
        self.locks.clear();
        self.order.clear();
    }

    fn similar_names(&self, target: &str) -> Vec<String> {
        let mut scored: Vec<(&String, usize)> = self
            .specs
            .keys()
            .chain(self.outputs.keys())
            .map(|name| (name, levenshtein(target, name)))
            .collect();
        scored.sort_by(|(a, da), (b, db)| da.cmp(db).then_with(|| a.cmp(b)));

        scored
            .into_iter()
            .filter(|(_, dist)| *dist <= target.len() * SIMILARITY_THRESHOLD_PERCENT / 100)
            .take(3)
            .map(|(name, _)| name.clone())
            .collect()
    }
}
