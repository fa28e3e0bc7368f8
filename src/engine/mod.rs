//! Memoized, concurrent resolution of registered values.
//!
//! The [`Engine`] ties the [`Registry`], the [`ResultCache`] and a
//! [`CommandRunner`] together. Resolving a name:
//!
//! 1. looks up the spec producing it (by spec name or output name)
//! 2. checks the caller's parameters against the declared ones
//! 3. returns the cached value when there is one
//! 4. otherwise takes the spec's lock for this parameter binding, resolves all
//!    dependencies concurrently, renders the template, runs the command,
//!    parses and checks its outputs and caches every value it produced
//!
//! Each (spec, binding) pair runs its command at most once per engine.
//! Concurrent callers asking for the same pair wait on the lock and read the
//! value the first caller cached. Different bindings never wait on each other.
//!
//! ```rust,no_run
//! use ghflow::core::Params;
//! use ghflow::engine::Engine;
//! use ghflow::runner::ShellRunner;
//! use ghflow::spec::CommandSpec;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Engine::new(ShellRunner::new());
//! engine.register(CommandSpec::builder("branch", "git branch --show-current").build()?)?;
//! engine.register(
//!     CommandSpec::builder("upstream", "git rev-parse --abbrev-ref {branch}@{{upstream}}")
//!         .depends_on("branch")
//!         .build()?,
//! )?;
//!
//! let upstream = engine.resolve("upstream", Params::new()).await?;
//! println!("{upstream}");
//! # Ok(())
//! # }
//! ```

use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cache::{CacheKey, CacheSnapshot, ResultCache};
use crate::config::EngineConfig;
use crate::core::{EngineError, Params, Result, Value};
use crate::registry::{Lookup, Registry};
use crate::runner::{CommandOutput, CommandRunner};
use crate::spec::CommandSpec;

/// A command that exited non-zero, as reported by [`Engine::resolve_soft`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    /// The finalized command line
    pub command: String,
    /// Exit code, `None` when killed by a signal
    pub exit_code: Option<i32>,
    /// Captured stderr, verbatim
    pub stderr: String,
}

/// Outcome of [`Engine::resolve_soft`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The value resolved.
    Value(Value),
    /// A command on the way exited non-zero.
    Failed(CommandFailure),
}

impl Resolved {
    /// The value, if resolution succeeded.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    /// Consume into the value, if resolution succeeded.
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Failed(_) => None,
        }
    }

    /// Whether a command failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

struct EngineInner {
    registry: RwLock<Registry>,
    cache: ResultCache,
    runner: Arc<dyn CommandRunner>,
    verbose: AtomicBool,
}

/// Resolution engine. Cloning is cheap and clones share all state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("specs", &self.read_registry().len())
            .field("cached", &self.inner.cache.len())
            .field("verbose", &self.is_verbose())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine with an empty registry and cache.
    pub fn new<R: CommandRunner + 'static>(runner: R) -> Self {
        Self::with_runner(Arc::new(runner))
    }

    /// Create an engine around a shared runner.
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry: RwLock::new(Registry::new()),
                cache: ResultCache::new(),
                runner,
                verbose: AtomicBool::new(false),
            }),
        }
    }

    /// Create an engine with settings from `config`.
    pub fn with_config<R: CommandRunner + 'static>(runner: R, config: &EngineConfig) -> Self {
        let engine = Self::new(runner);
        engine.set_verbose(config.verbose);
        engine
    }

    /// Create an engine running commands through the shell `config` describes.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_config(config.runner(), config)
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register one spec. See [`Registry::register`].
    ///
    /// # Errors
    ///
    /// Any registration error; nothing is registered on failure.
    pub fn register(&self, spec: CommandSpec) -> Result<()> {
        self.write_registry().register(spec)
    }

    /// Register a table of specs in any order. See [`Registry::register_all`].
    ///
    /// # Errors
    ///
    /// Any registration error, including cycles among the specs; nothing is
    /// registered on failure.
    pub fn register_all(&self, specs: Vec<CommandSpec>) -> Result<()> {
        self.write_registry().register_all(specs)
    }

    /// Whether `name` is a registered spec or output.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.read_registry().contains(name)
    }

    /// Registered spec names, in registration order.
    #[must_use]
    pub fn spec_names(&self) -> Vec<String> {
        self.read_registry().names().to_vec()
    }

    /// Forget every spec, lock and cached value.
    ///
    /// Resolutions already in flight finish against the specs they looked up.
    pub fn reset(&self) {
        let mut registry = self.write_registry();
        registry.clear();
        self.inner.cache.clear();
        tracing::debug!(target: "engine", "Engine reset");
    }

    /// Log finalized commands at `info` instead of `debug`.
    pub fn set_verbose(&self, verbose: bool) {
        self.inner.verbose.store(verbose, Ordering::Relaxed);
    }

    /// Whether verbose command logging is on.
    #[must_use]
    pub fn is_verbose(&self) -> bool {
        self.inner.verbose.load(Ordering::Relaxed)
    }

    /// The cached value for `name` and `params`, without resolving anything.
    #[must_use]
    pub fn cached(&self, name: &str, params: &Params) -> Option<Value> {
        self.inner.cache.get(&CacheKey::new(name, params.clone()))
    }

    /// Export the cache.
    #[must_use]
    pub fn snapshot(&self) -> CacheSnapshot {
        self.inner.cache.snapshot()
    }

    /// Import cached values not present yet; returns how many were imported.
    pub fn restore(&self, snapshot: CacheSnapshot) -> usize {
        self.inner.cache.restore(snapshot)
    }

    /// Resolve `name` (a spec name or an output name) for `params`.
    ///
    /// # Errors
    ///
    /// Configuration errors for unknown names, bad parameters and output
    /// that does not match the declared outputs; execution errors when a
    /// command, or one of its dependencies' commands, fails. Nothing is
    /// cached for a failed spec, so a later call runs it again.
    pub async fn resolve(&self, name: &str, params: Params) -> Result<Value> {
        self.resolve_boxed(name, params).await
    }

    /// Like [`resolve`](Self::resolve), but a command exiting non-zero is
    /// returned as [`Resolved::Failed`] instead of an error.
    ///
    /// # Errors
    ///
    /// Every error other than [`EngineError::CommandFailed`].
    pub async fn resolve_soft(&self, name: &str, params: Params) -> Result<Resolved> {
        match self.resolve(name, params).await {
            Ok(value) => Ok(Resolved::Value(value)),
            Err(EngineError::CommandFailed {
                command,
                exit_code,
                stderr,
            }) => {
                tracing::warn!(target: "engine", "Resolving '{}' failed: {}", name, command);
                Ok(Resolved::Failed(CommandFailure {
                    command,
                    exit_code,
                    stderr,
                }))
            }
            Err(err) => Err(err),
        }
    }

    fn resolve_boxed<'a>(&'a self, name: &'a str, params: Params) -> BoxFuture<'a, Result<Value>> {
        async move {
            let lookup = self.read_registry().lookup(name)?;
            check_params(&lookup.spec, &params)?;

            let key = CacheKey::new(lookup.value_name.clone(), params);
            if let Some(value) = self.inner.cache.get(&key) {
                tracing::trace!(target: "engine", "Cache hit for {}", key);
                return Ok(value);
            }

            let lock = lookup.locks.for_binding(&key.params);
            let _guard = lock.lock().await;

            if let Some(value) = self.inner.cache.get(&key) {
                tracing::trace!(target: "engine", "Resolved by a concurrent caller: {}", key);
                return Ok(value);
            }

            let params = key.params.clone();
            let value = self.run_spec(&lookup, key).await?;
            lookup.locks.release(&params, &lock);
            Ok(value)
        }
        .boxed()
    }

    /// Resolve dependencies, then run the spec and cache what it produced.
    /// Called with the binding's lock held.
    async fn run_spec(&self, lookup: &Lookup, key: CacheKey) -> Result<Value> {
        let spec = &lookup.spec;
        let dependencies = spec.dependencies();

        let resolved = try_join_all(
            dependencies.iter().map(|dependency| self.resolve_boxed(dependency, Params::new())),
        )
        .await?;
        let dependency_values: HashMap<&str, Value> =
            dependencies.iter().map(String::as_str).zip(resolved).collect();

        let command = render_command(spec, &key.params, &dependency_values)?;

        if self.is_verbose() {
            tracing::info!(target: "engine", "{}: {}", spec.label(), command);
        } else {
            tracing::debug!(target: "engine", "{}: {}", spec.label(), command);
        }

        let output = self.inner.runner.run(&command).await.map_err(|err| {
            EngineError::RunnerFailed {
                command: command.clone(),
                reason: format!("{err:#}"),
            }
        })?;
        if !output.is_success() {
            return Err(EngineError::CommandFailed {
                command,
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        let value = self.store_results(spec, &key, &output)?;
        Ok(self.inner.cache.get(&key).unwrap_or(value))
    }

    /// Cache every value the output provides and return the one for `key`.
    fn store_results(
        &self,
        spec: &CommandSpec,
        key: &CacheKey,
        output: &CommandOutput,
    ) -> Result<Value> {
        let Some(parser) = spec.parser() else {
            let value = Value::Str(output.stdout.trim().to_string());
            self.inner.cache.insert(CacheKey::new(spec.name(), key.params.clone()), value.clone());
            return Ok(value);
        };

        let mut parsed = parser(&output.stdout).map_err(|err| EngineError::ParseFailed {
            spec: spec.name().to_string(),
            reason: format!("{err:#}"),
        })?;

        let mut declared = BTreeMap::new();
        for (output_name, ty) in spec.outputs() {
            let value = parsed.remove(output_name).ok_or_else(|| EngineError::MissingOutput {
                spec: spec.name().to_string(),
                output: output_name.clone(),
            })?;
            if !ty.matches(&value) {
                return Err(EngineError::OutputType {
                    spec: spec.name().to_string(),
                    output: output_name.clone(),
                    expected: ty.to_string(),
                    found: value.kind_name().to_string(),
                });
            }
            declared.insert(output_name.clone(), value);
        }
        if !parsed.is_empty() {
            tracing::trace!(
                target: "engine",
                "Ignoring undeclared fields from '{}': {}",
                spec.name(),
                parsed.keys().cloned().collect::<Vec<_>>().join(", ")
            );
        }

        for (output_name, value) in &declared {
            self.inner.cache.insert(CacheKey::new(output_name.clone(), key.params.clone()), value.clone());
        }

        let requested = declared.get(&key.name).cloned();
        let whole = Value::Map(declared);
        self.inner.cache.insert(CacheKey::new(spec.name(), key.params.clone()), whole.clone());

        Ok(requested.unwrap_or(whole))
    }
}

/// Check a binding against the spec's declared parameters.
fn check_params(spec: &CommandSpec, params: &Params) -> Result<()> {
    let missing: Vec<String> = spec
        .parameters()
        .iter()
        .filter(|(name, _)| !params.contains(name))
        .map(|(name, _)| name.clone())
        .collect();
    if !missing.is_empty() {
        return Err(EngineError::MissingParameters {
            spec: spec.name().to_string(),
            names: missing,
        });
    }

    let unexpected: Vec<String> = params
        .iter()
        .filter(|(name, _)| spec.parameter_type(name).is_none())
        .map(|(name, _)| name.clone())
        .collect();
    if !unexpected.is_empty() {
        return Err(EngineError::UnexpectedParameters {
            spec: spec.name().to_string(),
            names: unexpected,
        });
    }

    for (name, ty) in spec.parameters() {
        let Some(value) = params.get(name) else {
            continue;
        };
        if !ty.matches(value) {
            return Err(EngineError::ParameterType {
                spec: spec.name().to_string(),
                name: name.clone(),
                expected: ty.to_string(),
                found: value.kind_name().to_string(),
            });
        }
    }
    Ok(())
}

/// Substitute parameter and dependency values into the template.
fn render_command(
    spec: &CommandSpec,
    params: &Params,
    dependencies: &HashMap<&str, Value>,
) -> Result<String> {
    let mut substitutions: HashMap<&str, String> = HashMap::new();
    for token in spec.template().tokens() {
        let value = params.get(token).or_else(|| dependencies.get(token)).ok_or_else(|| {
            EngineError::UnsubstitutedPlaceholder {
                spec: spec.name().to_string(),
                token: token.to_string(),
            }
        })?;
        let text = value.as_scalar_string().ok_or_else(|| EngineError::NonScalarSubstitution {
            spec: spec.name().to_string(),
            token: token.to_string(),
            found: value.kind_name().to_string(),
        })?;
        substitutions.insert(token, text);
    }

    spec.template().render(&substitutions).map_err(|token| EngineError::UnsubstitutedPlaceholder {
        spec: spec.name().to_string(),
        token,
    })
}
