//! Error handling for ghflow
//!
//! The engine reports every failure as an [`EngineError`]. Variants fall into
//! three kinds (see [`ErrorKind`]):
//!
//! - **Configuration**: a defect in a command declaration or in the way a value
//!   was requested. Never retried; the message alone names what to fix.
//! - **Execution**: a command ran and failed (non-zero exit) or could not be
//!   run at all. The caller decides whether this aborts, see
//!   [`Engine::resolve_soft`](crate::engine::Engine::resolve_soft).
//! - **Internal**: the registry or substitution step found a state that the
//!   registration checks should have made impossible.
//!
//! For CLI display, [`user_friendly_error`] turns any [`anyhow::Error`] into an
//! [`ErrorContext`] with a suggestion attached.
//!
//! ```rust,no_run
//! use ghflow::core::{EngineError, user_friendly_error};
//!
//! let err = EngineError::UnregisteredValue {
//!     name: "branchh".to_string(),
//!     similar: vec!["branch".to_string()],
//! };
//! user_friendly_error(anyhow::Error::from(err)).display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Broad classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid declaration or request. Fatal, never retried.
    Configuration,
    /// A command failed while running.
    Execution,
    /// Engine consistency violation. Fatal.
    Internal,
}

/// Every failure the engine can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A spec, parameter, output or dependency name is empty or cannot be
    /// written as a `{token}`.
    #[error("Invalid name in spec '{spec}': {reason}")]
    InvalidName {
        /// Spec being declared
        spec: String,
        /// What is wrong with the name
        reason: String,
    },

    /// A placeholder appears more than once in a template.
    #[error("Template of '{spec}' uses placeholder '{{{token}}}' more than once")]
    DuplicatePlaceholder {
        /// Spec being declared
        spec: String,
        /// Repeated token
        token: String,
    },

    /// A placeholder names neither a parameter nor a dependency.
    #[error(
        "Template of '{spec}' uses placeholder '{{{token}}}' which is neither a parameter nor a dependency"
    )]
    UnknownPlaceholder {
        /// Spec being declared
        spec: String,
        /// Unrecognised token
        token: String,
    },

    /// A placeholder names both a parameter and a dependency.
    #[error("Placeholder '{{{token}}}' in '{spec}' is both a parameter and a dependency")]
    AmbiguousPlaceholder {
        /// Spec being declared
        spec: String,
        /// Ambiguous token
        token: String,
    },

    /// A parser was given without outputs, or outputs without a parser.
    #[error("Spec '{spec}' {reason}")]
    ParserOutputMismatch {
        /// Spec being declared
        spec: String,
        /// Which half is missing
        reason: String,
    },

    /// An output shares the spec's own name.
    #[error("Spec '{spec}' declares an output with its own name")]
    OutputNamedAsSpec {
        /// Spec being declared
        spec: String,
    },

    /// The same name is declared twice within one spec.
    #[error("Spec '{spec}' declares '{name}' more than once as {what}")]
    DuplicateDeclaration {
        /// Spec being declared
        spec: String,
        /// Repeated name
        name: String,
        /// "a dependency", "a parameter", "an output" or a combination
        what: String,
    },

    /// A spec lists itself as a dependency.
    #[error("Spec '{spec}' depends on itself")]
    SelfDependency {
        /// Spec being declared
        spec: String,
    },

    /// A spec or output name is already taken in the registry.
    #[error("Value '{name}' is already registered")]
    AlreadyRegistered {
        /// Name that collided
        name: String,
    },

    /// A dependency was not registered before its dependent.
    #[error("Spec '{spec}' depends on '{dependency}', which is not registered")]
    UnregisteredDependency {
        /// Dependent spec
        spec: String,
        /// Missing dependency
        dependency: String,
    },

    /// A dependency requires caller-supplied parameters.
    #[error(
        "Spec '{spec}' depends on '{dependency}', which takes parameters; dependencies are resolved without parameters"
    )]
    ParameterizedDependency {
        /// Dependent spec
        spec: String,
        /// Parameterized dependency
        dependency: String,
    },

    /// A template placeholder names a spec that has several outputs.
    #[error(
        "Placeholder '{{{token}}}' in '{spec}' names a spec with several outputs; depend on one of its outputs instead"
    )]
    MultiOutputPlaceholder {
        /// Dependent spec
        spec: String,
        /// Offending placeholder
        token: String,
    },

    /// Registering would create a dependency cycle.
    #[error("Circular dependency detected: {chain}")]
    CircularDependency {
        /// The cycle, e.g. `A → B → A`
        chain: String,
    },

    /// No spec or output answers to the requested name.
    #[error("Value '{name}' is not registered")]
    UnregisteredValue {
        /// Requested name
        name: String,
        /// Registered names close to the requested one
        similar: Vec<String>,
    },

    /// Declared parameters were not supplied.
    #[error("Missing parameters for '{spec}': {}", .names.join(", "))]
    MissingParameters {
        /// Spec being resolved
        spec: String,
        /// Parameters not supplied
        names: Vec<String>,
    },

    /// Parameters were supplied that the spec does not declare.
    #[error("Unexpected parameters for '{spec}': {}", .names.join(", "))]
    UnexpectedParameters {
        /// Spec being resolved
        spec: String,
        /// Parameters not declared
        names: Vec<String>,
    },

    /// A supplied parameter has the wrong type.
    #[error("Parameter '{name}' of '{spec}' must be {expected}, got {found}")]
    ParameterType {
        /// Spec being resolved
        spec: String,
        /// Parameter name
        name: String,
        /// Declared type
        expected: String,
        /// Kind of the supplied value
        found: String,
    },

    /// The output parser rejected the command's output.
    #[error("Failed to parse output of '{spec}': {reason}")]
    ParseFailed {
        /// Spec being resolved
        spec: String,
        /// Parser error, with its causes
        reason: String,
    },

    /// The parser did not produce a declared output.
    #[error("Output '{output}' of '{spec}' is missing from the parsed result")]
    MissingOutput {
        /// Spec being resolved
        spec: String,
        /// Missing output
        output: String,
    },

    /// The parser produced a declared output with the wrong type.
    #[error("Output '{output}' of '{spec}' must be {expected}, got {found}")]
    OutputType {
        /// Spec being resolved
        spec: String,
        /// Output name
        output: String,
        /// Declared type
        expected: String,
        /// Kind of the parsed value
        found: String,
    },

    /// A command exited with a non-zero status.
    #[error("Command failed with exit code {}: {command}", display_code(.exit_code))]
    CommandFailed {
        /// The finalized command line
        command: String,
        /// Exit code, `None` when killed by a signal
        exit_code: Option<i32>,
        /// Captured stderr, verbatim
        stderr: String,
    },

    /// The runner could not run the command at all.
    #[error("Failed to run '{command}': {reason}")]
    RunnerFailed {
        /// The finalized command line
        command: String,
        /// Runner error, with its causes
        reason: String,
    },

    /// Two specs declare the same output.
    #[error("Output '{output}' of '{spec}' is already declared by '{owner}'")]
    OverlappingOutput {
        /// Output name
        output: String,
        /// Spec already owning it
        owner: String,
        /// Spec being registered
        spec: String,
    },

    /// A placeholder had no value at substitution time.
    #[error("Placeholder '{{{token}}}' of '{spec}' has no value after substitution")]
    UnsubstitutedPlaceholder {
        /// Spec being resolved
        spec: String,
        /// Placeholder left over
        token: String,
    },

    /// A placeholder resolved to a value with no string form.
    #[error("Placeholder '{{{token}}}' of '{spec}' resolved to a {found}, which cannot be substituted")]
    NonScalarSubstitution {
        /// Spec being resolved
        spec: String,
        /// Placeholder
        token: String,
        /// Kind of the resolved value
        found: String,
    },

    /// A failure that did not originate in the engine.
    #[error("{message}")]
    Other {
        /// Rendered error chain
        message: String,
    },
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl EngineError {
    /// Which of the three error kinds this is.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::CommandFailed { .. } | Self::RunnerFailed { .. } => ErrorKind::Execution,
            Self::OverlappingOutput { .. }
            | Self::UnsubstitutedPlaceholder { .. }
            | Self::NonScalarSubstitution { .. } => ErrorKind::Internal,
            _ => ErrorKind::Configuration,
        }
    }

    /// Whether calling again could succeed. Only execution errors qualify.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Execution)
    }
}

/// Error plus the suggestion and details shown to CLI users.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: EngineError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error with no suggestion or details.
    #[must_use]
    pub const fn new(error: EngineError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr: error in red, details in yellow, suggestion
    /// in green.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] for display.
///
/// [`EngineError`]s get a tailored suggestion; anything else is reported with
/// its full cause chain as a runner failure.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(engine_error) = error.downcast_ref::<EngineError>() {
        return create_error_context(engine_error.clone());
    }

    let mut message = error.to_string();
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(EngineError::Other { message })
}

fn create_error_context(error: EngineError) -> ErrorContext {
    match &error {
        EngineError::UnregisteredValue { similar, .. } if !similar.is_empty() => {
            let hint = format!("Did you mean: {}?", similar.join(", "));
            ErrorContext::new(error).with_suggestion(hint)
        }
        EngineError::UnregisteredValue { .. } => ErrorContext::new(error)
            .with_suggestion("Register the spec (or the spec declaring this output) before resolving it"),
        EngineError::UnregisteredDependency { .. } => ErrorContext::new(error)
            .with_suggestion("Register dependencies before their dependents, or use register_all")
            .with_details("Specs are registered in build order so the dependency graph stays acyclic"),
        EngineError::CircularDependency { .. } => ErrorContext::new(error)
            .with_suggestion("Remove one of the dependencies listed in the cycle"),
        EngineError::MissingParameters { .. }
        | EngineError::UnexpectedParameters { .. }
        | EngineError::ParameterType { .. } => ErrorContext::new(error)
            .with_suggestion("Pass exactly the parameters the spec declares, with their declared types"),
        EngineError::MultiOutputPlaceholder { .. } => ErrorContext::new(error)
            .with_suggestion("Add the output you need to the dependency list and use it as the placeholder"),
        EngineError::CommandFailed { stderr, .. } => {
            let ctx = ErrorContext::new(error.clone());
            if stderr.trim().is_empty() {
                ctx
            } else {
                ctx.with_details(stderr.trim().to_string())
            }
        }
        EngineError::RunnerFailed { .. } => ErrorContext::new(error)
            .with_suggestion("Check that the shell and the tools it calls (git, gh) are installed and on PATH"),
        EngineError::MissingOutput { .. }
        | EngineError::OutputType { .. }
        | EngineError::ParseFailed { .. } => ErrorContext::new(error)
            .with_details("The command's output did not match the outputs its spec declares"),
        _ => match error.kind() {
            ErrorKind::Internal => ErrorContext::new(error)
                .with_details("This indicates an inconsistent set of command declarations"),
            _ => ErrorContext::new(error),
        },
    }
}
