//! Command declarations.
//!
//! A [`CommandSpec`] declares one named, shell-backed value: the command
//! template that produces it, the values it depends on, the parameters a
//! caller must supply and, optionally, the typed outputs its result is split
//! into. Specs are immutable once built, and [`CommandSpecBuilder::build`]
//! refuses any declaration that could produce an unresolvable template.
//!
//! ```
//! use ghflow::core::ValueType;
//! use ghflow::parsers;
//! use ghflow::spec::CommandSpec;
//!
//! # fn main() -> Result<(), ghflow::core::EngineError> {
//! let current = CommandSpec::builder("current_branch", "git branch --show-current")
//!     .description("Branch checked out in the working tree")
//!     .build()?;
//!
//! let issue = CommandSpec::builder("issue", "gh issue view {number} --json title,number")
//!     .parameter("number", ValueType::Int)
//!     .output("title", ValueType::Str)
//!     .output("number", ValueType::Int)
//!     .parser(parsers::json_object)
//!     .build()?;
//!
//! assert!(issue.declares_output("title"));
//! assert_eq!(current.dependencies().len(), 0);
//! # Ok(())
//! # }
//! ```

pub mod template;

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::core::{EngineError, Result, Value, ValueType};
pub use template::{Segment, Template, is_valid_name};

const NAME_RULE: &str =
    "is not a valid name: use letters, digits, '_', '.' or '-', starting with a letter or '_'";

/// Output parser: raw command output to typed outputs.
pub type Parser =
    Arc<dyn Fn(&str) -> anyhow::Result<BTreeMap<String, Value>> + Send + Sync + 'static>;

/// Immutable declaration of one resolvable value.
#[derive(Clone)]
pub struct CommandSpec {
    name: String,
    template: Template,
    description: String,
    dependencies: Vec<String>,
    parameters: Vec<(String, ValueType)>,
    outputs: Vec<(String, ValueType)>,
    parser: Option<Parser>,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("template", &self.template.source())
            .field("dependencies", &self.dependencies)
            .field("parameters", &self.parameters)
            .field("outputs", &self.outputs)
            .field("parser", &self.parser.is_some())
            .finish_non_exhaustive()
    }
}

impl CommandSpec {
    /// Start declaring a spec.
    pub fn builder(name: impl Into<String>, template: impl Into<String>) -> CommandSpecBuilder {
        CommandSpecBuilder {
            name: name.into(),
            template: template.into(),
            description: String::new(),
            dependencies: Vec::new(),
            parameters: Vec::new(),
            outputs: Vec::new(),
            parser: None,
        }
    }

    /// Unique name of the spec.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed command template.
    #[must_use]
    pub const fn template(&self) -> &Template {
        &self.template
    }

    /// Human-readable label used in logs.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Names of the values that must resolve before the template is final.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Declared parameters, in declaration order.
    #[must_use]
    pub fn parameters(&self) -> &[(String, ValueType)] {
        &self.parameters
    }

    /// Declared outputs, in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[(String, ValueType)] {
        &self.outputs
    }

    /// The output parser, set exactly when outputs are declared.
    #[must_use]
    pub fn parser(&self) -> Option<&Parser> {
        self.parser.as_ref()
    }

    /// Whether the result is split into outputs.
    #[must_use]
    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    /// Whether `name` is one of this spec's outputs.
    #[must_use]
    pub fn declares_output(&self, name: &str) -> bool {
        self.outputs.iter().any(|(output, _)| output == name)
    }

    /// Declared type of a parameter.
    #[must_use]
    pub fn parameter_type(&self, name: &str) -> Option<ValueType> {
        self.parameters.iter().find(|(p, _)| p == name).map(|(_, ty)| *ty)
    }

    /// Label for logs: the description when present, the name otherwise.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.description.is_empty() { &self.name } else { &self.description }
    }
}

/// Builder for [`CommandSpec`]; validation happens in [`build`](Self::build).
pub struct CommandSpecBuilder {
    name: String,
    template: String,
    description: String,
    dependencies: Vec<String>,
    parameters: Vec<(String, ValueType)>,
    outputs: Vec<(String, ValueType)>,
    parser: Option<Parser>,
}

impl CommandSpecBuilder {
    /// Set the log label.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add one dependency.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// Add several dependencies.
    #[must_use]
    pub fn depends_on_all<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }

    /// Declare a caller-supplied parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.parameters.push((name.into(), ty));
        self
    }

    /// Declare one output of the parsed result.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        self.outputs.push((name.into(), ty));
        self
    }

    /// Set the output parser.
    #[must_use]
    pub fn parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<BTreeMap<String, Value>> + Send + Sync + 'static,
    {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Validate the declaration and freeze it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the spec and the offending
    /// name or token when:
    /// - a name is empty or cannot be written as a `{token}`
    /// - a parser is set without outputs, or outputs without a parser
    /// - an output is named like the spec
    /// - a dependency, parameter or output is declared twice, a parameter
    ///   shares a dependency's name, or the spec depends on itself
    /// - a placeholder repeats, names nothing declared, or names both a
    ///   parameter and a dependency
    pub fn build(self) -> Result<CommandSpec> {
        let spec = self.name.clone();

        if spec.is_empty() {
            return Err(EngineError::InvalidName {
                spec,
                reason: "spec name is empty".to_string(),
            });
        }
        let mut all_names = self
            .dependencies
            .iter()
            .chain(self.parameters.iter().map(|(n, _)| n))
            .chain(self.outputs.iter().map(|(n, _)| n));
        if all_names.any(String::is_empty) {
            return Err(EngineError::InvalidName {
                spec,
                reason: "a dependency, parameter or output name is empty".to_string(),
            });
        }
        if !template::is_valid_name(&spec) {
            return Err(EngineError::InvalidName {
                reason: format!("'{spec}' {NAME_RULE}"),
                spec,
            });
        }
        let invalid = self
            .dependencies
            .iter()
            .chain(self.parameters.iter().map(|(n, _)| n))
            .chain(self.outputs.iter().map(|(n, _)| n))
            .find(|name| !template::is_valid_name(name));
        if let Some(name) = invalid {
            return Err(EngineError::InvalidName {
                reason: format!("'{name}' {NAME_RULE}"),
                spec,
            });
        }

        match (self.parser.is_some(), self.outputs.is_empty()) {
            (true, true) => {
                return Err(EngineError::ParserOutputMismatch {
                    spec,
                    reason: "has a parser but declares no outputs".to_string(),
                });
            }
            (false, false) => {
                return Err(EngineError::ParserOutputMismatch {
                    spec,
                    reason: "declares outputs but has no parser".to_string(),
                });
            }
            _ => {}
        }

        if self.outputs.iter().any(|(output, _)| *output == spec) {
            return Err(EngineError::OutputNamedAsSpec {
                spec,
            });
        }
        if self.dependencies.iter().any(|dep| *dep == spec) {
            return Err(EngineError::SelfDependency {
                spec,
            });
        }

        check_unique(&spec, self.dependencies.iter(), "a dependency")?;
        check_unique(&spec, self.parameters.iter().map(|(n, _)| n), "a parameter")?;
        check_unique(&spec, self.outputs.iter().map(|(n, _)| n), "an output")?;

        let dependencies: HashSet<&str> = self.dependencies.iter().map(String::as_str).collect();
        let parameters: HashSet<&str> = self.parameters.iter().map(|(n, _)| n.as_str()).collect();

        if let Some(name) = self.parameters.iter().map(|(n, _)| n).find(|n| *n == &spec) {
            return Err(EngineError::DuplicateDeclaration {
                spec: spec.clone(),
                name: name.clone(),
                what: "the spec name and a parameter".to_string(),
            });
        }

        let template = Template::parse(&self.template);
        let mut seen = HashSet::new();
        for token in template.tokens() {
            if !seen.insert(token) {
                return Err(EngineError::DuplicatePlaceholder {
                    spec,
                    token: token.to_string(),
                });
            }
            match (parameters.contains(token), dependencies.contains(token)) {
                (true, true) => {
                    return Err(EngineError::AmbiguousPlaceholder {
                        spec,
                        token: token.to_string(),
                    });
                }
                (false, false) => {
                    return Err(EngineError::UnknownPlaceholder {
                        spec,
                        token: token.to_string(),
                    });
                }
                _ => {}
            }
        }

        // A parameter that is also a dependency can never be supplied unambiguously.
        if let Some(name) =
            self.parameters.iter().map(|(n, _)| n).find(|n| dependencies.contains(n.as_str()))
        {
            return Err(EngineError::DuplicateDeclaration {
                spec: spec.clone(),
                name: name.clone(),
                what: "a parameter and a dependency".to_string(),
            });
        }

        Ok(CommandSpec {
            name: self.name,
            template,
            description: self.description,
            dependencies: self.dependencies,
            parameters: self.parameters,
            outputs: self.outputs,
            parser: self.parser,
        })
    }
}

fn check_unique<'a>(
    spec: &str,
    names: impl Iterator<Item = &'a String>,
    what: &str,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(EngineError::DuplicateDeclaration {
                spec: spec.to_string(),
                name: name.clone(),
                what: what.to_string(),
            });
        }
    }
    Ok(())
}
