//! Command templates with `{token}` placeholders.
//!
//! A token is a name (`[A-Za-z_][A-Za-z0-9_.-]*`) between single braces.
//! `{{` and `}}` produce literal braces. Any other brace sequence is kept as
//! literal text, so shell snippets such as `awk '{print $1}'` survive
//! untouched. Every name a spec can declare matches the token grammar (see
//! [`is_valid_name`]), so every declared value is addressable.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Escaped braces or a single-brace group with no braces inside.
static BRACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}").expect("brace pattern is valid"));

/// The token grammar.
static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("name pattern is valid"));

/// Whether `name` can appear as a `{token}` placeholder.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    NAME.is_match(name)
}

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied verbatim.
    Literal(String),
    /// A `{token}` to be substituted.
    Placeholder(String),
}

/// A parsed command template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse a template string. Parsing never fails; validation of the tokens
    /// against a spec's declarations happens in
    /// [`CommandSpecBuilder::build`](super::CommandSpecBuilder::build).
    #[must_use]
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut last = 0;

        for cap in BRACES.captures_iter(source) {
            let Some(whole) = cap.get(0) else {
                continue;
            };
            literal.push_str(&source[last..whole.start()]);
            last = whole.end();

            match (whole.as_str(), cap.get(1)) {
                ("{{", _) => literal.push('{'),
                ("}}", _) => literal.push('}'),
                (_, Some(body)) if is_valid_name(body.as_str()) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(body.as_str().to_string()));
                }
                (text, _) => literal.push_str(text),
            }
        }
        literal.push_str(&source[last..]);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self {
            source: source.to_string(),
            segments,
        }
    }

    /// The template as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed segments in order.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder tokens in order of appearance, repeats included.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(token) => Some(token.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Replace every placeholder with its value.
    ///
    /// Returns the first token without a value as the error.
    pub fn render(&self, values: &HashMap<&str, String>) -> Result<String, String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(token) => {
                    let value = values.get(token.as_str()).ok_or_else(|| token.clone())?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placeholders() {
        let template = Template::parse("git checkout -b {branch} {base}");
        assert_eq!(template.tokens().collect::<Vec<_>>(), vec!["branch", "base"]);
        assert_eq!(
            template.segments()[0],
            Segment::Literal("git checkout -b ".to_string())
        );
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let template = Template::parse("gh api --jq '{{title: .title}}' issues/{number}");
        assert_eq!(template.tokens().collect::<Vec<_>>(), vec!["number"]);

        let values = HashMap::from([("number", "7".to_string())]);
        assert_eq!(template.render(&values).unwrap(), "gh api --jq '{title: .title}' issues/7");
    }

    #[test]
    fn test_non_identifier_braces_are_literal() {
        let template = Template::parse("git log | awk '{print $1}' | head -{ 3 }");
        assert_eq!(template.tokens().count(), 0);
        let rendered = template.render(&HashMap::new()).unwrap();
        assert_eq!(rendered, "git log | awk '{print $1}' | head -{ 3 }");
    }

    #[test]
    fn test_repeated_tokens_are_reported() {
        let template = Template::parse("{x}{x}");
        assert_eq!(template.tokens().collect::<Vec<_>>(), vec!["x", "x"]);
    }

    #[test]
    fn test_dotted_and_dashed_tokens() {
        let template = Template::parse("echo {issue.title} {base-ref}");
        assert_eq!(template.tokens().collect::<Vec<_>>(), vec!["issue.title", "base-ref"]);
    }

    #[test]
    fn test_render_reports_missing_token() {
        let template = Template::parse("echo {A}-B");
        assert_eq!(template.render(&HashMap::new()), Err("A".to_string()));
    }

    #[test]
    fn test_name_grammar() {
        assert!(is_valid_name("remote_name"));
        assert!(is_valid_name("issue.title"));
        assert!(is_valid_name("_private-1"));
        assert!(!is_valid_name("remote url"));
        assert!(!is_valid_name("owner/repo"));
        assert!(!is_valid_name("1st"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_escape_next_to_placeholder() {
        let template = Template::parse("echo {{{name}}}");
        assert_eq!(template.tokens().collect::<Vec<_>>(), vec!["name"]);
        let values = HashMap::from([("name", "x".to_string())]);
        assert_eq!(template.render(&values).unwrap(), "echo {x}");

        let template = Template::parse("echo ${{{{HOME}}}} {name}");
        assert_eq!(template.tokens().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(template.render(&values).unwrap(), "echo ${{HOME}} x");
    }

    #[test]
    fn test_unclosed_brace() {
        let template = Template::parse("echo {A");
        assert_eq!(template.tokens().count(), 0);
        assert_eq!(template.source(), "echo {A");
    }
}
