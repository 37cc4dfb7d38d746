use std::{fmt, str::FromStr};
use thiserror::Error;

/// Wraps a policy in a CIL block named after the policy's identity.
pub const DEFAULT_TEMPLATE: &str = "(block {name}_{namespace}\n    {policy}\n)";

const INDENT: &str = "    ";

/// Renders raw policy text into a named module.
///
/// The template is parsed once, when the wrapper is built, so that a malformed
/// template is reported at startup rather than on every reconcile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModuleWrapper {
    segments: Vec<Segment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Name,
    Namespace,
    Policy,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),

    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("template must reference {{{0}}}")]
    MissingPlaceholder(&'static str),
}

// === impl ModuleWrapper ===

impl Default for ModuleWrapper {
    fn default() -> Self {
        DEFAULT_TEMPLATE
            .parse()
            .expect("default template must be valid")
    }
}

impl FromStr for ModuleWrapper {
    type Err = TemplateError;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut rest = template;
        let mut offset = 0;
        while let Some(start) = rest.find('{') {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let end = rest[start..]
                .find('}')
                .ok_or(TemplateError::Unterminated(offset + start))?;
            let placeholder = &rest[start + 1..start + end];
            segments.push(match placeholder {
                "name" => Segment::Name,
                "namespace" => Segment::Namespace,
                "policy" => Segment::Policy,
                other => return Err(TemplateError::UnknownPlaceholder(other.to_string())),
            });
            offset += start + end + 1;
            rest = &rest[start + end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        for (required, name) in [
            (Segment::Name, "name"),
            (Segment::Namespace, "namespace"),
            (Segment::Policy, "policy"),
        ] {
            if !segments.contains(&required) {
                return Err(TemplateError::MissingPlaceholder(name));
            }
        }

        Ok(Self { segments })
    }
}

impl ModuleWrapper {
    /// Wraps `policy` in a block identified by `name` and `namespace`.
    ///
    /// The policy is trimmed and every line after the first is indented to
    /// sit inside the block.
    pub fn wrap(&self, policy: &str, name: &str, namespace: &str) -> String {
        let body = policy.trim().replace('\n', &format!("\n{INDENT}"));
        let body = body.trim();

        let mut out = String::with_capacity(body.len() + name.len() + namespace.len() + 32);
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Name => out.push_str(name),
                Segment::Namespace => out.push_str(namespace),
                Segment::Policy => out.push_str(body),
            }
        }
        out
    }
}

impl fmt::Display for ModuleWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => f.write_str(s)?,
                Segment::Name => f.write_str("{name}")?,
                Segment::Namespace => f.write_str("{namespace}")?,
                Segment::Policy => f.write_str("{policy}")?,
            }
        }
        Ok(())
    }
}
