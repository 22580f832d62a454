//! Engine-facing schema descriptors and diagnostics.
//!
//! The engine learns each resource kind's attribute surface from a
//! [`SchemaDescriptor`] and receives operation results as
//! [`Diagnostics`]. Sensitive attributes are flagged so the engine can
//! redact them; they are stored in state but never logged.

use std::fmt;

/// Value kind of an attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttributeKind {
    /// UTF-8 string.
    String,
    /// Signed integer.
    Int,
    /// Boolean.
    Bool,
    /// Ordered list of strings.
    StringList,
    /// String-to-string map.
    StringMap,
}

/// One attribute in a resource schema.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    /// Attribute name as exposed to the engine.
    pub name: &'static str,
    /// Value kind.
    pub kind: AttributeKind,
    /// Must be set in configuration.
    pub required: bool,
    /// Filled in by the remote when unset.
    pub computed: bool,
    /// A change forces destroy-and-recreate.
    pub force_new: bool,
    /// Redacted from logs and engine output.
    pub sensitive: bool,
}

impl Attribute {
    /// A plain optional attribute.
    #[must_use]
    pub const fn optional(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            computed: false,
            force_new: false,
            sensitive: false,
        }
    }

    /// A required attribute.
    #[must_use]
    pub const fn required(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            required: true,
            ..Self::optional(name, kind)
        }
    }

    /// A server-assigned attribute.
    #[must_use]
    pub const fn computed(name: &'static str, kind: AttributeKind) -> Self {
        Self {
            computed: true,
            ..Self::optional(name, kind)
        }
    }

    /// Marks the attribute as forcing recreation on change.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Marks the attribute as sensitive.
    #[must_use]
    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Schema for one resource kind.
#[derive(Clone, Debug)]
pub struct SchemaDescriptor {
    /// Resource kind, e.g. `scaleway_instance_server`.
    pub kind: &'static str,
    /// Attribute surface.
    pub attributes: Vec<Attribute>,
}

impl SchemaDescriptor {
    /// Looks an attribute up by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    /// Names of attributes the engine must redact.
    #[must_use]
    pub fn sensitive_attributes(&self) -> Vec<&'static str> {
        self.attributes
            .iter()
            .filter(|attr| attr.sensitive)
            .map(|attr| attr.name)
            .collect()
    }
}

/// Diagnostic severity.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Severity {
    /// The operation failed.
    Error,
    /// The operation succeeded with a caveat.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => f.write_str("error"),
            Self::Warning => f.write_str("warning"),
        }
    }
}

/// One message surfaced to the engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Diagnostic {
    /// Severity of the message.
    pub severity: Severity,
    /// Short headline.
    pub summary: String,
    /// Longer explanation, possibly empty.
    pub detail: String,
    /// Offending attribute, when one can be named.
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Builds an error diagnostic.
    #[must_use]
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Builds a warning diagnostic.
    #[must_use]
    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Attaches the offending attribute path.
    #[must_use]
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

/// Accumulated diagnostics for one operation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// An empty, successful result.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends one diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// True when any entry is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    /// All accumulated entries.
    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            entries: vec![diagnostic],
        }
    }
}

#[cfg(test)]
mod tests;
