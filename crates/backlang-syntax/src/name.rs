//! Qualified names: a namespace path plus a simple name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ordered sequence of name segments, `Demo.Shapes.Circle`.
///
/// Equality is segment-wise. The empty name is the global namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct QualifiedName {
    segments: Vec<String>,
}

impl QualifiedName {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// The global (empty) namespace
    pub fn global() -> Self {
        Self::default()
    }

    /// Splits dotted text, ignoring empty segments
    pub fn parse(text: &str) -> Self {
        Self::new(text.split('.').filter(|s| !s.is_empty()))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, or "" for the global namespace
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Everything but the last segment
    pub fn qualifier(&self) -> QualifiedName {
        let end = self.segments.len().saturating_sub(1);
        Self {
            segments: self.segments[..end].to_vec(),
        }
    }

    /// Prepends `path`
    pub fn qualify(&self, path: &QualifiedName) -> QualifiedName {
        Self {
            segments: path.segments.iter().chain(&self.segments).cloned().collect(),
        }
    }

    /// Appends one segment
    pub fn child(&self, name: impl Into<String>) -> QualifiedName {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        Self { segments }
    }

    /// Replaces the last segment
    pub fn with_name(&self, name: impl Into<String>) -> QualifiedName {
        self.qualifier().child(name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for QualifiedName {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl From<String> for QualifiedName {
    fn from(text: String) -> Self {
        Self::parse(&text)
    }
}

impl From<QualifiedName> for String {
    fn from(name: QualifiedName) -> Self {
        name.to_string()
    }
}
