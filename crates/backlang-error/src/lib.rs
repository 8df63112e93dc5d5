//! backlang-error - Diagnostics for the Backlang compiler
//!
//! Lowering never aborts on a semantic error. Every problem is recorded as a
//! [`Diagnostic`] attributed to the node that caused it, and the driver decides
//! whether to emit based on the accumulated [`Diagnostics`].
//!
//! # Example
//!
//! ```rust
//! use backlang_error::{Diagnostic, DiagnosticRenderer, ErrorCode, SourceCache};
//! use backlang_error::span::{Position, Span};
//!
//! let mut cache = SourceCache::new();
//! let file_id = cache.add("main.back", "fn main() { missing(); }");
//!
//! let span = Span::new(Position::new(1, 13, 12), Position::new(1, 20, 19), file_id);
//!
//! let diagnostic = Diagnostic::error("Cannot find static function 'missing'")
//!     .with_code(ErrorCode::UNRESOLVED_CALL)
//!     .with_label(span, "not found on the declaring type");
//!
//! let renderer = DiagnosticRenderer::new(&cache);
//! println!("{}", renderer.render(&diagnostic));
//! ```

pub mod diagnostic;
pub mod span;

pub use diagnostic::{
    Diagnostic, DiagnosticRenderer, ErrorCode, Label, Level, SourceCache, SourceFile,
};
pub use span::{Position, Span, Spanned};

/// Collection of diagnostics accumulated during compilation
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.level == Level::Error)
    }

    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.level == Level::Error).count()
    }

    /// Number of diagnostics carrying the given code
    pub fn count(&self, code: ErrorCode) -> usize {
        self.items.iter().filter(|d| d.code == Some(code)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Renders all diagnostics
    pub fn render(&self, cache: &SourceCache) -> String {
        let renderer = DiagnosticRenderer::new(cache);
        self.items
            .iter()
            .map(|d| renderer.render(d))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_code() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::error("a").with_code(ErrorCode::UNRESOLVED_TYPE));
        diags.push(Diagnostic::error("b").with_code(ErrorCode::UNRESOLVED_TYPE));
        diags.push(Diagnostic::warning("c"));

        assert!(diags.has_errors());
        assert_eq!(diags.len(), 3);
        assert_eq!(diags.error_count(), 2);
        assert_eq!(diags.count(ErrorCode::UNRESOLVED_TYPE), 2);
        assert_eq!(diags.count(ErrorCode::DUPLICATE_DECLARATION), 0);
    }
}
