//! Diagnostic - compiler-style error messages
//!
//! A diagnostic carries:
//! - an error code (ER001, ED002, ...)
//! - the span of the node that caused it
//! - optional secondary labels, notes and help lines

use crate::span::Span;
use std::fmt;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Note,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A label pointing to a region of the source
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    /// Primary labels mark the offending node, secondary ones give context
    pub primary: bool,
}

impl Label {
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: true,
        }
    }

    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            primary: false,
        }
    }
}

/// Structured error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (R = Resolution, D = Declaration, S = Syntax recovery)
    pub category: char,
    pub number: u16,
}

impl ErrorCode {
    pub const fn new(category: char, number: u16) -> Self {
        Self { category, number }
    }

    // Resolution errors
    pub const UNRESOLVED_TYPE: Self = Self::new('R', 1);
    pub const UNRESOLVED_CALL: Self = Self::new('R', 2);
    pub const UNRESOLVED_NAME: Self = Self::new('R', 3);

    // Declaration errors
    pub const DUPLICATE_DECLARATION: Self = Self::new('D', 1);
    pub const INVALID_INHERITANCE: Self = Self::new('D', 2);
    pub const INVALID_ATTRIBUTE_TARGET: Self = Self::new('D', 3);

    // Parser recovery nodes that reached lowering
    pub const MALFORMED_EXPRESSION: Self = Self::new('S', 1);

    /// Kebab-case name of the error kind
    pub fn kind(&self) -> &'static str {
        match *self {
            Self::UNRESOLVED_TYPE => "unresolved-type",
            Self::UNRESOLVED_CALL => "unresolved-call",
            Self::UNRESOLVED_NAME => "unresolved-name",
            Self::DUPLICATE_DECLARATION => "duplicate-declaration",
            Self::INVALID_INHERITANCE => "invalid-inheritance",
            Self::INVALID_ATTRIBUTE_TARGET => "invalid-attribute-target",
            Self::MALFORMED_EXPRESSION => "malformed-expression",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}{:03}", self.category, self.number)
    }
}

/// A complete diagnostic
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct Diagnostic {
    pub level: Level,
    pub code: Option<ErrorCode>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

impl Diagnostic {
    fn with_level(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(Level::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(Level::Warning, message)
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds the primary label
    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span, message));
        self
    }

    pub fn with_secondary_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label::secondary(span, message));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }

    /// Span of the first primary label, if any
    pub fn primary_span(&self) -> Option<Span> {
        self.labels.iter().find(|l| l.primary).map(|l| l.span)
    }
}

/// Source text of every tree, indexed by `Span::file_id`
#[derive(Debug, Default)]
pub struct SourceCache {
    files: Vec<SourceFile>,
}

#[derive(Debug)]
pub struct SourceFile {
    pub name: String,
    pub source: String,
    lines: Vec<(usize, usize)>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let mut lines = Vec::new();
        let mut offset = 0;
        for line in source.split_inclusive('\n') {
            let text = line.trim_end_matches(['\n', '\r']);
            lines.push((offset, offset + text.len()));
            offset += line.len();
        }

        Self {
            name: name.into(),
            source,
            lines,
        }
    }

    /// 1-based line, without its terminator
    pub fn line(&self, number: u32) -> Option<&str> {
        let index = usize::try_from(number.checked_sub(1)?).ok()?;
        let &(start, end) = self.lines.get(index)?;
        self.source.get(start..end)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source and returns its file id
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> u32 {
        self.files.push(SourceFile::new(name, source));
        (self.files.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> Option<&SourceFile> {
        self.files.get(id as usize)
    }
}

/// ANSI sequences, empty when colors are off
#[derive(Debug, Clone, Copy)]
struct Palette {
    reset: &'static str,
    bold: &'static str,
    gutter: &'static str,
    help: &'static str,
    error: &'static str,
    warning: &'static str,
    note: &'static str,
}

impl Palette {
    const ANSI: Palette = Palette {
        reset: "\x1b[0m",
        bold: "\x1b[1m",
        gutter: "\x1b[1;34m",
        help: "\x1b[1;32m",
        error: "\x1b[1;31m",
        warning: "\x1b[1;33m",
        note: "\x1b[1;36m",
    };

    const PLAIN: Palette = Palette {
        reset: "",
        bold: "",
        gutter: "",
        help: "",
        error: "",
        warning: "",
        note: "",
    };

    fn level(&self, level: Level) -> &'static str {
        match level {
            Level::Error => self.error,
            Level::Warning => self.warning,
            Level::Note => self.note,
        }
    }
}

/// Renders diagnostics as rustc-style text
pub struct DiagnosticRenderer<'a> {
    cache: &'a SourceCache,
    palette: Palette,
}

impl<'a> DiagnosticRenderer<'a> {
    pub fn new(cache: &'a SourceCache) -> Self {
        Self {
            cache,
            palette: Palette::ANSI,
        }
    }

    pub fn without_colors(mut self) -> Self {
        self.palette = Palette::PLAIN;
        self
    }

    pub fn render(&self, diagnostic: &Diagnostic) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.write(&mut out, diagnostic);
        out
    }

    fn write(&self, out: &mut impl fmt::Write, diagnostic: &Diagnostic) -> fmt::Result {
        let p = self.palette;
        let accent = p.level(diagnostic.level);

        write!(out, "{}{}", accent, diagnostic.level)?;
        if let Some(code) = diagnostic.code {
            write!(out, "[{}]", code)?;
        }
        writeln!(out, "{}{}: {}{}", p.reset, p.bold, diagnostic.message, p.reset)?;

        for label in &diagnostic.labels {
            self.write_label(out, label, accent)?;
        }
        for note in &diagnostic.notes {
            writeln!(out, "   = {}note{}: {}", p.bold, p.reset, note)?;
        }
        for help in &diagnostic.help {
            writeln!(out, "   = {}help{}: {}", p.help, p.reset, help)?;
        }
        Ok(())
    }

    fn write_label(&self, out: &mut impl fmt::Write, label: &Label, accent: &str) -> fmt::Result {
        let p = self.palette;
        let start = label.span.start;
        let end = label.span.end;

        let Some(file) = self.cache.get(label.span.file_id) else {
            return writeln!(out, " {}-->{} {}:{}: {}", p.gutter, p.reset, start.line, start.column, label.message);
        };
        writeln!(out, " {}-->{} {}:{}:{}", p.gutter, p.reset, file.name, start.line, start.column)?;

        let Some(text) = file.line(start.line) else {
            return Ok(());
        };
        let number = start.line.to_string();
        let pad = " ".repeat(number.len());
        let indent = (start.column as usize).saturating_sub(1);
        let width = if start.line == end.line {
            end.column.saturating_sub(start.column) as usize
        } else {
            text.len().saturating_sub(indent)
        }
        .max(1);
        let (mark, color) = if label.primary { ('^', accent) } else { ('-', p.gutter) };

        writeln!(out, " {} {}|{}", pad, p.gutter, p.reset)?;
        writeln!(out, " {}{} |{} {}", p.gutter, number, p.reset, text)?;
        writeln!(
            out,
            " {} {}|{} {}{}{} {}{}",
            pad,
            p.gutter,
            p.reset,
            " ".repeat(indent),
            color,
            mark.to_string().repeat(width),
            label.message,
            p.reset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Position;

    #[test]
    fn test_diagnostic_rendering() {
        let mut cache = SourceCache::new();
        let file_id = cache.add("shapes.back", "struct Point {\n    x: flaot;\n}");

        let span = Span::new(Position::new(2, 8, 22), Position::new(2, 13, 27), file_id);

        let diagnostic = Diagnostic::error("Type flaot cannot be found")
            .with_code(ErrorCode::UNRESOLVED_TYPE)
            .with_label(span, "not a registered type or primitive alias")
            .with_help("primitive aliases include i32, f32, f64, bool, string");

        let output = DiagnosticRenderer::new(&cache).without_colors().render(&diagnostic);

        assert!(output.contains("error[ER001]"));
        assert!(output.contains("shapes.back:2:8"));
        assert!(output.contains("    x: flaot;"));
        assert!(output.contains("^^^^^"));
        assert!(output.contains("help: primitive aliases"));
    }

    #[test]
    fn test_render_without_source() {
        let cache = SourceCache::new();
        let diagnostic = Diagnostic::error("Cannot find static function 'missing'")
            .with_code(ErrorCode::UNRESOLVED_CALL)
            .with_label(Span::point(Position::new(4, 2, 0), 7), "called here");

        let output = DiagnosticRenderer::new(&cache).without_colors().render(&diagnostic);
        assert!(output.contains("error[ER002]"));
        assert!(output.contains("4:2: called here"));
    }

    #[test]
    fn test_source_lines() {
        let file = SourceFile::new("main.back", "fn main() {\r\n    print(1);\n}");
        assert_eq!(file.line_count(), 3);
        assert_eq!(file.line(1), Some("fn main() {"));
        assert_eq!(file.line(2), Some("    print(1);"));
        assert_eq!(file.line(3), Some("}"));
        assert_eq!(file.line(0), None);
        assert_eq!(file.line(4), None);
    }

    #[test]
    fn test_error_code_kinds() {
        assert_eq!(ErrorCode::DUPLICATE_DECLARATION.to_string(), "ED001");
        assert_eq!(ErrorCode::INVALID_INHERITANCE.kind(), "invalid-inheritance");
        assert_eq!(ErrorCode::MALFORMED_EXPRESSION.kind(), "malformed-expression");
        assert_eq!(ErrorCode::new('X', 9).kind(), "unknown");
    }
}
