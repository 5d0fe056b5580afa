//! Diagnostics for the Lode analysis pipeline
//!
//! Every pass is best-effort: it reports problems here and keeps going so
//! later passes can find more. Diagnostics carry an enumerated code, a
//! severity, a message, and a source span; the output format is kept
//! LSP-compatible so editor tooling can consume `--json` output directly.

use crate::ast::Span;
use serde::Serialize;

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Convert to LSP DiagnosticSeverity number
    pub fn to_lsp_severity(&self) -> u32 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// Enumerated diagnostic codes.
///
/// The `Display` form is the stable machine-readable identifier; messages
/// are free to change, codes are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    // Symbols and scopes
    DuplicateDeclaration,
    UndefinedVariable,
    UnknownType,
    // Types
    TypeMismatch,
    ConstAssignment,
    NotCallable,
    ArityMismatch,
    NotAnArray,
    InvalidLvalue,
    MemberAccessUnsupported,
    ArraySizeUnknown,
    LiteralOutOfRange,
    // Control flow
    UnreachableCode,
    BreakOutsideLoop,
    ContinueOutsideLoop,
    MissingReturnValue,
    ReturnValueInVoid,
    // Call graph
    RecursionDetected,
    IndirectRecursionDetected,
    // Dataflow
    UnusedVariable,
    StackOverflowRisk,
    // Modules
    CircularImport,
    ModuleNotFound,
    ImportSymbolNotFound,
    SymbolNotExported,
    InvalidImportSyntax,
    // Parser handoff (rare in this core)
    ExpectedToken,
    UnexpectedToken,
    // The compiler itself broke an invariant
    InternalError,
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Code::DuplicateDeclaration => "DUPLICATE_DECLARATION",
            Code::UndefinedVariable => "UNDEFINED_VARIABLE",
            Code::UnknownType => "UNKNOWN_TYPE",
            Code::TypeMismatch => "TYPE_MISMATCH",
            Code::ConstAssignment => "CONST_ASSIGNMENT",
            Code::NotCallable => "NOT_CALLABLE",
            Code::ArityMismatch => "ARITY_MISMATCH",
            Code::NotAnArray => "NOT_AN_ARRAY",
            Code::InvalidLvalue => "INVALID_LVALUE",
            Code::MemberAccessUnsupported => "MEMBER_ACCESS_UNSUPPORTED",
            Code::ArraySizeUnknown => "ARRAY_SIZE_UNKNOWN",
            Code::LiteralOutOfRange => "LITERAL_OUT_OF_RANGE",
            Code::UnreachableCode => "UNREACHABLE_CODE",
            Code::BreakOutsideLoop => "BREAK_OUTSIDE_LOOP",
            Code::ContinueOutsideLoop => "CONTINUE_OUTSIDE_LOOP",
            Code::MissingReturnValue => "MISSING_RETURN_VALUE",
            Code::ReturnValueInVoid => "RETURN_VALUE_IN_VOID",
            Code::RecursionDetected => "RECURSION_DETECTED",
            Code::IndirectRecursionDetected => "INDIRECT_RECURSION_DETECTED",
            Code::UnusedVariable => "UNUSED_VARIABLE",
            Code::StackOverflowRisk => "STACK_OVERFLOW_RISK",
            Code::CircularImport => "CIRCULAR_IMPORT",
            Code::ModuleNotFound => "MODULE_NOT_FOUND",
            Code::ImportSymbolNotFound => "IMPORT_SYMBOL_NOT_FOUND",
            Code::SymbolNotExported => "SYMBOL_NOT_EXPORTED",
            Code::InvalidImportSyntax => "INVALID_IMPORT_SYNTAX",
            Code::ExpectedToken => "EXPECTED_TOKEN",
            Code::UnexpectedToken => "UNEXPECTED_TOKEN",
            Code::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", s)
    }
}

/// A single located diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Code,
    pub message: String,
    pub location: Span,
    /// Other spans that help explain the problem (e.g. the previous
    /// declaration for a duplicate)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<Span>,
}

impl Diagnostic {
    pub fn error(code: Code, message: impl Into<String>, location: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code,
            message: message.into(),
            location,
            related: Vec::new(),
        }
    }

    pub fn warning(code: Code, message: impl Into<String>, location: Span) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            code,
            message: message.into(),
            location,
            related: Vec::new(),
        }
    }

    pub fn info(code: Code, message: impl Into<String>, location: Span) -> Self {
        Diagnostic {
            severity: Severity::Info,
            code,
            message: message.into(),
            location,
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, span: Span) -> Self {
        self.related.push(span);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] at {}: {}",
            self.severity, self.code, self.location, self.message
        )
    }
}

/// Append-only accumulator shared by all passes.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn error(&mut self, code: Code, message: impl Into<String>, location: Span) {
        self.push(Diagnostic::error(code, message, location));
    }

    pub fn warning(&mut self, code: Code, message: impl Into<String>, location: Span) {
        self.push(Diagnostic::warning(code, message, location));
    }

    pub fn info(&mut self, code: Code, message: impl Into<String>, location: Span) {
        self.push(Diagnostic::info(code, message, location));
    }

    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity == Severity::Error)
    }

    /// Move every accumulated diagnostic out, leaving the bag empty.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.items)
    }

    pub fn extend(&mut self, other: Vec<Diagnostic>) {
        self.items.extend(other);
    }

    /// Drop exact repeats of the same code at the same location, keeping
    /// first occurrences (and therefore pass order). Applied once at the
    /// facade boundary.
    pub fn dedup(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.items.retain(|d| {
            seen.insert((
                d.code,
                d.location.start.line,
                d.location.start.column,
                d.location.start.offset,
            ))
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_lsp_mapping() {
        assert_eq!(Severity::Error.to_lsp_severity(), 1);
        assert_eq!(Severity::Warning.to_lsp_severity(), 2);
        assert_eq!(Severity::Info.to_lsp_severity(), 3);
    }

    #[test]
    fn test_code_display_is_screaming_snake() {
        assert_eq!(Code::DuplicateDeclaration.to_string(), "DUPLICATE_DECLARATION");
        assert_eq!(
            Code::IndirectRecursionDetected.to_string(),
            "INDIRECT_RECURSION_DETECTED"
        );
    }

    #[test]
    fn test_error_counting() {
        let mut diags = Diagnostics::new();
        diags.error(Code::TypeMismatch, "bad", Span::at(0, 0));
        diags.warning(Code::UnusedVariable, "meh", Span::at(1, 0));
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.warning_count(), 1);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut diags = Diagnostics::new();
        diags.error(Code::TypeMismatch, "first", Span::at(3, 1));
        diags.error(Code::TypeMismatch, "second", Span::at(3, 1));
        diags.error(Code::TypeMismatch, "elsewhere", Span::at(4, 1));
        diags.dedup();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags.items()[0].message, "first");
    }

    #[test]
    fn test_display_format() {
        let d = Diagnostic::error(Code::UndefinedVariable, "unknown name 'x'", Span::at(2, 5));
        assert_eq!(d.to_string(), "error[UNDEFINED_VARIABLE] at 3:6: unknown name 'x'");
    }
}
