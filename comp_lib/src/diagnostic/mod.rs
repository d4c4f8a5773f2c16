
pub mod builder;

use std::{fmt, ops::Range};

pub use builder::DiagnosticBuilder;

/// A byte range in the IL source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl From<Range<usize>> for Span {
    fn from(value: Range<usize>) -> Self {
        Self {
            start: value.start,
            end: value.end.max(value.start),
        }
    }
}

impl From<Span> for Range<usize> {
    fn from(val: Span) -> Self {
        val.start..val.end
    }
}

// WARNING: Don't change the order of these (Error codes will change)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// This is an internal code that should never be used for actual diagnostics.
    Unspecified = 0,
    SyntaxError,
    UnknownOpcode,
    /// The IL is well-formed text, but not a valid program: undefined values, missing
    /// terminators, unknown blocks or callees.
    MalformedIl,
    UnreachableBlock,
    RegAllocFailure,
    /// The emitter met something it has no encoding for.
    EmissionGap,
    /// A MIR invariant didn't hold after a pass.
    InvalidMir,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:0>4x}", *self as u32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    code: Code,
    message: String,
    main_span: Option<Span>,
}

impl Diagnostic {
    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source location of the problem. Diagnostics from the backend passes point at the MIR
    /// rather than the source, so they have none.
    pub fn main_span(&self) -> Option<&Span> {
        self.main_span.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A warning, compilation goes on.
    Rec,
    Err,
}

/// The outcome of a compilation: a value with the warnings found along the way, or the errors
/// that prevented producing one.
///
/// Adding an error drops the value, so a result with a value never carries an error.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult<T> {
    value: Option<T>,
    diagnostics: Vec<(DiagnosticKind, Diagnostic)>,
}

impl<T> AggregateResult<T> {
    pub fn new_ok(value: T) -> Self {
        Self {
            value: Some(value),
            diagnostics: Vec::new(),
        }
    }

    /// ```
    /// # use comp_lib::diagnostic::*;
    /// let diagnostic = DiagnosticBuilder::unspanned().build_malformed_il("broken");
    /// let res = AggregateResult::<()>::new_err(diagnostic.clone());
    ///
    /// assert!(res.is_err());
    /// assert_eq!(
    ///     vec![(DiagnosticKind::Err, &diagnostic)],
    ///     res.diagnostics().collect::<Vec<_>>()
    /// );
    /// ```
    pub fn new_err(diagnostic: Diagnostic) -> Self {
        Self {
            value: None,
            diagnostics: vec![(DiagnosticKind::Err, diagnostic)],
        }
    }

    /// A value without any diagnostics.
    pub fn is_ok(&self) -> bool {
        self.value.is_some() && self.diagnostics.is_empty()
    }

    /// A value with warnings.
    pub fn is_rec(&self) -> bool {
        self.value.is_some() && !self.diagnostics.is_empty()
    }

    pub fn is_err(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// The diagnostics in the order they were added.
    pub fn diagnostics(&self) -> impl Iterator<Item = (DiagnosticKind, &Diagnostic)> {
        self.diagnostics.iter().map(|(kind, d)| (*kind, d))
    }

    pub fn add_rec_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push((DiagnosticKind::Rec, diagnostic));
    }

    pub fn add_err(&mut self, diagnostic: Diagnostic) {
        self.value = None;
        self.diagnostics.push((DiagnosticKind::Err, diagnostic));
    }

    #[must_use]
    pub fn map<U, F>(self, op: F) -> AggregateResult<U>
    where
        F: FnOnce(T) -> U,
    {
        AggregateResult {
            value: self.value.map(op),
            diagnostics: self.diagnostics,
        }
    }
}
