//! Diagnostics: the error taxonomy of §7 and the append-only per-file sink.

use crate::source::Location;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
  Error,
  Warning,
}

/// One row of §7's error taxonomy. `Display` supplies the human-readable
/// message template; the [`Diagnostic`] wrapping it carries the location.
#[derive(thiserror::Error, Clone, Debug)]
pub enum DiagKind {
  // Lexical
  #[error("invalid character {0:?}")]
  InvalidChar(char),
  #[error("invalid escape sequence")]
  InvalidEscape,
  #[error("unterminated {0}")]
  Unterminated(&'static str),
  #[error("malformed numeric literal")]
  MalformedNumber,

  // Preprocessor
  #[error("`#{0}` with no matching `#if`")]
  MismatchedDirective(&'static str),
  #[error("unrecognized preprocessor directive `#{0}`")]
  UnknownDirective(String),
  #[error("bad include/embed path")]
  BadPath,

  // Syntactic
  #[error("unexpected token")]
  UnexpectedToken,
  #[error("expected {0}")]
  MissingToken(&'static str),

  // Scoping
  #[error("duplicate name `{0}`")]
  DuplicateName(String),
  #[error("`{0}` conflicts with an existing declaration of a different kind")]
  KindConflict(String),
  #[error("use of undeclared identifier `{0}`")]
  UndeclaredIdentifier(String),
  #[error("use of undeclared label `{0}`")]
  UndeclaredLabel(String),
  #[error("cyclic typedef involving `{0}`")]
  TypedefCycle(String),

  // Type
  #[error("type mismatch")]
  TypeMismatch,
  #[error("expected an integer data type")]
  ExpectedInteger,
  #[error("cannot dereference a non-pointer data type")]
  ExpectedPointer,
  #[error("cannot assign expression to {0} data type")]
  NotAssignable(&'static str),
  #[error("function call expects {expected} argument(s), got {given}")]
  ArityMismatch { expected: usize, given: usize },
  #[error("invalid cast")]
  BadCast,
  #[error("initializer designator `{0}` not found")]
  DesignatorNotFound(String),
  #[error("excess elements in initializer")]
  ExcessInitializerElements,

  // Generic
  #[error("unresolved generic parameter `{0}`")]
  UnresolvedGeneric(String),
  #[error("generic substitution cycle involving `{0}`")]
  SubstitutionCycle(String),
  #[error("generic instantiation with wrong arity: expected {expected}, got {given}")]
  GenericArityMismatch { expected: usize, given: usize },

  // Internal (emission ICE, §4.9)
  #[error("internal error: {0}")]
  InternalError(&'static str),
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
  pub severity: Severity,
  pub kind: DiagKind,
  pub location: Location,
  pub note: Option<(String, Location)>,
}

impl Diagnostic {
  #[must_use] pub fn error(kind: DiagKind, location: Location) -> Self {
    Self { severity: Severity::Error, kind, location, note: None }
  }

  #[must_use] pub fn warning(kind: DiagKind, location: Location) -> Self {
    Self { severity: Severity::Warning, kind, location, note: None }
  }

  #[must_use] pub fn with_note(mut self, message: impl Into<String>, at: Location) -> Self {
    self.note = Some((message.into(), at));
    self
  }
}

impl std::fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}: {}",
      self.location,
      match self.severity { Severity::Error => "error", Severity::Warning => "warning" },
      self.kind)?;
    if let Some((msg, at)) = &self.note {
      write!(f, "\n{at}: note: {msg}")?;
    }
    Ok(())
  }
}

/// Append-only per-file diagnostic sink (§2, §7). Stages that "report and
/// continue" push here and keep walking sibling declarations.
#[derive(Default, Debug)]
pub struct DiagnosticSink {
  diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, diag: Diagnostic) {
    log::trace!("{diag}");
    self.diagnostics.push(diag);
  }

  #[must_use] pub fn has_fatal(&self) -> bool {
    self.diagnostics.iter().any(|d| d.severity == Severity::Error)
  }

  #[must_use] pub fn len(&self) -> usize { self.diagnostics.len() }
  #[must_use] pub fn is_empty(&self) -> bool { self.diagnostics.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> { self.diagnostics.iter() }
}
