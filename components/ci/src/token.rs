//! The token model (§3 "Token"): a tagged variant of lexemes plus the
//! structured preprocessor-directive payloads the preparser builds on top
//! of the flat scan.

use ci_util::Symbol;
use crate::source::Location;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Radix { Bin = 2, Oct = 8, Dec = 10, Hex = 16 }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IdentKind {
  Plain,
  MacroName,
  MacroParameter,
  Operator,
  DollarPrefixed,
  StringLiteralForm,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntWidth { I8, I16, I32, I64, ISize, U8, U16, U32, U64, USize }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FloatWidth { F32, F64 }

/// A numeric literal that has not yet been width-suffixed: the raw digit
/// string plus its radix, deferred to the typechecker for final parsing
/// (§4.1: "otherwise the raw digit string is preserved with its radix").
#[derive(Clone, PartialEq, Debug)]
pub struct RawNumber {
  pub digits: String,
  pub radix: Radix,
  pub is_float: bool,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Literal {
  Bool(bool),
  Char(char),
  Str(String),
  Bytes(Vec<u8>),
  Number(RawNumber),
  SignedInt(i128, IntWidth),
  UnsignedInt(u128, IntWidth),
  Float(f64, FloatWidth),
}

/// One branch of a `#if`/`#ifdef`/`#ifndef` ... `#elif...` ... `#else` ...
/// `#endif` chain. The preparser folds the whole chain into a single
/// [`PreprocessorKind::Conditional`] token; `#else`/`#elif*` attach to the
/// innermost currently-open chain rather than becoming their own tokens.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum CondBranchKind { If, Ifdef, Ifndef, Elif, Elifdef, Elifndef, Else }

#[derive(Clone, PartialEq, Debug)]
pub struct CondBranch {
  pub kind: CondBranchKind,
  /// Raw condition tokens (`#if`/`#elif`) or the bare macro-name token
  /// (`#ifdef`/`#ifndef`/`#elifdef`/`#elifndef`); empty for `#else`.
  pub condition: Vec<Token>,
  pub body: Vec<Token>,
}

#[derive(Clone, PartialEq, Debug)]
pub enum PreprocessorKind {
  Define {
    name: Symbol,
    /// `None` for an object-like macro, `Some(params)` for a function-like
    /// one (distinguished by `(` immediately following the name, §F.2).
    params: Option<Vec<Symbol>>,
    replacement: Vec<Token>,
  },
  Undef(Symbol),
  Include(String),
  Embed(String),
  Line { line: u32, filename: Option<Symbol> },
  Error(String),
  Warning(String),
  Conditional(Vec<CondBranch>),
  Pragma(Vec<Token>),
}

#[derive(Clone, PartialEq, Debug)]
pub enum TokenKind {
  // Punctuation & operators are scanned as themselves; no payload needed
  // beyond the kind discriminant, so they are represented by their exact
  // source spelling.
  Punct(&'static str),

  Identifier(String, IdentKind),
  Keyword(&'static str),

  DocComment(String),

  Literal(Literal),

  /// `[[name]]` or `[[name(arg)]]`.
  Attribute { name: String, arg: Option<String> },
  /// `__attribute__((...))` / `__clang_...`, passed through opaquely.
  GnuAttribute(String),

  Preprocessor(PreprocessorKind),

  /// The scanner's raw view of one logical preprocessor line (after
  /// continuation-splicing but before any grouping): the directive-name
  /// token followed by its argument tokens. The preparser consumes these
  /// and folds them into a structured [`TokenKind::Preprocessor`].
  PreprocessorLine(Vec<Token>),

  Eof,
}

#[derive(Clone, PartialEq, Debug)]
pub struct Token {
  pub kind: TokenKind,
  pub location: Location,
}

impl Token {
  #[must_use] pub fn new(kind: TokenKind, location: Location) -> Self { Self { kind, location } }

  #[must_use] pub fn is_eof(&self) -> bool { matches!(self.kind, TokenKind::Eof) }

  #[must_use] pub fn as_punct(&self) -> Option<&str> {
    match &self.kind { TokenKind::Punct(p) => Some(p), _ => None }
  }

  #[must_use] pub fn as_identifier(&self) -> Option<&str> {
    match &self.kind {
      TokenKind::Identifier(s, _) => Some(s),
      TokenKind::Keyword(s) => Some(s),
      _ => None,
    }
  }
}

/// Re-render a token to the exact source text it would scan back into
/// (§8 "round-trip token-to-source").
#[must_use] pub fn to_source(token: &Token) -> String {
  match &token.kind {
    TokenKind::Punct(p) => (*p).to_owned(),
    TokenKind::Identifier(s, _) => s.clone(),
    TokenKind::Keyword(s) => (*s).to_owned(),
    TokenKind::DocComment(s) => format!("/** {s} */"),
    TokenKind::Literal(lit) => literal_to_source(lit),
    TokenKind::Attribute { name, arg: Some(arg) } => format!("[[{name}({arg})]]"),
    TokenKind::Attribute { name, arg: None } => format!("[[{name}]]"),
    TokenKind::GnuAttribute(raw) => format!("__attribute__(({raw}))"),
    TokenKind::Preprocessor(pp) => preprocessor_to_source(pp),
    TokenKind::PreprocessorLine(tokens) =>
      tokens.iter().map(to_source).collect::<Vec<_>>().join(" "),
    TokenKind::Eof => String::new(),
  }
}

#[must_use] fn literal_to_source(lit: &Literal) -> String {
  match lit {
    Literal::Bool(b) => b.to_string(),
    Literal::Char(c) => format!("'{}'", escape_char(*c)),
    Literal::Str(s) => format!("\"{}\"", escape_str(s)),
    Literal::Bytes(b) => format!("b\"{}\"", escape_bytes(b)),
    Literal::Number(n) => n.digits.clone(),
    Literal::SignedInt(v, w) => format!("{v}{}", int_suffix(*w)),
    Literal::UnsignedInt(v, w) => format!("{v}{}", int_suffix(*w)),
    Literal::Float(v, FloatWidth::F32) => format!("{v}f"),
    Literal::Float(v, FloatWidth::F64) => format!("{v}"),
  }
}

#[must_use] fn int_suffix(w: IntWidth) -> &'static str {
  match w {
    IntWidth::I8 => "i8", IntWidth::I16 => "i16", IntWidth::I32 => "i32", IntWidth::I64 => "i64",
    IntWidth::ISize => "isize",
    IntWidth::U8 => "u8", IntWidth::U16 => "u16", IntWidth::U32 => "u32", IntWidth::U64 => "u64",
    IntWidth::USize => "usize",
  }
}

/// Exact escape table shared by the scanner's decoder and the emitter's
/// re-encoder (§4.1, §4.9 item 6).
#[must_use] pub fn escape_char(c: char) -> String {
  match c {
    '\n' => "\\n".into(), '\t' => "\\t".into(), '\r' => "\\r".into(),
    '\x0b' => "\\v".into(), '\x08' => "\\b".into(), '\x0c' => "\\f".into(),
    '\\' => "\\\\".into(), '\'' => "\\'".into(), '\0' => "\\0".into(),
    c if (c as u32) < 0x20 => format!("\\x{:02x}", c as u32),
    c => c.to_string(),
  }
}

#[must_use] pub fn escape_str(s: &str) -> String {
  s.chars().map(|c| if c == '"' { "\\\"".to_owned() } else { escape_char(c) }).collect()
}

#[must_use] pub fn escape_bytes(bytes: &[u8]) -> String {
  bytes.iter().map(|&b| escape_char(b as char)).collect()
}

#[must_use] fn preprocessor_to_source(pp: &PreprocessorKind) -> String {
  match pp {
    PreprocessorKind::Define { name, params: None, .. } => format!("#define {name}"),
    PreprocessorKind::Define { name, params: Some(ps), .. } => {
      let params = ps.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
      format!("#define {name}({params})")
    }
    PreprocessorKind::Undef(name) => format!("#undef {name}"),
    PreprocessorKind::Include(path) => format!("#include {path}"),
    PreprocessorKind::Embed(path) => format!("#embed {path}"),
    // §9 Open Question: `#line N` omits the filename when unknown, and
    // `#line N "file"` includes it when known — the reverse of the buggy
    // C implementation this was distilled from.
    PreprocessorKind::Line { line, filename: None } => format!("#line {line}"),
    PreprocessorKind::Line { line, filename: Some(f) } => format!("#line {line} \"{f}\""),
    PreprocessorKind::Error(msg) => format!("#error {msg}"),
    PreprocessorKind::Warning(msg) => format!("#warning {msg}"),
    PreprocessorKind::Conditional(branches) => {
      branches.iter().map(|b| match b.kind {
        CondBranchKind::If => "#if".to_owned(),
        CondBranchKind::Ifdef => "#ifdef".to_owned(),
        CondBranchKind::Ifndef => "#ifndef".to_owned(),
        CondBranchKind::Elif => "#elif".to_owned(),
        CondBranchKind::Elifdef => "#elifdef".to_owned(),
        CondBranchKind::Elifndef => "#elifndef".to_owned(),
        CondBranchKind::Else => "#else".to_owned(),
      }).collect::<Vec<_>>().join("\n") + "\n#endif"
    }
    PreprocessorKind::Pragma(_) => "#pragma".to_owned(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn line_directive_omits_filename_when_unknown() {
    let pp = PreprocessorKind::Line { line: 10, filename: None };
    assert_eq!(preprocessor_to_source(&pp), "#line 10");
  }

  #[test]
  fn line_directive_includes_filename_when_known() {
    let pp = PreprocessorKind::Line { line: 10, filename: Some(ci_util::intern("foo.c")) };
    assert_eq!(preprocessor_to_source(&pp), "#line 10 \"foo.c\"");
  }
}
