//! The token iterator stack (§4.3): a cooperative, single-threaded
//! iterator-over-iterators that splices macro expansions and resolves
//! `#if`/`#ifdef`/`#ifndef` branch selection in place, so the parser sees
//! one flat, ordinary C token stream.

use std::collections::HashMap;
use std::rc::Rc;

use ci_util::Symbol;
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::token::{CondBranch, CondBranchKind, PreprocessorKind, Token, TokenKind};

#[derive(Clone)]
pub struct MacroDef {
  pub params: Option<Vec<Symbol>>,
  pub replacement: Rc<[Token]>,
}

/// The live `#define`/`#undef` state threaded through one translation
/// unit's token stream.
#[derive(Clone, Default)]
pub struct MacroTable {
  defs: HashMap<Symbol, MacroDef>,
}

impl MacroTable {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn define(&mut self, name: Symbol, params: Option<Vec<Symbol>>, replacement: Vec<Token>) {
    self.defs.insert(name, MacroDef { params, replacement: replacement.into() });
  }

  pub fn undef(&mut self, name: Symbol) { self.defs.remove(&name); }

  #[must_use] pub fn is_defined(&self, name: Symbol) -> bool { self.defs.contains_key(&name) }

  #[must_use] pub fn get(&self, name: Symbol) -> Option<&MacroDef> { self.defs.get(&name) }
}

#[derive(Clone)]
struct Frame {
  tokens: Rc<[Token]>,
  pos: usize,
  /// The macro this frame is expanding, used to suppress self-recursive
  /// re-expansion ("blue painting") while the frame is live.
  expanding: Option<Symbol>,
  bindings: Option<Rc<HashMap<Symbol, Rc<[Token]>>>>,
}

/// A single-threaded, forward-only view over an already-preparsed token
/// vector. Cloning is cheap (frame token buffers are `Rc`-shared), which
/// is how [`TokenStream::peek`] implements its non-destructive lookahead:
/// it clones the whole stream state and drives the clone forward.
#[derive(Clone)]
pub struct TokenStream {
  frames: Vec<Frame>,
  macros: MacroTable,
  eof: Token,
}

impl TokenStream {
  #[must_use] pub fn new(tokens: Vec<Token>, macros: MacroTable) -> Self {
    let eof = tokens.last().cloned().unwrap_or_else(|| {
      Token::new(TokenKind::Eof, crate::source::Location::point(ci_util::intern(""), crate::source::LineCol { line: 1, column: 1, position: 0 }))
    });
    Self { frames: vec![Frame { tokens: tokens.into(), pos: 0, expanding: None, bindings: None }], macros, eof }
  }

  #[must_use] pub fn macros(&self) -> &MacroTable { &self.macros }
  pub fn macros_mut(&mut self) -> &mut MacroTable { &mut self.macros }

  pub fn next(&mut self, sink: &mut DiagnosticSink) -> Token {
    loop {
      let Some(frame) = self.frames.last_mut() else { return self.eof.clone() };
      if frame.pos >= frame.tokens.len() {
        self.frames.pop();
        continue;
      }
      let tok = frame.tokens[frame.pos].clone();
      frame.pos += 1;

      if let TokenKind::Preprocessor(PreprocessorKind::Conditional(branches)) = &tok.kind {
        if let Some(body) = self.select_branch(branches) {
          self.frames.push(Frame { tokens: body, pos: 0, expanding: None, bindings: None });
        }
        continue;
      }

      if let TokenKind::Preprocessor(PreprocessorKind::Define { name, params, replacement }) = &tok.kind {
        self.macros.define(*name, params.clone(), replacement.clone());
        continue;
      }
      if let TokenKind::Preprocessor(PreprocessorKind::Undef(name)) = &tok.kind {
        self.macros.undef(*name);
        continue;
      }

      if let Some(name_str) = tok.as_identifier() {
        let name = ci_util::intern(name_str);
        if let Some(bound) = self.frames.last().and_then(|f| f.bindings.as_ref()).and_then(|b| b.get(&name)).cloned() {
          self.frames.push(Frame { tokens: bound, pos: 0, expanding: None, bindings: None });
          continue;
        }
        if !self.is_expanding(name) {
          if let Some(def) = self.macros.get(name).cloned() {
            match &def.params {
              None => {
                self.frames.push(Frame { tokens: def.replacement, pos: 0, expanding: Some(name), bindings: None });
                continue;
              }
              Some(params) => {
                if self.peek_is_open_paren() {
                  let args = self.consume_call_args(sink);
                  let bindings = bind_params(params, &args);
                  self.frames.push(Frame { tokens: def.replacement, pos: 0, expanding: Some(name), bindings: Some(Rc::new(bindings)) });
                  continue;
                }
              }
            }
          }
        }
      }

      return tok;
    }
  }

  /// Non-destructive lookahead: token `n` positions ahead (0 = the next
  /// token `next` would return), expanding macros identically.
  #[must_use] pub fn peek(&self, n: usize, sink: &mut DiagnosticSink) -> Token {
    let mut clone = self.clone();
    let mut tok = clone.eof.clone();
    for _ in 0..=n { tok = clone.next(sink); }
    tok
  }

  fn is_expanding(&self, name: Symbol) -> bool {
    self.frames.iter().any(|f| f.expanding == Some(name))
  }

  fn peek_is_open_paren(&self) -> bool {
    let Some(frame) = self.frames.last() else { return false };
    frame.tokens.get(frame.pos).and_then(Token::as_punct) == Some("(")
  }

  fn consume_call_args(&mut self, sink: &mut DiagnosticSink) -> Vec<Vec<Token>> {
    // Caller already confirmed the next real token is '(' via peek_is_open_paren.
    let open = self.next(sink);
    debug_assert_eq!(open.as_punct(), Some("("));
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0i32;
    loop {
      let tok = self.next(sink);
      if tok.is_eof() {
        sink.push(Diagnostic::error(DiagKind::MissingToken(")"), tok.location));
        break;
      }
      match tok.as_punct() {
        Some("(") => { depth += 1; current.push(tok); }
        Some(")") if depth == 0 => { args.push(std::mem::take(&mut current)); break; }
        Some(")") => { depth -= 1; current.push(tok); }
        Some(",") if depth == 0 => { args.push(std::mem::take(&mut current)); }
        _ => current.push(tok),
      }
    }
    if args.len() == 1 && args[0].is_empty() { args.clear(); }
    args
  }

  /// Pick the first branch whose condition holds, per §4.2's "innermost
  /// open group" folding: `None` means no branch was taken (nothing is
  /// spliced into the stream).
  fn select_branch(&self, branches: &[CondBranch]) -> Option<Rc<[Token]>> {
    for branch in branches {
      let taken = match branch.kind {
        CondBranchKind::If | CondBranchKind::Elif => eval_condition(&branch.condition, &self.macros),
        CondBranchKind::Ifdef | CondBranchKind::Elifdef => is_single_macro_defined(&branch.condition, &self.macros),
        CondBranchKind::Ifndef | CondBranchKind::Elifndef => !is_single_macro_defined(&branch.condition, &self.macros),
        CondBranchKind::Else => true,
      };
      if taken { return Some(branch.body.clone().into()); }
    }
    None
  }
}

fn bind_params(params: &[Symbol], args: &[Vec<Token>]) -> HashMap<Symbol, Rc<[Token]>> {
  params.iter().enumerate().map(|(i, &p)| {
    let toks: Rc<[Token]> = args.get(i).cloned().unwrap_or_default().into();
    (p, toks)
  }).collect()
}

fn is_single_macro_defined(condition: &[Token], macros: &MacroTable) -> bool {
  condition.first().and_then(Token::as_identifier).is_some_and(|name| macros.is_defined(ci_util::intern(name)))
}

/// A minimal `#if`/`#elif` constant-expression evaluator: `defined(X)` /
/// `defined X`, decimal integers, `! && || == != < > <= >=` and
/// parentheses. Undefined identifiers evaluate to `0`, matching the C
/// standard's directive semantics.
fn eval_condition(condition: &[Token], macros: &MacroTable) -> bool {
  let mut p = CondParser { tokens: condition, pos: 0, macros };
  p.parse_or() != 0
}

struct CondParser<'a> {
  tokens: &'a [Token],
  pos: usize,
  macros: &'a MacroTable,
}

impl<'a> CondParser<'a> {
  fn peek(&self) -> Option<&Token> { self.tokens.get(self.pos) }
  fn bump(&mut self) -> Option<&Token> { let t = self.tokens.get(self.pos); self.pos += 1; t }

  fn parse_or(&mut self) -> i64 {
    let mut lhs = self.parse_and();
    while self.peek().and_then(Token::as_punct) == Some("||") {
      self.bump();
      let rhs = self.parse_and();
      lhs = i64::from(lhs != 0 || rhs != 0);
    }
    lhs
  }

  fn parse_and(&mut self) -> i64 {
    let mut lhs = self.parse_cmp();
    while self.peek().and_then(Token::as_punct) == Some("&&") {
      self.bump();
      let rhs = self.parse_cmp();
      lhs = i64::from(lhs != 0 && rhs != 0);
    }
    lhs
  }

  fn parse_cmp(&mut self) -> i64 {
    let lhs = self.parse_unary();
    let op = self.peek().and_then(Token::as_punct);
    if matches!(op, Some("==" | "!=" | "<" | ">" | "<=" | ">=")) {
      let op = op.unwrap();
      self.bump();
      let rhs = self.parse_unary();
      return i64::from(match op {
        "==" => lhs == rhs, "!=" => lhs != rhs,
        "<" => lhs < rhs, ">" => lhs > rhs,
        "<=" => lhs <= rhs, ">=" => lhs >= rhs,
        _ => unreachable!(),
      });
    }
    lhs
  }

  fn parse_unary(&mut self) -> i64 {
    match self.peek().and_then(Token::as_punct) {
      Some("!") => { self.bump(); i64::from(self.parse_unary() == 0) }
      Some("(") => {
        self.bump();
        let v = self.parse_or();
        if self.peek().and_then(Token::as_punct) == Some(")") { self.bump(); }
        v
      }
      _ => self.parse_atom(),
    }
  }

  fn parse_atom(&mut self) -> i64 {
    let Some(tok) = self.bump().cloned() else { return 0 };
    if tok.as_identifier() == Some("defined") {
      let paren = self.peek().and_then(Token::as_punct) == Some("(");
      if paren { self.bump(); }
      let name = self.bump().and_then(Token::as_identifier).map(ToOwned::to_owned);
      if paren && self.peek().and_then(Token::as_punct) == Some(")") { self.bump(); }
      return i64::from(name.is_some_and(|n| self.macros.is_defined(ci_util::intern(&n))));
    }
    if let TokenKind::Literal(crate::token::Literal::Number(n)) = &tok.kind {
      return i64::from_str_radix(&n.digits, n.radix as u32).unwrap_or(0);
    }
    if let TokenKind::Literal(crate::token::Literal::SignedInt(v, _)) = &tok.kind {
      return *v as i64;
    }
    // Undefined macro names (and anything else unrecognized) are 0.
    0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::preparser::Preparser;
  use crate::scanner::Scanner;
  use crate::source::SourceFile;

  fn stream_for(src: &str) -> (TokenStream, DiagnosticSink) {
    let file = SourceFile::new("t.c", src);
    let mut sink = DiagnosticSink::new();
    let scanned = Scanner::new(&file, &Config::default()).scan(&mut sink);
    let grouped = Preparser::new(&mut sink).run(scanned);
    (TokenStream::new(grouped, MacroTable::new()), sink)
  }

  fn collect_idents(mut ts: TokenStream, sink: &mut DiagnosticSink) -> Vec<String> {
    let mut out = Vec::new();
    loop {
      let tok = ts.next(sink);
      if tok.is_eof() { break }
      if let Some(id) = tok.as_identifier() { out.push(id.to_owned()); }
    }
    out
  }

  #[test]
  fn object_like_macro_expands_in_place() {
    let (ts, mut sink) = stream_for("#define FOO bar\nFOO baz\n");
    let idents = collect_idents(ts, &mut sink);
    assert_eq!(idents, vec!["bar".to_owned(), "baz".to_owned()]);
  }

  #[test]
  fn function_like_macro_substitutes_argument() {
    let (ts, mut sink) = stream_for("#define ID(x) x\nID(hello)\n");
    let idents = collect_idents(ts, &mut sink);
    assert_eq!(idents, vec!["hello".to_owned()]);
  }

  #[test]
  fn self_referential_macro_does_not_loop() {
    let (ts, mut sink) = stream_for("#define FOO FOO bar\nFOO\n");
    let idents = collect_idents(ts, &mut sink);
    assert_eq!(idents, vec!["FOO".to_owned(), "bar".to_owned()]);
  }

  #[test]
  fn ifdef_picks_defined_branch() {
    let (ts, mut sink) = stream_for("#define FOO\n#ifdef FOO\ntaken\n#else\nskipped\n#endif\n");
    let idents = collect_idents(ts, &mut sink);
    assert_eq!(idents, vec!["taken".to_owned()]);
  }

  #[test]
  fn if_expression_with_defined_and_logical_and() {
    let (ts, mut sink) = stream_for("#define A\n#if defined(A) && 1\nyes\n#endif\n");
    let idents = collect_idents(ts, &mut sink);
    assert_eq!(idents, vec!["yes".to_owned()]);
  }
}
