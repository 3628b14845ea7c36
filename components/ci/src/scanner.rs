//! Byte stream → token sequence (§4.1).

use ci_util::Symbol;
use crate::config::{CStandard, Config};
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::source::{Cursor, SourceFile};
use crate::token::{FloatWidth, IdentKind, IntWidth, Literal, RawNumber, Radix, Token, TokenKind};

const KEYWORDS: &[&str] = &[
  "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
  "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
  "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
  "union", "unsigned", "void", "volatile", "while",
  "_Alignas", "_Alignof", "_Atomic", "_Bool", "_Complex", "_Generic", "_Imaginary",
  "_Noreturn", "_Static_assert", "_Thread_local", "_BitInt",
  "bool", "thread_local", "nullptr", "constexpr", "typeof", "typeof_unqual",
];

pub struct Scanner<'a> {
  cursor: Cursor<'a>,
  standard: CStandard,
  filename: Symbol,
  at_line_start: bool,
}

impl<'a> Scanner<'a> {
  #[must_use] pub fn new(file: &'a SourceFile, config: &Config) -> Self {
    Self { cursor: file.cursor(), standard: config.standard, filename: file.name, at_line_start: true }
  }

  pub fn scan(mut self, sink: &mut DiagnosticSink) -> Vec<Token> {
    let mut tokens = Vec::new();
    loop {
      let tok = self.next_token(sink);
      let is_eof = tok.is_eof();
      tokens.push(tok);
      if is_eof { break }
    }
    tokens
  }

}

impl<'a> Scanner<'a> {
  fn skip_trivia(&mut self) {
    loop {
      match self.cursor.peek() {
        Some(b' ' | b'\t') => { self.cursor.bump(); }
        Some(b'\\') if matches!(self.cursor.peek_at(1), Some(b'\n') | Some(b'\r')) => {
          self.cursor.bump();
          self.cursor.bump();
          if self.cursor.peek() == Some(b'\n') { self.cursor.bump(); }
        }
        Some(b'\n' | b'\r') => { self.cursor.bump(); self.at_line_start = true; }
        _ => break,
      }
    }
  }

  fn next_token(&mut self, sink: &mut DiagnosticSink) -> Token {
    loop {
      self.skip_trivia();
      let was_line_start = self.at_line_start;
      self.at_line_start = false;
      let start = self.cursor.point();

      let Some(b) = self.cursor.peek() else {
        return Token::new(TokenKind::Eof, crate::source::Location::point(self.filename, start));
      };

      if b == b'/' && self.cursor.peek_at(1) == Some(b'/') {
        if self.cursor.peek_at(2) == Some(b'/') {
          return self.scan_line_doc_comment(start);
        }
        self.skip_line_comment();
        continue;
      }
      if b == b'/' && self.cursor.peek_at(1) == Some(b'*') {
        if self.cursor.peek_at(2) == Some(b'*') && self.cursor.peek_at(3) != Some(b'/') {
          return self.scan_block_doc_comment(start, sink);
        }
        self.skip_block_comment(start, sink);
        continue;
      }
      if b == b'#' && was_line_start {
        return self.scan_preprocessor_line(start, sink);
      }
      if b == b'[' && self.cursor.peek_at(1) == Some(b'[') {
        return self.scan_attribute(start, sink);
      }
      if is_ident_start(b) || b == b'$' {
        return self.scan_identifier(start);
      }
      if b.is_ascii_digit() || (b == b'.' && self.cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
        return self.scan_number(start, sink);
      }
      if b == b'\'' {
        return self.scan_char(start, sink, false);
      }
      if b == b'"' {
        match self.scan_string(start, sink, false) {
          Some(tok) => return tok,
          None => continue,
        }
      }
      if b == b'b' && matches!(self.cursor.peek_at(1), Some(b'\'' | b'"')) {
        self.cursor.bump();
        if self.cursor.peek() == Some(b'\'') {
          return self.scan_char(start, sink, true);
        }
        match self.scan_string(start, sink, true) {
          Some(tok) => return tok,
          None => continue,
        }
      }
      return self.scan_punct(start, sink);
    }
  }

  fn loc(&self, start: crate::source::LineCol) -> crate::source::Location {
    crate::source::Location::new(self.filename, start, &self.cursor)
  }

  fn skip_line_comment(&mut self) {
    while !matches!(self.cursor.peek(), None | Some(b'\n') | Some(b'\r')) { self.cursor.bump(); }
  }

  fn scan_line_doc_comment(&mut self, start: crate::source::LineCol) -> Token {
    self.cursor.bump(); self.cursor.bump(); self.cursor.bump();
    let from = self.cursor.point().position;
    while !matches!(self.cursor.peek(), None | Some(b'\n') | Some(b'\r')) { self.cursor.bump(); }
    let text = self.cursor.slice(from).trim().to_owned();
    Token::new(TokenKind::DocComment(text), self.loc(start))
  }

  fn skip_block_comment(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink) {
    self.cursor.bump(); self.cursor.bump();
    loop {
      match self.cursor.peek() {
        None => {
          sink.push(Diagnostic::error(DiagKind::Unterminated("block comment"), self.loc(start)));
          return;
        }
        Some(b'*') if self.cursor.peek_at(1) == Some(b'/') => { self.cursor.bump(); self.cursor.bump(); return }
        _ => { self.cursor.bump(); }
      }
    }
  }

  fn scan_block_doc_comment(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink) -> Token {
    self.cursor.bump(); self.cursor.bump();
    let from = self.cursor.point().position;
    loop {
      match self.cursor.peek() {
        None => {
          sink.push(Diagnostic::error(DiagKind::Unterminated("doc comment"), self.loc(start)));
          let text = self.cursor.slice(from).trim().to_owned();
          return Token::new(TokenKind::DocComment(text), self.loc(start));
        }
        Some(b'*') if self.cursor.peek_at(1) == Some(b'/') => {
          let text = self.cursor.slice(from).trim_end_matches(['*', ' ']).to_owned();
          self.cursor.bump(); self.cursor.bump();
          return Token::new(TokenKind::DocComment(clean_doc_lines(&text)), self.loc(start));
        }
        _ => { self.cursor.bump(); }
      }
    }
  }

  fn scan_identifier(&mut self, start: crate::source::LineCol) -> Token {
    let dollar = self.cursor.peek() == Some(b'$');
    if dollar { self.cursor.bump(); }
    let from = self.cursor.point().position;
    while self.cursor.peek().is_some_and(is_ident_continue) { self.cursor.bump(); }
    let text = self.cursor.slice(from).to_owned();
    if dollar {
      return Token::new(TokenKind::Identifier(text, IdentKind::DollarPrefixed), self.loc(start));
    }
    if text == "true" { return Token::new(TokenKind::Literal(Literal::Bool(true)), self.loc(start)) }
    if text == "false" { return Token::new(TokenKind::Literal(Literal::Bool(false)), self.loc(start)) }
    if self.standard.has_keyword(&text) {
      if let Some(kw) = KEYWORDS.iter().copied().find(|&k| k == text.as_str()) {
        return Token::new(TokenKind::Keyword(kw), self.loc(start));
      }
    }
    Token::new(TokenKind::Identifier(text, IdentKind::Plain), self.loc(start))
  }

  fn scan_number(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink) -> Token {
    let from = self.cursor.point().position;
    let radix = if self.cursor.peek() == Some(b'0') {
      match self.cursor.peek_at(1) {
        Some(b'b' | b'B') => { self.cursor.bump(); self.cursor.bump(); Radix::Bin }
        Some(b'x' | b'X') => { self.cursor.bump(); self.cursor.bump(); Radix::Hex }
        Some(b'o' | b'O') => { self.cursor.bump(); self.cursor.bump(); Radix::Oct }
        Some(c) if c.is_ascii_digit() && self.standard < CStandard::C23 => Radix::Oct,
        _ => Radix::Dec,
      }
    } else {
      Radix::Dec
    };

    let digit_ok = |c: u8| match radix {
      Radix::Bin => c == b'0' || c == b'1',
      Radix::Oct => (b'0'..=b'7').contains(&c),
      Radix::Dec => c.is_ascii_digit(),
      Radix::Hex => c.is_ascii_hexdigit(),
    };
    while self.cursor.peek().is_some_and(|c| digit_ok(c) || c == b'\'') { self.cursor.bump(); }

    let mut is_float = false;
    if radix == Radix::Dec || radix == Radix::Hex {
      let exp_chars: &[u8] = if radix == Radix::Hex { b"pP" } else { b"eE" };
      if self.cursor.peek() == Some(b'.') {
        is_float = true;
        self.cursor.bump();
        while self.cursor.peek().is_some_and(|c| digit_ok(c) || c == b'\'') { self.cursor.bump(); }
      }
      if self.cursor.peek().is_some_and(|c| exp_chars.contains(&c)) {
        is_float = true;
        self.cursor.bump();
        if matches!(self.cursor.peek(), Some(b'+' | b'-')) { self.cursor.bump(); }
        while self.cursor.peek().is_some_and(|c| c.is_ascii_digit()) { self.cursor.bump(); }
      }
    }

    let width = self.scan_number_suffix(is_float);
    let digits: String = self.cursor.slice(from).chars().filter(|&c| c != '\'').collect();

    let lit = match width {
      Some(NumSuffix::Int(w)) => {
        match i128::from_str_radix(strip_prefix(&digits, radix), radix as u32) {
          Ok(v) if !matches!(w, IntWidth::U8|IntWidth::U16|IntWidth::U32|IntWidth::U64|IntWidth::USize) =>
            Literal::SignedInt(v, w),
          Ok(v) => Literal::UnsignedInt(v.unsigned_abs(), w),
          Err(_) => { sink.push(Diagnostic::error(DiagKind::MalformedNumber, self.loc(start))); Literal::SignedInt(0, w) }
        }
      }
      Some(NumSuffix::Float(w)) => {
        match digits.parse::<f64>() {
          Ok(v) => Literal::Float(v, w),
          Err(_) => { sink.push(Diagnostic::error(DiagKind::MalformedNumber, self.loc(start))); Literal::Float(0.0, w) }
        }
      }
      None => Literal::Number(RawNumber { digits, radix, is_float }),
    };
    Token::new(TokenKind::Literal(lit), self.loc(start))
  }

  fn scan_number_suffix(&mut self, is_float: bool) -> Option<NumSuffix> {
    let save = self.cursor;
    let signed = matches!(self.cursor.peek(), Some(b'i')) ;
    let unsigned = matches!(self.cursor.peek(), Some(b'u' | b'U'));
    if (signed || unsigned) && !is_float {
      self.cursor.bump();
      let from = self.cursor.point().position;
      while self.cursor.peek().is_some_and(|c| c.is_ascii_alphanumeric()) { self.cursor.bump(); }
      let rest = self.cursor.slice(from);
      let width = match rest {
        "8" => Some(if signed { IntWidth::I8 } else { IntWidth::U8 }),
        "16" => Some(if signed { IntWidth::I16 } else { IntWidth::U16 }),
        "32" => Some(if signed { IntWidth::I32 } else { IntWidth::U32 }),
        "64" => Some(if signed { IntWidth::I64 } else { IntWidth::U64 }),
        "size" => Some(if signed { IntWidth::ISize } else { IntWidth::USize }),
        _ => None,
      };
      if let Some(w) = width { return Some(NumSuffix::Int(w)) }
      self.cursor = save;
      return None;
    }
    if matches!(self.cursor.peek(), Some(b'f' | b'F')) {
      self.cursor.bump();
      let from = self.cursor.point().position;
      while self.cursor.peek().is_some_and(|c| c.is_ascii_digit()) { self.cursor.bump(); }
      return match self.cursor.slice(from) {
        "32" => Some(NumSuffix::Float(FloatWidth::F32)),
        "64" => Some(NumSuffix::Float(FloatWidth::F64)),
        _ => { self.cursor = save; None }
      };
    }
    None
  }

  fn scan_char(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink, is_byte: bool) -> Token {
    self.cursor.bump();
    let c = self.scan_one_char_literal(start, sink);
    if self.cursor.peek() == Some(b'\'') {
      self.cursor.bump();
    } else {
      sink.push(Diagnostic::error(DiagKind::Unterminated("character literal"), self.loc(start)));
    }
    let lit = if is_byte { Literal::Bytes(vec![c as u8]) } else { Literal::Char(c) };
    Token::new(TokenKind::Literal(lit), self.loc(start))
  }

  /// `None` means the string ran off the end of the file with no closing
  /// quote (§8 "an unterminated string at EOF produces exactly one lexical
  /// error and no string token"): the caller falls through to the ordinary
  /// EOF token instead of fabricating a literal for it. Hitting a bare
  /// newline first is still reported as unterminated but yields a
  /// best-effort token, since there is real source text after it for the
  /// parser to keep recovering on.
  fn scan_string(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink, is_bytes: bool) -> Option<Token> {
    self.cursor.bump();
    let mut out = String::new();
    loop {
      match self.cursor.peek() {
        None => {
          sink.push(Diagnostic::error(DiagKind::Unterminated("string literal"), self.loc(start)));
          return None;
        }
        Some(b'\n') => {
          sink.push(Diagnostic::error(DiagKind::Unterminated("string literal"), self.loc(start)));
          break;
        }
        Some(b'"') => { self.cursor.bump(); break }
        _ => out.push(self.scan_one_char_literal(start, sink)),
      }
    }
    let lit = if is_bytes { Literal::Bytes(out.into_bytes()) } else { Literal::Str(out) };
    Some(Token::new(TokenKind::Literal(lit), self.loc(start)))
  }

  fn scan_one_char_literal(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink) -> char {
    let b = match self.cursor.peek() { Some(b) => b, None => return '\0' };
    if b != b'\\' {
      self.cursor.bump();
      return b as char;
    }
    self.cursor.bump();
    match self.cursor.peek() {
      Some(b'n') => { self.cursor.bump(); '\n' }
      Some(b't') => { self.cursor.bump(); '\t' }
      Some(b'r') => { self.cursor.bump(); '\r' }
      Some(b'v') => { self.cursor.bump(); '\x0b' }
      Some(b'b') => { self.cursor.bump(); '\x08' }
      Some(b'f') => { self.cursor.bump(); '\x0c' }
      Some(b'\\') => { self.cursor.bump(); '\\' }
      Some(b'\'') => { self.cursor.bump(); '\'' }
      Some(b'"') => { self.cursor.bump(); '"' }
      Some(b'0') => { self.cursor.bump(); '\0' }
      Some(b'x') => {
        self.cursor.bump();
        let from = self.cursor.point().position;
        while self.cursor.peek().is_some_and(|c| c.is_ascii_hexdigit()) { self.cursor.bump(); }
        let hex = self.cursor.slice(from);
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).unwrap_or_else(|| {
          sink.push(Diagnostic::error(DiagKind::InvalidEscape, self.loc(start)));
          '\0'
        })
      }
      Some(b'u') => {
        self.cursor.bump();
        let from = self.cursor.point().position;
        for _ in 0..4 { if self.cursor.peek().is_some_and(|c| c.is_ascii_hexdigit()) { self.cursor.bump(); } }
        let hex = self.cursor.slice(from);
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32).unwrap_or_else(|| {
          sink.push(Diagnostic::error(DiagKind::InvalidEscape, self.loc(start)));
          '\0'
        })
      }
      Some(d) if (b'0'..=b'7').contains(&d) => {
        let from = self.cursor.point().position;
        for _ in 0..3 { if matches!(self.cursor.peek(), Some(b'0'..=b'7')) { self.cursor.bump(); } }
        let oct = self.cursor.slice(from);
        u32::from_str_radix(oct, 8).ok().and_then(char::from_u32).unwrap_or('\0')
      }
      _ => {
        sink.push(Diagnostic::error(DiagKind::InvalidEscape, self.loc(start)));
        self.cursor.bump();
        '\0'
      }
    }
  }

  fn scan_attribute(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink) -> Token {
    self.cursor.bump(); self.cursor.bump();
    self.skip_trivia();
    let from = self.cursor.point().position;
    while self.cursor.peek().is_some_and(is_ident_continue) { self.cursor.bump(); }
    let name = self.cursor.slice(from).to_owned();
    self.skip_trivia();
    let mut arg = None;
    if self.cursor.peek() == Some(b'(') {
      self.cursor.bump();
      let from = self.cursor.point().position;
      let mut depth = 1u32;
      while depth > 0 {
        match self.cursor.peek() {
          Some(b'(') => { depth += 1; self.cursor.bump(); }
          Some(b')') => { depth -= 1; if depth > 0 { self.cursor.bump(); } }
          None => { sink.push(Diagnostic::error(DiagKind::UnexpectedToken, self.loc(start))); break }
          _ => { self.cursor.bump(); }
        }
      }
      arg = Some(self.cursor.slice(from).to_owned());
      if self.cursor.peek() == Some(b')') { self.cursor.bump(); }
    }
    self.skip_trivia();
    if self.cursor.peek() == Some(b']') { self.cursor.bump(); }
    if self.cursor.peek() == Some(b']') { self.cursor.bump(); }
    Token::new(TokenKind::Attribute { name, arg }, self.loc(start))
  }

  fn scan_preprocessor_line(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink) -> Token {
    self.cursor.bump(); // '#'
    let mut line = Vec::new();
    loop {
      self.skip_inline_trivia_only();
      match self.cursor.peek() {
        None | Some(b'\n') | Some(b'\r') => break,
        _ => {
          let tok = self.next_token(sink);
          if tok.is_eof() { break }
          line.push(tok);
        }
      }
    }
    self.at_line_start = true;
    Token::new(TokenKind::PreprocessorLine(line), self.loc(start))
  }

  fn skip_inline_trivia_only(&mut self) {
    loop {
      match self.cursor.peek() {
        Some(b' ' | b'\t') => { self.cursor.bump(); }
        Some(b'\\') if matches!(self.cursor.peek_at(1), Some(b'\n') | Some(b'\r')) => {
          self.cursor.bump();
          self.cursor.bump();
          if self.cursor.peek() == Some(b'\n') { self.cursor.bump(); }
        }
        _ => break,
      }
    }
  }

  fn scan_punct(&mut self, start: crate::source::LineCol, sink: &mut DiagnosticSink) -> Token {
    const THREE: &[&str] = &["<<=", ">>=", "...", "->*"];
    const TWO: &[&str] = &[
      "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||",
      "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "::",
    ];
    let remaining = self.cursor.slice_from_here(3);
    for &p in THREE { if remaining.starts_with(p) { for _ in 0..3 { self.cursor.bump(); } return Token::new(TokenKind::Punct(p), self.loc(start)) } }
    for &p in TWO { if remaining.starts_with(p) { for _ in 0..2 { self.cursor.bump(); } return Token::new(TokenKind::Punct(p), self.loc(start)) } }
    let b = self.cursor.bump().unwrap_or(0);
    const SINGLE: &[u8] = b"+-*/%=<>!&|^~?:;,.(){}[]#@$";
    if let Some(pos) = SINGLE.iter().position(|&c| c == b) {
      return Token::new(TokenKind::Punct(SINGLE_STRS[pos]), self.loc(start));
    }
    sink.push(Diagnostic::error(DiagKind::InvalidChar(b as char), self.loc(start)));
    Token::new(TokenKind::Punct("?"), self.loc(start))
  }
}

const SINGLE_STRS: &[&str] = &[
  "+", "-", "*", "/", "%", "=", "<", ">", "!", "&", "|", "^", "~", "?", ":", ";", ",", ".",
  "(", ")", "{", "}", "[", "]", "#", "@", "$",
];

enum NumSuffix { Int(IntWidth), Float(FloatWidth) }

fn is_ident_start(b: u8) -> bool { b.is_ascii_alphabetic() || b == b'_' }
fn is_ident_continue(b: u8) -> bool { b.is_ascii_alphanumeric() || b == b'_' }

fn strip_prefix(s: &str, radix: Radix) -> &str {
  match radix {
    Radix::Bin => s.trim_start_matches("0b").trim_start_matches("0B"),
    Radix::Hex => s.trim_start_matches("0x").trim_start_matches("0X"),
    Radix::Oct if s.starts_with("0o") || s.starts_with("0O") => &s[2..],
    _ => s,
  }
}

fn clean_doc_lines(s: &str) -> String {
  s.lines().map(|l| l.trim().trim_start_matches('*').trim()).collect::<Vec<_>>().join("\n").trim().to_owned()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diag::DiagnosticSink;

  fn scan(src: &str) -> (Vec<Token>, DiagnosticSink) {
    let file = SourceFile::new("t.c", src);
    let mut sink = DiagnosticSink::new();
    let tokens = Scanner::new(&file, &Config::default()).scan(&mut sink);
    (tokens, sink)
  }

  #[test]
  fn empty_file_scans_to_one_eof_token() {
    let (tokens, sink) = scan("");
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].is_eof());
    assert!(sink.is_empty());
  }

  #[test]
  fn unterminated_string_reports_one_error_and_no_token() {
    let (tokens, sink) = scan("\"abc");
    assert_eq!(sink.len(), 1);
    assert_eq!(tokens.len(), 1, "no string token, just the trailing EOF: {tokens:?}");
    assert!(matches!(tokens[0].kind, TokenKind::Eof));
  }

  #[test]
  fn keywords_depend_on_standard() {
    let file = SourceFile::new("t.c", "nullptr");
    let mut sink = DiagnosticSink::new();
    let mut cfg = Config::default();
    cfg.standard = CStandard::C17;
    let tokens = Scanner::new(&file, &cfg).scan(&mut sink);
    assert!(matches!(tokens[0].kind, TokenKind::Identifier(_, IdentKind::Plain)));

    let mut sink = DiagnosticSink::new();
    cfg.standard = CStandard::C23;
    let tokens = Scanner::new(&file, &cfg).scan(&mut sink);
    assert!(matches!(tokens[0].kind, TokenKind::Keyword("nullptr")));
  }

  #[test]
  fn hex_and_binary_radices_are_recognized() {
    let (tokens, _) = scan("0x1A 0b101 0o17 42");
    for (tok, radix) in tokens.iter().zip([Radix::Hex, Radix::Bin, Radix::Oct, Radix::Dec]) {
      match &tok.kind {
        TokenKind::Literal(Literal::Number(n)) => assert_eq!(n.radix, radix),
        other => panic!("expected number, got {other:?}"),
      }
    }
  }

  #[test]
  fn doc_comment_is_captured_and_trimmed() {
    let (tokens, _) = scan("/// hello\nint x;");
    assert_eq!(tokens[0].kind, TokenKind::DocComment("hello".to_owned()));
  }

  #[test]
  fn line_continuation_is_consumed_without_emitting_a_token() {
    let (tokens, _) = scan("int\\\nx;");
    assert!(matches!(tokens[0].kind, TokenKind::Keyword("int")));
    assert!(matches!(tokens[1].kind, TokenKind::Identifier(ref s, _) if s == "x"));
  }
}
