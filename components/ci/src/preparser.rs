//! Token sequence → enriched token sequence with preprocessor directives
//! grouped into structured tokens (§4.2). No macro expansion happens here;
//! this stage only groups.

use std::vec::IntoIter;
use ci_util::intern;
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::source::Location;
use crate::token::{CondBranch, CondBranchKind, PreprocessorKind, Token, TokenKind};

pub struct Preparser<'s> {
  sink: &'s mut DiagnosticSink,
}

impl<'s> Preparser<'s> {
  #[must_use] pub fn new(sink: &'s mut DiagnosticSink) -> Self { Self { sink } }

  #[must_use] pub fn run(mut self, tokens: Vec<Token>) -> Vec<Token> {
    let mut it = tokens.into_iter().peekable();
    let mut out = Vec::new();
    while let Some(tok) = it.next() {
      match tok.kind {
        TokenKind::PreprocessorLine(line) => {
          let (name, rest) = split_directive(&line);
          match name.as_str() {
            "if" | "ifdef" | "ifndef" => {
              let branches = self.parse_group(tok.location, &name, rest, &mut it);
              out.push(Token::new(TokenKind::Preprocessor(PreprocessorKind::Conditional(branches)), tok.location));
            }
            "elif" | "elifdef" | "elifndef" | "else" | "endif" => {
              self.sink.push(Diagnostic::error(DiagKind::MismatchedDirective(leak(&name)), tok.location));
            }
            _ => out.push(self.fold_single_line(tok.location, &name, rest)),
          }
        }
        _ => out.push(tok),
      }
    }
    out
  }

  /// Collect one `#if`/`#ifdef`/`#ifndef` ... `#endif` chain, recursively
  /// folding any nested conditional into a single body token.
  fn parse_group(
    &mut self,
    loc: Location,
    first_name: &str,
    first_rest: Vec<Token>,
    it: &mut std::iter::Peekable<IntoIter<Token>>,
  ) -> Vec<CondBranch> {
    let mut branches = Vec::new();
    let mut kind = branch_kind(first_name);
    let mut condition = first_rest;
    loop {
      let (body, terminator) = self.collect_branch_body(loc, it);
      branches.push(CondBranch { kind, condition, body });
      let Some((term_name, term_rest)) = terminator else { break };
      match term_name.as_str() {
        "endif" => break,
        "else" => { kind = CondBranchKind::Else; condition = Vec::new(); }
        "elif" => { kind = CondBranchKind::Elif; condition = term_rest; }
        "elifdef" => { kind = CondBranchKind::Elifdef; condition = term_rest; }
        "elifndef" => { kind = CondBranchKind::Elifndef; condition = term_rest; }
        _ => unreachable!("terminator is always one of the five handled above"),
      }
    }
    branches
  }

  /// Returns the body tokens up to (not including) the next directive at
  /// this nesting level, plus that directive's name and argument tokens
  /// (`None` if the input ran out before `#endif`, which is itself a
  /// mismatched-directive error the caller reports).
  #[allow(clippy::type_complexity)]
  fn collect_branch_body(
    &mut self,
    open_loc: Location,
    it: &mut std::iter::Peekable<IntoIter<Token>>,
  ) -> (Vec<Token>, Option<(String, Vec<Token>)>) {
    let mut body = Vec::new();
    loop {
      let Some(tok) = it.next() else {
        self.sink.push(Diagnostic::error(DiagKind::MismatchedDirective("endif"), open_loc));
        return (body, None);
      };
      match tok.kind {
        TokenKind::PreprocessorLine(line) => {
          let (name, rest) = split_directive(&line);
          match name.as_str() {
            "if" | "ifdef" | "ifndef" => {
              let nested = self.parse_group(tok.location, &name, rest, it);
              body.push(Token::new(TokenKind::Preprocessor(PreprocessorKind::Conditional(nested)), tok.location));
            }
            "elif" | "elifdef" | "elifndef" | "else" | "endif" => return (body, Some((name, rest))),
            _ => body.push(self.fold_single_line(tok.location, &name, rest)),
          }
        }
        _ => body.push(tok),
      }
    }
  }

  fn fold_single_line(&mut self, loc: Location, name: &str, rest: Vec<Token>) -> Token {
    let kind = match name {
      "define" => self.fold_define(rest),
      "undef" => PreprocessorKind::Undef(intern(first_text(&rest).unwrap_or_default())),
      "include" => PreprocessorKind::Include(join_text(&rest)),
      "embed" => PreprocessorKind::Embed(join_text(&rest)),
      "line" => self.fold_line(rest, loc),
      "error" => PreprocessorKind::Error(join_text(&rest)),
      "warning" => PreprocessorKind::Warning(join_text(&rest)),
      "pragma" => PreprocessorKind::Pragma(rest),
      other => {
        self.sink.push(Diagnostic::error(DiagKind::UnknownDirective(other.to_owned()), loc));
        PreprocessorKind::Pragma(rest)
      }
    };
    Token::new(TokenKind::Preprocessor(kind), loc)
  }

  fn fold_define(&mut self, rest: Vec<Token>) -> PreprocessorKind {
    let Some(name_tok) = rest.first() else {
      return PreprocessorKind::Define { name: intern(""), params: None, replacement: Vec::new() };
    };
    let name = intern(name_tok.as_identifier().unwrap_or(""));
    let mut params = None;
    let mut body_start = 1;
    if let Some(paren) = rest.get(1) {
      let adjacent = name_tok.location.end_position == paren.location.start_position;
      if adjacent && paren.as_punct() == Some("(") {
        let mut ps = Vec::new();
        let mut i = 2;
        while i < rest.len() && rest[i].as_punct() != Some(")") {
          if let Some(id) = rest[i].as_identifier() { ps.push(intern(id)); }
          i += 1;
        }
        if i < rest.len() { i += 1; }
        params = Some(ps);
        body_start = i;
      }
    }
    PreprocessorKind::Define { name, params, replacement: rest[body_start.min(rest.len())..].to_vec() }
  }

  fn fold_line(&mut self, rest: Vec<Token>, loc: Location) -> PreprocessorKind {
    let line = first_text(&rest).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
      self.sink.push(Diagnostic::error(DiagKind::BadPath, loc));
      0
    });
    let filename = rest.get(1).and_then(|t| match &t.kind {
      TokenKind::Literal(crate::token::Literal::Str(s)) => Some(intern(s)),
      _ => None,
    });
    PreprocessorKind::Line { line, filename }
  }
}

fn split_directive(line: &[Token]) -> (String, Vec<Token>) {
  let Some(first) = line.first() else { return (String::new(), Vec::new()) };
  let name = first.as_identifier().unwrap_or("").to_owned();
  (name, line[1..].to_vec())
}

fn branch_kind(name: &str) -> CondBranchKind {
  match name {
    "if" => CondBranchKind::If,
    "ifdef" => CondBranchKind::Ifdef,
    "ifndef" => CondBranchKind::Ifndef,
    _ => unreachable!("caller only passes if/ifdef/ifndef"),
  }
}

fn first_text(tokens: &[Token]) -> Option<&str> { tokens.first().and_then(Token::as_identifier) }

fn join_text(tokens: &[Token]) -> String {
  tokens.iter().map(crate::token::to_source).collect::<Vec<_>>().join(" ")
}

fn leak(s: &str) -> &'static str { Box::leak(s.to_owned().into_boxed_str()) }

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::scanner::Scanner;
  use crate::source::SourceFile;

  fn preparse(src: &str) -> (Vec<Token>, DiagnosticSink) {
    let file = SourceFile::new("t.c", src);
    let mut sink = DiagnosticSink::new();
    let tokens = Scanner::new(&file, &Config::default()).scan(&mut sink);
    let out = Preparser::new(&mut sink).run(tokens);
    (out, sink)
  }

  #[test]
  fn define_object_like_macro() {
    let (tokens, sink) = preparse("#define FOO 1\n");
    assert!(sink.is_empty());
    match &tokens[0].kind {
      TokenKind::Preprocessor(PreprocessorKind::Define { name, params, replacement }) => {
        assert_eq!(name.as_str(), "FOO");
        assert!(params.is_none());
        assert_eq!(replacement.len(), 1);
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn define_function_like_macro_requires_adjacent_paren() {
    let (tokens, _) = preparse("#define FOO(X) X\n");
    match &tokens[0].kind {
      TokenKind::Preprocessor(PreprocessorKind::Define { params: Some(ps), .. }) => {
        assert_eq!(ps.len(), 1);
      }
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn if_else_endif_group_is_one_token() {
    let (tokens, sink) = preparse("#if X\nint a;\n#else\nint b;\n#endif\nint c;");
    assert!(sink.is_empty());
    match &tokens[0].kind {
      TokenKind::Preprocessor(PreprocessorKind::Conditional(branches)) => {
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].kind, CondBranchKind::If);
        assert_eq!(branches[1].kind, CondBranchKind::Else);
      }
      other => panic!("unexpected {other:?}"),
    }
    // the trailing `int c;` remains ordinary tokens after the group.
    assert!(tokens.len() > 1);
  }

  #[test]
  fn ifndef_uses_the_correct_kind_not_ifdef() {
    let (tokens, _) = preparse("#ifndef FOO\n#endif\n");
    match &tokens[0].kind {
      TokenKind::Preprocessor(PreprocessorKind::Conditional(branches)) =>
        assert_eq!(branches[0].kind, CondBranchKind::Ifndef),
      other => panic!("unexpected {other:?}"),
    }
  }

  #[test]
  fn unterminated_if_reports_mismatched_directive() {
    let (_, sink) = preparse("#if X\nint a;\n");
    assert_eq!(sink.len(), 1);
  }
}
