//! Byte-addressed source files and the half-open [`Location`] span every
//! token, AST node and symbol carries.

use std::rc::Rc;
use ci_util::Symbol;

/// A single source file, held in memory for the lifetime of its
/// translation unit. Line/column tracking is computed on demand from a
/// [`Cursor`] walking the byte buffer; nothing here owns a line index
/// up front because most files are only ever cursor-walked once, by
/// the scanner.
#[derive(Debug)]
pub struct SourceFile {
  pub name: Symbol,
  pub content: Rc<str>,
}

impl SourceFile {
  #[must_use] pub fn new(name: &str, content: impl Into<Rc<str>>) -> Self {
    Self { name: ci_util::intern(name), content: content.into() }
  }

  #[must_use] pub fn cursor(&self) -> Cursor<'_> {
    Cursor { file: self, bytes: self.content.as_bytes(), pos: 0, line: 1, column: 1 }
  }
}

/// A movable position within a [`SourceFile`], advancing by byte but
/// tracking 1-based line/column for diagnostics. `\n`, `\r\n` and bare
/// `\r` are each counted as a single line break.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
  pub file: &'a SourceFile,
  bytes: &'a [u8],
  pos: usize,
  line: u32,
  column: u32,
}

impl<'a> Cursor<'a> {
  #[must_use] pub fn is_eof(&self) -> bool { self.pos >= self.bytes.len() }

  #[must_use] pub fn peek(&self) -> Option<u8> { self.bytes.get(self.pos).copied() }

  #[must_use] pub fn peek_at(&self, offset: usize) -> Option<u8> {
    self.bytes.get(self.pos + offset).copied()
  }

  pub fn bump(&mut self) -> Option<u8> {
    let b = self.peek()?;
    self.pos += 1;
    match b {
      b'\n' => { self.line += 1; self.column = 1; }
      b'\r' if self.peek() != Some(b'\n') => { self.line += 1; self.column = 1; }
      b'\r' => {} // swallowed, the following '\n' does the line bump
      _ => self.column += 1,
    }
    Some(b)
  }

  #[must_use] pub fn point(&self) -> LineCol {
    LineCol { line: self.line, column: self.column, position: self.pos }
  }

  #[must_use] pub fn slice(&self, from: usize) -> &'a str {
    std::str::from_utf8(&self.bytes[from..self.pos]).unwrap_or_default()
  }

  /// A best-effort UTF-8 view of up to `n` upcoming bytes, used for
  /// multi-character punctuator lookahead.
  #[must_use] pub fn slice_from_here(&self, n: usize) -> &'a str {
    let end = (self.pos + n).min(self.bytes.len());
    let mut end = end;
    while end > self.pos && std::str::from_utf8(&self.bytes[self.pos..end]).is_err() { end -= 1; }
    std::str::from_utf8(&self.bytes[self.pos..end]).unwrap_or_default()
  }
}

/// A line/column/byte-offset triple, the half of a [`Location`] that a
/// [`Cursor`] can produce directly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LineCol {
  pub line: u32,
  pub column: u32,
  pub position: usize,
}

/// A half-open span `[start, end)` within one named file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Location {
  pub filename: Symbol,
  pub start_line: u32,
  pub start_column: u32,
  pub start_position: usize,
  pub end_line: u32,
  pub end_column: u32,
  pub end_position: usize,
}

impl Location {
  /// Construct a location starting at `start` and ending at the cursor's
  /// current position, per §3 ("constructed from a cursor, terminated by
  /// copying the cursor's current position into the end fields").
  #[must_use] pub fn new(filename: Symbol, start: LineCol, cursor: &Cursor<'_>) -> Self {
    let end = cursor.point();
    Self {
      filename,
      start_line: start.line, start_column: start.column, start_position: start.position,
      end_line: end.line, end_column: end.column, end_position: end.position,
    }
  }

  /// A zero-width location at `point`, used for synthetic tokens the
  /// preparser and monomorphizer manufacture with no direct source text.
  #[must_use] pub fn point(filename: Symbol, point: LineCol) -> Self {
    Self {
      filename,
      start_line: point.line, start_column: point.column, start_position: point.position,
      end_line: point.line, end_column: point.column, end_position: point.position,
    }
  }
}

impl std::fmt::Display for Location {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}:{}", self.filename, self.start_line, self.start_column)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cursor_tracks_line_and_column_across_newlines() {
    let file = SourceFile::new("t.c", "ab\ncd");
    let mut cur = file.cursor();
    let start = cur.point();
    cur.bump(); cur.bump(); // "ab"
    assert_eq!(cur.point(), LineCol { line: 1, column: 3, position: 2 });
    cur.bump(); // '\n'
    assert_eq!(cur.point(), LineCol { line: 2, column: 1, position: 3 });
    let loc = Location::new(file.name, start, &cur);
    assert_eq!(loc.start_line, 1);
    assert_eq!(loc.end_line, 2);
  }

  #[test]
  fn crlf_counts_as_one_line_break() {
    let file = SourceFile::new("t.c", "a\r\nb");
    let mut cur = file.cursor();
    cur.bump(); // 'a'
    cur.bump(); // '\r'
    assert_eq!(cur.point().line, 1);
    cur.bump(); // '\n'
    assert_eq!(cur.point().line, 2);
  }
}
