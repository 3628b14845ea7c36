//! The configuration surface the external driver passes into §6's
//! `parse`/`generate` entrypoints.

/// The configured C standard. Ordered so that `standard < CStandard::C23`
/// reads naturally (the emitter uses exactly this comparison to decide
/// between `_Bool` and `bool`, see §4.9).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CStandard {
  C89,
  C95,
  C99,
  C11,
  C17,
  C23,
}

impl CStandard {
  #[must_use] pub fn has_keyword(self, name: &str) -> bool {
    match name {
      "bool" | "nullptr" | "constexpr" | "typeof" | "typeof_unqual" | "_BitInt" => self >= CStandard::C23,
      "_Bool" | "_Generic" | "_Static_assert" | "thread_local" | "_Thread_local" => self >= CStandard::C11,
      "inline" | "restrict" => self >= CStandard::C99,
      _ => true,
    }
  }
}

/// Which downstream C compiler the emitted source targets. Only affects
/// emitter compatibility quirks (§4.9 item 8); the frontend itself never
/// branches on this for parsing/typechecking decisions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CompilerKind {
  Gcc,
  Clang,
  Other,
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
  pub standard: CStandard,
  pub compiler: CompilerKind,
  pub dump_scanner: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self { standard: CStandard::C17, compiler: CompilerKind::Gcc, dump_scanner: false }
  }
}
