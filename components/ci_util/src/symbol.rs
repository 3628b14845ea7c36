//! Global string interning.
//!
//! Every identifier, macro name, field name and directive argument that
//! flows through the frontend is interned once here; downstream stages
//! compare [`Symbol`]s by value instead of re-hashing strings.

use std::sync::{LazyLock, Mutex};
use hashbrown::HashMap;

/// An interned string. Cheap to copy, compare and hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Symbol(u32);

impl Symbol {
  /// The empty identifier, used as a sentinel for `_` and anonymous fields.
  pub const UNDER: Symbol = Symbol(0);

  #[must_use] pub fn into_usize(self) -> usize { self.0 as usize }

  #[must_use] pub fn as_str(self) -> &'static str {
    INTERNER.lock().unwrap_or_else(|e| e.into_inner()).resolve(self)
  }
}

impl std::fmt::Display for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Default)]
pub struct Interner {
  strings: Vec<&'static str>,
  map: HashMap<&'static str, Symbol>,
}

impl Interner {
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) { return sym }
    let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
    let sym = Symbol(u32::try_from(self.strings.len()).expect("too many interned symbols"));
    self.strings.push(leaked);
    self.map.insert(leaked, sym);
    sym
  }

  #[must_use] pub fn resolve(&self, sym: Symbol) -> &'static str {
    self.strings[sym.into_usize()]
  }
}

static INTERNER: LazyLock<Mutex<Interner>> = LazyLock::new(|| {
  let mut i = Interner::default();
  assert_eq!(i.intern("_"), Symbol::UNDER);
  Mutex::new(i)
});

/// Intern `s` into the process-wide symbol table.
#[must_use] pub fn intern(s: &str) -> Symbol {
  INTERNER.lock().unwrap_or_else(|e| e.into_inner()).intern(s)
}

/// Build a dense lookup table from symbol to `T`, for use by keyword/builtin
/// tables that want O(1) lookup by [`Symbol`] instead of hashing.
#[must_use] pub fn init_dense_symbol_map<T: Copy>(pairs: &[(Symbol, T)]) -> Box<[Option<T>]> {
  let len = pairs.iter().map(|(s, _)| s.into_usize() + 1).max().unwrap_or(0);
  let mut map = vec![None; len].into_boxed_slice();
  for &(s, t) in pairs { map[s.into_usize()] = Some(t) }
  map
}
