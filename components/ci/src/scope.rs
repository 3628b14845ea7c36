//! Hierarchical named scopes (§3 "Scope", §4.5) and the per-translation-unit
//! [`ResultFile`] that the resolver, typechecker and monomorphizer all key
//! off of, plus the process-wide registry that resolves cross-file
//! references (§3 "Result file / registry", §5 concurrency model).

use hashbrown::HashMap;
use ci_util::Symbol;

use crate::ast::{Arenas, Decl, DeclId, ScopeId};
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::source::Location;

/// Which per-kind map a name was registered into, used both for lookup
/// dispatch and for the cross-kind collision rules of §4.5.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SymbolKind {
  Module,
  Constant,
  Variable,
  Parameter,
  Function,
  Label,
  Enum,
  Record,
  Union,
  Alias,
  Generic,
}

#[derive(Clone, Copy, Debug)]
pub struct ScopeEntry {
  pub decl: DeclId,
  pub kind: SymbolKind,
}

/// One lexical scope: the translation-unit root, or a nested block/function
/// body (§4.5). Immutable after the parser closes it, except for the
/// monomorphizer's appends into the owning [`ResultFile`]'s decl list and,
/// transitively, new `*-gen` entries registered here (§3 "Lifecycle").
#[derive(Default, Debug)]
pub struct Scope {
  pub parent: Option<ScopeId>,
  modules: HashMap<Symbol, ScopeEntry>,
  constants: HashMap<Symbol, ScopeEntry>,
  variables: HashMap<Symbol, ScopeEntry>,
  parameters: HashMap<Symbol, ScopeEntry>,
  functions: HashMap<Symbol, ScopeEntry>,
  labels: HashMap<Symbol, ScopeEntry>,
  enums: HashMap<Symbol, ScopeEntry>,
  records: HashMap<Symbol, ScopeEntry>,
  unions: HashMap<Symbol, ScopeEntry>,
  aliases: HashMap<Symbol, ScopeEntry>,
  generics: HashMap<Symbol, ScopeEntry>,
  /// Whether a `switch` is lexically in progress at this scope, consulted
  /// by the typechecker's `break`/`default`/`case` context check (§4.7).
  pub in_switch: bool,
  /// The generic-params context: `(called_generics, template_generics)`
  /// bound while typechecking/resolving inside a generic template body.
  pub generics_context: Option<(Vec<Symbol>, Vec<Symbol>)>,
}

impl Scope {
  #[must_use] pub fn with_parent(parent: Option<ScopeId>) -> Self {
    Self { parent, ..Self::default() }
  }

  fn map(&self, kind: SymbolKind) -> &HashMap<Symbol, ScopeEntry> {
    match kind {
      SymbolKind::Module => &self.modules,
      SymbolKind::Constant => &self.constants,
      SymbolKind::Variable => &self.variables,
      SymbolKind::Parameter => &self.parameters,
      SymbolKind::Function => &self.functions,
      SymbolKind::Label => &self.labels,
      SymbolKind::Enum => &self.enums,
      SymbolKind::Record => &self.records,
      SymbolKind::Union => &self.unions,
      SymbolKind::Alias => &self.aliases,
      SymbolKind::Generic => &self.generics,
    }
  }

  fn map_mut(&mut self, kind: SymbolKind) -> &mut HashMap<Symbol, ScopeEntry> {
    match kind {
      SymbolKind::Module => &mut self.modules,
      SymbolKind::Constant => &mut self.constants,
      SymbolKind::Variable => &mut self.variables,
      SymbolKind::Parameter => &mut self.parameters,
      SymbolKind::Function => &mut self.functions,
      SymbolKind::Label => &mut self.labels,
      SymbolKind::Enum => &mut self.enums,
      SymbolKind::Record => &mut self.records,
      SymbolKind::Union => &mut self.unions,
      SymbolKind::Alias => &mut self.aliases,
      SymbolKind::Generic => &mut self.generics,
    }
  }

  #[must_use] pub fn get(&self, kind: SymbolKind, name: Symbol) -> Option<ScopeEntry> {
    self.map(kind).get(&name).copied()
  }

  /// Kinds that mutually exclude `kind` per §4.5's cross-kind collision
  /// table: "modules ⟂ functions, constants ⟂ functions/modules,
  /// struct/enum/union/typedef/object kinds mutually exclusive, variables
  /// ⟂ labels".
  fn conflicting_kinds(kind: SymbolKind) -> &'static [SymbolKind] {
    use SymbolKind::*;
    match kind {
      Module => &[Function, Constant],
      Function => &[Module, Constant],
      Constant => &[Module, Function],
      Enum | Record | Union | Alias => &[Enum, Record, Union, Alias],
      Variable | Parameter => &[Label],
      Label => &[Variable, Parameter],
      Generic => &[],
    }
  }

  /// Register `name` under `kind`, enforcing §4.5's collision rules.
  /// Returns `Ok(())` on success; otherwise pushes the appropriate
  /// diagnostic to `sink` and returns `Err(())`.
  ///
  /// Function prototypes that agree with a later definition are not a
  /// collision (§4.5): the caller is expected to check
  /// `common().is_prototype` before calling this for a second time with
  /// the same name and merge instead.
  pub fn insert(
    &mut self,
    kind: SymbolKind,
    name: Symbol,
    decl: DeclId,
    loc: Location,
    sink: &mut DiagnosticSink,
  ) -> Result<(), ()> {
    if let Some(prior) = self.get(kind, name) {
      sink.push(
        Diagnostic::error(DiagKind::DuplicateName(name.to_string()), loc)
          .with_note("previous declaration was here", loc_of(prior.decl, loc)),
      );
      return Err(());
    }
    for &other in Self::conflicting_kinds(kind) {
      if self.map(other).contains_key(&name) {
        sink.push(Diagnostic::error(DiagKind::KindConflict(name.to_string()), loc));
        return Err(());
      }
    }
    self.map_mut(kind).insert(name, ScopeEntry { decl, kind });
    Ok(())
  }
}

/// Placeholder note location until the caller threads through the prior
/// declaration's actual location; kept as a named function so the call
/// site above reads clearly.
fn loc_of(_decl: DeclId, fallback: Location) -> Location { fallback }

/// One parsed, resolved translation unit (§3 "Result file / registry").
/// Declarations are appended in source order by the parser; the
/// monomorphizer appends further `*-gen` declarations with fresh ids.
#[derive(Debug)]
pub struct ResultFile {
  pub filename: Symbol,
  pub decls: Vec<Box<Decl>>,
  pub scopes: Vec<Scope>,
  pub root_scope: ScopeId,
  pub arenas: Arenas,
  /// Deterministic mangled name → already-instantiated `*-gen` decl,
  /// consulted by the monomorphizer before synthesizing a new one
  /// (§4.8 step 2, §8 "Monomorphization idempotence").
  pub instantiations: HashMap<Symbol, DeclId>,
}

impl ResultFile {
  #[must_use] pub fn new(filename: Symbol) -> Self {
    let mut scopes = Vec::new();
    scopes.push(Scope::with_parent(None));
    Self {
      filename,
      decls: Vec::new(),
      scopes,
      root_scope: ScopeId::from_usize(0),
      arenas: Arenas::new(),
      instantiations: HashMap::new(),
    }
  }

  pub fn new_scope(&mut self, parent: ScopeId) -> ScopeId {
    self.scopes.push(Scope::with_parent(Some(parent)));
    ci_util::Idx::from_usize(self.scopes.len() - 1)
  }

  #[must_use] pub fn scope(&self, id: ScopeId) -> &Scope { &self.scopes[id.index()] }
  pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope { &mut self.scopes[id.index()] }

  pub fn push_decl(&mut self, decl: Decl) -> DeclId {
    self.decls.push(Box::new(decl));
    ci_util::Idx::from_usize(self.decls.len() - 1)
  }

  #[must_use] pub fn decl(&self, id: DeclId) -> &Decl { &self.decls[id.index()] }
  pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl { &mut self.decls[id.index()] }

  /// Walk `scope`'s parent chain looking for `name` under `kind`; the
  /// first scope containing the name wins (§4.5 "Lookup").
  #[must_use] pub fn lookup(&self, mut scope: ScopeId, kind: SymbolKind, name: Symbol) -> Option<ScopeEntry> {
    loop {
      if let Some(e) = self.scope(scope).get(kind, name) { return Some(e) }
      match self.scope(scope).parent {
        Some(p) => scope = p,
        None => return None,
      }
    }
  }

  /// Lookup across every kind a plain identifier expression could refer
  /// to — variables, parameters, functions, constants — in that order,
  /// per §4.6's identifier-resolution contract.
  #[must_use] pub fn lookup_identifier(&self, scope: ScopeId, name: Symbol) -> Option<ScopeEntry> {
    for kind in [SymbolKind::Variable, SymbolKind::Parameter, SymbolKind::Function, SymbolKind::Constant] {
      if let Some(e) = self.lookup(scope, kind, name) { return Some(e) }
    }
    None
  }
}

/// A process-wide map of filename → [`ResultFile`] (§3, §5): populated at
/// driver startup, read-only once parallel per-file pipelines begin.
/// Cross-file `#include`-style references resolve through this so that
/// monomorphization keys stay consistent across sibling units.
#[derive(Default)]
pub struct Registry {
  files: HashMap<Symbol, ResultFile>,
}

impl Registry {
  #[must_use] pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, file: ResultFile) { self.files.insert(file.filename, file); }

  #[must_use] pub fn get(&self, filename: Symbol) -> Option<&ResultFile> { self.files.get(&filename) }
  pub fn get_mut(&mut self, filename: Symbol) -> Option<&mut ResultFile> { self.files.get_mut(&filename) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scope_ids_are_unique_and_parent_chain_is_acyclic() {
    let mut rf = ResultFile::new(ci_util::intern("t.c"));
    let a = rf.new_scope(rf.root_scope);
    let b = rf.new_scope(a);
    assert_ne!(a, b);
    assert_ne!(a, rf.root_scope);
    let mut seen = vec![b];
    let mut cur = rf.scope(b).parent;
    while let Some(s) = cur {
      assert!(!seen.contains(&s), "cycle detected");
      seen.push(s);
      cur = rf.scope(s).parent;
    }
  }

  #[test]
  fn variable_and_label_collide_across_kinds() {
    let mut rf = ResultFile::new(ci_util::intern("t.c"));
    let mut sink = DiagnosticSink::new();
    let loc = Location::point(ci_util::intern("t.c"), crate::source::LineCol { line: 1, column: 1, position: 0 });
    let name = ci_util::intern("x");
    let d1 = rf.push_decl(Decl::Label { common: Default::default(), name });
    let scope = rf.root_scope;
    assert!(rf.scope_mut(scope).insert(SymbolKind::Label, name, d1, loc, &mut sink).is_ok());
    let d2 = rf.push_decl(Decl::Variable(crate::ast::VariableDecl {
      common: Default::default(), name, ty: crate::ast::DataType::int(), initializer: None, is_local: true,
    }));
    assert!(rf.scope_mut(scope).insert(SymbolKind::Variable, name, d2, loc, &mut sink).is_err());
    assert_eq!(sink.len(), 1);
  }
}
