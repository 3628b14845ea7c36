//! Data-type and identifier resolution (§4.6): typedef expansion with
//! cycle detection, generic-parameter substitution, and the structural
//! predicates the typechecker and emitter both consult.

use hashbrown::HashSet;
use ci_util::Symbol;

use crate::ast::{DataType, Decl, Primitive};
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::scope::{ResultFile, ScopeId, SymbolKind};
use crate::source::Location;

pub struct Resolver<'f> {
  pub file: &'f ResultFile,
}

impl<'f> Resolver<'f> {
  #[must_use] pub fn new(file: &'f ResultFile) -> Self { Self { file } }

  /// Produce the canonical form of `ty` as seen from `scope` (§4.6):
  /// typedefs expanded one level at a time with cycle detection, generic
  /// parameters substituted against `bindings`, `_Atomic` unwrapped only
  /// for comparison purposes (preserved for emission by the caller keeping
  /// the original around separately).
  #[must_use] pub fn canonicalize(
    &self,
    ty: &DataType,
    scope: ScopeId,
    bindings: &[(Symbol, DataType)],
    sink: &mut DiagnosticSink,
    loc: Location,
  ) -> DataType {
    self.canonicalize_inner(ty, scope, bindings, sink, loc, &mut HashSet::new())
  }

  fn canonicalize_inner(
    &self,
    ty: &DataType,
    scope: ScopeId,
    bindings: &[(Symbol, DataType)],
    sink: &mut DiagnosticSink,
    loc: Location,
    seen: &mut HashSet<Symbol>,
  ) -> DataType {
    match ty {
      DataType::GenericVar(name) => {
        bindings.iter().find(|(n, _)| n == name).map_or_else(|| ty.clone(), |(_, t)| t.clone())
      }
      DataType::Typedef { name, called_generics } => {
        if !seen.insert(*name) {
          sink.push(Diagnostic::error(DiagKind::TypedefCycle(name.to_string()), loc));
          return DataType::void();
        }
        let Some(entry) = self.file.lookup(scope, SymbolKind::Alias, *name) else {
          return ty.clone();
        };
        let Decl::Typedef(td) = self.file.decl(entry.decl) else { return ty.clone() };
        let next_bindings: Vec<(Symbol, DataType)> = match (&td.generic_params, called_generics) {
          (Some(params), Some(args)) => params.iter().copied().zip(args.iter().cloned()).collect(),
          _ => bindings.to_vec(),
        };
        self.canonicalize_inner(&td.aliased, scope, &next_bindings, sink, loc, seen)
      }
      DataType::Atomic(inner) => DataType::Atomic(Box::new(
        self.canonicalize_inner(inner, scope, bindings, sink, loc, seen),
      )),
      DataType::PreConst(inner) => DataType::PreConst(Box::new(
        self.canonicalize_inner(inner, scope, bindings, sink, loc, seen),
      )),
      DataType::PostConst(inner) => DataType::PostConst(Box::new(
        self.canonicalize_inner(inner, scope, bindings, sink, loc, seen),
      )),
      DataType::Qualified { inner, quals } => DataType::Qualified {
        inner: Box::new(self.canonicalize_inner(inner, scope, bindings, sink, loc, seen)),
        quals: *quals,
      },
      DataType::Ptr { inner, name, quals } => DataType::Ptr {
        inner: Box::new(self.canonicalize_inner(inner, scope, bindings, sink, loc, seen)),
        name: *name,
        quals: *quals,
      },
      DataType::Array { element, size, name, is_static, quals } => DataType::Array {
        element: Box::new(self.canonicalize_inner(element, scope, bindings, sink, loc, seen)),
        size: size.clone(),
        name: *name,
        is_static: *is_static,
        quals: *quals,
      },
      other => other.clone(),
    }
  }

  #[must_use] pub fn is_integer(&self, ty: &DataType) -> bool {
    matches!(
      ty.unwrap_quals(),
      DataType::Primitive(Primitive::Bool | Primitive::Int(_)) | DataType::Enum(_)
    )
  }

  #[must_use] pub fn is_float(&self, ty: &DataType) -> bool {
    matches!(ty.unwrap_quals(), DataType::Primitive(Primitive::Float { .. } | Primitive::Decimal(_)))
  }

  #[must_use] pub fn is_arithmetic(&self, ty: &DataType) -> bool { self.is_integer(ty) || self.is_float(ty) }

  #[must_use] pub fn is_ptr(&self, ty: &DataType) -> bool { matches!(ty.unwrap_quals(), DataType::Ptr { .. }) }

  #[must_use] pub fn is_array(&self, ty: &DataType) -> bool { matches!(ty.unwrap_quals(), DataType::Array { .. }) }

  /// Whether `ty` can serve as the target of an array-subscript/pointer
  /// arithmetic expression (§4.7 "Array access").
  #[must_use] pub fn is_array_compatible(&self, ty: &DataType) -> bool { self.is_ptr(ty) || self.is_array(ty) }

  #[must_use] pub fn is_void(&self, ty: &DataType) -> bool {
    matches!(ty.unwrap_quals(), DataType::Primitive(Primitive::Void))
  }

  #[must_use] pub fn is_compatible_with_void_ptr(&self, ty: &DataType) -> bool {
    match ty.unwrap_quals() {
      DataType::Ptr { inner, .. } => self.is_void(inner),
      _ => false,
    }
  }

  #[must_use] pub fn unwrap_ptr<'a>(&self, ty: &'a DataType) -> Option<&'a DataType> {
    match ty.unwrap_quals() {
      DataType::Ptr { inner, .. } => Some(inner),
      _ => None,
    }
  }

  /// Two pointer-ish types are compatible if either pointee is
  /// void-compatible or the pointees are themselves recursively
  /// compatible (§4.7 "Implicit cast policy": "pointer ↔ pointer").
  #[must_use] pub fn pointers_compatible(&self, a: &DataType, b: &DataType) -> bool {
    match (self.unwrap_ptr(a), self.unwrap_ptr(b)) {
      (Some(pa), Some(pb)) => self.is_void(pa) || self.is_void(pb) || self.types_compatible(pa, pb),
      _ => false,
    }
  }

  /// Structural compatibility used by casts/initializers/assignment
  /// (ignoring qualifiers, which C treats as a separate, lesser concern
  /// at the top level of an implicit conversion).
  #[must_use] pub fn types_compatible(&self, a: &DataType, b: &DataType) -> bool {
    let (a, b) = (a.unwrap_quals(), b.unwrap_quals());
    if self.is_arithmetic(a) && self.is_arithmetic(b) { return true }
    match (a, b) {
      (DataType::Ptr { .. }, DataType::Ptr { .. }) => self.pointers_compatible(a, b),
      (DataType::Struct(ra), DataType::Struct(rb)) | (DataType::Union(ra), DataType::Union(rb)) => ra.tag == rb.tag,
      (DataType::Enum(ra), DataType::Enum(rb)) => ra.tag == rb.tag,
      _ => a == b,
    }
  }

  /// Implicit-cast policy (§4.7): whether an actual of type `from` may be
  /// implicitly converted to a target of type `to` without diagnostic.
  #[must_use] pub fn implicit_cast_ok(&self, from: &DataType, to: &DataType) -> bool {
    if matches!(to.unwrap_quals(), DataType::Any) || matches!(from.unwrap_quals(), DataType::Any) { return true }
    if self.is_arithmetic(from) && self.is_arithmetic(to) { return true }
    if self.is_ptr(from) && self.is_integer(to) { return true }
    if self.is_integer(from) && self.is_ptr(to) { return true }
    if self.is_ptr(from) && self.is_ptr(to) { return self.pointers_compatible(from, to) }
    self.types_compatible(from, to)
  }

  /// Look up the field list of a struct/union type (resolving typedefs
  /// first), for member-access typechecking and initializer designator
  /// resolution (§4.6, §4.7 "Initializers").
  #[must_use] pub fn get_fields_of_struct_or_union(
    &self,
    ty: &DataType,
    scope: ScopeId,
  ) -> Option<&'f [crate::ast::Field]> {
    let kind = match ty.unwrap_quals() {
      DataType::Struct(_) => SymbolKind::Record,
      DataType::Union(_) => SymbolKind::Union,
      _ => return None,
    };
    let tag = match ty.unwrap_quals() { DataType::Struct(r) | DataType::Union(r) => r.tag, _ => None }?;
    let entry = self.file.lookup(scope, kind, tag)?;
    match self.file.decl(entry.decl) {
      Decl::Struct(r) | Decl::Union(r) => r.fields.as_deref(),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{IntKind, TagRef};

  #[test]
  fn typedef_expands_to_its_aliased_type() {
    let mut rf = ResultFile::new(ci_util::intern("t.c"));
    let name = ci_util::intern("Age");
    let decl_id = rf.push_decl(Decl::Typedef(crate::ast::TypedefDecl {
      common: Default::default(), name, generic_params: None, aliased: DataType::int(),
    }));
    let loc = Location::point(ci_util::intern("t.c"), crate::source::LineCol { line: 1, column: 1, position: 0 });
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    rf.scope_mut(root).insert(SymbolKind::Alias, name, decl_id, loc, &mut sink).unwrap();
    let resolver = Resolver::new(&rf);
    let canon = resolver.canonicalize(&DataType::Typedef { name, called_generics: None }, root, &[], &mut sink, loc);
    assert_eq!(canon, DataType::int());
    assert!(sink.is_empty());
  }

  #[test]
  fn void_pointer_is_compatible_with_any_pointer() {
    let rf = ResultFile::new(ci_util::intern("t.c"));
    let resolver = Resolver::new(&rf);
    let void_ptr = DataType::Ptr { inner: Box::new(DataType::void()), name: None, quals: Default::default() };
    let int_ptr = DataType::Ptr { inner: Box::new(DataType::int()), name: None, quals: Default::default() };
    assert!(resolver.pointers_compatible(&void_ptr, &int_ptr));
  }

  #[test]
  fn struct_tags_compare_by_name() {
    let rf = ResultFile::new(ci_util::intern("t.c"));
    let resolver = Resolver::new(&rf);
    let a = DataType::Struct(TagRef { tag: Some(ci_util::intern("Foo")), called_generics: None });
    let b = DataType::Struct(TagRef { tag: Some(ci_util::intern("Foo")), called_generics: None });
    let c = DataType::Struct(TagRef { tag: Some(ci_util::intern("Bar")), called_generics: None });
    assert!(resolver.types_compatible(&a, &b));
    assert!(!resolver.types_compatible(&a, &c));
    let _ = IntKind::Int;
  }
}
