//! On-demand generic instantiation (§4.8): a deterministic mangled name per
//! concrete type-argument tuple, idempotent reuse through
//! [`ResultFile::instantiations`], and deep substitution of generic
//! parameters through a template's fields/params/return type/body.
//!
//! Substitution never expands typedefs or re-typechecks anything — it only
//! replaces [`DataType::GenericVar`] occurrences with their bound concrete
//! type, cloning just enough of the template's arena nodes to carry the
//! substitution through (§9 "Variant-heavy AST with deep recursion": a cheap
//! clone of indices rather than a deep tree copy wherever a subtree carries
//! no generic parameter at all would be the further optimization; this
//! first cut always rebuilds, which is simpler and still correct).

use hashbrown::HashSet;
use ci_util::Symbol;

use crate::ast::*;
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::scope::{ResultFile, ScopeId, SymbolKind};
use crate::source::Location;

/// Deterministic serialized name (§4.8 step 1): `base_name + "__" +
/// joined(type_arg_mangles)`.
#[must_use] pub fn mangle(file: &ResultFile, base: Symbol, args: &[DataType]) -> Symbol {
  let mut name = base.to_string();
  for a in args {
    name.push_str("__");
    name.push_str(&mangle_type(file, a));
  }
  ci_util::intern(&name)
}

/// The canonical textual form of one type argument with whitespace removed
/// and punctuation encoded: pointers → `P`, arrays → `A<size>`, etc. (§4.8
/// step 1). Every branch yields only identifier-safe characters so the
/// joined name is itself a valid C identifier.
fn mangle_type(file: &ResultFile, ty: &DataType) -> String {
  match ty {
    DataType::Primitive(p) => mangle_primitive(p),
    DataType::Atomic(inner) => format!("At{}", mangle_type(file, inner)),
    DataType::PreConst(inner) | DataType::PostConst(inner) => format!("C{}", mangle_type(file, inner)),
    DataType::Qualified { inner, .. } => mangle_type(file, inner),
    DataType::Ptr { inner, .. } => format!("P{}", mangle_type(file, inner)),
    DataType::Array { element, size, .. } => format!("A{}{}", mangle_array_size(file, size), mangle_type(file, element)),
    DataType::Function(f) => {
      let params = f.params.iter().map(|p| match p {
        Param::Normal { ty, .. } => mangle_type(file, ty),
        Param::Variadic => "Vararg".to_owned(),
      }).collect::<Vec<_>>().join("_");
      format!("Fn{}_{params}", mangle_type(file, &f.return_type))
    }
    DataType::Struct(r) | DataType::Union(r) | DataType::Enum(r) => mangle_tag(file, r),
    DataType::Typedef { name, called_generics } => {
      let mut s = name.to_string();
      if let Some(args) = called_generics {
        for a in args { s.push('_'); s.push_str(&mangle_type(file, a)); }
      }
      s
    }
    DataType::Builtin(i) => format!("B{i}"),
    DataType::GenericVar(name) => name.to_string(),
    DataType::Any => "Any".to_owned(),
  }
}

fn mangle_tag(file: &ResultFile, r: &TagRef) -> String {
  let mut s = r.tag.map_or_else(|| "anon".to_owned(), |t| t.to_string());
  if let Some(args) = &r.called_generics {
    for a in args { s.push('_'); s.push_str(&mangle_type(file, a)); }
  }
  s
}

fn mangle_array_size(file: &ResultFile, size: &ArraySize) -> String {
  match size {
    ArraySize::Unsized => "u".to_owned(),
    ArraySize::Sized(None) => "u".to_owned(),
    ArraySize::Sized(Some(e)) => match &file.arenas.exprs[*e] {
      Expr::Literal(LiteralValue::SignedInt(n)) => n.to_string(),
      Expr::Literal(LiteralValue::UnsignedInt(n)) => n.to_string(),
      _ => "n".to_owned(),
    },
  }
}

fn mangle_primitive(p: &Primitive) -> String {
  match p {
    Primitive::Bool => "bool".to_owned(),
    Primitive::Int(k) => match k {
      IntKind::Char => "char", IntKind::SChar => "schar", IntKind::UChar => "uchar",
      IntKind::Short => "short", IntKind::UShort => "ushort",
      IntKind::Int => "int", IntKind::UInt => "uint",
      IntKind::Long => "long", IntKind::ULong => "ulong",
      IntKind::LongLong => "llong", IntKind::ULongLong => "ullong",
    }.to_owned(),
    Primitive::Float { kind, complex, imaginary } => {
      let base = match kind { FloatKind::Float => "float", FloatKind::Double => "double", FloatKind::LongDouble => "ldouble" };
      let suffix = if *complex { "c" } else if *imaginary { "i" } else { "" };
      format!("{base}{suffix}")
    }
    Primitive::Decimal(k) => match k { DecimalKind::D32 => "d32", DecimalKind::D64 => "d64", DecimalKind::D128 => "d128" }.to_owned(),
    Primitive::Void => "void".to_owned(),
    Primitive::NullptrT => "nullptr_t".to_owned(),
  }
}

/// Deep-substitutes generic parameters out of a template's data type,
/// leaving everything else (typedef references, tag references) structurally
/// intact except for their own `called_generics` argument lists (§4.8 step 3).
#[must_use] pub fn substitute_type(ty: &DataType, bindings: &[(Symbol, DataType)]) -> DataType {
  match ty {
    DataType::GenericVar(name) => bindings.iter().find(|(n, _)| n == name).map_or_else(|| ty.clone(), |(_, t)| t.clone()),
    DataType::Atomic(inner) => DataType::Atomic(Box::new(substitute_type(inner, bindings))),
    DataType::PreConst(inner) => DataType::PreConst(Box::new(substitute_type(inner, bindings))),
    DataType::PostConst(inner) => DataType::PostConst(Box::new(substitute_type(inner, bindings))),
    DataType::Qualified { inner, quals } => DataType::Qualified { inner: Box::new(substitute_type(inner, bindings)), quals: *quals },
    DataType::Ptr { inner, name, quals } =>
      DataType::Ptr { inner: Box::new(substitute_type(inner, bindings)), name: *name, quals: *quals },
    DataType::Array { element, size, name, is_static, quals } => DataType::Array {
      element: Box::new(substitute_type(element, bindings)),
      size: size.clone(), name: *name, is_static: *is_static, quals: *quals,
    },
    DataType::Function(f) => DataType::Function(Box::new(FunctionType {
      name: f.name,
      params: f.params.iter().map(|p| substitute_param(p, bindings)).collect(),
      return_type: Box::new(substitute_type(&f.return_type, bindings)),
      generic_params: f.generic_params.clone(),
    })),
    DataType::Struct(r) => DataType::Struct(substitute_tag(r, bindings)),
    DataType::Union(r) => DataType::Union(substitute_tag(r, bindings)),
    DataType::Enum(r) => DataType::Enum(substitute_tag(r, bindings)),
    DataType::Typedef { name, called_generics } => DataType::Typedef {
      name: *name,
      called_generics: called_generics.as_ref().map(|gs| gs.iter().map(|g| substitute_type(g, bindings)).collect()),
    },
    other => other.clone(),
  }
}

fn substitute_param(p: &Param, bindings: &[(Symbol, DataType)]) -> Param {
  match p {
    Param::Normal { name, ty } => Param::Normal { name: *name, ty: substitute_type(ty, bindings) },
    Param::Variadic => Param::Variadic,
  }
}

fn substitute_tag(r: &TagRef, bindings: &[(Symbol, DataType)]) -> TagRef {
  TagRef {
    tag: r.tag,
    called_generics: r.called_generics.as_ref().map(|gs| gs.iter().map(|g| substitute_type(g, bindings)).collect()),
  }
}

fn substitute_fields(fields: &[Field], bindings: &[(Symbol, DataType)]) -> Vec<Field> {
  fields.iter().map(|f| match f {
    Field::Named { name, ty, bit_width } =>
      Field::Named { name: *name, ty: substitute_type(ty, bindings), bit_width: *bit_width },
    Field::AnonymousRecord { is_union, fields, parent_index } =>
      Field::AnonymousRecord { is_union: *is_union, fields: substitute_fields(fields, bindings), parent_index: *parent_index },
  }).collect()
}

/// Deep-substitutes a generic function template's body, minting a fresh
/// child scope under `parent_scope` and cloning every statement/expression
/// node so the instantiated body never aliases the template's (§3
/// "Lifecycle": the monomorphizer only ever appends, never mutates, a
/// sibling unit's nodes).
fn substitute_items(file: &mut ResultFile, items: &[FunctionItem], bindings: &[(Symbol, DataType)], scope: ScopeId) -> Vec<FunctionItem> {
  items.iter().map(|item| substitute_item(file, item, bindings, scope)).collect()
}

fn substitute_item(file: &mut ResultFile, item: &FunctionItem, bindings: &[(Symbol, DataType)], scope: ScopeId) -> FunctionItem {
  let kind = match &item.kind {
    FunctionItemKind::Decl(id) => FunctionItemKind::Decl(substitute_decl_in_body(file, *id, bindings, scope)),
    FunctionItemKind::Expr(id) => FunctionItemKind::Expr(substitute_expr(file, *id, bindings)),
    FunctionItemKind::Stmt(id) => FunctionItemKind::Stmt(substitute_stmt(file, *id, bindings, scope)),
  };
  FunctionItem { kind, scope }
}

fn substitute_decl_in_body(file: &mut ResultFile, id: DeclId, bindings: &[(Symbol, DataType)], scope: ScopeId) -> DeclId {
  let decl = file.decl(id).clone();
  let (new_decl, kind, name) = match decl {
    Decl::Variable(v) => {
      let name = v.name;
      let initializer = v.initializer.map(|e| substitute_expr(file, e, bindings));
      let ty = substitute_type(&v.ty, bindings);
      (Decl::Variable(VariableDecl { ty, initializer, ..v }), SymbolKind::Variable, name)
    }
    Decl::Label { common, name } => (Decl::Label { common, name }, SymbolKind::Label, name),
    other => {
      // Locally-declared types/functions inside a generic body are rare and
      // carry no generic parameters of their own in this frontend's AST
      // shape; pass them through unchanged.
      let n = other.name().unwrap_or(Symbol::UNDER);
      (other, SymbolKind::Variable, n)
    }
  };
  let new_id = file.push_decl(new_decl);
  let mut discard = DiagnosticSink::new();
  let loc = synthetic_location(file);
  let _ = file.scope_mut(scope).insert(kind, name, new_id, loc, &mut discard);
  new_id
}

fn substitute_stmt(file: &mut ResultFile, id: StmtId, bindings: &[(Symbol, DataType)], scope: ScopeId) -> StmtId {
  let stmt = file.arenas.stmts[id].clone();
  let new_stmt = match stmt {
    Stmt::Block { items, .. } => {
      let child = file.new_scope(scope);
      Stmt::Block { scope: child, items: substitute_items(file, &items, bindings, child) }
    }
    Stmt::Break => Stmt::Break,
    Stmt::Case(e) => Stmt::Case(substitute_expr(file, e, bindings)),
    Stmt::Continue => Stmt::Continue,
    Stmt::Default => Stmt::Default,
    Stmt::DoWhile { body, cond } =>
      Stmt::DoWhile { body: substitute_stmt(file, body, bindings, scope), cond: substitute_expr(file, cond, bindings) },
    Stmt::For { init, cond, step, body, .. } => {
      let child = file.new_scope(scope);
      let new_init = substitute_items(file, &init, bindings, child);
      let new_cond = cond.map(|c| substitute_expr(file, c, bindings));
      let new_step = step.iter().map(|s| substitute_expr(file, *s, bindings)).collect();
      let new_body = substitute_stmt(file, body, bindings, child);
      Stmt::For { init: new_init, cond: new_cond, step: new_step, body: new_body, scope: child }
    }
    Stmt::Goto(name) => Stmt::Goto(name),
    Stmt::If { branches, else_body } => Stmt::If {
      branches: branches.into_iter()
        .map(|b| IfBranch { cond: substitute_expr(file, b.cond, bindings), body: substitute_stmt(file, b.body, bindings, scope) })
        .collect(),
      else_body: else_body.map(|e| substitute_stmt(file, e, bindings, scope)),
    },
    Stmt::Return(v) => Stmt::Return(v.map(|e| substitute_expr(file, e, bindings))),
    Stmt::Switch { scrutinee, body } =>
      Stmt::Switch { scrutinee: substitute_expr(file, scrutinee, bindings), body: substitute_stmt(file, body, bindings, scope) },
    Stmt::While { cond, body } =>
      Stmt::While { cond: substitute_expr(file, cond, bindings), body: substitute_stmt(file, body, bindings, scope) },
  };
  file.arenas.push_stmt(new_stmt)
}

fn substitute_expr(file: &mut ResultFile, id: ExprId, bindings: &[(Symbol, DataType)]) -> ExprId {
  let expr = file.arenas.exprs[id].clone();
  let new_expr = match expr {
    Expr::Alignof(ty) => Expr::Alignof(substitute_type(&ty, bindings)),
    Expr::ArrayAccess { array, index } =>
      Expr::ArrayAccess { array: substitute_expr(file, array, bindings), index: substitute_expr(file, index, bindings) },
    Expr::Binary { op, left, right } =>
      Expr::Binary { op, left: substitute_expr(file, left, bindings), right: substitute_expr(file, right, bindings) },
    Expr::Cast { target, inner } => Expr::Cast { target: substitute_type(&target, bindings), inner: substitute_expr(file, inner, bindings) },
    Expr::DataTypeAsValue(ty) => Expr::DataTypeAsValue(substitute_type(&ty, bindings)),
    Expr::FunctionCall { callee, called_generics, args } => Expr::FunctionCall {
      callee,
      called_generics: called_generics.map(|gs| gs.iter().map(|g| substitute_type(g, bindings)).collect()),
      args: args.into_iter().map(|a| substitute_expr(file, a, bindings)).collect(),
    },
    Expr::FunctionCallBuiltin { builtin, args } =>
      Expr::FunctionCallBuiltin { builtin, args: args.into_iter().map(|a| substitute_expr(file, a, bindings)).collect() },
    Expr::Generic { scrutinee, arms } => Expr::Generic {
      scrutinee: substitute_expr(file, scrutinee, bindings),
      arms: arms.into_iter()
        .map(|(ty, e)| (ty.map(|t| substitute_type(&t, bindings)), substitute_expr(file, e, bindings)))
        .collect(),
    },
    Expr::Grouping(inner) => Expr::Grouping(substitute_expr(file, inner, bindings)),
    Expr::Identifier(name) => Expr::Identifier(name),
    Expr::Initializer { items } => Expr::Initializer {
      items: items.into_iter()
        .map(|it| InitializerItem { designator: it.designator, value: substitute_expr(file, it.value, bindings) })
        .collect(),
    },
    Expr::Literal(v) => Expr::Literal(v),
    Expr::StringLiteral(s) => Expr::StringLiteral(s),
    Expr::Nullptr => Expr::Nullptr,
    Expr::Sizeof(inner) => Expr::Sizeof(substitute_expr(file, inner, bindings)),
    Expr::Ternary { cond, if_true, if_false } => Expr::Ternary {
      cond: substitute_expr(file, cond, bindings),
      if_true: substitute_expr(file, if_true, bindings),
      if_false: substitute_expr(file, if_false, bindings),
    },
    Expr::Unary { op, inner } => Expr::Unary { op, inner: substitute_expr(file, inner, bindings) },
  };
  file.arenas.push_expr(new_expr)
}

fn synthetic_location(file: &ResultFile) -> Location {
  Location::point(file.filename, crate::source::LineCol { line: 0, column: 0, position: 0 })
}

/// Drives on-demand instantiation (§4.8) and the cycle detector guarding
/// recursive instantiation (§4.8 invariant). One instance is shared across
/// a whole emission session so that `instantiations` reuse (§8
/// "Monomorphization idempotence") is visible across every reference.
#[derive(Default)]
pub struct Monomorphizer {
  in_progress: HashSet<Symbol>,
}

impl Monomorphizer {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Resolve a reference to `template` called with `args`, reusing a prior
  /// instantiation if one already exists in `file.instantiations` (§4.8
  /// step 2), otherwise synthesizing and registering a new `*-gen`
  /// declaration (§4.8 step 3). Returns `None` (after pushing a diagnostic)
  /// on arity mismatch or a detected substitution cycle.
  pub fn instantiate(
    &mut self,
    file: &mut ResultFile,
    template: DeclId,
    args: &[DataType],
    scope: ScopeId,
    loc: Location,
    sink: &mut DiagnosticSink,
  ) -> Option<DeclId> {
    let (base_name, generic_params) = match file.decl(template) {
      Decl::Struct(r) | Decl::Union(r) => (r.name?, r.generic_params.clone()?),
      Decl::Typedef(t) => (t.name, t.generic_params.clone()?),
      Decl::Function(f) => (f.name, f.generic_params.clone()?),
      _ => return None,
    };
    if generic_params.len() != args.len() {
      sink.push(Diagnostic::error(
        DiagKind::GenericArityMismatch { expected: generic_params.len(), given: args.len() },
        loc,
      ));
      return None;
    }

    let mangled = mangle(file, base_name, args);
    if let Some(&existing) = file.instantiations.get(&mangled) {
      log::debug!("monomorphizer: reusing instantiation {mangled}");
      return Some(existing);
    }
    if !self.in_progress.insert(mangled) {
      sink.push(Diagnostic::error(DiagKind::SubstitutionCycle(base_name.to_string()), loc));
      return None;
    }
    log::debug!("monomorphizer: instantiating {mangled}");

    let bindings: Vec<(Symbol, DataType)> = generic_params.iter().copied().zip(args.iter().cloned()).collect();
    let sym_kind;
    let decl_variant = match file.decl(template).clone() {
      Decl::Struct(r) => {
        sym_kind = SymbolKind::Record;
        Decl::StructGen(GenDecl {
          mangled_name: mangled,
          instance: GenericInstance { template, args: args.to_vec() },
          kind: GenDeclKind::Struct(RecordDecl {
            fields: r.fields.as_deref().map(|f| substitute_fields(f, &bindings)),
            generic_params: None,
            ..r
          }),
        })
      }
      Decl::Union(r) => {
        sym_kind = SymbolKind::Union;
        Decl::UnionGen(GenDecl {
          mangled_name: mangled,
          instance: GenericInstance { template, args: args.to_vec() },
          kind: GenDeclKind::Union(RecordDecl {
            fields: r.fields.as_deref().map(|f| substitute_fields(f, &bindings)),
            generic_params: None,
            ..r
          }),
        })
      }
      Decl::Typedef(t) => {
        sym_kind = SymbolKind::Alias;
        Decl::TypedefGen(GenDecl {
          mangled_name: mangled,
          instance: GenericInstance { template, args: args.to_vec() },
          kind: GenDeclKind::Typedef(substitute_type(&t.aliased, &bindings)),
        })
      }
      Decl::Function(f) => {
        sym_kind = SymbolKind::Function;
        let body = f.body.as_ref().map(|(_, items)| {
          let new_scope = file.new_scope(scope);
          (new_scope, substitute_items(file, items, &bindings, new_scope))
        });
        Decl::FunctionGen(GenDecl {
          mangled_name: mangled,
          instance: GenericInstance { template, args: args.to_vec() },
          kind: GenDeclKind::Function(Box::new(FunctionDecl {
            return_type: substitute_type(&f.return_type, &bindings),
            params: f.params.iter().map(|p| substitute_param(p, &bindings)).collect(),
            body,
            generic_params: None,
            ..f
          })),
        })
      }
      _ => unreachable!("checked above"),
    };

    let decl_id = file.push_decl(decl_variant);
    file.instantiations.insert(mangled, decl_id);
    let mut discard = DiagnosticSink::new();
    let _ = file.scope_mut(scope).insert(sym_kind, mangled, decl_id, loc, &mut discard);
    self.in_progress.remove(&mangled);
    Some(decl_id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{IntKind, RecordDecl};

  fn sample_file_with_generic_box() -> (ResultFile, DeclId) {
    let mut rf = ResultFile::new(ci_util::intern("t.c"));
    let name = ci_util::intern("Box");
    let t = ci_util::intern("T");
    let value = ci_util::intern("value");
    let decl = Decl::Struct(RecordDecl {
      common: Default::default(),
      name: Some(name),
      generic_params: Some(vec![t]),
      fields: Some(vec![Field::Named { name: value, ty: DataType::GenericVar(t), bit_width: None }]),
    });
    let id = rf.push_decl(decl);
    let loc = synthetic_location(&rf);
    let root = rf.root_scope;
    let mut sink = DiagnosticSink::new();
    rf.scope_mut(root).insert(SymbolKind::Record, name, id, loc, &mut sink).unwrap();
    (rf, id)
  }

  #[test]
  fn instantiating_a_generic_struct_substitutes_its_field_type() {
    let (mut rf, template) = sample_file_with_generic_box();
    let mut mono = Monomorphizer::new();
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    let loc = synthetic_location(&rf);
    let id = mono.instantiate(&mut rf, template, &[DataType::int()], root, loc, &mut sink).unwrap();
    assert!(sink.is_empty(), "{sink:?}");
    match rf.decl(id) {
      Decl::StructGen(g) => {
        assert_eq!(g.mangled_name.to_string(), "Box__int");
        let GenDeclKind::Struct(r) = &g.kind else { panic!() };
        assert_eq!(r.fields.as_ref().unwrap()[0], Field::Named {
          name: ci_util::intern("value"), ty: DataType::int(), bit_width: None,
        });
      }
      other => panic!("expected StructGen, got {other:?}"),
    }
  }

  #[test]
  fn instantiating_twice_with_the_same_args_reuses_the_declaration() {
    let (mut rf, template) = sample_file_with_generic_box();
    let mut mono = Monomorphizer::new();
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    let loc = synthetic_location(&rf);
    let decls_before = rf.decls.len();
    let a = mono.instantiate(&mut rf, template, &[DataType::int()], root, loc, &mut sink).unwrap();
    let b = mono.instantiate(&mut rf, template, &[DataType::int()], root, loc, &mut sink).unwrap();
    assert_eq!(a, b);
    assert_eq!(rf.decls.len(), decls_before + 1, "exactly one new declaration (§8 idempotence)");
    let _ = IntKind::Int;
  }

  #[test]
  fn mismatched_arity_is_rejected() {
    let (mut rf, template) = sample_file_with_generic_box();
    let mut mono = Monomorphizer::new();
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    let loc = synthetic_location(&rf);
    let result = mono.instantiate(&mut rf, template, &[DataType::int(), DataType::int()], root, loc, &mut sink);
    assert!(result.is_none());
    assert!(!sink.is_empty());
  }
}
