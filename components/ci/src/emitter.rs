//! The monomorphizing C emitter (§4.9): walks a resolved, typechecked
//! [`ResultFile`] and serializes it back to portable ISO-C, materializing
//! generic instantiations on demand through the [`Monomorphizer`].
//!
//! Emission runs in two passes over the top-level declaration list —
//! prototypes, then definitions — so that C's declaration-before-use rule is
//! satisfied without a topological sort of mutually-recursive types (§4.9
//! items 1-2). A small stack of string buffers ("sessions", per the spec's
//! own name for the mechanism) lets a declaration that is reached mid-emission
//! — typically a generic instantiation discovered while reconstructing
//! another declaration's type — have its own prototype and definition spliced
//! in ahead of whatever is currently being written (§4.9 item 4).

use bit_set::BitSet;
use if_chain::if_chain;
use itertools::Itertools;
use smallvec::SmallVec;

use ci_util::{Idx, Symbol};

use crate::ast::*;
use crate::config::{CompilerKind, Config};
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::monomorphizer::Monomorphizer;
use crate::scope::{ResultFile, ScopeId, SymbolKind};
use crate::source::{LineCol, Location};
use crate::token::{escape_char, escape_str};

/// Frontend builtins materialized by index (§3 "Builtin type index"); the
/// process-wide builtin table itself lives outside this crate's boundary
/// (§9 "Global mutable state"), so this is just enough of a local view to
/// emit the handful of builtins the frontend actually threads through.
const BUILTIN_TYPE_NAMES: &[&str] = &["__builtin_va_list", "size_t", "ptrdiff_t", "max_align_t"];

fn combine(base: String, declarator: String) -> String {
  if declarator.is_empty() { base } else { format!("{base} {declarator}") }
}

fn peel_to_structural(ty: &DataType) -> &DataType {
  match ty {
    DataType::Atomic(inner)
    | DataType::PreConst(inner)
    | DataType::PostConst(inner)
    | DataType::Qualified { inner, .. } => peel_to_structural(inner),
    other => other,
  }
}

fn needs_parens_for_ptr(inner: &DataType) -> bool {
  matches!(peel_to_structural(inner), DataType::Array { .. } | DataType::Function(_))
}

fn format_float(v: f64) -> String {
  if v.is_finite() && v.fract() == 0.0 { format!("{v:.1}") } else { format!("{v}") }
}

fn attribute_text(a: &Attribute) -> String {
  match a {
    Attribute::Deprecated(None) => "[[deprecated]]".to_owned(),
    Attribute::Deprecated(Some(msg)) => format!("[[deprecated(\"{msg}\")]]"),
    Attribute::Fallthrough => "[[fallthrough]]".to_owned(),
    Attribute::MaybeUnused => "[[maybe_unused]]".to_owned(),
    Attribute::Nodiscard(None) => "[[nodiscard]]".to_owned(),
    Attribute::Nodiscard(Some(msg)) => format!("[[nodiscard(\"{msg}\")]]"),
    Attribute::Noreturn => "[[noreturn]]".to_owned(),
    Attribute::Unsequenced => "[[unsequenced]]".to_owned(),
    Attribute::Reproducible => "[[reproducible]]".to_owned(),
    Attribute::Gnu(raw) => format!("__attribute__(({raw}))"),
  }
}

fn tag_name(r: &TagRef) -> String { r.tag.map_or_else(String::new, |t| t.to_string()) }

/// One emission frame's buffer. The spec's per-frame inherited state
/// (`current_scope`/`current_generic_params`/`tab_count`/`write_semicolon`)
/// is threaded explicitly through method parameters instead of living on
/// this struct, since every frame in this emitter corresponds to exactly one
/// declaration's own output rather than a long-lived nested context.
struct Session {
  buf: String,
}

/// Drives §4.9 end to end. Holds the live [`Monomorphizer`] so that
/// `file.instantiations` reuse (§8 "Monomorphization idempotence") is
/// visible across every reference emitted in this session.
pub struct Emitter<'f> {
  file: &'f mut ResultFile,
  config: &'f Config,
  sink: &'f mut DiagnosticSink,
  mono: Monomorphizer,
  emitted_proto: BitSet,
  emitted_def: BitSet,
  sessions: Vec<Session>,
  aborted: bool,
}

impl<'f> Emitter<'f> {
  #[must_use] pub fn new(file: &'f mut ResultFile, config: &'f Config, sink: &'f mut DiagnosticSink) -> Self {
    Self {
      file, config, sink,
      mono: Monomorphizer::new(),
      emitted_proto: BitSet::new(),
      emitted_def: BitSet::new(),
      sessions: vec![Session { buf: String::new() }],
      aborted: false,
    }
  }

  /// Runs the prototype pass then the definition pass and returns the
  /// accumulated buffer (§4.9 items 1-2).
  #[must_use] pub fn emit_translation_unit(mut self) -> String {
    self.run_pass(true);
    if !self.aborted { self.run_pass(false); }
    self.sessions.pop().map(|s| s.buf).unwrap_or_default()
  }

  /// Declarations grow the file's decl list while this loop runs (new
  /// `*-gen` entries appended by on-demand materialization), so re-reading
  /// `self.file.decls.len()` on every iteration picks those up too.
  fn run_pass(&mut self, is_prototype_pass: bool) {
    let mut i = 0;
    while i < self.file.decls.len() {
      if self.aborted { return }
      let id = DeclId::from_usize(i);
      if !self.is_template(id) {
        if is_prototype_pass { self.emit_prototype(id) } else { self.emit_definition(id) }
      }
      i += 1;
    }
  }

  fn is_template(&self, id: DeclId) -> bool {
    match self.file.decl(id) {
      Decl::Struct(r) | Decl::Union(r) => r.generic_params.is_some(),
      Decl::Typedef(t) => t.generic_params.is_some(),
      Decl::Function(f) => f.generic_params.is_some(),
      _ => false,
    }
  }

  fn ice(&mut self, tag: &'static str) {
    let loc = self.synthetic_loc();
    self.sink.push(Diagnostic::error(DiagKind::InternalError(tag), loc));
    self.aborted = true;
  }

  fn synthetic_loc(&self) -> Location {
    Location::point(self.file.filename, LineCol { line: 0, column: 0, position: 0 })
  }

  fn tabs(&self, n: u32) -> String { "  ".repeat(n as usize) }

  fn write(&mut self, s: &str) {
    self.sessions.last_mut().expect("session stack never empty").buf.push_str(s);
  }

  fn open_session(&mut self) { self.sessions.push(Session { buf: String::new() }); }

  fn close_session(&mut self) -> String {
    self.sessions.pop().expect("open_session/close_session are paired").buf
  }

  /// On-demand materialization (§4.9 item 4): emits `id`'s prototype and
  /// definition into a fresh session, then prepends the result into whatever
  /// session is current — either an in-progress declaration's own buffer or,
  /// at the top level, the final output. A dependency reached while emitting
  /// another dependency nests correctly: the inner one prepends into the
  /// outer one's still-open session, which in turn prepends into whatever
  /// was open before it.
  fn require_dependency(&mut self, id: DeclId) {
    if self.emitted_def.contains(id.index()) { return }
    self.open_session();
    self.emit_prototype(id);
    self.emit_definition(id);
    let dep_text = self.close_session();
    let parent = self.sessions.last_mut().expect("session stack never empty");
    parent.buf.insert_str(0, &dep_text);
  }

  // ------------------------------------------------------------------
  // Prototype pass (§4.9 item 1)
  // ------------------------------------------------------------------

  fn emit_prototype(&mut self, id: DeclId) {
    if self.emitted_proto.contains(id.index()) { return }
    self.emitted_proto.insert(id.index());
    let scope = self.file.root_scope;
    match self.file.decl(id).clone() {
      Decl::Function(f) => self.write_function_prototype(&f.common, f.name, &f.return_type, &f.params, scope),
      Decl::Struct(r) => self.write_tag_prototype("struct", r.name),
      Decl::Union(r) => self.write_tag_prototype("union", r.name),
      Decl::Enum(e) => self.write_tag_prototype("enum", e.name),
      Decl::FunctionGen(g) => {
        if let GenDeclKind::Function(f) = &g.kind {
          let f = f.clone();
          self.write_function_prototype(&f.common, g.mangled_name, &f.return_type, &f.params, scope);
        }
      }
      Decl::StructGen(g) => self.write_tag_prototype("struct", Some(g.mangled_name)),
      Decl::UnionGen(g) => self.write_tag_prototype("union", Some(g.mangled_name)),
      // Typedefs and variables never get a prototype (§4.9 item 1).
      Decl::Typedef(_) | Decl::TypedefGen(_) | Decl::Variable(_) | Decl::Label { .. } => {}
    }
  }

  fn write_tag_prototype(&mut self, keyword: &str, name: Option<Symbol>) {
    if let Some(n) = name { self.write(&format!("{keyword} {n};\n")); }
  }

  fn write_function_prototype(&mut self, common: &DeclCommon, name: Symbol, ret: &DataType, params: &[Param], scope: ScopeId) {
    self.write_attributes(common);
    let prefix = self.storage_prefix(common);
    let ret_t = self.materialize(ret, scope);
    let params_text = self.function_params_text(params, scope);
    let core = format!("{name}({params_text})");
    let (base, decl) = self.declarator_parts(&ret_t, core, scope);
    self.write(&prefix);
    self.write(&base);
    self.write(" ");
    self.write(&decl);
    self.write(";\n");
  }

  // ------------------------------------------------------------------
  // Definition pass (§4.9 item 2)
  // ------------------------------------------------------------------

  fn emit_definition(&mut self, id: DeclId) {
    if self.emitted_def.contains(id.index()) { return }
    self.emitted_def.insert(id.index());
    let scope = self.file.root_scope;
    match self.file.decl(id).clone() {
      Decl::Enum(e) => self.write_enum_definition(&e, scope),
      Decl::Struct(r) => self.write_record_definition("struct", r.name.map(|n| n.to_string()), &r.common, r.fields.as_deref(), scope),
      Decl::Union(r) => self.write_record_definition("union", r.name.map(|n| n.to_string()), &r.common, r.fields.as_deref(), scope),
      Decl::StructGen(g) => {
        if let GenDeclKind::Struct(r) = &g.kind {
          let r = r.clone();
          self.write_record_definition("struct", Some(g.mangled_name.to_string()), &r.common, r.fields.as_deref(), scope);
        }
      }
      Decl::UnionGen(g) => {
        if let GenDeclKind::Union(r) = &g.kind {
          let r = r.clone();
          self.write_record_definition("union", Some(g.mangled_name.to_string()), &r.common, r.fields.as_deref(), scope);
        }
      }
      Decl::Typedef(t) => self.write_typedef_definition(t.name, &t.aliased, scope),
      Decl::TypedefGen(g) => {
        if let GenDeclKind::Typedef(ty) = &g.kind {
          let ty = ty.clone();
          self.write_typedef_definition(g.mangled_name, &ty, scope);
        }
      }
      Decl::Function(f) => self.write_function_definition(&f.common, f.name, &f.return_type, &f.params, f.body.as_ref(), scope),
      Decl::FunctionGen(g) => {
        if let GenDeclKind::Function(f) = &g.kind {
          let f = f.clone();
          self.write_function_definition(&f.common, g.mangled_name, &f.return_type, &f.params, f.body.as_ref(), scope);
        }
      }
      Decl::Variable(v) if !v.is_local => self.write_global_variable(&v, scope),
      Decl::Variable(_) | Decl::Label { .. } => {}
    }
  }

  fn write_doc_comment(&mut self, common: &DeclCommon) {
    let Some(doc) = &common.doc_comment else { return };
    self.write("/**\n");
    for line in doc.lines() {
      self.write(" * ");
      self.write(line);
      self.write("\n");
    }
    self.write(" */\n");
  }

  fn write_attributes(&mut self, common: &DeclCommon) {
    for a in &common.attributes {
      let text = attribute_text(a);
      self.write(&text);
      self.write("\n");
    }
  }

  fn storage_prefix(&self, common: &DeclCommon) -> String {
    let mut s = String::new();
    if common.storage.contains(StorageClass::EXTERN) { s.push_str("extern "); }
    if common.storage.contains(StorageClass::STATIC) { s.push_str("static "); }
    if common.storage.contains(StorageClass::THREAD_LOCAL) { s.push_str("thread_local "); }
    if common.storage.contains(StorageClass::REGISTER) { s.push_str("register "); }
    if common.storage.contains(StorageClass::CONSTEXPR) { s.push_str("constexpr "); }
    if common.storage.contains(StorageClass::INLINE) { s.push_str("inline "); }
    s
  }

  fn write_enum_definition(&mut self, e: &EnumDecl, scope: ScopeId) {
    self.write_doc_comment(&e.common);
    self.write_attributes(&e.common);
    self.write("enum");
    if let Some(n) = e.name { self.write(" "); self.write(&n.to_string()); }
    if let Some(u) = &e.underlying {
      let t = self.materialize(u, scope);
      let text = self.type_only_text(&t, scope);
      self.write(" : ");
      self.write(&text);
    }
    self.write("\n{\n");
    let last = e.variants.len().wrapping_sub(1);
    for (i, v) in e.variants.iter().enumerate() {
      self.write("  ");
      self.write(&v.name.to_string());
      if let Some(d) = v.discriminant {
        let text = self.expr_text(d, scope);
        self.write(" = ");
        self.write(&text);
      }
      if i != last { self.write(","); }
      self.write("\n");
    }
    self.write("};\n\n");
  }

  fn write_record_definition(&mut self, keyword: &str, name: Option<String>, common: &DeclCommon, fields: Option<&[Field]>, scope: ScopeId) {
    self.write_doc_comment(common);
    self.write_attributes(common);
    self.write(keyword);
    if let Some(n) = &name { self.write(" "); self.write(n); }
    self.write("\n{\n");
    if let Some(fields) = fields {
      for f in fields { self.write_field(f, scope, 1); }
    }
    self.write("};\n\n");
  }

  fn write_field(&mut self, field: &Field, scope: ScopeId, indent: u32) {
    match field {
      Field::Named { name, ty, bit_width } => {
        let t = self.materialize(ty, scope);
        let (base, decl) = self.declarator_parts(&t, name.to_string(), scope);
        let tabs = self.tabs(indent);
        self.write(&tabs);
        self.write(&combine(base, decl));
        if let Some(bw) = bit_width {
          let text = self.expr_text(*bw, scope);
          self.write(" : ");
          self.write(&text);
        }
        self.write(";\n");
      }
      Field::AnonymousRecord { is_union, fields, .. } => {
        let tabs = self.tabs(indent);
        self.write(&tabs);
        self.write(if *is_union { "union" } else { "struct" });
        self.write("\n");
        self.write(&tabs);
        self.write("{\n");
        for inner in fields { self.write_field(inner, scope, indent + 1); }
        self.write(&tabs);
        self.write("};\n");
      }
    }
  }

  fn write_typedef_definition(&mut self, name: Symbol, aliased: &DataType, scope: ScopeId) {
    let ty = self.materialize(aliased, scope);
    let (base, decl) = self.declarator_parts(&ty, name.to_string(), scope);
    self.write("typedef ");
    self.write(&base);
    self.write(" ");
    self.write(&decl);
    self.write(";\n");
  }

  fn write_global_variable(&mut self, v: &VariableDecl, scope: ScopeId) {
    self.write_doc_comment(&v.common);
    self.write_attributes(&v.common);
    let ty = self.materialize(&v.ty, scope);
    let (base, decl) = self.declarator_parts(&ty, v.name.to_string(), scope);
    let prefix = self.storage_prefix(&v.common);
    self.write(&prefix);
    self.write(&combine(base, decl));
    if let Some(init) = v.initializer {
      let text = self.expr_text(init, scope);
      self.write(" = ");
      self.write(&text);
    }
    self.write(";\n");
  }

  fn write_function_definition(
    &mut self, common: &DeclCommon, name: Symbol, ret: &DataType, params: &[Param],
    body: Option<&(ScopeId, Vec<FunctionItem>)>, scope: ScopeId,
  ) {
    let Some((body_scope, items)) = body else { return };
    self.write_doc_comment(common);
    self.write_attributes(common);
    let prefix = self.storage_prefix(common);
    let ret_t = self.materialize(ret, scope);
    let params_text = self.function_params_text(params, scope);
    let core = format!("{name}({params_text})");
    let (base, decl) = self.declarator_parts(&ret_t, core, scope);
    self.write(&prefix);
    self.write(&base);
    self.write(" ");
    self.write(&decl);
    self.write("\n{\n");
    self.write_block_items(items, *body_scope, 1);
    self.write("}\n\n");
  }

  // ------------------------------------------------------------------
  // Declarator reconstruction (§4.9 item 3)
  // ------------------------------------------------------------------

  /// Returns `(base_type_text, declarator_text)`, recursing innermost-pointee
  /// first so pointer/array/function wrapping comes out in source order
  /// around `core` (the identifier, or an empty string for an abstract
  /// declarator). `ty` must already have been passed through [`Self::materialize`].
  fn declarator_parts(&mut self, ty: &DataType, core: String, scope: ScopeId) -> (String, String) {
    match ty {
      DataType::Atomic(inner) => {
        let (base, decl) = self.declarator_parts(inner, core, scope);
        (format!("_Atomic({base})"), decl)
      }
      DataType::PreConst(inner) => {
        let (base, decl) = self.declarator_parts(inner, core, scope);
        (format!("const {base}"), decl)
      }
      DataType::PostConst(inner) => {
        let (base, decl) = self.declarator_parts(inner, core, scope);
        (format!("{base} const"), decl)
      }
      DataType::Qualified { inner, quals } => {
        let (base, decl) = self.declarator_parts(inner, core, scope);
        let mut prefix = String::new();
        if quals.contains(Qualifiers::RESTRICT) { prefix.push_str("restrict "); }
        if quals.contains(Qualifiers::VOLATILE) { prefix.push_str("volatile "); }
        (format!("{prefix}{base}"), decl)
      }
      DataType::Ptr { inner, quals, .. } => {
        let mut suffix = String::new();
        if quals.contains(Qualifiers::RESTRICT) { suffix.push_str(" restrict"); }
        if quals.contains(Qualifiers::VOLATILE) { suffix.push_str(" volatile"); }
        let mut decl = format!("*{suffix}");
        if !core.is_empty() {
          if !suffix.is_empty() { decl.push(' '); }
          decl.push_str(&core);
        }
        if needs_parens_for_ptr(inner) { decl = format!("({decl})"); }
        self.declarator_parts(inner, decl, scope)
      }
      DataType::Array { element, size, is_static, quals, .. } => {
        let size_text = self.array_size_text(size, scope);
        let mut decl = core;
        decl.push('[');
        if *is_static { decl.push_str("static "); }
        if quals.contains(Qualifiers::RESTRICT) { decl.push_str("restrict "); }
        if quals.contains(Qualifiers::VOLATILE) { decl.push_str("volatile "); }
        decl.push_str(&size_text);
        decl.push(']');
        self.declarator_parts(element, decl, scope)
      }
      DataType::Function(f) => {
        let params_text = self.function_params_text(&f.params, scope);
        let mut decl = core;
        decl.push('(');
        decl.push_str(&params_text);
        decl.push(')');
        self.declarator_parts(&f.return_type, decl, scope)
      }
      other => (self.base_type_text(other, scope), core),
    }
  }

  fn array_size_text(&mut self, size: &ArraySize, scope: ScopeId) -> String {
    match size {
      ArraySize::Unsized | ArraySize::Sized(None) => String::new(),
      ArraySize::Sized(Some(e)) => self.expr_text(*e, scope),
    }
  }

  fn function_params_text(&mut self, params: &[Param], scope: ScopeId) -> String {
    if params.is_empty() { return "void".to_owned() }
    let parts: SmallVec<[String; 4]> = params.iter().map(|p| match p {
      Param::Normal { name, ty } => {
        let t = self.materialize(ty, scope);
        let core = name.map(|n| n.to_string()).unwrap_or_default();
        let (base, decl) = self.declarator_parts(&t, core, scope);
        combine(base, decl)
      }
      Param::Variadic => "...".to_owned(),
    }).collect();
    parts.iter().join(", ")
  }

  /// A type with no bound identifier, for `sizeof`/cast targets/`_Generic`
  /// arms: `ty` must already have been [`Self::materialize`]d.
  fn type_only_text(&mut self, ty: &DataType, scope: ScopeId) -> String {
    let (base, decl) = self.declarator_parts(ty, String::new(), scope);
    combine(base, decl)
  }

  fn base_type_text(&mut self, ty: &DataType, _scope: ScopeId) -> String {
    match ty {
      DataType::Primitive(p) => self.primitive_text(p),
      DataType::Builtin(i) => BUILTIN_TYPE_NAMES.get(*i as usize).map(|s| (*s).to_owned()).unwrap_or_else(|| {
        self.ice("builtin type index out of range");
        "void".to_owned()
      }),
      DataType::Struct(r) => format!("struct {}", tag_name(r)),
      DataType::Union(r) => format!("union {}", tag_name(r)),
      DataType::Enum(r) => format!("enum {}", tag_name(r)),
      DataType::Typedef { name, .. } => name.to_string(),
      DataType::GenericVar(name) => {
        self.ice("unresolved generic parameter reached the emitter");
        name.to_string()
      }
      DataType::Any => {
        self.ice("`any` sentinel reached the emitter");
        "void".to_owned()
      }
      DataType::Atomic(_) | DataType::PreConst(_) | DataType::PostConst(_) | DataType::Qualified { .. }
      | DataType::Ptr { .. } | DataType::Array { .. } | DataType::Function(_) => {
        self.ice("unreachable data-type variant in base position");
        "void".to_owned()
      }
    }
  }

  fn primitive_text(&mut self, p: &Primitive) -> String {
    match p {
      Primitive::Bool => if self.config.standard.has_keyword("bool") { "bool".to_owned() } else { "_Bool".to_owned() },
      Primitive::Int(k) => int_kind_text(*k).to_owned(),
      Primitive::Float { kind, complex, imaginary } => {
        let base = float_kind_text(*kind);
        let suffix = if *complex { " _Complex" } else if *imaginary { " _Imaginary" } else { "" };
        format!("{base}{suffix}")
      }
      Primitive::Decimal(k) => decimal_kind_text(*k).to_owned(),
      Primitive::Void => "void".to_owned(),
      Primitive::NullptrT => {
        if self.config.compiler == CompilerKind::Clang { "typeof(nullptr)".to_owned() } else { "nullptr_t".to_owned() }
      }
    }
  }

  // ------------------------------------------------------------------
  // On-demand type materialization (§4.9 item 4)
  // ------------------------------------------------------------------

  fn materialize(&mut self, ty: &DataType, scope: ScopeId) -> DataType {
    match ty {
      DataType::Struct(r) => self.materialize_tag(r, scope, SymbolKind::Record, |r| DataType::Struct(r)),
      DataType::Union(r) => self.materialize_tag(r, scope, SymbolKind::Union, |r| DataType::Union(r)),
      DataType::Typedef { name, called_generics: Some(args) } => self.materialize_typedef(*name, args, scope),
      DataType::Atomic(inner) => DataType::Atomic(Box::new(self.materialize(inner, scope))),
      DataType::PreConst(inner) => DataType::PreConst(Box::new(self.materialize(inner, scope))),
      DataType::PostConst(inner) => DataType::PostConst(Box::new(self.materialize(inner, scope))),
      DataType::Qualified { inner, quals } =>
        DataType::Qualified { inner: Box::new(self.materialize(inner, scope)), quals: *quals },
      DataType::Ptr { inner, name, quals } =>
        DataType::Ptr { inner: Box::new(self.materialize(inner, scope)), name: *name, quals: *quals },
      DataType::Array { element, size, name, is_static, quals } => DataType::Array {
        element: Box::new(self.materialize(element, scope)),
        size: size.clone(), name: *name, is_static: *is_static, quals: *quals,
      },
      DataType::Function(f) => DataType::Function(Box::new(FunctionType {
        name: f.name,
        params: f.params.iter().map(|p| match p {
          Param::Normal { name, ty } => Param::Normal { name: *name, ty: self.materialize(ty, scope) },
          Param::Variadic => Param::Variadic,
        }).collect(),
        return_type: Box::new(self.materialize(&f.return_type, scope)),
        generic_params: f.generic_params.clone(),
      })),
      other => other.clone(),
    }
  }

  fn materialize_tag(&mut self, r: &TagRef, scope: ScopeId, kind: SymbolKind, rebuild: impl Fn(TagRef) -> DataType) -> DataType {
    if_chain! {
      if let Some(args) = &r.called_generics;
      if let Some(tag) = r.tag;
      then {
        let materialized_args: Vec<DataType> = args.iter().map(|a| self.materialize(a, scope)).collect();
        let Some(entry) = self.file.lookup(scope, kind, tag) else {
          let loc = self.synthetic_loc();
          self.sink.push(Diagnostic::error(DiagKind::UnresolvedGeneric(tag.to_string()), loc));
          return rebuild(TagRef { tag: Some(tag), called_generics: None });
        };
        let loc = self.synthetic_loc();
        let Some(decl_id) = self.mono.instantiate(self.file, entry.decl, &materialized_args, scope, loc, self.sink) else {
          return rebuild(TagRef { tag: Some(tag), called_generics: None });
        };
        self.require_dependency(decl_id);
        let mangled = self.file.decl(decl_id).name().unwrap_or(tag);
        rebuild(TagRef { tag: Some(mangled), called_generics: None })
      } else {
        rebuild(r.clone())
      }
    }
  }

  fn materialize_typedef(&mut self, name: Symbol, args: &[DataType], scope: ScopeId) -> DataType {
    let materialized_args: Vec<DataType> = args.iter().map(|a| self.materialize(a, scope)).collect();
    let Some(entry) = self.file.lookup(scope, SymbolKind::Alias, name) else {
      let loc = self.synthetic_loc();
      self.sink.push(Diagnostic::error(DiagKind::UnresolvedGeneric(name.to_string()), loc));
      return DataType::Typedef { name, called_generics: None };
    };
    let loc = self.synthetic_loc();
    let Some(decl_id) = self.mono.instantiate(self.file, entry.decl, &materialized_args, scope, loc, self.sink) else {
      return DataType::Typedef { name, called_generics: None };
    };
    self.require_dependency(decl_id);
    let mangled = self.file.decl(decl_id).name().unwrap_or(name);
    DataType::Typedef { name: mangled, called_generics: None }
  }

  fn resolve_call_name(&mut self, callee: Symbol, called_generics: Option<&[DataType]>, scope: ScopeId) -> String {
    let Some(args) = called_generics else { return callee.to_string() };
    let materialized_args: Vec<DataType> = args.iter().map(|a| self.materialize(a, scope)).collect();
    let Some(entry) = self.file.lookup(scope, SymbolKind::Function, callee) else {
      let loc = self.synthetic_loc();
      self.sink.push(Diagnostic::error(DiagKind::UnresolvedGeneric(callee.to_string()), loc));
      return callee.to_string();
    };
    let loc = self.synthetic_loc();
    let Some(decl_id) = self.mono.instantiate(self.file, entry.decl, &materialized_args, scope, loc, self.sink) else {
      return callee.to_string();
    };
    self.require_dependency(decl_id);
    self.file.decl(decl_id).name().map_or_else(|| callee.to_string(), |n| n.to_string())
  }

  // ------------------------------------------------------------------
  // Expressions (§4.9 items 5-6)
  // ------------------------------------------------------------------

  fn expr_text(&mut self, id: ExprId, scope: ScopeId) -> String {
    let expr = self.file.arenas.exprs[id].clone();
    match expr {
      Expr::Alignof(ty) => {
        let t = self.materialize(&ty, scope);
        let text = self.type_only_text(&t, scope);
        format!("_Alignof({text})")
      }
      Expr::ArrayAccess { array, index } => {
        let a = self.expr_text(array, scope);
        let i = self.expr_text(index, scope);
        format!("{a}[{i}]")
      }
      Expr::Binary { op, left, right } => {
        let l = self.expr_text(left, scope);
        let r = self.expr_text(right, scope);
        if op.is_member_access() { format!("{l}{}{r}", op.as_str()) } else { format!("{l} {} {r}", op.as_str()) }
      }
      Expr::Cast { target, inner } => {
        let t = self.materialize(&target, scope);
        let ts = self.type_only_text(&t, scope);
        let i = self.expr_text(inner, scope);
        format!("({ts}){i}")
      }
      Expr::DataTypeAsValue(ty) => {
        let t = self.materialize(&ty, scope);
        self.type_only_text(&t, scope)
      }
      Expr::FunctionCall { callee, called_generics, args } => {
        let name = self.resolve_call_name(callee, called_generics.as_deref(), scope);
        let args_text = args.iter().map(|a| self.expr_text(*a, scope)).join(", ");
        format!("{name}({args_text})")
      }
      Expr::FunctionCallBuiltin { builtin, args } => {
        let args_text = args.iter().map(|a| self.expr_text(*a, scope)).join(", ");
        format!("{builtin}({args_text})")
      }
      Expr::Generic { scrutinee, arms } => {
        let s = self.expr_text(scrutinee, scope);
        let arms_text = arms.iter().map(|(ty, e)| {
          let value = self.expr_text(*e, scope);
          match ty {
            Some(t) => {
              let mt = self.materialize(t, scope);
              let tt = self.type_only_text(&mt, scope);
              format!("{tt}: {value}")
            }
            None => format!("default: {value}"),
          }
        }).join(", ");
        format!("_Generic({s}, {arms_text})")
      }
      Expr::Grouping(inner) => format!("({})", self.expr_text(inner, scope)),
      Expr::Identifier(name) => name.to_string(),
      Expr::Initializer { items } => {
        let items_text = items.iter().map(|it| {
          let value = self.expr_text(it.value, scope);
          match &it.designator {
            Some(path) => {
              let prefix: String = path.iter().map(|d| format!(".{}", d.field)).collect();
              format!("{prefix} = {value}")
            }
            None => value,
          }
        }).join(", ");
        format!("{{ {items_text} }}")
      }
      Expr::Literal(v) => self.literal_text(v),
      Expr::StringLiteral(s) => format!("\"{}\"", escape_str(&s)),
      Expr::Nullptr => if self.config.standard.has_keyword("nullptr") { "nullptr".to_owned() } else { "((void*)0)".to_owned() },
      Expr::Sizeof(inner) => format!("sizeof({})", self.expr_text(inner, scope)),
      Expr::Ternary { cond, if_true, if_false } => {
        let c = self.expr_text(cond, scope);
        let t = self.expr_text(if_true, scope);
        let f = self.expr_text(if_false, scope);
        format!("{c} ? {t} : {f}")
      }
      Expr::Unary { op, inner } => {
        let inner_text = self.expr_text(inner, scope);
        if op.is_postfix() { format!("{inner_text}{}", op.as_str()) } else { format!("{}{inner_text}", op.as_str()) }
      }
    }
  }

  fn literal_text(&self, v: LiteralValue) -> String {
    match v {
      LiteralValue::Bool(b) => b.to_string(),
      LiteralValue::Char(c) => format!("'{}'", escape_char(c)),
      LiteralValue::Float(f) => format_float(f),
      LiteralValue::SignedInt(n) => n.to_string(),
      LiteralValue::UnsignedInt(n) => format!("{n}u"),
    }
  }

  // ------------------------------------------------------------------
  // Statements (§4.9 item 7)
  // ------------------------------------------------------------------

  fn write_block_items(&mut self, items: &[FunctionItem], scope: ScopeId, indent: u32) {
    for item in items { self.write_block_item(item, indent) }
    let _ = scope;
  }

  fn write_block_item(&mut self, item: &FunctionItem, indent: u32) {
    match &item.kind {
      FunctionItemKind::Decl(id) => self.write_local_decl(*id, item.scope, indent),
      FunctionItemKind::Expr(id) => {
        let tabs = self.tabs(indent);
        let text = self.expr_text(*id, item.scope);
        self.write(&tabs);
        self.write(&text);
        self.write(";\n");
      }
      FunctionItemKind::Stmt(id) => self.write_stmt(*id, item.scope, indent),
    }
  }

  fn local_decl_text(&mut self, id: DeclId, scope: ScopeId) -> String {
    match self.file.decl(id).clone() {
      Decl::Variable(v) => {
        let ty = self.materialize(&v.ty, scope);
        let (base, decl) = self.declarator_parts(&ty, v.name.to_string(), scope);
        let mut s = combine(base, decl);
        if let Some(init) = v.initializer {
          let text = self.expr_text(init, scope);
          s.push_str(&format!(" = {text}"));
        }
        s
      }
      Decl::Label { name, .. } => format!("{name}:"),
      _ => String::new(),
    }
  }

  fn write_local_decl(&mut self, id: DeclId, scope: ScopeId, indent: u32) {
    let tabs = self.tabs(indent);
    let text = self.local_decl_text(id, scope);
    self.write(&tabs);
    self.write(&text);
    match self.file.decl(id) {
      Decl::Label { .. } => self.write("\n"),
      _ => self.write(";\n"),
    }
  }

  fn for_init_text(&mut self, init: &[FunctionItem], scope: ScopeId) -> String {
    let _ = scope;
    init.iter().map(|item| match &item.kind {
      FunctionItemKind::Decl(id) => self.local_decl_text(*id, item.scope),
      FunctionItemKind::Expr(id) => self.expr_text(*id, item.scope),
      FunctionItemKind::Stmt(_) => String::new(),
    }).join(", ")
  }

  fn write_stmt(&mut self, id: StmtId, scope: ScopeId, indent: u32) {
    let stmt = self.file.arenas.stmts[id].clone();
    let tabs = self.tabs(indent);
    match stmt {
      Stmt::Block { scope: inner, items } => {
        self.write(&tabs);
        self.write("{\n");
        self.write_block_items(&items, inner, indent + 1);
        self.write(&tabs);
        self.write("}\n");
      }
      Stmt::Break => { self.write(&tabs); self.write("break;\n"); }
      Stmt::Case(e) => {
        let text = self.expr_text(e, scope);
        self.write(&tabs);
        self.write(&format!("case {text}:\n"));
      }
      Stmt::Continue => { self.write(&tabs); self.write("continue;\n"); }
      Stmt::Default => { self.write(&tabs); self.write("default:\n"); }
      Stmt::DoWhile { body, cond } => {
        self.write(&tabs);
        self.write("do\n");
        self.write_stmt(body, scope, indent);
        let text = self.expr_text(cond, scope);
        self.write(&tabs);
        self.write(&format!("while ({text});\n"));
      }
      Stmt::For { init, cond, step, body, scope: for_scope } => {
        self.write(&tabs);
        self.write("for (");
        let init_text = self.for_init_text(&init, for_scope);
        self.write(&init_text);
        self.write("; ");
        if let Some(c) = cond {
          let text = self.expr_text(c, for_scope);
          self.write(&text);
        }
        self.write("; ");
        let steps_text = step.iter().map(|s| self.expr_text(*s, for_scope)).join(", ");
        self.write(&steps_text);
        self.write(")\n");
        self.write_stmt(body, for_scope, indent);
      }
      Stmt::Goto(name) => { self.write(&tabs); self.write(&format!("goto {name};\n")); }
      Stmt::If { branches, else_body } => {
        for (i, b) in branches.iter().enumerate() {
          let text = self.expr_text(b.cond, scope);
          self.write(&tabs);
          self.write(if i == 0 { "if (" } else { "else if (" });
          self.write(&text);
          self.write(")\n");
          self.write_stmt(b.body, scope, indent);
        }
        if let Some(e) = else_body {
          self.write(&tabs);
          self.write("else\n");
          self.write_stmt(e, scope, indent);
        }
      }
      Stmt::Return(v) => {
        self.write(&tabs);
        self.write("return");
        if let Some(e) = v {
          let text = self.expr_text(e, scope);
          self.write(" ");
          self.write(&text);
        }
        self.write(";\n");
      }
      Stmt::Switch { scrutinee, body } => {
        let text = self.expr_text(scrutinee, scope);
        self.write(&tabs);
        self.write(&format!("switch ({text})\n"));
        self.write(&tabs);
        self.write("{\n");
        if let Stmt::Block { scope: inner, items } = self.file.arenas.stmts[body].clone() {
          self.write_switch_body(&items, inner, indent + 1);
        }
        self.write(&tabs);
        self.write("}\n");
      }
      Stmt::While { cond, body } => {
        let text = self.expr_text(cond, scope);
        self.write(&tabs);
        self.write(&format!("while ({text})\n"));
        self.write_stmt(body, scope, indent);
      }
    }
  }

  /// A `switch` body is a flat list of statements with `case`/`default`
  /// labels interleaved (§4.9 item 7): labels print at the block's own
  /// indent, everything else one level further in.
  fn write_switch_body(&mut self, items: &[FunctionItem], scope: ScopeId, block_indent: u32) {
    let _ = scope;
    for item in items {
      match &item.kind {
        FunctionItemKind::Stmt(sid) => {
          let stmt = self.file.arenas.stmts[*sid].clone();
          match stmt {
            Stmt::Case(e) => {
              let text = self.expr_text(e, item.scope);
              let tabs = self.tabs(block_indent);
              self.write(&tabs);
              self.write(&format!("case {text}:\n"));
            }
            Stmt::Default => {
              let tabs = self.tabs(block_indent);
              self.write(&tabs);
              self.write("default:\n");
            }
            _ => self.write_stmt(*sid, item.scope, block_indent + 1),
          }
        }
        FunctionItemKind::Expr(eid) => {
          let tabs = self.tabs(block_indent + 1);
          let text = self.expr_text(*eid, item.scope);
          self.write(&tabs);
          self.write(&text);
          self.write(";\n");
        }
        FunctionItemKind::Decl(did) => self.write_local_decl(*did, item.scope, block_indent + 1),
      }
    }
  }
}

fn int_kind_text(k: IntKind) -> &'static str {
  match k {
    IntKind::Char => "char", IntKind::SChar => "signed char", IntKind::UChar => "unsigned char",
    IntKind::Short => "short", IntKind::UShort => "unsigned short",
    IntKind::Int => "int", IntKind::UInt => "unsigned int",
    IntKind::Long => "long", IntKind::ULong => "unsigned long",
    IntKind::LongLong => "long long", IntKind::ULongLong => "unsigned long long",
  }
}

fn float_kind_text(k: FloatKind) -> &'static str {
  match k { FloatKind::Float => "float", FloatKind::Double => "double", FloatKind::LongDouble => "long double" }
}

fn decimal_kind_text(k: DecimalKind) -> &'static str {
  match k { DecimalKind::D32 => "_Decimal32", DecimalKind::D64 => "_Decimal64", DecimalKind::D128 => "_Decimal128" }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ast::{ArraySize, Field, FunctionType, Param, RecordDecl, TagRef, TypedefDecl, VariableDecl};

  fn new_file() -> ResultFile { ResultFile::new(ci_util::intern("t.c")) }

  #[test]
  fn prototype_pass_skips_typedefs_and_variables() {
    let mut rf = new_file();
    let name = ci_util::intern("Age");
    let decl = rf.push_decl(Decl::Typedef(TypedefDecl {
      common: DeclCommon::default(), name, generic_params: None, aliased: DataType::int(),
    }));
    let loc = Location::point(rf.filename, LineCol { line: 1, column: 1, position: 0 });
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    rf.scope_mut(root).insert(SymbolKind::Alias, name, decl, loc, &mut sink).unwrap();
    let config = Config::default();
    let out = Emitter::new(&mut rf, &config, &mut sink).emit_translation_unit();
    assert!(sink.is_empty(), "{sink:?}");
    assert!(!out.contains(';'), "typedefs get no prototype: {out:?}");
  }

  #[test]
  fn nested_pointer_array_function_declarator_round_trips() {
    // int (*arr[3])(int);
    let mut rf = new_file();
    let arr = ci_util::intern("arr");
    let func = DataType::Function(Box::new(FunctionType {
      name: None,
      params: vec![Param::Normal { name: None, ty: DataType::int() }],
      return_type: Box::new(DataType::int()),
      generic_params: None,
    }));
    let ptr = DataType::Ptr { inner: Box::new(func), name: None, quals: Qualifiers::empty() };
    let ty = DataType::Array {
      element: Box::new(ptr), size: ArraySize::Sized(None), name: None, is_static: false, quals: Qualifiers::empty(),
    };
    let decl = rf.push_decl(Decl::Variable(VariableDecl { common: DeclCommon::default(), name: arr, ty, initializer: None, is_local: false }));
    let loc = Location::point(rf.filename, LineCol { line: 1, column: 1, position: 0 });
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    rf.scope_mut(root).insert(SymbolKind::Variable, arr, decl, loc, &mut sink).unwrap();
    let config = Config::default();
    let out = Emitter::new(&mut rf, &config, &mut sink).emit_translation_unit();
    assert!(sink.is_empty(), "{sink:?}");
    assert!(out.contains("int (*arr[])(int);"), "{out:?}");
  }

  #[test]
  fn generic_struct_instantiation_materializes_with_mangled_name() {
    let mut rf = new_file();
    let box_name = ci_util::intern("Box");
    let t = ci_util::intern("T");
    let value = ci_util::intern("value");
    let template = rf.push_decl(Decl::Struct(RecordDecl {
      common: DeclCommon::default(), name: Some(box_name), generic_params: Some(vec![t]),
      fields: Some(vec![Field::Named { name: value, ty: DataType::GenericVar(t), bit_width: None }]),
    }));
    let loc = Location::point(rf.filename, LineCol { line: 1, column: 1, position: 0 });
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    rf.scope_mut(root).insert(SymbolKind::Record, box_name, template, loc, &mut sink).unwrap();
    let b = ci_util::intern("b");
    let var_ty = DataType::Struct(TagRef { tag: Some(box_name), called_generics: Some(vec![DataType::int()]) });
    let var = rf.push_decl(Decl::Variable(VariableDecl { common: DeclCommon::default(), name: b, ty: var_ty, initializer: None, is_local: false }));
    rf.scope_mut(root).insert(SymbolKind::Variable, b, var, loc, &mut sink).unwrap();
    let config = Config::default();
    let out = Emitter::new(&mut rf, &config, &mut sink).emit_translation_unit();
    assert!(sink.is_empty(), "{sink:?}");
    assert!(out.contains("struct Box__int\n{\n  int value;\n};"), "{out:?}");
    assert!(out.contains("struct Box__int b;"), "{out:?}");
    assert!(!out.contains('T'), "no reference to the generic parameter should remain: {out:?}");
  }

  #[test]
  fn switch_case_labels_indent_one_level_in_from_switch() {
    let mut rf = new_file();
    let one = rf.arenas.push_expr(Expr::Literal(LiteralValue::SignedInt(1)));
    let case_stmt = rf.arenas.push_stmt(Stmt::Case(one));
    let break1 = rf.arenas.push_stmt(Stmt::Break);
    let default_stmt = rf.arenas.push_stmt(Stmt::Default);
    let break2 = rf.arenas.push_stmt(Stmt::Break);
    let body_scope = rf.new_scope(rf.root_scope);
    let items = vec![
      FunctionItem { kind: FunctionItemKind::Stmt(case_stmt), scope: body_scope },
      FunctionItem { kind: FunctionItemKind::Stmt(break1), scope: body_scope },
      FunctionItem { kind: FunctionItemKind::Stmt(default_stmt), scope: body_scope },
      FunctionItem { kind: FunctionItemKind::Stmt(break2), scope: body_scope },
    ];
    let block = rf.arenas.push_stmt(Stmt::Block { scope: body_scope, items });
    let x = ci_util::intern("x");
    let scrutinee = rf.arenas.push_expr(Expr::Identifier(x));
    let switch_stmt = rf.arenas.push_stmt(Stmt::Switch { scrutinee, body: block });
    let fn_scope = rf.new_scope(rf.root_scope);
    let name = ci_util::intern("f");
    let func = Decl::Function(FunctionDecl {
      common: DeclCommon::default(), name, return_type: DataType::void(), params: vec![],
      body: Some((fn_scope, vec![FunctionItem { kind: FunctionItemKind::Stmt(switch_stmt), scope: fn_scope }])),
      generic_params: None,
    });
    let decl = rf.push_decl(func);
    let loc = Location::point(rf.filename, LineCol { line: 1, column: 1, position: 0 });
    let mut sink = DiagnosticSink::new();
    let root = rf.root_scope;
    rf.scope_mut(root).insert(SymbolKind::Function, name, decl, loc, &mut sink).unwrap();
    let config = Config::default();
    let out = Emitter::new(&mut rf, &config, &mut sink).emit_translation_unit();
    assert!(sink.is_empty(), "{sink:?}");
    assert!(out.contains("  case 1:\n    break;\n  default:\n    break;\n"), "{out:?}");
  }
}
