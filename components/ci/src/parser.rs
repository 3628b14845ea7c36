//! Recursive-descent parser (§4.4): tokens → AST. Declarator parsing
//! follows the classic "builder closure" technique so that pointer/array/
//! function wrappers compose in the right order regardless of how much
//! parenthesization the declarator uses (`int (*f)(int)` vs `int *f(int)`).

use ci_util::Symbol;

use crate::ast::*;
use crate::config::Config;
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::scope::{ResultFile, ScopeId, SymbolKind};
use crate::source::Location;
use crate::token::{FloatWidth, IdentKind, IntWidth, Literal, Token, TokenKind};
use crate::token_stream::TokenStream;

type DeclaratorBuilder = Box<dyn FnOnce(DataType) -> DataType>;

pub struct Parser<'s> {
  ts: TokenStream,
  sink: &'s mut DiagnosticSink,
  cur: Token,
  /// A single token of lookahead pushed back by `(void)`-vs-`(void *p)`
  /// and label-vs-expression disambiguation (§4.4); the token stream
  /// itself has no rewind (§4.3), so this is the only slack the parser
  /// keeps.
  pushback: Option<Token>,
  config: Config,
  pending_doc: Option<String>,
  /// `<...>` generic-parameter list consumed mid-declarator, right after a
  /// function/typedef name (`T max<T>(T a, T b)`); stashed here because
  /// [`Self::parse_direct_declarator`] is the only place that sees those
  /// tokens at the moment they appear, while the caller that needs the
  /// list (`parse_function_or_variable`/`parse_typedef`) only regains
  /// control once the whole declarator has been parsed (§4.4 "Generic
  /// params").
  pending_declarator_generics: Option<Vec<Symbol>>,
}

impl<'s> Parser<'s> {
  #[must_use] pub fn new(mut ts: TokenStream, sink: &'s mut DiagnosticSink, config: Config) -> Self {
    let cur = Self::next_real(&mut ts, sink, &mut None);
    Self { ts, sink, cur, pushback: None, config, pending_doc: None, pending_declarator_generics: None }
  }

  /// Skip (and remember) doc comments while advancing to the next
  /// non-comment token (§F.1).
  fn next_real(ts: &mut TokenStream, sink: &mut DiagnosticSink, pending_doc: &mut Option<String>) -> Token {
    loop {
      let tok = ts.next(sink);
      match &tok.kind {
        TokenKind::DocComment(text) => { *pending_doc = Some(text.clone()); }
        _ => return tok,
      }
    }
  }

  fn bump(&mut self) -> Token {
    if let Some(tok) = self.pushback.take() {
      return std::mem::replace(&mut self.cur, tok);
    }
    let next = Self::next_real(&mut self.ts, self.sink, &mut self.pending_doc);
    std::mem::replace(&mut self.cur, next)
  }

  /// Push `tok` back as the current token, remembering what `cur` used to
  /// be so the next `bump` resumes the real stream correctly. Only ever
  /// one token deep (§4.4 "Recovery").
  fn unbump(&mut self, tok: Token) {
    self.pushback = Some(std::mem::replace(&mut self.cur, tok));
  }

  fn take_doc(&mut self) -> Option<String> { self.pending_doc.take() }

  fn loc(&self) -> Location { self.cur.location }

  fn at_punct(&self, p: &str) -> bool { self.cur.as_punct() == Some(p) }
  fn at_keyword(&self, k: &str) -> bool { matches!(&self.cur.kind, TokenKind::Keyword(kw) if *kw == k) }
  fn at_eof(&self) -> bool { self.cur.is_eof() }

  fn eat_punct(&mut self, p: &str) -> bool {
    if self.at_punct(p) { self.bump(); true } else { false }
  }

  fn expect_punct(&mut self, p: &'static str) -> bool {
    if self.eat_punct(p) { true } else {
      self.sink.push(Diagnostic::error(DiagKind::MissingToken(p), self.loc()));
      false
    }
  }

  fn eat_keyword(&mut self, k: &str) -> bool {
    if self.at_keyword(k) { self.bump(); true } else { false }
  }

  fn ident(&mut self) -> Option<Symbol> {
    match &self.cur.kind {
      TokenKind::Identifier(s, _) => { let sym = ci_util::intern(s); self.bump(); Some(sym) }
      TokenKind::Keyword(s) => { let sym = ci_util::intern(s); self.bump(); Some(sym) }
      _ => None,
    }
  }

  /// Discard tokens until the next statement/declaration boundary: a `;`,
  /// a matched closing `}`, or a top-level keyword (§4.4 "Recovery").
  fn synchronize(&mut self) {
    loop {
      if self.at_eof() || self.at_punct(";") { self.bump(); return }
      if self.at_punct("}") { return }
      if matches!(&self.cur.kind, TokenKind::Keyword(k) if TOP_LEVEL_KEYWORDS.contains(k)) { return }
      self.bump();
    }
  }

  // ---------------------------------------------------------------- decls

  /// Parse a whole translation unit into `file`, registering declarations
  /// and scopes as it goes (§4.4, §4.5).
  pub fn parse_translation_unit(&mut self, file: &mut ResultFile) {
    let root = file.root_scope;
    while !self.at_eof() {
      self.parse_top_level_decl(file, root);
    }
  }

  fn parse_top_level_decl(&mut self, file: &mut ResultFile, scope: ScopeId) {
    let doc = self.take_doc();
    let attrs = self.parse_attributes();
    if self.at_keyword("typedef") {
      self.parse_typedef(file, scope, attrs, doc);
      return;
    }
    if self.at_keyword("enum") {
      self.parse_enum(file, scope, attrs, doc);
      return;
    }
    if self.at_keyword("struct") || self.at_keyword("union") {
      self.parse_record_decl(file, scope, attrs, doc);
      return;
    }
    self.parse_function_or_variable(file, scope, attrs, doc);
  }

  fn parse_storage_class(&mut self) -> StorageClass {
    let mut sc = StorageClass::empty();
    loop {
      let flag = match &self.cur.kind {
        TokenKind::Keyword("extern") => StorageClass::EXTERN,
        TokenKind::Keyword("static") => StorageClass::STATIC,
        TokenKind::Keyword("auto") => StorageClass::AUTO,
        TokenKind::Keyword("register") => StorageClass::REGISTER,
        TokenKind::Keyword("inline") => StorageClass::INLINE,
        TokenKind::Keyword("constexpr") => StorageClass::CONSTEXPR,
        TokenKind::Keyword("thread_local" | "_Thread_local") => StorageClass::THREAD_LOCAL,
        _ => break,
      };
      sc |= flag;
      self.bump();
    }
    sc
  }

  fn parse_attributes(&mut self) -> Vec<Attribute> {
    let mut attrs = Vec::new();
    loop {
      if let TokenKind::Attribute { name, arg } = &self.cur.kind {
        let (name, arg) = (name.clone(), arg.clone());
        self.bump();
        attrs.push(match name.as_str() {
          "deprecated" => Attribute::Deprecated(arg),
          "fallthrough" => Attribute::Fallthrough,
          "maybe_unused" => Attribute::MaybeUnused,
          "nodiscard" => Attribute::Nodiscard(arg),
          "noreturn" => Attribute::Noreturn,
          "unsequenced" => Attribute::Unsequenced,
          "reproducible" => Attribute::Reproducible,
          _ => Attribute::Gnu(format!("{name}{}", arg.map(|a| format!("({a})")).unwrap_or_default())),
        });
        continue;
      }
      if let TokenKind::GnuAttribute(raw) = &self.cur.kind {
        attrs.push(Attribute::Gnu(raw.clone()));
        self.bump();
        continue;
      }
      // `__attribute__((...))` arrives as a plain identifier followed by
      // doubled parens; the scanner does not special-case it (§6, §F.7).
      if self.cur.as_identifier() == Some("__attribute__") {
        self.bump();
        self.expect_punct("(");
        self.expect_punct("(");
        let raw = self.consume_balanced_until_double_close();
        attrs.push(Attribute::Gnu(raw));
        continue;
      }
      break;
    }
    attrs
  }

  fn consume_balanced_until_double_close(&mut self) -> String {
    let mut depth = 1i32;
    let mut parts = Vec::new();
    loop {
      if self.at_eof() { break }
      if self.at_punct("(") { depth += 1; parts.push("(".to_owned()); self.bump(); continue }
      if self.at_punct(")") {
        depth -= 1;
        self.bump();
        if depth == 0 {
          self.eat_punct(")");
          break;
        }
        parts.push(")".to_owned());
        continue;
      }
      parts.push(crate::token::to_source(&self.cur));
      self.bump();
    }
    parts.join(" ")
  }

  fn parse_generic_params(&mut self) -> Option<Vec<Symbol>> {
    if !self.eat_punct("<") { return None }
    let mut params = Vec::new();
    while !self.at_punct(">") && !self.at_eof() {
      if let Some(name) = self.ident() { params.push(name) }
      if !self.eat_punct(",") { break }
    }
    self.expect_punct(">");
    Some(params)
  }

  /// Speculatively scans forward from the current token, without consuming
  /// any of the real stream, to discover a top-level `<...>` generic-param
  /// list that will appear later in the coming declaration — e.g. the `<T>`
  /// after the name in `T max<T>(T a, T b)` or `typedef T Box<T>;`. The base
  /// type and parameter types of such a declaration are parsed *before* the
  /// parser reaches that `<T>` token, so without this preview `T` would be
  /// unresolvable while parsing them (§4.4 "Generic params", §4.6). Mirrors
  /// `paren_starts_type`'s use of an independent probe since the token
  /// stream itself has no rewind (§4.3).
  fn prescan_generic_params(&self) -> Option<Vec<Symbol>> {
    let mut probe = self.ts.clone();
    let mut scratch = DiagnosticSink::new();
    let mut tok = self.cur.clone();
    let mut depth = 0i32;
    loop {
      match &tok.kind {
        TokenKind::Eof => return None,
        TokenKind::Punct("(" | "[") => depth += 1,
        TokenKind::Punct(")" | "]") => depth -= 1,
        TokenKind::Punct(";" | "{") if depth <= 0 => return None,
        TokenKind::Punct("<") if depth <= 0 => {
          let mut names = Vec::new();
          loop {
            let t = probe.next(&mut scratch);
            match &t.kind {
              TokenKind::Identifier(s, _) => names.push(ci_util::intern(s)),
              TokenKind::Punct(">") => return Some(names),
              TokenKind::Punct(",") => {}
              _ => return None,
            }
          }
        }
        _ => {}
      }
      tok = probe.next(&mut scratch);
    }
  }

  /// Open a child scope of `parent` with each of `params` registered as a
  /// [`SymbolKind::Generic`] (§4.5), so that base/return/parameter types
  /// parsed against this scope resolve `T` to [`DataType::GenericVar`]
  /// instead of failing as an undeclared identifier. These entries are
  /// parse-time bookkeeping only — nothing ever dereferences a generic
  /// entry's `DeclId`, so a shared sentinel is used rather than cluttering
  /// the unit's real declaration list (the emitter's prototype/definition
  /// passes walk that list directly, and a synthetic `T` typedef there
  /// would get printed as a bogus top-level declaration).
  fn push_generic_scope(&mut self, file: &mut ResultFile, parent: ScopeId, params: &[Symbol]) -> ScopeId {
    let gen_scope = file.new_scope(parent);
    let loc = self.loc();
    let placeholder: DeclId = ci_util::Idx::from_usize(u32::MAX as usize);
    for &name in params {
      let _ = file.scope_mut(gen_scope).insert(SymbolKind::Generic, name, placeholder, loc, self.sink);
    }
    gen_scope
  }

  fn parse_called_generics(&mut self, file: &mut ResultFile, scope: ScopeId) -> Option<Vec<DataType>> {
    if !self.eat_punct("<") { return None }
    let mut args = Vec::new();
    while !self.at_punct(">") && !self.at_eof() {
      args.push(self.parse_type_name(file, scope));
      if !self.eat_punct(",") { break }
    }
    self.expect_punct(">");
    Some(args)
  }

  fn parse_typedef(&mut self, file: &mut ResultFile, scope: ScopeId, attrs: Vec<Attribute>, doc: Option<String>) {
    self.bump(); // 'typedef'
    let preview = self.prescan_generic_params();
    let work_scope = match &preview {
      Some(params) => self.push_generic_scope(file, scope, params),
      None => scope,
    };
    let Some(base) = self.parse_decl_specifiers(file, work_scope) else {
      self.synchronize();
      return;
    };
    let (name, ty) = self.parse_declarator_with_base(file, work_scope, base);
    let generic_params = self.pending_declarator_generics.take();
    self.expect_punct(";");
    let Some(name) = name else { return };
    let common = DeclCommon { storage: StorageClass::TYPEDEF, is_prototype: false, typedef_name: Some(name), attributes: attrs, doc_comment: doc };
    let decl_id = file.push_decl(Decl::Typedef(TypedefDecl { common, name, generic_params, aliased: ty }));
    let loc = self.loc();
    let _ = file.scope_mut(scope).insert(SymbolKind::Alias, name, decl_id, loc, self.sink);
  }

  fn parse_enum(&mut self, file: &mut ResultFile, scope: ScopeId, attrs: Vec<Attribute>, doc: Option<String>) {
    self.bump(); // 'enum'
    let name = self.ident();
    let underlying = if self.eat_punct(":") { Some(self.parse_type_name(file, scope)) } else { None };
    let mut variants = Vec::new();
    if self.eat_punct("{") {
      while !self.at_punct("}") && !self.at_eof() {
        let Some(vname) = self.ident() else { break };
        let discriminant = if self.eat_punct("=") {
          Some(self.parse_expr_into(file, scope, 0))
        } else { None };
        variants.push(EnumVariant { name: vname, discriminant });
        if !self.eat_punct(",") { break }
      }
      self.expect_punct("}");
    }
    self.expect_punct(";");
    let common = DeclCommon { storage: StorageClass::empty(), is_prototype: variants.is_empty(), typedef_name: None, attributes: attrs, doc_comment: doc };
    let variant_names: Vec<Symbol> = variants.iter().map(|v| v.name).collect();
    let decl_id = file.push_decl(Decl::Enum(EnumDecl { common, name, underlying, variants }));
    if let Some(name) = name {
      let loc = self.loc();
      let _ = file.scope_mut(scope).insert(SymbolKind::Enum, name, decl_id, loc, self.sink);
    }
    // Each variant name is a constant identifier in its own right (§4.5),
    // resolved back to the same enum decl so the typechecker can recover
    // its underlying/enum type without a second per-variant declaration.
    let loc = self.loc();
    for vname in variant_names {
      let _ = file.scope_mut(scope).insert(SymbolKind::Constant, vname, decl_id, loc, self.sink);
    }
  }

  fn parse_record_decl(&mut self, file: &mut ResultFile, scope: ScopeId, attrs: Vec<Attribute>, doc: Option<String>) {
    let is_union = self.at_keyword("union");
    self.bump();
    let name = self.ident();
    let generic_params = self.parse_generic_params();
    let field_scope = match &generic_params {
      Some(params) => self.push_generic_scope(file, scope, params),
      None => scope,
    };
    let fields = if self.eat_punct("{") {
      let fs = self.parse_field_list(file, field_scope);
      self.expect_punct("}");
      Some(fs)
    } else { None };
    self.expect_punct(";");
    let common = DeclCommon { storage: StorageClass::empty(), is_prototype: fields.is_none(), typedef_name: None, attributes: attrs, doc_comment: doc };
    let record = RecordDecl { common, name, generic_params, fields };
    let decl_id = file.push_decl(if is_union { Decl::Union(record) } else { Decl::Struct(record) });
    if let Some(name) = name {
      let kind = if is_union { SymbolKind::Union } else { SymbolKind::Record };
      let loc = self.loc();
      let _ = file.scope_mut(scope).insert(kind, name, decl_id, loc, self.sink);
    }
  }

  fn parse_field_list(&mut self, file: &mut ResultFile, scope: ScopeId) -> Vec<Field> {
    let mut fields = Vec::new();
    while !self.at_punct("}") && !self.at_eof() {
      if self.at_keyword("struct") || self.at_keyword("union") {
        let nested_is_union = self.at_keyword("union");
        self.bump();
        if self.cur.as_identifier().is_none() && self.at_punct("{") {
          self.bump();
          let idx = fields.len();
          let inner = self.parse_field_list(file, scope);
          self.expect_punct("}");
          self.expect_punct(";");
          fields.push(Field::AnonymousRecord { is_union: nested_is_union, fields: inner, parent_index: idx });
          continue;
        }
      }
      let Some(base) = self.parse_decl_specifiers(file, scope) else { self.synchronize(); continue };
      let (name, ty) = self.parse_declarator_with_base(file, scope, base);
      let bit_width = if self.eat_punct(":") { Some(self.parse_expr_into(file, scope, 0)) } else { None };
      self.expect_punct(";");
      if let Some(name) = name {
        fields.push(Field::Named { name, ty, bit_width });
      }
    }
    fields
  }

  /// Parse the base-type portion of a declaration (pre-const qualifiers +
  /// the primitive/tag/typedef core), without yet touching the declarator.
  fn parse_decl_specifiers(&mut self, file: &mut ResultFile, scope: ScopeId) -> Option<DataType> {
    let mut pre_const = false;
    let mut quals = Qualifiers::empty();
    loop {
      match &self.cur.kind {
        TokenKind::Keyword("const") => { pre_const = true; self.bump(); }
        TokenKind::Keyword("restrict") => { quals |= Qualifiers::RESTRICT; self.bump(); }
        TokenKind::Keyword("volatile") => { quals |= Qualifiers::VOLATILE; self.bump(); }
        _ => break,
      }
    }
    let mut base = self.parse_type_core(file, scope)?;
    if quals != Qualifiers::empty() { base = DataType::Qualified { inner: Box::new(base), quals } }
    if pre_const { base = DataType::PreConst(Box::new(base)) }
    // A post-const may also follow directly (`int const`).
    if self.eat_keyword("const") { base = DataType::PostConst(Box::new(base)) }
    Some(base)
  }

  fn parse_type_core(&mut self, file: &mut ResultFile, scope: ScopeId) -> Option<DataType> {
    if self.eat_keyword("_Atomic") {
      self.expect_punct("(");
      let inner = self.parse_type_name(file, scope);
      self.expect_punct(")");
      return Some(DataType::Atomic(Box::new(inner)));
    }
    if self.at_keyword("struct") || self.at_keyword("union") {
      let is_union = self.at_keyword("union");
      self.bump();
      let tag = self.ident();
      let called_generics = self.parse_called_generics(file, scope);
      let r = TagRef { tag, called_generics };
      return Some(if is_union { DataType::Union(r) } else { DataType::Struct(r) });
    }
    if self.eat_keyword("enum") {
      let tag = self.ident();
      return Some(DataType::Enum(TagRef { tag, called_generics: None }));
    }
    if let Some(prim) = self.try_parse_primitive() { return Some(prim) }
    if let TokenKind::Identifier(name, IdentKind::Plain) = &self.cur.kind {
      let name = ci_util::intern(name);
      if file.lookup(scope, SymbolKind::Alias, name).is_some() || file.lookup(scope, SymbolKind::Generic, name).is_some() {
        self.bump();
        let called_generics = self.parse_called_generics(file, scope);
        return Some(if called_generics.is_some() {
          DataType::Typedef { name, called_generics }
        } else if file.lookup(scope, SymbolKind::Generic, name).is_some() && file.lookup(scope, SymbolKind::Alias, name).is_none() {
          DataType::GenericVar(name)
        } else {
          DataType::Typedef { name, called_generics: None }
        });
      }
    }
    self.sink.push(Diagnostic::error(DiagKind::UnexpectedToken, self.loc()));
    None
  }

  fn try_parse_primitive(&mut self) -> Option<DataType> {
    let mut signed = None;
    let mut longs = 0u8;
    let mut short = false;
    let mut base_kw: Option<&'static str> = None;
    loop {
      match &self.cur.kind {
        TokenKind::Keyword(kw @ ("void" | "char" | "int" | "float" | "double" | "_Bool" | "bool" | "nullptr_t")) => {
          if base_kw.is_some() { break }
          base_kw = Some(kw);
          self.bump();
        }
        TokenKind::Keyword("signed") => { signed = Some(true); self.bump(); }
        TokenKind::Keyword("unsigned") => { signed = Some(false); self.bump(); }
        TokenKind::Keyword("short") => { short = true; self.bump(); }
        TokenKind::Keyword("long") => { longs += 1; self.bump(); }
        _ => break,
      }
    }
    let complex = self.eat_keyword("_Complex");
    let imaginary = !complex && self.eat_keyword("_Imaginary");
    if base_kw.is_none() && signed.is_none() && longs == 0 && !short { return None }
    Some(match base_kw {
      Some("void") => DataType::void(),
      Some("_Bool" | "bool") => DataType::Primitive(Primitive::Bool),
      Some("nullptr_t") => DataType::Primitive(Primitive::NullptrT),
      Some("float") => DataType::Primitive(Primitive::Float { kind: FloatKind::Float, complex, imaginary }),
      Some("double") => {
        let kind = if longs > 0 { FloatKind::LongDouble } else { FloatKind::Double };
        DataType::Primitive(Primitive::Float { kind, complex, imaginary })
      }
      Some("char") => DataType::Primitive(Primitive::Int(match signed {
        Some(true) => IntKind::SChar, Some(false) => IntKind::UChar, None => IntKind::Char,
      })),
      _ => {
        let unsigned = signed == Some(false);
        let kind = if short { if unsigned { IntKind::UShort } else { IntKind::Short } }
          else if longs >= 2 { if unsigned { IntKind::ULongLong } else { IntKind::LongLong } }
          else if longs == 1 { if unsigned { IntKind::ULong } else { IntKind::Long } }
          else if unsigned { IntKind::UInt } else { IntKind::Int };
        DataType::Primitive(Primitive::Int(kind))
      }
    })
  }

  /// Parse a bare type name (used by casts, `sizeof`, `_Atomic(...)`,
  /// `<...>` generic-argument lists): decl-specifiers plus an optional
  /// abstract declarator. Shares `parse_decl_specifiers` with ordinary
  /// declarations so alias-vs-generic-parameter lookup stays consistent
  /// (§4.6), and threads the real arena through so an array bound written
  /// inside a type name — e.g. `sizeof(int[n])` — lands in the same place
  /// any other expression in the translation unit would.
  fn parse_type_name(&mut self, file: &mut ResultFile, scope: ScopeId) -> DataType {
    let base = self.parse_decl_specifiers(file, scope).unwrap_or_else(DataType::int);
    let (_, ty) = self.parse_declarator_with_base(file, scope, base);
    ty
  }

  /// Parse a declarator and apply it to `base`, per the builder-closure
  /// technique described in this module's header comment (§4.4).
  fn parse_declarator_with_base(&mut self, file: &mut ResultFile, scope: ScopeId, base: DataType) -> (Option<Symbol>, DataType) {
    let (name, builder) = self.parse_declarator(file, scope);
    (name, builder(base))
  }

  fn parse_declarator(&mut self, file: &mut ResultFile, scope: ScopeId) -> (Option<Symbol>, DeclaratorBuilder) {
    let mut star_quals = Vec::new();
    while self.eat_punct("*") {
      let mut q = Qualifiers::empty();
      loop {
        if self.eat_keyword("restrict") { q |= Qualifiers::RESTRICT; continue }
        if self.eat_keyword("volatile") { q |= Qualifiers::VOLATILE; continue }
        if self.eat_keyword("const") { break } // post-pointer const folded as qualifier-adjacent; rare in practice
        break;
      }
      star_quals.push(q);
    }
    let (name, dd_builder) = self.parse_direct_declarator(file, scope);
    let builder: DeclaratorBuilder = Box::new(move |base| {
      let mut ptr_base = base;
      for q in star_quals {
        ptr_base = DataType::Ptr { inner: Box::new(ptr_base), name: None, quals: q };
      }
      dd_builder(ptr_base)
    });
    (name, builder)
  }

  fn parse_direct_declarator(&mut self, file: &mut ResultFile, scope: ScopeId) -> (Option<Symbol>, DeclaratorBuilder) {
    if self.eat_punct("(") {
      let (name, inner_builder) = self.parse_declarator(file, scope);
      self.expect_punct(")");
      let suffix_builder = self.parse_declarator_suffixes(file, scope);
      let builder: DeclaratorBuilder = Box::new(move |base| inner_builder(suffix_builder(base)));
      return (name, builder);
    }
    let name = self.ident();
    // A function/typedef name may be immediately followed by its own
    // `<...>` generic-parameter list (`max<T>(...)`); consume it here,
    // at the exact point it appears in the token stream, and stash it
    // for the declaration-level caller to pick up (§4.4 "Generic params").
    if name.is_some() && self.at_punct("<") {
      self.pending_declarator_generics = self.parse_generic_params();
    }
    let suffix_builder = self.parse_declarator_suffixes(file, scope);
    (name, suffix_builder)
  }

  /// Collect the array/function suffix chain and compose it so the
  /// right-most suffix wraps innermost (§4.4, §4.9 item 3).
  fn parse_declarator_suffixes(&mut self, file: &mut ResultFile, scope: ScopeId) -> DeclaratorBuilder {
    enum Suffix { Array { size: ArraySize, is_static: bool, quals: Qualifiers }, Function { params: Vec<Param>, generic_params: Option<Vec<Symbol>> } }
    let mut suffixes = Vec::new();
    loop {
      if self.eat_punct("[") {
        let is_static = self.eat_keyword("static");
        let mut quals = Qualifiers::empty();
        loop {
          if self.eat_keyword("restrict") { quals |= Qualifiers::RESTRICT; continue }
          if self.eat_keyword("volatile") { quals |= Qualifiers::VOLATILE; continue }
          break;
        }
        let size = if self.at_punct("]") { ArraySize::Unsized } else {
          ArraySize::Sized(Some(self.parse_expr_into(file, scope, 1)))
        };
        self.expect_punct("]");
        suffixes.push(Suffix::Array { size, is_static, quals });
        continue;
      }
      if self.eat_punct("(") {
        let (params, generic_params) = self.parse_param_list(file, scope);
        self.expect_punct(")");
        suffixes.push(Suffix::Function { params, generic_params });
        continue;
      }
      break;
    }
    Box::new(move |mut base: DataType| {
      for suf in suffixes.into_iter().rev() {
        base = match suf {
          Suffix::Array { size, is_static, quals } =>
            DataType::Array { element: Box::new(base), size, name: None, is_static, quals },
          Suffix::Function { params, generic_params } =>
            DataType::Function(Box::new(FunctionType { name: None, params, return_type: Box::new(base), generic_params })),
        };
      }
      base
    })
  }

  fn parse_param_list(&mut self, file: &mut ResultFile, scope: ScopeId) -> (Vec<Param>, Option<Vec<Symbol>>) {
    let mut params = Vec::new();
    if self.at_keyword("void") {
      // Peek: a lone `(void)` means zero parameters; `(void *p)` does not.
      let save = self.cur.clone();
      self.bump();
      if self.at_punct(")") { return (params, None) }
      // Not a bare `void` — reinterpret as the start of a type.
      self.unbump(save);
    }
    while !self.at_punct(")") && !self.at_eof() {
      if self.eat_punct("...") { params.push(Param::Variadic); break }
      let Some(base) = self.parse_decl_specifiers(file, scope) else { break };
      let (name, ty) = self.parse_declarator_with_base(file, scope, base);
      params.push(Param::Normal { name, ty });
      if !self.eat_punct(",") { break }
    }
    (params, None)
  }

  fn parse_function_or_variable(&mut self, file: &mut ResultFile, scope: ScopeId, attrs: Vec<Attribute>, doc: Option<String>) {
    let storage = self.parse_storage_class();
    let preview = self.prescan_generic_params();
    let work_scope = match &preview {
      Some(params) => self.push_generic_scope(file, scope, params),
      None => scope,
    };
    let Some(base) = self.parse_decl_specifiers(file, work_scope) else { self.synchronize(); return };
    let (name, ty) = self.parse_declarator_with_base(file, work_scope, base);
    let Some(name) = name else { self.synchronize(); return };
    let generic_params = self.pending_declarator_generics.take();

    if let DataType::Function(f) = ty {
      let FunctionType { params, return_type, .. } = *f;
      let body = if self.at_punct("{") {
        Some(self.parse_function_body(file, work_scope, &params))
      } else {
        self.expect_punct(";");
        None
      };
      let is_prototype = body.is_none();
      let loc = self.loc();
      let common = DeclCommon { storage, is_prototype, typedef_name: None, attributes: attrs, doc_comment: doc };

      // A prior prototype with a matching signature merges in place into
      // one symbol rather than becoming a second declaration (§4.5, §8
      // "a function declared and later defined with identical signature
      // produces exactly one symbol with is_prototype=false"); a
      // signature mismatch against that prototype is a fatal error
      // instead of the ordinary duplicate-name collision.
      if let Some(prior) = file.lookup(scope, SymbolKind::Function, name) {
        if let Decl::Function(p) = file.decl(prior.decl) {
          if p.common.is_prototype {
            if p.return_type == *return_type && p.params == params {
              *file.decl_mut(prior.decl) =
                Decl::Function(FunctionDecl { common, name, return_type: *return_type, params, body, generic_params });
            } else {
              self.sink.push(Diagnostic::error(DiagKind::TypeMismatch, loc));
            }
            return;
          }
        }
      }
      let decl = FunctionDecl { common, name, return_type: *return_type, params, body, generic_params };
      let decl_id = file.push_decl(Decl::Function(decl));
      let _ = file.scope_mut(scope).insert(SymbolKind::Function, name, decl_id, loc, self.sink);
      return;
    }

    let initializer = if self.eat_punct("=") { Some(self.parse_expr_into(file, scope, 0)) } else { None };
    self.expect_punct(";");
    let is_local = scope != file.root_scope;
    let common = DeclCommon { storage, is_prototype: false, typedef_name: None, attributes: attrs, doc_comment: doc };
    let decl_id = file.push_decl(Decl::Variable(VariableDecl { common, name, ty, initializer, is_local }));
    let loc = self.loc();
    let _ = file.scope_mut(scope).insert(SymbolKind::Variable, name, decl_id, loc, self.sink);
  }

  // ------------------------------------------------------------ statements

  fn parse_block_items(&mut self, file: &mut ResultFile, parent: ScopeId) -> (ScopeId, Vec<FunctionItem>) {
    self.expect_punct("{");
    let scope = file.new_scope(parent);
    let mut items = Vec::new();
    while !self.at_punct("}") && !self.at_eof() {
      items.push(self.parse_block_item(file, scope));
    }
    self.expect_punct("}");
    (scope, items)
  }

  /// Like [`Self::parse_block_items`], but additionally registers `params`
  /// as [`SymbolKind::Parameter`] in the fresh scope before parsing any
  /// statement, so that references to a parameter inside the body resolve
  /// through the ordinary identifier-lookup path (§4.5, §4.6).
  fn parse_function_body(&mut self, file: &mut ResultFile, parent: ScopeId, params: &[Param]) -> (ScopeId, Vec<FunctionItem>) {
    self.expect_punct("{");
    let scope = file.new_scope(parent);
    for param in params {
      if let Param::Normal { name: Some(name), ty } = param {
        let decl_id = file.push_decl(Decl::Variable(VariableDecl {
          common: DeclCommon::default(), name: *name, ty: ty.clone(), initializer: None, is_local: true,
        }));
        let loc = self.loc();
        let _ = file.scope_mut(scope).insert(SymbolKind::Parameter, *name, decl_id, loc, self.sink);
      }
    }
    let mut items = Vec::new();
    while !self.at_punct("}") && !self.at_eof() {
      items.push(self.parse_block_item(file, scope));
    }
    self.expect_punct("}");
    (scope, items)
  }

  fn parse_block_item(&mut self, file: &mut ResultFile, scope: ScopeId) -> FunctionItem {
    if self.looks_like_decl(file, scope) {
      let before = file.decls.len();
      self.parse_function_or_variable(file, scope, Vec::new(), None);
      let decl_id: DeclId = ci_util::Idx::from_usize(before);
      return FunctionItem { kind: FunctionItemKind::Decl(decl_id), scope };
    }
    // Label: `identifier ':'` not followed by another ':' (to not confuse with `?:`).
    if let TokenKind::Identifier(name, IdentKind::Plain) = &self.cur.kind {
      let name = ci_util::intern(name);
      let save = self.cur.clone();
      self.bump();
      if self.at_punct(":") {
        self.bump();
        let common = DeclCommon::default();
        let decl_id = file.push_decl(Decl::Label { common, name });
        let loc = self.loc();
        let _ = file.scope_mut(scope).insert(SymbolKind::Label, name, decl_id, loc, self.sink);
        return FunctionItem { kind: FunctionItemKind::Decl(decl_id), scope };
      }
      self.unbump(save);
    }
    let stmt = self.parse_statement(file, scope);
    FunctionItem { kind: FunctionItemKind::Stmt(stmt), scope }
  }

  fn looks_like_decl(&mut self, file: &ResultFile, scope: ScopeId) -> bool {
    match &self.cur.kind {
      TokenKind::Keyword(
        "const" | "restrict" | "volatile" | "void" | "char" | "int" | "float" | "double"
        | "_Bool" | "bool" | "signed" | "unsigned" | "short" | "long" | "struct" | "union"
        | "enum" | "_Atomic" | "extern" | "static" | "auto" | "register" | "inline"
        | "constexpr" | "thread_local" | "_Thread_local",
      ) => true,
      TokenKind::Identifier(name, IdentKind::Plain) => {
        let name = ci_util::intern(name);
        file.lookup(scope, SymbolKind::Alias, name).is_some()
      }
      _ => false,
    }
  }

  fn parse_statement(&mut self, file: &mut ResultFile, scope: ScopeId) -> StmtId {
    if self.at_punct("{") {
      let (inner_scope, items) = self.parse_block_items(file, scope);
      return file.arenas.push_stmt(Stmt::Block { scope: inner_scope, items });
    }
    if self.eat_keyword("break") { self.expect_punct(";"); return file.arenas.push_stmt(Stmt::Break) }
    if self.eat_keyword("continue") { self.expect_punct(";"); return file.arenas.push_stmt(Stmt::Continue) }
    if self.eat_keyword("default") {
      self.expect_punct(":");
      return file.arenas.push_stmt(Stmt::Default);
    }
    if self.eat_keyword("case") {
      let value = self.parse_expr_into(file, scope, 0);
      self.expect_punct(":");
      return file.arenas.push_stmt(Stmt::Case(value));
    }
    if self.eat_keyword("goto") {
      let name = self.ident().unwrap_or(ci_util::Symbol::UNDER);
      self.expect_punct(";");
      return file.arenas.push_stmt(Stmt::Goto(name));
    }
    if self.eat_keyword("return") {
      let value = if self.at_punct(";") { None } else { Some(self.parse_expr_into(file, scope, 0)) };
      self.expect_punct(";");
      return file.arenas.push_stmt(Stmt::Return(value));
    }
    if self.eat_keyword("while") {
      self.expect_punct("(");
      let cond = self.parse_expr_into(file, scope, 0);
      self.expect_punct(")");
      let body = self.parse_statement(file, scope);
      return file.arenas.push_stmt(Stmt::While { cond, body });
    }
    if self.eat_keyword("do") {
      let body = self.parse_statement(file, scope);
      self.expect_keyword_or_err("while");
      self.expect_punct("(");
      let cond = self.parse_expr_into(file, scope, 0);
      self.expect_punct(")");
      self.expect_punct(";");
      return file.arenas.push_stmt(Stmt::DoWhile { body, cond });
    }
    if self.eat_keyword("for") {
      self.expect_punct("(");
      let for_scope = file.new_scope(scope);
      let mut init = Vec::new();
      if !self.at_punct(";") {
        if self.looks_like_decl(file, for_scope) {
          let before = file.decls.len();
          self.parse_function_or_variable(file, for_scope, Vec::new(), None);
          init.push(FunctionItem { kind: FunctionItemKind::Decl(ci_util::Idx::from_usize(before)), scope: for_scope });
        } else {
          loop {
            let e = self.parse_expr_into(file, for_scope, 0);
            init.push(FunctionItem { kind: FunctionItemKind::Expr(e), scope: for_scope });
            if !self.eat_punct(",") { break }
          }
          self.expect_punct(";");
        }
      } else {
        self.bump();
      }
      let cond = if self.at_punct(";") { None } else { Some(self.parse_expr_into(file, for_scope, 0)) };
      self.expect_punct(";");
      let mut step = Vec::new();
      while !self.at_punct(")") && !self.at_eof() {
        step.push(self.parse_expr_into(file, for_scope, 0));
        if !self.eat_punct(",") { break }
      }
      self.expect_punct(")");
      let body = self.parse_statement(file, for_scope);
      return file.arenas.push_stmt(Stmt::For { init, cond, step, body, scope: for_scope });
    }
    if self.eat_keyword("if") {
      self.expect_punct("(");
      let cond = self.parse_expr_into(file, scope, 0);
      self.expect_punct(")");
      let body = self.parse_statement(file, scope);
      let mut branches = vec![IfBranch { cond, body }];
      let mut else_body = None;
      while self.eat_keyword("else") {
        if self.eat_keyword("if") {
          self.expect_punct("(");
          let c = self.parse_expr_into(file, scope, 0);
          self.expect_punct(")");
          let b = self.parse_statement(file, scope);
          branches.push(IfBranch { cond: c, body: b });
        } else {
          else_body = Some(self.parse_statement(file, scope));
          break;
        }
      }
      return file.arenas.push_stmt(Stmt::If { branches, else_body });
    }
    if self.eat_keyword("switch") {
      self.expect_punct("(");
      let scrutinee = self.parse_expr_into(file, scope, 0);
      self.expect_punct(")");
      file.scope_mut(scope).in_switch = true;
      let body = self.parse_statement(file, scope);
      file.scope_mut(scope).in_switch = false;
      return file.arenas.push_stmt(Stmt::Switch { scrutinee, body });
    }
    // Expression statement.
    if self.at_punct(";") { self.bump(); return file.arenas.push_stmt(Stmt::Block { scope, items: Vec::new() }) }
    let e = self.parse_expr_into(file, scope, 0);
    self.expect_punct(";");
    // An expression-statement is represented as a trivial wrapper: reuse
    // the block-item encoding by storing it as a single-expr block so the
    // statement arena stays uniform (the typechecker special-cases this
    // shape per §4.7's "discarded expressions" rule).
    file.arenas.push_stmt(Stmt::Block { scope, items: vec![FunctionItem { kind: FunctionItemKind::Expr(e), scope }] })
  }

  fn expect_keyword_or_err(&mut self, k: &'static str) {
    if !self.eat_keyword(k) { self.sink.push(Diagnostic::error(DiagKind::MissingToken(k), self.loc())); }
  }

  // ----------------------------------------------------------- expressions

  fn parse_expr_into(&mut self, file: &mut ResultFile, scope: ScopeId, min_bp: u8) -> ExprId {
    let mut lhs = self.parse_unary(file, scope);
    loop {
      let Some((op, lbp, rbp, right_assoc)) = self.peek_binary_op() else { break };
      if lbp < min_bp { break }
      self.bump();
      if op.is_member_access() {
        let field = self.ident().unwrap_or(ci_util::Symbol::UNDER);
        lhs = file.arenas.push_expr(Expr::Binary { op, left: lhs, right: file.arenas.push_expr(Expr::Identifier(field)) });
        continue;
      }
      let next_min = if right_assoc { rbp } else { rbp + 1 };
      let rhs = self.parse_expr_into(file, scope, next_min);
      lhs = file.arenas.push_expr(Expr::Binary { op, left: lhs, right: rhs });
    }
    if self.at_punct("?") && min_bp <= 2 {
      self.bump();
      let if_true = self.parse_expr_into(file, scope, 0);
      self.expect_punct(":");
      let if_false = self.parse_expr_into(file, scope, 2);
      lhs = file.arenas.push_expr(Expr::Ternary { cond: lhs, if_true, if_false });
    }
    lhs
  }

  /// Binding powers, loosely following C precedence (tightest last):
  /// assignment(1) < ternary-gap(2) < logical-or(4) < logical-and(6) <
  /// bitor(8) < bitxor(9) < bitand(10) < equality(11) < relational(12) <
  /// shift(13) < additive(14) < multiplicative(15) < member-access(20).
  fn peek_binary_op(&self) -> Option<(BinaryOp, u8, u8, bool)> {
    let p = self.cur.as_punct()?;
    Some(match p {
      "=" => (BinaryOp::Assign, 1, 1, true),
      "+=" => (BinaryOp::AddAssign, 1, 1, true),
      "-=" => (BinaryOp::SubAssign, 1, 1, true),
      "*=" => (BinaryOp::MulAssign, 1, 1, true),
      "/=" => (BinaryOp::DivAssign, 1, 1, true),
      "%=" => (BinaryOp::ModAssign, 1, 1, true),
      "&=" => (BinaryOp::AndAssign, 1, 1, true),
      "|=" => (BinaryOp::OrAssign, 1, 1, true),
      "^=" => (BinaryOp::XorAssign, 1, 1, true),
      "<<=" => (BinaryOp::ShlAssign, 1, 1, true),
      ">>=" => (BinaryOp::ShrAssign, 1, 1, true),
      "||" => (BinaryOp::LogOr, 4, 4, false),
      "&&" => (BinaryOp::LogAnd, 6, 6, false),
      "|" => (BinaryOp::BitOr, 8, 8, false),
      "^" => (BinaryOp::BitXor, 9, 9, false),
      "&" => (BinaryOp::BitAnd, 10, 10, false),
      "==" => (BinaryOp::Eq, 11, 11, false),
      "!=" => (BinaryOp::Ne, 11, 11, false),
      "<" => (BinaryOp::Lt, 12, 12, false),
      ">" => (BinaryOp::Gt, 12, 12, false),
      "<=" => (BinaryOp::Le, 12, 12, false),
      ">=" => (BinaryOp::Ge, 12, 12, false),
      "<<" => (BinaryOp::Shl, 13, 13, false),
      ">>" => (BinaryOp::Shr, 13, 13, false),
      "+" => (BinaryOp::Add, 14, 14, false),
      "-" => (BinaryOp::Sub, 14, 14, false),
      "*" => (BinaryOp::Mul, 15, 15, false),
      "/" => (BinaryOp::Div, 15, 15, false),
      "%" => (BinaryOp::Mod, 15, 15, false),
      "." => (BinaryOp::Member, 20, 20, false),
      "->" => (BinaryOp::Arrow, 20, 20, false),
      _ => return None,
    })
  }

  fn parse_unary(&mut self, file: &mut ResultFile, scope: ScopeId) -> ExprId {
    let op = match &self.cur.kind {
      TokenKind::Punct("++") => Some(UnaryOp::PreInc),
      TokenKind::Punct("--") => Some(UnaryOp::PreDec),
      TokenKind::Punct("+") => Some(UnaryOp::Plus),
      TokenKind::Punct("-") => Some(UnaryOp::Minus),
      TokenKind::Punct("~") => Some(UnaryOp::BitNot),
      TokenKind::Punct("!") => Some(UnaryOp::LogNot),
      TokenKind::Punct("*") => Some(UnaryOp::Deref),
      TokenKind::Punct("&") => Some(UnaryOp::AddrOf),
      _ => None,
    };
    if let Some(op) = op {
      self.bump();
      let inner = self.parse_unary(file, scope);
      return file.arenas.push_expr(Expr::Unary { op, inner });
    }
    if self.at_keyword("sizeof") {
      self.bump();
      if self.at_punct("(") && self.looks_like_type_in_parens(file, scope) {
        self.bump();
        let ty = self.parse_type_name(file, scope);
        self.expect_punct(")");
        let dv = file.arenas.push_expr(Expr::DataTypeAsValue(ty));
        return file.arenas.push_expr(Expr::Sizeof(dv));
      }
      let inner = self.parse_unary(file, scope);
      return file.arenas.push_expr(Expr::Sizeof(inner));
    }
    if self.eat_keyword("_Alignof") {
      self.expect_punct("(");
      let ty = self.parse_type_name(file, scope);
      self.expect_punct(")");
      return file.arenas.push_expr(Expr::Alignof(ty));
    }
    if self.at_keyword("_Generic") { return self.parse_generic_selection(file, scope) }
    if self.at_punct("(") && self.looks_like_type_in_parens(file, scope) {
      self.bump();
      let ty = self.parse_type_name(file, scope);
      self.expect_punct(")");
      let inner = self.parse_unary(file, scope);
      return file.arenas.push_expr(Expr::Cast { target: ty, inner });
    }
    self.parse_postfix(file, scope)
  }

  fn looks_like_type_in_parens(&self, file: &ResultFile, scope: ScopeId) -> bool {
    matches!(&self.cur.kind, TokenKind::Punct("("))
      && self.paren_starts_type(file, scope)
  }

  /// Heuristic used to disambiguate `(T)expr` casts / `sizeof(T)` from a
  /// plain parenthesized expression: looks one token past the `(` without
  /// consuming anything (`TokenStream::peek` already threads macro
  /// expansion, §4.3).
  fn paren_starts_type(&self, file: &ResultFile, scope: ScopeId) -> bool {
    let mut probe = self.ts.clone();
    let mut scratch = DiagnosticSink::new();
    let next = probe.next(&mut scratch); // consumes the '(' in the clone
    match &next.kind {
      TokenKind::Keyword(
        "const" | "volatile" | "void" | "char" | "int" | "float" | "double" | "_Bool" | "bool"
        | "signed" | "unsigned" | "short" | "long" | "struct" | "union" | "enum" | "_Atomic",
      ) => true,
      TokenKind::Identifier(name, IdentKind::Plain) => {
        let name = ci_util::intern(name);
        file.lookup(scope, SymbolKind::Alias, name).is_some()
      }
      _ => false,
    }
  }

  fn parse_generic_selection(&mut self, file: &mut ResultFile, scope: ScopeId) -> ExprId {
    self.bump(); // `_Generic`
    self.expect_punct("(");
    let scrutinee = self.parse_expr_into(file, scope, 1);
    let mut arms = Vec::new();
    while self.eat_punct(",") {
      if self.eat_keyword("default") {
        self.expect_punct(":");
        let e = self.parse_expr_into(file, scope, 0);
        arms.push((None, e));
      } else {
        let ty = self.parse_type_name(file, scope);
        self.expect_punct(":");
        let e = self.parse_expr_into(file, scope, 0);
        arms.push((Some(ty), e));
      }
    }
    self.expect_punct(")");
    file.arenas.push_expr(Expr::Generic { scrutinee, arms })
  }

  fn parse_postfix(&mut self, file: &mut ResultFile, scope: ScopeId) -> ExprId {
    let mut e = self.parse_primary(file, scope);
    loop {
      if self.eat_punct("[") {
        let index = self.parse_expr_into(file, scope, 0);
        self.expect_punct("]");
        e = file.arenas.push_expr(Expr::ArrayAccess { array: e, index });
        continue;
      }
      if self.eat_punct("++") { e = file.arenas.push_expr(Expr::Unary { op: UnaryOp::PostInc, inner: e }); continue }
      if self.eat_punct("--") { e = file.arenas.push_expr(Expr::Unary { op: UnaryOp::PostDec, inner: e }); continue }
      break;
    }
    e
  }

  fn parse_primary(&mut self, file: &mut ResultFile, scope: ScopeId) -> ExprId {
    if self.eat_punct("(") {
      let inner = self.parse_expr_into(file, scope, 0);
      self.expect_punct(")");
      return file.arenas.push_expr(Expr::Grouping(inner));
    }
    if self.at_punct("{") { return self.parse_initializer(file, scope) }
    if let TokenKind::Literal(lit) = self.cur.kind.clone() {
      self.bump();
      return file.arenas.push_expr(literal_expr(lit));
    }
    if self.eat_keyword("nullptr") { return file.arenas.push_expr(Expr::Nullptr) }
    if let TokenKind::Identifier(name, _) = &self.cur.kind {
      let name = ci_util::intern(name);
      self.bump();
      if self.at_punct("(") || self.at_punct("<") {
        let called_generics = self.parse_called_generics(file, scope);
        if self.eat_punct("(") {
          let mut args = Vec::new();
          while !self.at_punct(")") && !self.at_eof() {
            args.push(self.parse_expr_into(file, scope, 1));
            if !self.eat_punct(",") { break }
          }
          self.expect_punct(")");
          return file.arenas.push_expr(if is_builtin_name(name) {
            Expr::FunctionCallBuiltin { builtin: name, args }
          } else {
            Expr::FunctionCall { callee: name, called_generics, args }
          });
        }
      }
      return file.arenas.push_expr(Expr::Identifier(name));
    }
    self.sink.push(Diagnostic::error(DiagKind::UnexpectedToken, self.loc()));
    self.bump();
    file.arenas.push_expr(Expr::Nullptr)
  }

  fn parse_initializer(&mut self, file: &mut ResultFile, scope: ScopeId) -> ExprId {
    self.expect_punct("{");
    let mut items = Vec::new();
    while !self.at_punct("}") && !self.at_eof() {
      let designator = self.parse_designator_path();
      let value = if self.at_punct("{") { self.parse_initializer(file, scope) } else { self.parse_expr_into(file, scope, 1) };
      items.push(InitializerItem { designator, value });
      if !self.eat_punct(",") { break }
    }
    self.expect_punct("}");
    file.arenas.push_expr(Expr::Initializer { items })
  }

  fn parse_designator_path(&mut self) -> Option<Vec<Designator>> {
    let mut path = Vec::new();
    loop {
      if self.eat_punct(".") {
        if let Some(name) = self.ident() { path.push(Designator { field: name }) }
        continue;
      }
      break;
    }
    if path.is_empty() { return None }
    if self.eat_punct("=") {}
    Some(path)
  }
}

fn literal_expr(lit: Literal) -> Expr {
  match lit {
    Literal::Bool(b) => Expr::Literal(LiteralValue::Bool(b)),
    Literal::Char(c) => Expr::Literal(LiteralValue::Char(c)),
    Literal::Str(s) => Expr::StringLiteral(s),
    Literal::Bytes(b) => Expr::StringLiteral(String::from_utf8_lossy(&b).into_owned()),
    Literal::Number(n) => {
      let v = i128::from_str_radix(n.digits.trim_start_matches("0x").trim_start_matches("0X"), n.radix as u32).unwrap_or(0);
      if n.is_float { Expr::Literal(LiteralValue::Float(n.digits.parse().unwrap_or(0.0))) }
      else { Expr::Literal(LiteralValue::SignedInt(v)) }
    }
    Literal::SignedInt(v, _) => Expr::Literal(LiteralValue::SignedInt(v)),
    Literal::UnsignedInt(v, _) => Expr::Literal(LiteralValue::UnsignedInt(v)),
    Literal::Float(v, _) => Expr::Literal(LiteralValue::Float(v)),
  }
}

fn is_builtin_name(name: Symbol) -> bool {
  matches!(name.as_str(), "__builtin_expect" | "__builtin_unreachable" | "__builtin_trap" | "va_arg" | "va_start" | "va_end")
}

const TOP_LEVEL_KEYWORDS: &[&str] = &["typedef", "struct", "union", "enum", "extern", "static", "void", "int", "char"];

#[cfg(test)]
mod tests {
  use super::*;
  use crate::preparser::Preparser;
  use crate::scanner::Scanner;
  use crate::source::SourceFile;
  use crate::token_stream::MacroTable;

  fn parse(src: &str) -> (ResultFile, DiagnosticSink) {
    let file = SourceFile::new("t.c", src);
    let mut sink = DiagnosticSink::new();
    let scanned = Scanner::new(&file, &Config::default()).scan(&mut sink);
    let grouped = Preparser::new(&mut sink).run(scanned);
    let ts = TokenStream::new(grouped, MacroTable::new());
    let mut rf = ResultFile::new(ci_util::intern("t.c"));
    {
      let mut parser = Parser::new(ts, &mut sink, Config::default());
      parser.parse_translation_unit(&mut rf);
    }
    (rf, sink)
  }

  #[test]
  fn simple_function_parses_to_one_decl() {
    let (rf, sink) = parse("int add(int a, int b) { return a + b; }");
    assert!(sink.is_empty(), "{sink:?}");
    assert_eq!(rf.decls.len(), 1);
    match &*rf.decls[0] {
      Decl::Function(f) => {
        assert_eq!(f.name.as_str(), "add");
        assert_eq!(f.params.len(), 2);
        assert!(f.body.is_some());
      }
      other => panic!("expected function, got {other:?}"),
    }
  }

  #[test]
  fn nested_declarator_pointer_to_array_of_function() {
    let (rf, sink) = parse("int (*arr[3])(int);");
    assert!(sink.is_empty(), "{sink:?}");
    match &*rf.decls[0] {
      Decl::Variable(v) => {
        match &v.ty {
          DataType::Array { element, size: ArraySize::Sized(Some(_)), .. } => {
            assert!(matches!(&**element, DataType::Ptr { inner, .. } if matches!(&**inner, DataType::Function(_))));
          }
          other => panic!("expected array of pointer to function, got {other:?}"),
        }
      }
      other => panic!("expected variable, got {other:?}"),
    }
  }

  #[test]
  fn pointer_returning_function_vs_pointer_to_function_are_distinct() {
    let (rf1, _) = parse("int *f(int);");
    let (rf2, _) = parse("int (*f)(int);");
    match &*rf1.decls[0] {
      Decl::Function(f) => assert!(matches!(f.return_type, DataType::Ptr { .. })),
      other => panic!("{other:?}"),
    }
    match &*rf2.decls[0] {
      Decl::Variable(v) => assert!(matches!(&v.ty, DataType::Ptr { inner, .. } if matches!(&**inner, DataType::Function(_)))),
      other => panic!("{other:?}"),
    }
  }

  #[test]
  fn typedef_then_const_variable() {
    let (rf, sink) = parse("typedef int Age; const Age a = 5;");
    assert!(sink.is_empty(), "{sink:?}");
    assert_eq!(rf.decls.len(), 2);
    assert!(matches!(&*rf.decls[0], Decl::Typedef(_)));
    match &*rf.decls[1] {
      Decl::Variable(v) => assert!(matches!(v.ty, DataType::PreConst(_))),
      other => panic!("{other:?}"),
    }
  }

  #[test]
  fn matching_prototype_then_definition_merges_into_one_declaration() {
    let (rf, sink) = parse("int add(int a, int b); int add(int a, int b) { return a + b; }");
    assert!(sink.is_empty(), "{sink:?}");
    assert_eq!(rf.decls.len(), 1, "merge must not leave the stale prototype around as its own decl");
    match &*rf.decls[0] {
      Decl::Function(f) => assert!(f.body.is_some() && !f.common.is_prototype),
      other => panic!("expected function, got {other:?}"),
    }
  }

  #[test]
  fn mismatched_redeclaration_signature_is_a_fatal_error() {
    let (_, sink) = parse("int add(int a, int b); int add(int a);");
    assert_eq!(sink.len(), 1, "{sink:?}");
    assert!(sink.has_fatal());
  }

  #[test]
  fn switch_with_case_and_default() {
    let (rf, sink) = parse("void f(int x) { switch (x) { case 1: break; default: break; } }");
    assert!(sink.is_empty(), "{sink:?}");
    assert_eq!(rf.decls.len(), 1);
  }

  #[test]
  fn generic_struct_declaration_and_instantiation() {
    let (rf, sink) = parse("struct Box<T> { T value; }; struct Box<int> b;");
    assert!(sink.is_empty(), "{sink:?}");
    assert_eq!(rf.decls.len(), 2);
    match &*rf.decls[0] {
      Decl::Struct(r) => assert_eq!(r.generic_params.as_deref(), Some(&[ci_util::intern("T")][..])),
      other => panic!("{other:?}"),
    }
    match &*rf.decls[1] {
      Decl::Variable(v) => match &v.ty {
        DataType::Struct(tr) => assert!(tr.called_generics.is_some()),
        other => panic!("{other:?}"),
      },
      other => panic!("{other:?}"),
    }
  }
}
