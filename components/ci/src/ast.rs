//! The AST (§3): data types, declarations, expressions, statements and
//! function-body items, plus the stable ids that index into a
//! [`crate::scope::ResultFile`]'s arenas.
//!
//! Declarations are heap-boxed (they already carry a stable id, per the
//! "Cyclic structures in the AST" design note); expression and statement
//! trees live in per-unit arenas and are referenced by [`ExprId`]/[`StmtId`]
//! so that monomorphization's deep-substitution can clone a subtree by
//! cloning a handful of small indices instead of a tree of boxes.

use bitflags::bitflags;
use ci_util::{mk_idx, ArenaVec, Symbol};

mk_idx! {
  /// A scope within one translation unit (§3 "Scope"). Unique within the
  /// unit; the parent chain formed by [`crate::scope::Scope::parent`] is
  /// acyclic (§8 "Scope id uniqueness").
  pub struct ScopeId;
}
mk_idx! {
  /// A declaration's stable id within its scope, used to order emission
  /// and to look up bodies (§3 "Declaration").
  pub struct DeclId;
}
mk_idx! {
  /// An index into a [`Arenas::exprs`] arena.
  pub struct ExprId;
}
mk_idx! {
  /// An index into a [`Arenas::stmts`] arena.
  pub struct StmtId;
}

/// Owns every expression/statement node of one translation unit. Declarations
/// reference into this by [`ExprId`]/[`StmtId`]; the monomorphizer appends new
/// nodes here when it substitutes a template's body.
#[derive(Clone, Default, Debug)]
pub struct Arenas {
  pub exprs: ArenaVec<ExprId, Expr>,
  pub stmts: ArenaVec<StmtId, Stmt>,
}

impl Arenas {
  #[must_use] pub fn new() -> Self { Self::default() }
  pub fn push_expr(&mut self, e: Expr) -> ExprId { self.exprs.push(e) }
  pub fn push_stmt(&mut self, s: Stmt) -> StmtId { self.stmts.push(s) }
}

bitflags! {
  /// The orthogonal qualifier bitmask (§3 "Data type": "qualifier bitmask").
  /// `const`-ness is tracked separately as [`DataType::PreConst`]/`PostConst`
  /// so the emitter can preserve `const T` vs. `T const`.
  #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
  pub struct Qualifiers: u8 {
    const RESTRICT = 1 << 0;
    const VOLATILE = 1 << 1;
    const ATOMIC   = 1 << 2;
  }
}

bitflags! {
  #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
  pub struct StorageClass: u8 {
    const TYPEDEF       = 1 << 0;
    const EXTERN        = 1 << 1;
    const STATIC         = 1 << 2;
    const THREAD_LOCAL   = 1 << 3;
    const AUTO           = 1 << 4;
    const REGISTER       = 1 << 5;
    const CONSTEXPR      = 1 << 6;
    const INLINE         = 1 << 7;
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum IntKind { Char, SChar, UChar, Short, UShort, Int, UInt, Long, ULong, LongLong, ULongLong }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FloatKind { Float, Double, LongDouble }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DecimalKind { D32, D64, D128 }

/// Primitive scalar kinds (§3: "primitive kinds"). `_Complex`/`_Imaginary`
/// apply only to [`FloatKind`]s and are tracked as a separate flag rather
/// than doubling the variant count.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Primitive {
  Bool,
  Int(IntKind),
  Float { kind: FloatKind, complex: bool, imaginary: bool },
  Decimal(DecimalKind),
  Void,
  NullptrT,
}

/// `[[name]]`/`[[name(arg)]]` or a passthrough GNU attribute (§6, §F.7).
#[derive(Clone, PartialEq, Debug)]
pub enum Attribute {
  Deprecated(Option<String>),
  Fallthrough,
  MaybeUnused,
  Nodiscard(Option<String>),
  Noreturn,
  Unsequenced,
  Reproducible,
  /// `__attribute__((...))`-style GNU attribute, reprinted verbatim
  /// (§F.7): the frontend does not interpret it.
  Gnu(String),
}

/// A function parameter: a normal typed parameter, or the variadic `...`
/// sentinel that must appear last (§3 "function": "each param normal or
/// variadic-sentinel").
#[derive(Clone, PartialEq, Debug)]
pub enum Param {
  Normal { name: Option<Symbol>, ty: DataType },
  Variadic,
}

#[derive(Clone, PartialEq, Debug)]
pub struct FunctionType {
  pub name: Option<Symbol>,
  pub params: Vec<Param>,
  pub return_type: Box<DataType>,
  pub generic_params: Option<Vec<Symbol>>,
}

/// A named reference to an enum/struct/union tag, with the optional
/// `<...>` type-argument list used at generic instantiation sites
/// (§3: "named enum/struct/union").
#[derive(Clone, PartialEq, Debug)]
pub struct TagRef {
  pub tag: Option<Symbol>,
  pub called_generics: Option<Vec<DataType>>,
}

/// The discriminated union covering every structural form a C data type can
/// take (§3 "Data type"). Every type has exactly one structural form; a
/// function type is only ever printed through the emitter's dedicated
/// declarator path, never the base-type recursion (§3 invariant).
#[derive(Clone, PartialEq, Debug)]
pub enum DataType {
  Primitive(Primitive),
  /// `_Atomic(T)`.
  Atomic(Box<DataType>),
  /// `const T` — the qualifier precedes the base type in source order.
  PreConst(Box<DataType>),
  /// `T const` — the qualifier follows the base type in source order.
  PostConst(Box<DataType>),
  /// `restrict`/`volatile` qualifiers orthogonal to const-ness.
  Qualified { inner: Box<DataType>, quals: Qualifiers },
  Ptr { inner: Box<DataType>, name: Option<Symbol>, quals: Qualifiers },
  Array {
    element: Box<DataType>,
    size: ArraySize,
    name: Option<Symbol>,
    is_static: bool,
    quals: Qualifiers,
  },
  Function(Box<FunctionType>),
  Enum(TagRef),
  Struct(TagRef),
  Union(TagRef),
  /// A typedef reference, optionally called with concrete type arguments
  /// at a generic instantiation site (`name<int, float>`).
  Typedef { name: Symbol, called_generics: Option<Vec<DataType>> },
  Builtin(u32),
  /// An unresolved generic type variable (`T`, `U`, ...) inside a
  /// template's body, substituted away by the monomorphizer.
  GenericVar(Symbol),
  /// Used only by builtins/typechecker (§3): accepts any actual argument.
  Any,
}

/// Whether an array declarator carries an explicit size (§3 "array":
/// "sized/unsized tag, optional size expression").
#[derive(Clone, PartialEq, Debug)]
pub enum ArraySize {
  Unsized,
  Sized(Option<ExprId>),
}

impl DataType {
  #[must_use] pub fn void() -> Self { DataType::Primitive(Primitive::Void) }
  #[must_use] pub fn int() -> Self { DataType::Primitive(Primitive::Int(IntKind::Int)) }

  /// Strip `_Atomic`/const/qualifier wrappers to reach the underlying
  /// structural type, the way the resolver's predicates do (§4.6).
  #[must_use] pub fn unwrap_quals(&self) -> &DataType {
    match self {
      DataType::Atomic(inner) | DataType::PreConst(inner) | DataType::PostConst(inner)
      | DataType::Qualified { inner, .. } => inner.unwrap_quals(),
      other => other,
    }
  }
}

/// One field of a struct/union body (§F.5: optional bit-width on named
/// fields; §9: anonymous nested struct/union carries a parent back-edge as
/// an index into the enclosing field list, not an owning reference).
#[derive(Clone, PartialEq, Debug)]
pub enum Field {
  Named { name: Symbol, ty: DataType, bit_width: Option<ExprId> },
  /// An anonymous nested struct/union; `parent_index` is this field's own
  /// position in the enclosing `fields` vector, so the cyclic "child knows
  /// its parent" link never needs an owning back-reference.
  AnonymousRecord { is_union: bool, fields: Vec<Field>, parent_index: usize },
}

#[derive(Clone, PartialEq, Debug)]
pub struct EnumVariant {
  pub name: Symbol,
  pub discriminant: Option<ExprId>,
}

/// A generic template's concrete instantiation back-pointer: the template
/// declaration's id plus the argument tuple that produced this specialized
/// copy (§3 "`*-gen`" kinds, §4.8).
#[derive(Clone, PartialEq, Debug)]
pub struct GenericInstance {
  pub template: DeclId,
  pub args: Vec<DataType>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct FunctionItem {
  pub kind: FunctionItemKind,
  pub scope: ScopeId,
}

#[derive(Clone, PartialEq, Debug)]
pub enum FunctionItemKind {
  Decl(DeclId),
  Expr(ExprId),
  Stmt(StmtId),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Designator {
  pub field: Symbol,
}

#[derive(Clone, PartialEq, Debug)]
pub struct InitializerItem {
  pub designator: Option<Vec<Designator>>,
  pub value: ExprId,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BinaryOp {
  Add, Sub, Mul, Div, Mod,
  BitAnd, BitOr, BitXor, Shl, Shr,
  LogAnd, LogOr,
  Eq, Ne, Lt, Le, Gt, Ge,
  Assign, AddAssign, SubAssign, MulAssign, DivAssign, ModAssign,
  AndAssign, OrAssign, XorAssign, ShlAssign, ShrAssign,
  Member, Arrow,
}

impl BinaryOp {
  #[must_use] pub fn is_assignment(self) -> bool {
    matches!(self, BinaryOp::Assign | BinaryOp::AddAssign | BinaryOp::SubAssign
      | BinaryOp::MulAssign | BinaryOp::DivAssign | BinaryOp::ModAssign
      | BinaryOp::AndAssign | BinaryOp::OrAssign | BinaryOp::XorAssign
      | BinaryOp::ShlAssign | BinaryOp::ShrAssign)
  }
  #[must_use] pub fn is_member_access(self) -> bool {
    matches!(self, BinaryOp::Member | BinaryOp::Arrow)
  }
  #[must_use] pub fn is_bitwise_or_shift(self) -> bool {
    matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr)
  }
  #[must_use] pub fn is_logical(self) -> bool { matches!(self, BinaryOp::LogAnd | BinaryOp::LogOr) }
  #[must_use] pub fn is_comparison(self) -> bool {
    matches!(self, BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
  }
  #[must_use] pub fn as_str(self) -> &'static str {
    use BinaryOp::*;
    match self {
      Add => "+", Sub => "-", Mul => "*", Div => "/", Mod => "%",
      BitAnd => "&", BitOr => "|", BitXor => "^", Shl => "<<", Shr => ">>",
      LogAnd => "&&", LogOr => "||",
      Eq => "==", Ne => "!=", Lt => "<", Le => "<=", Gt => ">", Ge => ">=",
      Assign => "=", AddAssign => "+=", SubAssign => "-=", MulAssign => "*=", DivAssign => "/=", ModAssign => "%=",
      AndAssign => "&=", OrAssign => "|=", XorAssign => "^=", ShlAssign => "<<=", ShrAssign => ">>=",
      Member => ".", Arrow => "->",
    }
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum UnaryOp { PreInc, PreDec, PostInc, PostDec, Plus, Minus, BitNot, LogNot, Deref, AddrOf }

impl UnaryOp {
  #[must_use] pub fn is_postfix(self) -> bool { matches!(self, UnaryOp::PostInc | UnaryOp::PostDec) }
  #[must_use] pub fn as_str(self) -> &'static str {
    use UnaryOp::*;
    match self {
      PreInc | PostInc => "++", PreDec | PostDec => "--",
      Plus => "+", Minus => "-", BitNot => "~", LogNot => "!", Deref => "*", AddrOf => "&",
    }
  }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LiteralValue {
  Bool(bool),
  Char(char),
  Float(f64),
  SignedInt(i128),
  UnsignedInt(u128),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
  Alignof(DataType),
  ArrayAccess { array: ExprId, index: ExprId },
  Binary { op: BinaryOp, left: ExprId, right: ExprId },
  Cast { target: DataType, inner: ExprId },
  /// A data type used as a value, for `sizeof(T)` and `_Generic` arms
  /// (§3 "data-type-as-value", §F.6).
  DataTypeAsValue(DataType),
  FunctionCall { callee: Symbol, called_generics: Option<Vec<DataType>>, args: Vec<ExprId> },
  FunctionCallBuiltin { builtin: Symbol, args: Vec<ExprId> },
  Generic { scrutinee: ExprId, arms: Vec<(Option<DataType>, ExprId)> },
  Grouping(ExprId),
  Identifier(Symbol),
  Initializer { items: Vec<InitializerItem> },
  Literal(LiteralValue),
  StringLiteral(String),
  Nullptr,
  Sizeof(ExprId),
  Ternary { cond: ExprId, if_true: ExprId, if_false: ExprId },
  Unary { op: UnaryOp, inner: ExprId },
}

#[derive(Clone, PartialEq, Debug)]
pub struct IfBranch {
  pub cond: ExprId,
  pub body: StmtId,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Stmt {
  Block { scope: ScopeId, items: Vec<FunctionItem> },
  Break,
  Case(ExprId),
  Continue,
  Default,
  DoWhile { body: StmtId, cond: ExprId },
  For { init: Vec<FunctionItem>, cond: Option<ExprId>, step: Vec<ExprId>, body: StmtId, scope: ScopeId },
  Goto(Symbol),
  If { branches: Vec<IfBranch>, else_body: Option<StmtId> },
  Return(Option<ExprId>),
  Switch { scrutinee: ExprId, body: StmtId },
  While { cond: ExprId, body: StmtId },
}

/// The shared prefix of every [`Decl`] (§3 "Declaration").
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DeclCommon {
  pub storage: StorageClass,
  pub is_prototype: bool,
  pub typedef_name: Option<Symbol>,
  pub attributes: Vec<Attribute>,
  /// A contiguous run of `///`/`/**` doc comments immediately preceding
  /// this declaration (§F.1), re-printed above its definition only.
  pub doc_comment: Option<String>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct EnumDecl {
  pub common: DeclCommon,
  pub name: Option<Symbol>,
  pub underlying: Option<DataType>,
  pub variants: Vec<EnumVariant>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct RecordDecl {
  pub common: DeclCommon,
  pub name: Option<Symbol>,
  pub generic_params: Option<Vec<Symbol>>,
  pub fields: Option<Vec<Field>>,
}

/// A monomorphized specialization of a generic struct/union/typedef/function
/// (§3 "`*-gen`" kinds, §4.8). `mangled_name` is the deterministic symbol
/// this specialization is emitted under.
#[derive(Clone, PartialEq, Debug)]
pub struct GenDecl {
  pub mangled_name: Symbol,
  pub instance: GenericInstance,
  pub kind: GenDeclKind,
}

#[derive(Clone, PartialEq, Debug)]
pub enum GenDeclKind {
  Struct(RecordDecl),
  Union(RecordDecl),
  Typedef(DataType),
  Function(Box<FunctionDecl>),
}

#[derive(Clone, PartialEq, Debug)]
pub struct TypedefDecl {
  pub common: DeclCommon,
  pub name: Symbol,
  pub generic_params: Option<Vec<Symbol>>,
  pub aliased: DataType,
}

#[derive(Clone, PartialEq, Debug)]
pub struct FunctionDecl {
  pub common: DeclCommon,
  pub name: Symbol,
  pub return_type: DataType,
  pub params: Vec<Param>,
  pub body: Option<(ScopeId, Vec<FunctionItem>)>,
  pub generic_params: Option<Vec<Symbol>>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct VariableDecl {
  pub common: DeclCommon,
  pub name: Symbol,
  pub ty: DataType,
  pub initializer: Option<ExprId>,
  pub is_local: bool,
}

#[derive(Clone, PartialEq, Debug)]
pub enum Decl {
  Enum(EnumDecl),
  Struct(RecordDecl),
  Union(RecordDecl),
  StructGen(GenDecl),
  UnionGen(GenDecl),
  TypedefGen(GenDecl),
  FunctionGen(GenDecl),
  Typedef(TypedefDecl),
  Function(FunctionDecl),
  Label { common: DeclCommon, name: Symbol },
  Variable(VariableDecl),
}

impl Decl {
  #[must_use] pub fn common(&self) -> &DeclCommon {
    match self {
      Decl::Enum(d) => &d.common,
      Decl::Struct(d) | Decl::Union(d) => &d.common,
      Decl::StructGen(d) | Decl::UnionGen(d) | Decl::TypedefGen(d) | Decl::FunctionGen(d) => match &d.kind {
        GenDeclKind::Struct(r) | GenDeclKind::Union(r) => &r.common,
        GenDeclKind::Typedef(_) => const_empty_common(),
        GenDeclKind::Function(f) => &f.common,
      },
      Decl::Typedef(d) => &d.common,
      Decl::Function(d) => &d.common,
      Decl::Label { common, .. } => common,
      Decl::Variable(d) => &d.common,
    }
  }

  #[must_use] pub fn name(&self) -> Option<Symbol> {
    match self {
      Decl::Enum(d) => d.name,
      Decl::Struct(d) | Decl::Union(d) => d.name,
      Decl::StructGen(d) | Decl::UnionGen(d) | Decl::TypedefGen(d) | Decl::FunctionGen(d) => Some(d.mangled_name),
      Decl::Typedef(d) => Some(d.name),
      Decl::Function(d) => Some(d.name),
      Decl::Label { name, .. } => Some(*name),
      Decl::Variable(d) => Some(d.name),
    }
  }
}

fn const_empty_common() -> &'static DeclCommon {
  use std::sync::OnceLock;
  static EMPTY: OnceLock<DeclCommon> = OnceLock::new();
  EMPTY.get_or_init(DeclCommon::default)
}
