//! The JavaScript AST.
//!
//! Statements and expressions are tagged unions with the data boxed per
//! variant. `undefined`, `null`, `this` and `super` are cheap unit variants
//! shared by construction. Every node carries its source span for
//! diagnostics and source maps; synthesized nodes use `Span::DUMMY`.

use crate::import_record::ImportRecord;
use crate::part::Part;
use crate::scope::ScopeTree;
use crate::symbols::{Ref, Symbol};
use indexmap::IndexMap;
use kestrel_common::Span;
use rustc_hash::FxHashMap;

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone)]
pub struct Expr {
    pub span: Span,
    pub data: EData,
}

impl Expr {
    #[must_use]
    pub fn new(span: Span, data: EData) -> Expr {
        Expr { span, data }
    }

    /// A synthesized node with no source location.
    #[must_use]
    pub fn synth(data: EData) -> Expr {
        Expr {
            span: Span::DUMMY,
            data,
        }
    }

    #[must_use]
    pub fn undefined() -> Expr {
        Expr::synth(EData::Undefined)
    }

    #[must_use]
    pub fn ident(r: Ref, name: impl Into<String>) -> Expr {
        Expr::synth(EData::Ident(EIdent {
            name: name.into(),
            ref_: r,
        }))
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Expr {
        Expr::synth(EData::String(value.into()))
    }

    #[must_use]
    pub fn number(value: f64) -> Expr {
        Expr::synth(EData::Number(value))
    }

    /// `target.name` with no source location.
    #[must_use]
    pub fn dot(target: Expr, name: impl Into<String>) -> Expr {
        Expr::synth(EData::Dot(EDot {
            target: Box::new(target),
            name: name.into(),
            name_span: Span::DUMMY,
            optional_chain: OptionalChain::None,
        }))
    }

    /// `target(args...)` with no source location.
    #[must_use]
    pub fn call(target: Expr, args: Vec<Expr>) -> Expr {
        Expr::synth(EData::Call(ECall {
            target: Box::new(target),
            args,
            optional_chain: OptionalChain::None,
            is_direct_eval: false,
        }))
    }

    #[must_use]
    pub fn assign(target: Expr, value: Expr) -> Expr {
        Expr::synth(EData::Binary(EBinary {
            op: BinOp::Assign,
            left: Box::new(target),
            right: Box::new(value),
        }))
    }

    /// Whether evaluating this expression could have observable side
    /// effects. Conservative: unknown shapes answer `true`.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        match &self.data {
            EData::Undefined
            | EData::Null
            | EData::This
            | EData::Boolean(_)
            | EData::Number(_)
            | EData::BigInt(_)
            | EData::String(_)
            | EData::RegExp(_)
            | EData::Ident(_)
            | EData::ImportMeta
            | EData::NewTarget
            | EData::Function(_)
            | EData::Arrow(_) => false,
            EData::Template(t) => {
                t.tag.is_some() || t.parts.iter().any(|p| p.value.has_side_effects())
            }
            EData::Array(items) => items.iter().any(Expr::has_side_effects),
            EData::Object(props) => props.iter().any(|p| {
                p.kind == PropertyKind::Spread
                    || p.computed && p.key.has_side_effects()
                    || p.value.as_ref().is_some_and(Expr::has_side_effects)
            }),
            EData::Unary(u) => match u.op {
                UnOp::Typeof | UnOp::Void | UnOp::Not | UnOp::BitNot | UnOp::Pos | UnOp::Neg => {
                    u.value.has_side_effects()
                }
                _ => true,
            },
            EData::Binary(b) => {
                b.op.is_assign() || b.left.has_side_effects() || b.right.has_side_effects()
            }
            EData::Cond(c) => {
                c.test.has_side_effects() || c.yes.has_side_effects() || c.no.has_side_effects()
            }
            EData::Spread(e) => e.has_side_effects(),
            _ => true,
        }
    }
}

/// Position of a node inside an optional chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OptionalChain {
    /// Not part of a chain, or the chain already ended.
    #[default]
    None,
    /// The `?.` itself: `a?.b`
    Start,
    /// A plain link inside a chain: the `.c` of `a?.b.c`
    Continue,
}

#[derive(Debug, Clone)]
pub struct EIdent {
    pub name: String,
    /// Filled in by the binding pass; `Ref::INVALID` until then.
    pub ref_: Ref,
}

#[derive(Debug, Clone)]
pub struct EPrivateIdent {
    pub name: String,
    pub ref_: Ref,
}

#[derive(Debug, Clone)]
pub struct EDot {
    pub target: Box<Expr>,
    pub name: String,
    pub name_span: Span,
    pub optional_chain: OptionalChain,
}

#[derive(Debug, Clone)]
pub struct EIndex {
    pub target: Box<Expr>,
    pub index: Box<Expr>,
    pub optional_chain: OptionalChain,
}

#[derive(Debug, Clone)]
pub struct ECall {
    pub target: Box<Expr>,
    pub args: Vec<Expr>,
    pub optional_chain: OptionalChain,
    pub is_direct_eval: bool,
}

#[derive(Debug, Clone)]
pub struct ENew {
    pub target: Box<Expr>,
    pub args: Vec<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Typeof,
    Void,
    Delete,
    Not,
    BitNot,
    Pos,
    Neg,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

impl UnOp {
    #[must_use]
    pub const fn is_update(self) -> bool {
        matches!(self, UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            UnOp::Typeof => "typeof",
            UnOp::Void => "void",
            UnOp::Delete => "delete",
            UnOp::Not => "!",
            UnOp::BitNot => "~",
            UnOp::Pos => "+",
            UnOp::Neg => "-",
            UnOp::PreInc | UnOp::PostInc => "++",
            UnOp::PreDec | UnOp::PostDec => "--",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EUnary {
    pub op: UnOp,
    pub value: Box<Expr>,
}

/// Binary operators, including assignments and comma, ordered by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Comma,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    RemAssign,
    PowAssign,
    ShlAssign,
    ShrAssign,
    UShrAssign,
    BitAndAssign,
    BitOrAssign,
    BitXorAssign,
    LogicalAndAssign,
    LogicalOrAssign,
    NullishAssign,
    NullishCoalescing,
    LogicalOr,
    LogicalAnd,
    BitOr,
    BitXor,
    BitAnd,
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Instanceof,
    Shl,
    Shr,
    UShr,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinOp {
    #[must_use]
    pub const fn is_assign(self) -> bool {
        matches!(
            self,
            BinOp::Assign
                | BinOp::AddAssign
                | BinOp::SubAssign
                | BinOp::MulAssign
                | BinOp::DivAssign
                | BinOp::RemAssign
                | BinOp::PowAssign
                | BinOp::ShlAssign
                | BinOp::ShrAssign
                | BinOp::UShrAssign
                | BinOp::BitAndAssign
                | BinOp::BitOrAssign
                | BinOp::BitXorAssign
                | BinOp::LogicalAndAssign
                | BinOp::LogicalOrAssign
                | BinOp::NullishAssign
        )
    }

    /// For compound assignments, the underlying binary operator.
    #[must_use]
    pub const fn assign_base(self) -> Option<BinOp> {
        Some(match self {
            BinOp::AddAssign => BinOp::Add,
            BinOp::SubAssign => BinOp::Sub,
            BinOp::MulAssign => BinOp::Mul,
            BinOp::DivAssign => BinOp::Div,
            BinOp::RemAssign => BinOp::Rem,
            BinOp::PowAssign => BinOp::Pow,
            BinOp::ShlAssign => BinOp::Shl,
            BinOp::ShrAssign => BinOp::Shr,
            BinOp::UShrAssign => BinOp::UShr,
            BinOp::BitAndAssign => BinOp::BitAnd,
            BinOp::BitOrAssign => BinOp::BitOr,
            BinOp::BitXorAssign => BinOp::BitXor,
            BinOp::LogicalAndAssign => BinOp::LogicalAnd,
            BinOp::LogicalOrAssign => BinOp::LogicalOr,
            BinOp::NullishAssign => BinOp::NullishCoalescing,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BinOp::Comma => ",",
            BinOp::Assign => "=",
            BinOp::AddAssign => "+=",
            BinOp::SubAssign => "-=",
            BinOp::MulAssign => "*=",
            BinOp::DivAssign => "/=",
            BinOp::RemAssign => "%=",
            BinOp::PowAssign => "**=",
            BinOp::ShlAssign => "<<=",
            BinOp::ShrAssign => ">>=",
            BinOp::UShrAssign => ">>>=",
            BinOp::BitAndAssign => "&=",
            BinOp::BitOrAssign => "|=",
            BinOp::BitXorAssign => "^=",
            BinOp::LogicalAndAssign => "&&=",
            BinOp::LogicalOrAssign => "||=",
            BinOp::NullishAssign => "??=",
            BinOp::NullishCoalescing => "??",
            BinOp::LogicalOr => "||",
            BinOp::LogicalAnd => "&&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::LooseEq => "==",
            BinOp::LooseNe => "!=",
            BinOp::StrictEq => "===",
            BinOp::StrictNe => "!==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::In => "in",
            BinOp::Instanceof => "instanceof",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::UShr => ">>>",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EBinary {
    pub op: BinOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ECond {
    pub test: Box<Expr>,
    pub yes: Box<Expr>,
    pub no: Box<Expr>,
}

#[derive(Debug, Clone)]
pub struct ETemplatePart {
    pub value: Expr,
    pub cooked: String,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct ETemplate {
    pub tag: Option<Box<Expr>>,
    /// Tag call inside an optional chain forwards `this` via `.call`.
    pub tag_was_optional_chain: bool,
    pub head_cooked: String,
    pub head_raw: String,
    pub parts: Vec<ETemplatePart>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Normal,
    Get,
    Set,
    Spread,
}

#[derive(Debug, Clone)]
pub struct Property {
    pub kind: PropertyKind,
    pub key: Expr,
    pub value: Option<Expr>,
    pub computed: bool,
    pub shorthand: bool,
    pub method: bool,
}

#[derive(Debug, Clone)]
pub struct EImportCall {
    pub expr: Box<Expr>,
    pub options: Option<Box<Expr>>,
    /// Set when the argument is a string literal that became a record.
    pub import_record_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct EYield {
    pub value: Option<Box<Expr>>,
    pub is_star: bool,
}

#[derive(Debug, Clone)]
pub enum EData {
    // Shared singletons
    Undefined,
    Null,
    This,
    Super,

    Boolean(bool),
    Number(f64),
    BigInt(String),
    String(String),
    RegExp(String),
    Ident(EIdent),
    PrivateIdent(EPrivateIdent),
    ImportMeta,
    NewTarget,

    Array(Vec<Expr>),
    Object(Vec<Property>),
    Spread(Box<Expr>),
    Template(ETemplate),

    Dot(EDot),
    Index(EIndex),
    Call(ECall),
    New(ENew),
    Unary(EUnary),
    Binary(EBinary),
    Cond(ECond),
    Arrow(Box<EArrow>),
    Function(Box<Func>),
    Class(Box<Class>),
    Await(Box<Expr>),
    Yield(EYield),
    ImportCall(EImportCall),
    /// `require("literal")` rewritten to a record reference.
    RequireString { import_record_index: u32 },
    /// `require.resolve("literal")` rewritten to a record reference.
    RequireResolveString { import_record_index: u32 },
}

// =============================================================================
// Functions, classes, bindings
// =============================================================================

#[derive(Debug, Clone)]
pub struct Arg {
    pub binding: Binding,
    pub default: Option<Expr>,
    pub is_rest: bool,
    /// TypeScript parameter decorators, erased except for `__decorateParam`.
    pub decorators: Vec<Expr>,
}

#[derive(Debug, Clone)]
pub struct Func {
    pub name: Option<EIdent>,
    pub args: Vec<Arg>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
    pub is_generator: bool,
    /// Body uses `arguments`; async lowering must forward it.
    pub uses_arguments: bool,
}

#[derive(Debug, Clone)]
pub enum ArrowBody {
    Expr(Box<Expr>),
    Stmts(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub struct EArrow {
    pub args: Vec<Arg>,
    pub body: ArrowBody,
    pub is_async: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClassPropertyKind {
    Method,
    Get,
    Set,
    Field,
    /// `accessor x = ...`
    Accessor,
    StaticBlock,
}

#[derive(Debug, Clone)]
pub struct ClassProperty {
    pub kind: ClassPropertyKind,
    pub is_static: bool,
    pub is_computed: bool,
    pub key: Expr,
    /// Method/accessor body.
    pub func: Option<Func>,
    /// Field initializer.
    pub initializer: Option<Expr>,
    /// Static block statements.
    pub block: Vec<Stmt>,
    pub decorators: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: Option<EIdent>,
    pub extends: Option<Box<Expr>>,
    pub properties: Vec<ClassProperty>,
    pub decorators: Vec<Expr>,
}

/// Declaration binding patterns. Assignment targets reuse `Expr`.
#[derive(Debug, Clone)]
pub enum Binding {
    Ident(EIdent),
    Array {
        items: Vec<Option<ArrayBindingItem>>,
        rest: Option<Box<Binding>>,
    },
    Object {
        properties: Vec<ObjectBindingProperty>,
        rest: Option<Box<Binding>>,
    },
}

#[derive(Debug, Clone)]
pub struct ArrayBindingItem {
    pub binding: Binding,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ObjectBindingProperty {
    pub key: Expr,
    pub computed: bool,
    pub binding: Binding,
    pub default: Option<Expr>,
}

impl Binding {
    /// Visit every identifier declared by this pattern.
    pub fn each_ident<'a>(&'a self, f: &mut impl FnMut(&'a EIdent)) {
        match self {
            Binding::Ident(id) => f(id),
            Binding::Array { items, rest } => {
                for item in items.iter().flatten() {
                    item.binding.each_ident(f);
                }
                if let Some(rest) = rest {
                    rest.each_ident(f);
                }
            }
            Binding::Object { properties, rest } => {
                for prop in properties {
                    prop.binding.each_ident(f);
                }
                if let Some(rest) = rest {
                    rest.each_ident(f);
                }
            }
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

#[derive(Debug, Clone)]
pub struct Stmt {
    pub span: Span,
    pub data: SData,
}

impl Stmt {
    #[must_use]
    pub fn new(span: Span, data: SData) -> Stmt {
        Stmt { span, data }
    }

    #[must_use]
    pub fn synth(data: SData) -> Stmt {
        Stmt {
            span: Span::DUMMY,
            data,
        }
    }

    /// An expression statement with no source location.
    #[must_use]
    pub fn expr(e: Expr) -> Stmt {
        Stmt::synth(SData::Expr(e))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalKind {
    Var,
    Let,
    Const,
    Using,
    AwaitUsing,
}

impl LocalKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LocalKind::Var => "var",
            LocalKind::Let => "let",
            LocalKind::Const => "const",
            LocalKind::Using => "using",
            LocalKind::AwaitUsing => "await using",
        }
    }

    #[must_use]
    pub const fn is_using(self) -> bool {
        matches!(self, LocalKind::Using | LocalKind::AwaitUsing)
    }
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub binding: Binding,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct SLocal {
    pub kind: LocalKind,
    pub decls: Vec<Decl>,
    pub is_export: bool,
}

#[derive(Debug, Clone)]
pub struct Catch {
    pub binding: Option<Binding>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub value: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// One name in an import/export clause: `orig as alias`.
#[derive(Debug, Clone)]
pub struct ClauseItem {
    /// The exported/imported name as visible to other modules.
    pub alias: String,
    pub alias_span: Span,
    pub original_name: String,
    pub name_ref: Ref,
}

#[derive(Debug, Clone)]
pub struct SImport {
    pub import_record_index: u32,
    pub default_name: Option<EIdent>,
    pub star_name: Option<EIdent>,
    pub items: Vec<ClauseItem>,
    /// `import "./x"` with no clause.
    pub is_bare: bool,
}

#[derive(Debug, Clone)]
pub struct SExportNamed {
    pub items: Vec<ClauseItem>,
    /// Set for `export {...} from "path"`.
    pub import_record_index: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum ExportDefaultValue {
    Expr(Expr),
    Func(Func),
    Class(Class),
}

#[derive(Debug, Clone)]
pub struct SExportDefault {
    pub value: ExportDefaultValue,
    /// The synthesized `default` symbol.
    pub default_ref: Ref,
}

#[derive(Debug, Clone)]
pub struct SExportStar {
    pub import_record_index: u32,
    /// `export * as ns from "path"`.
    pub alias: Option<(String, Ref)>,
}

#[derive(Debug, Clone)]
pub struct EnumMember {
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone)]
pub enum SData {
    Block(Vec<Stmt>),
    Empty,
    Debugger,
    Directive(String),
    Expr(Expr),
    If {
        test: Expr,
        yes: Box<Stmt>,
        no: Option<Box<Stmt>>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        init: Box<Stmt>,
        value: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        is_await: bool,
        init: Box<Stmt>,
        value: Expr,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        test: Expr,
        body: Box<Stmt>,
    },
    With {
        value: Expr,
        body: Box<Stmt>,
    },
    Switch {
        test: Expr,
        cases: Vec<SwitchCase>,
    },
    Try {
        block: Vec<Stmt>,
        catch: Option<Catch>,
        finally: Option<Vec<Stmt>>,
    },
    Return(Option<Expr>),
    Throw(Expr),
    Break(Option<(String, Ref)>),
    Continue(Option<(String, Ref)>),
    Label {
        name: String,
        ref_: Ref,
        stmt: Box<Stmt>,
    },
    Local(SLocal),
    Function {
        func: Func,
        is_export: bool,
        /// Declared name's symbol; also in `func.name`.
        name_ref: Ref,
    },
    Class {
        class: Class,
        is_export: bool,
        name_ref: Ref,
    },
    Import(SImport),
    ExportNamed(SExportNamed),
    ExportDefault(SExportDefault),
    ExportStar(SExportStar),
    /// TypeScript `enum`, kept until lowering.
    Enum {
        name: String,
        name_ref: Ref,
        members: Vec<EnumMember>,
        is_export: bool,
    },
    /// TypeScript `namespace` with value declarations, kept until lowering.
    Namespace {
        name: String,
        name_ref: Ref,
        body: Vec<Stmt>,
        is_export: bool,
    },
    /// A TypeScript declaration that fully compiles away (interface, type
    /// alias, declare block, import-equals of a type).
    TsErased,
}

// =============================================================================
// The per-file AST bundle
// =============================================================================

/// How a module's exports work, decided during parsing and linking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportsKind {
    /// No visible exports syntax.
    #[default]
    None,
    /// Has ESM import/export syntax.
    Esm,
    /// Uses `exports` or `module.exports`.
    CommonJs,
}

#[derive(Debug, Clone)]
pub struct NamedImport {
    pub alias: String,
    pub alias_span: Span,
    pub import_record_index: u32,
    /// `import * as ns` — matters for ambiguity checks.
    pub is_star: bool,
}

#[derive(Debug, Clone)]
pub struct NamedExport {
    pub ref_: Ref,
    pub alias_span: Span,
}

/// Everything the parser produces for one file.
#[derive(Debug, Default)]
pub struct Ast {
    pub parts: Vec<Part>,
    /// This file's inner symbol array.
    pub symbols: Vec<Symbol>,
    pub scopes: Option<ScopeTree>,
    pub import_records: Vec<ImportRecord>,

    /// Imported bindings: local ref -> (alias, record).
    pub named_imports: IndexMap<Ref, NamedImport>,
    /// Exported names: alias -> local ref.
    pub named_exports: IndexMap<String, NamedExport>,
    /// Record indices of `export * from` statements.
    pub export_star_import_records: Vec<u32>,
    /// Top-level symbol -> indices of parts declaring it.
    pub top_level_symbol_to_parts: FxHashMap<Ref, Vec<u32>>,

    pub exports_kind: ExportsKind,
    /// Synthesized module-shape symbols.
    pub exports_ref: Ref,
    pub module_ref: Ref,
    pub wrapper_ref: Ref,
    pub uses_exports_ref: bool,
    pub uses_module_ref: bool,

    pub top_level_await_span: Option<Span>,
    pub hashbang: Option<String>,
    /// Identifier character frequencies for the minifier.
    pub char_freq: Option<[u32; 64]>,
    /// Names used as capitalized JSX tags in this file.
    pub jsx_component_names: Vec<String>,
    /// Runtime helpers referenced by lowering: helper name -> the local
    /// injected symbol. The linker merges these with the runtime module's
    /// exports so only referenced helpers survive tree shaking.
    pub runtime_imports: IndexMap<String, Ref>,
}

impl Ast {
    /// Look up a top-level statement count across parts (mostly for tests).
    #[must_use]
    pub fn stmt_count(&self) -> usize {
        self.parts.iter().map(|p| p.stmts.len()).sum()
    }
}
