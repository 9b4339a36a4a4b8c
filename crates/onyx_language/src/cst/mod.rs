//! The Onyx Concrete Syntax Tree. Nodes keep their original tokens, so a
//! tree prints back to source text up to whitespace normalization; block
//! nodes remember their brace style and multi-line-ness for that purpose.

mod print;

use onyx_base::{Placement, Safety, UnitId};

use crate::token::{Keyword, Token, TokenKind};

/// The CST root of a single Onyx unit.
#[derive(Debug, Default)]
pub struct Root {
    pub children: Vec<Node>,
}

/// Anything that may appear in the root or inside a block. The root-only
/// restriction on directives is enforced by the parser, not the tree.
#[derive(Debug)]
pub enum Node {
    EmptyLine(EmptyLine),
    Comment(Comment),
    Extern(Extern),
    Import(Import),
    Export(Export),
    Alias(Alias),
    VarDef(Box<VarDef>),
    FuncDecl(Box<FuncDecl>),
    TypeDef(Box<TypeDef>),
    If(Box<If>),
    While(Box<While>),
    Switch(Box<Switch>),
    Return(Box<Return>),
    Block(Box<Block>),
    Expr(RVal),
}

/// A blank source line, preserved so reprinting keeps the spacing as a
/// yes/no property.
#[derive(Debug)]
pub struct EmptyLine {
    /// The newline token whose placement spans the blank run.
    pub token: Token,
}

/// One or more adjacent comment lines.
#[derive(Debug, Clone)]
pub struct Comment {
    pub tokens: Vec<Token>,
}

impl Comment {
    /// The compiled documentation text, line values joined with newlines.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, token) in self.tokens.iter().enumerate() {
            if let TokenKind::Comment(value) = &token.kind {
                if i > 0 {
                    out.push('\n');
                }
                out.push_str(value);
            }
        }
        out
    }
}

/// An `extern` directive imprinting raw C code via a virtual block unit.
/// Both the bare form (`extern int f();`, single prototype) and the braced
/// form (`extern "C" { … }`) are preserved.
#[derive(Debug)]
pub struct Extern {
    pub keyword: Token,
    /// The optional ABI string literal, e.g. `"C"`.
    pub abi: Option<Token>,
    /// The brace tokens of the braced form.
    pub braces: Option<(Token, Token)>,
    /// The virtual C block unit registered in the source map.
    pub block_unit: UnitId,
    /// The C CST parsed out of the block.
    pub block: crate::c::cst::Root,
}

/// An `import` directive. Supported forms:
/// `import T from "p"`, `import * as T from "p"`, `import { T } from "p"`,
/// `import { T as U } from "p"`.
#[derive(Debug)]
pub struct Import {
    pub keyword: Token,
    pub elements: Vec<ImportElement>,
    pub from_keyword: Token,
    /// The string literal path token.
    pub path: Token,
}

impl Import {
    pub fn path_value(&self) -> &str {
        match &self.path.kind {
            TokenKind::Str(value) => value,
            _ => "",
        }
    }
}

#[derive(Debug)]
pub struct ImportElement {
    /// Extracted elements were written inside `{ … }`.
    pub extracted: bool,
    /// The imported id, or `None` for the `*` wildcard.
    pub id: Option<Token>,
    pub alias: Option<ImportAlias>,
}

impl ImportElement {
    pub fn id_value(&self) -> Option<&str> {
        match &self.id {
            Some(token) => match &token.kind {
                TokenKind::Id(id) => Some(&id.value),
                _ => None,
            },
            None => None,
        }
    }

    /// The name this element binds in the importing file.
    pub fn bound_name(&self) -> Option<&str> {
        match &self.alias {
            Some(alias) => match &alias.id.kind {
                TokenKind::Id(id) => Some(&id.value),
                _ => None,
            },
            None => self.id_value(),
        }
    }
}

#[derive(Debug)]
pub struct ImportAlias {
    pub as_keyword: Token,
    pub id: Token,
}

/// A freestanding `export` directive, e.g. `export foo, Bar`.
#[derive(Debug)]
pub struct Export {
    pub keyword: Token,
    pub ids: Vec<IdQuery>,
}

/// An `alias a => b` directive.
#[derive(Debug)]
pub struct Alias {
    pub keyword: Token,
    pub source: IdQuery,
    pub arrow: Token,
    pub target: IdQuery,
}

/// How a query element is reached from the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The first element of a query, no accessor.
    Leading,
    /// `::`.
    Static,
    /// `.`.
    Instance,
    /// `:`, Universal Function Call Syntax.
    Ufcs,
}

/// A template argument passed within a query element, e.g. `<T, U: V>`.
#[derive(Debug)]
pub struct TArg {
    pub label: Option<Token>,
    pub value: TypeExpr,
}

/// One element of an identifier query path.
#[derive(Debug)]
pub struct QueryElement {
    pub access: Access,
    /// The `::`/`.` token; `None` for the leading element and for UFCS
    /// (whose colon lives inside the preceding label token).
    pub access_token: Option<Token>,
    /// The element's identifier token.
    pub id: Token,
    pub targs: Vec<TArg>,
}

impl QueryElement {
    pub fn id_value(&self) -> &str {
        match &self.id.kind {
            TokenKind::Id(id) => &id.value,
            _ => "",
        }
    }
}

/// A full-path identifier query, e.g. `Foo::Bar<T>.baz`.
#[derive(Debug)]
pub struct IdQuery {
    pub elements: Vec<QueryElement>,
}

impl IdQuery {
    /// The last path element's name, e.g. `bar` for `Foo::bar`.
    pub fn name(&self) -> &str {
        self.elements.last().map(|e| e.id_value()).unwrap_or("")
    }

    /// A query is simple when it is a single bare element without
    /// template arguments.
    pub fn is_simple(&self) -> bool {
        self.elements.len() == 1
            && self.elements[0].access == Access::Leading
            && self.elements[0].targs.is_empty()
    }

    pub fn placement(&self) -> Placement {
        let first = self.elements.first().expect("empty id query").id.placement;
        let last = self.elements.last().expect("empty id query").id.placement;
        first.merge(last)
    }
}

/// A literal value node.
#[derive(Debug)]
pub enum Literal {
    Int(Token),
    Bool(Token),
    Str(Token),
    CStr(Token),
}

impl Literal {
    pub fn placement(&self) -> Placement {
        match self {
            Literal::Int(t) | Literal::Bool(t) | Literal::Str(t) | Literal::CStr(t) => t.placement,
        }
    }
}

/// A type expression: a literal restriction (`\Bool`), a literal (`32` in
/// `Int<32>`) or an identifier query.
#[derive(Debug)]
pub enum TypeExpr {
    Query(IdQuery),
    LiteralKind(Token),
    Literal(Literal),
}

impl TypeExpr {
    pub fn placement(&self) -> Placement {
        match self {
            TypeExpr::Query(query) => query.placement(),
            TypeExpr::LiteralKind(token) => token.placement,
            TypeExpr::Literal(literal) => literal.placement(),
        }
    }
}

/// A runtime value expression.
#[derive(Debug)]
pub enum RVal {
    Literal(Literal),
    Query(IdQuery),
    UnOp(Box<UnOp>),
    BinOp(Box<BinOp>),
    Assign(Box<Assign>),
    Call(Box<Call>),
    SafetyExpr(Box<SafetyExpr>),
    Block(Box<Block>),
    Paren(Box<Paren>),
}

impl RVal {
    pub fn placement(&self) -> Placement {
        match self {
            RVal::Literal(literal) => literal.placement(),
            RVal::Query(query) => query.placement(),
            RVal::UnOp(unop) => unop.op.placement.merge(unop.operand.placement()),
            RVal::BinOp(binop) => binop.left.placement().merge(binop.right.placement()),
            RVal::Assign(assign) => assign.target.placement().merge(assign.value.placement()),
            RVal::Call(call) => {
                let callee = call.callee.placement();
                callee.merge(call.paren_close.placement)
            }
            RVal::SafetyExpr(expr) => expr.keyword.placement.merge(expr.value.placement()),
            RVal::Block(block) => block.placement(),
            RVal::Paren(paren) => paren.open.placement.merge(paren.close.placement),
        }
    }
}

/// A unary operation, e.g. `&x`.
#[derive(Debug)]
pub struct UnOp {
    pub op: Token,
    pub operand: RVal,
}

/// A binary operation. The operator token is either an `Op` or one of the
/// single-angle punctuation tokens.
#[derive(Debug)]
pub struct BinOp {
    pub left: RVal,
    pub op: Token,
    pub right: RVal,
}

/// An assignment, `x = rval`.
#[derive(Debug)]
pub struct Assign {
    pub target: IdQuery,
    pub op: Token,
    pub value: RVal,
}

#[derive(Debug)]
pub struct CallArg {
    pub label: Option<Token>,
    pub value: RVal,
}

/// A call, e.g. `foo(1, bar: 2)`.
#[derive(Debug)]
pub struct Call {
    pub callee: RVal,
    pub paren_open: Token,
    pub args: Vec<CallArg>,
    pub paren_close: Token,
}

/// An explicit safety expression, e.g. `unsafe! puts($"hi")`.
#[derive(Debug)]
pub struct SafetyExpr {
    pub keyword: Token,
    pub value: RVal,
}

impl SafetyExpr {
    pub fn safety(&self) -> Safety {
        match self.keyword.kind {
            TokenKind::Keyword(Keyword::UnsafeBang) => Safety::Unsafe,
            TokenKind::Keyword(Keyword::FragileBang) => Safety::Fragile,
            TokenKind::Keyword(Keyword::ThreadsafeBang) => Safety::Threadsafe,
            _ => unreachable!("safety expression with a non-safety keyword"),
        }
    }
}

/// A parenthesized expression, kept for faithful reprinting.
#[derive(Debug)]
pub struct Paren {
    pub open: Token,
    pub inner: RVal,
    pub close: Token,
}

/// A variable definition, also used for runtime and template argument
/// declarations: `[export] [modifiers] [let|final] [alias:] id [: Type]
/// [= value]`.
#[derive(Debug)]
pub struct VarDef {
    pub docs: Option<Comment>,
    pub export_keyword: Option<Token>,
    pub default_keyword: Option<Token>,
    pub modifiers: Vec<Token>,
    /// `let` or `final`.
    pub keyword: Option<Token>,
    /// The alias label, e.g. `foo` in `foo: bar : T`.
    pub alias: Option<Token>,
    pub id: Token,
    pub restriction: Option<Restriction>,
    pub value: Option<DefaultValue>,
}

#[derive(Debug)]
pub struct Restriction {
    pub colon: Token,
    pub value: TypeExpr,
}

#[derive(Debug)]
pub struct DefaultValue {
    pub op: Token,
    pub value: RVal,
}

impl VarDef {
    pub fn name(&self) -> &str {
        match &self.id.kind {
            TokenKind::Id(id) => &id.value,
            _ => "",
        }
    }

    /// The alias label value, e.g. `foo` in `foo: bar : T`.
    pub fn alias_value(&self) -> Option<&str> {
        match &self.alias {
            Some(token) => match &token.kind {
                TokenKind::Id(id) => Some(&id.value),
                _ => None,
            },
            None => None,
        }
    }

    /// The publicly visible name: the alias if present, the id otherwise.
    pub fn public_name(&self) -> &str {
        self.alias_value().unwrap_or_else(|| self.name())
    }

    pub fn is_static(&self) -> bool {
        self.modifiers
            .iter()
            .any(|t| t.kind == TokenKind::Keyword(Keyword::Static))
    }
}

/// An argument list declaration, runtime `(a, b)` or template `<T, U>`.
/// The greedy `*` argument is allowed.
#[derive(Debug)]
pub struct ArgsDecl {
    pub open: Token,
    pub args: Vec<ArgDecl>,
    pub close: Token,
}

#[derive(Debug)]
pub enum ArgDecl {
    /// The context-dependent `*` thingie.
    Greedy(Token),
    Var(VarDef),
}

/// The declaration action of a function or type ion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Decl,
    Impl,
    Def,
    Reimpl,
    Extend,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::Decl => "declaration",
            Action::Impl => "implementation",
            Action::Def => "definition",
            Action::Reimpl => "reimplementation",
            Action::Extend => "extension",
        }
    }

    pub fn from_keyword(keyword: Keyword) -> Option<Action> {
        Some(match keyword {
            // A redeclaration contributes another prototype.
            Keyword::Decl | Keyword::Redecl => Action::Decl,
            Keyword::Impl => Action::Impl,
            Keyword::Def => Action::Def,
            Keyword::Reimpl => Action::Reimpl,
            Keyword::Extend => Action::Extend,
            _ => return None,
        })
    }
}

/// A `forall` modifier introducing quantified template arguments for an
/// implementation, e.g. `forall <T : Number> impl convert(arg : T)`.
#[derive(Debug)]
pub struct Forall {
    pub keyword: Token,
    pub args: ArgsDecl,
}

/// A function declaration, implementation or definition.
#[derive(Debug)]
pub struct FuncDecl {
    pub docs: Option<Comment>,
    pub export_keyword: Option<Token>,
    pub default_keyword: Option<Token>,
    pub modifiers: Vec<Token>,
    pub forall: Option<Forall>,
    /// `decl`, `impl`, `def` or `reimpl`.
    pub action: Token,
    pub id: IdQuery,
    pub targs: Option<ArgsDecl>,
    pub args: Option<ArgsDecl>,
    pub return_type: Option<Restriction>,
    pub body: Option<Block>,
}

impl FuncDecl {
    pub fn action(&self) -> Action {
        match self.action.kind {
            TokenKind::Keyword(keyword) => {
                Action::from_keyword(keyword).expect("non-action keyword on a function")
            }
            _ => unreachable!("non-keyword action token"),
        }
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }
}

/// A type definition or extension, e.g. `struct Foo` or `decl trait Bar`.
#[derive(Debug)]
pub struct TypeDef {
    pub docs: Option<Comment>,
    pub export_keyword: Option<Token>,
    pub default_keyword: Option<Token>,
    pub modifiers: Vec<Token>,
    pub forall: Option<Forall>,
    /// `decl`, `def`, `impl`, `reimpl` or `extend`; implicit `def` when
    /// absent.
    pub action: Option<Token>,
    /// `trait`, `struct`, `builtin` etc.
    pub category: Option<Token>,
    pub id: IdQuery,
    pub targs: Option<ArgsDecl>,
    /// Ancestors after a colon, e.g. `struct Foo : Bar, Baz`.
    pub ancestors: Vec<TypeExpr>,
    pub body: Option<Block>,
}

impl TypeDef {
    pub fn action(&self) -> Action {
        match &self.action {
            Some(token) => match token.kind {
                TokenKind::Keyword(keyword) => {
                    Action::from_keyword(keyword).expect("non-action keyword on a type")
                }
                _ => unreachable!("non-keyword action token"),
            },
            None => Action::Def,
        }
    }

    pub fn name(&self) -> &str {
        self.id.name()
    }

    /// The category keyword token placement, for diagnostics pointing at
    /// `struct` vs `builtin` mismatches.
    pub fn category_placement(&self) -> Option<Placement> {
        self.category.as_ref().map(|t| t.placement)
    }
}

/// A generic branch body: either an inline expression (`then x`) or a
/// block.
#[derive(Debug)]
pub enum BranchBody {
    Expr(RVal),
    Block(Block),
}

/// A branch with its optional delimiter keyword (`then` for conditionals,
/// `do` for loops).
#[derive(Debug)]
pub struct Branch {
    pub delimiter: Option<Token>,
    pub body: BranchBody,
}

/// A conditioned branch beginning with `if`, `elif` or `case`.
#[derive(Debug)]
pub struct Case {
    pub keyword: Token,
    pub cond: RVal,
    pub branch: Branch,
}

/// The unconditioned `else` branch.
#[derive(Debug)]
pub struct Else {
    pub keyword: Token,
    pub branch: Branch,
}

/// An `if` statement with its elifs and optional else.
#[derive(Debug)]
pub struct If {
    pub main: Case,
    pub elifs: Vec<Case>,
    pub else_: Option<Else>,
}

/// A `while` statement.
#[derive(Debug)]
pub struct While {
    pub keyword: Token,
    pub cond: RVal,
    pub branch: Branch,
}

/// A `switch` statement; each arm is a `case <rval> then …` branch.
#[derive(Debug)]
pub struct Switch {
    pub keyword: Token,
    pub subject: RVal,
    pub cases: Vec<Case>,
    pub else_: Option<Else>,
}

/// A `return` statement with an optional argument.
#[derive(Debug)]
pub struct Return {
    pub keyword: Token,
    pub value: Option<RVal>,
}

/// The brace style of a block: `{ … }` or `do … end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    C,
    Ruby,
}

/// A block of code. The style and multi-line flag let the printer
/// round-trip the original shape.
#[derive(Debug)]
pub struct Block {
    pub style: BlockStyle,
    pub multiline: bool,
    /// `{` or `do`; absent for bodies opened by a bare newline
    /// (`def f()\n … end`).
    pub open: Option<Token>,
    /// `}` or `end`; absent when an outer keyword (`elif`, `else`)
    /// terminated the block.
    pub close: Option<Token>,
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn placement(&self) -> Placement {
        match (&self.open, &self.close) {
            (Some(open), Some(close)) => open.placement.merge(close.placement),
            (Some(open), None) => open.placement,
            (None, Some(close)) => close.placement,
            (None, None) => self
                .nodes
                .iter()
                .find_map(node_placement)
                .expect("block with neither tokens nor nodes"),
        }
    }
}

fn node_placement(node: &Node) -> Option<Placement> {
    match node {
        Node::EmptyLine(n) => Some(n.token.placement),
        Node::Comment(n) => n.tokens.first().map(|t| t.placement),
        Node::Extern(n) => Some(n.keyword.placement),
        Node::Import(n) => Some(n.keyword.placement),
        Node::Export(n) => Some(n.keyword.placement),
        Node::Alias(n) => Some(n.keyword.placement),
        Node::VarDef(n) => Some(n.id.placement),
        Node::FuncDecl(n) => Some(n.action.placement.merge(n.id.placement())),
        Node::TypeDef(n) => Some(n.id.placement()),
        Node::If(n) => Some(n.main.keyword.placement),
        Node::While(n) => Some(n.keyword.placement),
        Node::Switch(n) => Some(n.keyword.placement),
        Node::Return(n) => Some(n.keyword.placement),
        Node::Block(n) => Some(n.placement()),
        Node::Expr(rval) => Some(rval.placement()),
    }
}

impl Node {
    pub fn placement(&self) -> Option<Placement> {
        node_placement(self)
    }
}
