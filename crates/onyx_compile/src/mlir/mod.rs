//! The Onyx Middle-Level Intermediate Representation: a typed,
//! specialization-oriented IR built from an AST. A module owns its
//! function and type specializations plus the implicit main block that
//! carries top-level code.
//!
//! Specialization is lazy: it is driven from the implicit main and the
//! exported entities, and a specialization slot is allocated before its
//! body is lowered, so self-recursion terminates.

mod write;


use std::collections::HashMap;

use onyx_base::{Panic, PanicId, Placement, Safety, Storage};
use onyx_language::cst;
use onyx_language::token::{IdKind, TokenKind};

use crate::ast::{self, Ast, Binding, MainExpr, Resolved, ScopeId, SuperBody, SuperId, SuperKind};

/// An index into a module's function specialization arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncSpecId(u32);

impl FuncSpecId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An index into a module's type specialization arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeSpecId(u32);

impl TypeSpecId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A concrete MLIR type value. Only fully specialized types appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Bool,
    /// A builtin integer, `Int<N>`.
    Int(u8),
    /// A C primitive with pointer depth, e.g. `char*`.
    CPrim { id: String, pointer_depth: u16 },
    /// A struct specialization.
    Struct(TypeSpecId),
}

impl Type {
    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }
}

/// A built-in function the IR can call directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    IntAdd(u8),
    IntSub(u8),
    IntMul(u8),
    IntDiv(u8),
    IntNeg(u8),
    IntLt(u8),
    IntLte(u8),
    IntGt(u8),
    IntGte(u8),
    IntEq(u8),
    IntNe(u8),
    BoolAnd,
    BoolOr,
    BoolNot,
}

/// What a call invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Builtin(Builtin),
    /// An external C function, by prototype name.
    C(String),
    /// An Onyx function specialization.
    Spec(FuncSpecId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<RVal>,
}

/// A closed set of rvalues: literals, variable references, calls, casts.
#[derive(Debug, Clone, PartialEq)]
pub enum RVal {
    Void,
    Int { value: i64, bits: u8 },
    Bool(bool),
    CStr(String),
    Var { name: String, ty: Type },
    PointerOf { name: String, ty: Type },
    Call { call: Box<Call>, ty: Type },
    Cast { value: Box<RVal>, to: Type },
}

impl RVal {
    pub fn ty(&self) -> Type {
        match self {
            RVal::Void => Type::Void,
            RVal::Int { bits, .. } => Type::Int(*bits),
            RVal::Bool(_) => Type::Bool,
            RVal::CStr(_) => Type::CPrim {
                id: "char".into(),
                pointer_depth: 1,
            },
            RVal::Var { ty, .. } => ty.clone(),
            RVal::PointerOf { ty, .. } => match ty {
                Type::CPrim { id, pointer_depth } => Type::CPrim {
                    id: id.clone(),
                    pointer_depth: pointer_depth + 1,
                },
                _ => Type::CPrim {
                    id: "void".into(),
                    pointer_depth: 1,
                },
            },
            RVal::Call { ty, .. } => ty.clone(),
            RVal::Cast { to, .. } => to.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub cond: RVal,
    pub then: Block,
    pub else_: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileExpr {
    pub cond: RVal,
    pub body: Block,
}

/// An MLIR expression: the statement-shaped building blocks of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    VarDecl { name: String, ty: Type },
    Assign { target: String, value: RVal },
    Call(Call),
    If(IfExpr),
    While(WhileExpr),
    Return(Option<RVal>),
    /// A child scope, e.g. an explicit safety block.
    Scope(Block),
}

/// A block of code with its own safety and storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub safety: Safety,
    pub storage: Storage,
    pub exprs: Vec<Expr>,
}

impl Block {
    fn new(safety: Safety, storage: Storage) -> Self {
        Self {
            safety,
            storage,
            exprs: Vec::new(),
        }
    }
}

/// A struct field in a type specialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// A type specialization: a builtin `Int<N>` primitive or a struct with
/// its members. A self-referential field holds this spec's own id, the
/// resolved form of the recursive placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: String,
    pub key: String,
    pub instance_fields: Vec<Field>,
    pub static_fields: Vec<Field>,
    pub instance_methods: Vec<String>,
    pub static_methods: Vec<String>,
}

/// A function specialization: concrete argument and return types plus a
/// lowered body. `ret` stays `None` while return-type inference is still
/// pending during body lowering.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncSpec {
    pub name: String,
    pub key: String,
    pub args: Vec<(String, Type)>,
    pub ret: Option<Type>,
    pub required_safety: Safety,
    pub body: Block,
}

/// An MLIR module: specializations plus the implicit main.
#[derive(Debug)]
pub struct Module {
    pub functions: Vec<FuncSpec>,
    pub types: Vec<TypeSpec>,
    pub main: Block,
    /// Panics recovered per specialization or per main item.
    pub panics: Vec<Panic>,

    func_index: HashMap<(usize, usize, String), FuncSpecId>,
    type_index: HashMap<(usize, usize, String), TypeSpecId>,
}

impl Module {
    /// Build the MLIR module of `asts[module]`.
    pub fn build(asts: &[Ast<'_>], module: usize) -> Module {
        let mut lowerer = Lowerer {
            asts,
            module,
            out: Module {
                functions: Vec::new(),
                types: Vec::new(),
                main: Block::new(Safety::Fragile, Storage::Static),
                panics: Vec::new(),
                func_index: HashMap::new(),
                type_index: HashMap::new(),
            },
            globals: HashMap::new(),
            current_fn: None,
        };

        lowerer.lower_main();
        lowerer.out
    }

    pub fn function(&self, id: FuncSpecId) -> &FuncSpec {
        &self.functions[id.index()]
    }

    pub fn type_spec(&self, id: TypeSpecId) -> &TypeSpec {
        &self.types[id.index()]
    }
}

/// The lowering environment of one block: local variable types, the
/// ambient safety, the AST scope for name resolution, and the bound
/// template arguments.
#[derive(Clone)]
struct Env {
    module: usize,
    scope: ScopeId,
    safety: Safety,
    frames: Vec<HashMap<String, Type>>,
    targs: HashMap<String, Type>,
}

impl Env {
    fn lookup_local(&self, name: &str) -> Option<&Type> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    fn bind_local(&mut self, name: &str, ty: Type) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), ty);
        }
    }

    fn child(&self, safety: Safety) -> Env {
        let mut child = self.clone();
        child.safety = safety;
        child.frames.push(HashMap::new());
        child
    }
}

struct Lowerer<'a, 'c> {
    asts: &'a [Ast<'c>],
    module: usize,
    out: Module,
    /// Types of the top-level variables lowered so far.
    globals: HashMap<String, Type>,
    /// The specialization currently being lowered, for return-type
    /// inference.
    current_fn: Option<FuncSpecId>,
}

impl<'a, 'c> Lowerer<'a, 'c> {
    /// The current module's AST, borrowed for the full `'a` so it may be
    /// held across mutations of the module under construction.
    fn ast(&self) -> &'a Ast<'c> {
        self.ast_of(self.module)
    }

    fn ast_of(&self, module: usize) -> &'a Ast<'c> {
        let asts: &'a [Ast<'c>] = self.asts;
        &asts[module]
    }

    fn lower_main(&mut self) {
        let root = self.ast().root;
        let mut env = Env {
            module: self.module,
            scope: root,
            safety: Safety::Fragile,
            frames: vec![HashMap::new()],
            targs: HashMap::new(),
        };

        let mut main = std::mem::replace(
            &mut self.out.main,
            Block::new(Safety::Fragile, Storage::Static),
        );

        for (index, item) in self.ast().main.iter().enumerate() {
            let result = match item {
                MainExpr::Var(id) => {
                    let var = self.ast().var(*id);
                    match var.cst {
                        Some(def) => self.lower_var_def(&mut env, def, &mut main, true),
                        None => Ok(()),
                    }
                }
                MainExpr::Node(node) => self.lower_node(&mut env, node, &mut main),
            };

            if let Err(panic) = result {
                log::debug!(target: "onyx/mlir", "recovered in main item {index}: {panic}");
                self.out.panics.push(panic);
            }
        }

        self.out.main = main;

        // Exported functions specialize eagerly when fully concrete, so an
        // emitted module is complete without callers.
        let exports: Vec<SuperId> = {
            let mut pairs: Vec<(&String, &SuperId)> = self.ast().exports.iter().collect();
            pairs.sort_by(|a, b| a.0.cmp(b.0));
            pairs.into_iter().map(|(_, id)| *id).collect()
        };

        for id in exports {
            if let Err(panic) = self.specialize_exported(id) {
                self.out.panics.push(panic);
            }
        }
    }

    /// Specialize an exported function when its signature is concrete
    /// (no template arguments, every argument type declared).
    fn specialize_exported(&mut self, id: SuperId) -> Result<(), Panic> {
        let superdecl = self.ast().superdecl(id);
        if superdecl.kind != SuperKind::Function || !superdecl.profile.is_empty() {
            return Ok(());
        }

        let Some(ion) = superdecl.function_impls().first() else {
            return Ok(());
        };

        let all_declared = ion
            .cst
            .args
            .as_ref()
            .map(|args| {
                args.args.iter().all(|arg| match arg {
                    cst::ArgDecl::Var(var) => var.restriction.is_some(),
                    cst::ArgDecl::Greedy(_) => false,
                })
            })
            .unwrap_or(true);

        if !all_declared {
            return Ok(());
        }

        let env = Env {
            module: self.module,
            scope: self.ast().root,
            safety: ion.required_safety,
            frames: vec![HashMap::new()],
            targs: HashMap::new(),
        };

        let mut arg_types = Vec::new();
        if let Some(args) = &ion.cst.args {
            for arg in &args.args {
                if let cst::ArgDecl::Var(var) = arg {
                    let restriction = var.restriction.as_ref().unwrap();
                    arg_types.push(self.resolve_type(&env, &restriction.value)?);
                }
            }
        }

        self.specialize_function(self.module, id, Vec::new(), &arg_types, None)?;
        Ok(())
    }

    // Statements
    //

    fn lower_node(
        &mut self,
        env: &mut Env,
        node: &cst::Node,
        out: &mut Block,
    ) -> Result<(), Panic> {
        match node {
            cst::Node::EmptyLine(_) | cst::Node::Comment(_) => Ok(()),

            cst::Node::VarDef(def) => self.lower_var_def(env, def, out, false),

            cst::Node::Expr(rval) => self.lower_expr_statement(env, rval, out),

            cst::Node::If(node) => {
                let lowered = self.lower_if(env, node)?;
                out.exprs.push(Expr::If(lowered));
                Ok(())
            }

            cst::Node::While(node) => {
                let cond = self.lower_cond(env, &node.cond)?;
                let body = self.lower_branch(env, &node.branch)?;
                out.exprs.push(Expr::While(WhileExpr { cond, body }));
                Ok(())
            }

            cst::Node::Switch(node) => {
                let lowered = self.lower_switch(env, node)?;
                out.exprs.push(Expr::If(lowered));
                Ok(())
            }

            cst::Node::Return(node) => {
                let value = match &node.value {
                    Some(rval) => Some(self.lower_rval(env, rval)?),
                    None => None,
                };
                let value = self.finish_return(value, node.keyword.placement)?;
                out.exprs.push(Expr::Return(value));
                Ok(())
            }

            cst::Node::Block(block) => {
                let lowered = self.lower_block(env, env.safety, &block.nodes)?;
                out.exprs.push(Expr::Scope(lowered));
                Ok(())
            }

            other => Err(Panic::new(
                "This node is not executable code",
                other.placement(),
            )),
        }
    }

    fn lower_var_def(
        &mut self,
        env: &mut Env,
        def: &cst::VarDef,
        out: &mut Block,
        global: bool,
    ) -> Result<(), Panic> {
        let name = def.public_name().to_string();

        let value = match &def.value {
            Some(value) => Some(self.lower_rval(env, &value.value)?),
            None => None,
        };

        // A local without an explicit type takes its initializer's type.
        let ty = match (&def.restriction, &value) {
            (Some(restriction), _) => self.resolve_type(env, &restriction.value)?,
            (None, Some(value)) => value.ty(),
            (None, None) => {
                return Err(Panic::new(
                    format!("Can not infer the type of `{name}`"),
                    Some(def.id.placement),
                ))
            }
        };

        let value = match value {
            Some(value) => Some(self.coerce(value, &ty, def.id.placement)?),
            None => None,
        };

        env.bind_local(&name, ty.clone());
        if global {
            self.globals.insert(name.clone(), ty.clone());
        }

        out.exprs.push(Expr::VarDecl {
            name: name.clone(),
            ty,
        });
        if let Some(value) = value {
            out.exprs.push(Expr::Assign {
                target: name,
                value,
            });
        }

        Ok(())
    }

    fn lower_expr_statement(
        &mut self,
        env: &mut Env,
        rval: &cst::RVal,
        out: &mut Block,
    ) -> Result<(), Panic> {
        match rval {
            cst::RVal::Assign(assign) => {
                let value = self.lower_rval(env, &assign.value)?;
                let name = assign.target.name().to_string();

                let ty = match env.lookup_local(&name).cloned() {
                    Some(ty) => ty,
                    None => {
                        return Err(Panic::with_id(
                            PanicId::UndeclaredReference,
                            format!("Undeclared reference `{name}`"),
                            Some(assign.target.placement()),
                        ))
                    }
                };

                let value = self.coerce(value, &ty, assign.target.placement())?;
                out.exprs.push(Expr::Assign {
                    target: name,
                    value,
                });
                Ok(())
            }

            cst::RVal::SafetyExpr(expr) => {
                let mut child_env = env.child(expr.safety());
                let mut block = Block::new(expr.safety(), Storage::Static);
                self.lower_expr_statement(&mut child_env, &expr.value, &mut block)?;
                out.exprs.push(Expr::Scope(block));
                Ok(())
            }

            other => {
                let lowered = self.lower_rval(env, other)?;
                match lowered {
                    RVal::Call { call, .. } => {
                        out.exprs.push(Expr::Call(*call));
                        Ok(())
                    }
                    // A pure value at statement position has no effect.
                    _ => Ok(()),
                }
            }
        }
    }

    fn lower_if(&mut self, env: &mut Env, node: &cst::If) -> Result<IfExpr, Panic> {
        let cond = self.lower_cond(env, &node.main.cond)?;
        let then = self.lower_branch(env, &node.main.branch)?;

        // Elifs nest into the else chain, innermost last.
        let mut else_ = match &node.else_ {
            Some(else_) => Some(self.lower_branch(env, &else_.branch)?),
            None => None,
        };

        for elif in node.elifs.iter().rev() {
            let elif_cond = self.lower_cond(env, &elif.cond)?;
            let elif_then = self.lower_branch(env, &elif.branch)?;

            let mut wrapper = Block::new(env.safety, Storage::Static);
            wrapper.exprs.push(Expr::If(IfExpr {
                cond: elif_cond,
                then: elif_then,
                else_,
            }));
            else_ = Some(wrapper);
        }

        Ok(IfExpr { cond, then, else_ })
    }

    /// A `switch` lowers to an `if` chain comparing the subject with each
    /// case value.
    fn lower_switch(&mut self, env: &mut Env, node: &cst::Switch) -> Result<IfExpr, Panic> {
        let subject = self.lower_rval(env, &node.subject)?;

        let mut cases = node.cases.iter();
        let Some(first) = cases.next() else {
            return Err(Panic::new(
                "A switch needs at least one case",
                Some(node.keyword.placement),
            ));
        };

        let mut else_ = match &node.else_ {
            Some(else_) => Some(self.lower_branch(env, &else_.branch)?),
            None => None,
        };

        let rest: Vec<_> = cases.collect();
        for case in rest.into_iter().rev() {
            let cond = self.case_cond(env, &subject, case)?;
            let then = self.lower_branch(env, &case.branch)?;
            let mut wrapper = Block::new(env.safety, Storage::Static);
            wrapper.exprs.push(Expr::If(IfExpr { cond, then, else_ }));
            else_ = Some(wrapper);
        }

        let cond = self.case_cond(env, &subject, first)?;
        let then = self.lower_branch(env, &first.branch)?;
        Ok(IfExpr { cond, then, else_ })
    }

    fn case_cond(&mut self, env: &mut Env, subject: &RVal, case: &cst::Case) -> Result<RVal, Panic> {
        let value = self.lower_rval(env, &case.cond)?;
        let (subject, value, bits) =
            self.unify_ints(subject.clone(), value, case.cond.placement())?;
        Ok(RVal::Call {
            call: Box::new(Call {
                callee: Callee::Builtin(Builtin::IntEq(bits)),
                args: vec![subject, value],
            }),
            ty: Type::Bool,
        })
    }

    fn lower_branch(&mut self, env: &Env, branch: &cst::Branch) -> Result<Block, Panic> {
        match &branch.body {
            cst::BranchBody::Block(block) => self.lower_block(env, env.safety, &block.nodes),
            cst::BranchBody::Expr(rval) => {
                let mut child_env = env.child(env.safety);
                let mut block = Block::new(env.safety, Storage::Static);
                self.lower_expr_statement(&mut child_env, rval, &mut block)?;
                Ok(block)
            }
        }
    }

    fn lower_block(
        &mut self,
        env: &Env,
        safety: Safety,
        nodes: &[cst::Node],
    ) -> Result<Block, Panic> {
        let mut child_env = env.child(safety);
        let mut block = Block::new(safety, Storage::Static);

        for node in nodes {
            self.lower_node(&mut child_env, node, &mut block)?;
        }

        Ok(block)
    }

    // Values
    //

    fn lower_rval(&mut self, env: &mut Env, rval: &cst::RVal) -> Result<RVal, Panic> {
        match rval {
            cst::RVal::Literal(literal) => self.lower_literal(literal),

            cst::RVal::Paren(paren) => self.lower_rval(env, &paren.inner),

            cst::RVal::Query(query) => self.lower_query_value(env, query),

            cst::RVal::Call(call) => {
                let (call, ty) = self.lower_call(env, call)?;
                Ok(RVal::Call {
                    call: Box::new(call),
                    ty,
                })
            }

            cst::RVal::UnOp(unop) => self.lower_unop(env, unop),

            cst::RVal::BinOp(binop) => self.lower_binop(env, binop),

            cst::RVal::SafetyExpr(expr) => {
                let mut child_env = env.child(expr.safety());
                self.lower_rval(&mut child_env, &expr.value)
            }

            cst::RVal::Assign(assign) => Err(Panic::new(
                "An assignment is not an expression",
                Some(assign.target.placement()),
            )),

            cst::RVal::Block(block) => Err(Panic::new(
                "A block is not usable as a value here",
                Some(block.placement()),
            )),
        }
    }

    fn lower_literal(&mut self, literal: &cst::Literal) -> Result<RVal, Panic> {
        match literal {
            cst::Literal::Int(token) => match &token.kind {
                TokenKind::Int(value) => {
                    let bits = narrowest_bits(*value as i128);
                    Ok(RVal::Int {
                        value: *value as i64,
                        bits,
                    })
                }
                _ => unreachable!("int literal with a non-int token"),
            },
            cst::Literal::Bool(token) => match &token.kind {
                TokenKind::Bool(value) => Ok(RVal::Bool(*value)),
                _ => unreachable!("bool literal with a non-bool token"),
            },
            cst::Literal::CStr(token) => match &token.kind {
                TokenKind::CStr(value) => Ok(RVal::CStr(value.clone())),
                _ => unreachable!("C string literal with a wrong token"),
            },
            cst::Literal::Str(token) => Err(Panic::new(
                "String literals are not supported in runtime code yet",
                Some(token.placement),
            )),
        }
    }

    fn lower_query_value(&mut self, env: &Env, query: &cst::IdQuery) -> Result<RVal, Panic> {
        if query.elements.len() != 1 {
            return Err(Panic::new(
                "A qualified reference is not usable as a value",
                Some(query.placement()),
            ));
        }

        let element = &query.elements[0];
        let name = element.id_value();

        if let Some(ty) = env.lookup_local(name) {
            return Ok(RVal::Var {
                name: name.to_string(),
                ty: ty.clone(),
            });
        }

        if let Some(ty) = self.globals.get(name) {
            return Ok(RVal::Var {
                name: name.to_string(),
                ty: ty.clone(),
            });
        }

        match self.asts[env.module].resolve_simple(env.scope, name, query.placement())? {
            Resolved::Literal(literal) => match literal {
                onyx_language::token::IdLiteral::Void => Ok(RVal::Void),
                other => Err(Panic::new(
                    format!("`{}` is not usable here", other.as_str()),
                    Some(query.placement()),
                )),
            },
            Resolved::Var(_) => Err(Panic::new(
                format!("`{name}` is declared later in this scope"),
                Some(query.placement()),
            )),
            _ => Err(Panic::new(
                format!("`{name}` is not a runtime value"),
                Some(query.placement()),
            )),
        }
    }

    fn lower_unop(&mut self, env: &mut Env, unop: &cst::UnOp) -> Result<RVal, Panic> {
        let op = match &unop.op.kind {
            TokenKind::Op(op) => op.as_str(),
            _ => "",
        };

        match op {
            "&" => {
                let operand = self.lower_rval(env, &unop.operand)?;
                match operand {
                    RVal::Var { name, ty } => Ok(RVal::PointerOf { name, ty }),
                    _ => Err(Panic::new(
                        "Can only take a pointer of a variable",
                        Some(unop.op.placement),
                    )),
                }
            }

            "-" => {
                let operand = self.lower_rval(env, &unop.operand)?;
                match operand {
                    RVal::Int { value, .. } => {
                        let negated = -value;
                        Ok(RVal::Int {
                            value: negated,
                            bits: narrowest_bits(negated as i128),
                        })
                    }
                    other if other.ty().is_int() => {
                        let bits = int_bits(&other.ty());
                        Ok(RVal::Call {
                            call: Box::new(Call {
                                callee: Callee::Builtin(Builtin::IntNeg(bits)),
                                args: vec![other],
                            }),
                            ty: Type::Int(bits),
                        })
                    }
                    _ => Err(Panic::new(
                        "Can not negate a non-integer",
                        Some(unop.op.placement),
                    )),
                }
            }

            "!" => {
                let operand = self.lower_rval(env, &unop.operand)?;
                if operand.ty() != Type::Bool {
                    return Err(Panic::new(
                        "Can not apply `!` to a non-bool",
                        Some(unop.op.placement),
                    ));
                }
                Ok(RVal::Call {
                    call: Box::new(Call {
                        callee: Callee::Builtin(Builtin::BoolNot),
                        args: vec![operand],
                    }),
                    ty: Type::Bool,
                })
            }

            other => Err(Panic::new(
                format!("Unknown unary operator `{other}`"),
                Some(unop.op.placement),
            )),
        }
    }

    fn lower_binop(&mut self, env: &mut Env, binop: &cst::BinOp) -> Result<RVal, Panic> {
        let op = binop.op.kind.print();
        let placement = binop.op.placement;

        let left = self.lower_rval(env, &binop.left)?;
        let right = self.lower_rval(env, &binop.right)?;

        match op.as_str() {
            "&&" | "and" | "||" | "or" => {
                if left.ty() != Type::Bool || right.ty() != Type::Bool {
                    return Err(Panic::new(
                        format!("`{op}` needs bool operands"),
                        Some(placement),
                    ));
                }
                let builtin = if op == "&&" || op == "and" {
                    Builtin::BoolAnd
                } else {
                    Builtin::BoolOr
                };
                Ok(RVal::Call {
                    call: Box::new(Call {
                        callee: Callee::Builtin(builtin),
                        args: vec![left, right],
                    }),
                    ty: Type::Bool,
                })
            }

            "+" | "-" | "*" | "/" | "<" | "<=" | ">" | ">=" | "==" | "!=" => {
                let (left, right, bits) = self.unify_ints(left, right, placement)?;

                let (builtin, ty) = match op.as_str() {
                    "+" => (Builtin::IntAdd(bits), Type::Int(bits)),
                    "-" => (Builtin::IntSub(bits), Type::Int(bits)),
                    "*" => (Builtin::IntMul(bits), Type::Int(bits)),
                    "/" => (Builtin::IntDiv(bits), Type::Int(bits)),
                    "<" => (Builtin::IntLt(bits), Type::Bool),
                    "<=" => (Builtin::IntLte(bits), Type::Bool),
                    ">" => (Builtin::IntGt(bits), Type::Bool),
                    ">=" => (Builtin::IntGte(bits), Type::Bool),
                    "==" => (Builtin::IntEq(bits), Type::Bool),
                    "!=" => (Builtin::IntNe(bits), Type::Bool),
                    _ => unreachable!(),
                };

                Ok(RVal::Call {
                    call: Box::new(Call {
                        callee: Callee::Builtin(builtin),
                        args: vec![left, right],
                    }),
                    ty,
                })
            }

            other => Err(Panic::new(
                format!("Unknown binary operator `{other}`"),
                Some(placement),
            )),
        }
    }

    /// Make two integer operands share a width, widening the narrower
    /// with an implicit cast.
    fn unify_ints(
        &self,
        left: RVal,
        right: RVal,
        placement: Placement,
    ) -> Result<(RVal, RVal, u8), Panic> {
        if !left.ty().is_int() || !right.ty().is_int() {
            return Err(Panic::new(
                "This operator needs integer operands",
                Some(placement),
            ));
        }

        let bits = int_bits(&left.ty()).max(int_bits(&right.ty()));
        Ok((widen(left, bits), widen(right, bits), bits))
    }

    fn lower_cond(&mut self, env: &mut Env, cond: &cst::RVal) -> Result<RVal, Panic> {
        let lowered = self.lower_rval(env, cond)?;
        if lowered.ty() != Type::Bool {
            return Err(Panic::new(
                "A condition must be a bool",
                Some(cond.placement()),
            ));
        }
        Ok(lowered)
    }

    /// Settle a return value against the specialization being lowered:
    /// the first resolved return fixes an undeclared return type, and
    /// later (or declared-typed) returns coerce to it.
    fn finish_return(
        &mut self,
        value: Option<RVal>,
        placement: Placement,
    ) -> Result<Option<RVal>, Panic> {
        let Some(id) = self.current_fn else {
            return Ok(value);
        };

        let expected = self.out.functions[id.index()].ret.clone();
        match expected {
            None => {
                let ty = value.as_ref().map(|v| v.ty()).unwrap_or(Type::Void);
                self.out.functions[id.index()].ret = Some(ty);
                Ok(value)
            }
            Some(Type::Void) => match value {
                None => Ok(None),
                Some(value) => Err(Panic::new(
                    format!("Can not return {:?} from a void function", value.ty()),
                    Some(placement),
                )),
            },
            Some(expected) => match value {
                Some(value) => Ok(Some(self.coerce(value, &expected, placement)?)),
                None => Err(Panic::new(
                    format!("Expected a {expected:?} return value"),
                    Some(placement),
                )),
            },
        }
    }

    // Calls and specialization
    //

    fn lower_call(&mut self, env: &mut Env, call: &cst::Call) -> Result<(Call, Type), Panic> {
        let cst::RVal::Query(query) = &call.callee else {
            return Err(Panic::new(
                "Only named callees are supported",
                Some(call.callee.placement()),
            ));
        };

        let mut args = Vec::new();
        for arg in &call.args {
            args.push(self.lower_rval(env, &arg.value)?);
        }

        // A `$`-prefixed callee reaches the C AST directly; a bare name
        // resolves through the scope chain, whose C-identifier step can
        // land on a prototype just the same (`puts` after an `extern`).
        if query.elements.len() == 1 {
            if let TokenKind::Id(id) = &query.elements[0].id.kind {
                if id.kind == IdKind::C {
                    return self.lower_c_call(env, query, &id.value, args);
                }

                let shadowed = env.lookup_local(&id.value).is_some()
                    || self.globals.contains_key(&id.value);
                if !shadowed {
                    let resolved = self.asts[env.module].resolve_simple(
                        env.scope,
                        &id.value,
                        query.placement(),
                    );
                    if let Ok(Resolved::C(proto)) = resolved {
                        return self.lower_c_call(env, query, &proto.name, args);
                    }
                }
            }
        }

        let (callee_module, super_id, receiver) = self.resolve_callee(env, query, &mut args)?;

        // Template arguments passed on the last element.
        let mut targs = Vec::new();
        if let Some(element) = query.elements.last() {
            for targ in &element.targs {
                targs.push(self.resolve_type(env, &targ.value)?);
            }
        }

        if let Some(receiver) = receiver {
            args.insert(0, receiver);
        }

        let arg_types: Vec<Type> = args.iter().map(|a| a.ty()).collect();
        let (spec, ret, param_types, defaults) = self.specialize_function(
            callee_module,
            super_id,
            targs,
            &arg_types,
            Some((env.safety, query.placement())),
        )?;

        // Widen arguments to the parameter types, then materialize any
        // defaulted trailing parameters.
        let mut final_args = Vec::new();
        for (arg, ty) in args.into_iter().zip(param_types.iter()) {
            final_args.push(self.coerce(arg, ty, query.placement())?);
        }
        final_args.extend(defaults);

        Ok((
            Call {
                callee: Callee::Spec(spec),
                args: final_args,
            },
            ret,
        ))
    }

    fn lower_c_call(
        &mut self,
        env: &Env,
        query: &cst::IdQuery,
        name: &str,
        args: Vec<RVal>,
    ) -> Result<(Call, Type), Panic> {
        let placement = query.placement();

        // Any C call requires unsafe; the panic points at the call site.
        if env.safety > Safety::Unsafe {
            return Err(Panic::new(
                format!(
                    "Can not call a C function from within a {} context",
                    env.safety
                ),
                Some(placement),
            ));
        }

        let Some(proto) = self.asts[env.module].c_ast.find(name) else {
            return Err(Panic::with_id(
                PanicId::UndeclaredReference,
                format!("Use of undeclared C function `{name}`"),
                Some(placement),
            ));
        };

        if args.len() < proto.args.len() || (args.len() > proto.args.len() && !proto.varg) {
            return Err(Panic::new(
                format!(
                    "`{name}` takes {} argument(s), {} given",
                    proto.args.len(),
                    args.len()
                ),
                Some(placement),
            ));
        }

        let ret = c_type_to_mlir(&proto.return_type);
        Ok((
            Call {
                callee: Callee::C(name.to_string()),
                args,
            },
            ret,
        ))
    }

    /// Resolve a callee query to a function superdecl, possibly in another
    /// module, with an optional receiver argument for UFCS and instance
    /// access.
    fn resolve_callee(
        &mut self,
        env: &mut Env,
        query: &cst::IdQuery,
        _args: &mut Vec<RVal>,
    ) -> Result<(usize, SuperId, Option<RVal>), Panic> {
        let placement = query.placement();

        if query.elements.len() == 1 {
            let name = query.elements[0].id_value();
            let (module, id) =
                ast::resolve_name(self.asts, env.module, env.scope, name, placement)?;
            if self.asts[module].superdecl(id).kind != SuperKind::Function {
                return Err(Panic::new(
                    format!("`{name}` is not callable"),
                    Some(placement),
                ));
            }
            return Ok((module, id, None));
        }

        if query.elements.len() == 2 {
            let head = &query.elements[0];
            let tail = &query.elements[1];
            let method = tail.id_value();

            match tail.access {
                // `A::f()` — a static member of a type or namespace.
                cst::Access::Static => {
                    match self.asts[env.module].resolve_simple(
                        env.scope,
                        head.id_value(),
                        placement,
                    )? {
                        Resolved::Super(type_id) => {
                            let members = self.asts[env.module]
                                .superdecl(type_id)
                                .member_scope
                                .ok_or_else(|| {
                                    Panic::new(
                                        format!("`{}` has no members", head.id_value()),
                                        Some(placement),
                                    )
                                })?;

                            match self.asts[env.module].scope(members).bindings.get(method) {
                                Some(Binding::Super(id)) => Ok((env.module, *id, None)),
                                _ => Err(Panic::with_id(
                                    PanicId::UndeclaredReference,
                                    format!("Undeclared reference `{method}`"),
                                    Some(tail.id.placement),
                                )),
                            }
                        }
                        Resolved::Namespace { module } => {
                            match self.asts[module].exports.get(method) {
                                Some(id) => Ok((module, *id, None)),
                                None => Err(Panic::with_id(
                                    PanicId::UndeclaredReference,
                                    format!("Undeclared reference `{method}`"),
                                    Some(tail.id.placement),
                                )),
                            }
                        }
                        _ => Err(Panic::new(
                            format!("`{}` is not a namespace or type", head.id_value()),
                            Some(placement),
                        )),
                    }
                }

                // `x:f(y)` and `x.f(y)` — the receiver becomes the first
                // argument; the function resolves as a free function.
                cst::Access::Ufcs | cst::Access::Instance => {
                    let receiver_query = cst::IdQuery {
                        elements: vec![cst::QueryElement {
                            access: cst::Access::Leading,
                            access_token: None,
                            id: head.id.clone(),
                            targs: Vec::new(),
                        }],
                    };
                    let receiver = self.lower_query_value(env, &receiver_query)?;

                    let (module, id) =
                        ast::resolve_name(self.asts, env.module, env.scope, method, placement)?;
                    if self.asts[module].superdecl(id).kind != SuperKind::Function {
                        return Err(Panic::new(
                            format!("`{method}` is not callable"),
                            Some(placement),
                        ));
                    }
                    Ok((module, id, Some(receiver)))
                }

                cst::Access::Leading => unreachable!("a second element can not be leading"),
            }
        } else {
            Err(Panic::new(
                "Deeply qualified calls are not supported",
                Some(placement),
            ))
        }
    }

    /// Find or create the specialization of `super_id` with the given
    /// template args and argument types.
    ///
    /// The slot is allocated before the body lowers, so a self-recursive
    /// call resolves to the specialization under construction instead of
    /// looping. Returns the spec id, its return type, the concrete
    /// parameter types, and any materialized default arguments.
    fn specialize_function(
        &mut self,
        module: usize,
        super_id: SuperId,
        targs: Vec<Type>,
        arg_types: &[Type],
        site: Option<(Safety, Placement)>,
    ) -> Result<(FuncSpecId, Type, Vec<Type>, Vec<RVal>), Panic> {
        let ast = self.ast_of(module);
        let superdecl = ast.superdecl(super_id);
        let name = superdecl.name.clone();

        let ion = self.pick_implementation(module, super_id, arg_types.len())?;
        let ion_ref = match &superdecl.body {
            SuperBody::Function { impls, .. } => &impls[ion],
            SuperBody::Type { .. } => unreachable!("specializing a non-function"),
        };

        // Safety is verified against the chosen implementation.
        if let Some((site_safety, placement)) = site {
            if site_safety > ion_ref.required_safety {
                return Err(Panic::new(
                    format!(
                        "Can not call {} `{name}` from within a {} context",
                        ion_ref.required_safety, site_safety
                    ),
                    Some(placement),
                ));
            }
        }

        // Bind template arguments positionally; defaults fill the rest.
        let mut targ_map = HashMap::new();
        for (index, decl) in ion_ref.profile.args.iter().enumerate() {
            let public = decl.alias.clone().unwrap_or_else(|| decl.name.clone());
            match targs.get(index) {
                Some(ty) => {
                    targ_map.insert(public, ty.clone());
                }
                None => match &decl.default_value {
                    Some(default) => {
                        let ty = self.type_from_name(module, default).ok_or_else(|| {
                            Panic::new(
                                format!("Can not evaluate the default of `{public}`"),
                                Some(decl.placement),
                            )
                        })?;
                        targ_map.insert(public, ty);
                    }
                    None => {
                        return Err(Panic::new(
                            format!("Missing template argument `{public}` for `{name}`"),
                            Some(decl.placement),
                        ))
                    }
                },
            }
        }

        let body_scope = ion_ref.body_scope.unwrap_or(ast.root);
        let required_safety = ion_ref.required_safety;

        let mut env = Env {
            module,
            scope: body_scope,
            safety: required_safety,
            frames: vec![HashMap::new()],
            targs: targ_map,
        };

        // Concrete parameter list: declared restrictions resolve now;
        // undeclared ones take the call argument's type.
        let cst_args = ion_ref.cst.args.as_ref();
        let declared_ret = ion_ref.cst.return_type.as_ref();
        let body = ion_ref.cst.body.as_ref();

        let mut params: Vec<(String, Type)> = Vec::new();
        let mut defaults: Vec<RVal> = Vec::new();

        if let Some(args) = cst_args {
            for (index, arg) in args.args.iter().enumerate() {
                let cst::ArgDecl::Var(var) = arg else {
                    return Err(Panic::new(
                        "Greedy arguments are not supported in runtime calls",
                        Some(var_placement(arg)),
                    ));
                };

                let ty = match &var.restriction {
                    Some(restriction) => self.resolve_type(&env, &restriction.value)?,
                    None => match arg_types.get(index) {
                        Some(ty) => ty.clone(),
                        None => {
                            return Err(Panic::new(
                                format!("Can not infer the type of argument `{}`", var.name()),
                                Some(var.id.placement),
                            ))
                        }
                    },
                };

                // A parameter the call omits must carry a default, which
                // materializes at the call site.
                if index >= arg_types.len() {
                    let Some(default) = &var.value else {
                        return Err(Panic::new(
                            format!("Missing argument `{}` for `{name}`", var.name()),
                            site.map(|(_, p)| p).or(Some(var.id.placement)),
                        ));
                    };
                    let lowered = self.lower_rval(&mut env, &default.value)?;
                    defaults.push(self.coerce(lowered, &ty, var.id.placement)?);
                }

                env.bind_local(var.public_name(), ty.clone());
                params.push((var.public_name().to_string(), ty));
            }
        }

        if arg_types.len() > params.len() {
            return Err(Panic::new(
                format!(
                    "`{name}` takes {} argument(s), {} given",
                    params.len(),
                    arg_types.len()
                ),
                site.map(|(_, p)| p),
            ));
        }

        let declared_ret = match declared_ret {
            Some(restriction) => Some(self.resolve_type(&env, &restriction.value)?),
            None => None,
        };

        // The specialization key: name, template args, parameter types.
        let key = spec_key(&name, &env.targs, &params);
        if let Some(existing) = self.out.func_index.get(&(module, super_id.index(), key.clone())) {
            let existing = *existing;
            let ret = self.out.functions[existing.index()]
                .ret
                .clone()
                .ok_or_else(|| {
                    Panic::new(
                        format!("Can not infer the return type of recursive `{name}`"),
                        site.map(|(_, p)| p),
                    )
                })?;
            let param_types = self.out.functions[existing.index()]
                .args
                .iter()
                .map(|(_, t)| t.clone())
                .collect();
            return Ok((existing, ret, param_types, defaults));
        }

        // Allocate the slot first.
        let spec_id = FuncSpecId(self.out.functions.len() as u32);
        self.out.functions.push(FuncSpec {
            name: name.clone(),
            key: key.clone(),
            args: params.clone(),
            ret: declared_ret,
            required_safety,
            body: Block::new(required_safety, Storage::Static),
        });
        self.out
            .func_index
            .insert((module, super_id.index(), key), spec_id);

        log::debug!(target: "onyx/mlir", "specializing `{}`", self.out.functions[spec_id.index()].key);

        // Lower the body into the slot.
        let previous_fn = self.current_fn.replace(spec_id);
        let previous_module = self.module;
        self.module = module;

        let result = self.lower_function_body(&mut env, body);

        self.module = previous_module;
        self.current_fn = previous_fn;
        result?;

        // A body with no returns yields void; a function without a
        // declared return type takes its last expression's type, which
        // `lower_function_body` turned into a return already.
        if self.out.functions[spec_id.index()].ret.is_none() {
            self.out.functions[spec_id.index()].ret = Some(Type::Void);
        }

        let spec = &self.out.functions[spec_id.index()];
        let ret = spec.ret.clone().unwrap();
        let param_types = spec.args.iter().map(|(_, t)| t.clone()).collect();
        Ok((spec_id, ret, param_types, defaults))
    }

    fn lower_function_body(
        &mut self,
        env: &mut Env,
        body: Option<&cst::Block>,
    ) -> Result<(), Panic> {
        let Some(body) = body else {
            return Ok(());
        };

        let mut block = Block::new(env.safety, Storage::Static);

        let executable: Vec<&cst::Node> = body
            .nodes
            .iter()
            .filter(|node| !matches!(node, cst::Node::EmptyLine(_) | cst::Node::Comment(_)))
            .collect();
        let count = executable.len();

        for (index, node) in executable.into_iter().enumerate() {
            let last = index + 1 == count;

            // The last bare expression becomes the implicit return value.
            if last {
                if let cst::Node::Expr(rval) = node {
                    if !matches!(rval, cst::RVal::Assign(_)) {
                        let placement = rval.placement();
                        let value = self.lower_rval(env, rval)?;
                        let value = self.finish_return(Some(value), placement)?;
                        block.exprs.push(Expr::Return(value));
                        continue;
                    }
                }
            }

            self.lower_node(env, node, &mut block)?;
        }

        if let Some(id) = self.current_fn {
            self.out.functions[id.index()].body = block;
        }
        Ok(())
    }

    /// Pick the narrowest matching implementation: the most restricted
    /// profile wins, and among equally narrow candidates the earlier
    /// declaration does. Returns an index into the superdecl's impls.
    fn pick_implementation(
        &self,
        module: usize,
        super_id: SuperId,
        arg_count: usize,
    ) -> Result<usize, Panic> {
        let superdecl = self.asts[module].superdecl(super_id);
        let impls = superdecl.function_impls();

        if impls.is_empty() {
            return Err(Panic::new(
                format!("`{}` has no implementation", superdecl.name),
                superdecl.category_placement,
            ));
        }

        let mut best: Option<(usize, usize)> = None;

        for (index, ion) in impls.iter().enumerate() {
            let (min_args, max_args) = arg_bounds(ion.cst);
            if arg_count < min_args || arg_count > max_args {
                continue;
            }

            // Narrowness: the count of restricted template arguments.
            let rank = ion
                .profile
                .args
                .iter()
                .filter(|arg| arg.restriction.is_some())
                .count();

            match best {
                None => best = Some((index, rank)),
                Some((_, best_rank)) if rank > best_rank => best = Some((index, rank)),
                _ => {}
            }
        }

        match best {
            Some((index, _)) => Ok(index),
            None => Err(Panic::new(
                format!(
                    "No matching implementation of `{}` for {arg_count} argument(s)",
                    superdecl.name
                ),
                superdecl.category_placement,
            )),
        }
    }

    // Types
    //

    fn resolve_type(&mut self, env: &Env, expr: &cst::TypeExpr) -> Result<Type, Panic> {
        match expr {
            cst::TypeExpr::LiteralKind(token) => Err(Panic::new(
                "A literal restriction is not a concrete type",
                Some(token.placement),
            )),

            cst::TypeExpr::Literal(literal) => Err(Panic::new(
                "A literal is not a type by itself",
                Some(literal.placement()),
            )),

            cst::TypeExpr::Query(query) => self.resolve_type_query(env, query),
        }
    }

    fn resolve_type_query(&mut self, env: &Env, query: &cst::IdQuery) -> Result<Type, Panic> {
        if query.elements.len() != 1 {
            return Err(Panic::new(
                "Qualified type queries are not supported here",
                Some(query.placement()),
            ));
        }

        let element = &query.elements[0];
        let name = element.id_value();

        // A C type reference, e.g. `$char*`.
        if let TokenKind::Id(id) = &element.id.kind {
            if id.kind == IdKind::C {
                let pointer_depth = id
                    .pointer_suffixes
                    .iter()
                    .map(|suffix| suffix.depth)
                    .sum::<u16>();
                return Ok(Type::CPrim {
                    id: id.value.clone(),
                    pointer_depth,
                });
            }
        }

        if let Some(ty) = env.targs.get(name) {
            return Ok(ty.clone());
        }

        match self.asts[env.module].resolve_simple(env.scope, name, query.placement())? {
            Resolved::Super(id) => self.type_from_superdecl(env, id, element),
            Resolved::TemplateArg { .. } => Err(Panic::new(
                format!("Template argument `{name}` is unbound here"),
                Some(query.placement()),
            )),
            Resolved::Imported { module, name } => {
                let id = self.asts[module].exports.get(&name).copied().ok_or_else(|| {
                    Panic::with_id(
                        PanicId::UndeclaredReference,
                        format!("Undeclared reference `{name}`"),
                        Some(query.placement()),
                    )
                })?;
                let mut imported_env = env.clone();
                imported_env.module = module;
                imported_env.scope = self.asts[module].root;
                self.type_from_superdecl(&imported_env, id, element)
            }
            _ => Err(Panic::new(
                format!("`{name}` is not a type"),
                Some(query.placement()),
            )),
        }
    }

    fn type_from_superdecl(
        &mut self,
        env: &Env,
        id: SuperId,
        element: &cst::QueryElement,
    ) -> Result<Type, Panic> {
        let superdecl = self.ast_of(env.module).superdecl(id);
        let name = superdecl.name.clone();

        match superdecl.kind {
            SuperKind::BuiltinType => match name.as_str() {
                "Bool" => Ok(Type::Bool),
                "Int8" => Ok(Type::Int(8)),
                "Int16" => Ok(Type::Int(16)),
                "Int32" => Ok(Type::Int(32)),
                "Int64" => Ok(Type::Int(64)),
                "Int" => {
                    // `Int<N>`; the bitsize defaults to 32.
                    let bits = match element.targs.first() {
                        Some(targ) => match &targ.value {
                            cst::TypeExpr::Literal(cst::Literal::Int(token)) => {
                                match &token.kind {
                                    TokenKind::Int(value) => *value as u8,
                                    _ => 32,
                                }
                            }
                            _ => {
                                return Err(Panic::new(
                                    "`Int` expects a literal bitsize",
                                    Some(targ.value.placement()),
                                ))
                            }
                        },
                        None => 32,
                    };

                    if ![8, 16, 32, 64].contains(&bits) {
                        return Err(Panic::new(
                            format!("Unsupported integer bitsize {bits}"),
                            Some(element.id.placement),
                        ));
                    }
                    Ok(Type::Int(bits))
                }
                _ => Err(Panic::new(
                    format!("Unknown builtin type `{name}`"),
                    Some(element.id.placement),
                )),
            },

            SuperKind::Struct => {
                let spec = self.specialize_struct(env.module, id)?;
                Ok(Type::Struct(spec))
            }

            SuperKind::Trait => Err(Panic::new(
                format!("Trait `{name}` is not a concrete type"),
                Some(element.id.placement),
            )),

            SuperKind::Function => Err(Panic::new(
                format!("`{name}` is a function, not a type"),
                Some(element.id.placement),
            )),
        }
    }

    /// Specialize a struct type: reserve the slot first so a
    /// self-referential field resolves to this very specialization.
    fn specialize_struct(&mut self, module: usize, id: SuperId) -> Result<TypeSpecId, Panic> {
        let key = (module, id.index(), String::new());
        if let Some(existing) = self.out.type_index.get(&key) {
            return Ok(*existing);
        }

        let superdecl = self.ast_of(module).superdecl(id);
        let name = superdecl.name.clone();

        let spec_id = TypeSpecId(self.out.types.len() as u32);
        self.out.types.push(TypeSpec {
            name: name.clone(),
            key: name.clone(),
            instance_fields: Vec::new(),
            static_fields: Vec::new(),
            instance_methods: Vec::new(),
            static_methods: Vec::new(),
        });
        self.out.type_index.insert(key, spec_id);

        let member_scope = superdecl.member_scope;
        let def_cst: Option<&'c cst::TypeDef> = match &superdecl.body {
            SuperBody::Type { def: Some(def), .. } => Some(def.cst),
            _ => None,
        };

        let mut instance_fields = Vec::new();
        let mut static_fields = Vec::new();
        let mut instance_methods = Vec::new();
        let mut static_methods = Vec::new();

        if let Some(def) = def_cst {
            if let Some(body) = &def.body {
                let env = Env {
                    module,
                    scope: member_scope.unwrap_or(self.ast_of(module).root),
                    safety: Safety::Fragile,
                    frames: vec![HashMap::new()],
                    targs: HashMap::new(),
                };

                for node in &body.nodes {
                    match node {
                        cst::Node::VarDef(var) => {
                            let ty = match &var.restriction {
                                Some(restriction) => {
                                    // A field of the struct's own type is
                                    // the recursive case.
                                    if type_is_named(&restriction.value, &name) {
                                        Type::Struct(spec_id)
                                    } else {
                                        self.resolve_type(&env, &restriction.value)?
                                    }
                                }
                                None => {
                                    return Err(Panic::new(
                                        format!(
                                            "Field `{}` needs an explicit type",
                                            var.name()
                                        ),
                                        Some(var.id.placement),
                                    ))
                                }
                            };

                            let field = Field {
                                name: var.public_name().to_string(),
                                ty,
                            };
                            if var.is_static() {
                                static_fields.push(field);
                            } else {
                                instance_fields.push(field);
                            }
                        }

                        cst::Node::FuncDecl(func) => {
                            if func
                                .modifiers
                                .iter()
                                .any(|m| m.kind == TokenKind::Keyword(
                                    onyx_language::token::Keyword::Static,
                                ))
                            {
                                static_methods.push(func.name().to_string());
                            } else {
                                instance_methods.push(func.name().to_string());
                            }
                        }

                        _ => {}
                    }
                }
            }
        }

        let slot = &mut self.out.types[spec_id.index()];
        slot.instance_fields = instance_fields;
        slot.static_fields = static_fields;
        slot.instance_methods = instance_methods;
        slot.static_methods = static_methods;

        Ok(spec_id)
    }

    fn type_from_name(&self, module: usize, name: &str) -> Option<Type> {
        match name {
            "Bool" => Some(Type::Bool),
            "Int8" => Some(Type::Int(8)),
            "Int16" => Some(Type::Int(16)),
            "Int32" | "Int" => Some(Type::Int(32)),
            "Int64" => Some(Type::Int(64)),
            _ => {
                // A literal bitsize default, e.g. `32`.
                name.parse::<u8>().ok().and_then(|bits| {
                    let _ = module;
                    [8u8, 16, 32, 64].contains(&bits).then_some(Type::Int(bits))
                })
            }
        }
    }

    /// Widen or accept a value for a target type; a mismatch panics.
    fn coerce(&self, value: RVal, ty: &Type, placement: Placement) -> Result<RVal, Panic> {
        let from = value.ty();

        if from == *ty {
            return Ok(value);
        }

        if let (Type::Int(from_bits), Type::Int(to_bits)) = (&from, ty) {
            if to_bits >= from_bits {
                return Ok(widen(value, *to_bits));
            }
        }

        // A C string fits any char pointer.
        if matches!(&value, RVal::CStr(_)) {
            if let Type::CPrim { id, pointer_depth } = ty {
                if id.contains("char") && *pointer_depth == 1 {
                    return Ok(value);
                }
            }
        }

        Err(Panic::new(
            format!("Type mismatch: expected {ty:?}, found {from:?}"),
            Some(placement),
        ))
    }
}

fn var_placement(arg: &cst::ArgDecl) -> Placement {
    match arg {
        cst::ArgDecl::Greedy(token) => token.placement,
        cst::ArgDecl::Var(var) => var.id.placement,
    }
}

/// The inclusive argument-count bounds a declaration accepts.
fn arg_bounds(func: &cst::FuncDecl) -> (usize, usize) {
    let Some(args) = &func.args else {
        return (0, 0);
    };

    let total = args
        .args
        .iter()
        .filter(|a| matches!(a, cst::ArgDecl::Var(_)))
        .count();
    let required = args
        .args
        .iter()
        .filter(|a| matches!(a, cst::ArgDecl::Var(var) if var.value.is_none()))
        .count();

    (required, total)
}

fn type_is_named(expr: &cst::TypeExpr, name: &str) -> bool {
    match expr {
        cst::TypeExpr::Query(query) => {
            query.elements.len() == 1 && query.elements[0].id_value() == name
        }
        _ => false,
    }
}

fn int_bits(ty: &Type) -> u8 {
    match ty {
        Type::Int(bits) => *bits,
        _ => 0,
    }
}

fn widen(value: RVal, bits: u8) -> RVal {
    match value {
        RVal::Int { value, .. } => RVal::Int { value, bits },
        other if int_bits(&other.ty()) == bits => other,
        other => RVal::Cast {
            value: Box::new(other),
            to: Type::Int(bits),
        },
    }
}

/// The narrowest builtin integer fitting a value.
fn narrowest_bits(value: i128) -> u8 {
    if (-128..=127).contains(&value) {
        8
    } else if (-32768..=32767).contains(&value) {
        16
    } else if (-2147483648..=2147483647).contains(&value) {
        32
    } else {
        64
    }
}

fn spec_key(name: &str, targs: &HashMap<String, Type>, params: &[(String, Type)]) -> String {
    let mut key = name.to_string();

    if !targs.is_empty() {
        let mut pairs: Vec<_> = targs.iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        key.push('<');
        for (i, (name, ty)) in pairs.iter().enumerate() {
            if i > 0 {
                key.push(',');
            }
            key.push_str(&format!("{name}:{}", type_name(ty)));
        }
        key.push('>');
    }

    key.push('(');
    for (i, (_, ty)) in params.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        key.push_str(&type_name(ty));
    }
    key.push(')');
    key
}

pub(crate) fn type_name(ty: &Type) -> String {
    match ty {
        Type::Void => "void".into(),
        Type::Bool => "Bool".into(),
        Type::Int(bits) => format!("Int{bits}"),
        Type::CPrim { id, pointer_depth } => {
            let mut out = format!("${id}");
            for _ in 0..*pointer_depth {
                out.push('*');
            }
            out
        }
        Type::Struct(id) => format!("%{}", id.index()),
    }
}

fn c_type_to_mlir(type_ref: &crate::cast::CTypeRef) -> Type {
    if type_ref.id == "void" && type_ref.pointer_depth == 0 {
        Type::Void
    } else {
        Type::CPrim {
            id: type_ref.id.clone(),
            pointer_depth: type_ref.pointer_depth,
        }
    }
}
