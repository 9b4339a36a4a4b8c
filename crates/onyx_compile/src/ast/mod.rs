//! The Onyx Abstract Syntax Tree: a single pass over a unit's CST that
//! builds the scope graph, merges declarations and implementations into
//! superdeclarations, indexes `extern` C prototypes, and collects the
//! top-level executable code for the implicit main.
//!
//! Panics are caught per top-level item: the offending item is skipped,
//! recorded, and the remainder of the tree stays queryable.

pub mod scope;
pub mod targs;

use std::collections::HashMap;

use onyx_base::{Panic, PanicId, Placement, Safety, Storage, UnitId};
use onyx_language::cst;
use onyx_language::token::{IdLiteral, Keyword, TokenKind};

use crate::cast::{CAst, CProto};

pub use scope::{Binding, Scope, ScopeId, ScopeKind, SuperId, VarId};
pub use targs::{TargConflict, TargDecl, TargProfile};

/// The category of a superdeclaration. Categories are disjoint: merging a
/// contributor of a different category is a `P0001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperKind {
    Function,
    Trait,
    Struct,
    /// A compiler-known type, e.g. `def builtin Int`.
    BuiltinType,
}

impl SuperKind {
    pub fn name(self) -> &'static str {
        match self {
            SuperKind::Function => "function",
            SuperKind::Trait => "trait",
            SuperKind::Struct => "struct",
            SuperKind::BuiltinType => "builtin",
        }
    }
}

/// A function contributor: a `decl`, `impl`, `def` or `reimpl`.
#[derive(Debug)]
pub struct FuncIon<'c> {
    pub action: cst::Action,
    pub cst: &'c cst::FuncDecl,
    pub profile: TargProfile,
    pub required_safety: Safety,
    /// The body's syntax scope, with arguments and template args bound.
    pub body_scope: Option<ScopeId>,
    pub docs: Option<String>,
}

/// A type contributor: a `decl`, `def` or an extension.
#[derive(Debug)]
pub struct TypeIon<'c> {
    pub action: cst::Action,
    pub cst: &'c cst::TypeDef,
    pub profile: TargProfile,
    pub docs: Option<String>,
}

#[derive(Debug)]
pub enum SuperBody<'c> {
    Function {
        decls: Vec<FuncIon<'c>>,
        impls: Vec<FuncIon<'c>>,
    },
    Type {
        decls: Vec<TypeIon<'c>>,
        def: Option<TypeIon<'c>>,
        exts: Vec<TypeIon<'c>>,
    },
}

/// An AST-level aggregator for all declarations and implementations
/// sharing a name within a scope. Never empty (the compiler-provided
/// builtins excepted): removing the last contributor destroys it.
#[derive(Debug)]
pub struct Superdecl<'c> {
    pub name: String,
    pub kind: SuperKind,
    /// The owning semantic scope.
    pub scope: ScopeId,
    pub profile: TargProfile,
    pub exported: bool,
    pub builtin: bool,
    /// The keyword that fixed this superdecl's category, for mismatch
    /// notes.
    pub category_placement: Option<Placement>,
    /// The member semantic scope, for types.
    pub member_scope: Option<ScopeId>,
    pub body: SuperBody<'c>,
}

impl<'c> Superdecl<'c> {
    pub fn contributor_count(&self) -> usize {
        match &self.body {
            SuperBody::Function { decls, impls } => decls.len() + impls.len(),
            SuperBody::Type { decls, def, exts } => {
                decls.len() + usize::from(def.is_some()) + exts.len()
            }
        }
    }

    pub fn function_impls(&self) -> &[FuncIon<'c>] {
        match &self.body {
            SuperBody::Function { impls, .. } => impls,
            SuperBody::Type { .. } => &[],
        }
    }
}

/// A runtime variable or argument entity.
#[derive(Debug)]
pub struct VarEntity<'c> {
    pub name: String,
    pub cst: Option<&'c cst::VarDef>,
    pub scope: ScopeId,
    pub is_static: bool,
    pub is_final: bool,
    pub placement: Option<Placement>,
}

/// A top-level executable item, collected for the implicit main.
#[derive(Debug)]
pub enum MainExpr<'c> {
    Var(VarId),
    Node(&'c cst::Node),
}

/// A resolved simple-name reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Super(SuperId),
    Var(VarId),
    TemplateArg { owner: SuperId, index: usize },
    Imported { module: usize, name: String },
    Namespace { module: usize },
    Literal(IdLiteral),
    /// A C function prototype reached through the C AST.
    C(CProto),
}

#[derive(Debug)]
pub struct Ast<'c> {
    pub unit: UnitId,
    pub scopes: Vec<Scope>,
    /// Tombstoned on removal so ids stay stable.
    pub superdecls: Vec<Option<Superdecl<'c>>>,
    pub vars: Vec<VarEntity<'c>>,
    pub root: ScopeId,
    pub c_ast: CAst,
    pub main: Vec<MainExpr<'c>>,
    pub exports: HashMap<String, SuperId>,
    /// Per-item panics recovered during construction.
    pub panics: Vec<Panic>,
}

impl<'c> Ast<'c> {
    /// Compile a CST into an AST. `import_map` maps import path strings of
    /// this unit to indices into `built`, the modules compiled so far.
    pub fn build(
        unit: UnitId,
        cst: &'c cst::Root,
        import_map: &HashMap<String, usize>,
        built: &[Ast<'c>],
    ) -> Ast<'c> {
        let mut ast = Ast {
            unit,
            scopes: vec![Scope::new(
                None,
                ScopeKind::Root,
                Safety::Fragile,
                Storage::Static,
            )],
            superdecls: Vec::new(),
            vars: Vec::new(),
            root: ScopeId(0),
            c_ast: CAst::new(),
            main: Vec::new(),
            exports: HashMap::new(),
            panics: Vec::new(),
        };

        ast.register_builtins();

        let mut export_directives = Vec::new();

        for node in &cst.children {
            let result = ast.compile_top(node, import_map, built, &mut export_directives);
            if let Err(panic) = result {
                log::debug!(target: "onyx/ast", "recovered from a panic: {panic}");
                ast.panics.push(panic);
            }
        }

        for export in export_directives {
            if let Err(panic) = ast.apply_export(export) {
                ast.panics.push(panic);
            }
        }

        ast
    }

    /// The compiler-known builtin types: `Int8` … `Int64`, plus the
    /// generic `Int` with a `Bitsize` argument defaulting to 32.
    fn register_builtins(&mut self) {
        for name in ["Int8", "Int16", "Int32", "Int64", "Bool"] {
            self.add_builtin_type(name, TargProfile::default());
        }

        self.add_builtin_type(
            "Int",
            TargProfile {
                args: vec![TargDecl {
                    alias: Some("Bitsize".into()),
                    name: "Bitsize".into(),
                    restriction: Some("\\Int".into()),
                    default_value: Some("32".into()),
                    placement: Placement::point(self.unit, onyx_base::Position::default()),
                }],
            },
        );
    }

    fn add_builtin_type(&mut self, name: &str, profile: TargProfile) {
        let id = SuperId(self.superdecls.len() as u32);
        self.superdecls.push(Some(Superdecl {
            name: name.to_string(),
            kind: SuperKind::BuiltinType,
            scope: self.root,
            profile,
            exported: false,
            builtin: true,
            category_placement: None,
            member_scope: None,
            body: SuperBody::Type {
                decls: Vec::new(),
                def: None,
                exts: Vec::new(),
            },
        }));
        self.scopes[self.root.index()]
            .bindings
            .insert(name.to_string(), Binding::Super(id));
    }

    fn compile_top(
        &mut self,
        node: &'c cst::Node,
        import_map: &HashMap<String, usize>,
        built: &[Ast<'c>],
        export_directives: &mut Vec<&'c cst::Export>,
    ) -> Result<(), Panic> {
        match node {
            cst::Node::EmptyLine(_) | cst::Node::Comment(_) => Ok(()),

            cst::Node::Extern(ext) => self.c_ast.compile_block(&ext.block),

            cst::Node::Import(import) => self.compile_import(import, import_map, built),

            cst::Node::Export(export) => {
                export_directives.push(export);
                Ok(())
            }

            cst::Node::Alias(alias) => self.compile_alias(alias),

            cst::Node::VarDef(var) => {
                let id = self.compile_var(self.root, var)?;
                self.main.push(MainExpr::Var(id));
                Ok(())
            }

            cst::Node::FuncDecl(func) => {
                self.compile_func(self.root, func)?;
                Ok(())
            }

            cst::Node::TypeDef(def) => {
                self.compile_type(self.root, def)?;
                Ok(())
            }

            cst::Node::If(_)
            | cst::Node::While(_)
            | cst::Node::Switch(_)
            | cst::Node::Return(_)
            | cst::Node::Block(_)
            | cst::Node::Expr(_) => {
                self.main.push(MainExpr::Node(node));
                Ok(())
            }
        }
    }

    fn compile_import(
        &mut self,
        import: &cst::Import,
        import_map: &HashMap<String, usize>,
        built: &[Ast<'c>],
    ) -> Result<(), Panic> {
        let path = import.path_value().to_string();
        let module = match import_map.get(&path) {
            Some(module) => *module,
            None => {
                return Err(Panic::new(
                    format!("Can not resolve import path \"{path}\""),
                    Some(import.path.placement),
                ))
            }
        };

        for element in &import.elements {
            let binding = match element.id_value() {
                None => Binding::Namespace { module },
                Some(source) => {
                    // The source name must actually be exported there.
                    if !built[module].exports.contains_key(source) {
                        return Err(Panic::with_id(
                            PanicId::UndeclaredReference,
                            format!("Module \"{path}\" does not export `{source}`"),
                            element.id.as_ref().map(|t| t.placement),
                        ));
                    }
                    Binding::Imported {
                        module,
                        name: source.to_string(),
                    }
                }
            };

            let Some(bound) = element.bound_name() else {
                return Err(Panic::new(
                    "A wildcard import requires an `as` alias",
                    Some(import.keyword.placement),
                ));
            };

            if self.scopes[self.root.index()].bindings.contains_key(bound) {
                return Err(Panic::with_id(
                    PanicId::AlreadyDeclared,
                    format!("Already declared `{bound}`"),
                    element.id.as_ref().map(|t| t.placement),
                ));
            }

            self.scopes[self.root.index()]
                .bindings
                .insert(bound.to_string(), binding);
        }

        Ok(())
    }

    fn compile_alias(&mut self, alias: &cst::Alias) -> Result<(), Panic> {
        let source = alias.source.name().to_string();
        let target = alias.target.name();

        let binding = match self.lookup(self.root, target) {
            Some(binding) => binding.clone(),
            None => {
                return Err(Panic::with_id(
                    PanicId::UndeclaredReference,
                    format!("Undeclared reference `{target}`"),
                    Some(alias.target.placement()),
                ))
            }
        };

        self.scopes[self.root.index()].bindings.insert(source, binding);
        Ok(())
    }

    fn apply_export(&mut self, export: &cst::Export) -> Result<(), Panic> {
        for id in &export.ids {
            let name = id.name().to_string();

            let found = match self.lookup(self.root, &name) {
                Some(Binding::Super(super_id)) => Some(*super_id),
                _ => None,
            };

            match found {
                Some(super_id) => self.mark_exported(super_id),
                None => {
                    return Err(Panic::with_id(
                        PanicId::UndeclaredReference,
                        format!("Undeclared reference `{name}`"),
                        Some(id.placement()),
                    ))
                }
            }
        }
        Ok(())
    }

    fn mark_exported(&mut self, id: SuperId) {
        if let Some(superdecl) = self.superdecls[id.index()].as_mut() {
            superdecl.exported = true;
            self.exports.insert(superdecl.name.clone(), id);
        }
    }

    fn compile_var(&mut self, scope: ScopeId, var: &'c cst::VarDef) -> Result<VarId, Panic> {
        let name = var.public_name().to_string();

        // Checks run before any state changes, so a panic leaves nothing
        // partially constructed behind.
        if var.export_keyword.is_some() {
            return Err(Panic::new(
                "Exporting a variable is not supported",
                var.export_keyword.as_ref().map(|t| t.placement),
            ));
        }

        if let Some(previous) = self.scopes[scope.index()].bindings.get(&name) {
            let note = self.binding_placement(previous);
            return Err(Panic::with_id(
                PanicId::AlreadyDeclared,
                format!("Already declared `{name}`"),
                Some(var.id.placement),
            )
            .note("Previously declared here", note));
        }

        let is_final = matches!(
            var.keyword.as_ref().map(|t| &t.kind),
            Some(TokenKind::Keyword(Keyword::Final))
        );

        let id = VarId(self.vars.len() as u32);
        self.vars.push(VarEntity {
            name: name.clone(),
            cst: Some(var),
            scope,
            is_static: var.is_static(),
            is_final,
            placement: Some(var.id.placement),
        });
        self.scopes[scope.index()]
            .bindings
            .insert(name, Binding::Var(id));

        Ok(id)
    }

    fn compile_func(&mut self, scope: ScopeId, func: &'c cst::FuncDecl) -> Result<SuperId, Panic> {
        let owner_scope = if func.id.is_simple() {
            scope
        } else {
            self.resolve_owner_scope(scope, &func.id)?
        };

        let name = func.id.name().to_string();
        let profile = function_profile(func);

        self.check_targ_shadowing(owner_scope, &name, &profile)?;

        let existing = self.scopes[owner_scope.index()].bindings.get(&name).cloned();
        let super_id = match existing {
            Some(Binding::Super(id)) => {
                let superdecl = self.superdecl(id);
                if superdecl.kind != SuperKind::Function {
                    return Err(self.category_mismatch(
                        &name,
                        superdecl.kind,
                        func.action.placement,
                        superdecl.category_placement,
                    ));
                }

                if let Err(conflict) = superdecl.profile.compatible(&profile) {
                    return Err(conflict.into_panic(&name));
                }

                // The first non-empty profile becomes the superdecl's.
                if self.superdecl(id).profile.is_empty() && !profile.is_empty() {
                    if let Some(s) = self.superdecls[id.index()].as_mut() {
                        s.profile = profile.clone();
                    }
                }

                id
            }

            Some(other) => {
                let note = self.binding_placement(&other);
                return Err(Panic::with_id(
                    PanicId::DeclarationCategoryMismatch,
                    format!("Already declared `{name}` as a non-function"),
                    Some(func.action.placement),
                )
                .note("Previously declared here", note));
            }

            None => {
                let id = SuperId(self.superdecls.len() as u32);
                self.superdecls.push(Some(Superdecl {
                    name: name.clone(),
                    kind: SuperKind::Function,
                    scope: owner_scope,
                    profile: profile.clone(),
                    exported: false,
                    builtin: false,
                    category_placement: Some(func.action.placement),
                    member_scope: None,
                    body: SuperBody::Function {
                        decls: Vec::new(),
                        impls: Vec::new(),
                    },
                }));
                self.scopes[owner_scope.index()]
                    .bindings
                    .insert(name.clone(), Binding::Super(id));
                id
            }
        };

        let freshly_created = self.superdecl(super_id).contributor_count() == 0;
        let required_safety = declared_safety(&func.modifiers).unwrap_or(Safety::Fragile);

        let body_scope = if func.body.is_some() {
            match self.build_body_scope(scope, super_id, func, required_safety) {
                Ok(scope) => Some(scope),
                Err(panic) => {
                    // A panicking item must not leave a contributor-less
                    // superdecl behind.
                    if freshly_created {
                        let name = self.superdecl(super_id).name.clone();
                        let owner = self.superdecl(super_id).scope;
                        self.superdecls[super_id.index()] = None;
                        self.scopes[owner.index()].bindings.remove(&name);
                    }
                    return Err(panic);
                }
            }
        } else {
            None
        };

        let ion = FuncIon {
            action: func.action(),
            cst: func,
            profile,
            required_safety,
            body_scope,
            docs: func.docs.as_ref().map(|d| d.text()),
        };

        match func.action() {
            cst::Action::Decl => self.push_func_decl(super_id, ion),
            _ => self.push_func_impl(super_id, ion),
        }

        if func.export_keyword.is_some() {
            self.mark_exported(super_id);
        }

        log::debug!(target: "onyx/ast", "merged function `{name}`");
        Ok(super_id)
    }

    fn push_func_decl(&mut self, id: SuperId, ion: FuncIon<'c>) {
        if let Some(Superdecl {
            body: SuperBody::Function { decls, .. },
            ..
        }) = self.superdecls[id.index()].as_mut()
        {
            decls.push(ion);
        }
    }

    fn push_func_impl(&mut self, id: SuperId, ion: FuncIon<'c>) {
        if let Some(Superdecl {
            body: SuperBody::Function { impls, .. },
            ..
        }) = self.superdecls[id.index()].as_mut()
        {
            impls.push(ion);
        }
    }

    /// Build the syntax scope of a function body: arguments and template
    /// arguments become bindings.
    fn build_body_scope(
        &mut self,
        parent: ScopeId,
        owner: SuperId,
        func: &'c cst::FuncDecl,
        safety: Safety,
    ) -> Result<ScopeId, Panic> {
        let scope = self.add_scope(parent, ScopeKind::FunctionBody(owner), safety);

        if let Some(args) = &func.args {
            for arg in &args.args {
                if let cst::ArgDecl::Var(var) = arg {
                    self.compile_var(scope, var)?;
                }
            }
        }

        let targs = func
            .targs
            .as_ref()
            .or(func.forall.as_ref().map(|f| &f.args));
        if let Some(targs) = targs {
            let mut index = 0;
            for arg in &targs.args {
                if let cst::ArgDecl::Var(var) = arg {
                    let public = var.public_name().to_string();
                    self.scopes[scope.index()]
                        .bindings
                        .insert(public, Binding::TemplateArg { owner, index });
                    index += 1;
                }
            }
        }

        Ok(scope)
    }

    fn compile_type(&mut self, scope: ScopeId, def: &'c cst::TypeDef) -> Result<SuperId, Panic> {
        let name = def.id.name().to_string();
        let kind = self.type_category(def)?;
        let profile = type_profile(def);

        self.check_targ_shadowing(scope, &name, &profile)?;

        let existing = self.scopes[scope.index()].bindings.get(&name).cloned();
        let super_id = match existing {
            Some(Binding::Super(id)) => {
                let superdecl = self.superdecl(id);

                let kind = match kind {
                    Some(kind) => kind,
                    None => superdecl.kind,
                };

                if superdecl.kind != kind {
                    let primary = def
                        .category_placement()
                        .or(def.action.as_ref().map(|t| t.placement))
                        .unwrap_or(def.id.placement());
                    return Err(self.category_mismatch(
                        &name,
                        superdecl.kind,
                        primary,
                        superdecl.category_placement,
                    ));
                }

                if let Err(conflict) = superdecl.profile.compatible(&profile) {
                    return Err(conflict.into_panic(&name));
                }

                if self.superdecl(id).profile.is_empty() && !profile.is_empty() {
                    if let Some(s) = self.superdecls[id.index()].as_mut() {
                        s.profile = profile.clone();
                    }
                }

                id
            }

            Some(other) => {
                let note = self.binding_placement(&other);
                return Err(Panic::with_id(
                    PanicId::DeclarationCategoryMismatch,
                    format!("Already declared `{name}` as a non-type"),
                    Some(def.id.placement()),
                )
                .note("Previously declared here", note));
            }

            None => {
                let kind = match kind {
                    Some(kind) => kind,
                    None => {
                        return Err(Panic::new(
                            format!("`{name}` needs a type category, e.g. `struct`"),
                            Some(def.id.placement()),
                        ))
                    }
                };

                let id = SuperId(self.superdecls.len() as u32);
                self.superdecls.push(Some(Superdecl {
                    name: name.clone(),
                    kind,
                    scope,
                    profile: profile.clone(),
                    exported: false,
                    builtin: false,
                    category_placement: def
                        .category_placement()
                        .or(def.action.as_ref().map(|t| t.placement)),
                    member_scope: None,
                    body: SuperBody::Type {
                        decls: Vec::new(),
                        def: None,
                        exts: Vec::new(),
                    },
                }));
                self.scopes[scope.index()]
                    .bindings
                    .insert(name.clone(), Binding::Super(id));
                id
            }
        };

        let ion = TypeIon {
            action: def.action(),
            cst: def,
            profile,
            docs: def.docs.as_ref().map(|d| d.text()),
        };

        match def.action() {
            cst::Action::Decl => {
                if let Some(Superdecl {
                    body: SuperBody::Type { decls, .. },
                    ..
                }) = self.superdecls[super_id.index()].as_mut()
                {
                    decls.push(ion);
                }
            }
            cst::Action::Def => {
                let previous = match &self.superdecl(super_id).body {
                    SuperBody::Type { def: Some(d), .. } => Some(d.cst.id.placement()),
                    _ => None,
                };
                if let Some(previous) = previous {
                    return Err(Panic::with_id(
                        PanicId::AlreadyDeclared,
                        format!("`{name}` is already defined"),
                        Some(def.id.placement()),
                    )
                    .note("Previously defined here", Some(previous)));
                }

                if let Some(Superdecl {
                    body: SuperBody::Type { def: slot, .. },
                    ..
                }) = self.superdecls[super_id.index()].as_mut()
                {
                    *slot = Some(ion);
                }
            }
            _ => {
                if let Some(Superdecl {
                    body: SuperBody::Type { exts, .. },
                    ..
                }) = self.superdecls[super_id.index()].as_mut()
                {
                    exts.push(ion);
                }
            }
        }

        if def.body.is_some() {
            self.compile_type_members(scope, super_id, def)?;
        }

        if def.export_keyword.is_some() {
            self.mark_exported(super_id);
        }

        log::debug!(target: "onyx/ast", "merged type `{name}`");
        Ok(super_id)
    }

    fn compile_type_members(
        &mut self,
        parent: ScopeId,
        owner: SuperId,
        def: &'c cst::TypeDef,
    ) -> Result<(), Panic> {
        let members = match self.superdecl(owner).member_scope {
            Some(scope) => scope,
            None => {
                let scope = self.add_scope(parent, ScopeKind::TypeMembers(owner), Safety::Fragile);
                if let Some(s) = self.superdecls[owner.index()].as_mut() {
                    s.member_scope = Some(scope);
                }
                scope
            }
        };

        let Some(body) = &def.body else {
            return Ok(());
        };

        for node in &body.nodes {
            match node {
                cst::Node::VarDef(var) => {
                    self.compile_var(members, var)?;
                }
                cst::Node::FuncDecl(func) => {
                    self.compile_func(members, func)?;
                }
                cst::Node::TypeDef(nested) => {
                    self.compile_type(members, nested)?;
                }
                cst::Node::Comment(_) | cst::Node::EmptyLine(_) => {}
                other => {
                    return Err(Panic::new(
                        "Only declarations may appear in a type body",
                        other.placement(),
                    ))
                }
            }
        }

        Ok(())
    }

    fn type_category(&self, def: &cst::TypeDef) -> Result<Option<SuperKind>, Panic> {
        let Some(category) = &def.category else {
            return Ok(None);
        };

        match &category.kind {
            TokenKind::Keyword(Keyword::Trait) => Ok(Some(SuperKind::Trait)),
            TokenKind::Keyword(Keyword::Struct) => Ok(Some(SuperKind::Struct)),
            TokenKind::Keyword(Keyword::Builtin) => Ok(Some(SuperKind::BuiltinType)),
            TokenKind::Keyword(keyword) => Err(Panic::new(
                format!("The `{}` type category is not supported", keyword.as_str()),
                Some(category.placement),
            )),
            _ => Ok(None),
        }
    }

    fn category_mismatch(
        &self,
        name: &str,
        previous: SuperKind,
        placement: Placement,
        previous_placement: Option<Placement>,
    ) -> Panic {
        Panic::with_id(
            PanicId::DeclarationCategoryMismatch,
            format!("Already declared `{name}` as {}", previous.name()),
            Some(placement),
        )
        .note("Previously declared here", previous_placement)
    }

    /// A template argument may not shadow an outer variable or type, the
    /// enclosing entity's name, or a sibling template argument.
    fn check_targ_shadowing(
        &self,
        scope: ScopeId,
        entity_name: &str,
        profile: &TargProfile,
    ) -> Result<(), Panic> {
        for (index, targ) in profile.args.iter().enumerate() {
            let public = targ.alias.as_deref().unwrap_or(&targ.name);

            if public == entity_name {
                return Err(Panic::new(
                    format!("Template argument `{public}` shadows the declared entity"),
                    Some(targ.placement),
                ));
            }

            let duplicate = profile.args[..index]
                .iter()
                .any(|other| other.alias.as_deref().unwrap_or(&other.name) == public);
            if duplicate {
                return Err(Panic::new(
                    format!("Duplicate template argument `{public}`"),
                    Some(targ.placement),
                ));
            }

            match self.lookup(scope, public) {
                Some(Binding::Var(_)) => {
                    return Err(Panic::new(
                        format!("Template argument `{public}` shadows an outer variable"),
                        Some(targ.placement),
                    ))
                }
                Some(Binding::Super(id)) if self.superdecl(*id).kind != SuperKind::Function => {
                    // Shadowing a builtin type name is tolerated; a user
                    // type is not.
                    if !self.superdecl(*id).builtin {
                        return Err(Panic::new(
                            format!("Template argument `{public}` shadows an outer type"),
                            Some(targ.placement),
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Resolve the owner scope of a qualified declaration id, e.g. the
    /// member scope of `Foo` for `impl Foo::bar`.
    fn resolve_owner_scope(&mut self, from: ScopeId, query: &cst::IdQuery) -> Result<ScopeId, Panic> {
        if query.elements.len() != 2 {
            return Err(Panic::new(
                "Only single-level qualified declarations are supported",
                Some(query.placement()),
            ));
        }

        let owner_name = query.elements[0].id_value();
        let owner = match self.lookup(from, owner_name) {
            Some(Binding::Super(id)) => Some(*id),
            _ => None,
        };

        let Some(id) = owner else {
            return Err(Panic::with_id(
                PanicId::UndeclaredReference,
                format!("Undeclared reference `{owner_name}`"),
                Some(query.elements[0].id.placement),
            ));
        };

        match self.superdecl(id).member_scope {
            Some(scope) => Ok(scope),
            None => {
                let scope = self.add_scope(from, ScopeKind::TypeMembers(id), Safety::Fragile);
                if let Some(s) = self.superdecls[id.index()].as_mut() {
                    s.member_scope = Some(scope);
                }
                Ok(scope)
            }
        }
    }

    // Queries
    //

    pub fn superdecl(&self, id: SuperId) -> &Superdecl<'c> {
        self.superdecls[id.index()]
            .as_ref()
            .expect("use of a destroyed superdecl")
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn var(&self, id: VarId) -> &VarEntity<'c> {
        &self.vars[id.index()]
    }

    pub fn add_scope(&mut self, parent: ScopeId, kind: ScopeKind, safety: Safety) -> ScopeId {
        let storage = self.scopes[parent.index()].storage;
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes
            .push(Scope::new(Some(parent), kind, safety, storage));
        self.scopes[parent.index()].children.push(id);
        id
    }

    /// Look a simple name up the syntax scope chain.
    pub fn lookup(&self, from: ScopeId, name: &str) -> Option<&Binding> {
        let mut scope = Some(from);
        while let Some(id) = scope {
            if let Some(binding) = self.scopes[id.index()].bindings.get(name) {
                return Some(binding);
            }
            scope = self.scopes[id.index()].parent;
        }
        None
    }

    /// Full simple-name resolution per the lookup order: the current
    /// scope's local declarations first, then the well-known identifier
    /// literals, then the C identifiers of the unit's C AST, then the
    /// parent chain. A miss is a `P0002`.
    pub fn resolve_simple(
        &self,
        from: ScopeId,
        name: &str,
        placement: Placement,
    ) -> Result<Resolved, Panic> {
        let mut scope = Some(from);
        let mut first = true;

        while let Some(id) = scope {
            if let Some(binding) = self.scopes[id.index()].bindings.get(name) {
                return Ok(match binding {
                    Binding::Super(id) => Resolved::Super(*id),
                    Binding::Var(id) => Resolved::Var(*id),
                    Binding::TemplateArg { owner, index } => Resolved::TemplateArg {
                        owner: *owner,
                        index: *index,
                    },
                    Binding::Imported { module, name } => Resolved::Imported {
                        module: *module,
                        name: name.clone(),
                    },
                    Binding::Namespace { module } => Resolved::Namespace { module: *module },
                });
            }

            if first {
                if let Some(literal) = onyx_language::token::IdLiteral::parse(name) {
                    return Ok(Resolved::Literal(literal));
                }

                // An `extern` prototype is reachable by its bare name
                // wherever no Onyx declaration shadows it.
                if let Some(proto) = self.c_ast.find(name) {
                    return Ok(Resolved::C(proto.clone()));
                }

                first = false;
            }

            scope = self.scopes[id.index()].parent;
        }

        Err(Panic::with_id(
            PanicId::UndeclaredReference,
            format!("Undeclared reference `{name}`"),
            Some(placement),
        ))
    }

    /// Remove the most recent contributor of a superdecl. When the last
    /// one goes, the superdecl is destroyed and unbound; returns `true`
    /// in that case.
    pub fn remove_last_contributor(&mut self, id: SuperId) -> bool {
        let Some(superdecl) = self.superdecls[id.index()].as_mut() else {
            return false;
        };

        match &mut superdecl.body {
            SuperBody::Function { decls, impls } => {
                if impls.pop().is_none() {
                    decls.pop();
                }
            }
            SuperBody::Type { decls, def, exts } => {
                if exts.pop().is_none() && def.take().is_none() {
                    decls.pop();
                }
            }
        }

        if superdecl.contributor_count() == 0 && !superdecl.builtin {
            let name = superdecl.name.clone();
            let scope = superdecl.scope;
            self.superdecls[id.index()] = None;
            self.scopes[scope.index()].bindings.remove(&name);
            self.exports.remove(&name);
            true
        } else {
            false
        }
    }

    fn binding_placement(&self, binding: &Binding) -> Option<Placement> {
        match binding {
            Binding::Super(id) => self.superdecls[id.index()]
                .as_ref()
                .and_then(|s| s.category_placement),
            Binding::Var(id) => self.vars[id.index()].placement,
            _ => None,
        }
    }
}

/// Resolve a name within `module`, following import bindings across the
/// built module set.
pub fn resolve_name<'a, 'c>(
    asts: &'a [Ast<'c>],
    module: usize,
    scope: ScopeId,
    name: &str,
    placement: Placement,
) -> Result<(usize, SuperId), Panic> {
    let ast = &asts[module];
    match ast.resolve_simple(scope, name, placement)? {
        Resolved::Super(id) => Ok((module, id)),
        Resolved::Imported { module: target, name } => {
            match asts[target].exports.get(&name) {
                Some(id) => Ok((target, *id)),
                None => Err(Panic::with_id(
                    PanicId::UndeclaredReference,
                    format!("Undeclared reference `{name}`"),
                    Some(placement),
                )),
            }
        }
        _ => Err(Panic::new(
            format!("`{name}` is not a declaration"),
            Some(placement),
        )),
    }
}

fn function_profile(func: &cst::FuncDecl) -> TargProfile {
    match (&func.targs, &func.forall) {
        (Some(targs), _) => TargProfile::from_args_decl(targs),
        (None, Some(forall)) => TargProfile::from_args_decl(&forall.args),
        (None, None) => TargProfile::default(),
    }
}

fn type_profile(def: &cst::TypeDef) -> TargProfile {
    match (&def.targs, &def.forall) {
        (Some(targs), _) => TargProfile::from_args_decl(targs),
        (None, Some(forall)) => TargProfile::from_args_decl(&forall.args),
        (None, None) => TargProfile::default(),
    }
}

/// The safety a declaration's modifiers demand, if any.
pub fn declared_safety(modifiers: &[onyx_language::token::Token]) -> Option<Safety> {
    for modifier in modifiers {
        match &modifier.kind {
            TokenKind::Keyword(Keyword::Unsafe) => return Some(Safety::Unsafe),
            TokenKind::Keyword(Keyword::Fragile) => return Some(Safety::Fragile),
            TokenKind::Keyword(Keyword::Threadsafe) => return Some(Safety::Threadsafe),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests;
