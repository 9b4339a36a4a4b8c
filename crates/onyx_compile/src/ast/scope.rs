//! The scope graph. Scopes live in an arena owned by the AST and refer to
//! each other by id, which keeps the parent/child and scope/superdecl
//! cycles out of the ownership graph.
//!
//! Two overlapping hierarchies share this arena: syntax scopes (lexical
//! containment, used for simple-name lookup and safety inheritance) and
//! semantic scopes (declaration ownership, used for qualified queries).

use std::collections::HashMap;

use onyx_base::{Safety, Storage};

/// An index into the AST's scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(super) u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An index into the AST's superdeclaration arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuperId(pub(super) u32);

impl SuperId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An index into the AST's variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(super) u32);

impl VarId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// The file root: both the top syntax scope and the root semantic
    /// scope.
    Root,
    /// A function body.
    FunctionBody(SuperId),
    /// A type's member scope (semantic).
    TypeMembers(SuperId),
    /// A freestanding code block.
    Block,
    /// A child scope opened by an explicit safety expression.
    SafetyOverride(Safety),
}

/// What a name binds to within a scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Super(SuperId),
    Var(VarId),
    TemplateArg {
        owner: SuperId,
        index: usize,
    },
    /// A name imported from another module, re-resolved there.
    Imported {
        module: usize,
        name: String,
    },
    /// A whole-module namespace, `import * as N`.
    Namespace {
        module: usize,
    },
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub safety: Safety,
    pub storage: Storage,
    pub bindings: HashMap<String, Binding>,
    pub children: Vec<ScopeId>,
}

impl Scope {
    pub fn new(parent: Option<ScopeId>, kind: ScopeKind, safety: Safety, storage: Storage) -> Self {
        Self {
            parent,
            kind,
            safety,
            storage,
            bindings: HashMap::new(),
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_scope_records_parent() {
        let root = Scope::new(None, ScopeKind::Root, Safety::Fragile, Storage::Static);
        assert!(root.parent.is_none());

        let child = Scope::new(
            Some(ScopeId(0)),
            ScopeKind::SafetyOverride(Safety::Unsafe),
            Safety::Unsafe,
            Storage::Static,
        );
        assert_eq!(child.parent, Some(ScopeId(0)));
        assert_eq!(child.safety, Safety::Unsafe);
    }
}
