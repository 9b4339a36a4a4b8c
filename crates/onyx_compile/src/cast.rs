//! The C AST: a flat identifier → prototype index shared by every Onyx
//! scope of a unit, populated from each `extern` block's C CST.

use std::collections::HashMap;

use onyx_base::{Panic, Placement};
use onyx_language::c::cst;

/// A compiled C type reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CTypeRef {
    pub id: String,
    pub pointer_depth: u16,
}

impl CTypeRef {
    pub fn print(&self) -> String {
        let mut out = self.id.clone();
        for _ in 0..self.pointer_depth {
            out.push('*');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CArg {
    pub name: Option<String>,
    pub type_ref: CTypeRef,
}

/// A compiled C function prototype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CProto {
    pub name: String,
    pub return_type: CTypeRef,
    pub args: Vec<CArg>,
    pub varg: bool,
    /// Compared on re-declaration; identical re-declarations are accepted.
    pub signature: String,
    pub placement: Placement,
}

/// The per-unit C prototype index.
#[derive(Debug, Default)]
pub struct CAst {
    protos: HashMap<String, CProto>,
    /// Declaration order, for deterministic emission.
    order: Vec<String>,
}

impl CAst {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one `extern` block's CST into the index. The same name with a
    /// different signature panics with both placements.
    pub fn compile_block(&mut self, block: &cst::Root) -> Result<(), Panic> {
        for proto in &block.protos {
            self.add(proto)?;
        }
        Ok(())
    }

    fn add(&mut self, cst: &cst::FuncDecl) -> Result<(), Panic> {
        let name = cst.name_value().to_string();
        let signature = cst.signature();

        if let Some(previous) = self.protos.get(&name) {
            if previous.signature == signature {
                return Ok(());
            }
            return Err(Panic::new(
                format!("Conflicting declaration of C function `{name}`"),
                Some(cst.placement()),
            )
            .note("Previously declared here", Some(previous.placement)));
        }

        let proto = CProto {
            name: name.clone(),
            return_type: compile_type(&cst.return_type),
            args: cst
                .args
                .iter()
                .map(|arg| CArg {
                    name: arg.name_value().map(str::to_string),
                    type_ref: compile_type(&arg.type_ref),
                })
                .collect(),
            varg: cst.varg.is_some(),
            signature,
            placement: cst.placement(),
        };

        log::debug!(target: "c/ast", "indexed prototype `{name}`");
        self.order.push(name.clone());
        self.protos.insert(name, proto);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&CProto> {
        self.protos.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.protos.is_empty()
    }

    /// Prototypes in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &CProto> {
        self.order.iter().filter_map(|name| self.protos.get(name))
    }
}

fn compile_type(type_ref: &cst::TypeRef) -> CTypeRef {
    CTypeRef {
        id: type_ref.id_value().to_string(),
        pointer_depth: type_ref.pointer_depth(),
    }
}
