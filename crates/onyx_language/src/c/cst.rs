use onyx_base::Placement;

use super::token::{Token, TokenKind};

/// The C Concrete Syntax Tree: the restricted prototype grammar an
/// `extern` block may contain.
#[derive(Debug, Default)]
pub struct Root {
    pub protos: Vec<FuncDecl>,
}

impl Root {
    pub fn print_to(&self, out: &mut String) {
        for (i, proto) in self.protos.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            proto.print_to(out);
        }
    }
}

/// A type reference: an identifier plus pointer-depth tokens, e.g.
/// `char *` has depth one.
#[derive(Debug)]
pub struct TypeRef {
    pub id: Token,
    pub pointer_tokens: Vec<Token>,
}

impl TypeRef {
    pub fn id_value(&self) -> &str {
        match &self.id.kind {
            TokenKind::Id(value) => value,
            _ => "",
        }
    }

    pub fn pointer_depth(&self) -> u16 {
        self.pointer_tokens.len() as u16
    }

    pub fn placement(&self) -> Placement {
        match self.pointer_tokens.last() {
            Some(last) => self.id.placement.merge(last.placement),
            None => self.id.placement,
        }
    }

    pub fn print_to(&self, out: &mut String) {
        out.push_str(self.id_value());
        for _ in &self.pointer_tokens {
            out.push('*');
        }
    }
}

/// An ordered argument declaration in a prototype.
#[derive(Debug)]
pub struct Arg {
    pub type_ref: TypeRef,
    pub name: Option<Token>,
}

impl Arg {
    pub fn name_value(&self) -> Option<&str> {
        match &self.name {
            Some(token) => match &token.kind {
                TokenKind::Id(value) => Some(value),
                _ => None,
            },
            None => None,
        }
    }
}

/// The trailing `...` of a variadic prototype.
#[derive(Debug)]
pub struct VArg {
    pub token: Token,
}

/// A C function prototype, e.g. `int printf(const char *fmt, ...);`.
#[derive(Debug)]
pub struct FuncDecl {
    pub return_type: TypeRef,
    pub name: Token,
    pub args: Vec<Arg>,
    pub varg: Option<VArg>,
}

impl FuncDecl {
    pub fn name_value(&self) -> &str {
        match &self.name.kind {
            TokenKind::Id(value) => value,
            _ => "",
        }
    }

    pub fn placement(&self) -> Placement {
        self.return_type.placement().merge(self.name.placement)
    }

    pub fn print_to(&self, out: &mut String) {
        print_typed_name(&self.return_type, Some(self.name_value()), out);
        out.push('(');

        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            print_typed_name(&arg.type_ref, arg.name_value(), out);
        }

        if self.varg.is_some() {
            if !self.args.is_empty() {
                out.push_str(", ");
            }
            out.push_str("...");
        }

        out.push_str(");");
    }

    /// A short signature used to compare re-declarations: the return type,
    /// argument types and variadic flag, names excluded.
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.return_type.print_to(&mut out);
        out.push('(');
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            arg.type_ref.print_to(&mut out);
        }
        if self.varg.is_some() {
            out.push_str(",...");
        }
        out.push(')');
        out
    }
}

/// Print `char *s` rather than `char* s`, the way prototypes are usually
/// written.
fn print_typed_name(type_ref: &TypeRef, name: Option<&str>, out: &mut String) {
    out.push_str(type_ref.id_value());

    match name {
        Some(name) => {
            out.push(' ');
            for _ in &type_ref.pointer_tokens {
                out.push('*');
            }
            out.push_str(name);
        }
        None => {
            for _ in &type_ref.pointer_tokens {
                out.push('*');
            }
        }
    }
}
