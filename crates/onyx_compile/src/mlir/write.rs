//! Writing a module in its human-readable text format. Emission order is
//! the arenas' insertion order, so two identical builds write identical
//! text.

use std::fmt::Write as _;

use super::*;

impl Module {
    /// Render the whole module: type specializations, function
    /// specializations, then the implicit main block.
    pub fn write(&self) -> String {
        let mut out = String::new();

        for spec in &self.types {
            self.write_type(spec, &mut out);
        }

        for spec in &self.functions {
            self.write_function(spec, &mut out);
        }

        out.push_str("main {\n");
        self.write_block_body(&self.main, &mut out, 1);
        out.push_str("}\n");

        out
    }

    fn write_type(&self, spec: &TypeSpec, out: &mut String) {
        let _ = write!(out, "type %{} = {{", spec.name);

        let mut first = true;
        for field in &spec.instance_fields {
            if !first {
                out.push(',');
            }
            first = false;
            let _ = write!(out, " {}: {}", field.name, type_name(&field.ty));
        }
        for field in &spec.static_fields {
            if !first {
                out.push(',');
            }
            first = false;
            let _ = write!(out, " static {}: {}", field.name, type_name(&field.ty));
        }

        out.push_str(" }");

        if !spec.instance_methods.is_empty() || !spec.static_methods.is_empty() {
            let _ = write!(
                out,
                " // methods: {}",
                spec.instance_methods
                    .iter()
                    .chain(spec.static_methods.iter())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        out.push('\n');
    }

    fn write_function(&self, spec: &FuncSpec, out: &mut String) {
        let _ = write!(out, "def @{}(", spec.key);
        for (i, (name, ty)) in spec.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{} %{}", type_name(ty), name);
        }
        let ret = spec.ret.clone().unwrap_or(Type::Void);
        let _ = write!(out, ") : {} ", type_name(&ret));

        let _ = write!(out, "{}! {{\n", spec.required_safety);
        self.write_block_body(&spec.body, out, 1);
        out.push_str("}\n");
    }

    fn write_block_body(&self, block: &Block, out: &mut String, indent: usize) {
        for expr in &block.exprs {
            self.write_expr(expr, out, indent);
        }
    }

    fn indent(&self, out: &mut String, indent: usize) {
        for _ in 0..indent {
            out.push_str("  ");
        }
    }

    fn write_expr(&self, expr: &Expr, out: &mut String, indent: usize) {
        match expr {
            Expr::VarDecl { name, ty } => {
                self.indent(out, indent);
                let _ = writeln!(out, "decl %{name} : {}", type_name(ty));
            }

            Expr::Assign { target, value } => {
                self.indent(out, indent);
                let _ = writeln!(out, "%{target} = {}", self.rval(value));
            }

            Expr::Call(call) => {
                self.indent(out, indent);
                let _ = writeln!(out, "{}", self.call(call));
            }

            Expr::Return(value) => {
                self.indent(out, indent);
                match value {
                    Some(value) => {
                        let _ = writeln!(out, "ret {}", self.rval(value));
                    }
                    None => out.push_str("ret void\n"),
                }
            }

            Expr::If(node) => {
                self.indent(out, indent);
                let _ = writeln!(out, "if {} {{", self.rval(&node.cond));
                self.write_block_body(&node.then, out, indent + 1);
                self.indent(out, indent);
                match &node.else_ {
                    Some(else_) => {
                        out.push_str("} else {\n");
                        self.write_block_body(else_, out, indent + 1);
                        self.indent(out, indent);
                        out.push_str("}\n");
                    }
                    None => out.push_str("}\n"),
                }
            }

            Expr::While(node) => {
                self.indent(out, indent);
                let _ = writeln!(out, "while {} {{", self.rval(&node.cond));
                self.write_block_body(&node.body, out, indent + 1);
                self.indent(out, indent);
                out.push_str("}\n");
            }

            Expr::Scope(block) => {
                self.indent(out, indent);
                let _ = writeln!(out, "{}! {{", block.safety);
                self.write_block_body(block, out, indent + 1);
                self.indent(out, indent);
                out.push_str("}\n");
            }
        }
    }

    fn call(&self, call: &Call) -> String {
        let callee = match &call.callee {
            Callee::Builtin(builtin) => builtin_name(*builtin),
            Callee::C(name) => format!("@${name}"),
            Callee::Spec(id) => format!("@{}", self.functions[id.index()].key),
        };

        let args = call
            .args
            .iter()
            .map(|arg| self.rval(arg))
            .collect::<Vec<_>>()
            .join(", ");

        format!("{callee}({args})")
    }

    fn rval(&self, rval: &RVal) -> String {
        match rval {
            RVal::Void => "void".into(),
            RVal::Int { value, bits } => format!("{value}i{bits}"),
            RVal::Bool(value) => value.to_string(),
            RVal::CStr(value) => format!("$\"{value}\""),
            RVal::Var { name, .. } => format!("%{name}"),
            RVal::PointerOf { name, .. } => format!("&%{name}"),
            RVal::Call { call, .. } => self.call(call),
            RVal::Cast { value, to } => {
                format!("cast {} to {}", self.rval(value), type_name(to))
            }
        }
    }
}

fn builtin_name(builtin: Builtin) -> String {
    match builtin {
        Builtin::IntAdd(bits) => format!("@int.add.{bits}"),
        Builtin::IntSub(bits) => format!("@int.sub.{bits}"),
        Builtin::IntMul(bits) => format!("@int.mul.{bits}"),
        Builtin::IntDiv(bits) => format!("@int.div.{bits}"),
        Builtin::IntNeg(bits) => format!("@int.neg.{bits}"),
        Builtin::IntLt(bits) => format!("@int.lt.{bits}"),
        Builtin::IntLte(bits) => format!("@int.lte.{bits}"),
        Builtin::IntGt(bits) => format!("@int.gt.{bits}"),
        Builtin::IntGte(bits) => format!("@int.gte.{bits}"),
        Builtin::IntEq(bits) => format!("@int.eq.{bits}"),
        Builtin::IntNe(bits) => format!("@int.ne.{bits}"),
        Builtin::BoolAnd => "@bool.and".into(),
        Builtin::BoolOr => "@bool.or".into(),
        Builtin::BoolNot => "@bool.not".into(),
    }
}
