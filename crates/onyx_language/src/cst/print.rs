//! Printing a CST back to source text. Inter-token whitespace normalizes
//! to single spaces; blocks re-print in their recorded style, and an
//! `EmptyLine` node re-prints as one blank line.

use super::*;

const INDENT: &str = "  ";

impl Root {
    pub fn print(&self) -> String {
        let mut out = String::new();
        print_nodes(&self.children, &mut out, 0);
        out
    }
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str(INDENT);
    }
}

fn print_nodes(nodes: &[Node], out: &mut String, indent: usize) {
    for node in nodes {
        match node {
            Node::EmptyLine(_) => {
                out.push('\n');
            }
            other => {
                push_indent(out, indent);
                print_node(other, out, indent);
                out.push('\n');
            }
        }
    }
}

fn print_node(node: &Node, out: &mut String, indent: usize) {
    match node {
        Node::EmptyLine(_) => {}
        Node::Comment(comment) => print_comment(comment, out, indent, false),
        Node::Extern(node) => {
            out.push_str("extern ");
            if let Some(abi) = &node.abi {
                out.push_str(&abi.kind.print());
                out.push(' ');
            }
            if node.braces.is_some() {
                out.push_str("{ ");
                node.block.print_to(out);
                out.push_str(" }");
            } else {
                node.block.print_to(out);
            }
        }
        Node::Import(node) => print_import(node, out),
        Node::Export(node) => {
            out.push_str("export");
            for (i, id) in node.ids.iter().enumerate() {
                out.push_str(if i == 0 { " " } else { ", " });
                print_query(id, out);
            }
        }
        Node::Alias(node) => {
            out.push_str("alias ");
            print_query(&node.source, out);
            out.push_str(" => ");
            print_query(&node.target, out);
        }
        Node::VarDef(node) => print_var_def(node, out, indent),
        Node::FuncDecl(node) => print_func_decl(node, out, indent),
        Node::TypeDef(node) => print_type_def(node, out, indent),
        Node::If(node) => print_if(node, out, indent),
        Node::While(node) => print_while(node, out, indent),
        Node::Switch(node) => print_switch(node, out, indent),
        Node::Return(node) => {
            out.push_str("return");
            if let Some(value) = &node.value {
                out.push(' ');
                print_rval(value, out, indent);
            }
        }
        Node::Block(block) => print_block(block, out, indent),
        Node::Expr(rval) => print_rval(rval, out, indent),
    }
}

fn print_comment(comment: &Comment, out: &mut String, indent: usize, lead_indent: bool) {
    for (i, token) in comment.tokens.iter().enumerate() {
        if i > 0 || lead_indent {
            if i > 0 {
                out.push('\n');
            }
            push_indent(out, indent);
        }
        out.push_str(&token.kind.print());
    }
}

fn print_import(node: &Import, out: &mut String) {
    out.push_str("import ");

    let mut wrapped = false;
    for (i, element) in node.elements.iter().enumerate() {
        if element.extracted && !wrapped {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str("{ ");
            wrapped = true;
        } else if !element.extracted && wrapped {
            out.push_str(" }");
            wrapped = false;
            out.push_str(", ");
        } else if i > 0 {
            out.push_str(", ");
        }

        match &element.id {
            Some(token) => out.push_str(&token.kind.print()),
            None => out.push('*'),
        }

        if let Some(alias) = &element.alias {
            out.push_str(" as ");
            out.push_str(&alias.id.kind.print());
        }
    }

    if wrapped {
        out.push_str(" }");
    }

    out.push_str(" from ");
    out.push_str(&node.path.kind.print());
}

fn print_docs(docs: &Option<Comment>, out: &mut String, indent: usize) {
    if let Some(docs) = docs {
        print_comment(docs, out, indent, false);
        out.push('\n');
        push_indent(out, indent);
    }
}

fn print_heading_tokens(
    export_keyword: &Option<Token>,
    default_keyword: &Option<Token>,
    modifiers: &[Token],
    out: &mut String,
) {
    if export_keyword.is_some() {
        out.push_str("export ");
    }
    if default_keyword.is_some() {
        out.push_str("default ");
    }
    for modifier in modifiers {
        out.push_str(&modifier.kind.print());
        out.push(' ');
    }
}

fn print_var_def(node: &VarDef, out: &mut String, indent: usize) {
    print_docs(&node.docs, out, indent);
    print_heading_tokens(&node.export_keyword, &node.default_keyword, &node.modifiers, out);

    if let Some(keyword) = &node.keyword {
        out.push_str(&keyword.kind.print());
        out.push(' ');
    }

    if let Some(alias) = &node.alias {
        out.push_str(&alias.kind.print());
        out.push(' ');
    }

    out.push_str(&node.id.kind.print());

    if let Some(restriction) = &node.restriction {
        out.push_str(" : ");
        print_type_expr(&restriction.value, out);
    }

    if let Some(value) = &node.value {
        out.push_str(" = ");
        print_rval(&value.value, out, indent);
    }
}

fn print_args_decl(args: &ArgsDecl, out: &mut String, indent: usize) {
    out.push_str(&args.open.kind.print());
    for (i, arg) in args.args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match arg {
            ArgDecl::Greedy(_) => out.push('*'),
            ArgDecl::Var(var) => print_var_def(var, out, indent),
        }
    }
    out.push_str(&args.close.kind.print());
}

fn print_func_decl(node: &FuncDecl, out: &mut String, indent: usize) {
    print_docs(&node.docs, out, indent);
    print_heading_tokens(&node.export_keyword, &node.default_keyword, &node.modifiers, out);

    if let Some(forall) = &node.forall {
        out.push_str("forall ");
        print_args_decl(&forall.args, out, indent);
        out.push(' ');
    }

    out.push_str(&node.action.kind.print());
    out.push(' ');
    print_query(&node.id, out);

    if let Some(targs) = &node.targs {
        print_args_decl(targs, out, indent);
    }

    if let Some(args) = &node.args {
        print_args_decl(args, out, indent);
    }

    if let Some(return_type) = &node.return_type {
        out.push_str(" : ");
        print_type_expr(&return_type.value, out);
    }

    if let Some(body) = &node.body {
        print_attached_block(body, out, indent);
    }
}

fn print_type_def(node: &TypeDef, out: &mut String, indent: usize) {
    print_docs(&node.docs, out, indent);
    print_heading_tokens(&node.export_keyword, &node.default_keyword, &node.modifiers, out);

    if let Some(forall) = &node.forall {
        out.push_str("forall ");
        print_args_decl(&forall.args, out, indent);
        out.push(' ');
    }

    if let Some(action) = &node.action {
        out.push_str(&action.kind.print());
        out.push(' ');
    }

    if let Some(category) = &node.category {
        out.push_str(&category.kind.print());
        out.push(' ');
    }

    print_query(&node.id, out);

    if let Some(targs) = &node.targs {
        print_args_decl(targs, out, indent);
    }

    for (i, ancestor) in node.ancestors.iter().enumerate() {
        out.push_str(if i == 0 { " : " } else { ", " });
        print_type_expr(ancestor, out);
    }

    if let Some(body) = &node.body {
        print_attached_block(body, out, indent);
    }
}

fn print_branch(branch: &Branch, out: &mut String, indent: usize) {
    match &branch.body {
        BranchBody::Expr(rval) => {
            if let Some(delimiter) = &branch.delimiter {
                out.push_str(&delimiter.kind.print());
                out.push(' ');
            }
            print_rval(rval, out, indent);
        }
        BranchBody::Block(block) => print_attached_block(block, out, indent),
    }
}

fn print_if(node: &If, out: &mut String, indent: usize) {
    out.push_str("if ");
    print_rval(&node.main.cond, out, indent);
    out.push(' ');
    print_branch(&node.main.branch, out, indent);

    for elif in &node.elifs {
        print_case_clause("elif", elif, out, indent);
    }

    if let Some(else_) = &node.else_ {
        print_else_clause(else_, out, indent);
    }
}

fn print_case_clause(keyword: &str, case: &Case, out: &mut String, indent: usize) {
    print_clause_separator(out, indent);
    out.push_str(keyword);
    out.push(' ');
    print_rval(&case.cond, out, indent);
    out.push(' ');
    print_branch(&case.branch, out, indent);
}

fn print_else_clause(else_: &Else, out: &mut String, indent: usize) {
    print_clause_separator(out, indent);
    out.push_str("else ");
    print_branch(&else_.branch, out, indent);
}

fn print_clause_separator(out: &mut String, indent: usize) {
    if out.ends_with("end") || out.ends_with('}') {
        out.push(' ');
    } else {
        if !out.ends_with('\n') {
            out.push('\n');
        }
        push_indent(out, indent);
    }
}

fn print_while(node: &While, out: &mut String, indent: usize) {
    out.push_str("while ");
    print_rval(&node.cond, out, indent);
    out.push(' ');
    print_branch(&node.branch, out, indent);
}

fn print_switch(node: &Switch, out: &mut String, indent: usize) {
    out.push_str("switch ");
    print_rval(&node.subject, out, indent);
    for case in &node.cases {
        out.push('\n');
        push_indent(out, indent);
        out.push_str("case ");
        print_rval(&case.cond, out, indent);
        out.push(' ');
        print_branch(&case.branch, out, indent);
    }
    if let Some(else_) = &node.else_ {
        out.push('\n');
        push_indent(out, indent);
        out.push_str("else ");
        print_branch(&else_.branch, out, indent);
    }
    out.push('\n');
    push_indent(out, indent);
    out.push_str("end");
}

/// Print a block attached to a heading (a function body, a branch body).
fn print_attached_block(block: &Block, out: &mut String, indent: usize) {
    match block.style {
        BlockStyle::C => {
            out.push(' ');
            print_block(block, out, indent);
        }
        BlockStyle::Ruby => {
            if block.open.is_some() {
                out.push_str(" do");
            }
            if block.multiline {
                out.push('\n');
                print_nodes(&block.nodes, out, indent + 1);
                if block.close.is_some() {
                    push_indent(out, indent);
                    out.push_str("end");
                }
            } else {
                print_inline_nodes(&block.nodes, out, indent);
                if block.close.is_some() {
                    out.push_str("; end");
                }
            }
        }
    }
}

fn print_inline_nodes(nodes: &[Node], out: &mut String, indent: usize) {
    for node in nodes {
        if matches!(node, Node::EmptyLine(_)) {
            continue;
        }
        out.push(' ');
        print_node(node, out, indent);
        out.push(';');
    }
    // The final separator is not needed before a closing token.
    if out.ends_with(';') {
        out.pop();
    }
}

fn print_block(block: &Block, out: &mut String, indent: usize) {
    match block.style {
        BlockStyle::C => {
            if block.multiline {
                out.push_str("{\n");
                print_nodes(&block.nodes, out, indent + 1);
                push_indent(out, indent);
                out.push('}');
            } else if block.nodes.is_empty() {
                out.push_str("{ }");
            } else {
                out.push('{');
                print_inline_nodes(&block.nodes, out, indent);
                out.push_str(" }");
            }
        }
        BlockStyle::Ruby => {
            out.push_str("do");
            if block.multiline {
                out.push('\n');
                print_nodes(&block.nodes, out, indent + 1);
                push_indent(out, indent);
                out.push_str("end");
            } else {
                print_inline_nodes(&block.nodes, out, indent);
                out.push_str("; end");
            }
        }
    }
}

fn print_query(query: &IdQuery, out: &mut String) {
    for element in &query.elements {
        match element.access {
            Access::Leading => {}
            Access::Static => out.push_str("::"),
            Access::Instance => out.push('.'),
            Access::Ufcs => out.push(':'),
        }

        // A UFCS source lexes as a label token; print its bare value so the
        // colon is not doubled.
        match &element.id.kind {
            TokenKind::Id(id) => out.push_str(&id.value),
            other => out.push_str(&other.print()),
        }

        if !element.targs.is_empty() {
            out.push('<');
            for (i, targ) in element.targs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let Some(label) = &targ.label {
                    out.push_str(&label.kind.print());
                    out.push(' ');
                }
                print_type_expr(&targ.value, out);
            }
            out.push('>');
        }
    }
}

fn print_type_expr(expr: &TypeExpr, out: &mut String) {
    match expr {
        TypeExpr::Query(query) => print_query(query, out),
        TypeExpr::LiteralKind(token) => out.push_str(&token.kind.print()),
        TypeExpr::Literal(literal) => print_literal(literal, out),
    }
}

fn print_literal(literal: &Literal, out: &mut String) {
    match literal {
        Literal::Int(t) | Literal::Bool(t) | Literal::Str(t) | Literal::CStr(t) => {
            out.push_str(&t.kind.print())
        }
    }
}

fn print_rval(rval: &RVal, out: &mut String, indent: usize) {
    match rval {
        RVal::Literal(literal) => print_literal(literal, out),
        RVal::Query(query) => print_query(query, out),
        RVal::UnOp(unop) => {
            out.push_str(&unop.op.kind.print());
            print_rval(&unop.operand, out, indent);
        }
        RVal::BinOp(binop) => {
            print_rval(&binop.left, out, indent);
            out.push(' ');
            out.push_str(&binop.op.kind.print());
            out.push(' ');
            print_rval(&binop.right, out, indent);
        }
        RVal::Assign(assign) => {
            print_query(&assign.target, out);
            out.push_str(" = ");
            print_rval(&assign.value, out, indent);
        }
        RVal::Call(call) => {
            print_rval(&call.callee, out, indent);
            out.push('(');
            for (i, arg) in call.args.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                if let Some(label) = &arg.label {
                    out.push_str(&label.kind.print());
                    out.push(' ');
                }
                print_rval(&arg.value, out, indent);
            }
            out.push(')');
        }
        RVal::SafetyExpr(expr) => {
            out.push_str(&expr.keyword.kind.print());
            out.push(' ');
            print_rval(&expr.value, out, indent);
        }
        RVal::Block(block) => print_block(block, out, indent),
        RVal::Paren(paren) => {
            out.push('(');
            print_rval(&paren.inner, out, indent);
            out.push(')');
        }
    }
}
