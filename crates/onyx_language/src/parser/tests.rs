use onyx_base::{PanicId, SourceMap};

use crate::cst;
use crate::parser;
use crate::token::{IdKind, TokenKind};

fn parse(source: &str) -> (SourceMap, cst::Root) {
    let mut map = SourceMap::new();
    let unit = map.add_file("test.nx", source);
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    (map, root)
}

fn parse_err(source: &str) -> onyx_base::Panic {
    let mut map = SourceMap::new();
    let unit = map.add_file("test.nx", source);
    parser::parse(&mut map, unit).expect_err("expected a parse failure")
}

/// Collapse space runs and repeated blank lines, so sources compare up to
/// inter-token whitespace normalization.
fn normalized(source: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in source.lines() {
        let mut collapsed = String::new();
        let mut last_space = false;
        for c in line.trim_end().chars() {
            if c == ' ' || c == '\t' {
                if !last_space && !collapsed.is_empty() {
                    collapsed.push(' ');
                }
                last_space = true;
            } else {
                collapsed.push(c);
                last_space = false;
            }
        }

        let blank = collapsed.is_empty();
        if blank && lines.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        lines.push(if blank { String::new() } else { collapsed });
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

fn assert_round_trip(source: &str) {
    let (_, root) = parse(source);
    let printed = root.print();
    assert_eq!(
        normalized(&printed),
        normalized(source),
        "print diverged\nsource: {source:?}\nprinted: {printed:?}"
    );
}

#[test]
fn parses_a_var_def() {
    let (_, root) = parse("let x = 42\n");
    assert_eq!(root.children.len(), 1);
    match &root.children[0] {
        cst::Node::VarDef(var) => {
            assert_eq!(var.name(), "x");
            assert!(var.restriction.is_none());
            assert!(var.value.is_some());
        }
        other => panic!("expected a var def, got {other:?}"),
    }
}

#[test]
fn parses_a_function_definition() {
    let source = "def sum(a : Int32, b : Int32) : Int32\n  return a + b\nend\n";
    let (_, root) = parse(source);

    match &root.children[0] {
        cst::Node::FuncDecl(func) => {
            assert_eq!(func.name(), "sum");
            assert_eq!(func.action(), cst::Action::Def);
            let args = func.args.as_ref().unwrap();
            assert_eq!(args.args.len(), 2);
            assert!(func.return_type.is_some());

            let body = func.body.as_ref().unwrap();
            assert_eq!(body.style, cst::BlockStyle::Ruby);
            assert!(body.multiline);
            assert_eq!(body.nodes.len(), 1);
        }
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn function_round_trips() {
    assert_round_trip("def sum(a : Int32, b : Int32) : Int32\n  return a + b\nend\n");
}

#[test]
fn parses_c_style_body_with_inline_if() {
    let source = "def fib(n : Int32) { if n <= 1 then return n end; return fib(n-1) + fib(n-2) }\n";
    let (_, root) = parse(source);

    match &root.children[0] {
        cst::Node::FuncDecl(func) => {
            let body = func.body.as_ref().unwrap();
            assert_eq!(body.style, cst::BlockStyle::C);
            assert!(!body.multiline);
            assert_eq!(body.nodes.len(), 2);
            assert!(matches!(body.nodes[0], cst::Node::If(_)));
            assert!(matches!(body.nodes[1], cst::Node::Return(_)));
        }
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn parses_extern_single_prototype() {
    let source = "extern int puts(char *s);\nlet x = 1\n";
    let (_, root) = parse(source);

    assert_eq!(root.children.len(), 2);
    match &root.children[0] {
        cst::Node::Extern(ext) => {
            assert!(ext.abi.is_none());
            assert!(ext.braces.is_none());
            assert_eq!(ext.block.protos.len(), 1);
            assert_eq!(ext.block.protos[0].name_value(), "puts");
            assert_eq!(ext.block.protos[0].args.len(), 1);
        }
        other => panic!("expected extern, got {other:?}"),
    }
    assert!(matches!(root.children[1], cst::Node::VarDef(_)));
}

#[test]
fn parses_braced_extern_with_abi() {
    let source = "extern \"C\" { int puts(const char *s); }\nunsafe! puts($\"hi\")\n";
    let (_, root) = parse(source);

    match &root.children[0] {
        cst::Node::Extern(ext) => {
            assert!(ext.abi.is_some());
            assert!(ext.braces.is_some());
            assert_eq!(ext.block.protos.len(), 1);
            assert_eq!(
                ext.block.protos[0].args[0].type_ref.id_value(),
                "const char"
            );
        }
        other => panic!("expected extern, got {other:?}"),
    }

    match &root.children[1] {
        cst::Node::Expr(cst::RVal::SafetyExpr(expr)) => {
            assert_eq!(expr.safety(), onyx_base::Safety::Unsafe);
            assert!(matches!(expr.value, cst::RVal::Call(_)));
        }
        other => panic!("expected a safety expression, got {other:?}"),
    }
}

#[test]
fn extern_resyncs_the_stream_exactly() {
    // Whatever follows the prototype must parse as regular Onyx code,
    // with correct placements.
    let source = "extern int getchar();\ndef f() { 1 }\n";
    let (_, root) = parse(source);
    match &root.children[1] {
        cst::Node::FuncDecl(func) => {
            assert_eq!(func.action.placement.location.start.row, 1);
            assert_eq!(func.action.placement.location.start.col, 0);
        }
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn parses_import_forms() {
    let forms = [
        "import X from \"./m.nx\"\n",
        "import * as X from \"./m.nx\"\n",
        "import { X } from \"./m.nx\"\n",
        "import { X as Y } from \"./m.nx\"\n",
    ];

    for source in forms {
        let (_, root) = parse(source);
        match &root.children[0] {
            cst::Node::Import(import) => {
                assert_eq!(import.elements.len(), 1);
                assert_eq!(import.path_value(), "./m.nx");
            }
            other => panic!("expected import for {source:?}, got {other:?}"),
        }
        assert_round_trip(source);
    }
}

#[test]
fn import_alias_binds_the_alias_name() {
    let (_, root) = parse("import { A as B } from \"./m.nx\"\n");
    match &root.children[0] {
        cst::Node::Import(import) => {
            let element = &import.elements[0];
            assert!(element.extracted);
            assert_eq!(element.id_value(), Some("A"));
            assert_eq!(element.bound_name(), Some("B"));
        }
        other => panic!("expected import, got {other:?}"),
    }
}

#[test]
fn parses_type_defs_with_categories() {
    let (_, root) = parse("decl struct Foo\ndef builtin Foo\n");

    match &root.children[0] {
        cst::Node::TypeDef(def) => {
            assert_eq!(def.action(), cst::Action::Decl);
            assert_eq!(def.name(), "Foo");
            assert!(def.category.is_some());
        }
        other => panic!("expected a type def, got {other:?}"),
    }

    match &root.children[1] {
        cst::Node::TypeDef(def) => {
            assert_eq!(def.action(), cst::Action::Def);
            match &def.category.as_ref().unwrap().kind {
                TokenKind::Keyword(keyword) => {
                    assert_eq!(keyword.as_str(), "builtin");
                }
                other => panic!("unexpected category token {other:?}"),
            }
        }
        other => panic!("expected a type def, got {other:?}"),
    }
}

#[test]
fn parses_template_args_and_forall() {
    let source = "forall <T : Number> impl convert(arg : T) : Float64 { arg }\n";
    let (_, root) = parse(source);

    match &root.children[0] {
        cst::Node::FuncDecl(func) => {
            assert_eq!(func.action(), cst::Action::Impl);
            let forall = func.forall.as_ref().unwrap();
            assert_eq!(forall.args.args.len(), 1);
            match &forall.args.args[0] {
                cst::ArgDecl::Var(var) => {
                    assert_eq!(var.name(), "T");
                    assert!(var.restriction.is_some());
                }
                other => panic!("expected a var arg, got {other:?}"),
            }
        }
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn parses_decl_with_template_args() {
    let source = "decl convert<Return: R, Value: V>(arg : V) : R\n";
    let (_, root) = parse(source);

    match &root.children[0] {
        cst::Node::FuncDecl(func) => {
            assert_eq!(func.action(), cst::Action::Decl);
            assert!(func.body.is_none());
            let targs = func.targs.as_ref().unwrap();
            assert_eq!(targs.args.len(), 2);
            match &targs.args[0] {
                cst::ArgDecl::Var(var) => {
                    assert_eq!(var.alias_value(), Some("Return"));
                    assert_eq!(var.name(), "R");
                }
                other => panic!("expected a var arg, got {other:?}"),
            }
        }
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn generic_call_requires_adjacent_angle() {
    let (_, root) = parse("foo<Int32>(x)\n");
    match &root.children[0] {
        cst::Node::Expr(cst::RVal::Call(call)) => match &call.callee {
            cst::RVal::Query(query) => {
                assert_eq!(query.elements[0].targs.len(), 1);
            }
            other => panic!("expected a query callee, got {other:?}"),
        },
        other => panic!("expected a call, got {other:?}"),
    }

    // Spaced angles stay comparisons.
    let (_, root) = parse("a < b\n");
    assert!(matches!(
        &root.children[0],
        cst::Node::Expr(cst::RVal::BinOp(_))
    ));
}

#[test]
fn parses_ufcs_chain() {
    let (_, root) = parse("x:f(y)\n");
    match &root.children[0] {
        cst::Node::Expr(cst::RVal::Call(call)) => match &call.callee {
            cst::RVal::Query(query) => {
                assert_eq!(query.elements.len(), 2);
                assert_eq!(query.elements[1].access, cst::Access::Ufcs);
                assert_eq!(query.elements[1].id_value(), "f");
            }
            other => panic!("expected a query callee, got {other:?}"),
        },
        other => panic!("expected a call, got {other:?}"),
    }
}

#[test]
fn parses_qualified_queries() {
    let (_, root) = parse("A::B.c\n");
    match &root.children[0] {
        cst::Node::Expr(cst::RVal::Query(query)) => {
            assert_eq!(query.elements.len(), 3);
            assert_eq!(query.elements[1].access, cst::Access::Static);
            assert_eq!(query.elements[2].access, cst::Access::Instance);
        }
        other => panic!("expected a query, got {other:?}"),
    }
}

#[test]
fn empty_line_is_preserved_as_a_node() {
    let (_, root) = parse("let a = 1\n\nlet b = 2\n");
    assert_eq!(root.children.len(), 3);
    assert!(matches!(root.children[1], cst::Node::EmptyLine(_)));
    assert_round_trip("let a = 1\n\nlet b = 2\n");
}

#[test]
fn comment_attaches_to_following_declaration() {
    let (_, root) = parse("# Adds numbers.\ndef add(a, b) { a + b }\n");
    assert_eq!(root.children.len(), 1);
    match &root.children[0] {
        cst::Node::FuncDecl(func) => {
            let docs = func.docs.as_ref().unwrap();
            assert_eq!(docs.text(), " Adds numbers.");
        }
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn standalone_comment_stays_a_node() {
    let (_, root) = parse("# A lone remark.\n\nlet x = 1\n");
    assert!(matches!(root.children[0], cst::Node::Comment(_)));
}

#[test]
fn duplicate_call_label_panics_with_both_placements() {
    let panic = parse_err("foo(a: 1, a: 2)\n");
    assert!(panic.message.contains("Duplicate label"));
    assert_eq!(panic.notes.len(), 1);
    assert!(panic.notes[0].placement.is_some());
}

#[test]
fn unexpected_token_panic_names_the_expectation() {
    let panic = parse_err("def sum(\n");
    assert_eq!(panic.id, Some(PanicId::UnexpectedEof));
}

#[test]
fn unterminated_block_is_unexpected_eof() {
    let panic = parse_err("def f()\n  return 1\n");
    assert_eq!(panic.id, Some(PanicId::UnexpectedEof));
}

#[test]
fn missing_terminator_panics() {
    let panic = parse_err("let a = 1 let b = 2\n");
    assert!(panic.message.contains("expected a terminator"), "{panic}");
}

#[test]
fn parses_while_with_do_block() {
    let source = "while x < 10 do\n  bump()\nend\n";
    let (_, root) = parse(source);
    match &root.children[0] {
        cst::Node::While(node) => match &node.branch.body {
            cst::BranchBody::Block(block) => {
                assert_eq!(block.style, cst::BlockStyle::Ruby);
                assert!(block.multiline);
            }
            other => panic!("expected a block branch, got {other:?}"),
        },
        other => panic!("expected a while, got {other:?}"),
    }
}

#[test]
fn parses_switch_into_cases() {
    let source = "switch x\ncase 1 then a()\ncase 2 then b()\nelse then c()\nend\n";
    let (_, root) = parse(source);
    match &root.children[0] {
        cst::Node::Switch(node) => {
            assert_eq!(node.cases.len(), 2);
            assert!(node.else_.is_some());
        }
        other => panic!("expected a switch, got {other:?}"),
    }
}

#[test]
fn parses_multiline_if_with_elif_and_else() {
    let source = "if a\n  f()\nelif b\n  g()\nelse\n  h()\nend\n";
    let (_, root) = parse(source);
    match &root.children[0] {
        cst::Node::If(node) => {
            assert_eq!(node.elifs.len(), 1);
            assert!(node.else_.is_some());
        }
        other => panic!("expected an if, got {other:?}"),
    }
}

#[test]
fn exported_declaration_keeps_the_keyword() {
    let (_, root) = parse("export def pub_fn() { 1 }\n");
    match &root.children[0] {
        cst::Node::FuncDecl(func) => assert!(func.export_keyword.is_some()),
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn labels_lex_into_alias_slots() {
    let (_, root) = parse("def f(Return: R) { R }\n");
    match &root.children[0] {
        cst::Node::FuncDecl(func) => {
            let args = func.args.as_ref().unwrap();
            match &args.args[0] {
                cst::ArgDecl::Var(var) => {
                    assert_eq!(var.alias_value(), Some("Return"));
                    match &var.alias.as_ref().unwrap().kind {
                        TokenKind::Id(id) => assert_eq!(id.kind, IdKind::Label),
                        other => panic!("unexpected alias token {other:?}"),
                    }
                }
                other => panic!("expected a var arg, got {other:?}"),
            }
        }
        other => panic!("expected a function, got {other:?}"),
    }
}

#[test]
fn alias_directive_round_trips() {
    let source = "alias summe => sum\n";
    let (_, root) = parse(source);
    assert!(matches!(root.children[0], cst::Node::Alias(_)));
    assert_round_trip(source);
}

#[test]
fn extern_round_trips_normalized() {
    assert_round_trip("extern int puts(char *s);\n");
    assert_round_trip("extern \"C\" { int puts(const char *s); }\n");
}
