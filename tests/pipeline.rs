//! End-to-end pipeline scenarios: source text through lexing, parsing,
//! AST construction and MLIR specialization.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use onyx_base::{PanicId, SourceMap};
use onyx_compile::ast::{Ast, Binding, MainExpr, SuperKind};
use onyx_compile::mlir;
use onyx_compile::Program;
use onyx_language::parser;

fn lower_single(source: &str) -> (SourceMap, mlir::Module) {
    let mut map = SourceMap::new();
    let unit = map.add_file("test.nx", source);
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    let ast = Ast::build(unit, &root, &HashMap::new(), &[]);
    assert!(ast.panics.is_empty(), "AST panics: {:?}", ast.panics);
    let asts = vec![ast];
    let module = mlir::Module::build(&asts, 0);
    (map, module)
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

// S1: a single inferred variable.
#[test]
fn s1_inferred_variable_reaches_the_implicit_main() {
    let source = "let x = 42\n";

    let mut map = SourceMap::new();
    let unit = map.add_file("s1.nx", source);
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    let ast = Ast::build(unit, &root, &HashMap::new(), &[]);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);

    // The root scope has one variable `x`.
    assert!(matches!(ast.lookup(ast.root, "x"), Some(Binding::Var(_))));
    assert!(matches!(ast.main[0], MainExpr::Var(_)));

    // The implicit main has one VarDecl plus one Assignment, with the
    // narrowest integer type fitting 42.
    let asts = vec![ast];
    let module = mlir::Module::build(&asts, 0);
    assert!(module.panics.is_empty(), "{:?}", module.panics);
    assert_eq!(module.main.exprs.len(), 2);
    assert!(matches!(
        module.main.exprs[0],
        mlir::Expr::VarDecl {
            ty: mlir::Type::Int(8),
            ..
        }
    ));
    assert!(matches!(module.main.exprs[1], mlir::Expr::Assign { .. }));
}

// S2: a function definition specializing on demand, and reprinting.
#[test]
fn s2_sum_specializes_and_round_trips() {
    let source = "def sum(a : Int32, b : Int32) : Int32\n  return a + b\nend\n";

    let mut map = SourceMap::new();
    let unit = map.add_file("s2.nx", source);
    let root = parser::parse(&mut map, unit).expect("parsing failed");

    // Reprinting the CST yields the identical source.
    assert_eq!(root.print(), source);

    let ast = Ast::build(unit, &root, &HashMap::new(), &[]);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "sum").cloned() else {
        panic!("no `sum` superdecl");
    };
    assert_eq!(ast.superdecl(id).kind, SuperKind::Function);
    assert_eq!(ast.superdecl(id).contributor_count(), 1);

    // The specialization appears when referenced.
    let mut map = SourceMap::new();
    let referencing = format!("{source}let s = sum(1, 2)\n");
    let unit = map.add_file("s2b.nx", referencing.as_str());
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    let ast = Ast::build(unit, &root, &HashMap::new(), &[]);
    let asts = vec![ast];
    let module = mlir::Module::build(&asts, 0);
    assert!(module.panics.is_empty(), "{:?}", module.panics);
    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.functions[0].key, "sum(Int32,Int32)");
    assert_eq!(module.functions[0].ret, Some(mlir::Type::Int(32)));
}

// S3: self-recursion resolves without an infinite specialization loop.
#[test]
fn s3_recursive_fib_specializes_once() {
    let source = "def fib(n : Int32) { if n <= 1 then return n end; return fib(n-1) + fib(n-2) }\nlet f = fib(20)\n";
    let (_, module) = lower_single(source);
    assert!(module.panics.is_empty(), "{:?}", module.panics);

    assert_eq!(module.functions.len(), 1);
    assert_eq!(module.functions[0].key, "fib(Int32)");

    // The body calls itself.
    let text = module.write();
    assert!(text.contains("@fib(Int32)("), "{text}");
}

// S4: C interop is gated on unsafe.
#[test]
fn s4_c_call_requires_unsafe() {
    let accepted = "extern \"C\" { int puts(const char *s); }\nunsafe! puts($\"hi\")\n";
    let (_, module) = lower_single(accepted);
    assert!(module.panics.is_empty(), "{:?}", module.panics);

    // The same call outside `unsafe!` is rejected, pointing at the call
    // site.
    let rejected = "extern \"C\" { int puts(const char *s); }\nputs($\"hi\")\n";
    let mut map = SourceMap::new();
    let unit = map.add_file("s4.nx", rejected);
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    let ast = Ast::build(unit, &root, &HashMap::new(), &[]);
    assert!(ast.c_ast.find("puts").is_some());

    let asts = vec![ast];
    let module = mlir::Module::build(&asts, 0);
    assert_eq!(module.panics.len(), 1);
    let placement = module.panics[0].placement.expect("missing placement");
    assert_eq!(placement.location.start.row, 1);
    assert_eq!(placement.location.start.col, 0);
}

// S5: category mismatch between a struct decl and a builtin def.
#[test]
fn s5_category_mismatch_points_at_both_keywords() {
    let source = "decl struct Foo\ndef builtin Foo\n";

    let mut map = SourceMap::new();
    let unit = map.add_file("s5.nx", source);
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    let ast = Ast::build(unit, &root, &HashMap::new(), &[]);

    assert_eq!(ast.panics.len(), 1);
    let panic = &ast.panics[0];
    assert_eq!(panic.id, Some(PanicId::DeclarationCategoryMismatch));

    // Primary on the `builtin` keyword.
    let primary = panic.placement.unwrap();
    assert_eq!(
        (primary.location.start.row, primary.location.start.col),
        (1, 4)
    );

    // One note on the original `struct` keyword.
    assert_eq!(panic.notes.len(), 1);
    let note = panic.notes[0].placement.unwrap();
    assert_eq!((note.location.start.row, note.location.start.col), (0, 5));

    // The rendered diagnostic carries the stable code.
    assert!(panic.render(&map).contains("P0001"));
}

// S6: import aliasing across modules.
#[test]
fn s6_import_alias_resolves_and_the_source_name_does_not() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "m.nx", "export def A() { 1 }\n");
    let entry = write_file(
        dir.path(),
        "main.nx",
        "import { A as B } from \"./m.nx\"\nlet x = B()\n",
    );

    let mut program = Program::new();
    let compilation = program.compile(&entry).unwrap();
    assert!(compilation.is_clean(), "{:?}", compilation.panics);

    // Referencing the original name instead misses.
    let entry_bad = write_file(
        dir.path(),
        "bad.nx",
        "import { A as B } from \"./m.nx\"\nlet x = A()\n",
    );
    let mut program = Program::new();
    let compilation = program.compile(&entry_bad).unwrap();
    assert_eq!(compilation.panics.len(), 1);
    assert_eq!(
        compilation.panics[0].id,
        Some(PanicId::UndeclaredReference)
    );
}

// Property 2: parse round-trip up to whitespace normalization.
#[test]
fn parse_round_trip_preserves_blank_lines_and_styles() {
    let source = "def a() { 1 }\n\ndef b()\n  return 2\nend\n";

    let mut map = SourceMap::new();
    let unit = map.add_file("rt.nx", source);
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    assert_eq!(root.print(), source);
}

// Property 6: two identical runs produce identical emission.
#[test]
fn emission_is_deterministic_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "lib.nx", "export def helper(x : Int32) : Int32 { x }\n");
    let entry = write_file(
        dir.path(),
        "main.nx",
        "import { helper } from \"./lib.nx\"\nlet a = helper(1)\nlet b = helper(2)\n",
    );

    let render = |entry: &Path| {
        let mut program = Program::new();
        let compilation = program.compile(entry).unwrap();
        assert!(compilation.is_clean(), "{:?}", compilation.panics);
        let texts: Vec<String> = compilation
            .modules
            .iter()
            .map(|module| module.mlir.write())
            .collect();
        fnxc::emit::amalgamate(&texts)
    };

    let first = render(&entry);
    let second = render(&entry);
    assert_eq!(first, second);

    // The archive splits back into one text per module.
    assert_eq!(fnxc::emit::split(&first).len(), 2);
}
