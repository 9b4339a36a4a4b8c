use std::collections::HashMap;

use onyx_base::{PanicId, SourceMap};
use onyx_language::parser;

use super::*;

fn parse(source: &str) -> (SourceMap, UnitId, cst::Root) {
    let mut map = SourceMap::new();
    let unit = map.add_file("test.nx", source);
    let root = parser::parse(&mut map, unit).expect("parsing failed");
    (map, unit, root)
}

fn build(source: &str) -> (SourceMap, cst::Root, UnitId) {
    let (map, unit, root) = parse(source);
    (map, root, unit)
}

fn ast_of<'c>(unit: UnitId, root: &'c cst::Root) -> Ast<'c> {
    Ast::build(unit, root, &HashMap::new(), &[])
}

#[test]
fn def_creates_a_function_superdecl() {
    let (_, root, unit) = build("def sum(a : Int32, b : Int32) : Int32\n  return a + b\nend\n");
    let ast = ast_of(unit, &root);

    assert!(ast.panics.is_empty(), "{:?}", ast.panics);

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "sum").cloned() else {
        panic!("`sum` did not bind");
    };
    let superdecl = ast.superdecl(id);
    assert_eq!(superdecl.kind, SuperKind::Function);
    assert_eq!(superdecl.contributor_count(), 1);
    assert_eq!(superdecl.function_impls().len(), 1);
    assert_eq!(
        superdecl.function_impls()[0].action,
        cst::Action::Def
    );
}

#[test]
fn decl_and_impl_merge_into_one_superdecl() {
    let (_, root, unit) = build(
        "decl greet(name : Int32)\nimpl greet(name : Int32) { name }\n",
    );
    let ast = ast_of(unit, &root);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "greet").cloned() else {
        panic!("`greet` did not bind");
    };
    assert_eq!(ast.superdecl(id).contributor_count(), 2);
}

#[test]
fn superdecl_is_never_empty_and_dies_with_last_contributor() {
    let (_, root, unit) = build("def sum(a : Int32) : Int32 { a }\n");
    let mut ast = ast_of(unit, &root);

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "sum").cloned() else {
        panic!("`sum` did not bind");
    };
    assert!(ast.superdecl(id).contributor_count() >= 1);

    let destroyed = ast.remove_last_contributor(id);
    assert!(destroyed);
    assert!(ast.lookup(ast.root, "sum").is_none());
    assert!(ast.superdecls[id.index()].is_none());
}

#[test]
fn category_mismatch_is_p0001_with_both_placements() {
    let (_, root, unit) = build("decl struct Foo\ndef builtin Foo\n");
    let ast = ast_of(unit, &root);

    assert_eq!(ast.panics.len(), 1, "{:?}", ast.panics);
    let panic = &ast.panics[0];
    assert_eq!(panic.id, Some(PanicId::DeclarationCategoryMismatch));

    // The primary placement points at the `builtin` keyword on row 1.
    let primary = panic.placement.expect("missing primary placement");
    assert_eq!(primary.location.start.row, 1);
    assert_eq!(primary.location.start.col, 4);

    // The note points at the original `struct` keyword on row 0.
    let note = panic.notes[0].placement.expect("missing note placement");
    assert_eq!(note.location.start.row, 0);
    assert_eq!(note.location.start.col, 5);
}

#[test]
fn function_redeclared_as_type_is_p0001() {
    let (_, root, unit) = build("def foo() { 1 }\nstruct foo\n");
    let ast = ast_of(unit, &root);
    assert_eq!(ast.panics.len(), 1);
    assert_eq!(
        ast.panics[0].id,
        Some(PanicId::DeclarationCategoryMismatch)
    );
}

#[test]
fn incompatible_template_profiles_are_p0003() {
    let (_, root, unit) = build(
        "decl convert<T : Number>(x : T)\ndecl convert<T : Real>(x : T)\n",
    );
    let ast = ast_of(unit, &root);
    assert_eq!(ast.panics.len(), 1, "{:?}", ast.panics);
    assert_eq!(ast.panics[0].id, Some(PanicId::AlreadyDeclared));
}

#[test]
fn extern_block_populates_the_c_ast() {
    let (_, root, unit) = build("extern int puts(char *s);\n");
    let ast = ast_of(unit, &root);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);
    assert!(ast.c_ast.find("puts").is_some());
}

#[test]
fn bare_extern_name_resolves_through_the_c_ast() {
    let (_, root, unit) = build("extern int puts(char *s);\n");
    let ast = ast_of(unit, &root);
    let placement = onyx_base::Placement::point(unit, onyx_base::Position::default());

    match ast.resolve_simple(ast.root, "puts", placement) {
        Ok(Resolved::C(proto)) => {
            assert_eq!(proto.name, "puts");
            assert_eq!(proto.args.len(), 1);
        }
        other => panic!("expected a C resolution, got {other:?}"),
    }
}

#[test]
fn onyx_declaration_shadows_a_c_prototype() {
    // Local declarations come before the C-identifier lookup step.
    let (_, root, unit) = build("extern int puts(char *s);\ndef puts() { 1 }\n");
    let ast = ast_of(unit, &root);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);

    let placement = onyx_base::Placement::point(unit, onyx_base::Position::default());
    assert!(matches!(
        ast.resolve_simple(ast.root, "puts", placement),
        Ok(Resolved::Super(_))
    ));
}

#[test]
fn top_level_code_collects_into_main() {
    let (_, root, unit) = build("let x = 42\nx = 1\n");
    let ast = ast_of(unit, &root);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);
    assert_eq!(ast.main.len(), 2);
    assert!(matches!(ast.main[0], MainExpr::Var(_)));
    assert!(matches!(ast.main[1], MainExpr::Node(_)));
}

#[test]
fn duplicate_variable_is_p0003() {
    let (_, root, unit) = build("let x = 1\nlet x = 2\n");
    let ast = ast_of(unit, &root);
    assert_eq!(ast.panics.len(), 1);
    assert_eq!(ast.panics[0].id, Some(PanicId::AlreadyDeclared));
    assert!(ast.panics[0].notes[0].placement.is_some());
}

#[test]
fn template_arg_may_not_shadow_the_entity() {
    let (_, root, unit) = build("def wrap<wrap>(x : wrap) { x }\n");
    let ast = ast_of(unit, &root);
    assert_eq!(ast.panics.len(), 1);
    assert!(ast.panics[0].message.contains("shadows the declared entity"));
}

#[test]
fn template_arg_may_not_shadow_an_outer_variable() {
    let (_, root, unit) = build("let width = 1\ndef scale<width>(x : width) { x }\n");
    let ast = ast_of(unit, &root);
    assert_eq!(ast.panics.len(), 1);
    assert!(ast.panics[0].message.contains("shadows an outer variable"));
}

#[test]
fn function_body_scope_binds_args() {
    let (_, root, unit) = build("def sum(a : Int32, b : Int32) : Int32 { a + b }\n");
    let ast = ast_of(unit, &root);

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "sum").cloned() else {
        panic!("`sum` did not bind");
    };
    let body_scope = ast.superdecl(id).function_impls()[0]
        .body_scope
        .expect("missing body scope");

    assert!(matches!(
        ast.lookup(body_scope, "a"),
        Some(Binding::Var(_))
    ));
    assert!(matches!(
        ast.lookup(body_scope, "b"),
        Some(Binding::Var(_))
    ));
    // Root names stay reachable from the body.
    assert!(ast.lookup(body_scope, "sum").is_some());
}

#[test]
fn builtin_int_types_resolve() {
    let (_, root, unit) = build("let x = 1\n");
    let ast = ast_of(unit, &root);
    for name in ["Int8", "Int16", "Int32", "Int64", "Int"] {
        let Some(Binding::Super(id)) = ast.lookup(ast.root, name).cloned() else {
            panic!("`{name}` did not resolve");
        };
        assert!(ast.superdecl(id).builtin);
    }
}

#[test]
fn undeclared_reference_is_p0002() {
    let (_, root, unit) = build("let x = 1\n");
    let ast = ast_of(unit, &root);
    let placement = onyx_base::Placement::point(unit, onyx_base::Position::default());
    let err = ast.resolve_simple(ast.root, "missing", placement).unwrap_err();
    assert_eq!(err.id, Some(PanicId::UndeclaredReference));
}

#[test]
fn well_known_literals_resolve_without_declaration() {
    let (_, root, unit) = build("let x = 1\n");
    let ast = ast_of(unit, &root);
    let placement = onyx_base::Placement::point(unit, onyx_base::Position::default());
    assert!(matches!(
        ast.resolve_simple(ast.root, "nil", placement),
        Ok(Resolved::Literal(IdLiteral::Nil))
    ));
}

#[test]
fn type_members_bind_in_member_scope() {
    let source = "struct Point do\n  let x : Int32\n  let y : Int32\n  def origin() : Point { 0 }\nend\n";
    let (_, root, unit) = build(source);
    let ast = ast_of(unit, &root);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "Point").cloned() else {
        panic!("`Point` did not bind");
    };
    let members = ast.superdecl(id).member_scope.expect("no member scope");
    assert!(matches!(
        ast.scope(members).bindings.get("x"),
        Some(Binding::Var(_))
    ));
    assert!(matches!(
        ast.scope(members).bindings.get("origin"),
        Some(Binding::Super(_))
    ));
}

#[test]
fn qualified_impl_lands_in_the_member_scope() {
    let source = "struct Point\nimpl Point::origin() { 0 }\n";
    let (_, root, unit) = build(source);
    let ast = ast_of(unit, &root);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "Point").cloned() else {
        panic!("`Point` did not bind");
    };
    let members = ast.superdecl(id).member_scope.expect("no member scope");
    assert!(ast.scope(members).bindings.contains_key("origin"));
    // The method is not lexically at the root.
    assert!(!ast.scope(ast.root).bindings.contains_key("origin"));
}

#[test]
fn import_binds_the_alias_and_resolves_across_modules() {
    // Module 0 defines and exports A.
    let (_, lib_root, lib_unit) = build("export def A() { 1 }\n");
    let lib = ast_of(lib_unit, &lib_root);
    assert!(lib.exports.contains_key("A"), "{:?}", lib.panics);

    // Module 1 imports it as B.
    let (_, main_unit, main_root) = parse("import { A as B } from \"./m.nx\"\n");
    let mut import_map = HashMap::new();
    import_map.insert("./m.nx".to_string(), 0);

    let built = vec![lib];
    let main = Ast::build(main_unit, &main_root, &import_map, &built);
    assert!(main.panics.is_empty(), "{:?}", main.panics);

    let mut asts = built;
    asts.push(main);

    let placement = onyx_base::Placement::point(main_unit, onyx_base::Position::default());

    // Lookup of B reaches module 0's A superdecl.
    let (module, id) = resolve_name(&asts, 1, asts[1].root, "B", placement).unwrap();
    assert_eq!(module, 0);
    assert_eq!(asts[0].superdecl(id).name, "A");

    // Lookup of A in the importing module misses.
    let err = resolve_name(&asts, 1, asts[1].root, "A", placement).unwrap_err();
    assert_eq!(err.id, Some(PanicId::UndeclaredReference));
}

#[test]
fn importing_a_non_exported_name_panics() {
    let (_, lib_root, lib_unit) = build("def hidden() { 1 }\n");
    let lib = ast_of(lib_unit, &lib_root);

    let (_, main_unit, main_root) = parse("import { hidden } from \"./m.nx\"\n");
    let mut import_map = HashMap::new();
    import_map.insert("./m.nx".to_string(), 0);

    let main = Ast::build(main_unit, &main_root, &import_map, &[lib]);
    assert_eq!(main.panics.len(), 1);
    assert_eq!(main.panics[0].id, Some(PanicId::UndeclaredReference));
}

#[test]
fn export_directive_marks_the_superdecl() {
    let (_, root, unit) = build("def f() { 1 }\nexport f\n");
    let ast = ast_of(unit, &root);
    assert!(ast.panics.is_empty(), "{:?}", ast.panics);
    assert!(ast.exports.contains_key("f"));

    let Some(Binding::Super(id)) = ast.lookup(ast.root, "f").cloned() else {
        panic!("`f` did not bind");
    };
    assert!(ast.superdecl(id).exported);
}

#[test]
fn panics_recover_per_item_and_the_rest_stays_queryable() {
    let (_, root, unit) = build("struct Foo\nstruct Foo\ndef ok() { 1 }\n");
    let ast = ast_of(unit, &root);

    assert_eq!(ast.panics.len(), 1);
    assert!(ast.lookup(ast.root, "ok").is_some());
    assert!(ast.lookup(ast.root, "Foo").is_some());
}
