use pretty_assertions::assert_eq;

use crate::{resolve_symbols, BinaryOperator, NodeKind, TreeBuilder};

#[test]
fn parameters_and_locals_resolve_to_declarations() {
    // (x) => { let y = x + 1; return y; }
    let mut b = TreeBuilder::new();
    let x_use = b.ident("x");
    let one = b.int(1);
    let sum = b.binary(BinaryOperator::Add, x_use, one);
    let decl = b.let_("y", sum);
    let y_use = b.ident("y");
    let ret = b.return_(Some(y_use));
    let body = b.block(vec![decl, ret]);
    let root = b.function(&["x"], body);
    let tree = b.finish();

    let res = resolve_symbols(&tree, root);
    let NodeKind::FunctionLiteral { params, .. } = tree.kind(root) else {
        panic!("expected a function literal");
    };
    let x_sym = res.symbol(params[0]);
    assert!(x_sym.is_some());
    assert_eq!(res.symbol(x_use), x_sym);
    assert!(res.symbol(y_use).is_some());
    assert_ne!(res.symbol(y_use), x_sym);
    assert_eq!(res.num_symbols(), 2);
}

#[test]
fn free_identifiers_stay_unresolved() {
    let mut b = TreeBuilder::new();
    let field = b.ident("field");
    let stmt = b.expr_stmt(field);
    let body = b.block(vec![stmt]);
    let root = b.function(&[], body);
    let tree = b.finish();

    let res = resolve_symbols(&tree, root);
    assert_eq!(res.symbol(field), None);
}

#[test]
fn shadowing_in_nested_block() {
    // () => { let a = 1; { let a = 2; a; } a; }
    let mut b = TreeBuilder::new();
    let one = b.int(1);
    let outer = b.let_("a", one);
    let two = b.int(2);
    let inner = b.let_("a", two);
    let inner_use = b.ident("a");
    let inner_stmt = b.expr_stmt(inner_use);
    let inner_block = b.block(vec![inner, inner_stmt]);
    let outer_use = b.ident("a");
    let outer_stmt = b.expr_stmt(outer_use);
    let body = b.block(vec![outer, inner_block, outer_stmt]);
    let root = b.function(&[], body);
    let tree = b.finish();

    let res = resolve_symbols(&tree, root);
    assert_ne!(res.symbol(inner_use), res.symbol(outer_use));
    assert!(res.symbol(inner_use).is_some());
}

#[test]
fn function_declarations_are_hoisted() {
    // () => { f(); function f() {} }
    let mut b = TreeBuilder::new();
    let callee = b.ident("f");
    let call = b.call(callee, vec![]);
    let stmt = b.expr_stmt(call);
    let empty = b.block(vec![]);
    let decl = b.function_decl("f", &[], empty);
    let body = b.block(vec![stmt, decl]);
    let root = b.function(&[], body);
    let tree = b.finish();

    let res = resolve_symbols(&tree, root);
    assert!(res.symbol(callee).is_some());
}

#[test]
fn for_of_binding_scoped_to_body() {
    let mut b = TreeBuilder::new();
    let n = b.int(10);
    let range = b.call_path("range", vec![n]);
    let i_use = b.ident("i");
    let stmt = b.expr_stmt(i_use);
    let loop_body = b.block(vec![stmt]);
    let for_of = b.for_of(&["i"], range, loop_body);
    let after = b.ident("i");
    let after_stmt = b.expr_stmt(after);
    let body = b.block(vec![for_of, after_stmt]);
    let root = b.function(&[], body);
    let tree = b.finish();

    let res = resolve_symbols(&tree, root);
    assert!(res.symbol(i_use).is_some());
    assert_eq!(res.symbol(after), None);
}

#[test]
fn expr_text_reconstructs_paths() {
    let mut b = TreeBuilder::new();
    let obj = b.path("scene.lights");
    let two = b.int(2);
    let elem = b.index(obj, two);
    let color = b.prop(elem, "color");
    let tree = b.finish();
    assert_eq!(tree.expr_text(color), "scene.lights[2].color");
}

#[test]
fn expr_text_prefers_source_slices() {
    let source = "let v = foo . bar;";
    let mut b = TreeBuilder::with_source(source);
    let foo = b.ident("foo");
    let bar = b.prop(foo, "bar");
    b.set_span(bar, crate::Span::new(8, 17));
    let tree = b.finish();
    assert_eq!(tree.expr_text(bar), "foo . bar");
}
