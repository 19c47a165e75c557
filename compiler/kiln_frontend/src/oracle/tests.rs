#![allow(clippy::unwrap_used)]

use std::rc::Rc;

use kiln_diagnostic::ErrorKind;
use kiln_syntax::TreeBuilder;

use super::ParsedFunction;

#[test]
fn parameters_resolve_to_their_declaration() {
    let mut b = TreeBuilder::new();
    let x = b.ident("x");
    let ret = b.return_(Some(x));
    let body = b.block(vec![ret]);
    let root = b.function(&["x"], body);
    let function = ParsedFunction::new(Rc::new(b.finish()), root).unwrap();

    assert_eq!(function.param_names(), vec!["x"]);
    let param = function.oracle.symbol(function.params[0]);
    assert!(param.is_some());
    assert_eq!(function.oracle.symbol(x), param);
    assert!(!function.has_expression_body());
}

#[test]
fn free_names_stay_unresolved() {
    let mut b = TreeBuilder::new();
    let free = b.ident("scene");
    let root = b.function(&[], free);
    let function = ParsedFunction::new(Rc::new(b.finish()), root).unwrap();
    assert_eq!(function.oracle.symbol(free), None);
    assert!(function.has_expression_body());
}

#[test]
fn declarations_carry_their_name() {
    let mut b = TreeBuilder::new();
    let body = b.block(vec![]);
    let root = b.function_decl("helper", &["a", "b"], body);
    let function = ParsedFunction::new(Rc::new(b.finish()), root).unwrap();
    assert_eq!(function.name.as_deref(), Some("helper"));
    assert_eq!(function.params.len(), 2);
}

#[test]
fn non_functions_are_rejected() {
    let mut b = TreeBuilder::new();
    let root = b.int(3);
    let err = ParsedFunction::new(Rc::new(b.finish()), root).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedConstruct);
    assert_eq!(err.node, Some(root));
}

#[test]
fn nested_functions_share_the_tree() {
    let mut b = TreeBuilder::new();
    let inner_body = b.block(vec![]);
    let inner = b.function(&["y"], inner_body);
    let decl = b.let_("f", inner);
    let body = b.block(vec![decl]);
    let root = b.function(&[], body);
    let outer = ParsedFunction::new(Rc::new(b.finish()), root).unwrap();
    let nested = outer.nested(inner).unwrap();
    assert!(nested.same_tree(&outer));
    assert_ne!(nested, outer);
    assert_eq!(nested, outer.nested(inner).unwrap());
}
