#![allow(clippy::unwrap_used)]

use kiln_types::{PrimitiveType, Type};
use pretty_assertions::assert_eq;

use crate::module::BlockSlot;
use crate::printer::print_module;
use crate::program::{FieldOptions, Program};
use crate::transform::{rebuild_module, Transformer};

use super::*;

#[test]
fn statements_go_to_root_without_open_block() {
    let mut b = IrBuilder::new();
    let x = b.create_const_i32(3);
    let y = b.create_const_f32(1.5);
    let module = b.into_module();
    assert_eq!(module.root.stmts, vec![x, y]);
}

#[test]
fn binary_result_types() {
    let mut b = IrBuilder::new();
    let i = b.create_const_i32(3);
    let f = b.create_const_f32(1.5);
    let mixed = b.create_binary(BinaryOpType::Add, i, f);
    let ints = b.create_binary(BinaryOpType::Mul, i, i);
    let cmp = b.create_binary(BinaryOpType::CmpLt, f, f);
    let div = b.create_binary(BinaryOpType::Truediv, i, i);
    let fdiv = b.create_binary(BinaryOpType::Floordiv, f, f);
    let m = b.module();
    assert_eq!(m.return_type(mixed), Some(PrimitiveType::F32));
    assert_eq!(m.return_type(ints), Some(PrimitiveType::I32));
    assert_eq!(m.return_type(cmp), Some(PrimitiveType::I32));
    assert_eq!(m.return_type(div), Some(PrimitiveType::F32));
    assert_eq!(m.return_type(fdiv), Some(PrimitiveType::I32));
}

#[test]
fn unary_result_types_and_casts() {
    let mut b = IrBuilder::new();
    let f = b.create_const_f32(2.5);
    let floor = b.create_unary(UnaryOpType::Floor, f);
    let neg = b.create_unary(UnaryOpType::Neg, floor);
    let same = b.create_cast(f, PrimitiveType::F32);
    let cast = b.create_cast(f, PrimitiveType::I32);
    let m = b.module();
    assert_eq!(m.return_type(floor), Some(PrimitiveType::I32));
    assert_eq!(m.return_type(neg), Some(PrimitiveType::I32));
    assert_eq!(same, f);
    assert!(matches!(m.kind(cast), StmtKind::Unary(UnaryOpType::CastI32Value)));
}

#[test]
fn memory_statements_carry_pointee_type() {
    let mut program = Program::new();
    let field = program.create_field(
        Type::vector(PrimitiveType::F32, 2),
        vec![8],
        FieldOptions::default(),
    );
    let mut b = IrBuilder::new();
    let idx = b.create_const_i32(0);
    let ptr = b.create_global_ptr(&field, &[idx], 1);
    let load = b.create_global_load(ptr);
    let local = b.create_alloca(PrimitiveType::I32);
    let local_load = b.create_local_load(local);
    let tmp = b.create_global_temporary(PrimitiveType::F32, 3);
    let tmp_load = b.create_global_temporary_load(tmp);
    let m = b.module();
    assert_eq!(m.pointed_type(ptr), Some(PrimitiveType::F32));
    assert_eq!(m.return_type(load), Some(PrimitiveType::F32));
    assert_eq!(m.return_type(local_load), Some(PrimitiveType::I32));
    assert_eq!(m.return_type(tmp_load), Some(PrimitiveType::F32));
    assert_eq!(m.pointed_type(load), None);
}

#[test]
fn attached_guard_installs_block_on_drop() {
    let mut b = IrBuilder::new();
    let cond = b.create_const_i32(1);
    let branch = b.create_if(cond);
    let then_stmt;
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Then(branch));
        then_stmt = g.create_break();
        assert_eq!(g.depth(), 1);
    }
    assert_eq!(b.depth(), 0);
    let module = b.into_module();
    assert_eq!(module.root.stmts, vec![cond, branch]);
    assert_eq!(module.block(BlockSlot::Then(branch)).unwrap().stmts, vec![then_stmt]);
    assert!(module.block(BlockSlot::Else(branch)).unwrap().is_empty());
}

#[test]
fn detached_guard_returns_block() {
    let mut b = IrBuilder::new();
    let mut g = InsertGuard::new(&mut b);
    let x = g.create_const_i32(7);
    let block = g.finish();
    assert_eq!(block.stmts, vec![x]);
    let module = b.into_module();
    assert!(module.root.is_empty());
}

#[test]
fn nested_guards_release_in_reverse_order() {
    let mut b = IrBuilder::new();
    let w = b.create_while();
    let inner_if;
    let brk;
    {
        let mut body = InsertGuard::attach(&mut b, BlockSlot::Body(w));
        let c = body.create_const_i32(0);
        inner_if = body.create_if(c);
        {
            let mut then = InsertGuard::attach(&mut *body, BlockSlot::Then(inner_if));
            brk = then.create_break();
            assert_eq!(then.depth(), 2);
        }
        assert_eq!(body.depth(), 1);
    }
    let module = b.into_module();
    assert_eq!(module.reachable().len(), 4);
    assert_eq!(module.block(BlockSlot::Then(inner_if)).unwrap().stmts, vec![brk]);
}

fn build_with_early_exit(b: &mut IrBuilder, fail: bool) -> Result<StmtId, String> {
    let w = b.create_while();
    let mut g = InsertGuard::attach(b, BlockSlot::Body(w));
    g.create_continue();
    if fail {
        return Err("bail".to_owned());
    }
    g.create_break();
    Ok(w)
}

#[test]
fn guard_releases_on_early_return() {
    let mut b = IrBuilder::new();
    assert!(build_with_early_exit(&mut b, true).is_err());
    assert_eq!(b.depth(), 0);
    let w = build_with_early_exit(&mut b, false).unwrap();
    assert_eq!(b.module().block(BlockSlot::Body(w)).unwrap().len(), 2);
}

/// Drops every constant equal to zero.
struct DropZeros {
    builder: IrBuilder,
}

impl BuilderHost for DropZeros {
    fn builder(&mut self) -> &mut IrBuilder {
        &mut self.builder
    }
}

impl Transformer for DropZeros {
    fn visit(&mut self, id: StmtId) {
        if matches!(self.builder.module().kind(id), StmtKind::Const(ConstValue::I32(0))) {
            return;
        }
        self.keep(id);
    }
}

#[test]
fn transformer_rebuilds_nested_blocks() {
    let mut b = IrBuilder::new();
    b.create_const_i32(0);
    let n = b.create_const_i32(4);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        g.create_const_i32(0);
        g.create_loop_index(lp);
    }
    let mut pass = DropZeros {
        builder: IrBuilder::from_module(b.into_module()),
    };
    rebuild_module(&mut pass);
    let module = pass.builder.into_module();

    assert_eq!(module.root.len(), 2);
    assert_eq!(module.block(BlockSlot::Body(lp)).unwrap().len(), 1);
}

#[test]
fn printer_output_is_stable() {
    let mut b = IrBuilder::new();
    let n = b.create_const_i32(16);
    let lp = b.create_range_for(n, false);
    {
        let mut g = InsertGuard::attach(&mut b, BlockSlot::Body(lp));
        let i = g.create_loop_index(lp);
        let c = g.create_binary(BinaryOpType::CmpLt, i, n);
        let branch = g.create_if(c);
        let mut t = InsertGuard::attach(&mut *g, BlockSlot::Then(branch));
        t.create_discard();
    }
    let text = print_module(&b.into_module());
    let expected = "\
%0 : i32 = const 16
%1: range_for %0 serial {
  %2 : i32 = loop_index %1
  %3 : i32 = binary cmp_lt %2, %0
  %4: if %3 {
    discard
  }
}
";
    assert_eq!(text, expected);
}
