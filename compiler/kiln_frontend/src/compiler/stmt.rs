//! Statements and structured control flow.

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{BinaryOpType, BlockSlot, InsertGuard};
use kiln_syntax::{NodeId, NodeKind};
use kiln_types::Type;

use super::{bare_name, Compiler, FrameKind, LoopKind};
use crate::builtin::apply_binary;
use crate::value::Value;

/// Names a kernel may not declare.
const RESERVED_NAMES: &[&str] = &["taichi", "ti", "Math", "null", "undefined"];

impl Compiler<'_> {
    pub(super) fn dispatch_stmt(&mut self, node: NodeId) -> CompileResult<()> {
        match self.kind(node) {
            NodeKind::VariableStatement(declarations) => {
                for (ident, init) in declarations {
                    self.visit_declaration(ident, init)?;
                }
                Ok(())
            }
            NodeKind::ExpressionStatement(expr) => self.visit_expr(expr).map(drop),
            NodeKind::Block(stmts) => self.visit_block(&stmts),
            NodeKind::If {
                cond,
                then_stmt,
                else_stmt,
            } => self.visit_if(cond, then_stmt, else_stmt),
            NodeKind::While { cond, body } => self.visit_while(cond, body),
            NodeKind::ForOf {
                bindings,
                iterable,
                body,
            } => self.visit_for_of(&bindings, iterable, body),
            NodeKind::ForIn { .. } => Err(CompileError::unsupported(
                "for-in loops are not supported; iterate with for-of over range() or ndrange()",
            )),
            NodeKind::For { .. } => Err(CompileError::unsupported(
                "C-style for loops are not supported; iterate with for-of over range() or ndrange()",
            )),
            NodeKind::Break => match self.frame.loops.last() {
                Some(LoopKind::While) => {
                    self.builder.create_break();
                    Ok(())
                }
                _ => Err(CompileError::unsupported(
                    "`break` is only supported directly inside a while loop",
                )),
            },
            NodeKind::Continue => match self.frame.loops.last() {
                Some(LoopKind::For | LoopKind::While) => {
                    self.builder.create_continue();
                    Ok(())
                }
                _ => Err(CompileError::unsupported(
                    "`continue` is only supported inside range loops and while loops",
                )),
            },
            NodeKind::Return(value) => self.visit_return(value),
            NodeKind::FunctionDeclaration { name, .. } => {
                let function = self.frame.function.nested(node)?;
                self.bind(name, Value::function(function))
            }
            NodeKind::Unsupported(kind) => Err(CompileError::unsupported(format!(
                "{kind} is not supported in kernels"
            ))),
            _ => self.visit_expr(node).map(drop),
        }
    }

    fn visit_declaration(&mut self, ident: NodeId, init: Option<NodeId>) -> CompileResult<()> {
        let tree = &self.frame.function.tree;
        let name = tree.identifier(ident).unwrap_or_default();
        if RESERVED_NAMES.contains(&name) || name.contains('$') {
            return Err(CompileError::unsupported(format!(
                "`{name}` cannot be used as a variable name"
            ))
            .at_node(tree, ident));
        }
        let Some(init) = init else {
            return Err(CompileError::unsupported(format!(
                "`{name}` must be initialized where it is declared"
            ))
            .at_node(tree, ident));
        };

        let value = self.visit_expr(init)?;
        let bound = if value.is_function() || value.is_host_object() {
            value
        } else {
            let value = self.load(&value);
            if !value.ty.has_storage() {
                return Err(CompileError::type_error(format!(
                    "cannot declare a variable of type {}",
                    value.ty
                )));
            }
            self.local_copy(&value)
        };
        self.bind(ident, bound)
    }

    /// Function declarations are visible in their whole block.
    fn visit_block(&mut self, stmts: &[NodeId]) -> CompileResult<()> {
        for &stmt in stmts {
            let name = match self.frame.function.tree.kind(stmt) {
                NodeKind::FunctionDeclaration { name, .. } => *name,
                _ => continue,
            };
            let function = self.frame.function.nested(stmt)?;
            self.bind(name, Value::function(function))?;
        }
        stmts.iter().try_for_each(|&stmt| self.visit_stmt(stmt))
    }

    fn visit_if(
        &mut self,
        cond: NodeId,
        then_stmt: NodeId,
        else_stmt: Option<NodeId>,
    ) -> CompileResult<()> {
        if let Some(inner) = self.static_argument(cond) {
            let value = self.visit_rvalue(inner)?;
            let Some(taken) = value.scalar_constant() else {
                return Err(CompileError::type_error(
                    "static() needs a compile-time constant condition",
                ));
            };
            return match (taken != 0.0, else_stmt) {
                (true, _) => self.visit_stmt(then_stmt),
                (false, Some(else_stmt)) => self.visit_stmt(else_stmt),
                (false, None) => Ok(()),
            };
        }

        let cond = self.visit_rvalue(cond)?;
        if !matches!(cond.ty, Type::Scalar(_)) {
            return Err(CompileError::type_error(format!(
                "if conditions must be scalars, got {}",
                cond.ty
            )));
        }
        let if_stmt = self.builder.create_if(cond.stmts[0]);
        self.frame.branch_depth += 1;
        let result = self.visit_branches(if_stmt, then_stmt, else_stmt);
        self.frame.branch_depth -= 1;
        result
    }

    fn visit_branches(
        &mut self,
        if_stmt: kiln_ir::StmtId,
        then_stmt: NodeId,
        else_stmt: Option<NodeId>,
    ) -> CompileResult<()> {
        InsertGuard::attach(self, BlockSlot::Then(if_stmt)).visit_stmt(then_stmt)?;
        if let Some(else_stmt) = else_stmt {
            InsertGuard::attach(self, BlockSlot::Else(if_stmt)).visit_stmt(else_stmt)?;
        }
        Ok(())
    }

    /// `while (c) body` becomes `While { if (c == 0) break; body }`.
    fn visit_while(&mut self, cond: NodeId, body: NodeId) -> CompileResult<()> {
        let while_stmt = self.builder.create_while();
        let mut guard = InsertGuard::attach(self, BlockSlot::Body(while_stmt));

        let cond = guard.visit_rvalue(cond)?;
        let Type::Scalar(prim) = cond.ty else {
            return Err(CompileError::type_error(format!(
                "while conditions must be scalars, got {}",
                cond.ty
            )));
        };
        let zero = guard.builder.create_constant(prim, 0.0);
        let zero = Value::constant_scalar(zero, 0.0, prim);
        let stop = apply_binary(&mut guard.builder, BinaryOpType::CmpEq, &cond, &zero);
        let exit = guard.builder.create_if(stop.stmts[0]);
        InsertGuard::attach(&mut *guard, BlockSlot::Then(exit))
            .builder
            .create_break();

        guard.frame.loops.push(LoopKind::While);
        let result = guard.visit_stmt(body);
        guard.frame.loops.pop();
        result
    }

    /// `return` ends the function. Kernels write their result to the
    /// return buffer; inlined functions hand it to the call site.
    pub(super) fn visit_return(&mut self, value: Option<NodeId>) -> CompileResult<()> {
        if !self.is_top_level() {
            return Err(CompileError::unsupported(
                "`return` inside a loop or a branch is not supported",
            ));
        }
        let value = match value {
            Some(value) => self.visit_rvalue(value)?,
            None => Value::void(),
        };
        if self.frame.kind == FrameKind::Kernel && value.ty != Type::Void {
            if !value.ty.has_storage() {
                return Err(CompileError::type_error(format!(
                    "kernels cannot return a value of type {}",
                    value.ty
                )));
            }
            self.builder.create_return(&value.stmts);
        }
        self.frame.return_value = Some(value);
        Ok(())
    }

    /// The argument of `static(x)`.
    pub(super) fn static_argument(&self, node: NodeId) -> Option<NodeId> {
        let tree = &self.frame.function.tree;
        match tree.kind(node) {
            NodeKind::Call { callee, args } if args.len() == 1 => {
                let text = tree.expr_text(*callee);
                matches!(bare_name(&text), "static" | "Static").then(|| args[0])
            }
            _ => None,
        }
    }
}
