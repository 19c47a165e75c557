//! Calls: library functions, builtins, atomics, rendering intrinsics and
//! inlined user functions.

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_syntax::{NodeId, NodeKind};

use super::{bare_name, Compiler, Frame, FrameKind, MAX_INLINE_DEPTH};
use crate::host::HostValue;
use crate::oracle::ParsedFunction;
use crate::value::Value;

impl Compiler<'_> {
    pub(super) fn visit_call(&mut self, callee: NodeId, args: &[NodeId]) -> CompileResult<Value> {
        let callee_text = self.text(callee);
        let name = bare_name(&callee_text);

        if let Some(function) = self.library.get(name) {
            let function = function.clone();
            let args = self.argument_refs(args)?;
            return self.inline_call(&function, args);
        }

        let op_name = name.strip_prefix("Math.").unwrap_or(name);
        if let Some(&op) = self.registry.operation(op_name) {
            let args = args
                .iter()
                .map(|&arg| self.visit_rvalue(arg))
                .collect::<CompileResult<Vec<_>>>()?;
            return Ok(op.call(&mut self.builder, &args)?);
        }

        if let Some(&op) = self.registry.atomic(name) {
            let mut values = Vec::with_capacity(args.len());
            for (i, &arg) in args.iter().enumerate() {
                // The destination is passed by reference.
                let value = if i == 0 {
                    self.visit_expr(arg)?
                } else {
                    self.visit_rvalue(arg)?
                };
                values.push(value);
            }
            return Ok(op.call(&mut self.builder, &values)?);
        }

        if let Some(value) = self.try_render_intrinsic(name, args)? {
            return Ok(value);
        }

        if let NodeKind::PropertyAccess { object, name: method } = self.kind(callee) {
            if let Some(value) = self.try_method_call(&callee_text, object, &method, args)? {
                return Ok(value);
            }
        }

        let target = self.visit_expr(callee)?;
        match target.host_value() {
            Some(HostValue::Function(function)) => {
                let function = function.clone();
                let args = self.argument_refs(args)?;
                self.inline_call(&function, args)
            }
            _ => Err(CompileError::scope(format!(
                "`{callee_text}` is not a function"
            ))),
        }
    }

    /// `x.op(args)` for builtin operations, with the loaded receiver as the
    /// first argument.
    fn try_method_call(
        &mut self,
        callee_text: &str,
        object: NodeId,
        method: &str,
        args: &[NodeId],
    ) -> CompileResult<Option<Value>> {
        if matches!(self.text(object).as_str(), "ti" | "taichi" | "Math") {
            return Err(CompileError::scope(format!("unknown function `{callee_text}`")));
        }
        let Some(&op) = self.registry.operation(method) else {
            return Ok(None);
        };
        let receiver = self.visit_rvalue(object)?;
        if receiver.is_host_object() || receiver.is_function() {
            return Ok(None);
        }
        let mut values = Vec::with_capacity(args.len() + 1);
        values.push(receiver);
        for &arg in args {
            values.push(self.visit_rvalue(arg)?);
        }
        Ok(Some(op.call(&mut self.builder, &values)?))
    }

    /// Arguments as the callee sees them. L-values, functions and host
    /// references pass through; r-values get a local copy the callee may
    /// assign to.
    fn argument_refs(&mut self, args: &[NodeId]) -> CompileResult<Vec<Value>> {
        args.iter()
            .map(|&arg| {
                let value = self.visit_expr(arg)?;
                Ok(if value.is_pointer() || !value.ty.has_storage() {
                    value
                } else {
                    self.local_copy(&value)
                })
            })
            .collect()
    }

    /// Compile the body of `function` in place, with its parameters bound to
    /// `args`. A function from the kernel's own tree sees the caller's
    /// variables.
    fn inline_call(&mut self, function: &ParsedFunction, args: Vec<Value>) -> CompileResult<Value> {
        if self.inline_depth >= MAX_INLINE_DEPTH {
            return Err(CompileError::unsupported(format!(
                "calls nest deeper than {MAX_INLINE_DEPTH} levels; recursion is not supported"
            )));
        }
        if args.len() != function.params.len() {
            return Err(CompileError::type_error(format!(
                "`{}` expects {} argument(s), got {}",
                function.name.as_deref().unwrap_or("function"),
                function.params.len(),
                args.len()
            )));
        }

        let mut frame = Frame::new(function.clone(), FrameKind::Inlined);
        if function.same_tree(&self.frame.function) {
            frame.symbols = self.frame.symbols.clone();
            frame.templates = self.frame.templates.clone();
        }
        for (&param, value) in function.params.iter().zip(args) {
            let symbol = self.param_symbol(function, param)?;
            frame.symbols.insert(symbol, value);
        }

        let caller = std::mem::replace(&mut self.frame, frame);
        self.inline_depth += 1;
        tracing::trace!(
            function = function.name.as_deref().unwrap_or("<anonymous>"),
            depth = self.inline_depth,
            "inlining call"
        );
        let result = self.visit_function_body();
        self.inline_depth -= 1;
        let callee = std::mem::replace(&mut self.frame, caller);
        result?;
        Ok(callee.return_value.unwrap_or_else(Value::void))
    }
}
