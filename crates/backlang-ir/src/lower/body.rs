//! Method body lowering: statements to a flow graph
//!
//! Every value is produced by an instruction appended to the current block
//! and referenced by its [`InstrId`]. Arithmetic is single-typed: both
//! operands take the expected type of the whole expression and no promotion
//! happens between operand types.

use super::context::CompilationContext;
use super::PendingBody;
use crate::constant::Constant;
use crate::flow::FlowGraph;
use crate::instruction::{Argument, BlockId, Flow, InstrId, Instruction};
use crate::types::{MethodRef, Parameter, Primitive, TypeId};
use backlang_error::{ErrorCode, Span, Spanned};
use backlang_syntax::{Callee, CallStmt, Expr, Literal, QualifiedName, Stmt, VarDecl};
use tracing::{debug, trace};

/// Builtin routed to the `System.Console.Write` overloads
const PRINT: &str = "print";

/// Lowers one queued body and attaches the graph to its method
pub(crate) fn lower_body(ctx: &mut CompilationContext, pending: PendingBody) {
    let PendingBody { method, module, body } = pending;
    let signature = ctx.types().method(method);
    let params = signature.params.clone();
    let return_type = signature.return_type;
    let is_static = signature.is_static;
    debug!(method = %signature.name, statements = body.len(), "lowering body");

    let graph = FlowGraph::new();
    let block = graph.entry();
    let mut lowerer = BodyLowerer {
        ctx: &mut *ctx,
        module: &module,
        method,
        params,
        return_type,
        is_static,
        graph,
        block,
    };
    lowerer.lower_block(&body);

    let mut graph = lowerer.graph;
    graph.seal();
    ctx.types_mut().method_mut(method).body = Some(graph);
}

struct BodyLowerer<'a> {
    ctx: &'a mut CompilationContext,
    module: &'a QualifiedName,
    method: MethodRef,
    params: Vec<Parameter>,
    return_type: Option<TypeId>,
    is_static: bool,
    graph: FlowGraph,
    block: BlockId,
}

impl BodyLowerer<'_> {
    fn append(&mut self, instr: Instruction) -> InstrId {
        self.graph.append(self.block, instr)
    }

    fn lower_block(&mut self, stmts: &[Stmt]) {
        for (i, stmt) in stmts.iter().enumerate() {
            if self.graph.is_terminated(self.block) {
                trace!(skipped = stmts.len() - i, "statements after terminator");
                break;
            }
            self.lower_stmt(stmt);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Var(var) => self.lower_var(var),
            Stmt::Call(call) => match &call.callee {
                Callee::Unqualified { name } if name == PRINT => self.lower_print(call),
                Callee::Unqualified { name } => {
                    let owner = self.method.ty;
                    let display = name.clone();
                    self.lower_call(owner, name, &call.args, call.span, true, &display);
                }
                Callee::Qualified { ty, name } => {
                    let Some(target) = self.ctx.resolve_type(self.module, ty, call.span) else {
                        return;
                    };
                    let display = format!("{}::{}", ty, name);
                    self.lower_call(target, name, &call.args, call.span, false, &display);
                }
            },
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.lower_expr(expr, self.return_type),
                    None => None,
                };
                self.graph.set_flow(self.block, Flow::Return(value));
            }
            Stmt::Throw { value, .. } => self.lower_throw(value),
            Stmt::Error { span } => self.ctx.report(
                ErrorCode::MALFORMED_EXPRESSION,
                *span,
                "Malformed statement",
                "the parser could not recover this statement",
            ),
        }
    }

    fn lower_var(&mut self, var: &VarDecl) {
        let ty = match (&var.ty, &var.value) {
            (Some(ty), _) => self.ctx.resolve_type_expr(self.module, ty),
            (None, Some(value)) => self.infer(value),
            (None, None) => None,
        }
        .or_else(|| {
            if var.ty.is_some() {
                None
            } else {
                self.ctx.primitive(Primitive::Object)
            }
        });

        // The binding is only visible after its own initializer
        let init = match &var.value {
            Some(value) => self.lower_expr(value, ty),
            None => None,
        };
        let binding = self.graph.add_param(self.block, &var.name, ty);
        self.append(Instruction::Alloca { binding, ty, init });
    }

    /// `print(a, b)` writes each argument through its `Console.Write` overload
    fn lower_print(&mut self, call: &CallStmt) {
        let Some(console) = self.ctx.types().system("Console") else {
            return;
        };
        for arg in &call.args {
            self.lower_call(
                console,
                "Write",
                std::slice::from_ref(arg),
                arg.span(),
                true,
                PRINT,
            );
        }
    }

    /// Appends a call to the overload of `owner::name` matching `args`.
    ///
    /// Nothing is appended when no method matches.
    fn lower_call(&mut self, owner: TypeId, name: &str, args: &[Expr], span: Span, require_static: bool, display: &str) {
        let def = self.ctx.types().get(owner);
        let named: Vec<_> = def
            .find_method(name)
            .filter(|(_, m)| !require_static || m.is_static)
            .map(|(index, m)| (MethodRef { ty: owner, index }, m.signature()))
            .collect();

        if named.is_empty() {
            let message = if require_static {
                format!("Cannot find static function '{}'", display)
            } else {
                format!("Cannot find function '{}'", display)
            };
            self.ctx
                .report(ErrorCode::UNRESOLVED_CALL, span, message, "no method with this name");
            return;
        }

        let candidates: Vec<_> = named.into_iter().filter(|(_, sig)| sig.len() == args.len()).collect();
        let expected = match candidates.as_slice() {
            [(_, signature)] => signature.clone(),
            _ => vec![None; args.len()],
        };

        let mut values = Vec::with_capacity(args.len());
        let mut arg_types = Vec::with_capacity(args.len());
        for (arg, expected) in args.iter().zip(expected) {
            let Some(value) = self.lower_expr(arg, expected) else {
                return;
            };
            values.push(value);
            arg_types.push(self.value_type(value));
        }

        let object = self.ctx.primitive(Primitive::Object);
        let accepts = |exact: bool, sig: &[Option<TypeId>]| {
            sig.iter()
                .zip(&arg_types)
                .all(|(param, arg)| arg.is_none() || param == arg || (!exact && *param == object))
        };
        let selected = candidates
            .iter()
            .find(|(_, sig)| accepts(true, sig.as_slice()))
            .or_else(|| candidates.iter().find(|(_, sig)| accepts(false, sig.as_slice())));

        let Some((method, _)) = selected else {
            let types = self.ctx.types();
            let shown: Vec<_> = arg_types.iter().map(|t| types.name_of(*t)).collect();
            let message = format!("No overload of '{}' accepts ({})", display, shown.join(", "));
            self.ctx
                .report(ErrorCode::UNRESOLVED_CALL, span, message, "argument types do not match");
            return;
        };

        let method = *method;
        self.append(Instruction::Call { method, args: values });
    }

    fn lower_throw(&mut self, value: &Expr) {
        match value {
            Expr::Literal {
                value: Literal::String(_),
                ..
            } => {
                if let Some(message) = self.lower_expr(value, self.ctx.primitive(Primitive::String)) {
                    let ctor = self.ctx.types().system("Exception").and_then(|exception| {
                        self.ctx.types().get(exception).find_method(".ctor").find_map(|(index, m)| {
                            (m.params.len() == 1).then_some(MethodRef {
                                ty: exception,
                                index,
                            })
                        })
                    });
                    if let Some(ctor) = ctor {
                        self.append(Instruction::NewObject {
                            ctor,
                            args: vec![message],
                        });
                    }
                }
            }
            other => {
                self.lower_expr(other, None);
            }
        }
        self.graph.set_flow(self.block, Flow::Unreachable);
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    /// Lowers `expr`, converting literals to `expected` where numeric.
    ///
    /// Returns `None` when no value could be produced; the error is already
    /// recorded.
    fn lower_expr(&mut self, expr: &Expr, expected: Option<TypeId>) -> Option<InstrId> {
        match expr {
            Expr::Literal { value, span } => self.lower_literal(value, expected, *span),
            Expr::Ident { name, span } => self.lower_ident(name, *span),
            Expr::Binary { op, lhs, rhs, .. } => {
                let (operand_ty, result_ty) = if op.is_comparison() {
                    let operand = self.infer(lhs).or_else(|| self.infer(rhs));
                    (operand, self.ctx.primitive(Primitive::Bool))
                } else {
                    let ty = expected.or_else(|| self.infer(lhs)).or_else(|| self.infer(rhs));
                    (ty, ty)
                };
                let lhs = self.lower_expr(lhs, operand_ty);
                let rhs = self.lower_expr(rhs, operand_ty);
                Some(self.append(Instruction::Binary {
                    op: *op,
                    ty: result_ty,
                    lhs: lhs?,
                    rhs: rhs?,
                }))
            }
            Expr::Error { span } => {
                self.ctx.report(
                    ErrorCode::MALFORMED_EXPRESSION,
                    *span,
                    "Malformed expression",
                    "the parser could not recover this expression",
                );
                None
            }
        }
    }

    /// Constant plus load
    fn lower_literal(&mut self, literal: &Literal, expected: Option<TypeId>, span: Span) -> Option<InstrId> {
        let mut value = Constant::from_literal(literal);
        let mut ty = self.literal_type(literal, span);

        let target = expected.and_then(|e| self.ctx.types().get(e).primitive);
        if let Some(target) = target {
            let numeric_literal = matches!(value, Constant::Int { .. } | Constant::Float32(_) | Constant::Float64(_));
            let numeric_target = target.int_width().is_some() || target.is_float();
            if numeric_literal && numeric_target {
                value = value.convert(target);
                ty = expected;
            }
        }

        let constant = self.append(Instruction::Constant { value, ty });
        Some(self.append(Instruction::Load { ty, source: constant }))
    }

    fn lower_ident(&mut self, name: &str, span: Span) -> Option<InstrId> {
        if let Some(index) = self.params.iter().position(|p| p.name == name) {
            return Some(self.append(Instruction::LoadArg(Argument::Param(index))));
        }
        if let Some(binding) = self.graph.find_param(self.block, name) {
            return Some(self.append(Instruction::LoadLocal { binding }));
        }
        if name == "this" && !self.is_static {
            return Some(self.append(Instruction::LoadArg(Argument::This)));
        }

        self.ctx.report(
            ErrorCode::UNRESOLVED_NAME,
            span,
            format!("Cannot find value '{}' in this scope", name),
            "not a parameter or local variable",
        );
        None
    }

    fn literal_type(&mut self, literal: &Literal, span: Span) -> Option<TypeId> {
        let alias = QualifiedName::parse(literal.type_alias());
        self.ctx.resolve_type(&QualifiedName::global(), &alias, span)
    }

    /// Static type of `expr` without lowering it
    fn infer(&mut self, expr: &Expr) -> Option<TypeId> {
        match expr {
            Expr::Literal { value, span } => self.literal_type(value, *span),
            Expr::Ident { name, .. } => {
                if let Some(param) = self.params.iter().find(|p| p.name == *name) {
                    return param.ty;
                }
                if let Some(binding) = self.graph.find_param(self.block, name) {
                    return self.graph.param(binding).ty;
                }
                (name == "this" && !self.is_static).then_some(self.method.ty)
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                if op.is_comparison() {
                    self.ctx.primitive(Primitive::Bool)
                } else {
                    self.infer(lhs).or_else(|| self.infer(rhs))
                }
            }
            Expr::Error { .. } => None,
        }
    }

    fn value_type(&self, value: InstrId) -> Option<TypeId> {
        let types = self.ctx.types();
        self.graph
            .result_type(value, self.method.ty, types.method(self.method), types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::{lower_bodies, lower_declarations};
    use crate::FlowGraph;
    use backlang_syntax::{BinaryOperator, Decl, FnDecl, Tree, TypeDecl, TypeExpr, TypeKind};
    use pretty_assertions::assert_eq;

    fn compile(body: Vec<Decl>) -> CompilationContext {
        let mut ctx = CompilationContext::new("test");
        let queue = lower_declarations(&mut ctx, &[Tree::new("Demo", body)]);
        lower_bodies(&mut ctx, queue);
        ctx
    }

    fn body<'a>(ctx: &'a CompilationContext, ty: &str, method: &str) -> &'a FlowGraph {
        let def = ctx.assembly.find_type(ty).unwrap();
        let method = def.methods.iter().find(|m| m.name == method).unwrap();
        method.body.as_ref().unwrap()
    }

    fn kinds(graph: &FlowGraph) -> Vec<&'static str> {
        graph
            .instructions_of(graph.entry())
            .map(|(_, instr)| match instr {
                Instruction::Constant { .. } => "const",
                Instruction::Load { .. } => "load",
                Instruction::LoadArg(_) => "arg",
                Instruction::LoadLocal { .. } => "local",
                Instruction::Alloca { .. } => "alloca",
                Instruction::Binary { .. } => "binary",
                Instruction::Call { .. } => "call",
                Instruction::NewObject { .. } => "newobj",
                Instruction::StoreField { .. } => "store",
            })
            .collect()
    }

    #[test]
    fn test_var_declaration() {
        let main = FnDecl::new("main").with_body(vec![Stmt::var("x", Some(TypeExpr::named("i64")), Some(Expr::int(10)))]);
        let ctx = compile(vec![Decl::Fn(main)]);
        let graph = body(&ctx, "Program", "Main");

        assert_eq!(kinds(graph), vec!["const", "load", "alloca"]);
        let block = graph.block(graph.entry());
        assert_eq!(block.params[0].name, "x");
        assert_eq!(block.params[0].ty, ctx.primitive(Primitive::I64));
        let Instruction::Constant { value, .. } = graph.instruction(block.instructions[0]) else {
            panic!("expected a constant");
        };
        assert_eq!(value.as_i64(), Some(10));
        assert_eq!(block.flow(), Flow::Return(None));
    }

    #[test]
    fn test_inferred_var_type() {
        let main = FnDecl::new("main").with_body(vec![
            Stmt::var("s", None, Some(Expr::string("hi"))),
            Stmt::var("o", None, None),
        ]);
        let ctx = compile(vec![Decl::Fn(main)]);
        let graph = body(&ctx, "Program", "Main");

        let params = &graph.block(graph.entry()).params;
        assert_eq!(params[0].ty, ctx.primitive(Primitive::String));
        assert_eq!(params[1].ty, ctx.primitive(Primitive::Object));
    }

    #[test]
    fn test_binary_uses_declared_type() {
        let sum = Expr::binary(BinaryOperator::Add, Expr::ident("a"), Expr::int(1));
        let f = FnDecl::new("inc")
            .param("a", TypeExpr::named("f64"))
            .returns(TypeExpr::named("f64"))
            .with_body(vec![Stmt::ret(Some(sum))]);
        let ctx = compile(vec![Decl::Fn(f)]);
        let graph = body(&ctx, "Program", "inc");

        assert_eq!(kinds(graph), vec!["arg", "const", "load", "binary"]);
        let block = graph.block(graph.entry());
        let Instruction::Constant { value, ty } = graph.instruction(block.instructions[1]) else {
            panic!("expected a constant");
        };
        assert_eq!(*value, Constant::Float64(1.0));
        assert_eq!(*ty, ctx.primitive(Primitive::F64));
        assert_eq!(block.flow(), Flow::Return(Some(block.instructions[3])));
        assert!(ctx.diagnostics.is_empty());
    }

    #[test]
    fn test_print_selects_overload() {
        let main = FnDecl::new("main").with_body(vec![Stmt::call("print", vec![Expr::string("hi"), Expr::int(3)])]);
        let ctx = compile(vec![Decl::Fn(main)]);
        let graph = body(&ctx, "Program", "Main");

        let calls: Vec<_> = graph
            .instructions_of(graph.entry())
            .filter_map(|(_, instr)| match instr {
                Instruction::Call { method, .. } => Some(ctx.types().method(*method).params[0].ty),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec![ctx.primitive(Primitive::String), ctx.primitive(Primitive::I32)]);
    }

    #[test]
    fn test_unknown_static_function() {
        let main = FnDecl::new("main").with_body(vec![Stmt::call("missing", vec![])]);
        let ctx = compile(vec![Decl::Fn(main)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::UNRESOLVED_CALL), 1);
        let message = &ctx.diagnostics.iter().next().unwrap().message;
        assert_eq!(message, "Cannot find static function 'missing'");
        assert!(kinds(body(&ctx, "Program", "Main")).is_empty());
    }

    #[test]
    fn test_qualified_call() {
        let max = FnDecl::new("max")
            .with_modifier(backlang_syntax::Modifier::Static)
            .param("a", TypeExpr::named("i32"))
            .param("b", TypeExpr::named("i32"))
            .returns(TypeExpr::named("i32"))
            .with_body(vec![Stmt::ret(Some(Expr::ident("a")))]);
        let math = TypeDecl::new(TypeKind::Class, "Math").method(max);
        let main = FnDecl::new("main").with_body(vec![Stmt::call_qualified("Math", "max", vec![Expr::int(1), Expr::int(2)])]);
        let ctx = compile(vec![Decl::Fn(main), Decl::Type(math)]);

        assert!(ctx.diagnostics.is_empty());
        let graph = body(&ctx, "Program", "Main");
        assert_eq!(kinds(graph), vec!["const", "load", "const", "load", "call"]);
    }

    #[test]
    fn test_binding_not_visible_in_own_initializer() {
        let main = FnDecl::new("main").with_body(vec![
            Stmt::var("x", Some(TypeExpr::named("i32")), Some(Expr::ident("x"))),
            Stmt::var("y", Some(TypeExpr::named("i32")), Some(Expr::ident("x"))),
        ]);
        let ctx = compile(vec![Decl::Fn(main)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::UNRESOLVED_NAME), 1);
        let graph = body(&ctx, "Program", "Main");
        assert_eq!(kinds(graph), vec!["alloca", "local", "alloca"]);
    }

    #[test]
    fn test_unresolved_identifier_is_reported() {
        let main = FnDecl::new("main").with_body(vec![Stmt::var("x", Some(TypeExpr::named("i32")), Some(Expr::ident("y")))]);
        let ctx = compile(vec![Decl::Fn(main)]);

        assert_eq!(ctx.diagnostics.count(ErrorCode::UNRESOLVED_NAME), 1);
        let graph = body(&ctx, "Program", "Main");
        let block = graph.block(graph.entry());
        assert_eq!(
            graph.instruction(block.instructions[0]),
            &Instruction::Alloca {
                binding: crate::instruction::BindingId {
                    block: graph.entry(),
                    index: 0
                },
                ty: ctx.primitive(Primitive::I32),
                init: None,
            }
        );
    }

    #[test]
    fn test_throw_string() {
        let main = FnDecl::new("main").with_body(vec![
            Stmt::throw(Expr::string("boom")),
            Stmt::call("print", vec![Expr::string("never")]),
        ]);
        let ctx = compile(vec![Decl::Fn(main)]);
        let graph = body(&ctx, "Program", "Main");

        assert_eq!(kinds(graph), vec!["const", "load", "newobj"]);
        assert_eq!(graph.block(graph.entry()).flow(), Flow::Unreachable);
    }
}
