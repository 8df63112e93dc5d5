//! bs2k Backend - Generates Backseater 2k VM assembly
//!
//! Calling convention:
//! - arguments in R1..Rn, result in R0
//! - every IR value gets its own register above the arguments
//! - callers save their live registers on the stack around a call
//!
//! The VM has no object memory, so only static methods are emitted.

pub mod constants;
pub mod intrinsics;
pub mod mangle;

use crate::{CodeGen, EmitError};
use backlang_ir::{
    Argument, Assembly, BindingId, BlockId, Constant, Flow, FlowGraph, InstrId, Instruction, MethodRef, Origin,
    Primitive, TypeTable,
};
use backlang_syntax::BinaryOperator;
use constants::{ENTRY_POINT, REGISTER_COUNT, STACK_START};
use std::collections::HashMap;
use std::fmt::Write;
use tracing::{debug, trace};

const BACKEND: &str = "bs2k";

/// bs2k assembly generation backend
#[derive(Debug, Default)]
pub struct Bs2kEmitter;

impl Bs2kEmitter {
    pub fn new() -> Self {
        Self
    }
}

impl CodeGen for Bs2kEmitter {
    type Output = String;

    fn generate(&self, assembly: &Assembly) -> Result<String, EmitError> {
        let types = &assembly.types;
        let mut output = String::new();
        let mut strings = StringPool::default();

        writeln!(output, "; Backseater 2k assembly for {}", assembly.name)?;
        writeln!(output, "; Generated by the Backlang compiler, loaded at {}", ENTRY_POINT)?;
        writeln!(output)?;
        writeln!(output, "    copy {}, SP", STACK_START)?;
        if let Some(entry) = assembly.entry_point {
            writeln!(output, "    call {}", mangle::mangle(types, entry))?;
        }
        writeln!(output, "    halt")?;

        for (ty, def) in assembly.defined_types() {
            for (index, method) in def.methods.iter().enumerate() {
                let method_ref = MethodRef { ty, index };
                writeln!(output)?;
                if !method.is_static {
                    writeln!(output, "; skipped instance method {}::{}", def.name, method.name)?;
                    continue;
                }
                let Some(body) = &method.body else {
                    writeln!(output, "; {}::{} has no body", def.name, method.name)?;
                    continue;
                };
                debug!(method = %method.name, "emitting bs2k method");
                MethodWriter::new(types, method_ref, body, &mut strings).write(&mut output)?;
            }
        }

        if !strings.values.is_empty() {
            writeln!(output)?;
            writeln!(output, "; data")?;
            for (i, value) in strings.values.iter().enumerate() {
                writeln!(output, "$str{}:", i)?;
                writeln!(output, "    .string \"{}\"", value.escape_default())?;
            }
        }
        Ok(output)
    }
}

/// String constants, deduplicated into the trailing data section
#[derive(Default)]
struct StringPool {
    values: Vec<String>,
    index: HashMap<String, usize>,
}

impl StringPool {
    fn label(&mut self, value: &str) -> String {
        let next = self.values.len();
        let index = *self.index.entry(value.to_string()).or_insert_with(|| next);
        if index == next {
            self.values.push(value.to_string());
        }
        format!("$str{}", index)
    }
}

struct MethodWriter<'a> {
    types: &'a TypeTable,
    method: MethodRef,
    symbol: String,
    body: &'a FlowGraph,
    strings: &'a mut StringPool,
    values: HashMap<InstrId, u16>,
    bindings: HashMap<BindingId, u16>,
    next_register: u16,
}

impl<'a> MethodWriter<'a> {
    fn new(types: &'a TypeTable, method: MethodRef, body: &'a FlowGraph, strings: &'a mut StringPool) -> Self {
        let params = types.method(method).params.len() as u16;
        Self {
            types,
            method,
            symbol: mangle::mangle(types, method),
            body,
            strings,
            values: HashMap::new(),
            bindings: HashMap::new(),
            next_register: params + 1,
        }
    }

    fn allocate(&mut self) -> Result<u16, EmitError> {
        if self.next_register >= REGISTER_COUNT {
            return Err(EmitError::OutOfRegisters(self.symbol.clone()));
        }
        self.next_register += 1;
        Ok(self.next_register - 1)
    }

    fn register(&self, value: InstrId) -> Result<u16, EmitError> {
        self.values
            .get(&value)
            .copied()
            .ok_or_else(|| EmitError::Unsupported {
                backend: BACKEND,
                what: format!("use of %{} before its definition in {}", value.index(), self.symbol),
            })
    }

    fn binding(&mut self, binding: BindingId) -> Result<u16, EmitError> {
        if let Some(register) = self.bindings.get(&binding) {
            return Ok(*register);
        }
        let register = self.allocate()?;
        self.bindings.insert(binding, register);
        Ok(register)
    }

    fn block_label(&self, block: BlockId) -> String {
        format!("{}$b{}", self.symbol, block.index())
    }

    fn write(mut self, out: &mut String) -> Result<(), EmitError> {
        let owner = self.types.get(self.method.ty);
        writeln!(out, "{}:", self.symbol)?;
        writeln!(out, "    ; {}::{}", owner.name, self.types.method(self.method).name)?;

        let body = self.body;
        for (block, _) in body.blocks() {
            if block != body.entry() {
                writeln!(out, "{}:", self.block_label(block))?;
            }
            for (id, instr) in body.instructions_of(block) {
                self.write_instruction(out, id, instr)?;
            }
            self.write_flow(out, body.block(block).flow())?;
        }
        Ok(())
    }

    fn write_instruction(&mut self, out: &mut String, id: InstrId, instr: &Instruction) -> Result<(), EmitError> {
        trace!(instr = id.index(), "bs2k instruction");
        match instr {
            Instruction::Constant { value, .. } => {
                let target = self.allocate()?;
                self.values.insert(id, target);
                match value {
                    Constant::String(s) => {
                        let label = self.strings.label(s);
                        writeln!(out, "    copy {}, R{}", label, target)?;
                    }
                    Constant::Float32(v) => writeln!(out, "    copy {}, R{} ; {}f32", v.to_bits(), target, v)?,
                    Constant::Float64(v) => writeln!(out, "    copy {}, R{} ; {}f64", v.to_bits(), target, v)?,
                    Constant::Null => writeln!(out, "    copy 0, R{}", target)?,
                    other => {
                        let value = other.as_i64().ok_or_else(|| EmitError::Unsupported {
                            backend: BACKEND,
                            what: format!("constant {}", other),
                        })?;
                        writeln!(out, "    copy {}, R{}", value, target)?;
                    }
                }
            }
            Instruction::Load { source, .. } => {
                let source = self.register(*source)?;
                let target = self.allocate()?;
                self.values.insert(id, target);
                writeln!(out, "    copy R{}, R{}", source, target)?;
            }
            Instruction::LoadArg(Argument::Param(index)) => {
                let target = self.allocate()?;
                self.values.insert(id, target);
                writeln!(out, "    copy R{}, R{}", index + 1, target)?;
            }
            Instruction::LoadArg(Argument::This) | Instruction::StoreField { .. } => {
                return Err(EmitError::Unsupported {
                    backend: BACKEND,
                    what: format!("object access in {}", self.symbol),
                });
            }
            Instruction::LoadLocal { binding } => {
                let source = self.binding(*binding)?;
                let target = self.allocate()?;
                self.values.insert(id, target);
                writeln!(out, "    copy R{}, R{}", source, target)?;
            }
            Instruction::Alloca { binding, init, .. } => {
                let target = self.binding(*binding)?;
                match init {
                    Some(init) => writeln!(out, "    copy R{}, R{}", self.register(*init)?, target)?,
                    None => writeln!(out, "    copy 0, R{}", target)?,
                }
            }
            Instruction::Binary { op, lhs, rhs, .. } => {
                let lhs = self.register(*lhs)?;
                let rhs = self.register(*rhs)?;
                let target = self.allocate()?;
                self.values.insert(id, target);
                match op {
                    BinaryOperator::Div => writeln!(out, "    divmod R{}, R{}, R{}, R0", lhs, rhs, target)?,
                    BinaryOperator::Rem => writeln!(out, "    divmod R{}, R{}, R0, R{}", lhs, rhs, target)?,
                    _ => writeln!(out, "    {} R{}, R{}, R{}", mnemonic(*op), lhs, rhs, target)?,
                }
            }
            Instruction::Call { method, args } => self.write_call(out, id, *method, args)?,
            Instruction::NewObject { ctor, .. } => {
                // No heap: the reference is null and only feeds `unreachable`
                let target = self.allocate()?;
                self.values.insert(id, target);
                writeln!(out, "    copy 0, R{} ; new {}", target, self.types.get(ctor.ty).name)?;
            }
        }
        Ok(())
    }

    fn write_call(&mut self, out: &mut String, id: InstrId, method: MethodRef, args: &[InstrId]) -> Result<(), EmitError> {
        let types = self.types;
        let callee = types.method(method);
        if intrinsics::is_intrinsic(types, method) {
            let constants = args
                .iter()
                .map(|arg| self.constant_of(*arg))
                .collect::<Option<Vec<_>>>();
            let expansion = constants
                .and_then(|c| intrinsics::expand(&callee.name, &c))
                .ok_or_else(|| EmitError::IntrinsicArgument {
                    name: callee.name.clone(),
                })?;
            for line in expansion.lines() {
                writeln!(out, "    {}", line)?;
            }
            return Ok(());
        }

        // External types have no labels in the output
        let owner = types.get(method.ty);
        if owner.origin == Origin::External {
            return Err(EmitError::Unsupported {
                backend: BACKEND,
                what: format!("a call to external method {}::{}", owner.name, callee.name),
            });
        }

        let saved: Vec<u16> = (1..self.next_register).collect();
        for register in &saved {
            writeln!(out, "    push R{}", register)?;
        }
        for arg in args {
            writeln!(out, "    push R{}", self.register(*arg)?)?;
        }
        for index in (1..=args.len()).rev() {
            writeln!(out, "    pop R{}", index)?;
        }
        writeln!(out, "    call {}", mangle::mangle(types, method))?;

        let void = types.primitive(Primitive::Void);
        if callee.return_type.is_some() && callee.return_type != void {
            let target = self.allocate()?;
            self.values.insert(id, target);
            writeln!(out, "    copy R0, R{}", target)?;
        }
        for register in saved.iter().rev() {
            writeln!(out, "    pop R{}", register)?;
        }
        Ok(())
    }

    /// Literal behind a value, looking through loads
    fn constant_of(&self, value: InstrId) -> Option<Constant> {
        match self.body.instruction(value) {
            Instruction::Constant { value, .. } => Some(value.clone()),
            Instruction::Load { source, .. } => self.constant_of(*source),
            _ => None,
        }
    }

    fn write_flow(&self, out: &mut String, flow: Flow) -> Result<(), EmitError> {
        match flow {
            Flow::Return(Some(value)) => {
                writeln!(out, "    copy R{}, R0", self.register(value)?)?;
                writeln!(out, "    return")?;
            }
            Flow::Return(None) => writeln!(out, "    return")?,
            Flow::Jump(block) => writeln!(out, "    jump {}", self.block_label(block))?,
            Flow::Unreachable => writeln!(out, "    halt")?,
        }
        Ok(())
    }
}

fn mnemonic(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "add",
        BinaryOperator::Sub => "sub",
        BinaryOperator::Mul => "mult",
        BinaryOperator::Div | BinaryOperator::Rem => "divmod",
        BinaryOperator::BitAnd => "and",
        BinaryOperator::BitOr => "or",
        BinaryOperator::BitXor => "xor",
        BinaryOperator::Shl => "lshift",
        BinaryOperator::Shr => "rshift",
        BinaryOperator::Eq => "comp_eq",
        BinaryOperator::Ne => "comp_neq",
        BinaryOperator::Lt => "comp_lt",
        BinaryOperator::Le => "comp_le",
        BinaryOperator::Gt => "comp_gt",
        BinaryOperator::Ge => "comp_ge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backlang_ir::lower::{lower_bodies, lower_declarations, CompilationContext};
    use backlang_syntax::{Decl, Expr, FnDecl, Stmt, Tree, TypeExpr};

    fn emit(body: Vec<Decl>) -> String {
        let mut ctx = CompilationContext::new("vm");
        intrinsics::install(&mut ctx.assembly.types);
        let queue = lower_declarations(&mut ctx, &[Tree::new("Demo", body)]);
        lower_bodies(&mut ctx, queue);
        assert!(ctx.diagnostics.is_empty(), "{:?}", ctx.diagnostics);
        Bs2kEmitter::new().generate(&ctx.assembly).unwrap()
    }

    #[test]
    fn test_entry_point_is_called() {
        let output = emit(vec![Decl::Fn(FnDecl::new("main").with_body(vec![]))]);

        assert!(output.contains(&format!("copy {}, SP", STACK_START)));
        assert!(output.contains("    call $Program.Main\n    halt"));
        assert!(output.contains("$Program.Main:\n"));
    }

    #[test]
    fn test_intrinsics_expand_inline() {
        let main = FnDecl::new("main").with_body(vec![
            Stmt::call_qualified("Intrinsics", "Push", vec![Expr::int(42)]),
            Stmt::call_qualified("Intrinsics", "Copy", vec![Expr::string("R5"), Expr::int(1)]),
        ]);
        let output = emit(vec![Decl::Fn(main)]);

        assert!(output.contains("    copy 42, R0\n    push R0\n"));
        assert!(output.contains("    copy R5, 1\n"));
        assert!(!output.contains("call $Intrinsics"));
    }

    #[test]
    fn test_arguments_and_result() {
        let add = FnDecl::new("add")
            .param("a", TypeExpr::named("i32"))
            .param("b", TypeExpr::named("i32"))
            .returns(TypeExpr::named("i32"))
            .with_body(vec![Stmt::ret(Some(Expr::binary(
                BinaryOperator::Add,
                Expr::ident("a"),
                Expr::ident("b"),
            )))]);
        let output = emit(vec![Decl::Fn(add)]);

        let expected = "$Program.add$INT32$INT32:\n    ; Program::add\n    copy R1, R3\n    copy R2, R4\n    add R3, R4, R5\n    copy R5, R0\n    return\n";
        assert!(output.contains(expected), "{}", output);
    }

    #[test]
    fn test_strings_go_to_data_section() {
        let main = FnDecl::new("main").with_body(vec![Stmt::var(
            "greeting",
            Some(TypeExpr::named("string")),
            Some(Expr::string("hi")),
        )]);
        let output = emit(vec![Decl::Fn(main)]);

        assert!(output.contains("copy $str0, R1"));
        assert!(output.ends_with("; data\n$str0:\n    .string \"hi\"\n"));
    }

    #[test]
    fn test_platform_calls_are_rejected() {
        let main = FnDecl::new("main").with_body(vec![Stmt::call("print", vec![Expr::string("hi")])]);
        let mut ctx = CompilationContext::new("vm");
        let queue = lower_declarations(&mut ctx, &[Tree::new("Demo", vec![Decl::Fn(main)])]);
        lower_bodies(&mut ctx, queue);

        let err = Bs2kEmitter::new().generate(&ctx.assembly).unwrap_err();
        assert!(matches!(err, EmitError::Unsupported { backend: "bs2k", .. }));
        assert!(err.to_string().contains("System.Console::Write"), "{}", err);
    }
}
