//! CIL body compiler
//!
//! Every value-producing instruction stores its result into its own local
//! slot, and every block parameter binding gets a slot too. Operands are
//! reloaded from their slots on use, so blocks need no stack bookkeeping.

use super::metadata::MethodBody;
use super::ImageBuilder;
use crate::EmitError;
use backlang_ir::{Argument, BindingId, BlockId, Constant, Flow, FlowGraph, InstrId, Instruction, MethodRef, Primitive};
use backlang_syntax::BinaryOperator;
use std::collections::HashMap;
use tracing::trace;

mod op {
    pub const LDNULL: u8 = 0x14;
    pub const LDC_I4_0: u8 = 0x16;
    pub const LDC_I4: u8 = 0x20;
    pub const LDC_I8: u8 = 0x21;
    pub const LDC_R4: u8 = 0x22;
    pub const LDC_R8: u8 = 0x23;
    pub const CALL: u8 = 0x28;
    pub const RET: u8 = 0x2A;
    pub const BR: u8 = 0x38;
    pub const ADD: u8 = 0x58;
    pub const SUB: u8 = 0x59;
    pub const MUL: u8 = 0x5A;
    pub const DIV: u8 = 0x5B;
    pub const DIV_UN: u8 = 0x5C;
    pub const REM: u8 = 0x5D;
    pub const REM_UN: u8 = 0x5E;
    pub const AND: u8 = 0x5F;
    pub const OR: u8 = 0x60;
    pub const XOR: u8 = 0x61;
    pub const SHL: u8 = 0x62;
    pub const SHR: u8 = 0x63;
    pub const SHR_UN: u8 = 0x64;
    pub const LDSTR: u8 = 0x72;
    pub const NEWOBJ: u8 = 0x73;
    pub const THROW: u8 = 0x7A;
    pub const STFLD: u8 = 0x7D;

    /// Two-byte opcodes, after the 0xFE prefix
    pub const PREFIX: u8 = 0xFE;
    pub const CEQ: u8 = 0x01;
    pub const CGT: u8 = 0x02;
    pub const CGT_UN: u8 = 0x03;
    pub const CLT: u8 = 0x04;
    pub const CLT_UN: u8 = 0x05;
    pub const LDARG: u8 = 0x09;
    pub const LDLOC: u8 = 0x0C;
    pub const STLOC: u8 = 0x0E;
}

pub(super) fn compile(builder: &mut ImageBuilder<'_>, method: MethodRef, graph: &FlowGraph) -> Result<MethodBody, EmitError> {
    BodyCompiler::new(builder, method, graph).compile()
}

struct BodyCompiler<'b, 'a> {
    builder: &'b mut ImageBuilder<'a>,
    method: MethodRef,
    graph: &'b FlowGraph,
    code: Vec<u8>,
    locals: Vec<Vec<u8>>,
    values: HashMap<InstrId, u16>,
    bindings: HashMap<BindingId, u16>,
    block_offsets: HashMap<BlockId, usize>,
    /// Offsets of `br` operands waiting for their target block
    fixups: Vec<(usize, BlockId)>,
    stack: u16,
    max_stack: u16,
}

impl<'b, 'a> BodyCompiler<'b, 'a> {
    fn new(builder: &'b mut ImageBuilder<'a>, method: MethodRef, graph: &'b FlowGraph) -> Self {
        Self {
            builder,
            method,
            graph,
            code: Vec::new(),
            locals: Vec::new(),
            values: HashMap::new(),
            bindings: HashMap::new(),
            block_offsets: HashMap::new(),
            fixups: Vec::new(),
            stack: 0,
            max_stack: 0,
        }
    }

    fn what(&self) -> String {
        let types = self.builder.types;
        format!("{}::{}", types.get(self.method.ty).name, types.method(self.method).name)
    }

    fn compile(mut self) -> Result<MethodBody, EmitError> {
        let graph = self.graph;
        for (block, _) in graph.blocks() {
            self.block_offsets.insert(block, self.code.len());
            for (id, instr) in graph.instructions_of(block) {
                trace!(instr = id.index(), "cil instruction");
                self.instruction(id, instr)?;
            }
            self.flow(block)?;
        }

        for (at, block) in std::mem::take(&mut self.fixups) {
            let target = self.block_offsets.get(&block).copied().unwrap_or(at + 4);
            let delta = target as i64 - (at + 4) as i64;
            self.code[at..at + 4].copy_from_slice(&(delta as i32).to_le_bytes());
        }

        Ok(MethodBody {
            max_stack: self.max_stack.max(1),
            locals: self.locals,
            code: self.code,
        })
    }

    fn push(&mut self, count: u16) {
        self.stack += count;
        self.max_stack = self.max_stack.max(self.stack);
    }

    fn pop(&mut self, count: u16) {
        self.stack = self.stack.saturating_sub(count);
    }

    fn emit(&mut self, opcode: u8) {
        self.code.push(opcode);
    }

    fn emit_wide(&mut self, opcode: u8, slot: u16) {
        self.code.extend_from_slice(&[op::PREFIX, opcode]);
        self.code.extend_from_slice(&slot.to_le_bytes());
    }

    fn emit_token(&mut self, opcode: u8, token: u32) {
        self.code.push(opcode);
        self.code.extend_from_slice(&token.to_le_bytes());
    }

    fn new_local(&mut self, ty: Option<backlang_ir::TypeId>) -> Result<u16, EmitError> {
        let what = self.what();
        let signature = self.builder.type_signature(ty, &what)?;
        self.locals.push(signature);
        Ok((self.locals.len() - 1) as u16)
    }

    fn ldloc(&mut self, value: InstrId) -> Result<(), EmitError> {
        let slot = self.values.get(&value).copied().ok_or_else(|| EmitError::Unsupported {
            backend: "dotnet",
            what: format!("use of %{} before its definition in {}", value.index(), self.what()),
        })?;
        self.emit_wide(op::LDLOC, slot);
        self.push(1);
        Ok(())
    }

    /// Stores the top of the stack into a fresh slot for `id`
    fn store_result(&mut self, id: InstrId) -> Result<(), EmitError> {
        let types = self.builder.types;
        let owner = self.method.ty;
        let ty = self.graph.result_type(id, owner, types.method(self.method), types);
        let slot = self.new_local(ty)?;
        self.values.insert(id, slot);
        self.emit_wide(op::STLOC, slot);
        self.pop(1);
        Ok(())
    }

    fn binding_slot(&mut self, binding: BindingId) -> Result<u16, EmitError> {
        if let Some(slot) = self.bindings.get(&binding) {
            return Ok(*slot);
        }
        let slot = self.new_local(self.graph.param(binding).ty)?;
        self.bindings.insert(binding, slot);
        Ok(slot)
    }

    fn is_unsigned(&self, ty: Option<backlang_ir::TypeId>) -> bool {
        ty.and_then(|t| self.builder.types.get(t).primitive)
            .and_then(Primitive::int_width)
            .is_some_and(|(_, signed)| !signed)
    }

    fn instruction(&mut self, id: InstrId, instr: &Instruction) -> Result<(), EmitError> {
        match instr {
            Instruction::Constant { value, .. } => {
                self.load_constant(value);
                self.store_result(id)?;
            }
            Instruction::Load { source, .. } => {
                self.ldloc(*source)?;
                self.store_result(id)?;
            }
            Instruction::LoadArg(arg) => {
                let is_static = self.builder.types.method(self.method).is_static;
                let index = match arg {
                    Argument::This => 0,
                    Argument::Param(i) if is_static => *i as u16,
                    Argument::Param(i) => *i as u16 + 1,
                };
                self.emit_wide(op::LDARG, index);
                self.push(1);
                self.store_result(id)?;
            }
            Instruction::LoadLocal { binding } => {
                let slot = self.binding_slot(*binding)?;
                self.emit_wide(op::LDLOC, slot);
                self.push(1);
                self.store_result(id)?;
            }
            Instruction::Alloca { binding, init, .. } => {
                let slot = self.binding_slot(*binding)?;
                if let Some(init) = init {
                    self.ldloc(*init)?;
                    self.emit_wide(op::STLOC, slot);
                    self.pop(1);
                }
            }
            Instruction::Binary { op: operator, ty, lhs, rhs } => {
                let types = self.builder.types;
                let owner = self.method.ty;
                let operand_ty = self.graph.result_type(*lhs, owner, types.method(self.method), types);
                let unsigned = self.is_unsigned(operand_ty) || self.is_unsigned(*ty);
                self.ldloc(*lhs)?;
                self.ldloc(*rhs)?;
                self.binary(*operator, unsigned);
                self.pop(1);
                self.store_result(id)?;
            }
            Instruction::Call { method, args } => {
                for arg in args {
                    self.ldloc(*arg)?;
                }
                let token = self.builder.method_token(*method)?;
                self.emit_token(op::CALL, token.raw());
                self.pop(args.len() as u16);

                let types = self.builder.types;
                let void = types.primitive(Primitive::Void);
                let returns = types.method(*method).return_type;
                if returns.is_some() && returns != void {
                    self.push(1);
                    self.store_result(id)?;
                }
            }
            Instruction::NewObject { ctor, args } => {
                for arg in args {
                    self.ldloc(*arg)?;
                }
                let token = self.builder.method_token(*ctor)?;
                self.emit_token(op::NEWOBJ, token.raw());
                self.pop(args.len() as u16);
                self.push(1);
                self.store_result(id)?;
            }
            Instruction::StoreField { field, target, value } => {
                self.ldloc(*target)?;
                self.ldloc(*value)?;
                let token = self.builder.field_token(*field)?;
                self.emit_token(op::STFLD, token.raw());
                self.pop(2);
            }
        }
        Ok(())
    }

    fn load_constant(&mut self, value: &Constant) {
        match value {
            Constant::Int { value, bits: 64, .. } => {
                self.code.push(op::LDC_I8);
                self.code.extend_from_slice(&(*value as i64).to_le_bytes());
            }
            Constant::Int { value, .. } => {
                self.code.push(op::LDC_I4);
                self.code.extend_from_slice(&(*value as i32).to_le_bytes());
            }
            Constant::Float32(v) => {
                self.code.push(op::LDC_R4);
                self.code.extend_from_slice(&v.to_le_bytes());
            }
            Constant::Float64(v) => {
                self.code.push(op::LDC_R8);
                self.code.extend_from_slice(&v.to_le_bytes());
            }
            Constant::String(s) => {
                let token = self.builder.user_string(s);
                self.emit_token(op::LDSTR, token.raw());
            }
            Constant::Char(c) => {
                self.code.push(op::LDC_I4);
                self.code.extend_from_slice(&(u32::from(*c) as i32).to_le_bytes());
            }
            Constant::Bool(b) => {
                self.code.push(op::LDC_I4);
                self.code.extend_from_slice(&i32::from(*b).to_le_bytes());
            }
            Constant::Null => self.emit(op::LDNULL),
        }
        self.push(1);
    }

    fn binary(&mut self, operator: BinaryOperator, unsigned: bool) {
        let pick = |signed: u8, unsigned_op: u8| if unsigned { unsigned_op } else { signed };
        match operator {
            BinaryOperator::Add => self.emit(op::ADD),
            BinaryOperator::Sub => self.emit(op::SUB),
            BinaryOperator::Mul => self.emit(op::MUL),
            BinaryOperator::Div => self.emit(pick(op::DIV, op::DIV_UN)),
            BinaryOperator::Rem => self.emit(pick(op::REM, op::REM_UN)),
            BinaryOperator::BitAnd => self.emit(op::AND),
            BinaryOperator::BitOr => self.emit(op::OR),
            BinaryOperator::BitXor => self.emit(op::XOR),
            BinaryOperator::Shl => self.emit(op::SHL),
            BinaryOperator::Shr => self.emit(pick(op::SHR, op::SHR_UN)),
            BinaryOperator::Eq => self.compare(op::CEQ, false),
            BinaryOperator::Ne => self.compare(op::CEQ, true),
            BinaryOperator::Lt => self.compare(pick(op::CLT, op::CLT_UN), false),
            BinaryOperator::Gt => self.compare(pick(op::CGT, op::CGT_UN), false),
            // a <= b is !(a > b)
            BinaryOperator::Le => self.compare(pick(op::CGT, op::CGT_UN), true),
            BinaryOperator::Ge => self.compare(pick(op::CLT, op::CLT_UN), true),
        }
    }

    fn compare(&mut self, opcode: u8, negate: bool) {
        self.code.extend_from_slice(&[op::PREFIX, opcode]);
        if negate {
            self.code.extend_from_slice(&[op::LDC_I4_0, op::PREFIX, op::CEQ]);
            self.push(1);
            self.pop(1);
        }
    }

    fn flow(&mut self, block: BlockId) -> Result<(), EmitError> {
        match self.graph.block(block).flow() {
            Flow::Return(value) => {
                if let Some(value) = value {
                    self.ldloc(value)?;
                }
                self.emit(op::RET);
            }
            Flow::Jump(target) => {
                self.emit(op::BR);
                self.fixups.push((self.code.len(), target));
                self.code.extend_from_slice(&[0; 4]);
            }
            Flow::Unreachable => {
                let thrown = self.graph.block(block).instructions.last().copied().filter(|last| {
                    matches!(self.graph.instruction(*last), Instruction::NewObject { .. })
                });
                match thrown {
                    Some(exception) => self.ldloc(exception)?,
                    None => {
                        self.emit(op::LDNULL);
                        self.push(1);
                    }
                }
                self.emit(op::THROW);
            }
        }
        self.stack = 0;
        Ok(())
    }
}
