//! IR instructions and block terminators
//!
//! Instructions live in the [`FlowGraph`](crate::flow::FlowGraph) arena and
//! refer to earlier results by [`InstrId`], never by name.

use crate::constant::Constant;
use crate::module::TypeTable;
use crate::types::{FieldRef, MethodRef, TypeId};
use backlang_syntax::BinaryOperator;
use std::fmt;

/// Handle to an instruction result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);

impl InstrId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A block parameter, used as a local variable binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId {
    pub block: BlockId,
    pub index: usize,
}

/// Method argument slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Argument {
    /// Receiver of an instance method
    This,
    /// Declared parameter, 0-based
    Param(usize),
}

/// IR Instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// %n = const value : ty
    Constant { value: Constant, ty: Option<TypeId> },

    /// %n = load %src : ty
    Load { ty: Option<TypeId>, source: InstrId },

    /// %n = arg this | arg k
    LoadArg(Argument),

    /// %n = local binding
    LoadLocal { binding: BindingId },

    /// Reserves storage for `binding`, filled from `init`
    Alloca {
        binding: BindingId,
        ty: Option<TypeId>,
        init: Option<InstrId>,
    },

    /// %n = op %lhs, %rhs : ty
    Binary {
        op: BinaryOperator,
        ty: Option<TypeId>,
        lhs: InstrId,
        rhs: InstrId,
    },

    /// Static-lookup call
    Call { method: MethodRef, args: Vec<InstrId> },

    /// Allocates an object and runs `ctor` on it
    NewObject { ctor: MethodRef, args: Vec<InstrId> },

    /// target.field = value
    StoreField {
        field: FieldRef,
        target: InstrId,
        value: InstrId,
    },
}

impl Instruction {
    /// Instruction results referenced by this instruction
    pub fn operands(&self) -> Vec<InstrId> {
        match self {
            Instruction::Constant { .. }
            | Instruction::LoadArg(_)
            | Instruction::LoadLocal { .. } => Vec::new(),
            Instruction::Load { source, .. } => vec![*source],
            Instruction::Alloca { init, .. } => init.iter().copied().collect(),
            Instruction::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::Call { args, .. } | Instruction::NewObject { args, .. } => args.clone(),
            Instruction::StoreField { target, value, .. } => vec![*target, *value],
        }
    }

    /// Renders with type and member names from `types`
    pub fn display<'a>(&'a self, types: &'a TypeTable) -> InstructionDisplay<'a> {
        InstructionDisplay { instr: self, types }
    }
}

/// Block terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Return(Option<InstrId>),
    Jump(BlockId),
    Unreachable,
}

pub struct InstructionDisplay<'a> {
    instr: &'a Instruction,
    types: &'a TypeTable,
}

impl InstructionDisplay<'_> {
    fn ty(&self, ty: Option<TypeId>) -> String {
        match ty {
            Some(id) => self.types.get(id).name.to_string(),
            None => "?".to_string(),
        }
    }

    fn method(&self, m: MethodRef) -> String {
        format!("{}::{}", self.types.get(m.ty).name, self.types.method(m).name)
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[InstrId]) -> fmt::Result {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "%{}", arg.0)?;
    }
    Ok(())
}

impl fmt::Display for InstructionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instr {
            Instruction::Constant { value, ty } => write!(f, "const {} : {}", value, self.ty(*ty)),
            Instruction::Load { ty, source } => write!(f, "load %{} : {}", source.0, self.ty(*ty)),
            Instruction::LoadArg(Argument::This) => write!(f, "arg this"),
            Instruction::LoadArg(Argument::Param(i)) => write!(f, "arg {}", i),
            Instruction::LoadLocal { binding } => {
                write!(f, "local b{}.{}", binding.block.0, binding.index)
            }
            Instruction::Alloca { binding, ty, init } => {
                write!(f, "alloca b{}.{} : {}", binding.block.0, binding.index, self.ty(*ty))?;
                if let Some(init) = init {
                    write!(f, " = %{}", init.0)?;
                }
                Ok(())
            }
            Instruction::Binary { op, ty, lhs, rhs } => {
                write!(f, "{} %{}, %{} : {}", op, lhs.0, rhs.0, self.ty(*ty))
            }
            Instruction::Call { method, args } => {
                write!(f, "call {}(", self.method(*method))?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instruction::NewObject { ctor, args } => {
                write!(f, "newobj {}(", self.method(*ctor))?;
                write_args(f, args)?;
                write!(f, ")")
            }
            Instruction::StoreField { field, target, value } => {
                let owner = self.types.get(field.ty);
                let name = owner.fields.get(field.index).map(|f| f.name.as_str()).unwrap_or("?");
                write!(f, "store %{}.{} = %{}", target.0, name, value.0)
            }
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Return(Some(value)) => write!(f, "return %{}", value.0),
            Flow::Return(None) => write!(f, "return"),
            Flow::Jump(block) => write!(f, "jump b{}", block.0),
            Flow::Unreachable => write!(f, "unreachable"),
        }
    }
}
