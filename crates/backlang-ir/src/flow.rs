//! Control-flow graphs
//!
//! A [`FlowGraph`] owns every instruction of one method body in a single
//! arena. Blocks hold handles into that arena, so blocks never reference
//! each other directly.

use crate::instruction::{Argument, BindingId, BlockId, Flow, InstrId, Instruction};
use crate::module::TypeTable;
use crate::types::{Method, TypeId};

/// Block parameter: a named, typed local binding
#[derive(Debug, Clone, PartialEq)]
pub struct BlockParam {
    pub name: String,
    pub ty: Option<TypeId>,
}

/// Basic block
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub name: String,
    pub params: Vec<BlockParam>,
    pub instructions: Vec<InstrId>,
    /// `None` while the block is still open
    flow: Option<Flow>,
}

impl BasicBlock {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            instructions: Vec::new(),
            flow: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.flow.is_some()
    }

    /// Terminator; open blocks fall through to `return`
    pub fn flow(&self) -> Flow {
        self.flow.unwrap_or(Flow::Return(None))
    }
}

/// Control-flow graph of one method body
#[derive(Debug, Clone)]
pub struct FlowGraph {
    blocks: Vec<BasicBlock>,
    instructions: Vec<Instruction>,
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowGraph {
    /// Creates a graph with an empty entry block
    pub fn new() -> Self {
        Self {
            blocks: vec![BasicBlock::new("entry")],
            instructions: Vec::new(),
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        self.blocks.push(BasicBlock::new(name));
        BlockId((self.blocks.len() - 1) as u32)
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    pub fn instruction(&self, id: InstrId) -> &Instruction {
        &self.instructions[id.index()]
    }

    /// Instructions of `block`, in order
    pub fn instructions_of(&self, block: BlockId) -> impl Iterator<Item = (InstrId, &Instruction)> {
        self.block(block)
            .instructions
            .iter()
            .map(|&id| (id, self.instruction(id)))
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Appends to `block` and returns the result handle
    pub fn append(&mut self, block: BlockId, instr: Instruction) -> InstrId {
        let id = InstrId(self.instructions.len() as u32);
        self.instructions.push(instr);
        self.blocks[block.index()].instructions.push(id);
        id
    }

    pub fn add_param(&mut self, block: BlockId, name: impl Into<String>, ty: Option<TypeId>) -> BindingId {
        let params = &mut self.blocks[block.index()].params;
        params.push(BlockParam {
            name: name.into(),
            ty,
        });
        BindingId {
            block,
            index: params.len() - 1,
        }
    }

    /// Latest binding called `name`, so redeclarations shadow
    pub fn find_param(&self, block: BlockId, name: &str) -> Option<BindingId> {
        self.block(block)
            .params
            .iter()
            .rposition(|p| p.name == name)
            .map(|index| BindingId { block, index })
    }

    pub fn param(&self, binding: BindingId) -> &BlockParam {
        &self.block(binding.block).params[binding.index]
    }

    pub fn set_flow(&mut self, block: BlockId, flow: Flow) {
        self.blocks[block.index()].flow = Some(flow);
    }

    pub fn is_terminated(&self, block: BlockId) -> bool {
        self.block(block).is_terminated()
    }

    /// Terminates every open block with `return`
    pub fn seal(&mut self) {
        for block in &mut self.blocks {
            block.flow.get_or_insert(Flow::Return(None));
        }
    }

    /// Type of the value produced by `id`, if it produces one.
    ///
    /// `owner` is the declaring type of `method`, used for `this`.
    pub fn result_type(&self, id: InstrId, owner: TypeId, method: &Method, types: &TypeTable) -> Option<TypeId> {
        match self.instruction(id) {
            Instruction::Constant { ty, .. }
            | Instruction::Load { ty, .. }
            | Instruction::Binary { ty, .. } => *ty,
            Instruction::LoadArg(Argument::This) => Some(owner),
            Instruction::LoadArg(Argument::Param(i)) => method.params.get(*i).and_then(|p| p.ty),
            Instruction::LoadLocal { binding } => self.param(*binding).ty,
            Instruction::Call { method, .. } => types.method(*method).return_type,
            Instruction::NewObject { ctor, .. } => Some(ctor.ty),
            Instruction::Alloca { .. } | Instruction::StoreField { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Constant;

    #[test]
    fn test_append_returns_handles_in_order() {
        let mut graph = FlowGraph::new();
        let entry = graph.entry();

        let c = graph.append(entry, Instruction::Constant { value: Constant::i32(1), ty: None });
        let l = graph.append(entry, Instruction::Load { ty: None, source: c });

        assert_eq!(c.index(), 0);
        assert_eq!(l.index(), 1);
        assert_eq!(graph.instruction(l).operands(), vec![c]);
        assert_eq!(graph.block(entry).instructions, vec![c, l]);
    }

    #[test]
    fn test_bindings_shadow() {
        let mut graph = FlowGraph::new();
        let entry = graph.entry();

        graph.add_param(entry, "x", None);
        let second = graph.add_param(entry, "x", None);

        assert_eq!(graph.find_param(entry, "x"), Some(second));
        assert_eq!(graph.find_param(entry, "y"), None);
    }

    #[test]
    fn test_seal_closes_open_blocks() {
        let mut graph = FlowGraph::new();
        let exit = graph.add_block("exit");
        graph.set_flow(graph.entry(), Flow::Jump(exit));

        assert!(!graph.is_terminated(exit));
        graph.seal();

        assert_eq!(graph.block(graph.entry()).flow(), Flow::Jump(exit));
        assert_eq!(graph.block(exit).flow(), Flow::Return(None));
    }
}
