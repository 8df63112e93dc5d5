//! Lowering from syntax trees to IR
//!
//! Lowering runs in two stages over the whole set of trees:
//!
//! 1. [`lower_declarations`] registers every type in every tree first, then
//!    populates members. Methods with bodies are queued, not compiled.
//! 2. [`lower_bodies`] drains the [`BodyQueue`] and builds one flow graph per
//!    queued method. By then every signature is known, so calls to methods
//!    declared later (or in another tree) resolve.

mod body;
mod context;
mod decl;
mod resolve;

pub use context::CompilationContext;
pub use decl::{ENTRY_POINT, PROGRAM_TYPE};
pub use resolve::{alias_target, TypeResolver, PRIMITIVE_ALIASES};

use crate::types::MethodRef;
use backlang_syntax::{QualifiedName, Stmt, Tree};
use tracing::{debug, info};

/// A method whose body still has to be lowered
#[derive(Debug, Clone)]
pub struct PendingBody {
    pub method: MethodRef,
    /// Module the declaration came from, used for type lookups in the body
    pub module: QualifiedName,
    pub body: Vec<Stmt>,
}

/// Work list handed from declaration lowering to body lowering
#[derive(Debug, Default)]
pub struct BodyQueue {
    pending: Vec<PendingBody>,
}

impl BodyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pending: PendingBody) {
        self.pending.push(pending);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingBody> {
        self.pending.iter()
    }
}

impl IntoIterator for BodyQueue {
    type Item = PendingBody;
    type IntoIter = std::vec::IntoIter<PendingBody>;

    fn into_iter(self) -> Self::IntoIter {
        self.pending.into_iter()
    }
}

/// Declare-then-populate over all trees. Returns the queued bodies.
pub fn lower_declarations(ctx: &mut CompilationContext, trees: &[Tree]) -> BodyQueue {
    let declared: Vec<_> = trees.iter().map(|tree| decl::declare(ctx, tree)).collect();
    debug!(types = ctx.assembly.defined_types().count(), "declared types");

    let mut queue = BodyQueue::new();
    for (tree, declared) in trees.iter().zip(declared) {
        decl::DeclLowerer::new(ctx, &tree.module, &mut queue).populate(tree, declared);
    }

    info!(
        trees = trees.len(),
        bodies = queue.len(),
        errors = ctx.diagnostics.error_count(),
        "lowered declarations"
    );
    queue
}

/// Builds a flow graph for every queued method
pub fn lower_bodies(ctx: &mut CompilationContext, queue: BodyQueue) {
    let count = queue.len();
    for pending in queue {
        body::lower_body(ctx, pending);
    }
    info!(bodies = count, errors = ctx.diagnostics.error_count(), "lowered bodies");
}
