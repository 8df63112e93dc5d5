//! backlang-ir - Typed intermediate representation for the Backlang compiler
//!
//! The IR is a table of type entities ([`TypeDef`]) owned by an [`Assembly`].
//! Methods own a [`FlowGraph`] once their bodies are lowered. Entities refer
//! to each other through small copyable handles ([`TypeId`], [`MethodRef`],
//! [`FieldRef`], [`InstrId`]) rather than references.
//!
//! # Example
//!
//! ```rust
//! use backlang_ir::lower::{lower_bodies, lower_declarations, CompilationContext};
//! use backlang_syntax::{Decl, Expr, FnDecl, Stmt, Tree};
//!
//! let main = FnDecl::new("main").with_body(vec![Stmt::call("print", vec![Expr::string("hi")])]);
//! let trees = vec![Tree::new("Demo", vec![Decl::Fn(main)])];
//!
//! let mut ctx = CompilationContext::new("demo");
//! let queue = lower_declarations(&mut ctx, &trees);
//! lower_bodies(&mut ctx, queue);
//!
//! assert!(ctx.diagnostics.is_empty());
//! assert!(ctx.assembly.entry_point.is_some());
//! ```

pub mod constant;
pub mod flow;
pub mod instruction;
pub mod lower;
pub mod module;
pub mod platform;
pub mod types;

pub use constant::Constant;
pub use flow::{BasicBlock, BlockParam, FlowGraph};
pub use instruction::{Argument, BindingId, BlockId, Flow, InstrId, Instruction};
pub use module::{Assembly, TypeTable};
pub use types::{
    Attribute, AttributeTargets, Field, FieldRef, Method, MethodRef, Origin, Parameter, Primitive, Property,
    TypeDef, TypeId, Visibility,
};
