//! backlang-syntax - Typed syntax tree for the Backlang compiler core
//!
//! The lexer and parser live upstream. They hand the core one [`Tree`] per
//! source module, either in memory or as JSON.
//!
//! # Example
//!
//! ```rust
//! use backlang_syntax::{Decl, Expr, FnDecl, Stmt, Tree};
//!
//! let main = FnDecl::new("main").with_body(vec![Stmt::call("print", vec![Expr::string("hi")])]);
//! let tree = Tree::new("Demo", vec![Decl::Fn(main)]);
//! assert_eq!(tree.body.len(), 1);
//! ```

pub mod ast;
mod display;
pub mod name;
pub mod ops;

pub use ast::*;
pub use name::QualifiedName;
pub use ops::{Associativity, BinaryOperator, OperatorInfo, OPERATORS};
