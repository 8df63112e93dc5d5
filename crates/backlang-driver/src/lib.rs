//! backlang-driver - Runs the Backlang compiler pipeline
//!
//! Loads syntax trees, lowers them to IR in two stages and hands the
//! finished assembly to the selected target.
//!
//! ```rust,ignore
//! use backlang_codegen::{CompileOptions, Target};
//! use backlang_driver::{load_trees, Compilation};
//!
//! let trees = load_trees(&["main.json"])?;
//! let options = CompileOptions { output: "app".into(), target: Target::Bs2k };
//! let path = Compilation::new(trees, options).compile_to(".".as_ref())?;
//! ```

mod compilation;
mod error;
mod load;

pub use compilation::{Compilation, Stage};
pub use error::DriverError;
pub use load::{load_tree, load_trees, parse_tree};
