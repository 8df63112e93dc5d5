//! backlang-codegen - Code generation for the Backlang compiler
//!
//! Two backends consume the same finished IR:
//! - **dotnet**: a little-endian managed-object container (class table,
//!   method tables with signatures and CIL bodies, entry point)
//! - **bs2k**: register-machine assembly text for the Backseater 2k VM
//!
//! # Example
//!
//! ```rust,ignore
//! use backlang_codegen::{CodeGen, DotnetEmitter};
//!
//! let assembly: backlang_ir::Assembly = /* lowered */;
//! let bytes = DotnetEmitter::new().generate(&assembly)?;
//! ```

pub mod bs2k;
pub mod dotnet;
mod error;
mod target;

pub use bs2k::Bs2kEmitter;
pub use dotnet::DotnetEmitter;
pub use error::EmitError;
pub use target::{Target, UnknownTarget};

use backlang_ir::Assembly;

/// Trait for code generation backends
pub trait CodeGen {
    /// Backend output type
    type Output;

    /// Generates the artifact for a fully lowered assembly
    fn generate(&self, assembly: &Assembly) -> Result<Self::Output, EmitError>;
}

/// Compilation options
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Output file name without the target suffix
    pub output: String,
    /// Selected backend
    pub target: Target,
}

impl CompileOptions {
    /// Output file name with the target suffix appended
    pub fn output_path(&self) -> String {
        format!("{}.{}", self.output, self.target.output_extension())
    }
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            output: "output".to_string(),
            target: Target::Dotnet,
        }
    }
}
