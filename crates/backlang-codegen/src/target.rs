//! Target selection
//!
//! The target decides the output suffix, the intrinsic catalogue installed
//! before lowering, and which emitter runs.

use crate::bs2k::{self, Bs2kEmitter};
use crate::dotnet::DotnetEmitter;
use crate::{CodeGen, EmitError};
use backlang_ir::{Assembly, TypeTable};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Managed-object container
    Dotnet,
    /// Backseater 2k VM assembly
    Bs2k,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::Dotnet, Target::Bs2k];

    pub fn name(self) -> &'static str {
        match self {
            Target::Dotnet => "dotnet",
            Target::Bs2k => "bs2k",
        }
    }

    pub fn output_extension(self) -> &'static str {
        match self {
            Target::Dotnet => "dll",
            Target::Bs2k => "bsm",
        }
    }

    pub fn has_intrinsics(self) -> bool {
        matches!(self, Target::Bs2k)
    }

    /// Registers the target's intrinsic type, if any. Must run before
    /// declaration lowering so qualified calls can resolve against it.
    pub fn install_intrinsics(self, types: &mut TypeTable) {
        if self.has_intrinsics() {
            debug!(backend = self.name(), "installing intrinsics");
            bs2k::intrinsics::install(types);
        }
    }

    /// Runs the target's emitter
    pub fn emit(self, assembly: &Assembly) -> Result<Vec<u8>, EmitError> {
        match self {
            Target::Dotnet => DotnetEmitter::new().generate(assembly),
            Target::Bs2k => Bs2kEmitter::new().generate(assembly).map(String::into_bytes),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown target '{0}' (expected dotnet or bs2k)")]
pub struct UnknownTarget(pub String);

impl FromStr for Target {
    type Err = UnknownTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| UnknownTarget(s.to_string()))
    }
}
