//! The pipeline state machine
//!
//! `Unstarted -> DeclarationsLowered -> BodiesLowered -> Emitted`. Every
//! stage runs at most once and only after the one before it; calling a stage
//! out of order is a bug in the caller and panics.

use crate::DriverError;
use backlang_codegen::CompileOptions;
use backlang_error::{Diagnostics, SourceCache};
use backlang_ir::lower::{self, BodyQueue, CompilationContext};
use backlang_ir::Assembly;
use backlang_syntax::Tree;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug)]
pub enum Stage {
    Unstarted,
    DeclarationsLowered(BodyQueue),
    BodiesLowered,
    Emitted,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Unstarted => "unstarted",
            Stage::DeclarationsLowered(_) => "declarations lowered",
            Stage::BodiesLowered => "bodies lowered",
            Stage::Emitted => "emitted",
        }
    }
}

/// One compilation: the input trees, the IR under construction and the
/// target configuration
#[derive(Debug)]
pub struct Compilation {
    trees: Vec<Tree>,
    ctx: CompilationContext,
    options: CompileOptions,
    stage: Stage,
}

impl Compilation {
    /// The assembly is named after the output file. Target intrinsics are
    /// registered before any declaration is seen.
    pub fn new(trees: Vec<Tree>, options: CompileOptions) -> Self {
        let mut ctx = CompilationContext::new(options.output.clone());
        options.target.install_intrinsics(ctx.types_mut());
        Self {
            trees,
            ctx,
            options,
            stage: Stage::Unstarted,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn assembly(&self) -> &Assembly {
        &self.ctx.assembly
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.ctx.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.ctx.diagnostics.has_errors()
    }

    fn out_of_order(&self, operation: &str) -> ! {
        panic!("cannot {} in stage '{}'", operation, self.stage.name())
    }

    pub fn lower_declarations(&mut self) {
        if !matches!(self.stage, Stage::Unstarted) {
            self.out_of_order("lower declarations");
        }
        let queue = lower::lower_declarations(&mut self.ctx, &self.trees);
        self.stage = Stage::DeclarationsLowered(queue);
    }

    pub fn lower_bodies(&mut self) {
        let queue = match std::mem::replace(&mut self.stage, Stage::BodiesLowered) {
            Stage::DeclarationsLowered(queue) => queue,
            previous => {
                self.stage = previous;
                self.out_of_order("lower bodies");
            }
        };
        lower::lower_bodies(&mut self.ctx, queue);
    }

    /// Runs the target emitter over the finished IR
    pub fn emit(&mut self) -> Result<Vec<u8>, DriverError> {
        if !matches!(self.stage, Stage::BodiesLowered) {
            self.out_of_order("emit");
        }
        let bytes = self.options.target.emit(&self.ctx.assembly)?;
        self.stage = Stage::Emitted;
        info!(backend = %self.options.target, bytes = bytes.len(), "emitted");
        Ok(bytes)
    }

    /// Runs every stage. Emission is skipped when lowering reported errors;
    /// the diagnostics stay available on `self`.
    pub fn compile(&mut self) -> Result<Vec<u8>, DriverError> {
        self.lower_declarations();
        self.lower_bodies();
        if self.has_errors() {
            let errors = self.ctx.diagnostics.error_count();
            warn!(errors, "skipping emission");
            return Err(DriverError::Failed(errors));
        }
        self.emit()
    }

    /// Compiles and writes the artifact to `dir` under the configured output name
    pub fn compile_to(&mut self, dir: &Path) -> Result<PathBuf, DriverError> {
        let bytes = self.compile()?;
        let path = dir.join(self.options.output_path());
        fs::write(&path, bytes).map_err(|source| DriverError::Write {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "wrote output");
        Ok(path)
    }

    /// Renders all diagnostics against the tree sources. Tree `i` is file id `i`.
    pub fn render_diagnostics(&self) -> String {
        let mut cache = SourceCache::new();
        for (i, tree) in self.trees.iter().enumerate() {
            let name = tree.file.clone().unwrap_or_else(|| format!("<tree {}>", i));
            cache.add(name, tree.source.clone().unwrap_or_default());
        }
        self.ctx.diagnostics.render(&cache)
    }
}
