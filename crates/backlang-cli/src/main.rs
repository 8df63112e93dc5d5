//! Backlang compiler CLI

use backlang_codegen::{CompileOptions, Target};
use backlang_driver::{load_trees, Compilation, DriverError};
use backlang_syntax::Tree;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::Level;

/// Output target
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum TargetArg {
    /// Managed-object container (.dll)
    #[default]
    Dotnet,
    /// Backseater 2k VM assembly (.bsm)
    Bs2k,
}

impl From<TargetArg> for Target {
    fn from(arg: TargetArg) -> Self {
        match arg {
            TargetArg::Dotnet => Target::Dotnet,
            TargetArg::Bs2k => Target::Bs2k,
        }
    }
}

#[derive(Parser)]
#[command(name = "backlang")]
#[command(author = "Backlang Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Backlang compiler", long_about = None)]
struct Cli {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compiles syntax trees to the selected target
    Build {
        /// Syntax tree files (JSON)
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Output name, without suffix
        #[arg(short, long, default_value = "output")]
        output: String,

        /// Code generation target
        #[arg(short, long, default_value = "dotnet")]
        target: TargetArg,
    },

    /// Shows the lowered IR (debug)
    Ir {
        /// Syntax tree files (JSON)
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,

        /// Target whose intrinsics are visible
        #[arg(short, long, default_value = "dotnet")]
        target: TargetArg,
    },

    /// Pretty-prints syntax trees (debug)
    Ast {
        /// Syntax tree files (JSON)
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_or_exit(inputs: &[PathBuf]) -> Vec<Tree> {
    match load_trees(inputs) {
        Ok(trees) => trees,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build { inputs, output, target } => {
            let trees = load_or_exit(&inputs);
            let options = CompileOptions {
                output,
                target: target.into(),
            };
            println!("Compiling {} tree(s) for {}", trees.len(), options.target);

            let mut compilation = Compilation::new(trees, options);
            match compilation.compile_to(Path::new(".")) {
                Ok(path) => {
                    println!("  [ok] Types: {}", compilation.assembly().defined_types().count());
                    println!("  [ok] Written: {}", path.display());
                }
                Err(DriverError::Failed(errors)) => {
                    eprintln!("{}", compilation.render_diagnostics());
                    eprintln!("\nCompilation failed with {} error(s)", errors);
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Ir { inputs, target } => {
            let trees = load_or_exit(&inputs);
            let options = CompileOptions {
                target: target.into(),
                ..CompileOptions::default()
            };

            let mut compilation = Compilation::new(trees, options);
            compilation.lower_declarations();
            compilation.lower_bodies();
            if compilation.has_errors() {
                eprintln!("{}\n", compilation.render_diagnostics());
            }
            println!("{}", compilation.assembly());
        }

        Commands::Ast { inputs } => {
            for tree in load_or_exit(&inputs) {
                if let Some(file) = &tree.file {
                    println!("// {}", file);
                }
                println!("{}", tree);
            }
        }
    }
}
