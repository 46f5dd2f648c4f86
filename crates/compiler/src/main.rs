//! minicc CLI
//!
//! Command-line interface for compiling C source files to x86-64
//! assembly, object files or executables, and for running the frontend
//! checks on their own.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use minicc::{CompilerConfig, ProjectConfig, format_diagnostics};
use std::io;
use std::path::{Path, PathBuf};
use std::process;

#[derive(ClapParser)]
#[command(name = "minicc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "C compiler targeting x86-64 System V assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a C source file
    Build {
        /// Input C source file (already preprocessed)
        input: PathBuf,

        /// Output path (defaults to the input stem; with -S the stem
        /// plus .s, with -c the stem plus .o)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after code generation and write the assembly text
        #[arg(short = 'S', long)]
        assembly: bool,

        /// Stop after assembling and write an object file
        #[arg(short = 'c', long)]
        object: bool,

        /// Keep the intermediate .s file when assembling
        #[arg(long)]
        keep_asm: bool,

        /// Write the three-address IR listing next to the output
        #[arg(long)]
        emit_ir: bool,

        /// Extra library search path for the link step
        #[arg(short = 'L', value_name = "DIR")]
        library_paths: Vec<PathBuf>,

        /// Extra library for the link step
        #[arg(short = 'l', value_name = "LIB")]
        libraries: Vec<String>,
    },

    /// Parse and type-check files, printing every diagnostic
    Check {
        /// Input C source files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build {
            input,
            output,
            assembly,
            object,
            keep_asm,
            emit_ir,
            library_paths,
            libraries,
        } => {
            let output = output.unwrap_or_else(|| {
                let stem = input.file_stem().unwrap_or_default();
                let mut path = PathBuf::from(stem);
                if assembly {
                    path.set_extension("s");
                } else if object {
                    path.set_extension("o");
                }
                path
            });
            run_build(
                &input,
                &output,
                CompilerConfig::new()
                    .with_asm_only(assembly)
                    .with_object_only(object)
                    .with_keep_asm(keep_asm)
                    .with_emit_ir(emit_ir)
                    .with_library_paths(library_paths)
                    .with_libraries(libraries),
            );
        }
        Commands::Check { files } => {
            run_check(&files);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "minicc", &mut io::stdout());
        }
    }
}

fn run_build(input: &Path, output: &Path, mut config: CompilerConfig) {
    match ProjectConfig::load(Path::new("minicc.toml")) {
        Ok(Some(project)) => config.merge_project(project),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }

    match minicc::compile_file(input, output, &config) {
        Ok(()) => {
            println!("Compiled {} -> {}", input.display(), output.display());
            if config.emit_ir {
                let ir_path = output.with_extension("ir");
                if ir_path.exists() {
                    println!("IR listing saved to {}", ir_path.display());
                }
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_check(files: &[PathBuf]) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for path in files {
        let file_name = path.display().to_string();
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading {}: {}", file_name, e);
                errors += 1;
                continue;
            }
        };
        let tokens = match minicc::lexer::tokenize(&source, &file_name) {
            Ok(t) => t,
            Err(d) => {
                print!("{}", format_diagnostics(&[d]));
                errors += 1;
                continue;
            }
        };
        let mut unit = match minicc::parser::parse(tokens, &file_name) {
            Ok(u) => u,
            Err(ds) => {
                print!("{}", format_diagnostics(&ds));
                errors += ds.len();
                continue;
            }
        };
        match minicc::sema::analyze(&mut unit, &file_name) {
            Ok((_, ws)) => {
                print!("{}", format_diagnostics(&ws));
                warnings += ws.len();
            }
            Err(ds) => {
                print!("{}", format_diagnostics(&ds));
                errors += ds.len();
            }
        }
    }

    if errors == 0 {
        println!(
            "No errors in {} file(s) ({} warning(s))",
            files.len(),
            warnings
        );
    } else {
        println!("{} error(s) in {} file(s)", errors, files.len());
        process::exit(1);
    }
}
