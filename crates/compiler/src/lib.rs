//! minicc compiler library
//!
//! Compiles a practical subset of C89 to x86-64 System V assembly text.
//! The pipeline runs five phases in order, each consuming the previous
//! one's output: lexing, parsing, semantic analysis, lowering to a
//! three-address IR, and assembly emission. Any error at or before IR
//! generation is fatal and no assembly is produced; warnings print to
//! stderr and never halt.
//!
//! [`compile_to_assembly`] runs the pipeline on a source string (handy
//! for tests and embedders); [`compile_file`] is the file-to-artifact
//! driver, which can also hand the generated `.s` to the platform
//! toolchain (`gcc` by default) for assembling and linking the way the
//! CLI does.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diag;
pub mod ir;
pub mod irgen;
pub mod lexer;
pub mod parser;
pub mod sema;
pub mod types;

pub use codegen::CodeGenError;
pub use config::{CompilerConfig, ProjectConfig};
pub use diag::{Diagnostic, Severity, format_diagnostics};
pub use sema::SemanticInfo;

use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Lex, parse, analyze and lower one translation unit. Warnings print
/// to stderr here; errors come back flattened into one message.
fn run_pipeline(source: &str, file_name: &str) -> Result<(ir::IrModule, SemanticInfo), String> {
    let tokens = lexer::tokenize(source, file_name).map_err(|d| d.to_string())?;
    debug!(tokens = tokens.len(), "lexed");
    let mut unit = parser::parse(tokens, file_name).map_err(|ds| format_diagnostics(&ds))?;
    debug!(decls = unit.decls.len(), "parsed");
    let (env, warnings) =
        sema::analyze(&mut unit, file_name).map_err(|ds| format_diagnostics(&ds))?;
    for warning in &warnings {
        eprintln!("{}", warning);
    }
    let module = irgen::lower(&unit, &env)?;
    Ok((module, env))
}

/// Compile a source string to assembly text
pub fn compile_to_assembly(source: &str, file_name: &str) -> Result<String, String> {
    let (module, env) = run_pipeline(source, file_name)?;
    codegen::emit(&module, &env).map_err(|e| e.to_string())
}

/// Compile a source file to the artifact selected by `config`: an
/// executable (default, via the downstream toolchain), an object file,
/// or the assembly text itself
pub fn compile_file(input: &Path, output: &Path, config: &CompilerConfig) -> Result<(), String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
    let file_name = input.display().to_string();

    let (module, env) = run_pipeline(&source, &file_name)?;

    if config.emit_ir {
        let ir_path = output.with_extension("ir");
        fs::write(&ir_path, module.to_string())
            .map_err(|e| format!("failed to write {}: {}", ir_path.display(), e))?;
        info!(path = %ir_path.display(), "IR listing written");
    }

    let asm = codegen::emit(&module, &env).map_err(|e| e.to_string())?;

    if config.asm_only {
        fs::write(output, asm)
            .map_err(|e| format!("failed to write {}: {}", output.display(), e))?;
        return Ok(());
    }

    let asm_path = output.with_extension("s");
    fs::write(&asm_path, asm)
        .map_err(|e| format!("failed to write {}: {}", asm_path.display(), e))?;

    // hand the text to the platform assembler/linker
    let tool = config.toolchain_command();
    let mut cmd = Command::new(tool);
    if config.object_only {
        cmd.arg("-c");
    }
    cmd.arg(&asm_path).arg("-o").arg(output);
    for dir in &config.library_paths {
        cmd.arg("-L").arg(dir);
    }
    for lib in &config.libraries {
        cmd.arg("-l").arg(lib);
    }
    debug!(command = ?cmd, "invoking toolchain");
    let result = cmd
        .output()
        .map_err(|e| format!("failed to run {}: {}", tool, e))?;
    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        return Err(format!("{} failed:\n{}", tool, stderr));
    }

    if !config.keep_asm {
        fs::remove_file(&asm_path).ok();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factorial_compiles_to_assembly() {
        let asm = compile_to_assembly(
            "int fact(int n){ if (n<=1) return 1; return n*fact(n-1); }\n\
             int main(void){ return fact(5); }",
            "fact.c",
        )
        .unwrap();
        assert!(asm.contains("fact:"));
        assert!(asm.contains("main:"));
        assert!(asm.contains("\tcall fact"));
        assert!(asm.contains(".section .note.GNU-stack,\"\",@progbits"));
    }

    #[test]
    fn test_pointer_indexing_scenario() {
        let asm = compile_to_assembly(
            "int main(void){ int a[3]; a[0]=1; a[1]=2; a[2]=4; int *p=a; \
             return p[0]+p[1]+p[2]; }",
            "ptr.c",
        )
        .unwrap();
        assert!(asm.contains("(%rdi,%rcx,4)"));
    }

    #[test]
    fn test_struct_member_scenario() {
        let asm = compile_to_assembly(
            "struct P { int x; int y; }; int main(void){ struct P p; \
             p.x=3; p.y=4; return p.x*p.y; }",
            "struct.c",
        )
        .unwrap();
        assert!(asm.contains("\tmovl %eax, 4(%rdi)"));
        assert!(asm.contains("\timulq %rcx, %rax"));
    }

    #[test]
    fn test_short_circuit_scenario() {
        let asm = compile_to_assembly(
            "int n; int f(void){ n++; return 1; } \
             int main(void){ n=0; if (0 && f()) {} if (1 || f()) {} return n; }",
            "short.c",
        )
        .unwrap();
        // both operands guard with conditional jumps around f()
        assert!(asm.contains("\tcall f"));
        assert!(asm.contains("\tje .L"));
        assert!(asm.contains("\tjne .L"));
    }

    #[test]
    fn test_lex_error_reports_position() {
        let err = compile_to_assembly("int x = `;", "bad.c").unwrap_err();
        assert!(err.contains("bad.c:1:9"));
        assert!(err.contains("stray character"));
    }

    #[test]
    fn test_parse_errors_are_fatal_and_batched() {
        let err = compile_to_assembly(
            "int f(void){ return }\nint g(void){ return }\n",
            "bad.c",
        )
        .unwrap_err();
        assert!(err.lines().count() >= 2);
    }

    #[test]
    fn test_semantic_error_halts_before_assembly() {
        let err = compile_to_assembly("int main(void){ return missing; }", "bad.c").unwrap_err();
        assert!(err.contains("undefined identifier"));
    }

    #[test]
    fn test_warnings_do_not_halt() {
        let asm = compile_to_assembly(
            "int main(void){ int x; char *p = &x; return p != 0; }",
            "warn.c",
        )
        .unwrap();
        assert!(asm.contains("main:"));
    }

    #[test]
    fn test_compile_file_writes_assembly() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("t.c");
        let output = dir.path().join("t.s");
        fs::write(&input, "int main(void){ return 7; }").unwrap();
        let config = CompilerConfig::new().with_asm_only(true);
        compile_file(&input, &output, &config).unwrap();
        let asm = fs::read_to_string(&output).unwrap();
        assert!(asm.contains("main:"));
        assert!(asm.contains("\tmovq $7, %rax"));
    }

    #[test]
    fn test_compile_file_emit_ir_listing() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("t.c");
        let output = dir.path().join("t.s");
        fs::write(&input, "int main(void){ return 1 + 2; }").unwrap();
        let config = CompilerConfig::new().with_asm_only(true).with_emit_ir(true);
        compile_file(&input, &output, &config).unwrap();
        let ir = fs::read_to_string(dir.path().join("t.ir")).unwrap();
        assert!(ir.contains("fn main"));
        assert!(ir.contains("ret 3"));
    }

    #[test]
    fn test_compile_file_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_file(
            &dir.path().join("absent.c"),
            &dir.path().join("a.s"),
            &CompilerConfig::new().with_asm_only(true),
        )
        .unwrap_err();
        assert!(err.contains("failed to read"));
    }
}
