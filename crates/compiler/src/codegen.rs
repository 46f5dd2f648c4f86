//! x86-64 System V assembly emission via text
//!
//! Generates GAS/AT&T assembly from the three-address IR. The register
//! policy is deliberately simple: every local and every IR temporary has
//! a stack slot; `%rax` is the accumulator, `%rcx` carries the second
//! operand and shift counts, `%rdx` the high word for divides, and
//! `%rdi` computed addresses. Each instruction loads its operands from
//! slots, operates, and stores the result back. Correct, not fast.
//!
//! Frame discipline: `push %rbp; mov %rsp,%rbp; sub $frame,%rsp` with a
//! 16-byte-aligned frame, so `%rsp` is 16-byte aligned at every `call`
//! once an odd number of stack arguments is padded.

mod globals;

use crate::ir::{BinOp, Instr, IrFunction, IrModule, Operand, UnOp, Width};
use crate::sema::SemanticInfo;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

/// Error type for code generation operations.
///
/// Allows `?` propagation over both logical errors (malformed IR, which
/// means a pipeline bug) and formatting errors from text emission.
#[derive(Debug)]
pub enum CodeGenError {
    /// A logical error in code generation (e.g., an operand in a
    /// position the IR contract does not allow)
    Logic(String),
    /// A formatting error when writing assembly text
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "assembly emission error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}

/// Integer argument registers, in ABI order
const ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// Emit a complete `.s` file for the module
pub fn emit(module: &IrModule, info: &SemanticInfo) -> Result<String, CodeGenError> {
    let mut out = String::new();

    if !module.functions.is_empty() {
        writeln!(out, "\t.text")?;
    }
    for func in &module.functions {
        let frame = info
            .frames
            .get(&func.name)
            .ok_or_else(|| CodeGenError::Logic(format!("no frame for '{}'", func.name)))?;
        let mut emitter = FnEmitter {
            out: &mut out,
            slots: &frame.slots,
            frame_size: func.frame_size,
            pending_args: Vec::new(),
        };
        emitter.emit_function(func)?;
    }

    globals::emit_data_sections(&mut out, module)?;

    // non-executable stack marker
    writeln!(out, "\t.section .note.GNU-stack,\"\",@progbits")?;
    debug!(bytes = out.len(), "assembly emitted");
    Ok(out)
}

struct FnEmitter<'a> {
    out: &'a mut String,
    slots: &'a HashMap<String, crate::sema::LocalSlot>,
    /// Frame bytes for locals and spills; temps are placed below
    frame_size: usize,
    /// Operands queued by `Param`, consumed by the next `Call`
    pending_args: Vec<Operand>,
}

impl<'a> FnEmitter<'a> {
    fn emit_function(&mut self, func: &IrFunction) -> Result<(), CodeGenError> {
        let total = total_frame(func);
        if func.exported {
            writeln!(self.out, "\t.globl {}", func.name)?;
        }
        writeln!(self.out, "{}:", func.name)?;
        writeln!(self.out, "\tpushq %rbp")?;
        writeln!(self.out, "\tmovq %rsp, %rbp")?;
        if total > 0 {
            writeln!(self.out, "\tsubq ${}, %rsp", total)?;
        }
        for (i, (_, offset)) in func.reg_params.iter().enumerate() {
            writeln!(self.out, "\tmovq {}, {}(%rbp)", ARG_REGS[i], offset)?;
        }
        for instr in &func.body {
            self.emit_instr(func, instr)?;
        }
        Ok(())
    }

    /// Frame-pointer-relative reference for a slot operand
    fn slot_ref(&self, func: &IrFunction, op: &Operand) -> Result<String, CodeGenError> {
        match op {
            Operand::Temp(i) => {
                let offset = -(self.frame_size as i64) - 8 * (*i as i64 + 1);
                Ok(format!("{}(%rbp)", offset))
            }
            Operand::Local(name) => {
                let slot = self.slots.get(name).ok_or_else(|| {
                    CodeGenError::Logic(format!(
                        "unknown local '{}' in '{}'",
                        name, func.name
                    ))
                })?;
                Ok(format!("{}(%rbp)", slot.offset))
            }
            other => Err(CodeGenError::Logic(format!(
                "operand {} has no stack slot",
                other
            ))),
        }
    }

    /// Load an operand's 64-bit value into a register
    fn load(&mut self, func: &IrFunction, op: &Operand, reg: &str) -> Result<(), CodeGenError> {
        match op {
            Operand::Imm(v) => {
                if i32::try_from(*v).is_ok() {
                    writeln!(self.out, "\tmovq ${}, {}", v, reg)?;
                } else {
                    writeln!(self.out, "\tmovabsq ${}, {}", v, reg)?;
                }
            }
            Operand::Temp(_) | Operand::Local(_) => {
                let slot = self.slot_ref(func, op)?;
                writeln!(self.out, "\tmovq {}, {}", slot, reg)?;
            }
            Operand::Global(name) => {
                return Err(CodeGenError::Logic(format!(
                    "global '{}' used as a plain value",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Load an address-position operand into a register: globals give
    /// their own address, everything else a pointer value
    fn load_addr(
        &mut self,
        func: &IrFunction,
        op: &Operand,
        reg: &str,
    ) -> Result<(), CodeGenError> {
        match op {
            Operand::Global(name) => {
                writeln!(self.out, "\tleaq {}(%rip), {}", name, reg)?;
                Ok(())
            }
            _ => self.load(func, op, reg),
        }
    }

    fn store(&mut self, func: &IrFunction, dst: &Operand) -> Result<(), CodeGenError> {
        let slot = self.slot_ref(func, dst)?;
        writeln!(self.out, "\tmovq %rax, {}", slot)?;
        Ok(())
    }

    fn emit_instr(&mut self, func: &IrFunction, instr: &Instr) -> Result<(), CodeGenError> {
        match instr {
            Instr::Mov { dst, src } => {
                self.load(func, src, "%rax")?;
                self.store(func, dst)
            }
            Instr::Bin {
                op,
                signed,
                dst,
                a,
                b,
            } => {
                self.load(func, a, "%rax")?;
                self.load(func, b, "%rcx")?;
                self.emit_binop(*op, *signed)?;
                self.store(func, dst)
            }
            Instr::Un { op, dst, a } => {
                self.load(func, a, "%rax")?;
                match op {
                    UnOp::Neg => writeln!(self.out, "\tnegq %rax")?,
                    UnOp::BitNot => writeln!(self.out, "\tnotq %rax")?,
                    UnOp::LogNot => {
                        writeln!(self.out, "\tcmpq $0, %rax")?;
                        writeln!(self.out, "\tsete %al")?;
                        writeln!(self.out, "\tmovzbq %al, %rax")?;
                    }
                    UnOp::Sext8 => writeln!(self.out, "\tmovsbq %al, %rax")?,
                    UnOp::Zext8 => writeln!(self.out, "\tmovzbq %al, %rax")?,
                    UnOp::Sext16 => writeln!(self.out, "\tmovswq %ax, %rax")?,
                    UnOp::Zext16 => writeln!(self.out, "\tmovzwq %ax, %rax")?,
                    UnOp::Sext32 => writeln!(self.out, "\tmovslq %eax, %rax")?,
                    UnOp::Zext32 => writeln!(self.out, "\tmovl %eax, %eax")?,
                }
                self.store(func, dst)
            }
            Instr::Load {
                dst,
                addr,
                width,
                signed,
            } => {
                self.load_addr(func, addr, "%rdi")?;
                self.emit_load_mem("(%rdi)", *width, *signed)?;
                self.store(func, dst)
            }
            Instr::Store { addr, src, width } => {
                self.load(func, src, "%rax")?;
                self.load_addr(func, addr, "%rdi")?;
                self.emit_store_mem("(%rdi)", *width)
            }
            Instr::Lea { dst, src } => {
                match src {
                    Operand::Global(name) => {
                        writeln!(self.out, "\tleaq {}(%rip), %rax", name)?;
                    }
                    Operand::Local(_) => {
                        let slot = self.slot_ref(func, src)?;
                        writeln!(self.out, "\tleaq {}, %rax", slot)?;
                    }
                    other => {
                        return Err(CodeGenError::Logic(format!(
                            "lea of non-addressable operand {}",
                            other
                        )));
                    }
                }
                self.store(func, dst)
            }
            Instr::LoadIndex {
                dst,
                base,
                index,
                elem_size,
                width,
                signed,
            } => {
                self.load_addr(func, base, "%rdi")?;
                self.load(func, index, "%rcx")?;
                let mem = self.index_operand(*elem_size)?;
                self.emit_load_mem(&mem, *width, *signed)?;
                self.store(func, dst)
            }
            Instr::StoreIndex {
                base,
                index,
                src,
                elem_size,
                width,
            } => {
                self.load(func, src, "%rax")?;
                self.load_addr(func, base, "%rdi")?;
                self.load(func, index, "%rcx")?;
                let mem = self.index_operand(*elem_size)?;
                self.emit_store_mem(&mem, *width)
            }
            Instr::LoadMember {
                dst,
                base,
                offset,
                width,
                signed,
            } => {
                self.load_addr(func, base, "%rdi")?;
                self.emit_load_mem(&format!("{}(%rdi)", offset), *width, *signed)?;
                self.store(func, dst)
            }
            Instr::StoreMember {
                base,
                offset,
                src,
                width,
            } => {
                self.load(func, src, "%rax")?;
                self.load_addr(func, base, "%rdi")?;
                self.emit_store_mem(&format!("{}(%rdi)", offset), *width)
            }
            Instr::Param { src } => {
                self.pending_args.push(src.clone());
                Ok(())
            }
            Instr::Call {
                dst,
                callee,
                args,
                variadic,
            } => self.emit_call(func, dst.as_ref(), callee, *args, *variadic),
            Instr::Ret { src } => {
                if let Some(src) = src {
                    self.load(func, src, "%rax")?;
                }
                writeln!(self.out, "\tmovq %rbp, %rsp")?;
                writeln!(self.out, "\tpopq %rbp")?;
                writeln!(self.out, "\tret")?;
                Ok(())
            }
            Instr::Label(name) => {
                writeln!(self.out, ".L{}:", name)?;
                Ok(())
            }
            Instr::Jmp(target) => {
                writeln!(self.out, "\tjmp .L{}", target)?;
                Ok(())
            }
            Instr::Jz { cond, target } => {
                self.load(func, cond, "%rax")?;
                writeln!(self.out, "\tcmpq $0, %rax")?;
                writeln!(self.out, "\tje .L{}", target)?;
                Ok(())
            }
            Instr::Jnz { cond, target } => {
                self.load(func, cond, "%rax")?;
                writeln!(self.out, "\tcmpq $0, %rax")?;
                writeln!(self.out, "\tjne .L{}", target)?;
                Ok(())
            }
        }
    }

    /// `a` in `%rax`, `b` in `%rcx`, result to `%rax`
    fn emit_binop(&mut self, op: BinOp, signed: bool) -> Result<(), CodeGenError> {
        match op {
            BinOp::Add => writeln!(self.out, "\taddq %rcx, %rax")?,
            BinOp::Sub => writeln!(self.out, "\tsubq %rcx, %rax")?,
            BinOp::Mul => writeln!(self.out, "\timulq %rcx, %rax")?,
            BinOp::Div | BinOp::Rem => {
                if signed {
                    writeln!(self.out, "\tcqto")?;
                    writeln!(self.out, "\tidivq %rcx")?;
                } else {
                    writeln!(self.out, "\txorl %edx, %edx")?;
                    writeln!(self.out, "\tdivq %rcx")?;
                }
                if op == BinOp::Rem {
                    writeln!(self.out, "\tmovq %rdx, %rax")?;
                }
            }
            BinOp::And => writeln!(self.out, "\tandq %rcx, %rax")?,
            BinOp::Or => writeln!(self.out, "\torq %rcx, %rax")?,
            BinOp::Xor => writeln!(self.out, "\txorq %rcx, %rax")?,
            BinOp::Shl => writeln!(self.out, "\tsalq %cl, %rax")?,
            BinOp::Shr => {
                if signed {
                    writeln!(self.out, "\tsarq %cl, %rax")?;
                } else {
                    writeln!(self.out, "\tshrq %cl, %rax")?;
                }
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
                writeln!(self.out, "\tcmpq %rcx, %rax")?;
                let set = match (op, signed) {
                    (BinOp::Lt, true) => "setl",
                    (BinOp::Lt, false) => "setb",
                    (BinOp::Le, true) => "setle",
                    (BinOp::Le, false) => "setbe",
                    (BinOp::Gt, true) => "setg",
                    (BinOp::Gt, false) => "seta",
                    (BinOp::Ge, true) => "setge",
                    (BinOp::Ge, false) => "setae",
                    (BinOp::Eq, _) => "sete",
                    _ => "setne",
                };
                writeln!(self.out, "\t{} %al", set)?;
                writeln!(self.out, "\tmovzbq %al, %rax")?;
            }
        }
        Ok(())
    }

    /// Scaled memory operand for indexed access; element sizes outside
    /// the addressing modes fold into `%rdi` first
    fn index_operand(&mut self, elem_size: usize) -> Result<String, CodeGenError> {
        match elem_size {
            1 | 2 | 4 | 8 => Ok(format!("(%rdi,%rcx,{})", elem_size)),
            _ => {
                writeln!(self.out, "\timulq ${}, %rcx", elem_size)?;
                writeln!(self.out, "\taddq %rcx, %rdi")?;
                Ok("(%rdi)".to_string())
            }
        }
    }

    /// Width-aware load from a memory operand into `%rax`, extending
    /// narrow values to 64 bits
    fn emit_load_mem(
        &mut self,
        mem: &str,
        width: Width,
        signed: bool,
    ) -> Result<(), CodeGenError> {
        match (width, signed) {
            (Width::W1, true) => writeln!(self.out, "\tmovsbq {}, %rax", mem)?,
            (Width::W1, false) => writeln!(self.out, "\tmovzbq {}, %rax", mem)?,
            (Width::W2, true) => writeln!(self.out, "\tmovswq {}, %rax", mem)?,
            (Width::W2, false) => writeln!(self.out, "\tmovzwq {}, %rax", mem)?,
            (Width::W4, true) => writeln!(self.out, "\tmovslq {}, %rax", mem)?,
            (Width::W4, false) => writeln!(self.out, "\tmovl {}, %eax", mem)?,
            (Width::W8, _) => writeln!(self.out, "\tmovq {}, %rax", mem)?,
        }
        Ok(())
    }

    /// Width-aware store of `%rax` to a memory operand
    fn emit_store_mem(&mut self, mem: &str, width: Width) -> Result<(), CodeGenError> {
        match width {
            Width::W1 => writeln!(self.out, "\tmovb %al, {}", mem)?,
            Width::W2 => writeln!(self.out, "\tmovw %ax, {}", mem)?,
            Width::W4 => writeln!(self.out, "\tmovl %eax, {}", mem)?,
            Width::W8 => writeln!(self.out, "\tmovq %rax, {}", mem)?,
        }
        Ok(())
    }

    fn emit_call(
        &mut self,
        func: &IrFunction,
        dst: Option<&Operand>,
        callee: &Operand,
        args: usize,
        variadic: bool,
    ) -> Result<(), CodeGenError> {
        let pending = std::mem::take(&mut self.pending_args);
        if pending.len() != args {
            return Err(CodeGenError::Logic(format!(
                "call expects {} arguments but {} were queued",
                args,
                pending.len()
            )));
        }

        for (i, arg) in pending.iter().take(6).enumerate() {
            self.load(func, arg, ARG_REGS[i])?;
        }
        // stack arguments push in reverse, padded to keep %rsp aligned
        let extra = pending.len().saturating_sub(6);
        let pad = if extra % 2 == 1 { 8 } else { 0 };
        if pad > 0 {
            writeln!(self.out, "\tsubq $8, %rsp")?;
        }
        for arg in pending.iter().skip(6).rev() {
            self.load(func, arg, "%rax")?;
            writeln!(self.out, "\tpushq %rax")?;
        }

        match callee {
            Operand::Global(name) => {
                if variadic {
                    writeln!(self.out, "\txorl %eax, %eax")?;
                }
                writeln!(self.out, "\tcall {}", name)?;
            }
            _ => {
                self.load(func, callee, "%r10")?;
                if variadic {
                    writeln!(self.out, "\txorl %eax, %eax")?;
                }
                writeln!(self.out, "\tcall *%r10")?;
            }
        }

        let unwind = 8 * extra + pad;
        if unwind > 0 {
            writeln!(self.out, "\taddq ${}, %rsp", unwind)?;
        }
        if let Some(dst) = dst {
            self.store(func, dst)?;
        }
        Ok(())
    }
}

/// Total frame reservation: locals plus one 8-byte slot per temporary,
/// rounded to 16 so `%rsp` stays aligned for calls
fn total_frame(func: &IrFunction) -> usize {
    let raw = func.frame_size + 8 * func.temp_count as usize;
    raw.div_ceil(16) * 16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irgen::lower;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::sema::analyze;

    fn emit_src(source: &str) -> String {
        let tokens = tokenize(source, "test.c").unwrap();
        let mut unit = parse(tokens, "test.c").unwrap();
        let (info, _) = analyze(&mut unit, "test.c").unwrap();
        let module = lower(&unit, &info).unwrap();
        emit(&module, &info).unwrap()
    }

    #[test]
    fn test_empty_translation_unit() {
        let asm = emit_src("");
        assert_eq!(asm.trim(), ".section .note.GNU-stack,\"\",@progbits");
    }

    #[test]
    fn test_prologue_epilogue_shape() {
        let asm = emit_src("void f(void){}");
        assert!(asm.contains("\t.globl f\n"));
        assert!(asm.contains("f:\n\tpushq %rbp\n\tmovq %rsp, %rbp\n"));
        assert!(asm.contains("\tmovq %rbp, %rsp\n\tpopq %rbp\n\tret\n"));
    }

    #[test]
    fn test_frame_sub_is_16_aligned() {
        let asm = emit_src("int f(int a, int b, int c){ int d = a; return d + b + c; }");
        let sub = asm
            .lines()
            .find(|l| l.contains("subq $") && l.contains("%rsp"))
            .expect("frame setup");
        let n: usize = sub
            .trim()
            .trim_start_matches("subq $")
            .trim_end_matches(", %rsp")
            .parse()
            .unwrap();
        assert_eq!(n % 16, 0);
    }

    #[test]
    fn test_params_spilled_to_frame() {
        let asm = emit_src("int f(int a, int b){ return a + b; }");
        assert!(asm.contains("\tmovq %rdi, -8(%rbp)"));
        assert!(asm.contains("\tmovq %rsi, -16(%rbp)"));
    }

    #[test]
    fn test_static_function_not_exported() {
        let asm =
            emit_src("static int helper(void){ return 1; } int main(void){ return helper(); }");
        assert!(!asm.contains(".globl helper"));
        assert!(asm.contains(".globl main"));
    }

    #[test]
    fn test_direct_call_and_return_value() {
        let asm = emit_src("int fact(int n){ if (n<=1) return 1; return n*fact(n-1); }");
        assert!(asm.contains("\tcall fact\n"));
        assert!(asm.contains("\timulq %rcx, %rax"));
    }

    #[test]
    fn test_signed_division_sequence() {
        let asm = emit_src("int f(int a, int b){ return a / b; }");
        assert!(asm.contains("\tcqto\n\tidivq %rcx"));
    }

    #[test]
    fn test_unsigned_division_zeroes_rdx() {
        let asm = emit_src("unsigned int f(unsigned int a, unsigned int b){ return a / b; }");
        assert!(asm.contains("\txorl %edx, %edx\n\tdivq %rcx"));
    }

    #[test]
    fn test_remainder_taken_from_rdx() {
        let asm = emit_src("int f(int a, int b){ return a % b; }");
        assert!(asm.contains("\tidivq %rcx\n\tmovq %rdx, %rax"));
    }

    #[test]
    fn test_unsigned_shift_is_logical() {
        let asm = emit_src("int f(void){ unsigned int x = 0xFFFFFFFFu; return (int)(x >> 28); }");
        assert!(asm.contains("\tshrq %cl, %rax"));
        assert!(!asm.contains("\tsarq"));
    }

    #[test]
    fn test_signed_shift_is_arithmetic() {
        let asm = emit_src("int f(int x){ return x >> 1; }");
        assert!(asm.contains("\tsarq %cl, %rax"));
    }

    #[test]
    fn test_char_load_sign_extends() {
        let asm = emit_src("int f(char *p){ return *p; }");
        assert!(asm.contains("\tmovsbq (%rdi), %rax"));
    }

    #[test]
    fn test_unsigned_comparison_uses_below() {
        let asm = emit_src("int f(unsigned int a, unsigned int b){ return a < b; }");
        assert!(asm.contains("\tsetb %al"));
    }

    #[test]
    fn test_signed_comparison_uses_less() {
        let asm = emit_src("int f(int a, int b){ return a < b; }");
        assert!(asm.contains("\tsetl %al"));
    }

    #[test]
    fn test_indexed_access_uses_scaled_addressing() {
        let asm = emit_src("int f(int *p, int i){ return p[i]; }");
        assert!(asm.contains("(%rdi,%rcx,4)"));
    }

    #[test]
    fn test_seven_argument_call_pads_stack() {
        let asm = emit_src(
            "int g(int a,int b,int c,int d,int e,int f,int h); \
             int f(void){ return g(1,2,3,4,5,6,7); }",
        );
        // one stack argument: pad by 8, push, unwind 16
        assert!(asm.contains("\tsubq $8, %rsp\n"));
        assert!(asm.contains("\tpushq %rax"));
        assert!(asm.contains("\taddq $16, %rsp"));
    }

    #[test]
    fn test_variadic_call_zeroes_al() {
        let asm = emit_src(
            "int printf(const char *fmt, ...); \
             int main(void){ printf(\"hi\\n\"); return 0; }",
        );
        assert!(asm.contains("\txorl %eax, %eax\n\tcall printf"));
    }

    #[test]
    fn test_non_variadic_call_does_not_zero_al() {
        let asm = emit_src("int g(int x); int f(void){ return g(1); }");
        assert!(!asm.contains("\txorl %eax, %eax\n\tcall g"));
    }

    #[test]
    fn test_indirect_call_through_function_pointer() {
        let asm = emit_src(
            "int add1(int x){ return x + 1; } \
             int f(void){ int (*op)(int) = add1; return op(41); }",
        );
        assert!(asm.contains("\tcall *%r10"));
    }

    #[test]
    fn test_global_data_and_bss() {
        let asm = emit_src("int answer = 42; long big; char tag = 'x';");
        assert!(asm.contains("\t.data\n"));
        assert!(asm.contains("answer:\n\t.long 42"));
        assert!(asm.contains("tag:\n\t.byte 120"));
        assert!(asm.contains("\t.bss\n"));
        assert!(asm.contains("big:\n\t.zero 8"));
    }

    #[test]
    fn test_string_literal_in_rodata() {
        let asm = emit_src(r#"char *msg = "hey";"#);
        assert!(asm.contains("\t.section .rodata\n"));
        assert!(asm.contains(".Lstr0:\n\t.string \"hey\""));
        assert!(asm.contains("msg:\n\t.quad .Lstr0"));
    }

    #[test]
    fn test_global_array_blob_with_zero_fill() {
        let asm = emit_src("int a[4] = {1, 2};");
        assert!(asm.contains("a:\n\t.long 1\n\t.long 2\n\t.zero 8"));
    }

    #[test]
    fn test_note_gnu_stack_trailer() {
        let asm = emit_src("int main(void){ return 0; }");
        assert!(asm
            .trim_end()
            .ends_with(".section .note.GNU-stack,\"\",@progbits"));
    }

    #[test]
    fn test_labels_prefixed_and_jumped() {
        let asm = emit_src("int f(int n){ while (n) n = n - 1; return n; }");
        assert!(asm.contains(".LL0:"));
        assert!(asm.contains("\tjmp .LL0"));
        assert!(asm.contains("\tje .LL1"));
    }

    #[test]
    fn test_switch_fallthrough_scenario_compiles() {
        let asm = emit_src(
            "int main(void){ int x=2,s=0; switch(x){case 1: s+=1; case 2: s+=2; \
             case 3: s+=4; break; case 4: s+=100;} return s; }",
        );
        // four case compares, no calls involved
        assert_eq!(asm.matches("\tsete %al").count(), 4);
        assert!(!asm.contains("\tcall"));
    }

    #[test]
    fn test_large_immediate_uses_movabs() {
        let asm = emit_src("long f(void){ return 0x123456789ABCDEFl; }");
        assert!(asm.contains("\tmovabsq $81985529216486895, %rax"));
    }
}
