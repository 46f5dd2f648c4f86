//! Three-address intermediate representation
//!
//! One [`IrFunction`] per defined function plus module-level data: global
//! objects with their initializer blobs and the string-literal table.
//! Operands name virtual temporaries, frame-resident locals, globals, or
//! integer immediates. Signedness rides on the instructions that need it
//! so the backend can pick signed vs unsigned encodings; widths are
//! explicit on every memory access.
//!
//! The `Display` impls produce the listing written by `--emit-ir` and
//! asserted on by tests.

use std::fmt;

/// Access width in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W1,
    W2,
    W4,
    W8,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::W1 => 1,
            Width::W2 => 2,
            Width::W4 => 4,
            Width::W8 => 8,
        }
    }

    pub fn from_size(size: usize) -> Option<Width> {
        match size {
            1 => Some(Width::W1),
            2 => Some(Width::W2),
            4 => Some(Width::W4),
            8 => Some(Width::W8),
            _ => None,
        }
    }
}

/// An instruction operand: a virtual temporary, a named frame slot, a
/// named global (its address, in address positions), or an immediate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Temp(u32),
    Local(String),
    Global(String),
    Imm(i64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(n) => write!(f, "t{}", n),
            Operand::Local(name) => write!(f, "{}", name),
            Operand::Global(name) => write!(f, "@{}", name),
            Operand::Imm(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Rem => "rem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    BitNot,
    LogNot,
    /// Sign-extend the low 8/16/32 bits to 64
    Sext8,
    Sext16,
    Sext32,
    /// Zero-extend the low 8/16/32 bits to 64
    Zext8,
    Zext16,
    Zext32,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnOp::Neg => "neg",
            UnOp::BitNot => "not",
            UnOp::LogNot => "lognot",
            UnOp::Sext8 => "sext8",
            UnOp::Sext16 => "sext16",
            UnOp::Sext32 => "sext32",
            UnOp::Zext8 => "zext8",
            UnOp::Zext16 => "zext16",
            UnOp::Zext32 => "zext32",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// 64-bit value copy
    Mov { dst: Operand, src: Operand },
    Bin {
        op: BinOp,
        signed: bool,
        dst: Operand,
        a: Operand,
        b: Operand,
    },
    Un {
        op: UnOp,
        dst: Operand,
        a: Operand,
    },
    /// Read `width` bytes from the address denoted by `addr`; narrow
    /// reads extend to 64 bits per `signed`
    Load {
        dst: Operand,
        addr: Operand,
        width: Width,
        signed: bool,
    },
    /// Write the low `width` bytes of `src` to the address in `addr`
    Store {
        addr: Operand,
        src: Operand,
        width: Width,
    },
    /// Address of a local or global
    Lea { dst: Operand, src: Operand },
    LoadIndex {
        dst: Operand,
        base: Operand,
        index: Operand,
        elem_size: usize,
        width: Width,
        signed: bool,
    },
    StoreIndex {
        base: Operand,
        index: Operand,
        src: Operand,
        elem_size: usize,
        width: Width,
    },
    LoadMember {
        dst: Operand,
        base: Operand,
        offset: usize,
        width: Width,
        signed: bool,
    },
    StoreMember {
        base: Operand,
        offset: usize,
        src: Operand,
        width: Width,
    },
    /// One per argument, in source order, directly before `Call`
    Param { src: Operand },
    Call {
        dst: Option<Operand>,
        /// `Global` for a direct call; otherwise a temp holding the
        /// function address
        callee: Operand,
        args: usize,
        /// Callee is variadic (the ABI wants `%al` cleared)
        variadic: bool,
    },
    Ret { src: Option<Operand> },
    Label(String),
    Jmp(String),
    Jz { cond: Operand, target: String },
    Jnz { cond: Operand, target: String },
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Mov { dst, src } => write!(f, "  mov {}, {}", dst, src),
            Instr::Bin {
                op,
                signed,
                dst,
                a,
                b,
            } => {
                let suffix = if *signed { "" } else { "u" };
                write!(f, "  {}{} {}, {}, {}", op, suffix, dst, a, b)
            }
            Instr::Un { op, dst, a } => write!(f, "  {} {}, {}", op, dst, a),
            Instr::Load {
                dst,
                addr,
                width,
                signed,
            } => write!(
                f,
                "  load.{}{} {}, [{}]",
                if *signed { "s" } else { "u" },
                width.bytes(),
                dst,
                addr
            ),
            Instr::Store { addr, src, width } => {
                write!(f, "  store.{} [{}], {}", width.bytes(), addr, src)
            }
            Instr::Lea { dst, src } => write!(f, "  lea {}, {}", dst, src),
            Instr::LoadIndex {
                dst,
                base,
                index,
                elem_size,
                width,
                signed,
            } => write!(
                f,
                "  load.{}{} {}, [{} + {} * {}]",
                if *signed { "s" } else { "u" },
                width.bytes(),
                dst,
                base,
                index,
                elem_size
            ),
            Instr::StoreIndex {
                base,
                index,
                src,
                elem_size,
                width,
            } => write!(
                f,
                "  store.{} [{} + {} * {}], {}",
                width.bytes(),
                base,
                index,
                elem_size,
                src
            ),
            Instr::LoadMember {
                dst,
                base,
                offset,
                width,
                signed,
            } => write!(
                f,
                "  load.{}{} {}, [{} + {}]",
                if *signed { "s" } else { "u" },
                width.bytes(),
                dst,
                base,
                offset
            ),
            Instr::StoreMember {
                base,
                offset,
                src,
                width,
            } => write!(
                f,
                "  store.{} [{} + {}], {}",
                width.bytes(),
                base,
                offset,
                src
            ),
            Instr::Param { src } => write!(f, "  param {}", src),
            Instr::Call {
                dst,
                callee,
                args,
                ..
            } => match dst {
                Some(d) => write!(f, "  call {}, {}, {}", d, callee, args),
                None => write!(f, "  call {}, {}", callee, args),
            },
            Instr::Ret { src } => match src {
                Some(s) => write!(f, "  ret {}", s),
                None => write!(f, "  ret"),
            },
            Instr::Label(name) => write!(f, "{}:", name),
            Instr::Jmp(target) => write!(f, "  jmp {}", target),
            Instr::Jz { cond, target } => write!(f, "  jz {}, {}", cond, target),
            Instr::Jnz { cond, target } => write!(f, "  jnz {}, {}", cond, target),
        }
    }
}

/// A lowered function with its frame information
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    /// Frame bytes for locals and parameter spills (16-aligned);
    /// temporaries are assigned below this by the backend
    pub frame_size: usize,
    /// Register parameters in order with their spill offsets
    pub reg_params: Vec<(String, i64)>,
    /// Number of virtual temporaries used by `body`
    pub temp_count: u32,
    pub body: Vec<Instr>,
    /// Emit a `.globl` symbol (false for `static` functions)
    pub exported: bool,
}

/// A single item of a global initializer blob
#[derive(Debug, Clone, PartialEq)]
pub enum DataItem {
    Int { value: i64, width: Width },
    /// Relocation to a string literal in `.rodata`
    StrLabel(String),
    /// Zero fill
    Zero(usize),
}

/// A global object headed for `.data` (initialized) or `.bss`
#[derive(Debug, Clone)]
pub struct GlobalData {
    pub name: String,
    pub size: usize,
    pub align: usize,
    /// `None` lands in `.bss` as zero bytes
    pub init: Option<Vec<DataItem>>,
    pub exported: bool,
}

/// String-literal label used in `.rodata`
pub fn string_label(id: usize) -> String {
    format!(".Lstr{}", id)
}

#[derive(Debug, Clone, Default)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub globals: Vec<GlobalData>,
    /// `(label, payload)`; emission appends the NUL terminator
    pub strings: Vec<(String, Vec<u8>)>,
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, bytes) in &self.strings {
            writeln!(f, "string {} {:?}", label, String::from_utf8_lossy(bytes))?;
        }
        for g in &self.globals {
            match &g.init {
                Some(items) => writeln!(f, "global {} size={} init={:?}", g.name, g.size, items)?,
                None => writeln!(f, "global {} size={} zero", g.name, g.size)?,
            }
        }
        for func in &self.functions {
            writeln!(
                f,
                "fn {} frame={} temps={}",
                func.name, func.frame_size, func.temp_count
            )?;
            for instr in &func.body {
                writeln!(f, "{}", instr)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_round_trips() {
        for w in [Width::W1, Width::W2, Width::W4, Width::W8] {
            assert_eq!(Width::from_size(w.bytes()), Some(w));
        }
        assert_eq!(Width::from_size(3), None);
    }

    #[test]
    fn test_operand_display() {
        assert_eq!(Operand::Temp(3).to_string(), "t3");
        assert_eq!(Operand::Local("x.0".into()).to_string(), "x.0");
        assert_eq!(Operand::Global("counter".into()).to_string(), "@counter");
        assert_eq!(Operand::Imm(-7).to_string(), "-7");
    }

    #[test]
    fn test_instr_display() {
        let i = Instr::Bin {
            op: BinOp::Add,
            signed: true,
            dst: Operand::Temp(0),
            a: Operand::Local("a.0".into()),
            b: Operand::Imm(1),
        };
        assert_eq!(i.to_string(), "  add t0, a.0, 1");
        let l = Instr::Load {
            dst: Operand::Temp(1),
            addr: Operand::Temp(0),
            width: Width::W1,
            signed: true,
        };
        assert_eq!(l.to_string(), "  load.s1 t1, [t0]");
    }
}
