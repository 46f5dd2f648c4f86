//! Data-section emission: `.data`, `.bss` and `.rodata`
//!
//! Initialized globals become `.byte`/`.word`/`.long`/`.quad` directives
//! (with `.zero` runs for padding and partial initializer tails),
//! zero-initialized globals take `.zero` in `.bss`, and string literals
//! land in `.rodata` as NUL-terminated `.string` directives.

use super::CodeGenError;
use crate::ir::{DataItem, IrModule, Width};
use std::fmt::Write as _;

pub(super) fn emit_data_sections(out: &mut String, module: &IrModule) -> Result<(), CodeGenError> {
    let initialized: Vec<_> = module.globals.iter().filter(|g| g.init.is_some()).collect();
    let zeroed: Vec<_> = module.globals.iter().filter(|g| g.init.is_none()).collect();

    if !initialized.is_empty() {
        writeln!(out, "\t.data")?;
        for g in &initialized {
            if g.exported {
                writeln!(out, "\t.globl {}", g.name)?;
            }
            if g.align > 1 {
                writeln!(out, "\t.align {}", g.align)?;
            }
            writeln!(out, "{}:", g.name)?;
            for item in g.init.as_ref().expect("filtered on init") {
                emit_item(out, item)?;
            }
        }
    }

    if !zeroed.is_empty() {
        writeln!(out, "\t.bss")?;
        for g in &zeroed {
            if g.exported {
                writeln!(out, "\t.globl {}", g.name)?;
            }
            if g.align > 1 {
                writeln!(out, "\t.align {}", g.align)?;
            }
            writeln!(out, "{}:", g.name)?;
            writeln!(out, "\t.zero {}", g.size)?;
        }
    }

    if !module.strings.is_empty() {
        writeln!(out, "\t.section .rodata")?;
        for (label, bytes) in &module.strings {
            writeln!(out, "{}:", label)?;
            writeln!(out, "\t.string \"{}\"", escape_gas(bytes))?;
        }
    }
    Ok(())
}

fn emit_item(out: &mut String, item: &DataItem) -> Result<(), CodeGenError> {
    match item {
        DataItem::Int { value, width } => {
            let directive = match width {
                Width::W1 => ".byte",
                Width::W2 => ".word",
                Width::W4 => ".long",
                Width::W8 => ".quad",
            };
            writeln!(out, "\t{} {}", directive, value)?;
        }
        DataItem::StrLabel(label) => writeln!(out, "\t.quad {}", label)?,
        DataItem::Zero(n) => writeln!(out, "\t.zero {}", n)?,
    }
    Ok(())
}

/// Escape a byte payload for a GAS `.string` directive (which appends
/// the NUL terminator itself)
fn escape_gas(bytes: &[u8]) -> String {
    let mut out = String::new();
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(b as char),
            other => {
                out.push_str(&format!("\\{:03o}", other));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_text() {
        assert_eq!(escape_gas(b"hello"), "hello");
    }

    #[test]
    fn test_escape_quotes_and_backslashes() {
        assert_eq!(escape_gas(br#"a"b\c"#), "a\\\"b\\\\c");
    }

    #[test]
    fn test_escape_control_bytes_as_octal() {
        assert_eq!(escape_gas(&[7, b'x', 0xFF]), "\\007x\\377");
    }

    #[test]
    fn test_escape_newline() {
        assert_eq!(escape_gas(b"line\n"), "line\\n");
    }
}
