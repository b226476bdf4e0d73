use std::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::ir::Op;

/// Fully resolved operand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsmArg {
    Uint(u64),
    Bytes(Vec<u8>),
    Str(String),
    Name(String),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsmLine {
    Label {
        name: String,
        comment: Option<String>,
    },
    Op {
        op: Op,
        args: Vec<AsmArg>,
    },
}

impl AsmLine {
    pub fn op(op: Op, args: Vec<AsmArg>) -> Self {
        AsmLine::Op { op, args }
    }

    pub fn label_name(&self) -> Option<&str> {
        match self {
            AsmLine::Label { name, .. } => Some(name),
            AsmLine::Op { .. } => None,
        }
    }
}

/// The linked program: every label and slot placeholder is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assembly {
    pub version: u8,
    pub lines: Vec<AsmLine>,
}

impl Assembly {
    /// Op lines only, in order.
    pub fn ops(&self) -> impl Iterator<Item = (Op, &[AsmArg])> + '_ {
        self.lines.iter().filter_map(|line| match line {
            AsmLine::Op { op, args } => Some((*op, args.as_slice())),
            AsmLine::Label { .. } => None,
        })
    }

    pub fn count(&self, op: Op) -> usize {
        self.ops().filter(|(o, _)| *o == op).count()
    }
}

// =============================================================================
// Text output
// =============================================================================

fn write_hex(f: &mut impl Write, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

fn write_quoted(f: &mut impl Write, text: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_ascii_graphic() || c == ' ' => f.write_char(c)?,
            c => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).bytes() {
                    write!(f, "\\x{:02x}", b)?;
                }
            }
        }
    }
    f.write_char('"')
}

impl std::fmt::Display for AsmArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsmArg::Uint(n) => write!(f, "{}", n),
            AsmArg::Bytes(bytes) => write_hex(f, bytes),
            AsmArg::Str(text) => write_quoted(f, text),
            AsmArg::Name(name) | AsmArg::Label(name) => f.write_str(name),
        }
    }
}

impl std::fmt::Display for AsmLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsmLine::Label {
                name,
                comment: Some(comment),
            } => write!(f, "{}: // {}", name, comment),
            AsmLine::Label { name, comment: None } => write!(f, "{}:", name),
            AsmLine::Op { op, args } => {
                f.write_str(op.mnemonic())?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                Ok(())
            }
        }
    }
}

impl std::fmt::Display for Assembly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#pragma version {}", self.version)?;
        for line in &self.lines {
            write!(f, "\n{}", line)?;
        }
        Ok(())
    }
}
