//! Human-readable script dump for debugging and tests.
//!
//! One line per expression: in-memory offset, the token indented by nesting
//! depth, then its operands.

use std::fmt::Write as _;

use crate::buffer::BytecodeBuffer;
use crate::error::Result;
use crate::token::Token;
use crate::transcode::{Operand, Transcoder, Visitor};

/// Disassemble a whole script.
pub fn dump(buffer: &BytecodeBuffer) -> Result<String> {
    let mut printer = Printer::default();
    Transcoder::walk(buffer)
        .with_visitor(&mut printer)
        .transcode_all()?;
    Ok(printer.lines.join("\n"))
}

#[derive(Default)]
struct Printer {
    lines: Vec<String>,
    /// Line index of each expression still being walked.
    open: Vec<usize>,
}

impl Visitor for Printer {
    fn enter(&mut self, offset: usize, token: Token) {
        let indent = self.open.len() * 2;
        let mut line = String::new();
        write!(line, "{offset:04x}  {:indent$}{token}", "").unwrap();
        self.open.push(self.lines.len());
        self.lines.push(line);
    }

    fn operand(&mut self, operand: &Operand) {
        if let Some(&at) = self.open.last() {
            write!(self.lines[at], " {operand}").unwrap();
        }
    }

    fn leave(&mut self, _token: Token) {
        self.open.pop();
    }
}
