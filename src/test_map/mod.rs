//! Test map text format.
//!
//! A small line-oriented format for writing maps in tests and feeding the `mapc`
//! tool without building graphs by hand.
//!
//! # Format
//!
//! ```text
//! ; Comments start with semicolon
//! %x = input real[4] shape(2,2,1)
//! %c = constant real [1, 2, 3, 4]
//! %s = add %x, %c
//! %d = dot %x, %c
//! %t = sum {%s[0..2], %d}
//! %o = output %s[0..2] shape(2,1,1)
//! map %x -> %o
//! ```
//!
//! Operations are `input`, `constant`, `add`, `sub`, `mul`, `dot`, `sum` and
//! `output`. Operands name output port 0 of an earlier node: `%n` is the whole
//! port, `%n[i]` one element, `%n[a..b]` elements `a` up to `b` exclusive, and
//! `{...}` concatenates operands. Element types are `bool`, `int`, `int64`,
//! `float` and `real`. The `map` statement names the input node and the output.

pub mod parser;

pub use parser::parse_map;

use crate::core::CompileError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("{line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{line}:{column}: {source}")]
    Model {
        line: usize,
        column: usize,
        #[source]
        source: CompileError,
    },
}
