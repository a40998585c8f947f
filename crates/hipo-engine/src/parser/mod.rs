//! Parser for hipo source code.
//!
//! Transforms a stream of tokens into an Abstract Syntax Tree (AST).
//!
//! ## Structure
//!
//! - `parser` - Main recursive descent parser implementation
//!
//! ## Usage
//!
//! ```rust
//! use hipo_engine::parser::Parser;
//!
//! let mut parser = Parser::new("<?php $x = 1 + 2; ?>");
//! let program = parser.parse_program().expect("Should parse");
//! assert_eq!(program.body.declarations.len(), 1);
//! ```

mod parser;

pub use parser::Parser;

use crate::Error;
use crate::ast::Program;

/// Parses a complete program.
pub fn parse(source: &str) -> Result<Program, Error> {
    Parser::new(source).parse_program()
}
