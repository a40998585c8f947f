//! Bytecode compiler for hipo programs.
//!
//! Transforms a validated AST into bytecode for the stack machine.
//!
//! # Module Structure
//!
//! - `bytecode`: Instructions, opcodes and the text format
//! - `codegen`: Code generation from AST
//!   - `codegen::scope`: Scope tables and address allocation

pub mod bytecode;
pub mod codegen;

pub use bytecode::{Bytecode, Instruction, OpCode, format_number};
pub use codegen::{
    CodegenError, Compiler, GLOBAL_SCOPE, ScopeError, ScopeTable, Symbol, SymbolKind,
};
