//! The bytecode virtual machine.
//!
//! This module contains the stack machine that executes compiled bytecode.
//!
//! ## Structure
//!
//! - `interpreter` - The `VM` execution loop, faults and run results
//!
//! ## Usage
//!
//! ```rust
//! use hipo_engine::compiler::Bytecode;
//! use hipo_engine::vm::VM;
//!
//! let bytecode = Bytecode::parse("INPP\nCRCT 2\nCRCT 3\nSOMA\nIMPR\nPARA");
//! let mut output = Vec::new();
//! VM::new().run(&bytecode, &mut "".as_bytes(), &mut output).unwrap();
//! assert_eq!(output, b"[Saida] 5\n");
//! ```

mod interpreter;

pub use interpreter::{Completion, Fault, HaltReason, MAX_STACK_SLOTS, RunResult, VM, address};
