// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # hipo-engine
//!
//! A compiler and stack machine for a small PHP-flavoured language.
//!
//! ## Overview
//!
//! This crate provides the whole pipeline:
//! - Lexer and recursive descent parser for `<?php ... ?>` programs
//! - Semantic analysis with per-scope symbol tables
//! - A single-pass code generator with backpatched jumps
//! - A line-oriented bytecode text format
//! - The stack machine interpreter
//!
//! ## Quick Start
//!
//! ```rust
//! use hipo_engine::Engine;
//!
//! let engine = Engine::new();
//! let mut output = Vec::new();
//! engine
//!     .eval("<?php $x = 5; $y = 3; echo $x + $y . PHP_EOL; ?>", &mut "".as_bytes(), &mut output)
//!     .unwrap();
//! assert_eq!(String::from_utf8(output).unwrap(), "[Saida] 8\n");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod vm;

use std::io::{BufRead, Write};
use std::path::Path;

use tracing::info;

pub use compiler::{Bytecode, CodegenError, Compiler};
pub use semantic::{Analysis, SemanticError};
pub use vm::{Completion, Fault, HaltReason, VM};

/// Everything produced by compiling one source file.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// The token stream, ending in `Eof`
    pub tokens: Vec<lexer::Token>,
    /// The parsed program
    pub program: ast::Program,
    /// Scope tables, with function entry addresses filled in
    pub analysis: Analysis,
    /// The generated program
    pub bytecode: Bytecode,
}

/// The compiler pipeline and interpreter behind one handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct Engine;

impl Engine {
    /// Creates a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Compiles source code through every stage up to bytecode.
    pub fn compile(&self, source: &str) -> Result<Compilation, Error> {
        let tokens = lexer::tokenize(source)?;
        let program = parser::Parser::from_tokens(source, &tokens).parse_program()?;
        let analysis = semantic::analyze(&program)?;

        let mut compiler = Compiler::with_analysis(analysis);
        let bytecode = compiler.generate(&program)?;
        let analysis = compiler.into_analysis();
        info!(instructions = bytecode.len(), "compiled");

        Ok(Compilation {
            tokens,
            program,
            analysis,
            bytecode,
        })
    }

    /// Runs a compiled program on the given console streams.
    pub fn run<R: BufRead, W: Write>(
        &self,
        bytecode: &Bytecode,
        input: &mut R,
        output: &mut W,
    ) -> Result<Completion, Error> {
        let completion = VM::new().run(bytecode, input, output)?;
        info!(steps = completion.steps, reason = ?completion.reason, "run finished");
        Ok(completion)
    }

    /// Compiles and runs source code.
    pub fn eval<R: BufRead, W: Write>(
        &self,
        source: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<Completion, Error> {
        let compilation = self.compile(source)?;
        self.run(&compilation.bytecode, input, output)
    }

    /// Reads a source file, then compiles and runs it.
    pub fn eval_file<R: BufRead, W: Write>(
        &self,
        path: impl AsRef<Path>,
        input: &mut R,
        output: &mut W,
    ) -> Result<Completion, Error> {
        let source = std::fs::read_to_string(path)?;
        self.eval(&source, input, output)
    }
}

/// Errors that can occur while compiling or running a program.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unrecognized character
    #[error("lexical error at {line}:{column}: {message}")]
    Lexical {
        /// What went wrong
        message: String,
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
    },

    /// Source that does not follow the grammar
    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        /// What went wrong
        message: String,
        /// 1-based line
        line: usize,
        /// 1-based column
        column: usize,
    },

    /// One or more semantic errors
    #[error("{}", join_lines(.0))]
    Semantic(Vec<SemanticError>),

    /// Code generation failed
    #[error("code generation error: {0}")]
    Codegen(#[from] CodegenError),

    /// The program faulted while running
    #[error("runtime fault: {0}")]
    Fault(#[from] Fault),

    /// Reading or writing a file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the pipeline stage that produced this error.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Lexical { .. } => "lexer",
            Error::Syntax { .. } => "parser",
            Error::Semantic(_) => "semantic",
            Error::Codegen(_) => "codegen",
            Error::Fault(_) => "vm",
            Error::Io(_) => "io",
        }
    }
}

fn join_lines(errors: &[SemanticError]) -> String {
    let mut out = format!("{} semantic error(s):", errors.len());
    for error in errors {
        out.push_str("\n  ");
        out.push_str(&error.to_string());
    }
    out
}
