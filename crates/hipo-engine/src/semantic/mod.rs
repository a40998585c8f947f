//! Semantic analysis.
//!
//! Builds the scope tables the code generator relies on and checks that
//! every name is declared exactly once and every call matches its callee.
//! All problems are collected before the pass fails, so a single run
//! reports every error in the program.

mod analyzer;

pub use analyzer::{Analyzer, analyze};

use std::collections::BTreeMap;
use std::fmt::Write as _;

use thiserror::Error;

use crate::compiler::{ScopeTable, SymbolKind};

/// A semantic error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SemanticError {
    /// A variable declared twice in one scope
    #[error("variable '{name}' already declared in scope '{scope}'")]
    DuplicateVariable {
        /// Variable name
        name: String,
        /// Scope name
        scope: String,
    },
    /// A function declared twice
    #[error("function '{name}' already declared")]
    DuplicateFunction {
        /// Function name
        name: String,
    },
    /// Any other name registered twice in one scope, such as a repeated parameter
    #[error("duplicate symbol '{name}' in scope '{scope}'")]
    DuplicateSymbol {
        /// Symbol name
        name: String,
        /// Scope name
        scope: String,
    },
    /// A function declared inside another function
    #[error("function '{name}' must be declared at top level")]
    NestedFunction {
        /// Function name
        name: String,
    },
    /// A variable used without a declaration
    #[error("variable '{name}' not declared")]
    UndeclaredVariable {
        /// Variable name
        name: String,
    },
    /// A function name where a variable is expected
    #[error("'{name}' is a function, not a variable")]
    FunctionUsedAsVariable {
        /// The name
        name: String,
    },
    /// A call to a function that does not exist
    #[error("function '{name}' not declared")]
    UndeclaredFunction {
        /// Function name
        name: String,
    },
    /// A call whose target is not a function
    #[error("'{name}' is not a function")]
    NotAFunction {
        /// The name
        name: String,
    },
    /// A call with the wrong number of arguments
    #[error("function '{function}' expects {expected} argument(s), found {found}")]
    ArgumentCount {
        /// Function name
        function: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
    },
}

/// The result of semantic analysis.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// The global table: top-level variables and every function
    pub global: ScopeTable<'static>,
    /// One table per function, keyed by function name
    pub functions: BTreeMap<String, ScopeTable<'static>>,
}

impl Analysis {
    /// Returns the table of the named function.
    pub fn function_scope(&self, name: &str) -> Option<&ScopeTable<'static>> {
        self.functions.get(name)
    }

    /// Renders every scope table, scopes and symbols in name order.
    pub fn dump(&self) -> String {
        let mut scopes: Vec<&ScopeTable<'static>> = std::iter::once(&self.global)
            .chain(self.functions.values())
            .collect();
        scopes.sort_by(|a, b| a.name().cmp(b.name()));

        let mut out = String::new();
        for scope in scopes {
            let _ = writeln!(
                out,
                "scope {} (next address {})",
                scope.name(),
                scope.next_free_address()
            );
            for symbol in scope.sorted_symbols() {
                let _ = write!(
                    out,
                    "  - name={} kind={} scope={}",
                    symbol.name,
                    symbol.kind.as_str(),
                    symbol.scope_name
                );
                if symbol.kind == SymbolKind::Function {
                    let entry = symbol
                        .entry_address
                        .map(|entry| entry.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let _ = writeln!(
                        out,
                        " parameters=[{}] locals={} entry={}",
                        symbol.parameters.join(", "),
                        symbol.local_slot_count,
                        entry
                    );
                } else {
                    let address = symbol
                        .address
                        .map(|address| address.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let _ = writeln!(out, " address={}", address);
                }
            }
        }
        out
    }
}
