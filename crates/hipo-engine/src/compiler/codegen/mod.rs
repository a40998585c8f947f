//! Code generation from AST to bytecode.
//!
//! This module contains the `Compiler` which walks a validated program once,
//! depth first, and emits a linear instruction stream. Forward targets
//! (function skips, branch exits, return addresses) are emitted as `0`
//! placeholders and backpatched by index once the target is known.
//!
//! Addresses are absolute slots in the machine's single value stack:
//! globals sit at `[0, globals_count)` and the running function's
//! parameters and locals directly above them.

mod scope;

#[cfg(test)]
mod tests;

pub use scope::{GLOBAL_SCOPE, ScopeError, ScopeTable, Symbol, SymbolKind};

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;

use crate::ast::*;
use crate::compiler::bytecode::{Bytecode, Instruction, OpCode};
use crate::semantic::Analysis;

/// Initializers closer to zero than this are left to the zero-filled slot.
const ZERO_TOLERANCE: f64 = 1e-9;

/// Errors raised while generating code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// A call argument that is not a bare variable.
    #[error("call requires simple variable arguments (in call to '{function}')")]
    NonVariableArgument {
        /// The callee
        function: String,
    },
    /// A variable with no address. Semantic analysis rules this out.
    #[error("no address for variable '{name}'")]
    UnresolvedVariable {
        /// The variable name
        name: String,
    },
}

/// Compiles AST to bytecode.
pub struct Compiler {
    /// The bytecode being generated
    pub bytecode: Bytecode,
    globals: ScopeTable<'static>,
    function_scopes: BTreeMap<String, ScopeTable<'static>>,
    function_entries: FxHashMap<String, usize>,
    globals_count: usize,
}

impl Compiler {
    /// Creates a compiler with empty scope tables.
    pub fn new() -> Self {
        Self::with_analysis(Analysis::default())
    }

    /// Creates a compiler that takes its addresses from a finished analysis.
    pub fn with_analysis(analysis: Analysis) -> Self {
        Self {
            bytecode: Bytecode::new(),
            globals: analysis.global,
            function_scopes: analysis.functions,
            function_entries: FxHashMap::default(),
            globals_count: 0,
        }
    }

    /// Returns the scope tables, with function entry addresses filled in.
    pub fn into_analysis(self) -> Analysis {
        Analysis {
            global: self.globals,
            functions: self.function_scopes,
        }
    }

    /// Returns the entry address recorded for a function.
    pub fn function_entry(&self, name: &str) -> Option<usize> {
        self.function_entries.get(name).copied()
    }

    // ========================================================================
    // Main Compilation Entry Point
    // ========================================================================

    /// Generates the bytecode for a whole program.
    pub fn generate(&mut self, program: &Program) -> Result<Bytecode, CodegenError> {
        self.emit(Instruction::simple(OpCode::Start));
        self.globals_count = program.body.variables().count();
        debug!(globals = self.globals_count, "code generation started");

        let mut globals = std::mem::take(&mut self.globals);
        let result = self.generate_body(&program.body, &mut globals);
        self.globals = globals;
        result?;

        self.emit(Instruction::simple(OpCode::Halt));
        debug!(instructions = self.bytecode.len(), "code generation finished");

        Ok(std::mem::take(&mut self.bytecode))
    }

    /// Generates a body and returns the number of slots it allocated.
    fn generate_body(
        &mut self,
        body: &Body,
        scope: &mut ScopeTable<'_>,
    ) -> Result<usize, CodegenError> {
        self.materialize_variables(body, scope);

        let mut slots = 0;
        for var in body.variables() {
            self.emit(Instruction::with_operand(OpCode::Alloc, 1.0));
            slots += 1;
            debug!(name = %var.name, "slot allocated");
        }

        let mut skips = Vec::new();
        for func in body.functions() {
            skips.push(self.generate_function(func, scope)?);
        }
        let after_functions = self.bytecode.current_address();
        for skip in skips {
            self.patch(skip, after_functions);
        }

        for var in body.variables() {
            match &var.initializer {
                None => {}
                Some(Expr::Number(n)) if n.abs() < ZERO_TOLERANCE => {}
                Some(init) => self.generate_assignment(&var.name, init, scope)?,
            }
        }

        self.generate_statements(&body.statements, scope)?;
        Ok(slots)
    }

    /// Registers the body's variables in `scope` so statements can resolve them.
    ///
    /// Function bodies reuse the addresses fixed by semantic analysis and
    /// only allocate fresh ones for names it never saw.
    fn materialize_variables(&self, body: &Body, scope: &mut ScopeTable<'_>) {
        for var in body.variables() {
            if scope.lookup_local(&var.name).is_some() {
                continue;
            }

            let fixed = if scope.is_global() {
                None
            } else {
                self.function_scopes
                    .get(scope.name())
                    .and_then(|table| table.lookup_local(&var.name))
                    .and_then(|symbol| symbol.address)
            };
            let address = match fixed {
                Some(address) => {
                    scope.reserve_through(address);
                    address
                }
                None => scope.allocate_address(),
            };

            // Re-registering a validated declaration is not an error here.
            let _ = scope.register(Symbol::variable(&var.name, scope.name(), address));
        }
    }

    /// Generates a function inline and returns the index of its skip jump.
    fn generate_function(
        &mut self,
        func: &FuncDecl,
        global: &mut ScopeTable<'_>,
    ) -> Result<usize, CodegenError> {
        let skip = self.emit(
            Instruction::with_operand(OpCode::Jump, 0.0).commented(format!("funcao {}", func.name)),
        );

        let entry = self.bytecode.current_address();
        self.function_entries.insert(func.name.clone(), entry);
        if let Some(symbol) = global.lookup_local_mut(&func.name) {
            symbol.entry_address = Some(entry);
        }
        debug!(name = %func.name, entry, "function entry");

        let mut local = ScopeTable::child(&func.name, &*global);
        for param in &func.params {
            let address = local.allocate_address();
            let _ = local.register(Symbol::parameter(param, &func.name, address));
        }

        let locals = self.generate_body(&func.body, &mut local)?;
        let slots = func.params.len() + locals;
        if slots > 0 {
            self.emit(Instruction::with_operand(OpCode::Dealloc, slots as f64));
        }
        self.emit(Instruction::simple(OpCode::Return));

        Ok(skip)
    }

    // ========================================================================
    // Statement Compilation
    // ========================================================================

    fn generate_statements(
        &mut self,
        statements: &[Statement],
        scope: &ScopeTable<'_>,
    ) -> Result<(), CodegenError> {
        for stmt in statements {
            self.generate_statement(stmt, scope)?;
        }
        Ok(())
    }

    fn generate_statement(
        &mut self,
        stmt: &Statement,
        scope: &ScopeTable<'_>,
    ) -> Result<(), CodegenError> {
        match stmt {
            Statement::Echo(expr) => {
                self.generate_expr(expr, scope)?;
                self.emit(Instruction::simple(OpCode::Print));
            }
            Statement::Assign(assign) => {
                self.generate_assignment(&assign.name, &assign.expr, scope)?;
            }
            Statement::If(if_stmt) => self.generate_if(if_stmt, scope)?,
            Statement::While(while_stmt) => self.generate_while(while_stmt, scope)?,
            Statement::Call(call) => self.generate_call(call, scope)?,
        }
        Ok(())
    }

    fn generate_if(&mut self, if_stmt: &IfStatement, scope: &ScopeTable<'_>) -> Result<(), CodegenError> {
        self.generate_expr(&if_stmt.condition.expr, scope)?;
        let else_jump = self.emit(Instruction::with_operand(OpCode::JumpIfFalse, 0.0));

        self.generate_statements(&if_stmt.then_body, scope)?;

        match &if_stmt.else_body {
            Some(else_body) => {
                let end_jump = self.emit(Instruction::with_operand(OpCode::Jump, 0.0));
                self.patch_here(else_jump);
                self.generate_statements(else_body, scope)?;
                self.patch_here(end_jump);
            }
            None => self.patch_here(else_jump),
        }
        Ok(())
    }

    fn generate_while(
        &mut self,
        while_stmt: &WhileStatement,
        scope: &ScopeTable<'_>,
    ) -> Result<(), CodegenError> {
        let loop_start = self.bytecode.current_address();
        self.generate_expr(&while_stmt.condition.expr, scope)?;
        let exit_jump = self.emit(Instruction::with_operand(OpCode::JumpIfFalse, 0.0));

        self.generate_statements(&while_stmt.body, scope)?;

        self.emit(Instruction::with_operand(OpCode::Jump, loop_start as f64));
        self.patch_here(exit_jump);
        Ok(())
    }

    fn generate_assignment(
        &mut self,
        name: &str,
        expr: &Expr,
        scope: &ScopeTable<'_>,
    ) -> Result<(), CodegenError> {
        match expr {
            Expr::Read => {
                self.emit(Instruction::simple(OpCode::Read).commented(name));
            }
            _ => self.generate_expr(expr, scope)?,
        }
        let address = self.resolve(name, scope)?;
        self.emit(Instruction::with_operand(OpCode::Store, address as f64));
        Ok(())
    }

    /// Emits the call protocol: return slot, parameters, jump to the entry.
    fn generate_call(&mut self, call: &Call, scope: &ScopeTable<'_>) -> Result<(), CodegenError> {
        let return_slot = self.emit(Instruction::with_operand(OpCode::PushReturn, 0.0));

        for arg in &call.args {
            let Expr::Var(name) = arg else {
                return Err(CodegenError::NonVariableArgument {
                    function: call.name.clone(),
                });
            };
            let address = self.resolve(name, scope)?;
            self.emit(Instruction::with_operand(OpCode::PushParam, address as f64));
        }

        let entry = self
            .function_entries
            .get(&call.name)
            .copied()
            .or_else(|| scope.lookup(&call.name).and_then(|symbol| symbol.entry_address))
            .unwrap_or(0);
        self.emit(Instruction::with_operand(OpCode::Call, entry as f64));
        self.patch_here(return_slot);
        Ok(())
    }

    // ========================================================================
    // Expression Compilation
    // ========================================================================

    fn generate_expr(&mut self, expr: &Expr, scope: &ScopeTable<'_>) -> Result<(), CodegenError> {
        match expr {
            Expr::Number(n) => {
                self.emit(Instruction::with_operand(OpCode::Const, *n));
            }
            Expr::Var(name) => {
                let address = self.resolve(name, scope)?;
                self.emit(Instruction::with_operand(OpCode::Load, address as f64));
            }
            Expr::Read => {
                self.emit(Instruction::simple(OpCode::Read));
            }
            Expr::Unary(op, operand) => {
                self.generate_expr(operand, scope)?;
                let opcode = match op {
                    UnaryOp::Neg => OpCode::Neg,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit(Instruction::simple(opcode));
            }
            Expr::Binary(op, left, right) => {
                self.generate_expr(left, scope)?;
                self.generate_expr(right, scope)?;
                self.emit(Instruction::simple(binary_opcode(*op)));
            }
            Expr::Call(call) => {
                self.generate_call(call, scope)?;
                // Functions return nothing; the call's value is 0.
                self.emit(Instruction::with_operand(OpCode::Const, 0.0));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Utilities
    // ========================================================================

    fn resolve(&self, name: &str, scope: &ScopeTable<'_>) -> Result<usize, CodegenError> {
        scope
            .lookup(name)
            .and_then(|symbol| symbol.absolute_address(self.globals_count))
            .ok_or_else(|| CodegenError::UnresolvedVariable {
                name: name.to_string(),
            })
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        debug!(address = self.bytecode.current_address(), %instruction, "emit");
        self.bytecode.emit(instruction)
    }

    /// Points the placeholder at `index` to the next instruction address.
    fn patch_here(&mut self, index: usize) {
        let target = self.bytecode.current_address();
        self.patch(index, target);
    }

    fn patch(&mut self, index: usize, target: usize) {
        if let Some(instruction) = self.bytecode.instructions.get_mut(index) {
            instruction.operand = Some(target as f64);
        }
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn binary_opcode(op: BinaryOp) -> OpCode {
    match op {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Sub => OpCode::Sub,
        BinaryOp::Mul => OpCode::Mul,
        BinaryOp::Div => OpCode::Div,
        BinaryOp::Eq => OpCode::Eq,
        BinaryOp::Ne => OpCode::Ne,
        BinaryOp::Ge => OpCode::Ge,
        BinaryOp::Le => OpCode::Le,
        BinaryOp::Gt => OpCode::Gt,
        BinaryOp::Lt => OpCode::Lt,
        BinaryOp::And => OpCode::And,
        BinaryOp::Or => OpCode::Or,
    }
}
