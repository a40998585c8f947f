//! The semantic analyzer.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Analysis, SemanticError};
use crate::Error;
use crate::ast::*;
use crate::compiler::{ScopeError, ScopeTable, Symbol, SymbolKind};

/// Runs semantic analysis over a program.
pub fn analyze(program: &Program) -> Result<Analysis, Error> {
    Analyzer::new().analyze(program).map_err(Error::Semantic)
}

/// Walks the AST, filling scope tables and collecting errors.
#[derive(Debug, Default)]
pub struct Analyzer {
    errors: Vec<SemanticError>,
    functions: BTreeMap<String, ScopeTable<'static>>,
}

impl Analyzer {
    /// Creates a new analyzer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes a program, returning its tables or every error found.
    pub fn analyze(mut self, program: &Program) -> Result<Analysis, Vec<SemanticError>> {
        debug!("semantic analysis started");
        let mut global = ScopeTable::global();

        for decl in &program.body.declarations {
            match decl {
                Declaration::Var(var) => self.analyze_var_decl(var, &mut global),
                Declaration::Function(func) => self.analyze_function(func, &mut global),
            }
        }
        self.analyze_statements(&program.body.statements, &global);

        if !self.errors.is_empty() {
            debug!(count = self.errors.len(), "semantic analysis failed");
            return Err(self.errors);
        }

        debug!("semantic analysis finished");
        Ok(Analysis {
            global,
            functions: self.functions,
        })
    }

    fn analyze_var_decl(&mut self, var: &VarDecl, scope: &mut ScopeTable<'_>) {
        if scope.lookup_local(&var.name).is_some() {
            self.errors.push(SemanticError::DuplicateVariable {
                name: var.name.clone(),
                scope: scope.name().to_string(),
            });
            return;
        }

        let address = scope.allocate_address();
        debug!(name = %var.name, scope = scope.name(), address, "variable declared");
        let symbol = Symbol::variable(&var.name, scope.name(), address);
        if let Err(err) = scope.register(symbol) {
            self.push_scope_error(err, scope.name());
        }

        // The variable is already visible inside its own initializer.
        if let Some(init) = &var.initializer {
            self.analyze_expr(init, scope);
        }
    }

    fn analyze_function(&mut self, func: &FuncDecl, global: &mut ScopeTable<'static>) {
        if global.lookup_local(&func.name).is_some() {
            self.errors.push(SemanticError::DuplicateFunction {
                name: func.name.clone(),
            });
            return;
        }

        debug!(name = %func.name, params = ?func.params, "function declared");
        if let Err(err) = global.register(Symbol::function(&func.name, func.params.clone())) {
            self.push_scope_error(err, global.name());
        }

        let mut table = ScopeTable::child(&func.name, &*global);
        for param in &func.params {
            let address = table.allocate_address();
            debug!(name = %param, function = %func.name, address, "parameter declared");
            if let Err(err) = table.register(Symbol::parameter(param, &func.name, address)) {
                self.push_scope_error(err, &func.name);
            }
        }

        for decl in &func.body.declarations {
            match decl {
                Declaration::Var(var) => self.analyze_var_decl(var, &mut table),
                Declaration::Function(nested) => {
                    self.errors.push(SemanticError::NestedFunction {
                        name: nested.name.clone(),
                    });
                }
            }
        }
        self.analyze_statements(&func.body.statements, &table);

        let table = table.detach();
        let slots = table.next_free_address();
        debug!(name = %func.name, slots, "function scope closed");
        if let Some(symbol) = global.lookup_local_mut(&func.name) {
            symbol.local_slot_count = slots;
        }
        self.functions.insert(func.name.clone(), table);
    }

    fn analyze_statements(&mut self, statements: &[Statement], scope: &ScopeTable<'_>) {
        for stmt in statements {
            self.analyze_statement(stmt, scope);
        }
    }

    fn analyze_statement(&mut self, stmt: &Statement, scope: &ScopeTable<'_>) {
        match stmt {
            Statement::Echo(expr) => self.analyze_expr(expr, scope),
            Statement::Assign(assign) => {
                self.check_variable(&assign.name, scope);
                self.analyze_expr(&assign.expr, scope);
            }
            Statement::If(if_stmt) => {
                self.analyze_expr(&if_stmt.condition.expr, scope);
                self.analyze_statements(&if_stmt.then_body, scope);
                if let Some(else_body) = &if_stmt.else_body {
                    self.analyze_statements(else_body, scope);
                }
            }
            Statement::While(while_stmt) => {
                self.analyze_expr(&while_stmt.condition.expr, scope);
                self.analyze_statements(&while_stmt.body, scope);
            }
            Statement::Call(call) => self.analyze_call(call, scope),
        }
    }

    fn analyze_expr(&mut self, expr: &Expr, scope: &ScopeTable<'_>) {
        match expr {
            Expr::Number(_) | Expr::Read => {}
            Expr::Var(name) => self.check_variable(name, scope),
            Expr::Unary(_, operand) => self.analyze_expr(operand, scope),
            Expr::Binary(_, left, right) => {
                self.analyze_expr(left, scope);
                self.analyze_expr(right, scope);
            }
            Expr::Call(call) => self.analyze_call(call, scope),
        }
    }

    fn analyze_call(&mut self, call: &Call, scope: &ScopeTable<'_>) {
        match scope.lookup(&call.name) {
            None => {
                self.errors.push(SemanticError::UndeclaredFunction {
                    name: call.name.clone(),
                });
                return;
            }
            Some(symbol) if symbol.kind != SymbolKind::Function => {
                self.errors.push(SemanticError::NotAFunction {
                    name: call.name.clone(),
                });
                return;
            }
            Some(symbol) if symbol.parameters.len() != call.args.len() => {
                self.errors.push(SemanticError::ArgumentCount {
                    function: call.name.clone(),
                    expected: symbol.parameters.len(),
                    found: call.args.len(),
                });
            }
            Some(_) => {}
        }

        for arg in &call.args {
            self.analyze_expr(arg, scope);
        }
    }

    fn check_variable(&mut self, name: &str, scope: &ScopeTable<'_>) {
        match scope.lookup(name) {
            None => self.errors.push(SemanticError::UndeclaredVariable {
                name: name.to_string(),
            }),
            Some(symbol) if symbol.is_function() => {
                self.errors.push(SemanticError::FunctionUsedAsVariable {
                    name: name.to_string(),
                })
            }
            Some(_) => {}
        }
    }

    fn push_scope_error(&mut self, err: ScopeError, scope: &str) {
        let ScopeError::DuplicateSymbol { name } = err;
        self.errors.push(SemanticError::DuplicateSymbol {
            name,
            scope: scope.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn analyze_ok(src: &str) -> Analysis {
        analyze(&parse(src).unwrap()).unwrap()
    }

    fn analyze_err(src: &str) -> Vec<SemanticError> {
        let program = parse(src).unwrap();
        Analyzer::new().analyze(&program).unwrap_err()
    }

    #[test]
    fn test_global_addresses() {
        let analysis = analyze_ok("<?php $x = 5; $y = 3; $z; ?>");
        let addresses: Vec<_> = ["$x", "$y", "$z"]
            .iter()
            .map(|name| analysis.global.lookup(name).and_then(|s| s.address))
            .collect();
        assert_eq!(addresses, vec![Some(0), Some(1), Some(2)]);
        assert_eq!(analysis.global.next_free_address(), 3);
    }

    #[test]
    fn test_function_scope() {
        let analysis = analyze_ok(
            "<?php $g; function f($a, $b) { $l; $m = $a; echo $l + $g . PHP_EOL; } ?>",
        );
        let func = analysis.global.lookup("f").unwrap();
        assert_eq!(func.kind, SymbolKind::Function);
        assert_eq!(func.address, None);
        assert_eq!(func.local_slot_count, 4);

        let table = analysis.function_scope("f").unwrap();
        assert_eq!(table.lookup("$a").and_then(|s| s.address), Some(0));
        assert_eq!(table.lookup("$b").and_then(|s| s.address), Some(1));
        assert_eq!(table.lookup("$l").and_then(|s| s.address), Some(2));
        assert_eq!(table.lookup("$m").map(|s| s.scope_name.as_str()), Some("f"));
        // Detached tables no longer see globals
        assert!(table.lookup("$g").is_none());
    }

    #[test]
    fn test_undeclared_variable() {
        let errors = analyze_err("<?php $x = 1; echo $y . PHP_EOL; ?>");
        assert_eq!(
            errors,
            vec![SemanticError::UndeclaredVariable { name: "$y".into() }]
        );
    }

    #[test]
    fn test_function_locals_not_visible_globally() {
        let errors = analyze_err("<?php function f() { $l = 1; } echo $l . PHP_EOL; ?>");
        assert_eq!(
            errors,
            vec![SemanticError::UndeclaredVariable { name: "$l".into() }]
        );
    }

    #[test]
    fn test_duplicate_function() {
        let errors = analyze_err("<?php function f() { } function f() { } ?>");
        assert_eq!(errors, vec![SemanticError::DuplicateFunction { name: "f".into() }]);
    }

    #[test]
    fn test_duplicate_parameter() {
        let errors = analyze_err("<?php function f($a, $a) { } ?>");
        assert_eq!(
            errors,
            vec![SemanticError::DuplicateSymbol {
                name: "$a".into(),
                scope: "f".into(),
            }]
        );
    }

    #[test]
    fn test_local_redeclares_parameter() {
        let errors = analyze_err("<?php function f($a) { $a = 1; } ?>");
        assert_eq!(
            errors,
            vec![SemanticError::DuplicateVariable {
                name: "$a".into(),
                scope: "f".into(),
            }]
        );
    }

    #[test]
    fn test_call_checks() {
        let errors = analyze_err(
            "<?php $v; function f($a) { } g(); f(); f($v, $v); f($w); ?>",
        );
        assert_eq!(
            errors,
            vec![
                SemanticError::UndeclaredFunction { name: "g".into() },
                SemanticError::ArgumentCount { function: "f".into(), expected: 1, found: 0 },
                SemanticError::ArgumentCount { function: "f".into(), expected: 1, found: 2 },
                SemanticError::UndeclaredVariable { name: "$w".into() },
            ]
        );
    }

    #[test]
    fn test_errors_are_collected() {
        let errors = analyze_err("<?php $x = $a + $b; ?>");
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_calls_inside_functions_resolve_globally() {
        let analysis = analyze_ok(
            "<?php $p; function f($a) { echo $a . PHP_EOL; } function g($b) { f($b); } g($p); ?>",
        );
        assert_eq!(analysis.functions.len(), 2);
    }

    #[test]
    fn test_nested_function_in_hand_built_ast() {
        let program = Program {
            body: Body {
                declarations: vec![Declaration::Function(FuncDecl {
                    name: "outer".into(),
                    params: vec![],
                    body: Body {
                        declarations: vec![Declaration::Function(FuncDecl {
                            name: "inner".into(),
                            params: vec![],
                            body: Body::default(),
                        })],
                        statements: vec![],
                    },
                })],
                statements: vec![],
            },
        };
        let errors = Analyzer::new().analyze(&program).unwrap_err();
        assert_eq!(errors, vec![SemanticError::NestedFunction { name: "inner".into() }]);
    }

    #[test]
    fn test_analyze_wraps_errors() {
        let program = parse("<?php echo $q . PHP_EOL; ?>").unwrap();
        assert!(matches!(analyze(&program), Err(Error::Semantic(errors)) if errors.len() == 1));
    }
}
