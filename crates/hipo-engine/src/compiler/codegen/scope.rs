//! Scope tables for name resolution and slot allocation.
//!
//! A `ScopeTable` maps names to symbols for one lexical scope and hands out
//! slot addresses in increasing order. Function tables borrow the global
//! table as their parent, so lookups fall back to globals.

use rustc_hash::FxHashMap;
use thiserror::Error;

/// Name of the top-level scope.
pub const GLOBAL_SCOPE: &str = "global";

/// Error raised when registering a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// A symbol with the same name already exists in the table.
    #[error("duplicate symbol '{name}'")]
    DuplicateSymbol {
        /// The repeated name
        name: String,
    },
}

/// What a symbol names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// A declared variable
    Variable,
    /// A function parameter
    Parameter,
    /// A user-defined function
    Function,
}

impl SymbolKind {
    /// Returns a lowercase label for dumps.
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Function => "function",
        }
    }
}

/// An entry in a scope table.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    /// The name as written in source
    pub name: String,
    /// What the name refers to
    pub kind: SymbolKind,
    /// Name of the table that owns the symbol
    pub scope_name: String,
    /// Slot address within the owning scope (None for functions)
    pub address: Option<usize>,
    /// Parameter names (functions only)
    pub parameters: Vec<String>,
    /// Parameters plus locals (functions only)
    pub local_slot_count: usize,
    /// Address of the first body instruction (functions only, set by codegen)
    pub entry_address: Option<usize>,
}

impl Symbol {
    /// Creates a variable symbol.
    pub fn variable(name: impl Into<String>, scope_name: impl Into<String>, address: usize) -> Self {
        Self::slot(name.into(), SymbolKind::Variable, scope_name.into(), address)
    }

    /// Creates a parameter symbol.
    pub fn parameter(name: impl Into<String>, scope_name: impl Into<String>, address: usize) -> Self {
        Self::slot(name.into(), SymbolKind::Parameter, scope_name.into(), address)
    }

    /// Creates a function symbol. Functions always live in the global scope.
    pub fn function(name: impl Into<String>, parameters: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: SymbolKind::Function,
            scope_name: GLOBAL_SCOPE.to_string(),
            address: None,
            parameters,
            local_slot_count: 0,
            entry_address: None,
        }
    }

    fn slot(name: String, kind: SymbolKind, scope_name: String, address: usize) -> Self {
        Self {
            name,
            kind,
            scope_name,
            address: Some(address),
            parameters: Vec::new(),
            local_slot_count: 0,
            entry_address: None,
        }
    }

    /// Returns true if this symbol names a function.
    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    /// Resolves the runtime address of this symbol.
    ///
    /// Globals occupy `[0, globals_count)`; everything else sits directly
    /// above them at `globals_count + address`.
    pub fn absolute_address(&self, globals_count: usize) -> Option<usize> {
        let address = self.address?;
        if self.scope_name == GLOBAL_SCOPE {
            Some(address)
        } else {
            Some(globals_count + address)
        }
    }
}

/// A symbol table for one lexical scope.
#[derive(Debug, Clone)]
pub struct ScopeTable<'p> {
    name: String,
    parent: Option<&'p ScopeTable<'p>>,
    symbols: FxHashMap<String, Symbol>,
    next_free_address: usize,
}

impl<'p> ScopeTable<'p> {
    /// Creates a root table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            symbols: FxHashMap::default(),
            next_free_address: 0,
        }
    }

    /// Creates the global table.
    pub fn global() -> Self {
        Self::new(GLOBAL_SCOPE)
    }

    /// Creates a table whose lookups fall back to `parent`.
    pub fn child(name: impl Into<String>, parent: &'p ScopeTable<'p>) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(name)
        }
    }

    /// Returns the table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if this is the global table.
    pub fn is_global(&self) -> bool {
        self.name == GLOBAL_SCOPE
    }

    /// Returns the next address `allocate_address` would hand out.
    pub fn next_free_address(&self) -> usize {
        self.next_free_address
    }

    /// Hands out the next slot address. Addresses are never reused.
    pub fn allocate_address(&mut self) -> usize {
        let address = self.next_free_address;
        self.next_free_address += 1;
        address
    }

    /// Makes sure future allocations land above `address`.
    pub fn reserve_through(&mut self, address: usize) {
        self.next_free_address = self.next_free_address.max(address + 1);
    }

    /// Adds a symbol to this table.
    pub fn register(&mut self, symbol: Symbol) -> Result<(), ScopeError> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(ScopeError::DuplicateSymbol { name: symbol.name });
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Looks a name up here, then in each parent in turn.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols
            .get(name)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(name)))
    }

    /// Looks a name up in this table only.
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Mutable lookup in this table only.
    pub fn lookup_local_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        self.symbols.get_mut(name)
    }

    /// Returns the symbols of this table sorted by name.
    pub fn sorted_symbols(&self) -> Vec<&Symbol> {
        let mut symbols: Vec<_> = self.symbols.values().collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));
        symbols
    }

    /// Drops the parent link so the table can outlive it.
    pub fn detach(self) -> ScopeTable<'static> {
        ScopeTable {
            name: self.name,
            parent: None,
            symbols: self.symbols,
            next_free_address: self.next_free_address,
        }
    }
}

impl Default for ScopeTable<'_> {
    fn default() -> Self {
        Self::global()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_monotonic() {
        let mut table = ScopeTable::global();
        assert_eq!(table.allocate_address(), 0);
        assert_eq!(table.allocate_address(), 1);
        assert_eq!(table.next_free_address(), 2);
    }

    #[test]
    fn test_reserve_through() {
        let mut table = ScopeTable::new("f");
        table.reserve_through(4);
        assert_eq!(table.allocate_address(), 5);
        table.reserve_through(1);
        assert_eq!(table.allocate_address(), 6);
    }

    #[test]
    fn test_register_duplicate() {
        let mut table = ScopeTable::global();
        table.register(Symbol::variable("$x", GLOBAL_SCOPE, 0)).unwrap();
        let err = table.register(Symbol::variable("$x", GLOBAL_SCOPE, 1)).unwrap_err();
        assert_eq!(err, ScopeError::DuplicateSymbol { name: "$x".into() });
        assert_eq!(err.to_string(), "duplicate symbol '$x'");
    }

    #[test]
    fn test_lookup_walks_parents() {
        let mut global = ScopeTable::global();
        global.register(Symbol::variable("$g", GLOBAL_SCOPE, 0)).unwrap();
        global.register(Symbol::function("f", vec!["$a".into()])).unwrap();

        let mut local = ScopeTable::child("f", &global);
        local.register(Symbol::parameter("$a", "f", 0)).unwrap();

        assert_eq!(local.lookup("$a").map(|s| s.kind), Some(SymbolKind::Parameter));
        assert_eq!(local.lookup("$g").map(|s| s.kind), Some(SymbolKind::Variable));
        assert!(local.lookup_local("$g").is_none());
        assert!(global.lookup("$a").is_none());
    }

    #[test]
    fn test_local_shadows_parent() {
        let mut global = ScopeTable::global();
        global.register(Symbol::variable("$x", GLOBAL_SCOPE, 0)).unwrap();
        let mut local = ScopeTable::child("f", &global);
        local.register(Symbol::variable("$x", "f", 3)).unwrap();
        assert_eq!(local.lookup("$x").and_then(|s| s.address), Some(3));
    }

    #[test]
    fn test_absolute_address() {
        let global = Symbol::variable("$x", GLOBAL_SCOPE, 1);
        let local = Symbol::variable("$y", "soma", 1);
        let func = Symbol::function("soma", vec![]);
        assert_eq!(global.absolute_address(3), Some(1));
        assert_eq!(local.absolute_address(3), Some(4));
        assert_eq!(func.absolute_address(3), None);
    }

    #[test]
    fn test_detach_keeps_symbols() {
        let global = ScopeTable::global();
        let mut local = ScopeTable::child("f", &global);
        let address = local.allocate_address();
        local.register(Symbol::variable("$v", "f", address)).unwrap();
        let detached = local.detach();
        assert_eq!(detached.name(), "f");
        assert_eq!(detached.next_free_address(), 1);
        assert!(detached.lookup("$v").is_some());
    }

    #[test]
    fn test_sorted_symbols() {
        let mut table = ScopeTable::global();
        table.register(Symbol::variable("$b", GLOBAL_SCOPE, 0)).unwrap();
        table.register(Symbol::variable("$a", GLOBAL_SCOPE, 1)).unwrap();
        let names: Vec<_> = table.sorted_symbols().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["$a", "$b"]);
    }
}
