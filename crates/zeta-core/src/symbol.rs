//! Symbol table: lexical scoping and free-variable resolution.
//!
//! Scopes form a chain of tables, innermost first, each owning its parent.
//! Resolution walks outward; a hit on a Local (or already-Free) symbol in
//! an enclosing scope is promoted to a Free symbol in every intermediate
//! scope on the way back in, which is what makes transitive capture across
//! several nesting levels come out right: each scope records the symbol it
//! must load from *its* enclosing scope, and hands the inner scope a Free
//! symbol indexed into its own capture list.

use std::collections::HashMap;

/// Where a resolved name lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// The enclosing function itself, for recursive self-reference.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    /// Count of locals defined here; doubles as the next slot index.
    pub num_definitions: usize,
    /// Symbols this scope captures from its enclosing scope, in capture
    /// order. The position of a symbol here is the `OpGetFree` index.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    /// A fresh scope nested inside `outer`.
    pub fn enclosed(outer: SymbolTable) -> Self {
        SymbolTable {
            outer: Some(Box::new(outer)),
            ..SymbolTable::default()
        }
    }

    /// Tear down this scope, returning its parent.
    pub fn into_outer(self) -> Option<SymbolTable> {
        self.outer.map(|outer| *outer)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Bind `name` in this scope. Global at the outermost table, Local
    /// otherwise; the slot index is the definition count before increment.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.store.insert(name.to_string(), symbol.clone());
        self.num_definitions += 1;
        symbol
    }

    /// Bind a builtin at registry index `index`. Only used on the
    /// outermost table.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind the enclosing function's own name, so its body can refer to
    /// itself without capturing a not-yet-existing closure.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Walk outward looking for `name`. Hits on Global, Builtin, or
    /// Function scope pass through unchanged; hits on Local or Free in an
    /// enclosing scope are re-registered here as Free.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer = self.outer.as_mut()?;
        let symbol = outer.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin | SymbolScope::Function => Some(symbol),
            SymbolScope::Local | SymbolScope::Free => Some(self.define_free(symbol)),
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(original.name, symbol.clone());
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(name: &str, scope: SymbolScope, index: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            scope,
            index,
        }
    }

    #[test]
    fn test_define_global_then_local() {
        let mut global = SymbolTable::new();
        assert_eq!(global.define("a"), symbol("a", SymbolScope::Global, 0));
        assert_eq!(global.define("b"), symbol("b", SymbolScope::Global, 1));

        let mut local = SymbolTable::enclosed(global);
        assert_eq!(local.define("c"), symbol("c", SymbolScope::Local, 0));
        assert_eq!(local.define("d"), symbol("d", SymbolScope::Local, 1));
    }

    #[test]
    fn test_resolve_global_from_nested_scope() {
        let mut global = SymbolTable::new();
        global.define("a");

        let inner = SymbolTable::enclosed(global);
        let mut innermost = SymbolTable::enclosed(inner);
        assert_eq!(
            innermost.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
    }

    #[test]
    fn test_resolve_free_promotes_through_intermediate_scopes() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first = SymbolTable::enclosed(global);
        first.define("c");

        let mut second = SymbolTable::enclosed(first);
        second.define("e");
        second.define("f");

        // Globals pass through untouched.
        assert_eq!(
            second.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
        // A local of the enclosing function becomes Free here.
        assert_eq!(second.resolve("c"), Some(symbol("c", SymbolScope::Free, 0)));
        // Own locals stay Local.
        assert_eq!(second.resolve("e"), Some(symbol("e", SymbolScope::Local, 0)));
        assert_eq!(second.resolve("f"), Some(symbol("f", SymbolScope::Local, 1)));

        // The free list records the original (Local) symbol.
        assert_eq!(second.free_symbols.len(), 1);
        assert_eq!(
            second.free_symbols[0],
            symbol("c", SymbolScope::Local, 0)
        );
    }

    #[test]
    fn test_transitive_capture_registers_in_every_scope() {
        let mut global = SymbolTable::new();
        global.define("a");

        let mut first = SymbolTable::enclosed(global);
        first.define("b");

        let mut second = SymbolTable::enclosed(first);
        // `b` is two levels up: it must become Free in the middle scope
        // and Free (over the middle scope's capture) in here.
        assert_eq!(second.resolve("b"), Some(symbol("b", SymbolScope::Free, 0)));

        let middle = second.into_outer().unwrap();
        assert_eq!(middle.free_symbols.len(), 1);
        assert_eq!(middle.free_symbols[0].scope, SymbolScope::Local);
    }

    #[test]
    fn test_resolve_unresolvable_free_is_none() {
        let mut global = SymbolTable::new();
        global.define("a");
        let mut local = SymbolTable::enclosed(global);
        assert_eq!(local.resolve("missing"), None);
    }

    #[test]
    fn test_define_and_resolve_function_name() {
        let mut global = SymbolTable::new();
        global.define_function_name("a");
        assert_eq!(
            global.resolve("a"),
            Some(symbol("a", SymbolScope::Function, 0))
        );
    }

    #[test]
    fn test_shadowing_function_name() {
        let mut global = SymbolTable::new();
        global.define_function_name("a");
        global.define("a");
        assert_eq!(
            global.resolve("a"),
            Some(symbol("a", SymbolScope::Global, 0))
        );
    }

    #[test]
    fn test_define_builtin_resolves_at_every_depth() {
        let mut global = SymbolTable::new();
        global.define_builtin(0, "len");
        let mut nested = SymbolTable::enclosed(SymbolTable::enclosed(global));
        assert_eq!(
            nested.resolve("len"),
            Some(symbol("len", SymbolScope::Builtin, 0))
        );
    }
}
