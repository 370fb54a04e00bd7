use std::sync::Arc;

use crate::{Machine, ObjRef, ObjectBody, Value};

#[derive(Debug, Clone)]
pub struct SymbolObj {
    pub(crate) name: Arc<str>,
}

#[derive(Debug, Clone)]
pub struct StringObj {
    pub(crate) data: String,
}

impl SymbolObj {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl StringObj {
    pub fn as_str(&self) -> &str {
        &self.data
    }
}

impl Machine {
    /// Returns the one symbol object for `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> ObjRef {
        if let Some(symbol) = self.interner.get(name) {
            return symbol;
        }
        let name: Arc<str> = Arc::from(name);
        let class = self.classes.symbol;
        let symbol = self.allocate(
            class,
            ObjectBody::Symbol(SymbolObj {
                name: Arc::clone(&name),
            }),
        );
        self.interner.insert(name, symbol);
        symbol
    }

    /// Text of a symbol, empty for anything else.
    pub fn symbol_text(&self, symbol: ObjRef) -> &str {
        match self.heap.try_get(symbol).map(|object| &object.body) {
            Some(ObjectBody::Symbol(symbol)) => symbol.as_str(),
            _ => "",
        }
    }

    pub fn as_symbol(&self, value: Value) -> Option<ObjRef> {
        let object = value.as_object()?;
        matches!(self.heap.get(object).body, ObjectBody::Symbol(_)).then_some(object)
    }

    pub fn new_string(&mut self, data: impl Into<String>) -> ObjRef {
        let class = self.classes.string;
        self.allocate(class, ObjectBody::String(StringObj { data: data.into() }))
    }

    /// Text of a string or symbol value.
    pub fn text_of(&self, value: Value) -> Option<&str> {
        let object = value.as_object()?;
        match &self.heap.get(object).body {
            ObjectBody::String(string) => Some(string.as_str()),
            ObjectBody::Symbol(symbol) => Some(symbol.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Machine;

    #[test]
    fn interning_returns_identical_symbols() {
        let mut machine = Machine::new();
        let a = machine.intern("hello");
        let b = machine.intern("hello");
        let c = machine.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(machine.symbol_text(a), "hello");
    }

    #[test]
    fn dead_symbols_leave_the_table() {
        let mut machine = Machine::new();
        let first = machine.intern("ephemeral_name");
        machine.collect_garbage();
        assert!(!machine.heap().contains(first));
        let again = machine.intern("ephemeral_name");
        assert_eq!(machine.symbol_text(again), "ephemeral_name");
    }
}
