use std::sync::Arc;

use ahash::AHashMap;

use crate::ObjRef;

/// Weak name -> symbol object table.
///
/// The table does not keep symbols alive. After every collection the machine calls
/// [`Interner::retain`] with the heap's liveness so dead symbols drop out and the name can be
/// interned again later.
#[derive(Debug, Default)]
pub struct Interner {
    symbols: AHashMap<Arc<str>, ObjRef>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<ObjRef> {
        self.symbols.get(name).copied()
    }

    pub fn insert(&mut self, name: Arc<str>, symbol: ObjRef) {
        self.symbols.insert(name, symbol);
    }

    pub fn retain(&mut self, mut is_live: impl FnMut(ObjRef) -> bool) -> usize {
        let before = self.symbols.len();
        self.symbols.retain(|_, symbol| is_live(*symbol));
        before - self.symbols.len()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retain_drops_dead_symbols() {
        let mut interner = Interner::new();
        interner.insert("live".into(), ObjRef::new(1));
        interner.insert("dead".into(), ObjRef::new(2));
        let dropped = interner.retain(|symbol| symbol == ObjRef::new(1));
        assert_eq!(dropped, 1);
        assert_eq!(interner.get("live"), Some(ObjRef::new(1)));
        assert_eq!(interner.get("dead"), None);
    }
}
