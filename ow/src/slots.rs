use ahash::AHashMap;

use crate::{ObjRef, Value, Visitable, Visitor};

/// Insertion ordered table keyed by interned symbols.
///
/// Entries are addressed by a stable position, so callers can resolve a name once and reuse
/// the position afterwards. Entries are never removed.
#[derive(Debug, Clone)]
pub struct SlotTable<V> {
    names: Vec<ObjRef>,
    values: Vec<V>,
    positions: AHashMap<ObjRef, usize>,
}

impl<V> Default for SlotTable<V> {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            values: Vec::new(),
            positions: AHashMap::new(),
        }
    }
}

impl<V> SlotTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn position(&self, name: ObjRef) -> Option<usize> {
        self.positions.get(&name).copied()
    }

    #[inline]
    pub fn get(&self, position: usize) -> Option<&V> {
        self.values.get(position)
    }

    pub fn lookup(&self, name: ObjRef) -> Option<&V> {
        self.position(name).and_then(|position| self.values.get(position))
    }

    /// Overwrites the value at `position`, false when the position does not exist.
    pub fn set(&mut self, position: usize, value: V) -> bool {
        match self.values.get_mut(position) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Binds `name`, reusing its position when it is already present.
    pub fn insert(&mut self, name: ObjRef, value: V) -> usize {
        if let Some(position) = self.position(name) {
            self.values[position] = value;
            return position;
        }
        let position = self.names.len();
        self.names.push(name);
        self.values.push(value);
        self.positions.insert(name, position);
        position
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &V)> {
        self.names.iter().copied().zip(self.values.iter())
    }
}

impl Visitable for SlotTable<Value> {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        for (name, value) in self.iter() {
            visitor.visit_object(name);
            visitor.visit(*value);
        }
    }
}
