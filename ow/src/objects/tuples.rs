use crate::{Machine, ObjRef, ObjectBody, Value, Visitable, Visitor};

/// Fixed size, immutable sequence.
#[derive(Debug, Clone)]
pub struct TupleObj {
    pub(crate) items: Box<[Value]>,
}

impl TupleObj {
    pub fn items(&self) -> &[Value] {
        &self.items
    }
}

impl Visitable for TupleObj {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.items.visit_edges(visitor);
    }
}

impl Machine {
    /// `items` must be reachable by the collector until this returns.
    pub fn new_tuple(&mut self, items: Vec<Value>) -> ObjRef {
        let class = self.classes.tuple;
        self.allocate(
            class,
            ObjectBody::Tuple(TupleObj {
                items: items.into_boxed_slice(),
            }),
        )
    }

    pub fn tuple_items(&self, value: Value) -> Option<&[Value]> {
        match &self.heap.get(value.as_object()?).body {
            ObjectBody::Tuple(tuple) => Some(tuple.items()),
            _ => None,
        }
    }
}
