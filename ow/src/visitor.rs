use crate::{ObjRef, Value};

/// Receives every outgoing edge of an object during marking.
pub trait Visitor {
    fn visit(&mut self, value: Value);

    fn visit_object(&mut self, object: ObjRef) {
        self.visit(Value::from_object(object));
    }
}

impl<F: FnMut(Value)> Visitor for F {
    #[inline]
    fn visit(&mut self, value: Value) {
        self(value)
    }
}

// visiting an object means we visit only its direct edges.
// heap objects dispatch on their body, the bodies call visitor.visit() on what they hold.
pub trait Visitable {
    fn visit_edges(&self, visitor: &mut dyn Visitor);
}

/// Everything the collector must treat as live without it being reachable from another object.
pub trait RootProvider {
    fn visit_roots(&self, visitor: &mut dyn Visitor);
}

impl Visitable for Value {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit(*self);
    }
}

impl Visitable for ObjRef {
    #[inline]
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit_object(*self);
    }
}

impl<T: Visitable> Visitable for Option<T> {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        if let Some(inner) = self {
            inner.visit_edges(visitor);
        }
    }
}

impl<T: Visitable> Visitable for [T] {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.iter().for_each(|item| item.visit_edges(visitor));
    }
}

impl<T: Visitable> Visitable for Vec<T> {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.as_slice().visit_edges(visitor);
    }
}

impl RootProvider for Vec<Value> {
    fn visit_roots(&self, visitor: &mut dyn Visitor) {
        self.visit_edges(visitor);
    }
}
