use std::{cell::Cell, fmt, rc::Rc};

use crate::{
    CFuncObj, ClassObj, ExceptionObj, FuncObj, ModuleObj, ObjRef, RootProvider, StringObj,
    SymbolObj, TupleObj, Value, Visitable, Visitor,
};

/// Called once, right before an unreachable object is freed.
pub type Finalizer = fn(&mut HeapObject);

/// Reports the edges the collector cannot see on its own.
pub type GcMarker = fn(&HeapObject, &mut dyn Visitor);

#[derive(Debug, Clone, Copy)]
pub struct HeapSettings {
    /// live object count that triggers the first collection
    pub initial_threshold: usize,
    /// next threshold = live objects after a collection * growth_factor
    pub growth_factor: f64,
    /// collect on every allocation, flushes out missing roots
    pub stress: bool,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            initial_threshold: 4096,
            growth_factor: 2.0,
            stress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub freed: usize,
}

pub struct HeapObject {
    pub class: ObjRef,
    pub body: ObjectBody,
}

pub enum ObjectBody {
    /// plain instance: native slots first, then attributes
    Fields(Vec<Value>),
    Class(Box<ClassObj>),
    Symbol(SymbolObj),
    String(StringObj),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
    Tuple(TupleObj),
    Module(Box<ModuleObj>),
    Func(Box<FuncObj>),
    CFunc(Box<CFuncObj>),
    Exception(Box<ExceptionObj>),
}

impl ObjectBody {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectBody::Fields(_) => "instance",
            ObjectBody::Class(_) => "class",
            ObjectBody::Symbol(_) => "symbol",
            ObjectBody::String(_) => "string",
            ObjectBody::Int(_) => "int",
            ObjectBody::Float(_) => "float",
            ObjectBody::Bool(_) => "bool",
            ObjectBody::Nil => "nil",
            ObjectBody::Tuple(_) => "tuple",
            ObjectBody::Module(_) => "module",
            ObjectBody::Func(_) => "func",
            ObjectBody::CFunc(_) => "cfunc",
            ObjectBody::Exception(_) => "exception",
        }
    }
}

impl fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapObject")
            .field("class", &self.class)
            .field("body", &self.body.kind_name())
            .finish()
    }
}

// we dispatch on the body, each body visits its own edges
impl Visitable for ObjectBody {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        match self {
            ObjectBody::Fields(fields) => fields.visit_edges(visitor),
            ObjectBody::Class(class) => class.visit_edges(visitor),
            ObjectBody::Tuple(tuple) => tuple.visit_edges(visitor),
            ObjectBody::Module(module) => module.visit_edges(visitor),
            ObjectBody::Func(func) => func.visit_edges(visitor),
            ObjectBody::CFunc(func) => func.visit_edges(visitor),
            ObjectBody::Exception(exception) => exception.visit_edges(visitor),
            ObjectBody::Symbol(_)
            | ObjectBody::String(_)
            | ObjectBody::Int(_)
            | ObjectBody::Float(_)
            | ObjectBody::Bool(_)
            | ObjectBody::Nil => (),
        }
    }
}

impl Visitable for HeapObject {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit_object(self.class);
        self.body.visit_edges(visitor);
    }
}

/// Keeps the collector from running while alive. Regions nest.
#[must_use = "the region ends when the guard is dropped"]
pub struct NoCollectRegion {
    depth: Rc<Cell<usize>>,
}

impl NoCollectRegion {
    fn enter(depth: &Rc<Cell<usize>>) -> Self {
        depth.set(depth.get() + 1);
        Self {
            depth: Rc::clone(depth),
        }
    }
}

impl Drop for NoCollectRegion {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// Non moving mark & sweep heap.
///
/// Objects live in slots addressed by [`ObjRef`]. Freed slots are reused, so a reference
/// must never outlive the object it points to. Anything a native holds across an allocation
/// has to be reachable from a root or protected by a [`NoCollectRegion`].
pub struct Heap {
    slots: Vec<Option<HeapObject>>,
    marks: Vec<bool>,
    free: Vec<u32>,
    live: usize,
    threshold: usize,
    settings: HeapSettings,
    no_collect: Rc<Cell<usize>>,
    stats: GcStats,
}

impl Heap {
    pub fn new(settings: HeapSettings) -> Self {
        Self {
            slots: Vec::new(),
            marks: Vec::new(),
            free: Vec::new(),
            live: 0,
            threshold: settings.initial_threshold.max(1),
            settings,
            no_collect: Rc::new(Cell::new(0)),
            stats: GcStats::default(),
        }
    }

    /// Stores `object` without ever collecting.
    pub fn insert(&mut self, object: HeapObject) -> ObjRef {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Some(object);
            return ObjRef::new(index);
        }
        let index = u32::try_from(self.slots.len()).unwrap_or_else(|_| {
            log::error!("heap exhausted at {} objects", self.slots.len());
            panic!("heap exhausted");
        });
        self.slots.push(Some(object));
        ObjRef::new(index)
    }

    #[inline]
    pub fn get(&self, object: ObjRef) -> &HeapObject {
        match self.slots.get(object.index()) {
            Some(Some(object)) => object,
            _ => panic!("dangling object reference {object}"),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, object: ObjRef) -> &mut HeapObject {
        match self.slots.get_mut(object.index()) {
            Some(Some(object)) => object,
            _ => panic!("dangling object reference {object}"),
        }
    }

    #[inline]
    pub fn try_get(&self, object: ObjRef) -> Option<&HeapObject> {
        self.slots.get(object.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn try_get_mut(&mut self, object: ObjRef) -> Option<&mut HeapObject> {
        self.slots.get_mut(object.index()).and_then(Option::as_mut)
    }

    #[inline]
    pub fn contains(&self, object: ObjRef) -> bool {
        self.try_get(object).is_some()
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> GcStats {
        self.stats
    }

    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    pub fn no_collect_region(&self) -> NoCollectRegion {
        NoCollectRegion::enter(&self.no_collect)
    }

    pub fn no_collect_depth(&self) -> usize {
        self.no_collect.get()
    }

    /// Unscoped variant of [`Heap::no_collect_region`] for hosts that pair calls by hand.
    pub fn push_no_collect(&self) {
        self.no_collect.set(self.no_collect.get() + 1);
    }

    /// Returns false when there was no region to close.
    pub fn pop_no_collect(&self) -> bool {
        match self.no_collect.get() {
            0 => {
                log::error!("no collect region closed without a matching open");
                false
            }
            depth => {
                self.no_collect.set(depth - 1);
                true
            }
        }
    }

    #[inline]
    pub fn should_collect(&self) -> bool {
        self.no_collect.get() == 0 && (self.settings.stress || self.live >= self.threshold)
    }

    /// Marks from `roots`, finalizes and frees everything unreached. Returns the freed count.
    pub fn collect(&mut self, roots: &dyn RootProvider) -> usize {
        self.mark(roots);
        let freed = self.sweep();
        let next = (self.live as f64 * self.settings.growth_factor) as usize;
        self.threshold = next.max(self.settings.initial_threshold).max(1);
        self.stats.collections += 1;
        self.stats.freed += freed;
        log::debug!(
            "gc: freed {freed}, live {}, next threshold {}",
            self.live,
            self.threshold
        );
        freed
    }

    fn mark(&mut self, roots: &dyn RootProvider) {
        self.marks.clear();
        self.marks.resize(self.slots.len(), false);

        let mut pending: Vec<ObjRef> = Vec::new();
        roots.visit_roots(&mut |value: Value| {
            if let Some(object) = value.as_object() {
                pending.push(object);
            }
        });

        while let Some(object) = pending.pop() {
            let index = object.index();
            if self.marks.get(index).copied().unwrap_or(true) {
                continue;
            }
            let Some(heap_object) = self.slots[index].as_ref() else {
                log::error!("gc: reached freed slot {object}");
                continue;
            };
            self.marks[index] = true;

            let mut push = |value: Value| {
                if let Some(object) = value.as_object() {
                    pending.push(object);
                }
            };
            heap_object.visit_edges(&mut push);
            if let Some(marker) = self.effective_gc_marker(heap_object.class) {
                marker(heap_object, &mut push);
            }
        }
    }

    fn sweep(&mut self) -> usize {
        let dead: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(index, slot)| slot.is_some() && !self.marks[*index])
            .map(|(index, _)| index)
            .collect();

        // finalizers are resolved while every dead class is still in place
        let finalizers: Vec<(usize, Finalizer)> = dead
            .iter()
            .filter_map(|&index| {
                let class = self.slots[index].as_ref()?.class;
                self.effective_finalizer(class).map(|finalizer| (index, finalizer))
            })
            .collect();
        for (index, finalizer) in finalizers {
            if let Some(object) = self.slots[index].as_mut() {
                finalizer(object);
            }
        }

        for &index in &dead {
            self.slots[index] = None;
            self.free.push(index as u32);
        }
        self.live -= dead.len();
        dead.len()
    }

    /// Runs every pending finalizer and drops all objects. Used on machine teardown.
    pub fn finalize_all(&mut self) {
        let finalizers: Vec<(usize, Finalizer)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let class = slot.as_ref()?.class;
                self.effective_finalizer(class).map(|finalizer| (index, finalizer))
            })
            .collect();
        for (index, finalizer) in finalizers {
            if let Some(object) = self.slots[index].as_mut() {
                finalizer(object);
            }
        }
        self.slots.clear();
        self.marks.clear();
        self.free.clear();
        self.live = 0;
    }

    /// `class` and its superclasses, most derived first.
    pub(crate) fn class_chain(&self, class: ObjRef) -> impl Iterator<Item = (ObjRef, &ClassObj)> {
        let mut current = Some(class);
        let mut hops = 0;
        std::iter::from_fn(move || {
            let class = current?;
            // a cycle can only come from a corrupted heap, bail instead of spinning
            hops += 1;
            if hops > self.slots.len() {
                return None;
            }
            match self.try_get(class).map(|object| &object.body) {
                Some(ObjectBody::Class(body)) => {
                    current = body.super_class;
                    Some((class, &**body))
                }
                _ => None,
            }
        })
    }

    fn effective_gc_marker(&self, class: ObjRef) -> Option<GcMarker> {
        self.class_chain(class).find_map(|(_, class)| class.gc_marker)
    }

    fn effective_finalizer(&self, class: ObjRef) -> Option<Finalizer> {
        self.class_chain(class).find_map(|(_, class)| class.finalizer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn stress_heap() -> Heap {
        Heap::new(HeapSettings {
            initial_threshold: 1,
            growth_factor: 1.0,
            stress: true,
        })
    }

    fn class_with(heap: &mut Heap, finalizer: Option<Finalizer>, gc_marker: Option<GcMarker>) -> ObjRef {
        let mut class = ClassObj::empty();
        class.loaded = true;
        class.finalizer = finalizer;
        class.gc_marker = gc_marker;
        let class_ref = heap.insert(HeapObject {
            class: ObjRef::default(),
            body: ObjectBody::Class(Box::new(class)),
        });
        heap.get_mut(class_ref).class = class_ref;
        class_ref
    }

    #[test]
    fn unreachable_objects_are_freed_and_slots_reused() {
        let mut heap = stress_heap();
        let class = class_with(&mut heap, None, None);
        let garbage = heap.insert(HeapObject {
            class,
            body: ObjectBody::Int(1),
        });
        let roots = vec![Value::from_object(class)];
        assert_eq!(heap.collect(&roots), 1);
        assert!(!heap.contains(garbage));
        assert!(heap.contains(class));

        let reused = heap.insert(HeapObject {
            class,
            body: ObjectBody::Int(2),
        });
        assert_eq!(reused, garbage);
        assert_eq!(heap.live(), 2);
    }

    #[test]
    fn regions_suppress_collection_and_nest() {
        let heap = stress_heap();
        assert!(heap.should_collect());
        {
            let _outer = heap.no_collect_region();
            {
                let _inner = heap.no_collect_region();
                assert_eq!(heap.no_collect_depth(), 2);
                assert!(!heap.should_collect());
            }
            assert!(!heap.should_collect());
        }
        assert_eq!(heap.no_collect_depth(), 0);
        assert!(heap.should_collect());
    }

    #[test]
    fn unbalanced_pop_reports_false() {
        let heap = stress_heap();
        assert!(!heap.pop_no_collect());
        heap.push_no_collect();
        assert!(heap.pop_no_collect());
    }

    static FINALIZED: AtomicUsize = AtomicUsize::new(0);

    fn count_finalized(object: &mut HeapObject) {
        if let ObjectBody::Fields(fields) = &mut object.body {
            fields.clear();
        }
        FINALIZED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn finalizer_runs_once_before_free() {
        let mut heap = stress_heap();
        let class = class_with(&mut heap, Some(count_finalized), None);
        heap.insert(HeapObject {
            class,
            body: ObjectBody::Fields(vec![Value::default()]),
        });
        let before = FINALIZED.load(Ordering::SeqCst);
        let roots = vec![Value::from_object(class)];
        heap.collect(&roots);
        heap.collect(&roots);
        assert_eq!(FINALIZED.load(Ordering::SeqCst) - before, 1);
    }

    fn mark_first_field_as_ref(object: &HeapObject, visitor: &mut dyn Visitor) {
        if let ObjectBody::Int(index) = object.body {
            visitor.visit_object(ObjRef::new(index as u32));
        }
    }

    #[test]
    fn gc_marker_reports_hidden_edges() {
        let mut heap = stress_heap();
        let class = class_with(&mut heap, None, Some(mark_first_field_as_ref));
        let hidden = heap.insert(HeapObject {
            class,
            body: ObjectBody::Nil,
        });
        let holder = heap.insert(HeapObject {
            class,
            body: ObjectBody::Int(hidden.index() as i64),
        });
        let roots = vec![Value::from_object(holder)];
        heap.collect(&roots);
        assert!(heap.contains(hidden));
        assert!(heap.contains(class));
    }
}
