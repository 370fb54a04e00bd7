use std::path::PathBuf;

use crate::{
    BuiltinClasses, CallStack, Error, Heap, HeapObject, HeapSettings, Interner, ModuleManager,
    NoCollectRegion, ObjRef, ObjectBody, Output, RootProvider, SpecialValues, StackInfo, Value,
    Visitable, Visitor, builtins,
};

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub heap: HeapSettings,
    pub stack: StackInfo,
    /// directories searched for `<name>.ow` when a module is loaded by name
    pub search_paths: Vec<PathBuf>,
    pub output: Output,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            stack: StackInfo {
                capacity: 1024,
                max_frames: 256,
            },
            search_paths: vec![PathBuf::from(".")],
            output: Output::default(),
        }
    }
}

/// One independent runtime instance.
///
/// Everything the runtime owns hangs off this struct. Hosts talk to it through the stack
/// based API in [`crate::api`], natives get it as their only argument.
pub struct Machine {
    pub(crate) heap: Heap,
    pub(crate) stack: CallStack,
    pub(crate) interner: Interner,
    pub(crate) classes: BuiltinClasses,
    pub(crate) specials: SpecialValues,
    pub(crate) base_module: ObjRef,
    pub(crate) modules: ModuleManager,
    pub(crate) output: Output,
}

/// Borrowed view of every root the machine holds.
struct MachineRoots<'a> {
    stack: &'a CallStack,
    classes: &'a BuiltinClasses,
    specials: &'a SpecialValues,
    base_module: ObjRef,
    modules: &'a ModuleManager,
}

impl RootProvider for MachineRoots<'_> {
    fn visit_roots(&self, visitor: &mut dyn Visitor) {
        self.stack.visit_roots(visitor);
        self.classes.visit_edges(visitor);
        self.specials.visit_edges(visitor);
        visitor.visit_object(self.base_module);
        self.modules.visit_edges(visitor);
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        let mut machine = Self {
            heap: Heap::new(config.heap),
            stack: CallStack::new(&config.stack),
            interner: Interner::new(),
            classes: BuiltinClasses::default(),
            specials: SpecialValues::default(),
            base_module: ObjRef::default(),
            modules: ModuleManager::new(config.search_paths),
            output: config.output,
        };
        builtins::bootstrap(&mut machine);
        log::debug!(
            "machine ready: {} objects, {} symbols",
            machine.heap.live(),
            machine.interner.len()
        );
        machine
    }

    /// Allocates, collecting first when the heap asks for it.
    pub(crate) fn allocate(&mut self, class: ObjRef, body: ObjectBody) -> ObjRef {
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.heap.insert(HeapObject { class, body })
    }

    /// Runs a full collection now. Returns how many objects were freed.
    pub fn collect_garbage(&mut self) -> usize {
        let roots = MachineRoots {
            stack: &self.stack,
            classes: &self.classes,
            specials: &self.specials,
            base_module: self.base_module,
            modules: &self.modules,
        };
        let freed = self.heap.collect(&roots);
        let heap = &self.heap;
        let purged = self.interner.retain(|symbol| heap.contains(symbol));
        if purged > 0 {
            log::trace!("gc: purged {purged} symbols");
        }
        freed
    }

    /// New instance of a fixed layout class, every field nil.
    pub fn allocate_instance(&mut self, class: ObjRef) -> Result<ObjRef, Error> {
        let Some(info) = self.class_obj(class) else {
            return Err(Error::type_mismatch("callee", "Class"));
        };
        if !info.loaded {
            return Err(Error::type_mismatch(
                format!("class `{}'", self.class_name(class)),
                "loaded Class",
            ));
        }
        if info.has_extra_fields || self.builtin_ancestor(class).is_some() {
            return Err(Error::NotImplemented(format!(
                "instantiating `{}'",
                self.class_name(class)
            )));
        }
        let fields = vec![self.nil(); info.basic_field_count];
        Ok(self.allocate(class, ObjectBody::Fields(fields)))
    }

    /// First builtin class other than `Object` on the chain of `class`.
    fn builtin_ancestor(&self, class: ObjRef) -> Option<ObjRef> {
        self.heap
            .class_chain(class)
            .map(|(class, _)| class)
            .find(|&class| class != self.classes.object && self.classes.contains(class))
    }

    pub fn get_field(&self, object: ObjRef, index: usize) -> Option<Value> {
        match &self.heap.try_get(object)?.body {
            ObjectBody::Fields(fields) => fields.get(index).copied(),
            _ => None,
        }
    }

    pub fn set_field(&mut self, object: ObjRef, index: usize, value: Value) -> bool {
        match self.heap.try_get_mut(object).map(|object| &mut object.body) {
            Some(ObjectBody::Fields(fields)) => match fields.get_mut(index) {
                Some(field) => {
                    *field = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    #[inline]
    pub fn nil(&self) -> Value {
        self.specials.nil
    }

    #[inline]
    pub fn boolean(&self, value: bool) -> Value {
        if value {
            self.specials.true_value
        } else {
            self.specials.false_value
        }
    }

    /// Everything except nil and false is true.
    #[inline]
    pub fn truthy(&self, value: Value) -> bool {
        value != self.specials.nil && value != self.specials.false_value
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn stack(&self) -> &CallStack {
        &self.stack
    }

    pub fn classes(&self) -> &BuiltinClasses {
        &self.classes
    }

    pub fn base_module(&self) -> ObjRef {
        self.base_module
    }

    pub fn no_collect(&self) -> NoCollectRegion {
        self.heap.no_collect_region()
    }

    pub fn push_no_collect(&self) {
        self.heap.push_no_collect();
    }

    pub fn pop_no_collect(&self) -> bool {
        self.heap.pop_no_collect()
    }

    pub fn output(&mut self) -> &mut Output {
        &mut self.output
    }

    pub fn set_output(&mut self, output: Output) {
        self.output = output;
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        log::trace!("machine teardown, finalizing {} objects", self.heap.live());
        self.heap.finalize_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FaultKind, NativeClassDef};

    fn stress_machine() -> Machine {
        Machine::with_config(MachineConfig {
            heap: HeapSettings {
                initial_threshold: 1,
                growth_factor: 1.0,
                stress: true,
            },
            ..MachineConfig::default()
        })
    }

    #[test]
    fn no_collect_region_protects_unrooted_objects() {
        let mut machine = stress_machine();
        let before = machine.heap().stats();
        {
            let _region = machine.no_collect();
            let first = machine.new_string("first");
            let second = machine.new_string("second");
            assert_eq!(machine.heap().stats(), before);
            assert_eq!(machine.text_of(Value::from_object(first)), Some("first"));
            assert_eq!(machine.text_of(Value::from_object(second)), Some("second"));
        }

        // first allocation outside the region reclaims both
        machine.new_string("third");
        let after = machine.heap().stats();
        assert_eq!(after.collections, before.collections + 1);
        assert!(after.freed >= before.freed + 2);
    }

    #[test]
    fn stack_values_survive_stress_collection() {
        let mut machine = stress_machine();
        let string = machine.new_string("kept");
        machine.push(Value::from_object(string));
        for _ in 0..8 {
            machine.new_string("garbage");
        }
        assert_eq!(machine.text_of(Value::from_object(string)), Some("kept"));
    }

    #[test]
    fn builtin_objects_survive_collection() {
        let mut machine = Machine::new();
        machine.collect_garbage();
        let nil = machine.nil();
        assert!(machine.is_instance(nil, machine.classes().nil));
        let print = machine.intern("print");
        assert!(machine.resolve_global(machine.base_module(), print).is_some());
    }

    #[test]
    fn instances_start_with_nil_fields() {
        const POINT: NativeClassDef = NativeClassDef::new("Point", &[]).with_attributes(&["x", "y"]);
        let mut machine = Machine::new();
        let class = machine.define_native_class(&POINT, None).unwrap();
        machine.push(Value::from_object(class));
        let point = machine.allocate_instance(class).unwrap();
        assert_eq!(machine.get_field(point, 0), Some(machine.nil()));
        assert!(machine.set_field(point, 1, Value::small_int(3).unwrap()));
        assert_eq!(machine.get_field(point, 1), Value::small_int(3));
        assert!(!machine.set_field(point, 2, Value::default()));
    }

    #[test]
    fn builtin_and_variable_size_classes_are_not_instantiable() {
        let mut machine = Machine::new();
        let string = machine.classes().string;
        let err = machine.allocate_instance(string).unwrap_err();
        assert_eq!(err.kind(), FaultKind::NotImplemented);
        let int = machine.classes().int;
        assert_eq!(
            machine.allocate_instance(int).unwrap_err().kind(),
            FaultKind::NotImplemented
        );
    }
}
