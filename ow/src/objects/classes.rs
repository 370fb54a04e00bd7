use thiserror::Error;

use crate::{
    Finalizer, GcMarker, Machine, NativeFuncDef, ObjRef, ObjectBody, SlotTable, Value, Visitable,
    Visitor,
};

pub struct ClassObj {
    pub(crate) loaded: bool,
    /// torn down by `clear_class`, never loadable again
    pub(crate) cleared: bool,
    pub(crate) super_class: Option<ObjRef>,
    pub(crate) name: Option<ObjRef>,
    /// native slots plus attributes, inherited ones included
    pub(crate) basic_field_count: usize,
    pub(crate) native_field_count: usize,
    pub(crate) has_extra_fields: bool,
    /// attribute names in field order, inherited first
    pub(crate) attributes: SlotTable<()>,
    pub(crate) methods: SlotTable<Value>,
    pub(crate) statics: SlotTable<Value>,
    pub(crate) finalizer: Option<Finalizer>,
    pub(crate) gc_marker: Option<GcMarker>,
}

impl ClassObj {
    pub(crate) fn empty() -> Self {
        Self {
            loaded: false,
            cleared: false,
            super_class: None,
            name: None,
            basic_field_count: 0,
            native_field_count: 0,
            has_extra_fields: false,
            attributes: SlotTable::new(),
            methods: SlotTable::new(),
            statics: SlotTable::new(),
            finalizer: None,
            gc_marker: None,
        }
    }
}

impl Visitable for ClassObj {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.super_class.visit_edges(visitor);
        self.name.visit_edges(visitor);
        for (name, ()) in self.attributes.iter() {
            visitor.visit_object(name);
        }
        self.methods.visit_edges(visitor);
        self.statics.visit_edges(visitor);
    }
}

/// Read only snapshot of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: Option<ObjRef>,
    pub super_class: Option<ObjRef>,
    pub loaded: bool,
    pub basic_field_count: usize,
    pub native_field_count: usize,
    pub has_extra_fields: bool,
    pub attribute_count: usize,
    pub method_count: usize,
    pub static_count: usize,
}

/// Resolved method slot. Stays valid for the lifetime of the owning class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MethodIndex {
    pub owner: ObjRef,
    pub slot: usize,
}

/// Runtime class definition. Names are symbols, so build it inside a no collect region.
#[derive(Debug, Clone, Default)]
pub struct ClassDef {
    pub name: Option<ObjRef>,
    pub native_field_count: usize,
    pub has_extra_fields: bool,
    pub attributes: Vec<ObjRef>,
    pub methods: Vec<(ObjRef, Value)>,
    pub statics: Vec<(ObjRef, Value)>,
    pub finalizer: Option<Finalizer>,
    pub gc_marker: Option<GcMarker>,
}

/// Static class description, the way builtin and host classes are declared.
#[derive(Debug, Clone, Copy)]
pub struct NativeClassDef {
    pub name: &'static str,
    pub native_field_count: usize,
    pub has_extra_fields: bool,
    pub attributes: &'static [&'static str],
    pub methods: &'static [NativeFuncDef],
    pub finalizer: Option<Finalizer>,
    pub gc_marker: Option<GcMarker>,
}

impl NativeClassDef {
    pub const fn new(name: &'static str, methods: &'static [NativeFuncDef]) -> Self {
        Self {
            name,
            native_field_count: 0,
            has_extra_fields: false,
            attributes: &[],
            methods,
            finalizer: None,
            gc_marker: None,
        }
    }

    pub const fn with_attributes(mut self, attributes: &'static [&'static str]) -> Self {
        self.attributes = attributes;
        self
    }

    pub const fn with_native_fields(mut self, count: usize) -> Self {
        self.native_field_count = count;
        self
    }

    pub const fn with_extra_fields(mut self) -> Self {
        self.has_extra_fields = true;
        self
    }

    pub const fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    pub const fn with_gc_marker(mut self, gc_marker: GcMarker) -> Self {
        self.gc_marker = Some(gc_marker);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("{0} is not a class object")]
    NotAClass(String),
    #[error("class `{0}' is already loaded")]
    AlreadyLoaded(String),
    #[error("class `{0}' was cleared and cannot be loaded again")]
    Cleared(String),
    #[error("superclass of `{0}' is not loaded")]
    SuperNotLoaded(String),
    #[error("`{0}' declares a finalizer but its superclass is not the root class")]
    FinalizerRequiresRootSuper(String),
    #[error("`{0}' declares a gc marker but its superclass is not the root class")]
    MarkerRequiresRootSuper(String),
    #[error("`{0}' cannot add attributes to a variable size superclass")]
    ExtraFieldsConflict(String),
    #[error("`{class}' declares attribute `{attribute}' twice")]
    DuplicateAttribute { class: String, attribute: String },
    #[error("`{0}' has a native field count incompatible with its superclass")]
    NativeFieldCount(String),
}

impl Machine {
    /// Allocates an empty, unloaded class.
    pub fn new_class(&mut self) -> ObjRef {
        let class_class = self.classes.class;
        self.allocate(class_class, ObjectBody::Class(Box::new(ClassObj::empty())))
    }

    #[inline]
    pub(crate) fn class_obj(&self, class: ObjRef) -> Option<&ClassObj> {
        match &self.heap.try_get(class)?.body {
            ObjectBody::Class(class) => Some(class),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn class_obj_mut(&mut self, class: ObjRef) -> Option<&mut ClassObj> {
        match &mut self.heap.try_get_mut(class)?.body {
            ObjectBody::Class(class) => Some(class),
            _ => None,
        }
    }

    /// Fills `class` from `def`. Nothing is changed unless every check passes.
    pub fn load_class(
        &mut self,
        class: ObjRef,
        super_class: Option<ObjRef>,
        def: ClassDef,
    ) -> Result<(), DefinitionError> {
        let label = def
            .name
            .map(|name| self.symbol_text(name).to_owned())
            .unwrap_or_else(|| "<anonymous>".to_owned());

        let Some(target) = self.class_obj(class) else {
            return Err(DefinitionError::NotAClass(label));
        };
        if target.loaded {
            return Err(DefinitionError::AlreadyLoaded(label));
        }
        if target.cleared {
            return Err(DefinitionError::Cleared(label));
        }

        let parent = match super_class {
            Some(super_class) => match self.class_obj(super_class) {
                Some(parent) if parent.loaded => Some(parent),
                _ => return Err(DefinitionError::SuperNotLoaded(label)),
            },
            None => None,
        };
        let parent_is_root = super_class.is_none_or(|parent| parent == self.classes.object);
        if def.finalizer.is_some() && !parent_is_root {
            return Err(DefinitionError::FinalizerRequiresRootSuper(label));
        }
        if def.gc_marker.is_some() && !parent_is_root {
            return Err(DefinitionError::MarkerRequiresRootSuper(label));
        }

        let (inherited_natives, inherited_attributes, inherited_extra) = match parent {
            Some(parent) => (
                parent.native_field_count,
                parent.attributes.clone(),
                parent.has_extra_fields,
            ),
            None => (0, SlotTable::new(), false),
        };
        if inherited_extra && !def.attributes.is_empty() {
            return Err(DefinitionError::ExtraFieldsConflict(label));
        }
        let native_field_count = def.native_field_count.max(inherited_natives);
        if def.native_field_count != 0
            && (def.native_field_count < inherited_natives
                || (def.native_field_count > inherited_natives && !inherited_attributes.is_empty()))
        {
            return Err(DefinitionError::NativeFieldCount(label));
        }

        let mut attributes = inherited_attributes;
        for &attribute in &def.attributes {
            if attributes.position(attribute).is_some() {
                return Err(DefinitionError::DuplicateAttribute {
                    class: label,
                    attribute: self.symbol_text(attribute).to_owned(),
                });
            }
            attributes.insert(attribute, ());
        }

        let mut methods = SlotTable::new();
        for (name, method) in def.methods {
            methods.insert(name, method);
        }
        let mut statics = SlotTable::new();
        for (name, value) in def.statics {
            statics.insert(name, value);
        }

        log::trace!(
            "loading class {label}: {} attributes, {} methods",
            attributes.len(),
            methods.len()
        );
        let Some(target) = self.class_obj_mut(class) else {
            return Err(DefinitionError::NotAClass(label));
        };
        target.loaded = true;
        target.super_class = super_class;
        target.name = def.name;
        target.native_field_count = native_field_count;
        target.basic_field_count = native_field_count + attributes.len();
        target.has_extra_fields = def.has_extra_fields || inherited_extra;
        target.attributes = attributes;
        target.methods = methods;
        target.statics = statics;
        target.finalizer = def.finalizer;
        target.gc_marker = def.gc_marker;
        Ok(())
    }

    /// Loads a static definition. Methods become natives bound to `module`.
    pub fn load_native_class(
        &mut self,
        class: ObjRef,
        super_class: Option<ObjRef>,
        native: &NativeClassDef,
        module: Option<ObjRef>,
    ) -> Result<(), DefinitionError> {
        let _region = self.heap.no_collect_region();
        let name = self.intern(native.name);
        let attributes = native
            .attributes
            .iter()
            .map(|attribute| self.intern(attribute))
            .collect();
        let methods = native
            .methods
            .iter()
            .map(|method| {
                let name = self.intern(method.name);
                let func = self.new_native_func(method, module);
                (name, Value::from_object(func))
            })
            .collect();
        let def = ClassDef {
            name: Some(name),
            native_field_count: native.native_field_count,
            has_extra_fields: native.has_extra_fields,
            attributes,
            methods,
            statics: Vec::new(),
            finalizer: native.finalizer,
            gc_marker: native.gc_marker,
        };
        self.load_class(class, super_class, def)
    }

    /// Creates and loads a class deriving from `Object`.
    pub fn define_native_class(
        &mut self,
        native: &NativeClassDef,
        module: Option<ObjRef>,
    ) -> Result<ObjRef, DefinitionError> {
        let _region = self.heap.no_collect_region();
        let class = self.new_class();
        let object = self.classes.object;
        self.load_native_class(class, Some(object), native, module)?;
        Ok(class)
    }

    #[inline]
    pub fn class_of(&self, value: Value) -> ObjRef {
        match value.as_object() {
            Some(object) => self.heap.get(object).class,
            None => self.classes.int,
        }
    }

    /// True when `base` is `derived` or one of its ancestors.
    pub fn is_base(&self, base: ObjRef, derived: ObjRef) -> bool {
        derived == base || self.heap.class_chain(derived).any(|(class, _)| class == base)
    }

    #[inline]
    pub fn is_instance(&self, value: Value, class: ObjRef) -> bool {
        self.is_base(class, self.class_of(value))
    }

    pub fn class_info(&self, class: ObjRef) -> Option<ClassInfo> {
        let class = self.class_obj(class)?;
        Some(ClassInfo {
            name: class.name,
            super_class: class.super_class,
            loaded: class.loaded,
            basic_field_count: class.basic_field_count,
            native_field_count: class.native_field_count,
            has_extra_fields: class.has_extra_fields,
            attribute_count: class.attributes.len(),
            method_count: class.methods.len(),
            static_count: class.statics.len(),
        })
    }

    pub fn class_name(&self, class: ObjRef) -> String {
        self.class_obj(class)
            .and_then(|class| class.name)
            .map(|name| self.symbol_text(name).to_owned())
            .unwrap_or_else(|| "<anonymous>".to_owned())
    }

    /// Field index of attribute `name`, inherited attributes included.
    pub fn find_attribute(&self, class: ObjRef, name: ObjRef) -> Option<usize> {
        let class = self.class_obj(class)?;
        let position = class.attributes.position(name)?;
        Some(class.native_field_count + position)
    }

    /// Looks `name` up in `class`, then outward along the super chain.
    pub fn find_method(&self, class: ObjRef, name: ObjRef) -> Option<MethodIndex> {
        self.heap.class_chain(class).find_map(|(owner, class)| {
            let slot = class.methods.position(name)?;
            Some(MethodIndex { owner, slot })
        })
    }

    pub fn get_method(&self, index: MethodIndex) -> Option<Value> {
        self.class_obj(index.owner)?.methods.get(index.slot).copied()
    }

    pub fn set_method(&mut self, index: MethodIndex, callable: Value) -> bool {
        self.class_obj_mut(index.owner)
            .is_some_and(|class| class.methods.set(index.slot, callable))
    }

    /// Binds `name` in the class's own table, replacing an existing binding in place.
    pub fn set_method_by_name(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        callable: Value,
    ) -> Option<MethodIndex> {
        let table = &mut self.class_obj_mut(class)?.methods;
        let slot = table.insert(name, callable);
        Some(MethodIndex { owner: class, slot })
    }

    /// Detaches every table and leaves `class` unloaded for good.
    ///
    /// Instances keep their fields but no longer resolve attributes or methods through it.
    pub fn clear_class(&mut self, class: ObjRef) -> bool {
        match self.class_obj_mut(class) {
            Some(target) => {
                log::trace!("clearing class {class}");
                *target = ClassObj {
                    cleared: true,
                    ..ClassObj::empty()
                };
                true
            }
            None => false,
        }
    }

    pub fn get_static(&self, class: ObjRef, name: ObjRef) -> Option<Value> {
        self.class_obj(class)?.statics.lookup(name).copied()
    }

    pub fn set_static(&mut self, class: ObjRef, name: ObjRef, value: Value) -> bool {
        match self.class_obj_mut(class) {
            Some(class) => {
                class.statics.insert(name, value);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn answer(_: &mut Machine) -> Result<Value, Error> {
        Ok(Value::small_int(42).unwrap())
    }

    fn other(_: &mut Machine) -> Result<Value, Error> {
        Ok(Value::small_int(7).unwrap())
    }

    const BASE_METHODS: &[NativeFuncDef] = &[
        NativeFuncDef::new("answer", 1, answer),
        NativeFuncDef::new("other", 1, other),
    ];
    const DERIVED_METHODS: &[NativeFuncDef] = &[NativeFuncDef::new("other", 1, answer)];

    const BASE: NativeClassDef = NativeClassDef::new("Base", BASE_METHODS).with_attributes(&["a", "b"]);
    const DERIVED: NativeClassDef = NativeClassDef::new("Derived", DERIVED_METHODS).with_attributes(&["c"]);

    fn base_and_derived(machine: &mut Machine) -> (ObjRef, ObjRef) {
        let base = machine.define_native_class(&BASE, None).unwrap();
        let derived = machine.new_class();
        machine
            .load_native_class(derived, Some(base), &DERIVED, None)
            .unwrap();
        (base, derived)
    }

    #[test]
    fn is_base_is_reflexive_and_transitive() {
        let mut machine = Machine::new();
        let (base, derived) = base_and_derived(&mut machine);
        let object = machine.classes().object;
        assert!(machine.is_base(derived, derived));
        assert!(machine.is_base(base, derived));
        assert!(machine.is_base(object, derived));
        assert!(!machine.is_base(derived, base));
    }

    #[test]
    fn methods_resolve_nearest_first() {
        let mut machine = Machine::new();
        let (base, derived) = base_and_derived(&mut machine);
        let other_name = machine.intern("other");
        let answer_name = machine.intern("answer");

        let own = machine.find_method(derived, other_name).unwrap();
        assert_eq!(own.owner, derived);
        let inherited = machine.find_method(derived, answer_name).unwrap();
        assert_eq!(inherited.owner, base);
        assert_eq!(machine.find_method(base, other_name).unwrap().owner, base);

        let missing = machine.intern("missing");
        assert_eq!(machine.find_method(derived, missing), None);
    }

    #[test]
    fn attributes_are_laid_out_inherited_first() {
        let mut machine = Machine::new();
        let (_, derived) = base_and_derived(&mut machine);
        let [a, b, c] = ["a", "b", "c"].map(|name| machine.intern(name));
        assert_eq!(machine.find_attribute(derived, a), Some(0));
        assert_eq!(machine.find_attribute(derived, b), Some(1));
        assert_eq!(machine.find_attribute(derived, c), Some(2));
        assert_eq!(machine.class_info(derived).unwrap().basic_field_count, 3);
    }

    #[test]
    fn set_method_by_name_keeps_slot_stable() {
        let mut machine = Machine::new();
        let (base, _) = base_and_derived(&mut machine);
        let name = machine.intern("answer");
        let before = machine.find_method(base, name).unwrap();
        let replacement = Value::small_int(1).unwrap();
        let after = machine.set_method_by_name(base, name, replacement).unwrap();
        assert_eq!(before, after);
        assert_eq!(machine.get_method(after), Some(replacement));
        assert!(machine.set_method(after, Value::small_int(2).unwrap()));
        assert!(!machine.set_method(
            MethodIndex {
                owner: base,
                slot: 99
            },
            replacement
        ));
    }

    #[test]
    fn statics_are_per_class() {
        let mut machine = Machine::new();
        let (base, derived) = base_and_derived(&mut machine);
        let count = machine.intern("count");
        assert!(machine.set_static(base, count, Value::small_int(3).unwrap()));
        assert_eq!(machine.get_static(base, count), Value::small_int(3));
        assert_eq!(machine.get_static(derived, count), None);
    }

    #[test]
    fn loading_twice_is_rejected() {
        let mut machine = Machine::new();
        let (base, _) = base_and_derived(&mut machine);
        let err = machine.load_native_class(base, None, &BASE, None).unwrap_err();
        assert_eq!(err, DefinitionError::AlreadyLoaded("Base".into()));
    }

    fn noop_finalizer(_: &mut crate::HeapObject) {}

    #[test]
    fn finalizer_needs_root_superclass() {
        let mut machine = Machine::new();
        let (base, _) = base_and_derived(&mut machine);
        let class = machine.new_class();
        let def = NativeClassDef::new("Leaf", &[]).with_finalizer(noop_finalizer);
        let err = machine
            .load_native_class(class, Some(base), &def, None)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::FinalizerRequiresRootSuper(_)));
        assert!(!machine.class_info(class).unwrap().loaded);

        // directly below Object is fine
        assert!(machine.define_native_class(&def, None).is_ok());
    }

    fn other_finalizer(_: &mut crate::HeapObject) {}

    fn noop_marker(_: &crate::HeapObject, _: &mut dyn Visitor) {}

    #[test]
    fn finalizer_needs_object_not_just_any_parentless_class() {
        let mut machine = Machine::new();
        let detached = machine.new_class();
        let root = NativeClassDef::new("Detached", &[]).with_finalizer(noop_finalizer);
        machine
            .load_native_class(detached, None, &root, None)
            .unwrap();

        let child = machine.new_class();
        let def = NativeClassDef::new("Child", &[]).with_finalizer(other_finalizer);
        let err = machine
            .load_native_class(child, Some(detached), &def, None)
            .unwrap_err();
        assert_eq!(err, DefinitionError::FinalizerRequiresRootSuper("Child".into()));

        let def = NativeClassDef::new("Child", &[]).with_gc_marker(noop_marker);
        let err = machine
            .load_native_class(child, Some(detached), &def, None)
            .unwrap_err();
        assert_eq!(err, DefinitionError::MarkerRequiresRootSuper("Child".into()));
        assert!(!machine.class_info(child).unwrap().loaded);
    }

    #[test]
    fn duplicate_attributes_are_rejected() {
        let mut machine = Machine::new();
        let (base, _) = base_and_derived(&mut machine);
        let class = machine.new_class();
        let def = NativeClassDef::new("Shadow", &[]).with_attributes(&["a"]);
        let err = machine
            .load_native_class(class, Some(base), &def, None)
            .unwrap_err();
        assert_eq!(
            err,
            DefinitionError::DuplicateAttribute {
                class: "Shadow".into(),
                attribute: "a".into()
            }
        );
    }

    #[test]
    fn cleared_classes_stay_unloaded() {
        let mut machine = Machine::new();
        let (base, _) = base_and_derived(&mut machine);
        let answer = machine.intern("answer");
        assert!(machine.clear_class(base));
        let info = machine.class_info(base).unwrap();
        assert!(!info.loaded);
        assert_eq!(info.method_count, 0);
        assert_eq!(machine.find_method(base, answer), None);

        let object = machine.classes().object;
        let err = machine
            .load_native_class(base, Some(object), &BASE, None)
            .unwrap_err();
        assert_eq!(err, DefinitionError::Cleared("Base".into()));
        let nil = machine.nil().as_object().unwrap();
        assert!(!machine.clear_class(nil));
    }

    #[test]
    fn clearing_cannot_close_a_superclass_cycle() {
        let mut machine = Machine::new();
        let (base, derived) = base_and_derived(&mut machine);
        assert!(machine.clear_class(base));
        let err = machine
            .load_native_class(base, Some(derived), &BASE, None)
            .unwrap_err();
        assert_eq!(err, DefinitionError::Cleared("Base".into()));

        // walks along the chain still terminate
        let object = machine.classes().object;
        let answer = machine.intern("answer");
        assert!(!machine.is_base(object, base));
        assert!(machine.is_base(base, derived));
        assert_eq!(machine.find_method(base, answer), None);
    }

    #[test]
    fn unloaded_superclass_is_rejected() {
        let mut machine = Machine::new();
        let parent = machine.new_class();
        let child = machine.new_class();
        let err = machine
            .load_native_class(child, Some(parent), &BASE, None)
            .unwrap_err();
        assert_eq!(err, DefinitionError::SuperNotLoaded("Base".into()));
    }
}
