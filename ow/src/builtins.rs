use crate::{
    ClassObj, HeapObject, Machine, ObjRef, ObjectBody, Value, Visitable, Visitor, primitives,
};

/// Classes the runtime itself depends on.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinClasses {
    pub object: ObjRef,
    pub class: ObjRef,
    pub nil: ObjRef,
    pub boolean: ObjRef,
    pub int: ObjRef,
    pub float: ObjRef,
    pub symbol: ObjRef,
    pub string: ObjRef,
    pub tuple: ObjRef,
    pub module: ObjRef,
    pub func: ObjRef,
    pub cfunc: ObjRef,
    pub exception: ObjRef,
}

impl BuiltinClasses {
    pub fn all(&self) -> [ObjRef; 13] {
        [
            self.object,
            self.class,
            self.nil,
            self.boolean,
            self.int,
            self.float,
            self.symbol,
            self.string,
            self.tuple,
            self.module,
            self.func,
            self.cfunc,
            self.exception,
        ]
    }

    pub fn contains(&self, class: ObjRef) -> bool {
        self.all().contains(&class)
    }
}

impl Visitable for BuiltinClasses {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.all().visit_edges(visitor);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpecialValues {
    pub nil: Value,
    pub true_value: Value,
    pub false_value: Value,
}

impl Visitable for SpecialValues {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit(self.nil);
        visitor.visit(self.true_value);
        visitor.visit(self.false_value);
    }
}

/// Bootstrap the machine by allocating all builtin classes and special objects.
///
/// Creates the self referential class of classes, empty shells for every other builtin,
/// `nil`, `true`, `false` and the base module, then loads the native class definitions and
/// binds everything in the base module. Nothing is collected while this runs.
pub(crate) fn bootstrap(machine: &mut Machine) {
    let _region = machine.heap.no_collect_region();

    // 1. class of classes, temporarily pointing at slot 0, then patched to itself
    let class_class = machine.heap.insert(HeapObject {
        class: ObjRef::default(),
        body: ObjectBody::Class(Box::new(ClassObj::empty())),
    });
    machine.heap.get_mut(class_class).class = class_class;
    machine.classes.class = class_class;

    // 2. shells, loaded in step 5 once symbols and natives can be made
    machine.classes = BuiltinClasses {
        object: machine.new_class(),
        class: class_class,
        nil: machine.new_class(),
        boolean: machine.new_class(),
        int: machine.new_class(),
        float: machine.new_class(),
        symbol: machine.new_class(),
        string: machine.new_class(),
        tuple: machine.new_class(),
        module: machine.new_class(),
        func: machine.new_class(),
        cfunc: machine.new_class(),
        exception: machine.new_class(),
    };
    let classes = machine.classes;

    // 3. singletons
    let nil = machine.allocate(classes.nil, ObjectBody::Nil);
    let true_value = machine.allocate(classes.boolean, ObjectBody::Bool(true));
    let false_value = machine.allocate(classes.boolean, ObjectBody::Bool(false));
    machine.specials = SpecialValues {
        nil: Value::from_object(nil),
        true_value: Value::from_object(true_value),
        false_value: Value::from_object(false_value),
    };

    // 4. base module, the fallback of every global lookup
    let base = machine.new_module(Some("base"));
    machine.base_module = base;

    // 5. class definitions, Object is the only root
    let definitions = [
        (classes.object, &primitives::OBJECT_CLASS),
        (classes.class, &primitives::CLASS_CLASS),
        (classes.nil, &primitives::NIL_CLASS),
        (classes.boolean, &primitives::BOOL_CLASS),
        (classes.int, &primitives::INT_CLASS),
        (classes.float, &primitives::FLOAT_CLASS),
        (classes.symbol, &primitives::SYMBOL_CLASS),
        (classes.string, &primitives::STRING_CLASS),
        (classes.tuple, &primitives::TUPLE_CLASS),
        (classes.module, &primitives::MODULE_CLASS),
        (classes.func, &primitives::FUNC_CLASS),
        (classes.cfunc, &primitives::CFUNC_CLASS),
        (classes.exception, &primitives::EXCEPTION_CLASS),
    ];
    for (class, definition) in definitions {
        let super_class = (class != classes.object).then_some(classes.object);
        if let Err(err) = machine.load_native_class(class, super_class, definition, Some(base)) {
            unreachable!("builtin class {} failed to load: {err}", definition.name);
        }
        let name = machine.intern(definition.name);
        machine.set_global(base, name, Value::from_object(class));
    }

    // 6. free functions
    for function in primitives::BASE_FUNCTIONS {
        let name = machine.intern(function.name);
        let func = machine.new_native_func(function, Some(base));
        machine.set_global(base, name, Value::from_object(func));
    }
}

#[cfg(test)]
mod tests {
    use crate::Machine;

    #[test]
    fn class_of_classes_is_its_own_class() {
        let machine = Machine::new();
        let class = machine.classes().class;
        assert_eq!(machine.class_of(class.into()), class);
        assert_eq!(machine.class_name(class), "Class");
    }

    #[test]
    fn every_builtin_derives_from_object() {
        let machine = Machine::new();
        let object = machine.classes().object;
        for class in machine.classes().all() {
            assert!(machine.is_base(object, class));
            assert!(machine.class_info(class).unwrap().loaded);
        }
        assert_eq!(machine.class_info(object).unwrap().super_class, None);
    }

    #[test]
    fn singletons_have_their_classes() {
        let machine = Machine::new();
        let classes = *machine.classes();
        assert_eq!(machine.class_of(machine.nil()), classes.nil);
        assert_eq!(machine.class_of(machine.boolean(true)), classes.boolean);
        assert_ne!(machine.boolean(true), machine.boolean(false));
        assert_eq!(machine.class_of(crate::Value::small_int(3).unwrap()), classes.int);
    }

    #[test]
    fn variable_size_builtins_are_marked() {
        let machine = Machine::new();
        for class in [machine.classes().string, machine.classes().symbol, machine.classes().tuple] {
            assert!(machine.class_info(class).unwrap().has_extra_fields);
        }
        assert!(!machine.class_info(machine.classes().object).unwrap().has_extra_fields);
    }
}
