use crate::{Error, Machine, NativeClassDef, NativeFuncDef, Value};

mod base;
mod collections;
mod numbers;
mod object;
mod reflection;
mod strings;

/// Argument `n` of the running native, 1 based. Methods get their receiver as argument 1.
#[inline]
pub(crate) fn arg(machine: &Machine, n: usize) -> Result<Value, Error> {
    machine.stack.local(-(n as isize))
}

pub(crate) fn bool_object(machine: &Machine, value: bool) -> Result<Value, Error> {
    Ok(machine.boolean(value))
}

const OBJECT_METHODS: &[NativeFuncDef] = &[
    NativeFuncDef::new("==", 2, object::identical),
    NativeFuncDef::new("class", 1, object::class),
    NativeFuncDef::new("is_a", 2, object::is_a),
    NativeFuncDef::new("to_string", 1, object::to_string),
];

const CLASS_METHODS: &[NativeFuncDef] = &[
    NativeFuncDef::new("name", 1, reflection::class_name),
    NativeFuncDef::new("super", 1, reflection::class_super),
];

const NUMBER_METHODS: &[NativeFuncDef] = &[
    NativeFuncDef::new("+", 2, numbers::add),
    NativeFuncDef::new("-", 2, numbers::sub),
    NativeFuncDef::new("*", 2, numbers::mul),
    NativeFuncDef::new("/", 2, numbers::div),
    NativeFuncDef::new("%", 2, numbers::rem),
    NativeFuncDef::new("neg", 1, numbers::neg),
    NativeFuncDef::new("==", 2, numbers::eq),
    NativeFuncDef::new("<", 2, numbers::lt),
    NativeFuncDef::new("<=", 2, numbers::le),
    NativeFuncDef::new(">", 2, numbers::gt),
    NativeFuncDef::new(">=", 2, numbers::ge),
    NativeFuncDef::new("to_int", 1, numbers::to_int),
    NativeFuncDef::new("to_float", 1, numbers::to_float),
];

const SYMBOL_METHODS: &[NativeFuncDef] = &[NativeFuncDef::new("name", 1, strings::symbol_name)];

const STRING_METHODS: &[NativeFuncDef] = &[
    NativeFuncDef::new("+", 2, strings::concat),
    NativeFuncDef::new("==", 2, strings::eq),
    NativeFuncDef::new("size", 1, strings::size),
    NativeFuncDef::new("to_string", 1, strings::to_string),
    NativeFuncDef::new("to_symbol", 1, strings::to_symbol),
];

const TUPLE_METHODS: &[NativeFuncDef] = &[
    NativeFuncDef::new("size", 1, collections::tuple_size),
    NativeFuncDef::new("get", 2, collections::tuple_get),
];

const MODULE_METHODS: &[NativeFuncDef] = &[NativeFuncDef::new("name", 1, reflection::module_name)];

const FUNC_METHODS: &[NativeFuncDef] = &[
    NativeFuncDef::new("name", 1, reflection::func_name),
    NativeFuncDef::new("arity", 1, reflection::func_arity),
];

const EXCEPTION_METHODS: &[NativeFuncDef] = &[
    NativeFuncDef::new("message", 1, reflection::exception_message),
    NativeFuncDef::new("kind", 1, reflection::exception_kind),
];

pub(crate) const OBJECT_CLASS: NativeClassDef = NativeClassDef::new("Object", OBJECT_METHODS);
pub(crate) const CLASS_CLASS: NativeClassDef = NativeClassDef::new("Class", CLASS_METHODS);
pub(crate) const NIL_CLASS: NativeClassDef = NativeClassDef::new("Nil", &[]);
pub(crate) const BOOL_CLASS: NativeClassDef = NativeClassDef::new("Bool", &[]);
pub(crate) const INT_CLASS: NativeClassDef = NativeClassDef::new("Int", NUMBER_METHODS);
pub(crate) const FLOAT_CLASS: NativeClassDef = NativeClassDef::new("Float", NUMBER_METHODS);
pub(crate) const SYMBOL_CLASS: NativeClassDef =
    NativeClassDef::new("Symbol", SYMBOL_METHODS).with_extra_fields();
pub(crate) const STRING_CLASS: NativeClassDef =
    NativeClassDef::new("String", STRING_METHODS).with_extra_fields();
pub(crate) const TUPLE_CLASS: NativeClassDef =
    NativeClassDef::new("Tuple", TUPLE_METHODS).with_extra_fields();
pub(crate) const MODULE_CLASS: NativeClassDef = NativeClassDef::new("Module", MODULE_METHODS);
pub(crate) const FUNC_CLASS: NativeClassDef = NativeClassDef::new("Func", FUNC_METHODS);
pub(crate) const CFUNC_CLASS: NativeClassDef = NativeClassDef::new("CFunc", FUNC_METHODS);
pub(crate) const EXCEPTION_CLASS: NativeClassDef =
    NativeClassDef::new("Exception", EXCEPTION_METHODS);

pub(crate) const BASE_FUNCTIONS: &[NativeFuncDef] = &[
    NativeFuncDef::variadic("print", 0, base::print),
    NativeFuncDef::variadic("tuple", 0, base::tuple),
    NativeFuncDef::new("type", 1, base::type_of),
    NativeFuncDef::new("str", 1, base::str),
    NativeFuncDef::new("error", 1, base::error),
    NativeFuncDef::new("collect", 0, base::collect),
];
