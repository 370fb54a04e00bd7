use std::{fmt, rc::Rc};

use crate::{Code, Error, Machine, ObjRef, ObjectBody, Value, Visitable, Visitor};

/// Native function body. Arguments and locals are read through the machine's stack API.
pub type NativeFn = fn(&mut Machine) -> Result<Value, Error>;

/// Argument and local slot counts of a callable.
///
/// A negative `argc` marks a variadic function that takes at least `-argc - 1` arguments.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FuncSpec {
    pub argc: i32,
    pub local_count: u32,
}

impl FuncSpec {
    pub const fn fixed(argc: u32, local_count: u32) -> Self {
        Self {
            argc: argc as i32,
            local_count,
        }
    }

    pub const fn variadic(min_args: u32, local_count: u32) -> Self {
        Self {
            argc: -(min_args as i32) - 1,
            local_count,
        }
    }

    #[inline]
    pub const fn is_variadic(self) -> bool {
        self.argc < 0
    }

    #[inline]
    pub const fn min_args(self) -> usize {
        if self.argc < 0 {
            (-self.argc - 1) as usize
        } else {
            self.argc as usize
        }
    }

    #[inline]
    pub const fn accepts(self, argc: usize) -> bool {
        if self.is_variadic() {
            argc >= self.min_args()
        } else {
            argc == self.min_args()
        }
    }

    pub fn describe(self) -> String {
        if self.is_variadic() {
            format!("at least {}", self.min_args())
        } else {
            self.min_args().to_string()
        }
    }
}

/// Static description of a native function, used in const tables.
#[derive(Debug, Clone, Copy)]
pub struct NativeFuncDef {
    pub name: &'static str,
    pub spec: FuncSpec,
    pub func: NativeFn,
}

impl NativeFuncDef {
    pub const fn new(name: &'static str, argc: u32, func: NativeFn) -> Self {
        Self {
            name,
            spec: FuncSpec::fixed(argc, 0),
            func,
        }
    }

    pub const fn variadic(name: &'static str, min_args: u32, func: NativeFn) -> Self {
        Self {
            name,
            spec: FuncSpec::variadic(min_args, 0),
            func,
        }
    }

    pub const fn with_locals(mut self, local_count: u32) -> Self {
        self.spec.local_count = local_count;
        self
    }
}

pub struct CFuncObj {
    pub(crate) name: Rc<str>,
    /// module whose globals the function sees, none for free standing natives
    pub(crate) module: Option<ObjRef>,
    pub(crate) spec: FuncSpec,
    pub(crate) func: NativeFn,
}

impl Visitable for CFuncObj {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.module.visit_edges(visitor);
    }
}

impl fmt::Debug for CFuncObj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CFuncObj")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .finish()
    }
}

/// Compiled script function.
pub struct FuncObj {
    pub(crate) module: ObjRef,
    pub(crate) spec: FuncSpec,
    pub(crate) code: Rc<Code>,
}

impl FuncObj {
    pub fn name(&self) -> &str {
        &self.code.name
    }
}

impl Visitable for FuncObj {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit_object(self.module);
        self.code.visit_edges(visitor);
    }
}

impl Machine {
    pub fn new_native_func(&mut self, def: &NativeFuncDef, module: Option<ObjRef>) -> ObjRef {
        let class = self.classes.cfunc;
        self.allocate(
            class,
            ObjectBody::CFunc(Box::new(CFuncObj {
                name: Rc::from(def.name),
                module,
                spec: def.spec,
                func: def.func,
            })),
        )
    }

    pub(crate) fn new_func(&mut self, module: ObjRef, spec: FuncSpec, code: Rc<Code>) -> ObjRef {
        let class = self.classes.func;
        self.allocate(
            class,
            ObjectBody::Func(Box::new(FuncObj { module, spec, code })),
        )
    }

    /// Module a callable resolves its globals in.
    pub fn callable_module(&self, callable: Value) -> Option<ObjRef> {
        let object = callable.as_object()?;
        match &self.heap.get(object).body {
            ObjectBody::Func(func) => Some(func.module),
            ObjectBody::CFunc(func) => func.module,
            _ => None,
        }
    }

    pub fn is_callable(&self, value: Value) -> bool {
        value.as_object().is_some_and(|object| {
            matches!(
                self.heap.get(object).body,
                ObjectBody::Func(_) | ObjectBody::CFunc(_) | ObjectBody::Class(_)
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variadic_spec_counts_minimum() {
        let spec = FuncSpec::variadic(1, 0);
        assert!(spec.is_variadic());
        assert_eq!(spec.min_args(), 1);
        assert!(!spec.accepts(0));
        assert!(spec.accepts(1));
        assert!(spec.accepts(9));
        assert_eq!(spec.describe(), "at least 1");
    }

    #[test]
    fn fixed_spec_requires_exact_count() {
        let spec = FuncSpec::fixed(2, 3);
        assert!(spec.accepts(2));
        assert!(!spec.accepts(1));
        assert!(!spec.accepts(3));
        assert_eq!(spec.describe(), "2");
    }
}
