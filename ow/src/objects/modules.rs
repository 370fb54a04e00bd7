use crate::{Machine, ObjRef, ObjectBody, SlotTable, Value, Visitable, Visitor};

/// Symbol keyed globals plus the compiled top level, if any.
pub struct ModuleObj {
    pub(crate) name: Option<String>,
    pub(crate) globals: SlotTable<Value>,
    /// top level function, run when the module is invoked
    pub(crate) body: Option<ObjRef>,
}

impl ModuleObj {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Visitable for ModuleObj {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.globals.visit_edges(visitor);
        self.body.visit_edges(visitor);
    }
}

impl Machine {
    pub fn new_module(&mut self, name: Option<&str>) -> ObjRef {
        let class = self.classes.module;
        self.allocate(
            class,
            ObjectBody::Module(Box::new(ModuleObj {
                name: name.map(str::to_owned),
                globals: SlotTable::new(),
                body: None,
            })),
        )
    }

    #[inline]
    pub(crate) fn module_obj(&self, module: ObjRef) -> Option<&ModuleObj> {
        match &self.heap.try_get(module)?.body {
            ObjectBody::Module(module) => Some(module),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn module_obj_mut(&mut self, module: ObjRef) -> Option<&mut ModuleObj> {
        match &mut self.heap.try_get_mut(module)?.body {
            ObjectBody::Module(module) => Some(module),
            _ => None,
        }
    }

    pub fn as_module(&self, value: Value) -> Option<ObjRef> {
        let module = value.as_object()?;
        self.module_obj(module).map(|_| module)
    }

    pub fn get_global(&self, module: ObjRef, name: ObjRef) -> Option<Value> {
        self.module_obj(module)?.globals.lookup(name).copied()
    }

    /// Binds `name` in `module`. False when `module` is not a module.
    pub fn set_global(&mut self, module: ObjRef, name: ObjRef, value: Value) -> bool {
        match self.module_obj_mut(module) {
            Some(module) => {
                module.globals.insert(name, value);
                true
            }
            None => false,
        }
    }

    /// Global lookup as the interpreter does it: the module first, then the base module.
    pub fn resolve_global(&self, module: ObjRef, name: ObjRef) -> Option<Value> {
        self.get_global(module, name)
            .or_else(|| self.get_global(self.base_module, name))
    }

    /// Compiled top level of `module`, `None` for native and empty modules.
    pub fn module_body(&self, module: ObjRef) -> Option<ObjRef> {
        self.module_obj(module)?.body
    }

    pub(crate) fn set_module_body(&mut self, module: ObjRef, body: ObjRef) {
        if let Some(module) = self.module_obj_mut(module) {
            module.body = Some(body);
        }
    }

    /// Global names of `module` in definition order.
    pub fn global_names(&self, module: ObjRef) -> Vec<String> {
        self.module_obj(module)
            .map(|module| {
                module
                    .globals
                    .iter()
                    .map(|(name, _)| self.symbol_text(name).to_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}
