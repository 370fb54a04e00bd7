use std::rc::Rc;

use crate::{Error, FuncSpec, Machine, NativeFn, ObjRef, ObjectBody, TraceEntry, Value};

/// How the callee slot of a call window is interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvokeMode {
    /// the slot holds a callable
    Direct,
    /// the slot holds a method name, the first argument is the receiver
    Method,
    /// the slot holds a module whose top level runs, then `main` when asked for
    Module { call_main: bool },
}

enum Target {
    Native(NativeFn, FuncSpec),
    Script(FuncSpec),
    Class,
}

impl Machine {
    /// Calls through the window `[callee arg1 .. argn]` on top of the stack.
    ///
    /// The window is gone afterwards, whatever the outcome. Faults raised inside a frame come
    /// back as [`Error::Raised`] with a backtrace, faults from resolving the callee come back
    /// as they are.
    pub fn call(&mut self, argc: usize, mode: InvokeMode) -> Result<Value, Error> {
        let sp = self.stack.sp();
        let fp = self.stack.current().fp;
        if sp < fp + argc + 1 {
            return Err(Error::Index {
                index: argc as isize,
            });
        }
        let slot = sp - argc - 1;
        let result = match mode {
            InvokeMode::Direct => self.call_slot(slot, argc),
            InvokeMode::Method => self
                .resolve_method(slot, argc)
                .and_then(|()| self.call_slot(slot, argc)),
            InvokeMode::Module { call_main } => self.run_module_slot(slot, argc, call_main),
        };
        self.stack.truncate(slot);
        result
    }

    #[inline]
    fn slot_value(&self, slot: usize) -> Value {
        self.stack.get(slot).unwrap_or_default()
    }

    fn call_slot(&mut self, slot: usize, argc: usize) -> Result<Value, Error> {
        let callee = self.slot_value(slot);
        let target = callee
            .as_object()
            .and_then(|object| match &self.heap.get(object).body {
                ObjectBody::CFunc(func) => Some((object, Target::Native(func.func, func.spec))),
                ObjectBody::Func(func) => Some((object, Target::Script(func.spec))),
                ObjectBody::Class(_) => Some((object, Target::Class)),
                _ => None,
            });
        let Some((object, target)) = target else {
            let class = self.class_of(callee);
            return Err(Error::type_mismatch(
                format!("`{}' object", self.class_name(class)),
                "callable",
            ));
        };

        match target {
            Target::Native(func, spec) => {
                self.check_arity(object, spec, argc)?;
                self.enter_frame(slot, spec.local_count, |machine| func(machine))
            }
            Target::Script(spec) => {
                self.check_arity(object, spec, argc)?;
                self.enter_frame(slot, spec.local_count, |machine| machine.execute(object))
            }
            Target::Class => self.instantiate(slot, argc),
        }
    }

    fn check_arity(&self, callable: ObjRef, spec: FuncSpec, argc: usize) -> Result<(), Error> {
        if spec.accepts(argc) {
            return Ok(());
        }
        Err(Error::Arity {
            name: self.callable_name(callable),
            expected: spec.describe(),
            got: argc,
        })
    }

    pub(crate) fn callable_name(&self, callable: ObjRef) -> String {
        match &self.heap.get(callable).body {
            ObjectBody::Func(func) => func.name().to_owned(),
            ObjectBody::CFunc(func) => func.name.to_string(),
            ObjectBody::Class(_) => self.class_name(callable),
            other => other.kind_name().to_owned(),
        }
    }

    /// Runs `body` in a fresh frame with `local_count` nil locals.
    fn enter_frame(
        &mut self,
        slot: usize,
        local_count: u32,
        body: impl FnOnce(&mut Self) -> Result<Value, Error>,
    ) -> Result<Value, Error> {
        self.stack.push_frame(slot + 1)?;
        let nil = self.nil();
        for _ in 0..local_count {
            self.stack.push(nil);
        }
        log::trace!("enter frame {} at {}", self.stack.depth(), slot);
        // the frame stays live while the fault is converted, so the exception can name it
        let result = body(self).map_err(|error| self.unwind(error));
        self.stack.pop_frame();
        result
    }

    fn unwind(&mut self, error: Error) -> Error {
        let kind = error.kind();
        let exception = self.raise(error);
        let entry = self.trace_entry();
        self.push_trace(exception, entry);
        Error::Raised { exception, kind }
    }

    fn trace_entry(&self) -> TraceEntry {
        let pc = self.stack.current().pc;
        let callee = self.stack.callee().and_then(Value::as_object);
        match callee.map(|callee| &self.heap.get(callee).body) {
            Some(ObjectBody::Func(func)) => TraceEntry {
                function: func.name().to_owned(),
                line: func.code.line_at(pc),
            },
            Some(ObjectBody::CFunc(func)) => TraceEntry {
                function: func.name.to_string(),
                line: None,
            },
            _ => TraceEntry {
                function: "<unknown>".to_owned(),
                line: None,
            },
        }
    }

    /// Replaces the method name in `slot` with the method the receiver's class resolves.
    fn resolve_method(&mut self, slot: usize, argc: usize) -> Result<(), Error> {
        let Some(name) = self.as_symbol(self.slot_value(slot)) else {
            return Err(Error::type_mismatch("method name", "Symbol"));
        };
        if argc == 0 {
            return Err(Error::Arity {
                name: self.symbol_text(name).to_owned(),
                expected: "at least 1".to_owned(),
                got: 0,
            });
        }
        let receiver = self.slot_value(slot + 1);
        let class = self.class_of(receiver);
        let Some(method) = self
            .find_method(class, name)
            .and_then(|index| self.get_method(index))
        else {
            return Err(Error::NoSuchMethod {
                class: self.class_name(class),
                method: self.symbol_text(name).to_owned(),
            });
        };
        self.stack.set(slot, method);
        Ok(())
    }

    fn run_module_slot(&mut self, slot: usize, argc: usize, call_main: bool) -> Result<Value, Error> {
        let Some(module) = self.as_module(self.slot_value(slot)) else {
            return Err(Error::type_mismatch("callee", "Module"));
        };
        let mut result = self.nil();
        if let Some(body) = self.module_obj(module).and_then(|module| module.body) {
            self.stack.push(Value::from_object(body));
            result = self.call(0, InvokeMode::Direct)?;
        }
        if call_main {
            let name = self.intern("main");
            let Some(main) = self.get_global(module, name) else {
                return Err(Error::UndefinedGlobal("main".to_owned()));
            };
            self.stack.push(main);
            self.copy_arguments(slot, argc);
            result = self.call(argc, InvokeMode::Direct)?;
        }
        Ok(result)
    }

    fn copy_arguments(&mut self, slot: usize, argc: usize) {
        for offset in 1..=argc {
            let argument = self.slot_value(slot + offset);
            self.stack.push(argument);
        }
    }

    /// Calling a class makes an instance and runs its `init` on it.
    fn instantiate(&mut self, slot: usize, argc: usize) -> Result<Value, Error> {
        let Some(class) = self.slot_value(slot).as_object() else {
            return Err(Error::type_mismatch("callee", "Class"));
        };
        let instance = Value::from_object(self.allocate_instance(class)?);
        // the instance's header keeps the class alive once it takes the callee slot
        self.stack.set(slot, instance);
        let init = self.intern("init");
        match self
            .find_method(class, init)
            .and_then(|index| self.get_method(index))
        {
            Some(init) => {
                self.stack.push(init);
                self.stack.push(instance);
                self.copy_arguments(slot, argc);
                self.call(argc + 1, InvokeMode::Direct)?;
            }
            None if argc > 0 => {
                return Err(Error::Arity {
                    name: self.class_name(class),
                    expected: "0".to_owned(),
                    got: argc,
                });
            }
            None => (),
        }
        Ok(instance)
    }

    /// Convenience for hosts and natives: calls `callee` with `args` and returns the result.
    ///
    /// `callee` and `args` must be reachable until the window is pushed.
    pub fn call_value(&mut self, callee: Value, args: &[Value]) -> Result<Value, Error> {
        self.stack.push(callee);
        for &arg in args {
            self.stack.push(arg);
        }
        self.call(args.len(), InvokeMode::Direct)
    }

    /// Sends `method` to `receiver` with `args`.
    pub fn send(&mut self, receiver: Value, method: &str, args: &[Value]) -> Result<Value, Error> {
        // the receiver and arguments are not on the stack yet
        let name = {
            let _region = self.heap.no_collect_region();
            self.intern(method)
        };
        self.stack.push(Value::from_object(name));
        self.stack.push(receiver);
        for &arg in args {
            self.stack.push(arg);
        }
        self.call(args.len() + 1, InvokeMode::Method)
    }

    pub(crate) fn code_of(&self, func: ObjRef) -> Option<Rc<crate::Code>> {
        match &self.heap.get(func).body {
            ObjectBody::Func(func) => Some(Rc::clone(&func.code)),
            _ => None,
        }
    }
}
