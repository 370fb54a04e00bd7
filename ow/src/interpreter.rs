use crate::{ClassDef, Code, Error, Instruction, InvokeMode, Machine, ObjRef, ObjectBody, Value};

impl Machine {
    /// Runs the compiled function `func` in the frame the invocation engine just opened.
    pub(crate) fn execute(&mut self, func: ObjRef) -> Result<Value, Error> {
        let Some(code) = self.code_of(func) else {
            return Err(Error::type_mismatch("callee", "Func"));
        };
        let module = match &self.heap.get(func).body {
            ObjectBody::Func(func) => func.module,
            _ => return Err(Error::type_mismatch("callee", "Func")),
        };

        let mut pc = 0;
        while let Some(&instruction) = code.instructions.get(pc) {
            self.stack.current_mut().pc = pc;
            pc += 1;
            match instruction {
                Instruction::PushNil => self.push(self.nil()),
                Instruction::PushTrue => self.push(self.boolean(true)),
                Instruction::PushFalse => self.push(self.boolean(false)),
                Instruction::PushInt { value } => {
                    let value = self.new_int(value);
                    self.push(value);
                }
                Instruction::PushConst { index } => {
                    let value = constant(&code, index)?;
                    self.push(value);
                }
                Instruction::LoadLocal { index } => {
                    let value = self.stack.local(index as isize)?;
                    self.push(value);
                }
                Instruction::StoreLocal { index } => self.stack.store_local(index as isize)?,
                Instruction::LoadGlobal { name } => {
                    let name = self.symbol_constant(&code, name)?;
                    let value = self.resolve_global(module, name).ok_or_else(|| {
                        Error::UndefinedGlobal(self.symbol_text(name).to_owned())
                    })?;
                    self.push(value);
                }
                Instruction::StoreGlobal { name } => {
                    let name = self.symbol_constant(&code, name)?;
                    let value = self.pop_value()?;
                    self.set_global(module, name, value);
                }
                Instruction::LoadAttr { name } => {
                    let name = self.symbol_constant(&code, name)?;
                    let object = self.stack.local(0)?;
                    let value = self.load_attribute(object, name)?;
                    self.pop_value()?;
                    self.push(value);
                }
                Instruction::StoreAttr { name } => {
                    let name = self.symbol_constant(&code, name)?;
                    let value = self.pop_value()?;
                    let object = self.pop_value()?;
                    self.store_attribute(object, name, value)?;
                }
                Instruction::Pop => {
                    self.pop_value()?;
                }
                Instruction::Call { argc } => {
                    let result = self.call(argc as usize, InvokeMode::Direct)?;
                    self.push(result);
                }
                Instruction::CallMethod { argc } => {
                    let result = self.call(argc as usize, InvokeMode::Method)?;
                    self.push(result);
                }
                Instruction::Jump { target } => pc = target as usize,
                Instruction::JumpIfFalse { target } => {
                    let condition = self.pop_value()?;
                    if !self.truthy(condition) {
                        pc = target as usize;
                    }
                }
                Instruction::JumpIfFalseOrPop { target } => {
                    if self.truthy(self.stack.local(0)?) {
                        self.pop_value()?;
                    } else {
                        pc = target as usize;
                    }
                }
                Instruction::JumpIfTrueOrPop { target } => {
                    if self.truthy(self.stack.local(0)?) {
                        pc = target as usize;
                    } else {
                        self.pop_value()?;
                    }
                }
                Instruction::Not => {
                    let value = self.pop_value()?;
                    self.push(self.boolean(!self.truthy(value)));
                }
                Instruction::MakeClass { template } => {
                    let class = self.make_class(&code, template as usize)?;
                    self.push(class);
                }
                Instruction::Return => return self.pop_value(),
            }
        }
        Ok(self.nil())
    }

    #[inline]
    fn pop_value(&mut self) -> Result<Value, Error> {
        self.stack.pop().ok_or(Error::Index { index: 0 })
    }

    fn symbol_constant(&self, code: &Code, index: u32) -> Result<ObjRef, Error> {
        let value = constant(code, index)?;
        self.as_symbol(value)
            .ok_or_else(|| Error::type_mismatch(format!("constant {index}"), "Symbol"))
    }

    /// Attribute of an instance, static of a class.
    pub fn load_attribute(&self, object: Value, name: ObjRef) -> Result<Value, Error> {
        if let Some(target) = object.as_object() {
            let heap_object = self.heap.get(target);
            let found = match &heap_object.body {
                ObjectBody::Fields(fields) => self
                    .find_attribute(heap_object.class, name)
                    .and_then(|index| fields.get(index).copied()),
                ObjectBody::Class(class) => class.statics.lookup(name).copied(),
                _ => None,
            };
            if let Some(value) = found {
                return Ok(value);
            }
        }
        Err(self.no_such_attribute(object, name))
    }

    pub fn store_attribute(&mut self, object: Value, name: ObjRef, value: Value) -> Result<(), Error> {
        if let Some(target) = object.as_object() {
            let heap_object = self.heap.get(target);
            let class = heap_object.class;
            let is_instance = matches!(heap_object.body, ObjectBody::Fields(_));
            let is_class = matches!(heap_object.body, ObjectBody::Class(_));
            let stored = if is_instance {
                match self.find_attribute(class, name) {
                    Some(index) => self.set_field(target, index, value),
                    None => false,
                }
            } else {
                is_class && self.set_static(target, name, value)
            };
            if stored {
                return Ok(());
            }
        }
        Err(self.no_such_attribute(object, name))
    }

    fn no_such_attribute(&self, object: Value, name: ObjRef) -> Error {
        Error::NoSuchAttribute {
            class: self.class_name(self.class_of(object)),
            attribute: self.symbol_text(name).to_owned(),
        }
    }

    /// Builds the class described by template `index`, its superclass on top of the stack.
    fn make_class(&mut self, code: &Code, index: usize) -> Result<Value, Error> {
        let Some(template) = code.classes.get(index) else {
            return Err(Error::Index {
                index: index as isize,
            });
        };
        // the superclass leaves the stack before the class holds it
        let _region = self.heap.no_collect_region();
        let super_value = self.pop_value()?;
        let super_class = if super_value == self.nil() {
            self.classes.object
        } else {
            super_value
                .as_object()
                .filter(|&class| self.class_obj(class).is_some())
                .ok_or_else(|| Error::type_mismatch("superclass", "Class"))?
        };
        let def = ClassDef {
            name: self.as_symbol(template.name),
            attributes: template
                .attributes
                .iter()
                .filter_map(|&attribute| self.as_symbol(attribute))
                .collect(),
            methods: template
                .methods
                .iter()
                .filter_map(|&(name, method)| Some((self.as_symbol(name)?, method)))
                .collect(),
            ..ClassDef::default()
        };
        let class = self.new_class();
        self.load_class(class, Some(super_class), def)?;
        Ok(Value::from_object(class))
    }
}

#[inline]
fn constant(code: &Code, index: u32) -> Result<Value, Error> {
    code.constants
        .get(index as usize)
        .copied()
        .ok_or(Error::Index {
            index: index as isize,
        })
}
