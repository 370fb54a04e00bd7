use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    ClassTemplate, Code, FuncSpec, Instruction, Machine, ObjRef, Value,
    compiler::{ClassDecl, Expr, ExprKind, FuncDecl, Stmt, StmtKind, Target},
};

/// Code of one function under construction.
struct FuncBuilder {
    code: Code,
    /// symbol constants already in the pool
    symbols: AHashMap<String, u32>,
    /// `None` at module level, where every name is a global
    locals: Option<AHashMap<String, i32>>,
    line: u32,
}

impl FuncBuilder {
    fn new(name: &str, file: &Rc<str>, locals: Option<AHashMap<String, i32>>) -> Self {
        Self {
            code: Code {
                name: name.to_owned(),
                file: Rc::clone(file),
                ..Code::default()
            },
            symbols: AHashMap::new(),
            locals,
            line: 1,
        }
    }

    fn emit(&mut self, instruction: Instruction) -> usize {
        self.code.instructions.push(instruction);
        self.code.lines.push(self.line);
        self.code.instructions.len() - 1
    }

    fn here(&self) -> u32 {
        self.code.instructions.len() as u32
    }

    /// Points the jump at `at` to the next instruction.
    fn patch(&mut self, at: usize) {
        let here = self.here();
        match &mut self.code.instructions[at] {
            Instruction::Jump { target }
            | Instruction::JumpIfFalse { target }
            | Instruction::JumpIfFalseOrPop { target }
            | Instruction::JumpIfTrueOrPop { target } => *target = here,
            other => log::error!("patching non jump instruction {other:?}"),
        }
    }

    fn constant(&mut self, value: Value) -> u32 {
        self.code.constants.push(value);
        (self.code.constants.len() - 1) as u32
    }

    fn local(&self, name: &str) -> Option<i32> {
        self.locals.as_ref()?.get(name).copied()
    }

    fn set_line(&mut self, line: usize) {
        self.line = line as u32;
    }
}

/// Calls `bind` for every name a body assigns, not looking into nested functions.
fn collect_bindings(body: &[Stmt], bind: &mut impl FnMut(&str)) {
    for stmt in body {
        if let Some(name) = stmt.kind.binds() {
            bind(name);
        }
        match &stmt.kind {
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (_, branch) in branches {
                    collect_bindings(branch, bind);
                }
                collect_bindings(otherwise, bind);
            }
            StmtKind::While { body, .. } => collect_bindings(body, bind),
            _ => (),
        }
    }
}

/// Turns syntax into [`Code`] and function objects owned by `module`.
///
/// Constants are unreachable until the module holds the body, so the caller keeps a no collect
/// region open for the generator's whole lifetime.
pub(crate) struct CodeGen<'m> {
    machine: &'m mut Machine,
    module: ObjRef,
    file: Rc<str>,
}

impl<'m> CodeGen<'m> {
    pub(crate) fn new(machine: &'m mut Machine, module: ObjRef, file: &str) -> Self {
        Self {
            machine,
            module,
            file: Rc::from(file),
        }
    }

    /// Builds the module's top level function. A trailing expression is its result.
    pub(crate) fn module_body(&mut self, name: &str, program: &[Stmt]) -> ObjRef {
        let mut builder = FuncBuilder::new(name, &self.file, None);
        match program.split_last() {
            Some((
                Stmt {
                    kind: StmtKind::Expr(last),
                    ..
                },
                init,
            )) => {
                self.block(&mut builder, init);
                self.expr(&mut builder, last);
                builder.emit(Instruction::Return);
            }
            _ => {
                self.block(&mut builder, program);
                builder.emit(Instruction::PushNil);
                builder.emit(Instruction::Return);
            }
        }
        self.machine
            .new_func(self.module, FuncSpec::fixed(0, 0), Rc::new(builder.code))
    }

    fn function(&mut self, decl: &FuncDecl) -> Value {
        let mut locals = AHashMap::new();
        for (i, param) in decl.params.iter().enumerate() {
            locals.insert(param.clone(), -(i as i32 + 1));
        }
        let mut local_count = 0;
        collect_bindings(&decl.body, &mut |name| {
            if !locals.contains_key(name) {
                local_count += 1;
                locals.insert(name.to_owned(), local_count);
            }
        });

        let mut builder = FuncBuilder::new(&decl.name, &self.file, Some(locals));
        builder.set_line(decl.span.start.line);
        self.block(&mut builder, &decl.body);
        builder.set_line(decl.span.end.line);
        builder.emit(Instruction::PushNil);
        builder.emit(Instruction::Return);

        let spec = FuncSpec::fixed(decl.params.len() as u32, local_count as u32);
        let func = self
            .machine
            .new_func(self.module, spec, Rc::new(builder.code));
        Value::from_object(func)
    }

    fn symbol(&mut self, f: &mut FuncBuilder, name: &str) -> u32 {
        if let Some(&index) = f.symbols.get(name) {
            return index;
        }
        let symbol = self.machine.intern(name);
        let index = f.constant(Value::from_object(symbol));
        f.symbols.insert(name.to_owned(), index);
        index
    }

    fn block(&mut self, f: &mut FuncBuilder, body: &[Stmt]) {
        for stmt in body {
            self.stmt(f, stmt);
        }
    }

    fn store_name(&mut self, f: &mut FuncBuilder, name: &str) {
        match f.local(name) {
            Some(index) => f.emit(Instruction::StoreLocal { index }),
            None => {
                let name = self.symbol(f, name);
                f.emit(Instruction::StoreGlobal { name })
            }
        };
    }

    fn stmt(&mut self, f: &mut FuncBuilder, stmt: &Stmt) {
        f.set_line(stmt.span.start.line);
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(f, expr);
                f.emit(Instruction::Pop);
            }
            StmtKind::Assign {
                target: Target::Name(name),
                value,
            } => {
                self.expr(f, value);
                self.store_name(f, name);
            }
            StmtKind::Assign {
                target: Target::Attribute { object, name },
                value,
            } => {
                self.expr(f, object);
                self.expr(f, value);
                let name = self.symbol(f, name);
                f.emit(Instruction::StoreAttr { name });
            }
            StmtKind::Func(decl) => {
                let func = self.function(decl);
                let index = f.constant(func);
                f.emit(Instruction::PushConst { index });
                self.store_name(f, &decl.name);
            }
            StmtKind::Class(decl) => {
                self.class(f, decl);
                self.store_name(f, &decl.name);
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                let mut exits = Vec::new();
                for (condition, body) in branches {
                    self.expr(f, condition);
                    let skip = f.emit(Instruction::JumpIfFalse { target: 0 });
                    self.block(f, body);
                    exits.push(f.emit(Instruction::Jump { target: 0 }));
                    f.patch(skip);
                }
                self.block(f, otherwise);
                for exit in exits {
                    f.patch(exit);
                }
            }
            StmtKind::While { condition, body } => {
                let start = f.here();
                self.expr(f, condition);
                let exit = f.emit(Instruction::JumpIfFalse { target: 0 });
                self.block(f, body);
                f.emit(Instruction::Jump { target: start });
                f.patch(exit);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(value) => self.expr(f, value),
                    None => {
                        f.emit(Instruction::PushNil);
                    }
                }
                f.emit(Instruction::Return);
            }
        }
    }

    /// `[superclass or nil]` then the template instruction.
    fn class(&mut self, f: &mut FuncBuilder, decl: &ClassDecl) {
        match &decl.super_class {
            Some(super_class) => self.expr(f, super_class),
            None => {
                f.emit(Instruction::PushNil);
            }
        }
        let name = Value::from_object(self.machine.intern(&decl.name));
        let attributes = decl
            .attributes
            .iter()
            .map(|attribute| Value::from_object(self.machine.intern(attribute)))
            .collect();
        let methods = decl
            .methods
            .iter()
            .map(|method| {
                let selector = Value::from_object(self.machine.intern(&method.name));
                (selector, self.function(method))
            })
            .collect();
        f.code.classes.push(ClassTemplate {
            name,
            attributes,
            methods,
        });
        let template = (f.code.classes.len() - 1) as u32;
        f.emit(Instruction::MakeClass { template });
    }

    fn expr(&mut self, f: &mut FuncBuilder, expr: &Expr) {
        f.set_line(expr.span.start.line);
        match &expr.kind {
            ExprKind::Integer(value) if Value::small_int_fits(*value) => {
                f.emit(Instruction::PushInt { value: *value });
            }
            ExprKind::Integer(value) => {
                let boxed = self.machine.new_int(*value);
                let index = f.constant(boxed);
                f.emit(Instruction::PushConst { index });
            }
            ExprKind::Float(value) => {
                let float = self.machine.new_float(*value);
                let index = f.constant(float);
                f.emit(Instruction::PushConst { index });
            }
            ExprKind::String(text) => {
                let string = Value::from_object(self.machine.new_string(text.as_str()));
                let index = f.constant(string);
                f.emit(Instruction::PushConst { index });
            }
            ExprKind::Symbol(name) => {
                let index = self.symbol(f, name);
                f.emit(Instruction::PushConst { index });
            }
            ExprKind::Nil => {
                f.emit(Instruction::PushNil);
            }
            ExprKind::True => {
                f.emit(Instruction::PushTrue);
            }
            ExprKind::False => {
                f.emit(Instruction::PushFalse);
            }
            ExprKind::Name(name) => match f.local(name) {
                Some(index) => {
                    f.emit(Instruction::LoadLocal { index });
                }
                None => {
                    let name = self.symbol(f, name);
                    f.emit(Instruction::LoadGlobal { name });
                }
            },
            ExprKind::Call { callee, args } => {
                self.expr(f, callee);
                for arg in args {
                    self.expr(f, arg);
                }
                f.set_line(expr.span.start.line);
                f.emit(Instruction::Call {
                    argc: args.len() as u32,
                });
            }
            ExprKind::Send {
                receiver,
                selector,
                args,
            } => {
                let index = self.symbol(f, selector);
                f.emit(Instruction::PushConst { index });
                self.expr(f, receiver);
                for arg in args {
                    self.expr(f, arg);
                }
                f.set_line(expr.span.start.line);
                f.emit(Instruction::CallMethod {
                    argc: args.len() as u32 + 1,
                });
            }
            ExprKind::Attribute { object, name } => {
                self.expr(f, object);
                let name = self.symbol(f, name);
                f.emit(Instruction::LoadAttr { name });
            }
            ExprKind::Not(operand) => {
                self.expr(f, operand);
                f.emit(Instruction::Not);
            }
            ExprKind::And(left, right) => {
                self.expr(f, left);
                let exit = f.emit(Instruction::JumpIfFalseOrPop { target: 0 });
                self.expr(f, right);
                f.patch(exit);
            }
            ExprKind::Or(left, right) => {
                self.expr(f, left);
                let exit = f.emit(Instruction::JumpIfTrueOrPop { target: 0 });
                self.expr(f, right);
                f.patch(exit);
            }
        }
    }
}
