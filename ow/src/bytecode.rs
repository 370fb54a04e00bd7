use std::rc::Rc;

use crate::{Value, Visitable, Visitor};

/// Operands that name a global, attribute or method refer to a symbol in the constant pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    PushNil,
    PushTrue,
    PushFalse,
    /// only values that fit a small int
    PushInt { value: i64 },
    PushConst { index: u32 },
    LoadLocal { index: i32 },
    /// pops into the slot
    StoreLocal { index: i32 },
    LoadGlobal { name: u32 },
    StoreGlobal { name: u32 },
    LoadAttr { name: u32 },
    /// `[object value]` -> `[]`
    StoreAttr { name: u32 },
    Pop,
    /// `[callee arg1 .. argn]` -> `[result]`
    Call { argc: u32 },
    /// `[name receiver arg1 .. argn]` -> `[result]`, argc counts the receiver
    CallMethod { argc: u32 },
    Jump { target: u32 },
    JumpIfFalse { target: u32 },
    /// jumps keeping the value when false, pops it otherwise
    JumpIfFalseOrPop { target: u32 },
    JumpIfTrueOrPop { target: u32 },
    Not,
    /// `[superclass or nil]` -> `[class]`
    MakeClass { template: u32 },
    Return,
}

/// Everything needed to build a class when its definition executes.
#[derive(Debug, Clone)]
pub struct ClassTemplate {
    pub name: Value,
    pub attributes: Vec<Value>,
    pub methods: Vec<(Value, Value)>,
}

impl Visitable for ClassTemplate {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        visitor.visit(self.name);
        self.attributes.visit_edges(visitor);
        for (name, method) in &self.methods {
            visitor.visit(*name);
            visitor.visit(*method);
        }
    }
}

/// Compiled body of one function or module top level. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Code {
    pub name: String,
    pub file: Rc<str>,
    pub instructions: Vec<Instruction>,
    /// source line of every instruction
    pub lines: Vec<u32>,
    pub constants: Vec<Value>,
    pub classes: Vec<ClassTemplate>,
}

impl Code {
    pub fn line_at(&self, pc: usize) -> Option<u32> {
        self.lines.get(pc).copied()
    }
}

impl Visitable for Code {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        self.constants.visit_edges(visitor);
        self.classes.visit_edges(visitor);
    }
}
