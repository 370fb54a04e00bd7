//! An embeddable dynamic language runtime.
//!
//! A [`Machine`] owns a garbage collected heap, a call stack and the loaded modules. Hosts
//! drive it through the stack based API in [`api`]: build values, load modules, invoke
//! callables and read results or exceptions back.

mod builtins;
mod bytecode;
mod error;
mod format;
mod heap;
mod interning;
mod interpreter;
mod invoke;
mod machine;
mod modules;
mod objects;
mod output;
mod primitives;
mod slots;
mod stack;
mod tagged;
mod visitor;

pub mod api;
pub mod compiler;

pub use api::{ExceptionExport, InvokeFlags, ModuleSource};
pub use builtins::{BuiltinClasses, SpecialValues};
pub use bytecode::{ClassTemplate, Code, Instruction};
pub use compiler::{CompileError, Pos, Span};
pub use error::{ApiError, Error, FaultKind};
pub use heap::{
    Finalizer, GcMarker, GcStats, Heap, HeapObject, HeapSettings, NoCollectRegion, ObjectBody,
};
pub use interning::Interner;
pub use invoke::InvokeMode;
pub use machine::{Machine, MachineConfig};
pub use modules::{ModuleManager, NativeModuleDef, SOURCE_EXTENSION};
pub use objects::*;
pub use output::{Output, SharedBuffer};
pub use slots::SlotTable;
pub use stack::{CallStack, FrameInfo, StackInfo};
pub use tagged::{ObjRef, SMALL_INT_MAX, SMALL_INT_MIN, Unpacked, VALUE_TAG_MASK, Value, ValueTag};
pub use visitor::{RootProvider, Visitable, Visitor};
