//! Embedding API.
//!
//! Hosts and natives talk to a machine through the value stack of the current frame: push
//! values, address them by local index (0 is the top, -1 the first argument, 1 the first
//! local), invoke callables and read results back. Every operation reports a status as
//! [`ApiError`] and never unwinds through the host.
use std::{io::Write, path::Path};

use bitflags::bitflags;

use crate::{
    ApiError, Error, InvokeMode, Machine, NativeModuleDef, ObjRef, PrintFlags, Value,
};

bitflags! {
    /// How [`Machine::invoke`] treats the call window. No mode flag means a direct call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InvokeFlags: u8 {
        /// the callee slot holds a method name symbol, the first argument is the receiver
        const METHOD = 1;
        /// the callee slot holds a module, its top level runs
        const MODULE = 2;
        /// with `MODULE`, also call the module's `main` with the arguments
        const MODULE_MAIN = 4;
        /// drop the result instead of pushing it, faults are still pushed
        const NO_RETURN = 8;
    }
}

/// Where [`Machine::make_module`] takes the module from.
#[derive(Debug, Clone, Copy)]
pub enum ModuleSource<'a> {
    File(&'a Path),
    String(&'a str),
    Stdin,
    Native(&'a NativeModuleDef),
    /// by name, through the module manager
    Load,
    Empty,
}

/// What [`Machine::read_exception`] does with an exception.
pub enum ExceptionExport<'a> {
    /// push the message value
    Push,
    Print(&'a mut dyn Write),
    /// NUL terminated, truncated to fit
    Buffer(&'a mut [u8]),
}

impl Machine {
    /// Pushes a value onto the stack
    #[inline]
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn push_nil(&mut self) {
        self.push(self.nil());
    }

    pub fn push_bool(&mut self, value: bool) {
        self.push(self.boolean(value));
    }

    /// Integers outside the small int range are boxed.
    pub fn push_int(&mut self, value: i64) {
        let value = self.new_int(value);
        self.push(value);
    }

    pub fn push_float(&mut self, value: f64) {
        let value = self.new_float(value);
        self.push(value);
    }

    pub fn push_symbol(&mut self, name: &str) {
        let symbol = self.intern(name);
        self.push(Value::from_object(symbol));
    }

    pub fn push_string(&mut self, text: &str) {
        let string = self.new_string(text);
        self.push(Value::from_object(string));
    }

    /// Pops `count` values into a tuple and pushes it.
    pub fn push_tuple(&mut self, count: usize) -> Result<(), ApiError> {
        let sp = self.stack.sp();
        if sp < self.stack.current().fp + count {
            return Err(ApiError::Index);
        }
        // the items stay on the stack until the tuple holds them
        let items = self.stack.values()[sp - count..].to_vec();
        let tuple = self.new_tuple(items);
        self.stack.truncate(sp - count);
        self.push(Value::from_object(tuple));
        Ok(())
    }

    /// Turns `error` into an exception on top of the stack.
    fn fail(&mut self, error: Error) -> ApiError {
        let exception = self.raise(error);
        self.push(exception);
        ApiError::Fail
    }

    /// Builds a module and pushes it. Compile, I/O and lookup faults push an exception instead.
    pub fn make_module(&mut self, name: Option<&str>, source: ModuleSource) -> Result<(), ApiError> {
        let module = match source {
            ModuleSource::File(path) => self.compile_file(name, &path.to_string_lossy()),
            ModuleSource::String(text) => self.compile_module(name, text.as_bytes(), "<string>"),
            ModuleSource::Stdin => self.compile_module(name, std::io::stdin().lock(), "<stdin>"),
            ModuleSource::Native(def) => self.make_native_module(def),
            ModuleSource::Load => self.load_module(name.unwrap_or_default()),
            ModuleSource::Empty => Ok(self.new_module(name)),
        };
        match module {
            Ok(module) => {
                self.push(Value::from_object(module));
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    #[inline]
    fn api_local(&self, index: i32) -> Result<Value, ApiError> {
        self.stack
            .local(index as isize)
            .map_err(|_| ApiError::Index)
    }

    /// Pushes a copy of local `index`.
    pub fn load_local(&mut self, index: i32) -> Result<(), ApiError> {
        let value = self.api_local(index)?;
        self.push(value);
        Ok(())
    }

    /// Pops the top value into local `index`. Index 0 is rejected.
    pub fn store_local(&mut self, index: i32) -> Result<(), ApiError> {
        self.stack
            .store_local(index as isize)
            .map_err(|_| ApiError::Index)
    }

    /// Module of the running callee, whose globals `load_global` and `store_global` address.
    fn current_module(&self) -> Result<ObjRef, ApiError> {
        self.stack
            .callee()
            .and_then(|callee| self.callable_module(callee))
            .ok_or(ApiError::Index)
    }

    /// Pushes global `name` of the running callee's module.
    pub fn load_global(&mut self, name: &str) -> Result<(), ApiError> {
        let module = self.current_module()?;
        let name = self.intern(name);
        let value = self.get_global(module, name).ok_or(ApiError::Index)?;
        self.push(value);
        Ok(())
    }

    /// Pops the top value into global `name` of the running callee's module.
    pub fn store_global(&mut self, name: &str) -> Result<(), ApiError> {
        let module = self.current_module()?;
        if self.stack.sp() <= self.stack.current().fp {
            return Err(ApiError::Index);
        }
        let name = self.intern(name);
        let value = self.stack.pop().ok_or(ApiError::Index)?;
        self.set_global(module, name, value);
        Ok(())
    }

    /// Pushes global `name` of the module at local `index`.
    pub fn load_module_global(&mut self, index: i32, name: &str) -> Result<(), ApiError> {
        let module = self.api_local(index)?;
        let module = self.as_module(module).ok_or(ApiError::Type)?;
        let name = self.intern(name);
        let value = self.get_global(module, name).ok_or(ApiError::Index)?;
        self.push(value);
        Ok(())
    }

    /// Pushes `count` copies of the top value.
    pub fn dup(&mut self, count: usize) -> Result<(), ApiError> {
        self.stack.dup(count).map_err(|_| ApiError::Index)
    }

    /// Drops up to `count` values, never below the frame's locals. Returns how many values
    /// are left above the frame pointer.
    pub fn drop(&mut self, count: usize) -> usize {
        self.stack.drop_values(count)
    }

    /// Local `index` when it is an instance of `class`.
    fn read_instance(&self, index: i32, class: ObjRef) -> Result<Value, ApiError> {
        let value = self.api_local(index)?;
        if value.is_small_int() || !self.is_instance(value, class) {
            return Err(ApiError::Type);
        }
        Ok(value)
    }

    pub fn read_nil(&self, index: i32) -> Result<(), ApiError> {
        self.read_instance(index, self.classes.nil).map(|_| ())
    }

    pub fn read_bool(&self, index: i32) -> Result<bool, ApiError> {
        let value = self.read_instance(index, self.classes.boolean)?;
        Ok(value == self.boolean(true))
    }

    pub fn read_int(&self, index: i32) -> Result<i64, ApiError> {
        let value = self.api_local(index)?;
        if let Some(small) = value.as_small_int() {
            return Ok(small);
        }
        if !self.is_instance(value, self.classes.int) {
            return Err(ApiError::Type);
        }
        self.int_value(value).ok_or(ApiError::Type)
    }

    pub fn read_float(&self, index: i32) -> Result<f64, ApiError> {
        let value = self.read_instance(index, self.classes.float)?;
        self.float_value(value).ok_or(ApiError::Type)
    }

    pub fn read_symbol(&self, index: i32) -> Result<&str, ApiError> {
        let value = self.read_instance(index, self.classes.symbol)?;
        self.text_of(value).ok_or(ApiError::Type)
    }

    pub fn read_string(&self, index: i32) -> Result<&str, ApiError> {
        let value = self.read_instance(index, self.classes.string)?;
        self.text_of(value).ok_or(ApiError::Type)
    }

    /// Copies string local `index` into `buffer`, NUL terminated when there is room.
    ///
    /// Returns the number of bytes copied, or [`ApiError::Fail`] when the string had to be
    /// truncated.
    pub fn read_string_to(&self, index: i32, buffer: &mut [u8]) -> Result<usize, ApiError> {
        let bytes = self.read_string(index)?.as_bytes();
        let count = bytes.len().min(buffer.len());
        buffer[..count].copy_from_slice(&bytes[..count]);
        if count < buffer.len() {
            buffer[count] = 0;
        } else if count < bytes.len() {
            return Err(ApiError::Fail);
        }
        Ok(count)
    }

    /// Exports exception local `index`: push its message value, print it, or copy it out.
    pub fn read_exception(
        &mut self,
        index: i32,
        export: ExceptionExport,
        flags: PrintFlags,
    ) -> Result<(), ApiError> {
        let value = self.read_instance(index, self.classes.exception)?;
        match export {
            ExceptionExport::Push => {
                let message = self
                    .exception_obj(value)
                    .map(|exception| exception.message)
                    .ok_or(ApiError::Type)?;
                self.push(message);
            }
            ExceptionExport::Print(sink) => {
                if let Err(err) = self.print_exception(value, sink, flags) {
                    log::warn!("failed to print exception: {err}");
                }
            }
            ExceptionExport::Buffer(buffer) => {
                self.exception_to_buffer(value, flags, buffer);
            }
        }
        Ok(())
    }

    /// Invokes the window `[callee arg1 .. argn]` on top of the stack.
    ///
    /// On success the window is replaced by the result, or just removed with
    /// [`InvokeFlags::NO_RETURN`]. On failure it is replaced by the exception and
    /// [`ApiError::Fail`] is returned. A window larger than the frame is an
    /// [`ApiError::Index`] and leaves the stack alone.
    pub fn invoke(&mut self, argc: usize, flags: InvokeFlags) -> Result<(), ApiError> {
        if self.stack.sp() < self.stack.current().fp + argc + 1 {
            return Err(ApiError::Index);
        }
        let mode = if flags.contains(InvokeFlags::METHOD) {
            InvokeMode::Method
        } else if flags.contains(InvokeFlags::MODULE) {
            InvokeMode::Module {
                call_main: flags.contains(InvokeFlags::MODULE_MAIN),
            }
        } else {
            InvokeMode::Direct
        };
        match self.call(argc, mode) {
            Ok(result) => {
                if !flags.contains(InvokeFlags::NO_RETURN) {
                    self.push(result);
                }
                Ok(())
            }
            Err(error) => Err(self.fail(error)),
        }
    }
}
