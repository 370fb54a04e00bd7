use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};

use ahash::AHashMap;

use crate::{Error, Machine, NativeClassDef, NativeFuncDef, ObjRef, Value, Visitable, Visitor, compiler};

/// Extension of module source files.
pub const SOURCE_EXTENSION: &str = "ow";

/// Static description of a module implemented by the host.
#[derive(Debug, Clone, Copy)]
pub struct NativeModuleDef {
    pub name: &'static str,
    pub functions: &'static [NativeFuncDef],
    pub classes: &'static [NativeClassDef],
}

impl NativeModuleDef {
    pub const fn new(name: &'static str, functions: &'static [NativeFuncDef]) -> Self {
        Self {
            name,
            functions,
            classes: &[],
        }
    }

    pub const fn with_classes(mut self, classes: &'static [NativeClassDef]) -> Self {
        self.classes = classes;
        self
    }
}

/// Loaded modules by name, plus where to find the rest.
#[derive(Debug, Default)]
pub struct ModuleManager {
    loaded: AHashMap<String, ObjRef>,
    natives: AHashMap<&'static str, NativeModuleDef>,
    search_paths: Vec<PathBuf>,
}

impl ModuleManager {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            loaded: AHashMap::new(),
            natives: AHashMap::new(),
            search_paths,
        }
    }

    pub fn get(&self, name: &str) -> Option<ObjRef> {
        self.loaded.get(name).copied()
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// First existing `<path>/<name>.ow` along the search paths.
    pub fn find_source(&self, name: &str) -> Option<PathBuf> {
        self.search_paths
            .iter()
            .map(|path| path.join(name).with_extension(SOURCE_EXTENSION))
            .find(|path| path.is_file())
    }
}

impl Visitable for ModuleManager {
    fn visit_edges(&self, visitor: &mut dyn Visitor) {
        for module in self.loaded.values() {
            visitor.visit_object(*module);
        }
    }
}

impl Machine {
    /// Makes `def` loadable by name. A later registration under the same name wins.
    pub fn register_native_module(&mut self, def: NativeModuleDef) {
        log::debug!("registered native module {}", def.name);
        self.modules.natives.insert(def.name, def);
    }

    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.modules.search_paths.push(path.into());
    }

    /// Builds a module from a native definition. Every function and class becomes a global.
    pub fn make_native_module(&mut self, def: &NativeModuleDef) -> Result<ObjRef, Error> {
        let _region = self.no_collect();
        let module = self.new_module(Some(def.name));
        for function in def.functions {
            let name = self.intern(function.name);
            let func = self.new_native_func(function, Some(module));
            self.set_global(module, name, Value::from_object(func));
        }
        for class_def in def.classes {
            let class = self.define_native_class(class_def, Some(module))?;
            let name = self.intern(class_def.name);
            self.set_global(module, name, Value::from_object(class));
        }
        Ok(module)
    }

    /// Compiles `reader` into a new module named `name`. The module is returned un-run.
    pub fn compile_module(
        &mut self,
        name: Option<&str>,
        reader: impl Read,
        file: &str,
    ) -> Result<ObjRef, Error> {
        let module = self.new_module(name);
        // the module is reachable from nothing else while it compiles
        self.stack.push(Value::from_object(module));
        let compiled = compiler::compile(self, module, reader, file);
        self.stack.pop();
        compiled.map(|_| module)
    }

    /// Compiles the file at `path` into a new module.
    pub fn compile_file(&mut self, name: Option<&str>, path: &str) -> Result<ObjRef, Error> {
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_owned(),
            source,
        })?;
        self.compile_module(name, BufReader::new(file), path)
    }

    /// Loads a module by name: loaded modules first, then registered native modules, then
    /// `<name>.ow` along the search paths.
    ///
    /// Source modules are cached before they compile and dropped from the cache again when
    /// compiling fails.
    pub fn load_module(&mut self, name: &str) -> Result<ObjRef, Error> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module);
        }
        if let Some(def) = self.modules.natives.get(name).copied() {
            let module = self.make_native_module(&def)?;
            self.modules.loaded.insert(name.to_owned(), module);
            return Ok(module);
        }
        let Some(path) = self.modules.find_source(name) else {
            return Err(Error::ModuleNotFound(name.to_owned()));
        };
        let display = path.display().to_string();
        let file = File::open(&path).map_err(|source| Error::Io {
            path: display.clone(),
            source,
        })?;

        log::debug!("loading module {name} from {display}");
        let module = self.new_module(Some(name));
        self.modules.loaded.insert(name.to_owned(), module);
        if let Err(error) = compiler::compile(self, module, BufReader::new(file), &display) {
            self.modules.loaded.remove(name);
            return Err(error);
        }
        Ok(module)
    }

    pub fn loaded_module(&self, name: &str) -> Option<ObjRef> {
        self.modules.get(name)
    }
}
