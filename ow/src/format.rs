use std::fmt::Write;

use crate::{Code, Instruction, Machine, ObjectBody, Value};

const DEFAULT_MAX_DEPTH: usize = 4;

impl Machine {
    /// Human readable form, strings and symbols without quotes.
    pub fn display_value(&self, value: Value) -> String {
        let mut output = String::new();
        self.write_value(&mut output, value, false, DEFAULT_MAX_DEPTH);
        output
    }

    /// Source like form, strings quoted and symbols with their colon.
    pub fn repr_value(&self, value: Value) -> String {
        let mut output = String::new();
        self.write_value(&mut output, value, true, DEFAULT_MAX_DEPTH);
        output
    }

    /// Prints the current stack, innermost frame's values last.
    pub fn stack_to_string(&self) -> String {
        let values = self.stack.values();
        let mut output = String::new();
        for (slot, value) in values.iter().enumerate() {
            let _ = writeln!(&mut output, "[{slot:02}] {}", self.repr_value(*value));
        }
        output
    }

    /// Listing of a compiled function, nested functions and class methods included.
    pub fn disassemble(&self, func: Value) -> Option<String> {
        let code = self.code_of(func.as_object()?)?;
        let mut output = String::new();
        self.write_code(&mut output, &code, 0);
        Some(output)
    }

    fn write_code(&self, output: &mut String, code: &Code, indent: usize) {
        let pad = " ".repeat(indent);
        let _ = writeln!(output, "{pad}== {} ({}) ==", code.name, code.file);
        for (pc, instruction) in code.instructions.iter().enumerate() {
            let line = code.line_at(pc).unwrap_or_default();
            let _ = write!(output, "{pad}{pc:04} {line:>4}  {instruction:?}");
            match instruction {
                Instruction::PushConst { index }
                | Instruction::LoadGlobal { name: index }
                | Instruction::StoreGlobal { name: index }
                | Instruction::LoadAttr { name: index }
                | Instruction::StoreAttr { name: index } => {
                    if let Some(constant) = code.constants.get(*index as usize) {
                        let _ = write!(output, "  ; {}", self.repr_value(*constant));
                    }
                }
                _ => (),
            }
            output.push('\n');
        }

        let nested = code
            .constants
            .iter()
            .copied()
            .chain(code.classes.iter().flat_map(|class| class.methods.iter().map(|(_, method)| *method)));
        for func in nested {
            if let Some(inner) = func.as_object().and_then(|func| self.code_of(func)) {
                self.write_code(output, &inner, indent + 4);
            }
        }
    }

    fn write_value(&self, output: &mut String, value: Value, quoted: bool, depth: usize) {
        let Some(object) = value.as_object() else {
            let _ = write!(output, "{}", value.as_small_int().unwrap_or_default());
            return;
        };
        let Some(heap_object) = self.heap.try_get(object) else {
            let _ = write!(output, "<dangling {object}>");
            return;
        };
        let _ = match &heap_object.body {
            ObjectBody::Int(value) => write!(output, "{value}"),
            ObjectBody::Float(value) => write!(output, "{value:?}"),
            ObjectBody::Bool(value) => write!(output, "{value}"),
            ObjectBody::Nil => write!(output, "nil"),
            ObjectBody::String(string) if quoted => write!(output, "{:?}", string.as_str()),
            ObjectBody::String(string) => write!(output, "{}", string.as_str()),
            ObjectBody::Symbol(symbol) if quoted => write!(output, ":{}", symbol.as_str()),
            ObjectBody::Symbol(symbol) => write!(output, "{}", symbol.as_str()),
            ObjectBody::Tuple(_) if depth == 0 => write!(output, "(...)"),
            ObjectBody::Tuple(tuple) => {
                output.push('(');
                for (i, item) in tuple.items().iter().enumerate() {
                    if i > 0 {
                        output.push_str(", ");
                    }
                    self.write_value(output, *item, true, depth - 1);
                }
                if tuple.items().len() == 1 {
                    output.push(',');
                }
                output.push(')');
                Ok(())
            }
            ObjectBody::Class(_) => write!(output, "<class {}>", self.class_name(object)),
            ObjectBody::Module(module) => {
                write!(output, "<module {}>", module.name().unwrap_or("<anonymous>"))
            }
            ObjectBody::Func(func) => write!(output, "<func {}>", func.name()),
            ObjectBody::CFunc(func) => write!(output, "<native func {}>", func.name),
            ObjectBody::Exception(_) => write!(
                output,
                "<{}: {}>",
                self.exception_kind(value).map_or("Exception", |kind| kind.name()),
                self.exception_message(value).unwrap_or_default()
            ),
            ObjectBody::Fields(_) => {
                write!(output, "<{} object>", self.class_name(heap_object.class))
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use crate::{FaultKind, Machine, Value};

    #[test]
    fn scalars_print_plainly() {
        let mut machine = Machine::new();
        assert_eq!(machine.display_value(Value::small_int(-12).unwrap()), "-12");
        let big = machine.new_int(i64::MAX);
        assert_eq!(machine.display_value(big), i64::MAX.to_string());
        let float = machine.new_float(2.0);
        assert_eq!(machine.display_value(float), "2.0");
        assert_eq!(machine.display_value(machine.nil()), "nil");
        assert_eq!(machine.display_value(machine.boolean(false)), "false");
    }

    #[test]
    fn strings_are_quoted_only_in_repr() {
        let mut machine = Machine::new();
        let string = Value::from_object(machine.new_string("hi"));
        assert_eq!(machine.display_value(string), "hi");
        assert_eq!(machine.repr_value(string), "\"hi\"");
        let symbol = Value::from_object(machine.intern("sym"));
        assert_eq!(machine.repr_value(symbol), ":sym");
    }

    #[test]
    fn tuples_and_objects() {
        let mut machine = Machine::new();
        let _region = machine.no_collect();
        let text = Value::from_object(machine.new_string("a"));
        let one = Value::small_int(1).unwrap();
        let pair = Value::from_object(machine.new_tuple(vec![one, text]));
        assert_eq!(machine.display_value(pair), "(1, \"a\")");
        let single = Value::from_object(machine.new_tuple(vec![one]));
        assert_eq!(machine.display_value(single), "(1,)");
        let int_class = machine.classes().int;
        assert_eq!(machine.display_value(int_class.into()), "<class Int>");
        let error = Value::from_object(machine.new_error(FaultKind::Type, "bad"));
        assert_eq!(machine.display_value(error), "<TypeError: bad>");
    }

    #[test]
    fn disassembly_lists_nested_functions() {
        let mut machine = Machine::new();
        let module = machine.new_module(Some("listing"));
        machine.push(Value::from_object(module));
        let source = "func twice(x)\n  return x * 2\nend\ntwice(21)";
        let body = crate::compiler::compile(&mut machine, module, source.as_bytes(), "listing.ow")
            .unwrap();
        let listing = machine.disassemble(Value::from_object(body)).unwrap();
        assert!(listing.starts_with("== listing.ow (listing.ow) =="), "{listing}");
        assert!(listing.contains("    == twice (listing.ow) =="), "{listing}");
        assert!(listing.contains("LoadGlobal { name: 1 }  ; :twice"), "{listing}");
        assert!(machine.disassemble(Value::small_int(1).unwrap()).is_none());
    }
}
