use std::io::Write;

use crate::{Error, FaultKind, Machine, Value, primitives::arg};

fn arguments(machine: &Machine) -> Vec<Value> {
    let frame = machine.stack.current();
    machine.stack.values()[frame.arg_list..frame.fp].to_vec()
}

pub fn print(machine: &mut Machine) -> Result<Value, Error> {
    let line = arguments(machine)
        .into_iter()
        .map(|value| machine.display_value(value))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(machine.output, "{line}").map_err(|source| Error::Io {
        path: "<output>".to_owned(),
        source,
    })?;
    Ok(machine.nil())
}

pub fn tuple(machine: &mut Machine) -> Result<Value, Error> {
    // the items stay on the stack while the tuple is allocated
    let items = arguments(machine);
    Ok(Value::from_object(machine.new_tuple(items)))
}

pub fn type_of(machine: &mut Machine) -> Result<Value, Error> {
    let value = arg(machine, 1)?;
    Ok(Value::from_object(machine.class_of(value)))
}

pub fn str(machine: &mut Machine) -> Result<Value, Error> {
    let value = arg(machine, 1)?;
    if machine.is_instance(value, machine.classes.string) {
        return Ok(value);
    }
    let text = machine.display_value(value);
    Ok(Value::from_object(machine.new_string(text)))
}

pub fn error(machine: &mut Machine) -> Result<Value, Error> {
    let message = arg(machine, 1)?;
    let exception = machine.new_exception(FaultKind::User, message, None);
    Err(Error::Raised {
        exception: Value::from_object(exception),
        kind: FaultKind::User,
    })
}

pub fn collect(machine: &mut Machine) -> Result<Value, Error> {
    let freed = machine.collect_garbage();
    Ok(machine.new_int(freed as i64))
}
