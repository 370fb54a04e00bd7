use crate::{Error, Machine, ObjectBody, Value, primitives::arg};

pub fn class_name(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let Some(class) = this.as_object().filter(|&class| machine.class_obj(class).is_some()) else {
        return Err(Error::type_mismatch("receiver", "Class"));
    };
    let name = machine.class_name(class);
    Ok(Value::from_object(machine.new_string(name)))
}

pub fn class_super(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let super_class = this
        .as_object()
        .and_then(|class| machine.class_obj(class))
        .ok_or_else(|| Error::type_mismatch("receiver", "Class"))?
        .super_class;
    Ok(super_class.map(Value::from_object).unwrap_or(machine.nil()))
}

pub fn module_name(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let name = this
        .as_object()
        .and_then(|module| machine.module_obj(module))
        .ok_or_else(|| Error::type_mismatch("receiver", "Module"))?
        .name
        .clone();
    Ok(match name {
        Some(name) => Value::from_object(machine.new_string(name)),
        None => machine.nil(),
    })
}

pub fn func_name(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let name = match this.as_object().map(|func| &machine.heap.get(func).body) {
        Some(ObjectBody::Func(func)) => func.name().to_owned(),
        Some(ObjectBody::CFunc(func)) => func.name.to_string(),
        _ => return Err(Error::type_mismatch("receiver", "Func")),
    };
    Ok(Value::from_object(machine.new_string(name)))
}

/// Declared argument count, negative for variadic natives.
pub fn func_arity(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let argc = match this.as_object().map(|func| &machine.heap.get(func).body) {
        Some(ObjectBody::Func(func)) => func.spec.argc,
        Some(ObjectBody::CFunc(func)) => func.spec.argc,
        _ => return Err(Error::type_mismatch("receiver", "Func")),
    };
    Ok(machine.new_int(i64::from(argc)))
}

pub fn exception_message(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    machine
        .exception_obj(this)
        .map(|exception| exception.message)
        .ok_or_else(|| Error::type_mismatch("receiver", "Exception"))
}

pub fn exception_kind(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let kind = machine
        .exception_kind(this)
        .ok_or_else(|| Error::type_mismatch("receiver", "Exception"))?;
    Ok(Value::from_object(machine.intern(kind.name())))
}
