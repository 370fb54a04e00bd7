use crate::{
    Error, Machine, Value,
    primitives::{arg, bool_object},
};

pub fn identical(machine: &mut Machine) -> Result<Value, Error> {
    let (this, other) = (arg(machine, 1)?, arg(machine, 2)?);
    bool_object(machine, this == other)
}

pub fn class(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    Ok(Value::from_object(machine.class_of(this)))
}

pub fn is_a(machine: &mut Machine) -> Result<Value, Error> {
    let (this, class) = (arg(machine, 1)?, arg(machine, 2)?);
    let Some(class) = class.as_object().filter(|&c| machine.class_obj(c).is_some()) else {
        return Err(Error::type_mismatch("argument of `is_a'", "Class"));
    };
    bool_object(machine, machine.is_instance(this, class))
}

pub fn to_string(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let text = machine.display_value(this);
    Ok(Value::from_object(machine.new_string(text)))
}
