use crate::{
    Error, Machine, ObjectBody, Value,
    primitives::{arg, bool_object},
};

fn string_text(machine: &Machine, value: Value, what: &str) -> Result<String, Error> {
    match value.as_object().map(|object| &machine.heap.get(object).body) {
        Some(ObjectBody::String(string)) => Ok(string.as_str().to_owned()),
        _ => Err(Error::type_mismatch(what, "String")),
    }
}

pub fn concat(machine: &mut Machine) -> Result<Value, Error> {
    let mut text = string_text(machine, arg(machine, 1)?, "receiver")?;
    text.push_str(&string_text(machine, arg(machine, 2)?, "right operand")?);
    Ok(Value::from_object(machine.new_string(text)))
}

pub fn eq(machine: &mut Machine) -> Result<Value, Error> {
    let this = string_text(machine, arg(machine, 1)?, "receiver")?;
    let other = arg(machine, 2)?;
    let equal = match other.as_object().map(|object| &machine.heap.get(object).body) {
        Some(ObjectBody::String(other)) => other.as_str() == this,
        _ => false,
    };
    bool_object(machine, equal)
}

pub fn size(machine: &mut Machine) -> Result<Value, Error> {
    let this = string_text(machine, arg(machine, 1)?, "receiver")?;
    Ok(machine.new_int(this.chars().count() as i64))
}

pub fn to_string(machine: &mut Machine) -> Result<Value, Error> {
    arg(machine, 1)
}

pub fn to_symbol(machine: &mut Machine) -> Result<Value, Error> {
    let this = string_text(machine, arg(machine, 1)?, "receiver")?;
    Ok(Value::from_object(machine.intern(&this)))
}

pub fn symbol_name(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    let Some(symbol) = machine.as_symbol(this) else {
        return Err(Error::type_mismatch("receiver", "Symbol"));
    };
    let name = machine.symbol_text(symbol).to_owned();
    Ok(Value::from_object(machine.new_string(name)))
}
