use crate::{Error, Machine, Value, primitives::arg};

fn items(machine: &Machine) -> Result<&[Value], Error> {
    let this = arg(machine, 1)?;
    machine
        .tuple_items(this)
        .ok_or_else(|| Error::type_mismatch("receiver", "Tuple"))
}

pub fn tuple_size(machine: &mut Machine) -> Result<Value, Error> {
    let size = items(machine)?.len();
    Ok(machine.new_int(size as i64))
}

pub fn tuple_get(machine: &mut Machine) -> Result<Value, Error> {
    let index = arg(machine, 2)?;
    let Some(index) = machine.int_value(index) else {
        return Err(Error::type_mismatch("index", "Int"));
    };
    let items = items(machine)?;
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i).copied())
        .ok_or(Error::Index {
            index: index as isize,
        })
}
