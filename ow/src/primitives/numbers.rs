use std::cmp::Ordering;

use crate::{
    Error, Machine, ObjectBody, Value,
    primitives::{arg, bool_object},
};

#[derive(Debug, Copy, Clone, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }
}

impl Machine {
    /// Small int when it fits, boxed `Int` otherwise.
    pub fn new_int(&mut self, value: i64) -> Value {
        match Value::small_int(value) {
            Some(value) => value,
            None => {
                let class = self.classes.int;
                Value::from_object(self.allocate(class, ObjectBody::Int(value)))
            }
        }
    }

    pub fn int_value(&self, value: Value) -> Option<i64> {
        if let Some(small) = value.as_small_int() {
            return Some(small);
        }
        match self.heap.get(value.as_object()?).body {
            ObjectBody::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn new_float(&mut self, value: f64) -> Value {
        let class = self.classes.float;
        Value::from_object(self.allocate(class, ObjectBody::Float(value)))
    }

    pub fn float_value(&self, value: Value) -> Option<f64> {
        match self.heap.get(value.as_object()?).body {
            ObjectBody::Float(value) => Some(value),
            _ => None,
        }
    }
}

fn number(machine: &Machine, value: Value) -> Option<Number> {
    machine
        .int_value(value)
        .map(Number::Int)
        .or_else(|| machine.float_value(value).map(Number::Float))
}

fn operands(machine: &Machine) -> Result<(Number, Option<Number>), Error> {
    let this = number(machine, arg(machine, 1)?)
        .ok_or_else(|| Error::type_mismatch("receiver", "Number"))?;
    let other = number(machine, arg(machine, 2)?);
    Ok((this, other))
}

type IntOp = fn(i64, i64) -> Result<i64, Error>;
type FloatOp = fn(f64, f64) -> f64;

fn arithmetic(machine: &mut Machine, int_op: IntOp, float_op: FloatOp) -> Result<Value, Error> {
    let (this, other) = operands(machine)?;
    let other = other.ok_or_else(|| Error::type_mismatch("right operand", "Number"))?;
    match (this, other) {
        (Number::Int(a), Number::Int(b)) => {
            let result = int_op(a, b)?;
            Ok(machine.new_int(result))
        }
        (a, b) => Ok(machine.new_float(float_op(a.as_f64(), b.as_f64()))),
    }
}

fn compare(machine: &mut Machine, accept: fn(Ordering) -> bool) -> Result<Value, Error> {
    let (this, other) = operands(machine)?;
    let other = other.ok_or_else(|| Error::type_mismatch("right operand", "Number"))?;
    let ordering = match (this, other) {
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
    };
    bool_object(machine, ordering.is_some_and(accept))
}

pub fn add(machine: &mut Machine) -> Result<Value, Error> {
    arithmetic(
        machine,
        |a, b| a.checked_add(b).ok_or(Error::Overflow),
        |a, b| a + b,
    )
}

pub fn sub(machine: &mut Machine) -> Result<Value, Error> {
    arithmetic(
        machine,
        |a, b| a.checked_sub(b).ok_or(Error::Overflow),
        |a, b| a - b,
    )
}

pub fn mul(machine: &mut Machine) -> Result<Value, Error> {
    arithmetic(
        machine,
        |a, b| a.checked_mul(b).ok_or(Error::Overflow),
        |a, b| a * b,
    )
}

pub fn div(machine: &mut Machine) -> Result<Value, Error> {
    arithmetic(
        machine,
        |a, b| match b {
            0 => Err(Error::ZeroDivision),
            _ => a.checked_div(b).ok_or(Error::Overflow),
        },
        |a, b| a / b,
    )
}

pub fn rem(machine: &mut Machine) -> Result<Value, Error> {
    arithmetic(
        machine,
        |a, b| match b {
            0 => Err(Error::ZeroDivision),
            _ => a.checked_rem(b).ok_or(Error::Overflow),
        },
        |a, b| a % b,
    )
}

pub fn neg(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    match number(machine, this) {
        Some(Number::Int(value)) => {
            let negated = value.checked_neg().ok_or(Error::Overflow)?;
            Ok(machine.new_int(negated))
        }
        Some(Number::Float(value)) => Ok(machine.new_float(-value)),
        None => Err(Error::type_mismatch("receiver", "Number")),
    }
}

pub fn eq(machine: &mut Machine) -> Result<Value, Error> {
    let (this, other) = operands(machine)?;
    let equal = match (this, other) {
        (Number::Int(a), Some(Number::Int(b))) => a == b,
        (a, Some(b)) => a.as_f64() == b.as_f64(),
        (_, None) => false,
    };
    bool_object(machine, equal)
}

pub fn lt(machine: &mut Machine) -> Result<Value, Error> {
    compare(machine, Ordering::is_lt)
}

pub fn le(machine: &mut Machine) -> Result<Value, Error> {
    compare(machine, Ordering::is_le)
}

pub fn gt(machine: &mut Machine) -> Result<Value, Error> {
    compare(machine, Ordering::is_gt)
}

pub fn ge(machine: &mut Machine) -> Result<Value, Error> {
    compare(machine, Ordering::is_ge)
}

pub fn to_int(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    match number(machine, this) {
        Some(Number::Int(_)) => Ok(this),
        // saturating, NaN becomes 0
        Some(Number::Float(value)) => Ok(machine.new_int(value as i64)),
        None => Err(Error::type_mismatch("receiver", "Number")),
    }
}

pub fn to_float(machine: &mut Machine) -> Result<Value, Error> {
    let this = arg(machine, 1)?;
    match number(machine, this) {
        Some(Number::Float(_)) => Ok(this),
        Some(Number::Int(value)) => Ok(machine.new_float(value as f64)),
        None => Err(Error::type_mismatch("receiver", "Number")),
    }
}
