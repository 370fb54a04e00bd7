//! Value: any raw value, small integer or reference
//!
//! ObjRef: untagged index of a heap object, only meaningful together with the heap that
//! handed it out
//!
//! Nothing outside this module looks at the bit patterns.
use std::fmt;

use crate::Error;

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueTag {
    SmallInt = 0b0,
    Reference = 0b1,
}

pub const VALUE_TAG_MASK: u64 = 0b1;

/// Smallest integer that can live inline in a `Value`.
pub const SMALL_INT_MIN: i64 = -(1 << 62);
/// Largest integer that can live inline in a `Value`.
pub const SMALL_INT_MAX: i64 = (1 << 62) - 1;

/// A generic Value, one machine word.
///
/// The low bit is the tag. Small integers are stored shifted left by one, references carry
/// the heap index shifted left by one with the low bit set.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Value(u64);

/// Index of an object in the heap.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjRef(u32);

/// A value with its tag resolved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Unpacked {
    SmallInt(i64),
    Object(ObjRef),
}

impl Value {
    #[inline]
    pub const fn is_small_int(self) -> bool {
        self.0 & VALUE_TAG_MASK == ValueTag::SmallInt as u64
    }

    #[inline]
    pub const fn is_object(self) -> bool {
        self.0 & VALUE_TAG_MASK == ValueTag::Reference as u64
    }

    #[inline]
    pub const fn tag(self) -> ValueTag {
        if self.is_small_int() {
            ValueTag::SmallInt
        } else {
            ValueTag::Reference
        }
    }

    #[inline]
    pub const fn small_int_fits(value: i64) -> bool {
        value >= SMALL_INT_MIN && value <= SMALL_INT_MAX
    }

    /// Encodes `value` inline, `None` when it does not fit.
    #[inline]
    pub const fn small_int(value: i64) -> Option<Self> {
        if Self::small_int_fits(value) {
            Some(Self((value as u64) << 1))
        } else {
            None
        }
    }

    /// Same as [`Value::small_int`] but reports the failure as a range fault.
    pub fn try_small_int(value: i64) -> Result<Self, Error> {
        Self::small_int(value).ok_or(Error::SmallIntRange { value })
    }

    #[inline]
    pub const fn as_small_int(self) -> Option<i64> {
        if self.is_small_int() {
            // arithmetic shift restores the sign
            Some((self.0 as i64) >> 1)
        } else {
            None
        }
    }

    #[inline]
    pub const fn from_object(object: ObjRef) -> Self {
        Self(((object.0 as u64) << 1) | ValueTag::Reference as u64)
    }

    #[inline]
    pub const fn as_object(self) -> Option<ObjRef> {
        if self.is_object() {
            Some(ObjRef((self.0 >> 1) as u32))
        } else {
            None
        }
    }

    #[inline]
    pub const fn unpack(self) -> Unpacked {
        match self.as_small_int() {
            Some(value) => Unpacked::SmallInt(value),
            None => Unpacked::Object(ObjRef((self.0 >> 1) as u32)),
        }
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl ObjRef {
    #[inline]
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<ObjRef> for Value {
    fn from(object: ObjRef) -> Self {
        Self::from_object(object)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unpack() {
            Unpacked::SmallInt(value) => write!(f, "SmallInt({value})"),
            Unpacked::Object(object) => write!(f, "Object(#{})", object.0),
        }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[test]
    fn small_int_boundaries_survive_encoding() {
        for n in [0, 1, -1, 42, -42, SMALL_INT_MIN, SMALL_INT_MAX] {
            let value = Value::small_int(n).expect("fits");
            assert!(value.is_small_int());
            assert!(!value.is_object());
            assert_eq!(value.as_small_int(), Some(n));
            assert_eq!(value.unpack(), Unpacked::SmallInt(n));
        }
    }

    #[test]
    fn out_of_range_integers_are_rejected() {
        assert_eq!(Value::small_int(SMALL_INT_MAX + 1), None);
        assert_eq!(Value::small_int(SMALL_INT_MIN - 1), None);
        assert_eq!(Value::small_int(i64::MAX), None);
        let err = Value::try_small_int(i64::MIN).unwrap_err();
        assert!(matches!(err, Error::SmallIntRange { value } if value == i64::MIN));
    }

    #[test]
    fn references_are_never_small_ints() {
        for index in [0, 1, 7, u32::MAX] {
            let value = Value::from_object(ObjRef::new(index));
            assert!(value.is_object());
            assert!(!value.is_small_int());
            assert_eq!(value.as_small_int(), None);
            assert_eq!(value.as_object(), Some(ObjRef::new(index)));
            assert_eq!(value.tag(), ValueTag::Reference);
        }
    }

    #[test]
    fn equal_small_ints_are_equal_words() {
        let a = Value::small_int(-7).unwrap();
        let b = Value::small_int(-7).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.raw(), b.raw());
        assert_ne!(a, Value::small_int(7).unwrap());
    }

    #[test]
    fn default_value_is_zero() {
        assert_eq!(Value::default().as_small_int(), Some(0));
    }
}
