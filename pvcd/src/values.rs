// Copyright 2024-2025 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use std::fmt::{Display, Formatter};

/// Simulation time as found in the `#<time>` markers of a VCD.
pub type Time = u64;

/// Four state logic value of a single bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum LogicValue {
    Zero,
    One,
    X,
    Z,
}

impl LogicValue {
    /// Accepts `0`, `1`, `x`, `X`, `z` and `Z`.
    #[inline]
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            b'0' => Some(LogicValue::Zero),
            b'1' => Some(LogicValue::One),
            b'x' | b'X' => Some(LogicValue::X),
            b'z' | b'Z' => Some(LogicValue::Z),
            _ => None,
        }
    }

    #[inline]
    pub fn to_char(self) -> char {
        match self {
            LogicValue::Zero => '0',
            LogicValue::One => '1',
            LogicValue::X => 'x',
            LogicValue::Z => 'z',
        }
    }
}

impl Display for LogicValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// The value carried by a single value change.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// scalar value change, e.g., `1!`
    Logic(LogicValue),
    /// binary vector that only contained `0` and `1` and fit into 64 bits
    Vector(u64),
    /// any other binary vector, lower case, e.g., `b10xz`
    Binary(String),
    Real(f64),
    String(String),
}

impl Value {
    /// Integer interpretation of the value. Binary vectors that contain `x` or `z` bits
    /// and vectors that are wider than 64 bits do not have one.
    pub fn to_u64(&self) -> Option<u64> {
        match self {
            Value::Logic(LogicValue::Zero) => Some(0),
            Value::Logic(LogicValue::One) => Some(1),
            Value::Logic(_) => None,
            Value::Vector(value) => Some(*value),
            Value::Binary(bits) => binary_to_u64(bits.as_bytes()),
            Value::Real(_) | Value::String(_) => None,
        }
    }

    /// Returns bit `index` counting from the least significant bit.
    pub fn bit(&self, index: u32) -> Option<LogicValue> {
        match self {
            Value::Logic(value) => (index == 0).then_some(*value),
            Value::Vector(value) => {
                if index >= u64::BITS {
                    Some(LogicValue::Zero)
                } else if (value >> index) & 1 == 1 {
                    Some(LogicValue::One)
                } else {
                    Some(LogicValue::Zero)
                }
            }
            Value::Binary(bits) => {
                let bits = bits.as_bytes();
                let index = index as usize;
                if index >= bits.len() {
                    // VCD vectors are left extended with 0, unless the msb is x or z
                    match bits.first().and_then(|b| LogicValue::from_byte(*b)) {
                        Some(LogicValue::X) => Some(LogicValue::X),
                        Some(LogicValue::Z) => Some(LogicValue::Z),
                        _ => Some(LogicValue::Zero),
                    }
                } else {
                    LogicValue::from_byte(bits[bits.len() - 1 - index])
                }
            }
            Value::Real(_) | Value::String(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.to_u64().is_some() || matches!(self, Value::Real(_))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Logic(value) => write!(f, "{value}"),
            Value::Vector(value) => write!(f, "{value}"),
            Value::Binary(bits) => write!(f, "b{bits}"),
            Value::Real(value) => write!(f, "{value}"),
            Value::String(value) => write!(f, "{value}"),
        }
    }
}

/// Converts a string of `0` and `1` into an integer. Returns `None` for any other
/// character and for more than 64 significant bits.
pub(crate) fn binary_to_u64(bits: &[u8]) -> Option<u64> {
    if bits.is_empty() {
        return None;
    }
    let mut result = 0u64;
    for &bit in bits.iter() {
        let digit = match bit {
            b'0' => 0,
            b'1' => 1,
            _ => return None,
        };
        if result.leading_zeros() == 0 {
            // shifting would drop a set bit
            return None;
        }
        result = (result << 1) | digit;
    }
    Some(result)
}
