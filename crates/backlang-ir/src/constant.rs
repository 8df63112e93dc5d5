//! Compile-time constants carried by instructions, fields and parameters.

use crate::types::Primitive;
use backlang_syntax::Literal;
use std::fmt;

/// A constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Integer of a given width; the value is kept in range for that width
    Int { value: i128, bits: u8, signed: bool },
    Float32(f32),
    Float64(f64),
    String(String),
    Char(char),
    Bool(bool),
    Null,
}

impl Constant {
    pub fn i32(value: i32) -> Self {
        Constant::Int {
            value: value.into(),
            bits: 32,
            signed: true,
        }
    }

    /// Integer constant of the width of `primitive`; 32-bit signed otherwise
    pub fn integer(value: i128, primitive: Option<Primitive>) -> Self {
        let (bits, signed) = primitive.and_then(Primitive::int_width).unwrap_or((32, true));
        Constant::Int {
            value: wrap(value, bits, signed),
            bits,
            signed,
        }
    }

    /// Literal payload as a constant. Half-precision has no constant form
    /// and becomes `Null`.
    pub fn from_literal(literal: &Literal) -> Self {
        let int = |value: i128, bits: u8, signed: bool| Constant::Int { value, bits, signed };
        match literal {
            Literal::Bool(v) => Constant::Bool(*v),
            Literal::Char(c) => Constant::Char(*c),
            Literal::String(s) => Constant::String(s.clone()),
            Literal::I8(v) => int((*v).into(), 8, true),
            Literal::I16(v) => int((*v).into(), 16, true),
            Literal::I32(v) => int((*v).into(), 32, true),
            Literal::I64(v) => int((*v).into(), 64, true),
            Literal::U8(v) => int((*v).into(), 8, false),
            Literal::U16(v) => int((*v).into(), 16, false),
            Literal::U32(v) => int((*v).into(), 32, false),
            Literal::U64(v) => int((*v).into(), 64, false),
            Literal::F32(v) => Constant::Float32(*v),
            Literal::F64(v) => Constant::Float64(*v),
            Literal::F16(_) | Literal::Null => Constant::Null,
        }
    }

    /// Converts a numeric constant to the element type `target`.
    /// Non-numeric constants are returned unchanged.
    pub fn convert(self, target: Primitive) -> Self {
        let numeric = match &self {
            Constant::Int { value, .. } => Some(*value as f64),
            Constant::Char(c) => Some(u32::from(*c) as f64),
            Constant::Float32(v) => Some(f64::from(*v)),
            Constant::Float64(v) => Some(*v),
            _ => None,
        };
        let Some(as_float) = numeric else {
            return self;
        };

        if let Some((bits, signed)) = target.int_width() {
            let value = match self {
                Constant::Int { value, .. } => value,
                Constant::Char(c) => u32::from(c).into(),
                _ => as_float as i128,
            };
            if target == Primitive::Char {
                return char::from_u32(wrap(value, bits, signed) as u32)
                    .map(Constant::Char)
                    .unwrap_or(Constant::Null);
            }
            return Constant::Int {
                value: wrap(value, bits, signed),
                bits,
                signed,
            };
        }

        match target {
            Primitive::F32 => Constant::Float32(as_float as f32),
            Primitive::F64 => Constant::Float64(as_float),
            Primitive::F16 => Constant::Null,
            _ => self,
        }
    }

    /// Integer view, for attribute arguments and offsets
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Constant::Int { value, .. } => i64::try_from(*value).ok(),
            Constant::Char(c) => Some(u32::from(*c).into()),
            Constant::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }
}

/// Two's-complement wrap of `value` into `bits`
fn wrap(value: i128, bits: u8, signed: bool) -> i128 {
    let modulus = 1i128 << bits;
    let mut v = value.rem_euclid(modulus);
    if signed && v >= modulus / 2 {
        v -= modulus;
    }
    v
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { value, bits, signed } => {
                write!(f, "{}{}{}", value, if *signed { 'i' } else { 'u' }, bits)
            }
            Constant::Float32(v) => write!(f, "{:?}f32", v),
            Constant::Float64(v) => write!(f, "{:?}f64", v),
            Constant::String(s) => write!(f, "\"{}\"", s.escape_default()),
            Constant::Char(c) => write!(f, "{:?}", c),
            Constant::Bool(b) => write!(f, "{}", b),
            Constant::Null => write!(f, "null"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_literal() {
        assert_eq!(Constant::from_literal(&Literal::I32(-4)), Constant::i32(-4));
        assert_eq!(
            Constant::from_literal(&Literal::U64(u64::MAX)),
            Constant::Int { value: u64::MAX.into(), bits: 64, signed: false }
        );
        assert_eq!(Constant::from_literal(&Literal::F16(1.5)), Constant::Null);
        assert_eq!(Constant::from_literal(&Literal::Null), Constant::Null);
    }

    #[test]
    fn test_convert_to_element_type() {
        let five = Constant::i32(5);
        assert_eq!(five.clone().convert(Primitive::F64), Constant::Float64(5.0));
        assert_eq!(
            five.clone().convert(Primitive::I64),
            Constant::Int { value: 5, bits: 64, signed: true }
        );
        assert_eq!(
            Constant::i32(300).convert(Primitive::U8),
            Constant::Int { value: 44, bits: 8, signed: false }
        );
        assert_eq!(Constant::i32(-1).convert(Primitive::U16).as_i64(), Some(65535));
        assert_eq!(Constant::Bool(true).convert(Primitive::I32), Constant::Bool(true));
        assert_eq!(Constant::i32(65).convert(Primitive::Char), Constant::Char('A'));
    }

    #[test]
    fn test_integer_defaults_to_i32() {
        assert_eq!(Constant::integer(6, None), Constant::i32(6));
        assert_eq!(Constant::integer(7, Some(Primitive::String)), Constant::i32(7));
        assert_eq!(Constant::i32(12).to_string(), "12i32");
    }
}
