//! Operand decoding.
//!
//! Generated code passes each operand as a [`ValueHandle`]: the value itself
//! when its type fits in a machine word, otherwise a pointer to it. The
//! descriptor says which, and how to read the bits.

use core::fmt;

use ubsan_abi::{TypeKind, TypeRef, ValueHandle};

use crate::macros::StackWriter;

const WORD_BITS: u32 = usize::BITS;

/// A decoded operand, ready to print.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Signed(i128),
    Unsigned(u128),
    Float32(f32),
    Float64(f64),
    /// Half precision is printed as its raw bits.
    Half(u16),
}

/// Descriptor contents the runtime cannot interpret. Always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Unknown Type Kind {0:#06x}")]
    UnknownKind(u16),
    #[error("Unexpected {0}-Bit Integer Type")]
    IntegerWidth(u32),
    #[error("Unexpected Integer Width Encoding {0:#06x}")]
    IntegerInfo(u16),
    #[error("Unexpected {0}-Bit Floating Type")]
    FloatWidth(u16),
    #[error("Missing Type Descriptor")]
    MissingDescriptor,
}

/// Decode `handle` according to `ty`.
///
/// # Safety
/// For by-pointer widths (64-bit on 32-bit targets, 128-bit everywhere)
/// `handle` must point at a readable value of that width.
pub unsafe fn decode(ty: TypeRef<'_>, handle: ValueHandle) -> Result<Scalar, DecodeError> {
    match ty.kind() {
        TypeKind::Integer => {
            let width = ty.integer_width().ok_or(DecodeError::IntegerInfo(ty.info()))?;
            let raw = read_integer(width, handle)?;
            Ok(if ty.is_signed() {
                Scalar::Signed(sign_extend(raw, width))
            } else {
                Scalar::Unsigned(raw)
            })
        }
        TypeKind::Float => match ty.float_width() {
            16 => Ok(Scalar::Half(handle as u16)),
            32 => Ok(Scalar::Float32(f32::from_bits(handle as u32))),
            64 => {
                let bits = if WORD_BITS >= 64 {
                    handle as u64
                } else {
                    core::ptr::read_unaligned(handle as *const u64)
                };
                Ok(Scalar::Float64(f64::from_bits(bits)))
            }
            // x87 80-bit, 96-bit padded, IEEE quad: no stable Rust type.
            width => Err(DecodeError::FloatWidth(width)),
        },
        TypeKind::Unknown(raw) => Err(DecodeError::UnknownKind(raw)),
    }
}

unsafe fn read_integer(width: u32, handle: ValueHandle) -> Result<u128, DecodeError> {
    match width {
        8 | 16 | 32 => Ok(handle as u128 & mask(width)),
        64 if WORD_BITS >= 64 => Ok(handle as u64 as u128),
        64 => Ok(core::ptr::read_unaligned(handle as *const u64) as u128),
        128 => Ok(core::ptr::read_unaligned(handle as *const u128)),
        other => Err(DecodeError::IntegerWidth(other)),
    }
}

const fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

const fn sign_extend(raw: u128, width: u32) -> i128 {
    let shift = 128 - width;
    ((raw << shift) as i128) >> shift
}

impl Scalar {
    pub fn is_negative(&self) -> bool {
        match *self {
            Scalar::Signed(v) => v < 0,
            Scalar::Float32(v) => v.is_sign_negative(),
            Scalar::Float64(v) => v.is_sign_negative(),
            Scalar::Unsigned(_) | Scalar::Half(_) => false,
        }
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Scalar::Signed(v) => v == 0,
            Scalar::Unsigned(v) => v == 0,
            Scalar::Float32(v) => v == 0.0,
            Scalar::Float64(v) => v == 0.0,
            Scalar::Half(bits) => bits & 0x7fff == 0,
        }
    }

    /// Integer value as an unsigned magnitude; `None` for negative or
    /// non-integer values.
    pub fn as_unsigned(&self) -> Option<u128> {
        match *self {
            Scalar::Unsigned(v) => Some(v),
            Scalar::Signed(v) => u128::try_from(v).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Scalar::Signed(v) => write!(f, "{v}"),
            Scalar::Unsigned(v) => write!(f, "{v}"),
            Scalar::Float32(v) => fmt_general(f, v, v.is_nan(), v.is_infinite()),
            Scalar::Float64(v) => fmt_general(f, v, v.is_nan(), v.is_infinite()),
            Scalar::Half(bits) => write!(f, "Undecoded-16-bit-Floating-Type ({bits:#06x})"),
        }
    }
}

/// Significant digits printed for floating operands, as with C's `%g`.
const G_PRECISION: i32 = 6;

/// C's `%g`: six significant digits, fixed notation for decimal exponents in
/// `-4..6`, `e±NN` otherwise, trailing zeros dropped.
fn fmt_general<T>(f: &mut fmt::Formatter<'_>, v: T, nan: bool, infinite: bool) -> fmt::Result
where
    T: fmt::LowerExp + fmt::Display + Copy,
{
    use core::fmt::Write;

    if nan || infinite {
        let mut sign_buf = [0u8; 8];
        let mut sign = StackWriter::new(&mut sign_buf);
        write!(sign, "{v:e}")?;
        let negative = sign.as_str().starts_with('-');
        let text = match (nan, negative) {
            (true, false) => "nan",
            (true, true) => "-nan",
            (false, false) => "inf",
            (false, true) => "-inf",
        };
        return f.write_str(text);
    }

    let mut sci_buf = [0u8; 64];
    let mut sci = StackWriter::new(&mut sci_buf);
    write!(sci, "{:.*e}", (G_PRECISION - 1) as usize, v)?;
    let (mantissa, exponent) = sci.as_str().split_once('e').ok_or(fmt::Error)?;
    let exponent: i32 = exponent.parse().map_err(|_| fmt::Error)?;

    if (-4..G_PRECISION).contains(&exponent) {
        let mut fixed_buf = [0u8; 64];
        let mut fixed = StackWriter::new(&mut fixed_buf);
        write!(fixed, "{:.*}", (G_PRECISION - 1 - exponent) as usize, v)?;
        f.write_str(trim_fraction(fixed.as_str()))
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        write!(
            f,
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}
