//! Number width selection.
//!
//! Integral values inside the i32 range use the smallest fitting integer
//! width: unsigned widths for non-negative values, signed widths for negative
//! ones. Everything else, including `-0.0`, is written as a double so the
//! value survives bit-exactly.

use crate::wire::NumberWidth;

/// Picks the smallest lossless width for `value`.
pub fn select_width(value: f64) -> NumberWidth {
    if !value.is_finite() || value.fract() != 0.0 {
        return NumberWidth::Double;
    }
    if value == 0.0 && value.is_sign_negative() {
        return NumberWidth::Double;
    }
    if value < f64::from(i32::MIN) || value > f64::from(i32::MAX) {
        return NumberWidth::Double;
    }
    let n = value as i32;
    if n >= 0 {
        if n <= i32::from(u8::MAX) {
            NumberWidth::Uint8
        } else if n <= i32::from(u16::MAX) {
            NumberWidth::Uint16
        } else {
            NumberWidth::Uint32
        }
    } else if n >= i32::from(i8::MIN) {
        NumberWidth::Int8
    } else if n >= i32::from(i16::MIN) {
        NumberWidth::Int16
    } else {
        NumberWidth::Int32
    }
}

/// Little-endian payload of `value` at `width`. Only the first
/// `width.byte_len()` bytes are meaningful.
pub fn to_le_bytes(value: f64, width: NumberWidth) -> [u8; 8] {
    let mut out = [0u8; 8];
    let len = width.byte_len();
    match width {
        NumberWidth::Int8 => out[..len].copy_from_slice(&(value as i8).to_le_bytes()),
        NumberWidth::Uint8 => out[..len].copy_from_slice(&(value as u8).to_le_bytes()),
        NumberWidth::Int16 => out[..len].copy_from_slice(&(value as i16).to_le_bytes()),
        NumberWidth::Uint16 => out[..len].copy_from_slice(&(value as u16).to_le_bytes()),
        NumberWidth::Int32 => out[..len].copy_from_slice(&(value as i32).to_le_bytes()),
        NumberWidth::Uint32 => out[..len].copy_from_slice(&(value as u32).to_le_bytes()),
        NumberWidth::Double => out.copy_from_slice(&value.to_le_bytes()),
    }
    out
}
