//! Small-endian integer fields and mantissa/exponent quantization
//!
//! All multi-byte integers on the wire are unsigned and small-endian.
//! Quantities too large for their field are stored as a decimal float
//! `mantissa * 10^exponent`; quantization is lossy once the exponent cap is
//! reached, which callers must expect.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use crate::errors::{DecodeError, DecodeResult, EncodeError, EncodeResult};

/// Serialize a non-negative integer into `width` small-endian bytes.
///
/// A zero width yields an empty vector (used for fields a packing choice has
/// elided); a value needing more than `width` bytes is an overflow.
pub fn write_unsigned(value: u64, width: usize) -> EncodeResult<Vec<u8>> {
    if width == 0 {
        return Ok(Vec::new());
    }
    if width > 8 || (width < 8 && value >> (8 * width as u32) != 0) {
        return Err(EncodeError::Overflow { value, width });
    }
    let mut buffer = vec![0u8; width];
    LittleEndian::write_uint(&mut buffer, value, width);
    Ok(buffer)
}

/// Read `width` small-endian bytes from the front of `buffer`.
pub fn read_unsigned(buffer: &[u8], width: usize) -> DecodeResult<u64> {
    if width == 0 {
        return Ok(0);
    }
    if buffer.len() < width {
        return Err(DecodeError::Truncated {
            wanted: width,
            available: buffer.len(),
        });
    }
    if width > 8 {
        return Err(DecodeError::OutOfRange {
            field: "field width",
        });
    }
    Ok(LittleEndian::read_uint(&buffer[..width], width))
}

/// Direction applied at each division step while quantizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rounding {
    Down,
    Nearest,
    Up,
}

/// A quantized quantity together with the value it reconstructs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MantissaExponent {
    pub mantissa: u64,
    pub exponent: u32,
    /// `mantissa * 10^exponent` - differs from the input when precision was
    /// lost
    pub qty: u64,
}

/// Quantize `qty` by repeatedly dividing by 10 (with the requested rounding)
/// until the mantissa fits, then capping the exponent at `exponent_max`.
///
/// The cap makes large values lossy rather than failing: this is documented
/// behaviour callers rely on, not an error path.
pub fn qty_to_mantissa_exponent(
    qty: u64,
    rounding: Rounding,
    mantissa_max: u64,
    exponent_max: u32,
) -> MantissaExponent {
    let round_offset = match rounding {
        Rounding::Down => 0,
        Rounding::Nearest => 4,
        Rounding::Up => 9,
    };

    let mut mantissa = qty;
    let mut exponent = 0u32;

    while mantissa > mantissa_max {
        mantissa = (mantissa + round_offset) / 10;
        exponent += 1;
    }

    let exponent = exponent.min(exponent_max);

    MantissaExponent {
        mantissa,
        exponent,
        qty: mantissa_exponent_to_qty(mantissa, exponent),
    }
}

/// Reconstruct `mantissa * 10^exponent`, saturating at `u64::MAX` so that
/// hostile exponents surface as out-of-range values instead of overflow.
pub fn mantissa_exponent_to_qty(mantissa: u64, exponent: u32) -> u64 {
    let mut qty = mantissa;
    for _ in 0..exponent {
        qty = qty.saturating_mul(10);
    }
    qty
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_unsigned_small_endian() {
        assert_eq!(write_unsigned(0x12C1, 2).unwrap(), vec![0xC1, 0x12]);
        assert_eq!(write_unsigned(500, 3).unwrap(), vec![0xF4, 0x01, 0x00]);
        assert_eq!(write_unsigned(0, 1).unwrap(), vec![0x00]);
        assert_eq!(write_unsigned(7, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_write_unsigned_overflow() {
        assert_eq!(
            write_unsigned(256, 1),
            Err(EncodeError::Overflow {
                value: 256,
                width: 1
            })
        );
        assert!(write_unsigned(u64::MAX, 8).is_ok());
        assert!(write_unsigned(0x1_0000_0000, 4).is_err());
    }

    #[test]
    fn test_read_unsigned_round_trip() {
        for (value, width) in [(0u64, 1usize), (255, 1), (0x12C1, 2), (0xFF_FFFF, 3)] {
            let bytes = write_unsigned(value, width).unwrap();
            assert_eq!(read_unsigned(&bytes, width).unwrap(), value);
        }
    }

    #[test]
    fn test_read_unsigned_truncated() {
        assert_eq!(
            read_unsigned(&[0x01], 2),
            Err(DecodeError::Truncated {
                wanted: 2,
                available: 1
            })
        );
    }

    #[test]
    fn test_quantize_exact_fit() {
        let result = qty_to_mantissa_exponent(999, Rounding::Nearest, 1000, 11);
        assert_eq!(result.mantissa, 999);
        assert_eq!(result.exponent, 0);
        assert_eq!(result.qty, 999);
    }

    #[test]
    fn test_quantize_power_of_ten() {
        let result = qty_to_mantissa_exponent(1_000_000_000_000, Rounding::Down, 1000, 11);
        assert_eq!(result.mantissa, 1000);
        assert_eq!(result.exponent, 9);
        assert_eq!(result.qty, 1_000_000_000_000);
    }

    #[test]
    fn test_quantize_rounds_per_division_step() {
        // 1234500 -> 123450 -> 12345 -> 1234 (12349/10) -> 123 (1238/10)
        let result = qty_to_mantissa_exponent(1_234_500, Rounding::Nearest, 1000, 11);
        assert_eq!(result.mantissa, 123);
        assert_eq!(result.exponent, 4);
        assert_eq!(result.qty, 1_230_000);

        let up = qty_to_mantissa_exponent(1001, Rounding::Up, 1000, 11);
        assert_eq!(up.mantissa, 101);
        assert_eq!(up.exponent, 1);

        let down = qty_to_mantissa_exponent(1009, Rounding::Down, 1000, 11);
        assert_eq!(down.mantissa, 100);
        assert_eq!(down.exponent, 1);
    }

    #[test]
    fn test_quantize_exponent_capped_and_lossy() {
        // 10^14 needs exponent 11 with mantissa 1000; anything bigger loses
        // precision because the exponent stays capped
        let result = qty_to_mantissa_exponent(100_000_000_000_000, Rounding::Down, 1000, 11);
        assert_eq!(result.mantissa, 1000);
        assert_eq!(result.exponent, 11);
        assert_eq!(result.qty, 100_000_000_000_000);

        let lossy = qty_to_mantissa_exponent(3_000_000_000_000_000, Rounding::Down, 1000, 11);
        assert_eq!(lossy.exponent, 11);
        assert!(lossy.qty < 3_000_000_000_000_000);
    }

    #[test]
    fn test_mantissa_exponent_to_qty() {
        assert_eq!(mantissa_exponent_to_qty(250, 3), 250_000);
        assert_eq!(mantissa_exponent_to_qty(0, 11), 0);
        assert_eq!(mantissa_exponent_to_qty(u64::MAX, 2), u64::MAX); // saturates
    }
}
