//! NUMBER encoding and decoding
//!
//! The server's NUMBER type is an unbounded-precision decimal stored as an
//! exponent byte followed by base-100 mantissa digit pairs:
//!
//! - positive: exponent byte has the high bit set, each mantissa byte is
//!   `pair + 1`
//! - negative: exponent byte is the bitwise complement, each mantissa byte is
//!   `101 - pair`, and a trailing `102` terminator is appended when the
//!   mantissa is below the maximum length
//!
//! Values travel through this codec as decimal strings so that no precision
//! is lost; integer/float conversions happen at the edges.

use crate::error::{Error, Result};

/// Maximum number of decimal digits in a NUMBER mantissa
const MAX_DIGITS: usize = 40;

/// Maximum characters accepted in a number string
const MAX_STRING_CHARS: usize = 172;

/// A decoded NUMBER value, exact decimal representation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalValue {
    /// Canonical decimal string ("123", "-0.5", ...)
    pub text: String,
    /// True when the value has no fractional part
    pub is_integer: bool,
}

impl DecimalValue {
    /// Convert to i64, failing on fractional or out-of-range values
    pub fn to_i64(&self) -> Result<i64> {
        self.text
            .parse()
            .map_err(|e| Error::UnsupportedConversion(format!("NUMBER as i64: {}", e)))
    }

    /// Convert to f64 (may round; NUMBER holds more precision than a double)
    pub fn to_f64(&self) -> Result<f64> {
        self.text
            .parse()
            .map_err(|e| Error::UnsupportedConversion(format!("NUMBER as f64: {}", e)))
    }
}

/// Decode a NUMBER from its wire bytes into an exact decimal string
pub fn decode_number(data: &[u8]) -> Result<DecimalValue> {
    if data.is_empty() {
        return Err(Error::UnsupportedConversion("empty NUMBER field".into()));
    }

    let exponent_byte = data[0];
    let is_positive = (exponent_byte & 0x80) != 0;

    let exponent = if is_positive {
        exponent_byte as i16 - 193
    } else {
        !exponent_byte as i16 - 193
    };
    let mut decimal_point_index = exponent as i32 * 2 + 2;

    // single byte: zero when positive, the most negative value otherwise
    if data.len() == 1 {
        if is_positive {
            return Ok(DecimalValue {
                text: "0".into(),
                is_integer: true,
            });
        }
        return Ok(DecimalValue {
            text: "-1e126".into(),
            is_integer: false,
        });
    }

    // negative numbers carry a trailing terminator byte
    let mantissa_len = if !is_positive && data[data.len() - 1] == 102 {
        data.len() - 2
    } else {
        data.len() - 1
    };

    let mut digits: Vec<u8> = Vec::with_capacity(MAX_DIGITS);
    for i in 0..mantissa_len {
        let byte = data[i + 1];
        let pair = if is_positive {
            byte.wrapping_sub(1)
        } else {
            101u8.wrapping_sub(byte)
        };
        if pair > 99 {
            return Err(Error::UnsupportedConversion(format!(
                "invalid NUMBER mantissa byte {:#04x}",
                byte
            )));
        }

        let digit1 = pair / 10;
        if digit1 == 0 && digits.is_empty() {
            decimal_point_index -= 1;
        } else {
            digits.push(digit1);
        }

        let digit2 = pair % 10;
        if digit2 != 0 || i < mantissa_len - 1 {
            digits.push(digit2);
        }
    }

    // drop trailing zeros that fall after the decimal point
    while let Some(&last) = digits.last() {
        if last != 0 || digits.len() as i32 <= decimal_point_index {
            break;
        }
        digits.pop();
    }

    let mut text = String::with_capacity(MAX_STRING_CHARS);
    if !is_positive {
        text.push('-');
    }

    let is_integer;
    if decimal_point_index <= 0 {
        text.push_str("0.");
        is_integer = false;
        for _ in decimal_point_index..0 {
            text.push('0');
        }
        for d in &digits {
            text.push(char::from(b'0' + d));
        }
    } else {
        is_integer = decimal_point_index as usize >= digits.len();
        for (i, d) in digits.iter().enumerate() {
            if i > 0 && i as i32 == decimal_point_index {
                text.push('.');
            }
            text.push(char::from(b'0' + d));
        }
        for _ in digits.len()..decimal_point_index.max(0) as usize {
            text.push('0');
        }
    }

    if text.is_empty() || text == "-" {
        text = "0".into();
    }

    Ok(DecimalValue { text, is_integer })
}

/// Encode a decimal string into NUMBER wire bytes
pub fn encode_number(value: &str) -> Result<Vec<u8>> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::UnsupportedConversion(
            "empty string is not a NUMBER".into(),
        ));
    }
    if value.len() > MAX_STRING_CHARS {
        return Err(Error::ValueTooLarge(format!(
            "number string of {} chars exceeds {}",
            value.len(),
            MAX_STRING_CHARS
        )));
    }

    let bytes = value.as_bytes();
    let mut pos = 0;

    let is_negative = bytes.first() == Some(&b'-');
    if is_negative || bytes.first() == Some(&b'+') {
        pos += 1;
    }

    let mut digits: Vec<u8> = Vec::with_capacity(MAX_DIGITS);
    let mut decimal_point_index: i32;

    // integer part
    while pos < bytes.len() {
        let b = bytes[pos];
        if b == b'.' || b == b'e' || b == b'E' {
            break;
        }
        if !b.is_ascii_digit() {
            return Err(Error::UnsupportedConversion(format!(
                "invalid character '{}' in number",
                char::from(b)
            )));
        }
        let digit = b - b'0';
        if digit != 0 || !digits.is_empty() {
            digits.push(digit);
        }
        pos += 1;
    }
    decimal_point_index = digits.len() as i32;

    // fractional part
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() {
            let b = bytes[pos];
            if b == b'e' || b == b'E' {
                break;
            }
            if !b.is_ascii_digit() {
                return Err(Error::UnsupportedConversion(format!(
                    "invalid character '{}' in number",
                    char::from(b)
                )));
            }
            let digit = b - b'0';
            if digit == 0 && digits.is_empty() {
                decimal_point_index -= 1;
            } else {
                digits.push(digit);
            }
            pos += 1;
        }
    }

    // exponent suffix
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        pos += 1;
        let exp_negative = match bytes.get(pos) {
            Some(b'-') => {
                pos += 1;
                true
            }
            Some(b'+') => {
                pos += 1;
                false
            }
            _ => false,
        };
        let exp_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if exp_start == pos || pos != bytes.len() {
            return Err(Error::UnsupportedConversion("invalid exponent".into()));
        }
        let exp: i32 = value[exp_start..pos]
            .parse()
            .map_err(|_| Error::UnsupportedConversion("invalid exponent".into()))?;
        decimal_point_index += if exp_negative { -exp } else { exp };
    } else if pos != bytes.len() {
        return Err(Error::UnsupportedConversion(format!(
            "trailing characters in number: {}",
            &value[pos..]
        )));
    }

    while digits.last() == Some(&0) {
        digits.pop();
    }

    if digits.len() > MAX_DIGITS || decimal_point_index > 126 || decimal_point_index < -129 {
        return Err(Error::ValueTooLarge(
            "number out of range for NUMBER".into(),
        ));
    }

    if digits.is_empty() {
        return Ok(vec![128]);
    }

    // an odd-positioned decimal point means the leading base-100 pair holds a
    // single decimal digit
    let leading_single = decimal_point_index % 2 != 0;
    let mut dpi = decimal_point_index;
    if leading_single {
        digits.push(0);
        dpi += 1;
    }
    if digits.len() % 2 == 1 {
        digits.push(0);
    }

    let num_pairs = digits.len() / 2;
    let mut out = Vec::with_capacity(num_pairs + 2);

    let exponent_on_wire = (dpi / 2 + 192) as u8;
    out.push(if is_negative {
        !exponent_on_wire
    } else {
        exponent_on_wire
    });

    let mut digit_pos = 0;
    for pair_num in 0..num_pairs {
        let pair = if pair_num == 0 && leading_single {
            let v = digits[digit_pos];
            digit_pos += 1;
            v
        } else {
            let v = digits[digit_pos] * 10 + digits[digit_pos + 1];
            digit_pos += 2;
            v
        };
        out.push(if is_negative { 101 - pair } else { pair + 1 });
    }

    if is_negative && num_pairs < 20 {
        out.push(102);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_zero() {
        let num = decode_number(&[128]).unwrap();
        assert_eq!(num.text, "0");
        assert!(num.is_integer);
    }

    #[test]
    fn test_decode_known_encodings() {
        assert_eq!(decode_number(&[0xc2, 0x02, 0x18]).unwrap().text, "123");
        assert_eq!(decode_number(&[0x3d, 0x64, 0x4e, 0x66]).unwrap().text, "-123");
        assert_eq!(decode_number(&[0xc1, 0x02, 0x33]).unwrap().text, "1.5");
    }

    #[test]
    fn test_encode_known_values() {
        assert_eq!(encode_number("0").unwrap(), vec![128]);
        assert_eq!(encode_number("123").unwrap(), vec![0xc2, 0x02, 0x18]);
        assert_eq!(encode_number("-123").unwrap(), vec![0x3d, 0x64, 0x4e, 0x66]);
        assert_eq!(encode_number("1.5").unwrap(), vec![0xc1, 0x02, 0x33]);
    }

    #[test]
    fn test_roundtrip_exact() {
        let values = [
            "0",
            "1",
            "-1",
            "99",
            "100",
            "999",
            "1000",
            "-100",
            "123456789",
            "0.5",
            "-0.5",
            "0.001",
            "3.14159265358979",
            "-271.828182845",
            "1000000000000000000000000",
            // 38 significant digits, the server's documented precision
            "99999999999999999999999999999999999999",
            "-99999999999999999999999999999999999999",
            "12345678901234567890.123456789",
        ];
        for v in values {
            let encoded = encode_number(v).unwrap();
            let decoded = decode_number(&encoded).unwrap();
            assert_eq!(decoded.text, v, "roundtrip failed for {}", v);
        }
    }

    #[test]
    fn test_scientific_input_normalizes() {
        let encoded = encode_number("1.5e10").unwrap();
        assert_eq!(decode_number(&encoded).unwrap().text, "15000000000");

        let encoded = encode_number("25e-3").unwrap();
        assert_eq!(decode_number(&encoded).unwrap().text, "0.025");
    }

    #[test]
    fn test_integer_flag() {
        let encoded = encode_number("42").unwrap();
        assert!(decode_number(&encoded).unwrap().is_integer);
        let encoded = encode_number("42.5").unwrap();
        assert!(!decode_number(&encoded).unwrap().is_integer);
    }

    #[test]
    fn test_encode_rejects_garbage() {
        assert!(encode_number("").is_err());
        assert!(encode_number("abc").is_err());
        assert!(encode_number("1.2.3").is_err());
        assert!(encode_number("1e").is_err());
    }

    #[test]
    fn test_out_of_range() {
        assert!(encode_number("1e200").is_err());
        assert!(encode_number("1e-200").is_err());
    }

    #[test]
    fn test_decimal_value_conversions() {
        let v = decode_number(&encode_number("12345").unwrap()).unwrap();
        assert_eq!(v.to_i64().unwrap(), 12345);
        assert_eq!(v.to_f64().unwrap(), 12345.0);
        let frac = decode_number(&encode_number("1.25").unwrap()).unwrap();
        assert!(frac.to_i64().is_err());
        assert_eq!(frac.to_f64().unwrap(), 1.25);
    }
}
