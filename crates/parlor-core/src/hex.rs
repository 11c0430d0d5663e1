//! Lowercase hex codec for binary payloads embedded in save files.

use derive_more::{Display, Error};

/// Error from [`hex_to_bin`] on malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum HexError {
    /// The string contained a byte that is not a hex digit.
    #[display("invalid hex digit {_0:?}")]
    InvalidDigit(#[error(not(source))] char),
    /// The string had an odd number of digits.
    #[display("odd-length hex string")]
    OddLength,
}

/// Encodes bytes as lowercase hex.
#[must_use]
pub fn bin_to_hex(data: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(data.len() * 2);
    for &b in data {
        out.push(char::from(DIGITS[usize::from(b >> 4)]));
        out.push(char::from(DIGITS[usize::from(b & 0xf)]));
    }
    out
}

/// Decodes a hex string (either case) back into bytes.
///
/// # Errors
///
/// [`HexError`] if the input has odd length or a non-hex character.
pub fn hex_to_bin(hex: &str) -> Result<Vec<u8>, HexError> {
    if hex.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    let digit = |c: char| c.to_digit(16).ok_or(HexError::InvalidDigit(c));
    let mut out = Vec::with_capacity(hex.len() / 2);
    let mut chars = hex.chars();
    while let (Some(hi), Some(lo)) = (chars.next(), chars.next()) {
        let byte = digit(hi)? * 16 + digit(lo)?;
        out.push(u8::try_from(byte).expect("two hex digits fit a byte"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_encode() {
        assert_eq!(bin_to_hex(&[]), "");
        assert_eq!(bin_to_hex(&[0x00, 0xff, 0x5a]), "00ff5a");
    }

    #[test]
    fn test_decode() {
        assert_eq!(hex_to_bin("00ff5a").unwrap(), vec![0x00, 0xff, 0x5a]);
        assert_eq!(hex_to_bin("00FF5A").unwrap(), vec![0x00, 0xff, 0x5a]);
        assert_eq!(hex_to_bin("abc"), Err(HexError::OddLength));
        assert_eq!(hex_to_bin("zz"), Err(HexError::InvalidDigit('z')));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(data in prop::collection::vec(any::<u8>(), 0..64)) {
            prop_assert_eq!(hex_to_bin(&bin_to_hex(&data)).unwrap(), data);
        }
    }
}
