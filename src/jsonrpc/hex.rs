//! Hex <-> integer conversions matching `pkg/jsonrpc/numbers.go`: strip a
//! single leading `0x`, parse/emit base 16.

use crate::errors::ChaindError;

fn de0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

pub fn hex_to_u64(hex: &str) -> Result<u64, ChaindError> {
    u64::from_str_radix(de0x(hex), 16)
        .map_err(|_| ChaindError::BadPath(format!("invalid hex string: {hex}")))
}

pub fn u64_to_hex(number: u64) -> String {
    format!("0x{number:x}")
}

/// Decodes an arbitrary-precision `0x...` hex string into its decimal
/// digit string, for values too wide for `u64` (e.g. `eth_getBalance`
/// results in wei). No bignum crate is in this project's dependency
/// stack, so this does the digit-by-digit base conversion by hand, the
/// same shape `math/big.Int.SetString(s, 16)` performs internally.
pub fn hex_to_big(hex: &str) -> Result<String, ChaindError> {
    let digits = de0x(hex);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ChaindError::BadPath(format!("invalid hex string: {hex}")));
    }

    let mut acc: Vec<u32> = vec![0];
    for c in digits.chars() {
        let digit = c.to_digit(16).expect("validated hexdigit") as u64;
        let mut carry = digit;
        for limb in acc.iter_mut() {
            let v = *limb as u64 * 16 + carry;
            *limb = (v % 1_000_000_000) as u32;
            carry = v / 1_000_000_000;
        }
        while carry > 0 {
            acc.push((carry % 1_000_000_000) as u32);
            carry /= 1_000_000_000;
        }
    }

    let mut out = acc.pop().unwrap_or(0).to_string();
    for limb in acc.iter().rev() {
        out.push_str(&format!("{limb:09}"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        for n in [0u64, 1, 255, 16, 291, u64::MAX] {
            assert_eq!(hex_to_u64(&u64_to_hex(n)).unwrap(), n);
        }
    }

    #[test]
    fn hex_to_u64_strips_single_prefix() {
        assert_eq!(hex_to_u64("0x123").unwrap(), 0x123);
    }

    #[test]
    fn hex_to_u64_rejects_garbage() {
        assert!(hex_to_u64("not hex").is_err());
    }

    #[test]
    fn u64_to_hex_is_lowercase() {
        assert_eq!(u64_to_hex(0xABCDEF), "0xabcdef");
    }

    #[test]
    fn hex_to_big_matches_u64_for_small_values() {
        for n in [0u64, 1, 255, 291, u32::MAX as u64] {
            assert_eq!(hex_to_big(&u64_to_hex(n)).unwrap(), n.to_string());
        }
    }

    #[test]
    fn hex_to_big_handles_values_wider_than_u64() {
        // 2^64, one past u64::MAX.
        assert_eq!(
            hex_to_big("0x10000000000000000").unwrap(),
            "18446744073709551616"
        );
    }

    #[test]
    fn hex_to_big_rejects_garbage() {
        assert!(hex_to_big("0xzz").is_err());
    }
}
