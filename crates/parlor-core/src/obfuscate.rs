//! Keyless bitmap obfuscation.
//!
//! Some game descriptions carry the full solution (the Guess secret row, for
//! instance) and would otherwise spoil themselves to anyone glancing at the
//! string. This is not encryption, just an involution that scrambles the
//! bits: an OAEP-style two-step mask in which each half of the buffer is
//! XORed with a SHA-1-derived stream keyed by the other half.

use sha1::{Digest as _, Sha1};

/// Masks or unmasks a bitmap of `bits` bits stored in `bmp`.
///
/// The buffer is split into halves at `len / 2` (rounded down). Encoding
/// XORs a mask derived from the second half over the first, then a mask
/// derived from the (now encoded) first half over the second; decoding
/// applies the two steps in the opposite order. The mask stream is the
/// concatenation of `SHA1(seed || "0")`, `SHA1(seed || "1")`, ... truncated
/// to the target length.
///
/// Trailing pad bits beyond `bits` are cleared after each step, so
/// `obfuscate_bitmap(obfuscate_bitmap(x, false), true) == x` for any bit
/// length.
///
/// # Panics
///
/// Panics if `bmp` is shorter than `bits` rounded up to whole bytes.
pub fn obfuscate_bitmap(bmp: &mut [u8], bits: usize, decode: bool) {
    let bytes = bits.div_ceil(8);
    assert!(bmp.len() >= bytes, "bitmap shorter than its bit count");
    let firsthalf = bytes / 2;

    // (seed range, target range), in application order.
    let encode_steps = [(firsthalf..bytes, 0..firsthalf), (0..firsthalf, firsthalf..bytes)];
    let steps = if decode {
        [encode_steps[1].clone(), encode_steps[0].clone()]
    } else {
        encode_steps
    };

    for (seed, target) in steps {
        let mask = mask_stream(&bmp[seed], target.len());
        for (b, m) in bmp[target].iter_mut().zip(mask) {
            *b ^= m;
        }
        // Clear the pad bits back to zero after each step.
        if bits % 8 != 0 {
            bmp[bits / 8] &= 0xff << (8 - bits % 8);
        }
    }
}

/// Concatenated SHA-1 hashes of `seed || decimal(counter)`, truncated to
/// `len` bytes.
fn mask_stream(seed: &[u8], len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter = 0usize;
    while out.len() < len {
        let mut hasher = Sha1::new();
        hasher.update(seed);
        hasher.update(counter.to_string().as_bytes());
        let digest = hasher.finalize();
        let take = (len - out.len()).min(digest.len());
        out.extend_from_slice(&digest[..take]);
        counter += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn roundtrip(bits: usize, fill: impl Fn(usize) -> u8) {
        let bytes = bits.div_ceil(8);
        let mut bmp: Vec<u8> = (0..bytes).map(fill).collect();
        // Force the pad bits to zero, as the contract defines them.
        if bits % 8 != 0 {
            bmp[bits / 8] &= 0xff << (8 - bits % 8);
        }
        let original = bmp.clone();
        obfuscate_bitmap(&mut bmp, bits, false);
        obfuscate_bitmap(&mut bmp, bits, true);
        assert_eq!(bmp, original, "round trip of {bits} bits");
    }

    #[test]
    fn test_encoding_changes_the_buffer() {
        let original = vec![0x5a; 16];
        let mut bmp = original.clone();
        obfuscate_bitmap(&mut bmp, 128, false);
        assert_ne!(bmp, original);
    }

    #[test]
    fn test_roundtrip_fixed_lengths() {
        for bits in [0, 1, 8, 31, 32, 33, 100, 1024] {
            roundtrip(bits, |i| u8::try_from(i.wrapping_mul(37) % 256).unwrap());
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let mut a = vec![0xa5; 16];
        let mut b = vec![0xa5; 16];
        obfuscate_bitmap(&mut a, 128, false);
        obfuscate_bitmap(&mut b, 128, false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_pad_bits_cleared() {
        let mut bmp = vec![0xff; 2];
        // 13 bits: the low 3 bits of the second byte are padding.
        bmp[1] &= 0xf8;
        obfuscate_bitmap(&mut bmp, 13, false);
        assert_eq!(bmp[1] & 0x07, 0);
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(data in prop::collection::vec(any::<u8>(), 0..33)) {
            let bits = data.len() * 8;
            let mut bmp = data.clone();
            obfuscate_bitmap(&mut bmp, bits, false);
            obfuscate_bitmap(&mut bmp, bits, true);
            prop_assert_eq!(bmp, data);
        }

        #[test]
        fn prop_roundtrip_ragged_bit_lengths(bits in 0usize..257, byte in any::<u8>()) {
            roundtrip(bits, |i| byte.wrapping_add(u8::try_from(i % 256).unwrap()));
        }
    }
}
