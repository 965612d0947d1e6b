//! Keystream generator shared by the encoder and the generated decoder.
//!
//! All arithmetic follows JVM semantics exactly: 64-bit wrapping products,
//! unsigned shifts where the decoder uses `>>>`, and 16-bit halves that are
//! sign-extended whenever they widen. The decoder bytecode mirrors these
//! functions instruction for instruction.

/// Scrambles a seed into the initial generator state
pub fn seed(x: i64) -> i64 {
    let x = x as u64;
    let z = (x ^ (x >> 33)).wrapping_mul(0x62a9_d9ed_7997_05f5);
    ((z ^ (z >> 28)).wrapping_mul(0xcb24_d0a5_c88c_35b3) >> 32) as i64
}

/// Advances the generator; the output is `(state >>> 32) & 0xffff` of the result
pub fn next(state: i64) -> i64 {
    let mut s0 = (state & 0xffff) as i16;
    let mut s1 = ((state as u64 >> 16) & 0xffff) as i16;
    let mut next = s0.wrapping_add(s1);
    next = rotl(next, 9);
    next = next.wrapping_add(s0);
    s1 ^= s0;
    s0 = rotl(s0, 13);
    s0 ^= s1;
    s0 ^= s1.wrapping_shl(5);
    s1 = rotl(s1, 10);

    let mut result = next as i64;
    result <<= 16;
    result |= s1 as i64;
    result <<= 16;
    result |= s0 as i64;
    result
}

/// Rotation of the sign-extended 32-bit value, truncated back to 16 bits
pub fn rotl(x: i16, k: u32) -> i16 {
    let wide = x as i32;
    (wide.wrapping_shl(k) | ((wide as u32) >> (32 - k)) as i32) as i16
}

/// The 16-bit generator output carried by a state
pub fn output(state: i64) -> u16 {
    ((state as u64 >> 32) & 0xffff) as u16
}

/// The two mask halves derived from a seed, and the state after deriving them
pub fn mask(seed_value: i32) -> (i64, i64, i64) {
    let mut state = next(seed(seed_value as i64 & 0xffff_ffff));
    let low = (state as u64 >> 32) as i64 & 0xffff;
    state = next(state);
    // 0xffff0000 is an int literal in the decoder and widens with its sign
    let high = (state as u64 >> 16) as i64 & 0xffff_ffff_ffff_0000_u64 as i64;
    (low, high, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_unsigned_scramble() {
        assert_eq!(seed(0), 0);
        // the result always fits in 32 bits
        for x in [1i64, -1, 0x1234_5678, i64::MIN] {
            assert_eq!(seed(x) as u64 >> 32, 0);
        }
    }

    #[test]
    fn test_rotl_matches_int_rotation() {
        assert_eq!(rotl(1, 9), 0x200);
        assert_eq!(rotl(0x4000, 2), 0);
        // the sign bits shifted in from the widened value survive truncation
        assert_eq!(rotl(-1, 13), -1);
        assert_eq!(rotl(i16::MIN, 1), 1);
    }

    #[test]
    fn test_next_is_deterministic() {
        let state = seed(42);
        assert_eq!(next(state), next(state));
        assert_ne!(next(state), next(next(state)));
    }

    #[test]
    fn test_next_of_zero_stays_zero() {
        assert_eq!(next(0), 0);
    }

    #[test]
    fn test_negative_half_fills_high_bits() {
        // a negative low half sign-extends over every bit above it
        let state = next(0x8000_0000);
        assert_eq!(state as u64 >> 48, 0xffff);
    }
}
