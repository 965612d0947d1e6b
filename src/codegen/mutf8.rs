//! Modified UTF-8, the string encoding of CONSTANT_Utf8 entries.
//!
//! Java strings are sequences of UTF-16 code units, so the conversions here
//! work on `u16` slices. The NUL unit is written as the two-byte form and
//! surrogates are encoded one by one, which keeps unpaired surrogates intact.

/// Encodes UTF-16 code units as modified UTF-8
pub fn encode(units: &[u16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(units.len());
    for &unit in units {
        match unit {
            0x0001..=0x007f => bytes.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                bytes.push(0xc0 | ((unit >> 6) & 0x1f) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                bytes.push(0xe0 | ((unit >> 12) & 0x0f) as u8);
                bytes.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                bytes.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    bytes
}

/// Number of bytes `encode` would produce
pub fn encoded_length(units: &[u16]) -> usize {
    units
        .iter()
        .map(|&unit| match unit {
            0x0001..=0x007f => 1,
            0x0000 | 0x0080..=0x07ff => 2,
            _ => 3,
        })
        .sum()
}

/// Decodes modified UTF-8 into UTF-16 code units, or `None` if malformed
pub fn decode(bytes: &[u8]) -> Option<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i] as u16;
        if b0 & 0x80 == 0 {
            if b0 == 0 {
                return None;
            }
            units.push(b0);
            i += 1;
        } else if b0 & 0xe0 == 0xc0 {
            let b1 = *bytes.get(i + 1)? as u16;
            if b1 & 0xc0 != 0x80 {
                return None;
            }
            units.push(((b0 & 0x1f) << 6) | (b1 & 0x3f));
            i += 2;
        } else if b0 & 0xf0 == 0xe0 {
            let b1 = *bytes.get(i + 1)? as u16;
            let b2 = *bytes.get(i + 2)? as u16;
            if b1 & 0xc0 != 0x80 || b2 & 0xc0 != 0x80 {
                return None;
            }
            units.push(((b0 & 0x0f) << 12) | ((b1 & 0x3f) << 6) | (b2 & 0x3f));
            i += 3;
        } else {
            return None;
        }
    }
    Some(units)
}

/// Encodes Rust text, splitting supplementary characters into surrogate pairs
pub fn encode_str(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    encode(&units)
}

/// Decodes to Rust text, replacing unpaired surrogates
pub fn decode_lossy(bytes: &[u8]) -> Option<String> {
    decode(bytes).map(|units| String::from_utf16_lossy(&units))
}
