//! Registry of hidden strings and their encoding.
//!
//! Every registered string is appended to one buffer as a length unit
//! followed by its code units, each XORed with the keystream of the run seed.
//! The returned locator carries the seed in its low half and the masked
//! offset of the record in its high half.

use super::random;
use crate::common::error::{Error, Result};
use crate::consts::MAX_CHUNK_LENGTH;

#[derive(Debug, Clone)]
pub struct StringRegistry {
    seed: i32,
    buffer: Vec<u16>,
    count: usize,
}

impl StringRegistry {
    pub fn new(seed: i32) -> Self {
        Self { seed, buffer: Vec::new(), count: 0 }
    }

    pub fn seed(&self) -> i32 {
        self.seed
    }

    /// Number of strings registered so far
    pub fn count(&self) -> usize {
        self.count
    }

    /// Length of the encoded buffer in code units
    pub fn encoded_len(&self) -> usize {
        self.buffer.len()
    }

    /// Encodes a string and returns its locator. Equal strings get distinct locators.
    pub fn register(&mut self, text: &[u16]) -> Result<i64> {
        let length = u16::try_from(text.len()).map_err(|_| {
            Error::string_error(format!("string of {} code units is longer than 65535", text.len()))
        })?;
        let offset = self.buffer.len();
        if offset > i32::MAX as usize - text.len() {
            return Err(Error::string_error("encoded string buffer is full"));
        }
        let (low, high, mut state) = random::mask(self.seed);
        let masked = ((offset as i64) ^ low ^ high) as u32 as i64;
        let locator = (masked << 32) | (self.seed as u32 as i64);

        state = random::next(state);
        self.buffer.push(random::output(state) ^ length);
        for &unit in text {
            state = random::next(state);
            self.buffer.push(random::output(state) ^ unit);
        }
        self.count += 1;
        Ok(locator)
    }

    pub fn register_str(&mut self, text: &str) -> Result<i64> {
        let units: Vec<u16> = text.encode_utf16().collect();
        self.register(&units)
    }

    /// The encoded buffer split into pieces of at most `MAX_CHUNK_LENGTH` units
    pub fn chunks(&self) -> Vec<&[u16]> {
        self.buffer.chunks(MAX_CHUNK_LENGTH).collect()
    }
}

/// Recovers a string from its locator, exactly as the generated decoder does
pub fn decode(locator: i64, chunks: &[&[u16]]) -> Result<Vec<u16>> {
    let (low, high, mut state) = random::mask(locator as i32);
    let index = ((locator as u64 >> 32) as i64 ^ low ^ high) as i32;
    let char_at = |position: i64, state: i64| -> Result<(i64, u16)> {
        let next = random::next(state);
        let unit = usize::try_from(position)
            .ok()
            .and_then(|position| chunks.get(position / MAX_CHUNK_LENGTH)?.get(position % MAX_CHUNK_LENGTH))
            .ok_or_else(|| Error::string_error(format!("locator {:#x} points outside the chunks", locator)))?;
        Ok((next, random::output(next) ^ unit))
    };

    let (next, length) = char_at(index as i64, state)?;
    state = next;
    let mut text = Vec::with_capacity(length as usize);
    for i in 0..length as i64 {
        let (next, unit) = char_at(index as i64 + i + 1, state)?;
        state = next;
        text.push(unit);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    fn round_trip(registry: &mut StringRegistry, text: &[u16]) {
        let locator = registry.register(text).unwrap();
        assert_eq!(locator as u32 as i32, registry.seed());
        assert_eq!(decode(locator, &registry.chunks()).unwrap(), text);
    }

    #[test]
    fn test_round_trips() {
        let mut registry = StringRegistry::new(0x1234_5678);
        round_trip(&mut registry, &[]);
        round_trip(&mut registry, &units("a"));
        round_trip(&mut registry, &units("Hello, \u{00e9}\u{4e16}\u{1f600}"));
        round_trip(&mut registry, &[0xd800, 0, 0xffff]);
        let lower: Vec<u16> = (0..=0x7fff).collect();
        let upper: Vec<u16> = (0x8000..=0xffff).collect();
        round_trip(&mut registry, &lower);
        round_trip(&mut registry, &upper);
        assert!(registry.chunks().len() > 1);
    }

    #[test]
    fn test_earlier_locators_survive_later_registrations() {
        let mut registry = StringRegistry::new(-7);
        let texts = ["first", "", "third", "x".repeat(MAX_CHUNK_LENGTH + 10).as_str(), "last"]
            .map(|text| units(text));
        let locators: Vec<i64> = texts.iter().map(|text| registry.register(text).unwrap()).collect();
        let chunks = registry.chunks();
        for (locator, text) in locators.iter().zip(&texts) {
            assert_eq!(&decode(*locator, &chunks).unwrap(), text);
        }
    }

    #[test]
    fn test_equal_strings_get_distinct_locators() {
        let mut registry = StringRegistry::new(99);
        let first = registry.register_str("same").unwrap();
        let second = registry.register_str("same").unwrap();
        assert_ne!(first, second);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_chunking_boundary() {
        let mut registry = StringRegistry::new(1);
        // a record is one length unit plus its text
        registry.register(&vec![b'a' as u16; 2 * MAX_CHUNK_LENGTH]).unwrap();
        assert_eq!(registry.encoded_len(), 2 * MAX_CHUNK_LENGTH + 1);
        let chunks = registry.chunks();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MAX_CHUNK_LENGTH);
        assert_eq!(chunks[1].len(), MAX_CHUNK_LENGTH);
        assert_eq!(chunks[2].len(), 1);
    }

    #[test]
    fn test_empty_registry_has_no_chunks() {
        assert!(StringRegistry::new(5).chunks().is_empty());
    }

    #[test]
    fn test_too_long_string_is_rejected() {
        let mut registry = StringRegistry::new(5);
        assert!(registry.register(&vec![0; 0x10000]).is_err());
        assert_eq!(registry.encoded_len(), 0);
    }

    #[test]
    fn test_decode_outside_chunks_fails() {
        let mut registry = StringRegistry::new(3);
        let locator = registry.register_str("abc").unwrap();
        let chunks = registry.chunks();
        assert!(decode(locator, &[]).is_err());
        assert!(decode(locator, &chunks).is_ok());
    }
}
