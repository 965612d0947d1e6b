//! Utilities to read field and method descriptors

use crate::common::error::{Error, Result};

/// Splits a method descriptor into its parameter descriptors and return descriptor
pub fn parse_method_descriptor(descriptor: &str) -> Result<(Vec<String>, String)> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(Error::class_format(format!("invalid method descriptor {}", descriptor)));
    }
    let mut params = Vec::new();
    let mut position = 1;
    while bytes.get(position) != Some(&b')') {
        let end = field_descriptor_end(descriptor, position)?;
        params.push(descriptor[position..end].to_string());
        position = end;
    }
    let return_start = position + 1;
    let return_end = if bytes.get(return_start) == Some(&b'V') {
        return_start + 1
    } else {
        field_descriptor_end(descriptor, return_start)?
    };
    if return_end != bytes.len() {
        return Err(Error::class_format(format!("invalid method descriptor {}", descriptor)));
    }
    Ok((params, descriptor[return_start..].to_string()))
}

fn field_descriptor_end(descriptor: &str, start: usize) -> Result<usize> {
    let bytes = descriptor.as_bytes();
    let mut position = start;
    while bytes.get(position) == Some(&b'[') {
        position += 1;
    }
    match bytes.get(position) {
        Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => Ok(position + 1),
        Some(b'L') => match descriptor[position..].find(';') {
            Some(end) => Ok(position + end + 1),
            None => Err(Error::class_format(format!("unterminated class type in {}", descriptor))),
        },
        _ => Err(Error::class_format(format!("invalid descriptor {} at {}", descriptor, start))),
    }
}

/// Number of local variable or operand stack slots a value of this type uses
pub fn slot_size(descriptor: &str) -> usize {
    match descriptor.as_bytes().first() {
        Some(b'J' | b'D') => 2,
        Some(b'V') | None => 0,
        _ => 1,
    }
}

/// Internal name (or array descriptor) of a reference type descriptor
pub fn reference_name(descriptor: &str) -> Option<&str> {
    if descriptor.starts_with('[') {
        Some(descriptor)
    } else if descriptor.starts_with('L') && descriptor.ends_with(';') {
        Some(&descriptor[1..descriptor.len() - 1])
    } else {
        None
    }
}

/// Field descriptor for an internal name; array names are already descriptors
pub fn class_descriptor(name: &str) -> String {
    if name.starts_with('[') {
        name.to_string()
    } else {
        format!("L{};", name)
    }
}
