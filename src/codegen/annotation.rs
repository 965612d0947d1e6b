//! Reading and rewriting of annotation attributes

use super::constpool::ConstantPool;
use super::reader::ByteReader;
use crate::common::error::{Error, Result};

/// One annotation of a Runtime(In)VisibleAnnotations attribute, kept as its raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAnnotation<'a> {
    pub type_index: u16,
    pub bytes: &'a [u8],
}

/// Splits the payload of an annotations attribute into its annotations
pub fn split_annotations(info: &[u8]) -> Result<Vec<RawAnnotation<'_>>> {
    let mut reader = ByteReader::new(info);
    let count = reader.read_u16()?;
    let mut annotations = Vec::with_capacity(count as usize);
    let mut scratch = Vec::new();
    for _ in 0..count {
        let start = reader.position();
        read_annotation(&mut reader, &mut scratch)?;
        let bytes = &info[start..reader.position()];
        annotations.push(RawAnnotation { type_index: u16::from_be_bytes([bytes[0], bytes[1]]), bytes });
    }
    if !reader.is_empty() {
        return Err(Error::class_format("trailing bytes in annotations attribute"));
    }
    Ok(annotations)
}

/// Builds the payload of an annotations attribute
pub fn join_annotations(annotations: &[RawAnnotation<'_>]) -> Vec<u8> {
    let mut bytes = (annotations.len() as u16).to_be_bytes().to_vec();
    for annotation in annotations {
        bytes.extend_from_slice(annotation.bytes);
    }
    bytes
}

/// Type descriptors of the annotations in an annotations attribute
pub fn annotation_types(constant_pool: &ConstantPool, info: &[u8]) -> Result<Vec<String>> {
    split_annotations(info)?
        .iter()
        .map(|annotation| constant_pool.utf8(annotation.type_index))
        .collect()
}

/// Reads one `annotation` structure, recording every constant pool index it holds
pub(crate) fn read_annotation(reader: &mut ByteReader<'_>, refs: &mut Vec<u16>) -> Result<()> {
    refs.push(reader.read_u16()?);
    let pairs = reader.read_u16()?;
    for _ in 0..pairs {
        refs.push(reader.read_u16()?);
        read_element_value(reader, refs)?;
    }
    Ok(())
}

pub(crate) fn read_element_value(reader: &mut ByteReader<'_>, refs: &mut Vec<u16>) -> Result<()> {
    let tag = reader.read_u8()?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            refs.push(reader.read_u16()?);
        }
        b'e' => {
            refs.push(reader.read_u16()?);
            refs.push(reader.read_u16()?);
        }
        b'@' => read_annotation(reader, refs)?,
        b'[' => {
            let count = reader.read_u16()?;
            for _ in 0..count {
                read_element_value(reader, refs)?;
            }
        }
        other => {
            return Err(Error::class_format(format!("unknown element value tag '{}'", other as char)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(type_index: u16, pairs: &[(u16, u8, u16)]) -> Vec<u8> {
        let mut bytes = type_index.to_be_bytes().to_vec();
        bytes.extend_from_slice(&(pairs.len() as u16).to_be_bytes());
        for (name, tag, value) in pairs {
            bytes.extend_from_slice(&name.to_be_bytes());
            bytes.push(*tag);
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_split_and_join() {
        let first = annotation(3, &[]);
        let second = annotation(5, &[(6, b's', 7)]);
        let mut info = vec![0, 2];
        info.extend_from_slice(&first);
        info.extend_from_slice(&second);

        let annotations = split_annotations(&info).unwrap();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].type_index, 3);
        assert_eq!(annotations[1].type_index, 5);
        assert_eq!(annotations[1].bytes, &second[..]);
        assert_eq!(join_annotations(&annotations), info);
        assert_eq!(join_annotations(&annotations[1..]), [&[0u8, 1][..], &second[..]].concat());
    }

    #[test]
    fn test_nested_values_are_walked() {
        // @A(x = {@B, E.C})
        let mut bytes = vec![0, 1, 0, 1, 0, 2, b'['];
        bytes.extend_from_slice(&[0, 2]);
        bytes.extend_from_slice(&[b'@', 0, 3, 0, 0]);
        bytes.extend_from_slice(&[b'e', 0, 4, 0, 5]);
        let mut refs = Vec::new();
        read_annotation(&mut ByteReader::new(&bytes), &mut refs).unwrap();
        assert_eq!(refs, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let bytes = vec![0, 1, 0, 1, 0, 2, b'?', 0, 0];
        assert!(read_annotation(&mut ByteReader::new(&bytes), &mut Vec::new()).is_err());
    }
}
