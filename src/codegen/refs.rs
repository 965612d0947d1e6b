//! Constant pool reachability.
//!
//! Every constant pool index held by the class structure, its attributes and
//! its bytecode is collected, then closed over the references between
//! constants. Utf8 entries outside that set are dead and can be blanked.

use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;

use super::annotation::{read_annotation, read_element_value};
use super::attribute::{AttributeInfo, CodeAttribute};
use super::class::ClassFile;
use super::code::{instruction_offsets, read_u16_at};
use super::constpool::{Constant, ConstantPool};
use super::defs::attribute_names::*;
use super::opcodes::*;
use super::reader::ByteReader;
use crate::common::error::{Error, Result};

/// Attributes whose constant pool references are understood
static KNOWN_ATTRIBUTES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        CODE,
        CONSTANT_VALUE,
        STACK_MAP_TABLE,
        EXCEPTIONS,
        INNER_CLASSES,
        ENCLOSING_METHOD,
        SYNTHETIC,
        SIGNATURE,
        SOURCE_FILE,
        SOURCE_DEBUG_EXTENSION,
        LINE_NUMBER_TABLE,
        LOCAL_VARIABLE_TABLE,
        LOCAL_VARIABLE_TYPE_TABLE,
        DEPRECATED,
        RUNTIME_VISIBLE_ANNOTATIONS,
        RUNTIME_INVISIBLE_ANNOTATIONS,
        RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS,
        RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS,
        RUNTIME_VISIBLE_TYPE_ANNOTATIONS,
        RUNTIME_INVISIBLE_TYPE_ANNOTATIONS,
        ANNOTATION_DEFAULT,
        BOOTSTRAP_METHODS,
        METHOD_PARAMETERS,
        MODULE,
        MODULE_PACKAGES,
        MODULE_MAIN_CLASS,
        NEST_HOST,
        NEST_MEMBERS,
        RECORD,
        PERMITTED_SUBCLASSES,
    ]
    .into_iter()
    .collect()
});

/// Indices of every constant the class can reach.
///
/// Returns `None` when the class carries an attribute whose layout is not
/// known, since its references cannot be accounted for.
pub fn referenced_constants(class: &ClassFile) -> Result<Option<BTreeSet<u16>>> {
    match structural_references(class)? {
        Some(roots) => close_over(&class.constant_pool, roots).map(Some),
        None => Ok(None),
    }
}

fn structural_references(class: &ClassFile) -> Result<Option<Vec<u16>>> {
    let mut collector = Collector { pool: &class.constant_pool, refs: Vec::new(), unknown: None };
    collector.refs.extend([class.this_class, class.super_class]);
    collector.refs.extend(class.interfaces.iter().copied());
    for field in &class.fields {
        collector.refs.extend([field.name_index, field.descriptor_index]);
        collector.attributes(&field.attributes)?;
    }
    for method in &class.methods {
        collector.refs.extend([method.name_index, method.descriptor_index]);
        collector.attributes(&method.attributes)?;
    }
    collector.attributes(&class.attributes)?;

    if let Some(name) = collector.unknown {
        log::debug!("unknown attribute {} in {}", name, class.name()?);
        return Ok(None);
    }
    Ok(Some(collector.refs))
}

/// Blanks Utf8 entries that nothing but dead `String` constants point at.
///
/// Every other constant stays a root whether or not it is used, so names of
/// classes, members and method types are never blanked. Returns the number of
/// blanked entries, or `None` when the class could not be walked completely
/// and was left alone.
pub fn scrub_unreferenced(class: &mut ClassFile) -> Result<Option<usize>> {
    let reached = match structural_references(class) {
        Ok(Some(mut roots)) => {
            roots.extend(
                class
                    .constant_pool
                    .iter()
                    .filter(|(_, constant)| !matches!(constant, Constant::Utf8(_) | Constant::String(_)))
                    .map(|(index, _)| index),
            );
            close_over(&class.constant_pool, roots)?
        }
        Ok(None) => {
            log::warn!("Not scrubbing the constant pool of {}: unknown attribute", class.name()?);
            return Ok(None);
        }
        Err(error) => {
            log::warn!("Not scrubbing the constant pool of {}: {}", class.name()?, error);
            return Ok(None);
        }
    };
    let dead: Vec<u16> = class
        .constant_pool
        .iter()
        .filter(|(index, constant)| {
            matches!(constant, Constant::Utf8(bytes) if !bytes.is_empty()) && !reached.contains(index)
        })
        .map(|(index, _)| index)
        .collect();
    for &index in &dead {
        class.constant_pool.set_utf8(index, Vec::new())?;
    }
    Ok(Some(dead.len()))
}

fn close_over(pool: &ConstantPool, roots: Vec<u16>) -> Result<BTreeSet<u16>> {
    let mut reached = BTreeSet::new();
    let mut pending = roots;
    while let Some(index) = pending.pop() {
        if index == 0 || !reached.insert(index) {
            continue;
        }
        match pool.get(index)? {
            Constant::Class(name)
            | Constant::String(name)
            | Constant::MethodType(name)
            | Constant::Module(name)
            | Constant::Package(name) => pending.push(*name),
            Constant::FieldRef(first, second)
            | Constant::MethodRef(first, second)
            | Constant::InterfaceMethodRef(first, second)
            | Constant::NameAndType(first, second) => pending.extend([*first, *second]),
            Constant::MethodHandle(_, reference) => pending.push(*reference),
            // the first half indexes the BootstrapMethods attribute
            Constant::Dynamic(_, name_and_type) | Constant::InvokeDynamic(_, name_and_type) => {
                pending.push(*name_and_type)
            }
            _ => {}
        }
    }
    Ok(reached)
}

struct Collector<'a> {
    pool: &'a ConstantPool,
    refs: Vec<u16>,
    unknown: Option<String>,
}

impl Collector<'_> {
    fn attributes(&mut self, attributes: &[AttributeInfo]) -> Result<()> {
        for attribute in attributes {
            self.refs.push(attribute.name_index);
            let name = attribute.name(self.pool)?;
            if !KNOWN_ATTRIBUTES.contains(name.as_str()) {
                self.unknown.get_or_insert(name);
                continue;
            }
            self.attribute(&name, &attribute.info)?;
        }
        Ok(())
    }

    fn read_indices(&mut self, reader: &mut ByteReader<'_>, count: usize) -> Result<()> {
        for _ in 0..count {
            self.refs.push(reader.read_u16()?);
        }
        Ok(())
    }

    fn counted_indices(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        let count = reader.read_u16()? as usize;
        self.read_indices(reader, count)
    }

    fn attribute(&mut self, name: &str, info: &[u8]) -> Result<()> {
        let mut reader = ByteReader::new(info);
        let reader = &mut reader;
        match name {
            CODE => self.code(info)?,
            CONSTANT_VALUE | SIGNATURE | SOURCE_FILE | MODULE_MAIN_CLASS | NEST_HOST => {
                self.read_indices(reader, 1)?
            }
            EXCEPTIONS | NEST_MEMBERS | PERMITTED_SUBCLASSES | MODULE_PACKAGES => self.counted_indices(reader)?,
            ENCLOSING_METHOD => self.read_indices(reader, 2)?,
            INNER_CLASSES => {
                for _ in 0..reader.read_u16()? {
                    self.read_indices(reader, 3)?;
                    reader.skip(2)?;
                }
            }
            LOCAL_VARIABLE_TABLE | LOCAL_VARIABLE_TYPE_TABLE => {
                for _ in 0..reader.read_u16()? {
                    reader.skip(4)?;
                    self.read_indices(reader, 2)?;
                    reader.skip(2)?;
                }
            }
            STACK_MAP_TABLE => self.stack_map(reader)?,
            RUNTIME_VISIBLE_ANNOTATIONS | RUNTIME_INVISIBLE_ANNOTATIONS => {
                for _ in 0..reader.read_u16()? {
                    read_annotation(reader, &mut self.refs)?;
                }
            }
            RUNTIME_VISIBLE_PARAMETER_ANNOTATIONS | RUNTIME_INVISIBLE_PARAMETER_ANNOTATIONS => {
                for _ in 0..reader.read_u8()? {
                    for _ in 0..reader.read_u16()? {
                        read_annotation(reader, &mut self.refs)?;
                    }
                }
            }
            RUNTIME_VISIBLE_TYPE_ANNOTATIONS | RUNTIME_INVISIBLE_TYPE_ANNOTATIONS => {
                for _ in 0..reader.read_u16()? {
                    self.type_annotation(reader)?;
                }
            }
            ANNOTATION_DEFAULT => read_element_value(reader, &mut self.refs)?,
            BOOTSTRAP_METHODS => {
                for _ in 0..reader.read_u16()? {
                    self.read_indices(reader, 1)?;
                    self.counted_indices(reader)?;
                }
            }
            METHOD_PARAMETERS => {
                for _ in 0..reader.read_u8()? {
                    self.read_indices(reader, 1)?;
                    reader.skip(2)?;
                }
            }
            MODULE => self.module(reader)?,
            RECORD => {
                for _ in 0..reader.read_u16()? {
                    self.read_indices(reader, 2)?;
                    let attributes = AttributeInfo::read_list(reader)?;
                    self.attributes(&attributes)?;
                }
            }
            // Synthetic, Deprecated, SourceDebugExtension, LineNumberTable
            _ => {}
        }
        Ok(())
    }

    fn code(&mut self, info: &[u8]) -> Result<()> {
        let code = CodeAttribute::parse(info)?;
        let bytes = &code.code;
        for offset in instruction_offsets(bytes)? {
            match bytes[offset] {
                LDC => self.refs.push(bytes[offset + 1] as u16),
                LDC_W | LDC2_W | GETSTATIC..=INVOKEINTERFACE | INVOKEDYNAMIC | NEW | ANEWARRAY | CHECKCAST
                | INSTANCEOF | MULTIANEWARRAY => self.refs.push(read_u16_at(bytes, offset + 1)?),
                _ => {}
            }
        }
        self.refs.extend(code.exception_table.iter().map(|entry| entry.catch_type));
        self.attributes(&code.attributes)
    }

    fn stack_map(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        for _ in 0..reader.read_u16()? {
            let frame_type = reader.read_u8()?;
            match frame_type {
                0..=63 => {}
                64..=127 => self.verification_types(reader, 1)?,
                247 => {
                    reader.skip(2)?;
                    self.verification_types(reader, 1)?;
                }
                248..=251 => reader.skip(2)?,
                252..=254 => {
                    reader.skip(2)?;
                    self.verification_types(reader, (frame_type - 251) as usize)?;
                }
                255 => {
                    reader.skip(2)?;
                    let locals = reader.read_u16()? as usize;
                    self.verification_types(reader, locals)?;
                    let stack = reader.read_u16()? as usize;
                    self.verification_types(reader, stack)?;
                }
                other => return Err(Error::class_format(format!("reserved stack map frame type {}", other))),
            }
        }
        Ok(())
    }

    fn verification_types(&mut self, reader: &mut ByteReader<'_>, count: usize) -> Result<()> {
        for _ in 0..count {
            match reader.read_u8()? {
                // Object
                7 => self.read_indices(reader, 1)?,
                // Uninitialized carries an offset
                8 => reader.skip(2)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn type_annotation(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        let target_type = reader.read_u8()?;
        match target_type {
            0x00 | 0x01 | 0x16 => reader.skip(1)?,
            0x10..=0x12 | 0x17 | 0x42..=0x46 => reader.skip(2)?,
            0x13..=0x15 => {}
            0x40 | 0x41 => {
                let entries = reader.read_u16()? as usize;
                reader.skip(entries * 6)?;
            }
            0x47..=0x4b => reader.skip(3)?,
            other => return Err(Error::class_format(format!("unknown type annotation target 0x{:02x}", other))),
        }
        let path_length = reader.read_u8()? as usize;
        reader.skip(path_length * 2)?;
        read_annotation(reader, &mut self.refs)
    }

    fn module(&mut self, reader: &mut ByteReader<'_>) -> Result<()> {
        self.read_indices(reader, 1)?;
        reader.skip(2)?;
        self.read_indices(reader, 1)?;
        for _ in 0..reader.read_u16()? {
            self.read_indices(reader, 1)?;
            reader.skip(2)?;
            self.read_indices(reader, 1)?;
        }
        // exports, then opens
        for _ in 0..2 {
            for _ in 0..reader.read_u16()? {
                self.read_indices(reader, 1)?;
                reader.skip(2)?;
                self.counted_indices(reader)?;
            }
        }
        self.counted_indices(reader)?;
        for _ in 0..reader.read_u16()? {
            self.read_indices(reader, 1)?;
            self.counted_indices(reader)?;
        }
        Ok(())
    }
}
