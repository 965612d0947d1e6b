//! Attributes and exception table structures for Java class files

use super::constpool::ConstantPool;
use super::reader::ByteReader;
use crate::common::error::Result;

/// An attribute kept as raw bytes; its name is resolved through the constant pool
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name_index: u16,
    pub info: Vec<u8>,
}

impl AttributeInfo {
    pub fn new(name_index: u16, info: Vec<u8>) -> Self {
        Self { name_index, info }
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let name_index = reader.read_u16()?;
        let length = reader.read_u32()? as usize;
        let info = reader.read_bytes(length)?.to_vec();
        Ok(Self { name_index, info })
    }

    pub fn read_list(reader: &mut ByteReader<'_>) -> Result<Vec<Self>> {
        let count = reader.read_u16()?;
        (0..count).map(|_| Self::read(reader)).collect()
    }

    pub fn name(&self, constant_pool: &ConstantPool) -> Result<String> {
        constant_pool.utf8(self.name_index)
    }

    pub fn is_named(&self, constant_pool: &ConstantPool, name: &str) -> bool {
        matches!(constant_pool.utf8_bytes(self.name_index), Ok(bytes) if bytes == name.as_bytes())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.info.len() + 6);
        bytes.extend_from_slice(&self.name_index.to_be_bytes());
        bytes.extend_from_slice(&(self.info.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.info);
        bytes
    }
}

/// Finds the first attribute with the given name
pub fn find_attribute<'a>(
    attributes: &'a [AttributeInfo],
    constant_pool: &ConstantPool,
    name: &str,
) -> Option<&'a AttributeInfo> {
    attributes.iter().find(|attribute| attribute.is_named(constant_pool, name))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        Self {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn parse(info: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(info);
        let max_stack = reader.read_u16()?;
        let max_locals = reader.read_u16()?;
        let code_length = reader.read_u32()? as usize;
        let code = reader.read_bytes(code_length)?.to_vec();
        let table_length = reader.read_u16()?;
        let mut exception_table = Vec::with_capacity(table_length as usize);
        for _ in 0..table_length {
            exception_table.push(ExceptionTableEntry::new(
                reader.read_u16()?,
                reader.read_u16()?,
                reader.read_u16()?,
                reader.read_u16()?,
            ));
        }
        let attributes = AttributeInfo::read_list(&mut reader)?;
        Ok(Self { max_stack, max_locals, code, exception_table, attributes })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.max_stack.to_be_bytes());
        bytes.extend_from_slice(&self.max_locals.to_be_bytes());
        bytes.extend_from_slice(&(self.code.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.code);
        bytes.extend_from_slice(&(self.exception_table.len() as u16).to_be_bytes());
        for entry in &self.exception_table {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes.extend_from_slice(&(self.attributes.len() as u16).to_be_bytes());
        for attribute in &self.attributes {
            bytes.extend_from_slice(&attribute.to_bytes());
        }
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// Zero catches everything
    pub catch_type: u16,
}

impl ExceptionTableEntry {
    pub fn new(start_pc: u16, end_pc: u16, handler_pc: u16, catch_type: u16) -> Self {
        Self { start_pc, end_pc, handler_pc, catch_type }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8);
        bytes.extend_from_slice(&self.start_pc.to_be_bytes());
        bytes.extend_from_slice(&self.end_pc.to_be_bytes());
        bytes.extend_from_slice(&self.handler_pc.to_be_bytes());
        bytes.extend_from_slice(&self.catch_type.to_be_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

pub fn parse_line_number_table(info: &[u8]) -> Result<Vec<LineNumberEntry>> {
    let mut reader = ByteReader::new(info);
    let count = reader.read_u16()?;
    (0..count)
        .map(|_| -> Result<LineNumberEntry> {
            Ok(LineNumberEntry { start_pc: reader.read_u16()?, line_number: reader.read_u16()? })
        })
        .collect()
}

pub fn line_number_table_bytes(entries: &[LineNumberEntry]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(2 + entries.len() * 4);
    bytes.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for entry in entries {
        bytes.extend_from_slice(&entry.start_pc.to_be_bytes());
        bytes.extend_from_slice(&entry.line_number.to_be_bytes());
    }
    bytes
}

/// One entry of a LocalVariableTable or LocalVariableTypeTable
/// (the latter stores a signature in `descriptor_index`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

pub fn parse_local_variable_table(info: &[u8]) -> Result<Vec<LocalVariableEntry>> {
    let mut reader = ByteReader::new(info);
    let count = reader.read_u16()?;
    (0..count)
        .map(|_| -> Result<LocalVariableEntry> {
            Ok(LocalVariableEntry {
                start_pc: reader.read_u16()?,
                length: reader.read_u16()?,
                name_index: reader.read_u16()?,
                descriptor_index: reader.read_u16()?,
                index: reader.read_u16()?,
            })
        })
        .collect()
}

pub fn local_variable_table_bytes(entries: &[LocalVariableEntry]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(2 + entries.len() * 10);
    bytes.extend_from_slice(&(entries.len() as u16).to_be_bytes());
    for entry in entries {
        for value in [entry.start_pc, entry.length, entry.name_index, entry.descriptor_index, entry.index] {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
    }
    bytes
}
