//! MethodInfo structure and serialization

use super::attribute::{AttributeInfo, CodeAttribute};
use super::constpool::ConstantPool;
use super::defs::attribute_names;
use super::reader::ByteReader;
use crate::common::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    pub fn new(access_flags: u16, name_index: u16, descriptor_index: u16) -> Self {
        Self { access_flags, name_index, descriptor_index, attributes: Vec::new() }
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let access_flags = reader.read_u16()?;
        let name_index = reader.read_u16()?;
        let descriptor_index = reader.read_u16()?;
        let attributes = AttributeInfo::read_list(reader)?;
        Ok(Self { access_flags, name_index, descriptor_index, attributes })
    }

    pub fn name(&self, constant_pool: &ConstantPool) -> Result<String> {
        constant_pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, constant_pool: &ConstantPool) -> Result<String> {
        constant_pool.utf8(self.descriptor_index)
    }

    /// Position of the Code attribute in `attributes`
    pub fn code_position(&self, constant_pool: &ConstantPool) -> Option<usize> {
        self.attributes
            .iter()
            .position(|attribute| attribute.is_named(constant_pool, attribute_names::CODE))
    }

    pub fn code(&self, constant_pool: &ConstantPool) -> Result<Option<CodeAttribute>> {
        match self.code_position(constant_pool) {
            Some(position) => CodeAttribute::parse(&self.attributes[position].info).map(Some),
            None => Ok(None),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.access_flags.to_be_bytes());
        bytes.extend_from_slice(&self.name_index.to_be_bytes());
        bytes.extend_from_slice(&self.descriptor_index.to_be_bytes());
        bytes.extend_from_slice(&(self.attributes.len() as u16).to_be_bytes());
        for attribute in &self.attributes {
            bytes.extend_from_slice(&attribute.to_bytes());
        }
        bytes
    }
}
