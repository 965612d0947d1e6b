//! FieldInfo structure and serialization

use super::attribute::{find_attribute, AttributeInfo};
use super::constpool::ConstantPool;
use super::defs::attribute_names;
use super::reader::ByteReader;
use crate::common::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
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

    /// The constant pool index named by the ConstantValue attribute, if any
    pub fn constant_value_index(&self, constant_pool: &ConstantPool) -> Result<Option<u16>> {
        match find_attribute(&self.attributes, constant_pool, attribute_names::CONSTANT_VALUE) {
            Some(attribute) if attribute.info.len() == 2 => {
                Ok(Some(u16::from_be_bytes([attribute.info[0], attribute.info[1]])))
            }
            Some(_) => Err(Error::class_format("ConstantValue attribute must be 2 bytes long")),
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
