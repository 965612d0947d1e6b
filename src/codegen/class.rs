//! Core classfile structure and its parser

use super::attribute::{find_attribute, AttributeInfo};
use super::constpool::ConstantPool;
use super::defs::{access_flags, major_versions, MAGIC};
use super::field::FieldInfo;
use super::method::MethodInfo;
use super::reader::ByteReader;
use crate::common::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            minor_version: 0,
            major_version: major_versions::JAVA_6_0,
            constant_pool: ConstantPool::new(),
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let magic = reader.read_u32()?;
        if magic != MAGIC {
            return Err(Error::class_format(format!("bad magic number 0x{:08x}", magic)));
        }
        let minor_version = reader.read_u16()?;
        let major_version = reader.read_u16()?;
        let constant_pool = ConstantPool::read(&mut reader)?;
        let access_flags = reader.read_u16()?;
        let this_class = reader.read_u16()?;
        let super_class = reader.read_u16()?;
        let interface_count = reader.read_u16()?;
        let interfaces = (0..interface_count).map(|_| reader.read_u16()).collect::<Result<Vec<_>>>()?;
        let field_count = reader.read_u16()?;
        let fields = (0..field_count).map(|_| FieldInfo::read(&mut reader)).collect::<Result<Vec<_>>>()?;
        let method_count = reader.read_u16()?;
        let methods = (0..method_count).map(|_| MethodInfo::read(&mut reader)).collect::<Result<Vec<_>>>()?;
        let attributes = AttributeInfo::read_list(&mut reader)?;
        if !reader.is_empty() {
            return Err(Error::class_format(format!("{} trailing bytes after class", reader.remaining())));
        }
        Ok(Self {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    /// Internal name of this class
    pub fn name(&self) -> Result<String> {
        self.constant_pool.class_name(self.this_class)
    }

    /// Internal name of the superclass, `None` for java/lang/Object and module-info
    pub fn super_name(&self) -> Result<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<String>> {
        self.interfaces.iter().map(|&index| self.constant_pool.class_name(index)).collect()
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & access_flags::ACC_INTERFACE != 0
    }

    pub fn find_attribute(&self, name: &str) -> Option<&AttributeInfo> {
        find_attribute(&self.attributes, &self.constant_pool, name)
    }

    /// Index of the method with the given name and descriptor
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        let pool = &self.constant_pool;
        self.methods.iter().position(|method| {
            matches!(pool.utf8_bytes(method.name_index), Ok(bytes) if bytes == name.as_bytes())
                && matches!(pool.utf8_bytes(method.descriptor_index), Ok(bytes) if bytes == descriptor.as_bytes())
        })
    }
}

impl Default for ClassFile {
    fn default() -> Self {
        Self::new()
    }
}
