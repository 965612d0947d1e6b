//! Constant pool and constants for Java class files
//!
//! The pool is append-only once read: entries never move, so every index held
//! by an untouched attribute stays valid after new constants are added.

use super::error::ConstPoolError;
use super::mutf8;
use super::reader::ByteReader;
use crate::common::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Raw modified UTF-8 bytes
    Utf8(Vec<u8>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    MethodHandle(u8, u16),
    MethodType(u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    Module(u16),
    Package(u16),
    /// Second slot taken by a Long or Double
    Unusable,
}

mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
    pub const CONSTANT_METHODHANDLE: u8 = 15;
    pub const CONSTANT_METHODTYPE: u8 = 16;
    pub const CONSTANT_DYNAMIC: u8 = 17;
    pub const CONSTANT_INVOKEDYNAMIC: u8 = 18;
    pub const CONSTANT_MODULE: u8 = 19;
    pub const CONSTANT_PACKAGE: u8 = 20;
}

impl Constant {
    pub fn to_bytes(&self) -> Vec<u8> {
        use constant_tags::*;
        let mut bytes = Vec::new();
        match self {
            Constant::Utf8(value) => {
                bytes.push(CONSTANT_UTF8);
                bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
                bytes.extend_from_slice(value);
            }
            Constant::Integer(value) => {
                bytes.push(CONSTANT_INTEGER);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Float(value) => {
                bytes.push(CONSTANT_FLOAT);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            Constant::Long(value) => {
                bytes.push(CONSTANT_LONG);
                bytes.extend_from_slice(&value.to_be_bytes());
            }
            Constant::Double(value) => {
                bytes.push(CONSTANT_DOUBLE);
                bytes.extend_from_slice(&value.to_bits().to_be_bytes());
            }
            Constant::Class(index) => push_u16(&mut bytes, CONSTANT_CLASS, &[*index]),
            Constant::String(index) => push_u16(&mut bytes, CONSTANT_STRING, &[*index]),
            Constant::FieldRef(class_index, nat_index) => {
                push_u16(&mut bytes, CONSTANT_FIELDREF, &[*class_index, *nat_index])
            }
            Constant::MethodRef(class_index, nat_index) => {
                push_u16(&mut bytes, CONSTANT_METHODREF, &[*class_index, *nat_index])
            }
            Constant::InterfaceMethodRef(class_index, nat_index) => {
                push_u16(&mut bytes, CONSTANT_INTERFACEMETHODREF, &[*class_index, *nat_index])
            }
            Constant::NameAndType(name_index, descriptor_index) => {
                push_u16(&mut bytes, CONSTANT_NAMEANDTYPE, &[*name_index, *descriptor_index])
            }
            Constant::MethodHandle(reference_kind, reference_index) => {
                bytes.push(CONSTANT_METHODHANDLE);
                bytes.push(*reference_kind);
                bytes.extend_from_slice(&reference_index.to_be_bytes());
            }
            Constant::MethodType(index) => push_u16(&mut bytes, CONSTANT_METHODTYPE, &[*index]),
            Constant::Dynamic(bootstrap_index, nat_index) => {
                push_u16(&mut bytes, CONSTANT_DYNAMIC, &[*bootstrap_index, *nat_index])
            }
            Constant::InvokeDynamic(bootstrap_index, nat_index) => {
                push_u16(&mut bytes, CONSTANT_INVOKEDYNAMIC, &[*bootstrap_index, *nat_index])
            }
            Constant::Module(index) => push_u16(&mut bytes, CONSTANT_MODULE, &[*index]),
            Constant::Package(index) => push_u16(&mut bytes, CONSTANT_PACKAGE, &[*index]),
            Constant::Unusable => {}
        }
        bytes
    }

    /// Number of pool slots the constant occupies
    pub fn slots(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    // Floating point constants compare by bit pattern so that 0.0 and -0.0
    // stay distinct and NaN can be found again.
    fn same_as(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        use constant_tags::*;
        let tag = reader.read_u8()?;
        let constant = match tag {
            CONSTANT_UTF8 => {
                let length = reader.read_u16()? as usize;
                Constant::Utf8(reader.read_bytes(length)?.to_vec())
            }
            CONSTANT_INTEGER => Constant::Integer(reader.read_i32()?),
            CONSTANT_FLOAT => Constant::Float(f32::from_bits(reader.read_u32()?)),
            CONSTANT_LONG => Constant::Long(reader.read_u64()? as i64),
            CONSTANT_DOUBLE => Constant::Double(f64::from_bits(reader.read_u64()?)),
            CONSTANT_CLASS => Constant::Class(reader.read_u16()?),
            CONSTANT_STRING => Constant::String(reader.read_u16()?),
            CONSTANT_FIELDREF => Constant::FieldRef(reader.read_u16()?, reader.read_u16()?),
            CONSTANT_METHODREF => Constant::MethodRef(reader.read_u16()?, reader.read_u16()?),
            CONSTANT_INTERFACEMETHODREF => {
                Constant::InterfaceMethodRef(reader.read_u16()?, reader.read_u16()?)
            }
            CONSTANT_NAMEANDTYPE => Constant::NameAndType(reader.read_u16()?, reader.read_u16()?),
            CONSTANT_METHODHANDLE => Constant::MethodHandle(reader.read_u8()?, reader.read_u16()?),
            CONSTANT_METHODTYPE => Constant::MethodType(reader.read_u16()?),
            CONSTANT_DYNAMIC => Constant::Dynamic(reader.read_u16()?, reader.read_u16()?),
            CONSTANT_INVOKEDYNAMIC => Constant::InvokeDynamic(reader.read_u16()?, reader.read_u16()?),
            CONSTANT_MODULE => Constant::Module(reader.read_u16()?),
            CONSTANT_PACKAGE => Constant::Package(reader.read_u16()?),
            other => return Err(ConstPoolError::UnknownTag(other).into()),
        };
        Ok(constant)
    }
}

fn push_u16(bytes: &mut Vec<u8>, tag: u8, values: &[u16]) {
    bytes.push(tag);
    for value in values {
        bytes.extend_from_slice(&value.to_be_bytes());
    }
}

/// A resolved field or method reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    pub(crate) constants: Vec<Constant>,
}

impl ConstantPool {
    /// Highest number of slots a pool can hold (the count field is a u16 and index 0 is reserved)
    pub const MAX_SLOTS: usize = 65534;

    pub fn new() -> Self {
        Self { constants: Vec::new() }
    }

    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.read_u16()? as usize;
        let mut constants = Vec::with_capacity(count);
        while constants.len() + 1 < count {
            let constant = Constant::read(reader)?;
            let wide = constant.slots() == 2;
            constants.push(constant);
            if wide {
                constants.push(Constant::Unusable);
            }
        }
        if constants.len() + 1 != count {
            return Err(Error::class_format("long constant overruns the constant pool"));
        }
        Ok(Self { constants })
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterates `(index, constant)` pairs, skipping the unusable halves of wide constants
    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.constants
            .iter()
            .enumerate()
            .filter(|(_, constant)| !matches!(constant, Constant::Unusable))
            .map(|(position, constant)| ((position + 1) as u16, constant))
    }

    pub fn get(&self, index: u16) -> Result<&Constant> {
        match index.checked_sub(1).and_then(|i| self.constants.get(i as usize)) {
            Some(Constant::Unusable) | None => Err(ConstPoolError::InvalidIndex(index).into()),
            Some(constant) => Ok(constant),
        }
    }

    pub fn utf8_bytes(&self, index: u16) -> Result<&[u8]> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            _ => Err(ConstPoolError::UnexpectedConstant { index, expected: "Utf8" }.into()),
        }
    }

    pub fn utf8_units(&self, index: u16) -> Result<Vec<u16>> {
        mutf8::decode(self.utf8_bytes(index)?).ok_or_else(|| ConstPoolError::MalformedUtf8(index).into())
    }

    pub fn utf8(&self, index: u16) -> Result<String> {
        mutf8::decode_lossy(self.utf8_bytes(index)?).ok_or_else(|| ConstPoolError::MalformedUtf8(index).into())
    }

    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class(name_index) => self.utf8(*name_index),
            _ => Err(ConstPoolError::UnexpectedConstant { index, expected: "Class" }.into()),
        }
    }

    /// The value of a String constant, or `None` for any other kind of constant
    pub fn string_units(&self, index: u16) -> Result<Option<Vec<u16>>> {
        match self.get(index)? {
            Constant::String(utf8_index) => self.utf8_units(*utf8_index).map(Some),
            _ => Ok(None),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            Constant::NameAndType(name_index, descriptor_index) => {
                Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?))
            }
            _ => Err(ConstPoolError::UnexpectedConstant { index, expected: "NameAndType" }.into()),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        match self.get(index)? {
            Constant::FieldRef(class_index, nat_index)
            | Constant::MethodRef(class_index, nat_index)
            | Constant::InterfaceMethodRef(class_index, nat_index) => {
                let (name, descriptor) = self.name_and_type(*nat_index)?;
                Ok(MemberRef { owner: self.class_name(*class_index)?, name, descriptor })
            }
            _ => Err(ConstPoolError::UnexpectedConstant { index, expected: "member reference" }.into()),
        }
    }

    /// Descriptor of the call site or dynamic constant behind an InvokeDynamic or Dynamic entry
    pub fn dynamic_descriptor(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::InvokeDynamic(_, nat_index) | Constant::Dynamic(_, nat_index) => {
                Ok(self.name_and_type(*nat_index)?.1)
            }
            _ => Err(ConstPoolError::UnexpectedConstant { index, expected: "dynamic constant" }.into()),
        }
    }

    /// Overwrites the bytes of a Utf8 entry in place
    pub fn set_utf8(&mut self, index: u16, bytes: Vec<u8>) -> Result<()> {
        self.utf8_bytes(index)?;
        self.constants[index as usize - 1] = Constant::Utf8(bytes);
        Ok(())
    }

    /// Returns the index of an equal constant, adding it if absent
    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        if let Some((index, _)) = self.iter().find(|(_, existing)| existing.same_as(&constant)) {
            return Ok(index);
        }
        let slots = constant.slots();
        if self.constants.len() + slots > Self::MAX_SLOTS {
            return Err(ConstPoolError::OutOfSpace.into());
        }
        let index = (self.constants.len() + 1) as u16;
        self.constants.push(constant);
        if slots == 2 {
            self.constants.push(Constant::Unusable);
        }
        Ok(index)
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.add(Constant::Utf8(mutf8::encode_str(value)))
    }

    pub fn add_utf8_units(&mut self, units: &[u16]) -> Result<u16> {
        let bytes = mutf8::encode(units);
        if bytes.len() > u16::MAX as usize {
            return Err(Error::codegen_error(format!(
                "string of {} encoded bytes does not fit in a constant",
                bytes.len()
            )));
        }
        self.add(Constant::Utf8(bytes))
    }

    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        self.add(Constant::Class(name_index))
    }

    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.add_string_units(&units)
    }

    pub fn add_string_units(&mut self, units: &[u16]) -> Result<u16> {
        let utf8_index = self.add_utf8_units(units)?;
        self.add(Constant::String(utf8_index))
    }

    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        self.add(Constant::Integer(value))
    }

    pub fn add_long(&mut self, value: i64) -> Result<u16> {
        self.add(Constant::Long(value))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        let descriptor_index = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType(name_index, descriptor_index))
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(class)?;
        let nat_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::FieldRef(class_index, nat_index))
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> Result<u16> {
        let class_index = self.add_class(class)?;
        let nat_index = self.add_name_and_type(name, descriptor)?;
        self.add(Constant::MethodRef(class_index, nat_index))
    }
}
