//! Trait-based serialization for classfile structures

use std::io::Write;

use super::class::ClassFile;
use super::constpool::ConstantPool;

/// An object which can be written into a classfile.
pub trait ClassfileWritable {
    /// Writes the bytes of this object into the given buffer.
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()>;

    /// Writes the bytes of this object into a newly created buffer.
    fn to_classfile_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.write_to_classfile(&mut buffer);
        buffer
    }
}

impl ClassfileWritable for ClassFile {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        buffer.write_all(&self.magic.to_be_bytes())?;
        buffer.write_all(&self.minor_version.to_be_bytes())?;
        buffer.write_all(&self.major_version.to_be_bytes())?;

        self.constant_pool.write_to_classfile(buffer)?;

        buffer.write_all(&self.access_flags.to_be_bytes())?;
        buffer.write_all(&self.this_class.to_be_bytes())?;
        buffer.write_all(&self.super_class.to_be_bytes())?;

        buffer.write_all(&(self.interfaces.len() as u16).to_be_bytes())?;
        for interface in &self.interfaces {
            buffer.write_all(&interface.to_be_bytes())?;
        }

        buffer.write_all(&(self.fields.len() as u16).to_be_bytes())?;
        for field in &self.fields {
            buffer.write_all(&field.to_bytes())?;
        }

        buffer.write_all(&(self.methods.len() as u16).to_be_bytes())?;
        for method in &self.methods {
            buffer.write_all(&method.to_bytes())?;
        }

        buffer.write_all(&(self.attributes.len() as u16).to_be_bytes())?;
        for attribute in &self.attributes {
            buffer.write_all(&attribute.to_bytes())?;
        }
        Ok(())
    }
}

impl ClassfileWritable for ConstantPool {
    fn write_to_classfile<W: Write>(&self, buffer: &mut W) -> std::io::Result<()> {
        // Count is the number of slots plus one
        buffer.write_all(&((self.len() + 1) as u16).to_be_bytes())?;
        for (_, constant) in self.iter() {
            buffer.write_all(&constant.to_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::defs::access_flags::{ACC_PUBLIC, ACC_SUPER};
    use crate::codegen::method::MethodInfo;

    #[test]
    fn test_written_class_parses_back() {
        let mut class = ClassFile::new();
        class.access_flags = ACC_PUBLIC | ACC_SUPER;
        class.this_class = class.constant_pool.add_class("a/B").unwrap();
        class.super_class = class.constant_pool.add_class("java/lang/Object").unwrap();
        let name_index = class.constant_pool.add_utf8("run").unwrap();
        let descriptor_index = class.constant_pool.add_utf8("()V").unwrap();
        class.methods.push(MethodInfo::new(ACC_PUBLIC, name_index, descriptor_index));
        class.constant_pool.add_long(7).unwrap();

        let bytes = class.to_classfile_bytes();
        let parsed = ClassFile::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.name().unwrap(), "a/B");
        assert_eq!(parsed.super_name().unwrap().as_deref(), Some("java/lang/Object"));
        assert_eq!(parsed.find_method("run", "()V"), Some(0));
        assert_eq!(parsed.to_classfile_bytes(), bytes);
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(ClassFile::from_bytes(&[0, 0, 0, 0]).is_err());
    }
}
