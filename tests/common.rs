// Common test utilities
#![allow(dead_code)]

use std::path::Path;

use tolstr::codegen::attribute::{AttributeInfo, CodeAttribute};
use tolstr::codegen::class::ClassFile;
use tolstr::codegen::code::instruction_offsets;
use tolstr::codegen::constpool::{Constant, ConstantPool};
use tolstr::codegen::defs::access_flags::{ACC_FINAL, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use tolstr::codegen::defs::{attribute_names, OBJECT_CLASS, STRING_DESCRIPTOR};
use tolstr::codegen::field::FieldInfo;
use tolstr::codegen::method::MethodInfo;
use tolstr::codegen::opcodes::*;
use tolstr::codegen::reader::ByteReader;
use tolstr::codegen::writer::ClassfileWritable;

pub const MARKER: &str = "Lio/tolstr/Obfuscate;";

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Assembles small classfiles for the pipeline tests
pub struct ClassBuilder {
    class: ClassFile,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        let mut class = ClassFile::new();
        class.access_flags = ACC_PUBLIC | ACC_SUPER;
        class.this_class = class.constant_pool.add_class(name).unwrap();
        class.super_class = class.constant_pool.add_class(OBJECT_CLASS).unwrap();
        Self { class }
    }

    /// Adds an invisible class annotation without elements
    pub fn annotated(mut self, descriptor: &str) -> Self {
        let pool = &mut self.class.constant_pool;
        let name = pool.add_utf8(attribute_names::RUNTIME_INVISIBLE_ANNOTATIONS).unwrap();
        let mut info = 1u16.to_be_bytes().to_vec();
        info.extend_from_slice(&pool.add_utf8(descriptor).unwrap().to_be_bytes());
        info.extend_from_slice(&[0, 0]);
        self.class.attributes.push(AttributeInfo::new(name, info));
        self
    }

    /// Records `outer` as the enclosing class in an `InnerClasses` attribute
    pub fn nested_in(mut self, outer: &str) -> Self {
        let pool = &mut self.class.constant_pool;
        let name = pool.add_utf8(attribute_names::INNER_CLASSES).unwrap();
        let mut info = 1u16.to_be_bytes().to_vec();
        info.extend_from_slice(&self.class.this_class.to_be_bytes());
        info.extend_from_slice(&pool.add_class(outer).unwrap().to_be_bytes());
        info.extend_from_slice(&[0, 0]);
        info.extend_from_slice(&(ACC_PUBLIC | ACC_STATIC).to_be_bytes());
        self.class.attributes.push(AttributeInfo::new(name, info));
        self
    }

    /// `public static final String <name> = "<value>"` as a compile-time constant
    pub fn string_constant(mut self, name: &str, value: &str) -> Self {
        let pool = &mut self.class.constant_pool;
        let mut field = FieldInfo::new(
            ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
            pool.add_utf8(name).unwrap(),
            pool.add_utf8(STRING_DESCRIPTOR).unwrap(),
        );
        let value = pool.add_string(value).unwrap();
        let constant_value = pool.add_utf8(attribute_names::CONSTANT_VALUE).unwrap();
        field.attributes.push(AttributeInfo::new(constant_value, value.to_be_bytes().to_vec()));
        self.class.fields.push(field);
        self
    }

    /// `public static String <name>() { return "<value>"; }`
    pub fn string_method(mut self, name: &str, value: &str) -> Self {
        let pool = &mut self.class.constant_pool;
        let [high, low] = pool.add_string(value).unwrap().to_be_bytes();
        let mut method = MethodInfo::new(
            ACC_PUBLIC | ACC_STATIC,
            pool.add_utf8(name).unwrap(),
            pool.add_utf8("()Ljava/lang/String;").unwrap(),
        );
        let code = CodeAttribute::new(1, 0, vec![LDC_W, high, low, ARETURN]);
        let code_name = pool.add_utf8(attribute_names::CODE).unwrap();
        method.attributes.push(AttributeInfo::new(code_name, code.to_bytes()));
        self.class.methods.push(method);
        self
    }

    /// `public static String <name>(String[] args, int flag) { return flag != 0 ? "<set>" : "<unset>"; }`
    pub fn choose_method(mut self, name: &str, set: &str, unset: &str) -> Self {
        let pool = &mut self.class.constant_pool;
        let [set_high, set_low] = pool.add_string(set).unwrap().to_be_bytes();
        let [unset_high, unset_low] = pool.add_string(unset).unwrap().to_be_bytes();
        let mut method = MethodInfo::new(
            ACC_PUBLIC | ACC_STATIC,
            pool.add_utf8(name).unwrap(),
            pool.add_utf8("([Ljava/lang/String;I)Ljava/lang/String;").unwrap(),
        );
        let code = vec![
            ILOAD_1, IFEQ, 0, 9, // 0
            LDC_W, set_high, set_low, // 4
            GOTO, 0, 6, // 7
            LDC_W, unset_high, unset_low, // 10
            ARETURN, // 13
        ];
        let code = CodeAttribute::new(1, 2, code);
        let code_name = pool.add_utf8(attribute_names::CODE).unwrap();
        method.attributes.push(AttributeInfo::new(code_name, code.to_bytes()));
        self.class.methods.push(method);
        self
    }

    pub fn build(self) -> ClassFile {
        self.class
    }

    pub fn bytes(self) -> Vec<u8> {
        self.class.to_classfile_bytes()
    }
}

/// Writes `bytes` as the classfile of `name` under a class directory
pub fn write_class(root: &Path, name: &str, bytes: &[u8]) {
    let path = root.join(format!("{}.class", name));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}

pub fn read_class(root: &Path, name: &str) -> ClassFile {
    let bytes = std::fs::read(root.join(format!("{}.class", name))).unwrap();
    ClassFile::from_bytes(&bytes).unwrap()
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn named_utf8(pool: &ConstantPool, index: u16, owner: u16) {
    match pool.get(index) {
        Ok(Constant::Utf8(bytes)) => assert!(!bytes.is_empty(), "constant #{} names an empty Utf8 #{}", owner, index),
        other => panic!("constant #{} points at #{}, not a Utf8: {:?}", owner, index, other),
    }
}

fn assert_kind(pool: &ConstantPool, index: u16, owner: u16, matches: fn(&Constant) -> bool) {
    let constant = pool.get(index).unwrap_or_else(|_| panic!("#{} refers to missing #{}", owner, index));
    assert!(matches(constant), "#{} refers to unexpected {:?} at #{}", owner, constant, index);
}

/// Checks the cross references a class loader and verifier rely on
pub fn assert_well_formed(class: &ClassFile) {
    let pool = &class.constant_pool;
    let is_class: fn(&Constant) -> bool = |constant| matches!(constant, Constant::Class(_));
    let is_name_and_type: fn(&Constant) -> bool = |constant| matches!(constant, Constant::NameAndType(..));
    for (index, constant) in pool.iter() {
        match constant {
            Constant::Class(name) | Constant::MethodType(name) => named_utf8(pool, *name, index),
            Constant::NameAndType(name, descriptor) => {
                named_utf8(pool, *name, index);
                named_utf8(pool, *descriptor, index);
            }
            Constant::String(value) => assert!(matches!(pool.get(*value), Ok(Constant::Utf8(_)))),
            Constant::FieldRef(owner, name_and_type)
            | Constant::MethodRef(owner, name_and_type)
            | Constant::InterfaceMethodRef(owner, name_and_type) => {
                assert_kind(pool, *owner, index, is_class);
                assert_kind(pool, *name_and_type, index, is_name_and_type);
            }
            _ => {}
        }
    }
    assert_kind(pool, class.this_class, 0, is_class);
    assert_kind(pool, class.super_class, 0, is_class);

    for method in &class.methods {
        let code = match method.code(pool).unwrap() {
            Some(code) => code,
            None => continue,
        };
        let bytes = &code.code;
        for offset in instruction_offsets(bytes).unwrap() {
            let operand = match bytes[offset] {
                LDC => Some(bytes[offset + 1] as u16),
                LDC_W | LDC2_W | GETSTATIC..=INVOKEINTERFACE | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                    Some(u16::from_be_bytes([bytes[offset + 1], bytes[offset + 2]]))
                }
                _ => None,
            };
            if let Some(operand) = operand {
                assert!(pool.get(operand).is_ok(), "instruction at {} refers to missing #{}", offset, operand);
            }
        }
        for attribute in &code.attributes {
            if attribute.is_named(pool, attribute_names::STACK_MAP_TABLE) {
                for index in stack_map_classes(&attribute.info) {
                    assert_kind(pool, index, 0, is_class);
                }
            }
        }
    }
}

/// Class indices of every `Object` entry in a StackMapTable
pub fn stack_map_classes(info: &[u8]) -> Vec<u16> {
    let mut reader = ByteReader::new(info);
    let mut classes = Vec::new();
    let mut types = |reader: &mut ByteReader<'_>, count: usize| {
        for _ in 0..count {
            match reader.read_u8().unwrap() {
                7 => classes.push(reader.read_u16().unwrap()),
                8 => reader.skip(2).unwrap(),
                _ => {}
            }
        }
    };
    for _ in 0..reader.read_u16().unwrap() {
        let frame_type = reader.read_u8().unwrap();
        match frame_type {
            0..=63 => {}
            64..=127 => types(&mut reader, 1),
            247 => {
                reader.skip(2).unwrap();
                types(&mut reader, 1);
            }
            248..=251 => reader.skip(2).unwrap(),
            252..=254 => {
                reader.skip(2).unwrap();
                types(&mut reader, (frame_type - 251) as usize);
            }
            _ => {
                reader.skip(2).unwrap();
                let locals = reader.read_u16().unwrap() as usize;
                types(&mut reader, locals);
                let stack = reader.read_u16().unwrap() as usize;
                types(&mut reader, stack);
            }
        }
    }
    classes
}
