use super::ClassPatcher;
use crate::codegen::class_node::ClassNode;
use crate::codegen::code::{Instruction, MethodBody, Node};
use crate::codegen::constpool::ConstantPool;
use crate::codegen::defs::access_flags::ACC_STATIC;
use crate::codegen::defs::{attribute_names, STATIC_INITIALIZER_METHOD_NAME, STRING_DESCRIPTOR, VOID_METHOD_DESCRIPTOR};
use crate::codegen::method::MethodInfo;
use crate::codegen::opcodes::{PUTSTATIC, RETURN};
use crate::common::error::{Error, Result};
use crate::obfuscate::analyzer::ClassConfiguration;

/// Turns string compile-time constants into assignments at the start of `<clinit>`.
///
/// Without a `ConstantValue` the compiler can no longer inline the value at
/// use sites, and the assignment's `ldc` is left for the literal stage.
pub struct StringConstantsPatcher<'a> {
    configuration: &'a ClassConfiguration,
}

impl<'a> StringConstantsPatcher<'a> {
    pub fn new(configuration: &'a ClassConfiguration) -> Self {
        Self { configuration }
    }

    fn strip_constant_values(&self, class: &mut ClassNode) -> Result<usize> {
        let mut stripped = 0;
        let class_file = &mut class.class;
        for field in class_file.fields.iter_mut() {
            let name = field.name(&class_file.constant_pool)?;
            if !self.configuration.constant_strings_by_field_name.contains_key(&name) {
                continue;
            }
            let pool = &class_file.constant_pool;
            let before = field.attributes.len();
            field.attributes.retain(|attribute| !attribute.is_named(pool, attribute_names::CONSTANT_VALUE));
            stripped += before - field.attributes.len();
        }
        Ok(stripped)
    }

    fn assignments(&self, pool: &mut ConstantPool) -> Result<Vec<Node>> {
        let mut nodes = Vec::with_capacity(2 * self.configuration.constant_strings_by_field_name.len());
        for (field, value) in &self.configuration.constant_strings_by_field_name {
            let field_ref = pool.add_field_ref(&self.configuration.container, field, STRING_DESCRIPTOR)?;
            nodes.push(Node::Insn(Instruction::Ldc(pool.add_string_units(value)?)));
            nodes.push(Node::Insn(Instruction::with_u16(PUTSTATIC, field_ref)));
        }
        Ok(nodes)
    }
}

impl ClassPatcher for StringConstantsPatcher<'_> {
    fn patch(&mut self, class: &mut ClassNode) -> Result<bool> {
        if self.configuration.constant_strings_by_field_name.is_empty() {
            return Ok(false);
        }
        let stripped = self.strip_constant_values(class)?;
        log::debug!("Removed {} constant values from {}", stripped, self.configuration.container);

        match class.class.find_method(STATIC_INITIALIZER_METHOD_NAME, VOID_METHOD_DESCRIPTOR) {
            Some(index) => {
                log::info!("  Patching <clinit>...");
                let patched = class.edit_body(index, |body, pool| {
                    let original = std::mem::replace(&mut body.nodes, self.assignments(pool)?);
                    body.nodes.extend(original);
                    Ok(true)
                })?;
                if !patched {
                    return Err(Error::class_format(format!(
                        "{} of {} has no code",
                        STATIC_INITIALIZER_METHOD_NAME, self.configuration.container
                    )));
                }
            }
            None => {
                log::info!("  Creating <clinit>...");
                let pool = class.constant_pool();
                let mut body = MethodBody::new();
                body.nodes = self.assignments(pool)?;
                body.push(Instruction::simple(RETURN));
                let method = MethodInfo::new(
                    ACC_STATIC,
                    pool.add_utf8(STATIC_INITIALIZER_METHOD_NAME)?,
                    pool.add_utf8(VOID_METHOD_DESCRIPTOR)?,
                );
                class.add_method(method, body);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::attribute::{AttributeInfo, CodeAttribute};
    use crate::codegen::class::ClassFile;
    use crate::codegen::defs::access_flags::{ACC_FINAL, ACC_PUBLIC};
    use crate::codegen::defs::OBJECT_CLASS;
    use crate::codegen::field::FieldInfo;
    use crate::codegen::opcodes::{ICONST_1, LDC, PUTSTATIC as PUT};
    use crate::common::classpath::ClassHierarchy;
    use std::collections::BTreeMap;

    struct ObjectOnly;

    impl ClassHierarchy for ObjectOnly {
        fn common_super_class(&self, _first: &str, _second: &str) -> String {
            OBJECT_CLASS.to_string()
        }
    }

    fn configuration() -> ClassConfiguration {
        let mut constants = BTreeMap::new();
        constants.insert("KEY".to_string(), "secret".encode_utf16().collect());
        ClassConfiguration { container: "a/Keys".to_string(), constant_strings_by_field_name: constants }
    }

    fn class(with_initializer: bool) -> ClassFile {
        let mut class = ClassFile::new();
        let pool = &mut class.constant_pool;
        class.this_class = pool.add_class("a/Keys").unwrap();
        class.super_class = pool.add_class(OBJECT_CLASS).unwrap();
        let mut field = FieldInfo::new(
            ACC_PUBLIC | ACC_STATIC | ACC_FINAL,
            pool.add_utf8("KEY").unwrap(),
            pool.add_utf8(STRING_DESCRIPTOR).unwrap(),
        );
        let value = pool.add_string("secret").unwrap();
        let constant_value = pool.add_utf8(attribute_names::CONSTANT_VALUE).unwrap();
        field.attributes.push(AttributeInfo::new(constant_value, value.to_be_bytes().to_vec()));
        class.fields.push(field);
        let mut other = FieldInfo::new(ACC_STATIC, pool.add_utf8("count").unwrap(), pool.add_utf8("I").unwrap());
        other.attributes.push(AttributeInfo::new(constant_value, pool.add_integer(3).unwrap().to_be_bytes().to_vec()));
        class.fields.push(other);

        if with_initializer {
            let field_ref = pool.add_field_ref("a/Keys", "counter", "I").unwrap();
            let [high, low] = field_ref.to_be_bytes();
            let code = CodeAttribute::new(1, 0, vec![ICONST_1, PUT, high, low, RETURN]);
            let mut method = MethodInfo::new(
                ACC_STATIC,
                pool.add_utf8(STATIC_INITIALIZER_METHOD_NAME).unwrap(),
                pool.add_utf8(VOID_METHOD_DESCRIPTOR).unwrap(),
            );
            method.attributes.push(AttributeInfo::new(pool.add_utf8(attribute_names::CODE).unwrap(), code.to_bytes()));
            class.methods.push(method);
        }
        class
    }

    fn patch(class: ClassFile) -> ClassFile {
        let configuration = configuration();
        let mut node = ClassNode::new(class);
        assert!(StringConstantsPatcher::new(&configuration).patch(&mut node).unwrap());
        ClassFile::from_bytes(&node.to_bytes(&ObjectOnly).unwrap()).unwrap()
    }

    fn initializer_code(class: &ClassFile) -> Vec<u8> {
        let index = class.find_method(STATIC_INITIALIZER_METHOD_NAME, VOID_METHOD_DESCRIPTOR).unwrap();
        class.methods[index].code(&class.constant_pool).unwrap().unwrap().code
    }

    #[test]
    fn test_existing_initializer_gets_assignments_first() {
        let patched = patch(class(true));
        assert_eq!(patched.fields[0].constant_value_index(&patched.constant_pool).unwrap(), None);
        // fields outside the configuration keep their values
        assert!(patched.fields[1].constant_value_index(&patched.constant_pool).unwrap().is_some());

        let code = initializer_code(&patched);
        assert_eq!(code[0], LDC);
        assert_eq!(
            patched.constant_pool.string_units(code[1] as u16).unwrap(),
            Some("secret".encode_utf16().collect())
        );
        assert_eq!(code[2], PUT);
        let field = patched.constant_pool.member_ref(u16::from_be_bytes([code[3], code[4]])).unwrap();
        assert_eq!(field.name, "KEY");
        assert_eq!(&code[5..], &[ICONST_1, PUT, code[7], code[8], RETURN]);
    }

    #[test]
    fn test_missing_initializer_is_created() {
        let patched = patch(class(false));
        let index = patched.find_method(STATIC_INITIALIZER_METHOD_NAME, VOID_METHOD_DESCRIPTOR).unwrap();
        assert_eq!(patched.methods[index].access_flags, ACC_STATIC);
        let code = initializer_code(&patched);
        assert_eq!(code.len(), 6);
        assert_eq!(code[0], LDC);
        assert_eq!(code[2], PUT);
        assert_eq!(code[5], RETURN);
    }
}
