//! A parsed class whose method bodies can be edited in place.
//!
//! Bodies are decoded on first access. Only bodies that were changed are
//! encoded again when the class is written; every other method keeps its
//! original bytes.

use super::attribute::{line_number_table_bytes, local_variable_table_bytes, AttributeInfo, CodeAttribute};
use super::class::ClassFile;
use super::code::MethodBody;
use super::constpool::ConstantPool;
use super::defs::{attribute_names, major_versions};
use super::method::MethodInfo;
use super::refs::scrub_unreferenced;
use super::stackmap::{self, MethodContext};
use super::writer::ClassfileWritable;
use crate::common::classpath::ClassHierarchy;
use crate::common::error::{Error, Result};

pub struct ClassNode {
    pub class: ClassFile,
    bodies: Vec<Option<MethodBody>>,
    modified: Vec<bool>,
}

impl ClassNode {
    pub fn new(class: ClassFile) -> Self {
        let count = class.methods.len();
        Self { class, bodies: vec![None; count], modified: vec![false; count] }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(ClassFile::from_bytes(bytes)?))
    }

    pub fn name(&self) -> Result<String> {
        self.class.name()
    }

    pub fn constant_pool(&mut self) -> &mut ConstantPool {
        &mut self.class.constant_pool
    }

    /// Whether any method body was changed or added
    pub fn is_modified(&self) -> bool {
        self.modified.iter().any(|&modified| modified)
    }

    /// Adds a method together with its body; the Code attribute is written with the class
    pub fn add_method(&mut self, method: MethodInfo, body: MethodBody) -> usize {
        self.class.methods.push(method);
        self.bodies.push(Some(body));
        self.modified.push(true);
        self.class.methods.len() - 1
    }

    /// Runs `edit` over the body of a method.
    ///
    /// The edit returns whether it changed the body; only changed bodies are
    /// encoded again. Methods without code are skipped and report `false`.
    pub fn edit_body<F>(&mut self, method: usize, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut MethodBody, &mut ConstantPool) -> Result<bool>,
    {
        if self.bodies[method].is_none() {
            let code = match self.class.methods[method].code(&self.class.constant_pool)? {
                Some(code) => code,
                None => return Ok(false),
            };
            self.bodies[method] = Some(MethodBody::decode(&code, &self.class.constant_pool)?);
        }
        let body = match self.bodies[method].as_mut() {
            Some(body) => body,
            None => return Ok(false),
        };
        let changed = edit(body, &mut self.class.constant_pool)?;
        if changed {
            self.modified[method] = true;
        }
        Ok(changed)
    }

    /// Writes the class, encoding modified bodies and recomputing their frames
    pub fn to_bytes(mut self, hierarchy: &dyn ClassHierarchy) -> Result<Vec<u8>> {
        let class_name = self.class.name()?;
        for index in 0..self.class.methods.len() {
            if !self.modified[index] {
                continue;
            }
            if let Some(body) = self.bodies[index].take() {
                self.write_body(&class_name, index, body, hierarchy)?;
            }
        }
        if let Some(blanked) = scrub_unreferenced(&mut self.class)? {
            if blanked > 0 {
                log::debug!("Blanked {} unreferenced constants of {}", blanked, class_name);
            }
        }
        Ok(self.class.to_classfile_bytes())
    }

    fn write_body(
        &mut self,
        class_name: &str,
        index: usize,
        body: MethodBody,
        hierarchy: &dyn ClassHierarchy,
    ) -> Result<()> {
        let pool = &mut self.class.constant_pool;
        let method = &self.class.methods[index];
        let name = method.name(pool)?;
        let descriptor = method.descriptor(pool)?;
        let context = MethodContext { class_name, access_flags: method.access_flags, name: &name, descriptor: &descriptor };
        let encoded = body.encode().map_err(|e| Error::in_entry(format!("{}.{}{}", class_name, name, descriptor), e))?;

        let (code, exception_table, max_stack, max_locals, stack_map) = if stackmap::has_subroutines(&encoded.code)? {
            // Frames cannot describe subroutines; keep a conservative stack size
            let max_locals = stackmap::max_locals(&context, &encoded.code)?.max(body.max_locals as usize);
            let max_locals = u16::try_from(max_locals).map_err(|_| Error::codegen_error("too many local variables"))?;
            (encoded.code, encoded.exception_table, body.max_stack.saturating_add(1).max(2), max_locals, None)
        } else {
            let with_frames = self.class.major_version >= major_versions::JAVA_6_0;
            let computed =
                stackmap::compute(&context, encoded.code, encoded.exception_table, pool, hierarchy, with_frames)
                    .map_err(|e| Error::in_entry(format!("{}.{}{}", class_name, name, descriptor), e))?;
            let max_locals = computed.max_locals.max(body.max_locals);
            (computed.code, computed.exception_table, computed.max_stack, max_locals, Some(computed.stack_map))
        };

        let mut attributes = Vec::new();
        if !encoded.line_numbers.is_empty() {
            let name_index = pool.add_utf8(attribute_names::LINE_NUMBER_TABLE)?;
            attributes.push(AttributeInfo::new(name_index, line_number_table_bytes(&encoded.line_numbers)));
        }
        if !encoded.local_variables.is_empty() {
            let name_index = pool.add_utf8(attribute_names::LOCAL_VARIABLE_TABLE)?;
            attributes.push(AttributeInfo::new(name_index, local_variable_table_bytes(&encoded.local_variables)));
        }
        if !encoded.local_variable_types.is_empty() {
            let name_index = pool.add_utf8(attribute_names::LOCAL_VARIABLE_TYPE_TABLE)?;
            attributes.push(AttributeInfo::new(
                name_index,
                local_variable_table_bytes(&encoded.local_variable_types),
            ));
        }
        if self.class.major_version >= major_versions::JAVA_6_0 {
            if let Some(stack_map) = stack_map.filter(|stack_map| !stack_map.is_empty()) {
                let name_index = pool.add_utf8(attribute_names::STACK_MAP_TABLE)?;
                attributes.push(AttributeInfo::new(name_index, stack_map.to_bytes()));
            }
        }

        let mut code_attribute = CodeAttribute::new(max_stack, max_locals, code);
        code_attribute.exception_table = exception_table;
        code_attribute.attributes = attributes;
        let attribute = AttributeInfo::new(pool.add_utf8(attribute_names::CODE)?, code_attribute.to_bytes());

        let method = &mut self.class.methods[index];
        match method.code_position(pool) {
            Some(position) => method.attributes[position] = attribute,
            None => method.attributes.push(attribute),
        }
        Ok(())
    }
}
