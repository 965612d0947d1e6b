use super::ClassPatcher;
use crate::codegen::class_node::ClassNode;
use crate::codegen::code::{Instruction, Node};
use crate::codegen::constpool::ConstantPool;
use crate::codegen::opcodes::{INVOKESTATIC, LCONST_0, LCONST_1, LDC2_W};
use crate::common::error::Result;
use crate::obfuscate::deobfuscator::Deobfuscator;
use crate::obfuscate::registry::StringRegistry;

/// Replaces every string `ldc` with a locator push and a call to the decoder
pub struct StringLiteralsPatcher<'a> {
    strings: &'a mut StringRegistry,
    deobfuscator: &'a Deobfuscator,
}

impl<'a> StringLiteralsPatcher<'a> {
    pub fn new(strings: &'a mut StringRegistry, deobfuscator: &'a Deobfuscator) -> Self {
        Self { strings, deobfuscator }
    }
}

impl ClassPatcher for StringLiteralsPatcher<'_> {
    fn patch(&mut self, class: &mut ClassNode) -> Result<bool> {
        let mut replaced = 0;
        for index in 0..class.class.methods.len() {
            let strings = &mut *self.strings;
            let deobfuscator = self.deobfuscator;
            class.edit_body(index, |body, pool| {
                let mut nodes = Vec::with_capacity(body.nodes.len());
                let mut decoder = None;
                let before = replaced;
                for node in body.nodes.drain(..) {
                    let constant = match &node {
                        Node::Insn(Instruction::Ldc(constant)) => *constant,
                        _ => {
                            nodes.push(node);
                            continue;
                        }
                    };
                    let text = match pool.string_units(constant)? {
                        Some(text) => text,
                        None => {
                            nodes.push(node);
                            continue;
                        }
                    };
                    let locator = strings.register(&text)?;
                    let method = match decoder {
                        Some(method) => method,
                        None => {
                            let method = pool.add_method_ref(
                                &deobfuscator.type_name,
                                deobfuscator.method_name,
                                deobfuscator.method_descriptor,
                            )?;
                            decoder = Some(method);
                            method
                        }
                    };
                    nodes.push(Node::Insn(push_long(pool, locator)?));
                    nodes.push(Node::Insn(Instruction::with_u16(INVOKESTATIC, method)));
                    replaced += 1;
                }
                body.nodes = nodes;
                Ok(replaced > before)
            })?;
        }
        if replaced > 0 {
            log::debug!("Replaced {} string literals in {}", replaced, class.name()?);
        }
        Ok(replaced > 0)
    }
}

fn push_long(pool: &mut ConstantPool, value: i64) -> Result<Instruction> {
    Ok(match value {
        0 => Instruction::simple(LCONST_0),
        1 => Instruction::simple(LCONST_1),
        _ => Instruction::with_u16(LDC2_W, pool.add_long(value)?),
    })
}
