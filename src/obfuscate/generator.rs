//! Bytecode of the decoder class.
//!
//! The class keeps the encoded buffer as an array of string chunks and
//! decodes locators with the same keystream as [`super::random`]. Each
//! helper method mirrors the Rust function of the same name.

use super::deobfuscator::Deobfuscator;
use super::registry::StringRegistry;
use crate::codegen::class::ClassFile;
use crate::codegen::class_node::ClassNode;
use crate::codegen::code::{Instruction, MethodBody};
use crate::codegen::constpool::ConstantPool;
use crate::codegen::defs::access_flags::{ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER};
use crate::codegen::defs::{
    major_versions, CONSTRUCTOR_METHOD_NAME, OBJECT_CLASS, STATIC_INITIALIZER_METHOD_NAME, STRING_CLASS,
    VOID_METHOD_DESCRIPTOR,
};
use crate::codegen::field::FieldInfo;
use crate::codegen::method::MethodInfo;
use crate::codegen::opcodes::*;
use crate::common::classpath::ClassHierarchy;
use crate::common::error::{Error, Result};
use crate::consts::MAX_CHUNK_LENGTH;

const CHUNKS_FIELD_NAME: &str = "chunks";
const CHUNKS_FIELD_DESCRIPTOR: &str = "[Ljava/lang/String;";

const SEED_METHOD: (&str, &str) = ("seed", "(J)J");
const NEXT_METHOD: (&str, &str) = ("next", "(J)J");
const ROTL_METHOD: (&str, &str) = ("rotl", "(SI)S");
const CHAR_AT_METHOD: (&str, &str) = ("charAt", "(IJ)J");

const T_CHAR: u8 = 5;

pub struct DeobfuscatorGenerator<'a> {
    deobfuscator: &'a Deobfuscator,
    registry: &'a StringRegistry,
    hierarchy: &'a dyn ClassHierarchy,
}

impl<'a> DeobfuscatorGenerator<'a> {
    pub fn new(
        deobfuscator: &'a Deobfuscator,
        registry: &'a StringRegistry,
        hierarchy: &'a dyn ClassHierarchy,
    ) -> Self {
        Self { deobfuscator, registry, hierarchy }
    }

    /// Classfile bytes of the decoder holding every string registered so far
    pub fn generate(&self) -> Result<Vec<u8>> {
        let name = &self.deobfuscator.type_name;
        self.build().and_then(|node| node.to_bytes(self.hierarchy)).map_err(|e| Error::in_entry(name.as_str(), e))
    }

    fn build(&self) -> Result<ClassNode> {
        let owner = self.deobfuscator.type_name.as_str();
        let mut class = ClassFile::new();
        class.major_version = major_versions::JAVA_6_0;
        class.access_flags = ACC_PUBLIC | ACC_SUPER;
        class.this_class = class.constant_pool.add_class(owner)?;
        class.super_class = class.constant_pool.add_class(OBJECT_CLASS)?;
        let field = FieldInfo::new(
            ACC_PRIVATE | ACC_STATIC | ACC_FINAL,
            class.constant_pool.add_utf8(CHUNKS_FIELD_NAME)?,
            class.constant_pool.add_utf8(CHUNKS_FIELD_DESCRIPTOR)?,
        );
        class.fields.push(field);

        let mut node = ClassNode::new(class);
        let static_initializer = self.static_initializer(node.constant_pool())?;
        add_method(&mut node, ACC_STATIC, (STATIC_INITIALIZER_METHOD_NAME, VOID_METHOD_DESCRIPTOR), static_initializer)?;
        let constructor = constructor(node.constant_pool())?;
        add_method(&mut node, ACC_PUBLIC, (CONSTRUCTOR_METHOD_NAME, VOID_METHOD_DESCRIPTOR), constructor)?;
        let get_string = get_string(owner, node.constant_pool())?;
        let entry = (self.deobfuscator.method_name, self.deobfuscator.method_descriptor);
        add_method(&mut node, ACC_PUBLIC | ACC_STATIC, entry, get_string)?;
        let seed = seed(node.constant_pool())?;
        add_method(&mut node, ACC_PRIVATE | ACC_STATIC, SEED_METHOD, seed)?;
        let next = next(owner, node.constant_pool())?;
        add_method(&mut node, ACC_PRIVATE | ACC_STATIC, NEXT_METHOD, next)?;
        add_method(&mut node, ACC_PRIVATE | ACC_STATIC, ROTL_METHOD, rotl())?;
        let char_at = char_at(owner, node.constant_pool())?;
        add_method(&mut node, ACC_PRIVATE | ACC_STATIC, CHAR_AT_METHOD, char_at)?;
        Ok(node)
    }

    fn static_initializer(&self, pool: &mut ConstantPool) -> Result<MethodBody> {
        let owner = self.deobfuscator.type_name.as_str();
        let chunks = self.registry.chunks();
        let field = pool.add_field_ref(owner, CHUNKS_FIELD_NAME, CHUNKS_FIELD_DESCRIPTOR)?;
        let mut body = MethodBody::new();
        push_int(&mut body, pool, chunk_count(chunks.len())?)?;
        body.push(Instruction::with_u16(ANEWARRAY, pool.add_class(STRING_CLASS)?));
        body.push(Instruction::with_u16(PUTSTATIC, field));
        body.push(Instruction::with_u16(GETSTATIC, field));
        for (index, chunk) in chunks.iter().enumerate() {
            body.push(Instruction::simple(DUP));
            push_int(&mut body, pool, chunk_count(index)?)?;
            body.push(Instruction::Ldc(pool.add_string_units(chunk)?));
            body.push(Instruction::simple(AASTORE));
        }
        body.push(Instruction::simple(POP));
        body.push(Instruction::simple(RETURN));
        Ok(body)
    }
}

fn add_method(node: &mut ClassNode, access: u16, (name, descriptor): (&str, &str), body: MethodBody) -> Result<()> {
    let pool = node.constant_pool();
    let method = MethodInfo::new(access, pool.add_utf8(name)?, pool.add_utf8(descriptor)?);
    node.add_method(method, body);
    Ok(())
}

fn chunk_count(count: usize) -> Result<i32> {
    i32::try_from(count).map_err(|_| Error::codegen_error(format!("{} chunks do not fit in an array", count)))
}

fn push_int(body: &mut MethodBody, pool: &mut ConstantPool, value: i32) -> Result<()> {
    match value {
        -1..=5 => body.push(Instruction::simple((ICONST_0 as i32 + value) as u8)),
        -128..=127 => body.push(Instruction::with_u8(BIPUSH, value as i8 as u8)),
        -32768..=32767 => body.push(Instruction::with_u16(SIPUSH, value as i16 as u16)),
        _ => body.push(Instruction::Ldc(pool.add_integer(value)?)),
    }
    Ok(())
}

fn push_long(body: &mut MethodBody, pool: &mut ConstantPool, value: i64) -> Result<()> {
    body.push(Instruction::with_u16(LDC2_W, pool.add_long(value)?));
    Ok(())
}

fn ops(body: &mut MethodBody, opcodes: &[u8]) {
    for &opcode in opcodes {
        body.push(Instruction::simple(opcode));
    }
}

fn invoke_own(body: &mut MethodBody, pool: &mut ConstantPool, owner: &str, (name, descriptor): (&str, &str)) -> Result<()> {
    body.push(Instruction::with_u16(INVOKESTATIC, pool.add_method_ref(owner, name, descriptor)?));
    Ok(())
}

fn constructor(pool: &mut ConstantPool) -> Result<MethodBody> {
    let mut body = MethodBody::new();
    body.push(Instruction::simple(ALOAD_0));
    let init = pool.add_method_ref(OBJECT_CLASS, CONSTRUCTOR_METHOD_NAME, VOID_METHOD_DESCRIPTOR)?;
    body.push(Instruction::with_u16(INVOKESPECIAL, init));
    body.push(Instruction::simple(RETURN));
    Ok(body)
}

/// `seed(J)J`: locals x=0, z=2
fn seed(pool: &mut ConstantPool) -> Result<MethodBody> {
    let mut body = MethodBody::new();
    ops(&mut body, &[LLOAD_0, LLOAD_0]);
    body.push(Instruction::with_u8(BIPUSH, 33));
    ops(&mut body, &[LUSHR, LXOR]);
    push_long(&mut body, pool, 0x62a9_d9ed_7997_05f5)?;
    ops(&mut body, &[LMUL, LSTORE_2, LLOAD_2, LLOAD_2]);
    body.push(Instruction::with_u8(BIPUSH, 28));
    ops(&mut body, &[LUSHR, LXOR]);
    push_long(&mut body, pool, 0xcb24_d0a5_c88c_35b3_u64 as i64)?;
    body.push(Instruction::simple(LMUL));
    body.push(Instruction::with_u8(BIPUSH, 32));
    ops(&mut body, &[LUSHR, LRETURN]);
    Ok(body)
}

/// `next(J)J`: locals state=0, s0=2, s1=3, next=4
fn next(owner: &str, pool: &mut ConstantPool) -> Result<MethodBody> {
    const S0: u8 = 2;
    const S1: u8 = 3;
    const NEXT: u8 = 4;
    let mut body = MethodBody::new();
    let load = |body: &mut MethodBody, index: u8| body.push(Instruction::with_u8(ILOAD, index));
    let store = |body: &mut MethodBody, index: u8| body.push(Instruction::with_u8(ISTORE, index));

    ops(&mut body, &[LLOAD_0, L2I, I2S]);
    store(&mut body, S0);
    body.push(Instruction::simple(LLOAD_0));
    body.push(Instruction::with_u8(BIPUSH, 16));
    ops(&mut body, &[LUSHR, L2I, I2S]);
    store(&mut body, S1);

    // next = rotl(s0 + s1, 9) + s0
    load(&mut body, S0);
    load(&mut body, S1);
    ops(&mut body, &[IADD, I2S]);
    body.push(Instruction::with_u8(BIPUSH, 9));
    invoke_own(&mut body, pool, owner, ROTL_METHOD)?;
    load(&mut body, S0);
    ops(&mut body, &[IADD, I2S]);
    store(&mut body, NEXT);

    // s1 ^= s0
    load(&mut body, S1);
    load(&mut body, S0);
    ops(&mut body, &[IXOR, I2S]);
    store(&mut body, S1);

    // s0 = rotl(s0, 13) ^ s1 ^ (s1 << 5)
    load(&mut body, S0);
    body.push(Instruction::with_u8(BIPUSH, 13));
    invoke_own(&mut body, pool, owner, ROTL_METHOD)?;
    load(&mut body, S1);
    ops(&mut body, &[IXOR, I2S]);
    load(&mut body, S1);
    ops(&mut body, &[ICONST_5, ISHL, IXOR, I2S]);
    store(&mut body, S0);

    // s1 = rotl(s1, 10)
    load(&mut body, S1);
    body.push(Instruction::with_u8(BIPUSH, 10));
    invoke_own(&mut body, pool, owner, ROTL_METHOD)?;
    store(&mut body, S1);

    load(&mut body, NEXT);
    body.push(Instruction::simple(I2L));
    body.push(Instruction::with_u8(BIPUSH, 16));
    body.push(Instruction::simple(LSHL));
    load(&mut body, S1);
    ops(&mut body, &[I2L, LOR]);
    body.push(Instruction::with_u8(BIPUSH, 16));
    body.push(Instruction::simple(LSHL));
    load(&mut body, S0);
    ops(&mut body, &[I2L, LOR, LRETURN]);
    Ok(body)
}

/// `rotl(SI)S`: locals x=0, k=1
fn rotl() -> MethodBody {
    let mut body = MethodBody::new();
    ops(&mut body, &[ILOAD_0, ILOAD_1, ISHL, ILOAD_0]);
    body.push(Instruction::with_u8(BIPUSH, 32));
    ops(&mut body, &[ILOAD_1, ISUB, IUSHR, IOR, I2S, IRETURN]);
    body
}

/// `charAt(IJ)J`: locals position=0, state=1, next=3
fn char_at(owner: &str, pool: &mut ConstantPool) -> Result<MethodBody> {
    let chunk_length = MAX_CHUNK_LENGTH as u16;
    let mut body = MethodBody::new();
    body.push(Instruction::simple(LLOAD_1));
    invoke_own(&mut body, pool, owner, NEXT_METHOD)?;
    ops(&mut body, &[LSTORE_3, LLOAD_3]);
    body.push(Instruction::with_u16(
        GETSTATIC,
        pool.add_field_ref(owner, CHUNKS_FIELD_NAME, CHUNKS_FIELD_DESCRIPTOR)?,
    ));
    body.push(Instruction::simple(ILOAD_0));
    body.push(Instruction::with_u16(SIPUSH, chunk_length));
    ops(&mut body, &[IDIV, AALOAD, ILOAD_0]);
    body.push(Instruction::with_u16(SIPUSH, chunk_length));
    body.push(Instruction::simple(IREM));
    body.push(Instruction::with_u16(INVOKEVIRTUAL, pool.add_method_ref(STRING_CLASS, "charAt", "(I)C")?));
    body.push(Instruction::simple(I2L));
    body.push(Instruction::with_u8(BIPUSH, 32));
    ops(&mut body, &[LSHL, LXOR, LRETURN]);
    Ok(body)
}

/// `getString(J)Ljava/lang/String;`: locals locator=0, state=2, low=4,
/// high=6, index=8, length=9, chars=10, i=11
fn get_string(owner: &str, pool: &mut ConstantPool) -> Result<MethodBody> {
    const LOW: u8 = 4;
    const HIGH: u8 = 6;
    const INDEX: u8 = 8;
    const LENGTH: u8 = 9;
    const CHARS: u8 = 10;
    const I: u8 = 11;
    let mut body = MethodBody::new();

    // state = next(seed(locator & 0xffffffff))
    body.push(Instruction::simple(LLOAD_0));
    push_long(&mut body, pool, 0xffff_ffff)?;
    body.push(Instruction::simple(LAND));
    invoke_own(&mut body, pool, owner, SEED_METHOD)?;
    invoke_own(&mut body, pool, owner, NEXT_METHOD)?;
    body.push(Instruction::simple(LSTORE_2));

    // low = (state >>> 32) & 0xffff
    body.push(Instruction::simple(LLOAD_2));
    body.push(Instruction::with_u8(BIPUSH, 32));
    body.push(Instruction::simple(LUSHR));
    push_long(&mut body, pool, 0xffff)?;
    body.push(Instruction::simple(LAND));
    body.push(Instruction::with_u8(LSTORE, LOW));

    // state = next(state); high = (state >>> 16) & 0xffff0000 widened with its sign
    body.push(Instruction::simple(LLOAD_2));
    invoke_own(&mut body, pool, owner, NEXT_METHOD)?;
    ops(&mut body, &[LSTORE_2, LLOAD_2]);
    body.push(Instruction::with_u8(BIPUSH, 16));
    body.push(Instruction::simple(LUSHR));
    push_long(&mut body, pool, 0xffff_ffff_ffff_0000_u64 as i64)?;
    body.push(Instruction::simple(LAND));
    body.push(Instruction::with_u8(LSTORE, HIGH));

    // index = (int) ((locator >>> 32) ^ low ^ high)
    body.push(Instruction::simple(LLOAD_0));
    body.push(Instruction::with_u8(BIPUSH, 32));
    body.push(Instruction::simple(LUSHR));
    body.push(Instruction::with_u8(LLOAD, LOW));
    body.push(Instruction::simple(LXOR));
    body.push(Instruction::with_u8(LLOAD, HIGH));
    ops(&mut body, &[LXOR, L2I]);
    body.push(Instruction::with_u8(ISTORE, INDEX));

    // state = charAt(index, state); length = (int) ((state >>> 32) & 0xffff)
    body.push(Instruction::with_u8(ILOAD, INDEX));
    body.push(Instruction::simple(LLOAD_2));
    invoke_own(&mut body, pool, owner, CHAR_AT_METHOD)?;
    ops(&mut body, &[LSTORE_2, LLOAD_2]);
    body.push(Instruction::with_u8(BIPUSH, 32));
    body.push(Instruction::simple(LUSHR));
    push_long(&mut body, pool, 0xffff)?;
    ops(&mut body, &[LAND, L2I]);
    body.push(Instruction::with_u8(ISTORE, LENGTH));

    body.push(Instruction::with_u8(ILOAD, LENGTH));
    body.push(Instruction::with_u8(NEWARRAY, T_CHAR));
    body.push(Instruction::with_u8(ASTORE, CHARS));
    body.push(Instruction::simple(ICONST_0));
    body.push(Instruction::with_u8(ISTORE, I));

    let head = body.new_label();
    let done = body.new_label();
    body.place(head);
    body.push(Instruction::with_u8(ILOAD, I));
    body.push(Instruction::with_u8(ILOAD, LENGTH));
    body.jump(IF_ICMPGE, done);

    // chars[i] = (char) ((charAt(index + i + 1, state) >>> 32) & 0xffff)
    body.push(Instruction::with_u8(ALOAD, CHARS));
    body.push(Instruction::with_u8(ILOAD, I));
    body.push(Instruction::with_u8(ILOAD, INDEX));
    body.push(Instruction::with_u8(ILOAD, I));
    ops(&mut body, &[IADD, ICONST_1, IADD, LLOAD_2]);
    invoke_own(&mut body, pool, owner, CHAR_AT_METHOD)?;
    ops(&mut body, &[LSTORE_2, LLOAD_2]);
    body.push(Instruction::with_u8(BIPUSH, 32));
    body.push(Instruction::simple(LUSHR));
    push_long(&mut body, pool, 0xffff)?;
    ops(&mut body, &[LAND, L2I, I2C, CASTORE]);
    body.push(Instruction::Plain { opcode: IINC, operands: vec![I, 1] });
    body.jump(GOTO, head);

    body.place(done);
    body.push(Instruction::with_u16(NEW, pool.add_class(STRING_CLASS)?));
    body.push(Instruction::simple(DUP));
    body.push(Instruction::with_u8(ALOAD, CHARS));
    body.push(Instruction::with_u16(INVOKESPECIAL, pool.add_method_ref(STRING_CLASS, CONSTRUCTOR_METHOD_NAME, "([C)V")?));
    body.push(Instruction::simple(ARETURN));
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::constpool::Constant;
    use crate::codegen::defs::attribute_names;
    use crate::consts::DECODER_METHOD_NAME;

    struct ObjectOnly;

    impl ClassHierarchy for ObjectOnly {
        fn common_super_class(&self, _first: &str, _second: &str) -> String {
            OBJECT_CLASS.to_string()
        }
    }

    fn generate(registry: &StringRegistry) -> ClassFile {
        let deobfuscator = Deobfuscator::for_project("app");
        let bytes = DeobfuscatorGenerator::new(&deobfuscator, registry, &ObjectOnly).generate().unwrap();
        ClassFile::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_decoder_shape() {
        let mut registry = StringRegistry::new(11);
        registry.register_str("hello").unwrap();
        let class = generate(&registry);

        assert_eq!(class.name().unwrap(), "io/tolstr/Deobfuscator$app");
        assert_eq!(class.major_version, major_versions::JAVA_6_0);
        assert_eq!(class.access_flags, ACC_PUBLIC | ACC_SUPER);
        assert_eq!(class.super_name().unwrap().as_deref(), Some(OBJECT_CLASS));
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].name(&class.constant_pool).unwrap(), CHUNKS_FIELD_NAME);

        let entry = class.find_method(DECODER_METHOD_NAME, "(J)Ljava/lang/String;").unwrap();
        assert_eq!(class.methods[entry].access_flags, ACC_PUBLIC | ACC_STATIC);
        for (name, descriptor) in [SEED_METHOD, NEXT_METHOD, ROTL_METHOD, CHAR_AT_METHOD] {
            let index = class.find_method(name, descriptor).unwrap();
            assert_eq!(class.methods[index].access_flags, ACC_PRIVATE | ACC_STATIC);
        }
        assert!(class.find_method(CONSTRUCTOR_METHOD_NAME, VOID_METHOD_DESCRIPTOR).is_some());

        // the loop in getString needs frames
        let code = class.methods[entry].code(&class.constant_pool).unwrap().unwrap();
        assert!(code.attributes.iter().any(|a| a.is_named(&class.constant_pool, attribute_names::STACK_MAP_TABLE)));
        assert_eq!(code.max_locals, 12);
    }

    #[test]
    fn test_static_initializer_stores_every_chunk() {
        let mut registry = StringRegistry::new(-3);
        registry.register(&vec![b'x' as u16; MAX_CHUNK_LENGTH + 5]).unwrap();
        let class = generate(&registry);

        let index = class.find_method(STATIC_INITIALIZER_METHOD_NAME, VOID_METHOD_DESCRIPTOR).unwrap();
        let code = class.methods[index].code(&class.constant_pool).unwrap().unwrap();
        let stores = code.code.iter().filter(|&&opcode| opcode == AASTORE).count();
        assert!(stores >= 2);

        let expected: Vec<Vec<u16>> = registry.chunks().iter().map(|chunk| chunk.to_vec()).collect();
        let strings: Vec<Vec<u16>> = class
            .constant_pool
            .iter()
            .filter_map(|(index, constant)| match constant {
                Constant::String(_) => class.constant_pool.string_units(index).unwrap(),
                _ => None,
            })
            .collect();
        for chunk in expected {
            assert!(strings.contains(&chunk));
        }
    }

    #[test]
    fn test_empty_registry_still_generates() {
        let class = generate(&StringRegistry::new(0));
        let index = class.find_method(STATIC_INITIALIZER_METHOD_NAME, VOID_METHOD_DESCRIPTOR).unwrap();
        let code = class.methods[index].code(&class.constant_pool).unwrap().unwrap();
        assert_eq!(code.code[0], ICONST_0);
    }
}
