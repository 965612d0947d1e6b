//! Stack map frame computation for rewritten method bodies.
//!
//! Frames are inferred by a dataflow pass over the final code array, walking
//! it the way the verifier does: the entry state of an instruction is the
//! merge of every state flowing into it, and reference types meet at their
//! common superclass. Unreachable code is replaced by `nop ... athrow` so it
//! can be described by a trivial frame.

use std::collections::BTreeSet;

use super::attribute::ExceptionTableEntry;
use super::code::{instruction_offsets, read_i32_at, read_u16_at, switch_operands_start};
use super::constpool::{Constant, ConstantPool};
use super::defs::{access_flags, CONSTRUCTOR_METHOD_NAME, OBJECT_CLASS, STRING_CLASS, THROWABLE_CLASS};
use super::descriptor::{class_descriptor, parse_method_descriptor, reference_name, slot_size};
use super::error::BytecodeError;
use super::frame::{compress_frame, StackMapFrame, StackMapTable, VerificationType};
use super::opcodes::*;
use crate::common::classpath::ClassHierarchy;
use crate::common::error::{Error, Result};

/// The method a code array belongs to
#[derive(Debug, Clone, Copy)]
pub struct MethodContext<'a> {
    pub class_name: &'a str,
    pub access_flags: u16,
    pub name: &'a str,
    pub descriptor: &'a str,
}

impl MethodContext<'_> {
    fn is_static(&self) -> bool {
        self.access_flags & access_flags::ACC_STATIC != 0
    }
}

/// A code array ready to be written, with its computed limits and frames
#[derive(Debug, Clone)]
pub struct ComputedBody {
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub stack_map: StackMapTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Top,
    Integer,
    Float,
    Long,
    Double,
    Null,
    UninitializedThis,
    Uninitialized(u16),
    /// Internal name, or descriptor for arrays
    Object(String),
}

impl Value {
    fn of_descriptor(descriptor: &str) -> Value {
        match descriptor.as_bytes().first() {
            Some(b'Z' | b'B' | b'C' | b'S' | b'I') => Value::Integer,
            Some(b'F') => Value::Float,
            Some(b'J') => Value::Long,
            Some(b'D') => Value::Double,
            _ => match reference_name(descriptor) {
                Some(name) => Value::Object(name.to_string()),
                None => Value::Top,
            },
        }
    }

    /// Values of the load/store/arithmetic opcode families, in opcode order
    fn of_kind(kind: u8) -> Value {
        match kind {
            0 => Value::Integer,
            1 => Value::Long,
            2 => Value::Float,
            _ => Value::Double,
        }
    }

    fn is_wide(&self) -> bool {
        matches!(self, Value::Long | Value::Double)
    }

    fn size(&self) -> usize {
        if self.is_wide() { 2 } else { 1 }
    }
}

/// Locals and operand stack, one entry per slot; wide values are followed by `Top`
#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl State {
    fn push(&mut self, value: Value) {
        let wide = value.is_wide();
        self.stack.push(value);
        if wide {
            self.stack.push(Value::Top);
        }
    }

    fn pop(&mut self, offset: usize) -> Result<Value> {
        self.stack.pop().ok_or_else(|| BytecodeError::StackUnderflow(offset).into())
    }

    fn pop_slots(&mut self, count: usize, offset: usize) -> Result<()> {
        if self.stack.len() < count {
            return Err(BytecodeError::StackUnderflow(offset).into());
        }
        self.stack.truncate(self.stack.len() - count);
        Ok(())
    }

    fn store(&mut self, index: usize, value: Value, offset: usize) -> Result<()> {
        if index + value.size() > self.locals.len() {
            return Err(Error::class_format(format!("local {} out of range at offset {}", index, offset)));
        }
        if index > 0 && self.locals[index - 1].is_wide() {
            self.locals[index - 1] = Value::Top;
        }
        if value.is_wide() {
            self.locals[index + 1] = Value::Top;
        }
        self.locals[index] = value;
        Ok(())
    }

    fn replace(&mut self, from: &Value, to: &Value) {
        for value in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if value == from {
                *value = to.clone();
            }
        }
    }
}

/// Whether the code uses `jsr`/`ret` subroutines, which stack map frames cannot describe
pub fn has_subroutines(code: &[u8]) -> Result<bool> {
    for offset in instruction_offsets(code)? {
        match code[offset] {
            JSR | JSR_W | RET => return Ok(true),
            WIDE if code.get(offset + 1) == Some(&RET) => return Ok(true),
            _ => {}
        }
    }
    Ok(false)
}

/// Number of local slots used by the arguments and by every local access in the code
pub fn max_locals(method: &MethodContext<'_>, code: &[u8]) -> Result<usize> {
    let (params, _) = parse_method_descriptor(method.descriptor)?;
    let mut max = params.iter().map(|param| slot_size(param)).sum::<usize>() + usize::from(!method.is_static());
    for offset in instruction_offsets(code)? {
        let opcode = code[offset];
        let used = match opcode {
            ILOAD | FLOAD | ALOAD | ISTORE | FSTORE | ASTORE | RET | IINC => code[offset + 1] as usize + 1,
            LLOAD | DLOAD | LSTORE | DSTORE => code[offset + 1] as usize + 2,
            ILOAD_0..=ALOAD_3 | ISTORE_0..=ASTORE_3 => {
                let n = if opcode >= ISTORE_0 { opcode - ISTORE_0 } else { opcode - ILOAD_0 };
                let size = if matches!(n / 4, 1 | 3) { 2 } else { 1 };
                (n % 4) as usize + size
            }
            WIDE => {
                let index = read_u16_at(code, offset + 2)? as usize;
                match code[offset + 1] {
                    LLOAD | DLOAD | LSTORE | DSTORE => index + 2,
                    _ => index + 1,
                }
            }
            _ => 0,
        };
        max = max.max(used);
    }
    Ok(max)
}

/// Computes max stack, max locals and the stack map frames of a method.
///
/// Unreachable instructions are overwritten and exception ranges are split
/// around them. Frames are only built when `with_frames` is set; classes
/// older than version 50 carry none.
pub fn compute(
    method: &MethodContext<'_>,
    mut code: Vec<u8>,
    exception_table: Vec<ExceptionTableEntry>,
    constant_pool: &mut ConstantPool,
    hierarchy: &dyn ClassHierarchy,
    with_frames: bool,
) -> Result<ComputedBody> {
    let offsets = instruction_offsets(&code)?;
    let max_locals = max_locals(method, &code)?;
    let analysis = {
        let analyzer = Analyzer {
            code: &code,
            offsets: &offsets,
            exception_table: &exception_table,
            constant_pool,
            hierarchy,
            class_name: method.class_name,
        };
        let initial = initial_state(method, max_locals)?;
        analyzer.run(initial)?
    };

    // Maximal runs of unreachable instructions as [start, end) offsets
    let mut dead_runs = Vec::new();
    let mut run_start = None;
    for (index, &offset) in offsets.iter().enumerate() {
        match (analysis.states[index].is_some(), run_start) {
            (false, None) => run_start = Some(offset),
            (true, Some(start)) => {
                dead_runs.push((start, offset));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        dead_runs.push((start, code.len()));
    }
    for &(start, end) in &dead_runs {
        for byte in &mut code[start..end - 1] {
            *byte = NOP;
        }
        code[end - 1] = ATHROW;
    }

    let mut table = Vec::with_capacity(exception_table.len());
    for entry in &exception_table {
        let mut segment_start = None;
        for (index, &offset) in offsets.iter().enumerate() {
            let covered = offset >= entry.start_pc as usize && offset < entry.end_pc as usize;
            let live = covered && analysis.states[index].is_some();
            match (live, segment_start) {
                (true, None) => segment_start = Some(offset),
                (false, Some(start)) => {
                    table.push(ExceptionTableEntry::new(start as u16, offset as u16, entry.handler_pc, entry.catch_type));
                    segment_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = segment_start {
            table.push(ExceptionTableEntry::new(start as u16, code.len() as u16, entry.handler_pc, entry.catch_type));
        }
    }

    let mut points: BTreeSet<usize> = BTreeSet::new();
    if with_frames {
        points.extend(analysis.branch_targets.iter().copied());
        points.extend(table.iter().map(|entry| entry.handler_pc as usize));
    }
    let mut names = FrameNames::default();
    let mut stack_map = StackMapTable::new();
    let mut previous_locals = compact_locals(&initial_state(method, max_locals)?.locals, &mut names);
    let mut previous_offset: Option<usize> = None;
    let dead_starts: BTreeSet<usize> = dead_runs.iter().map(|&(start, _)| start).collect();
    if with_frames {
        points.extend(dead_starts.iter().copied());
    }
    for offset in points {
        let (locals, stack) = if dead_starts.contains(&offset) {
            (Vec::new(), vec![VerificationType::Object(names.index(THROWABLE_CLASS))])
        } else {
            let index = offsets.binary_search(&offset).map_err(|_| BytecodeError::InvalidBranchTarget {
                offset,
                target: offset as i64,
            })?;
            match &analysis.states[index] {
                Some(state) => (compact_locals(&state.locals, &mut names), compact_values(&state.stack, &mut names)),
                None => continue,
            }
        };
        let offset_delta = match previous_offset {
            None => offset,
            Some(previous) => offset - previous - 1,
        } as u16;
        let frame = compress_frame(offset_delta, &previous_locals, &locals, &stack);
        stack_map.frames.push(names.resolve(frame, constant_pool)?);
        previous_locals = locals;
        previous_offset = Some(offset);
    }

    let mut max_stack = analysis.max_stack;
    if !dead_runs.is_empty() {
        max_stack = max_stack.max(1);
    }
    Ok(ComputedBody {
        code,
        exception_table: table,
        max_stack: u16::try_from(max_stack).map_err(|_| Error::codegen_error("operand stack too deep"))?,
        max_locals: u16::try_from(max_locals).map_err(|_| Error::codegen_error("too many local variables"))?,
        stack_map,
    })
}

fn initial_state(method: &MethodContext<'_>, max_locals: usize) -> Result<State> {
    let (params, _) = parse_method_descriptor(method.descriptor)?;
    let mut locals = Vec::with_capacity(max_locals);
    if !method.is_static() {
        if method.name == CONSTRUCTOR_METHOD_NAME && method.class_name != OBJECT_CLASS {
            locals.push(Value::UninitializedThis);
        } else {
            locals.push(Value::Object(method.class_name.to_string()));
        }
    }
    for param in &params {
        let value = Value::of_descriptor(param);
        let wide = value.is_wide();
        locals.push(value);
        if wide {
            locals.push(Value::Top);
        }
    }
    locals.resize(max_locals.max(locals.len()), Value::Top);
    Ok(State { locals, stack: Vec::new() })
}

/// Class names seen while building frames.
///
/// Frames are compared and compressed with `Object` entries pointing into this
/// table; only the frames actually emitted add `Class` constants to the pool.
#[derive(Default)]
struct FrameNames {
    names: Vec<String>,
}

impl FrameNames {
    fn index(&mut self, name: &str) -> u16 {
        match self.names.iter().position(|known| known == name) {
            Some(position) => position as u16,
            None => {
                self.names.push(name.to_string());
                (self.names.len() - 1) as u16
            }
        }
    }

    fn resolve(&self, frame: StackMapFrame, constant_pool: &mut ConstantPool) -> Result<StackMapFrame> {
        frame.map_objects(|position| {
            let name = self
                .names
                .get(position as usize)
                .ok_or_else(|| Error::codegen_error(format!("unknown frame type {}", position)))?;
            constant_pool.add_class(name)
        })
    }
}

/// Converts slot-per-entry locals to frame entries, dropping trailing `Top`s
fn compact_locals(locals: &[Value], names: &mut FrameNames) -> Vec<VerificationType> {
    let mut compact = compact_values(locals, names);
    while compact.last() == Some(&VerificationType::Top) {
        compact.pop();
    }
    compact
}

fn compact_values(values: &[Value], names: &mut FrameNames) -> Vec<VerificationType> {
    let mut compact = Vec::with_capacity(values.len());
    let mut slot = 0;
    while slot < values.len() {
        let value = &values[slot];
        compact.push(match value {
            Value::Top => VerificationType::Top,
            Value::Integer => VerificationType::Integer,
            Value::Float => VerificationType::Float,
            Value::Long => VerificationType::Long,
            Value::Double => VerificationType::Double,
            Value::Null => VerificationType::Null,
            Value::UninitializedThis => VerificationType::UninitializedThis,
            Value::Uninitialized(offset) => VerificationType::Uninitialized(*offset),
            Value::Object(name) => VerificationType::Object(names.index(name)),
        });
        slot += value.size();
    }
    compact
}

struct Analysis {
    states: Vec<Option<State>>,
    branch_targets: BTreeSet<usize>,
    max_stack: usize,
}

struct Analyzer<'a> {
    code: &'a [u8],
    offsets: &'a [usize],
    exception_table: &'a [ExceptionTableEntry],
    constant_pool: &'a ConstantPool,
    hierarchy: &'a dyn ClassHierarchy,
    class_name: &'a str,
}

impl Analyzer<'_> {
    fn run(&self, initial: State) -> Result<Analysis> {
        let mut analysis = Analysis {
            states: vec![None; self.offsets.len()],
            branch_targets: BTreeSet::new(),
            max_stack: 0,
        };
        if self.offsets.is_empty() {
            return Ok(analysis);
        }
        analysis.states[0] = Some(initial);
        let mut worklist = vec![0];

        while let Some(index) = worklist.pop() {
            let offset = self.offsets[index];
            let before = match &analysis.states[index] {
                Some(state) => state.clone(),
                None => continue,
            };
            let mut after = before.clone();
            self.execute(&mut after, offset)?;
            analysis.max_stack = analysis.max_stack.max(before.stack.len()).max(after.stack.len());

            for entry in self.exception_table {
                if offset < entry.start_pc as usize || offset >= entry.end_pc as usize {
                    continue;
                }
                let handler = self.index_of(entry.handler_pc as usize, offset)?;
                let caught = if entry.catch_type == 0 {
                    THROWABLE_CLASS.to_string()
                } else {
                    self.constant_pool.class_name(entry.catch_type)?
                };
                for locals in [&before.locals, &after.locals] {
                    let incoming = State { locals: locals.clone(), stack: vec![Value::Object(caught.clone())] };
                    self.flow(handler, incoming, &mut analysis.states, &mut worklist)?;
                }
                analysis.max_stack = analysis.max_stack.max(1);
            }

            let (targets, falls_through) = self.successors(offset)?;
            for target in targets {
                let target_index = self.index_of(target, offset)?;
                analysis.branch_targets.insert(target);
                self.flow(target_index, after.clone(), &mut analysis.states, &mut worklist)?;
            }
            if falls_through {
                if index + 1 >= self.offsets.len() {
                    return Err(BytecodeError::FallsOffEnd(offset).into());
                }
                self.flow(index + 1, after, &mut analysis.states, &mut worklist)?;
            }
        }
        Ok(analysis)
    }

    fn index_of(&self, target: usize, offset: usize) -> Result<usize> {
        self.offsets
            .binary_search(&target)
            .map_err(|_| BytecodeError::InvalidBranchTarget { offset, target: target as i64 }.into())
    }

    fn flow(&self, index: usize, incoming: State, states: &mut [Option<State>], worklist: &mut Vec<usize>) -> Result<()> {
        let merged = match &states[index] {
            None => incoming,
            Some(existing) => {
                let merged = self.merge(existing, &incoming, self.offsets[index])?;
                if &merged == existing {
                    return Ok(());
                }
                merged
            }
        };
        states[index] = Some(merged);
        worklist.push(index);
        Ok(())
    }

    fn merge(&self, existing: &State, incoming: &State, offset: usize) -> Result<State> {
        if existing.stack.len() != incoming.stack.len() {
            return Err(BytecodeError::InconsistentStack(offset).into());
        }
        let locals = existing
            .locals
            .iter()
            .zip(&incoming.locals)
            .map(|(a, b)| self.merge_values(a, b))
            .collect();
        let mut stack = Vec::with_capacity(existing.stack.len());
        for (a, b) in existing.stack.iter().zip(&incoming.stack) {
            let merged = self.merge_values(a, b);
            if merged == Value::Top && (*a != Value::Top || *b != Value::Top) {
                return Err(BytecodeError::InconsistentStack(offset).into());
            }
            stack.push(merged);
        }
        Ok(State { locals, stack })
    }

    fn merge_values(&self, a: &Value, b: &Value) -> Value {
        match (a, b) {
            _ if a == b => a.clone(),
            (Value::Null, Value::Object(_)) => b.clone(),
            (Value::Object(_), Value::Null) => a.clone(),
            (Value::Object(x), Value::Object(y)) => Value::Object(self.merge_references(x, y)),
            _ => Value::Top,
        }
    }

    fn merge_references(&self, a: &str, b: &str) -> String {
        if a == b {
            return a.to_string();
        }
        match (a.strip_prefix('['), b.strip_prefix('[')) {
            (Some(element_a), Some(element_b)) => match (reference_name(element_a), reference_name(element_b)) {
                (Some(name_a), Some(name_b)) => {
                    format!("[{}", class_descriptor(&self.merge_references(name_a, name_b)))
                }
                _ => OBJECT_CLASS.to_string(),
            },
            (None, None) => self.hierarchy.common_super_class(a, b),
            _ => OBJECT_CLASS.to_string(),
        }
    }

    /// Branch targets of the instruction and whether it can fall through
    fn successors(&self, offset: usize) -> Result<(Vec<usize>, bool)> {
        let code = self.code;
        let relative = |delta: i64| -> Result<usize> {
            let target = offset as i64 + delta;
            if target < 0 {
                return Err(BytecodeError::InvalidBranchTarget { offset, target }.into());
            }
            Ok(target as usize)
        };
        let opcode = code[offset];
        let result = match opcode {
            IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL => {
                (vec![relative(read_u16_at(code, offset + 1)? as i16 as i64)?], true)
            }
            GOTO => (vec![relative(read_u16_at(code, offset + 1)? as i16 as i64)?], false),
            GOTO_W => (vec![relative(read_i32_at(code, offset + 1)? as i64)?], false),
            TABLESWITCH | LOOKUPSWITCH => {
                let base = switch_operands_start(offset);
                let mut targets = vec![relative(read_i32_at(code, base)? as i64)?];
                if opcode == TABLESWITCH {
                    let low = read_i32_at(code, base + 4)? as i64;
                    let high = read_i32_at(code, base + 8)? as i64;
                    for i in 0..(high - low + 1) as usize {
                        targets.push(relative(read_i32_at(code, base + 12 + 4 * i)? as i64)?);
                    }
                } else {
                    let pairs = read_i32_at(code, base + 4)? as usize;
                    for i in 0..pairs {
                        targets.push(relative(read_i32_at(code, base + 12 + 8 * i)? as i64)?);
                    }
                }
                (targets, false)
            }
            _ => (Vec::new(), !is_terminal(opcode)),
        };
        Ok(result)
    }

    fn constant_value(&self, index: u16) -> Result<Value> {
        let value = match self.constant_pool.get(index)? {
            Constant::Integer(_) => Value::Integer,
            Constant::Float(_) => Value::Float,
            Constant::Long(_) => Value::Long,
            Constant::Double(_) => Value::Double,
            Constant::String(_) => Value::Object(STRING_CLASS.to_string()),
            Constant::Class(_) => Value::Object("java/lang/Class".to_string()),
            Constant::MethodType(_) => Value::Object("java/lang/invoke/MethodType".to_string()),
            Constant::MethodHandle(..) => Value::Object("java/lang/invoke/MethodHandle".to_string()),
            Constant::Dynamic(..) => Value::of_descriptor(&self.constant_pool.dynamic_descriptor(index)?),
            _ => return Err(Error::class_format(format!("constant {} cannot be loaded", index))),
        };
        Ok(value)
    }

    /// Class created by the `new` instruction at `offset`
    fn new_class(&self, offset: usize) -> Result<String> {
        if self.code.get(offset) != Some(&NEW) {
            return Err(Error::class_format(format!("no new instruction at offset {}", offset)));
        }
        self.constant_pool.class_name(read_u16_at(self.code, offset + 1)?)
    }

    fn load(&self, state: &mut State, kind: u8, index: usize, offset: usize) -> Result<()> {
        let value = match kind {
            4 => state
                .locals
                .get(index)
                .cloned()
                .ok_or_else(|| Error::class_format(format!("local {} out of range at offset {}", index, offset)))?,
            _ => Value::of_kind(kind),
        };
        state.push(value);
        Ok(())
    }

    fn store(&self, state: &mut State, kind: u8, index: usize, offset: usize) -> Result<()> {
        let value = match kind {
            4 => state.pop(offset)?,
            _ => {
                let value = Value::of_kind(kind);
                state.pop_slots(value.size(), offset)?;
                value
            }
        };
        state.store(index, value, offset)
    }

    fn invoke(&self, state: &mut State, opcode: u8, offset: usize) -> Result<()> {
        let index = read_u16_at(self.code, offset + 1)?;
        let (descriptor, name) = if opcode == INVOKEDYNAMIC {
            (self.constant_pool.dynamic_descriptor(index)?, String::new())
        } else {
            let member = self.constant_pool.member_ref(index)?;
            (member.descriptor, member.name)
        };
        let (params, ret) = parse_method_descriptor(&descriptor)?;
        state.pop_slots(params.iter().map(|param| slot_size(param)).sum(), offset)?;
        if opcode != INVOKESTATIC && opcode != INVOKEDYNAMIC {
            let receiver = state.pop(offset)?;
            if opcode == INVOKESPECIAL && name == CONSTRUCTOR_METHOD_NAME {
                let initialized = match &receiver {
                    Value::UninitializedThis => Some(Value::Object(self.class_name.to_string())),
                    Value::Uninitialized(new_offset) => Some(Value::Object(self.new_class(*new_offset as usize)?)),
                    _ => None,
                };
                if let Some(initialized) = initialized {
                    state.replace(&receiver, &initialized);
                }
            }
        }
        if ret != "V" {
            state.push(Value::of_descriptor(&ret));
        }
        Ok(())
    }

    fn execute(&self, state: &mut State, offset: usize) -> Result<()> {
        let code = self.code;
        let opcode = code[offset];
        match opcode {
            NOP | IINC | GOTO | GOTO_W | RETURN => {}
            ACONST_NULL => state.push(Value::Null),
            ICONST_M1..=ICONST_5 | BIPUSH | SIPUSH => state.push(Value::Integer),
            LCONST_0 | LCONST_1 => state.push(Value::Long),
            FCONST_0..=FCONST_2 => state.push(Value::Float),
            DCONST_0 | DCONST_1 => state.push(Value::Double),
            LDC => state.push(self.constant_value(code[offset + 1] as u16)?),
            LDC_W | LDC2_W => state.push(self.constant_value(read_u16_at(code, offset + 1)?)?),
            ILOAD..=ALOAD => self.load(state, opcode - ILOAD, code[offset + 1] as usize, offset)?,
            ILOAD_0..=ALOAD_3 => {
                let n = opcode - ILOAD_0;
                self.load(state, n / 4, (n % 4) as usize, offset)?
            }
            IALOAD | BALOAD | CALOAD | SALOAD => {
                state.pop_slots(2, offset)?;
                state.push(Value::Integer);
            }
            LALOAD | FALOAD | DALOAD => {
                state.pop_slots(2, offset)?;
                state.push(Value::of_kind(opcode - IALOAD));
            }
            AALOAD => {
                state.pop(offset)?;
                let element = match state.pop(offset)? {
                    Value::Object(array) if array.starts_with('[') => Value::of_descriptor(&array[1..]),
                    Value::Null => Value::Null,
                    _ => Value::Object(OBJECT_CLASS.to_string()),
                };
                state.push(element);
            }
            ISTORE..=ASTORE => self.store(state, opcode - ISTORE, code[offset + 1] as usize, offset)?,
            ISTORE_0..=ASTORE_3 => {
                let n = opcode - ISTORE_0;
                self.store(state, n / 4, (n % 4) as usize, offset)?
            }
            LASTORE | DASTORE => state.pop_slots(4, offset)?,
            IASTORE | FASTORE | AASTORE | BASTORE | CASTORE | SASTORE => state.pop_slots(3, offset)?,
            POP | IRETURN | FRETURN | ARETURN | ATHROW | MONITORENTER | MONITOREXIT => state.pop_slots(1, offset)?,
            IFEQ..=IFLE | IFNULL | IFNONNULL | TABLESWITCH | LOOKUPSWITCH => state.pop_slots(1, offset)?,
            POP2 | LRETURN | DRETURN | IF_ICMPEQ..=IF_ACMPNE => state.pop_slots(2, offset)?,
            DUP => {
                let a = state.pop(offset)?;
                state.stack.extend([a.clone(), a]);
            }
            DUP_X1 => {
                let a = state.pop(offset)?;
                let b = state.pop(offset)?;
                state.stack.extend([a.clone(), b, a]);
            }
            DUP_X2 => {
                let a = state.pop(offset)?;
                let b = state.pop(offset)?;
                let c = state.pop(offset)?;
                state.stack.extend([a.clone(), c, b, a]);
            }
            DUP2 => {
                let a = state.pop(offset)?;
                let b = state.pop(offset)?;
                state.stack.extend([b.clone(), a.clone(), b, a]);
            }
            DUP2_X1 => {
                let a = state.pop(offset)?;
                let b = state.pop(offset)?;
                let c = state.pop(offset)?;
                state.stack.extend([b.clone(), a.clone(), c, b, a]);
            }
            DUP2_X2 => {
                let a = state.pop(offset)?;
                let b = state.pop(offset)?;
                let c = state.pop(offset)?;
                let d = state.pop(offset)?;
                state.stack.extend([b.clone(), a.clone(), d, c, b, a]);
            }
            SWAP => {
                let a = state.pop(offset)?;
                let b = state.pop(offset)?;
                state.stack.extend([a, b]);
            }
            IADD..=DREM => {
                let value = Value::of_kind((opcode - IADD) % 4);
                state.pop_slots(2 * value.size(), offset)?;
                state.push(value);
            }
            INEG..=DNEG => {
                let value = Value::of_kind(opcode - INEG);
                state.pop_slots(value.size(), offset)?;
                state.push(value);
            }
            ISHL..=LUSHR => {
                let value = Value::of_kind((opcode - ISHL) % 2);
                state.pop_slots(1 + value.size(), offset)?;
                state.push(value);
            }
            IAND..=LXOR => {
                let value = Value::of_kind((opcode - IAND) % 2);
                state.pop_slots(2 * value.size(), offset)?;
                state.push(value);
            }
            I2L..=I2S => {
                let (from, to) = match opcode {
                    I2L => (Value::Integer, Value::Long),
                    I2F => (Value::Integer, Value::Float),
                    I2D => (Value::Integer, Value::Double),
                    L2I => (Value::Long, Value::Integer),
                    L2F => (Value::Long, Value::Float),
                    L2D => (Value::Long, Value::Double),
                    F2I => (Value::Float, Value::Integer),
                    F2L => (Value::Float, Value::Long),
                    F2D => (Value::Float, Value::Double),
                    D2I => (Value::Double, Value::Integer),
                    D2L => (Value::Double, Value::Long),
                    D2F => (Value::Double, Value::Float),
                    _ => (Value::Integer, Value::Integer),
                };
                state.pop_slots(from.size(), offset)?;
                state.push(to);
            }
            LCMP | DCMPL | DCMPG => {
                state.pop_slots(4, offset)?;
                state.push(Value::Integer);
            }
            FCMPL | FCMPG => {
                state.pop_slots(2, offset)?;
                state.push(Value::Integer);
            }
            GETSTATIC | GETFIELD => {
                let member = self.constant_pool.member_ref(read_u16_at(code, offset + 1)?)?;
                if opcode == GETFIELD {
                    state.pop_slots(1, offset)?;
                }
                state.push(Value::of_descriptor(&member.descriptor));
            }
            PUTSTATIC | PUTFIELD => {
                let member = self.constant_pool.member_ref(read_u16_at(code, offset + 1)?)?;
                let receiver = usize::from(opcode == PUTFIELD);
                state.pop_slots(slot_size(&member.descriptor) + receiver, offset)?;
            }
            INVOKEVIRTUAL..=INVOKEDYNAMIC => self.invoke(state, opcode, offset)?,
            NEW => state.push(Value::Uninitialized(offset as u16)),
            NEWARRAY => {
                state.pop_slots(1, offset)?;
                let descriptor = match code[offset + 1] {
                    4 => "[Z",
                    5 => "[C",
                    6 => "[F",
                    7 => "[D",
                    8 => "[B",
                    9 => "[S",
                    10 => "[I",
                    11 => "[J",
                    other => return Err(Error::class_format(format!("invalid newarray type {}", other))),
                };
                state.push(Value::Object(descriptor.to_string()));
            }
            ANEWARRAY => {
                state.pop_slots(1, offset)?;
                let element = self.constant_pool.class_name(read_u16_at(code, offset + 1)?)?;
                state.push(Value::Object(format!("[{}", class_descriptor(&element))));
            }
            ARRAYLENGTH | INSTANCEOF => {
                state.pop_slots(1, offset)?;
                state.push(Value::Integer);
            }
            CHECKCAST => {
                state.pop_slots(1, offset)?;
                state.push(Value::Object(self.constant_pool.class_name(read_u16_at(code, offset + 1)?)?));
            }
            MULTIANEWARRAY => {
                state.pop_slots(code[offset + 3] as usize, offset)?;
                state.push(Value::Object(self.constant_pool.class_name(read_u16_at(code, offset + 1)?)?));
            }
            WIDE => {
                let index = read_u16_at(code, offset + 2)? as usize;
                match code[offset + 1] {
                    sub @ ILOAD..=ALOAD => self.load(state, sub - ILOAD, index, offset)?,
                    sub @ ISTORE..=ASTORE => self.store(state, sub - ISTORE, index, offset)?,
                    IINC => {}
                    other => return Err(BytecodeError::UnknownOpcode { opcode: other, offset: offset + 1 }.into()),
                }
            }
            _ => {
                // jsr and ret never reach the analysis
                return Err(BytecodeError::UnknownOpcode { opcode, offset }.into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatHierarchy;

    impl ClassHierarchy for FlatHierarchy {
        fn common_super_class(&self, _first: &str, _second: &str) -> String {
            OBJECT_CLASS.to_string()
        }
    }

    fn static_method(descriptor: &str) -> MethodContext<'_> {
        MethodContext {
            class_name: "a/Sample",
            access_flags: access_flags::ACC_STATIC,
            name: "run",
            descriptor,
        }
    }

    fn compute_static(
        descriptor: &str,
        code: Vec<u8>,
        table: Vec<ExceptionTableEntry>,
        pool: &mut ConstantPool,
    ) -> Result<ComputedBody> {
        compute(&static_method(descriptor), code, table, pool, &FlatHierarchy, true)
    }

    #[test]
    fn test_branch_target_gets_same_frame() {
        let code = vec![ILOAD_0, IFEQ, 0, 5, ICONST_1, IRETURN, ICONST_0, IRETURN];
        let body = compute_static("(I)I", code, vec![], &mut ConstantPool::new()).unwrap();
        assert_eq!(body.max_stack, 1);
        assert_eq!(body.max_locals, 1);
        assert_eq!(body.stack_map.frames, vec![StackMapFrame::Same { offset_delta: 6 }]);
    }

    #[test]
    fn test_null_merges_into_reference() {
        let mut pool = ConstantPool::new();
        let string = pool.add_string("x").unwrap() as u8;
        let code = vec![ILOAD_0, IFEQ, 0, 8, LDC, string, GOTO, 0, 4, ACONST_NULL, ARETURN];
        let body = compute_static("(Z)Ljava/lang/Object;", code, vec![], &mut pool).unwrap();
        let string_class = pool.add_class(STRING_CLASS).unwrap();
        assert_eq!(
            body.stack_map.frames,
            vec![
                StackMapFrame::Same { offset_delta: 9 },
                StackMapFrame::SameLocals1StackItem {
                    offset_delta: 0,
                    stack: VerificationType::Object(string_class)
                },
            ]
        );
    }

    /// Expands compressed frames into `(offset, locals, stack)` triples
    fn expand(
        initial: Vec<VerificationType>,
        frames: &[StackMapFrame],
    ) -> Vec<(usize, Vec<VerificationType>, Vec<VerificationType>)> {
        let mut locals = initial;
        let mut offset: Option<usize> = None;
        let mut expanded = Vec::new();
        for frame in frames {
            let (delta, stack) = match frame {
                StackMapFrame::Same { offset_delta } => (*offset_delta, vec![]),
                StackMapFrame::SameLocals1StackItem { offset_delta, stack } => (*offset_delta, vec![stack.clone()]),
                StackMapFrame::Chop { k, offset_delta } => {
                    locals.truncate(locals.len() - *k as usize);
                    (*offset_delta, vec![])
                }
                StackMapFrame::Append { offset_delta, locals: added, .. } => {
                    locals.extend(added.iter().cloned());
                    (*offset_delta, vec![])
                }
                StackMapFrame::Full { offset_delta, locals: full, stack } => {
                    locals = full.clone();
                    (*offset_delta, stack.clone())
                }
            };
            let at = offset.map_or(delta as usize, |previous| previous + delta as usize + 1);
            expanded.push((at, locals.clone(), stack));
            offset = Some(at);
        }
        expanded
    }

    #[test]
    fn test_dead_code_is_replaced() {
        let mut pool = ConstantPool::new();
        let body = compute_static("()V", vec![RETURN, ICONST_0, POP, RETURN], vec![], &mut pool).unwrap();
        assert_eq!(body.code, vec![RETURN, NOP, NOP, ATHROW]);
        assert_eq!(body.max_stack, 1);
        let throwable = pool.add_class(THROWABLE_CLASS).unwrap();
        assert_eq!(
            expand(vec![], &body.stack_map.frames),
            vec![(1, vec![], vec![VerificationType::Object(throwable)])]
        );
    }

    #[test]
    fn test_frames_add_only_emitted_class_constants() {
        // `same` frames describe the String[] parameter without naming it again
        let mut pool = ConstantPool::new();
        let code = vec![ILOAD_1, IFEQ, 0, 4, RETURN, RETURN];
        let body = compute_static("([Ljava/lang/String;I)V", code, vec![], &mut pool).unwrap();
        assert_eq!(body.stack_map.frames, vec![StackMapFrame::Same { offset_delta: 5 }]);
        assert!(pool.iter().all(|(_, constant)| !matches!(constant, Constant::Class(_))));

        let mut pool = ConstantPool::new();
        let code = vec![ACONST_NULL, ASTORE, 2, ILOAD_1, IFEQ, 0, 4, RETURN, RETURN];
        let body = compute_static("([Ljava/lang/String;I)V", code, vec![], &mut pool).unwrap();
        let expanded = expand(
            vec![VerificationType::Object(pool.add_class("[Ljava/lang/String;").unwrap()), VerificationType::Integer],
            &body.stack_map.frames,
        );
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].0, 8);
        assert_eq!(expanded[0].1[2], VerificationType::Null);
    }

    #[test]
    fn test_frames_can_be_skipped() {
        let mut pool = ConstantPool::new();
        let code = vec![ALOAD_0, IFNULL, 0, 4, RETURN, RETURN];
        let body = compute(&static_method("(La/Item;)V"), code, vec![], &mut pool, &FlatHierarchy, false).unwrap();
        assert!(body.stack_map.is_empty());
        assert_eq!(body.max_locals, 1);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_handler_ranges_skip_dead_code() {
        // try { return } covers a dead nop too; the handler pops and returns
        let code = vec![RETURN, NOP, POP, RETURN];
        let table = vec![ExceptionTableEntry::new(0, 2, 2, 0)];
        let body = compute_static("()V", code, table, &mut ConstantPool::new()).unwrap();
        assert_eq!(body.exception_table, vec![ExceptionTableEntry::new(0, 1, 2, 0)]);
        assert_eq!(body.code[1], ATHROW);
        assert!(matches!(body.stack_map.frames[1], StackMapFrame::SameLocals1StackItem { offset_delta: 0, .. }));
    }

    #[test]
    fn test_constructor_initializes_this() {
        let mut pool = ConstantPool::new();
        let init = pool.add_method_ref(OBJECT_CLASS, CONSTRUCTOR_METHOD_NAME, "()V").unwrap().to_be_bytes();
        let method = MethodContext {
            class_name: "a/Sample",
            access_flags: 0,
            name: CONSTRUCTOR_METHOD_NAME,
            descriptor: "()V",
        };
        let code = vec![ALOAD_0, INVOKESPECIAL, init[0], init[1], RETURN];
        let body = compute(&method, code, vec![], &mut pool, &FlatHierarchy, true).unwrap();
        assert_eq!(body.max_stack, 1);
        assert_eq!(body.max_locals, 1);
        assert!(body.stack_map.is_empty());
    }

    #[test]
    fn test_inconsistent_stack_is_rejected() {
        let code = vec![ILOAD_0, IFEQ, 0, 4, ICONST_1, RETURN];
        assert!(compute_static("(I)V", code, vec![], &mut ConstantPool::new()).is_err());
    }

    #[test]
    fn test_locals_and_subroutines_scan() {
        let method = static_method("()V");
        assert_eq!(max_locals(&method, &[LCONST_0, LSTORE_2, RETURN]).unwrap(), 4);
        assert_eq!(max_locals(&method, &[WIDE, ISTORE, 1, 0, RETURN]).unwrap(), 257);
        assert!(has_subroutines(&[JSR, 0, 3, RETURN]).unwrap());
        assert!(!has_subroutines(&[RETURN]).unwrap());
    }

    #[test]
    fn test_array_merge_is_element_wise() {
        let analyzer = Analyzer {
            code: &[],
            offsets: &[],
            exception_table: &[],
            constant_pool: &ConstantPool::new(),
            hierarchy: &FlatHierarchy,
            class_name: "a/Sample",
        };
        assert_eq!(analyzer.merge_references("[La/B;", "[La/C;"), "[Ljava/lang/Object;");
        assert_eq!(analyzer.merge_references("[I", "[J"), OBJECT_CLASS);
        assert_eq!(analyzer.merge_references("[[I", "[[J"), "[Ljava/lang/Object;");
        assert_eq!(analyzer.merge_references("[I", "a/B"), OBJECT_CLASS);
    }
}
