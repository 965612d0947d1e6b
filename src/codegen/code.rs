//! Method bodies as editable instruction lists.
//!
//! Decoding turns the code array into a list of instructions and labels, so
//! rewriting passes can insert and replace instructions without tracking
//! offsets. Encoding lays the list out again: branch offsets are recomputed
//! and branches that no longer reach their target with a 16-bit offset are
//! widened.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::attribute::{
    parse_line_number_table, parse_local_variable_table, CodeAttribute, ExceptionTableEntry,
    LineNumberEntry, LocalVariableEntry,
};
use super::constpool::ConstantPool;
use super::defs::{attribute_names, MAX_CODE_LENGTH};
use super::error::BytecodeError;
use super::opcodes::*;
use crate::common::error::{Error, Result};

/// Labels created while decoding equal the original offset; fresh labels start here
const FRESH_LABEL_BASE: u32 = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Any instruction without branch targets, with its raw operand bytes
    Plain { opcode: u8, operands: Vec<u8> },
    /// `ldc` or `ldc_w`, whichever the index needs
    Ldc(u16),
    /// Branches, `goto` and `jsr`; wide forms are chosen when encoding
    Jump { opcode: u8, target: Label },
    TableSwitch { default: Label, low: i32, high: i32, targets: Vec<Label> },
    LookupSwitch { default: Label, pairs: Vec<(i32, Label)> },
}

impl Instruction {
    pub fn simple(opcode: u8) -> Self {
        Instruction::Plain { opcode, operands: Vec::new() }
    }

    pub fn with_u8(opcode: u8, operand: u8) -> Self {
        Instruction::Plain { opcode, operands: vec![operand] }
    }

    pub fn with_u16(opcode: u8, operand: u16) -> Self {
        Instruction::Plain { opcode, operands: operand.to_be_bytes().to_vec() }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Plain { opcode, .. } | Instruction::Jump { opcode, .. } => *opcode,
            Instruction::Ldc(_) => LDC,
            Instruction::TableSwitch { .. } => TABLESWITCH,
            Instruction::LookupSwitch { .. } => LOOKUPSWITCH,
        }
    }

    fn size(&self, offset: usize, wide: bool) -> usize {
        match self {
            Instruction::Plain { operands, .. } => 1 + operands.len(),
            Instruction::Ldc(index) => if *index <= u8::MAX as u16 { 2 } else { 3 },
            Instruction::Jump { opcode, .. } => match (wide, *opcode) {
                (false, _) => 3,
                (true, GOTO | JSR) => 5,
                // inverted branch over a goto_w
                (true, _) => 8,
            },
            Instruction::TableSwitch { targets, .. } => {
                switch_operands_start(offset) - offset + 12 + 4 * targets.len()
            }
            Instruction::LookupSwitch { pairs, .. } => {
                switch_operands_start(offset) - offset + 8 + 8 * pairs.len()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Label(Label),
    Insn(Instruction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start: Label,
    pub line: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start: Label,
    pub end: Label,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// A method body laid out as an ordered list of labels and instructions
#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    /// Values read from the original Code attribute; recomputed when written
    pub max_stack: u16,
    pub max_locals: u16,
    pub nodes: Vec<Node>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub line_numbers: Vec<LineNumber>,
    pub local_variables: Vec<LocalVariable>,
    pub local_variable_types: Vec<LocalVariable>,
    next_label: u32,
}

/// Result of laying out a method body
#[derive(Debug, Clone, Default)]
pub struct EncodedBody {
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub line_numbers: Vec<LineNumberEntry>,
    pub local_variables: Vec<LocalVariableEntry>,
    pub local_variable_types: Vec<LocalVariableEntry>,
}

impl MethodBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(FRESH_LABEL_BASE + self.next_label);
        self.next_label += 1;
        label
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.nodes.push(Node::Insn(instruction));
    }

    pub fn place(&mut self, label: Label) {
        self.nodes.push(Node::Label(label));
    }

    pub fn jump(&mut self, opcode: u8, target: Label) {
        self.push(Instruction::Jump { opcode, target });
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Insn(instruction) => Some(instruction),
            Node::Label(_) => None,
        })
    }

    pub fn decode(code: &CodeAttribute, constant_pool: &ConstantPool) -> Result<Self> {
        let bytes = &code.code;
        let offsets = instruction_offsets(bytes)?;
        let mut boundaries: HashSet<usize> = offsets.iter().copied().collect();
        boundaries.insert(bytes.len());

        let mut labels = BTreeSet::new();
        let mut instructions = Vec::with_capacity(offsets.len());
        for &offset in &offsets {
            let instruction = decode_instruction(bytes, offset, &boundaries, &mut labels)?;
            instructions.push((offset, instruction));
        }

        let mut body = MethodBody {
            max_stack: code.max_stack,
            max_locals: code.max_locals,
            ..MethodBody::default()
        };

        for entry in &code.exception_table {
            let (start, end, handler) =
                (entry.start_pc as usize, entry.end_pc as usize, entry.handler_pc as usize);
            if !boundaries.contains(&start) || !boundaries.contains(&end) || !boundaries.contains(&handler) {
                return Err(Error::class_format(format!(
                    "exception table entry {}..{} -> {} does not match instruction boundaries",
                    start, end, handler
                )));
            }
            labels.extend([start, end, handler]);
            body.try_catch_blocks.push(TryCatchBlock {
                start: Label(start as u32),
                end: Label(end as u32),
                handler: Label(handler as u32),
                catch_type: entry.catch_type,
            });
        }

        for attribute in &code.attributes {
            let name = attribute.name(constant_pool)?;
            match name.as_str() {
                attribute_names::LINE_NUMBER_TABLE => {
                    for entry in parse_line_number_table(&attribute.info)? {
                        let start = entry.start_pc as usize;
                        if start < bytes.len() && boundaries.contains(&start) {
                            labels.insert(start);
                            body.line_numbers.push(LineNumber { start: Label(start as u32), line: entry.line_number });
                        }
                    }
                }
                attribute_names::LOCAL_VARIABLE_TABLE | attribute_names::LOCAL_VARIABLE_TYPE_TABLE => {
                    let typed = name == attribute_names::LOCAL_VARIABLE_TYPE_TABLE;
                    for entry in parse_local_variable_table(&attribute.info)? {
                        let start = entry.start_pc as usize;
                        let end = start + entry.length as usize;
                        if !boundaries.contains(&start) || !boundaries.contains(&end) {
                            log::debug!("dropping local variable entry with range {}..{}", start, end);
                            continue;
                        }
                        labels.extend([start, end]);
                        let variable = LocalVariable {
                            start: Label(start as u32),
                            end: Label(end as u32),
                            name_index: entry.name_index,
                            descriptor_index: entry.descriptor_index,
                            index: entry.index,
                        };
                        if typed {
                            body.local_variable_types.push(variable);
                        } else {
                            body.local_variables.push(variable);
                        }
                    }
                }
                // Recomputed when the body is written
                attribute_names::STACK_MAP_TABLE => {}
                other => log::debug!("dropping {} attribute of a rewritten method", other),
            }
        }

        for (offset, instruction) in instructions {
            if labels.contains(&offset) {
                body.nodes.push(Node::Label(Label(offset as u32)));
            }
            body.nodes.push(Node::Insn(instruction));
        }
        if labels.contains(&bytes.len()) {
            body.nodes.push(Node::Label(Label(bytes.len() as u32)));
        }
        Ok(body)
    }

    pub fn encode(&self) -> Result<EncodedBody> {
        let mut wide = HashSet::new();
        let (positions, labels) = loop {
            let (positions, labels) = self.layout(&wide);
            let mut grown = false;
            for (index, node) in self.nodes.iter().enumerate() {
                if let Node::Insn(Instruction::Jump { target, .. }) = node {
                    if wide.contains(&index) {
                        continue;
                    }
                    let delta = label_offset(&labels, *target)? as i64 - positions[index] as i64;
                    if i16::try_from(delta).is_err() {
                        wide.insert(index);
                        grown = true;
                    }
                }
            }
            if !grown {
                break (positions, labels);
            }
        };

        let mut code = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let instruction = match node {
                Node::Insn(instruction) => instruction,
                Node::Label(_) => continue,
            };
            let offset = positions[index];
            debug_assert_eq!(offset, code.len());
            match instruction {
                Instruction::Plain { opcode, operands } => {
                    code.push(*opcode);
                    code.extend_from_slice(operands);
                }
                Instruction::Ldc(constant) => {
                    if *constant <= u8::MAX as u16 {
                        code.extend_from_slice(&[LDC, *constant as u8]);
                    } else {
                        code.push(LDC_W);
                        code.extend_from_slice(&constant.to_be_bytes());
                    }
                }
                Instruction::Jump { opcode, target } => {
                    let target = label_offset(&labels, *target)? as i64;
                    if !wide.contains(&index) {
                        code.push(*opcode);
                        code.extend_from_slice(&((target - offset as i64) as i16).to_be_bytes());
                    } else if *opcode == GOTO || *opcode == JSR {
                        code.push(if *opcode == GOTO { GOTO_W } else { JSR_W });
                        code.extend_from_slice(&((target - offset as i64) as i32).to_be_bytes());
                    } else {
                        code.push(invert_branch(*opcode));
                        code.extend_from_slice(&8i16.to_be_bytes());
                        code.push(GOTO_W);
                        code.extend_from_slice(&((target - offset as i64 - 3) as i32).to_be_bytes());
                    }
                }
                Instruction::TableSwitch { default, low, high, targets } => {
                    code.push(TABLESWITCH);
                    code.resize(switch_operands_start(offset), 0);
                    push_relative(&mut code, &labels, *default, offset)?;
                    code.extend_from_slice(&low.to_be_bytes());
                    code.extend_from_slice(&high.to_be_bytes());
                    for target in targets {
                        push_relative(&mut code, &labels, *target, offset)?;
                    }
                }
                Instruction::LookupSwitch { default, pairs } => {
                    code.push(LOOKUPSWITCH);
                    code.resize(switch_operands_start(offset), 0);
                    push_relative(&mut code, &labels, *default, offset)?;
                    code.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                    for (key, target) in pairs {
                        code.extend_from_slice(&key.to_be_bytes());
                        push_relative(&mut code, &labels, *target, offset)?;
                    }
                }
            }
        }
        if code.len() > MAX_CODE_LENGTH {
            return Err(BytecodeError::CodeTooLarge(code.len()).into());
        }

        let mut encoded = EncodedBody { code, ..EncodedBody::default() };
        for block in &self.try_catch_blocks {
            let start = label_offset(&labels, block.start)?;
            let end = label_offset(&labels, block.end)?;
            if start >= end {
                continue;
            }
            encoded.exception_table.push(ExceptionTableEntry::new(
                start as u16,
                end as u16,
                label_offset(&labels, block.handler)? as u16,
                block.catch_type,
            ));
        }
        for line in &self.line_numbers {
            let start = label_offset(&labels, line.start)?;
            if start < encoded.code.len() {
                encoded.line_numbers.push(LineNumberEntry { start_pc: start as u16, line_number: line.line });
            }
        }
        encoded.local_variables = local_variable_entries(&self.local_variables, &labels)?;
        encoded.local_variable_types = local_variable_entries(&self.local_variable_types, &labels)?;
        Ok(encoded)
    }

    /// Offsets of every node and of every placed label, given which jumps are wide
    fn layout(&self, wide: &HashSet<usize>) -> (Vec<usize>, HashMap<Label, usize>) {
        let mut positions = Vec::with_capacity(self.nodes.len());
        let mut labels = HashMap::new();
        let mut offset = 0;
        for (index, node) in self.nodes.iter().enumerate() {
            positions.push(offset);
            match node {
                Node::Label(label) => {
                    labels.insert(*label, offset);
                }
                Node::Insn(instruction) => offset += instruction.size(offset, wide.contains(&index)),
            }
        }
        (positions, labels)
    }
}

fn local_variable_entries(
    variables: &[LocalVariable],
    labels: &HashMap<Label, usize>,
) -> Result<Vec<LocalVariableEntry>> {
    let mut entries = Vec::with_capacity(variables.len());
    for variable in variables {
        let start = label_offset(labels, variable.start)?;
        let end = label_offset(labels, variable.end)?;
        if end < start {
            continue;
        }
        entries.push(LocalVariableEntry {
            start_pc: start as u16,
            length: (end - start) as u16,
            name_index: variable.name_index,
            descriptor_index: variable.descriptor_index,
            index: variable.index,
        });
    }
    Ok(entries)
}

fn label_offset(labels: &HashMap<Label, usize>, label: Label) -> Result<usize> {
    labels.get(&label).copied().ok_or_else(|| BytecodeError::UnboundLabel(label.0).into())
}

fn push_relative(code: &mut Vec<u8>, labels: &HashMap<Label, usize>, target: Label, offset: usize) -> Result<()> {
    let delta = label_offset(labels, target)? as i64 - offset as i64;
    code.extend_from_slice(&(delta as i32).to_be_bytes());
    Ok(())
}

/// Offset of the first operand of a switch at `offset`, after its 0-3 padding bytes
pub fn switch_operands_start(offset: usize) -> usize {
    (offset + 4) & !3
}

pub(crate) fn read_u16_at(code: &[u8], position: usize) -> Result<u16> {
    match code.get(position..position + 2) {
        Some(bytes) => Ok(u16::from_be_bytes([bytes[0], bytes[1]])),
        None => Err(BytecodeError::Truncated(position).into()),
    }
}

pub(crate) fn read_i32_at(code: &[u8], position: usize) -> Result<i32> {
    match code.get(position..position + 4) {
        Some(bytes) => Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        None => Err(BytecodeError::Truncated(position).into()),
    }
}

/// Length in bytes of the instruction starting at `offset`
pub fn instruction_length(code: &[u8], offset: usize) -> Result<usize> {
    let opcode = *code.get(offset).ok_or(BytecodeError::Truncated(offset))?;
    let length = match opcode {
        TABLESWITCH => {
            let base = switch_operands_start(offset);
            let low = read_i32_at(code, base + 4)? as i64;
            let high = read_i32_at(code, base + 8)? as i64;
            if high < low {
                return Err(Error::class_format(format!("tableswitch at {} has high < low", offset)));
            }
            base + 12 + 4 * (high - low + 1) as usize - offset
        }
        LOOKUPSWITCH => {
            let base = switch_operands_start(offset);
            let pairs = read_i32_at(code, base + 4)?;
            if pairs < 0 {
                return Err(Error::class_format(format!("lookupswitch at {} has negative size", offset)));
            }
            base + 8 + 8 * pairs as usize - offset
        }
        WIDE => match code.get(offset + 1) {
            Some(&IINC) => 6,
            Some(_) => 4,
            None => return Err(BytecodeError::Truncated(offset).into()),
        },
        _ => 1 + operand_length(opcode).ok_or(BytecodeError::UnknownOpcode { opcode, offset })?,
    };
    if offset + length > code.len() {
        return Err(BytecodeError::Truncated(offset).into());
    }
    Ok(length)
}

/// Start offsets of every instruction in a code array
pub fn instruction_offsets(code: &[u8]) -> Result<Vec<usize>> {
    let mut offsets = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        offsets.push(offset);
        offset += instruction_length(code, offset)?;
    }
    Ok(offsets)
}

fn branch_label(
    code: &[u8],
    offset: usize,
    delta: i64,
    boundaries: &HashSet<usize>,
    labels: &mut BTreeSet<usize>,
) -> Result<Label> {
    let target = offset as i64 + delta;
    if target < 0 || target as usize >= code.len() || !boundaries.contains(&(target as usize)) {
        return Err(BytecodeError::InvalidBranchTarget { offset, target }.into());
    }
    labels.insert(target as usize);
    Ok(Label(target as u32))
}

fn decode_instruction(
    code: &[u8],
    offset: usize,
    boundaries: &HashSet<usize>,
    labels: &mut BTreeSet<usize>,
) -> Result<Instruction> {
    let opcode = code[offset];
    let instruction = match opcode {
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            let delta = read_u16_at(code, offset + 1)? as i16 as i64;
            Instruction::Jump { opcode, target: branch_label(code, offset, delta, boundaries, labels)? }
        }
        GOTO_W | JSR_W => {
            let delta = read_i32_at(code, offset + 1)? as i64;
            let opcode = if opcode == GOTO_W { GOTO } else { JSR };
            Instruction::Jump { opcode, target: branch_label(code, offset, delta, boundaries, labels)? }
        }
        LDC => Instruction::Ldc(code[offset + 1] as u16),
        LDC_W => Instruction::Ldc(read_u16_at(code, offset + 1)?),
        TABLESWITCH => {
            let base = switch_operands_start(offset);
            let default = branch_label(code, offset, read_i32_at(code, base)? as i64, boundaries, labels)?;
            let low = read_i32_at(code, base + 4)?;
            let high = read_i32_at(code, base + 8)?;
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count);
            for i in 0..count {
                let delta = read_i32_at(code, base + 12 + 4 * i)? as i64;
                targets.push(branch_label(code, offset, delta, boundaries, labels)?);
            }
            Instruction::TableSwitch { default, low, high, targets }
        }
        LOOKUPSWITCH => {
            let base = switch_operands_start(offset);
            let default = branch_label(code, offset, read_i32_at(code, base)? as i64, boundaries, labels)?;
            let count = read_i32_at(code, base + 4)? as usize;
            let mut pairs = Vec::with_capacity(count);
            for i in 0..count {
                let key = read_i32_at(code, base + 8 + 8 * i)?;
                let delta = read_i32_at(code, base + 12 + 8 * i)? as i64;
                pairs.push((key, branch_label(code, offset, delta, boundaries, labels)?));
            }
            Instruction::LookupSwitch { default, pairs }
        }
        _ => {
            let length = instruction_length(code, offset)?;
            Instruction::Plain { opcode, operands: code[offset + 1..offset + length].to_vec() }
        }
    };
    Ok(instruction)
}
