//! StackMapTable frames and their compact encodings

/// VerificationTypeInfo as defined in JVMS 4.7.4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(u16),        // cpool index to CONSTANT_Class
    Uninitialized(u16), // offset of the `new` instruction
}

impl VerificationType {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            VerificationType::Top => bytes.push(0),
            VerificationType::Integer => bytes.push(1),
            VerificationType::Float => bytes.push(2),
            VerificationType::Double => bytes.push(3),
            VerificationType::Long => bytes.push(4),
            VerificationType::Null => bytes.push(5),
            VerificationType::UninitializedThis => bytes.push(6),
            VerificationType::Object(cp_index) => {
                bytes.push(7);
                bytes.extend_from_slice(&cp_index.to_be_bytes());
            }
            VerificationType::Uninitialized(offset) => {
                bytes.push(8);
                bytes.extend_from_slice(&offset.to_be_bytes());
            }
        }
        bytes
    }

    fn map_object<E>(self, map: &mut impl FnMut(u16) -> Result<u16, E>) -> Result<VerificationType, E> {
        match self {
            VerificationType::Object(index) => map(index).map(VerificationType::Object),
            other => Ok(other),
        }
    }
}

/// StackMapFrame variants as defined in JVMS 4.7.4
///
/// Locals hold one entry per value: a long or double is a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackMapFrame {
    Same { offset_delta: u16 },
    SameLocals1StackItem { offset_delta: u16, stack: VerificationType },
    Chop { k: u8, offset_delta: u16 },                                  // k in {1,2,3}
    Append { k: u8, offset_delta: u16, locals: Vec<VerificationType> }, // k in {1,2,3}
    Full { offset_delta: u16, locals: Vec<VerificationType>, stack: Vec<VerificationType> },
}

impl StackMapFrame {
    /// Rewrites the class index of every `Object` entry
    pub fn map_objects<E>(self, mut map: impl FnMut(u16) -> Result<u16, E>) -> Result<StackMapFrame, E> {
        Ok(match self {
            StackMapFrame::SameLocals1StackItem { offset_delta, stack } => {
                StackMapFrame::SameLocals1StackItem { offset_delta, stack: stack.map_object(&mut map)? }
            }
            StackMapFrame::Append { k, offset_delta, locals } => {
                StackMapFrame::Append { k, offset_delta, locals: map_all(locals, &mut map)? }
            }
            StackMapFrame::Full { offset_delta, locals, stack } => {
                let locals = map_all(locals, &mut map)?;
                StackMapFrame::Full { offset_delta, locals, stack: map_all(stack, &mut map)? }
            }
            other => other,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        match self {
            StackMapFrame::Same { offset_delta } => {
                if *offset_delta <= 63 {
                    bytes.push(*offset_delta as u8);
                } else {
                    bytes.push(251); // same_frame_extended
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
            }
            StackMapFrame::SameLocals1StackItem { offset_delta, stack } => {
                if *offset_delta <= 63 {
                    bytes.push(64 + *offset_delta as u8);
                } else {
                    bytes.push(247); // same_locals_1_stack_item_frame_extended
                    bytes.extend_from_slice(&offset_delta.to_be_bytes());
                }
                bytes.extend_from_slice(&stack.to_bytes());
            }
            StackMapFrame::Chop { k, offset_delta } => {
                bytes.push(251 - *k);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
            }
            StackMapFrame::Append { k, offset_delta, locals } => {
                bytes.push(251 + *k);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                for local in locals {
                    bytes.extend_from_slice(&local.to_bytes());
                }
            }
            StackMapFrame::Full { offset_delta, locals, stack } => {
                bytes.push(255);
                bytes.extend_from_slice(&offset_delta.to_be_bytes());
                bytes.extend_from_slice(&(locals.len() as u16).to_be_bytes());
                for local in locals {
                    bytes.extend_from_slice(&local.to_bytes());
                }
                bytes.extend_from_slice(&(stack.len() as u16).to_be_bytes());
                for item in stack {
                    bytes.extend_from_slice(&item.to_bytes());
                }
            }
        }
        bytes
    }
}

fn map_all<E>(
    types: Vec<VerificationType>,
    map: &mut impl FnMut(u16) -> Result<u16, E>,
) -> Result<Vec<VerificationType>, E> {
    types.into_iter().map(|item| item.map_object(&mut *map)).collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StackMapTable {
    pub frames: Vec<StackMapFrame>,
}

impl StackMapTable {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.frames.len() as u16).to_be_bytes());
        for frame in &self.frames {
            bytes.extend_from_slice(&frame.to_bytes());
        }
        bytes
    }
}

/// Picks the smallest frame kind that describes `locals` and `stack`
/// relative to the locals of the previous frame.
pub fn compress_frame(
    offset_delta: u16,
    previous_locals: &[VerificationType],
    locals: &[VerificationType],
    stack: &[VerificationType],
) -> StackMapFrame {
    let same_locals = previous_locals == locals;
    match stack {
        [] if same_locals => StackMapFrame::Same { offset_delta },
        [item] if same_locals => StackMapFrame::SameLocals1StackItem { offset_delta, stack: item.clone() },
        [] if locals.len() < previous_locals.len()
            && previous_locals.len() - locals.len() <= 3
            && previous_locals.starts_with(locals) =>
        {
            StackMapFrame::Chop { k: (previous_locals.len() - locals.len()) as u8, offset_delta }
        }
        [] if locals.len() > previous_locals.len()
            && locals.len() - previous_locals.len() <= 3
            && locals.starts_with(previous_locals) =>
        {
            StackMapFrame::Append {
                k: (locals.len() - previous_locals.len()) as u8,
                offset_delta,
                locals: locals[previous_locals.len()..].to_vec(),
            }
        }
        _ => StackMapFrame::Full { offset_delta, locals: locals.to_vec(), stack: stack.to_vec() },
    }
}
