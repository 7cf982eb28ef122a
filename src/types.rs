use std::fmt;

pub const MAX_BITS_WIDTH: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelDirection {
    In,
    Out,
}

impl fmt::Display for ChannelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "in"),
            Self::Out => write!(f, "out"),
        }
    }
}

/// A fully resolved type, as seen by the harness and the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConcreteType {
    Bits { signed: bool, width: u32 },
    Tuple(Vec<ConcreteType>),
    Array(Box<ConcreteType>, usize),
    Channel(Box<ConcreteType>, ChannelDirection),
}

impl ConcreteType {
    pub fn unsigned(width: u32) -> Self {
        Self::Bits {
            signed: false,
            width,
        }
    }

    pub fn signed(width: u32) -> Self {
        Self::Bits {
            signed: true,
            width,
        }
    }

    pub fn bool() -> Self {
        Self::unsigned(1)
    }

    pub fn unit() -> Self {
        Self::Tuple(Vec::new())
    }

    pub fn is_bits(&self) -> bool {
        matches!(self, Self::Bits { .. })
    }

    pub fn is_bool(&self) -> bool {
        *self == Self::bool()
    }

    pub fn is_unsigned_bits(&self) -> bool {
        matches!(self, Self::Bits { signed: false, .. })
    }

    pub fn contains_channel(&self) -> bool {
        match self {
            Self::Bits { .. } => false,
            Self::Tuple(elements) => elements.iter().any(Self::contains_channel),
            Self::Array(element, _) => element.contains_channel(),
            Self::Channel(..) => true,
        }
    }

    /// Direction and payload type, when this is a channel type.
    pub fn as_channel(&self) -> Option<(&ConcreteType, ChannelDirection)> {
        match self {
            Self::Channel(payload, direction) => Some((payload, *direction)),
            _ => None,
        }
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits { signed, width } => {
                write!(f, "{}{}", if *signed { 's' } else { 'u' }, width)
            }
            Self::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                if elements.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Self::Array(element, size) => write!(f, "{element}[{size}]"),
            Self::Channel(payload, direction) => write!(f, "chan<{payload}> {direction}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub params: Vec<ConcreteType>,
    pub ret: ConcreteType,
}

/// One declared parameter of a proc's config phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigParam {
    pub name: String,
    pub ty: ConcreteType,
}
