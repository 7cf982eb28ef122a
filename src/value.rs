use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::channel::ChannelId;
use crate::dslx::error::CompileError;

/// A bit vector of up to 128 bits. The pattern is kept masked to `width`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Bits {
    width: u32,
    signed: bool,
    raw: u128,
}

fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

impl Bits {
    pub fn new(width: u32, signed: bool, raw: u128) -> Self {
        Self {
            width,
            signed,
            raw: raw & mask(width),
        }
    }

    pub fn from_i128(width: u32, signed: bool, value: i128) -> Self {
        Self::new(width, signed, value as u128)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn raw(&self) -> u128 {
        self.raw
    }

    /// The pattern read as a two's complement number, regardless of signedness.
    pub fn sign_extended(&self) -> i128 {
        let shift = 128 - self.width;
        ((self.raw << shift) as i128) >> shift
    }

    pub fn is_true(&self) -> bool {
        self.raw != 0
    }

    /// Same pattern and width, different signedness.
    pub fn with_signedness(self, signed: bool) -> Self {
        Self { signed, ..self }
    }

    pub fn wrapping_add(self, rhs: Self) -> Self {
        Self::new(self.width, self.signed, self.raw.wrapping_add(rhs.raw))
    }

    pub fn wrapping_sub(self, rhs: Self) -> Self {
        Self::new(self.width, self.signed, self.raw.wrapping_sub(rhs.raw))
    }

    pub fn wrapping_mul(self, rhs: Self) -> Self {
        Self::new(self.width, self.signed, self.raw.wrapping_mul(rhs.raw))
    }

    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.raw == 0 {
            return None;
        }
        Some(if self.signed {
            let quotient = self.sign_extended().wrapping_div(rhs.sign_extended());
            Self::from_i128(self.width, true, quotient)
        } else {
            Self::new(self.width, false, self.raw / rhs.raw)
        })
    }

    pub fn checked_rem(self, rhs: Self) -> Option<Self> {
        if rhs.raw == 0 {
            return None;
        }
        Some(if self.signed {
            let remainder = self.sign_extended().wrapping_rem(rhs.sign_extended());
            Self::from_i128(self.width, true, remainder)
        } else {
            Self::new(self.width, false, self.raw % rhs.raw)
        })
    }

    pub fn shl(self, amount: Bits) -> Self {
        if amount.raw >= self.width as u128 {
            return Self::new(self.width, self.signed, 0);
        }
        Self::new(self.width, self.signed, self.raw << amount.raw)
    }

    /// Arithmetic for signed values, logical otherwise.
    pub fn shr(self, amount: Bits) -> Self {
        let fill_ones = self.signed && self.sign_extended() < 0;
        if amount.raw >= self.width as u128 {
            let raw = if fill_ones { u128::MAX } else { 0 };
            return Self::new(self.width, self.signed, raw);
        }
        if self.signed {
            Self::from_i128(self.width, true, self.sign_extended() >> amount.raw)
        } else {
            Self::new(self.width, false, self.raw >> amount.raw)
        }
    }

    pub fn and(self, rhs: Self) -> Self {
        Self::new(self.width, self.signed, self.raw & rhs.raw)
    }

    pub fn or(self, rhs: Self) -> Self {
        Self::new(self.width, self.signed, self.raw | rhs.raw)
    }

    pub fn xor(self, rhs: Self) -> Self {
        Self::new(self.width, self.signed, self.raw ^ rhs.raw)
    }

    pub fn not(self) -> Self {
        Self::new(self.width, self.signed, !self.raw)
    }

    pub fn wrapping_neg(self) -> Self {
        Self::new(self.width, self.signed, self.raw.wrapping_neg())
    }

    pub fn compare(&self, rhs: &Self) -> Ordering {
        if self.signed {
            self.sign_extended().cmp(&rhs.sign_extended())
        } else {
            self.raw.cmp(&rhs.raw)
        }
    }

    /// Extends (by the source signedness) or truncates to `width`.
    pub fn resize(self, width: u32, signed: bool) -> Self {
        if self.signed {
            Self::from_i128(width, signed, self.sign_extended())
        } else {
            Self::new(width, signed, self.raw)
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.signed {
            write!(f, "s{}:{}", self.width, self.sign_extended())
        } else {
            write!(f, "u{}:{}", self.width, self.raw)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Bits(Bits),
    Tuple(Vec<Value>),
    Array(Vec<Value>),
    Channel(ChannelId),
}

impl Value {
    pub fn ubits(width: u32, raw: u128) -> Self {
        Self::Bits(Bits::new(width, false, raw))
    }

    pub fn sbits(width: u32, value: i128) -> Self {
        Self::Bits(Bits::from_i128(width, true, value))
    }

    pub fn bool(value: bool) -> Self {
        Self::ubits(1, value as u128)
    }

    pub fn unit() -> Self {
        Self::Tuple(Vec::new())
    }

    pub fn as_bits(&self) -> Option<Bits> {
        match self {
            Self::Bits(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<ChannelId> {
        match self {
            Self::Channel(id) => Some(*id),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bits(_) => "bits",
            Self::Tuple(_) => "tuple",
            Self::Array(_) => "array",
            Self::Channel(_) => "channel",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bits(bits) => write!(f, "{bits}"),
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
            Self::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Self::Channel(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for Value {
    type Err = CompileError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        crate::dslx::parse::parse_value(text)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
