//! Kernel parameter metadata and scalar argument values

use crate::domain::AccessQualifier;
use crate::error::MemoryError;
use std::fmt;

/// OpenCL scalar types accepted as by-value kernel arguments
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
}

impl ScalarType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "char" => Self::Char,
            "uchar" | "unsigned char" => Self::UChar,
            "short" => Self::Short,
            "ushort" | "unsigned short" => Self::UShort,
            "int" => Self::Int,
            "uint" | "unsigned int" | "unsigned" => Self::UInt,
            "long" => Self::Long,
            "ulong" | "unsigned long" | "size_t" => Self::ULong,
            "float" => Self::Float,
            "double" => Self::Double,
            _ => return None,
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Long | Self::ULong | Self::Double => 8,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Char => "char",
            Self::UChar => "uchar",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Long => "long",
            Self::ULong => "ulong",
            Self::Float => "float",
            Self::Double => "double",
        };
        f.write_str(name)
    }
}

/// A by-value kernel argument
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ScalarValue {
    Char(i8),
    UChar(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
}

impl ScalarValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            Self::Char(_) => ScalarType::Char,
            Self::UChar(_) => ScalarType::UChar,
            Self::Short(_) => ScalarType::Short,
            Self::UShort(_) => ScalarType::UShort,
            Self::Int(_) => ScalarType::Int,
            Self::UInt(_) => ScalarType::UInt,
            Self::Long(_) => ScalarType::Long,
            Self::ULong(_) => ScalarType::ULong,
            Self::Float(_) => ScalarType::Float,
            Self::Double(_) => ScalarType::Double,
        }
    }

    /// Little-endian bytes as the device sees them
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match *self {
            Self::Char(v) => v.to_le_bytes().to_vec(),
            Self::UChar(v) => v.to_le_bytes().to_vec(),
            Self::Short(v) => v.to_le_bytes().to_vec(),
            Self::UShort(v) => v.to_le_bytes().to_vec(),
            Self::Int(v) => v.to_le_bytes().to_vec(),
            Self::UInt(v) => v.to_le_bytes().to_vec(),
            Self::Long(v) => v.to_le_bytes().to_vec(),
            Self::ULong(v) => v.to_le_bytes().to_vec(),
            Self::Float(v) => v.to_le_bytes().to_vec(),
            Self::Double(v) => v.to_le_bytes().to_vec(),
        }
    }
}

/// How a kernel parameter is passed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Scalar(ScalarType),
    Buffer,
    /// Image of the given dimensionality
    Image(u8),
}

const QUALIFIERS: &[&str] = &[
    "__read_only",
    "read_only",
    "__write_only",
    "write_only",
    "__read_write",
    "read_write",
    "__global",
    "global",
    "__constant",
    "constant",
    "__local",
    "local",
    "const",
    "restrict",
    "volatile",
];

impl ParamKind {
    /// Classify a declared OpenCL parameter type such as `float*`,
    /// `__read_only image2d_t` or `uint`
    pub fn classify(type_name: &str) -> Result<Self, MemoryError> {
        if type_name.contains('*') {
            return Ok(Self::Buffer);
        }
        let base = type_name
            .split_whitespace()
            .filter(|token| !QUALIFIERS.contains(token))
            .collect::<Vec<_>>()
            .join(" ");

        match base.as_str() {
            "image1d_t" | "image1d_buffer_t" => Ok(Self::Image(1)),
            "image2d_t" => Ok(Self::Image(2)),
            "image3d_t" => Ok(Self::Image(3)),
            other => ScalarType::from_name(other).map(Self::Scalar).ok_or_else(|| {
                MemoryError::InvalidKernelArgument(format!("unsupported parameter type '{type_name}'"))
            }),
        }
    }

    pub fn is_memory(&self) -> bool {
        !matches!(self, Self::Scalar(_))
    }
}

/// Declared signature of one kernel parameter slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelParam {
    pub name: String,
    pub type_name: String,
    pub access: AccessQualifier,
}

impl KernelParam {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, access: AccessQualifier) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            access,
        }
    }

    pub fn kind(&self) -> Result<ParamKind, MemoryError> {
        ParamKind::classify(&self.type_name)
    }
}
