//! Dynamic-side values exchanged with the embedding runtime.
//!
//! `DynamicValue` is the engine's half of the value-exchange API: the
//! embedding runtime converts its own stack values to and from this enum.
//! Structure and callable wrappers compare by identity, everything else
//! by value.

use std::sync::Arc;

use crate::callable::CallableData;
use crate::structure::StructureData;

/// Shared handle to a native structure wrapper.
pub type StructRef = Arc<StructureData>;

/// Shared handle to a bound native function.
pub type CallableRef = Arc<CallableData>;

/// A value crossing the dynamic/native boundary.
#[derive(Clone)]
pub enum DynamicValue {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Struct(StructRef),
    Callable(CallableRef),
}

impl DynamicValue {
    /// Type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Uint(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::Struct(_) => "struct",
            Self::Callable(_) => "function",
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            // Signed/unsigned representations of the same number compare equal.
            (Self::Int(a), Self::Uint(b)) | (Self::Uint(b), Self::Int(a)) => {
                *a >= 0 && *a as u64 == *b
            }
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Struct(a), Self::Struct(b)) => Arc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl core::fmt::Debug for DynamicValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Uint(u) => write!(f, "{}", u),
            Self::Float(x) => write!(f, "{}", x),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Struct(h) => write!(f, "{:?}", h),
            Self::Callable(c) => write!(f, "{:?}", c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_crosses_signedness() {
        assert_eq!(DynamicValue::Int(5), DynamicValue::Uint(5));
        assert_ne!(DynamicValue::Int(-1), DynamicValue::Uint(u64::MAX));
        assert_ne!(DynamicValue::Int(0), DynamicValue::Float(0.0));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DynamicValue::Null.type_name(), "null");
        assert_eq!(DynamicValue::Uint(1).type_name(), "integer");
        assert_eq!(DynamicValue::Str(String::new()).type_name(), "string");
    }
}
