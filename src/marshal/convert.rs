//! Bidirectional value conversion, driven entirely by type tags.
//!
//! One conversion rule per tag is the whole point of the engine: any
//! type the introspection store can describe marshals without per-type
//! glue. An unhandled tag is a hard error, never a silent skip — an
//! unmarshaled slot leaves the call frame undefined.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use core::ffi::c_void;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::registry::{is_subtype, Kind, TypeInfo};
use crate::value::DynamicValue;

use super::types::{NativeValue, TypeTag};

/// Expected dynamic type for a tag (for error messages).
pub const fn dynamic_type_name(tag: TypeTag) -> &'static str {
    match tag {
        TypeTag::Void => "nothing",
        TypeTag::Boolean => "boolean",
        TypeTag::Float | TypeTag::Double => "number",
        TypeTag::Utf8 | TypeTag::Filename => "string",
        TypeTag::Interface => "struct",
        _ => "integer",
    }
}

/// Convert a native slot to a dynamic value.
///
/// `Void` produces nothing; every other handled tag produces exactly one
/// value. Enum interfaces resolve to their storage tag and recurse;
/// structure/object interfaces go through the identity cache (a null
/// address yields `Null` without creating a wrapper).
pub fn to_dynamic(
    engine: &Engine,
    ty: &TypeInfo,
    value: &NativeValue,
) -> Result<Option<DynamicValue>> {
    if let Some(v) = scalar_to_dynamic(ty.tag, value) {
        return Ok(Some(v));
    }
    match ty.tag {
        TypeTag::Void => Ok(None),
        TypeTag::Interface => {
            let descriptor = ty.interface.as_ref().ok_or_else(|| Error::UnsupportedType {
                context: "interface type without a descriptor".to_string(),
            })?;
            match &descriptor.kind {
                Kind::Enum(info) => {
                    scalar_to_dynamic(info.storage, value)
                        .map(Some)
                        .ok_or_else(|| Error::UnsupportedType {
                            context: format!(
                                "enum {} has non-scalar storage",
                                descriptor.full_name()
                            ),
                        })
                }
                Kind::Record(_) | Kind::Object(_) => {
                    let addr = unsafe { value.v_ptr } as *mut u8;
                    Ok(Some(engine.wrap_address(descriptor, addr)))
                }
                other => Err(Error::UnsupportedType {
                    context: format!(
                        "cannot marshal {} {}",
                        other.label(),
                        descriptor.full_name()
                    ),
                }),
            }
        }
        tag => Err(Error::UnsupportedType {
            context: format!("unhandled type tag {:?}", tag),
        }),
    }
}

/// Convert a dynamic value into a native slot.
///
/// When `optional` is set and the value is absent, the slot is
/// zero-filled — never left uninitialized. String conversions copy into
/// `keepalive`, which the caller must hold for the duration of the call.
pub fn from_dynamic(
    value: &DynamicValue,
    ty: &TypeInfo,
    optional: bool,
    keepalive: &mut Vec<CString>,
) -> Result<NativeValue> {
    if optional && value.is_null() {
        return Ok(NativeValue::zeroed());
    }
    match ty.tag {
        TypeTag::Void => Ok(NativeValue::zeroed()),
        TypeTag::Boolean => match value {
            DynamicValue::Bool(b) => Ok(NativeValue { v_bool: *b as i32 }),
            other => Err(mismatch(TypeTag::Boolean, other)),
        },
        TypeTag::Int8 => Ok(NativeValue {
            v_i8: want_int(ty.tag, value, i8::MIN as i64, i8::MAX as i64)? as i8,
        }),
        TypeTag::Uint8 => Ok(NativeValue {
            v_u8: want_uint(ty.tag, value, u8::MAX as u64)? as u8,
        }),
        TypeTag::Int16 | TypeTag::Short => Ok(NativeValue {
            v_i16: want_int(ty.tag, value, i16::MIN as i64, i16::MAX as i64)? as i16,
        }),
        TypeTag::Uint16 | TypeTag::Ushort => Ok(NativeValue {
            v_u16: want_uint(ty.tag, value, u16::MAX as u64)? as u16,
        }),
        TypeTag::Int32 | TypeTag::Int => Ok(NativeValue {
            v_i32: want_int(ty.tag, value, i32::MIN as i64, i32::MAX as i64)? as i32,
        }),
        TypeTag::Uint32 | TypeTag::Uint => Ok(NativeValue {
            v_u32: want_uint(ty.tag, value, u32::MAX as u64)? as u32,
        }),
        TypeTag::Int64 => Ok(NativeValue {
            v_i64: want_int(ty.tag, value, i64::MIN, i64::MAX)?,
        }),
        TypeTag::Uint64 => Ok(NativeValue {
            v_u64: want_uint(ty.tag, value, u64::MAX)?,
        }),
        TypeTag::Long | TypeTag::Ssize => Ok(NativeValue {
            v_isize: want_int(ty.tag, value, isize::MIN as i64, isize::MAX as i64)? as isize,
        }),
        TypeTag::Ulong | TypeTag::Size | TypeTag::TypeHandle => Ok(NativeValue {
            v_usize: want_uint(ty.tag, value, usize::MAX as u64)? as usize,
        }),
        TypeTag::Float => Ok(NativeValue {
            v_f32: want_float(ty.tag, value)? as f32,
        }),
        TypeTag::Double => Ok(NativeValue {
            v_f64: want_float(ty.tag, value)?,
        }),
        TypeTag::Utf8 | TypeTag::Filename => match value {
            DynamicValue::Str(s) => {
                let text = CString::new(s.as_str()).map_err(|_| Error::Type {
                    expected: "text without interior NUL".to_string(),
                    got: "string with embedded NUL".to_string(),
                })?;
                let ptr = text.as_ptr() as *mut c_void;
                // The CString's heap buffer stays put across the move.
                keepalive.push(text);
                Ok(NativeValue { v_ptr: ptr })
            }
            other => Err(mismatch(ty.tag, other)),
        },
        TypeTag::Interface => {
            let descriptor = ty.interface.as_ref().ok_or_else(|| Error::UnsupportedType {
                context: "interface type without a descriptor".to_string(),
            })?;
            match &descriptor.kind {
                Kind::Enum(info) => from_dynamic(
                    value,
                    &TypeInfo::scalar(info.storage),
                    optional,
                    keepalive,
                ),
                Kind::Record(_) | Kind::Object(_) => match value {
                    DynamicValue::Struct(handle)
                        if is_subtype(handle.descriptor(), descriptor) =>
                    {
                        Ok(NativeValue::from_ptr(handle.address() as *mut c_void))
                    }
                    other => Err(Error::Type {
                        expected: descriptor.full_name(),
                        got: other.type_name().to_string(),
                    }),
                },
                other => Err(Error::UnsupportedType {
                    context: format!(
                        "cannot marshal {} {}",
                        other.label(),
                        descriptor.full_name()
                    ),
                }),
            }
        }
    }
}

/// The tag that determines a slot's raw storage: enum interfaces resolve
/// to their declared storage tag, structure/object interfaces to a
/// pointer; everything else is itself.
pub(crate) fn effective_tag(ty: &TypeInfo) -> Result<TypeTag> {
    match ty.tag {
        TypeTag::Interface => {
            let descriptor = ty.interface.as_ref().ok_or_else(|| Error::UnsupportedType {
                context: "interface type without a descriptor".to_string(),
            })?;
            match &descriptor.kind {
                Kind::Enum(info) => Ok(info.storage),
                Kind::Record(_) | Kind::Object(_) => Ok(TypeTag::Interface),
                other => Err(Error::UnsupportedType {
                    context: format!(
                        "{} {} has no slot representation",
                        other.label(),
                        descriptor.full_name()
                    ),
                }),
            }
        }
        tag => Ok(tag),
    }
}

fn scalar_to_dynamic(tag: TypeTag, value: &NativeValue) -> Option<DynamicValue> {
    unsafe {
        match tag {
            TypeTag::Boolean => Some(DynamicValue::Bool(value.v_bool != 0)),
            TypeTag::Int8 => Some(DynamicValue::Int(value.v_i8 as i64)),
            TypeTag::Uint8 => Some(DynamicValue::Int(value.v_u8 as i64)),
            TypeTag::Int16 | TypeTag::Short => Some(DynamicValue::Int(value.v_i16 as i64)),
            TypeTag::Uint16 | TypeTag::Ushort => Some(DynamicValue::Int(value.v_u16 as i64)),
            TypeTag::Int32 | TypeTag::Int => Some(DynamicValue::Int(value.v_i32 as i64)),
            TypeTag::Uint32 | TypeTag::Uint => Some(DynamicValue::Int(value.v_u32 as i64)),
            TypeTag::Int64 => Some(DynamicValue::Int(value.v_i64)),
            TypeTag::Uint64 => Some(DynamicValue::Uint(value.v_u64)),
            TypeTag::Long | TypeTag::Ssize => Some(DynamicValue::Int(value.v_isize as i64)),
            TypeTag::Ulong | TypeTag::Size | TypeTag::TypeHandle => {
                Some(DynamicValue::Uint(value.v_usize as u64))
            }
            TypeTag::Float => Some(DynamicValue::Float(value.v_f32 as f64)),
            TypeTag::Double => Some(DynamicValue::Float(value.v_f64)),
            TypeTag::Utf8 | TypeTag::Filename => {
                let ptr = value.v_ptr as *const c_char;
                if ptr.is_null() {
                    Some(DynamicValue::Null)
                } else {
                    // Copied, never aliased.
                    Some(DynamicValue::Str(
                        CStr::from_ptr(ptr).to_string_lossy().into_owned(),
                    ))
                }
            }
            TypeTag::Void | TypeTag::Interface => None,
        }
    }
}

fn mismatch(tag: TypeTag, got: &DynamicValue) -> Error {
    Error::Type {
        expected: dynamic_type_name(tag).to_string(),
        got: got.type_name().to_string(),
    }
}

fn want_int(tag: TypeTag, value: &DynamicValue, min: i64, max: i64) -> Result<i64> {
    // Exclusive upper bound: `max as f64` rounds up for 64-bit widths,
    // which would let `max + 1` saturate through the cast.
    let n = match value {
        DynamicValue::Int(i) => *i,
        DynamicValue::Uint(u) if *u <= max as u64 => *u as i64,
        DynamicValue::Float(f)
            if f.fract() == 0.0 && *f >= min as f64 && *f < (max as f64) + 1.0 =>
        {
            *f as i64
        }
        other => return Err(mismatch(tag, other)),
    };
    if n < min || n > max {
        return Err(Error::Type {
            expected: format!("integer in [{}, {}]", min, max),
            got: n.to_string(),
        });
    }
    Ok(n)
}

fn want_uint(tag: TypeTag, value: &DynamicValue, max: u64) -> Result<u64> {
    let n = match value {
        DynamicValue::Int(i) if *i >= 0 => *i as u64,
        DynamicValue::Uint(u) => *u,
        DynamicValue::Float(f) if f.fract() == 0.0 && *f >= 0.0 && *f < (max as f64) + 1.0 => {
            *f as u64
        }
        other => return Err(mismatch(tag, other)),
    };
    if n > max {
        return Err(Error::Type {
            expected: format!("integer in [0, {}]", max),
            got: n.to_string(),
        });
    }
    Ok(n)
}

// Floating-point slots take any numeric value through a real float
// conversion; integral inputs are widened, never round-tripped through
// an integer check.
fn want_float(tag: TypeTag, value: &DynamicValue) -> Result<f64> {
    match value {
        DynamicValue::Float(f) => Ok(*f),
        DynamicValue::Int(i) => Ok(*i as f64),
        DynamicValue::Uint(u) => Ok(*u as f64),
        other => Err(mismatch(tag, other)),
    }
}
