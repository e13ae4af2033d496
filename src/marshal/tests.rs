use std::sync::Arc;

use crate::engine::Engine;
use crate::error::Error;
use crate::registry::{EnumInfo, Kind, Registry, TypeDescriptor, TypeInfo};
use crate::value::DynamicValue;

use super::types::{NativeValue, TypeTag};
use super::{from_dynamic, to_dynamic};

fn engine() -> Engine {
    Engine::new(Arc::new(Registry::new()))
}

fn round_trip(value: DynamicValue, tag: TypeTag) -> DynamicValue {
    let engine = engine();
    let ty = TypeInfo::scalar(tag);
    let mut keepalive = Vec::new();
    let slot = from_dynamic(&value, &ty, false, &mut keepalive).unwrap();
    to_dynamic(&engine, &ty, &slot).unwrap().unwrap()
}

#[test]
fn test_tag_sizes() {
    assert_eq!(TypeTag::Void.size(), 0);
    assert_eq!(TypeTag::Int8.size(), 1);
    assert_eq!(TypeTag::Short.size(), 2);
    assert_eq!(TypeTag::Boolean.size(), 4);
    assert_eq!(TypeTag::Double.size(), 8);
    assert_eq!(TypeTag::Size.size(), core::mem::size_of::<usize>());
    assert_eq!(TypeTag::Utf8.size(), core::mem::size_of::<usize>());
    assert!(TypeTag::Size.is_integral());
    assert!(TypeTag::Float.is_float());
    assert!(TypeTag::Interface.is_pointer());
}

#[test]
fn test_slot_memory_round_trip() {
    let mut buf = [0u8; 16];
    let slot = NativeValue { v_i32: -7 };
    unsafe {
        slot.write(buf.as_mut_ptr().add(3), TypeTag::Int32);
        let back = NativeValue::read(buf.as_ptr().add(3), TypeTag::Int32);
        assert_eq!(back.v_i32, -7);
    }

    let slot = NativeValue { v_f64: 2.25 };
    unsafe {
        slot.write(buf.as_mut_ptr().add(1), TypeTag::Double);
        let back = NativeValue::read(buf.as_ptr().add(1), TypeTag::Double);
        assert_eq!(back.v_f64, 2.25);
    }
}

#[test]
fn test_integer_boundaries() {
    assert_eq!(
        round_trip(DynamicValue::Int(i8::MIN as i64), TypeTag::Int8),
        DynamicValue::Int(i8::MIN as i64)
    );
    assert_eq!(
        round_trip(DynamicValue::Int(i8::MAX as i64), TypeTag::Int8),
        DynamicValue::Int(i8::MAX as i64)
    );
    assert_eq!(
        round_trip(DynamicValue::Uint(u64::MAX), TypeTag::Uint64),
        DynamicValue::Uint(u64::MAX)
    );
    assert_eq!(
        round_trip(DynamicValue::Int(i64::MIN), TypeTag::Int64),
        DynamicValue::Int(i64::MIN)
    );
}

#[test]
fn test_out_of_range_integer_rejected() {
    let ty = TypeInfo::scalar(TypeTag::Uint8);
    let mut keepalive = Vec::new();
    let err = from_dynamic(&DynamicValue::Int(256), &ty, false, &mut keepalive).unwrap_err();
    assert!(matches!(err, Error::Type { .. }));

    let ty = TypeInfo::scalar(TypeTag::Uint32);
    let err = from_dynamic(&DynamicValue::Int(-1), &ty, false, &mut keepalive).unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn test_float_at_word_boundary_rejected() {
    // i64::MAX rounds up to 2^63 as f64; that value is out of range and
    // must not saturate through the cast.
    let mut keepalive = Vec::new();
    let ty = TypeInfo::scalar(TypeTag::Int64);
    let err = from_dynamic(
        &DynamicValue::Float(i64::MAX as f64),
        &ty,
        false,
        &mut keepalive,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));

    let ty = TypeInfo::scalar(TypeTag::Uint64);
    let err = from_dynamic(
        &DynamicValue::Float(u64::MAX as f64),
        &ty,
        false,
        &mut keepalive,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));

    // Exactly representable maxima still pass.
    assert_eq!(
        round_trip(DynamicValue::Float(127.0), TypeTag::Int8),
        DynamicValue::Int(127)
    );
    assert_eq!(
        round_trip(DynamicValue::Float(255.0), TypeTag::Uint8),
        DynamicValue::Int(255)
    );
}

#[test]
fn test_cross_signedness_accepted_in_range() {
    assert_eq!(
        round_trip(DynamicValue::Uint(41), TypeTag::Int32),
        DynamicValue::Int(41)
    );
    assert_eq!(
        round_trip(DynamicValue::Int(41), TypeTag::Uint64),
        DynamicValue::Uint(41)
    );
}

#[test]
fn test_fractional_float_reaches_float_slot_intact() {
    // Fractional values must survive float marshaling; only integer
    // slots require integral inputs.
    assert_eq!(
        round_trip(DynamicValue::Float(3.5), TypeTag::Double),
        DynamicValue::Float(3.5)
    );
    assert_eq!(
        round_trip(DynamicValue::Float(3.5), TypeTag::Float),
        DynamicValue::Float(3.5)
    );
    assert_eq!(
        round_trip(DynamicValue::Int(-9), TypeTag::Double),
        DynamicValue::Float(-9.0)
    );

    let ty = TypeInfo::scalar(TypeTag::Int32);
    let mut keepalive = Vec::new();
    let err = from_dynamic(&DynamicValue::Float(3.5), &ty, false, &mut keepalive).unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn test_strings_copied_both_ways() {
    for text in ["", "plain", "héllo wörld ☃"] {
        assert_eq!(
            round_trip(DynamicValue::Str(text.to_string()), TypeTag::Utf8),
            DynamicValue::Str(text.to_string())
        );
    }
}

#[test]
fn test_interior_nul_rejected() {
    let ty = TypeInfo::scalar(TypeTag::Utf8);
    let mut keepalive = Vec::new();
    let err = from_dynamic(
        &DynamicValue::Str("a\0b".to_string()),
        &ty,
        false,
        &mut keepalive,
    )
    .unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn test_null_string_pointer_reads_as_null() {
    let engine = engine();
    let ty = TypeInfo::scalar(TypeTag::Utf8);
    let slot = NativeValue::zeroed();
    assert_eq!(
        to_dynamic(&engine, &ty, &slot).unwrap().unwrap(),
        DynamicValue::Null
    );
}

#[test]
fn test_optional_null_zero_fills() {
    let ty = TypeInfo::scalar(TypeTag::Utf8);
    let mut keepalive = Vec::new();
    let slot = from_dynamic(&DynamicValue::Null, &ty, true, &mut keepalive).unwrap();
    assert!(unsafe { slot.v_ptr }.is_null());

    let err = from_dynamic(&DynamicValue::Null, &ty, false, &mut keepalive).unwrap_err();
    assert!(matches!(err, Error::Type { .. }));
}

#[test]
fn test_booleans() {
    assert_eq!(
        round_trip(DynamicValue::Bool(true), TypeTag::Boolean),
        DynamicValue::Bool(true)
    );
    // Any non-zero native value is truthy.
    let engine = engine();
    let ty = TypeInfo::scalar(TypeTag::Boolean);
    let slot = NativeValue { v_bool: -1 };
    assert_eq!(
        to_dynamic(&engine, &ty, &slot).unwrap().unwrap(),
        DynamicValue::Bool(true)
    );
}

#[test]
fn test_enum_marshals_through_storage() {
    let engine = engine();
    let color = TypeDescriptor::new("Demo", "Color", Kind::Enum(EnumInfo::new(TypeTag::Uint32)));
    let ty = TypeInfo::interface(color);

    let mut keepalive = Vec::new();
    let slot = from_dynamic(&DynamicValue::Int(2), &ty, false, &mut keepalive).unwrap();
    assert_eq!(unsafe { slot.v_u32 }, 2);
    assert_eq!(
        to_dynamic(&engine, &ty, &slot).unwrap().unwrap(),
        DynamicValue::Int(2)
    );
}

#[test]
fn test_void_produces_nothing() {
    let engine = engine();
    let ty = TypeInfo::scalar(TypeTag::Void);
    assert!(to_dynamic(&engine, &ty, &NativeValue::zeroed())
        .unwrap()
        .is_none());
}
