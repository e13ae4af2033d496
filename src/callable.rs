//! Bound native functions and the invocation path.
//!
//! A callable is constructed once per native entry address: symbol
//! resolution and the calling-convention binding (the libffi `Cif`) are
//! expensive, so they happen at bind time and are reused for every call.
//! Signatures that cannot be represented fail the bind, not the call.
//!
//! Throwing convention: a function flagged `throws` takes a trailing
//! `*mut RawError` pointing at frame-owned zeroed storage. A populated
//! record fails the invocation; its message is copied immediately and
//! never retained past the call.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use core::ffi::c_void;
use libffi::middle::{Cif, CodePtr, Type};
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::marshal::{self, NativeValue, TypeTag};
use crate::registry::{Direction, Kind, TypeDescriptor, TypeInfo};
use crate::value::{CallableRef, DynamicValue};

/// Out-of-band error record populated by throwing native functions.
#[repr(C)]
pub struct RawError {
    pub code: i32,
    pub message: *const c_char,
}

impl RawError {
    pub const fn empty() -> Self {
        Self {
            code: 0,
            message: std::ptr::null(),
        }
    }

    fn is_set(&self) -> bool {
        self.code != 0 || !self.message.is_null()
    }
}

/// Per-parameter call plan derived from metadata at bind time.
struct ParamPlan {
    direction: Direction,
    optional: bool,
    caller_allocates: bool,
    // Out/inout parameters travel as a pointer to their slot.
    by_ref: bool,
    ty: TypeInfo,
}

/// A native function bound to its calling convention.
pub struct CallableData {
    descriptor: TypeDescriptor,
    entry: usize,
    cif: Cif,
    has_receiver: bool,
    throws: bool,
    params: Vec<ParamPlan>,
    ret: TypeInfo,
}

impl CallableData {
    /// Build the calling-convention binding for a resolved entry
    /// address. Fails with a bind error when any argument or return type
    /// has no supported representation. The caller checks the identity
    /// cache first; this constructor runs only for unbound entries.
    pub(crate) fn bind(descriptor: TypeDescriptor, entry: usize) -> Result<CallableRef> {
        let info = match &descriptor.kind {
            Kind::Function(info) => info,
            other => {
                return Err(Error::UnsupportedType {
                    context: format!(
                        "cannot bind {} {}",
                        other.label(),
                        descriptor.full_name()
                    ),
                })
            }
        };
        let has_receiver = info.is_method && !info.is_constructor;

        let mut arg_types = Vec::with_capacity(
            has_receiver as usize + info.params.len() + info.throws as usize,
        );
        if has_receiver {
            arg_types.push(Type::pointer());
        }
        let mut params = Vec::with_capacity(info.params.len());
        for param in &info.params {
            let by_ref = matches!(param.direction, Direction::Out | Direction::InOut)
                && !param.caller_allocates;
            let ffi_ty = if by_ref || param.caller_allocates {
                Type::pointer()
            } else {
                slot_type(&param.ty).ok_or_else(|| Error::Bind {
                    function: descriptor.full_name(),
                    detail: format!("parameter '{}' has no supported representation", param.name),
                })?
            };
            arg_types.push(ffi_ty);
            params.push(ParamPlan {
                direction: param.direction,
                optional: param.optional || param.nullable,
                caller_allocates: param.caller_allocates,
                by_ref,
                ty: param.ty.clone(),
            });
        }
        if info.throws {
            arg_types.push(Type::pointer());
        }

        let ret_type = if info.ret.tag == TypeTag::Void {
            Type::void()
        } else {
            slot_type(&info.ret).ok_or_else(|| Error::Bind {
                function: descriptor.full_name(),
                detail: "return type has no supported representation".to_string(),
            })?
        };
        let cif = Cif::new(arg_types.into_iter(), ret_type);

        let throws = info.throws;
        let ret = info.ret.clone();
        trace!(function = %descriptor.full_name(), entry, "callable bound");
        Ok(Arc::new(Self {
            descriptor,
            entry,
            cif,
            has_receiver,
            throws,
            params,
            ret,
        }))
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Native entry address; the identity-cache key for callables.
    pub fn entry(&self) -> usize {
        self.entry
    }
}

impl core::fmt::Debug for CallableData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "function {} @{:#x}",
            self.descriptor.full_name(),
            self.entry
        )
    }
}

/// One call-frame entry: tag-sized storage plus, for by-reference
/// parameters, the pointer cell handed to the native call.
struct Slot {
    value: NativeValue,
    indirect: *mut c_void,
    by_ref: bool,
}

impl Slot {
    fn direct(value: NativeValue) -> Self {
        Self {
            value,
            indirect: std::ptr::null_mut(),
            by_ref: false,
        }
    }

    fn by_ref(value: NativeValue) -> Self {
        Self {
            value,
            indirect: std::ptr::null_mut(),
            by_ref: true,
        }
    }
}

/// Invoke a bound native function.
///
/// The result sequence is `[return-value?, out/inout parameters...]` in
/// parameter declaration order. A populated error channel discards all
/// outputs. The call frame is function-local and released on every exit
/// path.
pub(crate) fn invoke(
    engine: &Engine,
    callable: &CallableData,
    args: &[DynamicValue],
) -> Result<Vec<DynamicValue>> {
    debug!(
        function = %callable.descriptor.full_name(),
        args = args.len(),
        "invoking native function"
    );

    let total =
        callable.has_receiver as usize + callable.params.len() + callable.throws as usize;
    let mut err_out = RawError::empty();
    let mut strings: Vec<CString> = Vec::new();
    // Caller-allocated wrappers must outlive the output marshaling so the
    // identity cache resolves them back to the same handle.
    let mut allocated: Vec<DynamicValue> = Vec::new();
    let mut slots: Vec<Slot> = Vec::with_capacity(total);
    let mut supplied = args.iter();

    if callable.has_receiver {
        let receiver = supplied.next().unwrap_or(&DynamicValue::Null);
        match receiver {
            DynamicValue::Struct(handle) => slots.push(Slot::direct(NativeValue::from_ptr(
                handle.address() as *mut c_void,
            ))),
            other => {
                return Err(Error::Type {
                    expected: format!("{} receiver", callable.descriptor.full_name()),
                    got: other.type_name().to_string(),
                })
            }
        }
    }

    for param in &callable.params {
        match param.direction {
            Direction::In | Direction::InOut => {
                let value = supplied.next().unwrap_or(&DynamicValue::Null);
                let native =
                    marshal::from_dynamic(value, &param.ty, param.optional, &mut strings)?;
                if param.by_ref {
                    slots.push(Slot::by_ref(native));
                } else {
                    slots.push(Slot::direct(native));
                }
            }
            Direction::Out if param.caller_allocates => {
                let descriptor =
                    param.ty.interface.as_ref().ok_or_else(|| Error::UnsupportedType {
                        context: "caller-allocates parameter without an interface type"
                            .to_string(),
                    })?;
                let handle = engine.new_record(descriptor)?;
                slots.push(Slot::direct(NativeValue::from_ptr(
                    handle.address() as *mut c_void,
                )));
                allocated.push(DynamicValue::Struct(handle));
            }
            // The native call populates the slot through the pointer.
            Direction::Out => slots.push(Slot::by_ref(NativeValue::zeroed())),
        }
    }

    if callable.throws {
        slots.push(Slot::direct(NativeValue::from_ptr(
            &mut err_out as *mut RawError as *mut c_void,
        )));
    }

    // The slot vector stops growing here; the frame pointers below stay
    // valid through the call.
    let mut avalue: Vec<*mut c_void> = Vec::with_capacity(total);
    for slot in slots.iter_mut() {
        if slot.by_ref {
            slot.indirect = &mut slot.value as *mut NativeValue as *mut c_void;
            avalue.push(&mut slot.indirect as *mut *mut c_void as *mut c_void);
        } else {
            avalue.push(&mut slot.value as *mut NativeValue as *mut c_void);
        }
    }

    let mut ret_slot = NativeValue::zeroed();
    let code = CodePtr::from_ptr(callable.entry as *const c_void);
    unsafe {
        libffi::raw::ffi_call(
            callable.cif.as_raw_ptr(),
            Some(*code.as_fun()),
            &mut ret_slot as *mut NativeValue as *mut c_void,
            avalue.as_mut_ptr(),
        );
    }

    if callable.throws && err_out.is_set() {
        let message = if err_out.message.is_null() {
            "unspecified native error".to_string()
        } else {
            unsafe { CStr::from_ptr(err_out.message) }
                .to_string_lossy()
                .into_owned()
        };
        debug!(
            function = %callable.descriptor.full_name(),
            code = err_out.code,
            "native call reported an error"
        );
        // Partial out-parameters from a failed call are never surfaced.
        return Err(Error::Native {
            message,
            code: err_out.code,
        });
    }

    let mut results = Vec::new();
    if let Some(value) = marshal::to_dynamic(engine, &callable.ret, &ret_slot)? {
        results.push(value);
    }
    let mut slot_index = callable.has_receiver as usize;
    for param in &callable.params {
        if matches!(param.direction, Direction::Out | Direction::InOut) {
            if let Some(value) =
                marshal::to_dynamic(engine, &param.ty, &slots[slot_index].value)?
            {
                results.push(value);
            }
        }
        slot_index += 1;
    }

    drop(allocated);
    Ok(results)
}

/// libffi representation for a slot type, or `None` when the signature
/// cannot be expressed.
fn slot_type(ty: &TypeInfo) -> Option<Type> {
    match ty.tag {
        TypeTag::Void => None,
        TypeTag::Boolean => Some(Type::i32()),
        TypeTag::Int8 => Some(Type::i8()),
        TypeTag::Uint8 => Some(Type::u8()),
        TypeTag::Int16 | TypeTag::Short => Some(Type::i16()),
        TypeTag::Uint16 | TypeTag::Ushort => Some(Type::u16()),
        TypeTag::Int32 | TypeTag::Int => Some(Type::i32()),
        TypeTag::Uint32 | TypeTag::Uint => Some(Type::u32()),
        TypeTag::Int64 => Some(Type::i64()),
        TypeTag::Uint64 => Some(Type::u64()),
        TypeTag::Long | TypeTag::Ssize => Some(word_signed()),
        TypeTag::Ulong | TypeTag::Size | TypeTag::TypeHandle => Some(word_unsigned()),
        TypeTag::Float => Some(Type::f32()),
        TypeTag::Double => Some(Type::f64()),
        TypeTag::Utf8 | TypeTag::Filename => Some(Type::pointer()),
        TypeTag::Interface => {
            let descriptor = ty.interface.as_ref()?;
            match &descriptor.kind {
                Kind::Enum(info) => slot_type(&TypeInfo::scalar(info.storage)),
                Kind::Record(_) | Kind::Object(_) => Some(Type::pointer()),
                _ => None,
            }
        }
    }
}

fn word_signed() -> Type {
    #[cfg(target_pointer_width = "64")]
    return Type::i64();
    #[cfg(not(target_pointer_width = "64"))]
    return Type::i32();
}

fn word_unsigned() -> Type {
    #[cfg(target_pointer_width = "64")]
    return Type::u64();
    #[cfg(not(target_pointer_width = "64"))]
    return Type::u32();
}
