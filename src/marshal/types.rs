//! Type tags and native slot storage.
//!
//! `TypeTag` is the single source of truth for a call-boundary slot:
//! width, signedness, and conversion routine all dispatch on it.

use core::ffi::c_void;

/// Closed enumeration of native value representations.
///
/// Scalar tags map to fixed-width machine types; `Long`/`Ulong`/`Ssize`/
/// `Size`/`TypeHandle` are pointer-width. `Interface` defers to a nested
/// type descriptor (structure, enum, object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Void,
    Boolean,
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Short,
    Ushort,
    Int,
    Uint,
    Long,
    Ulong,
    Ssize,
    Size,
    TypeHandle,
    Float,
    Double,
    Utf8,
    Filename,
    Interface,
}

impl TypeTag {
    /// Slot width in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::Void => 0,
            Self::Boolean | Self::Int32 | Self::Uint32 | Self::Int | Self::Uint => 4,
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 | Self::Short | Self::Ushort => 2,
            Self::Int64 | Self::Uint64 | Self::Double => 8,
            Self::Float => 4,
            Self::Long
            | Self::Ulong
            | Self::Ssize
            | Self::Size
            | Self::TypeHandle
            | Self::Utf8
            | Self::Filename
            | Self::Interface => core::mem::size_of::<usize>(),
        }
    }

    /// Alignment requirement.
    #[inline]
    pub const fn align(self) -> usize {
        match self {
            Self::Void => 1,
            other => other.size(),
        }
    }

    /// Check if the tag is an integer representation.
    #[inline]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Uint8
                | Self::Int16
                | Self::Uint16
                | Self::Int32
                | Self::Uint32
                | Self::Int64
                | Self::Uint64
                | Self::Short
                | Self::Ushort
                | Self::Int
                | Self::Uint
                | Self::Long
                | Self::Ulong
                | Self::Ssize
                | Self::Size
                | Self::TypeHandle
        )
    }

    /// Check if the tag is a floating-point representation.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }

    /// Check if the slot carries a pointer.
    #[inline]
    pub const fn is_pointer(self) -> bool {
        matches!(self, Self::Utf8 | Self::Filename | Self::Interface)
    }
}

/// One native argument slot (untagged union).
///
/// Canonical exchange format between the marshaler and the call frame.
/// The active member is determined by the `TypeTag` of the slot.
#[repr(C)]
pub union NativeValue {
    pub v_bool: i32,
    pub v_i8: i8,
    pub v_u8: u8,
    pub v_i16: i16,
    pub v_u16: u16,
    pub v_i32: i32,
    pub v_u32: u32,
    pub v_i64: i64,
    pub v_u64: u64,
    pub v_f32: f32,
    pub v_f64: f64,
    pub v_isize: isize,
    pub v_usize: usize,
    pub v_ptr: *mut c_void,
}

impl NativeValue {
    /// Zero-filled slot. Also the representation of an absent optional value.
    #[inline]
    pub const fn zeroed() -> Self {
        Self { v_u64: 0 }
    }

    /// Slot holding a raw pointer.
    #[inline]
    pub const fn from_ptr(ptr: *mut c_void) -> Self {
        Self { v_ptr: ptr }
    }

    /// Read a slot of the given tag from raw memory.
    ///
    /// # Safety
    /// `addr` must be valid for reads of `tag.size()` bytes.
    pub unsafe fn read(addr: *const u8, tag: TypeTag) -> Self {
        match tag {
            TypeTag::Void => Self::zeroed(),
            TypeTag::Boolean => Self { v_bool: addr.cast::<i32>().read_unaligned() },
            TypeTag::Int8 => Self { v_i8: addr.cast::<i8>().read_unaligned() },
            TypeTag::Uint8 => Self { v_u8: addr.cast::<u8>().read_unaligned() },
            TypeTag::Int16 | TypeTag::Short => {
                Self { v_i16: addr.cast::<i16>().read_unaligned() }
            }
            TypeTag::Uint16 | TypeTag::Ushort => {
                Self { v_u16: addr.cast::<u16>().read_unaligned() }
            }
            TypeTag::Int32 | TypeTag::Int => {
                Self { v_i32: addr.cast::<i32>().read_unaligned() }
            }
            TypeTag::Uint32 | TypeTag::Uint => {
                Self { v_u32: addr.cast::<u32>().read_unaligned() }
            }
            TypeTag::Int64 => Self { v_i64: addr.cast::<i64>().read_unaligned() },
            TypeTag::Uint64 => Self { v_u64: addr.cast::<u64>().read_unaligned() },
            TypeTag::Long | TypeTag::Ssize => {
                Self { v_isize: addr.cast::<isize>().read_unaligned() }
            }
            TypeTag::Ulong | TypeTag::Size | TypeTag::TypeHandle => {
                Self { v_usize: addr.cast::<usize>().read_unaligned() }
            }
            TypeTag::Float => Self { v_f32: addr.cast::<f32>().read_unaligned() },
            TypeTag::Double => Self { v_f64: addr.cast::<f64>().read_unaligned() },
            TypeTag::Utf8 | TypeTag::Filename | TypeTag::Interface => {
                Self { v_ptr: addr.cast::<*mut c_void>().read_unaligned() }
            }
        }
    }

    /// Write a slot of the given tag to raw memory.
    ///
    /// # Safety
    /// `addr` must be valid for writes of `tag.size()` bytes, and the
    /// slot's active member must match `tag`.
    pub unsafe fn write(&self, addr: *mut u8, tag: TypeTag) {
        match tag {
            TypeTag::Void => {}
            TypeTag::Boolean => addr.cast::<i32>().write_unaligned(self.v_bool),
            TypeTag::Int8 => addr.cast::<i8>().write_unaligned(self.v_i8),
            TypeTag::Uint8 => addr.cast::<u8>().write_unaligned(self.v_u8),
            TypeTag::Int16 | TypeTag::Short => {
                addr.cast::<i16>().write_unaligned(self.v_i16)
            }
            TypeTag::Uint16 | TypeTag::Ushort => {
                addr.cast::<u16>().write_unaligned(self.v_u16)
            }
            TypeTag::Int32 | TypeTag::Int => {
                addr.cast::<i32>().write_unaligned(self.v_i32)
            }
            TypeTag::Uint32 | TypeTag::Uint => {
                addr.cast::<u32>().write_unaligned(self.v_u32)
            }
            TypeTag::Int64 => addr.cast::<i64>().write_unaligned(self.v_i64),
            TypeTag::Uint64 => addr.cast::<u64>().write_unaligned(self.v_u64),
            TypeTag::Long | TypeTag::Ssize => {
                addr.cast::<isize>().write_unaligned(self.v_isize)
            }
            TypeTag::Ulong | TypeTag::Size | TypeTag::TypeHandle => {
                addr.cast::<usize>().write_unaligned(self.v_usize)
            }
            TypeTag::Float => addr.cast::<f32>().write_unaligned(self.v_f32),
            TypeTag::Double => addr.cast::<f64>().write_unaligned(self.v_f64),
            TypeTag::Utf8 | TypeTag::Filename | TypeTag::Interface => {
                addr.cast::<*mut c_void>().write_unaligned(self.v_ptr)
            }
        }
    }
}

impl Default for NativeValue {
    #[inline]
    fn default() -> Self {
        Self::zeroed()
    }
}

// Manual implementations for Copy, Clone, and Debug since union doesn't auto-derive
impl Copy for NativeValue {}
impl Clone for NativeValue {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl core::fmt::Debug for NativeValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NativeValue {{ ... }}")
    }
}
