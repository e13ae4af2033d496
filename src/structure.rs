//! Native structure wrappers: lifecycle and field plumbing.
//!
//! A wrapper couples a type descriptor with a stable address and an
//! ownership mode. The address never changes after construction; release
//! on drop depends on the mode. Owned-external structures whose metadata
//! registers no destructor are leaked by design: the native ABI provides
//! no release path, and guessing one would corrupt the heap.

use core::ffi::c_void;

use std::sync::Arc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::registry::{FieldInfo, Kind, RecordInfo, TypeDescriptor};
use crate::value::StructRef;

/// Who releases the structure's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Address owned elsewhere; never freed by the wrapper.
    Borrowed,
    /// The wrapper's own storage holds the bytes; freed with the wrapper.
    OwnedEmbedded,
    /// Heap-allocated by the native side; released through the type's
    /// destructor, if one is registered.
    OwnedExternal,
}

/// A wrapped native structure (or object identity).
pub struct StructureData {
    descriptor: TypeDescriptor,
    addr: *mut u8,
    ownership: Ownership,
    // Backing bytes for OwnedEmbedded; addr points into this box.
    storage: Option<Box<[u8]>>,
}

impl StructureData {
    /// Allocate zeroed storage for a structure and own it.
    pub(crate) fn alloc(descriptor: TypeDescriptor) -> Result<StructRef> {
        let size = match &descriptor.kind {
            Kind::Record(info) => info.size,
            other => {
                return Err(Error::UnsupportedType {
                    context: format!(
                        "cannot allocate {} {}",
                        other.label(),
                        descriptor.full_name()
                    ),
                })
            }
        };
        let mut storage = vec![0u8; size.max(1)].into_boxed_slice();
        let addr = storage.as_mut_ptr();
        trace!(ty = %descriptor.full_name(), size, "structure allocated");
        Ok(Arc::new(Self {
            descriptor,
            addr,
            ownership: Ownership::OwnedEmbedded,
            storage: Some(storage),
        }))
    }

    /// Wrap an existing native address without allocating.
    pub(crate) fn adopt(
        descriptor: TypeDescriptor,
        addr: *mut u8,
        ownership: Ownership,
    ) -> StructRef {
        debug_assert!(ownership != Ownership::OwnedEmbedded);
        Arc::new(Self {
            descriptor,
            addr,
            ownership,
            storage: None,
        })
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    /// Stable native address of the wrapped structure.
    #[inline]
    pub fn address(&self) -> *mut u8 {
        self.addr
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub(crate) fn record(&self) -> Result<&RecordInfo> {
        match &self.descriptor.kind {
            Kind::Record(info) => Ok(info),
            other => Err(Error::UnsupportedType {
                context: format!(
                    "{} {} has no fields",
                    other.label(),
                    self.descriptor.full_name()
                ),
            }),
        }
    }

    /// Field lookup for reading: resolves the name, then checks the
    /// read permission flag.
    pub(crate) fn field_for_read(&self, name: &str) -> Result<&FieldInfo> {
        let field = self.lookup_field(name)?;
        if !field.readable {
            return Err(Error::FieldNotReadable {
                owner: self.descriptor.full_name(),
                field: name.to_string(),
            });
        }
        Ok(field)
    }

    /// Field lookup for writing: resolves the name, then checks the
    /// write permission flag.
    pub(crate) fn field_for_write(&self, name: &str) -> Result<&FieldInfo> {
        let field = self.lookup_field(name)?;
        if !field.writable {
            return Err(Error::FieldNotWritable {
                owner: self.descriptor.full_name(),
                field: name.to_string(),
            });
        }
        Ok(field)
    }

    fn lookup_field(&self, name: &str) -> Result<&FieldInfo> {
        self.record()?.field(name).ok_or_else(|| Error::NoSuchField {
            owner: self.descriptor.full_name(),
            field: name.to_string(),
        })
    }
}

impl Drop for StructureData {
    fn drop(&mut self) {
        match self.ownership {
            // Embedded storage is freed with the box; borrowed memory is
            // someone else's problem.
            Ownership::Borrowed | Ownership::OwnedEmbedded => {}
            Ownership::OwnedExternal => {
                let destructor = match &self.descriptor.kind {
                    Kind::Record(info) => info.destructor,
                    _ => None,
                };
                match destructor {
                    Some(release) => {
                        trace!(ty = %self.descriptor.full_name(), addr = ?self.addr, "releasing external structure");
                        unsafe { release(self.addr as *mut c_void) };
                    }
                    // No release path in the metadata; leaked by design.
                    None => {
                        trace!(ty = %self.descriptor.full_name(), addr = ?self.addr, "no destructor, leaving external structure");
                    }
                }
            }
        }
    }
}

impl core::fmt::Debug for StructureData {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "struct {} @{:p}",
            self.descriptor.full_name(),
            self.addr
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::types::TypeTag;
    use crate::registry::{FieldInfo, RecordInfo, TypeInfo};

    fn point_descriptor() -> TypeDescriptor {
        TypeDescriptor::new(
            "Demo",
            "Point",
            Kind::Record(RecordInfo::new(
                8,
                vec![
                    FieldInfo::new("x", TypeInfo::scalar(TypeTag::Int32), 0),
                    FieldInfo::new("y", TypeInfo::scalar(TypeTag::Int32), 4),
                ],
            )),
        )
    }

    #[test]
    fn test_alloc_zeroed() {
        let handle = StructureData::alloc(point_descriptor()).unwrap();
        assert_eq!(handle.ownership(), Ownership::OwnedEmbedded);
        let bytes = unsafe { core::slice::from_raw_parts(handle.address(), 8) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_adopt_keeps_address() {
        let mut backing = [0u8; 8];
        let addr = backing.as_mut_ptr();
        let handle = StructureData::adopt(point_descriptor(), addr, Ownership::Borrowed);
        assert_eq!(handle.address(), addr);
    }

    #[test]
    fn test_field_lookup_errors() {
        let handle = StructureData::alloc(point_descriptor()).unwrap();
        assert!(matches!(
            handle.field_for_read("z"),
            Err(Error::NoSuchField { .. })
        ));
        assert!(handle.field_for_read("x").is_ok());
    }

    #[test]
    fn test_external_destructor_runs() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static RELEASED: AtomicUsize = AtomicUsize::new(0);

        unsafe extern "C" fn release(_p: *mut c_void) {
            RELEASED.fetch_add(1, Ordering::SeqCst);
        }

        let descriptor = TypeDescriptor::new(
            "Demo",
            "Owned",
            Kind::Record(RecordInfo::new(4, vec![]).with_destructor(release)),
        );
        let mut backing = [0u8; 4];
        let handle =
            StructureData::adopt(descriptor, backing.as_mut_ptr(), Ownership::OwnedExternal);
        drop(handle);
        assert_eq!(RELEASED.load(Ordering::SeqCst), 1);
    }
}
