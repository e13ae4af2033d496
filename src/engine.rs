//! The engine: public entry points over a metadata registry.
//!
//! An engine owns an identity cache and a shared registry handle. All
//! wrapper construction funnels through it so that every native address
//! resolves to at most one live wrapper at a time.

use core::ffi::c_void;
use std::sync::Arc;

use tracing::debug;

use crate::cache::IdentityCache;
use crate::callable::CallableData;
use crate::error::{Error, Result};
use crate::marshal::{self, convert::effective_tag, NativeValue, TypeTag};
use crate::registry::{
    is_subtype, ConstantValue, Kind, Registry, TypeDescriptor,
};
use crate::structure::{Ownership, StructureData};
use crate::value::{CallableRef, DynamicValue, StructRef};

/// Dynamic-binding context: registry handle plus identity cache.
pub struct Engine {
    registry: Arc<Registry>,
    cache: IdentityCache,
}

impl Engine {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            cache: IdentityCache::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The identity cache, exposed for liveness inspection.
    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Look up a descriptor by namespace, optional container, and name.
    ///
    /// With a container, the name resolves among the container's
    /// methods and fields; object containers search their parent chain
    /// too.
    pub fn resolve(
        &self,
        namespace: &str,
        container: Option<&str>,
        name: &str,
    ) -> Result<TypeDescriptor> {
        let ns = self.registry.require(namespace)?;
        match container {
            None => ns.entry(name).cloned().ok_or_else(|| Error::Resolution {
                what: format!("{} has no entry {}", namespace, name),
            }),
            Some(container) => {
                let owner = ns.entry(container).cloned().ok_or_else(|| Error::Resolution {
                    what: format!("{} has no entry {}", namespace, container),
                })?;
                lookup_member(&owner, name).ok_or_else(|| Error::Resolution {
                    what: format!("{} has no member {}", owner.full_name(), name),
                })
            }
        }
    }

    /// Turn a descriptor into a usable dynamic value.
    ///
    /// Functions bind to callables (deduplicated by entry address),
    /// structure types allocate a fresh zeroed instance, constants yield
    /// their literal after a marshal round-trip against the declared
    /// type. Enum and object descriptors carry no instantiable payload.
    pub fn instantiate(&self, descriptor: &TypeDescriptor) -> Result<DynamicValue> {
        match &descriptor.kind {
            Kind::Function(_) => Ok(DynamicValue::Callable(self.bind(descriptor)?)),
            Kind::Record(_) => Ok(DynamicValue::Struct(self.new_record(descriptor)?)),
            Kind::Constant(info) => {
                let literal = match &info.value {
                    ConstantValue::Bool(b) => DynamicValue::Bool(*b),
                    ConstantValue::Int(i) => DynamicValue::Int(*i),
                    ConstantValue::Uint(u) => DynamicValue::Uint(*u),
                    ConstantValue::Float(f) => DynamicValue::Float(*f),
                    ConstantValue::Str(s) => {
                        DynamicValue::Str(s.to_string_lossy().into_owned())
                    }
                };
                // Round-trip validates the literal against the declared
                // type; a mismatched constant is a metadata bug.
                let mut keepalive = Vec::new();
                let slot = marshal::from_dynamic(&literal, &info.ty, false, &mut keepalive)?;
                let value = marshal::to_dynamic(self, &info.ty, &slot)?;
                value.ok_or_else(|| Error::UnsupportedType {
                    context: format!("constant {} has void type", descriptor.full_name()),
                })
            }
            other => Err(Error::UnsupportedType {
                context: format!(
                    "cannot instantiate {} {}",
                    other.label(),
                    descriptor.full_name()
                ),
            }),
        }
    }

    /// Bind a function descriptor, reusing the cached callable when its
    /// entry address is already bound. The calling-convention binding is
    /// only built on a cache miss.
    pub fn bind(&self, descriptor: &TypeDescriptor) -> Result<CallableRef> {
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
        let entry = match info.entry {
            Some(addr) => addr,
            None => self
                .registry
                .require(&descriptor.namespace)?
                .resolve_symbol(&info.symbol)?,
        };
        if let Some(existing) = self.cache.lookup_callable(entry) {
            return Ok(existing);
        }
        let bound = CallableData::bind(descriptor.clone(), entry)?;
        Ok(self.cache.insert_callable(entry, &bound))
    }

    /// Call a bound native function. See [`crate::callable`] for the
    /// frame layout and result ordering.
    pub fn invoke(
        &self,
        callable: &CallableData,
        args: &[DynamicValue],
    ) -> Result<Vec<DynamicValue>> {
        crate::callable::invoke(self, callable, args)
    }

    /// Read a structure field as a dynamic value.
    pub fn get_field(&self, handle: &StructRef, name: &str) -> Result<DynamicValue> {
        let field = handle.field_for_read(name)?;
        let tag = effective_tag(&field.ty)?;
        let slot = unsafe { NativeValue::read(handle.address().add(field.offset), tag) };
        let value = marshal::to_dynamic(self, &field.ty, &slot)?;
        value.ok_or_else(|| Error::UnsupportedType {
            context: format!(
                "field {}.{} has void type",
                handle.descriptor().full_name(),
                name
            ),
        })
    }

    /// Write a structure field from a dynamic value.
    ///
    /// String fields are rejected: the structure layout gives no way to
    /// tell who would own the stored pointer.
    pub fn set_field(&self, handle: &StructRef, name: &str, value: &DynamicValue) -> Result<()> {
        let field = handle.field_for_write(name)?;
        let tag = effective_tag(&field.ty)?;
        if matches!(tag, TypeTag::Utf8 | TypeTag::Filename) {
            return Err(Error::UnsupportedType {
                context: format!(
                    "field {}.{}: string fields are not writable",
                    handle.descriptor().full_name(),
                    name
                ),
            });
        }
        let mut keepalive = Vec::new();
        let slot = marshal::from_dynamic(value, &field.ty, false, &mut keepalive)?;
        unsafe { slot.write(handle.address().add(field.offset), tag) };
        Ok(())
    }

    /// Re-type a structure wrapper along its inheritance chain.
    ///
    /// Both upcasts and downcasts are allowed as long as the two types
    /// are related; the re-typed wrapper becomes the canonical cache
    /// entry for the address. `Null` casts to `Null`.
    ///
    /// Ownership stays with the original wrapper: the re-typed wrapper
    /// always borrows, and an owned-external original keeps its release
    /// duty for the underlying memory. Release happens exactly once, on
    /// the original's drop, no matter how many re-typed borrows exist.
    pub fn cast(&self, value: &DynamicValue, target: &TypeDescriptor) -> Result<DynamicValue> {
        match value {
            DynamicValue::Null => Ok(DynamicValue::Null),
            DynamicValue::Struct(handle) => {
                let related = is_subtype(handle.descriptor(), target)
                    || is_subtype(target, handle.descriptor());
                if !related {
                    return Err(Error::Cast {
                        from: handle.descriptor().full_name(),
                        to: target.full_name(),
                    });
                }
                if handle.descriptor().describes_same(target) {
                    return Ok(value.clone());
                }
                let recast =
                    StructureData::adopt(target.clone(), handle.address(), Ownership::Borrowed);
                self.cache.replace_struct(handle.address() as usize, &recast);
                debug!(
                    from = %handle.descriptor().full_name(),
                    to = %target.full_name(),
                    "structure re-typed"
                );
                Ok(DynamicValue::Struct(recast))
            }
            other => Err(Error::Cast {
                from: other.type_name().to_string(),
                to: target.full_name(),
            }),
        }
    }

    /// Wrap a foreign native pointer for an embedder.
    ///
    /// The identity cache applies as with every other wrapper source. A
    /// null pointer wraps to `Null`.
    pub fn adopt(
        &self,
        descriptor: &TypeDescriptor,
        addr: *mut c_void,
        ownership: Ownership,
    ) -> Result<DynamicValue> {
        if ownership == Ownership::OwnedEmbedded {
            return Err(Error::UnsupportedType {
                context: "embedded ownership requires engine-allocated storage".to_string(),
            });
        }
        if addr.is_null() {
            return Ok(DynamicValue::Null);
        }
        let addr = addr as *mut u8;
        if let Some(existing) = self.cache.lookup_struct(addr as usize) {
            return Ok(DynamicValue::Struct(existing));
        }
        let wrapper = StructureData::adopt(descriptor.clone(), addr, ownership);
        Ok(DynamicValue::Struct(
            self.cache.insert_struct(addr as usize, &wrapper),
        ))
    }

    /// Allocate a fresh zeroed structure and register it in the cache.
    pub(crate) fn new_record(&self, descriptor: &TypeDescriptor) -> Result<StructRef> {
        let handle = StructureData::alloc(descriptor.clone())?;
        Ok(self.cache.insert_struct(handle.address() as usize, &handle))
    }

    /// Wrapper for an address produced by a native call: cache hit, or a
    /// fresh borrowed wrapper made canonical.
    pub(crate) fn wrap_address(
        &self,
        descriptor: &TypeDescriptor,
        addr: *mut u8,
    ) -> DynamicValue {
        if addr.is_null() {
            return DynamicValue::Null;
        }
        if let Some(existing) = self.cache.lookup_struct(addr as usize) {
            return DynamicValue::Struct(existing);
        }
        let wrapper = StructureData::adopt(descriptor.clone(), addr, Ownership::Borrowed);
        DynamicValue::Struct(self.cache.insert_struct(addr as usize, &wrapper))
    }
}

/// Member lookup on a container descriptor: methods first, then
/// declared fields (wrapped as [`Kind::Field`] descriptors). Object
/// containers search their parent chain, mirroring method dispatch on
/// instances.
fn lookup_member(owner: &TypeDescriptor, name: &str) -> Option<TypeDescriptor> {
    match &owner.kind {
        Kind::Record(info) => match info.methods.get(name) {
            Some(found) => Some(found.clone()),
            None => info.field(name).map(|field| {
                TypeDescriptor::member_of(
                    &owner.namespace,
                    &owner.name,
                    name,
                    Kind::Field(field.clone()),
                )
            }),
        },
        Kind::Enum(info) => info.methods.get(name).cloned(),
        Kind::Object(info) => match info.methods.get(name) {
            Some(found) => Some(found.clone()),
            None => info
                .parent
                .as_ref()
                .and_then(|parent| lookup_member(parent, name)),
        },
        _ => None,
    }
}
