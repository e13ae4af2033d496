//! Type-introspection metadata: descriptors, namespaces, registry.
//!
//! The registry is a read-only metadata source describing native
//! functions, structures, enums, objects, and constants without any
//! compiled binding code. The engine only queries it; embedders populate
//! it (or back it with a real introspection store) before handing it to
//! an [`crate::engine::Engine`].

use std::collections::HashMap;
use std::ffi::CString;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use core::ffi::c_void;
use dashmap::DashMap;
use libloading::Library;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};
use crate::marshal::types::TypeTag;

/// Cheap-clone handle to one immutable metadata record.
///
/// The registry owns the record; handles are non-owning in spirit and map
/// the retain/release discipline onto `Arc` clone/drop. `(namespace,
/// container, name)` is not guaranteed unique (aliasing is legal), so
/// descriptor comparison goes through [`TypeDescriptor::describes_same`].
#[derive(Clone)]
pub struct TypeDescriptor(Arc<Descriptor>);

/// One named entity in the introspection store.
pub struct Descriptor {
    pub namespace: String,
    pub container: Option<String>,
    pub name: String,
    pub kind: Kind,
}

impl TypeDescriptor {
    /// Descriptor for a namespace-level entity.
    pub fn new(namespace: &str, name: &str, kind: Kind) -> Self {
        Self(Arc::new(Descriptor {
            namespace: namespace.to_string(),
            container: None,
            name: name.to_string(),
            kind,
        }))
    }

    /// Descriptor for a member of a container (e.g. a structure method).
    pub fn member_of(namespace: &str, container: &str, name: &str, kind: Kind) -> Self {
        Self(Arc::new(Descriptor {
            namespace: namespace.to_string(),
            container: Some(container.to_string()),
            name: name.to_string(),
            kind,
        }))
    }

    /// Dotted path `Namespace.Container.Name` for diagnostics.
    pub fn full_name(&self) -> String {
        match &self.container {
            Some(c) => format!("{}.{}.{}", self.namespace, c, self.name),
            None => format!("{}.{}", self.namespace, self.name),
        }
    }

    /// True when both handles name the same entity, even through aliases.
    pub fn describes_same(&self, other: &TypeDescriptor) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.namespace == other.namespace
                && self.container == other.container
                && self.name == other.name)
    }
}

impl Deref for TypeDescriptor {
    type Target = Descriptor;

    #[inline]
    fn deref(&self) -> &Descriptor {
        &self.0
    }
}

impl core::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.full_name())
    }
}

/// Entity payload, dispatched on by `instantiate` and the marshaler.
pub enum Kind {
    Function(FunctionInfo),
    Record(RecordInfo),
    Enum(EnumInfo),
    Object(ObjectInfo),
    Constant(ConstantInfo),
    /// A structure field resolved as a container member. Carries the
    /// field metadata; access still goes through the owning structure
    /// handle.
    Field(FieldInfo),
}

impl Kind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Function(_) => "function",
            Self::Record(_) => "struct",
            Self::Enum(_) => "enum",
            Self::Object(_) => "object",
            Self::Constant(_) => "constant",
            Self::Field(_) => "field",
        }
    }
}

/// Declared type of one slot: a tag, plus the nested descriptor for
/// interface tags.
#[derive(Clone, Debug)]
pub struct TypeInfo {
    pub tag: TypeTag,
    pub interface: Option<TypeDescriptor>,
}

impl TypeInfo {
    pub fn scalar(tag: TypeTag) -> Self {
        Self { tag, interface: None }
    }

    pub fn interface(descriptor: TypeDescriptor) -> Self {
        Self {
            tag: TypeTag::Interface,
            interface: Some(descriptor),
        }
    }
}

/// Parameter direction at the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

/// One declared function parameter.
#[derive(Clone, Debug)]
pub struct ParamInfo {
    pub name: String,
    pub direction: Direction,
    pub optional: bool,
    pub nullable: bool,
    pub caller_allocates: bool,
    pub ty: TypeInfo,
}

impl ParamInfo {
    pub fn new(name: &str, direction: Direction, ty: TypeInfo) -> Self {
        Self {
            name: name.to_string(),
            direction,
            optional: false,
            nullable: false,
            caller_allocates: false,
            ty,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn caller_allocates(mut self) -> Self {
        self.caller_allocates = true;
        self
    }
}

/// Function metadata: symbol, flags, signature.
pub struct FunctionInfo {
    pub symbol: String,
    /// Pre-resolved entry address. When absent the symbol is looked up in
    /// the namespace's shared library on first bind.
    pub entry: Option<usize>,
    pub is_method: bool,
    pub is_constructor: bool,
    pub throws: bool,
    pub params: Vec<ParamInfo>,
    pub ret: TypeInfo,
}

impl FunctionInfo {
    pub fn new(symbol: &str, params: Vec<ParamInfo>, ret: TypeInfo) -> Self {
        Self {
            symbol: symbol.to_string(),
            entry: None,
            is_method: false,
            is_constructor: false,
            throws: false,
            params,
            ret,
        }
    }

    pub fn at_address(mut self, entry: usize) -> Self {
        self.entry = Some(entry);
        self
    }

    pub fn method(mut self) -> Self {
        self.is_method = true;
        self
    }

    pub fn constructor(mut self) -> Self {
        self.is_constructor = true;
        self
    }

    pub fn throwing(mut self) -> Self {
        self.throws = true;
        self
    }
}

/// One declared structure field.
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeInfo,
    pub offset: usize,
    pub readable: bool,
    pub writable: bool,
}

impl FieldInfo {
    pub fn new(name: &str, ty: TypeInfo, offset: usize) -> Self {
        Self {
            name: name.to_string(),
            ty,
            offset,
            readable: true,
            writable: true,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }
}

/// Release hook for heap structures owned by the native side.
pub type Destructor = unsafe extern "C" fn(*mut c_void);

/// Plain structure metadata: layout plus member functions.
pub struct RecordInfo {
    pub size: usize,
    pub fields: Vec<FieldInfo>,
    pub methods: HashMap<String, TypeDescriptor>,
    pub destructor: Option<Destructor>,
}

impl RecordInfo {
    pub fn new(size: usize, fields: Vec<FieldInfo>) -> Self {
        Self {
            size,
            fields,
            methods: HashMap::new(),
            destructor: None,
        }
    }

    pub fn with_method(mut self, name: &str, descriptor: TypeDescriptor) -> Self {
        self.methods.insert(name.to_string(), descriptor);
        self
    }

    pub fn with_destructor(mut self, destructor: Destructor) -> Self {
        self.destructor = Some(destructor);
        self
    }

    /// Exact-name field lookup; no inheritance in plain structures.
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Enum metadata: the engine only cares about storage representation.
pub struct EnumInfo {
    pub storage: TypeTag,
    pub methods: HashMap<String, TypeDescriptor>,
}

impl EnumInfo {
    pub fn new(storage: TypeTag) -> Self {
        Self {
            storage,
            methods: HashMap::new(),
        }
    }

    pub fn with_method(mut self, name: &str, descriptor: TypeDescriptor) -> Self {
        self.methods.insert(name.to_string(), descriptor);
        self
    }
}

/// Identity-type metadata with a parent chain for subtype checks.
pub struct ObjectInfo {
    pub parent: Option<TypeDescriptor>,
    pub methods: HashMap<String, TypeDescriptor>,
}

impl ObjectInfo {
    pub fn new() -> Self {
        Self {
            parent: None,
            methods: HashMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: TypeDescriptor) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_method(mut self, name: &str, descriptor: TypeDescriptor) -> Self {
        self.methods.insert(name.to_string(), descriptor);
        self
    }
}

impl Default for ObjectInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Literal payload of a constant descriptor.
pub enum ConstantValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(CString),
}

/// Constant metadata: declared type plus literal.
pub struct ConstantInfo {
    pub ty: TypeInfo,
    pub value: ConstantValue,
}

impl ConstantInfo {
    pub fn new(ty: TypeInfo, value: ConstantValue) -> Self {
        Self { ty, value }
    }
}

/// Walk `descriptor`'s parent chain looking for `target`.
///
/// Used both for cast checks and for structure-argument compatibility.
pub fn is_subtype(descriptor: &TypeDescriptor, target: &TypeDescriptor) -> bool {
    let mut current = descriptor.clone();
    loop {
        if current.describes_same(target) {
            return true;
        }
        match &current.kind {
            Kind::Object(info) => match &info.parent {
                Some(parent) => current = parent.clone(),
                None => return false,
            },
            _ => return false,
        }
    }
}

/// One namespace of metadata, optionally backed by a shared library.
pub struct Namespace {
    name: String,
    library_path: Option<PathBuf>,
    library: OnceCell<Library>,
    entries: HashMap<String, TypeDescriptor>,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            library_path: None,
            library: OnceCell::new(),
            entries: HashMap::new(),
        }
    }

    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a namespace-level descriptor, keyed by its name.
    pub fn define(&mut self, descriptor: TypeDescriptor) {
        self.entries
            .insert(descriptor.name.clone(), descriptor);
    }

    /// Exact-name lookup of a namespace-level entity.
    pub fn entry(&self, name: &str) -> Option<&TypeDescriptor> {
        self.entries.get(name)
    }

    /// Resolve a native symbol through the namespace's shared library,
    /// loading it on first use. Idempotent.
    pub(crate) fn resolve_symbol(&self, symbol: &str) -> Result<usize> {
        let path = self.library_path.as_ref().ok_or_else(|| Error::Resolution {
            what: format!("namespace {} has no shared library", self.name),
        })?;
        let library = self.library.get_or_try_init(|| {
            debug!(namespace = %self.name, path = %path.display(), "loading namespace library");
            unsafe { Library::new(path) }.map_err(|e| Error::Resolution {
                what: format!("cannot load library for {}: {}", self.name, e),
            })
        })?;
        let func: libloading::Symbol<'_, unsafe extern "C" fn()> =
            unsafe { library.get(symbol.as_bytes()) }.map_err(|e| Error::Resolution {
                what: format!("symbol {} not found in {}: {}", symbol, self.name, e),
            })?;
        Ok(*func as usize)
    }
}

/// The introspection store: a table of namespaces.
///
/// Read-only from the engine's perspective; `install` is the embedder's
/// population step.
pub struct Registry {
    namespaces: DashMap<String, Arc<Namespace>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            namespaces: DashMap::new(),
        }
    }

    pub fn install(&self, namespace: Namespace) {
        debug!(namespace = %namespace.name(), "namespace metadata installed");
        self.namespaces
            .insert(namespace.name().to_string(), Arc::new(namespace));
    }

    /// Make sure a namespace's metadata is available. Safe to call
    /// repeatedly; fails with a resolution error for unknown namespaces.
    pub fn require(&self, name: &str) -> Result<Arc<Namespace>> {
        self.namespaces
            .get(name)
            .map(|ns| Arc::clone(ns.value()))
            .ok_or_else(|| Error::Resolution {
                what: format!("unknown namespace {}", name),
            })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_names() {
        let d = TypeDescriptor::new("Demo", "Point", Kind::Record(RecordInfo::new(8, vec![])));
        assert_eq!(d.full_name(), "Demo.Point");

        let m = TypeDescriptor::member_of(
            "Demo",
            "Point",
            "norm",
            Kind::Function(FunctionInfo::new("point_norm", vec![], TypeInfo::scalar(TypeTag::Int32))),
        );
        assert_eq!(m.full_name(), "Demo.Point.norm");
    }

    #[test]
    fn test_descriptor_aliasing() {
        let a = TypeDescriptor::new("Demo", "Point", Kind::Record(RecordInfo::new(8, vec![])));
        let b = TypeDescriptor::new("Demo", "Point", Kind::Record(RecordInfo::new(8, vec![])));
        assert!(a.describes_same(&b));
    }

    #[test]
    fn test_subtype_walk() {
        let base = TypeDescriptor::new("Demo", "Base", Kind::Object(ObjectInfo::new()));
        let derived = TypeDescriptor::new(
            "Demo",
            "Derived",
            Kind::Object(ObjectInfo::new().with_parent(base.clone())),
        );
        assert!(is_subtype(&derived, &base));
        assert!(is_subtype(&derived, &derived));
        assert!(!is_subtype(&base, &derived));
    }

    #[test]
    fn test_unknown_namespace() {
        let registry = Registry::new();
        assert!(matches!(
            registry.require("Nope"),
            Err(Error::Resolution { .. })
        ));
    }

    #[test]
    fn test_symbol_without_library() {
        let ns = Namespace::new("Demo");
        assert!(matches!(
            ns.resolve_symbol("anything"),
            Err(Error::Resolution { .. })
        ));
    }
}
