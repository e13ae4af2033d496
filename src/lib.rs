//! Dynabind - metadata-driven dynamic bindings to native libraries
//!
//! This crate binds and calls native C-ABI functions at runtime from
//! introspection metadata alone: no compiled glue per library. A
//! [`Registry`] describes namespaces of functions, structures, enums,
//! objects, and constants; an [`Engine`] resolves descriptors, binds
//! callables, marshals values across the boundary, and keeps one live
//! wrapper per native address.

pub mod cache;
pub mod callable;
pub mod engine;
pub mod error;
pub mod logging;
pub mod marshal;
pub mod registry;
pub mod structure;
pub mod value;

// Re-export the embedder-facing surface
pub use callable::{CallableData, RawError};
pub use engine::Engine;
pub use error::{Error, Result};
pub use marshal::{NativeValue, TypeTag};
pub use registry::{
    ConstantInfo, ConstantValue, Direction, EnumInfo, FieldInfo, FunctionInfo, Kind, Namespace,
    ObjectInfo, ParamInfo, RecordInfo, Registry, TypeDescriptor, TypeInfo,
};
pub use structure::{Ownership, StructureData};
pub use value::{CallableRef, DynamicValue, StructRef};
