//! Value marshaling - dynamic values ↔ native argument slots
//!
//! Architecture:
//! - `types.rs` - slot representations (TypeTag, NativeValue)
//! - `convert.rs` - tag-driven conversions in both directions

pub mod convert;
pub mod types;

pub use convert::{dynamic_type_name, from_dynamic, to_dynamic};
pub use types::{NativeValue, TypeTag};

#[cfg(test)]
mod tests;
