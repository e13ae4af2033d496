//! Error taxonomy for the marshaling engine.
//!
//! Every failure surfaces to the embedding runtime as a recoverable value
//! carrying kind + message. Nothing here aborts the process; a failed
//! operation leaves caches and registries usable for the next call.

/// Engine-wide error kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Symbol, namespace, or container lookup failure.
    Resolution { what: String },
    /// A function signature cannot be represented by any supported tag.
    /// Reported at callable-construction time, never at call time.
    Bind { function: String, detail: String },
    /// A value of a tag the marshaler cannot handle. Hard error; an
    /// unmarshaled slot would leave the call frame undefined.
    UnsupportedType { context: String },
    /// A supplied dynamic value does not match the expected native type.
    Type { expected: String, got: String },
    /// Field lookup failed.
    NoSuchField { owner: String, field: String },
    /// Field metadata lacks read permission.
    FieldNotReadable { owner: String, field: String },
    /// Field metadata lacks write permission.
    FieldNotWritable { owner: String, field: String },
    /// The native call signaled failure through its error channel.
    Native { message: String, code: i32 },
    /// Failed identity type-narrowing.
    Cast { from: String, to: String },
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Resolution { what } => write!(f, "resolution failed: {}", what),
            Self::Bind { function, detail } => {
                write!(f, "cannot bind {}: {}", function, detail)
            }
            Self::UnsupportedType { context } => {
                write!(f, "unsupported type: {}", context)
            }
            Self::Type { expected, got } => {
                write!(f, "type mismatch: expected {}, got {}", expected, got)
            }
            Self::NoSuchField { owner, field } => {
                write!(f, "{}: no field '{}'", owner, field)
            }
            Self::FieldNotReadable { owner, field } => {
                write!(f, "{}: field '{}' is not readable", owner, field)
            }
            Self::FieldNotWritable { owner, field } => {
                write!(f, "{}: field '{}' is not writable", owner, field)
            }
            Self::Native { message, code } => {
                write!(f, "native call failed: {} ({})", message, code)
            }
            Self::Cast { from, to } => write!(f, "cannot cast {} to {}", from, to),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = Error::NoSuchField {
            owner: "Demo.Point".into(),
            field: "z".into(),
        };
        assert_eq!(e.to_string(), "Demo.Point: no field 'z'");

        let e = Error::Native {
            message: "boom".into(),
            code: 42,
        };
        assert_eq!(e.to_string(), "native call failed: boom (42)");
    }
}
