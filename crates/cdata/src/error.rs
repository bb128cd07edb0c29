// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by type construction, field access and buffer access.

/// Errors returned by `cdata` operations.
///
/// Every variant is a local, recoverable failure of the operation that
/// produced it. Type-definition errors never leave a half-built type behind,
/// and access errors never leave a memory block partially written.
///
/// # Example
///
/// ```rust
/// use cdata::{ArrayDef, Attributes, Error, Value};
///
/// let attrs = Attributes::new()
///     .with("_length_", Value::Int(-1))
///     .with("_type_", Value::Type(cdata::simple::c_int()));
///
/// match ArrayDef::from_attributes(&attrs) {
///     Err(Error::NegativeLength(n)) => assert_eq!(n, -1),
///     other => panic!("unexpected: {:?}", other),
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Type Definition Errors
    // ========================================================================
    /// A required type-definition attribute (`_length_`, `_type_`, `_flags_`) is absent.
    MissingAttribute(&'static str),
    /// Attribute present but of the wrong kind (e.g. `_flags_` not an integer).
    InvalidAttributeType {
        attribute: &'static str,
        expected: &'static str,
    },
    /// Array `_length_` is negative.
    NegativeLength(i64),
    /// `length * item size` (or an offset computation) exceeds the native size limit.
    Overflow { item_size: u32, length: u64 },
    /// A referenced item/field type has no finalized layout yet.
    IncompleteType(String),
    /// An argument type cannot build a value converter (1-based position).
    NoConverterCapability { position: usize },
    /// `_restype_` is neither a type, a callable nor none.
    InvalidReturnType,
    /// `_fields_` reassigned after the type was used as a field, item, base or instance.
    FieldsFinal(String),
    /// Two fields in one `_fields_` list share a name.
    DuplicateField(String),
    /// Bit width invalid for the field type, or bit fields on a non-integer type.
    InvalidBitField { field: String, reason: &'static str },
    /// Type cannot be instantiated directly (function pointer without target).
    AbstractType(String),

    // ========================================================================
    // Access Errors
    // ========================================================================
    /// Member access by an undeclared name.
    UnknownMember(String),
    /// Raw buffer access outside `[0, size)`.
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    /// Array/pointer element index outside the declared length.
    IndexOutOfRange { index: i64, length: usize },
    /// Value cannot be coerced to a field's native kind.
    TypeMismatch {
        expected: String,
        got: &'static str,
    },
    /// Dereference of a null pointer.
    NullPointer,
    /// Pointer holds an address no live instance is known to own.
    UntrackedAddress(usize),
    /// Source buffer too small for `from_buffer`/`from_buffer_copy`.
    BufferTooSmall { needed: usize, available: usize },
    /// Keep-alive key path grew past `MAX_KEEP_KEY_LEN`.
    StructureTooDeep,

    // ========================================================================
    // Call Marshalling Errors
    // ========================================================================
    /// Wrong number of arguments for a function-pointer signature.
    ArgumentCount { expected: usize, given: usize },
    /// A managed callable failed while running under a native call.
    CallbackFailed(String),
    /// No trampoline registered under this id.
    UnknownCallback(u64),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration could not be loaded or parsed.
    Config(String),
}

impl std::fmt::Display for Error {
    // @audit-ok: Simple pattern matching - error message dispatch table
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Type definition
            Error::MissingAttribute(attr) => write!(f, "class must define a '{}' attribute", attr),
            Error::InvalidAttributeType {
                attribute,
                expected,
            } => write!(f, "'{}' must be {}", attribute, expected),
            Error::NegativeLength(n) => write!(f, "array length must be >= 0, not {}", n),
            Error::Overflow { item_size, length } => write!(
                f,
                "array too large: {} items of {} bytes exceed the native size limit",
                length, item_size
            ),
            Error::IncompleteType(name) => write!(f, "type '{}' has no finalized layout", name),
            Error::NoConverterCapability { position } => write!(
                f,
                "item {} in _argtypes_ has no from_param method",
                position
            ),
            Error::InvalidReturnType => {
                write!(f, "_restype_ must be a type, a callable, or None")
            }
            Error::FieldsFinal(name) => write!(f, "_fields_ is final for '{}'", name),
            Error::DuplicateField(name) => write!(f, "duplicate field name '{}'", name),
            Error::InvalidBitField { field, reason } => {
                write!(f, "bit field '{}': {}", field, reason)
            }
            Error::AbstractType(name) => write!(f, "cannot instantiate abstract type '{}'", name),
            // Access
            Error::UnknownMember(name) => write!(f, "no member named '{}'", name),
            Error::OutOfBounds { offset, len, size } => write!(
                f,
                "access of {} bytes at offset {} outside block of {} bytes",
                len, offset, size
            ),
            Error::IndexOutOfRange { index, length } => {
                write!(f, "invalid index {} (length {})", index, length)
            }
            Error::TypeMismatch { expected, got } => {
                write!(f, "type mismatch: expected {}, got {}", expected, got)
            }
            Error::NullPointer => write!(f, "NULL pointer access"),
            Error::UntrackedAddress(addr) => write!(
                f,
                "pointer target at {:#x} is not owned by a live instance",
                addr
            ),
            Error::BufferTooSmall { needed, available } => write!(
                f,
                "buffer size too small ({} instead of at least {} bytes)",
                available, needed
            ),
            Error::StructureTooDeep => write!(f, "ctypes object structure too deep"),
            // Call marshalling
            Error::ArgumentCount { expected, given } => write!(
                f,
                "this function takes {} argument(s) ({} given)",
                expected, given
            ),
            Error::CallbackFailed(msg) => write!(f, "callback failed: {}", msg),
            Error::UnknownCallback(id) => write!(f, "no callback registered with id {}", id),
            // Configuration
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `cdata` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a managed callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackError {
    pub message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CallbackError {}

impl From<Error> for CallbackError {
    fn from(err: Error) -> Self {
        Self::new(err.to_string())
    }
}
