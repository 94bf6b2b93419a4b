//! Codec error types - single point of truth
//!
//! Every failure in this crate is a recoverable `Err` value; nothing panics
//! and no partial output is ever produced. Decoding and encoding have
//! separate enums because callers recover from them differently: a decode
//! failure means the metadata is not (valid) CoinSpark data, while an encode
//! failure means the record needs different parameters or a bigger budget.

use thiserror::Error;

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for encode operations
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Failures while interpreting wire bytes or text forms
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes available than a fixed-width field requires
    #[error("metadata truncated: wanted {wanted} bytes, {available} available")]
    Truncated { wanted: usize, available: usize },

    /// Blob does not open with the 3-byte metadata identifier
    #[error("metadata does not start with the SPK identifier")]
    BadIdentifier,

    /// Segment chain was walked to the end without finding the wanted type
    #[error("no metadata segment with type tag {0:#04x}")]
    SegmentNotFound(u8),

    /// Segment chain is structurally broken (bad length prefix etc.)
    #[error("malformed segment chain: {0}")]
    MalformedChain(&'static str),

    /// Packing byte selects a combination no encoder produces
    #[error("unrecognised packing value {value:#04x}")]
    BadPacking { value: u8 },

    /// Decoded value falls outside its field's declared bounds
    #[error("decoded {field} out of range")]
    OutOfRange { field: &'static str },

    /// Text form does not match the required grammar
    #[error("invalid text form: {0}")]
    BadGrammar(&'static str),
}

/// Failures while validating or serialising a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// A field violates its domain-declared bounds; checked before any
    /// bytes are written
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },

    /// The encoded form would exceed the caller-supplied maximum length
    #[error("encoded length {needed} exceeds metadata budget {max_len}")]
    Capacity { needed: usize, max_len: usize },

    /// A value does not fit the fixed byte width chosen for it
    #[error("value {value} does not fit in {width} bytes")]
    Overflow { value: u64, width: usize },

    /// A character cannot be represented in the 40-symbol domain/path
    /// alphabet
    #[error("character {0:?} cannot be packed into the domain/path alphabet")]
    UnpackableChar(char),
}

impl EncodeError {
    /// Translate a validation failure hit while decoding into the decode
    /// taxonomy, preserving the field name where there is one.
    pub(crate) fn into_decode(self) -> DecodeError {
        match self {
            EncodeError::Invalid { field, .. } => DecodeError::OutOfRange { field },
            _ => DecodeError::OutOfRange { field: "record" },
        }
    }
}
