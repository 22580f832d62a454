//! Errors raised while encoding and decoding locality-qualified identifiers.

use thiserror::Error;

/// Errors raised by the locality codec.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LocalityError {
    /// Raised when an identifier does not match the expected shape or its
    /// UUID component is invalid.
    #[error("malformed identifier {id}: {reason}")]
    MalformedId {
        /// Identifier as supplied by the caller.
        id: String,
        /// Why the identifier was rejected.
        reason: String,
    },
    /// Raised when a scope prefix names no known zone or region.
    #[error("unknown zone or region: {scope}")]
    MalformedScope {
        /// Scope string as supplied by the caller.
        scope: String,
    },
}
