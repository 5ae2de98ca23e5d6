//! Newtype protocol identifiers.
//!
//! Every token with protocol meaning is a distinct newtype wrapping a `String`.
//! This prevents accidentally passing, for example, a [`Subprotocol`] where a
//! [`VersionId`] is expected, and puts each token's grammar in one place.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// `new()` accepts a value only when the validator returns true.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident, $valid:expr
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is not
            /// well-formed.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                let valid: fn(&str) -> bool = $valid;
                if valid(&v) { Some(Self(v)) } else { None }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Characters permitted in a WebSocket subprotocol token (RFC 7230 `tchar`).
const TOKEN_CHARS: &str =
    "!#$%&'*+-.0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ^_`abcdefghijklmnopqrstuvwxyz|~";

/// Returns `true` if `value` is a non-empty subprotocol token.
pub fn is_valid_subprotocol(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| TOKEN_CHARS.contains(c))
}

string_id! {
    /// Identifies one Bare wire-protocol version (e.g. `"v3"`).
    ///
    /// Opaque: ordering comes from the client's version preference table, never
    /// from the string itself or from the manifest.
    VersionId, |v| !v.is_empty()
}

string_id! {
    /// A WebSocket subprotocol requested by the caller (e.g. `"chat"`).
    ///
    /// Construction enforces the token grammar, so a `Subprotocol` can always be
    /// placed in a `Sec-WebSocket-Protocol` list.
    Subprotocol, is_valid_subprotocol
}

impl VersionId {
    /// Version identifier for protocol V1.
    pub fn v1() -> Self {
        Self("v1".to_string())
    }

    /// Version identifier for protocol V2.
    pub fn v2() -> Self {
        Self("v2".to_string())
    }

    /// Version identifier for protocol V3.
    pub fn v3() -> Self {
        Self("v3".to_string())
    }
}

impl Subprotocol {
    /// Validates every requested subprotocol, failing on the first violation.
    pub fn parse_all<I, S>(values: I) -> crate::Result<Vec<Self>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        values
            .into_iter()
            .map(|value| {
                let value = value.into();
                Self::new(value.clone()).ok_or(crate::BareClientError::InvalidSubprotocol(value))
            })
            .collect()
    }
}
