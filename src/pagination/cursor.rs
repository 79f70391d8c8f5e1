//! Opaque cursor token codec.
//!
//! A cursor value is serialized to JSON and then wrapped in URL-safe base64
//! (no padding). Clients get a printable token with no documented structure
//! and must pass it back verbatim. Tokens are not signed: a forged token can
//! only move the starting position of a page, every row still goes through the
//! same filters.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;

// Upper bound on untrusted token input, checked before any decoding work.
pub const MAX_CURSOR_TOKEN_LEN: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("malformed cursor: token exceeds {max} characters")]
    TooLong { max: usize },
    #[error("malformed cursor: {0}")]
    Decode(String),
    #[error("malformed cursor: field `{field}` {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("failed to encode cursor: {0}")]
    Encode(String),
}

impl CursorError {
    /// True for every error caused by client input (as opposed to encoding).
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }
}

/// A plain record of the ordering tuple of one row.
///
/// Implementors hold scalar fields only. `validate` runs after structural
/// decoding and rejects values that parsed but cannot be real keys.
pub trait CursorValue: Serialize + DeserializeOwned {
    fn validate(&self) -> Result<(), CursorError> {
        Ok(())
    }
}

pub fn encode_cursor<C: CursorValue>(value: &C) -> Result<String, CursorError> {
    let json = serde_json::to_vec(value).map_err(|e| CursorError::Encode(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Decode a client token.
///
/// An empty or whitespace-only token means "start from the beginning" and
/// yields `Ok(None)`.
pub fn decode_cursor<C: CursorValue>(token: &str) -> Result<Option<C>, CursorError> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }
    if token.len() > MAX_CURSOR_TOKEN_LEN {
        return Err(CursorError::TooLong {
            max: MAX_CURSOR_TOKEN_LEN,
        });
    }

    let json = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|e| CursorError::Decode(format!("invalid token encoding: {e}")))?;
    let value: C = serde_json::from_slice(&json)
        .map_err(|e| CursorError::Decode(format!("invalid token payload: {e}")))?;
    value.validate()?;
    Ok(Some(value))
}

/// Field check shared by every cursor that carries a row identifier.
///
/// Ids are compared as text, so only the lowercase hyphenated form that rows
/// are stored with is accepted.
pub fn validate_id_field(field: &'static str, value: &str) -> Result<(), CursorError> {
    match uuid::Uuid::parse_str(value) {
        Ok(id) if id.hyphenated().to_string() == value => Ok(()),
        _ => Err(CursorError::InvalidField {
            field,
            reason: "is not a valid identifier".to_string(),
        }),
    }
}
