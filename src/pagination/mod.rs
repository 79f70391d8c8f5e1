//! Keyset-cursor pagination.
//!
//! A list request flows through three steps:
//! - `cursor`: the client's opaque token is decoded into the previous page's
//!   boundary tuple (or nothing, for the first page)
//! - `keyset`: the tuple, filters and normalized limit become one range query
//!   that fetches `limit + 1` rows
//! - `page`: the fetched rows are trimmed to `limit` and the next token is
//!   derived from the boundary row
//!
//! `resources` holds the per-resource cursor shapes.

pub mod cursor;
pub mod keyset;
pub mod page;
pub mod resources;

use serde::Deserialize;

use crate::config::PaginationConfig;

pub use cursor::{decode_cursor, encode_cursor, CursorError, CursorValue};
pub use keyset::{build_query, normalize_limit, Filter, KeyValue, KeysetCursor, QuerySpec, ResourceKind};
pub use page::{assemble, Page};

/// Pagination parameters as received from a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl PageRequest {
    pub fn first(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            cursor: None,
        }
    }

    pub fn after(cursor: impl Into<String>, limit: i64) -> Self {
        Self {
            limit: Some(limit),
            cursor: Some(cursor.into()),
        }
    }

    /// Decode the cursor and build the range query for `C`'s resource.
    pub fn to_query<C: KeysetCursor>(
        &self,
        filters: Vec<Filter>,
        config: &PaginationConfig,
    ) -> Result<QuerySpec, CursorError> {
        let cursor = decode_cursor::<C>(self.cursor.as_deref().unwrap_or(""))?;
        let limit = normalize_limit(self.limit, config);
        Ok(build_query(filters, cursor.as_ref(), limit))
    }
}
