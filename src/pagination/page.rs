use serde::{Serialize, Serializer};

use super::cursor::{encode_cursor, CursorError, CursorValue};

/// One page of a list response.
///
/// Serializes as `{ items, nextCursor, hasMore, count }` with an empty string
/// for "no next page".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(serialize_with = "serialize_token")]
    pub next_cursor: Option<String>,
    pub has_more: bool,
    pub count: usize,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
            count: 0,
        }
    }

    /// Convert items into another representation, keeping pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
            count: self.count,
        }
    }
}

fn serialize_token<S: Serializer>(token: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(token.as_deref().unwrap_or(""))
}

/// Turn `limit + 1` fetched rows into a page.
///
/// The probe row past `limit` only signals that more rows exist; it is
/// dropped, and the next cursor is the sort tuple of the last row the client
/// actually receives, which the strict range predicate of the next query
/// resumes after.
pub fn assemble<R, C, F>(mut rows: Vec<R>, limit: usize, cursor_of: F) -> Result<Page<R>, CursorError>
where
    C: CursorValue,
    F: Fn(&R) -> C,
{
    let probed = rows.len() > limit;
    rows.truncate(limit);

    // A page with no boundary row cannot be resumed, so it never claims more.
    let next_cursor = match (probed, rows.last()) {
        (true, Some(boundary)) => Some(encode_cursor(&cursor_of(boundary))?),
        _ => None,
    };
    let has_more = next_cursor.is_some();

    Ok(Page {
        count: rows.len(),
        items: rows,
        next_cursor,
        has_more,
    })
}
