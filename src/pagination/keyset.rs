//! Keyset query construction.
//!
//! Every list endpoint reads one deterministic range query: the resource's
//! fixed ordering (always ending with the primary key), the caller's filters,
//! and, when a cursor is present, a strict row-value comparison against the
//! cursor tuple. The result is rendered to a SQL fragment whose column names
//! come only from `ResourceKind`; user input travels as bound parameters.

use crate::config::PaginationConfig;

use super::cursor::CursorValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    /// Comparator selecting rows strictly after a boundary in this direction.
    pub const fn after(&self) -> &'static str {
        match self {
            Self::Ascending => ">",
            Self::Descending => "<",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValue {
    Integer(i64),
    Text(String),
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ordering {
    pub columns: &'static [&'static str],
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Users,
    Followers,
    Posts,
    Comments,
    Bookmarks,
    Notifications,
}

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Followers => "followers",
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Bookmarks => "bookmarks",
            Self::Notifications => "notifications",
        }
    }

    /// Column aliases match the list queries in `db::queries`.
    pub const fn ordering(&self) -> Ordering {
        match self {
            Self::Users => Ordering {
                columns: &["u.followers_count", "u.posts_count", "u.id"],
                direction: SortDirection::Descending,
            },
            Self::Followers => Ordering {
                columns: &["u.id"],
                direction: SortDirection::Ascending,
            },
            Self::Posts => Ordering {
                columns: &["p.views_count", "p.id"],
                direction: SortDirection::Descending,
            },
            Self::Comments => Ordering {
                columns: &["c.id"],
                direction: SortDirection::Ascending,
            },
            Self::Bookmarks => Ordering {
                columns: &["b.created_at", "b.post_id"],
                direction: SortDirection::Descending,
            },
            Self::Notifications => Ordering {
                columns: &["n.id"],
                direction: SortDirection::Descending,
            },
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cursor that belongs to one resource ordering.
///
/// `key` returns the values in the same order as `RESOURCE.ordering().columns`.
pub trait KeysetCursor: CursorValue {
    const RESOURCE: ResourceKind;

    fn key(&self) -> Vec<KeyValue>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Equals {
        column: &'static str,
        value: KeyValue,
    },
    /// Case-insensitive substring match on any of the columns.
    Search {
        columns: &'static [&'static str],
        text: String,
    },
}

impl Filter {
    pub fn equals(column: &'static str, value: impl Into<KeyValue>) -> Self {
        Self::Equals {
            column,
            value: value.into(),
        }
    }

    pub fn search(columns: &'static [&'static str], text: impl Into<String>) -> Self {
        Self::Search {
            columns,
            text: text.into(),
        }
    }

    fn is_noop(&self) -> bool {
        match self {
            Self::Search { columns, text } => columns.is_empty() || text.trim().is_empty(),
            Self::Equals { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePredicate {
    pub columns: &'static [&'static str],
    pub comparator: &'static str,
    pub values: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub resource: ResourceKind,
    pub filters: Vec<Filter>,
    pub order: Ordering,
    pub range: Option<RangePredicate>,
    pub page_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFragment {
    pub clause: String,
    pub params: Vec<KeyValue>,
}

/// Build the range query for the resource the cursor type belongs to.
///
/// The query always asks for one row beyond `page_limit` so the page assembler
/// can tell whether another page exists without a count query.
pub fn build_query<C: KeysetCursor>(
    filters: Vec<Filter>,
    cursor: Option<&C>,
    page_limit: usize,
) -> QuerySpec {
    let resource = C::RESOURCE;
    let order = resource.ordering();
    let range = cursor.map(|cursor| {
        let values = cursor.key();
        debug_assert_eq!(values.len(), order.columns.len());
        RangePredicate {
            columns: order.columns,
            comparator: order.direction.after(),
            values,
        }
    });

    QuerySpec {
        resource,
        filters: filters.into_iter().filter(|f| !f.is_noop()).collect(),
        order,
        range,
        page_limit,
    }
}

impl QuerySpec {
    pub fn fetch_limit(&self) -> usize {
        self.page_limit + 1
    }

    /// Render `WHERE … ORDER BY … LIMIT ?` with positional parameters.
    pub fn to_sql(&self) -> SqlFragment {
        let mut predicates: Vec<String> = Vec::new();
        let mut params: Vec<KeyValue> = Vec::new();

        for filter in &self.filters {
            match filter {
                Filter::Equals { column, value } => {
                    predicates.push(format!("{column} = ?"));
                    params.push(value.clone());
                }
                Filter::Search { columns, text } => {
                    let pattern = format!("%{}%", escape_like(text.trim()));
                    let alternatives: Vec<String> = columns
                        .iter()
                        .map(|column| format!("{column} LIKE ? ESCAPE '\\'"))
                        .collect();
                    predicates.push(format!("({})", alternatives.join(" OR ")));
                    params.extend(columns.iter().map(|_| KeyValue::Text(pattern.clone())));
                }
            }
        }

        if let Some(range) = &self.range {
            predicates.push(render_range(range));
            params.extend(range.values.iter().cloned());
        }

        let mut clause = String::new();
        if !predicates.is_empty() {
            clause.push_str(" WHERE ");
            clause.push_str(&predicates.join(" AND "));
        }

        let keyword = self.order.direction.keyword();
        let order_by: Vec<String> = self
            .order
            .columns
            .iter()
            .map(|column| format!("{column} {keyword}"))
            .collect();
        clause.push_str(" ORDER BY ");
        clause.push_str(&order_by.join(", "));
        clause.push_str(" LIMIT ?");
        params.push(KeyValue::Integer(self.fetch_limit() as i64));

        SqlFragment { clause, params }
    }
}

fn render_range(range: &RangePredicate) -> String {
    if range.columns.len() == 1 {
        return format!("{} {} ?", range.columns[0], range.comparator);
    }
    let placeholders = vec!["?"; range.columns.len()].join(", ");
    format!(
        "({}) {} ({placeholders})",
        range.columns.join(", "),
        range.comparator
    )
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Clamp a requested page size: anything missing or outside `[min, max]`
/// falls back to the default instead of being rejected.
pub fn normalize_limit(requested: Option<i64>, config: &PaginationConfig) -> usize {
    match requested {
        Some(value)
            if value >= config.min_limit.max(1) as i64 && value <= config.max_limit as i64 =>
        {
            value as usize
        }
        _ => config.default_limit.max(1),
    }
}
