//! Cursor-based pagination `(createdAt, limit)`.

use chrono::{DateTime, Utc};

use super::StoreError;

/// A page request: entities created strictly after `after` (or the beginning,
/// when `None`), up to `limit` entries.
///
/// Invariant: `limit <= 0` is `ErrUnprocessable`, enforced by [`Cursor::new`].
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    pub after: Option<DateTime<Utc>>,
    pub limit: i64,
}

impl Cursor {
    pub fn new(after: Option<DateTime<Utc>>, limit: i64) -> Result<Self, StoreError> {
        if limit <= 0 {
            return Err(StoreError::InvalidPagination(format!("limit must be > 0, got {limit}")));
        }
        Ok(Self { after, limit })
    }
}

/// One page of results plus the cursor to request the next page, if any.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}
