//! Pagination envelope and `find` result shaping.
//!
//! `find` resolves to a [`FindResult`]: a bare list when pagination is off
//! for the call, or a [`Page`] envelope otherwise. The Rust type is tagged;
//! the serialized form is structural (an array, or an object with `total`,
//! `limit`, `skip` and `data`) so transports keep the conventional wire shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A bounded slice of a result set with its position metadata.
///
/// Invariant: `data.len() <= limit` and `skip + data.len() <= total`. A
/// requested offset past the end of the result set is clamped to `total`, so
/// `skip` always reports the offset actually applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T = Value> {
    /// Number of candidates irrespective of `limit`/`skip`.
    pub total: usize,
    /// Page size applied.
    pub limit: usize,
    /// Offset applied.
    pub skip: usize,
    /// The returned slice.
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Cuts a page out of the full candidate list.
    #[must_use]
    pub fn from_items(items: Vec<T>, skip: usize, limit: usize) -> Self {
        let total = items.len();
        let skip = skip.min(total);
        let data = items.into_iter().skip(skip).take(limit).collect();
        Self {
            total,
            limit,
            skip,
            data,
        }
    }

    /// Whether records remain after this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.skip + self.data.len() < self.total
    }

    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            limit: self.limit,
            skip: self.skip,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

/// Result of a `find` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindResult<T = Value> {
    /// Paginated envelope.
    Page(Page<T>),
    /// Bare list (pagination disabled).
    List(Vec<T>),
}

impl<T> FindResult<T> {
    #[must_use]
    pub fn is_paginated(&self) -> bool {
        matches!(self, Self::Page(_))
    }

    /// The records carried by this result, whatever its shape.
    #[must_use]
    pub fn data(&self) -> &[T] {
        match self {
            Self::Page(page) => &page.data,
            Self::List(items) => items,
        }
    }

    /// Consumes the result, discarding pagination metadata.
    #[must_use]
    pub fn into_data(self) -> Vec<T> {
        match self {
            Self::Page(page) => page.data,
            Self::List(items) => items,
        }
    }

    #[must_use]
    pub fn as_page(&self) -> Option<&Page<T>> {
        match self {
            Self::Page(page) => Some(page),
            Self::List(_) => None,
        }
    }
}

impl<T> From<Page<T>> for FindResult<T> {
    fn from(page: Page<T>) -> Self {
        Self::Page(page)
    }
}

impl<T> From<Vec<T>> for FindResult<T> {
    fn from(items: Vec<T>) -> Self {
        Self::List(items)
    }
}
