//! Common page envelope for every feed
//!
//! Each upstream describes pagination differently: numbered pages with
//! string totals, numbered pages with a fixed page size, opaque cursors with
//! no total, or a full collection served from the file cache. Clients reduce
//! their metadata to an [`UpstreamEnvelope`], and [`normalize`] turns that
//! into the one [`PageEnvelope`] shape callers consume.

use serde::{Deserialize, Serialize};

/// Page size substituted when a caller asks for zero items per page
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Whether an upstream envelope holds one page or the whole collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Items are exactly the page the upstream returned for the request
    Page,
    /// Items are the entire collection and are sliced locally
    Full,
}

/// Pagination facts extracted from one upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamEnvelope<T> {
    pub items: Vec<T>,
    pub window: Window,
    /// Total number of records across all pages, when the upstream says
    pub total: Option<u64>,
    /// Page size the upstream actually used, when it dictates one
    pub page_size: Option<u32>,
    /// Opaque cursor for the following page
    pub next_token: Option<String>,
    /// Opaque cursor for the preceding page
    pub prev_token: Option<String>,
}

impl<T> UpstreamEnvelope<T> {
    /// A single page of results with no metadata yet
    pub fn page(items: Vec<T>) -> Self {
        Self {
            items,
            window: Window::Page,
            total: None,
            page_size: None,
            next_token: None,
            prev_token: None,
        }
    }

    /// A complete collection to be paginated locally
    pub fn full(items: Vec<T>) -> Self {
        Self {
            window: Window::Full,
            ..Self::page(items)
        }
    }

    pub fn with_total(mut self, total: Option<u64>) -> Self {
        self.total = total;
        self
    }

    pub fn with_page_size(mut self, page_size: Option<u32>) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_tokens(mut self, next: Option<String>, prev: Option<String>) -> Self {
        self.next_token = next;
        self.prev_token = prev;
        self
    }
}

/// Uniform page returned to callers
///
/// `total_pages == ceil(total / page_size)` and `items.len() <= page_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageEnvelope<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_page_token: Option<String>,
}

impl<T> PageEnvelope<T> {
    /// An empty page for the given request
    pub fn empty(page: u32, page_size: u32) -> Self {
        normalize(UpstreamEnvelope::full(Vec::new()), page, page_size)
    }
}

/// Page number clamped to at least 1
pub fn clamp_page(page: u32) -> u32 {
    page.max(1)
}

/// Page size with zero replaced by [`DEFAULT_PAGE_SIZE`]
pub fn clamp_page_size(page_size: u32) -> u32 {
    if page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size
    }
}

/// Converts an upstream envelope into a [`PageEnvelope`]
///
/// An upstream-dictated page size wins over the requested one. When the
/// upstream gives no total, it is derived from the items seen so far. A page
/// past the last one yields no items but the other fields stay accurate.
pub fn normalize<T>(upstream: UpstreamEnvelope<T>, page: u32, page_size: u32) -> PageEnvelope<T> {
    let page = clamp_page(page);
    let page_size = clamp_page_size(upstream.page_size.unwrap_or(page_size));
    let size = page_size as u64;
    let offset = (page as u64 - 1) * size;

    let UpstreamEnvelope {
        mut items,
        window,
        total,
        next_token,
        prev_token,
        ..
    } = upstream;

    let total = match (total, window) {
        (Some(total), _) => total,
        (None, Window::Full) => items.len() as u64,
        (None, Window::Page) => offset + (items.len() as u64).min(size),
    };
    let total_pages = total.div_ceil(size);

    let items = if page as u64 > total_pages {
        Vec::new()
    } else {
        match window {
            Window::Page => {
                items.truncate(page_size as usize);
                items
            }
            Window::Full => items
                .into_iter()
                .skip(offset as usize)
                .take(page_size as usize)
                .collect(),
        }
    };

    PageEnvelope {
        items,
        page,
        page_size,
        total,
        total_pages,
        next_page_token: next_token,
        prev_page_token: prev_token,
    }
}
