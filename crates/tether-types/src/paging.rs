use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw `?page=&page_size=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// A normalized page request. Pages are 1-based; a page size outside
/// `1..=MAX_PAGE_SIZE` falls back to the default rather than clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub page_size: u32,
}

impl Page {
    pub fn new(page: i64, page_size: i64) -> Self {
        let page = if page < 1 { 1 } else { page.min(u32::MAX as i64) as u32 };
        let page_size = if page_size < 1 || page_size > MAX_PAGE_SIZE as i64 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size as u32
        };
        Self { page, page_size }
    }

    pub fn first(page_size: u32) -> Self {
        Self::new(1, page_size as i64)
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

impl From<PageQuery> for Page {
    fn from(q: PageQuery) -> Self {
        Self::new(q.page.unwrap_or(1), q.page_size.unwrap_or(DEFAULT_PAGE_SIZE as i64))
    }
}

/// One page of results plus the size of the full result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            items,
            total,
            page: page.page,
            page_size: page.page_size,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paged<U> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}
