//! Pagination support for list queries
//!
//! Pages are 0-indexed and page sizes are capped to keep queries bounded.

use serde::{Deserialize, Serialize};

/// Default page size for list queries
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Maximum allowed page size
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    /// Page number (0-indexed)
    pub page: u32,
    /// Number of items per page
    pub size: u32,
}

impl PageParams {
    /// Create pagination parameters, clamping the page size into `1..=MAX_PAGE_SIZE`
    ///
    /// # Examples
    /// ```
    /// use spacemarine_core::models::PageParams;
    ///
    /// let params = PageParams::new(None, None);
    /// assert_eq!(params.page, 0);
    /// assert_eq!(params.size, 20);
    ///
    /// let params = PageParams::new(Some(2), Some(500));
    /// assert_eq!(params.size, 100);
    /// assert_eq!(params.offset(), 200);
    /// ```
    #[must_use]
    pub fn new(page: Option<u32>, size: Option<u32>) -> Self {
        let page = page.unwrap_or(0);
        let size = size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Self { page, size }
    }

    /// OFFSET for the SQL query
    #[must_use]
    pub const fn offset(&self) -> i64 {
        self.page as i64 * self.size as i64
    }

    /// LIMIT for the SQL query
    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.size as i64
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One page of results with totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_elements: u64,
    pub total_pages: u32,
    /// Current page (0-indexed)
    pub number: u32,
    pub size: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(content: Vec<T>, total_elements: u64, params: PageParams) -> Self {
        let size = u64::from(params.size);
        let total_pages = u32::try_from(total_elements.div_ceil(size)).unwrap_or(u32::MAX);

        Self {
            content,
            total_elements,
            total_pages,
            number: params.page,
            size: params.size,
        }
    }

    /// Map the items while keeping the paging metadata
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            number: self.number,
            size: self.size,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_clamp() {
        assert_eq!(PageParams::new(None, Some(0)).size, 1);
        assert_eq!(PageParams::new(None, Some(MAX_PAGE_SIZE + 1)).size, MAX_PAGE_SIZE);
        assert_eq!(PageParams::new(Some(3), Some(10)).offset(), 30);
        assert_eq!(PageParams::new(Some(3), Some(10)).limit(), 10);
    }

    #[test]
    fn test_page_totals() {
        let params = PageParams::new(Some(0), Some(20));
        assert_eq!(Page::new(vec![1, 2, 3], 45, params).total_pages, 3);
        assert_eq!(Page::new(Vec::<i32>::new(), 0, params).total_pages, 0);
        assert_eq!(Page::new(vec![1], 20, params).total_pages, 1);
    }

    #[test]
    fn test_page_serializes_camel_case() {
        let page = Page::new(vec!["a"], 1, PageParams::default());
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalElements"], 1);
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["number"], 0);
        assert_eq!(json["content"][0], "a");
    }

    #[test]
    fn test_page_map() {
        let page = Page::new(vec![1, 2], 2, PageParams::default()).map(|n| n * 10);
        assert_eq!(page.content, vec![10, 20]);
        assert_eq!(page.total_elements, 2);
    }
}
