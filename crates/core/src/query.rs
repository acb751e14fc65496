//! Paginated query results.

use serde::{Deserialize, Serialize};

/// Default page size when the caller does not pick one.
pub const DEFAULT_ITEMS_PER_PAGE: u64 = 10;

/// Uniform shape of every paginated query, independent of entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult<T> {
    pub results: Vec<T>,
    /// Total matches across all pages.
    pub number_of_items: u64,
    /// Zero-based.
    pub page: u64,
    pub items_per_page: u64,
}

impl<T> QueryResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> QueryResult<U> {
        QueryResult {
            results: self.results.into_iter().map(f).collect(),
            number_of_items: self.number_of_items,
            page: self.page,
            items_per_page: self.items_per_page,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<QueryResult<U>, E> {
        Ok(QueryResult {
            results: self.results.into_iter().map(f).collect::<Result<_, _>>()?,
            number_of_items: self.number_of_items,
            page: self.page,
            items_per_page: self.items_per_page,
        })
    }

    /// Whether pages after this one exist.
    pub fn has_more(&self) -> bool {
        (self.page + 1).saturating_mul(self.items_per_page) < self.number_of_items
    }
}

/// A requested page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub page: u64,
    pub items_per_page: u64,
}

/// A page whose start offset falls past the last matching item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageOutOfRange {
    pub page: u64,
    pub max_page: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 0,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
        }
    }
}

impl Page {
    pub fn new(page: u64, items_per_page: u64) -> Self {
        Self {
            page,
            items_per_page,
        }
    }

    pub fn skip(&self) -> u64 {
        self.items_per_page.saturating_mul(self.page)
    }

    /// Highest zero-based page holding at least one of `count` items.
    pub fn max_page(&self, count: u64) -> u64 {
        if count == 0 || self.items_per_page == 0 {
            0
        } else {
            (count - 1) / self.items_per_page
        }
    }

    /// Start offset for this page over `count` items.
    ///
    /// Fails when the page starts past `count`. A page starting exactly at
    /// `count` is in range and simply comes back empty.
    pub fn offset_within(&self, count: u64) -> Result<u64, PageOutOfRange> {
        let skip = self.skip();
        if skip > count {
            return Err(PageOutOfRange {
                page: self.page,
                max_page: self.max_page(count),
            });
        }
        Ok(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_of_small_collection() {
        assert_eq!(Page::new(0, 10).offset_within(2), Ok(0));
    }

    #[test]
    fn page_past_the_end_reports_max_page() {
        assert_eq!(
            Page::new(1, 10).offset_within(2),
            Err(PageOutOfRange {
                page: 1,
                max_page: 0
            })
        );
        assert_eq!(Page::new(3, 5).offset_within(12).unwrap_err().max_page, 2);
    }

    #[test]
    fn offset_equal_to_count_is_still_in_range() {
        assert_eq!(Page::new(1, 10).offset_within(10), Ok(10));
        assert!(Page::new(1, 10).offset_within(9).is_err());
    }

    #[test]
    fn huge_page_numbers_saturate() {
        assert!(Page::new(u64::MAX, 10).offset_within(100).is_err());
    }

    #[test]
    fn result_serializes_with_camel_case_keys() {
        let result = QueryResult {
            results: vec![1, 2],
            number_of_items: 2,
            page: 0,
            items_per_page: 10,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["numberOfItems"], 2);
        assert_eq!(json["itemsPerPage"], 10);
        assert!(!result.has_more());
    }
}
