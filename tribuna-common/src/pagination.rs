//! Fixed-size pagination over newest-first listings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of posts on a feed page. Fixed by configuration, not by callers.
pub const PAGE_SIZE: u32 = 10;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
#[error("page {requested} is past the last page ({last})")]
pub struct PageOutOfRange {
    pub requested: u32,
    pub last: u32,
}

/// A resolved page request: which slice of the ordered collection to fetch.
///
/// Page numbers are 1-based. A missing or zero page number means page 1.
/// Page 1 always exists, even for an empty collection; any page past the
/// last one is an error the view layer maps to "not found".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageBounds {
    number: u32,
    total_pages: u32,
}

impl PageBounds {
    pub fn new(requested: Option<u32>, total_items: u64) -> Result<Self, PageOutOfRange> {
        let number = requested.filter(|&page| page >= 1).unwrap_or(1);
        let total_pages = u32::try_from(total_items.div_ceil(u64::from(PAGE_SIZE)))
            .unwrap_or(u32::MAX)
            .max(1);

        if number > total_pages {
            return Err(PageOutOfRange {
                requested: number,
                last: total_pages,
            });
        }

        Ok(Self {
            number,
            total_pages,
        })
    }

    #[must_use]
    pub fn number(self) -> u32 {
        self.number
    }

    #[must_use]
    pub fn total_pages(self) -> u32 {
        self.total_pages
    }

    #[must_use]
    pub fn limit(self) -> i64 {
        i64::from(PAGE_SIZE)
    }

    #[must_use]
    pub fn offset(self) -> i64 {
        i64::from(self.number - 1) * i64::from(PAGE_SIZE)
    }

    /// Wrap the fetched slice into the serialized page envelope.
    #[must_use]
    pub fn page<T>(self, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: self.number,
            total_pages: self.total_pages,
        }
    }
}

/// One page of an ordered listing, as serialized to clients.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u32,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirteen_items_make_two_pages() {
        let first = PageBounds::new(Some(1), 13).unwrap();
        assert_eq!(first.offset(), 0);
        assert_eq!(first.limit(), 10);
        assert_eq!(first.total_pages(), 2);

        let second = PageBounds::new(Some(2), 13).unwrap();
        assert_eq!(second.offset(), 10);

        assert_eq!(
            PageBounds::new(Some(3), 13),
            Err(PageOutOfRange {
                requested: 3,
                last: 2
            })
        );
    }

    #[test]
    fn page_one_of_empty_collection_is_empty_not_an_error() {
        let bounds = PageBounds::new(Some(1), 0).unwrap();
        assert_eq!(bounds.total_pages(), 1);

        let page = bounds.page(Vec::<()>::new());
        assert!(page.items.is_empty());
    }

    #[test]
    fn missing_or_zero_page_defaults_to_one() {
        assert_eq!(PageBounds::new(None, 25).unwrap().number(), 1);
        assert_eq!(PageBounds::new(Some(0), 25).unwrap().number(), 1);
    }

    #[test]
    fn exact_multiple_has_no_trailing_page() {
        assert!(PageBounds::new(Some(2), 20).is_ok());
        assert!(PageBounds::new(Some(3), 20).is_err());
    }
}
