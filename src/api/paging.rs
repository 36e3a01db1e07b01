//! Paged list envelope returned by the search routes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::store::{Page, PageRequest};

pub const DEFAULT_LIMIT: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pages {
    pub current: u64,
    pub prev: u64,
    pub has_prev: bool,
    pub next: u64,
    pub has_next: bool,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Items {
    pub limit: u64,
    pub begin: u64,
    pub end: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub pages: Pages,
    pub items: Items,
}

impl<T> Paged<T> {
    /// `next` and `prev` are 0 when there is no such page.
    #[must_use]
    pub fn new(page: Page<T>, request: PageRequest) -> Self {
        let limit = request.limit.max(1);
        let total = page.total;
        let pages_total = total.div_ceil(limit);
        let current = request.page.max(1);
        let has_prev = current > 1;
        let has_next = current < pages_total;

        Self {
            data: page.items,
            pages: Pages {
                current,
                prev: if has_prev { current - 1 } else { 0 },
                has_prev,
                next: if has_next { current + 1 } else { 0 },
                has_next,
                total: pages_total,
            },
            items: Items {
                limit,
                begin: request.offset().saturating_add(1).min(total),
                end: current.saturating_mul(limit).min(total),
                total,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged(total: u64, page: u64, limit: u64) -> Paged<u64> {
        Paged::new(
            Page {
                items: Vec::new(),
                total,
            },
            PageRequest { page, limit },
        )
    }

    #[test]
    fn first_of_several_pages() {
        let paged = paged(45, 1, 20);
        assert_eq!(
            paged.pages,
            Pages {
                current: 1,
                prev: 0,
                has_prev: false,
                next: 2,
                has_next: true,
                total: 3,
            }
        );
        assert_eq!(
            paged.items,
            Items {
                limit: 20,
                begin: 1,
                end: 20,
                total: 45,
            }
        );
    }

    #[test]
    fn last_partial_page() {
        let paged = paged(45, 3, 20);
        assert_eq!(paged.pages.prev, 2);
        assert!(!paged.pages.has_next);
        assert_eq!(paged.pages.next, 0);
        assert_eq!(paged.items.begin, 41);
        assert_eq!(paged.items.end, 45);
    }

    #[test]
    fn empty_result() {
        let paged = paged(0, 1, 20);
        assert_eq!(paged.pages.total, 0);
        assert!(!paged.pages.has_next);
        assert_eq!(paged.items.begin, 0);
        assert_eq!(paged.items.end, 0);
    }

    #[test]
    fn page_past_the_end() {
        let paged = paged(5, 4, 2);
        assert_eq!(paged.pages.total, 3);
        assert!(paged.pages.has_prev);
        assert_eq!(paged.pages.prev, 3);
        assert_eq!(paged.items.begin, 5);
        assert_eq!(paged.items.end, 5);
    }
}
