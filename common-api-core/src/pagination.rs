//! Pagination metadata attached to list responses.

use serde::{Deserialize, Serialize};

/// Something that knows the total number of results of a listing.
pub trait Paginator {
    fn count(&self) -> u64;
}

/// A page of results that knows its neighbours.
///
/// `next_page_number` / `previous_page_number` are only consulted when the
/// corresponding `has_*` query returns `true`.
pub trait PageCursor {
    fn has_next(&self) -> bool;
    fn next_page_number(&self) -> u64;
    fn has_previous(&self) -> bool;
    fn previous_page_number(&self) -> u64;
}

/// Wire shape of the `pagination` envelope key.
///
/// Keys for cursors that were not supplied are omitted, not zeroed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_results: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_next_page: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_previous_page: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_page_number: Option<u64>,
}

impl Pagination {
    /// Build pagination from an optional total and optional cursors.
    pub fn from_cursors(
        total_results: Option<u64>,
        next_page: Option<&dyn PageCursor>,
        previous_page: Option<&dyn PageCursor>,
    ) -> Self {
        let mut pagination = Pagination {
            total_results,
            ..Default::default()
        };

        if let Some(page) = next_page {
            let has_next = page.has_next();
            pagination.has_next_page = Some(has_next);
            if has_next {
                pagination.next_page_number = Some(page.next_page_number());
            }
        }

        if let Some(page) = previous_page {
            let has_previous = page.has_previous();
            pagination.has_previous_page = Some(has_previous);
            if has_previous {
                pagination.previous_page_number = Some(page.previous_page_number());
            }
        }

        pagination
    }
}

/// A 1-based page within `num_pages` pages.
///
/// Ready-made [`PageCursor`] for callers that paginate by hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    number: u64,
    num_pages: u64,
}

impl Page {
    /// Create a page. `number` is clamped into `1..=num_pages` (with at least one page).
    pub fn new(number: u64, num_pages: u64) -> Self {
        let num_pages = num_pages.max(1);
        Self {
            number: number.clamp(1, num_pages),
            num_pages,
        }
    }

    /// Page containing `total` results split into pages of `per_page`.
    pub fn for_results(number: u64, total: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        Self::new(number, total.div_ceil(per_page))
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn num_pages(&self) -> u64 {
        self.num_pages
    }
}

impl PageCursor for Page {
    fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    fn next_page_number(&self) -> u64 {
        self.number + 1
    }

    fn has_previous(&self) -> bool {
        self.number > 1
    }

    fn previous_page_number(&self) -> u64 {
        self.number - 1
    }
}

impl Paginator for u64 {
    fn count(&self) -> u64 {
        *self
    }
}
