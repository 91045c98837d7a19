//! Page-number pagination shared by every post listing.
//!
//! Pages are 1-based. A request outside `1..=total_pages` is not an error: it
//! yields an empty page that still carries the listing's totals.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Posts per page used when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest offset a window may carry; SQL stores take signed 64-bit offsets.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// SQL-style window into an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: u64,
    pub offset: u64,
}

/// Requested page number as received from the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber(i64);

impl PageNumber {
    pub const FIRST: PageNumber = PageNumber(1);

    pub fn new(number: i64) -> Self {
        Self(number)
    }

    /// Parse a `?page=` value. Missing or non-numeric input selects the first page.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|value| value.trim().parse::<i64>().ok())
            .map(Self)
            .unwrap_or(Self::FIRST)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

/// Query string carrying an optional page number.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<String>,
}

impl PageQuery {
    pub fn number(&self) -> PageNumber {
        PageNumber::parse(self.page.as_deref())
    }
}

/// One page of an ordered listing plus navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: i64,
    pub total_pages: u64,
    pub total_count: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_number(&self) -> Option<i64> {
        self.has_next.then(|| self.number + 1)
    }

    pub fn prev_number(&self) -> Option<i64> {
        self.has_prev.then(|| self.number - 1)
    }

}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    page_size: NonZeroU32,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(NonZeroU32::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroU32::MIN))
    }
}

impl Paginator {
    pub fn new(page_size: NonZeroU32) -> Self {
        Self { page_size }
    }

    pub fn page_size(&self) -> u64 {
        u64::from(self.page_size.get())
    }

    /// `ceil(total / page_size)`; zero items means zero pages.
    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.page_size())
    }

    /// Window covering `[(n-1)*size, n*size)`, or `None` for pages below 1
    /// and for pages whose offset exceeds [`MAX_OFFSET`].
    ///
    /// Pages past the end still produce a window; the store answers it with
    /// no rows, which keeps the count and the slice in one round trip.
    pub fn window(&self, number: PageNumber) -> Option<LimitOffset> {
        let number = u64::try_from(number.get()).ok().filter(|n| *n >= 1)?;
        let offset = (number - 1)
            .checked_mul(self.page_size())
            .filter(|offset| *offset <= MAX_OFFSET)?;
        Some(LimitOffset {
            limit: self.page_size(),
            offset,
        })
    }

    /// Assemble a page from rows already fetched for `number` and the listing total.
    pub fn page<T>(&self, items: Vec<T>, total: u64, number: PageNumber) -> Page<T> {
        let total_pages = self.total_pages(total);
        let number = number.get();
        let in_range = |n: i64| u64::try_from(n).is_ok_and(|n| n >= 1 && n <= total_pages);
        let items = if in_range(number) { items } else { Vec::new() };

        Page {
            items,
            number,
            total_pages,
            total_count: total,
            has_next: number.checked_add(1).is_some_and(in_range),
            has_prev: number.checked_sub(1).is_some_and(in_range),
        }
    }

    /// Slice an in-memory ordered sequence.
    pub fn slice<T: Clone>(&self, all: &[T], number: PageNumber) -> Page<T> {
        let total = all.len() as u64;
        let items = match self.window(number) {
            Some(window) => all
                .iter()
                .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        self.page(items, total, number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paginator(size: u32) -> Paginator {
        Paginator::new(NonZeroU32::new(size).expect("non-zero"))
    }

    #[test]
    fn thirteen_items_split_into_ten_and_three() {
        let items: Vec<u32> = (0..13).collect();
        let p = paginator(10);

        let first = p.slice(&items, PageNumber::new(1));
        assert_eq!(first.items.len(), 10);
        assert!(first.has_next);
        assert!(!first.has_prev);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.total_count, 13);

        let second = p.slice(&items, PageNumber::new(2));
        assert_eq!(second.items, vec![10, 11, 12]);
        assert!(!second.has_next);
        assert!(second.has_prev);

        let third = p.slice(&items, PageNumber::new(3));
        assert!(third.is_empty());
        assert!(!third.has_next);
        assert!(third.has_prev);
        assert_eq!(third.total_count, 13);
    }

    #[test]
    fn exact_multiple_has_no_extra_page() {
        let items: Vec<u32> = (0..10).collect();
        let p = paginator(10);

        assert_eq!(p.total_pages(10), 1);
        let second = p.slice(&items, PageNumber::new(2));
        assert!(second.is_empty());
        assert!(!second.has_next);
        assert_eq!(second.total_pages, 1);
    }

    #[test]
    fn page_count_is_ceiling_for_many_sizes() {
        for size in 1..=12u32 {
            let p = paginator(size);
            for total in 0..=40u64 {
                let expected = (total + u64::from(size) - 1) / u64::from(size);
                assert_eq!(p.total_pages(total), expected, "size={size} total={total}");

                let beyond = PageNumber::new(expected as i64 + 1);
                let items: Vec<u64> = (0..total).collect();
                let page = p.slice(&items, beyond);
                assert!(page.is_empty());
                assert!(!page.has_next);
            }
        }
    }

    #[test]
    fn empty_listing_has_zero_pages() {
        let p = paginator(10);
        let page = p.slice::<u32>(&[], PageNumber::new(1));
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.total_count, 0);
        assert!(page.is_empty());
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn pages_below_one_are_empty_but_valid() {
        let items: Vec<u32> = (0..5).collect();
        let p = paginator(2);

        assert_eq!(p.window(PageNumber::new(0)), None);
        let zero = p.slice(&items, PageNumber::new(0));
        assert!(zero.is_empty());
        assert_eq!(zero.total_count, 5);
        assert!(zero.has_next);
        assert!(!zero.has_prev);

        let negative = p.slice(&items, PageNumber::new(-4));
        assert!(negative.is_empty());
        assert!(!negative.has_next);
    }

    #[test]
    fn window_matches_page_bounds() {
        let p = paginator(10);
        assert_eq!(
            p.window(PageNumber::new(3)),
            Some(LimitOffset {
                limit: 10,
                offset: 20
            })
        );
    }

    #[test]
    fn huge_page_numbers_have_no_window_but_keep_totals() {
        let p = paginator(10);
        assert_eq!(p.window(PageNumber::new(1_000_000_000_000_000_000)), None);
        assert_eq!(p.window(PageNumber::new(i64::MAX)), None);

        let last = (MAX_OFFSET / 10 + 1) as i64;
        let window = p.window(PageNumber::new(last)).expect("largest window");
        assert!(window.offset <= MAX_OFFSET);

        let items: Vec<u32> = (0..13).collect();
        let page = p.slice(&items, PageNumber::new(1_000_000_000_000_000_000));
        assert!(page.is_empty());
        assert_eq!(page.total_count, 13);
        assert_eq!(page.total_pages, 2);
        assert!(!page.has_next);
        assert!(!page.has_prev);
    }

    #[test]
    fn page_number_parsing_defaults_to_first() {
        assert_eq!(PageNumber::parse(None), PageNumber::FIRST);
        assert_eq!(PageNumber::parse(Some("abc")), PageNumber::FIRST);
        assert_eq!(PageNumber::parse(Some(" 2 ")), PageNumber::new(2));
        assert_eq!(PageNumber::parse(Some("-1")), PageNumber::new(-1));
    }
}
