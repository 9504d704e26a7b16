//! Cursor pagination over Sophos Central listing endpoints.
//!
//! Listing responses look like:
//!
//! ```json
//! { "items": [ ... ], "pages": { "size": 50, "total": 3, "nextKey": "..." } }
//! ```
//!
//! `nextKey` is the only signal that more data exists. Totals are advisory
//! and frequently absent, so the paginator never looks at them.
//!
//! A [`Paginator`] is built from a page-fetch closure supplied by the
//! resource module. The closure knows the resource path and how to merge a
//! cursor into its query parameters; the paginator only tracks the cursor
//! between calls. Pages are fetched strictly one after another: page N+1 is
//! not requested until page N has been consumed.

use futures_util::Stream;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SophosError};
use crate::query::MAX_PAGE_SIZE;

// ── Page types ─────────────────────────────────────────────────────────

/// The `pages` object of a listing response. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Page number, for endpoints that report it.
    #[serde(default)]
    pub current: Option<u64>,
    /// Page size the server applied.
    #[serde(default)]
    pub size: Option<u64>,
    /// Total page count, when known.
    #[serde(default)]
    pub total: Option<u64>,
    /// Total item count, when known.
    #[serde(default)]
    pub items: Option<u64>,
    /// Cursor this page was fetched from.
    #[serde(default)]
    pub from_key: Option<String>,
    /// Cursor for the next page; absent on the last page.
    #[serde(default)]
    pub next_key: Option<String>,
    /// Largest page size the endpoint accepts.
    #[serde(default)]
    pub max_size: Option<u64>,
}

impl PageInfo {
    /// The next cursor, treating an empty string as absent.
    pub fn next_cursor(&self) -> Option<&str> {
        self.next_key.as_deref().filter(|k| !k.is_empty())
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in server order.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Pagination metadata.
    #[serde(default)]
    pub pages: PageInfo,
}

impl<T> Page<T> {
    /// Builds a page by hand (tests and in-memory fetchers).
    pub fn new(items: Vec<T>, next_key: Option<&str>) -> Self {
        Page {
            pages: PageInfo {
                size: Some(items.len() as u64),
                next_key: next_key.map(str::to_string),
                ..PageInfo::default()
            },
            items,
        }
    }

    /// The cursor for the following page, if any.
    pub fn next_cursor(&self) -> Option<&str> {
        self.pages.next_cursor()
    }

    /// True when a following page exists.
    pub fn has_more(&self) -> bool {
        self.next_cursor().is_some()
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when this page carries no items. Not an end-of-stream signal.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ── Paginator ──────────────────────────────────────────────────────────

/// Future returned by a page-fetch closure.
pub type PageFuture<'a, T> = BoxFuture<'a, Result<Page<T>>>;

type FetchFn<'a, T> = Box<dyn FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a>;

/// Drives a page-fetch closure until the server stops returning a cursor.
///
/// Invariants:
/// - The cursor belongs to the paginator for one iteration session. Both
///   streams borrow `&mut self`, so two sessions cannot interleave.
/// - Once the last page (or `max_pages`) is reached, or a fetch fails, the
///   session is over: further iteration yields nothing until `reset()`.
/// - Items are yielded exactly in server order; nothing is reordered,
///   deduplicated, or dropped.
/// - `max_items` caps what `items()` and `collect_all` hand out per session.
///   It never changes the page size sent to the server.
pub struct Paginator<'a, T> {
    fetch: FetchFn<'a, T>,
    page_size: u32,
    max_pages: Option<usize>,
    max_items: Option<usize>,
    cursor: Option<String>,
    exhausted: bool,
    pages_fetched: usize,
    items_fetched: usize,
}

impl<'a, T> Paginator<'a, T> {
    /// Creates a paginator. `page_size` must be within 1–1000.
    pub fn new<F>(fetch: F, page_size: u32, max_pages: Option<usize>) -> Result<Self>
    where
        F: FnMut(Option<String>) -> PageFuture<'a, T> + Send + 'a,
    {
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(SophosError::validation(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }
        Ok(Paginator {
            fetch: Box::new(fetch),
            page_size,
            max_pages,
            max_items: None,
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
            items_fetched: 0,
        })
    }

    /// Page size this paginator was configured with.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Page cap, if any.
    pub fn max_pages(&self) -> Option<usize> {
        self.max_pages
    }

    /// Caps the items handed out per session. `Query::limit` ends up here.
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    /// Item cap, if any.
    pub fn max_items(&self) -> Option<usize> {
        self.max_items
    }

    /// The tighter of the configured cap and a per-call one.
    fn item_cap(&self, requested: Option<usize>) -> Option<usize> {
        match (self.max_items, requested) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Pages fetched in the current session.
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Items fetched in the current session.
    pub fn items_fetched(&self) -> usize {
        self.items_fetched
    }

    /// True once the current session has ended.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Discards cursor state so the next iteration starts from the first
    /// page. Already-yielded pages are unaffected.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.exhausted = false;
        self.pages_fetched = 0;
        self.items_fetched = 0;
    }

    /// Fetches the next page of the session, or `None` once it has ended.
    ///
    /// This is the single step both streams and the blocking iterators are
    /// built on.
    pub async fn next_page(&mut self) -> Result<Option<Page<T>>> {
        if self.exhausted {
            return Ok(None);
        }
        if self.max_pages.is_some_and(|max| self.pages_fetched >= max) {
            debug!(pages = self.pages_fetched, "Page cap reached");
            self.exhausted = true;
            return Ok(None);
        }

        let page = match (self.fetch)(self.cursor.clone()).await {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        self.pages_fetched += 1;
        self.items_fetched += page.items.len();
        match page.next_cursor() {
            Some(next) => self.cursor = Some(next.to_string()),
            None => {
                self.cursor = None;
                self.exhausted = true;
            }
        }
        debug!(
            page = self.pages_fetched,
            items = page.items.len(),
            more = !self.exhausted,
            "Fetched page"
        );
        Ok(Some(page))
    }

    /// Lazily yields pages. Each page is requested only when polled.
    pub fn pages(&mut self) -> impl Stream<Item = Result<Page<T>>> + '_ {
        async_stream::try_stream! {
            while let Some(page) = self.next_page().await? {
                yield page;
            }
        }
    }

    /// Lazily yields items across pages, in server order, up to the
    /// configured item cap. No page is fetched once the cap is reached.
    pub fn items(&mut self) -> impl Stream<Item = Result<T>> + '_ {
        let cap = self.max_items;
        async_stream::try_stream! {
            let mut yielded = 0usize;
            'pages: while cap.is_none_or(|max| yielded < max) {
                let Some(page) = self.next_page().await? else {
                    break;
                };
                for item in page.items {
                    yield item;
                    yielded += 1;
                    if cap.is_some_and(|max| yielded >= max) {
                        break 'pages;
                    }
                }
            }
        }
    }

    /// Drains the remaining items of the session, stopping as soon as
    /// `max_items` have been collected. `None` falls back to the configured
    /// cap; when both are set the smaller wins. A partially consumed page is
    /// truncated; no further page is fetched.
    pub async fn collect_all(&mut self, max_items: Option<usize>) -> Result<Vec<T>> {
        let max_items = self.item_cap(max_items);
        let mut out = Vec::new();
        if max_items == Some(0) {
            return Ok(out);
        }
        while let Some(page) = self.next_page().await? {
            for item in page.items {
                out.push(item);
                if max_items.is_some_and(|max| out.len() >= max) {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }

    /// Fetches the first page directly. Does not touch session state.
    pub async fn fetch_first_page(&mut self) -> Result<Page<T>> {
        (self.fetch)(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_deserializes_sophos_shape() {
        let json = r#"{
            "items": [1, 2, 3],
            "pages": {"fromKey": "a", "nextKey": "b", "size": 3, "maxSize": 500}
        }"#;
        let page: Page<u32> = serde_json::from_str(json).unwrap();
        assert_eq!(page.items, vec![1, 2, 3]);
        assert_eq!(page.next_cursor(), Some("b"));
        assert_eq!(page.pages.max_size, Some(500));
        assert!(page.pages.total.is_none(), "totals are optional");
    }

    #[test]
    fn empty_next_key_means_last_page() {
        let json = r#"{"items": [], "pages": {"nextKey": ""}}"#;
        let page: Page<u32> = serde_json::from_str(json).unwrap();
        assert!(!page.has_more());
    }

    #[test]
    fn missing_pages_object_is_last_page() {
        let page: Page<u32> = serde_json::from_str(r#"{"items": [7]}"#).unwrap();
        assert_eq!(page.len(), 1);
        assert!(!page.has_more());
    }

    #[test]
    fn page_size_is_validated() {
        let fetch = |_: Option<String>| -> PageFuture<'static, u32> {
            Box::pin(async { Ok(Page::new(vec![], None)) })
        };
        assert!(Paginator::new(fetch, 0, None).is_err());
        assert!(Paginator::new(fetch, 1001, None).is_err());
        assert!(Paginator::new(fetch, 1000, None).is_ok());
    }
}
