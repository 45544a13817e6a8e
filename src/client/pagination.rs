//! Opaque pagination cursors
//!
//! The server advertises further pages through a `Link` response header:
//!
//! ```text
//! Link: <https://host/api/v1/timelines/home?max_id=103206>; rel="next",
//!       <https://host/api/v1/timelines/home?min_id=103372>; rel="prev"
//! ```
//!
//! A [`PageCursor`] captures the paging query parameters of one such link as
//! an opaque token; callers never inspect it, only hand it back through
//! [`RequestRange::Cursor`] to fetch the adjacent page.

use url::Url;

/// Query parameters the server uses to address a page.
const PAGING_KEYS: [&str; 4] = ["max_id", "since_id", "min_id", "limit"];

/// Opaque token addressing one page of a paged endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    params: Vec<(String, String)>,
}

impl PageCursor {
    /// Extract the paging parameters of a `Link` target URL. Returns `None`
    /// when the URL carries no paging parameters at all.
    fn from_url(url: &Url) -> Option<Self> {
        let params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| PAGING_KEYS.contains(&key.as_ref()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        if params.is_empty() {
            None
        } else {
            Some(Self { params })
        }
    }

    pub(crate) fn apply(&self, query: &mut Vec<(String, String)>) {
        query.extend(self.params.iter().cloned());
    }
}

/// Range parameter of a paged fetch: the first page, or a page addressed by
/// a previously returned cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestRange {
    #[default]
    Default,
    Cursor(PageCursor),
}

/// Cursors to the neighboring pages of a response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pagination {
    pub next: Option<PageCursor>,
    pub previous: Option<PageCursor>,
}

impl Pagination {
    /// Parse a `Link` header value. Malformed segments are skipped; an
    /// unparseable header yields an empty pagination rather than an error.
    pub fn from_link_header(header: &str) -> Self {
        let mut pagination = Self::default();

        for segment in header.split(',') {
            let Some(target) = segment
                .find('<')
                .and_then(|start| segment[start..].find('>').map(|end| &segment[start + 1..start + end]))
            else {
                continue;
            };
            let Ok(url) = Url::parse(target) else {
                continue;
            };
            let cursor = PageCursor::from_url(&url);

            if segment.contains("rel=\"next\"") {
                pagination.next = cursor;
            } else if segment.contains("rel=\"prev\"") || segment.contains("rel=\"previous\"") {
                pagination.previous = cursor;
            }
        }

        pagination
    }
}

/// One page of records plus the cursors to its neighbors.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<PageCursor>,
    pub previous: Option<PageCursor>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Pagination) -> Self {
        Self {
            items,
            next: pagination.next,
            previous: pagination.previous,
        }
    }
}
