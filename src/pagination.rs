//! Cursor adapter over paginated remote collections.
//!
//! A fetch primitive returns one [`Page`] per call together with the token of
//! the next page. [`Cursor`] walks those pages lazily; [`collect_all`]
//! flattens them. Page size is whatever the remote side returns.

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::collections::HashSet;

/// One page of a remote collection. `next` is `None` on the last page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next: Option<String>) -> Self {
        Self { items, next }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self { items, next: None }
    }

    pub fn empty() -> Self {
        Self::last(Vec::new())
    }
}

type FetchPage<'a, T> = Box<dyn FnMut(Option<String>) -> BoxFuture<'a, Result<Page<T>>> + Send + 'a>;

/// Lazy page-by-page walk of a remote collection.
pub struct Cursor<'a, T> {
    fetch: FetchPage<'a, T>,
    token: Option<String>,
    seen: HashSet<String>,
    pages: usize,
    done: bool,
}

impl<'a, T> Cursor<'a, T> {
    pub fn new<F>(fetch: F) -> Self
    where
        F: FnMut(Option<String>) -> BoxFuture<'a, Result<Page<T>>> + Send + 'a,
    {
        Self {
            fetch: Box::new(fetch),
            token: None,
            seen: HashSet::new(),
            pages: 0,
            done: false,
        }
    }

    /// Starts the walk at `token` instead of the first page.
    pub fn resume(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.seen.insert(token.clone());
        self.token = Some(token);
        self
    }

    /// Token the next call to [`Cursor::next_page`] will use.
    pub fn position(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetches the next page. `Ok(None)` once the collection is exhausted.
    /// A remote error is returned as is and leaves the cursor where it was.
    pub async fn next_page(&mut self) -> Result<Option<Vec<T>>> {
        if self.done {
            return Ok(None);
        }
        let page = (self.fetch)(self.token.clone()).await?;
        self.pages += 1;
        match page.next {
            Some(next) => {
                if !self.seen.insert(next.clone()) {
                    self.done = true;
                    return Err(anyhow!("remote returned continuation token `{}` twice", next));
                }
                self.token = Some(next);
            }
            None => {
                self.done = true;
                self.token = None;
            }
        }
        Ok(Some(page.items))
    }

    /// Drains every remaining page into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(page) = self.next_page().await? {
            items.extend(page);
        }
        Ok(items)
    }
}

/// Flattens the collection behind `fetch` into memory.
pub async fn collect_all<'a, T, F>(fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> BoxFuture<'a, Result<Page<T>>> + Send + 'a,
    T: 'a,
{
    Cursor::new(fetch).collect_all().await
}
