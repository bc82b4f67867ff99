use std::future::Future;

use crate::error::{contract, Result};
use crate::model::PageEnvelope;

/// Forward-only walk over a paged source.
///
/// Each step fetches the page at the current offset and advances the offset
/// by the number of items returned. The walk ends at the first empty page.
/// [`PageReader::restart`] starts over from offset zero.
pub struct PageReader<F> {
    fetch: F,
    limit: usize,
    offset: usize,
    finished: bool,
}

impl<F> PageReader<F> {
    pub fn new(fetch: F, limit: usize) -> Self {
        Self {
            fetch,
            limit,
            offset: 0,
            finished: false,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn restart(&mut self) {
        self.offset = 0;
        self.finished = false;
    }

    pub async fn next_page<T, Fut>(&mut self) -> Result<Option<PageEnvelope<T>>>
    where
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = Result<PageEnvelope<T>>>,
    {
        if self.finished {
            return Ok(None);
        }
        let page = (self.fetch)(self.offset, self.limit).await?;
        if page.returned() == 0 {
            self.finished = true;
            return Ok(None);
        }
        self.offset += page.returned();
        Ok(Some(page))
    }
}

/// Collect at most `max_items` items from a paged source, `page_limit` at a
/// time.
pub async fn read_pages<T, F, Fut>(fetch: F, page_limit: usize, max_items: usize) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<PageEnvelope<T>>>,
{
    contract::require_limit(page_limit)?;
    let mut reader = PageReader::new(fetch, page_limit);
    let mut items = Vec::new();
    while items.len() < max_items {
        match reader.next_page().await? {
            Some(page) => items.extend(page.data),
            None => break,
        }
    }
    items.truncate(max_items);
    Ok(items)
}
