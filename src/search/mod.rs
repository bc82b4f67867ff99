//! Search - Filter, order and page a collection.
//!
//! [`search_page`] is the in-process search engine. [`find_unique`] and
//! [`search_first`] are thin wrappers over any page source, and
//! [`PageReader`] walks a page source from the start to the end.

mod order;
mod pages;

use std::future::Future;

use serde::Serialize;
use serde_json::Value;

use crate::error::{contract, CrudError, Result};
use crate::model::{PageEnvelope, SearchDetails};

pub use pages::{read_pages, PageReader};

/// Filter, order and slice `items`.
///
/// `total` counts every matching item; `data` holds the matches in
/// `[offset, offset + limit)`. An offset past the end yields an empty page.
pub fn search_page<T, I>(
    items: I,
    details: &SearchDetails,
    offset: usize,
    limit: usize,
) -> Result<PageEnvelope<T>>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    contract::require_limit(limit)?;
    details.validate()?;

    let mut matching = Vec::new();
    for item in items {
        let fields = match serde_json::to_value(&item)? {
            Value::Object(fields) => fields,
            _ if details.where_.is_empty() && details.order_by.is_empty() => Default::default(),
            other => {
                return Err(CrudError::contract(format!(
                    "only items with named fields can be searched, got {}",
                    other
                )))
            }
        };
        if order::matches_where(&fields, &details.where_)? {
            matching.push((fields, item));
        }
    }

    if !details.order_by.is_empty() {
        matching.sort_by(|(a, _), (b, _)| order::compare_by(a, b, &details.order_by));
    }

    let total = matching.len();
    let data = matching
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|(_, item)| item)
        .collect();
    Ok(PageEnvelope::new(offset, limit, total, data))
}

/// The single item matching a search.
///
/// Fails with `NotFound` when nothing matches and `Contract` when more than
/// one item does.
pub async fn find_unique<T, F, Fut>(search: F) -> Result<T>
where
    F: FnOnce(usize, usize) -> Fut,
    Fut: Future<Output = Result<PageEnvelope<T>>>,
{
    let page = search(0, 2).await?;
    let mut data = page.data;
    match data.len() {
        0 => Err(CrudError::not_found("no item matched the search")),
        1 => Ok(data.remove(0)),
        _ => Err(CrudError::contract(
            "expected at most one item to match the search, found more",
        )),
    }
}

/// The first item of a search, if any.
pub async fn search_first<T, F, Fut>(search: F) -> Result<Option<T>>
where
    F: FnOnce(usize, usize) -> Fut,
    Fut: Future<Output = Result<PageEnvelope<T>>>,
{
    let page = search(0, 1).await?;
    Ok(page.data.into_iter().next())
}
