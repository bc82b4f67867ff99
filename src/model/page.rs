use serde::{Deserialize, Serialize};

/// Paging facts for one page of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub offset: usize,
    pub limit: usize,
    /// Number of items in this page.
    pub returned: usize,
    /// Number of items matching the query, independent of paging.
    pub total: usize,
}

/// One page of items together with its [`PageInfo`].
///
/// Serializes flat: `{offset, limit, returned, total, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope<T> {
    #[serde(flatten)]
    pub page_info: PageInfo,
    pub data: Vec<T>,
}

impl<T> PageEnvelope<T> {
    pub fn new(offset: usize, limit: usize, total: usize, data: Vec<T>) -> Self {
        Self {
            page_info: PageInfo {
                offset,
                limit,
                returned: data.len(),
                total,
            },
            data,
        }
    }

    pub fn empty(offset: usize, limit: usize, total: usize) -> Self {
        Self::new(offset, limit, total, Vec::new())
    }

    pub fn returned(&self) -> usize {
        self.page_info.returned
    }

    pub fn total(&self) -> usize {
        self.page_info.total
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
