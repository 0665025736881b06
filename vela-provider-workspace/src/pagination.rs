//! Offset/limit pagination

use std::future::Future;

use serde_json::Value as JsonValue;

use crate::client::{ClientError, ServiceClient};
use crate::utils::{append_query, path_search, search_array};

/// One page of a list response
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<JsonValue>,
    /// Total reported by the server, when it reports one
    pub count: Option<usize>,
}

/// When to stop requesting pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Stop on the first page shorter than the limit
    ShortPage,
    /// Like `ShortPage`, and also once the collected total reaches `count`
    TotalCount,
    /// Stop only on an empty page
    EmptyPage,
}

/// Fetch pages until the stop condition holds.
///
/// The offset advances by the length of the previous page, so a server
/// that silently caps the page size is still swept completely. An empty
/// page always stops the sweep. Errors are returned as-is, without retry.
pub async fn sweep<F, Fut, E>(limit: usize, mode: StopMode, mut fetch: F) -> Result<Vec<JsonValue>, E>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Page, E>>,
{
    let mut all = Vec::new();
    let mut offset = 0;

    loop {
        let page = fetch(offset, limit).await?;
        let len = page.items.len();
        all.extend(page.items);

        if len == 0 {
            break;
        }
        let done = match mode {
            StopMode::ShortPage => len < limit,
            StopMode::TotalCount => len < limit || page.count.is_some_and(|c| all.len() >= c),
            StopMode::EmptyPage => false,
        };
        if done {
            break;
        }
        offset += len;
    }

    Ok(all)
}

fn page_from(body: &JsonValue, items_key: &str) -> Page {
    Page {
        items: search_array(items_key, body).to_vec(),
        count: path_search("count", body)
            .or_else(|| path_search("total_count", body))
            .and_then(|v| v.as_u64())
            .map(|c| c as usize),
    }
}

/// GET `path` page by page with `limit`/`offset`, stopping on a short page
pub async fn list_all(
    client: &ServiceClient,
    path: &str,
    items_key: &str,
    limit: usize,
) -> Result<Vec<JsonValue>, ClientError> {
    let base = append_query(path, "limit", limit);
    sweep(limit, StopMode::ShortPage, |offset, _| {
        let url = append_query(&base, "offset", offset);
        async move {
            let body = client.get(&url).await?;
            Ok::<_, ClientError>(page_from(&body, items_key))
        }
    })
    .await
}

/// GET `path` with an advancing `offset` until a page comes back empty.
///
/// For endpoints whose page size is decided by the server.
pub async fn list_until_empty(
    client: &ServiceClient,
    path: &str,
    items_key: &str,
) -> Result<Vec<JsonValue>, ClientError> {
    sweep(0, StopMode::EmptyPage, |offset, _| {
        let url = append_query(path, "offset", offset);
        async move {
            let body = client.get(&url).await?;
            Ok::<_, ClientError>(page_from(&body, items_key))
        }
    })
    .await
}
