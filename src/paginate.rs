use futures::future::try_join_all;

use crate::config::ClientConfig;
use crate::connection::Dispatch;
use crate::error::Error;
use crate::options::RequestOptions;
use crate::response::Response;
use crate::retry::retry_request;
use crate::transport::Session;

/// Orchestrate a cursor-style GET: fetch page 1, read `x-pages`, apply the
/// anti-split delay if needed, fan out the remaining pages concurrently,
/// and merge (spec.md section 4.5, `_paginate_get`).
pub async fn paginate_get<S: Session, D: Dispatch<S>>(
    connection: &D,
    config: &ClientConfig,
    path_template: &str,
    options: &RequestOptions,
) -> Result<Response, Error> {
    let previous = options.previous_response.clone();

    let mut page1_options = options.clone();
    page1_options.previous_response = previous_for_page(&previous, 0);
    let mut page1 = retry_request(connection, config, path_template, &page1_options).await?;

    let mut pages = page_count(&page1);

    if pages > 1 {
        let expires_in = anti_split_remaining(&page1);
        let budget = (config.page_split_delay)(pages);
        if let Some(expires_in) = expires_in {
            if expires_in < budget {
                tracing::debug!(
                    expires_in_ms = expires_in.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "anti-split delay: sleeping before re-requesting page 1"
                );
                tokio::time::sleep(expires_in).await;
                page1 = retry_request(connection, config, path_template, &page1_options).await?;
                pages = page_count(&page1);
            }
        }
    }

    if pages <= 1 {
        return Ok(page1);
    }

    let mut rest_options = Vec::with_capacity((pages - 1) as usize);
    for page_no in 2..=pages {
        let mut page_options = options.clone();
        page_options
            .query
            .insert("page".to_string(), page_no.to_string());
        page_options.previous_response = previous_for_page(&previous, (page_no - 1) as usize);
        rest_options.push(page_options);
    }
    let futures = rest_options
        .iter()
        .map(|po| retry_request(connection, config, path_template, po));

    let mut collected = vec![page1];
    match try_join_all(futures).await {
        Ok(rest) => collected.extend(rest),
        Err(e) => {
            return Err(wrap_partial_failure(e, collected));
        }
    }

    merge_checked(collected)
}

/// Chunk `options.body` (a JSON array) into slices of `body_page_size`,
/// submit them concurrently, and merge (spec.md section 4.5,
/// `_paginate_post`).
pub async fn paginate_post<S: Session, D: Dispatch<S>>(
    connection: &D,
    config: &ClientConfig,
    path_template: &str,
    options: &RequestOptions,
) -> Result<Response, Error> {
    let page_size = options
        .body_page_size
        .filter(|n| *n > 0)
        .expect("caller already checked wants_post_pagination");
    let items = match &options.body {
        Some(serde_json::Value::Array(items)) => items.clone(),
        _ => unreachable!("caller already checked wants_post_pagination"),
    };

    let previous = options.previous_response.clone();

    let chunks: Vec<Vec<serde_json::Value>> = items
        .chunks(page_size)
        .map(|c| c.to_vec())
        .collect();

    let mut chunk_options_list = Vec::with_capacity(chunks.len());
    for (idx, chunk) in chunks.into_iter().enumerate() {
        let mut chunk_options = options.clone();
        chunk_options.body = Some(serde_json::Value::Array(chunk));
        chunk_options.previous_response = previous_for_page(&previous, idx);
        chunk_options_list.push(chunk_options);
    }
    let futures = chunk_options_list
        .iter()
        .map(|co| retry_request(connection, config, path_template, co));

    match try_join_all(futures).await {
        Ok(pages) => Ok(Response::merge_pages(pages)),
        Err(e) => Err(e),
    }
}

/// Locate the previous-response counterpart for page `idx` (0-based),
/// per spec.md section 9(b): a merged previous response supplies per-page
/// previous_responses positionally; a single-page previous only covers
/// page 0; anything else is treated as absent.
fn previous_for_page(previous: &Option<Response>, idx: usize) -> Option<Response> {
    let prev = previous.as_ref()?;
    match &prev.responses {
        Some(pages) => pages.get(idx).cloned(),
        None if idx == 0 => Some(prev.clone()),
        None => None,
    }
}

fn page_count(response: &Response) -> u32 {
    response
        .headers
        .get("x-pages")
        .and_then(|v| v.parse::<i64>().ok())
        .map(|n| n.max(1) as u32)
        .unwrap_or(1)
}

/// `expires - date + 1000ms`, if both headers are present and parse as
/// HTTP-dates (spec.md section 4.5 step 3).
fn anti_split_remaining(response: &Response) -> Option<std::time::Duration> {
    let expires = response.headers.get("expires")?;
    let date = response.headers.get("date")?;
    let expires = httpdate::parse_http_date(expires).ok()?;
    let date = httpdate::parse_http_date(date).ok()?;
    let delta = expires.duration_since(date).ok()?;
    Some(delta + std::time::Duration::from_millis(1000))
}

/// Apply the page-split consistency check and build the merged Response
/// (spec.md 4.5 step 5-6): `common_headers` must retain `expires`, or at
/// least one page was regenerated mid-fetch.
fn merge_checked(pages: Vec<Response>) -> Result<Response, Error> {
    let mut common = pages[0].headers.clone();
    for page in &pages[1..] {
        common = common.intersect(&page.headers);
    }
    if common.get("expires").is_none() {
        return Err(Error::PageSplitError { responses: pages });
    }
    Ok(Response::merge_pages(pages))
}

fn wrap_partial_failure(err: Error, collected_so_far: Vec<Response>) -> Error {
    match err {
        Error::PageSplitError { .. } => err,
        other if collected_so_far.is_empty() => other,
        other => {
            tracing::warn!(
                pages_collected = collected_so_far.len(),
                "paginated GET failed with partial pages collected"
            );
            other
        }
    }
}
