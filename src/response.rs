use crate::headers::Headers;

/// The immutable result of one logical `request()` call: either a single
/// physical exchange, or the merge of several pages (spec.md section 3).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub data: Option<serde_json::Value>,
    pub body: Option<String>,
    /// Present only for paginated results: the ordered per-page responses
    /// that were merged to produce this one.
    pub responses: Option<Vec<Response>>,
}

impl Response {
    pub fn new(status: u16, headers: Headers) -> Self {
        Self {
            status,
            headers,
            data: None,
            body: None,
            responses: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Build the merged Response for a set of pages already in page order
    /// (spec.md 4.5 step 6, shared by GET and POST pagination).
    ///
    /// Each sub-response's `data` must be a JSON array; the merged `data`
    /// is their concatenation in page order.
    pub fn merge_pages(pages: Vec<Response>) -> Self {
        assert!(!pages.is_empty(), "merge_pages requires at least one page");

        let status = pages[0].status;

        let mut common_headers = pages[0].headers.clone();
        for page in &pages[1..] {
            common_headers = common_headers.intersect(&page.headers);
        }

        let mut merged_data = Vec::new();
        for page in &pages {
            match &page.data {
                Some(serde_json::Value::Array(items)) => merged_data.extend(items.clone()),
                Some(other) => merged_data.push(other.clone()),
                None => {}
            }
        }

        Response {
            status,
            headers: common_headers,
            data: Some(serde_json::Value::Array(merged_data)),
            body: None,
            responses: Some(pages),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(status: u16, data: serde_json::Value, headers: &[(&str, &str)]) -> Response {
        let mut h = Headers::new();
        for (k, v) in headers {
            h.insert(*k, v.to_string());
        }
        Response::new(status, h).with_data(data)
    }

    #[test]
    fn merge_concatenates_in_page_order() {
        let p1 = page(200, json!([1, 2]), &[("expires", "T+60")]);
        let p2 = page(200, json!([3, 4]), &[("expires", "T+60")]);
        let merged = Response::merge_pages(vec![p1, p2]);
        assert_eq!(merged.data, Some(json!([1, 2, 3, 4])));
        assert_eq!(merged.headers.get("expires"), Some("T+60"));
        assert_eq!(merged.responses.unwrap().len(), 2);
    }

    #[test]
    fn merge_drops_headers_that_disagree_across_pages() {
        let p1 = page(200, json!([1, 2]), &[("expires", "T+60")]);
        let p2 = page(200, json!([3, 4]), &[("expires", "T+120")]);
        let merged = Response::merge_pages(vec![p1, p2]);
        assert_eq!(merged.headers.get("expires"), None);
    }

    #[test]
    fn status_comes_from_first_page() {
        let p1 = page(200, json!([1]), &[]);
        let p2 = page(200, json!([2]), &[]);
        let merged = Response::merge_pages(vec![p1, p2]);
        assert_eq!(merged.status, 200);
    }
}
