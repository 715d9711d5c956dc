use std::collections::HashMap;

use crate::error::Error;
use crate::headers::Headers;
use crate::response::Response;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl Default for Method {
    fn default() -> Self {
        Method::Get
    }
}

/// Per-call configuration (spec.md section 3).
#[derive(Default, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Headers,
    pub parameters: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub body: Option<serde_json::Value>,
    pub body_page_size: Option<usize>,
    pub token: Option<Token>,
    pub previous_response: Option<Response>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn body_page_size(mut self, size: usize) -> Self {
        self.body_page_size = Some(size);
        self
    }

    pub fn token(mut self, token: Token) -> Self {
        self.token = Some(token);
        self
    }

    pub fn previous_response(mut self, response: Response) -> Self {
        self.previous_response = Some(response);
        self
    }

    /// True when POST pagination applies: method is POST, `body_page_size`
    /// is set, and `body` is a JSON array (spec.md section 4.6 and the
    /// open question in section 9(c): anything else falls through to a
    /// single request).
    pub fn wants_post_pagination(&self) -> bool {
        self.method == Method::Post
            && self.body_page_size.is_some_and(|n| n > 0)
            && matches!(self.body, Some(serde_json::Value::Array(_)))
    }
}

/// Substitute every `{name}` token in `template` with `parameters[name]`.
/// Fails with `ConfigurationError` before any I/O if a placeholder has no
/// value (spec.md section 4.3).
pub fn build_path(template: &str, parameters: &HashMap<String, String>) -> Result<String, Error> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let end = template[i..]
                .find('}')
                .map(|o| i + o)
                .ok_or_else(|| Error::ConfigurationError(format!("unterminated placeholder in path template {template:?}")))?;
            let name = &template[i + 1..end];
            let value = parameters.get(name).ok_or_else(|| {
                Error::ConfigurationError(format!("missing path parameter {name:?} for template {template:?}"))
            })?;
            out.push_str(value);
            i = end + 1;
        } else {
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }
    Ok(out)
}

/// Merge `default_query` with `options.query`, the latter winning on
/// conflicting keys, and render as a query string (spec.md section 4.3).
pub fn build_query_string(
    default_query: &HashMap<String, String>,
    options_query: &HashMap<String, String>,
) -> String {
    let mut merged: HashMap<&str, &str> = default_query
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    for (k, v) in options_query {
        merged.insert(k.as_str(), v.as_str());
    }
    if merged.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<(&str, &str)> = merged.into_iter().collect();
    pairs.sort_unstable_by_key(|(k, _)| *k);
    let mut out = String::from("?");
    for (i, (k, v)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(&url::form_urlencoded::byte_serialize(k.as_bytes()).collect::<String>());
        out.push('=');
        out.push_str(&url::form_urlencoded::byte_serialize(v.as_bytes()).collect::<String>());
    }
    out
}
