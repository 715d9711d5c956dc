use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::connection::Dispatch;
use crate::error::Error;
use crate::exchange::single_exchange;
use crate::options::RequestOptions;
use crate::response::Response;
use crate::transport::Session;

/// Repeat `SingleExchange` under an (attempts, deadline) budget, classify
/// the outcome, and honor `Retry-After` (spec.md section 4.4,
/// `_retry_request`).
pub async fn retry_request<S: Session, D: Dispatch<S>>(
    connection: &D,
    config: &ClientConfig,
    path_template: &str,
    options: &RequestOptions,
) -> Result<Response, Error> {
    let attempts = config.max_retries + 1;
    let deadline = Instant::now() + config.max_time;

    let mut delay_low = config.retry_delay_low.generator();
    let mut delay_high = config.retry_delay_high.generator();

    let mut last_response: Option<Response> = None;

    for attempt in 0..attempts {
        let response = single_exchange(connection, config, path_template, options).await;

        let response = match response {
            Ok(r) => r,
            Err(e) => return Err(e),
        };

        if response.is_success() || response.status == 304 {
            return Ok(response);
        }

        match response.status {
            502 | 503 | 504 => {
                let now = Instant::now();
                let remaining = deadline.saturating_duration_since(now);

                let delay = match retry_after_delay(&response) {
                    Some(d) => d,
                    None => {
                        if response.headers.contains("x-esi-error-limit-reset") {
                            delay_high.next()
                        } else {
                            delay_low.next()
                        }
                    }
                };

                tracing::info!(
                    attempt,
                    status = response.status,
                    delay_ms = delay.as_millis() as u64,
                    "transient error, retrying"
                );

                if delay > remaining {
                    last_response = Some(response);
                    break;
                }

                tokio::time::sleep(delay).await;
                last_response = Some(response);
                continue;
            }
            _ => {
                let message = response
                    .data
                    .as_ref()
                    .and_then(|d| d.get("error"))
                    .and_then(|e| e.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Response code {}", response.status));
                tracing::warn!(status = response.status, message, "unrecoverable response");
                let status = response.status;
                return Err(Error::HttpError { status, response });
            }
        }
    }

    let response = last_response.expect("at least one attempt runs before the loop can exit here");
    tracing::warn!(status = response.status, "retry limit reached");
    Err(Error::RetryLimitError { response })
}

/// Parse `retry-after` as either an integer seconds count or an HTTP-date
/// relative to the response's own `date` header (spec.md section 4.4).
fn retry_after_delay(response: &Response) -> Option<Duration> {
    let value = response.headers.get("retry-after")?;

    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let retry_at = httpdate::parse_http_date(value).ok()?;
    let date_header = response.headers.get("date")?;
    let response_date = httpdate::parse_http_date(date_header).ok()?;

    let delta = retry_at.duration_since(response_date).ok()?;
    Some(delta + Duration::from_millis(1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;

    fn response_with(status: u16, headers: &[(&str, &str)]) -> Response {
        let mut h = Headers::new();
        for (k, v) in headers {
            h.insert(*k, v.to_string());
        }
        Response::new(status, h)
    }

    #[test]
    fn retry_after_integer_seconds() {
        let r = response_with(503, &[("retry-after", "2")]);
        assert_eq!(retry_after_delay(&r), Some(Duration::from_secs(2)));
    }

    #[test]
    fn retry_after_http_date_relative_to_response_date() {
        let r = response_with(
            503,
            &[
                ("date", "Tue, 15 Nov 1994 08:12:31 GMT"),
                ("retry-after", "Tue, 15 Nov 1994 08:12:33 GMT"),
            ],
        );
        assert_eq!(retry_after_delay(&r), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn no_retry_after_header_returns_none() {
        let r = response_with(503, &[]);
        assert_eq!(retry_after_delay(&r), None);
    }
}
