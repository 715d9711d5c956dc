use bytes::Bytes;

use crate::config::ClientConfig;
use crate::connection::Dispatch;
use crate::error::{Error, TransportError};
use crate::headers::Headers;
use crate::options::{build_path, build_query_string, RequestOptions};
use crate::response::Response;
use crate::transport::{RawRequest, Session};

/// Build headers + path, attach the bearer token and conditional-request
/// header, issue one request, decompress, decode JSON, and materialize a
/// `Response` (spec.md section 4.3, `_make_request`).
pub async fn single_exchange<S: Session, D: Dispatch<S>>(
    connection: &D,
    config: &ClientConfig,
    path_template: &str,
    options: &RequestOptions,
) -> Result<Response, Error> {
    let path = build_path(path_template, &options.parameters)?;
    let query = build_query_string(&config.default_query, &options.query);

    let mut headers = config.default_headers.clone().merged_over(&options.headers);
    headers.insert("accept-encoding", "gzip, deflate");

    if let Some(token) = &options.token {
        let value = token.resolve().await?;
        headers.insert("authorization", format!("Bearer {value}"));
    }

    if let Some(previous) = &options.previous_response {
        if let Some(etag) = previous.headers.get("etag") {
            headers.insert("if-none-match", etag.to_string());
        }
    }

    let body = match &options.body {
        Some(value) => Some(Bytes::from(serde_json::to_vec(value).map_err(|e| {
            Error::ConfigurationError(format!("failed to encode request body: {e}"))
        })?)),
        None => None,
    };

    let raw_request = RawRequest {
        method: options.method.as_str(),
        path: format!("{path}{query}"),
        headers,
        body,
    };

    let raw_response = connection.request(raw_request).await?;

    let mut headers = raw_response.headers;
    headers.strip(&config.strip_headers);

    decode_response(raw_response.status, headers, raw_response.body, options.previous_response.as_ref()).await
}

/// The response decoding decision table from spec.md section 4.3.
async fn decode_response(
    status: u16,
    headers: Headers,
    body: Bytes,
    previous_response: Option<&Response>,
) -> Result<Response, Error> {
    let decompressed = decompress(&headers, body).await?;

    if decompressed.is_empty() {
        if status == 304 {
            let previous = previous_response.ok_or_else(|| {
                Error::ConfigurationError("received 304 without a previous_response to reuse".into())
            })?;
            return Ok(Response {
                status: previous.status,
                headers,
                data: previous.data.clone(),
                body: None,
                responses: None,
            });
        }
        return Ok(Response::new(status, headers));
    }

    let is_json = headers
        .get("content-type")
        .is_some_and(|ct| ct.contains("application/json"));

    if is_json {
        let text = String::from_utf8_lossy(&decompressed).into_owned();
        return match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(data) => Ok(Response::new(status, headers).with_data(data)),
            Err(source) => Err(Error::ResponseFormatError {
                source,
                response: Response::new(status, headers.clone()).with_body(text),
            }),
        };
    }

    let text = String::from_utf8_lossy(&decompressed).into_owned();
    Ok(Response::new(status, headers).with_body(text))
}

async fn decompress(headers: &Headers, body: Bytes) -> Result<Vec<u8>, Error> {
    use tokio::io::AsyncReadExt;

    let encoding = headers.get("content-encoding").map(str::to_ascii_lowercase);
    let Some(encoding) = encoding else {
        return Ok(body.to_vec());
    };

    let cursor = std::io::Cursor::new(body);
    let mut out = Vec::new();
    match encoding.as_str() {
        "gzip" => {
            let mut decoder = async_compression::tokio::bufread::GzipDecoder::new(tokio::io::BufReader::new(cursor));
            decoder
                .read_to_end(&mut out)
                .await
                .map_err(TransportError::Io)?;
        }
        "deflate" => {
            let mut decoder = async_compression::tokio::bufread::DeflateDecoder::new(tokio::io::BufReader::new(cursor));
            decoder
                .read_to_end(&mut out)
                .await
                .map_err(TransportError::Io)?;
        }
        "br" => {
            let mut decoder = async_compression::tokio::bufread::BrotliDecoder::new(tokio::io::BufReader::new(cursor));
            decoder
                .read_to_end(&mut out)
                .await
                .map_err(TransportError::Io)?;
        }
        _ => return Ok(cursor.into_inner().to_vec()),
    }
    Ok(out)
}
