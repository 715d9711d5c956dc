//! Client library for EVE Online's ESI REST API.
//!
//! Hides multiplexed HTTP/2 transport with automatic reconnection, request
//! queueing across connection gaps, retry with backoff on transient
//! failures, conditional-request (ETag) reuse, and transparent pagination
//! for cursor-style GETs and bulk-array POSTs behind one `Client::request`
//! call.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod exchange;
pub mod headers;
pub mod logging;
pub mod options;
pub mod paginate;
pub mod pool;
pub mod response;
pub mod retry;
pub mod token;
pub mod transport;

pub use client::{Client, DataFuture, RequestFuture};
pub use config::{ClientConfig, ConnectionSettings, Http2Options};
pub use error::{Error, TransportError};
pub use headers::Headers;
pub use options::{Method, RequestOptions};
pub use response::Response;
pub use token::Token;
pub use transport::H2Session;

/// A `Client` wired to the production `H2Session` transport. Most callers
/// want this; the bare generic `Client<S>` exists so tests can substitute
/// a fake `Session`.
pub type EsiClient = Client<H2Session>;
