use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::config::ClientConfig;
use crate::connection::{Connection, Dispatch};
use crate::error::Error;
use crate::options::{Method, RequestOptions};
use crate::paginate::{paginate_get, paginate_post};
use crate::pool::ConnectionPool;
use crate::response::Response;
use crate::retry::retry_request;
use crate::transport::{H2Session, Session};

/// A connection to ESI: one `Connection` when `pool_size == 1`, a
/// round-robin `ConnectionPool` otherwise (spec.md section 6,
/// "pool_size (integer >= 1): selects Connection vs. ConnectionPool").
enum Dispatcher<S: Session> {
    Single(Connection<S>),
    Pool(ConnectionPool<S>),
}

impl<S: Session> Dispatch<S> for Dispatcher<S> {
    fn request(
        &self,
        request: crate::transport::RawRequest,
    ) -> impl Future<Output = Result<crate::transport::RawResponse, Error>> + Send {
        let this = self;
        async move {
            match this {
                Dispatcher::Single(c) => c.request(request).await,
                Dispatcher::Pool(p) => p.request(request).await,
            }
        }
    }
}

/// The facade: dispatches `request()` into SingleExchange, Paginator GET,
/// or Paginator POST, and owns the underlying Connection(s) (spec.md
/// section 4.6). Generic over `H2Session` in production; tests substitute
/// a fake `Session` implementation.
pub struct Client<S: Session = H2Session> {
    dispatcher: Dispatcher<S>,
    config: ClientConfig,
}

impl<S: Session> Client<S> {
    pub fn new(config: ClientConfig) -> Self {
        let dispatcher = if config.pool_size <= 1 {
            Dispatcher::Single(Connection::new(config.connection_settings.clone()))
        } else {
            Dispatcher::Pool(ConnectionPool::new(config.pool_size, config.connection_settings.clone()))
        };
        Self { dispatcher, config }
    }

    /// Dispatch one logical request (spec.md 4.6). `path_template` may
    /// contain `{name}` placeholders filled from `options.parameters`.
    pub fn request<'a>(&'a self, path_template: &'a str, options: RequestOptions) -> RequestFuture<'a> {
        RequestFuture::new(async move {
            if options.method == Method::Get {
                paginate_get(&self.dispatcher, &self.config, path_template, &options).await
            } else if options.wants_post_pagination() {
                paginate_post(&self.dispatcher, &self.config, path_template, &options).await
            } else {
                retry_request(&self.dispatcher, &self.config, path_template, &options).await
            }
        })
    }

    /// Tear down every underlying Connection; every request still queued
    /// is rejected (spec.md section 6, "a `close()` operation releases
    /// all underlying connections").
    pub async fn close(&self) {
        match &self.dispatcher {
            Dispatcher::Single(c) => c.close().await,
            Dispatcher::Pool(p) => p.close().await,
        }
    }
}

/// A handle for an in-flight logical request. Poll it directly for the
/// full `Response`, or call `.data()` for a handle resolving to just the
/// parsed JSON (spec.md 4.6, "a `data` accessor returning a promise-like
/// for the response's `data` alone").
pub struct RequestFuture<'a> {
    inner: Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'a>>,
}

impl<'a> RequestFuture<'a> {
    fn new(inner: impl Future<Output = Result<Response, Error>> + Send + 'a) -> Self {
        Self {
            inner: Box::pin(inner),
        }
    }

    pub fn data(self) -> DataFuture<'a> {
        DataFuture { inner: self.inner }
    }
}

impl<'a> Future for RequestFuture<'a> {
    type Output = Result<Response, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

pub struct DataFuture<'a> {
    inner: Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'a>>,
}

impl<'a> Future for DataFuture<'a> {
    type Output = Result<Option<serde_json::Value>, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx).map(|r| r.map(|resp| resp.data))
    }
}
