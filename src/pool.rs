use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::ConnectionSettings;
use crate::connection::{Connection, Dispatch};
use crate::error::Error;
use crate::transport::{RawRequest, RawResponse, Session};

/// N independently-reconnecting `Connection`s, round-robin dispatched, to
/// exceed one session's concurrent-stream limit (spec.md section 4.2).
/// No health-aware dispatch: a Connection queueing while disconnected still
/// takes its turn in rotation.
pub struct ConnectionPool<S: Session> {
    connections: Vec<Arc<Connection<S>>>,
    next: AtomicUsize,
}

impl<S: Session> ConnectionPool<S> {
    pub fn new(pool_size: usize, settings: ConnectionSettings) -> Self {
        let pool_size = pool_size.max(1);
        let connections = (0..pool_size)
            .map(|_| Arc::new(Connection::new(settings.clone())))
            .collect();
        Self {
            connections,
            next: AtomicUsize::new(0),
        }
    }

    pub async fn close(&self) {
        for connection in &self.connections {
            connection.close().await;
        }
    }
}

impl<S: Session> Dispatch<S> for ConnectionPool<S> {
    fn request(
        &self,
        request: RawRequest,
    ) -> impl std::future::Future<Output = Result<RawResponse, Error>> + Send {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        let connection = self.connections[index].clone();
        async move { connection.request(request).await }
    }
}
