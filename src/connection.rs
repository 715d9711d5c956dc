use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{oneshot, Mutex, Notify};

use crate::config::ConnectionSettings;
use crate::error::{Error, TransportError};
use crate::transport::{RawRequest, RawResponse, Session};

/// An entry in a `Connection`'s FIFO queue, created when `request()` is
/// called while the session is not READY (spec.md section 3). The resolver
/// carries a fully classified `Error` (not a raw `TransportError`) so the
/// age-out and close paths can deliver `ConnectionTimeout`/`Closed`
/// directly instead of being laundered through `Error::from(TransportError)`.
struct PendingRequest {
    request: RawRequest,
    enqueued_at: Instant,
    resolver: oneshot::Sender<Result<RawResponse, Error>>,
}

enum SessionState<S> {
    Absent,
    Connecting,
    Ready(Arc<S>),
}

struct Inner<S> {
    state: SessionState<S>,
    queue: VecDeque<PendingRequest>,
    closed: bool,
}

/// Presents a single `request(RawRequest) -> RawResponse` operation that
/// hides session lifecycle: reconnection, backoff, and queueing while
/// disconnected (spec.md section 4.1).
pub struct Connection<S: Session> {
    inner: Arc<Mutex<Inner<S>>>,
    closed_notify: Arc<Notify>,
    settings: ConnectionSettings,
}

impl<S: Session> Connection<S> {
    pub fn new(settings: ConnectionSettings) -> Self {
        let inner = Arc::new(Mutex::new(Inner {
            state: SessionState::Absent,
            queue: VecDeque::new(),
            closed: false,
        }));
        let closed_notify = Arc::new(Notify::new());
        let conn = Self {
            inner,
            closed_notify,
            settings,
        };
        conn.spawn_reconnect_loop();
        conn
    }

    fn spawn_reconnect_loop(&self) {
        let inner = self.inner.clone();
        let closed_notify = self.closed_notify.clone();
        let settings = self.settings.clone();
        tokio::spawn(async move {
            reconnect_loop::<S>(inner, closed_notify, settings).await;
        });
    }

    /// Either opens a stream synchronously (session READY) or enqueues and
    /// awaits resolution once a reconnect drains the queue (spec.md 4.1).
    pub async fn request(&self, request: RawRequest) -> Result<RawResponse, Error> {
        let ready_session = {
            let guard = self.inner.lock().await;
            if guard.closed {
                return Err(Error::Closed);
            }
            match &guard.state {
                SessionState::Ready(session) => Some(session.clone()),
                _ => None,
            }
        };

        if let Some(session) = ready_session {
            return session.exchange(request).await.map_err(Error::from);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.inner.lock().await;
            if guard.closed {
                return Err(Error::Closed);
            }
            // Re-check: a reconnect may have completed between the first
            // read above and acquiring the lock again.
            if let SessionState::Ready(session) = &guard.state {
                let session = session.clone();
                drop(guard);
                return session.exchange(request).await.map_err(Error::from);
            }
            guard.queue.push_back(PendingRequest {
                request,
                enqueued_at: Instant::now(),
                resolver: tx,
            });
        }

        match rx.await {
            Ok(result) => result,
            // The sender was dropped without sending, which only happens if
            // the whole `Connection` (and its queue) was torn down out from
            // under this pending entry.
            Err(_) => Err(Error::Closed),
        }
    }

    /// Idempotent: tears down the session and rejects every queued request.
    /// A second call is a no-op.
    pub async fn close(&self) {
        let mut guard = self.inner.lock().await;
        if guard.closed {
            return;
        }
        guard.closed = true;
        guard.state = SessionState::Absent;
        for pending in guard.queue.drain(..) {
            let _ = pending.resolver.send(Err(Error::Closed));
        }
        drop(guard);
        // `notify_one` stores a permit if the reconnect loop isn't parked on
        // `notified()` yet (e.g. it's mid-`connect()`), so the signal is
        // never lost the way `notify_waiters()` would lose it.
        self.closed_notify.notify_one();
    }
}

/// Request dispatch, abstracted so `SingleExchange`/`RetryLoop`/`Paginator`
/// work identically over one `Connection` or a `ConnectionPool` (spec.md
/// 4.2 and 4.6). `Connection` itself is the single-session implementation;
/// `ConnectionPool` round-robins over several.
pub trait Dispatch<S: Session>: Send + Sync {
    fn request(&self, request: RawRequest) -> impl Future<Output = Result<RawResponse, Error>> + Send;
}

impl<S: Session> Dispatch<S> for Connection<S> {
    fn request(&self, request: RawRequest) -> impl Future<Output = Result<RawResponse, Error>> + Send {
        Connection::request(self, request)
    }
}

/// Evict over-aged queue entries: find the first entry younger than
/// `max_pending_time`, reject every entry before it, and retain the rest in
/// FIFO order. If no entry is young enough, reject all (spec.md 4.1).
fn reject_old(queue: &mut VecDeque<PendingRequest>, max_pending_time: std::time::Duration) {
    let now = Instant::now();
    let first_young = queue
        .iter()
        .position(|p| now.duration_since(p.enqueued_at) < max_pending_time);

    let survivors_from = first_young.unwrap_or(queue.len());
    let expired: Vec<PendingRequest> = queue.drain(..survivors_from).collect();
    for pending in expired {
        let _ = pending.resolver.send(Err(Error::ConnectionTimeout));
    }
}

async fn reconnect_loop<S: Session>(
    inner: Arc<Mutex<Inner<S>>>,
    closed_notify: Arc<Notify>,
    settings: ConnectionSettings,
) {
    loop {
        // Fresh backoff per connectivity "generation" so a prior burst of
        // reconnect failures never biases a later, unrelated one.
        let mut backoff = settings.reconnect_delay.generator();

        let session = loop {
            {
                let guard = inner.lock().await;
                if guard.closed {
                    return;
                }
            }
            {
                let mut guard = inner.lock().await;
                guard.state = SessionState::Connecting;
            }

            match S::connect(&settings).await {
                Ok(session) => break Arc::new(session),
                Err(e) => {
                    tracing::debug!(error = %e, "reconnect attempt failed");
                    let mut guard = inner.lock().await;
                    reject_old(&mut guard.queue, settings.max_pending_time);
                    guard.state = SessionState::Absent;
                    let closed = guard.closed;
                    drop(guard);
                    if closed {
                        return;
                    }
                    tokio::time::sleep(backoff.next()).await;
                }
            }
        };

        let pending = {
            let mut guard = inner.lock().await;
            if guard.closed {
                // `close()` landed while `S::connect` was in flight: drop
                // the freshly-established session instead of resurrecting
                // it into `Ready`, and exit without touching the queue
                // (`close()` already drained and rejected it).
                return;
            }
            guard.state = SessionState::Ready(session.clone());
            guard.queue.drain(..).collect::<Vec<_>>()
        };
        tracing::debug!(drained = pending.len(), "session ready, draining queue");
        for p in pending {
            let session = session.clone();
            tokio::spawn(async move {
                let result = session.exchange(p.request).await.map_err(Error::from);
                let _ = p.resolver.send(result);
            });
        }

        tokio::select! {
            _ = session.closed() => {}
            _ = closed_notify.notified() => return,
        }

        let mut guard = inner.lock().await;
        if guard.closed {
            return;
        }
        guard.state = SessionState::Absent;
        drop(guard);
        // loop back to top: re-enter reconnection with a fresh generator.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // `Session::connect` is an associated function with no access to outside
    // state, so tests drive failure/success counts through thread-local-ish
    // shared atomics captured by a wrapper type per test.
    thread_local! {
        static CONNECT_ATTEMPTS: AtomicUsize = AtomicUsize::new(0);
        static FAIL_UNTIL: AtomicUsize = AtomicUsize::new(0);
    }

    struct ScriptedSession {
        death: Arc<Notify>,
    }

    impl Session for ScriptedSession {
        async fn connect(_settings: &ConnectionSettings) -> Result<Self, TransportError> {
            let attempt = CONNECT_ATTEMPTS.with(|a| a.fetch_add(1, Ordering::SeqCst));
            let fail_until = FAIL_UNTIL.with(|f| f.load(Ordering::SeqCst));
            if attempt < fail_until {
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            Ok(ScriptedSession {
                death: Arc::new(Notify::new()),
            })
        }

        async fn exchange(&self, request: RawRequest) -> Result<RawResponse, TransportError> {
            Ok(RawResponse {
                status: 200,
                headers: Headers::new(),
                body: bytes::Bytes::from(request.path),
            })
        }

        async fn closed(&self) {
            self.death.notified().await;
        }
    }

    fn req(path: &str) -> RawRequest {
        RawRequest {
            method: "GET",
            path: path.to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn request_queues_while_disconnected_then_resolves_fifo() {
        CONNECT_ATTEMPTS.with(|a| a.store(0, Ordering::SeqCst));
        FAIL_UNTIL.with(|f| f.store(2, Ordering::SeqCst));

        let conn: Connection<ScriptedSession> = Connection::new(ConnectionSettings {
            max_pending_time: Duration::from_secs(30),
            ..ConnectionSettings::default()
        });

        let c1 = conn.request(req("/a")).await.unwrap();
        let c2 = conn.request(req("/b")).await.unwrap();
        assert_eq!(c1.body, bytes::Bytes::from_static(b"/a"));
        assert_eq!(c2.body, bytes::Bytes::from_static(b"/b"));
    }

    #[tokio::test(start_paused = true)]
    async fn close_is_idempotent_and_rejects_subsequent_queued_requests() {
        CONNECT_ATTEMPTS.with(|a| a.store(0, Ordering::SeqCst));
        // never connects
        FAIL_UNTIL.with(|f| f.store(usize::MAX, Ordering::SeqCst));

        let conn: Connection<ScriptedSession> = Connection::new(ConnectionSettings {
            max_pending_time: Duration::from_secs(30),
            ..ConnectionSettings::default()
        });

        conn.close().await;
        conn.close().await; // idempotent, must not panic

        let err = conn.request(req("/a")).await.unwrap_err();
        assert!(matches!(err, Error::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn over_aged_queue_entries_are_rejected_in_fifo_prefix() {
        let mut queue = VecDeque::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let old_time = Instant::now() - Duration::from_secs(60);
        queue.push_back(PendingRequest {
            request: req("/old"),
            enqueued_at: old_time,
            resolver: tx1,
        });
        queue.push_back(PendingRequest {
            request: req("/new"),
            enqueued_at: Instant::now(),
            resolver: tx2,
        });

        reject_old(&mut queue, Duration::from_secs(10));

        assert!(matches!(rx1.await.unwrap(), Err(Error::ConnectionTimeout)));
        assert_eq!(queue.len(), 1);
        drop(rx2); // still pending, survives
    }

    struct SlowConnectSession {
        death: Arc<Notify>,
    }

    static CONNECT_GATE: std::sync::OnceLock<Notify> = std::sync::OnceLock::new();

    fn connect_gate() -> &'static Notify {
        CONNECT_GATE.get_or_init(Notify::new)
    }

    impl Session for SlowConnectSession {
        async fn connect(_settings: &ConnectionSettings) -> Result<Self, TransportError> {
            // Blocks until the test explicitly lets it through, so `close()`
            // can be made to land while this `connect()` is still in flight.
            connect_gate().notified().await;
            Ok(SlowConnectSession {
                death: Arc::new(Notify::new()),
            })
        }

        async fn exchange(&self, request: RawRequest) -> Result<RawResponse, TransportError> {
            Ok(RawResponse {
                status: 200,
                headers: Headers::new(),
                body: bytes::Bytes::from(request.path),
            })
        }

        async fn closed(&self) {
            self.death.notified().await;
        }
    }

    // Exercises `reconnect_loop` directly (rather than through `Connection`)
    // so the test can observe both halves of the race: the loop must exit
    // promptly (bounded by a timeout) instead of hanging on a lost
    // `notify_waiters()` wakeup, and it must not flip `state` to `Ready`
    // with a session that was established after `close()` already ran.
    #[tokio::test(start_paused = true)]
    async fn reconnect_loop_exits_without_resurrecting_a_session_closed_during_connect() {
        let inner = Arc::new(Mutex::new(Inner::<SlowConnectSession> {
            state: SessionState::Absent,
            queue: VecDeque::new(),
            closed: false,
        }));
        let closed_notify = Arc::new(Notify::new());

        let handle = tokio::spawn(reconnect_loop::<SlowConnectSession>(
            inner.clone(),
            closed_notify.clone(),
            ConnectionSettings::default(),
        ));

        // Let the loop reach `S::connect` and park on the gate.
        tokio::time::sleep(Duration::from_millis(1)).await;

        {
            let mut guard = inner.lock().await;
            guard.closed = true;
        }
        closed_notify.notify_one();

        // Now let the in-flight connect resolve.
        connect_gate().notify_one();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reconnect_loop must exit instead of hanging on a lost wakeup")
            .unwrap();

        let guard = inner.lock().await;
        assert!(
            !matches!(guard.state, SessionState::Ready(_)),
            "a session established after close() must not be resurrected into Ready"
        );
    }
}
