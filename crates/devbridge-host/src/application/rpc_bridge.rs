//! Call/response/push correlation between the client and the backend.
//!
//! # How a call travels (for beginners)
//!
//! ```text
//! client thread                 bridge                       backend thread
//! ─────────────                 ──────                       ──────────────
//! call(7, payload) ──► parse + register 7 ──► spawn ──► handle_call(7, query)
//!                                                                │
//!  ClientContext ◄── ClientEvent::Response ◄── remove 7 ◄── respond(7, result)
//! ```
//!
//! `call`, `respond` and `push_notify` may run on any thread.  Everything
//! meant for the client goes into one unbounded channel whose only consumer
//! is the client context, so the client sees deliveries one at a time and in
//! the order the bridge accepted them.
//!
//! A query ID is registered exactly while its call is outstanding.  The
//! first `respond` for it removes the registration and is delivered; any
//! later or unknown `respond` finds nothing to remove and is logged and
//! dropped.  After [`RpcBridge::close`] nothing more is delivered, and a
//! worker that had not yet started its call skips the backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use devbridge_core::{
    ApiQuery, Backend, NativeCommunication, PushNotification, Query, QueryId, Response, RpcError,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Everything the bridge delivers to the client context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Response(Response),
    Notification(PushNotification),
    /// The backend asked the client to show its authentication prompt.
    AuthRequested,
    /// The authentication prompt finished or was cancelled.
    AuthClosed,
    AuthSettingChanged(bool),
    DarkThemeChanged(bool),
}

#[derive(Default)]
struct Pending {
    queries: HashMap<QueryId, Query>,
    closed: bool,
}

/// Runs on the worker thread.  A query abandoned by `close` between
/// registration and this point never reaches the backend.
fn run_call(pending: &Mutex<Pending>, backend: &dyn Backend, query_id: QueryId, query: ApiQuery) {
    let outstanding = {
        let pending = pending.lock().unwrap_or_else(PoisonError::into_inner);
        !pending.closed && pending.queries.contains_key(&query_id)
    };
    if !outstanding {
        debug!(query_id, "query abandoned before dispatch; skipping backend");
        return;
    }
    backend.handle_call(query_id, query);
}

pub struct RpcBridge {
    pending: Arc<Mutex<Pending>>,
    backend: Mutex<Option<Arc<dyn Backend>>>,
    sender: mpsc::UnboundedSender<ClientEvent>,
}

impl RpcBridge {
    /// Creates the bridge and the receiving end for the client context.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ClientEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let bridge = Arc::new(Self {
            pending: Arc::new(Mutex::new(Pending::default())),
            backend: Mutex::new(None),
            sender,
        });
        (bridge, receiver)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_backend(&self) -> MutexGuard<'_, Option<Arc<dyn Backend>>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Routes subsequent calls to `backend`.
    pub fn attach_backend(&self, backend: Arc<dyn Backend>) {
        *self.lock_backend() = Some(backend);
    }

    /// Accepts a client call and hands it to the backend on a worker thread.
    ///
    /// # Errors
    ///
    /// - [`RpcError::InvalidQuery`] if the payload is not a GET/POST query.
    /// - [`RpcError::BridgeClosed`] after shutdown.
    /// - [`RpcError::BackendNotRunning`] before the backend is started.
    /// - [`RpcError::DuplicateQuery`] if `query_id` is still outstanding.
    /// - [`RpcError::Dispatch`] if the worker thread cannot be spawned.
    ///
    /// In every error case the backend is not invoked and nothing is
    /// registered.
    pub fn call(&self, query_id: QueryId, payload: impl Into<String>) -> Result<(), RpcError> {
        let payload = payload.into();
        let query = ApiQuery::parse(&payload)
            .map_err(|source| RpcError::InvalidQuery { id: query_id, source })?;

        let backend = {
            let mut pending = self.lock_pending();
            if pending.closed {
                return Err(RpcError::BridgeClosed);
            }
            let backend = self.lock_backend().clone().ok_or(RpcError::BackendNotRunning)?;
            if pending.queries.contains_key(&query_id) {
                return Err(RpcError::DuplicateQuery(query_id));
            }
            pending.queries.insert(query_id, Query::new(query_id, payload));
            backend
        };

        debug!(query_id, method = %query.method, endpoint = %query.endpoint, "dispatching call");
        let pending = Arc::clone(&self.pending);
        let spawned = std::thread::Builder::new()
            .name(format!("devbridge-call-{query_id}"))
            .spawn(move || run_call(&pending, backend.as_ref(), query_id, query));

        if let Err(e) = spawned {
            self.lock_pending().queries.remove(&query_id);
            return Err(RpcError::Dispatch { id: query_id, reason: e.to_string() });
        }
        Ok(())
    }

    /// Delivers the response for `query_id`, once.
    pub fn respond(&self, query_id: QueryId, payload: String) {
        let mut pending = self.lock_pending();
        if pending.closed {
            warn!(query_id, "bridge closed; discarding late response");
            return;
        }
        let Some(query) = pending.queries.remove(&query_id) else {
            warn!(query_id, "discarding response for unknown or already answered query");
            return;
        };
        debug!(query_id, elapsed_ms = query.created_at.elapsed().as_millis() as u64, "response");
        if self.sender.send(ClientEvent::Response(Response { id: query_id, payload })).is_err() {
            warn!(query_id, "client context is gone; response dropped");
        }
    }

    /// Delivers an unsolicited notification.
    pub fn push_notify(&self, payload: String) {
        self.post(ClientEvent::Notification(PushNotification { payload }));
    }

    /// Queues any client event.  Ignored after close.
    pub fn post(&self, event: ClientEvent) {
        let pending = self.lock_pending();
        if pending.closed {
            debug!(?event, "bridge closed; dropping client event");
            return;
        }
        if self.sender.send(event).is_err() {
            warn!("client context is gone; event dropped");
        }
    }

    /// Stops all delivery and detaches the backend.  Returns the IDs of the
    /// calls that never got a response, in ascending order.
    pub fn close(&self) -> Vec<QueryId> {
        let abandoned = {
            let mut pending = self.lock_pending();
            pending.closed = true;
            let mut ids: Vec<QueryId> = pending.queries.drain().map(|(id, _)| id).collect();
            ids.sort_unstable();
            ids
        };
        self.lock_backend().take();
        abandoned
    }

    pub fn is_closed(&self) -> bool {
        self.lock_pending().closed
    }

    pub fn outstanding_count(&self) -> usize {
        self.lock_pending().queries.len()
    }

    pub fn is_outstanding(&self, query_id: QueryId) -> bool {
        self.lock_pending().queries.contains_key(&query_id)
    }
}

impl NativeCommunication for RpcBridge {
    fn respond(&self, query_id: QueryId, payload: String) {
        RpcBridge::respond(self, query_id, payload);
    }

    fn push_notify(&self, payload: String) {
        RpcBridge::push_notify(self, payload);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
