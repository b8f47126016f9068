//! A small in-process backend used by the headless binary and the tests.
//!
//! It answers a handful of endpoints so the whole call path can be
//! exercised without the real wallet backend:
//!
//! | Method | Endpoint          | Response                                   |
//! |--------|-------------------|--------------------------------------------|
//! | GET    | `ping`            | `"pong"` (a JSON string)                   |
//! | GET    | `online`          | `true` / `false` as last reported          |
//! | GET    | `device/info`     | descriptor JSON of the active device, or `null` |
//! | POST   | `device/exchange` | writes `body`, reads the same number of bytes back |
//!
//! Every response body is valid JSON so clients can embed it directly.
//!
//! Device changes are announced with a `{"subject": "devices/registered",
//! "action": "reload"}` push notification.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use devbridge_core::{
    ApiMethod, ApiQuery, Backend, BackendError, BackendLauncher, LifecycleError, QueryId,
    StartContext,
};
use serde_json::json;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct LoopbackBackend {
    context: StartContext,
    online: AtomicBool,
    usb_updates: AtomicUsize,
    close_count: AtomicUsize,
    handled_uris: Mutex<Vec<String>>,
    auth_results: Mutex<Vec<bool>>,
}

impl LoopbackBackend {
    pub fn new(context: StartContext) -> Self {
        Self {
            context,
            online: AtomicBool::new(false),
            usb_updates: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            handled_uris: Mutex::new(Vec::new()),
            auth_results: Mutex::new(Vec::new()),
        }
    }

    pub fn session_token(&self) -> &str {
        &self.context.session_token
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn usb_update_count(&self) -> usize {
        self.usb_updates.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    pub fn handled_uris(&self) -> Vec<String> {
        lock(&self.handled_uris).clone()
    }

    pub fn auth_results(&self) -> Vec<bool> {
        lock(&self.auth_results).clone()
    }

    fn route(&self, query: &ApiQuery) -> String {
        match (query.method, query.endpoint.as_str()) {
            (ApiMethod::Get, "ping") => json!("pong").to_string(),
            (ApiMethod::Get, "online") => self.is_online().to_string(),
            (ApiMethod::Get, "device/info") => self.device_info_json(),
            (ApiMethod::Post, "device/exchange") => self.exchange(query.body.as_bytes()),
            (method, endpoint) => {
                json!({ "error": format!("no route for {method} {endpoint}") }).to_string()
            }
        }
    }

    fn device_info_json(&self) -> String {
        match self.context.environment.device_info() {
            Some(info) => json!({
                "identifier": info.identifier(),
                "vendorId": info.vendor_id(),
                "productId": info.product_id(),
                "product": info.product(),
                "manufacturer": info.manufacturer(),
                "serial": info.serial(),
                "interface": info.interface(),
                "usagePage": info.usage_page(),
            })
            .to_string(),
            None => "null".to_string(),
        }
    }

    fn exchange(&self, request: &[u8]) -> String {
        let Some(info) = self.context.environment.device_info() else {
            return json!({ "error": "no device" }).to_string();
        };
        let result = info.open().and_then(|rw| {
            let written = rw.write(request)?;
            let reply = rw.read(written);
            rw.close()?;
            reply
        });
        match result {
            Ok(reply) => json!({ "reply": String::from_utf8_lossy(&reply) }).to_string(),
            Err(e) => {
                warn!(error = %e, "device exchange failed");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }
}

impl Backend for LoopbackBackend {
    fn handle_call(&self, query_id: QueryId, query: ApiQuery) {
        let response = self.route(&query);
        self.context.communication.respond(query_id, response);
    }

    fn handle_uri(&self, uri: &str) {
        debug!(uri, "handling deep link");
        lock(&self.handled_uris).push(uri.to_string());
    }

    fn trigger_auth(&self) {
        self.context.environment.auth();
    }

    fn cancel_auth(&self) {
        debug!("authentication cancelled");
    }

    fn auth_result(&self, ok: bool) {
        lock(&self.auth_results).push(ok);
    }

    fn usb_update(&self) {
        self.usb_updates.fetch_add(1, Ordering::SeqCst);
        let payload = json!({ "subject": "devices/registered", "action": "reload" });
        self.context.communication.push_notify(payload.to_string());
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn using_mobile_data_changed(&self) {
        let metered = self.context.environment.using_mobile_data();
        debug!(metered, "mobile data status refreshed");
    }

    fn manual_reconnect(&self) {
        info!("manual reconnect requested");
    }

    fn close(&self) -> Result<(), BackendError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launches [`LoopbackBackend`]s and keeps a handle to the latest one.
#[derive(Default)]
pub struct LoopbackLauncher {
    launches: AtomicUsize,
    fail_next: AtomicBool,
    backend: Mutex<Option<Arc<LoopbackBackend>>>,
}

impl LoopbackLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Makes the next `launch` fail.
    pub fn fail_next_launch(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn backend(&self) -> Option<Arc<LoopbackBackend>> {
        lock(&self.backend).clone()
    }

    pub fn last_session_token(&self) -> Option<String> {
        self.backend().map(|b| b.session_token().to_string())
    }
}

impl BackendLauncher for LoopbackLauncher {
    fn launch(&self, context: StartContext) -> Result<Arc<dyn Backend>, LifecycleError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(LifecycleError::LaunchFailed("loopback launch refused".to_string()));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        let backend = Arc::new(LoopbackBackend::new(context));
        *lock(&self.backend) = Some(Arc::clone(&backend));
        Ok(backend)
    }
}
