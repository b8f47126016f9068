//! Client context: the single consumer of everything the RPC bridge delivers.
//!
//! # How delivery to the client works (for beginners)
//!
//! The backend answers calls on its own worker threads, but a UI shell
//! (a web view, a terminal front-end, a test) must only ever be touched from
//! one place at a time.  The [`RpcBridge`] therefore never calls the client
//! directly.  It pushes [`ClientEvent`]s into a channel, and the
//! [`ClientContext`] owns the receiving end:
//!
//! ```text
//! backend threads ──► RpcBridge ──► channel ──► ClientContext ──► ClientHandler
//! ```
//!
//! The client may come and go (a window is closed and reopened) while the
//! backend keeps running.  With no [`ClientHandler`] attached the context
//! simply does not read from the channel, so events stay queued in order and
//! are delivered once a handler is attached again.
//!
//! # Web view scripts
//!
//! A web-view client receives responses and notifications as JavaScript
//! calls.  [`script_for`] renders an event into the script a web view
//! evaluates:
//!
//! ```js
//! if (window.onMobileCallResponse) { window.onMobileCallResponse(7, {"ok":true}) };
//! ```
//!
//! [`RpcBridge`]: crate::application::rpc_bridge::RpcBridge

use devbridge_core::{PushNotification, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::rpc_bridge::ClientEvent;

// ── Client-facing state ───────────────────────────────────────────────────────

/// UI state the client mirrors from host events.
///
/// Serialisable so a UI shell can receive it as a JSON snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    /// The authentication prompt is currently requested.
    pub auth_requested: bool,
    /// The user setting that gates the app behind authentication.
    pub auth_setting_enabled: bool,
    pub dark_theme: bool,
}

impl ClientState {
    /// Applies a state-changing event.  Returns `false` for responses and
    /// notifications, which carry no UI state.
    fn apply(&mut self, event: &ClientEvent) -> bool {
        match event {
            ClientEvent::AuthRequested => self.auth_requested = true,
            ClientEvent::AuthClosed => self.auth_requested = false,
            ClientEvent::AuthSettingChanged(enabled) => self.auth_setting_enabled = *enabled,
            ClientEvent::DarkThemeChanged(dark) => self.dark_theme = *dark,
            ClientEvent::Response(_) | ClientEvent::Notification(_) => return false,
        }
        true
    }
}

/// Receives client events, always from the thread driving the
/// [`ClientContext`].
pub trait ClientHandler: Send {
    fn on_response(&mut self, response: &Response);

    fn on_notification(&mut self, notification: &PushNotification);

    /// Called after an auth or theme event has been applied to `state`.
    fn on_state_changed(&mut self, _state: &ClientState) {}
}

// ── Client context ────────────────────────────────────────────────────────────

pub struct ClientContext {
    receiver: mpsc::UnboundedReceiver<ClientEvent>,
    handler: Option<Box<dyn ClientHandler>>,
    state: ClientState,
}

impl ClientContext {
    pub fn new(receiver: mpsc::UnboundedReceiver<ClientEvent>) -> Self {
        Self { receiver, handler: None, state: ClientState::default() }
    }

    /// Attaches `handler`, replacing any previous one.
    pub fn attach_handler(&mut self, handler: Box<dyn ClientHandler>) {
        if self.handler.replace(handler).is_some() {
            debug!("replaced client handler");
        }
    }

    /// Detaches the current handler.  Events arriving afterwards stay
    /// queued until a handler is attached again.
    pub fn detach_handler(&mut self) -> Option<Box<dyn ClientHandler>> {
        self.handler.take()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Delivers every event already queued, without waiting.
    ///
    /// Returns the number of events delivered.  Delivers nothing while no
    /// handler is attached.
    pub fn drain(&mut self) -> usize {
        if self.handler.is_none() {
            return 0;
        }
        let mut delivered = 0;
        while let Ok(event) = self.receiver.try_recv() {
            self.dispatch(event);
            delivered += 1;
        }
        delivered
    }

    /// Waits for the next event and delivers it.
    ///
    /// Returns `false` without waiting if no handler is attached, or once
    /// the bridge is gone and the queue is empty.
    pub async fn deliver_next(&mut self) -> bool {
        if self.handler.is_none() {
            warn!("no client handler attached; not delivering");
            return false;
        }
        match self.receiver.recv().await {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => false,
        }
    }

    /// Delivers events until the bridge is dropped.  Returns the number of
    /// events delivered.
    pub async fn run_until_closed(&mut self) -> usize {
        let mut delivered = 0;
        while self.deliver_next().await {
            delivered += 1;
        }
        delivered
    }

    fn dispatch(&mut self, event: ClientEvent) {
        let state_changed = self.state.apply(&event);
        let Some(handler) = self.handler.as_mut() else {
            return;
        };
        match &event {
            ClientEvent::Response(response) => handler.on_response(response),
            ClientEvent::Notification(notification) => handler.on_notification(notification),
            _ if state_changed => handler.on_state_changed(&self.state),
            _ => {}
        }
    }
}

// ── Web view scripts ──────────────────────────────────────────────────────────

/// Renders `event` as the script a web-view client evaluates.
///
/// Payloads are JSON produced by the backend and are embedded as-is.  State
/// events have no script; the UI shell handles them natively.
pub fn script_for(event: &ClientEvent) -> Option<String> {
    match event {
        ClientEvent::Response(response) => Some(format!(
            "if (window.onMobileCallResponse) {{ window.onMobileCallResponse({}, {}) }};",
            response.id, response.payload
        )),
        ClientEvent::Notification(notification) => Some(format!(
            "if (window.onMobilePushNotification) {{ window.onMobilePushNotification({}) }};",
            notification.payload
        )),
        _ => None,
    }
}

/// A [`ClientHandler`] that turns responses and notifications into web
/// view scripts and passes them to `evaluate`.
pub struct ScriptHandler<F> {
    evaluate: F,
}

impl<F: FnMut(String) + Send> ScriptHandler<F> {
    pub fn new(evaluate: F) -> Self {
        Self { evaluate }
    }
}

impl<F: FnMut(String) + Send> ClientHandler for ScriptHandler<F> {
    fn on_response(&mut self, response: &Response) {
        if let Some(script) = script_for(&ClientEvent::Response(response.clone())) {
            (self.evaluate)(script);
        }
    }

    fn on_notification(&mut self, notification: &PushNotification) {
        if let Some(script) = script_for(&ClientEvent::Notification(notification.clone())) {
            (self.evaluate)(script);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
