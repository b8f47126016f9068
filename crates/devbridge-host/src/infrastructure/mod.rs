//! Infrastructure layer for the devbridge host.
//!
//! Contains the adapters around the application layer: USB host and network
//! probe implementations, the platform services behind `Environment`, the
//! TOML configuration store, backend launchers, the client context, and the
//! [`service::HostService`] that wires them together.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `devbridge_core`, but MUST NOT be imported by the `application` layer.

pub mod backend;
pub mod network;
pub mod platform;
pub mod service;
pub mod storage;
pub mod ui_bridge;
pub mod usb;
