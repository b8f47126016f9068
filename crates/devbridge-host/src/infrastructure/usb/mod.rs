//! USB host adapters.
//!
//! Only the in-memory host lives here.  A platform adapter implements
//! `application::usb_host::{UsbHost, UsbConnection}` on top of the OS USB
//! manager and feeds `DeviceEvent`s into the registry.

pub mod mock;
