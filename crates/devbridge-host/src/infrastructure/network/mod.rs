//! Network probe adapters for the connectivity monitor.

pub mod mock;
