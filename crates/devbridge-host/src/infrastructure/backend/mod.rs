//! Backend launchers.

pub mod loopback;
