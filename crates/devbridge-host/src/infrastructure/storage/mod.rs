//! Storage infrastructure: configuration file persistence.
//!
//! The backend is handed a single storage directory.  The host keeps its own
//! settings there too, in `devbridge.toml`, so one directory holds all
//! persisted state.

pub mod config;
