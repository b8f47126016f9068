//! Domain entities for devbridge.
//!
//! Pure data with no I/O.  Code in the host crate depends on these types,
//! but nothing here depends on the host.

/// USB device descriptors, permission state and the vendor/product filter.
pub mod device;

/// Network reachability snapshots.
pub mod connectivity;

/// Client queries, backend responses and push notifications.
pub mod query;
