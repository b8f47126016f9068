//! Integration tests for the core domain types through the public API.
//!
//! These check the contracts other crates rely on: query envelope parsing,
//! device filtering, connectivity derivation and the shared shutdown token.

use std::sync::Arc;
use std::thread;

use devbridge_core::{
    ApiMethod, ApiQuery, ConnectivityState, DeviceDescriptor, DeviceFilter, EndpointDescriptor,
    NetworkCapabilities, QueryError, ShutdownToken, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID,
};

fn descriptor(vendor_id: u16, product_id: u16) -> DeviceDescriptor {
    DeviceDescriptor {
        identifier: "/dev/bus/usb/001/004".to_string(),
        vendor_id,
        product_id,
        product: "BitBox02".to_string(),
        manufacturer: "Shift Crypto AG".to_string(),
        serial: "v9.19.0".to_string(),
        interface: 0,
        endpoints: vec![EndpointDescriptor::outbound(0x01), EndpointDescriptor::inbound(0x82)],
    }
}

#[test]
fn test_query_envelope_accepts_get_and_post_only() {
    // Arrange
    let get = r#"{"method":"GET","endpoint":"version"}"#;
    let post = r#"{"method":"POST","endpoint":"accounts/reinitialize","body":"null"}"#;
    let put = r#"{"method":"PUT","endpoint":"version"}"#;

    // Act
    let get = ApiQuery::parse(get).unwrap();
    let post = ApiQuery::parse(post).unwrap();
    let put = ApiQuery::parse(put);

    // Assert
    assert_eq!(get.method, ApiMethod::Get);
    assert_eq!(post.method, ApiMethod::Post);
    assert_eq!(post.body, "null");
    assert_eq!(put, Err(QueryError::UnsupportedMethod("PUT".to_string())));
}

#[test]
fn test_query_envelope_rejects_non_json() {
    assert!(matches!(ApiQuery::parse("ping"), Err(QueryError::Json(_))));
}

#[test]
fn test_default_filter_selects_only_supported_device() {
    let filter = DeviceFilter::default();

    assert!(filter.matches(&descriptor(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID)));
    assert!(!filter.matches(&descriptor(DEFAULT_VENDOR_ID, 0x2402)));
    assert!(!filter.matches(&descriptor(0x046d, DEFAULT_PRODUCT_ID)));
}

#[test]
fn test_descriptor_serializes_for_the_client() {
    let json = serde_json::to_value(descriptor(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID)).unwrap();

    assert_eq!(json["vendor_id"], 0x03eb);
    assert_eq!(json["endpoints"].as_array().map(Vec::len), Some(2));
}

#[test]
fn test_cellular_network_is_online_and_metered() {
    let state = ConnectivityState::from_network(Some(&NetworkCapabilities::cellular()));
    assert_eq!(state, ConnectivityState { online: true, metered: true });
}

#[test]
fn test_no_network_is_offline() {
    assert_eq!(ConnectivityState::from_network(None), ConnectivityState::default());
}

#[test]
fn test_shutdown_token_is_shared_across_threads() {
    // Arrange
    let token = ShutdownToken::new();
    let observer = token.clone();
    let first_cancel = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&first_cancel);

    // Act
    thread::spawn(move || flag.store(token.cancel(), std::sync::atomic::Ordering::SeqCst))
        .join()
        .unwrap();

    // Assert
    assert!(observer.is_cancelled());
    assert!(first_cancel.load(std::sync::atomic::Ordering::SeqCst));
    assert!(!observer.cancel());
}
