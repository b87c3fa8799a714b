//! # Access Control Subsystem
//!
//! Resource dispatch and the `accessControl` resource: routes a device's
//! access request to the employee or visitor authority and relays the
//! verdict.
//!
//! ## Architecture
//!
//! - **Domain Layer:** [`AccessRequest`] parsing, [`Endpoint`] routing,
//!   [`AccessVerdict`]
//! - **Ports Layer:** [`Resource`] (inbound), [`AccessAuthority`] (outbound)
//! - **Service Layer:** [`ResourceDispatcher`], [`AccessControlResource`]
//! - **Adapters Layer:** [`HttpAccessAuthority`]
//!
//! ## Failure policy
//!
//! Every payload or upstream failure is absorbed here and answered with a
//! well-formed `{"granted": false}`; nothing above the transport ever turns
//! into a protocol fault.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

/// Scripted authority for tests.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::HttpAccessAuthority;
pub use domain::{
    AccessRequest, AccessVerdict, Endpoint, MalformedPayloadPolicy, PayloadError, UpstreamError,
};
pub use ports::{AccessAuthority, Resource};
pub use service::{
    gateway_dispatcher, AccessControlResource, ResourceDispatcher, ACCESS_CONTROL_PATH,
};
