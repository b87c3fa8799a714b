//! Domain Layer - access requests, routing and verdicts.

pub mod errors;
pub mod request;
pub mod verdict;

pub use errors::{PayloadError, UpstreamError};
pub use request::{AccessRequest, Endpoint, ROLE_POINTER, VISITOR_ROLE};
pub use verdict::{AccessVerdict, MalformedPayloadPolicy};
