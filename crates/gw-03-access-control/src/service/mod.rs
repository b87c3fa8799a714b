//! Service Layer - dispatcher and the access control resource.

pub mod access_control;
pub mod dispatcher;

pub use access_control::{AccessControlResource, ACCESS_CONTROL_PATH};
pub use dispatcher::ResourceDispatcher;

use std::sync::Arc;

use crate::domain::MalformedPayloadPolicy;
use crate::ports::AccessAuthority;

/// Dispatcher with the access control resource registered.
pub fn gateway_dispatcher(
    authority: Arc<dyn AccessAuthority>,
    policy: MalformedPayloadPolicy,
) -> ResourceDispatcher {
    let mut dispatcher = ResourceDispatcher::new();
    dispatcher.register(
        ACCESS_CONTROL_PATH,
        Arc::new(AccessControlResource::new(authority, policy)),
    );
    dispatcher
}

#[cfg(test)]
mod tests;
