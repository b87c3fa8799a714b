//! Exact-path resource routing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use gw_02_message_exchange::{Code, Message, Method, RequestHandler};
use tracing::debug;

use crate::ports::Resource;

#[derive(Default)]
pub struct ResourceDispatcher {
    resources: HashMap<String, Arc<dyn Resource>>,
}

impl ResourceDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` under `path` ("a/b", no leading slash).
    /// Replaces any resource already there.
    pub fn register(&mut self, path: impl Into<String>, resource: Arc<dyn Resource>) -> &mut Self {
        let path = path.into().trim_matches('/').to_string();
        self.resources.insert(path, resource);
        self
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Route `request` to its resource. Unknown paths get a Reset
    /// carrying 4.04.
    pub async fn dispatch(&self, peer: SocketAddr, request: Message) -> Message {
        let path = request.uri_path();
        let Some(resource) = self.resources.get(&path) else {
            debug!(%peer, path = %path, "no resource registered");
            return Message::reset(request.message_id, Code::NOT_FOUND);
        };

        debug!(%peer, path = %path, code = %request.code, "dispatching");
        match request.code.method() {
            Some(Method::Get) => resource.handle_get(peer, &request).await,
            Some(Method::Post) => resource.handle_post(peer, &request).await,
            Some(Method::Put) => resource.handle_put(peer, &request).await,
            Some(Method::Delete) => resource.handle_delete(peer, &request).await,
            None => Message::response(Code::METHOD_NOT_ALLOWED),
        }
    }
}

#[async_trait]
impl RequestHandler for ResourceDispatcher {
    async fn handle(&self, peer: SocketAddr, request: Message) -> Message {
        self.dispatch(peer, request).await
    }
}
