use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use gw_02_message_exchange::{content_format, Code, Message, MessageType, Method, RequestHandler};
use proptest::prelude::*;

use super::{gateway_dispatcher, AccessControlResource, ResourceDispatcher, ACCESS_CONTROL_PATH};
use crate::domain::{AccessVerdict, Endpoint, MalformedPayloadPolicy, UpstreamError};
use crate::ports::Resource;
use crate::test_utils::ScriptedAuthority;

fn peer() -> SocketAddr {
    SocketAddr::from(([10, 1, 1, 1], 5684))
}

fn access_request(method: Method, payload: &str) -> Message {
    Message::request(MessageType::Confirmable, method, 0x3344, ACCESS_CONTROL_PATH)
        .with_token(vec![0x01])
        .with_payload(payload)
}

fn granting_employees() -> ScriptedAuthority {
    ScriptedAuthority::new().respond(Endpoint::Employee, Ok(AccessVerdict::granted()))
}

async fn post_with(
    authority: Arc<ScriptedAuthority>,
    policy: MalformedPayloadPolicy,
    payload: &str,
) -> Message {
    let dispatcher = gateway_dispatcher(authority, policy);
    dispatcher
        .dispatch(peer(), access_request(Method::Post, payload))
        .await
}

// =============================================================================
// DISPATCHER
// =============================================================================

#[tokio::test]
async fn test_unregistered_path_is_reset_not_found() {
    let dispatcher = gateway_dispatcher(
        Arc::new(ScriptedAuthority::new()),
        MalformedPayloadPolicy::Forward,
    );
    let request = Message::request(MessageType::Confirmable, Method::Post, 0x0101, "doors");

    let reply = dispatcher.dispatch(peer(), request).await;
    assert_eq!(reply.message_type, MessageType::Reset);
    assert_eq!(reply.message_id, 0x0101);
    assert_eq!(reply.code, Code::NOT_FOUND);
}

#[tokio::test]
async fn test_path_match_is_exact() {
    let dispatcher = gateway_dispatcher(
        Arc::new(granting_employees()),
        MalformedPayloadPolicy::Forward,
    );
    for path in ["accesscontrol", "accessControl/extra", ""] {
        let request = Message::request(MessageType::Confirmable, Method::Post, 1, path);
        let reply = dispatcher.dispatch(peer(), request).await;
        assert_eq!(reply.message_type, MessageType::Reset, "path {path:?}");
    }
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let authority = Arc::new(granting_employees());
    let dispatcher = gateway_dispatcher(authority.clone(), MalformedPayloadPolicy::Forward);

    for method in [Method::Get, Method::Put, Method::Delete] {
        let reply = dispatcher
            .dispatch(peer(), access_request(method, r#"{"UAT":{"RL":"Employee"}}"#))
            .await;
        assert_eq!(reply.code, Code::METHOD_NOT_ALLOWED);
    }
    assert_eq!(authority.call_count(), 0);
}

#[tokio::test]
async fn test_dispatcher_returns_resource_response_unchanged() {
    struct Fixed;

    #[async_trait::async_trait]
    impl Resource for Fixed {
        async fn handle_get(&self, _peer: SocketAddr, request: &Message) -> Message {
            Message::response(Code::CONTENT).with_payload(request.payload.clone())
        }
    }

    let mut dispatcher = ResourceDispatcher::new();
    dispatcher.register("/sensors/temp/", Arc::new(Fixed));
    assert_eq!(dispatcher.paths().collect::<Vec<_>>(), vec!["sensors/temp"]);

    let request = Message::request(MessageType::NonConfirmable, Method::Get, 2, "sensors/temp")
        .with_payload("21.5");
    let reply = dispatcher.handle(peer(), request).await;
    assert_eq!(reply, Message::response(Code::CONTENT).with_payload("21.5"));
}

// =============================================================================
// ACCESS CONTROL
// =============================================================================

#[tokio::test]
async fn test_employee_granted_is_relayed() {
    let authority = Arc::new(granting_employees());
    let payload = r#"{"UAT":{"RL":"Employee"}}"#;
    let reply = post_with(authority.clone(), MalformedPayloadPolicy::Forward, payload).await;

    assert_eq!(reply.code, Code::CONTENT);
    assert_eq!(reply.content_format(), Some(content_format::APPLICATION_JSON));
    assert_eq!(reply.payload_str(), Some("{\n  \"granted\": true\n}"));
    assert_eq!(authority.calls(), vec![(Endpoint::Employee, payload.to_string())]);
}

#[tokio::test]
async fn test_visitor_routed_to_visitor_endpoint() {
    let authority = Arc::new(
        ScriptedAuthority::new().respond(Endpoint::Visitor, Ok(AccessVerdict::granted())),
    );
    let reply = post_with(
        authority.clone(),
        MalformedPayloadPolicy::Forward,
        r#"{"UAT":{"RL":"Visitor"}}"#,
    )
    .await;

    let verdict: AccessVerdict = serde_json::from_slice(&reply.payload).unwrap();
    assert!(verdict.granted);
    assert_eq!(authority.calls()[0].0, Endpoint::Visitor);
}

#[tokio::test]
async fn test_every_upstream_failure_denies() {
    let failures = [
        UpstreamError::Timeout,
        UpstreamError::Unreachable("connection refused".into()),
        UpstreamError::Status(500),
        UpstreamError::Decode("expected value".into()),
        UpstreamError::Transport("reset".into()),
    ];
    for failure in failures {
        let authority = Arc::new(ScriptedAuthority::new().respond(Endpoint::Employee, Err(failure)));
        let resource = AccessControlResource::new(authority, MalformedPayloadPolicy::Forward);
        let verdict = resource.decide(br#"{"UAT":{"RL":"Employee"}}"#).await;
        assert_eq!(verdict, AccessVerdict::denied());
    }
}

#[tokio::test]
async fn test_malformed_payload_forwarded_to_default_endpoint() {
    let authority = Arc::new(granting_employees());
    let reply = post_with(authority.clone(), MalformedPayloadPolicy::Forward, "").await;

    // The authority has the last word under the forward policy.
    assert_eq!(reply.payload_str(), Some("{\n  \"granted\": true\n}"));
    assert_eq!(authority.calls(), vec![(Endpoint::Employee, String::new())]);
}

#[tokio::test]
async fn test_malformed_payload_denied_without_upstream_call() {
    let authority = Arc::new(granting_employees());
    for payload in ["", "{oops", r#"{"UAT":{"RL":42}}"#] {
        let reply = post_with(authority.clone(), MalformedPayloadPolicy::Deny, payload).await;
        assert_eq!(reply.code, Code::CONTENT);
        assert_eq!(reply.payload_str(), Some("{\n  \"granted\": false\n}"));
    }
    assert_eq!(authority.call_count(), 0);
}

#[tokio::test]
async fn test_non_utf8_payload_is_forwarded_lossily() {
    let authority = Arc::new(ScriptedAuthority::new());
    let resource = AccessControlResource::new(authority.clone(), MalformedPayloadPolicy::Forward);
    let verdict = resource.decide(&[0xff, 0xfe]).await;

    assert!(!verdict.granted);
    assert_eq!(authority.calls()[0].1, "\u{fffd}\u{fffd}");
}

#[tokio::test(start_paused = true)]
async fn test_slow_upstream_still_answers() {
    let authority = Arc::new(granting_employees().with_delay(Duration::from_secs(3)));
    let reply = post_with(
        authority,
        MalformedPayloadPolicy::Forward,
        r#"{"UAT":{"RL":"Employee"}}"#,
    )
    .await;
    assert_eq!(reply.payload_str(), Some("{\n  \"granted\": true\n}"));
}

proptest! {
    #[test]
    fn prop_routing_follows_role(role in prop_oneof![
        Just("Visitor".to_string()),
        Just("Employee".to_string()),
        "[A-Za-z]{0,10}",
    ]) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let authority = Arc::new(ScriptedAuthority::new());
        let resource = AccessControlResource::new(authority.clone(), MalformedPayloadPolicy::Forward);
        let payload = serde_json::json!({ "UAT": { "RL": role.clone() } }).to_string();

        let verdict = runtime.block_on(resource.decide(payload.as_bytes()));
        prop_assert!(!verdict.granted);

        let expected = if role == "Visitor" { Endpoint::Visitor } else { Endpoint::Employee };
        prop_assert_eq!(authority.calls(), vec![(expected, payload)]);
    }
}
