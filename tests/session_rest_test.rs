//! Session lifecycle over real HTTP
//!
//! A single `wiremock` server plays the token mint, the streaming provider
//! and the project backend. The controller runs in text mode because the
//! REST adapter has no voice channel.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aihuman::config::{SessionSettings, StreamingConfig};
use aihuman::error::SessionError;
use aihuman::persistence::{HttpProjectStore, PersistenceGateway, SaveNotice, SAVE_PATH};
use aihuman::session::{
    InteractionMode, LifecycleState, SessionController, SessionEvent, TerminationReason,
};
use aihuman::streaming::rest::RestStreamingFactory;
use aihuman::token::{TokenPolicy, TokenProvider, TOKEN_PATH};

mod common;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn mount_provider(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("stream-token"))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/streaming.new"))
        .and(header("authorization", "Bearer stream-token"))
        .and(body_partial_json(json!({
            "avatar_name": "Anna_public_3_20240108",
            "video_encoding": "H264",
            "version": "v2"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"session_id": "sess-1", "url": "wss://media.example/sess-1"}
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/streaming.start"))
        .and(body_partial_json(json!({"session_id": "sess-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": null})))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_stop(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/streaming.stop"))
        .and(body_partial_json(json!({"session_id": "sess-1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
}

fn controller(server: &MockServer) -> SessionController {
    let uri = server.uri();
    let tokens = TokenProvider::new(&uri, TokenPolicy::default()).unwrap();
    let factory = RestStreamingFactory::new(&StreamingConfig {
        api_base: uri.clone(),
        request_timeout_secs: 5,
    })
    .unwrap();
    let store = HttpProjectStore::new(&uri, "user-token", Duration::from_secs(5)).unwrap();

    SessionController::builder(Arc::new(tokens), Arc::new(factory))
        .settings(SessionSettings {
            initial_mode: InteractionMode::Text,
            ..SessionSettings::default()
        })
        .persistence(Arc::new(PersistenceGateway::new(Arc::new(store))))
        .build()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_text_session_speak_and_end() {
    let server = MockServer::start().await;
    mount_provider(&server).await;
    mount_stop(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/streaming.task"))
        .and(body_partial_json(json!({
            "session_id": "sess-1",
            "text": "Hello there",
            "task_type": "talk",
            "task_mode": "sync"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let controller = controller(&server);
    let mut events = controller.subscribe();

    controller.start(common::session_config()).await.unwrap();
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.state, LifecycleState::Active);
    assert_eq!(snapshot.mode, InteractionMode::Text);
    assert_eq!(snapshot.session_id.as_deref(), Some("sess-1"));
    assert!(controller.timer_state().await.is_some());

    controller.speak("  Hello there ").await.unwrap();

    assert!(controller.end(TerminationReason::User).await);
    assert!(!controller.end(TerminationReason::User).await);
    assert_eq!(controller.state().await, LifecycleState::Ended);

    let mut ended = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Ended { .. }) {
            ended += 1;
        }
    }
    assert_eq!(ended, 1);
}

#[tokio::test]
async fn test_manual_save_ends_session() {
    let server = MockServer::start().await;
    mount_provider(&server).await;
    mount_stop(&server).await;
    Mock::given(method("POST"))
        .and(path(SAVE_PATH))
        .and(header("authorization", "Bearer user-token"))
        .and(body_partial_json(json!({"project_name": "Demo"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let controller = controller(&server);
    controller.start(common::session_config()).await.unwrap();

    let notice = controller.save().await.unwrap();
    assert_eq!(notice, SaveNotice::Saved);
    assert_eq!(controller.state().await, LifecycleState::Ended);
    assert_eq!(
        controller.snapshot().await.reason,
        Some(TerminationReason::User)
    );
}

#[tokio::test]
async fn test_rejected_save_keeps_session_alive() {
    let server = MockServer::start().await;
    mount_provider(&server).await;
    mount_stop(&server).await;
    Mock::given(method("POST"))
        .and(path(SAVE_PATH))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"message": "Name already taken"})),
        )
        .mount(&server)
        .await;

    let controller = controller(&server);
    controller.start(common::session_config()).await.unwrap();

    let err = controller.save().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::Save(message)) if message == "Name already taken"
    ));
    assert_eq!(controller.state().await, LifecycleState::Active);

    controller.end(TerminationReason::User).await;
}

#[tokio::test]
async fn test_provider_rejects_avatar() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("stream-token"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/streaming.new"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "unknown avatar"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/streaming.stop"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let controller = controller(&server);
    let err = controller.start(common::session_config()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::SessionStart(message)) if message.contains("unknown avatar")
    ));
    assert_eq!(controller.state().await, LifecycleState::Ended);
}

#[tokio::test]
async fn test_voice_mode_is_refused_by_rest_adapter() {
    let server = MockServer::start().await;
    mount_provider(&server).await;
    mount_stop(&server).await;

    let controller = controller(&server);
    controller.start(common::session_config()).await.unwrap();

    let err = controller.set_mode(InteractionMode::Voice).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SessionError>(),
        Some(SessionError::Command(_))
    ));
    assert_eq!(controller.snapshot().await.mode, InteractionMode::Text);

    controller.end(TerminationReason::User).await;
}
