//! ABOUTME: Telegram delivery tests against a local wiremock Bot API
//! ABOUTME: Verifies payload shape, error mapping and retry behavior

use sb_config::TelegramConfig;
use sb_notify::{
    Message, Notifier, NotifyError, RetryConfig, RetryWrapper, TelegramNotifier,
};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn notifier_for(server: &MockServer) -> TelegramNotifier {
    TelegramNotifier::new(TelegramConfig {
        bot_token: Some("123:abc".to_string()),
        chat_id: Some("-1001".to_string()),
        api_base: server.uri(),
    })
}

#[tokio::test]
async fn test_send_posts_html_message_to_chat() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bot123:abc/sendMessage"))
        .and(body_json(json!({
            "chat_id": "-1001",
            "text": "<b>Hello</b>",
            "parse_mode": "HTML"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    notifier_for(&server)
        .send(&Message::new("Feedback", "<b>Hello</b>"))
        .await
        .expect("delivered");
}

#[tokio::test]
async fn test_api_rejection_maps_to_telegram_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("chat not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier_for(&server)
        .send(&Message::new("Feedback", "text"))
        .await
        .expect_err("rejected");
    match err {
        NotifyError::Telegram { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "chat not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_retry_wrapper_recovers_from_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let wrapper = RetryWrapper::with_config(
        notifier_for(&server),
        RetryConfig {
            max_attempts: 4,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            multiplier: 2.0,
        },
    );
    wrapper
        .send(&Message::new("Feedback", "text"))
        .await
        .expect("delivered on third attempt");

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 3);
}
