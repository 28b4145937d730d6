// Integration tests for `RelayClient` using wiremock.
#![allow(clippy::unwrap_used)]

use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use donapix_api::{Error, RelayClient, ServerConversion};

fn purchase() -> ServerConversion {
    ServerConversion {
        pixel_id: "123456".into(),
        access_token: Some("EAAG-token".into()),
        event_name: "Purchase".into(),
        event_id: "purchase_tx_1_1700000000000_7".into(),
        value: Some(100.0),
        currency: Some("BRL".into()),
        transaction_id: Some("tx_1".into()),
        customer_email: None,
        customer_name: Some("Ana Souza".into()),
        source_url: Some("https://doe.example/campanha".into()),
        fbc: Some("fb.1.1700000000000.abc".into()),
        fbp: None,
    }
}

#[tokio::test]
async fn test_track_conversion_posts_camel_case_body() {
    let server = MockServer::start().await;
    let client = RelayClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();

    Mock::given(method("POST"))
        .and(path("/track-conversion"))
        .and(body_json(json!({
            "pixelId": "123456",
            "accessToken": "EAAG-token",
            "eventName": "Purchase",
            "eventId": "purchase_tx_1_1700000000000_7",
            "value": 100.0,
            "currency": "BRL",
            "transactionId": "tx_1",
            "customerName": "Ana Souza",
            "sourceUrl": "https://doe.example/campanha",
            "fbc": "fb.1.1700000000000.abc"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    client.track_conversion(&purchase()).await.unwrap();
}

#[tokio::test]
async fn test_track_conversion_reports_http_failure() {
    let server = MockServer::start().await;
    let client = RelayClient::from_reqwest(&server.uri(), reqwest::Client::new()).unwrap();

    Mock::given(method("POST"))
        .and(path("/track-conversion"))
        .respond_with(ResponseTemplate::new(500).set_body_string("capi down"))
        .mount(&server)
        .await;

    let err = client.track_conversion(&purchase()).await.unwrap_err();
    match err {
        Error::Backend { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "capi down");
        }
        other => panic!("expected Backend, got {other:?}"),
    }
}
