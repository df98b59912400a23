use promo_http::{Auth, HttpClient, HttpError, RequestOpts};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::new(&format!("{}/", server.uri()))
        .expect("mock base url")
        .with_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn posts_json_with_bearer_and_decodes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(header("authorization", "Bearer ya29.token"))
        .and(body_json(json!({ "summary": "x" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "evt-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let created: Created = client_for(&server)
        .post_json_opts(
            "calendars/primary/events",
            &json!({ "summary": "x" }),
            RequestOpts {
                auth: Some(Auth::Bearer("ya29.token")),
                ..Default::default()
            },
        )
        .await
        .expect("created");
    assert_eq!(created.id, "evt-1");
}

#[tokio::test]
async fn secret_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("x-webhook-secret", "s3cret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let status = client_for(&server)
        .post_json_discard(
            "hook",
            &json!({ "title": "t", "date": "2024-12-25" }),
            RequestOpts {
                auth: Some(Auth::secret_header("X-Webhook-Secret", "s3cret").unwrap()),
                ..Default::default()
            },
        )
        .await
        .expect("accepted");
    assert_eq!(status.as_u16(), 204);
}

#[tokio::test]
async fn retries_server_errors_then_gives_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({ "error": { "message": "backend down" } })),
        )
        .expect(2)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .with_retries(1)
        .post_json_discard("flaky", &json!({}), RequestOpts::default())
        .await
        .unwrap_err();

    match err {
        HttpError::Api { status, message, .. } => {
            assert_eq!(status.as_u16(), 503);
            assert_eq!(message, "backend down");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/denied"))
        .respond_with(ResponseTemplate::new(401).set_body_string("nope"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .post_json_discard("denied", &json!({}), RequestOpts::default())
        .await
        .unwrap_err();
    assert_eq!(err.status().map(|s| s.as_u16()), Some(401));
}

#[tokio::test]
async fn form_posts_are_url_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "tok" })))
        .expect(1)
        .mount(&server)
        .await;

    let got: Created = client_for(&server)
        .post_form_opts(
            "token",
            &json!({ "grant_type": "refresh_token" }),
            RequestOpts::default(),
        )
        .await
        .expect("token");
    assert_eq!(got.id, "tok");
}
