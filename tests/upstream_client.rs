use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use impact_accelerator::error::UpstreamError;
use impact_accelerator::upstream::{InferenceBackend, UpstreamClient, UpstreamSettings};
use serde_json::{Value, json};
use std::time::Duration;

// Serve `app` on an ephemeral port and return the generate URL.
async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/generate")
}

fn client(url: String, api_key: Option<&str>) -> UpstreamClient {
    UpstreamClient::new(UpstreamSettings {
        url,
        api_key: api_key.map(str::to_string),
        model: "impact-test".to_string(),
        ..UpstreamSettings::default()
    })
    .unwrap()
}

#[tokio::test]
async fn returns_model_text_on_success() {
    let app = Router::new().route(
        "/api/generate",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            assert_eq!(body["model"], "impact-test");
            assert_eq!(body["stream"], false);
            assert_eq!(body["format"], "json");
            assert_eq!(
                headers.get("authorization").and_then(|v| v.to_str().ok()),
                Some("Bearer secret")
            );
            let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
            Json(json!({"model": "impact-test", "response": format!("echo: {prompt}")}))
        }),
    );
    let url = serve(app).await;

    let raw = client(url, Some("secret"))
        .invoke("Product: Cola", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(raw.model.as_deref(), Some("impact-test"));
    assert_eq!(raw.text, "echo: Product: Cola");
}

#[tokio::test]
async fn non_success_status_is_reported() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
    );
    let url = serve(app).await;

    let err = client(url, None)
        .invoke("Product: Cola", Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Status(500)));
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let app = Router::new().route(
        "/api/generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"response": "{}"}))
        }),
    );
    let url = serve(app).await;

    let err = client(url, None)
        .invoke("Product: Cola", Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::Timeout(_)));
}

#[tokio::test]
async fn unexpected_body_is_not_a_success() {
    let app = Router::new().route("/api/generate", post(|| async { "not json at all" }));
    let url = serve(app).await;

    let result = client(url, None)
        .invoke("Product: Cola", Duration::from_secs(2))
        .await;
    assert!(result.is_err());
}
