use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use kwtag_types::Tag;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use kwtagger::classifier::{ChatClassifier, Classifier, ClassifierConfig};

#[derive(Clone)]
struct Stub {
    reply: Value,
    status: StatusCode,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn completions(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    stub.seen.lock().unwrap().push((auth, body));
    (stub.status, Json(stub.reply.clone()))
}

async fn serve(stub: Stub) -> String {
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(stub);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
}

fn stub(content: Value, status: StatusCode) -> Stub {
    Stub {
        reply: json!({"choices": [{"message": {"role": "assistant", "content": content}}]}),
        status,
        seen: Arc::new(Mutex::new(Vec::new())),
    }
}

async fn slow_completions() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"choices": [{"message": {"content": "brand"}}]}))
}

fn classifier_with_timeout(base_url: String, timeout: Duration) -> ChatClassifier {
    ChatClassifier::new(ClassifierConfig {
        api_key: "test-key".into(),
        base_url,
        model: "test-model".into(),
        timeout,
    })
    .unwrap()
}

fn classifier(base_url: String) -> ChatClassifier {
    classifier_with_timeout(base_url, Duration::from_secs(5))
}

#[tokio::test]
async fn returns_validated_tag() {
    let stub = stub(json!(" Brand\n"), StatusCode::OK);
    let seen = Arc::clone(&stub.seen);
    let base_url = serve(stub).await;

    let tag = classifier(base_url)
        .classify("trailrunner", "trailrunner vest")
        .await;
    assert_eq!(tag, Some(Tag::Brand));

    let seen = seen.lock().unwrap();
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(body["model"], "test-model");
    assert_eq!(body["temperature"], 0.0);
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("\"trailrunner vest\""));
}

#[tokio::test]
async fn none_and_unknown_labels_yield_nothing() {
    let base_url = serve(stub(json!("None"), StatusCode::OK)).await;
    assert_eq!(classifier(base_url).classify("x", "x y").await, None);

    let base_url = serve(stub(json!("material"), StatusCode::OK)).await;
    assert_eq!(classifier(base_url).classify("x", "x y").await, None);

    let base_url = serve(stub(Value::Null, StatusCode::OK)).await;
    assert_eq!(classifier(base_url).classify("x", "x y").await, None);
}

#[tokio::test]
async fn service_errors_degrade_to_none() {
    let base_url = serve(stub(json!("brand"), StatusCode::TOO_MANY_REQUESTS)).await;
    assert_eq!(classifier(base_url).classify("x", "x y").await, None);

    let unreachable = classifier("http://127.0.0.1:9/v1".to_string());
    assert_eq!(unreachable.classify("x", "x y").await, None);
}

#[tokio::test]
async fn slow_service_times_out_to_none() {
    let app = Router::new().route("/v1/chat/completions", post(slow_completions));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let slow = classifier_with_timeout(format!("http://{addr}/v1"), Duration::from_millis(100));
    let tag = tokio::time::timeout(Duration::from_secs(2), slow.classify("x", "x y"))
        .await
        .expect("classifier should give up after its own timeout");
    assert_eq!(tag, None);
}
