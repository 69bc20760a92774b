//! Integration tests for the Herald API.
//!
//! Every test builds its own router over an in-memory SQLite store, an
//! in-memory content source and a mock executor, and drives it with
//! `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use herald_api::create_router;
use herald_api::handlers::{
    AuditResponse, HealthResponse, PublishResponse, ReplyResponse, TriageResponse,
};
use herald_api::state::AppState;
use herald_core::config::HeraldConfig;
use herald_core::types::{AuthorRecord, Category, ItemState, ItemView, RawItem};
use herald_storage::{ItemStore, SqliteStore};
use herald_triage::{ActionExecutor, ActionKind, IngestReport, MemorySource, MockExecutor};

// =============================================================================
// Helpers
// =============================================================================

struct TestApp {
    state: AppState,
    source: Arc<MemorySource>,
    executor: Arc<MockExecutor>,
}

impl TestApp {
    fn new() -> Self {
        Self::with(HeraldConfig::default(), MockExecutor::succeeding())
    }

    fn with(config: HeraldConfig, executor: MockExecutor) -> Self {
        let store: Arc<dyn ItemStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let source = Arc::new(MemorySource::new());
        let executor = Arc::new(executor);
        let state = AppState::new(
            config,
            store,
            source.clone(),
            executor.clone() as Arc<dyn ActionExecutor>,
        );
        Self {
            state,
            source,
            executor,
        }
    }

    fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn ingest(&self, items: &[RawItem]) -> IngestReport {
        let (status, body) = self
            .post("/api/v1/ingest", json!({ "items": items }))
            .await;
        assert_eq!(status, StatusCode::OK, "ingest failed: {}", body);
        serde_json::from_value(body).unwrap()
    }
}

/// Mention number `n`; higher numbers are newer.
fn mention(n: i64, author: &str) -> RawItem {
    raw(n, author, Category::Mention)
}

fn raw(n: i64, author: &str, category: Category) -> RawItem {
    RawItem {
        external_id: format!("{}", 1000 + n),
        author: author.to_string(),
        body: format!("@herald question {}", n),
        url: format!("https://example.net/{}/status/{}", author, 1000 + n),
        created_at: Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
            + chrono::Duration::seconds(n),
        category,
    }
}

fn triage(body: Value) -> TriageResponse {
    serde_json::from_value(body).unwrap()
}

fn authors(resp: &TriageResponse) -> Vec<String> {
    resp.items.iter().map(|i| i.author.clone()).collect()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    app.ingest(&[mention(1, "alice")]).await;

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = serde_json::from_value(body).unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.total_items, 1);
    assert!(!health.version.is_empty());
}

// =============================================================================
// Ingest
// =============================================================================

#[tokio::test]
async fn test_ingest_is_idempotent() {
    let app = TestApp::new();
    let batch = [mention(1, "alice"), mention(2, "@Bob")];

    let first = app.ingest(&batch).await;
    assert_eq!(first.created, 2);
    let second = app.ingest(&batch).await;
    assert_eq!(second.created, 0);
    assert_eq!(second.refreshed, 2);
    assert_eq!(app.state.store.count_items().unwrap(), 2);
}

#[tokio::test]
async fn test_ingest_reports_invalid_items() {
    let app = TestApp::new();
    let mut bad = mention(2, "bob");
    bad.external_id = String::new();

    let report = app.ingest(&[mention(1, "alice"), bad]).await;
    assert_eq!(report.created, 1);
    assert_eq!(report.failures.len(), 1);
}

// =============================================================================
// Unanswered mentions
// =============================================================================

#[tokio::test]
async fn test_unanswered_mentions_dedups_authors() {
    let app = TestApp::new();
    let mut items: Vec<RawItem> = (1..=5).map(|n| mention(n, "alice")).collect();
    items.push(mention(6, "bob"));
    app.ingest(&items).await;

    let (status, body) = app.get("/api/v1/mentions/unanswered?count=5").await;
    assert_eq!(status, StatusCode::OK);
    let resp = triage(body);
    assert_eq!(authors(&resp), vec!["bob", "alice"]);
    assert_eq!(resp.count, 2);
    assert_eq!(resp.items[1].external_id, "1005");

    let (status, body) = app.get("/api/v1/authors/alice").await;
    assert_eq!(status, StatusCode::OK);
    let record: AuthorRecord = serde_json::from_value(body).unwrap();
    assert_eq!(record.skip_count, 4);
    assert!(!record.blocked);
}

#[tokio::test]
async fn test_unanswered_mentions_pulls_from_source() {
    let app = TestApp::new();
    app.source.push(mention(1, "alice"));
    app.source.push(mention(2, "bob"));
    app.source.push(raw(3, "carol", Category::AuthoredPost));

    let (status, body) = app.get("/api/v1/mentions/unanswered").await;
    assert_eq!(status, StatusCode::OK);
    let resp = triage(body);
    assert_eq!(resp.ingest.as_ref().unwrap().created, 2);
    assert!(resp.source_error.is_none());
    assert_eq!(authors(&resp), vec!["bob", "alice"]);
}

#[tokio::test]
async fn test_source_failure_degrades_to_stored_items() {
    let app = TestApp::new();
    app.ingest(&[mention(1, "alice")]).await;
    app.source.set_failure(Some("upstream timeout".to_string()));

    let (status, body) = app.get("/api/v1/mentions/unanswered?count=3").await;
    assert_eq!(status, StatusCode::OK);
    let resp = triage(body);
    assert_eq!(resp.count, 1);
    assert!(resp.ingest.is_none());
    assert!(resp.source_error.unwrap().contains("upstream timeout"));
}

#[tokio::test]
async fn test_unanswered_mentions_username_filter() {
    let app = TestApp::new();
    app.ingest(&[mention(1, "alice"), mention(2, "alice"), mention(3, "bob")])
        .await;

    let (status, body) = app
        .get("/api/v1/mentions/unanswered?count=5&username=@alice")
        .await;
    assert_eq!(status, StatusCode::OK);
    let resp = triage(body);
    assert_eq!(authors(&resp), vec!["alice", "alice"]);

    // The filtered call never skips anything.
    let (status, _) = app.get("/api/v1/authors/alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unanswered_mentions_count_bounds() {
    let app = TestApp::new();
    for uri in [
        "/api/v1/mentions/unanswered?count=0",
        "/api/v1/mentions/unanswered?count=51",
    ] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body["error"], "bad_request");
    }
}

#[tokio::test]
async fn test_blocked_author_is_excluded() {
    let app = TestApp::new();
    // Eleven alice mentions in one window: one selected, ten skipped.
    let items: Vec<RawItem> = (1..=11).map(|n| mention(n, "alice")).collect();
    app.ingest(&items).await;
    app.get("/api/v1/mentions/unanswered?count=4").await;

    let (_, body) = app.get("/api/v1/authors/alice").await;
    let record: AuthorRecord = serde_json::from_value(body).unwrap();
    assert_eq!(record.skip_count, 10);
    assert!(record.blocked);

    let (status, body) = app
        .get("/api/v1/mentions/unanswered?count=5&username=alice")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(triage(body).count, 0);
}

// =============================================================================
// Authored posts
// =============================================================================

#[tokio::test]
async fn test_unanswered_posts_single_author() {
    let app = TestApp::new();
    app.source.push(raw(1, "dave", Category::AuthoredPost));
    app.source.push(raw(2, "dave", Category::AuthoredPost));
    app.source.push(raw(3, "erin", Category::AuthoredPost));

    let (status, body) = app
        .get("/api/v1/users/Dave/posts/unanswered?count=5")
        .await;
    assert_eq!(status, StatusCode::OK);
    let resp = triage(body);
    assert_eq!(resp.count, 2);
    assert!(resp
        .items
        .iter()
        .all(|i| i.author == "dave" && i.category == Category::AuthoredPost));
    assert_eq!(resp.items[0].external_id, "1002");
}

#[tokio::test]
async fn test_unanswered_posts_invalid_username() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/v1/users/bad%20name/posts/unanswered").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.get("/api/v1/users/jane.doe/posts/unanswered").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_ingest_and_triage_share_handle_rule() {
    let app = TestApp::new();
    let report = app
        .ingest(&[
            raw(1, "jane.doe", Category::AuthoredPost),
            raw(2, "Jane_Doe", Category::AuthoredPost),
        ])
        .await;
    assert_eq!(report.created, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].external_id, "1001");

    let (status, body) = app.get("/api/v1/users/jane_doe/posts/unanswered").await;
    assert_eq!(status, StatusCode::OK);
    let resp = triage(body);
    assert_eq!(resp.count, 1);
    assert_eq!(resp.items[0].external_id, "1002");
}

// =============================================================================
// Reply
// =============================================================================

async fn ingest_one(app: &TestApp) -> String {
    app.ingest(&[mention(1, "alice")]).await;
    app.state
        .store
        .get_item_by_external_id("1001")
        .unwrap()
        .unwrap()
        .internal_id
        .to_string()
}

#[tokio::test]
async fn test_reply_by_id_success_then_conflict() {
    let app = TestApp::new();
    let id = ingest_one(&app).await;

    let (status, body) = app
        .post(
            "/api/v1/reply_by_id",
            json!({ "id": id, "text": "Thanks for reaching out!", "quoted": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let reply: ReplyResponse = serde_json::from_value(body).unwrap();
    assert!(reply.success);
    assert_eq!(reply.outcome.external_id, "1001");

    let (status, body) = app.get(&format!("/api/v1/items/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    let view: ItemView = serde_json::from_value(body).unwrap();
    assert_eq!(view.state, ItemState::Acted);
    assert_eq!(view.result_id, Some(reply.outcome.result_id.clone()));

    let (status, body) = app
        .post("/api/v1/reply_by_id", json!({ "id": id, "text": "again" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
    assert_eq!(app.executor.calls(), 1);

    // Acted items never show up in triage again.
    let (_, body) = app.get("/api/v1/mentions/unanswered").await;
    assert_eq!(triage(body).count, 0);
}

#[tokio::test]
async fn test_reply_by_id_errors() {
    let app = TestApp::new();
    let id = ingest_one(&app).await;

    let (status, _) = app
        .post("/api/v1/reply_by_id", json!({ "id": "not-a-uuid", "text": "hi" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/v1/reply_by_id",
            json!({ "id": uuid::Uuid::new_v4().to_string(), "text": "hi" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post("/api/v1/reply_by_id", json!({ "id": id, "text": "   " }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/v1/reply_by_id",
            json!({ "id": id, "text": "x".repeat(281) }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.executor.calls(), 0);
}

#[tokio::test]
async fn test_reply_executor_failure_is_bad_gateway() {
    let app = TestApp::with(HeraldConfig::default(), MockExecutor::failing("403"));
    let id = ingest_one(&app).await;

    let (status, body) = app
        .post("/api/v1/reply_by_id", json!({ "id": id, "text": "hello" }))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "executor_failure");

    let (_, body) = app.get(&format!("/api/v1/items/{}", id)).await;
    assert_eq!(body["state"], "open");
}

#[tokio::test]
async fn test_reply_acted_at_matches_stored_item() {
    let app = TestApp::new();
    let id = ingest_one(&app).await;

    let (_, body) = app
        .post("/api/v1/reply_by_id", json!({ "id": id, "text": "on it" }))
        .await;
    let reply: ReplyResponse = serde_json::from_value(body).unwrap();

    let (_, body) = app.get(&format!("/api/v1/items/{}", id)).await;
    let view: ItemView = serde_json::from_value(body).unwrap();
    assert_eq!(view.acted_at, Some(reply.outcome.acted_at));
}

// =============================================================================
// Post and repost
// =============================================================================

#[tokio::test]
async fn test_post_publishes_and_audits() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/v1/post", json!({ "text": "Maintenance window tonight" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let resp: PublishResponse = serde_json::from_value(body).unwrap();
    assert!(resp.success);
    assert_eq!(resp.outcome.kind, ActionKind::Post);
    assert_eq!(resp.outcome.result_id, "mock-post-1");

    let (_, body) = app.get("/api/v1/audit").await;
    let audit: AuditResponse = serde_json::from_value(body).unwrap();
    assert_eq!(audit.entries.len(), 1);
    assert_eq!(audit.entries[0].metadata["text"], "Maintenance window tonight");

    let (status, _) = app.post("/api/v1/post", json!({ "text": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.executor.calls(), 1);
}

#[tokio::test]
async fn test_repost_keeps_item_open() {
    let app = TestApp::new();
    let id = ingest_one(&app).await;

    let (status, body) = app
        .post("/api/v1/repost", json!({ "external_id": "1001" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let resp: PublishResponse = serde_json::from_value(body).unwrap();
    assert_eq!(resp.outcome.kind, ActionKind::Repost);
    assert_eq!(resp.outcome.external_ref.as_deref(), Some("1001"));

    let (_, body) = app.get(&format!("/api/v1/items/{}", id)).await;
    assert_eq!(body["state"], "open");

    let (status, _) = app
        .post("/api/v1/repost", json!({ "external_id": "" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_post_executor_failure_is_bad_gateway() {
    let app = TestApp::with(HeraldConfig::default(), MockExecutor::failing("503"));
    let (status, body) = app.post("/api/v1/post", json!({ "text": "hello" })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "executor_failure");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replies_single_winner() {
    let app = TestApp::with(
        HeraldConfig::default(),
        MockExecutor::succeeding().with_delay(Duration::from_millis(50)),
    );
    let id = ingest_one(&app).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let router = app.router();
        let body = json!({ "id": id, "text": format!("reply {}", i) }).to_string();
        handles.push(tokio::spawn(async move {
            let req = Request::post("/api/v1/reply_by_id")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap();
            router.oneshot(req).await.unwrap().status()
        }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {}", other),
        }
    }
    assert_eq!(ok, 1);

    let (_, body) = app
        .get(&format!("/api/v1/audit?item_id={}", id))
        .await;
    let audit: AuditResponse = serde_json::from_value(body).unwrap();
    assert_eq!(audit.entries.iter().filter(|e| e.success).count(), 1);
    assert_eq!(audit.entries.len(), app.executor.calls());
}

// =============================================================================
// Items, authors, audit
// =============================================================================

#[tokio::test]
async fn test_get_item_errors() {
    let app = TestApp::new();
    let (status, _) = app.get("/api/v1/items/nope").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .get(&format!("/api/v1/items/{}", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_audit_lists_skips_newest_first() {
    let app = TestApp::new();
    app.ingest(&[mention(1, "alice"), mention(2, "alice"), mention(3, "alice")])
        .await;
    app.get("/api/v1/mentions/unanswered?count=5").await;

    let (status, body) = app.get("/api/v1/audit?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    let audit: AuditResponse = serde_json::from_value(body).unwrap();
    assert_eq!(audit.entries.len(), 2);
    assert!(audit
        .entries
        .iter()
        .all(|e| e.author == "alice" && e.item_internal_id.is_some()));

    let (status, _) = app.get("/api/v1/audit?item_id=bogus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Rate limiting
// =============================================================================

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let mut config = HeraldConfig::default();
    config.api.rate_limit_per_sec = 2;
    let app = TestApp::with(config, MockExecutor::succeeding());
    let router = app.router();

    let mut limited = 0;
    for _ in 0..6 {
        let resp = router
            .clone()
            .oneshot(
                Request::get("/api/v1/audit")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            limited += 1;
        }
    }
    assert!(limited >= 1);

    // Health is not rate limited.
    let resp = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
