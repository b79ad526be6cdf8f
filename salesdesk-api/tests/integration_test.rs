use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use salesdesk_api::{app, AppState};
use salesdesk_core::{ComposerIdentity, ErpOrderAck, GatewayError, SalesOrder};
use salesdesk_order::testing::{InMemoryLookup, RecordingErp, RecordingStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    lookup: Arc<InMemoryLookup>,
    erp: Arc<RecordingErp>,
    store: Arc<RecordingStore>,
}

fn test_app() -> TestApp {
    let lookup = Arc::new(InMemoryLookup::sample());
    let erp = Arc::new(RecordingErp::new());
    let store = Arc::new(RecordingStore::new());
    let state = AppState::new(
        lookup.clone(),
        erp.clone(),
        store.clone(),
        ComposerIdentity::new("E-7", "CO-1"),
        "submitted",
    );
    TestApp {
        router: app(state),
        lookup,
        erp,
        store,
    }
}

async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Polls the session snapshot until `ready` holds for it.
async fn wait_for(router: &Router, id: &str, ready: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..200 {
        let (_, snapshot) = call(router, Method::GET, &format!("/v1/sessions/{id}"), None).await;
        if ready(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session {id} never reached the expected state");
}

fn balance<'a>(snapshot: &'a Value, policy_id: &str) -> &'a Value {
    snapshot["balances"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["key"]["kind"] == "policy" && b["key"]["id"] == policy_id)
        .unwrap()
}

/// Opens a session and walks it to a complete draft of `boxes` boxes of PR-1
/// on credit policy P-1, warehouse W-1.
async fn drafted(router: &Router, boxes: u32) -> String {
    let (status, session) = call(router, Method::POST, "/v1/sessions", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(session["status"], "EMPTY");
    let id = session["id"].as_str().unwrap().to_string();
    let base = format!("/v1/sessions/{id}");

    let steps = [
        ("territory", json!({"territory_id": "T-1"})),
        ("customer", json!({"customer_id": "C-1"})),
        ("policy-type", json!({"policy_type": "credit"})),
        ("policy", json!({"policy_id": "P-1"})),
        ("product", json!({"product_id": "PR-1"})),
        ("warehouse", json!({"warehouse_id": "W-1"})),
    ];
    for (path, body) in steps {
        let (status, value) = call(router, Method::PUT, &format!("{base}/{path}"), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "{path}: {value}");
    }

    let (status, value) = call(
        router,
        Method::PATCH,
        &format!("{base}/draft"),
        Some(json!({"field": "pack_count", "value": boxes})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{value}");
    id
}

#[tokio::test]
async fn test_compose_stage_and_commit() {
    let t = test_app();
    let id = drafted(&t.router, 2).await;

    let (status, snapshot) = call(&t.router, Method::GET, &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["draft_total"], json!(54.0));
    assert_eq!(snapshot["draft"]["packaging"]["id"], "PK-1");

    let (status, staged) = call(&t.router, Method::POST, &format!("/v1/sessions/{id}/lines"), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(staged["session"]["status"], "LINE_STAGED");
    assert_eq!(staged["session"]["staged"].as_array().unwrap().len(), 1);

    let (status, committed) = call(&t.router, Method::POST, &format!("/v1/sessions/{id}/commit"), None).await;
    assert_eq!(status, StatusCode::OK, "{committed}");
    assert_eq!(committed["receipt"]["reference"]["order_sequence"], "SO0001");
    assert_eq!(committed["receipt"]["amount_total"], json!(54.0));
    assert_eq!(committed["session"]["status"], "COMMITTED");
    assert!(committed["session"]["staged"].as_array().unwrap().is_empty());

    assert_eq!(t.erp.submitted().len(), 1);
    assert_eq!(t.store.created()[0].status, "submitted");

    // a committed session is discarded
    let (status, body) = call(&t.router, Method::GET, &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
    let (status, _) = call(&t.router, Method::POST, &format!("/v1/sessions/{id}/commit"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_money_is_sent_as_numbers() {
    let t = test_app();
    let id = drafted(&t.router, 2).await;

    let (_, snapshot) = call(&t.router, Method::GET, &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(snapshot["draft_total"], json!(54.0));
    assert_eq!(snapshot["draft"]["unit_price"], json!(2.5));
    assert_eq!(snapshot["draft"]["discount_pct"], json!(10.0));
    assert_eq!(snapshot["selection"]["pricing"]["value"]["unit_price"], json!(2.5));
    assert_eq!(snapshot["draft"]["policy"]["remaining_amount"], json!(1000.0));

    let (_, staged) = call(&t.router, Method::POST, &format!("/v1/sessions/{id}/lines"), None).await;
    let line = &staged["session"]["staged"][0];
    assert_eq!(line["unit_price"], json!(2.5));
    assert_eq!(line["discount_pct"], json!(10.0));
    assert_eq!(line["total"], json!(54.0));
    assert_eq!(staged["session"]["draft_total"], Value::Null);

    let p1 = balance(&staged["session"], "P-1");
    assert_eq!(p1["remaining"], json!(1000.0));
    assert_eq!(p1["consumed"], json!(54.0));
    assert_eq!(p1["headroom"], json!(946.0));
}

#[tokio::test]
async fn test_secure_credit_without_reference_policy() {
    let t = test_app();
    let (_, session) = call(&t.router, Method::POST, "/v1/sessions", None).await;
    let base = format!("/v1/sessions/{}", session["id"].as_str().unwrap());

    call(&t.router, Method::PUT, &format!("{base}/territory"), Some(json!({"territory_id": "T-1"}))).await;
    call(&t.router, Method::PUT, &format!("{base}/customer"), Some(json!({"customer_id": "C-1"}))).await;
    let (status, _) = call(
        &t.router,
        Method::PUT,
        &format!("{base}/policy-type"),
        Some(json!({"policy_type": "secure_credit"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        call(&t.router, Method::PUT, &format!("{base}/policy"), Some(json!({"policy_id": "S-2"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "no_reference_policy");

    let (status, body) = call(&t.router, Method::POST, &format!("{base}/lines"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "missing_field");

    let (_, snapshot) = call(&t.router, Method::GET, &base, None).await;
    assert_eq!(snapshot["selection"]["products"]["state"], "unresolved");
    assert!(snapshot["staged"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_lookup_answer_during_commit_is_refused_and_recoverable() {
    let t = test_app();
    let id = drafted(&t.router, 2).await;
    let base = format!("/v1/sessions/{id}");
    let (status, _) = call(&t.router, Method::POST, &format!("{base}/lines"), None).await;
    assert_eq!(status, StatusCode::CREATED);

    // products for P-2 are still in flight when the commit starts
    t.lookup.gate.close();
    let router = t.router.clone();
    let policy_uri = format!("{base}/policy");
    let reselect = tokio::spawn(async move {
        call(&router, Method::PUT, &policy_uri, Some(json!({"policy_id": "P-2"}))).await
    });
    wait_for(&t.router, &id, |s| s["selection"]["products"]["state"] == "pending").await;

    t.erp.gate.close();
    t.erp.respond_with(Err(GatewayError::Timeout {
        service: "erp".to_string(),
    }));
    let router = t.router.clone();
    let commit_uri = format!("{base}/commit");
    let commit = tokio::spawn(async move { call(&router, Method::POST, &commit_uri, None).await });
    wait_for(&t.router, &id, |s| s["status"] == "COMMITTING").await;

    t.lookup.gate.open();
    let (status, body) = reselect.await.unwrap();
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "session_locked");

    t.erp.gate.open();
    let (status, body) = commit.await.unwrap();
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "timeout");

    let (_, snapshot) = call(&t.router, Method::GET, &base, None).await;
    assert_eq!(snapshot["status"], "LINE_STAGED");
    assert_eq!(snapshot["selection"]["products"]["state"], "failed");
    assert_eq!(snapshot["staged"].as_array().unwrap().len(), 1);

    let (status, snapshot) =
        call(&t.router, Method::PUT, &format!("{base}/policy"), Some(json!({"policy_id": "P-2"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["selection"]["products"]["state"], "ready");
}

#[tokio::test]
async fn test_overdrawn_line_is_rejected() {
    let t = test_app();
    // 38 boxes at 27.00 = 1026 against a balance of 1000
    let id = drafted(&t.router, 38).await;

    let (status, body) = call(&t.router, Method::POST, &format!("/v1/sessions/{id}/lines"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "insufficient_balance");

    let (_, snapshot) = call(&t.router, Method::GET, &format!("/v1/sessions/{id}"), None).await;
    assert!(snapshot["staged"].as_array().unwrap().is_empty());
    assert_eq!(snapshot["status"], "BUILDING");
}

#[tokio::test]
async fn test_partial_commit_reports_reference() {
    let t = test_app();
    let id = drafted(&t.router, 1).await;
    t.store.fail_writes(Some(GatewayError::Timeout {
        service: "local-api".to_string(),
    }));

    let (status, body) = call(&t.router, Method::POST, &format!("/v1/sessions/{id}/commit"), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "partial_commit");
    assert_eq!(body["order_id"], "1001");
    assert_eq!(body["order_sequence"], "SO0001");

    let (_, snapshot) = call(&t.router, Method::GET, &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(snapshot["status"], "BUILDING");
    assert!(snapshot["last_commit_error"].is_string());
}

#[tokio::test]
async fn test_missing_order_id_never_reaches_local_store() {
    let t = test_app();
    let id = drafted(&t.router, 1).await;
    t.erp.respond_with(Ok(ErpOrderAck {
        order_id: None,
        order_sequence: Some("SO-1".to_string()),
        state: None,
    }));

    let (status, body) = call(&t.router, Method::POST, &format!("/v1/sessions/{id}/commit"), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "missing_order_reference");
    assert!(t.store.created().is_empty());
}

#[tokio::test]
async fn test_read_only_field_and_unknown_session() {
    let t = test_app();
    let id = drafted(&t.router, 1).await;

    let (status, body) = call(
        &t.router,
        Method::PATCH,
        &format!("/v1/sessions/{id}/draft"),
        Some(json!({"field": "unit_price", "value": 0.01})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "read_only_field");

    let (status, _) = call(&t.router, Method::DELETE, &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&t.router, Method::GET, &format!("/v1/sessions/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_exhausted_policy_type() {
    let t = test_app();
    let (_, session) = call(&t.router, Method::POST, "/v1/sessions", None).await;
    let base = format!("/v1/sessions/{}", session["id"].as_str().unwrap());

    call(&t.router, Method::PUT, &format!("{base}/territory"), Some(json!({"territory_id": "T-1"}))).await;
    call(&t.router, Method::PUT, &format!("{base}/customer"), Some(json!({"customer_id": "C-1"}))).await;
    let (status, body) = call(
        &t.router,
        Method::PUT,
        &format!("{base}/policy-type"),
        Some(json!({"policy_type": "advance"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "policy_exhausted");
}

#[tokio::test]
async fn test_reference_lists() {
    let t = test_app();
    let (status, territories) = call(&t.router, Method::GET, "/v1/territories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(territories.as_array().unwrap().len(), 2);

    let (status, warehouses) = call(&t.router, Method::GET, "/v1/warehouses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(warehouses[0]["id"], "W-1");
}

#[tokio::test]
async fn test_warehouse_assignment() {
    let t = test_app();
    t.store.insert(SalesOrder {
        id: "L-9".to_string(),
        order_id: None,
        order_sequence: None,
        customer_id: "C-2".to_string(),
        lines: Vec::new(),
        status: "received".to_string(),
        odoo_status: None,
        warehouse_id: None,
    });

    let (status, receipt) = call(
        &t.router,
        Method::PUT,
        "/v1/orders/L-9/warehouse",
        Some(json!({"warehouse_id": "W-2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{receipt}");
    assert_eq!(receipt["event"]["warehouse_id"], "W-2");

    let (status, body) = call(
        &t.router,
        Method::PUT,
        "/v1/orders/L-9/warehouse",
        Some(json!({"warehouse_id": "W-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "already_assigned");

    let (status, body) = call(
        &t.router,
        Method::PUT,
        "/v1/orders/L-9/warehouse",
        Some(json!({"warehouse_id": "W-404"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "unknown_warehouse");
}
