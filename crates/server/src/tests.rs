use super::*;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::extract::Path;
use axum::http::{HeaderValue, Request};
use dealdesk_engine::HttpTransport;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tower::ServiceExt;

struct MockHost {
    calls: Mutex<Vec<(String, Value)>>,
    fail_catalog: bool,
    slow_first_catalog: bool,
    sell_reply: Value,
}

impl MockHost {
    fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_catalog: false,
            slow_first_catalog: false,
            sell_reply: json!({ "success": false, "reason": "no_buyer" }),
        }
    }

    fn count(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path == endpoint)
            .count()
    }

    fn bodies(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| path == endpoint)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn mock_endpoint(
    State(host): State<Arc<MockHost>>,
    Path(endpoint): Path<String>,
    body: String,
) -> Response {
    let body = serde_json::from_str(&body).unwrap_or(Value::Null);
    host.calls.lock().unwrap().push((endpoint.clone(), body));
    match endpoint.as_str() {
        "getAvailableItems" if host.fail_catalog => {
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        "getAvailableItems" if host.slow_first_catalog && host.count(&endpoint) == 1 => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Json(json!({
                "items": [{ "name": "stale", "label": "Stale", "basePrice": 1, "maxAmount": 1 }]
            }))
            .into_response()
        }
        "getAvailableItems" => Json(json!({
            "items": [
                { "name": "weed", "label": "Weed", "basePrice": 50, "maxAmount": 50,
                  "description": "High quality street weed" },
                { "name": "coke", "label": "Coke", "basePrice": 200, "maxAmount": 10 }
            ]
        }))
        .into_response(),
        "requestSell" => Json(host.sell_reply.clone()).into_response(),
        "saveColors" => Json(json!({ "success": true })).into_response(),
        "test" => Json(json!({ "ok": true })).into_response(),
        _ => StatusCode::OK.into_response(),
    }
}

async fn start_mock(host: MockHost) -> (String, Arc<MockHost>) {
    let host = Arc::new(host);
    let app = Router::new()
        .route("/{endpoint}", post(mock_endpoint))
        .with_state(host.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), host)
}

fn fast_config(host_url: &str) -> OverlayConfig {
    OverlayConfig {
        host_url: Some(host_url.to_string()),
        fetch_delay_ms: 0,
        retry_delay_ms: 20,
        close_settle_ms: 100,
        ..OverlayConfig::default()
    }
}

fn start_overlay(config: &OverlayConfig) -> Arc<AppState> {
    let transport = config.transport().unwrap();
    Arc::new(spawn_overlay(transport, config))
}

async fn wait_for(
    state: &AppState,
    what: &str,
    pred: impl Fn(&ViewModel) -> bool,
) -> ViewModel {
    let mut rx = state.overlay.subscribe();
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let view = rx.borrow_and_update().clone();
            if pred(&view) {
                return view;
            }
            if rx.changed().await.is_err() {
                panic!("runtime stopped while waiting for {what}");
            }
        }
    })
    .await;
    waited.unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

async fn wait_calls(host: &MockHost, endpoint: &str, n: usize) {
    for _ in 0..250 {
        if host.count(endpoint) >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("expected {n} calls to /{endpoint}, saw {}", host.count(endpoint));
}

async fn open(state: &Arc<AppState>) -> ViewModel {
    let msg: HostMessage = serde_json::from_value(json!({
        "action": "open",
        "token": "tok-1",
        "playerLevel": 3,
        "playerTitle": "Corner Dealer",
        "playerXP": 50,
        "nextLevelXP": 300
    }))
    .unwrap();
    let Json(view) = host_message(State(state.clone()), Json(msg)).await.unwrap();
    view
}

#[tokio::test]
async fn open_requests_stats_and_loads_catalog() {
    let (url, host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));

    let view = open(&state).await;
    assert!(view.is_open);
    assert_eq!(view.player.level_text, "Level 3");
    assert_eq!(view.player.title, "Corner Dealer");
    assert!(view.expires_at.is_some());

    let view = wait_for(&state, "catalog", |v| v.items.len() == 2).await;
    assert_eq!(view.items[0].text, "Weed ($50)");
    assert_eq!(view.items[1].text, "Coke ($200)");

    wait_calls(&host, "ready", 1).await;
    assert_eq!(host.count("requestPlayerStats"), 1);
    assert_eq!(host.count("test"), 1);
    assert_eq!(host.count("getAvailableItems"), 1);
}

#[tokio::test]
async fn double_close_sends_a_single_callback() {
    let (url, host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));
    open(&state).await;

    let Json(first) = ui_close(State(state.clone())).await.unwrap();
    assert!(!first.is_open);
    assert!(first.closing);
    let Json(second) = ui_close(State(state.clone())).await.unwrap();
    assert!(second.closing);

    wait_calls(&host, "close", 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(host.count("close"), 1);

    // Guard releases after the settle delay.
    wait_for(&state, "close guard release", |v| !v.closing).await;
    let Json(view) = ui_close(State(state.clone())).await.unwrap();
    assert!(view.closing);
    wait_calls(&host, "close", 2).await;
}

#[tokio::test]
async fn reopen_inside_settle_window_can_close_again() {
    let (url, host) = start_mock(MockHost::new()).await;
    let config = OverlayConfig {
        close_settle_ms: 500,
        ..fast_config(&url)
    };
    let state = start_overlay(&config);

    open(&state).await;
    let Json(view) = ui_close(State(state.clone())).await.unwrap();
    assert!(view.closing);

    let view = open(&state).await;
    assert!(view.is_open);
    assert!(!view.closing);

    let Json(view) = ui_close(State(state.clone())).await.unwrap();
    assert!(!view.is_open);
    wait_calls(&host, "close", 2).await;
}

#[tokio::test]
async fn catalog_failure_retries_then_falls_back() {
    let mut mock = MockHost::new();
    mock.fail_catalog = true;
    let (url, host) = start_mock(mock).await;
    let state = start_overlay(&fast_config(&url));
    open(&state).await;

    let view = wait_for(&state, "fallback catalog", |v| !v.items.is_empty()).await;
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].value, "weed");
    assert_eq!(view.items[0].text, "Weed ($50)");
    let notice = view.notice.expect("fallback notice");
    assert_eq!(notice.kind, dealdesk_engine::NoticeKind::Error);
    assert_eq!(notice.text, "Failed to load available items after 4 attempts");
    assert_eq!(host.count("getAvailableItems"), 4);
}

#[tokio::test]
async fn sell_round_trip_updates_xp_and_clears_selection() {
    let mut mock = MockHost::new();
    mock.sell_reply = json!({
        "success": true,
        "moneyEarned": 550,
        "xpGained": 5,
        "playerXP": 55
    });
    let (url, host) = start_mock(mock).await;
    let state = start_overlay(&fast_config(&url));
    open(&state).await;
    wait_for(&state, "catalog", |v| !v.items.is_empty()).await;

    let Json(view) = ui_select(
        State(state.clone()),
        Json(SelectInput {
            name: "weed".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(view.selected.as_ref().map(|s| s.max_amount), Some(50));
    assert_eq!(view.amount, 1);

    let Json(view) = ui_amount(
        State(state.clone()),
        Json(AmountInput {
            value: Some(10),
            delta: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(view.estimated_price, "$550");
    assert!(view.sell_enabled);

    let Json(view) = ui_sell(State(state.clone())).await.unwrap();
    assert!(!view.sell_enabled);
    assert_eq!(view.sell_label, "Processing...");

    let view = wait_for(&state, "sell result", |v| v.player.xp == 55).await;
    assert!(view.selected.is_none());
    assert_eq!(view.sell_label, "Make Deal");
    assert_eq!(
        view.notice.map(|n| n.text).as_deref(),
        Some("Deal successful! Earned $550 (+5 XP)")
    );

    let sent = host.bodies("requestSell");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["item"], "weed");
    assert_eq!(sent[0]["amount"], 10);
}

#[tokio::test]
async fn sell_over_max_is_rejected_locally() {
    let (url, host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));
    open(&state).await;
    wait_for(&state, "catalog", |v| !v.items.is_empty()).await;

    let Json(view) = ui_select(
        State(state.clone()),
        Json(SelectInput {
            name: "weed".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(view.amount, 1);
    let Json(view) = ui_amount(
        State(state.clone()),
        Json(AmountInput {
            value: Some(999),
            delta: None,
        }),
    )
    .await
    .unwrap();
    assert_eq!(view.amount, 999);
    assert!(view.amount_status.is_some());

    let Json(view) = ui_sell(State(state.clone())).await.unwrap();
    assert_eq!(
        view.notice.map(|n| n.text).as_deref(),
        Some("Maximum amount for Weed is 50")
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(host.count("requestSell"), 0);
}

#[tokio::test]
async fn host_failure_reason_is_shown() {
    let (url, _host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));
    open(&state).await;
    wait_for(&state, "catalog", |v| !v.items.is_empty()).await;

    let Json(view) = ui_select(
        State(state.clone()),
        Json(SelectInput {
            name: "coke".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(view.selected.as_ref().map(|s| s.max_amount), Some(10));
    let Json(view) = ui_sell(State(state.clone())).await.unwrap();
    assert_eq!(view.sell_label, "Processing...");

    let view = wait_for(&state, "failure notice", |v| {
        v.notice.as_ref().is_some_and(|n| n.text.starts_with("No buyer"))
    })
    .await;
    // Selection survives a rejected deal.
    assert_eq!(view.selected.map(|s| s.name).as_deref(), Some("coke"));
    assert!(view.sell_enabled);
}

#[tokio::test]
async fn amount_stepper_respects_bounds() {
    let (url, _host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));
    open(&state).await;

    let step = |delta| {
        ui_amount(
            State(state.clone()),
            Json(AmountInput {
                value: None,
                delta: Some(delta),
            }),
        )
    };
    let Json(view) = step(-1).await.unwrap();
    assert_eq!(view.amount, 1);
    let Json(view) = step(1).await.unwrap();
    assert_eq!(view.amount, 2);

    let err = ui_amount(
        State(state.clone()),
        Json(AmountInput {
            value: None,
            delta: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn unknown_host_action_is_ignored() {
    let (url, host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));

    let msg: HostMessage = serde_json::from_value(json!({ "action": "dance" })).unwrap();
    let Json(view) = host_message(State(state.clone()), Json(msg)).await.unwrap();
    assert!(!view.is_open);
    assert!(view.notice.is_none());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(host.count("getAvailableItems"), 0);
}

#[tokio::test]
async fn host_error_shows_notice() {
    let (url, _host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));

    let msg: HostMessage =
        serde_json::from_value(json!({ "action": "error", "text": "Too far away" })).unwrap();
    let Json(view) = host_message(State(state.clone()), Json(msg)).await.unwrap();
    assert_eq!(view.notice.map(|n| n.text).as_deref(), Some("Too far away"));
}

#[tokio::test]
async fn theme_preset_is_saved_to_host() {
    let (url, host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));

    let Json(view) = ui_theme(
        State(state.clone()),
        Json(ThemeInput {
            colors: None,
            preset: Some("blue".into()),
        }),
    )
    .await
    .unwrap();
    assert_eq!(
        view.css_vars.get("--color-primary").map(String::as_str),
        Some("#00aaff")
    );

    wait_for(&state, "colors saved", |v| {
        v.notice.as_ref().is_some_and(|n| n.text == "Colors saved")
    })
    .await;
    let sent = host.bodies("saveColors");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["colors"]["primary"], "#00aaff");
}

#[tokio::test]
async fn unknown_theme_preset_is_bad_request() {
    let (url, _host) = start_mock(MockHost::new()).await;
    let state = start_overlay(&fast_config(&url));

    let err = ui_theme(
        State(state.clone()),
        Json(ThemeInput {
            colors: None,
            preset: Some("neon".into()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(ref m) if m.contains("neon")));
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_expires_and_closes() {
    let (url, host) = start_mock(MockHost::new()).await;
    let config = OverlayConfig {
        expiry_ms: 150,
        ..fast_config(&url)
    };
    let state = start_overlay(&config);

    let view = open(&state).await;
    assert!(view.is_open);
    let view = wait_for(&state, "expiry", |v| !v.is_open).await;
    assert!(view.expires_at.is_none());
    wait_calls(&host, "close", 1).await;
}

#[tokio::test]
async fn reopen_discards_stale_catalog() {
    let mut mock = MockHost::new();
    mock.slow_first_catalog = true;
    let (url, host) = start_mock(mock).await;
    let state = start_overlay(&fast_config(&url));

    open(&state).await;
    wait_calls(&host, "getAvailableItems", 1).await;
    let Json(view) = ui_close(State(state.clone())).await.unwrap();
    assert!(!view.is_open);
    open(&state).await;

    wait_calls(&host, "getAvailableItems", 2).await;
    let view = wait_for(&state, "fresh catalog", |v| v.items.len() == 2).await;
    assert!(view.is_open);

    // The first fetch answers late with a different catalog.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let view = state.overlay.view();
    assert_eq!(view.items.len(), 2);
    assert!(view.items.iter().all(|item| item.value != "stale"));
}

#[tokio::test]
async fn notices_dismiss_after_their_lifetime() {
    let (url, _host) = start_mock(MockHost::new()).await;
    let config = OverlayConfig {
        notice_ms: 100,
        ..fast_config(&url)
    };
    let state = start_overlay(&config);

    let msg: HostMessage =
        serde_json::from_value(json!({ "action": "error", "text": "Too far away" })).unwrap();
    let Json(view) = host_message(State(state.clone()), Json(msg)).await.unwrap();
    assert!(view.notice.is_some());

    wait_for(&state, "notice dismissal", |v| v.notice.is_none()).await;
}

#[tokio::test]
async fn close_cancels_pending_expiry() {
    let (url, host) = start_mock(MockHost::new()).await;
    let config = OverlayConfig {
        expiry_ms: 200,
        ..fast_config(&url)
    };
    let state = start_overlay(&config);

    open(&state).await;
    let Json(view) = ui_close(State(state.clone())).await.unwrap();
    assert!(view.expires_at.is_none());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(host.count("close"), 1);
}

#[tokio::test]
async fn router_serves_loopback_and_rejects_remote_peers() {
    let (url, _host) = start_mock(MockHost::new()).await;
    let config = fast_config(&url);
    let transport = HttpTransport::new(url.clone()).unwrap();
    let state = spawn_overlay(transport, &config);

    let local = build_router(state.clone())
        .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    let resp = local
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let remote =
        build_router(state).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 5], 40000))));
    let resp = remote
        .oneshot(Request::get("/state").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn router_accepts_host_messages_over_http() {
    let (url, _host) = start_mock(MockHost::new()).await;
    let state = spawn_overlay(HttpTransport::new(url).unwrap(), &OverlayConfig::default());
    let app =
        build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

    let req = Request::post("/message")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"action":"open","token":"t"}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let view: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(view["isOpen"], true);
    assert_eq!(view["sellLabel"], "Make Deal");
}

#[test]
fn local_origin_allowlist() {
    let ok = |s: &str| is_allowed_local_origin(&HeaderValue::from_str(s).unwrap());
    assert!(ok("nui://game"));
    assert!(ok("https://cfx-nui-bldr-drugs"));
    assert!(ok("http://localhost:5173"));
    assert!(ok("http://127.0.0.1"));
    assert!(!ok("https://cfx-nui-"));
    assert!(!ok("https://cfx-nui-x/evil"));
    assert!(!ok("http://localhost.evil.com"));
    assert!(!ok("https://example.com"));
}

#[test]
fn peer_ip_allowlist_is_loopback_only() {
    assert!(is_allowed_peer_ip("127.0.0.1".parse().unwrap()));
    assert!(is_allowed_peer_ip("::1".parse().unwrap()));
    assert!(is_allowed_peer_ip("::ffff:127.0.0.1".parse().unwrap()));
    assert!(!is_allowed_peer_ip("192.168.1.20".parse().unwrap()));
    assert!(!is_allowed_peer_ip("::ffff:10.0.0.1".parse().unwrap()));
}

#[test]
fn config_defaults_match_cli_defaults() {
    use clap::Parser;
    let parsed = OverlayConfig::try_parse_from(["dealdesk-server"]).unwrap();
    let default = OverlayConfig::default();
    assert_eq!(parsed.bind, default.bind);
    assert_eq!(parsed.resource, default.resource);
    assert_eq!(parsed.retry_policy(), default.retry_policy());
    assert_eq!(parsed.expiry(), Duration::from_secs(300));
    assert_eq!(parsed.close_settle(), Duration::from_millis(500));
    assert_eq!(
        default.transport().unwrap().base_url(),
        "https://bldr-drugs"
    );
}
