use super::*;
use axum::Router;
use axum::http::{HeaderMap, StatusCode, Uri};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn params() -> NotifyParams {
    NotifyParams::from([
        ("name", "Alice phone".to_owned()),
        ("mac", "AA:BB:CC:DD:EE:01".to_owned()),
        ("roaming.from", "cap-hall".to_owned()),
        ("roaming.to", "cap-office".to_owned()),
        ("level.from", "-70".to_owned()),
        ("level.to", "-52".to_owned()),
    ])
}

// =============================================================================
// render
// =============================================================================

#[test]
fn render_substitutes_every_known_placeholder() {
    let out = render("{name}|{mac}|{roaming.from}>{roaming.to}|{level.from}>{level.to}", &params());
    assert_eq!(out, "Alice phone|AA:BB:CC:DD:EE:01|cap-hall>cap-office|-70>-52");
}

#[test]
fn render_keeps_unknown_and_unterminated_placeholders() {
    assert_eq!(render("a{unknown}b", &params()), "a{unknown}b");
    assert_eq!(render("json {\"mac\":\"{mac}\"", &params()), "json {\"mac\":\"AA:BB:CC:DD:EE:01\"");
    assert_eq!(render("tail {mac", &params()), "tail {mac");
    assert_eq!(render("", &params()), "");
}

#[test]
fn render_does_not_expand_substituted_values() {
    let p = NotifyParams::from([("name", "{mac}".to_owned()), ("mac", "AA".to_owned())]);
    assert_eq!(render("{name}-{mac}", &p), "{mac}-AA");
}

#[test]
fn render_handles_json_bodies_with_placeholders() {
    let out = render(r#"{"device":"{name}","rssi":"{level.to}"}"#, &params());
    assert_eq!(out, r#"{"device":"Alice phone","rssi":"-52"}"#);
}

// =============================================================================
// prepare
// =============================================================================

#[test]
fn prepare_get_rule() {
    let rule = NotifyRule { http_get: "http://hooks/arrive?mac={mac}".into(), ..NotifyRule::default() };
    let req = prepare(&rule, &params()).unwrap();
    assert_eq!(req.method, Method::GET);
    assert_eq!(req.url, "http://hooks/arrive?mac=AA:BB:CC:DD:EE:01");
    assert_eq!(req.body, None);
}

#[test]
fn prepare_post_wins_over_get_and_renders_body_and_headers() {
    let rule = NotifyRule {
        http_get: "http://ignored".into(),
        http_post: "http://hooks/{name}".into(),
        http_post_content: "from={level.from}&to={level.to}".into(),
        http_header: BTreeMap::from([("X-Token".to_owned(), "abc".to_owned())]),
    };
    let req = prepare(&rule, &params()).unwrap();
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.url, "http://hooks/Alice phone");
    assert_eq!(req.body.as_deref(), Some("from=-70&to=-52"));
    assert_eq!(req.headers, vec![("X-Token".to_owned(), "abc".to_owned())]);
}

#[test]
fn prepare_empty_rule_is_no_url() {
    assert!(matches!(prepare(&NotifyRule::default(), &params()), Err(NotificationError::NoUrl)));
}

// =============================================================================
// HttpNotifier
// =============================================================================

#[derive(Debug)]
struct Captured {
    method: Method,
    uri: String,
    token: Option<String>,
    body: String,
}

async fn capture_server(status: StatusCode) -> (String, mpsc::Receiver<Captured>) {
    let (tx, rx) = mpsc::channel(4);
    let app = Router::new().fallback(move |method: Method, uri: Uri, headers: HeaderMap, body: String| {
        let tx = tx.clone();
        async move {
            let token = headers.get("x-token").and_then(|v| v.to_str().ok()).map(String::from);
            let _ = tx.send(Captured { method, uri: uri.to_string(), token, body }).await;
            status
        }
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), rx)
}

#[tokio::test]
async fn http_notifier_sends_rendered_post() {
    let (base, mut rx) = capture_server(StatusCode::OK).await;
    let rule = NotifyRule {
        http_post: format!("{base}/roam/{{mac}}"),
        http_post_content: "{roaming.from}->{roaming.to}".into(),
        http_header: BTreeMap::from([("X-Token".to_owned(), "s3cret".to_owned())]),
        ..NotifyRule::default()
    };

    let notifier = HttpNotifier::new(Duration::from_secs(2)).unwrap();
    notifier.notify(&rule, &params()).await.unwrap();

    let got = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(got.method, Method::POST);
    assert_eq!(got.uri, "/roam/AA:BB:CC:DD:EE:01");
    assert_eq!(got.token.as_deref(), Some("s3cret"));
    assert_eq!(got.body, "cap-hall->cap-office");
}

#[tokio::test]
async fn http_notifier_sends_get() {
    let (base, mut rx) = capture_server(StatusCode::NO_CONTENT).await;
    let rule = NotifyRule { http_get: format!("{base}/hello?level={{level.to}}"), ..NotifyRule::default() };

    let notifier = HttpNotifier::new(Duration::from_secs(2)).unwrap();
    notifier.notify(&rule, &params()).await.unwrap();

    let got = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(got.method, Method::GET);
    assert_eq!(got.uri, "/hello?level=-52");
    assert!(got.body.is_empty());
}

#[tokio::test]
async fn http_notifier_reports_error_status() {
    let (base, _rx) = capture_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let rule = NotifyRule { http_get: format!("{base}/fail"), ..NotifyRule::default() };

    let notifier = HttpNotifier::new(Duration::from_secs(2)).unwrap();
    let err = notifier.notify(&rule, &params()).await.unwrap_err();
    assert!(matches!(err, NotificationError::Status { status: 500 }));
}

#[tokio::test]
async fn http_notifier_reports_unreachable_host() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let rule = NotifyRule { http_get: format!("http://{addr}/"), ..NotifyRule::default() };

    let notifier = HttpNotifier::new(Duration::from_secs(2)).unwrap();
    assert!(matches!(notifier.notify(&rule, &params()).await, Err(NotificationError::Request(_))));
}
