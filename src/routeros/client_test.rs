use super::*;
use crate::routeros::codec::encode_sentence;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// One scripted exchange: the words the fake router expects, then the
/// sentences it answers with.
type Exchange = (Vec<&'static str>, Vec<Vec<&'static str>>);

/// Spawn a fake router that serves one connection and asserts every
/// inbound sentence matches the script.
async fn fake_router(script: Vec<Exchange>) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut socket = BufStream::new(socket);
        for (expected, replies) in script {
            let words = read_sentence(&mut socket).await.unwrap();
            assert_eq!(words, expected);
            for reply in replies {
                socket.write_all(&encode_sentence(&reply)).await.unwrap();
            }
            socket.flush().await.unwrap();
        }
    });
    (address, handle)
}

fn login_ok() -> Exchange {
    (vec!["/login", "=name=admin", "=password=secret"], vec![vec!["!done"]])
}

#[tokio::test]
async fn connect_logs_in_and_run_collects_rows() {
    let (address, server) = fake_router(vec![
        login_ok(),
        (
            vec!["/ip/dhcp-server/lease/print"],
            vec![
                vec!["!re", "=address=10.0.0.5", "=mac-address=CC:DD"],
                vec!["!re", "=address=10.0.0.6", "=mac-address=EE:FF", "=comment=tv"],
                vec!["!done"],
            ],
        ),
    ])
    .await;

    let mut client = RouterOsClient::connect(&address, "admin", "secret", TEST_TIMEOUT).await.unwrap();
    let rows = client.run("/ip/dhcp-server/lease/print").await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("address").map(String::as_str), Some("10.0.0.5"));
    assert_eq!(rows[1].get("comment").map(String::as_str), Some("tv"));

    client.close().await;
    timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn rejected_login_is_auth_error() {
    let (address, _server) = fake_router(vec![(
        vec!["/login", "=name=admin", "=password=secret"],
        vec![vec!["!trap", "=message=invalid user name or password (6)"], vec!["!done"]],
    )])
    .await;

    let err = RouterOsClient::connect(&address, "admin", "secret", TEST_TIMEOUT)
        .await
        .err()
        .expect("login should fail");
    assert!(matches!(err, FetchError::Auth(ref m) if m.contains("invalid user name")), "got {err:?}");
}

#[tokio::test]
async fn legacy_challenge_login_is_rejected() {
    let (address, _server) = fake_router(vec![(
        vec!["/login", "=name=admin", "=password=secret"],
        vec![vec!["!done", "=ret=ebddd18303a54111e2dea05a92ab46b4"]],
    )])
    .await;

    let err = RouterOsClient::connect(&address, "admin", "secret", TEST_TIMEOUT)
        .await
        .err()
        .expect("legacy login should fail");
    assert!(matches!(err, FetchError::Auth(_)));
}

#[tokio::test]
async fn trap_is_drained_and_session_stays_usable() {
    let (address, server) = fake_router(vec![
        login_ok(),
        (vec!["/bogus/print"], vec![vec!["!trap", "=message=no such command"], vec!["!done"]]),
        (vec!["/ip/dhcp-server/lease/print"], vec![vec!["!empty"], vec!["!done"]]),
    ])
    .await;

    let mut client = RouterOsClient::connect(&address, "admin", "secret", TEST_TIMEOUT).await.unwrap();
    let err = client.run("/bogus/print").await.unwrap_err();
    assert!(matches!(err, FetchError::Trap { ref message } if message == "no such command"));

    let rows = client.run("/ip/dhcp-server/lease/print").await.unwrap();
    assert!(rows.is_empty());
    timeout(TEST_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn fatal_reply_is_fatal_error() {
    let (address, _server) = fake_router(vec![
        login_ok(),
        (vec!["/caps-man/registration-table/print"], vec![vec!["!fatal", "session terminated on request"]]),
    ])
    .await;

    let mut client = RouterOsClient::connect(&address, "admin", "secret", TEST_TIMEOUT).await.unwrap();
    let err = client.run("/caps-man/registration-table/print").await.unwrap_err();
    assert!(matches!(err, FetchError::Fatal(ref m) if m == "session terminated on request"));
}

#[tokio::test]
async fn silent_router_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let err = RouterOsClient::connect(&address, "admin", "secret", Duration::from_millis(100))
        .await
        .err()
        .expect("connect should time out");
    assert!(matches!(err, FetchError::Timeout(_)));
}

#[tokio::test]
async fn refused_connection_is_io_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let err = RouterOsClient::connect(&address, "admin", "secret", TEST_TIMEOUT)
        .await
        .err()
        .expect("connect should fail");
    assert!(matches!(err, FetchError::Io(_)));
}
