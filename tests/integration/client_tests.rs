//! Integration tests for the protocol client against in-process servers.

use std::time::Duration;

use chat_conformance::client::Connection;
use chat_conformance::models::{Exchange, ServerAddress};
use chat_conformance::AppError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use super::test_helpers::{compliant_chat, login_then_message, serve_lines};

const READ_TIMEOUT: Duration = Duration::from_millis(300);

#[tokio::test]
async fn compliant_server_passes_every_exchange() {
    let (address, log) = serve_lines(compliant_chat).await;
    let mut conn = Connection::connect(&address, READ_TIMEOUT).await.expect("connect");

    conn.run_exchanges(&login_then_message().exchanges)
        .await
        .expect("all exchanges pass");

    assert_eq!(*log.lock().expect("lock"), vec!["LOGIN alice", "MSG hi"]);
}

#[tokio::test]
async fn omitted_line_fails_second_exchange_with_diagnostic() {
    let (address, _log) = serve_lines(|line| line.starts_with("LOGIN").then(|| "OK\n".into())).await;
    let mut conn = Connection::connect(&address, READ_TIMEOUT).await.expect("connect");

    let err = conn
        .run_exchanges(&login_then_message().exchanges)
        .await
        .expect_err("second exchange fails");

    assert_eq!(err.index, 2);
    assert!(matches!(err.error, AppError::Timeout(_)), "got {}", err.error);
    let text = err.to_string();
    assert!(text.starts_with("failed on cmd 2:"), "{text}");
    assert!(text.contains(r#"Expected b"alice: hi\n""#), "{text}");
    assert!(text.contains(r#"Got b"""#), "{text}");
}

#[tokio::test]
async fn first_failure_stops_before_next_request() {
    let (address, log) = serve_lines(|_| Some("ERR\n".into())).await;
    let mut conn = Connection::connect(&address, READ_TIMEOUT).await.expect("connect");

    let err = conn
        .run_exchanges(&login_then_message().exchanges)
        .await
        .expect_err("first exchange fails");

    assert_eq!(err.index, 1);
    assert!(matches!(err.error, AppError::Mismatch(_)));
    drop(conn);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        *log.lock().expect("lock"),
        vec!["LOGIN alice"],
        "second request must never be sent"
    );
}

#[tokio::test]
async fn reordered_broadcast_lines_pass() {
    let (address, _log) = serve_lines(|_| Some("bob joined\ncarol joined\n".into())).await;
    let mut conn = Connection::connect(&address, READ_TIMEOUT).await.expect("connect");

    conn.exchange(&Exchange::new("JOIN lobby\n", "carol joined\nbob joined\n"))
        .await
        .expect("reordering is tolerated");
}

#[tokio::test]
async fn duplicated_broadcast_line_fails() {
    let (address, _log) = serve_lines(|_| Some("hi\nhi\n".into())).await;
    let mut conn = Connection::connect(&address, READ_TIMEOUT).await.expect("connect");

    let err = conn
        .exchange(&Exchange::new("SAY hi\n", "hi\nyo\n"))
        .await
        .expect_err("duplicate rejected");
    assert!(matches!(err, AppError::Mismatch(_)));
}

#[tokio::test]
async fn response_split_across_writes_is_accumulated() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 64];
        let _ = stream.read(&mut buf).await;
        stream.write_all(b"RESULT ").await.expect("write");
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(b"LOGIN 1\n").await.expect("write");
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let address: ServerAddress = format!("127.0.0.1:{port}").parse().expect("address");
    let mut conn = Connection::connect(&address, READ_TIMEOUT).await.expect("connect");
    conn.exchange(&Exchange::new("LOGIN u p\n", "RESULT LOGIN 1\n"))
        .await
        .expect("fragments are joined");
}

#[tokio::test]
async fn early_close_is_a_mismatch_not_a_timeout() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 64];
        let _ = stream.read(&mut buf).await;
        stream.write_all(b"OK\n").await.expect("write");
    });

    let address: ServerAddress = format!("127.0.0.1:{port}").parse().expect("address");
    let mut conn = Connection::connect(&address, Duration::from_secs(5))
        .await
        .expect("connect");
    let err = conn
        .exchange(&Exchange::new("LOGIN alice\n", "OK\nwelcome\n"))
        .await
        .expect_err("short response");

    assert!(matches!(err, AppError::Mismatch(_)), "got {err}");
    assert!(err.to_string().contains(r#"missing: ["welcome"]"#), "{err}");
}

#[tokio::test]
async fn empty_expected_response_sends_without_reading() {
    let (address, log) = serve_lines(|_| None).await;
    let mut conn = Connection::connect(&address, READ_TIMEOUT).await.expect("connect");

    conn.exchange(&Exchange::new("QUIT\n", ""))
        .await
        .expect("nothing to read");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*log.lock().expect("lock"), vec!["QUIT"]);
}

#[tokio::test]
async fn refused_connection_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let address: ServerAddress = format!("127.0.0.1:{port}").parse().expect("address");
    let err = Connection::connect(&address, READ_TIMEOUT)
        .await
        .expect_err("nothing listening");
    assert!(matches!(err, AppError::Connection(_)));
}
