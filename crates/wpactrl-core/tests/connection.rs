//! End-to-end tests of `ControlConnection` against a simulated daemon.

use std::time::Duration;

use pretty_assertions::assert_eq;
use wpactrl_core::{ControlConnection, ExchangeError, Priority, WpaCtrlError};
use wpactrl_test_utils::{MockDaemon, TestConfigBuilder};

async fn connect(daemon: &MockDaemon) -> ControlConnection {
    let config = TestConfigBuilder::for_daemon(daemon).build();
    ControlConnection::open_with(daemon.socket_path(), &config)
        .await
        .expect("failed to open connection")
}

/// Poll `pending` briefly; events travel through the daemon task first.
async fn wait_pending(conn: &mut ControlConnection) -> bool {
    for _ in 0..50 {
        if conn.pending().await.unwrap() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ── Request / reply ───────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_request_returns_reply_bytes() {
    let daemon = MockDaemon::with_responder(|cmd| match cmd {
        b"STATUS" => Some(vec![b"wpa_state=COMPLETED\nssid=home\n".to_vec()]),
        _ => None,
    })
    .await;
    let mut conn = connect(&daemon).await;

    assert_eq!(conn.request("PING").await.unwrap(), b"PONG\n");
    assert_eq!(
        conn.request(b"STATUS").await.unwrap(),
        b"wpa_state=COMPLETED\nssid=home\n"
    );
    assert_eq!(daemon.received(), vec![b"PING".to_vec(), b"STATUS".to_vec()]);

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_long_reply_is_truncated_silently() {
    let daemon = MockDaemon::with_responder(|cmd| match cmd {
        b"BSS 0" => Some(vec![vec![b'x'; 4000]]),
        _ => None,
    })
    .await;
    let mut conn = connect(&daemon).await;

    let reply = conn.request("BSS 0").await.unwrap();
    assert_eq!(reply.len(), 2048);
    assert!(reply.iter().all(|&b| b == b'x'));

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_timeout_leaves_connection_usable() {
    let daemon = MockDaemon::with_responder(|cmd| match cmd {
        b"SCAN" => Some(vec![]),
        _ => None,
    })
    .await;
    let config = TestConfigBuilder::for_daemon(&daemon)
        .request_timeout_ms(200)
        .build();
    let mut conn = ControlConnection::open_with(daemon.socket_path(), &config)
        .await
        .unwrap();

    let err = conn.request("SCAN").await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    assert!(matches!(
        err,
        WpaCtrlError::Request(ExchangeError::Timeout(d)) if d == Duration::from_millis(200)
    ));

    // the reply finally shows up after the caller gave up
    daemon.send_to_last_client(b"OK\n").await;

    assert_eq!(conn.request("PING").await.unwrap(), b"PONG\n");
    assert!(conn.pending().await.unwrap());
    assert_eq!(conn.recv().await.unwrap(), b"OK\n");

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_request_after_daemon_exit_fails() {
    let daemon = MockDaemon::start().await;
    let local_dir = tempfile::TempDir::new().unwrap();
    let config = TestConfigBuilder::new()
        .local_dir(local_dir.path())
        .request_timeout_ms(200)
        .build();
    let mut conn = ControlConnection::open_with(daemon.socket_path(), &config)
        .await
        .unwrap();
    drop(daemon);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // the daemon socket is gone, so the send itself is refused
    let err = conn.request("PING").await.unwrap_err();
    assert!(
        matches!(err, WpaCtrlError::Request(ExchangeError::Failed(_))),
        "unexpected error {err:?}"
    );
    assert!(!err.is_timeout());

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_open_rejects_invalid_config() {
    let daemon = MockDaemon::start().await;
    let local_dir = tempfile::TempDir::new().unwrap();

    let mut config = TestConfigBuilder::new()
        .local_dir(local_dir.path())
        .build();
    config.connection.event_channel_capacity = 0;
    let err = ControlConnection::open_with(daemon.socket_path(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, WpaCtrlError::Config(_)), "unexpected error {err:?}");

    let config = TestConfigBuilder::new()
        .local_dir(local_dir.path())
        .max_reply_size(0)
        .max_event_size(0)
        .build();
    let err = ControlConnection::open_with(daemon.socket_path(), &config)
        .await
        .unwrap_err();
    assert!(matches!(err, WpaCtrlError::Config(_)), "unexpected error {err:?}");

    // nothing was bound and nothing reached the daemon
    assert_eq!(std::fs::read_dir(local_dir.path()).unwrap().count(), 0);
    assert!(daemon.received().is_empty());
}

// ── Attach / detach ───────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_attach_twice_sends_one_command() {
    let daemon = MockDaemon::start().await;
    let mut conn = connect(&daemon).await;

    conn.attach().await.unwrap();
    conn.attach().await.unwrap();

    assert!(conn.is_attached());
    assert_eq!(daemon.count(b"ATTACH"), 1);
    assert_eq!(daemon.monitor_count(), 1);

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_detach_before_attach_is_noop() {
    let daemon = MockDaemon::start().await;
    let mut conn = connect(&daemon).await;

    conn.detach().await.unwrap();

    assert!(!conn.is_attached());
    assert!(daemon.received().is_empty());

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_attach_then_detach() {
    let daemon = MockDaemon::start().await;
    let mut conn = connect(&daemon).await;

    conn.attach().await.unwrap();
    conn.detach().await.unwrap();
    conn.detach().await.unwrap();

    assert!(!conn.is_attached());
    assert_eq!(daemon.count(b"DETACH"), 1);
    assert_eq!(daemon.monitor_count(), 0);

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_attach_rejected_by_daemon() {
    let daemon = MockDaemon::with_responder(|cmd| match cmd {
        b"ATTACH" => Some(vec![b"FAIL\n".to_vec()]),
        _ => None,
    })
    .await;
    let mut conn = connect(&daemon).await;

    let err = conn.attach().await.unwrap_err();
    assert!(matches!(err, WpaCtrlError::Attach(ExchangeError::Failed(_))));
    assert!(!conn.is_attached());

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_attach_timeout() {
    let daemon = MockDaemon::with_responder(|cmd| match cmd {
        b"ATTACH" => Some(vec![]),
        _ => None,
    })
    .await;
    let config = TestConfigBuilder::for_daemon(&daemon)
        .request_timeout_ms(100)
        .build();
    let mut conn = ControlConnection::open_with(daemon.socket_path(), &config)
        .await
        .unwrap();

    let err = conn.attach().await.unwrap_err();
    assert!(matches!(err, WpaCtrlError::Attach(ExchangeError::Timeout(_))));
    assert!(!conn.is_attached());

    conn.close().await;
}

// ── Events ────────────────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_event_delivered_through_pending_and_recv() {
    let daemon = MockDaemon::start().await;
    let mut conn = connect(&daemon).await;

    assert!(!conn.pending().await.unwrap());
    conn.attach().await.unwrap();

    daemon.send_event(b"<3>CTRL-EVENT-SCAN-RESULTS ").await;

    assert!(wait_pending(&mut conn).await);
    assert_eq!(conn.recv().await.unwrap(), b"<3>CTRL-EVENT-SCAN-RESULTS ");
    assert!(!conn.pending().await.unwrap());

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_event_interleaved_with_reply_is_not_the_reply() {
    let daemon = MockDaemon::with_responder(|cmd| match cmd {
        b"STATUS" => Some(vec![
            b"<3>CTRL-EVENT-BSS-ADDED 0 02:00:00:00:01:00".to_vec(),
            b"wpa_state=SCANNING\n".to_vec(),
        ]),
        _ => None,
    })
    .await;
    let mut conn = connect(&daemon).await;
    conn.attach().await.unwrap();

    assert_eq!(conn.request("STATUS").await.unwrap(), b"wpa_state=SCANNING\n");
    assert!(conn.pending().await.unwrap());
    assert_eq!(
        conn.recv().await.unwrap(),
        b"<3>CTRL-EVENT-BSS-ADDED 0 02:00:00:00:01:00"
    );

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_long_event_truncated_to_event_size() {
    let mut long_event = b"<2>".to_vec();
    long_event.extend(std::iter::repeat_n(b'e', 1000));
    let interleaved = long_event.clone();
    let daemon = MockDaemon::with_responder(move |cmd| match cmd {
        b"STATUS" => Some(vec![interleaved.clone(), b"wpa_state=INACTIVE\n".to_vec()]),
        _ => None,
    })
    .await;
    let mut conn = connect(&daemon).await;
    conn.attach().await.unwrap();

    // arriving while a request waits: still sized as an event
    assert_eq!(conn.request("STATUS").await.unwrap(), b"wpa_state=INACTIVE\n");
    assert_eq!(conn.recv().await.unwrap(), long_event[..256].to_vec());

    // arriving between requests
    daemon.send_event(&long_event).await;
    assert!(wait_pending(&mut conn).await);
    assert_eq!(conn.recv().await.unwrap().len(), 256);

    conn.close().await;
}

#[test_log::test(tokio::test)]
async fn test_subscribers_receive_parsed_events() {
    let daemon = MockDaemon::start().await;
    let mut conn = connect(&daemon).await;
    let mut events = conn.subscribe().unwrap();
    conn.attach().await.unwrap();

    daemon.send_event(b"<4>CTRL-EVENT-DISCONNECTED bssid=02:00:00:00:01:00").await;

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("no event broadcast")
        .unwrap();
    assert_eq!(event.priority(), Some(Priority::Warning));
    assert_eq!(event.body(), b"CTRL-EVENT-DISCONNECTED bssid=02:00:00:00:01:00");

    // the recv queue sees the same event
    assert!(wait_pending(&mut conn).await);
    assert_eq!(conn.recv().await.unwrap(), event.raw());

    conn.close().await;
}

// ── Close ─────────────────────────────────────────────────────────

#[test_log::test(tokio::test)]
async fn test_close_while_attached_detaches_first() {
    let daemon = MockDaemon::start().await;
    let mut conn = connect(&daemon).await;
    let local_path = conn.local_path().to_path_buf();
    assert!(local_path.exists());

    conn.attach().await.unwrap();
    conn.close().await;

    assert_eq!(daemon.count(b"DETACH"), 1);
    assert_eq!(daemon.monitor_count(), 0);
    assert!(conn.is_closed());
    assert!(!conn.is_attached());
    assert!(!local_path.exists());
}

#[test_log::test(tokio::test)]
async fn test_close_survives_failed_detach() {
    let daemon = MockDaemon::with_responder(|cmd| match cmd {
        b"DETACH" => Some(vec![b"FAIL\n".to_vec()]),
        _ => None,
    })
    .await;
    let mut conn = connect(&daemon).await;

    conn.attach().await.unwrap();
    conn.close().await;

    assert_eq!(daemon.count(b"DETACH"), 1);
    assert!(conn.is_closed());
    assert!(!conn.local_path().exists());
}

#[test_log::test(tokio::test)]
async fn test_close_is_idempotent_and_final() {
    let daemon = MockDaemon::start().await;
    let mut conn = connect(&daemon).await;

    conn.close().await;
    conn.close().await;

    assert!(matches!(conn.request("PING").await, Err(WpaCtrlError::Closed)));
    assert!(matches!(conn.attach().await, Err(WpaCtrlError::Closed)));
    assert!(matches!(conn.detach().await, Err(WpaCtrlError::Closed)));
    assert!(matches!(conn.pending().await, Err(WpaCtrlError::Closed)));
    assert!(matches!(conn.recv().await, Err(WpaCtrlError::Closed)));
    assert!(matches!(conn.subscribe(), Err(WpaCtrlError::Closed)));
    assert!(daemon.received().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_drop_removes_local_socket() {
    let daemon = MockDaemon::start().await;
    let conn = connect(&daemon).await;
    let local_path = conn.local_path().to_path_buf();

    drop(conn);
    assert!(!local_path.exists());
}

#[test_log::test(tokio::test)]
async fn test_connections_get_distinct_local_paths() {
    let daemon = MockDaemon::start().await;
    let mut first = connect(&daemon).await;
    let mut second = connect(&daemon).await;

    assert_ne!(first.local_path(), second.local_path());
    assert_eq!(first.request("PING").await.unwrap(), b"PONG\n");
    assert_eq!(second.request("PING").await.unwrap(), b"PONG\n");

    first.close().await;
    second.close().await;
}
