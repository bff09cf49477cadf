//! Engine startup, expiry and shutdown tests


use integration_harness::{LOCALHOST, eventually, free_ports, start_server, test_sequence};
use portknock_listener::ListenerError;
use portknock_sequence::{KnockSequence, KnockStep};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Test: One unavailable port prevents startup entirely
#[tokio::test]
async fn test_partial_port_coverage_is_fatal() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = occupied.local_addr().unwrap().port();
    let free = free_ports(2);
    let sequence = KnockSequence::from_ports(&[free[0], taken, free[1]]).unwrap();

    match start_server(sequence, Duration::from_secs(1)).await {
        Ok(_) => panic!("Server started with a port already in use"),
        Err(e) => {
            let err = e.downcast::<ListenerError>().expect("Unexpected error type");
            assert!(matches!(err, ListenerError::Bind { port, .. } if port == taken));
        }
    }

    // Nothing stays bound after the failed start
    for port in free {
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_ok());
    }
}

/// Test: Knock ports answer nothing and close immediately
#[tokio::test]
async fn test_knock_port_sends_no_bytes() {
    let sequence = test_sequence();
    let port = sequence.steps()[0].port;
    let (server, _grants) = start_server(sequence, Duration::from_secs(5))
        .await
        .expect("Failed to start server");

    let mut stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .expect("Failed to connect");
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf))
        .await
        .expect("Connection was not closed");

    assert!(read.is_err() || buf.is_empty());

    server.shutdown().await;
}

/// Test: The sweeper removes abandoned sequences
#[tokio::test]
async fn test_abandoned_state_is_swept() {
    let port = free_ports(1)[0];
    let sequence = KnockSequence::new(vec![KnockStep::new(port, 5)]).unwrap();
    let (server, _grants) = start_server(sequence, Duration::from_millis(100))
        .await
        .expect("Failed to start server");
    let tracker = server.tracker().clone();

    let _ = TcpStream::connect(("127.0.0.1", port)).await;
    assert!(eventually(Duration::from_secs(2), || tracker.state_of(&LOCALHOST).is_some()).await);

    assert!(eventually(Duration::from_secs(2), || tracker.is_empty()).await);
    assert_eq!(tracker.stats().snapshot().swept, 1);

    server.shutdown().await;
}

/// Test: Shutdown stops every listener
#[tokio::test]
async fn test_shutdown_releases_ports() {
    let sequence = test_sequence();
    let ports = sequence.distinct_ports();
    let (server, _grants) = start_server(sequence, Duration::from_secs(5))
        .await
        .expect("Failed to start server");
    assert_eq!(server.local_addrs().len(), ports.len());

    tokio::time::timeout(Duration::from_secs(2), server.shutdown())
        .await
        .expect("Shutdown did not complete");

    for port in ports {
        assert!(
            TcpStream::connect(("127.0.0.1", port)).await.is_err(),
            "Port {} still accepting after shutdown",
            port
        );
    }
}
