//! Integration tests for the ZeroMQ DEALER/ROUTER substrate.
//!
//! Tests verify correlation-id matching, concurrent requests, late replies
//! and unreachable peers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use locus_wire::{Address, Listener, Message, Network, WireError, ZmqNetwork, ZmqRequestServer};

const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn single_request_reply() {
    let addr = Address::new("127.0.0.1", 16600);
    let server = ZmqRequestServer::bind(&addr).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let net = ZmqNetwork::new(TIMEOUT);
    let request = Message::new("ping", &"ping".to_string()).unwrap();
    let cid = request.correlation_id;

    let server_handle = tokio::spawn(async move {
        let (token, msg) = server.recv_request().await.unwrap();
        assert_eq!(msg.op, "ping");
        assert_eq!(msg.decode::<String>().unwrap(), "ping");
        let reply = msg.reply(&"pong".to_string()).unwrap();
        server.send_reply(token, reply).await.unwrap();
        server
    });

    let reply = net.request(&addr, request).await.unwrap();
    assert_eq!(reply.correlation_id, cid);
    assert_eq!(reply.op, "ping.reply");
    assert_eq!(reply.decode::<String>().unwrap(), "pong");

    drop(server_handle.await.unwrap());
}

#[tokio::test]
async fn replies_out_of_order_reach_their_callers() {
    let addr = Address::new("127.0.0.1", 16610);
    let server = Arc::new(ZmqRequestServer::bind(&addr).await.unwrap());
    tokio::time::sleep(SETTLE).await;

    let n = 5u32;
    let srv = Arc::clone(&server);
    let server_handle = tokio::spawn(async move {
        let mut received = Vec::new();
        for _ in 0..n {
            received.push(srv.recv_request().await.unwrap());
        }
        // Answer in reverse arrival order.
        while let Some((token, msg)) = received.pop() {
            let value: u32 = msg.decode().unwrap();
            srv.send_reply(token, msg.reply(&(value * 10)).unwrap()).await.unwrap();
        }
    });

    let net = Arc::new(ZmqNetwork::new(TIMEOUT));
    let mut handles = Vec::new();
    for i in 0..n {
        let net = Arc::clone(&net);
        let addr = addr.clone();
        handles.push(tokio::spawn(async move {
            let reply = net.request(&addr, Message::new("echo", &i).unwrap()).await.unwrap();
            assert_eq!(reply.decode::<u32>().unwrap(), i * 10);
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    server_handle.await.unwrap();
}

#[tokio::test]
async fn silent_peer_times_out() {
    let addr = Address::new("127.0.0.1", 16620);
    let _server = ZmqRequestServer::bind(&addr).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let short = Duration::from_millis(300);
    let net = ZmqNetwork::new(short);
    let err = net
        .request(&addr, Message::new("black_hole", &()).unwrap())
        .await
        .unwrap_err();
    match err {
        WireError::Timeout { after, .. } => assert_eq!(after, short),
        other => panic!("expected Timeout, got: {other}"),
    }
}

#[tokio::test]
async fn nobody_listening_is_a_connectivity_failure() {
    let net = ZmqNetwork::new(Duration::from_millis(300));
    let err = net
        .request(&Address::new("127.0.0.1", 16630), Message::new("ping", &()).unwrap())
        .await
        .unwrap_err();
    assert!(err.is_connectivity(), "unexpected error: {err}");
}

#[tokio::test]
async fn connecting_to_a_dead_peer_does_not_stall_others() {
    let live = Address::new("127.0.0.1", 16640);
    let server = ZmqRequestServer::bind(&live).await.unwrap();
    tokio::time::sleep(SETTLE).await;
    let server_handle = tokio::spawn(async move {
        let (token, msg) = server.recv_request().await.unwrap();
        server.send_reply(token, msg.reply(&()).unwrap()).await.unwrap();
        server
    });

    let net = Arc::new(ZmqNetwork::new(Duration::from_secs(2)));
    let dead = Arc::clone(&net);
    let stuck = tokio::spawn(async move {
        dead.request(&Address::new("127.0.0.1", 16649), Message::new("ping", &()).unwrap())
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    net.request(&live, Message::new("ping", &()).unwrap())
        .await
        .unwrap();
    assert!(
        started.elapsed() < Duration::from_secs(1),
        "live request waited {:?}",
        started.elapsed()
    );

    assert!(stuck.await.unwrap().is_err());
    drop(server_handle.await.unwrap());
}

#[tokio::test]
async fn supervised_request_waits_past_the_timeout() {
    let addr = Address::new("127.0.0.1", 16650);
    let server = ZmqRequestServer::bind(&addr).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let server_handle = tokio::spawn(async move {
        let (token, msg) = server.recv_request().await.unwrap();
        tokio::time::sleep(Duration::from_millis(900)).await;
        server.send_reply(token, msg.reply(&"done".to_string()).unwrap()).await.unwrap();
        server
    });

    let net = ZmqNetwork::new(Duration::from_millis(300));
    let reply = net
        .request_supervised(&addr, Message::new("work", &()).unwrap())
        .await
        .unwrap();
    assert_eq!(reply.decode::<String>().unwrap(), "done");

    drop(server_handle.await.unwrap());
}

#[tokio::test]
async fn supervised_request_fails_when_the_peer_dies() {
    let addr = Address::new("127.0.0.1", 16660);
    let server = ZmqRequestServer::bind(&addr).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    // Take the request, then go away without answering.
    let server_handle = tokio::spawn(async move {
        let _request = server.recv_request().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(server);
    });

    let net = ZmqNetwork::new(Duration::from_millis(300));
    let err = net
        .request_supervised(&addr, Message::new("work", &()).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Unreachable(_)), "unexpected error: {err}");

    server_handle.await.unwrap();
}
