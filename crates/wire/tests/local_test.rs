//! Integration tests for the in-process network and the serve loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use locus_wire::{serve, Address, LocalNetwork, Message, Network, Service, WireError};

/// Multiplies a u32 request by ten after an optional delay.
struct Echo {
    delay: Duration,
    handled: AtomicUsize,
}

#[async_trait]
impl Service for Echo {
    async fn handle(&self, request: Message) -> Result<Message, WireError> {
        tokio::time::sleep(self.delay).await;
        self.handled.fetch_add(1, Ordering::SeqCst);
        let value: u32 = request.decode()?;
        Ok(request.reply(&(value * 10))?)
    }
}

fn echo(delay: Duration) -> Arc<Echo> {
    Arc::new(Echo {
        delay,
        handled: AtomicUsize::new(0),
    })
}

#[tokio::test]
async fn request_reply_roundtrip() {
    let net = LocalNetwork::new();
    let addr = Address::new("local", 1);
    let listener = net.bind(&addr).await.unwrap();
    let shutdown = Arc::new(Notify::new());
    let server = tokio::spawn(serve(listener, echo(Duration::ZERO), shutdown.clone()));

    let reply = net
        .request(&addr, Message::new("echo", &4u32).unwrap())
        .await
        .unwrap();
    assert_eq!(reply.op, "echo.reply");
    assert_eq!(reply.decode::<u32>().unwrap(), 40);

    shutdown.notify_one();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn unbound_address_is_unreachable() {
    let net = LocalNetwork::new();
    let err = net
        .request(&Address::new("nowhere", 9), Message::new("echo", &1u32).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Unreachable(_)));
    assert!(err.is_connectivity());
}

#[tokio::test]
async fn address_is_released_after_shutdown() {
    let net = LocalNetwork::new();
    let addr = Address::new("local", 2);
    let shutdown = Arc::new(Notify::new());
    let listener = net.bind(&addr).await.unwrap();
    assert!(net.bind(&addr).await.is_err(), "double bind must fail");

    let server = tokio::spawn(serve(listener, echo(Duration::ZERO), shutdown.clone()));
    shutdown.notify_one();
    server.await.unwrap().unwrap();

    let err = net
        .request(&addr, Message::new("echo", &1u32).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, WireError::Unreachable(_)));
    assert!(net.bind(&addr).await.is_ok(), "address can be reused");
}

#[tokio::test]
async fn shutdown_drains_in_flight_requests() {
    let net = Arc::new(LocalNetwork::new());
    let addr = Address::new("local", 3);
    let service = echo(Duration::from_millis(100));
    let shutdown = Arc::new(Notify::new());
    let listener = net.bind(&addr).await.unwrap();
    let server = tokio::spawn(serve(listener, service.clone(), shutdown.clone()));

    let client = {
        let net = Arc::clone(&net);
        let addr = addr.clone();
        tokio::spawn(async move { net.request(&addr, Message::new("echo", &7u32).unwrap()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.notify_one();

    let reply = client.await.unwrap().unwrap();
    assert_eq!(reply.decode::<u32>().unwrap(), 70);
    server.await.unwrap().unwrap();
    assert_eq!(service.handled.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_requests_are_handled_in_parallel() {
    let net = Arc::new(LocalNetwork::new());
    let addr = Address::new("local", 4);
    let shutdown = Arc::new(Notify::new());
    let listener = net.bind(&addr).await.unwrap();
    let server = tokio::spawn(serve(listener, echo(Duration::from_millis(100)), shutdown.clone()));

    let started = std::time::Instant::now();
    let mut handles = Vec::new();
    for i in 0..5u32 {
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
    assert!(started.elapsed() < Duration::from_millis(450));

    shutdown.notify_one();
    server.await.unwrap().unwrap();
}
