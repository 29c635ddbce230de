//! Scheduler behaviour on an in-process cluster of one center and two
//! single-core workers.

use std::collections::BTreeSet;
use std::sync::Arc;

use locus_center::{Center, CenterHandle};
use locus_core::{Arg, FunctionRegistry, Status};
use locus_pool::{Pool, PoolError, RemoteData};
use locus_wire::{Address, LocalNetwork, Network};
use locus_worker::{Worker, WorkerClient, WorkerConfig, WorkerHandle};
use serde_json::{json, Value};

fn center_addr() -> Address {
    Address::new("127.0.0.1", 8017)
}

fn a() -> Address {
    Address::new("127.0.0.1", 8018)
}

fn b() -> Address {
    Address::new("127.0.0.1", 8019)
}

struct Cluster {
    center: CenterHandle,
    a: WorkerHandle,
    b: WorkerHandle,
    pool: Pool,
}

async fn worker(net: &Arc<dyn Network>, address: Address) -> WorkerHandle {
    let config = WorkerConfig {
        address,
        center: center_addr(),
        ncores: 1,
    };
    Worker::start(net.clone(), config, FunctionRegistry::builtin())
        .await
        .unwrap()
}

async fn cluster() -> Cluster {
    let net: Arc<dyn Network> = Arc::new(LocalNetwork::new());
    let center = Center::start(net.clone(), center_addr()).await.unwrap();
    let a = worker(&net, a()).await;
    let b = worker(&net, b()).await;
    let pool = Pool::new(center_addr(), net.clone()).unwrap();
    pool.sync().await.unwrap();
    Cluster {
        center,
        a,
        b,
        pool,
    }
}

impl Cluster {
    async fn teardown(self) {
        self.pool.close().await;
        self.a.close().await;
        self.b.close().await;
        let _ = self.a.join().await;
        let _ = self.b.join().await;
        self.center.shutdown().await.unwrap();
    }
}

fn values(items: &[i64]) -> Vec<Vec<Arg>> {
    items.iter().map(|i| vec![Arg::value(*i)]).collect()
}

fn sorted(mut xs: Vec<u32>) -> Vec<u32> {
    xs.sort_unstable();
    xs
}

#[tokio::test]
async fn pool_lifecycle() {
    let c = cluster().await;
    let p = &c.pool;

    let computation = p
        .submit("add", vec![Arg::value(1), Arg::value(2)])
        .await
        .unwrap();
    assert_eq!(computation.status(), Status::Running);
    assert_eq!(sorted(p.available_cores().into_values().collect()), vec![0, 1]);

    let x = computation.result().await.unwrap();
    assert_eq!(computation.status(), Status::Success);
    assert_eq!(x.status(), Status::Success);
    assert_eq!(p.available_cores().into_values().collect::<Vec<_>>(), vec![1, 1]);
    assert_eq!(x.get(false).await.unwrap(), json!(3));

    // The follow-up runs where its input already lives.
    let computation = p
        .submit("add", vec![Arg::from(&x), Arg::value(10)])
        .await
        .unwrap();
    assert_eq!(computation.worker().as_ref(), Some(x.holder()));
    let y = computation.result().await.unwrap();
    assert_eq!(y.get(false).await.unwrap(), json!(13));
    assert_eq!(sorted(vec![c.a.data_len() as u32, c.b.data_len() as u32]), vec![0, 2]);

    let x = p.submit("add", vec![Arg::value(1), Arg::value(2)]).await.unwrap();
    let y = p.submit("add", vec![Arg::value(1), Arg::value(2)]).await.unwrap();
    assert_eq!(p.available_cores().into_values().collect::<Vec<_>>(), vec![0, 0]);
    assert_ne!(x.worker(), y.worker());
    let xx = x.result().await.unwrap();
    assert_eq!(p.available_cores()[xx.holder()], 1);
    xx.get(false).await.unwrap();
    y.get(false).await.unwrap();
    assert_eq!(p.available_cores().into_values().collect::<Vec<_>>(), vec![1, 1]);

    let seq = p
        .map("mul", vec![
            vec![Arg::value(1), Arg::value(100)],
            vec![Arg::value(2), Arg::value(100)],
            vec![Arg::value(3), Arg::value(100)],
        ])
        .await
        .unwrap();
    assert_eq!(seq[0].get(false).await.unwrap(), json!(100));
    assert_eq!(seq[1].get(false).await.unwrap(), json!(200));
    assert_eq!(seq[2].get(true).await.unwrap(), json!(300));

    // Failures are stored, and only raised on fetch.
    let results = p
        .map("div", vec![
            vec![Arg::value(3), Arg::value(0)],
            vec![Arg::value(3), Arg::value(1)],
            vec![Arg::value(3), Arg::value(2)],
            vec![Arg::value(3), Arg::value(3)],
        ])
        .await
        .unwrap();
    let mut resolved: Vec<RemoteData> = Vec::new();
    for r in &results {
        resolved.push(r.result().await.unwrap());
    }
    assert_eq!(resolved[0].status(), Status::Error);
    assert_eq!(resolved[1].status(), Status::Success);
    let err = results[0].get(false).await.unwrap_err();
    assert_eq!(err.kind(), Some("DivisionByZero"));

    c.teardown().await;
}

#[tokio::test]
async fn queued_tasks_drain_as_cores_free_up() {
    let c = cluster().await;

    let seq = c.pool.map("inc", values(&[1, 2, 3, 4, 5])).await.unwrap();
    let statuses: Vec<Status> = seq.iter().map(|s| s.status()).collect();
    assert_eq!(statuses.iter().filter(|s| **s == Status::Running).count(), 2);
    assert_eq!(statuses.iter().filter(|s| **s == Status::Pending).count(), 3);

    let results = c.pool.gather(&seq).await.unwrap();
    assert_eq!(results, vec![json!(2), json!(3), json!(4), json!(5), json!(6)]);
    assert_eq!(c.pool.queued(), 0);
    assert_eq!(
        c.pool.available_cores().into_values().collect::<Vec<_>>(),
        vec![1, 1]
    );

    c.teardown().await;
}

#[tokio::test]
async fn failing_job() {
    let c = cluster().await;

    let results = c
        .pool
        .map("div", vec![
            vec![Arg::value(1), Arg::value(2)],
            vec![Arg::value(1), Arg::value(1)],
            vec![Arg::value(1), Arg::value(0)],
        ])
        .await
        .unwrap();
    assert_eq!(results[0].get(false).await.unwrap(), json!(0.5));
    match results[2].get(false).await.unwrap_err() {
        PoolError::Execution { kind, .. } => assert_eq!(kind, "DivisionByZero"),
        other => panic!("expected an execution failure, got {other:?}"),
    }

    // A failed reference can be passed on; the failure surfaces downstream.
    let failed = results[2].result().await.unwrap();
    let next = c.pool.submit("inc", vec![Arg::from(&failed)]).await.unwrap();
    assert_eq!(next.result().await.unwrap().status(), Status::Error);
    assert_eq!(
        next.get(false).await.unwrap_err().kind(),
        Some("DivisionByZero")
    );

    c.teardown().await;
}

#[tokio::test]
async fn delete_remote_frees_the_copy() {
    let c = cluster().await;

    let x = c
        .pool
        .submit("add", vec![Arg::value(1), Arg::value(2)])
        .await
        .unwrap()
        .result()
        .await
        .unwrap();
    let holder = if x.holder() == c.a.address() { &c.a } else { &c.b };

    assert_eq!(x.get(false).await.unwrap(), json!(3));
    assert!(holder.has_key(x.key()));
    assert_eq!(x.get(true).await.unwrap(), json!(3));
    assert!(!holder.has_key(x.key()));
    assert!(!c.pool.who_has().contains_key(x.key()));

    match x.get(false).await.unwrap_err() {
        PoolError::Lost { key, .. } => assert_eq!(&key, x.key()),
        other => panic!("expected lost data, got {other:?}"),
    }

    c.teardown().await;
}

#[tokio::test]
async fn scatter_round_robins_and_gathers_in_order() {
    let c = cluster().await;

    let input: Vec<Value> = (0..10).map(|i| json!(i)).collect();
    let remote = c.pool.scatter(input.clone()).await.unwrap();
    let holders: BTreeSet<&Address> = remote.iter().map(|r| r.holder()).collect();
    assert_eq!(holders.len(), 2);
    assert_eq!(c.a.data_len(), 5);
    assert_eq!(c.b.data_len(), 5);

    assert_eq!(c.pool.gather(&remote).await.unwrap(), input);

    // Scattered data feeds further tasks without passing through the client.
    let doubled = c
        .pool
        .map("mul", remote.iter().map(|r| vec![Arg::from(r), Arg::value(2)]).collect())
        .await
        .unwrap();
    let mut dispatched = 0;
    for (d, r) in doubled.iter().zip(&remote) {
        if let Some(worker) = d.worker() {
            assert_eq!(&worker, r.holder());
            dispatched += 1;
        }
    }
    assert_eq!(dispatched, 2);
    let expected: Vec<Value> = (0..10).map(|i| json!(i * 2)).collect();
    assert_eq!(c.pool.gather(&doubled).await.unwrap(), expected);

    c.teardown().await;
}

#[tokio::test]
async fn collect_from_dead_worker() {
    let Cluster {
        center,
        a: wa,
        b: wb,
        pool,
    } = cluster().await;

    let remote = pool.scatter((0..10).map(|i| json!(i)).collect()).await.unwrap();
    wa.close().await;
    wa.join().await.unwrap();

    match pool.gather(&remote).await.unwrap_err() {
        PoolError::Lost { holder, .. } => assert_eq!(holder, a()),
        other => panic!("expected lost data, got {other:?}"),
    }

    pool.close().await;
    wb.close().await;
    wb.join().await.unwrap();
    center.shutdown().await.unwrap();
}

#[tokio::test]
async fn close_worker_cleanly_before_map() {
    let net: Arc<dyn Network> = Arc::new(LocalNetwork::new());
    let center = Center::start(net.clone(), center_addr()).await.unwrap();
    let wa = worker(&net, a()).await;
    let wb = worker(&net, b()).await;
    let pool = Pool::new(center_addr(), net.clone()).unwrap();

    WorkerClient::new(net.clone(), a()).terminate().await.unwrap();
    wa.join().await.unwrap();

    let seq = pool.map("inc", values(&[0, 1, 2])).await.unwrap();
    assert_eq!(
        pool.available_cores().into_keys().collect::<Vec<_>>(),
        vec![b()]
    );
    assert_eq!(
        pool.gather(&seq).await.unwrap(),
        vec![json!(1), json!(2), json!(3)]
    );

    pool.close().await;
    wb.close().await;
    wb.join().await.unwrap();
    center.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreachable_worker_is_dropped_from_dispatch() {
    let Cluster {
        center,
        a: wa,
        b: wb,
        pool,
    } = cluster().await;

    // The pool still believes `a` is alive.
    wa.close().await;
    wa.join().await.unwrap();

    let first = pool.submit("inc", vec![Arg::value(1)]).await.unwrap();
    assert_eq!(first.worker(), Some(a()));
    match first.result().await.unwrap_err() {
        PoolError::Unreachable { address, .. } => assert_eq!(address, a()),
        other => panic!("expected unreachable, got {other:?}"),
    }
    assert!(!pool.ncores().contains_key(&a()));

    let second = pool.submit("inc", vec![Arg::value(1)]).await.unwrap();
    assert_eq!(second.worker(), Some(b()));
    assert_eq!(second.get(false).await.unwrap(), json!(2));

    pool.close().await;
    wb.close().await;
    wb.join().await.unwrap();
    center.shutdown().await.unwrap();
}

#[tokio::test]
async fn closed_pool_fails_queued_and_new_work() {
    let c = cluster().await;

    let seq = c.pool.map("inc", values(&[1, 2, 3])).await.unwrap();
    c.pool.close().await;

    assert_eq!(seq[2].result().await.unwrap_err(), PoolError::Closed);
    assert_eq!(
        c.pool.submit("inc", vec![Arg::value(1)]).await.unwrap_err(),
        PoolError::Closed
    );
    assert!(c.pool.available_cores().is_empty());

    c.teardown().await;
}

#[tokio::test]
async fn pool_inputs() {
    let net: Arc<dyn Network> = Arc::new(LocalNetwork::new());

    let p = Pool::new("127.0.0.1:8000", net.clone()).unwrap();
    assert_eq!(p.center().host(), "127.0.0.1");
    assert_eq!(p.center().port(), 8000);

    let p = Pool::new(("127.0.0.1", 8000), net.clone()).unwrap();
    assert_eq!(p.center(), &Address::new("127.0.0.1", 8000));

    assert!(Pool::new("no-port", net).is_err());
}

#[tokio::test]
async fn no_workers_is_an_error() {
    let net: Arc<dyn Network> = Arc::new(LocalNetwork::new());
    let center = Center::start(net.clone(), center_addr()).await.unwrap();
    let pool = Pool::new(center_addr(), net.clone()).unwrap();

    assert_eq!(
        pool.submit("inc", vec![Arg::value(1)]).await.unwrap_err(),
        PoolError::NoWorkers
    );
    center.shutdown().await.unwrap();
}
