//! Client lifecycle tests against the stub engine.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use tokio_test::{assert_err, assert_ok};

use common::{stub_client, target, wait_until, Probe, StubEngine};
use tox_client::utils::{ClientConfig, EngineConfig, EngineError};
use tox_client::{Client, ClientError, ClientState};

// ----------------------------------------------------------------------------
// Bootstrap
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_bootstrap_succeeds_when_any_target_accepts() {
    let probe = Probe::new();
    let engine_probe = probe.clone();
    let client = Client::with_factory(ClientConfig::default(), move |_: &EngineConfig| {
        Ok(StubEngine::new(engine_probe).unreachable("node-2"))
    })
    .await
    .unwrap();

    let targets = [target("node-1"), target("node-2"), target("node-3")];
    client.bootstrap(&targets).await.unwrap();

    // Continue-on-error: the failure in the middle does not stop the walk.
    assert_eq!(
        *probe.bootstrap_attempts.lock().unwrap(),
        vec!["node-1", "node-2", "node-3"]
    );

    let report = client.bootstrap_with_report(&targets).await.unwrap();
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_fails_when_every_target_fails() {
    let probe = Probe::new();
    let engine_probe = probe.clone();
    let client = Client::with_factory(ClientConfig::default(), move |_: &EngineConfig| {
        Ok(StubEngine::new(engine_probe).unreachable("a").unreachable("b"))
    })
    .await
    .unwrap();

    let error = client.bootstrap(&[target("a"), target("b")]).await.unwrap_err();
    match error {
        ClientError::Bootstrap(failure) => {
            assert_eq!(failure.addresses().collect::<Vec<_>>(), vec!["a", "b"]);
            assert!(failure.to_string().contains("failed to bootstrap with server a"));
            assert!(failure.to_string().contains("failed to bootstrap with server b"));
        }
        other => panic!("unexpected error: {other}"),
    }

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bootstrap_with_no_targets_fails() {
    let (client, probe) = stub_client().await;

    match client.bootstrap(&[]).await {
        Err(ClientError::Bootstrap(failure)) => assert!(failure.is_empty()),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(probe.bootstrap_attempts.lock().unwrap().is_empty());

    client.shutdown().await.unwrap();
}

// ----------------------------------------------------------------------------
// Messaging
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_handler_swap_attributes_each_event_once() {
    let (client, probe) = stub_client().await;
    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));

    let sink = first.clone();
    client.register_message_handler(move |peer, text| {
        sink.lock().unwrap().push((peer, text.to_string()));
    });
    client.start(Duration::from_millis(5)).await.unwrap();

    probe.emit(7, "to first");
    assert!(wait_until(Duration::from_secs(2), || first.lock().unwrap().len() == 1).await);

    let sink = second.clone();
    client.register_message_handler(move |peer, text| {
        sink.lock().unwrap().push((peer, text.to_string()));
    });

    probe.emit(8, "to second");
    assert!(wait_until(Duration::from_secs(2), || second.lock().unwrap().len() == 1).await);

    client.shutdown().await.unwrap();

    assert_eq!(*first.lock().unwrap(), vec![(7, "to first".to_string())]);
    assert_eq!(*second.lock().unwrap(), vec![(8, "to second".to_string())]);
    assert_eq!(client.dispatch_stats().delivered, 2);
}

#[tokio::test]
async fn test_events_without_handler_are_dropped() {
    let (client, probe) = stub_client().await;
    client.start(Duration::from_millis(5)).await.unwrap();

    probe.emit(1, "nobody listening");
    assert!(wait_until(Duration::from_secs(2), || client.dispatch_stats().dropped == 1).await);

    client.shutdown().await.unwrap();
    assert_eq!(client.dispatch_stats().delivered, 0);
}

#[tokio::test]
async fn test_send_reaches_engine() {
    let (client, probe) = stub_client().await;

    assert_ok!(client.send_message(3, "hello").await);
    assert_eq!(*probe.sent.lock().unwrap(), vec![(3, "hello".to_string())]);

    client.shutdown().await.unwrap();
}

// ----------------------------------------------------------------------------
// Shutdown
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_shutdown_before_start_never_ticks() {
    let (client, probe) = stub_client().await;

    client.shutdown().await.unwrap();

    assert_eq!(probe.ticks(), 0);
    assert_eq!(probe.destroy_calls(), 1);
    assert_eq!(client.state().await, ClientState::Stopped);
}

#[tokio::test]
async fn test_operations_after_shutdown_report_closed() {
    let (client, probe) = stub_client().await;
    client.shutdown().await.unwrap();

    assert!(matches!(client.send_message(1, "late").await, Err(ClientError::Closed)));
    assert!(matches!(client.bootstrap(&[target("n")]).await, Err(ClientError::Closed)));
    assert!(matches!(
        client.start(Duration::from_millis(5)).await,
        Err(ClientError::Closed)
    ));
    assert!(probe.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let (client, probe) = stub_client().await;
    client.start(Duration::from_millis(5)).await.unwrap();

    assert_ok!(client.shutdown().await);
    assert_ok!(client.shutdown().await);
    assert_ok!(client.stop().await);

    assert_eq!(probe.destroy_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_shutdown_destroys_once() {
    let (client, probe) = stub_client().await;
    let client = Arc::new(client);
    client.start(Duration::from_millis(5)).await.unwrap();

    let handles = (0..4).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.shutdown().await })
    });
    for joined in join_all(handles).await {
        assert_ok!(joined.unwrap());
    }

    assert_eq!(probe.destroy_calls(), 1);
    let ticks = probe.ticks();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(probe.ticks(), ticks);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_racing_shutdown_leaves_no_loop_running() {
    for _ in 0..50 {
        let (client, probe) = stub_client().await;
        let client = Arc::new(client);

        let starter = {
            let client = client.clone();
            tokio::spawn(async move { client.start(Duration::from_millis(1)).await })
        };
        let stopper = {
            let client = client.clone();
            tokio::spawn(async move { client.shutdown().await })
        };

        match starter.await.unwrap() {
            Ok(()) | Err(ClientError::Closed) => {}
            Err(other) => panic!("unexpected start error: {other}"),
        }
        assert_ok!(stopper.await.unwrap());

        // Whichever side won the lock, nothing ticks once shutdown returns.
        assert_ne!(client.event_loop_state().await, tox_client::EventLoopState::Running);
        assert_eq!(probe.destroy_calls(), 1);
        let ticks = probe.ticks();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(probe.ticks(), ticks);
    }
}

#[tokio::test]
async fn test_engine_destroyed_after_final_tick() {
    let (client, probe) = stub_client().await;
    client.start(Duration::from_millis(5)).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || probe.ticks() >= 3).await);

    client.shutdown().await.unwrap();

    let last_tick = probe.last_tick_end.lock().unwrap().unwrap();
    let destroyed = probe.destroyed_at.lock().unwrap().unwrap();
    assert!(destroyed >= last_tick);
    assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_keeps_engine_alive() {
    let (client, probe) = stub_client().await;
    client.start(Duration::from_millis(5)).await.unwrap();
    assert!(wait_until(Duration::from_secs(2), || probe.ticks() >= 1).await);

    client.stop().await.unwrap();
    client.stop().await.unwrap();
    assert_eq!(client.state().await, ClientState::Stopped);
    assert_eq!(probe.destroy_calls(), 0);

    // The engine still serves requests; only the loop is gone.
    assert_ok!(client.send_message(2, "after stop").await);
    let restart = assert_err!(client.start(Duration::from_millis(5)).await);
    assert!(matches!(restart, ClientError::InvalidState { .. }));

    client.shutdown().await.unwrap();
    assert_eq!(probe.destroy_calls(), 1);
}

#[tokio::test]
async fn test_construction_failure_surfaces_cause() {
    let result = Client::with_factory(ClientConfig::default(), |_: &EngineConfig| {
        Err::<StubEngine, _>(EngineError::InvalidOption {
            option: "proxy".to_string(),
            reason: "unsupported".to_string(),
        })
    })
    .await;

    match result {
        Err(ClientError::Initialization(error)) => {
            assert!(matches!(error.source, EngineError::InvalidOption { .. }));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("construction should fail"),
    }
}
