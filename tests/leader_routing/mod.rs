use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use live_engine::ErrorKind;
use live_engine::InMemoryLeaderCoordinator;
use live_engine::LocalHub;
use live_engine::LocalLeaderTransport;
use live_engine::Status;
use tokio::time::sleep;

use crate::common::enable_logger;
use crate::common::node_config;
use crate::common::viewer;
use crate::common::TestNode;

const CHANNEL: &str = "1/plugin/testplugin/cpu";
const KEY: &str = "1/plugin/testplugin/cpu";

/// Two HA nodes sharing a lease table, a transport and a fan-out hub
struct Cluster {
    a: TestNode,
    b: TestNode,
    coordinator: Arc<InMemoryLeaderCoordinator>,
    hub: LocalHub,
}

fn cluster() -> Cluster {
    enable_logger();
    let coordinator = Arc::new(InMemoryLeaderCoordinator::new(Duration::from_secs(10)));
    let transport = Arc::new(LocalLeaderTransport::new(Duration::from_secs(2)));
    let hub = LocalHub::default();

    let start = |node_id| {
        let coordinator = coordinator.clone();
        let transport = transport.clone();
        let hub = hub.clone();
        TestNode::start(node_config(node_id, true), move |b| {
            b.leader_coordinator(coordinator)
                .local_transport(transport)
                .hub(hub)
        })
    };
    let a = start(1);
    let b = start(2);
    Cluster {
        a,
        b,
        coordinator,
        hub,
    }
}

#[tokio::test]
async fn follower_forwards_subscribe_to_the_leader() {
    let c = cluster();
    let mut listener = c.hub.subscribe(1, "plugin/testplugin/cpu");

    let (reply, status) = c.a.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(reply.data, Some(Bytes::from_static(b"{\"node\":1}")));
    assert_eq!(c.coordinator.leader_of(KEY).unwrap().node_id, 1);

    let (reply, status) = c.b.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(reply.data, Some(Bytes::from_static(b"{\"node\":1}")));

    assert_eq!(c.b.backend.subscribe_calls(), 0);
    assert_eq!(c.b.backend.run_calls(), 0);
    assert_eq!(c.a.backend.subscribe_calls(), 2);

    assert_eq!(listener.recv().await.as_deref(), Some(&b"frame from 1"[..]));
    sleep(Duration::from_millis(20)).await;
    assert_eq!(c.a.backend.run_calls(), 1);
    assert!(c.b.node.streams().list_streams().await.unwrap().is_empty());
}

#[tokio::test]
async fn first_subscriber_decides_the_leader() {
    let c = cluster();
    let _listener = c.hub.subscribe(1, "plugin/testplugin/cpu");

    c.b.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    c.a.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    sleep(Duration::from_millis(20)).await;

    assert_eq!(c.coordinator.leader_of(KEY).unwrap().node_id, 2);
    assert_eq!(c.a.backend.subscribe_calls(), 0);
    assert_eq!(c.a.backend.run_calls(), 0);
    assert_eq!(c.b.backend.run_calls(), 1);
}

#[tokio::test]
async fn unreachable_leader_fails_the_subscribe() {
    let c = cluster();
    let _listener = c.hub.subscribe(1, "plugin/testplugin/cpu");
    c.a.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();

    c.a.node.stop();
    let err = c
        .b
        .node
        .service()
        .subscribe(&viewer(1), CHANNEL, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(Status::from(err.kind()), Status::InternalError);
    assert_eq!(c.b.backend.subscribe_calls(), 0);
}

#[tokio::test]
async fn leadership_moves_after_the_leader_shuts_down() {
    let c = cluster();
    let _listener = c.hub.subscribe(1, "plugin/testplugin/cpu");
    c.a.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    sleep(Duration::from_millis(20)).await;

    c.a.shutdown.send(()).unwrap();
    c.a.node.stop();
    sleep(Duration::from_millis(50)).await;
    assert!(c.coordinator.leader_of(KEY).is_none());

    let (reply, status) = c.b.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(reply.data, Some(Bytes::from_static(b"{\"node\":2}")));
    sleep(Duration::from_millis(20)).await;

    assert_eq!(c.coordinator.leader_of(KEY).unwrap().node_id, 2);
    assert_eq!(c.b.backend.run_calls(), 1);
}
