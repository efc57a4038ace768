use std::time::Duration;

use futures::future::join_all;
use live_engine::ErrorKind;
use live_engine::Status;
use tokio::time::sleep;

use crate::common::enable_logger;
use crate::common::node_config;
use crate::common::viewer;
use crate::common::TestNode;

const CHANNEL: &str = "1/plugin/testplugin/cpu";

#[tokio::test]
async fn concurrent_subscribes_share_one_stream() {
    enable_logger();
    let t = TestNode::start(node_config(1, false), |b| b);
    let _listener = t.node.hub().subscribe(1, "plugin/testplugin/cpu");

    let principal = viewer(1);
    let subscribes = (0..50).map(|_| t.node.service().subscribe(&principal, CHANNEL, None));
    for result in join_all(subscribes).await {
        let (reply, status) = result.unwrap();
        assert_eq!(status, Status::Ok);
        assert!(reply.presence);
    }
    sleep(Duration::from_millis(50)).await;

    assert_eq!(t.backend.subscribe_calls(), 50);
    assert_eq!(t.backend.run_calls(), 1);
    let streams = t.node.streams().list_streams().await.unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].key, CHANNEL);
}

#[tokio::test(start_paused = true)]
async fn stream_without_subscribers_is_collected() {
    enable_logger();
    let t = TestNode::start(node_config(1, false), |b| b);

    let (_, status) = t.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    assert_eq!(status, Status::Ok);

    sleep(Duration::from_secs(11)).await;
    assert_eq!(t.node.streams().list_streams().await.unwrap().len(), 1);

    sleep(Duration::from_secs(5)).await;
    assert!(t.node.streams().list_streams().await.unwrap().is_empty());
    assert_eq!(t.node.streams().active_count(), 0);

    t.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(t.backend.run_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stream_with_subscribers_keeps_running() {
    enable_logger();
    let t = TestNode::start(node_config(1, false), |b| b);
    let mut listener = t.node.hub().subscribe(1, "plugin/testplugin/cpu");

    t.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    assert_eq!(listener.recv().await.as_deref(), Some(&b"frame from 1"[..]));

    sleep(Duration::from_secs(60)).await;
    assert_eq!(t.node.streams().list_streams().await.unwrap().len(), 1);
    assert_eq!(t.backend.run_calls(), 1);

    drop(listener);
    sleep(Duration::from_secs(20)).await;
    assert!(t.node.streams().list_streams().await.unwrap().is_empty());
}

#[tokio::test]
async fn shutdown_stops_every_stream() {
    enable_logger();
    let t = TestNode::start(node_config(1, false), |b| b);
    let _listener = t.node.hub().subscribe(1, "plugin/testplugin/cpu");
    t.node.service().subscribe(&viewer(1), CHANNEL, None).await.unwrap();
    sleep(Duration::from_millis(20)).await;
    assert_eq!(t.node.streams().active_count(), 1);

    t.shutdown.send(()).unwrap();
    sleep(Duration::from_millis(20)).await;

    let err = t.node.streams().list_streams().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}
