use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use live_engine::stream::StreamManager;
use live_engine::stream::StreamMeta;
use live_engine::stream::StreamTask;
use live_engine::stream::SubmitOutcome;
use live_engine::LocalHub;
use live_engine::Status;
use live_engine::StreamConfig;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::common::editor;
use crate::common::enable_logger;
use crate::common::node_config;
use crate::common::viewer;
use crate::common::TestNode;

#[tokio::test]
async fn subscribe_without_history_has_no_payload() {
    enable_logger();
    let t = TestNode::start(node_config(1, false), |b| b);

    let (reply, status) = t
        .node
        .service()
        .subscribe(&viewer(1), "1/grafana/broadcast/foo", None)
        .await
        .unwrap();

    assert_eq!(status, Status::Ok);
    assert!(!reply.recover);
    assert_eq!(reply.data, None);
}

#[tokio::test]
async fn published_message_is_recovered_by_new_subscribers() {
    enable_logger();
    let t = TestNode::start(node_config(1, false), |b| b);
    let mut live = t.node.hub().subscribe(1, "grafana/broadcast/foo");

    let (_, status) = t
        .node
        .service()
        .publish(&editor(1), "1/grafana/broadcast/foo", Bytes::from_static(b"{}"))
        .await
        .unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(live.recv().await, Some(Bytes::from_static(b"{}")));

    let (reply, status) = t
        .node
        .service()
        .subscribe(&viewer(1), "1/grafana/broadcast/foo", None)
        .await
        .unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(reply.data, Some(Bytes::from_static(b"{}")));
}

#[tokio::test]
async fn second_submit_for_a_channel_never_runs() {
    enable_logger();
    let (_shutdown, shutdown_rx) = watch::channel(());
    let hub = LocalHub::default();
    let _listener = hub.subscribe(1, "test");
    let (manager, streams) = StreamManager::new(StreamConfig::default(), Arc::new(hub), shutdown_rx);
    tokio::spawn(manager.run());

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let task = |counter: Arc<AtomicUsize>| {
        StreamTask::new(StreamMeta::new(1, "test"), move |token| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                token.cancelled().await;
                Ok(())
            }
        })
    };

    let outcome = streams.submit_stream("1/test", task(first.clone())).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Started);
    let outcome = streams.submit_stream("1/test", task(second.clone())).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::AlreadyRunning);
    sleep(Duration::from_millis(20)).await;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
    assert_eq!(streams.list_streams().await.unwrap().len(), 1);
}
