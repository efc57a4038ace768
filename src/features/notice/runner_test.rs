use std::sync::Arc;

use bytes::Bytes;

use super::*;
use crate::test_utils::admin;
use crate::test_utils::editor;
use crate::test_utils::viewer;
use crate::ChannelHandler;
use crate::ErrorKind;
use crate::MemoryMessageStore;
use crate::MessageStore;
use crate::MockMessageStore;
use crate::OrgRole;
use crate::PublishEvent;
use crate::Status;
use crate::SubscribeEvent;

const EDITOR_CHANNEL: &str = "grafana/notice/editor";

fn runner(store: Arc<dyn MessageStore>) -> NoticeRunner {
    NoticeRunner::new(OrgRole::Editor, store, Arc::new(NoticeLocks::default()))
}

fn publish(body: &str) -> PublishEvent {
    PublishEvent::new(EDITOR_CHANNEL, "editor", body.to_string())
}

#[tokio::test]
async fn subscribe_requires_the_channel_role() {
    let runner = runner(Arc::new(MemoryMessageStore::default()));
    let event = SubscribeEvent::new(EDITOR_CHANNEL, "editor");

    let (_, status) = runner.on_subscribe(&viewer(1), event.clone()).await.unwrap();
    assert_eq!(status, Status::PermissionDenied);
    let (_, status) = runner.on_subscribe(&editor(1), event.clone()).await.unwrap();
    assert_eq!(status, Status::Ok);
    let (_, status) = runner.on_subscribe(&admin(1), event).await.unwrap();
    assert_eq!(status, Status::Ok);
}

#[tokio::test]
async fn publish_saves_and_broadcasts_changes_only() {
    let store = Arc::new(MemoryMessageStore::default());
    let runner = runner(store.clone());
    let include = r#"{"action":"includeKind","kind":"upgrade"}"#;

    let (reply, status) = runner.on_publish(&admin(1), publish(include)).await.unwrap();
    assert_eq!(status, Status::Ok);
    let stored = store.get(1, EDITOR_CHANNEL).await.unwrap().unwrap();
    assert_eq!(reply.data, Some(stored.clone()));

    let doc: NoticeDocument = serde_json::from_slice(&stored).unwrap();
    assert_eq!(doc.notices.len(), 1);
    assert!(doc.notices[0].timestamp > 0);

    let (reply, status) = runner.on_publish(&admin(1), publish(include)).await.unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(reply.data, None);

    let (reply, _) = runner
        .on_subscribe(&editor(1), SubscribeEvent::new(EDITOR_CHANNEL, "editor"))
        .await
        .unwrap();
    assert_eq!(reply.data, Some(stored));
}

#[tokio::test]
async fn unchanged_documents_are_not_written() {
    let mut store = MockMessageStore::new();
    store.expect_get().returning(|_, _| Ok(None));
    store.expect_save().never();
    let runner = runner(Arc::new(store));

    let (reply, status) = runner
        .on_publish(&admin(1), publish(r#"{"action":"clear"}"#))
        .await
        .unwrap();

    assert_eq!(status, Status::Ok);
    assert_eq!(reply.data, None);
}

#[tokio::test]
async fn publish_is_admin_only() {
    let store = Arc::new(MemoryMessageStore::default());
    let runner = runner(store.clone());

    let (_, status) = runner
        .on_publish(&editor(1), publish(r#"{"action":"clear"}"#))
        .await
        .unwrap();

    assert_eq!(status, Status::PermissionDenied);
    assert!(store.is_empty());
}

#[tokio::test]
async fn invalid_requests_are_validation_errors() {
    let store = Arc::new(MemoryMessageStore::default());
    let runner = runner(store.clone());

    for body in [
        "nope",
        r#"{"action":"remove"}"#,
        r#"{"action":"add","notice":{"kind":"","title":""}}"#,
    ] {
        let err = runner.on_publish(&admin(1), publish(body)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "body {body}");
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn concurrent_publishes_do_not_lose_updates() {
    let store = Arc::new(MemoryMessageStore::default());
    let runner = Arc::new(runner(store.clone()));

    let mut joins = Vec::new();
    for i in 0..8 {
        let runner = runner.clone();
        joins.push(tokio::spawn(async move {
            let body = format!(r#"{{"action":"add","notice":{{"kind":"k{i}"}}}}"#);
            runner.on_publish(&admin(1), publish(&body)).await.unwrap()
        }));
    }
    for join in joins {
        join.await.unwrap();
    }

    let stored: Bytes = store.get(1, EDITOR_CHANNEL).await.unwrap().unwrap();
    let doc: NoticeDocument = serde_json::from_slice(&stored).unwrap();
    assert_eq!(doc.notices.len(), 8);
}
