//! Built-in channel handlers of the `grafana` scope, plus the resource
//! watch bridge.

mod broadcast;
mod chat;
mod comment;
mod dashboard;
mod metrics_snapshot;
mod notice;
mod testdata;
mod watch;

pub use broadcast::*;
pub use chat::*;
pub use comment::*;
pub use dashboard::*;
pub use metrics_snapshot::*;
pub use notice::*;
pub use testdata::*;
pub use watch::*;


use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeReply;
use crate::ValidationError;

pub(crate) fn denied_publish() -> Result<(PublishReply, Status)> {
    Ok((PublishReply::default(), Status::PermissionDenied))
}

pub(crate) fn subscribe_status(status: Status) -> Result<(SubscribeReply, Status)> {
    Ok((SubscribeReply::default(), status))
}

pub(crate) fn parse_payload<T: DeserializeOwned>(data: &Bytes) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| ValidationError::InvalidPayload(e.to_string()).into())
}
