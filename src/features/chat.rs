use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use super::parse_payload;
use crate::utils::time::now_ms;
use crate::ChannelHandler;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::SubscribeEvent;
use crate::SubscribeReply;
use crate::ValidationError;

#[derive(Debug, Deserialize)]
struct ChatInput {
    text: String,
}

/// Message as delivered to chat subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub from: String,
    pub user_id: i64,
    pub text: String,
    pub ts: u64,
}

/// Chat rooms: presence with join/leave, publishes stamped with the author
#[derive(Debug, Default, Clone, Copy)]
pub struct ChatRunner;

#[async_trait]
impl ChannelHandler for ChatRunner {
    async fn on_subscribe(
        &self,
        _principal: &Principal,
        _event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        Ok((SubscribeReply::with_presence_and_join_leave(), Status::Ok))
    }

    async fn on_publish(
        &self,
        principal: &Principal,
        event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        let input: ChatInput = parse_payload(&event.data)?;
        if input.text.trim().is_empty() {
            return Err(ValidationError::InvalidPayload("empty chat message".into()).into());
        }

        let message = ChatMessage {
            from: principal.login.clone(),
            user_id: principal.user_id,
            text: input.text,
            ts: now_ms(),
        };
        Ok((
            PublishReply::broadcast(Bytes::from(serde_json::to_vec(&message)?)),
            Status::Ok,
        ))
    }
}
