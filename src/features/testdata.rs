use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::time::interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::denied_publish;
use super::subscribe_status;
use crate::channel_key;
use crate::stream::StreamManagerHandle;
use crate::stream::StreamMeta;
use crate::stream::StreamTask;
use crate::utils::time::now_ms;
use crate::ChannelHandler;
use crate::ChannelPublisher;
use crate::Principal;
use crate::PublishEvent;
use crate::PublishReply;
use crate::Result;
use crate::Status;
use crate::StreamSender;
use crate::SubscribeEvent;
use crate::SubscribeReply;

/// Shape of one synthetic random-walk stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorSpec {
    pub name: &'static str,
    pub interval: Duration,
    /// Probability a tick is skipped
    pub drop: f64,
    pub labeled: bool,
}

pub const GENERATORS: [GeneratorSpec; 4] = [
    GeneratorSpec {
        name: "random-2s-stream",
        interval: Duration::from_secs(2),
        drop: 0.0,
        labeled: false,
    },
    GeneratorSpec {
        name: "random-flakey-stream",
        interval: Duration::from_millis(100),
        drop: 0.75,
        labeled: false,
    },
    GeneratorSpec {
        name: "random-20Hz-stream",
        interval: Duration::from_millis(50),
        drop: 0.0,
        labeled: false,
    },
    GeneratorSpec {
        name: "random-labeled-stream",
        interval: Duration::from_secs(1),
        drop: 0.0,
        labeled: true,
    },
];

const LABELS: [&str; 3] = ["alpha", "beta", "gamma"];

pub fn find_generator(name: &str) -> Option<GeneratorSpec> {
    GENERATORS.iter().find(|g| g.name == name).copied()
}

#[derive(Debug, Serialize)]
struct Frame {
    time: u64,
    value: f64,
    min: f64,
    max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<&'static str>,
}

/// One synthetic stream at `grafana/testdata/{name}`
pub struct TestDataRunner {
    spec: GeneratorSpec,
    streams: StreamManagerHandle,
    publisher: Arc<dyn ChannelPublisher>,
}

impl TestDataRunner {
    pub fn new(
        spec: GeneratorSpec,
        streams: StreamManagerHandle,
        publisher: Arc<dyn ChannelPublisher>,
    ) -> Self {
        Self {
            spec,
            streams,
            publisher,
        }
    }

    pub fn spec(&self) -> GeneratorSpec {
        self.spec
    }
}

async fn random_walk(
    spec: GeneratorSpec,
    sender: StreamSender,
    token: CancellationToken,
) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let mut walker: f64 = rng.gen_range(0.0..100.0);
    let mut ticker = interval(spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        walker += rng.gen_range(-0.5..0.5);
        if spec.drop > 0.0 && rng.gen_bool(spec.drop) {
            continue;
        }
        let spread = rng.gen_range(0.0..1.0);
        let frame = Frame {
            time: now_ms(),
            value: walker,
            min: walker - spread,
            max: walker + spread,
            label: spec.labeled.then(|| LABELS[rng.gen_range(0..LABELS.len())]),
        };
        sender.send_json(&frame).await?;
    }
}

#[async_trait]
impl ChannelHandler for TestDataRunner {
    async fn on_subscribe(
        &self,
        principal: &Principal,
        event: SubscribeEvent,
    ) -> Result<(SubscribeReply, Status)> {
        if event.path != self.spec.name {
            return subscribe_status(Status::NotFound);
        }

        let spec = self.spec;
        let sender = StreamSender::new(self.publisher.clone(), principal.org_id, event.channel.as_str());
        let task = StreamTask::new(
            StreamMeta::new(principal.org_id, event.channel.as_str()),
            move |token| random_walk(spec, sender.clone(), token),
        );
        let outcome = self
            .streams
            .submit_stream(channel_key(principal.org_id, &event.channel), task)
            .await?;
        debug!(channel = %event.channel, ?outcome, "Test data stream submitted");

        Ok((SubscribeReply::with_presence(), Status::Ok))
    }

    async fn on_publish(
        &self,
        _principal: &Principal,
        _event: PublishEvent,
    ) -> Result<(PublishReply, Status)> {
        denied_publish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tokio::sync::watch;
    use tokio::time::sleep;

    use super::*;
    use crate::config::StreamConfig;
    use crate::stream::StreamManager;
    use crate::test_utils::viewer;
    use crate::test_utils::RecordingPublisher;
    use crate::test_utils::ScriptedOracle;

    const CHANNEL: &str = "grafana/testdata/random-2s-stream";

    fn setup() -> (TestDataRunner, Arc<RecordingPublisher>, StreamManagerHandle, watch::Sender<()>) {
        let (tx, rx) = watch::channel(());
        let (manager, streams) =
            StreamManager::new(StreamConfig::default(), ScriptedOracle::constant(1), rx);
        tokio::spawn(manager.run());
        let publisher = Arc::new(RecordingPublisher::default());
        let spec = find_generator("random-2s-stream").unwrap();
        let runner = TestDataRunner::new(spec, streams.clone(), publisher.clone());
        (runner, publisher, streams, tx)
    }

    #[test]
    fn only_known_generators_exist() {
        assert!(find_generator("random-20Hz-stream").is_some());
        assert!(find_generator("random-1s-stream").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn subscribe_runs_one_generator_per_channel() {
        let (runner, publisher, streams, _shutdown) = setup();
        let event = SubscribeEvent::new(CHANNEL, "random-2s-stream");

        let (reply, status) = runner.on_subscribe(&viewer(1), event.clone()).await.unwrap();
        runner.on_subscribe(&viewer(1), event).await.unwrap();
        sleep(Duration::from_millis(4100)).await;

        assert_eq!(status, Status::Ok);
        assert!(reply.presence);
        assert_eq!(streams.list_streams().await.unwrap().len(), 1);

        let frames = publisher.published_on(CHANNEL);
        assert_eq!(frames.len(), 3);
        let frame: Value = serde_json::from_slice(&frames[0]).unwrap();
        assert!(frame["value"].is_f64());
        assert!(frame.get("label").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn publish_is_denied() {
        let (runner, _, _, _shutdown) = setup();
        let (_, status) = runner
            .on_publish(&viewer(1), PublishEvent::new(CHANNEL, "random-2s-stream", "{}"))
            .await
            .unwrap();
        assert_eq!(status, Status::PermissionDenied);
    }
}
