use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use warp::Filter;
use warp::Rejection;
use warp::Reply;


lazy_static! {
    pub static ref ACTIVE_STREAMS: IntGauge =
        IntGauge::new("live_active_streams", "Registered background streams")
            .expect("metric can not be created");

    pub static ref STREAM_RESTARTS: IntCounterVec = IntCounterVec::new(
        Opts::new("live_stream_restarts", "Stream body restarts by reason"),
        &["reason"]
    )
    .expect("metric can not be created");

    pub static ref SUBMIT_TIMEOUTS: IntCounter =
        IntCounter::new("live_submit_timeouts", "Stream submissions that timed out")
            .expect("metric can not be created");

    pub static ref SUBSCRIBE_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("live_subscribe_requests", "Subscribe requests by scope and status"),
        &["scope", "status"]
    )
    .expect("metric can not be created");

    pub static ref PUBLISH_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("live_publish_requests", "Publish requests by scope and status"),
        &["scope", "status"]
    )
    .expect("metric can not be created");

    pub static ref LEADER_FORWARDS: IntCounterVec = IntCounterVec::new(
        Opts::new("live_leader_forwards", "Subscribes forwarded to a leader node"),
        &["result"]
    )
    .expect("metric can not be created");

    pub static ref ACTIVE_WATCHES: IntGauge =
        IntGauge::new("live_active_watches", "Open resource watches")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_STREAMS.clone()),
        Box::new(STREAM_RESTARTS.clone()),
        Box::new(SUBMIT_TIMEOUTS.clone()),
        Box::new(SUBSCRIBE_REQUESTS.clone()),
        Box::new(PUBLISH_REQUESTS.clone()),
        Box::new(LEADER_FORWARDS.clone()),
        Box::new(ACTIVE_WATCHES.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            error!("collector can not be registered: {}", e);
        }
    }
}

/// Serve `/metrics` until `shutdown_signal` fires
pub async fn start_server(
    port: u16,
    mut shutdown_signal: watch::Receiver<()>,
) {
    REGISTER.call_once(|| register_custom_metrics(&REGISTRY));

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    info!("Metrics server listening on {}", addr);
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    Ok(gather_metrics(&REGISTRY))
}

/// Text exposition of `registry` followed by the default registry
pub fn gather_metrics(registry: &Registry) -> String {
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    }
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("could not encode prometheus metrics: {}", e);
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("metrics could not be from_utf8'd: {}", e);
        String::default()
    })
}
