//! Prometheus metrics

use crate::config::MonitoringConfig;
use parking_lot::Mutex;
use portknock_tracker::{StateTracker, StatsSnapshot};
use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::{Arc, LazyLock};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Global metrics registry
static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Global metrics instance
static METRICS: LazyLock<Metrics> = LazyLock::new(Metrics::new);

/// Metrics struct
pub struct Metrics {
    // Counters
    pub knocks: IntCounter,
    pub mismatches: IntCounter,
    pub steps_completed: IntCounter,
    pub sequences_completed: IntCounter,
    pub swept: IntCounter,

    // Gauges
    pub resident_states: IntGauge,

    // Serializes read-then-increment in `update`
    sync: Mutex<()>,
}

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::with_opts(Opts::new(name, help)).unwrap();
    REGISTRY.register(Box::new(counter.clone())).ok();
    counter
}

/// Raise a counter to `value`; counters never go down.
/// Callers must not run this concurrently for the same counter.
fn sync_counter(counter: &IntCounter, value: u64) {
    let current = counter.get();
    if value > current {
        counter.inc_by(value - current);
    }
}

impl Metrics {
    pub fn new() -> Self {
        let resident_states = IntGauge::with_opts(Opts::new(
            "portknock_resident_states",
            "Addresses with a knock sequence in progress",
        ))
        .unwrap();
        REGISTRY.register(Box::new(resident_states.clone())).ok();

        Self {
            knocks: counter("portknock_knocks_total", "Total knocks observed"),
            mismatches: counter(
                "portknock_mismatches_total",
                "Knocks on the wrong port that reset progress",
            ),
            steps_completed: counter(
                "portknock_steps_completed_total",
                "Sequence steps completed",
            ),
            sequences_completed: counter(
                "portknock_sequences_completed_total",
                "Knock sequences completed",
            ),
            swept: counter(
                "portknock_swept_total",
                "Expired knock states removed by the sweeper",
            ),
            resident_states,
            sync: Mutex::new(()),
        }
    }

    /// Copy tracker counters into the registry
    pub fn update(&self, stats: StatsSnapshot, resident: usize) {
        let _guard = self.sync.lock();
        sync_counter(&self.knocks, stats.knocks);
        sync_counter(&self.mismatches, stats.mismatches);
        sync_counter(&self.steps_completed, stats.steps_completed);
        sync_counter(&self.sequences_completed, stats.sequences_completed);
        sync_counter(&self.swept, stats.swept);
        self.resident_states.set(resident as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the registry in the Prometheus text format
fn render(tracker: &StateTracker) -> Vec<u8> {
    use prometheus::Encoder;

    METRICS.update(tracker.stats().snapshot(), tracker.len());

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    buffer
}

/// Start the metrics server
pub fn start_server(config: &MonitoringConfig, tracker: Arc<StateTracker>) -> JoinHandle<()> {
    let bind = config.prometheus_bind;
    let enabled = config.prometheus_enabled;

    tokio::spawn(async move {
        if !enabled {
            info!("Prometheus metrics disabled");
            return;
        }

        use bytes::Bytes;
        use http_body_util::Full;
        use hyper::{Response, server::conn::http1, service::service_fn};
        use hyper_util::rt::TokioIo;

        let listener = match tokio::net::TcpListener::bind(bind).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind metrics server: {}", e);
                return;
            }
        };

        info!("Prometheus metrics server listening on {}", bind);

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(r) => r,
                Err(e) => {
                    error!("Metrics accept error: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let tracker = tracker.clone();

            tokio::spawn(async move {
                let service = service_fn(move |_req| {
                    let body = render(&tracker);
                    async move {
                        Ok::<_, std::convert::Infallible>(
                            Response::builder()
                                .header("Content-Type", "text/plain; version=0.0.4")
                                .body(Full::new(Bytes::from(body)))
                                .unwrap(),
                        )
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Metrics connection error: {}", e);
                }
            });
        }
    })
}
