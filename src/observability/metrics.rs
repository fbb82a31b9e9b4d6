use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub commits_total: IntCounterVec,
    pub commit_latency_seconds: HistogramVec,
    pub notification_deliveries_total: IntCounterVec,
    pub driver_responses_total: IntCounterVec,
    pub tracking_samples_total: IntCounter,
    pub broadcast_fill_ratio: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let commits_total = IntCounterVec::new(
            Opts::new("commits_total", "Capacity commitments by outcome"),
            &["outcome"],
        )
        .expect("valid commits_total metric");

        let commit_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "commit_latency_seconds",
                "Latency of assignment commits in seconds",
            ),
            &["outcome"],
        )
        .expect("valid commit_latency_seconds metric");

        let notification_deliveries_total = IntCounterVec::new(
            Opts::new(
                "notification_deliveries_total",
                "Delivery attempts by channel and outcome",
            ),
            &["channel", "outcome"],
        )
        .expect("valid notification_deliveries_total metric");

        let driver_responses_total = IntCounterVec::new(
            Opts::new("driver_responses_total", "Driver responses by kind"),
            &["kind"],
        )
        .expect("valid driver_responses_total metric");

        let tracking_samples_total = IntCounter::new(
            "tracking_samples_total",
            "Location samples ingested across all trips",
        )
        .expect("valid tracking_samples_total metric");

        let broadcast_fill_ratio = GaugeVec::new(
            Opts::new("broadcast_fill_ratio", "Fill ratio per broadcast [0..1]"),
            &["broadcast_id"],
        )
        .expect("valid broadcast_fill_ratio metric");

        registry
            .register(Box::new(commits_total.clone()))
            .expect("register commits_total");
        registry
            .register(Box::new(commit_latency_seconds.clone()))
            .expect("register commit_latency_seconds");
        registry
            .register(Box::new(notification_deliveries_total.clone()))
            .expect("register notification_deliveries_total");
        registry
            .register(Box::new(driver_responses_total.clone()))
            .expect("register driver_responses_total");
        registry
            .register(Box::new(tracking_samples_total.clone()))
            .expect("register tracking_samples_total");
        registry
            .register(Box::new(broadcast_fill_ratio.clone()))
            .expect("register broadcast_fill_ratio");

        Self {
            registry,
            commits_total,
            commit_latency_seconds,
            notification_deliveries_total,
            driver_responses_total,
            tracking_samples_total,
            broadcast_fill_ratio,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
