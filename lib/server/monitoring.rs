use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;
use tokio::sync::OnceCell;

#[derive(Clone)]
pub struct BotMetrics {
    /// Updates pushed onto the work queue.
    pub updates_received: Counter,
    /// Updates dropped by workers because they carry no photo.
    pub tasks_skipped: Counter,
    pub predictions_succeeded: Counter,
    pub predictions_failed: Counter,
    /// Replies the Bot API refused or that never reached it.
    pub replies_failed: Counter,
    pub fetch_failures: Counter,
    /// Items waiting in the work queue, sampled by the fetch loop and workers.
    pub queue_depth: Gauge,
    /// Latest update cursor.
    pub cursor: Gauge,
}

impl BotMetrics {
    fn init() -> Self {
        Self {
            updates_received: Counter::default(),
            tasks_skipped: Counter::default(),
            predictions_succeeded: Counter::default(),
            predictions_failed: Counter::default(),
            replies_failed: Counter::default(),
            fetch_failures: Counter::default(),
            queue_depth: Gauge::default(),
            cursor: Gauge::default(),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        let sub_registry = registry.sub_registry_with_prefix(prefix);

        sub_registry.register(
            "updates_received",
            "Total number of updates enqueued for workers",
            metrics.updates_received.clone(),
        );
        sub_registry.register(
            "tasks_skipped",
            "Total number of updates without a photo",
            metrics.tasks_skipped.clone(),
        );
        sub_registry.register(
            "predictions_succeeded",
            "Total number of photos classified",
            metrics.predictions_succeeded.clone(),
        );
        sub_registry.register(
            "predictions_failed",
            "Total number of photos that could not be downloaded or classified",
            metrics.predictions_failed.clone(),
        );
        sub_registry.register(
            "replies_failed",
            "Total number of replies that could not be delivered",
            metrics.replies_failed.clone(),
        );
        sub_registry.register(
            "fetch_failures",
            "Total number of failed update polls",
            metrics.fetch_failures.clone(),
        );
        sub_registry.register(
            "queue_depth",
            "Updates waiting in the work queue",
            metrics.queue_depth.clone(),
        );
        sub_registry.register("cursor", "Next update offset", metrics.cursor.clone());

        metrics
    }
}

#[derive(Clone)]
pub struct ApiMetrics {
    pub images_stored: Counter,
    pub prediction_requests: Counter,
    pub request_seconds: Histogram,
    pub storage_seconds: Histogram,
    pub classification_seconds: Histogram,
}

impl ApiMetrics {
    fn init() -> Self {
        Self {
            images_stored: Counter::default(),
            prediction_requests: Counter::default(),
            request_seconds: Histogram::new(exponential_buckets(0.005, 2.0, 12)),
            storage_seconds: Histogram::new(exponential_buckets(0.001, 2.0, 12)),
            classification_seconds: Histogram::new(exponential_buckets(0.005, 2.0, 12)),
        }
    }

    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::init();
        let sub_registry = registry.sub_registry_with_prefix(prefix);

        sub_registry.register(
            "images_stored",
            "Total number of uploaded images",
            metrics.images_stored.clone(),
        );
        sub_registry.register(
            "prediction_requests",
            "Total number of prediction requests",
            metrics.prediction_requests.clone(),
        );
        sub_registry.register(
            "request_seconds",
            "End-to-end prediction request latency",
            metrics.request_seconds.clone(),
        );
        sub_registry.register(
            "storage_seconds",
            "Object store read latency",
            metrics.storage_seconds.clone(),
        );
        sub_registry.register(
            "classification_seconds",
            "Classification latency",
            metrics.classification_seconds.clone(),
        );

        metrics
    }
}

pub static BOT_METRICS: OnceCell<BotMetrics> = OnceCell::const_new();
pub static API_METRICS: OnceCell<ApiMetrics> = OnceCell::const_new();
