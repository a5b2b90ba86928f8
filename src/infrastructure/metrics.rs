use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics は問い合わせエンジンの Prometheus メトリクス。
pub struct Metrics {
    inquiries_opened_total: IntCounterVec,
    inquiries_rejected_total: IntCounterVec,
    inquiry_transitions_total: IntCounterVec,
    quota_restored_total: IntCounterVec,
    kafka_messages_produced_total: IntCounterVec,
    cache_hits_total: IntCounterVec,
    cache_misses_total: IntCounterVec,
    registry: Registry,
}

fn counter(
    service_name: &str,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    IntCounterVec::new(Opts::new(name, help).const_label("service", service_name), labels)
}

impl Metrics {
    pub fn new(service_name: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let inquiries_opened_total = counter(
            service_name,
            "inquiries_opened_total",
            "Total number of inquiry open attempts by outcome",
            &["outcome"],
        )?;
        let inquiries_rejected_total = counter(
            service_name,
            "inquiry_open_rejections_total",
            "Total number of inquiry open attempts rejected by error code",
            &["code"],
        )?;
        let inquiry_transitions_total = counter(
            service_name,
            "inquiry_transitions_total",
            "Total number of inquiry status transitions",
            &["to"],
        )?;
        let quota_restored_total = counter(
            service_name,
            "inquiry_quota_restored_total",
            "Total number of quota units restored by maintenance jobs",
            &["pool"],
        )?;
        let kafka_messages_produced_total = counter(
            service_name,
            "kafka_messages_produced_total",
            "Total number of Kafka messages produced",
            &["topic"],
        )?;
        let cache_hits_total = counter(
            service_name,
            "cache_hits_total",
            "Total number of cache hits",
            &["cache_name"],
        )?;
        let cache_misses_total = counter(
            service_name,
            "cache_misses_total",
            "Total number of cache misses",
            &["cache_name"],
        )?;

        for c in [
            &inquiries_opened_total,
            &inquiries_rejected_total,
            &inquiry_transitions_total,
            &quota_restored_total,
            &kafka_messages_produced_total,
            &cache_hits_total,
            &cache_misses_total,
        ] {
            registry.register(Box::new(c.clone()))?;
        }

        Ok(Self {
            inquiries_opened_total,
            inquiries_rejected_total,
            inquiry_transitions_total,
            quota_restored_total,
            kafka_messages_produced_total,
            cache_hits_total,
            cache_misses_total,
            registry,
        })
    }

    /// outcome は "created" または "matched"。
    pub fn record_inquiry_opened(&self, outcome: &str) {
        self.inquiries_opened_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_open_rejected(&self, code: &str) {
        self.inquiries_rejected_total.with_label_values(&[code]).inc();
    }

    pub fn record_transition(&self, to: &str) {
        self.inquiry_transitions_total.with_label_values(&[to]).inc();
    }

    pub fn record_quota_restored(&self, pool: &str) {
        self.quota_restored_total.with_label_values(&[pool]).inc();
    }

    pub fn record_kafka_message_produced(&self, topic: &str) {
        self.kafka_messages_produced_total
            .with_label_values(&[topic])
            .inc();
    }

    pub fn record_cache_hit(&self, cache_name: &str) {
        self.cache_hits_total.with_label_values(&[cache_name]).inc();
    }

    pub fn record_cache_miss(&self, cache_name: &str) {
        self.cache_misses_total.with_label_values(&[cache_name]).inc();
    }

    /// gather_metrics は Prometheus テキストフォーマットでメトリクスを返す。
    pub fn gather_metrics(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_contains_recorded_counters() {
        let metrics = Metrics::new("inquiry-test").unwrap();
        metrics.record_inquiry_opened("created");
        metrics.record_open_rejected("QUOTA_EXCEEDED");
        metrics.record_cache_hit("inquiry_plans");

        let text = metrics.gather_metrics();
        assert!(text.contains("inquiries_opened_total"));
        assert!(text.contains("outcome=\"created\""));
        assert!(text.contains("code=\"QUOTA_EXCEEDED\""));
        assert!(text.contains("service=\"inquiry-test\""));
    }
}
