use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entity::event::InquiryEvent;
use crate::infrastructure::metrics::Metrics;

/// InquiryEventPublisher は問い合わせイベントを通知基盤へ配信するためのトレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InquiryEventPublisher: Send + Sync {
    async fn publish(&self, event: &InquiryEvent) -> anyhow::Result<()>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// NoopInquiryEventPublisher は何もしないデフォルト実装。
pub struct NoopInquiryEventPublisher;

#[async_trait]
impl InquiryEventPublisher for NoopInquiryEventPublisher {
    async fn publish(&self, event: &InquiryEvent) -> anyhow::Result<()> {
        tracing::debug!(
            event_type = event.event_type(),
            "NoopInquiryEventPublisher: inquiry event discarded"
        );
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// KafkaInquiryProducer は rdkafka FutureProducer を使った Kafka プロデューサー。
/// キーは通知先ユーザー ID。
pub struct KafkaInquiryProducer {
    producer: rdkafka::producer::FutureProducer,
    topic: String,
    metrics: Option<Arc<Metrics>>,
}

impl KafkaInquiryProducer {
    pub fn new(brokers: &str, security_protocol: &str, topic: &str) -> anyhow::Result<Self> {
        use rdkafka::config::ClientConfig;

        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", brokers);
        client_config.set("security.protocol", security_protocol);
        client_config.set("acks", "all");
        client_config.set("message.timeout.ms", "5000");

        let producer: rdkafka::producer::FutureProducer = client_config.create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// メッセージのキーとペイロード。キーは通知先ユーザー ID、ペイロードは event_type タグ付きの JSON。
pub(crate) fn encode_event(event: &InquiryEvent) -> anyhow::Result<(String, Vec<u8>)> {
    let payload = serde_json::to_vec(event)?;
    Ok((event.partition_key().to_string(), payload))
}

#[async_trait]
impl InquiryEventPublisher for KafkaInquiryProducer {
    async fn publish(&self, event: &InquiryEvent) -> anyhow::Result<()> {
        use rdkafka::producer::FutureRecord;
        use std::time::Duration;

        let (key, payload) = encode_event(event)?;

        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(err, _)| {
                anyhow::anyhow!(
                    "failed to publish {} event: {}",
                    event.event_type(),
                    err
                )
            })?;

        if let Some(ref m) = self.metrics {
            m.record_kafka_message_produced(&self.topic);
        }

        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        use rdkafka::producer::Producer;
        self.producer.flush(std::time::Duration::from_secs(5))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::ledger::QuotaPool;
    use chrono::Utc;
    use uuid::Uuid;

    fn make_sent_event(recipient_id: Uuid) -> InquiryEvent {
        InquiryEvent::InquirySent {
            request_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            recipient_id,
            anonymous_recipient: true,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_encode_event_keys_by_recipient() {
        let recipient = Uuid::new_v4();
        let event = make_sent_event(recipient);

        let (key, payload) = encode_event(&event).unwrap();
        assert_eq!(key, recipient.to_string());

        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["event_type"], "INQUIRY_SENT");
        assert_eq!(json["anonymous_recipient"], true);
        let decoded: InquiryEvent = serde_json::from_slice(&payload).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_encode_quota_restored_keys_by_sender() {
        let sender = Uuid::new_v4();
        let event = InquiryEvent::QuotaRestored {
            request_id: Uuid::new_v4(),
            user_id: sender,
            pool: QuotaPool::PremiumProfile,
            occurred_at: Utc::now(),
        };

        let (key, payload) = encode_event(&event).unwrap();
        assert_eq!(key, sender.to_string());
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["event_type"], "QUOTA_RESTORED");
        assert_eq!(json["pool"], "premium_profile");
    }

    #[tokio::test]
    async fn test_producer_is_created_without_broker_connection() {
        let producer = KafkaInquiryProducer::new("127.0.0.1:1", "plaintext", "inquiry.events")
            .unwrap()
            .with_metrics(Arc::new(Metrics::new("inquiry-kafka-test").unwrap()));
        assert_eq!(producer.topic, "inquiry.events");
        assert!(producer.metrics.is_some());
        assert!(producer.close().await.is_ok());
    }

    #[test]
    fn test_invalid_security_protocol_is_rejected() {
        let result = KafkaInquiryProducer::new("127.0.0.1:1", "carrier_pigeon", "inquiry.events");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_noop_publisher() {
        let publisher = NoopInquiryEventPublisher;
        assert!(publisher
            .publish(&make_sent_event(Uuid::new_v4()))
            .await
            .is_ok());
        assert!(publisher.close().await.is_ok());
    }
}
