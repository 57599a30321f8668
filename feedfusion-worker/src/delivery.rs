use crate::broker::BrokerError;
use feedfusion_db::models::DbNews;
use lapin::options::{BasicPublishOptions, BasicQosOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, Consumer};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEAD_SUFFIX: &str = ".dead";
pub const HEADER_RETRIES: &str = "x-retries";
pub const HEADER_ERROR_REASON: &str = "x-error-reason";

/// Bounded per-message retry budget; the visit after the last retry ends in
/// the dead-letter queue.
pub const MAX_PROCESSING_RETRIES: u32 = 5;

/// Outbound fan-out message: one news item addressed to one subscriber.
/// The news snapshot rides along in full so the consumer never needs the
/// store.
#[derive(Debug, Serialize)]
pub struct OutboundDelivery<'a> {
    pub subscription_id: i32,
    pub telegram_id: &'a str,
    pub channel_id: i32,
    pub news: &'a DbNews,
}

/// The consumer-side view of the same message. Timestamps stay raw strings
/// here; the consumer re-parses them tolerantly.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingDelivery {
    pub subscription_id: i64,
    pub telegram_id: String,
    pub channel_id: i64,
    pub news: NewsSnapshot,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewsSnapshot {
    pub id: i64,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub source: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
}

pub struct DeliveryQueue {
    connection: Arc<Connection>,
    publish_channel: Channel,
    queue: String,
}

impl DeliveryQueue {
    /// Declares the primary queue and its dead-letter sibling, both durable.
    pub async fn declare(connection: Arc<Connection>, queue: &str) -> Result<Self, BrokerError> {
        let publish_channel = connection
            .create_channel()
            .await
            .map_err(BrokerError::Unavailable)?;

        let options = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        publish_channel
            .queue_declare(queue, options, FieldTable::default())
            .await
            .map_err(BrokerError::Unavailable)?;
        publish_channel
            .queue_declare(
                &format!("{queue}{DEAD_SUFFIX}"),
                options,
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::Unavailable)?;

        Ok(Self {
            connection,
            publish_channel,
            queue: queue.to_string(),
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn dead_queue_name(&self) -> String {
        format!("{}{DEAD_SUFFIX}", self.queue)
    }

    pub async fn publish(&self, message: &OutboundDelivery<'_>) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(message).map_err(BrokerError::Serialize)?;
        self.publish_raw(&self.queue, &body, FieldTable::default())
            .await
    }

    /// Re-publish with explicit headers; used for both the in-band retry
    /// loop and dead-lettering.
    pub async fn publish_raw(
        &self,
        queue: &str,
        body: &[u8],
        headers: FieldTable,
    ) -> Result<(), BrokerError> {
        self.publish_channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into())
                    .with_headers(headers),
            )
            .await
            .map_err(BrokerError::Unavailable)?
            .await
            .map_err(BrokerError::Unavailable)?;

        Ok(())
    }

    pub async fn consumer(&self, tag: &str) -> Result<Consumer, BrokerError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(BrokerError::Unavailable)?;

        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(BrokerError::Unavailable)?;

        channel
            .basic_consume(
                &self.queue,
                tag,
                lapin::options::BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::Unavailable)
    }
}

/// Reads `x-retries` back out of a delivery's headers, defaulting to zero
/// for messages that have never failed.
pub fn retries_from_properties(properties: &BasicProperties) -> u32 {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| headers.inner().get(HEADER_RETRIES))
        .and_then(amqp_value_as_u32)
        .unwrap_or(0)
}

fn amqp_value_as_u32(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        _ => None,
    }
}

pub fn retry_headers(retries: u32, error_reason: &str) -> FieldTable {
    let mut headers = FieldTable::default();
    headers.insert(
        HEADER_RETRIES.into(),
        AMQPValue::LongInt(retries as i32),
    );
    headers.insert(
        HEADER_ERROR_REASON.into(),
        AMQPValue::LongString(error_reason.into()),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_default_to_zero() {
        assert_eq!(retries_from_properties(&BasicProperties::default()), 0);
    }

    #[test]
    fn retry_headers_round_trip() {
        let headers = retry_headers(3, "telegram_send_failed");
        let properties = BasicProperties::default().with_headers(headers);
        assert_eq!(retries_from_properties(&properties), 3);

        let reason = properties
            .headers()
            .as_ref()
            .unwrap()
            .inner()
            .get(HEADER_ERROR_REASON)
            .cloned();
        assert_eq!(
            reason,
            Some(AMQPValue::LongString("telegram_send_failed".into()))
        );
    }

    #[test]
    fn outbound_message_shape() {
        use chrono::NaiveDate;

        let news = DbNews {
            id: 7,
            channel_id: 2,
            link: "https://example.com/a".to_string(),
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            source: "Example Wire".to_string(),
            image: None,
            published: NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            content_hash: "abc".to_string(),
            category: None,
            created_at: NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            updated_at: NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        };

        let message = OutboundDelivery {
            subscription_id: 1,
            telegram_id: "12345",
            channel_id: 2,
            news: &news,
        };
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["subscription_id"], 1);
        assert_eq!(value["telegram_id"], "12345");
        assert_eq!(value["channel_id"], 2);
        assert_eq!(value["news"]["id"], 7);
        // chrono's serde emits ISO-8601 for naive timestamps
        assert_eq!(value["news"]["published"], "2026-03-01T12:00:00");

        // and the consumer-side type can read the publisher's output back
        let incoming: IncomingDelivery = serde_json::from_value(value).unwrap();
        assert_eq!(incoming.news.id, 7);
        assert_eq!(
            incoming.news.published.as_deref(),
            Some("2026-03-01T12:00:00")
        );
    }
}
