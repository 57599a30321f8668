use crate::broker::BrokerError;
use crate::config::WorkerConfig;
use crate::delivery::{
    DeliveryQueue, IncomingDelivery, MAX_PROCESSING_RETRIES, retries_from_properties,
    retry_headers,
};
use crate::telegram::ChatTransport;
use crate::text::format_message;
use chrono::Utc;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::BasicAckOptions;
use log::{error, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where a failed message goes next. Retries are explicit re-publishes so
/// the count stays visible and bounded; there is no NACK-with-requeue.
#[derive(Debug, PartialEq, Eq)]
enum FailureRoute {
    /// Re-publish to the primary queue with the bumped counter.
    Requeue { next_retries: u32 },
    /// Budget exhausted: publish to the dead-letter queue as-is.
    DeadLetter { retries: u32 },
}

fn route_failure(retries: u32) -> FailureRoute {
    if retries < MAX_PROCESSING_RETRIES {
        FailureRoute::Requeue {
            next_retries: retries + 1,
        }
    } else {
        FailureRoute::DeadLetter { retries }
    }
}

pub async fn run_delivery_consumer(
    queue: Arc<DeliveryQueue>,
    transport: Arc<dyn ChatTransport>,
    config: WorkerConfig,
    cancel: CancellationToken,
) -> Result<(), BrokerError> {
    let mut consumer = queue.consumer("feedfusion-telegram").await?;

    info!("Delivery consumer started. Waiting for messages...");

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = consumer.next() => delivery,
        };

        let Some(delivery) = delivery else {
            warn!("Delivery consumer stream ended");
            break;
        };

        match delivery {
            Ok(delivery) => {
                handle_delivery(&queue, transport.as_ref(), &config, delivery).await?
            }
            Err(err) => error!("Error receiving delivery message: {err}"),
        }
    }

    info!("Delivery consumer stopped");
    Ok(())
}

async fn handle_delivery(
    queue: &DeliveryQueue,
    transport: &dyn ChatTransport,
    config: &WorkerConfig,
    delivery: Delivery,
) -> Result<(), BrokerError> {
    let retries = retries_from_properties(&delivery.properties);

    let message: IncomingDelivery = match serde_json::from_slice(&delivery.data) {
        Ok(message) => message,
        Err(err) => {
            // A body that doesn't decode will never decode; straight to the
            // dead-letter queue.
            error!("Failed to parse message JSON: {err}");
            queue
                .publish_raw(
                    &queue.dead_queue_name(),
                    &delivery.data,
                    retry_headers(retries, "invalid_json"),
                )
                .await?;
            return delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(BrokerError::Unavailable);
        }
    };

    info!(
        "Processing message: subscription_id={}, news_id={}, telegram_id={}",
        message.subscription_id, message.news.id, message.telegram_id,
    );

    // The snapshot crossed the wire as JSON; re-parse the timestamp with the
    // same tolerant matcher the poller uses, falling back to now.
    let published = message
        .news
        .published
        .as_deref()
        .and_then(feedwire::parse_published)
        .map(|dt| dt.naive_utc())
        .unwrap_or_else(|| Utc::now().naive_utc());

    let html = format_message(
        &message.news.title,
        published,
        &message.news.summary,
        &message.news.link,
        &message.news.source,
        &config.empty_text,
        config.timezone_offset_hours,
    );

    let send = async {
        match message.news.image.as_deref() {
            Some(image) => {
                transport
                    .send_photo(&message.telegram_id, image, &html)
                    .await
            }
            None => transport.send_text(&message.telegram_id, &html).await,
        }
    };

    let failure_reason = match tokio::time::timeout(config.telegram_send_timeout(), send).await {
        Ok(Ok(())) => None,
        Ok(Err(err)) => {
            error!(
                "Failed to send news_id={} to chat={}: {err}",
                message.news.id, message.telegram_id,
            );
            Some("telegram_send_failed")
        }
        Err(_) => {
            error!(
                "Timed out sending news_id={} to chat={}",
                message.news.id, message.telegram_id,
            );
            Some("telegram_send_timeout")
        }
    };

    match failure_reason {
        None => {
            delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(BrokerError::Unavailable)?;
            info!(
                "Message ACKed: news_id={}, subscription_id={}",
                message.news.id, message.subscription_id,
            );

            // Rate-limit hygiene toward the chat API.
            let jitter = rand::thread_rng().gen_range(0.5..1.5);
            tokio::time::sleep(Duration::from_secs_f64(jitter)).await;
        }
        Some(reason) => {
            match route_failure(retries) {
                FailureRoute::Requeue { next_retries } => {
                    queue
                        .publish_raw(
                            queue.queue_name(),
                            &delivery.data,
                            retry_headers(next_retries, reason),
                        )
                        .await?;
                    warn!(
                        "Message re-queued (retry {next_retries}/{MAX_PROCESSING_RETRIES}): news_id={}",
                        message.news.id,
                    );
                }
                FailureRoute::DeadLetter { retries } => {
                    queue
                        .publish_raw(
                            &queue.dead_queue_name(),
                            &delivery.data,
                            retry_headers(retries, reason),
                        )
                        .await?;
                    warn!(
                        "Message dead-lettered after {retries} retries: news_id={}",
                        message.news.id,
                    );
                }
            }
            delivery
                .ack(BasicAckOptions::default())
                .await
                .map_err(BrokerError::Unavailable)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_messages_requeue_until_the_budget_is_spent() {
        // First failure: header was absent, so retries == 0.
        assert_eq!(route_failure(0), FailureRoute::Requeue { next_retries: 1 });
        assert_eq!(route_failure(4), FailureRoute::Requeue { next_retries: 5 });

        // The visit carrying x-retries=5 is the sixth; it dead-letters with
        // the counter unchanged.
        assert_eq!(route_failure(5), FailureRoute::DeadLetter { retries: 5 });
        assert_eq!(route_failure(9), FailureRoute::DeadLetter { retries: 9 });
    }

    #[test]
    fn primary_queue_visits_are_bounded() {
        // Walk the state machine from a fresh message: the number of visits
        // to the primary queue before dead-lettering is MAX + 1.
        let mut visits = 1u32;
        let mut retries = 0u32;
        loop {
            match route_failure(retries) {
                FailureRoute::Requeue { next_retries } => {
                    visits += 1;
                    retries = next_retries;
                }
                FailureRoute::DeadLetter { retries: final_retries } => {
                    assert_eq!(final_retries, MAX_PROCESSING_RETRIES);
                    break;
                }
            }
        }
        assert_eq!(visits, MAX_PROCESSING_RETRIES + 1);
    }
}
