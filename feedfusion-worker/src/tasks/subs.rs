use crate::delivery::OutboundDelivery;
use crate::tasks::{TaskError, WorkerContext, get_conn};
use feedfusion_db::db;
use log::{debug, info, warn};

/// The fan-out planner: walk every subscription, publish the unseen news
/// per subscription in ascending id order, then advance the watermark.
/// The watermark moves only after the whole batch is handed to the queue,
/// so a crash mid-publish re-publishes a prefix rather than skipping news.
pub async fn check_subs(ctx: &WorkerContext) -> Result<(), TaskError> {
    let mut conn = get_conn(ctx)?;

    info!("Started checking subscriptions...");
    let subs = db::subscriptions::all_with_user(&mut conn).map_err(TaskError::fatal)?;

    let mut total_published = 0usize;

    for sub in subs {
        let subscription = &sub.subscription;

        let Some(telegram_id) = sub.telegram_id.as_deref() else {
            debug!(
                "Subscription id={} has no telegram_id yet, skipping",
                subscription.id
            );
            continue;
        };

        let news_to_send = match db::news::after_id(
            &mut conn,
            subscription.channel_id,
            subscription.last_news_id,
        ) {
            Ok(news) => news,
            Err(err) => {
                // Losing one subscription's batch must not abort the walk.
                warn!(
                    "Failed to load news for subscription id={}: {err}",
                    subscription.id
                );
                continue;
            }
        };

        info!(
            "Got {} recent news for subscription id={} (user={}, channel={})",
            news_to_send.len(),
            subscription.id,
            telegram_id,
            subscription.channel_id,
        );

        if news_to_send.is_empty() {
            continue;
        }

        // after_id returns ascending ids, so the last one is the watermark
        // candidate and per-subscription enqueue order is oldest first.
        let max_news_id = news_to_send[news_to_send.len() - 1].id;

        let mut all_handed_over = true;
        let mut published = 0usize;
        for news_item in &news_to_send {
            let message = OutboundDelivery {
                subscription_id: subscription.id,
                telegram_id,
                channel_id: subscription.channel_id,
                news: news_item,
            };

            if let Err(err) = ctx.delivery.publish(&message).await {
                warn!(
                    "Failed to publish news id={} for subscription id={}: {err}",
                    news_item.id, subscription.id
                );
                all_handed_over = false;
                break;
            }
            published += 1;
        }

        if !all_handed_over {
            // Watermark untouched; the next tick re-publishes this batch.
            continue;
        }

        match db::subscriptions::advance_watermark(&mut conn, subscription.id, max_news_id) {
            Ok(advanced) => {
                if !advanced {
                    debug!(
                        "Watermark for subscription id={} already at or past {max_news_id}",
                        subscription.id
                    );
                }
                total_published += published;
                info!(
                    "Published {published} news to queue for subscription id={}",
                    subscription.id
                );
            }
            Err(err) => warn!(
                "Failed to advance watermark for subscription id={}: {err}",
                subscription.id
            ),
        }
    }

    info!("Finished checking subscriptions. Total published: {total_published}");
    Ok(())
}
