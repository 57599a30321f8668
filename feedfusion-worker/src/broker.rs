use crate::tasks::{self, TaskError, WorkerContext};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection};
use log::{error, info, warn};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const TASK_QUEUE: &str = "feedfusion.tasks";

/// Retry budget for tasks that report a transient failure. Past it the task
/// is dropped with an error log.
pub const TASK_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error, Diagnostic)]
pub enum BrokerError {
    #[error("work broker is unreachable")]
    Unavailable(#[source] lapin::Error),

    #[error("error serializing task payload")]
    Serialize(#[source] serde_json::Error),
}

/// The wire form of one task submission. `retries` counts how many times
/// this task has already failed and been re-published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub retries: u32,
}

pub struct TaskBroker {
    connection: Arc<Connection>,
    publish_channel: Channel,
}

impl TaskBroker {
    pub async fn declare(connection: Arc<Connection>) -> Result<Self, BrokerError> {
        let publish_channel = connection
            .create_channel()
            .await
            .map_err(BrokerError::Unavailable)?;

        publish_channel
            .queue_declare(
                TASK_QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(BrokerError::Unavailable)?;

        Ok(Self {
            connection,
            publish_channel,
        })
    }

    /// Best-effort submit. The caller's database transaction must already be
    /// committed; if this fails afterwards the caller compensates in-band.
    pub async fn enqueue(
        &self,
        task: &str,
        payload: serde_json::Value,
    ) -> Result<(), BrokerError> {
        self.publish(TaskEnvelope {
            task: task.to_string(),
            payload,
            retries: 0,
        })
        .await
    }

    pub async fn publish(&self, envelope: TaskEnvelope) -> Result<(), BrokerError> {
        let body = serde_json::to_vec(&envelope).map_err(BrokerError::Serialize)?;

        self.publish_channel
            .basic_publish(
                "",
                TASK_QUEUE,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(BrokerError::Unavailable)?
            .await
            .map_err(BrokerError::Unavailable)?;

        Ok(())
    }

    async fn consume_channel(&self) -> Result<Channel, BrokerError> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(BrokerError::Unavailable)?;

        // One task at a time per worker; acknowledgement is late, so a lost
        // worker's task is redelivered.
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(BrokerError::Unavailable)?;

        Ok(channel)
    }
}

pub async fn run_worker(
    broker: Arc<TaskBroker>,
    ctx: Arc<WorkerContext>,
    cancel: CancellationToken,
) -> Result<(), BrokerError> {
    let channel = broker.consume_channel().await?;
    let mut consumer = channel
        .basic_consume(
            TASK_QUEUE,
            "feedfusion-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(BrokerError::Unavailable)?;

    info!("Task worker started, consuming {TASK_QUEUE}");

    loop {
        let delivery = tokio::select! {
            _ = cancel.cancelled() => break,
            delivery = consumer.next() => delivery,
        };

        let Some(delivery) = delivery else {
            warn!("Task consumer stream ended");
            break;
        };

        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                error!("Error receiving task delivery: {err}");
                continue;
            }
        };

        let envelope: TaskEnvelope = match serde_json::from_slice(&delivery.data) {
            Ok(envelope) => envelope,
            Err(err) => {
                // A task body we can't even decode will never succeed.
                error!("Dropping undecodable task message: {err}");
                delivery
                    .ack(BasicAckOptions::default())
                    .await
                    .map_err(BrokerError::Unavailable)?;
                continue;
            }
        };

        info!(
            "Processing task {} (attempt {})",
            envelope.task,
            envelope.retries + 1
        );

        match tasks::dispatch(&ctx, &envelope).await {
            Ok(()) => {}
            Err(TaskError::Retry { delay, source }) if envelope.retries < TASK_MAX_RETRIES => {
                warn!(
                    "Task {} failed, retrying in {}s: {source:?}",
                    envelope.task,
                    delay.as_secs()
                );
                // The re-published copy must be on the queue before the
                // original is acked; a crash during the wait then redelivers
                // the original instead of losing the task. A failed publish
                // propagates, leaving the original un-acked for redelivery.
                tokio::time::sleep(delay).await;
                broker
                    .publish(TaskEnvelope {
                        retries: envelope.retries + 1,
                        ..envelope
                    })
                    .await?;
            }
            Err(TaskError::Retry { source, .. }) => {
                error!(
                    "Task {} exhausted its retry budget, dropping: {source:?}",
                    envelope.task
                );
            }
            Err(TaskError::Fatal(report)) => {
                error!("Task {} failed fatally: {report:?}", envelope.task);
            }
        }

        // Reached with the work done, the retry copy already re-published,
        // or the task dropped as fatal/over-budget; in all three cases the
        // original must not wedge the queue.
        delivery
            .ack(BasicAckOptions::default())
            .await
            .map_err(BrokerError::Unavailable)?;
    }

    info!("Task worker stopped");
    Ok(())
}
