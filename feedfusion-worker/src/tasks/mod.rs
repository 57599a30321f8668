pub mod consumer;
pub mod ml;
pub mod parser;
pub mod processor;
pub mod subs;

use crate::broker::{TaskBroker, TaskEnvelope};
use crate::config::WorkerConfig;
use crate::delivery::DeliveryQueue;
use crate::ml::{ArtifactStore, Classifier};
use crate::search::SearchIndex;
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use feedfusion_db::ConnectionPool;
use feedwire::FeedClient;
use log::warn;
use miette::Diagnostic;
use std::sync::Arc;
use std::time::Duration;

pub const PARSE_RSS: &str = "parse_rss";
pub const PROCESS_NEWS_ITEM: &str = "process_news_item";
pub const CHECK_SUBS: &str = "check_subs";
pub const CHECK_FOR_UNCATEGORIZED_NEWS: &str = "check_for_uncategorized_news";
pub const CATEGORIZE_UNCATEGORIZED_NEWS: &str = "categorize_uncategorized_news";
pub const RETRAIN_MODEL: &str = "retrain_model";
pub const UPLOAD_TRAINING_DATASET: &str = "upload_training_dataset";

pub type PooledPg = PooledConnection<ConnectionManager<PgConnection>>;

/// Everything a task handler may need. Shared clients are reference
/// counted; the pool hands out scoped connections.
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub pool: ConnectionPool,
    pub broker: Arc<TaskBroker>,
    pub delivery: Arc<DeliveryQueue>,
    pub feed_client: FeedClient,
    pub search: Option<Arc<dyn SearchIndex>>,
    pub classifier: Arc<dyn Classifier>,
    pub artifacts: ArtifactStore,
}

/// How a task run ended when it didn't succeed. `Retry` asks the broker to
/// re-publish the envelope after `delay` (within the retry budget); `Fatal`
/// drops the task with an error log.
#[derive(Debug)]
pub enum TaskError {
    Retry {
        delay: Duration,
        source: miette::Report,
    },
    Fatal(miette::Report),
}

impl TaskError {
    pub fn fatal(source: impl Diagnostic + Send + Sync + 'static) -> Self {
        Self::Fatal(miette::Report::new(source))
    }

    pub fn retry(delay: Duration, source: impl Diagnostic + Send + Sync + 'static) -> Self {
        Self::Retry {
            delay,
            source: miette::Report::new(source),
        }
    }
}

pub(crate) fn get_conn(ctx: &WorkerContext) -> Result<PooledPg, TaskError> {
    ctx.pool.get().map_err(|err| {
        TaskError::Fatal(miette::miette!(
            "couldn't check out a database connection: {err}"
        ))
    })
}

/// Ingest-writer style backoff: 60 × 2^attempt seconds.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(60 * 2u64.pow(attempt))
}

pub async fn dispatch(ctx: &WorkerContext, envelope: &TaskEnvelope) -> Result<(), TaskError> {
    match envelope.task.as_str() {
        PARSE_RSS => parser::parse_rss(ctx).await,
        PROCESS_NEWS_ITEM => processor::process_news(ctx, envelope).await,
        CHECK_SUBS => subs::check_subs(ctx).await,
        CHECK_FOR_UNCATEGORIZED_NEWS => ml::check_for_uncategorized_news(ctx).await,
        CATEGORIZE_UNCATEGORIZED_NEWS => ml::categorize_uncategorized_news(ctx, envelope).await,
        RETRAIN_MODEL => ml::retrain_model(ctx, envelope).await,
        UPLOAD_TRAINING_DATASET => ml::upload_training_dataset(ctx, envelope).await,
        other => {
            warn!("Ignoring unknown task {other}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay(0), Duration::from_secs(60));
        assert_eq!(backoff_delay(1), Duration::from_secs(120));
        assert_eq!(backoff_delay(2), Duration::from_secs(240));
        assert_eq!(backoff_delay(3), Duration::from_secs(480));
    }
}
