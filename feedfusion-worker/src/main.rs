use feedfusion_worker::broker::{self, TaskBroker};
use feedfusion_worker::config::WorkerConfig;
use feedfusion_worker::delivery::DeliveryQueue;
use feedfusion_worker::ml::{ArtifactStore, HttpClassifier};
use feedfusion_worker::scheduler;
use feedfusion_worker::search::{ElasticSearchIndex, SearchIndex};
use feedfusion_worker::tasks::{self, WorkerContext};
use feedfusion_worker::telegram::{ChatTransport, TelegramClient};
use feedwire::FeedClient;
use lapin::ConnectionProperties;
use log::info;
use miette::IntoDiagnostic;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> miette::Result<()> {
    env_logger::init();

    let config = WorkerConfig::config().into_diagnostic()?;

    feedfusion_db::migrations::run_migrations().into_diagnostic()?;

    let pool = feedfusion_db::get_pool(config.db_pool_size).into_diagnostic()?;
    info!("Connected to database");

    let amqp = Arc::new(
        lapin::Connection::connect(&config.amqp_url, ConnectionProperties::default())
            .await
            .into_diagnostic()?,
    );
    let broker = Arc::new(TaskBroker::declare(amqp.clone()).await.into_diagnostic()?);
    let delivery_queue = Arc::new(
        DeliveryQueue::declare(amqp.clone(), &config.telegram_news_queue)
            .await
            .into_diagnostic()?,
    );
    info!("Connected to broker, queues declared");

    let feed_client = FeedClient::new(config.feed_timeout()).into_diagnostic()?;

    let search: Option<Arc<dyn SearchIndex>> = if config.use_elasticsearch {
        Some(Arc::new(ElasticSearchIndex::new(
            &config.elasticsearch_url,
            &config.es_index_name,
        )))
    } else {
        None
    };

    let transport: Arc<dyn ChatTransport> = Arc::new(
        TelegramClient::new(&config.telegram_bot_token, config.telegram_send_timeout())
            .into_diagnostic()?,
    );

    let ctx = Arc::new(WorkerContext {
        pool,
        broker: broker.clone(),
        delivery: delivery_queue.clone(),
        feed_client,
        search,
        classifier: Arc::new(HttpClassifier::new(&config.classifier_url)),
        artifacts: ArtifactStore::new(&config.model_dir),
        config: config.clone(),
    });

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
                cancel.cancel();
            }
        }
    });

    let scheduler_handle = tokio::spawn(scheduler::run_scheduler(
        broker.clone(),
        scheduler::entries_from_config(&config),
        cancel.clone(),
    ));

    let consumer_handle = tokio::spawn(tasks::consumer::run_delivery_consumer(
        delivery_queue,
        transport,
        config.clone(),
        cancel.clone(),
    ));

    let worker_handle = tokio::spawn(broker::run_worker(broker, ctx, cancel.clone()));

    info!("Feed Fusion worker is up");

    worker_handle.await.into_diagnostic()??;
    consumer_handle.await.into_diagnostic()??;
    scheduler_handle.await.into_diagnostic()?;

    Ok(())
}
