pub mod channels;
pub mod news;
pub mod samples;
pub mod subscriptions;
pub mod training;

use crate::broker::BrokerError;
use crate::search::SearchError;
use feedfusion_db::StoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Operation-level failures. HTTP never appears here; an API boundary maps
/// these kinds onto status codes with a small table of its own.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("news not found")]
    NewsNotFound,

    #[error("channel not found")]
    ChannelNotFound,

    #[error("channel already exists")]
    ChannelExists,

    #[error("subscription not found")]
    SubscriptionNotFound,

    #[error("subscription already exists")]
    SubscriptionExists,

    #[error("user has no telegram id linked")]
    MissingTelegramId,

    #[error("channel has no news yet")]
    EmptyChannel,

    #[error("user not found")]
    UserNotFound,

    #[error("upload not found")]
    UploadNotFound,

    #[error("training not found")]
    TrainingNotFound,

    #[error("this category is already assigned to the news item")]
    CategoryAlreadyAssigned,

    #[error("an identical training sample already exists")]
    SampleExists,

    #[error("a training is already running for this model directory")]
    ModelAlreadyTraining,

    #[error("couldn't decode the uploaded file as CSV")]
    CsvDecode,

    #[error("uploaded CSV is missing required headers: {}", .0.join(", "))]
    MissingCsvHeaders(Vec<String>),

    #[error("couldn't check out a database connection")]
    Pool(#[source] diesel::r2d2::PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

impl From<diesel::result::Error> for ServiceError {
    fn from(err: diesel::result::Error) -> Self {
        ServiceError::from(StoreError::from(err))
    }
}

impl From<diesel::r2d2::PoolError> for ServiceError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        ServiceError::Pool(err)
    }
}
