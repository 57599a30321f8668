use crate::services::ServiceError;
use diesel::PgConnection;
use feedfusion_db::models::{DbSubscription, NewSubscription};
use feedfusion_db::{StoreError, db, id_from_i64};

/// Creates a subscription for a user who has a delivery address. The
/// watermark starts at the channel's highest news id so the subscriber only
/// ever receives items ingested after they subscribed; an empty channel is
/// refused outright.
pub fn create_subscription(
    conn: &mut PgConnection,
    user_id: i64,
    channel_id: i64,
) -> Result<DbSubscription, ServiceError> {
    let user_id = id_from_i64(user_id)?;
    let channel_id = id_from_i64(channel_id)?;

    let user = match db::users::get(conn, user_id) {
        Err(StoreError::NotFound) => return Err(ServiceError::UserNotFound),
        other => other?,
    };
    if user.telegram_id.is_none() {
        return Err(ServiceError::MissingTelegramId);
    }

    if db::channels::get_optional(conn, channel_id)?.is_none() {
        return Err(ServiceError::ChannelNotFound);
    }

    let Some(latest_id) = db::news::max_id(conn, channel_id)? else {
        return Err(ServiceError::EmptyChannel);
    };

    match db::subscriptions::insert(
        conn,
        &NewSubscription {
            user_id,
            channel_id,
            last_news_id: latest_id,
        },
    ) {
        Err(StoreError::ObjectExists) => Err(ServiceError::SubscriptionExists),
        other => other.map_err(ServiceError::from),
    }
}

pub fn delete_subscription(
    conn: &mut PgConnection,
    subscription_id: i64,
) -> Result<(), ServiceError> {
    let id = id_from_i64(subscription_id)?;
    match db::subscriptions::delete(conn, id, true) {
        Err(StoreError::NotFound) => Err(ServiceError::SubscriptionNotFound),
        other => other.map_err(ServiceError::from),
    }
}
