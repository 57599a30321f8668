use crate::services::ServiceError;
use diesel::PgConnection;
use feedfusion_db::models::{DbChannel, NewChannel};
use feedfusion_db::{StoreError, db, id_from_i64};

pub fn create_channel(
    conn: &mut PgConnection,
    title: &str,
    link: &str,
    description: Option<&str>,
) -> Result<DbChannel, ServiceError> {
    match db::channels::insert(
        conn,
        &NewChannel {
            title,
            link,
            description,
        },
    ) {
        Err(StoreError::ObjectExists) => Err(ServiceError::ChannelExists),
        other => other.map_err(ServiceError::from),
    }
}

pub fn get_channel(conn: &mut PgConnection, channel_id: i64) -> Result<DbChannel, ServiceError> {
    let id = id_from_i64(channel_id)?;
    db::channels::get_optional(conn, id)?.ok_or(ServiceError::ChannelNotFound)
}

pub fn get_channels(conn: &mut PgConnection) -> Result<Vec<DbChannel>, ServiceError> {
    Ok(db::channels::all(conn)?)
}

pub fn edit_channel(
    conn: &mut PgConnection,
    channel_id: i64,
    patch: &db::channels::ChannelPatch,
) -> Result<DbChannel, ServiceError> {
    let id = id_from_i64(channel_id)?;
    match db::channels::update(conn, id, patch) {
        Err(StoreError::NotFound) => Err(ServiceError::ChannelNotFound),
        Err(StoreError::ObjectExists) => Err(ServiceError::ChannelExists),
        other => other.map_err(ServiceError::from),
    }
}

/// Deleting a channel cascades to its news rows at the store level.
pub fn delete_channel(conn: &mut PgConnection, channel_id: i64) -> Result<(), ServiceError> {
    let id = id_from_i64(channel_id)?;
    match db::channels::delete(conn, id, true) {
        Err(StoreError::NotFound) => Err(ServiceError::ChannelNotFound),
        other => other.map_err(ServiceError::from),
    }
}
