use crate::error::{StoreError, StoreResult};
use crate::models::{DbChannel, NewChannel};
use diesel::prelude::*;

pub fn insert(conn: &mut PgConnection, channel: &NewChannel) -> StoreResult<DbChannel> {
    use crate::channels::dsl;

    diesel::insert_into(dsl::channels)
        .values(channel)
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get(conn: &mut PgConnection, id: i32) -> StoreResult<DbChannel> {
    use crate::channels::dsl;

    dsl::channels
        .find(id)
        .select(DbChannel::as_select())
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get_optional(conn: &mut PgConnection, id: i32) -> StoreResult<Option<DbChannel>> {
    use crate::channels::dsl;

    dsl::channels
        .find(id)
        .select(DbChannel::as_select())
        .get_result(conn)
        .optional()
        .map_err(StoreError::from)
}

pub fn all(conn: &mut PgConnection) -> StoreResult<Vec<DbChannel>> {
    use crate::channels::dsl;

    dsl::channels
        .order_by(dsl::id.asc())
        .select(DbChannel::as_select())
        .get_results(conn)
        .map_err(StoreError::from)
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = crate::channels)]
pub struct ChannelPatch<'a> {
    pub title: Option<&'a str>,
    pub link: Option<&'a str>,
    pub description: Option<&'a str>,
}

pub fn update(conn: &mut PgConnection, id: i32, patch: &ChannelPatch) -> StoreResult<DbChannel> {
    use crate::channels::dsl;

    diesel::update(dsl::channels.find(id))
        .set((patch, dsl::updated_at.eq(diesel::dsl::now)))
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn delete(conn: &mut PgConnection, id: i32, ensure_existence: bool) -> StoreResult<()> {
    use crate::channels::dsl;

    let deleted = diesel::delete(dsl::channels.find(id)).execute(conn)?;
    if deleted == 0 && ensure_existence {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub fn count(conn: &mut PgConnection) -> StoreResult<i64> {
    use crate::channels::dsl;

    dsl::channels
        .count()
        .get_result(conn)
        .map_err(StoreError::from)
}
