use crate::error::{StoreError, StoreResult};
use crate::models::{DbUser, NewUser};
use diesel::prelude::*;

pub fn insert(conn: &mut PgConnection, user: &NewUser) -> StoreResult<DbUser> {
    use crate::users::dsl;

    diesel::insert_into(dsl::users)
        .values(user)
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get(conn: &mut PgConnection, id: i32) -> StoreResult<DbUser> {
    use crate::users::dsl;

    dsl::users
        .find(id)
        .select(DbUser::as_select())
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get_by_username_optional(
    conn: &mut PgConnection,
    username: &str,
) -> StoreResult<Option<DbUser>> {
    use crate::users::dsl;

    dsl::users
        .filter(dsl::username.eq(username))
        .select(DbUser::as_select())
        .first(conn)
        .optional()
        .map_err(StoreError::from)
}

pub fn count(conn: &mut PgConnection) -> StoreResult<i64> {
    use crate::users::dsl;

    dsl::users
        .count()
        .get_result(conn)
        .map_err(StoreError::from)
}
