use crate::error::{StoreError, StoreResult};
use crate::models::{DbSubscription, NewSubscription, SubscriptionWithUser};
use diesel::prelude::*;

pub fn insert(
    conn: &mut PgConnection,
    subscription: &NewSubscription,
) -> StoreResult<DbSubscription> {
    use crate::subscriptions::dsl;

    diesel::insert_into(dsl::subscriptions)
        .values(subscription)
        .get_result(conn)
        .map_err(StoreError::from)
}

pub fn get(conn: &mut PgConnection, id: i32) -> StoreResult<DbSubscription> {
    use crate::subscriptions::dsl;

    dsl::subscriptions
        .find(id)
        .select(DbSubscription::as_select())
        .get_result(conn)
        .map_err(StoreError::from)
}

/// Every subscription joined with its user's delivery address, in id order.
pub fn all_with_user(conn: &mut PgConnection) -> StoreResult<Vec<SubscriptionWithUser>> {
    use crate::subscriptions::dsl as subs_dsl;
    use crate::users::dsl as users_dsl;

    let rows: Vec<(DbSubscription, Option<String>)> = subs_dsl::subscriptions
        .inner_join(users_dsl::users)
        .order_by(subs_dsl::id.asc())
        .select((DbSubscription::as_select(), users_dsl::telegram_id))
        .get_results(conn)?;

    Ok(rows
        .into_iter()
        .map(|(subscription, telegram_id)| SubscriptionWithUser {
            subscription,
            telegram_id,
        })
        .collect())
}

/// Advances the watermark, but never backwards: the update is a no-op when
/// `to_news_id` is not strictly greater than the stored value, which makes
/// concurrent ticks of the planner safe to interleave.
pub fn advance_watermark(
    conn: &mut PgConnection,
    subscription_id: i32,
    to_news_id: i32,
) -> StoreResult<bool> {
    use crate::subscriptions::dsl;

    let updated = diesel::update(
        dsl::subscriptions
            .find(subscription_id)
            .filter(dsl::last_news_id.lt(to_news_id)),
    )
    .set((
        dsl::last_news_id.eq(to_news_id),
        dsl::updated_at.eq(diesel::dsl::now),
    ))
    .execute(conn)?;

    Ok(updated > 0)
}

pub fn delete(conn: &mut PgConnection, id: i32, ensure_existence: bool) -> StoreResult<()> {
    use crate::subscriptions::dsl;

    let deleted = diesel::delete(dsl::subscriptions.find(id)).execute(conn)?;
    if deleted == 0 && ensure_existence {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

pub fn count(conn: &mut PgConnection) -> StoreResult<i64> {
    use crate::subscriptions::dsl;

    dsl::subscriptions
        .count()
        .get_result(conn)
        .map_err(StoreError::from)
}
