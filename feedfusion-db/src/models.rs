use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The closed set of labels the classifier may assign. Stored as text; a
/// label coming back from the model that does not parse into this enum is
/// logged and skipped rather than written.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NewsCategory {
    International,
    Culture,
    Scitech,
    Society,
    Economics,
    Incidents,
    Sport,
    Health,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::channels)]
pub struct NewChannel<'a> {
    pub title: &'a str,
    pub link: &'a str,
    pub description: Option<&'a str>,
}

#[derive(Debug, Clone, Identifiable, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::channels)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbChannel {
    pub id: i32,
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::news)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewNews<'a> {
    pub channel_id: i32,
    pub link: &'a str,
    pub title: &'a str,
    pub summary: &'a str,
    pub source: &'a str,
    pub image: Option<&'a str>,
    pub published: NaiveDateTime,
    pub content_hash: &'a str,
}

#[derive(Debug, Clone, Identifiable, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::news)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbNews {
    pub id: i32,
    pub channel_id: i32,
    pub link: String,
    pub title: String,
    pub summary: String,
    pub source: String,
    pub image: Option<String>,
    pub published: NaiveDateTime,
    pub content_hash: String,
    pub category: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::users)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub telegram_id: Option<&'a str>,
}

#[derive(Debug, Clone, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbUser {
    pub id: i32,
    pub username: String,
    pub telegram_id: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::subscriptions)]
pub struct NewSubscription {
    pub user_id: i32,
    pub channel_id: i32,
    pub last_news_id: i32,
}

#[derive(Debug, Clone, Identifiable, Queryable, Selectable)]
#[diesel(table_name = crate::subscriptions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbSubscription {
    pub id: i32,
    pub user_id: i32,
    pub channel_id: i32,
    pub last_news_id: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A subscription joined with the delivery address of its user.
#[derive(Debug, Clone)]
pub struct SubscriptionWithUser {
    pub subscription: DbSubscription,
    pub telegram_id: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::news_denormalized)]
#[diesel(treat_none_as_default_value = false)]
pub struct NewSample<'a> {
    pub title: &'a str,
    pub summary: Option<&'a str>,
    pub category: &'a str,
}

#[derive(Debug, Clone, Identifiable, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::news_denormalized)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbSample {
    pub id: i32,
    pub title: String,
    pub summary: Option<String>,
    pub category: String,
    pub used_in_training: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Identifiable, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::dataset_uploads)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbUpload {
    pub id: i32,
    pub uploads: i32,
    pub errors: i32,
    pub is_completed: bool,
    pub details: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::classification_trainings)]
pub struct NewTraining<'a> {
    pub config: &'a serde_json::Value,
    pub model_dir: &'a str,
    pub device: &'a str,
    pub in_progress: bool,
}

#[derive(Debug, Clone, Identifiable, Queryable, Selectable, Serialize)]
#[diesel(table_name = crate::classification_trainings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DbTraining {
    pub id: i32,
    pub config: serde_json::Value,
    pub metrics: Option<serde_json::Value>,
    pub model_dir: String,
    pub device: String,
    pub in_progress: bool,
    pub details: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn category_round_trips_through_strings() {
        for category in NewsCategory::iter() {
            let as_string = category.to_string();
            assert_eq!(NewsCategory::from_str(&as_string).unwrap(), category);
        }
    }

    #[test]
    fn unknown_category_label_is_rejected() {
        assert!(NewsCategory::from_str("astrology").is_err());
        assert!(NewsCategory::from_str("").is_err());
    }
}
