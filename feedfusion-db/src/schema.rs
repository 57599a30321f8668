diesel::table! {
    channels (id) {
        id -> Int4,
        title -> Text,
        link -> Text,
        description -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    news (id) {
        id -> Int4,
        channel_id -> Int4,
        link -> Text,
        title -> Text,
        summary -> Text,
        source -> Text,
        image -> Nullable<Text>,
        published -> Timestamp,
        content_hash -> Text,
        category -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    users (id) {
        id -> Int4,
        username -> Text,
        telegram_id -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    subscriptions (id) {
        id -> Int4,
        user_id -> Int4,
        channel_id -> Int4,
        last_news_id -> Int4,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    news_denormalized (id) {
        id -> Int4,
        title -> Text,
        summary -> Nullable<Text>,
        category -> Text,
        used_in_training -> Bool,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    dataset_uploads (id) {
        id -> Int4,
        uploads -> Int4,
        errors -> Int4,
        is_completed -> Bool,
        details -> Jsonb,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    classification_trainings (id) {
        id -> Int4,
        config -> Jsonb,
        metrics -> Nullable<Jsonb>,
        model_dir -> Text,
        device -> Text,
        in_progress -> Bool,
        details -> Nullable<Text>,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::joinable!(news -> channels (channel_id));
diesel::joinable!(subscriptions -> users (user_id));
diesel::joinable!(subscriptions -> channels (channel_id));

diesel::allow_tables_to_appear_in_same_query!(
    channels,
    news,
    users,
    subscriptions,
    news_denormalized,
    dataset_uploads,
    classification_trainings,
);
