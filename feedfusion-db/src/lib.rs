mod error;
mod pool;
mod schema;
mod url;

pub mod db;
pub mod migrations;
pub mod models;

pub(crate) use schema::*;

pub use error::{StoreError, StoreResult, id_from_i64};
pub use pool::{ConnectionPool, get_pool};
pub use url::postgres_url_from_environment;

pub use diesel::{Connection, PgConnection};
