use diesel::PgConnection;
use diesel::r2d2::{self, ConnectionManager};

pub type ConnectionPool = r2d2::Pool<ConnectionManager<PgConnection>>;

/// Builds the shared pool every worker checks its scoped connections out
/// of. Sizing comes from configuration; the URL from the environment.
pub fn get_pool(max_size: u32) -> Result<ConnectionPool, r2d2::PoolError> {
    r2d2::Pool::builder()
        .max_size(max_size)
        .build(ConnectionManager::new(crate::postgres_url_from_environment()))
}
