use deadpool_postgres::{
    Config, CreatePoolError, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime,
};
use std::str::FromStr;
use thiserror::Error;
use tokio_postgres::NoTls;

pub type PgPool = Pool;

/// Connections kept by a batch process; ingest fans out to at most
/// `UpsertConfig::concurrency` writers, matching to `user_concurrency`.
pub const DEFAULT_POOL_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("invalid database url: {0}")]
    InvalidConfig(String),
    #[error("failed to create database pool: {0}")]
    PoolCreation(#[from] CreatePoolError),
}

pub fn create_pool_from_url(db_url: &str) -> Result<PgPool, DbPoolError> {
    create_pool_with_size(db_url, DEFAULT_POOL_SIZE)
}

pub fn create_pool_with_size(db_url: &str, max_size: usize) -> Result<PgPool, DbPoolError> {
    tokio_postgres::Config::from_str(db_url)
        .map_err(|e| DbPoolError::InvalidConfig(e.to_string()))?;

    let mut cfg = Config::new();
    cfg.url = Some(db_url.to_string());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(max_size.max(1)));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(DbPoolError::PoolCreation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_pool_without_connecting() {
        let pool = create_pool_with_size("postgres://jm:jm@localhost:5432/jobmatch", 4).unwrap();
        assert_eq!(pool.status().max_size, 4);
    }

    #[test]
    fn rejects_malformed_urls() {
        let err = create_pool_from_url("postgres://jm@localhost:notaport/db").unwrap_err();
        assert!(matches!(err, DbPoolError::InvalidConfig(_)));
    }
}
