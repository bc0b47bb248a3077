//! # finsight-db
//!
//! PostgreSQL database layer for finsight.
//!
//! The [`Database`] aggregate owns one connection pool and exposes a
//! repository per table. Repositories implement the traits from
//! `finsight-core`, so everything above this crate can be tested against
//! in-memory fakes.

pub mod analyses;
pub mod jobs;
pub mod pool;
pub mod statements;
pub mod users;

use std::sync::Arc;

use finsight_core::{Error, Result};

pub use analyses::PgAnalysisRepository;
pub use jobs::PgJobRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use statements::PgStatementRepository;
pub use users::PgUserRepository;

/// Aggregated handle to every repository, sharing one pool.
#[derive(Clone)]
pub struct Database {
    pub statements: Arc<PgStatementRepository>,
    pub analyses: Arc<PgAnalysisRepository>,
    pub users: Arc<PgUserRepository>,
    pub jobs: Arc<PgJobRepository>,
    pool: sqlx::Pool<sqlx::Postgres>,
}

impl Database {
    /// Build a Database from an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            statements: Arc::new(PgStatementRepository::new(pool.clone())),
            analyses: Arc::new(PgAnalysisRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            jobs: Arc::new(PgJobRepository::new(pool.clone())),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Cheap readiness probe.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
