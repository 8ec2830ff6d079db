use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::types::AppResult;

pub use operations::*;

pub mod operations;

/// Open a staged upload as a single-connection pool.
///
/// The query over `sqlite_master` forces SQLite to read the file header, so
/// a file that is not a database fails here rather than on the first question.
pub async fn open_staged(path: &Path, config: &DatabaseConfig) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .read_only(config.read_only);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .connect_with(options)
        .await?;

    if let Err(e) = sqlx::query("SELECT count(*) FROM sqlite_master")
        .fetch_one(&pool)
        .await
    {
        pool.close().await;
        return Err(e.into());
    }

    info!(path = %path.display(), read_only = config.read_only, "Opened staged database");
    Ok(pool)
}

/// Close the pool so no connection still holds the file open.
pub async fn close(pool: SqlitePool) {
    pool.close().await;
    debug!("Closed database pool");
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> DatabaseConfig {
        DatabaseConfig {
            read_only: true,
            max_rows: 200,
            sample_rows: 3,
        }
    }

    #[tokio::test]
    async fn test_open_valid_database() {
        let dir = TempDir::new().unwrap();
        let path = test_support::create_sample_db(dir.path(), "ok.db").await;

        let pool = open_staged(&path, &config()).await.unwrap();
        close(pool).await;
    }

    #[tokio::test]
    async fn test_open_corrupted_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, "not a sqlite database\n".repeat(200)).unwrap();

        assert!(open_staged(&path, &config()).await.is_err());
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(open_staged(&dir.path().join("missing.db"), &config()).await.is_err());
        assert!(!dir.path().join("missing.db").exists());
    }

    #[tokio::test]
    async fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = test_support::create_sample_db(dir.path(), "ro.db").await;

        let pool = open_staged(&path, &config()).await.unwrap();
        let result = sqlx::query("DELETE FROM customers").execute(&pool).await;
        assert!(result.is_err());
        close(pool).await;
    }
}
