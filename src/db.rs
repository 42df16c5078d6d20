use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// File name of the index inside the store directory.
pub const INDEX_FILE: &str = "index.sqlite";

pub fn index_path(store_dir: &Path) -> PathBuf {
    store_dir.join(INDEX_FILE)
}

/// Open (or create) the SQLite index inside `store_dir`.
pub async fn connect(store_dir: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(store_dir).map_err(|e| {
        Error::StoreUnavailable(format!(
            "cannot create store directory {}: {}",
            store_dir.display(),
            e
        ))
    })?;

    let db_path = index_path(store_dir);
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
