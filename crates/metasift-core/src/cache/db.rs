//! SQLite connection, schema and timestamp helpers.

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// `~/.local/state/metasift/cache.db`.
pub fn default_db_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("metasift")?;
    Ok(xdg_dirs.get_state_home().join("metasift").join("cache.db"))
}

pub(crate) async fn connect_file(path: &Path) -> Result<Pool<Sqlite>> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let uri = path_to_sqlite_uri(path) + "?mode=rwc";
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(&uri)
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn connect_memory() -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &Pool<Sqlite>) -> Result<()> {
    // - `cache_entries` holds one value per URL; rewritten only on set.
    // - `cache_index` holds the recency stamp; rewritten on every read.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            url TEXT PRIMARY KEY NOT NULL,
            metadata_json TEXT NOT NULL,
            parser_revision INTEGER NOT NULL DEFAULT 0,
            container TEXT NOT NULL DEFAULT 'unknown'
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cache_index (
            url TEXT PRIMARY KEY NOT NULL,
            last_access INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Rows left behind by an interrupted write.
    sqlx::query("DELETE FROM cache_entries WHERE url NOT IN (SELECT url FROM cache_index)")
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM cache_index WHERE url NOT IN (SELECT url FROM cache_entries)")
        .execute(pool)
        .await?;
    Ok(())
}

/// All persisted `(url, last_access)` pairs, oldest first.
pub(crate) async fn load_index(pool: &Pool<Sqlite>) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query("SELECT url, last_access FROM cache_index ORDER BY last_access ASC")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("url"), row.get("last_access")))
        .collect())
}

/// Current time as Unix milliseconds.
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
