//! `metasift cache stats|clear`.

use anyhow::Result;
use metasift_core::cache::MetadataCache;

pub async fn run_cache_stats(cache: &MetadataCache) -> Result<()> {
    let stats = cache.stats().await?;
    println!("entries:   {} / {}", stats.entries, stats.capacity);
    println!("empty:     {}", stats.empty_entries);
    let stamp = |v: Option<i64>| v.map(|ms| format!("{ms}")).unwrap_or_else(|| "-".to_string());
    println!("oldest:    {}", stamp(stats.oldest_access));
    println!("newest:    {}", stamp(stats.newest_access));
    Ok(())
}

pub async fn run_cache_clear(cache: &MetadataCache) -> Result<()> {
    let before = cache.len();
    cache.clear().await?;
    println!("Removed {before} cache entries");
    Ok(())
}
