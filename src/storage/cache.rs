use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

use crate::config::Config;

/// Disk cache of raw feed responses.
///
/// Each URL maps to `feed.<sha256 of url>.xml` directly inside the cache
/// directory. The cache is best-effort: every I/O failure is logged and
/// treated as a miss (reads) or ignored (writes). Without a directory the
/// store is disabled and all operations are no-ops.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: Option<PathBuf>,
    expire: Duration,
}

impl CacheStore {
    pub fn new(dir: Option<PathBuf>, expire: Duration) -> Self {
        Self { dir, expire }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::from_secs(Config::DEFAULT_CACHE_EXPIRE_SECS))
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cache_dir.clone(), config.cache_expire())
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn expire(&self) -> Duration {
        self.expire
    }

    /// Cache file for `url`, or `None` when caching is disabled.
    pub fn path_for(&self, url: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("feed.{}.xml", cache_key(url))))
    }

    /// Returns the cached payload if it is no older than the expiry window.
    ///
    /// A modification time in the future counts as fresh.
    pub async fn read(&self, url: &str) -> Option<Vec<u8>> {
        let path = self.path_for(url)?;

        let modified = match tokio::fs::metadata(&path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                log_read_miss(&path, &e);
                return None;
            }
        };
        let age = modified.elapsed().unwrap_or(Duration::ZERO);
        if age > self.expire {
            tracing::debug!(
                path = %path.display(),
                age_secs = age.as_secs(),
                expire_secs = self.expire.as_secs(),
                "Cached feed expired"
            );
            return None;
        }

        self.read_file(&path).await
    }

    /// Returns the cached payload regardless of its age.
    pub async fn read_stale(&self, url: &str) -> Option<Vec<u8>> {
        let path = self.path_for(url)?;
        self.read_file(&path).await
    }

    /// Replaces the cached payload for `url`.
    pub async fn write(&self, url: &str, bytes: &[u8]) {
        let Some(path) = self.path_for(url) else {
            return;
        };
        if let Err(e) = write_atomic(&path, bytes).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to write feed cache");
        }
    }

    async fn read_file(&self, path: &Path) -> Option<Vec<u8>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                log_read_miss(path, &e);
                None
            }
        }
    }
}

/// Hex SHA-256 of the URL string, used as the cache file stem.
pub fn cache_key(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

fn log_read_miss(path: &Path, e: &io::Error) {
    if e.kind() == io::ErrorKind::NotFound {
        tracing::debug!(path = %path.display(), "No cached feed");
    } else {
        tracing::warn!(path = %path.display(), error = %e, "Failed to read feed cache");
    }
}

/// Write-to-temp-then-rename so readers never see a partial file and
/// concurrent writers of the same URL simply race on the rename.
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let result = async {
        let mut temp_file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        temp_file.write_all(bytes).await?;
        temp_file.sync_all().await?;
        drop(temp_file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/rss";

    fn test_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("feedtree_cache_test_{name}"));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    fn age_file(path: &Path, by: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[test]
    fn test_cache_key_is_stable_hex() {
        let key = cache_key(URL);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key(URL));
        assert_ne!(key, cache_key("https://example.com/atom"));
    }

    #[test]
    fn test_path_layout() {
        let store = CacheStore::new(Some(PathBuf::from("/var/cache/feeds")), Duration::ZERO);
        let path = store.path_for(URL).unwrap();
        assert_eq!(path.parent(), Some(Path::new("/var/cache/feeds")));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name, format!("feed.{}.xml", cache_key(URL)));
    }

    #[tokio::test]
    async fn test_disabled_store_is_inert() {
        let store = CacheStore::disabled();
        assert!(!store.is_enabled());
        assert!(store.path_for(URL).is_none());
        store.write(URL, b"<rss/>").await;
        assert!(store.read(URL).await.is_none());
        assert!(store.read_stale(URL).await.is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = test_dir("write_read");
        let store = CacheStore::new(Some(dir.clone()), Duration::from_secs(60));

        store.write(URL, b"<rss>one</rss>").await;
        assert_eq!(store.read(URL).await.as_deref(), Some(&b"<rss>one</rss>"[..]));

        store.write(URL, b"<rss>two</rss>").await;
        assert_eq!(store.read(URL).await.as_deref(), Some(&b"<rss>two</rss>"[..]));

        // Only the cache file remains, no temp leftovers
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_expired_entry_only_served_stale() {
        let dir = test_dir("expired");
        let store = CacheStore::new(Some(dir.clone()), Duration::from_secs(60));

        store.write(URL, b"<rss>old</rss>").await;
        age_file(&store.path_for(URL).unwrap(), Duration::from_secs(3600));

        assert!(store.read(URL).await.is_none());
        assert_eq!(store.read_stale(URL).await.as_deref(), Some(&b"<rss>old</rss>"[..]));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_entry_within_window_is_fresh() {
        let dir = test_dir("fresh");
        let store = CacheStore::new(Some(dir.clone()), Duration::from_secs(86_400));

        store.write(URL, b"<rss/>").await;
        age_file(&store.path_for(URL).unwrap(), Duration::from_secs(3600));
        assert!(store.read(URL).await.is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let dir = test_dir("missing");
        let store = CacheStore::new(Some(dir.clone()), Duration::from_secs(60));
        assert!(store.read(URL).await.is_none());
        assert!(store.read_stale(URL).await.is_none());
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_swallowed() {
        let blocker = std::env::temp_dir().join("feedtree_cache_test_blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();

        // The cache dir is a regular file, so every write fails
        let store = CacheStore::new(Some(blocker.clone()), Duration::from_secs(60));
        store.write(URL, b"<rss/>").await;
        assert!(store.read_stale(URL).await.is_none());

        std::fs::remove_file(&blocker).ok();
    }
}
