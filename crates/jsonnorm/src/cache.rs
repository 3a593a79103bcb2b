//! Process-wide store of fetched schemas, persisted next to a sidecar index.
use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
};

use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::Error;

/// Default storage directory for fetched documents.
pub const DEFAULT_STORE_DIR: &str = "Store";
/// Default sidecar index file, one `local_name,url` row per stored document.
pub const DEFAULT_INDEX_FILE: &str = "UriOfFiles.csv";

/// A URL-keyed document store. Documents are written as `js_<n>.json` files;
/// the index maps them back to their source URLs. Deleting the directory and
/// the index reinitializes the cache.
pub struct FetchCache {
    directory: PathBuf,
    index_path: PathBuf,
    // Guards both the in-memory entries and the on-disk append.
    entries: Mutex<Vec<(String, String)>>,
}

impl FetchCache {
    /// Open a cache over the given directory and index file. The directory is
    /// created lazily on the first store; a missing index means an empty cache.
    pub fn open(
        directory: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
    ) -> io::Result<FetchCache> {
        let directory = directory.into();
        let index_path = index_path.into();
        let entries = match fs::read_to_string(&index_path) {
            Ok(index) => index
                .lines()
                .filter_map(|line| {
                    // URLs may contain commas; the local name never does.
                    line.split_once(',')
                        .map(|(local, url)| (local.to_string(), url.to_string()))
                })
                .collect(),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(error),
        };
        Ok(FetchCache {
            directory,
            index_path,
            entries: Mutex::new(entries),
        })
    }

    /// Open a cache in the conventional `Store/` + `UriOfFiles.csv` layout.
    pub fn open_default() -> io::Result<FetchCache> {
        FetchCache::open(DEFAULT_STORE_DIR, DEFAULT_INDEX_FILE)
    }

    /// Look a URL up in the index, first row wins.
    ///
    /// # Errors
    ///
    /// [`Error::NotCached`] when the URL has no entry. An entry whose document
    /// file is unreadable degrades to the same error so callers refetch.
    pub fn lookup(&self, url: &Url) -> Result<Value, Error> {
        let entries = self.entries.lock();
        let Some((local, _)) = entries.iter().find(|(_, stored)| stored == url.as_str()) else {
            return Err(Error::not_cached(url.as_str()));
        };
        let bytes =
            fs::read(self.directory.join(local)).map_err(|_| Error::not_cached(url.as_str()))?;
        serde_json::from_slice(&bytes).map_err(|_| Error::not_cached(url.as_str()))
    }

    /// Persist a fetched document under a fresh `js_<n>.json` name and append
    /// its index row. Local `file` URLs are never cached; a URL that is
    /// already present is left as-is.
    pub fn store(&self, url: &Url, document: &Value) -> io::Result<()> {
        if url.scheme() == "file" {
            return Ok(());
        }
        let mut entries = self.entries.lock();
        if entries.iter().any(|(_, stored)| stored == url.as_str()) {
            return Ok(());
        }
        fs::create_dir_all(&self.directory)?;
        let local = format!("js_{}.json", entries.len());
        fs::write(
            self.directory.join(&local),
            serde_json::to_vec_pretty(document)?,
        )?;
        let mut index = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.index_path)?;
        writeln!(index, "{local},{url}")?;
        entries.push((local, url.to_string()));
        Ok(())
    }

    /// Number of cached documents.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use url::Url;

    use super::FetchCache;
    use crate::Error;

    fn cache_in(dir: &std::path::Path) -> FetchCache {
        FetchCache::open(dir.join("Store"), dir.join("UriOfFiles.csv")).expect("Invalid cache")
    }

    #[test]
    fn miss_is_not_cached() {
        let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
        let cache = cache_in(dir.path());
        let url = Url::parse("http://example.com/a.json").expect("Invalid URL");
        assert!(matches!(cache.lookup(&url), Err(Error::NotCached { .. })));
    }

    #[test]
    fn store_then_lookup() {
        let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
        let cache = cache_in(dir.path());
        let url = Url::parse("http://example.com/a.json").expect("Invalid URL");
        let document = json!({"type": "object"});
        cache.store(&url, &document).expect("Store failed");
        assert_eq!(cache.lookup(&url).expect("Lookup failed"), document);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn index_survives_reopening() {
        let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
        let url = Url::parse("http://example.com/a.json").expect("Invalid URL");
        let document = json!({"minimum": 3});
        cache_in(dir.path())
            .store(&url, &document)
            .expect("Store failed");

        let reopened = cache_in(dir.path());
        assert_eq!(reopened.lookup(&url).expect("Lookup failed"), document);
        let index = std::fs::read_to_string(dir.path().join("UriOfFiles.csv"))
            .expect("Failed to read the index");
        assert_eq!(index, "js_0.json,http://example.com/a.json\n");
    }

    #[test]
    fn file_urls_are_not_cached() {
        let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
        let cache = cache_in(dir.path());
        let url = Url::parse("file:///tmp/a.json").expect("Invalid URL");
        cache.store(&url, &json!({})).expect("Store failed");
        assert!(cache.is_empty());
        assert!(matches!(cache.lookup(&url), Err(Error::NotCached { .. })));
    }

    #[test]
    fn urls_with_commas_round_trip() {
        let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
        let url = Url::parse("http://example.com/a.json?v=1,2").expect("Invalid URL");
        cache_in(dir.path())
            .store(&url, &json!(true))
            .expect("Store failed");
        assert_eq!(
            cache_in(dir.path()).lookup(&url).expect("Lookup failed"),
            json!(true)
        );
    }
}
