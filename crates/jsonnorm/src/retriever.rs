//! Logic for retrieving external schemas.
use std::{io::BufReader, path::PathBuf};

use serde_json::Value;
use url::Url;

use crate::{cache::FetchCache, Error};

type RetrieveError = Box<dyn std::error::Error + Send + Sync>;

/// Trait for retrieving schemas that are not yet loaded.
///
/// All operations are blocking. Implementations are consulted once per
/// distinct fragment-less URL within a normalization session.
pub trait Retrieve: Send + Sync {
    /// Attempt to retrieve the document behind the given URL.
    ///
    /// # Errors
    ///
    /// If the document couldn't be retrieved or an error occurred.
    fn retrieve(&self, url: &Url) -> Result<Value, RetrieveError>;
}

#[cfg(feature = "resolve-http")]
static HTTP_CLIENT: once_cell::sync::Lazy<reqwest::blocking::Client> =
    once_cell::sync::Lazy::new(|| {
        // Redirects are followed by the client's default policy.
        reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Invalid HTTP client")
    });

/// Retrieves `http(s)` URLs over the network and `file` URLs from disk.
#[derive(Debug, PartialEq, Eq)]
pub struct DefaultRetriever;

impl Retrieve for DefaultRetriever {
    fn retrieve(&self, url: &Url) -> Result<Value, RetrieveError> {
        match url.scheme() {
            "http" | "https" => {
                #[cfg(feature = "resolve-http")]
                {
                    Ok(HTTP_CLIENT
                        .get(url.as_str())
                        .send()?
                        .error_for_status()?
                        .json()?)
                }
                #[cfg(not(feature = "resolve-http"))]
                {
                    Err("`resolve-http` feature or a custom retriever is required to fetch schemas over HTTP".into())
                }
            }
            "file" => {
                if let Ok(path) = url.to_file_path() {
                    let file = std::fs::File::open(path)?;
                    Ok(serde_json::from_reader(BufReader::new(file))?)
                } else {
                    Err("invalid file path".into())
                }
            }
            scheme => Err(format!("unknown scheme {scheme}").into()),
        }
    }
}

/// How failed fetches are retried for a given corpus of schemas.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum RepositoryKind {
    /// No retry; a failed fetch fails the reference.
    #[default]
    Normal,
    /// Hosted corpus convention: re-issue the URL with a rewritten query
    /// (`raw=true` unless configured otherwise).
    Corpus,
    /// JSON-Schema-Test-Suite convention: `http://localhost:1234/...` remaps
    /// to a local directory.
    TestSuite,
}

/// Cache-first retriever: index lookup, then network, then store.
pub struct CachingRetriever {
    cache: FetchCache,
    kind: RepositoryKind,
    query_rewrite: (String, String),
    testsuite_root: Option<PathBuf>,
    network: Box<dyn Retrieve>,
}

impl CachingRetriever {
    #[must_use]
    pub fn new(cache: FetchCache, kind: RepositoryKind) -> CachingRetriever {
        CachingRetriever {
            cache,
            kind,
            query_rewrite: ("raw".to_string(), "true".to_string()),
            testsuite_root: None,
            network: Box::new(DefaultRetriever),
        }
    }

    /// Override the query pair appended on the `Corpus` retry.
    #[must_use]
    pub fn query_rewrite(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> CachingRetriever {
        self.query_rewrite = (key.into(), value.into());
        self
    }

    /// Directory that `http://localhost:1234/...` remaps to under
    /// [`RepositoryKind::TestSuite`].
    #[must_use]
    pub fn testsuite_root(mut self, directory: impl Into<PathBuf>) -> CachingRetriever {
        self.testsuite_root = Some(directory.into());
        self
    }

    /// Replace the network layer, e.g. with a stub in tests.
    #[must_use]
    pub fn network(mut self, network: Box<dyn Retrieve>) -> CachingRetriever {
        self.network = network;
        self
    }

    fn fallback(&self, url: &Url, primary: RetrieveError) -> Result<Value, RetrieveError> {
        match self.kind {
            RepositoryKind::Normal => Err(primary),
            RepositoryKind::Corpus => {
                let mut rewritten = url.clone();
                rewritten
                    .query_pairs_mut()
                    .append_pair(&self.query_rewrite.0, &self.query_rewrite.1);
                tracing::debug!(url = %rewritten, "retrying with rewritten query");
                self.network.retrieve(&rewritten)
            }
            RepositoryKind::TestSuite => {
                if let Some(root) = &self.testsuite_root {
                    if url.host_str() == Some("localhost") && url.port() == Some(1234) {
                        let path = root.join(url.path().trim_start_matches('/'));
                        tracing::debug!(path = %path.display(), "remapping to the local test suite");
                        let file = std::fs::File::open(path)?;
                        return Ok(serde_json::from_reader(BufReader::new(file))?);
                    }
                }
                Err(primary)
            }
        }
    }
}

impl Retrieve for CachingRetriever {
    fn retrieve(&self, url: &Url) -> Result<Value, RetrieveError> {
        if url.scheme() == "file" {
            return self.network.retrieve(url);
        }
        match self.cache.lookup(url) {
            Ok(document) => return Ok(document),
            Err(Error::NotCached { .. }) => {}
            Err(error) => return Err(Box::new(error)),
        }
        let document = match self.network.retrieve(url) {
            Ok(document) => document,
            Err(primary) => {
                tracing::debug!(%url, error = %primary, "primary fetch failed");
                self.fallback(url, primary)?
            }
        };
        if let Err(error) = self.cache.store(url, &document) {
            tracing::warn!(%url, %error, "failed to persist a fetched schema");
        }
        Ok(document)
    }
}
