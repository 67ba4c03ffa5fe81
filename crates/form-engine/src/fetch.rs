use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("template `{0}` not found")]
    NotFound(String),
    #[error("failed to fetch template `{url}`: {message}")]
    Failed { url: String, message: String },
}

/// Loads template markup referenced by `templateUrl`.
#[async_trait]
pub trait TemplateFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Serves templates from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    templates: BTreeMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        self.insert(url, markup);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, markup: impl Into<String>) {
        self.templates.insert(url.into(), markup.into());
    }
}

#[async_trait]
impl TemplateFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.templates
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

/// Caches successful fetches of an inner fetcher by url.
#[derive(Debug, Default)]
pub struct CachingFetcher<F> {
    inner: F,
    cache: Mutex<HashMap<String, String>>,
}

impl<F> CachingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached(&self, url: &str) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }
}

#[async_trait]
impl<F: TemplateFetcher> TemplateFetcher for CachingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if let Some(markup) = self.cached(url) {
            trace!(url, "template cache hit");
            return Ok(markup);
        }
        let markup = self.inner.fetch(url).await?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), markup.clone());
        Ok(markup)
    }
}
