use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use form_engine::{FetchError, StaticFetcher, TemplateFetcher};
use tracing::debug;

/// Markup shipped with the binary for every built-in field type.
const EMBEDDED: [(&str, &str); 9] = [
    (
        "fields/checkbox.tpl.html",
        include_str!("../templates/fields/checkbox.tpl.html"),
    ),
    (
        "fields/date.tpl.html",
        include_str!("../templates/fields/date.tpl.html"),
    ),
    (
        "fields/form.tpl.html",
        include_str!("../templates/fields/form.tpl.html"),
    ),
    (
        "fields/hidden.tpl.html",
        include_str!("../templates/fields/hidden.tpl.html"),
    ),
    (
        "fields/number.tpl.html",
        include_str!("../templates/fields/number.tpl.html"),
    ),
    (
        "fields/radio.tpl.html",
        include_str!("../templates/fields/radio.tpl.html"),
    ),
    (
        "fields/select.tpl.html",
        include_str!("../templates/fields/select.tpl.html"),
    ),
    (
        "fields/text.tpl.html",
        include_str!("../templates/fields/text.tpl.html"),
    ),
    (
        "fields/textarea.tpl.html",
        include_str!("../templates/fields/textarea.tpl.html"),
    ),
];

pub fn embedded() -> StaticFetcher {
    EMBEDDED
        .iter()
        .fold(StaticFetcher::new(), |fetcher, (url, markup)| {
            fetcher.with(*url, markup.trim_end())
        })
}

/// Reads template urls as paths relative to a directory.
#[derive(Debug, Clone)]
pub struct DirFetcher {
    root: PathBuf,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, url: &str) -> Option<PathBuf> {
        let relative = Path::new(url);
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        contained.then(|| self.root.join(relative))
    }
}

#[async_trait]
impl TemplateFetcher for DirFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let path = self
            .resolve(url)
            .ok_or_else(|| FetchError::NotFound(url.to_string()))?;
        debug!(url, path = %path.display(), "reading template");
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => FetchError::NotFound(url.to_string()),
                _ => FetchError::Failed {
                    url: url.to_string(),
                    message: err.to_string(),
                },
            })
    }
}
