//! Source subscription management.

use crate::{Downloader, Result, SourceError};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use umbra_store::Store;
use url::Url;

/// Domains persisted per storage call during a refresh. Bounds both
/// transaction size and refresh memory.
const CHUNK_SIZE: usize = 100;

/// Deadline for one whole source refresh, so a stuck upstream cannot
/// block refresh progress on other sources.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(60);

/// Callback fired when a source should be refreshed. Expected to be
/// fire-and-forget; the provider does not wait on it.
pub type RefreshHook = Arc<dyn Fn(String) + Send + Sync>;

/// Observer invoked with each persisted chunk, so freshly downloaded
/// domains can also land in the live blacklist.
pub type DomainSink = Arc<dyn Fn(&[String]) + Send + Sync>;

/// Manages hostfile subscriptions.
pub struct SourceProvider {
    store: Arc<Store>,
    downloader: Downloader,
    on_refresh: OnceLock<RefreshHook>,
    on_domains: Option<DomainSink>,
}

impl SourceProvider {
    /// Creates a provider over the given store and downloader.
    pub fn new(store: Arc<Store>, downloader: Downloader) -> Self {
        Self {
            store,
            downloader,
            on_refresh: OnceLock::new(),
            on_domains: None,
        }
    }

    /// Adds a chunk observer. Builder-style, used at construction.
    #[must_use]
    pub fn with_domain_sink(mut self, sink: DomainSink) -> Self {
        self.on_domains = Some(sink);
        self
    }

    /// Registers the refresh hook. The hook can be set once; later
    /// calls are ignored, so it can never change while being invoked.
    pub fn on_refresh_source(&self, hook: RefreshHook) {
        let _ = self.on_refresh.set(hook);
    }

    /// Validates and persists a subscription URL, then fires the
    /// refresh hook for it.
    pub async fn add_source(&self, url: &str) -> Result<()> {
        if Url::parse(url).is_err() {
            return Err(SourceError::InvalidUrl {
                url: url.to_string(),
            });
        }

        self.store.add_source(url).await?;

        if let Some(hook) = self.on_refresh.get() {
            hook(url.to_string());
        }
        Ok(())
    }

    /// Fires the refresh hook for every persisted source URL.
    pub async fn refresh_sources(&self) -> Result<()> {
        let Some(hook) = self.on_refresh.get() else {
            return Ok(());
        };

        self.store
            .for_each_source(|url| hook(url.to_string()))
            .await?;
        Ok(())
    }

    /// Downloads one source and persists its domains in chunks of 100.
    /// The whole refresh is bounded by a 60 second deadline.
    pub async fn refresh_from_source(&self, url: &str) -> Result<()> {
        timeout(REFRESH_TIMEOUT, self.refresh_inner(url))
            .await
            .map_err(|_| SourceError::Timeout {
                url: url.to_string(),
            })?
    }

    async fn refresh_inner(&self, url: &str) -> Result<()> {
        debug!(url, "starting update from source");

        let mut reader = self.downloader.stream(url).await?;
        let mut chunk: Vec<String> = Vec::with_capacity(CHUNK_SIZE);
        let mut total = 0usize;

        while let Some(domain) = reader.next_domain().await? {
            chunk.push(domain);
            total += 1;
            if chunk.len() == CHUNK_SIZE {
                self.persist(&mut chunk).await?;
            }
        }
        if !chunk.is_empty() {
            self.persist(&mut chunk).await?;
        }

        debug!(url, total, "update from source finished");
        Ok(())
    }

    async fn persist(&self, chunk: &mut Vec<String>) -> Result<()> {
        self.store.add_domains(chunk).await?;
        if let Some(sink) = &self.on_domains {
            sink(chunk);
        }
        chunk.clear();
        Ok(())
    }
}
