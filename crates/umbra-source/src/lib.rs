//! # Umbra source ingestion
//!
//! Operators grow the block set by subscribing to hostfile-style URLs.
//! [`Downloader`] streams and parses one such URL; [`SourceProvider`]
//! persists subscriptions, triggers refreshes through a registered
//! hook, and writes parsed domains to storage in bounded chunks.

mod downloader;
mod provider;

pub use downloader::{Downloader, DomainReader};
pub use provider::{DomainSink, RefreshHook, SourceProvider};

use thiserror::Error;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Ingestion errors.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The subscription URL did not parse.
    #[error("source url {url} is not valid")]
    InvalidUrl {
        /// The rejected input.
        url: String,
    },

    /// The HTTP request or body stream failed.
    #[error("unable to download {url}: {source}")]
    Http {
        /// The hostfile URL.
        url: String,
        /// Transport error.
        #[source]
        source: reqwest::Error,
    },

    /// A refresh exceeded its deadline.
    #[error("refresh of {url} timed out")]
    Timeout {
        /// The hostfile URL.
        url: String,
    },

    /// Persisting a chunk failed.
    #[error(transparent)]
    Store(#[from] umbra_store::StoreError),
}
